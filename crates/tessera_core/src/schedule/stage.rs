//! # Stages
//!
//! A stage owns a set of systems and runs them batch by batch. Its order and
//! batches are built lazily, the first time the stage is built after a
//! system was added, and reused until the next addition.

use std::fmt;
use std::time::Duration;

use crate::ecs::World;
use crate::error::{EcsError, EcsResult};
use crate::schedule::graph::{DependencyGraph, SystemNode};
use crate::schedule::system::{RunCondition, SystemConfig};

/// Name of a stage.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct StageLabel(pub &'static str);

impl StageLabel {
    /// One-time setup.
    pub const INIT: Self = Self("Init");
    /// One-time setup that depends on `INIT`.
    pub const POST_INIT: Self = Self("PostInit");
    /// Start of every frame.
    pub const FIRST: Self = Self("First");
    /// Main frame logic.
    pub const UPDATE: Self = Self("Update");
    /// End of every frame.
    pub const LAST: Self = Self("Last");
}

impl From<&'static str> for StageLabel {
    fn from(label: &'static str) -> Self {
        Self(label)
    }
}

impl fmt::Display for StageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.0)
    }
}

/// Most steps one advance releases. Whole steps past this are dropped.
pub const MAX_CATCH_UP_STEPS: u32 = 8;

/// Accumulates elapsed time and releases it in fixed steps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedTimestep {
    step: Duration,
    accumulator: Duration,
}

impl FixedTimestep {
    /// Creates a timestep of `step`. Zero steps are raised to one nanosecond.
    #[must_use]
    pub fn new(step: Duration) -> Self {
        Self {
            step: step.max(Duration::from_nanos(1)),
            accumulator: Duration::ZERO,
        }
    }

    /// Creates a timestep running `hz` times per second.
    #[must_use]
    pub fn from_hz(hz: f64) -> Self {
        Self::new(Duration::from_secs_f64(1.0 / hz.max(f64::EPSILON)))
    }

    /// Step length.
    #[must_use]
    pub const fn step(&self) -> Duration {
        self.step
    }

    /// Time carried over to the next advance.
    #[must_use]
    pub const fn accumulator(&self) -> Duration {
        self.accumulator
    }

    /// Adds `elapsed` and returns how many whole steps are due, at most
    /// [`MAX_CATCH_UP_STEPS`]. The sub-step remainder carries over.
    pub fn advance(&mut self, elapsed: Duration) -> u32 {
        let total = self.accumulator.saturating_add(elapsed).as_nanos();
        let step = self.step.as_nanos();
        let due = total / step;
        self.accumulator = Duration::from_nanos(u64::try_from(total % step).unwrap_or(u64::MAX));

        match u32::try_from(due) {
            Ok(steps) if steps <= MAX_CATCH_UP_STEPS => steps,
            _ => {
                tracing::warn!(
                    due = %due,
                    kept = MAX_CATCH_UP_STEPS,
                    step = ?self.step,
                    "fixed timestep fell behind, dropping steps"
                );
                MAX_CATCH_UP_STEPS
            }
        }
    }
}

/// Decides how many times a stage runs in one schedule pass.
#[derive(Default)]
pub enum RunCriteria {
    /// Every pass.
    #[default]
    Always,
    /// The first pass only.
    Once {
        /// Set after the first run.
        done: bool,
    },
    /// Once per elapsed fixed step.
    FixedRate(FixedTimestep),
    /// Whenever the condition holds.
    If(RunCondition),
}

impl RunCriteria {
    /// Runs the stage on the first pass only.
    #[must_use]
    pub const fn once() -> Self {
        Self::Once { done: false }
    }

    /// Runs the stage once per elapsed `step`.
    #[must_use]
    pub fn fixed_rate(step: Duration) -> Self {
        Self::FixedRate(FixedTimestep::new(step))
    }

    /// Runs the stage whenever `condition` holds.
    #[must_use]
    pub fn run_if<C>(condition: C) -> Self
    where
        C: FnMut(&World) -> bool + Send + 'static,
    {
        Self::If(Box::new(condition))
    }

    /// Number of runs due for this pass.
    pub fn runs_due(&mut self, world: &World, elapsed: Duration) -> u32 {
        match self {
            Self::Always => 1,
            Self::Once { done } => {
                if *done {
                    0
                } else {
                    *done = true;
                    1
                }
            }
            Self::FixedRate(timestep) => timestep.advance(elapsed),
            Self::If(condition) => u32::from(condition(world)),
        }
    }
}

impl fmt::Debug for RunCriteria {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Always => f.write_str("Always"),
            Self::Once { done } => f.debug_struct("Once").field("done", done).finish(),
            Self::FixedRate(timestep) => f.debug_tuple("FixedRate").field(timestep).finish(),
            Self::If(_) => f.write_str("If"),
        }
    }
}

/// Systems of one stage plus their cached execution plan.
pub struct Stage {
    label: StageLabel,
    systems: Vec<SystemConfig>,
    batches: Vec<Vec<usize>>,
    built: bool,
    run_criteria: RunCriteria,
}

impl Stage {
    /// Creates an empty stage that always runs.
    #[must_use]
    pub fn new(label: StageLabel) -> Self {
        Self {
            label,
            systems: Vec::new(),
            batches: Vec::new(),
            built: true,
            run_criteria: RunCriteria::Always,
        }
    }

    /// Label of this stage.
    #[must_use]
    pub const fn label(&self) -> StageLabel {
        self.label
    }

    /// Number of systems.
    #[must_use]
    pub fn len(&self) -> usize {
        self.systems.len()
    }

    /// True for a stage without systems.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.systems.is_empty()
    }

    /// Replaces the stage's run criteria.
    pub fn set_run_criteria(&mut self, criteria: RunCriteria) {
        self.run_criteria = criteria;
    }

    /// Current run criteria.
    #[must_use]
    pub fn run_criteria(&self) -> &RunCriteria {
        &self.run_criteria
    }

    /// Adds a system. The plan is rebuilt before the next run.
    pub fn add_system(&mut self, config: SystemConfig) {
        self.systems.push(config);
        self.built = false;
    }

    /// Labels of the systems, in registration order.
    pub fn labels(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.systems.iter().map(SystemConfig::label)
    }

    /// Batches of the current plan as system labels, in execution order.
    /// Empty until the stage was built.
    #[must_use]
    pub fn batches(&self) -> Vec<Vec<&'static str>> {
        self.batches
            .iter()
            .map(|batch| batch.iter().map(|&index| self.systems[index].label()).collect())
            .collect()
    }

    /// Orders and batches the systems if anything changed since the last
    /// build.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ScheduleCycle`] when the ordering labels form a
    /// cycle; the previous plan is discarded.
    pub fn build(&mut self) -> EcsResult<()> {
        if self.built {
            return Ok(());
        }
        self.batches.clear();

        let stage = self.label.0;
        let nodes: Vec<SystemNode<'_>> = self
            .systems
            .iter()
            .map(|config| SystemNode {
                label: config.label(),
                before: &config.before,
                after: &config.after,
                dependencies: config.system.dependencies(),
            })
            .collect();
        let graph = DependencyGraph::new(stage, &nodes);
        let order = graph.topological_order(stage, &nodes)?;
        let batches = graph.batches(&order, &nodes);

        tracing::debug!(
            stage,
            systems = nodes.len(),
            batches = batches.len(),
            "built stage"
        );
        self.batches = batches;
        self.built = true;
        Ok(())
    }

    /// Runs the stage as often as its criteria demand.
    ///
    /// # Errors
    ///
    /// Fails if the stage cannot be built, or with [`EcsError::System`]
    /// wrapping the first system failure; later systems do not run.
    pub fn run(&mut self, world: &mut World, elapsed: Duration) -> EcsResult<()> {
        self.build()?;
        let runs = self.run_criteria.runs_due(world, elapsed);
        for _ in 0..runs {
            self.run_once(world)?;
        }
        Ok(())
    }

    fn run_once(&mut self, world: &mut World) -> EcsResult<()> {
        let Self {
            label,
            systems,
            batches,
            ..
        } = self;
        for batch in batches.iter() {
            for &index in batch {
                let config = &mut systems[index];
                if let Some(condition) = config.run_if.as_mut() {
                    if !condition(world) {
                        continue;
                    }
                }
                if let Err(err) = config.system.run(world) {
                    let system = config.system.label();
                    tracing::error!(system, stage = label.0, error = %err, "system failed");
                    return Err(EcsError::System {
                        system,
                        stage: label.to_string(),
                        source: Box::new(err),
                    });
                }
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stage")
            .field("label", &self.label)
            .field("systems", &self.systems.len())
            .field("batches", &self.batches.len())
            .field("run_criteria", &self.run_criteria)
            .finish()
    }
}
