//! # Schedule
//!
//! Runs systems stage by stage:
//!
//! ```text
//! Init ─> PostInit ─> First ─> Update ─> Last
//! (once)  (once)
//! ```
//!
//! Every stage is built (sorted and batched) before anything runs, so a
//! cycle in any stage fails the pass without running a single system.
//! Pending commands are flushed after each stage.

mod graph;
mod stage;
mod system;

use std::time::{Duration, Instant};

pub use graph::{DependencyGraph, SystemNode};
pub use stage::{FixedTimestep, RunCriteria, Stage, StageLabel, MAX_CATCH_UP_STEPS};
pub use system::{
    exclusive_system, system, Dependencies, FunctionSystem, IntoSystemConfigs, Res, ResMut, RunCondition,
    System, SystemConfig, SystemOutput, SystemParam,
};

use crate::ecs::World;
use crate::error::{EcsError, EcsResult};

/// Shape of a schedule.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct ScheduleStats {
    /// Number of stages.
    pub stages: usize,
    /// Number of systems over all stages.
    pub systems: usize,
    /// Number of batches over all built stages.
    pub batches: usize,
}

/// Ordered list of stages.
#[derive(Debug)]
pub struct Schedule {
    stages: Vec<Stage>,
    last_run: Option<Instant>,
}

impl Schedule {
    /// Creates a schedule with no stages.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            stages: Vec::new(),
            last_run: None,
        }
    }

    /// Creates a schedule with the default stages. `Init` and `PostInit`
    /// run on the first pass only.
    #[must_use]
    pub fn new() -> Self {
        let mut schedule = Self::empty();
        for label in [
            StageLabel::INIT,
            StageLabel::POST_INIT,
            StageLabel::FIRST,
            StageLabel::UPDATE,
            StageLabel::LAST,
        ] {
            schedule.add_stage(label);
        }
        for label in [StageLabel::INIT, StageLabel::POST_INIT] {
            if let Some(stage) = schedule.stage_mut(label) {
                stage.set_run_criteria(RunCriteria::once());
            }
        }
        schedule
    }

    fn position(&self, label: StageLabel) -> EcsResult<usize> {
        self.stages
            .iter()
            .position(|stage| stage.label() == label)
            .ok_or_else(|| EcsError::UnknownStage(label.to_string()))
    }

    /// Appends a stage. Existing labels are left untouched.
    pub fn add_stage(&mut self, label: impl Into<StageLabel>) -> &mut Self {
        let label = label.into();
        if self.position(label).is_err() {
            self.stages.push(Stage::new(label));
        }
        self
    }

    /// Inserts a stage right before `target`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownStage`] if `target` does not exist.
    pub fn add_stage_before(&mut self, target: impl Into<StageLabel>, label: impl Into<StageLabel>) -> EcsResult<()> {
        let index = self.position(target.into())?;
        self.stages.insert(index, Stage::new(label.into()));
        Ok(())
    }

    /// Inserts a stage right after `target`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownStage`] if `target` does not exist.
    pub fn add_stage_after(&mut self, target: impl Into<StageLabel>, label: impl Into<StageLabel>) -> EcsResult<()> {
        let index = self.position(target.into())?;
        self.stages.insert(index + 1, Stage::new(label.into()));
        Ok(())
    }

    /// Stage by label.
    #[must_use]
    pub fn stage(&self, label: impl Into<StageLabel>) -> Option<&Stage> {
        let label = label.into();
        self.stages.iter().find(|stage| stage.label() == label)
    }

    /// Mutable stage by label.
    pub fn stage_mut(&mut self, label: impl Into<StageLabel>) -> Option<&mut Stage> {
        let label = label.into();
        self.stages.iter_mut().find(|stage| stage.label() == label)
    }

    /// Stage labels in execution order.
    pub fn stage_labels(&self) -> impl Iterator<Item = StageLabel> + '_ {
        self.stages.iter().map(Stage::label)
    }

    /// Replaces the run criteria of a stage.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownStage`] if the stage does not exist.
    pub fn set_run_criteria(&mut self, label: impl Into<StageLabel>, criteria: RunCriteria) -> EcsResult<()> {
        let index = self.position(label.into())?;
        self.stages[index].set_run_criteria(criteria);
        Ok(())
    }

    /// Adds systems to a stage.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownStage`] if the stage does not exist.
    pub fn add_systems(&mut self, label: impl Into<StageLabel>, systems: impl IntoSystemConfigs) -> EcsResult<&mut Self> {
        let index = self.position(label.into())?;
        for config in systems.into_configs() {
            self.stages[index].add_system(config);
        }
        Ok(self)
    }

    /// Builds every stage.
    ///
    /// # Errors
    ///
    /// Returns the first [`EcsError::ScheduleCycle`].
    pub fn build(&mut self) -> EcsResult<()> {
        for stage in &mut self.stages {
            stage.build()?;
        }
        Ok(())
    }

    /// Runs one pass, timing fixed-rate stages by wall clock.
    ///
    /// # Errors
    ///
    /// See [`Self::run_with_elapsed`].
    pub fn run(&mut self, world: &mut World) -> EcsResult<()> {
        let now = Instant::now();
        let elapsed = self.last_run.map_or(Duration::ZERO, |last| now.duration_since(last));
        self.last_run = Some(now);
        self.run_with_elapsed(world, elapsed)
    }

    /// Runs one pass, with `elapsed` fed to fixed-rate stages.
    ///
    /// # Errors
    ///
    /// Fails before running anything if a stage has a cycle. Otherwise
    /// stops at the first failing system or command flush.
    pub fn run_with_elapsed(&mut self, world: &mut World, elapsed: Duration) -> EcsResult<()> {
        self.build()?;
        for stage in &mut self.stages {
            stage.run(world, elapsed)?;
            world.flush()?;
        }
        Ok(())
    }

    /// Stage, system and batch counts.
    #[must_use]
    pub fn stats(&self) -> ScheduleStats {
        ScheduleStats {
            stages: self.stages.len(),
            systems: self.stages.iter().map(Stage::len).sum(),
            batches: self.stages.iter().map(|stage| stage.batches().len()).sum(),
        }
    }
}

impl Default for Schedule {
    fn default() -> Self {
        Self::new()
    }
}
