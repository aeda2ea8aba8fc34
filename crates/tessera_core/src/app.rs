//! # App
//!
//! A world plus the schedule that drives it.
//!
//! ```rust,ignore
//! let mut app = App::new();
//! app.insert_resource(Gravity(-9.8))
//!     .add_systems(StageLabel::UPDATE, system("fall", fall))?;
//! app.run_for(60)?;
//! ```

use std::time::Duration;

use crate::config::WorldConfig;
use crate::ecs::resources::Resource;
use crate::ecs::tracker::Generation;
use crate::ecs::World;
use crate::error::EcsResult;
use crate::schedule::{IntoSystemConfigs, Schedule, StageLabel};

/// Owns a [`World`] and the [`Schedule`] run against it.
#[derive(Debug)]
pub struct App {
    world: World,
    schedule: Schedule,
}

impl App {
    /// Empty world, default stages.
    #[must_use]
    pub fn new() -> Self {
        Self {
            world: World::new(),
            schedule: Schedule::new(),
        }
    }

    /// Empty world built from `config`, default stages.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EcsError::InvalidConfig`] for out-of-range values.
    pub fn with_config(config: &WorldConfig) -> EcsResult<Self> {
        Ok(Self {
            world: World::with_config(config)?,
            schedule: Schedule::new(),
        })
    }

    /// The world.
    #[must_use]
    pub fn world(&self) -> &World {
        &self.world
    }

    /// The world, mutably.
    pub fn world_mut(&mut self) -> &mut World {
        &mut self.world
    }

    /// The schedule.
    #[must_use]
    pub fn schedule(&self) -> &Schedule {
        &self.schedule
    }

    /// The schedule, mutably.
    pub fn schedule_mut(&mut self) -> &mut Schedule {
        &mut self.schedule
    }

    /// Inserts or replaces a resource.
    pub fn insert_resource<R: Resource>(&mut self, value: R) -> &mut Self {
        self.world.insert_resource(value);
        self
    }

    /// Adds systems to `stage`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EcsError::UnknownStage`] if the stage does not exist.
    pub fn add_systems(&mut self, stage: impl Into<StageLabel>, systems: impl IntoSystemConfigs) -> EcsResult<&mut Self> {
        self.schedule.add_systems(stage, systems)?;
        Ok(self)
    }

    /// Runs one frame: every stage, a final command flush, then the
    /// generation advances. Returns the generation the frame ran in.
    ///
    /// # Errors
    ///
    /// Returns the first schedule, system or command failure. The
    /// generation is not advanced when the frame fails.
    pub fn update(&mut self) -> EcsResult<Generation> {
        self.schedule.run(&mut self.world)?;
        self.finish_frame()
    }

    /// Like [`Self::update`] with an explicit frame time for fixed-rate
    /// stages.
    ///
    /// # Errors
    ///
    /// See [`Self::update`].
    pub fn update_with_elapsed(&mut self, elapsed: Duration) -> EcsResult<Generation> {
        self.schedule.run_with_elapsed(&mut self.world, elapsed)?;
        self.finish_frame()
    }

    fn finish_frame(&mut self) -> EcsResult<Generation> {
        self.world.flush()?;
        let generation = self.world.generation();
        self.world.tick();
        Ok(generation)
    }

    /// Runs `frames` frames back to back.
    ///
    /// # Errors
    ///
    /// Stops at the first failing frame.
    pub fn run_for(&mut self, frames: u32) -> EcsResult<()> {
        for _ in 0..frames {
            self.update()?;
        }
        tracing::debug!(frames, generation = ?self.world.generation(), "app run finished");
        Ok(())
    }
}

impl Default for App {
    fn default() -> Self {
        Self::new()
    }
}
