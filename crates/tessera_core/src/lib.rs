//! # Tessera Core
//!
//! Archetype-based Entity Component System:
//! - Entities with equal component sets share chunked, column-major storage
//! - Per-chunk and per-row change stamps drive `Added`/`Changed`/`Removed` filters
//! - Structural edits are deferred through prioritized command buffers
//! - Systems run in stages, ordered by labels and batched by data access
//!
//! ## Architecture Rules
//!
//! 1. **Components are plain data** - `bytemuck::Pod`, moved as bytes between archetypes
//! 2. **No allocation while iterating** - queries walk chunk columns in place
//! 3. **Deterministic** - same registrations and seed, same archetype ids and batches
//!
//! ## Example
//!
//! ```rust,ignore
//! use tessera_core::{system, App, Query, Read, StageLabel, Write};
//!
//! let mut app = App::new();
//! app.world_mut().spawn_bundle((Position::default(), Velocity { x: 1.0, y: 0.0 }))?;
//! app.add_systems(
//!     StageLabel::UPDATE,
//!     system("movement", |world, query: &mut Query<(Write<Position>, Read<Velocity>)>| {
//!         query.for_each(world, |_, (position, velocity)| position.x += velocity.x);
//!     }),
//! )?;
//! app.run_for(60)?;
//! ```

#![deny(missing_docs)]
#![warn(clippy::pedantic)]
#![deny(clippy::perf)]

pub mod app;
pub mod config;
pub mod ecs;
pub mod error;
pub mod memory;
pub mod schedule;

pub use app::App;
pub use config::WorldConfig;
pub use ecs::{
    Added, AnyOf, Bundle, Changed, Command, CommandKind, CommandSender, Commands, Component, ComponentId,
    Entity, Generation, Parent, Query, QueryData, QueryFilter, Read, Removed, Resource, With, Without, World,
    Write,
};
pub use error::{EcsError, EcsResult};
pub use schedule::{
    exclusive_system, system, Dependencies, IntoSystemConfigs, Res, ResMut, RunCriteria, Schedule,
    ScheduleStats, Stage, StageLabel, SystemConfig, SystemParam,
};
