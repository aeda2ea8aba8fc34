//! # Entity Component System
//!
//! Archetype-based storage with chunked columns.
//!
//! ## Design Philosophy
//!
//! - Entities with the same component set share an archetype
//! - Archetypes store rows in fixed-byte chunks, one typed column per component
//! - Change stamps are kept per chunk (and optionally per row) for filtering
//! - Structural edits from systems are deferred through prioritized commands

pub mod allocator;
pub mod archetype;
pub mod bundle;
pub mod chunk;
pub mod commands;
pub mod component;
mod entity;
pub mod hierarchy;
pub mod query;
pub mod resources;
pub mod storage;
pub mod store;
pub mod tracker;
mod world;

pub use allocator::{EntityAllocator, MAX_ENTITY_ID};
pub use archetype::{Archetype, ArchetypeId};
pub use bundle::{Bundle, ErasedComponent};
pub use chunk::Chunk;
pub use commands::{Command, CommandKind, CommandQueue, CommandSender, Commands};
pub use component::{Component, ComponentId, ComponentInfo, ComponentRegistry, Signature, COMPONENT_CAP};
pub use entity::{Entity, EntityLocation};
pub use hierarchy::{Hierarchy, Parent};
pub use query::{Added, AnyOf, Changed, Query, QueryData, QueryFilter, Read, Removed, With, Without, Write};
pub use resources::{Resource, Resources};
pub use store::ArchetypeStore;
pub use tracker::{ChangeKind, Generation};
pub use world::World;
