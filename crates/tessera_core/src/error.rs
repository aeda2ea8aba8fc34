//! # Error Types
//!
//! Every fallible operation in the core returns [`EcsResult`]. Failures are
//! either programmer errors (dead entity, unregistered type) that abort the
//! current operation, or fatal-for-this-tick errors raised by the schedule.

use thiserror::Error;

use crate::ecs::Entity;

/// Errors that can occur in the storage engine and the scheduler.
#[derive(Error, Debug)]
pub enum EcsError {
    /// The entity handle is stale, null, or was never issued.
    #[error("entity {0} is not alive")]
    EntityNotAlive(Entity),

    /// A component type was looked up before being registered.
    #[error("component `{0}` is not registered")]
    ComponentNotRegistered(&'static str),

    /// A component id was looked up that the registry never issued.
    #[error("component id {0} is not registered")]
    ComponentIdUnknown(u16),

    /// The entity is alive but does not carry the requested component.
    #[error("entity {entity} has no `{component}` component")]
    ComponentMissing {
        /// Entity that was accessed.
        entity: Entity,
        /// Name of the missing component type.
        component: &'static str,
    },

    /// Every entity id is in use.
    #[error("entity ids exhausted: at most {0} entities")]
    EntityCapacity(i32),

    /// The registry ran out of component ids.
    #[error("component capacity exceeded: at most {0} component types")]
    ComponentCapacity(usize),

    /// A resource was fetched before being inserted.
    #[error("resource `{0}` does not exist")]
    ResourceMissing(&'static str),

    /// A query named the same component twice.
    #[error("query accesses `{0}` more than once")]
    DuplicateQueryTerm(&'static str),

    /// A query has more terms than the engine supports.
    #[error("query has {0} terms, at most {max} are supported", max = crate::ecs::query::MAX_QUERY_TERMS)]
    TooManyQueryTerms(usize),

    /// `single()` or a point lookup found no matching row.
    #[error("query `{0}` matched no entity")]
    QueryNoMatch(&'static str),

    /// A hierarchy edit would break the parent/child relation.
    #[error("invalid hierarchy edit: {0}")]
    InvalidHierarchy(String),

    /// Topological sort of a stage could not consume every system.
    #[error("dependency cycle in stage {stage}: systems {systems:?} could not be ordered")]
    ScheduleCycle {
        /// Stage whose systems form a cycle.
        stage: String,
        /// Labels of the systems left after the sort drained.
        systems: Vec<&'static str>,
    },

    /// A stage label was used that the schedule does not contain.
    #[error("stage {0} does not exist")]
    UnknownStage(String),

    /// A system returned an error while running inside a stage.
    #[error("system `{system}` in stage {stage} failed: {source}")]
    System {
        /// Label of the failing system.
        system: &'static str,
        /// Stage the system ran in.
        stage: String,
        /// Underlying failure.
        #[source]
        source: Box<EcsError>,
    },

    /// The world that owned a command channel has been dropped.
    #[error("command channel closed")]
    CommandChannelClosed,

    /// Storage bookkeeping does not match the stored rows.
    #[error("storage corrupted: {0}")]
    Corrupted(String),

    /// Invalid configuration file or value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failure raised by user system code.
    #[error("{0}")]
    Other(String),
}

/// Result type for storage and schedule operations.
pub type EcsResult<T> = Result<T, EcsError>;
