//! # Resources
//!
//! Type-keyed singletons owned by the world. Unlike components they are not
//! tied to an entity and need not be `Pod`; they are dropped with the world.

use std::any::{type_name, Any, TypeId};
use std::collections::HashMap;

use crate::error::{EcsError, EcsResult};

/// Marker for types stored as resources.
pub trait Resource: Any + Send + Sync {}

impl<T: Any + Send + Sync> Resource for T {}

/// Map of resource type to value.
#[derive(Default)]
pub struct Resources {
    values: HashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl Resources {
    /// Inserts `value`, returning the previous value of the same type.
    pub fn insert<R: Resource>(&mut self, value: R) -> Option<R> {
        self.values
            .insert(TypeId::of::<R>(), Box::new(value))
            .and_then(|old| old.downcast::<R>().ok())
            .map(|old| *old)
    }

    /// Shared reference to the `R` resource.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ResourceMissing`] if `R` was never inserted.
    pub fn get<R: Resource>(&self) -> EcsResult<&R> {
        self.values
            .get(&TypeId::of::<R>())
            .and_then(|value| value.downcast_ref::<R>())
            .ok_or(EcsError::ResourceMissing(type_name::<R>()))
    }

    /// Mutable reference to the `R` resource.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ResourceMissing`] if `R` was never inserted.
    pub fn get_mut<R: Resource>(&mut self) -> EcsResult<&mut R> {
        self.values
            .get_mut(&TypeId::of::<R>())
            .and_then(|value| value.downcast_mut::<R>())
            .ok_or(EcsError::ResourceMissing(type_name::<R>()))
    }

    /// Removes and returns the `R` resource.
    pub fn remove<R: Resource>(&mut self) -> Option<R> {
        self.values
            .remove(&TypeId::of::<R>())
            .and_then(|value| value.downcast::<R>().ok())
            .map(|value| *value)
    }

    /// True if an `R` resource is present.
    #[must_use]
    pub fn contains<R: Resource>(&self) -> bool {
        self.values.contains_key(&TypeId::of::<R>())
    }

    /// Number of stored resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// True when no resource is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl std::fmt::Debug for Resources {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resources")
            .field("len", &self.values.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq)]
    struct Gravity(f32);

    #[derive(Debug, PartialEq)]
    struct Score(Vec<u32>);

    #[test]
    fn test_insert_and_get() {
        let mut resources = Resources::default();
        assert!(resources.insert(Gravity(9.8)).is_none());
        assert_eq!(resources.insert(Gravity(1.6)), Some(Gravity(9.8)));
        assert_eq!(resources.get::<Gravity>().unwrap(), &Gravity(1.6));
        assert_eq!(resources.len(), 1);
    }

    #[test]
    fn test_missing_resource_names_type() {
        let resources = Resources::default();
        let err = resources.get::<Score>().unwrap_err();
        assert!(matches!(err, EcsError::ResourceMissing(name) if name.contains("Score")));
    }

    #[test]
    fn test_get_mut_and_remove() {
        let mut resources = Resources::default();
        resources.insert(Score(vec![1]));
        resources.get_mut::<Score>().unwrap().0.push(2);
        assert!(resources.contains::<Score>());
        assert_eq!(resources.remove::<Score>(), Some(Score(vec![1, 2])));
        assert!(resources.is_empty());
    }
}
