//! # Hierarchy
//!
//! Parent/child links are index based: the child carries a [`Parent`]
//! component, the parent's children live in a side table keyed by entity.
//! Both sides are updated together; neither holds references. The world
//! routes direct `Parent` adds and removes through here and refuses the
//! paths that cannot be routed (bundles, `get_mut`, `Write<Parent>`).

use std::any::TypeId;
use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};

use crate::ecs::store::ArchetypeStore;
use crate::ecs::{Component, Entity};
use crate::error::{EcsError, EcsResult};

/// Parent of the entity carrying it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Parent(pub Entity);

impl Component for Parent {}

/// True for the type id of [`Parent`].
#[inline]
pub(crate) fn is_parent(type_id: TypeId) -> bool {
    type_id == TypeId::of::<Parent>()
}

/// Error for writes to [`Parent`] that bypass the children table.
pub(crate) fn unmanaged_parent(operation: &str) -> EcsError {
    EcsError::InvalidHierarchy(format!(
        "{operation} cannot set Parent; use add_child or remove_child"
    ))
}

/// Children side table.
#[derive(Debug, Default)]
pub struct Hierarchy {
    children: HashMap<Entity, Vec<Entity>>,
}

impl Hierarchy {
    /// Children of `parent`, in link order.
    #[must_use]
    pub fn children(&self, parent: Entity) -> &[Entity] {
        self.children.get(&parent).map_or(&[], Vec::as_slice)
    }

    /// Parent of `child`, if linked.
    #[must_use]
    pub fn parent(store: &ArchetypeStore, child: Entity) -> Option<Entity> {
        store.get::<Parent>(child).ok().map(|parent| parent.0)
    }

    /// Links `child` under `parent`, moving it away from a previous parent.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityNotAlive`] for dead handles and
    /// [`EcsError::InvalidHierarchy`] when the link would make a cycle.
    pub fn add_child(&mut self, store: &mut ArchetypeStore, parent: Entity, child: Entity) -> EcsResult<()> {
        store.location(parent)?;
        store.location(child)?;
        if parent == child {
            return Err(EcsError::InvalidHierarchy(format!("{child} cannot be its own parent")));
        }
        let mut ancestor = Self::parent(store, parent);
        while let Some(current) = ancestor {
            if current == child {
                return Err(EcsError::InvalidHierarchy(format!(
                    "{child} is an ancestor of {parent}"
                )));
            }
            ancestor = Self::parent(store, current);
        }

        match Self::parent(store, child) {
            Some(old) if old == parent => return Ok(()),
            Some(old) => self.unlink(old, child),
            None => {}
        }
        store.add_component(child, Parent(parent))?;
        self.children.entry(parent).or_default().push(child);
        Ok(())
    }

    /// Unlinks `child` from `parent`. Returns false if they were not linked.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityNotAlive`] for a dead child.
    pub fn remove_child(&mut self, store: &mut ArchetypeStore, parent: Entity, child: Entity) -> EcsResult<bool> {
        store.location(child)?;
        if Self::parent(store, child) != Some(parent) {
            return Ok(false);
        }
        store.remove_component::<Parent>(child)?;
        self.unlink(parent, child);
        Ok(true)
    }

    /// Cuts every link of `entity` ahead of its despawn: it leaves its
    /// parent's list and its children become roots.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityNotAlive`] for dead handles.
    pub fn detach(&mut self, store: &mut ArchetypeStore, entity: Entity) -> EcsResult<()> {
        store.location(entity)?;
        if let Some(parent) = Self::parent(store, entity) {
            self.unlink(parent, entity);
        }
        for child in self.children.remove(&entity).unwrap_or_default() {
            if store.is_alive(child) {
                store.remove_component::<Parent>(child)?;
            }
        }
        Ok(())
    }

    /// `root` followed by all its descendants, depth first.
    #[must_use]
    pub fn descendants(&self, root: Entity) -> Vec<Entity> {
        let mut out = Vec::new();
        let mut stack = vec![root];
        while let Some(entity) = stack.pop() {
            out.push(entity);
            stack.extend(self.children(entity).iter().rev());
        }
        out
    }

    fn unlink(&mut self, parent: Entity, child: Entity) {
        if let Some(children) = self.children.get_mut(&parent) {
            children.retain(|&linked| linked != child);
            if children.is_empty() {
                self.children.remove(&parent);
            }
        }
    }
}
