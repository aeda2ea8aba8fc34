//! # ECS World
//!
//! The central container: archetype storage, resources, the hierarchy side
//! table and the pending command queue.
//!
//! ```rust,ignore
//! let mut world = World::new();
//! let ship = world.spawn_bundle((Position::default(), Velocity { x: 1.0, y: 0.0 }))?;
//! world.commands().add_component(ship, Fuel(100));
//! world.flush()?;
//! ```

use std::any::{type_name, Any, TypeId};
use std::sync::Arc;

use crossbeam_channel::{Receiver, Sender};

use crate::config::WorldConfig;
use crate::ecs::allocator::EntityAllocator;
use crate::ecs::archetype::Archetype;
use crate::ecs::bundle::{Bundle, ErasedComponent};
use crate::ecs::commands::{Command, CommandSender, Commands};
use crate::ecs::component::{Component, ComponentId};
use crate::ecs::hierarchy::{is_parent, unmanaged_parent, Hierarchy, Parent};
use crate::ecs::query::{Query, QueryData, QueryFilter};
use crate::ecs::resources::{Resource, Resources};
use crate::ecs::store::ArchetypeStore;
use crate::ecs::tracker::Generation;
use crate::ecs::Entity;
use crate::error::{EcsError, EcsResult};

/// Container for all entities, components and resources.
pub struct World {
    store: ArchetypeStore,
    resources: Resources,
    hierarchy: Hierarchy,
    commands: Commands,
    sender: Sender<Command>,
    receiver: Receiver<Command>,
}

impl World {
    /// Creates a world with the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::build(&WorldConfig::default())
    }

    /// Creates a world from a validated configuration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EcsError::InvalidConfig`] for out-of-range values.
    pub fn with_config(config: &WorldConfig) -> EcsResult<Self> {
        config.validate()?;
        Ok(Self::build(config))
    }

    fn build(config: &WorldConfig) -> Self {
        let store = ArchetypeStore::new(config);
        let commands = Commands::new(Arc::clone(store.allocator()));
        let (sender, receiver) = crossbeam_channel::unbounded();
        Self {
            store,
            resources: Resources::default(),
            hierarchy: Hierarchy::default(),
            commands,
            sender,
            receiver,
        }
    }

    /// Archetype storage.
    #[inline]
    #[must_use]
    pub fn store(&self) -> &ArchetypeStore {
        &self.store
    }

    #[inline]
    pub(crate) fn store_mut(&mut self) -> &mut ArchetypeStore {
        &mut self.store
    }

    /// Shared entity allocator.
    #[must_use]
    pub fn allocator(&self) -> &Arc<EntityAllocator> {
        self.store.allocator()
    }

    /// Registers `C` ahead of first use.
    ///
    /// # Errors
    ///
    /// Fails when the registry is full.
    pub fn register<C: Component>(&mut self) -> EcsResult<ComponentId> {
        self.store.register::<C>()
    }

    // =========================================================================
    // Entities
    // =========================================================================

    /// Spawns an entity without components.
    ///
    /// # Errors
    ///
    /// Fails only on corrupted storage.
    pub fn spawn(&mut self) -> EcsResult<Entity> {
        self.store.create_entity()
    }

    /// Spawns an entity directly into the archetype of `bundle`.
    ///
    /// # Errors
    ///
    /// Fails when the registry is full. Returns
    /// [`EcsError::InvalidHierarchy`] if the bundle carries [`Parent`].
    pub fn spawn_bundle<B: Bundle>(&mut self, bundle: B) -> EcsResult<Entity> {
        if B::contains(TypeId::of::<Parent>()) {
            return Err(unmanaged_parent("a bundle"));
        }
        self.store.spawn_bundle(bundle)
    }

    /// Adds every member of `bundle` to `entity` with one move.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityNotAlive`] for dead handles and
    /// [`EcsError::InvalidHierarchy`] if the bundle carries [`Parent`].
    pub fn insert_bundle<B: Bundle>(&mut self, entity: Entity, bundle: B) -> EcsResult<()> {
        if B::contains(TypeId::of::<Parent>()) {
            return Err(unmanaged_parent("a bundle"));
        }
        self.store.insert_bundle(entity, bundle)
    }

    /// Places a reserved entity with erased component values.
    pub(crate) fn spawn_erased(&mut self, entity: Entity, components: &[ErasedComponent]) -> EcsResult<()> {
        if components.iter().any(|component| is_parent(component.type_id())) {
            return Err(unmanaged_parent("a spawn"));
        }
        self.store.spawn_erased(entity, components)
    }

    /// Despawns `entity`, detaching it from its parent and orphaning its
    /// children.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EcsError::EntityNotAlive`] for dead handles.
    pub fn despawn(&mut self, entity: Entity) -> EcsResult<()> {
        self.hierarchy.detach(&mut self.store, entity)?;
        self.store.destroy_entity(entity)
    }

    /// Despawns `entity` and every descendant. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EcsError::EntityNotAlive`] for a dead root.
    pub fn despawn_recursive(&mut self, entity: Entity) -> EcsResult<usize> {
        self.store.location(entity)?;
        let doomed = self.hierarchy.descendants(entity);
        for &member in doomed.iter().rev() {
            self.despawn(member)?;
        }
        Ok(doomed.len())
    }

    /// True if `entity` is a live handle.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.store.is_alive(entity)
    }

    // =========================================================================
    // Components
    // =========================================================================

    /// Adds `value` to `entity`, or overwrites the existing value.
    ///
    /// A [`Parent`] value links the entity through [`Self::add_child`].
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityNotAlive`] for dead handles.
    pub fn add_component<C: Component>(&mut self, entity: Entity, value: C) -> EcsResult<()> {
        if let Some(&Parent(parent)) = (&value as &dyn Any).downcast_ref::<Parent>() {
            return self.add_child(parent, entity);
        }
        self.store.add_component(entity, value)
    }

    pub(crate) fn add_erased(&mut self, entity: Entity, component: &ErasedComponent) -> EcsResult<()> {
        if is_parent(component.type_id()) {
            let Parent(parent) = bytemuck::try_pod_read_unaligned(component.bytes())
                .map_err(|_| EcsError::Corrupted(format!("{} payload is mis-sized", component.name())))?;
            return self.add_child(parent, entity);
        }
        self.store.add_erased(entity, component)
    }

    /// Removes `C` from `entity`, returning its value.
    ///
    /// Removing [`Parent`] unlinks the entity through [`Self::remove_child`].
    ///
    /// # Errors
    ///
    /// Fails for dead handles, unregistered types or a missing component.
    pub fn remove_component<C: Component>(&mut self, entity: Entity) -> EcsResult<C> {
        if is_parent(TypeId::of::<C>()) {
            let value = *self.store.get::<C>(entity)?;
            self.unparent(entity)?;
            return Ok(value);
        }
        self.store.remove_component(entity)
    }

    pub(crate) fn remove_by_type(&mut self, entity: Entity, type_id: TypeId, name: &'static str) -> EcsResult<()> {
        if is_parent(type_id) {
            return self.unparent(entity);
        }
        self.store.remove_by_type(entity, type_id, name)
    }

    fn unparent(&mut self, entity: Entity) -> EcsResult<()> {
        match Hierarchy::parent(&self.store, entity) {
            Some(parent) => self.remove_child(parent, entity).map(|_| ()),
            None => {
                self.store.location(entity)?;
                Err(EcsError::ComponentMissing {
                    entity,
                    component: type_name::<Parent>(),
                })
            }
        }
    }

    /// Shared reference to the `C` of `entity`.
    ///
    /// # Errors
    ///
    /// Fails for dead handles, unregistered types or a missing component.
    pub fn get<C: Component>(&self, entity: Entity) -> EcsResult<&C> {
        self.store.get(entity)
    }

    /// Mutable reference to the `C` of `entity`; stamps it Changed.
    ///
    /// # Errors
    ///
    /// Fails for dead handles, unregistered types or a missing component.
    /// [`Parent`] is never handed out mutably
    /// ([`EcsError::InvalidHierarchy`]).
    pub fn get_mut<C: Component>(&mut self, entity: Entity) -> EcsResult<&mut C> {
        if is_parent(TypeId::of::<C>()) {
            return Err(unmanaged_parent("get_mut"));
        }
        self.store.get_mut(entity)
    }

    /// True if `entity` carries `C`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EcsError::EntityNotAlive`] for dead handles.
    pub fn has<C: Component>(&self, entity: Entity) -> EcsResult<bool> {
        self.store.has::<C>(entity)
    }

    /// Builds a typed query against this world.
    ///
    /// # Errors
    ///
    /// Fails on duplicate or too many terms.
    pub fn query<D: QueryData, F: QueryFilter>(&mut self) -> EcsResult<Query<D, F>> {
        Query::new(self)
    }

    // =========================================================================
    // Change tracking
    // =========================================================================

    /// Current generation.
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.store.generation()
    }

    /// Advances the generation.
    pub fn tick(&mut self) -> Generation {
        self.store.tick()
    }

    /// True if `entity` lost `C` within the visibility window.
    #[must_use]
    pub fn was_removed<C: Component>(&self, entity: Entity) -> bool {
        self.store.was_removed::<C>(entity)
    }

    /// Last value of a `C` removed from `entity` within the window.
    #[must_use]
    pub fn removed_value<C: Component>(&self, entity: Entity) -> Option<C> {
        self.store.removed_value::<C>(entity)
    }

    /// Entities that lost `C` within the window.
    #[must_use]
    pub fn removed<C: Component>(&self) -> Vec<Entity> {
        self.store.removed_entities::<C>().collect()
    }

    // =========================================================================
    // Commands
    // =========================================================================

    /// The world's command recorder.
    pub fn commands(&mut self) -> &mut Commands {
        &mut self.commands
    }

    /// A producer for commands recorded on other threads.
    #[must_use]
    pub fn command_sender(&self) -> CommandSender {
        CommandSender::new(self.sender.clone(), Arc::clone(self.store.allocator()))
    }

    /// Moves externally recorded commands into the world's queue.
    pub fn push_commands(&mut self, commands: &mut Commands) {
        self.commands.queue_mut().append(commands.queue_mut());
    }

    /// Applies every pending command in priority order. Returns how many ran.
    ///
    /// Commands received from [`CommandSender`]s join the queue first.
    ///
    /// # Errors
    ///
    /// Stops at the first failing command and returns its error. The rest of
    /// the batch is dropped with a warning, and entities reserved by spawns
    /// that never landed go back to the allocator.
    pub fn flush(&mut self) -> EcsResult<usize> {
        while let Ok(command) = self.receiver.try_recv() {
            self.commands.push(command);
        }
        if self.commands.is_empty() {
            return Ok(0);
        }
        let batch = self.commands.queue_mut().drain_ordered();
        let count = batch.len();
        tracing::trace!(count, "flushing commands");

        let mut pending = batch.into_iter();
        while let Some(command) = pending.next() {
            let kind = command.kind();
            let reserved = command.reserved_entity();
            if let Err(error) = command.apply(self) {
                self.release_reserved(reserved);
                let mut dropped = 0_usize;
                for command in pending {
                    self.release_reserved(command.reserved_entity());
                    dropped += 1;
                }
                tracing::warn!(?kind, %error, dropped, "command flush aborted");
                return Err(error);
            }
        }
        Ok(count)
    }

    fn release_reserved(&self, reserved: Option<Entity>) {
        if let Some(entity) = reserved.filter(|&entity| !self.is_alive(entity)) {
            self.store.allocator().free(entity);
        }
    }

    // =========================================================================
    // Resources
    // =========================================================================

    /// Inserts a resource, returning the previous value.
    pub fn insert_resource<R: Resource>(&mut self, value: R) -> Option<R> {
        self.resources.insert(value)
    }

    /// Shared reference to a resource.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EcsError::ResourceMissing`] if `R` is absent.
    pub fn resource<R: Resource>(&self) -> EcsResult<&R> {
        self.resources.get()
    }

    /// Mutable reference to a resource.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EcsError::ResourceMissing`] if `R` is absent.
    pub fn resource_mut<R: Resource>(&mut self) -> EcsResult<&mut R> {
        self.resources.get_mut()
    }

    /// Removes a resource.
    pub fn remove_resource<R: Resource>(&mut self) -> Option<R> {
        self.resources.remove()
    }

    /// True if `R` is present.
    #[must_use]
    pub fn contains_resource<R: Resource>(&self) -> bool {
        self.resources.contains::<R>()
    }

    // =========================================================================
    // Hierarchy
    // =========================================================================

    /// Links `child` under `parent`.
    ///
    /// # Errors
    ///
    /// Fails for dead handles and links that would form a cycle.
    pub fn add_child(&mut self, parent: Entity, child: Entity) -> EcsResult<()> {
        self.hierarchy.add_child(&mut self.store, parent, child)
    }

    /// Unlinks `child` from `parent`; false if they were not linked.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EcsError::EntityNotAlive`] for a dead child.
    pub fn remove_child(&mut self, parent: Entity, child: Entity) -> EcsResult<bool> {
        self.hierarchy.remove_child(&mut self.store, parent, child)
    }

    /// Children of `parent`.
    #[must_use]
    pub fn children(&self, parent: Entity) -> &[Entity] {
        self.hierarchy.children(parent)
    }

    /// Parent of `child`.
    #[must_use]
    pub fn parent(&self, child: Entity) -> Option<Entity> {
        Hierarchy::parent(&self.store, child)
    }

    // =========================================================================
    // Diagnostics
    // =========================================================================

    /// Number of archetypes, including the empty one.
    #[must_use]
    pub fn archetype_count(&self) -> usize {
        self.store.archetype_count()
    }

    /// Number of live, stored entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.store.entity_count()
    }

    /// Archetype `entity` lives in.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EcsError::EntityNotAlive`] for dead handles.
    pub fn archetype_of(&self, entity: Entity) -> EcsResult<&Archetype> {
        self.store.archetype_of(entity)
    }

    /// Checks storage invariants.
    ///
    /// # Errors
    ///
    /// Returns [`crate::EcsError::Corrupted`] on the first violation.
    pub fn validate(&self) -> EcsResult<()> {
        self.store.validate()
    }

    /// Releases spare chunks.
    pub fn optimize(&mut self) {
        self.store.optimize();
    }
}

impl Default for World {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("store", &self.store)
            .field("resources", &self.resources)
            .field("pending_commands", &self.commands.len())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::hierarchy::Parent;
    use crate::ecs::query::{Read, Write};
    use crate::error::EcsError;
    use bytemuck::{Pod, Zeroable};

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Position {
        x: f32,
        y: f32,
    }
    impl Component for Position {}

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Velocity {
        x: f32,
        y: f32,
    }
    impl Component for Velocity {}

    #[test]
    fn test_spawn_and_access() {
        let mut world = World::new();
        let entity = world
            .spawn_bundle((Position { x: 1.0, y: 2.0 }, Velocity { x: 0.5, y: 0.0 }))
            .unwrap();

        assert!(world.is_alive(entity));
        assert_eq!(world.get::<Position>(entity).unwrap(), &Position { x: 1.0, y: 2.0 });
        world.get_mut::<Velocity>(entity).unwrap().y = 3.0;
        assert_eq!(world.get::<Velocity>(entity).unwrap().y, 3.0);
        assert_eq!(world.entity_count(), 1);
        world.validate().unwrap();
    }

    #[test]
    fn test_despawn_recycles_with_new_version() {
        let mut world = World::new();
        let first = world.spawn().unwrap();
        world.despawn(first).unwrap();
        assert!(!world.is_alive(first));
        assert!(matches!(world.despawn(first), Err(EcsError::EntityNotAlive(_))));

        let second = world.spawn().unwrap();
        assert_eq!(second.id(), first.id());
        assert_eq!(second.version(), first.version() + 1);
    }

    #[test]
    fn test_flush_runs_spawn_before_add_child() {
        let mut world = World::new();
        let parent = world.spawn().unwrap();
        let commands = world.commands();
        let child = commands.spawn_empty();
        commands.add_child(parent, child);
        commands.add_component(child, Position { x: 4.0, y: 4.0 });

        assert_eq!(world.flush().unwrap(), 3);
        assert_eq!(world.parent(child), Some(parent));
        assert_eq!(world.children(parent), &[child]);
        assert_eq!(world.get::<Position>(child).unwrap().x, 4.0);
        assert!(world.has::<Parent>(child).unwrap());
    }

    #[test]
    fn test_flush_stops_at_first_error() {
        let mut world = World::new();
        let ghost = Entity::new(99, 0);
        world.commands().despawn(ghost);
        assert!(matches!(world.flush(), Err(EcsError::EntityNotAlive(e)) if e == ghost));
        assert!(world.commands().is_empty());
    }

    #[test]
    fn test_failed_flush_drops_later_tiers() {
        let mut world = World::new();
        let keeper = world.spawn().unwrap();
        let ghost = Entity::new(99, 0);
        let commands = world.commands();
        let spawned = commands.spawn((Position::default(),));
        commands.add_component(ghost, Velocity::default());
        commands.despawn(keeper);

        assert!(matches!(world.flush(), Err(EcsError::EntityNotAlive(e)) if e == ghost));
        assert!(world.is_alive(spawned));
        assert!(world.is_alive(keeper));
        assert_eq!(world.allocator().free_count(), 0);
    }

    #[test]
    fn test_failed_flush_frees_reserved_spawns() {
        let mut world = World::new();
        let parent = world.spawn().unwrap();
        let commands = world.commands();
        let linked = commands.spawn((Parent(parent),));
        let dropped = commands.spawn((Position::default(),));
        commands.despawn(parent);

        assert!(matches!(world.flush(), Err(EcsError::InvalidHierarchy(_))));
        assert!(!world.is_alive(linked));
        assert!(!world.is_alive(dropped));
        assert!(world.is_alive(parent));
        assert_eq!(world.allocator().free_count(), 2);
        assert!(world.commands().is_empty());

        let reused = world.spawn().unwrap();
        assert_eq!(reused.id(), linked.id());
        assert_eq!(reused.version(), linked.version() + 1);
    }

    #[test]
    fn test_parent_component_routes_through_hierarchy() {
        let mut world = World::new();
        let parent = world.spawn().unwrap();
        let child = world.spawn().unwrap();

        world.add_component(child, Parent(parent)).unwrap();
        assert_eq!(world.children(parent), &[child]);
        assert_eq!(world.remove_component::<Parent>(child).unwrap(), Parent(parent));
        assert_eq!(world.parent(child), None);
        assert!(world.children(parent).is_empty());

        world.commands().add_component(child, Parent(parent));
        world.flush().unwrap();
        assert_eq!(world.children(parent), &[child]);
        world.commands().remove_component::<Parent>(child);
        world.flush().unwrap();
        assert!(world.children(parent).is_empty());

        assert_eq!(world.despawn_recursive(parent).unwrap(), 1);
        assert!(world.is_alive(child));
        assert!(matches!(
            world.remove_component::<Parent>(child),
            Err(EcsError::ComponentMissing { .. })
        ));
    }

    #[test]
    fn test_unroutable_parent_writes_are_rejected() {
        let mut world = World::new();
        let parent = world.spawn().unwrap();
        let child = world.spawn().unwrap();
        world.add_child(parent, child).unwrap();

        assert!(matches!(world.get_mut::<Parent>(child), Err(EcsError::InvalidHierarchy(_))));
        assert!(matches!(world.spawn_bundle((Parent(parent),)), Err(EcsError::InvalidHierarchy(_))));
        assert!(matches!(
            world.insert_bundle(child, (Position::default(), Parent(child))),
            Err(EcsError::InvalidHierarchy(_))
        ));
        assert!(matches!(world.query::<Write<Parent>, ()>(), Err(EcsError::InvalidHierarchy(_))));
        assert_eq!(world.query::<Read<Parent>, ()>().unwrap().entity_count(&world), 1);
        assert_eq!(world.children(parent), &[child]);
        world.validate().unwrap();
    }

    #[test]
    fn test_sender_commands_join_next_flush() {
        let mut world = World::new();
        let sender = world.command_sender();
        let spawned = std::thread::spawn(move || sender.spawn((Position { x: 7.0, y: 0.0 },)))
            .join()
            .unwrap()
            .unwrap();

        assert!(!world.is_alive(spawned));
        world.flush().unwrap();
        assert_eq!(world.get::<Position>(spawned).unwrap().x, 7.0);
    }

    #[test]
    fn test_despawn_recursive_removes_subtree() {
        let mut world = World::new();
        let root = world.spawn().unwrap();
        let child = world.spawn().unwrap();
        let grandchild = world.spawn().unwrap();
        let bystander = world.spawn().unwrap();
        world.add_child(root, child).unwrap();
        world.add_child(child, grandchild).unwrap();

        assert_eq!(world.despawn_recursive(root).unwrap(), 3);
        assert!(!world.is_alive(grandchild));
        assert!(world.is_alive(bystander));
        world.validate().unwrap();
    }

    #[test]
    fn test_despawn_orphans_children() {
        let mut world = World::new();
        let parent = world.spawn().unwrap();
        let child = world.spawn().unwrap();
        world.add_child(parent, child).unwrap();
        world.despawn(parent).unwrap();
        assert!(world.is_alive(child));
        assert_eq!(world.parent(child), None);
    }

    #[test]
    fn test_resources() {
        let mut world = World::new();
        world.insert_resource(0.016_f32);
        *world.resource_mut::<f32>().unwrap() *= 2.0;
        assert_eq!(*world.resource::<f32>().unwrap(), 0.032);
        assert!(matches!(world.resource::<u64>(), Err(EcsError::ResourceMissing(_))));
        assert_eq!(world.remove_resource::<f32>(), Some(0.032));
        assert!(!world.contains_resource::<f32>());
    }

    #[test]
    fn test_query_through_world() {
        let mut world = World::new();
        for i in 0..10 {
            world
                .spawn_bundle((Position { x: i as f32, y: 0.0 }, Velocity { x: 1.0, y: 1.0 }))
                .unwrap();
        }
        let query = world.query::<(Write<Position>, Read<Velocity>), ()>().unwrap();
        query.for_each(&mut world, |_, (position, velocity)| {
            position.x += velocity.x;
        });
        let sum: f32 = query.entities(&world).iter().map(|&e| world.get::<Position>(e).unwrap().x).sum();
        assert_eq!(sum, 55.0);
    }

    #[test]
    fn test_removed_value_visible_one_tick() {
        let mut world = World::new();
        let entity = world.spawn_bundle((Position { x: 3.0, y: 1.0 },)).unwrap();
        world.remove_component::<Position>(entity).unwrap();

        assert!(world.was_removed::<Position>(entity));
        assert_eq!(world.removed::<Position>(), vec![entity]);
        world.tick();
        assert_eq!(world.removed_value::<Position>(entity), Some(Position { x: 3.0, y: 1.0 }));
        world.tick();
        assert!(!world.was_removed::<Position>(entity));
    }

    #[test]
    fn test_with_config_rejects_zero_chunks() {
        let config = WorldConfig {
            chunk_bytes: 0,
            ..WorldConfig::default()
        };
        assert!(matches!(World::with_config(&config), Err(EcsError::InvalidConfig(_))));
    }
}
