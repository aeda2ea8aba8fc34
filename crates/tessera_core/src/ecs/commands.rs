//! # Commands
//!
//! Deferred structural edits. Commands are plain values buffered per kind and
//! applied at a flush, highest priority tier first:
//!
//! | Kind            | Priority |
//! |-----------------|----------|
//! | spawn           | 100      |
//! | add component   | 90       |
//! | hierarchy link  | 20       |
//! | despawn         | 0        |
//! | remove component| 0        |
//! | custom          | 0        |
//!
//! Within one tier commands keep their enqueue order, even across kinds.
//! Spawned entities are reserved from the shared allocator when the command
//! is recorded, so later commands in the same batch can name them.

use std::any::{type_name, TypeId};
use std::sync::Arc;

use crossbeam_channel::Sender;

use crate::ecs::allocator::EntityAllocator;
use crate::ecs::bundle::{Bundle, ErasedComponent};
use crate::ecs::{Component, Entity, World};
use crate::error::{EcsError, EcsResult};

/// Deferred closure run against the world.
pub type CustomCommand = Box<dyn FnOnce(&mut World) -> EcsResult<()> + Send>;

/// One deferred edit.
pub enum Command {
    /// Places a reserved entity with its components.
    Spawn {
        /// Reserved handle.
        entity: Entity,
        /// Initial components.
        components: Vec<ErasedComponent>,
    },
    /// Adds or overwrites one component.
    AddComponent {
        /// Target entity.
        entity: Entity,
        /// Value to store.
        component: ErasedComponent,
    },
    /// Links `child` under `parent`.
    AddChild {
        /// New parent.
        parent: Entity,
        /// Linked child.
        child: Entity,
    },
    /// Unlinks `child` from `parent`.
    RemoveChild {
        /// Current parent.
        parent: Entity,
        /// Unlinked child.
        child: Entity,
    },
    /// Removes an entity.
    Despawn(Entity),
    /// Removes an entity and all its descendants.
    DespawnRecursive(Entity),
    /// Detaches one component.
    RemoveComponent {
        /// Target entity.
        entity: Entity,
        /// Type of the detached component.
        type_id: TypeId,
        /// Type name, for errors.
        name: &'static str,
    },
    /// Arbitrary world access.
    Custom(CustomCommand),
}

/// Buffer a command is sorted into.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum CommandKind {
    /// Entity creation.
    Spawn,
    /// Component insertion.
    AddComponent,
    /// Parent/child edits.
    Hierarchy,
    /// Entity removal.
    Despawn,
    /// Component removal.
    RemoveComponent,
    /// User closures.
    Custom,
}

impl CommandKind {
    /// Every kind, in buffer order.
    pub const ALL: [Self; 6] = [
        Self::Spawn,
        Self::AddComponent,
        Self::Hierarchy,
        Self::Despawn,
        Self::RemoveComponent,
        Self::Custom,
    ];

    /// Flush priority; higher runs first.
    #[must_use]
    pub const fn priority(self) -> u8 {
        match self {
            Self::Spawn => 100,
            Self::AddComponent => 90,
            Self::Hierarchy => 20,
            Self::Despawn | Self::RemoveComponent | Self::Custom => 0,
        }
    }

    const fn buffer(self) -> usize {
        self as usize
    }
}

impl Command {
    /// Kind of this command.
    #[must_use]
    pub const fn kind(&self) -> CommandKind {
        match self {
            Self::Spawn { .. } => CommandKind::Spawn,
            Self::AddComponent { .. } => CommandKind::AddComponent,
            Self::AddChild { .. } | Self::RemoveChild { .. } => CommandKind::Hierarchy,
            Self::Despawn(_) | Self::DespawnRecursive(_) => CommandKind::Despawn,
            Self::RemoveComponent { .. } => CommandKind::RemoveComponent,
            Self::Custom(_) => CommandKind::Custom,
        }
    }

    /// Entity reserved by a spawn; `None` for every other kind.
    #[must_use]
    pub const fn reserved_entity(&self) -> Option<Entity> {
        match self {
            Self::Spawn { entity, .. } => Some(*entity),
            _ => None,
        }
    }

    /// Applies this command to `world`.
    ///
    /// # Errors
    ///
    /// Propagates the failure of the underlying world operation.
    pub fn apply(self, world: &mut World) -> EcsResult<()> {
        match self {
            Self::Spawn { entity, components } => world.spawn_erased(entity, &components),
            Self::AddComponent { entity, component } => world.add_erased(entity, &component),
            Self::AddChild { parent, child } => world.add_child(parent, child),
            Self::RemoveChild { parent, child } => world.remove_child(parent, child).map(|_| ()),
            Self::Despawn(entity) => world.despawn(entity),
            Self::DespawnRecursive(entity) => world.despawn_recursive(entity).map(|_| ()),
            Self::RemoveComponent { entity, type_id, name } => world.remove_by_type(entity, type_id, name),
            Self::Custom(f) => f(world),
        }
    }
}

impl std::fmt::Debug for Command {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Spawn { entity, components } => f
                .debug_struct("Spawn")
                .field("entity", entity)
                .field("components", &components.len())
                .finish(),
            Self::AddComponent { entity, component } => f
                .debug_struct("AddComponent")
                .field("entity", entity)
                .field("component", &component.name())
                .finish(),
            Self::AddChild { parent, child } => f
                .debug_struct("AddChild")
                .field("parent", parent)
                .field("child", child)
                .finish(),
            Self::RemoveChild { parent, child } => f
                .debug_struct("RemoveChild")
                .field("parent", parent)
                .field("child", child)
                .finish(),
            Self::Despawn(entity) => f.debug_tuple("Despawn").field(entity).finish(),
            Self::DespawnRecursive(entity) => f.debug_tuple("DespawnRecursive").field(entity).finish(),
            Self::RemoveComponent { entity, name, .. } => f
                .debug_struct("RemoveComponent")
                .field("entity", entity)
                .field("component", name)
                .finish(),
            Self::Custom(_) => f.write_str("Custom"),
        }
    }
}

/// Per-kind command buffers with a shared enqueue sequence.
#[derive(Debug, Default)]
pub struct CommandQueue {
    buffers: [Vec<(u64, Command)>; 6],
    next_seq: u64,
}

impl CommandQueue {
    /// Buffers `command`.
    pub fn push(&mut self, command: Command) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.buffers[command.kind().buffer()].push((seq, command));
    }

    /// Number of buffered commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.buffers.iter().map(Vec::len).sum()
    }

    /// True when nothing is buffered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.buffers.iter().all(Vec::is_empty)
    }

    /// Buffered commands of one kind.
    #[must_use]
    pub fn count(&self, kind: CommandKind) -> usize {
        self.buffers[kind.buffer()].len()
    }

    /// Moves every command of `other` to the back of this queue, keeping
    /// their relative enqueue order.
    pub fn append(&mut self, other: &mut Self) {
        let mut moved: Vec<(u64, Command)> = other.buffers.iter_mut().flat_map(|buffer| buffer.drain(..)).collect();
        moved.sort_by_key(|(seq, _)| *seq);
        for (_, command) in moved {
            self.push(command);
        }
    }

    /// Empties the buffers into flush order: descending priority, then
    /// enqueue order. Buffer capacity is kept.
    pub fn drain_ordered(&mut self) -> Vec<Command> {
        let mut ordered = Vec::with_capacity(self.len());
        let mut tiers: Vec<u8> = CommandKind::ALL.iter().map(|kind| kind.priority()).collect();
        tiers.sort_unstable_by(|a, b| b.cmp(a));
        tiers.dedup();

        let mut tier = Vec::new();
        for priority in tiers {
            for kind in CommandKind::ALL {
                if kind.priority() == priority {
                    tier.extend(self.buffers[kind.buffer()].drain(..));
                }
            }
            tier.sort_by_key(|(seq, _)| *seq);
            ordered.extend(tier.drain(..).map(|(_, command)| command));
        }
        self.next_seq = 0;
        ordered
    }

    /// Drops every buffered command, keeping capacity. Returns the entities
    /// the dropped spawns had reserved; the owner must free them.
    #[must_use]
    pub fn clear(&mut self) -> Vec<Entity> {
        let reserved = self.buffers[CommandKind::Spawn.buffer()]
            .iter()
            .filter_map(|(_, command)| command.reserved_entity())
            .collect();
        for buffer in &mut self.buffers {
            buffer.clear();
        }
        self.next_seq = 0;
        reserved
    }
}

/// Records deferred edits. Spawns reserve their entity immediately.
pub struct Commands {
    queue: CommandQueue,
    allocator: Arc<EntityAllocator>,
}

impl Commands {
    /// Creates an empty recorder reserving entities from `allocator`.
    #[must_use]
    pub fn new(allocator: Arc<EntityAllocator>) -> Self {
        Self {
            queue: CommandQueue::default(),
            allocator,
        }
    }

    /// Reserves an entity and records spawning it with `bundle`.
    pub fn spawn<B: Bundle>(&mut self, bundle: B) -> Entity {
        let entity = self.allocator.allocate();
        let mut components = Vec::with_capacity(B::LEN);
        bundle.into_erased(&mut components);
        self.queue.push(Command::Spawn { entity, components });
        entity
    }

    /// Reserves an entity and records spawning it without components.
    pub fn spawn_empty(&mut self) -> Entity {
        let entity = self.allocator.allocate();
        self.queue.push(Command::Spawn {
            entity,
            components: Vec::new(),
        });
        entity
    }

    /// Records adding `value` to `entity`.
    pub fn add_component<C: Component>(&mut self, entity: Entity, value: C) {
        self.queue.push(Command::AddComponent {
            entity,
            component: ErasedComponent::new(value),
        });
    }

    /// Records adding every member of `bundle` to `entity`.
    pub fn insert<B: Bundle>(&mut self, entity: Entity, bundle: B) {
        let mut components = Vec::with_capacity(B::LEN);
        bundle.into_erased(&mut components);
        for component in components {
            self.queue.push(Command::AddComponent { entity, component });
        }
    }

    /// Records removing `C` from `entity`.
    pub fn remove_component<C: Component>(&mut self, entity: Entity) {
        self.queue.push(Command::RemoveComponent {
            entity,
            type_id: TypeId::of::<C>(),
            name: type_name::<C>(),
        });
    }

    /// Records despawning `entity`.
    pub fn despawn(&mut self, entity: Entity) {
        self.queue.push(Command::Despawn(entity));
    }

    /// Records despawning `entity` and its descendants.
    pub fn despawn_recursive(&mut self, entity: Entity) {
        self.queue.push(Command::DespawnRecursive(entity));
    }

    /// Records linking `child` under `parent`.
    pub fn add_child(&mut self, parent: Entity, child: Entity) {
        self.queue.push(Command::AddChild { parent, child });
    }

    /// Records unlinking `child` from `parent`.
    pub fn remove_child(&mut self, parent: Entity, child: Entity) {
        self.queue.push(Command::RemoveChild { parent, child });
    }

    /// Records a closure run with exclusive world access.
    pub fn add<F>(&mut self, f: F)
    where
        F: FnOnce(&mut World) -> EcsResult<()> + Send + 'static,
    {
        self.queue.push(Command::Custom(Box::new(f)));
    }

    /// Records a prebuilt command.
    pub fn push(&mut self, command: Command) {
        self.queue.push(command);
    }

    /// Number of recorded commands.
    #[must_use]
    pub fn len(&self) -> usize {
        self.queue.len()
    }

    /// True when nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// Discards every recorded command and frees the entities reserved by
    /// discarded spawns.
    pub fn clear(&mut self) {
        let reserved = self.queue.clear();
        if !reserved.is_empty() {
            tracing::debug!(count = reserved.len(), "freeing entities of discarded spawns");
        }
        for entity in reserved {
            self.allocator.free(entity);
        }
    }

    /// Recorded commands.
    #[must_use]
    pub fn queue(&self) -> &CommandQueue {
        &self.queue
    }

    pub(crate) fn queue_mut(&mut self) -> &mut CommandQueue {
        &mut self.queue
    }
}

impl std::fmt::Debug for Commands {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Commands")
            .field("len", &self.queue.len())
            .finish()
    }
}

/// Cloneable command producer for threads outside the frame loop.
///
/// Commands travel over a channel and join the world's queue at its next
/// flush.
#[derive(Clone)]
pub struct CommandSender {
    sender: Sender<Command>,
    allocator: Arc<EntityAllocator>,
}

impl CommandSender {
    pub(crate) fn new(sender: Sender<Command>, allocator: Arc<EntityAllocator>) -> Self {
        Self { sender, allocator }
    }

    /// Sends a prebuilt command.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::CommandChannelClosed`] once the world is dropped.
    pub fn send(&self, command: Command) -> EcsResult<()> {
        self.sender
            .send(command)
            .map_err(|_| EcsError::CommandChannelClosed)
    }

    /// Reserves an entity and sends its spawn.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityCapacity`] once ids are exhausted and
    /// [`EcsError::CommandChannelClosed`] once the world is dropped; in the
    /// latter case the reserved id is returned to the allocator.
    pub fn spawn<B: Bundle>(&self, bundle: B) -> EcsResult<Entity> {
        let entity = self.allocator.try_allocate()?;
        let mut components = Vec::with_capacity(B::LEN);
        bundle.into_erased(&mut components);
        self.send(Command::Spawn { entity, components }).map_err(|err| {
            self.allocator.free(entity);
            err
        })?;
        Ok(entity)
    }

    /// Sends adding `value` to `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::CommandChannelClosed`] once the world is dropped.
    pub fn add_component<C: Component>(&self, entity: Entity, value: C) -> EcsResult<()> {
        self.send(Command::AddComponent {
            entity,
            component: ErasedComponent::new(value),
        })
    }

    /// Sends removing `C` from `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::CommandChannelClosed`] once the world is dropped.
    pub fn remove_component<C: Component>(&self, entity: Entity) -> EcsResult<()> {
        self.send(Command::RemoveComponent {
            entity,
            type_id: TypeId::of::<C>(),
            name: type_name::<C>(),
        })
    }

    /// Sends despawning `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::CommandChannelClosed`] once the world is dropped.
    pub fn despawn(&self, entity: Entity) -> EcsResult<()> {
        self.send(Command::Despawn(entity))
    }
}

impl std::fmt::Debug for CommandSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandSender")
            .field("pending", &self.sender.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::{Pod, Zeroable};

    #[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Tag(u8);
    impl Component for Tag {}

    fn despawn_of(command: &Command) -> Option<i32> {
        match command {
            Command::Despawn(entity) => Some(entity.id()),
            _ => None,
        }
    }

    #[test]
    fn test_priorities() {
        assert_eq!(CommandKind::Spawn.priority(), 100);
        assert_eq!(CommandKind::AddComponent.priority(), 90);
        assert_eq!(CommandKind::Hierarchy.priority(), 20);
        assert_eq!(CommandKind::Despawn.priority(), 0);
        assert_eq!(CommandKind::RemoveComponent.priority(), 0);
        assert_eq!(CommandKind::Custom.priority(), 0);
    }

    #[test]
    fn test_drain_orders_by_tier_then_enqueue() {
        let mut queue = CommandQueue::default();
        queue.push(Command::Despawn(Entity::new(1, 0)));
        queue.push(Command::AddChild {
            parent: Entity::new(2, 0),
            child: Entity::new(3, 0),
        });
        queue.push(Command::Custom(Box::new(|_| Ok(()))));
        queue.push(Command::Spawn {
            entity: Entity::new(4, 0),
            components: Vec::new(),
        });
        queue.push(Command::Despawn(Entity::new(5, 0)));

        let kinds: Vec<CommandKind> = queue.drain_ordered().iter().map(Command::kind).collect();
        assert_eq!(
            kinds,
            vec![
                CommandKind::Spawn,
                CommandKind::Hierarchy,
                CommandKind::Despawn,
                CommandKind::Custom,
                CommandKind::Despawn,
            ]
        );
        assert!(queue.is_empty());
    }

    #[test]
    fn test_same_kind_keeps_order() {
        let mut queue = CommandQueue::default();
        for id in 1..=4 {
            queue.push(Command::Despawn(Entity::new(id, 0)));
        }
        let ids: Vec<i32> = queue.drain_ordered().iter().filter_map(despawn_of).collect();
        assert_eq!(ids, vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_append_keeps_relative_order() {
        let mut first = CommandQueue::default();
        first.push(Command::Despawn(Entity::new(1, 0)));
        let mut second = CommandQueue::default();
        second.push(Command::Despawn(Entity::new(2, 0)));
        second.push(Command::Despawn(Entity::new(3, 0)));

        first.append(&mut second);
        assert!(second.is_empty());
        assert_eq!(first.count(CommandKind::Despawn), 3);
        let ids: Vec<i32> = first.drain_ordered().iter().filter_map(despawn_of).collect();
        assert_eq!(ids, vec![1, 2, 3]);
    }

    #[test]
    fn test_spawn_reserves_entity() {
        let allocator = Arc::new(EntityAllocator::default());
        let mut commands = Commands::new(Arc::clone(&allocator));
        let a = commands.spawn_empty();
        let b = commands.spawn_empty();
        assert_ne!(a, b);
        assert_eq!(commands.len(), 2);
        assert_eq!(allocator.high_water_mark(), 2);
    }

    #[test]
    fn test_clear_frees_reserved_spawns() {
        let allocator = Arc::new(EntityAllocator::default());
        let mut commands = Commands::new(Arc::clone(&allocator));
        let reserved = commands.spawn_empty();
        commands.despawn(reserved);

        commands.clear();
        assert!(commands.is_empty());
        assert_eq!(allocator.free_count(), 1);
        assert_eq!(allocator.allocate(), reserved.next_version());
    }

    #[test]
    fn test_sender_reports_closed_channel() {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let allocator = Arc::new(EntityAllocator::default());
        let sender = CommandSender::new(sender, Arc::clone(&allocator));
        drop(receiver);
        assert!(matches!(
            sender.despawn(Entity::new(1, 0)),
            Err(EcsError::CommandChannelClosed)
        ));
        assert!(sender.spawn((Tag(1),)).is_err());
        assert_eq!(allocator.free_count(), 1);
    }
}
