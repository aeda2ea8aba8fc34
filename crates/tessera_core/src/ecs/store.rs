//! # Archetype Store
//!
//! Owns every archetype, the component registry, and the entity index that
//! maps an entity id to its `(archetype, chunk, row)`. All structural changes
//! go through here:
//!
//! ```text
//! add_component(e, C):    A ──(+C)──> A ^ key(C)
//! remove_component(e, C): A ──(-C)──> A ^ key(C)
//! ```
//!
//! Transitions are cached on the source archetype, so repeated moves along
//! the same edge skip the lookup. A move copies shared cells, backfills the
//! hole in the source, and patches the index of the entity that backfilled.

use std::any::{type_name, TypeId};
use std::collections::HashMap;
use std::sync::Arc;

use crate::config::WorldConfig;
use crate::ecs::allocator::{EntityAllocator, MAX_ENTITY_ID};
use crate::ecs::archetype::{Archetype, ArchetypeId};
use crate::ecs::bundle::{Bundle, BundleWriter, ErasedComponent, MAX_BUNDLE_SIZE};
use crate::ecs::chunk::Chunk;
use crate::ecs::component::{Component, ComponentId, ComponentRegistry};
use crate::ecs::entity::{EntityLocation, EntityRecord};
use crate::ecs::tracker::{ChangeKind, ChangeTracker, Generation, RemovedComponents};
use crate::ecs::Entity;
use crate::error::{EcsError, EcsResult};

/// Index of the archetype without components.
pub const EMPTY_ARCHETYPE: usize = 0;

/// Archetype storage plus entity index.
pub struct ArchetypeStore {
    registry: ComponentRegistry,
    allocator: Arc<EntityAllocator>,
    archetypes: Vec<Archetype>,
    lookup: HashMap<ArchetypeId, Vec<usize>>,
    bundle_edges: HashMap<(usize, TypeId), usize>,
    records: Vec<EntityRecord>,
    chunk_bytes: usize,
    row_tracking: bool,
    tracker: ChangeTracker,
    removed: RemovedComponents,
}

fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> Option<(&mut T, &mut T)> {
    if a == b || a >= items.len() || b >= items.len() {
        return None;
    }
    if a < b {
        let (left, right) = items.split_at_mut(b);
        Some((&mut left[a], &mut right[0]))
    } else {
        let (left, right) = items.split_at_mut(a);
        Some((&mut right[0], &mut left[b]))
    }
}

impl ArchetypeStore {
    /// Creates a store holding only the empty archetype.
    #[must_use]
    pub fn new(config: &WorldConfig) -> Self {
        let mut lookup = HashMap::new();
        lookup.insert(0, vec![EMPTY_ARCHETYPE]);
        let mut records = Vec::new();
        records.reserve(config.initial_entities + 1);

        let mut empty = Archetype::new(0, EMPTY_ARCHETYPE, Vec::new(), config.chunk_bytes, config.row_tracking);
        empty.preallocate(config.initial_entities);

        Self {
            registry: ComponentRegistry::new(config.zobrist_seed),
            allocator: Arc::new(EntityAllocator::with_capacity(config.initial_entities)),
            archetypes: vec![empty],
            lookup,
            bundle_edges: HashMap::new(),
            records,
            chunk_bytes: config.chunk_bytes,
            row_tracking: config.row_tracking,
            tracker: ChangeTracker::new(),
            removed: RemovedComponents::default(),
        }
    }

    /// Component registry.
    #[inline]
    #[must_use]
    pub fn registry(&self) -> &ComponentRegistry {
        &self.registry
    }

    /// Mutable component registry.
    #[inline]
    pub fn registry_mut(&mut self) -> &mut ComponentRegistry {
        &mut self.registry
    }

    /// Shared entity allocator.
    #[inline]
    #[must_use]
    pub fn allocator(&self) -> &Arc<EntityAllocator> {
        &self.allocator
    }

    /// Current change-tracking generation.
    #[inline]
    #[must_use]
    pub fn generation(&self) -> Generation {
        self.tracker.current()
    }

    /// True if chunks keep per-row stamps.
    #[inline]
    #[must_use]
    pub const fn row_tracking(&self) -> bool {
        self.row_tracking
    }

    /// Chunk byte budget.
    #[inline]
    #[must_use]
    pub const fn chunk_bytes(&self) -> usize {
        self.chunk_bytes
    }

    /// Removed-value trackers.
    #[inline]
    #[must_use]
    pub fn removed(&self) -> &RemovedComponents {
        &self.removed
    }

    /// All archetypes, the empty one first.
    #[inline]
    #[must_use]
    pub fn archetypes(&self) -> &[Archetype] {
        &self.archetypes
    }

    #[inline]
    pub(crate) fn archetypes_mut(&mut self) -> &mut [Archetype] {
        &mut self.archetypes
    }

    /// Archetype by index.
    #[inline]
    #[must_use]
    pub fn archetype(&self, index: usize) -> Option<&Archetype> {
        self.archetypes.get(index)
    }

    /// Number of archetypes, including the empty one.
    #[inline]
    #[must_use]
    pub fn archetype_count(&self) -> usize {
        self.archetypes.len()
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.archetypes.iter().map(Archetype::len).sum()
    }

    /// Registers `C`.
    ///
    /// # Errors
    ///
    /// Fails when the registry is full.
    pub fn register<C: Component>(&mut self) -> EcsResult<ComponentId> {
        Ok(self.registry.register::<C>()?.id)
    }

    /// Finds the archetype for a component set, creating it if needed.
    ///
    /// `ids` may be unsorted and contain duplicates.
    ///
    /// # Errors
    ///
    /// Fails on component ids the registry never issued.
    pub fn get_or_create_archetype(&mut self, ids: &[ComponentId]) -> EcsResult<usize> {
        let mut sorted = ids.to_vec();
        sorted.sort_unstable();
        sorted.dedup();

        let id = self.registry.archetype_id(&sorted)?;
        if let Some(index) = self.find_archetype(id, &sorted) {
            return Ok(index);
        }

        let infos = sorted
            .iter()
            .map(|&component| self.registry.info(component).copied())
            .collect::<EcsResult<Vec<_>>>()?;
        for info in &infos {
            self.removed.ensure(info);
        }

        let index = self.archetypes.len();
        tracing::debug!(
            archetype = index,
            id = %format_args!("{id:#018x}"),
            components = ?infos.iter().map(|info| info.name).collect::<Vec<_>>(),
            "created archetype"
        );
        self.archetypes.push(Archetype::new(
            id,
            index,
            infos,
            self.chunk_bytes,
            self.row_tracking,
        ));
        self.lookup.entry(id).or_default().push(index);
        Ok(index)
    }

    /// Archetype whose component set is exactly `sorted`.
    fn find_archetype(&self, id: ArchetypeId, sorted: &[ComponentId]) -> Option<usize> {
        self.lookup
            .get(&id)?
            .iter()
            .copied()
            .find(|&index| self.archetypes[index].components() == sorted)
    }

    /// Allocates an entity and stores it in the empty archetype.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityCapacity`] once ids are exhausted, or
    /// [`EcsError::Corrupted`] if the allocator hands out an id that is
    /// still stored.
    pub fn create_entity(&mut self) -> EcsResult<Entity> {
        let entity = self.allocator.try_allocate()?;
        self.insert_entity(entity)?;
        Ok(entity)
    }

    /// Stores an entity reserved through the allocator in the empty archetype.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityCapacity`] for null handles, which an
    /// exhausted allocator reserves, and [`EcsError::Corrupted`] if the id
    /// is already stored.
    pub fn insert_entity(&mut self, entity: Entity) -> EcsResult<()> {
        if entity.is_null() {
            return Err(EcsError::EntityCapacity(MAX_ENTITY_ID));
        }
        let slot = entity.slot();
        if slot >= self.records.len() {
            self.records.resize(slot + 1, EntityRecord::default());
        }
        if self.records[slot].location.is_some() {
            return Err(EcsError::Corrupted(format!("entity id {} is already stored", entity.id())));
        }

        let (chunk, row) = self.archetypes[EMPTY_ARCHETYPE].add_entity(entity);
        self.records[slot] = EntityRecord {
            version: entity.version(),
            location: Some(EntityLocation {
                archetype: EMPTY_ARCHETYPE,
                chunk,
                row,
            }),
        };
        Ok(())
    }

    /// True if `entity` is the handle currently stored for its id.
    #[must_use]
    pub fn is_alive(&self, entity: Entity) -> bool {
        self.location(entity).is_ok()
    }

    /// Where `entity` lives.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityNotAlive`] for null, stale or free handles.
    pub fn location(&self, entity: Entity) -> EcsResult<EntityLocation> {
        if entity.is_null() {
            return Err(EcsError::EntityNotAlive(entity));
        }
        match self.records.get(entity.slot()) {
            Some(record) if record.version == entity.version() => {
                record.location.ok_or(EcsError::EntityNotAlive(entity))
            }
            _ => Err(EcsError::EntityNotAlive(entity)),
        }
    }

    /// Archetype `entity` lives in.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityNotAlive`] for dead handles.
    pub fn archetype_of(&self, entity: Entity) -> EcsResult<&Archetype> {
        let location = self.location(entity)?;
        Ok(&self.archetypes[location.archetype])
    }

    /// Removes the entity, snapshots its components, and frees its id.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityNotAlive`] for dead handles.
    pub fn destroy_entity(&mut self, entity: Entity) -> EcsResult<()> {
        let location = self.location(entity)?;
        let generation = self.tracker.current();

        self.snapshot_row(entity, location, None, generation);

        let moved = self.archetypes[location.archetype].remove_entity(location.chunk, location.row);
        self.relocate(moved, location);
        self.records[entity.slot()].location = None;
        self.allocator.free(entity);
        Ok(())
    }

    /// Records removal snapshots and Removed stamps for a row, either for
    /// every column or just `only`.
    fn snapshot_row(
        &mut self,
        entity: Entity,
        location: EntityLocation,
        only: Option<usize>,
        generation: Generation,
    ) {
        let Some((ids, chunk)) = self.archetypes[location.archetype].writer_parts(location.chunk) else {
            return;
        };
        for (col, &id) in ids.iter().enumerate() {
            if only.is_some_and(|wanted| wanted != col) {
                continue;
            }
            self.removed
                .record(id, entity, chunk.cell_bytes(col, location.row), generation);
            chunk.set_flag(col, ChangeKind::Removed, generation, None);
        }
    }

    /// Points the record of an entity that backfilled a hole at `location`.
    fn relocate(&mut self, moved: Option<Entity>, location: EntityLocation) {
        if let Some(moved) = moved {
            if let Some(record) = self.records.get_mut(moved.slot()) {
                record.location = Some(location);
            }
        }
    }

    /// Moves a live entity to archetype `target`, returning its new location.
    fn move_to(&mut self, entity: Entity, location: EntityLocation, target: usize) -> EcsResult<EntityLocation> {
        if target == location.archetype {
            return Ok(location);
        }
        let (src, dst) = pair_mut(&mut self.archetypes, location.archetype, target)
            .ok_or_else(|| EcsError::Corrupted(format!("archetype {target} does not exist")))?;
        let ((chunk, row), moved) = src.move_entity(location.chunk, location.row, dst);
        self.relocate(moved, location);

        let new_location = EntityLocation {
            archetype: target,
            chunk,
            row,
        };
        self.records[entity.slot()].location = Some(new_location);
        Ok(new_location)
    }

    /// Archetype reached from `source` by adding `id`, via the edge cache.
    fn with_component(&mut self, source: usize, id: ComponentId) -> EcsResult<usize> {
        if let Some(target) = self.archetypes[source].add_edge(id) {
            return Ok(target);
        }
        let mut ids = self.archetypes[source].components().to_vec();
        ids.push(id);
        let target = self.get_or_create_archetype(&ids)?;
        self.archetypes[source].set_add_edge(id, target);
        self.archetypes[target].set_remove_edge(id, source);
        Ok(target)
    }

    /// Archetype reached from `source` by removing `id`, via the edge cache.
    fn without_component(&mut self, source: usize, id: ComponentId) -> EcsResult<usize> {
        if let Some(target) = self.archetypes[source].remove_edge(id) {
            return Ok(target);
        }
        let ids: Vec<ComponentId> = self.archetypes[source]
            .components()
            .iter()
            .copied()
            .filter(|&component| component != id)
            .collect();
        let target = self.get_or_create_archetype(&ids)?;
        self.archetypes[source].set_remove_edge(id, target);
        self.archetypes[target].set_add_edge(id, source);
        Ok(target)
    }

    /// Makes sure `entity` carries component `id`, moving it if needed.
    ///
    /// Returns the location and whether the component was newly attached.
    fn attach(&mut self, entity: Entity, id: ComponentId) -> EcsResult<(EntityLocation, bool)> {
        let location = self.location(entity)?;
        if self.archetypes[location.archetype].has(id) {
            return Ok((location, false));
        }
        let target = self.with_component(location.archetype, id)?;
        Ok((self.move_to(entity, location, target)?, true))
    }

    /// Stamps a freshly written cell.
    fn stamp_write(&mut self, location: EntityLocation, col: usize, added: bool) {
        let generation = self.tracker.current();
        if let Some(chunk) = self.archetypes[location.archetype].chunk_mut(location.chunk) {
            if added {
                chunk.set_flag(col, ChangeKind::Added, generation, Some(location.row));
            }
            chunk.set_flag(col, ChangeKind::Changed, generation, Some(location.row));
        }
    }

    fn chunk_at_mut(&mut self, location: EntityLocation) -> EcsResult<&mut Chunk> {
        self.archetypes[location.archetype]
            .chunk_mut(location.chunk)
            .ok_or_else(|| EcsError::Corrupted(format!("chunk {} missing", location.chunk)))
    }

    fn column_of(&self, location: EntityLocation, id: ComponentId) -> EcsResult<usize> {
        self.archetypes[location.archetype]
            .column_index(id)
            .ok_or_else(|| EcsError::Corrupted(format!("component {id} missing after attach")))
    }

    /// Adds `value` to `entity`, or overwrites it if already present.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityNotAlive`] for dead handles.
    pub fn add_component<C: Component>(&mut self, entity: Entity, value: C) -> EcsResult<()> {
        let id = self.register::<C>()?;
        let (location, added) = self.attach(entity, id)?;
        let col = self.column_of(location, id)?;
        if !self.chunk_at_mut(location)?.write(col, location.row, value) {
            return Err(EcsError::Corrupted(format!(
                "column {col} does not hold {}",
                type_name::<C>()
            )));
        }
        self.stamp_write(location, col, added);
        Ok(())
    }

    /// Adds an erased component value to `entity`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityNotAlive`] for dead handles.
    pub fn add_erased(&mut self, entity: Entity, component: &ErasedComponent) -> EcsResult<()> {
        let id = component.register(&mut self.registry)?.id;
        let (location, added) = self.attach(entity, id)?;
        let col = self.column_of(location, id)?;
        self.chunk_at_mut(location)?
            .write_cell_bytes(col, location.row, component.bytes())?;
        self.stamp_write(location, col, added);
        Ok(())
    }

    /// Detaches `C` from `entity` and returns its last value.
    ///
    /// The value is also kept in the removed tracker for one generation.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityNotAlive`] for dead handles,
    /// [`EcsError::ComponentNotRegistered`] for unknown types and
    /// [`EcsError::ComponentMissing`] when the entity lacks `C`.
    pub fn remove_component<C: Component>(&mut self, entity: Entity) -> EcsResult<C> {
        let value = *self.get::<C>(entity)?;
        let id = self.registry.id_of::<C>()?;
        self.detach(entity, id, type_name::<C>())?;
        Ok(value)
    }

    /// Detaches the component with type id `type_id` from `entity`.
    ///
    /// # Errors
    ///
    /// Same as [`Self::remove_component`].
    pub fn remove_by_type(&mut self, entity: Entity, type_id: TypeId, name: &'static str) -> EcsResult<()> {
        let id = self
            .registry
            .id_of_type(type_id)
            .ok_or(EcsError::ComponentNotRegistered(name))?;
        self.detach(entity, id, name)
    }

    fn detach(&mut self, entity: Entity, id: ComponentId, name: &'static str) -> EcsResult<()> {
        let location = self.location(entity)?;
        let col = self.archetypes[location.archetype]
            .column_index(id)
            .ok_or(EcsError::ComponentMissing {
                entity,
                component: name,
            })?;

        let generation = self.tracker.current();
        self.snapshot_row(entity, location, Some(col), generation);
        let target = self.without_component(location.archetype, id)?;
        self.move_to(entity, location, target)?;
        Ok(())
    }

    /// Shared reference to a component.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityNotAlive`], [`EcsError::ComponentNotRegistered`]
    /// or [`EcsError::ComponentMissing`].
    pub fn get<C: Component>(&self, entity: Entity) -> EcsResult<&C> {
        let location = self.location(entity)?;
        let id = self.registry.id_of::<C>()?;
        let archetype = &self.archetypes[location.archetype];
        archetype
            .column_index(id)
            .and_then(|col| archetype.chunk(location.chunk)?.column::<C>(col))
            .and_then(|column| column.get(location.row))
            .ok_or(EcsError::ComponentMissing {
                entity,
                component: type_name::<C>(),
            })
    }

    /// Mutable reference to a component. Stamps it Changed.
    ///
    /// # Errors
    ///
    /// Same as [`Self::get`].
    pub fn get_mut<C: Component>(&mut self, entity: Entity) -> EcsResult<&mut C> {
        let location = self.location(entity)?;
        let id = self.registry.id_of::<C>()?;
        let generation = self.tracker.current();
        let missing = EcsError::ComponentMissing {
            entity,
            component: type_name::<C>(),
        };

        let archetype = &mut self.archetypes[location.archetype];
        let Some(col) = archetype.column_index(id) else {
            return Err(missing);
        };
        let Some(chunk) = archetype.chunk_mut(location.chunk) else {
            return Err(missing);
        };
        chunk.set_flag(col, ChangeKind::Changed, generation, Some(location.row));
        chunk
            .column_mut::<C>(col)
            .and_then(|column| column.get_mut(location.row))
            .ok_or(missing)
    }

    /// True if `entity` carries `C`. Unregistered types are never carried.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityNotAlive`] for dead handles.
    pub fn has<C: Component>(&self, entity: Entity) -> EcsResult<bool> {
        let location = self.location(entity)?;
        Ok(self
            .registry
            .try_id_of::<C>()
            .is_some_and(|id| self.archetypes[location.archetype].has(id)))
    }

    /// Allocates an entity and places it directly in the bundle's archetype.
    ///
    /// # Errors
    ///
    /// Fails when the registry is full.
    pub fn spawn_bundle<B: Bundle>(&mut self, bundle: B) -> EcsResult<Entity> {
        let entity = self.create_entity()?;
        self.insert_bundle(entity, bundle)?;
        Ok(entity)
    }

    /// Adds every member of `bundle` to `entity` with a single move.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityNotAlive`] for dead handles.
    pub fn insert_bundle<B: Bundle>(&mut self, entity: Entity, bundle: B) -> EcsResult<()> {
        let mut ids = [0; MAX_BUNDLE_SIZE];
        B::register(&mut self.registry, &mut ids)?;
        let ids = &ids[..B::LEN];

        let location = self.location(entity)?;
        let source = location.archetype;
        let target = match self.bundle_edges.get(&(source, TypeId::of::<B>())) {
            Some(&target) => target,
            None => {
                let mut all = self.archetypes[source].components().to_vec();
                all.extend_from_slice(ids);
                let target = self.get_or_create_archetype(&all)?;
                self.bundle_edges.insert((source, TypeId::of::<B>()), target);
                target
            }
        };

        let mut added = [0; MAX_BUNDLE_SIZE];
        let mut added_len = 0;
        for &id in ids {
            if !self.archetypes[source].has(id) {
                added[added_len] = id;
                added_len += 1;
            }
        }

        let location = self.move_to(entity, location, target)?;
        let generation = self.tracker.current();
        let archetype = &mut self.archetypes[location.archetype];
        let (components, chunk) = archetype
            .writer_parts(location.chunk)
            .ok_or_else(|| EcsError::Corrupted(format!("chunk {} missing", location.chunk)))?;
        let mut writer = BundleWriter {
            registry: &self.registry,
            components,
            chunk,
            row: location.row,
            generation,
            added: &added[..added_len],
        };
        bundle.write(&mut writer)
    }

    /// Places a reserved entity with erased component values.
    ///
    /// # Errors
    ///
    /// Fails if the entity is already stored or the registry is full.
    pub fn spawn_erased(&mut self, entity: Entity, components: &[ErasedComponent]) -> EcsResult<()> {
        self.insert_entity(entity)?;
        let ids = components
            .iter()
            .map(|component| component.register(&mut self.registry).map(|info| info.id))
            .collect::<EcsResult<Vec<_>>>()?;

        let location = self.location(entity)?;
        let target = self.get_or_create_archetype(&ids)?;
        let location = self.move_to(entity, location, target)?;
        for (component, &id) in components.iter().zip(&ids) {
            let col = self.column_of(location, id)?;
            self.chunk_at_mut(location)?
                .write_cell_bytes(col, location.row, component.bytes())?;
            self.stamp_write(location, col, true);
        }
        Ok(())
    }

    /// True if `entity` lost `C` within the visibility window.
    #[must_use]
    pub fn was_removed<C: Component>(&self, entity: Entity) -> bool {
        self.registry
            .try_id_of::<C>()
            .and_then(|id| self.removed.get(id))
            .is_some_and(|tracker| tracker.was_removed(entity, self.generation()))
    }

    /// Last value of `C` on `entity`, if it was removed within the window.
    #[must_use]
    pub fn removed_value<C: Component>(&self, entity: Entity) -> Option<C> {
        let id = self.registry.try_id_of::<C>()?;
        self.removed
            .get(id)?
            .get_removed::<C>(entity, self.generation())
    }

    /// Entities that lost `C` within the visibility window.
    pub fn removed_entities<C: Component>(&self) -> impl Iterator<Item = Entity> + '_ {
        let generation = self.generation();
        self.registry
            .try_id_of::<C>()
            .and_then(|id| self.removed.get(id))
            .into_iter()
            .flat_map(move |tracker| tracker.iter(generation))
    }

    /// Advances the generation and purges expired removal snapshots.
    pub fn tick(&mut self) -> Generation {
        let generation = self.tracker.tick();
        self.removed.tick(generation);
        generation
    }

    /// Frees spare chunks in every archetype.
    pub fn optimize(&mut self) {
        for archetype in &mut self.archetypes {
            archetype.optimize();
        }
    }

    /// Checks index and density invariants.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::Corrupted`] describing the first violation.
    pub fn validate(&self) -> EcsResult<()> {
        let mut stored = 0;
        for (index, archetype) in self.archetypes.iter().enumerate() {
            let chunks = archetype.chunks();
            let rows: usize = chunks.iter().map(|chunk| chunk.len()).sum();
            if rows != archetype.len() {
                return Err(EcsError::Corrupted(format!(
                    "archetype {index} counts {} entities but its chunks hold {rows}",
                    archetype.len()
                )));
            }
            if let Some((_, full)) = chunks.split_last() {
                if let Some(position) = full.iter().position(|chunk| !chunk.is_full()) {
                    return Err(EcsError::Corrupted(format!(
                        "archetype {index} has a gap in chunk {position}"
                    )));
                }
            }

            for (chunk_index, chunk) in chunks.iter().enumerate() {
                for (row, &entity) in chunk.entities().iter().enumerate() {
                    let expected = EntityLocation {
                        archetype: index,
                        chunk: chunk_index,
                        row,
                    };
                    if self.location(entity).ok() != Some(expected) {
                        return Err(EcsError::Corrupted(format!(
                            "entity {entity} stored at {expected:?} but indexed elsewhere"
                        )));
                    }
                }
            }
            stored += rows;
        }

        let indexed = self
            .records
            .iter()
            .filter(|record| record.location.is_some())
            .count();
        if indexed != stored {
            return Err(EcsError::Corrupted(format!(
                "{indexed} entities indexed but {stored} stored"
            )));
        }
        Ok(())
    }
}

impl std::fmt::Debug for ArchetypeStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchetypeStore")
            .field("archetypes", &self.archetypes.len())
            .field("entities", &self.entity_count())
            .field("generation", &self.tracker.current())
            .finish_non_exhaustive()
    }
}
