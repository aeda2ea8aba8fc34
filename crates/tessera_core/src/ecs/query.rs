//! # Queries
//!
//! A query names the columns it reads and writes plus an optional filter:
//!
//! ```rust,ignore
//! let query = world.query::<(Write<Position>, Read<Velocity>), Without<Frozen>>()?;
//! query.for_each(&mut world, |_, (position, velocity)| {
//!     position.x += velocity.x;
//! });
//! ```
//!
//! Evaluation is layered:
//! 1. Archetype: All/Any/None bitset tests against the archetype signature.
//! 2. Chunk: Added/Changed/Removed stamps of the chunk.
//! 3. Row: per-row Added/Changed stamps, when row tracking is on.
//!
//! Matching chunks are walked as contiguous column slices. Construction
//! resolves every component to its id once; iteration never allocates.

use std::any::{type_name, TypeId};
use std::marker::PhantomData;
use std::ops::ControlFlow;

use crate::ecs::archetype::Archetype;
use crate::ecs::chunk::{Chunk, ChunkViewMut};
use crate::ecs::component::{Component, ComponentId, ComponentRegistry, Signature};
use crate::ecs::hierarchy::{is_parent, unmanaged_parent};
use crate::ecs::storage::{Column, ColumnStorage};
use crate::ecs::store::ArchetypeStore;
use crate::ecs::tracker::{ChangeBlock, ChangeKind, Generation, RowStamps};
use crate::ecs::{Entity, World};
use crate::error::{EcsError, EcsResult};
use crate::schedule::Dependencies;

/// Maximum number of data terms (and of change filters) in one query.
pub const MAX_QUERY_TERMS: usize = 8;

/// Ordered component terms of a query, with their access mode.
#[derive(Clone, Copy, Debug, Default)]
pub struct TermList {
    ids: [ComponentId; MAX_QUERY_TERMS],
    writes: [bool; MAX_QUERY_TERMS],
    len: usize,
}

impl TermList {
    /// Appends a term.
    ///
    /// # Errors
    ///
    /// Rejects a component named twice and lists longer than
    /// [`MAX_QUERY_TERMS`].
    pub fn push(&mut self, id: ComponentId, write: bool, name: &'static str) -> EcsResult<()> {
        if self.ids[..self.len].contains(&id) {
            return Err(EcsError::DuplicateQueryTerm(name));
        }
        if self.len == MAX_QUERY_TERMS {
            return Err(EcsError::TooManyQueryTerms(self.len + 1));
        }
        self.ids[self.len] = id;
        self.writes[self.len] = write;
        self.len += 1;
        Ok(())
    }

    /// Term ids in declaration order.
    #[must_use]
    pub fn ids(&self) -> &[ComponentId] {
        &self.ids[..self.len]
    }

    /// Number of terms.
    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    /// True for a query without data terms.
    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// One typed column access.
pub trait QueryTerm: 'static {
    /// Accessed component.
    type Component: Component;
    /// True for mutable access.
    const WRITE: bool;
}

/// Shared access to `C`.
pub struct Read<C>(PhantomData<fn() -> C>);

/// Exclusive access to `C`. Stamps visited rows Changed.
pub struct Write<C>(PhantomData<fn() -> C>);

impl<C: Component> QueryTerm for Read<C> {
    type Component = C;
    const WRITE: bool = false;
}

impl<C: Component> QueryTerm for Write<C> {
    type Component = C;
    const WRITE: bool = true;
}

/// Data fetched by a query: a term or a tuple of terms.
pub trait QueryData: 'static {
    /// Per-row item, e.g. `(&mut Position, &Velocity)`.
    type Item<'w>;
    /// Per-chunk column slices, e.g. `(&mut [Position], &[Velocity])`.
    type Columns<'w>;
    /// Row iterator over [`Self::Columns`].
    type Iter<'w>;

    /// Registers every term's component and records it in `terms`.
    ///
    /// # Errors
    ///
    /// Fails on duplicate terms, too many terms or a full registry.
    fn register(registry: &mut ComponentRegistry, terms: &mut TermList) -> EcsResult<()>;

    /// Takes this query's columns out of `slots`, starting at `cursor`.
    fn fetch<'w>(
        slots: &mut [Option<&'w mut dyn ColumnStorage>],
        cursor: &mut usize,
        len: usize,
    ) -> Option<Self::Columns<'w>>;

    /// Starts iterating rows.
    fn iter<'w>(columns: Self::Columns<'w>) -> Self::Iter<'w>;

    /// Next row item.
    fn next<'w>(iter: &mut Self::Iter<'w>) -> Option<Self::Item<'w>>;

    /// Item at one row.
    fn at<'w>(columns: Self::Columns<'w>, row: usize) -> Option<Self::Item<'w>>;

    /// Declares accessed component types for scheduling.
    fn dependencies(dependencies: &mut Dependencies);
}

impl<C: Component> QueryData for Read<C> {
    type Item<'w> = &'w C;
    type Columns<'w> = &'w [C];
    type Iter<'w> = std::slice::Iter<'w, C>;

    fn register(registry: &mut ComponentRegistry, terms: &mut TermList) -> EcsResult<()> {
        let info = registry.register::<C>()?;
        terms.push(info.id, false, info.name)
    }

    fn fetch<'w>(
        slots: &mut [Option<&'w mut dyn ColumnStorage>],
        cursor: &mut usize,
        len: usize,
    ) -> Option<Self::Columns<'w>> {
        let slot: &'w dyn ColumnStorage = slots.get_mut(*cursor)?.take()?;
        *cursor += 1;
        slot.as_any()
            .downcast_ref::<Column<C>>()
            .map(|column| column.as_slice(len))
    }

    fn iter<'w>(columns: Self::Columns<'w>) -> Self::Iter<'w> {
        columns.iter()
    }

    fn next<'w>(iter: &mut Self::Iter<'w>) -> Option<Self::Item<'w>> {
        iter.next()
    }

    fn at<'w>(columns: Self::Columns<'w>, row: usize) -> Option<Self::Item<'w>> {
        columns.get(row)
    }

    fn dependencies(dependencies: &mut Dependencies) {
        dependencies.read::<C>();
    }
}

impl<C: Component> QueryData for Write<C> {
    type Item<'w> = &'w mut C;
    type Columns<'w> = &'w mut [C];
    type Iter<'w> = std::slice::IterMut<'w, C>;

    fn register(registry: &mut ComponentRegistry, terms: &mut TermList) -> EcsResult<()> {
        if is_parent(TypeId::of::<C>()) {
            return Err(unmanaged_parent("a Write query"));
        }
        let info = registry.register::<C>()?;
        terms.push(info.id, true, info.name)
    }

    fn fetch<'w>(
        slots: &mut [Option<&'w mut dyn ColumnStorage>],
        cursor: &mut usize,
        len: usize,
    ) -> Option<Self::Columns<'w>> {
        let slot = slots.get_mut(*cursor)?.take()?;
        *cursor += 1;
        slot.as_any_mut()
            .downcast_mut::<Column<C>>()
            .map(|column| column.as_mut_slice(len))
    }

    fn iter<'w>(columns: Self::Columns<'w>) -> Self::Iter<'w> {
        columns.iter_mut()
    }

    fn next<'w>(iter: &mut Self::Iter<'w>) -> Option<Self::Item<'w>> {
        iter.next()
    }

    fn at<'w>(columns: Self::Columns<'w>, row: usize) -> Option<Self::Item<'w>> {
        columns.get_mut(row)
    }

    fn dependencies(dependencies: &mut Dependencies) {
        dependencies.write::<C>();
    }
}

impl QueryData for () {
    type Item<'w> = ();
    type Columns<'w> = ();
    type Iter<'w> = ();

    fn register(_: &mut ComponentRegistry, _: &mut TermList) -> EcsResult<()> {
        Ok(())
    }

    fn fetch<'w>(
        _: &mut [Option<&'w mut dyn ColumnStorage>],
        _: &mut usize,
        _: usize,
    ) -> Option<Self::Columns<'w>> {
        Some(())
    }

    fn iter<'w>(_: Self::Columns<'w>) -> Self::Iter<'w> {}

    fn next<'w>(_: &mut Self::Iter<'w>) -> Option<Self::Item<'w>> {
        Some(())
    }

    fn at<'w>(_: Self::Columns<'w>, _: usize) -> Option<Self::Item<'w>> {
        Some(())
    }

    fn dependencies(_: &mut Dependencies) {}
}

macro_rules! impl_query_data {
    ($($name:ident $index:tt),+) => {
        impl<$($name: QueryData),+> QueryData for ($($name,)+) {
            type Item<'w> = ($($name::Item<'w>,)+);
            type Columns<'w> = ($($name::Columns<'w>,)+);
            type Iter<'w> = ($($name::Iter<'w>,)+);

            fn register(registry: &mut ComponentRegistry, terms: &mut TermList) -> EcsResult<()> {
                $($name::register(registry, terms)?;)+
                Ok(())
            }

            fn fetch<'w>(
                slots: &mut [Option<&'w mut dyn ColumnStorage>],
                cursor: &mut usize,
                len: usize,
            ) -> Option<Self::Columns<'w>> {
                Some(($($name::fetch(slots, cursor, len)?,)+))
            }

            fn iter<'w>(columns: Self::Columns<'w>) -> Self::Iter<'w> {
                ($($name::iter(columns.$index),)+)
            }

            fn next<'w>(iter: &mut Self::Iter<'w>) -> Option<Self::Item<'w>> {
                Some(($($name::next(&mut iter.$index)?,)+))
            }

            fn at<'w>(columns: Self::Columns<'w>, row: usize) -> Option<Self::Item<'w>> {
                Some(($($name::at(columns.$index, row)?,)+))
            }

            fn dependencies(dependencies: &mut Dependencies) {
                $($name::dependencies(dependencies);)+
            }
        }
    };
}

impl_query_data!(A 0);
impl_query_data!(A 0, B 1);
impl_query_data!(A 0, B 1, C 2);
impl_query_data!(A 0, B 1, C 2, D 3);
impl_query_data!(A 0, B 1, C 2, D 3, E 4);
impl_query_data!(A 0, B 1, C 2, D 3, E 4, F 5);
impl_query_data!(A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_query_data!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);

#[derive(Clone, Copy, Debug)]
struct ChangeFilter {
    component: ComponentId,
    kind: ChangeKind,
}

/// Resolved filter: archetype bitsets plus chunk/row change filters.
#[derive(Clone, Copy, Debug)]
pub struct FilterState {
    all: Signature,
    any: Signature,
    none: Signature,
    changes: [Option<ChangeFilter>; MAX_QUERY_TERMS],
    change_len: usize,
}

impl Default for FilterState {
    fn default() -> Self {
        Self {
            all: Signature::EMPTY,
            any: Signature::EMPTY,
            none: Signature::EMPTY,
            changes: [None; MAX_QUERY_TERMS],
            change_len: 0,
        }
    }
}

impl FilterState {
    /// Requires `id` on matching archetypes.
    pub fn require(&mut self, id: ComponentId) {
        self.all.set(id);
    }

    /// Requires at least one of the `any` ids on matching archetypes.
    pub fn any_of(&mut self, id: ComponentId) {
        self.any.set(id);
    }

    /// Excludes archetypes carrying `id`.
    pub fn exclude(&mut self, id: ComponentId) {
        self.none.set(id);
    }

    /// Adds a chunk/row change filter; also requires the component.
    ///
    /// # Errors
    ///
    /// Fails past [`MAX_QUERY_TERMS`] change filters.
    pub fn track(&mut self, component: ComponentId, kind: ChangeKind) -> EcsResult<()> {
        if self.change_len == MAX_QUERY_TERMS {
            return Err(EcsError::TooManyQueryTerms(self.change_len + 1));
        }
        self.all.set(component);
        self.changes[self.change_len] = Some(ChangeFilter { component, kind });
        self.change_len += 1;
        Ok(())
    }

    fn change_filters(&self) -> impl Iterator<Item = ChangeFilter> + '_ {
        self.changes[..self.change_len].iter().flatten().copied()
    }

    fn has_row_filters(&self) -> bool {
        self.change_filters()
            .any(|filter| filter.kind != ChangeKind::Removed)
    }
}

/// Archetype/chunk filter of a query.
pub trait QueryFilter: 'static {
    /// Resolves the filter into `state`.
    ///
    /// # Errors
    ///
    /// Fails on a full registry or too many change filters.
    fn register(registry: &mut ComponentRegistry, state: &mut FilterState) -> EcsResult<()>;
}

/// Archetype must carry `C`.
pub struct With<C>(PhantomData<fn() -> C>);
/// Archetype must not carry `C`.
pub struct Without<C>(PhantomData<fn() -> C>);
/// Archetype must carry at least one member of the tuple `S`.
pub struct AnyOf<S>(PhantomData<fn() -> S>);
/// `C` was attached within the visibility window.
pub struct Added<C>(PhantomData<fn() -> C>);
/// `C` was written within the visibility window.
pub struct Changed<C>(PhantomData<fn() -> C>);
/// A row carrying `C` left the chunk within the visibility window.
pub struct Removed<C>(PhantomData<fn() -> C>);

impl QueryFilter for () {
    fn register(_: &mut ComponentRegistry, _: &mut FilterState) -> EcsResult<()> {
        Ok(())
    }
}

impl<C: Component> QueryFilter for With<C> {
    fn register(registry: &mut ComponentRegistry, state: &mut FilterState) -> EcsResult<()> {
        state.require(registry.register::<C>()?.id);
        Ok(())
    }
}

impl<C: Component> QueryFilter for Without<C> {
    fn register(registry: &mut ComponentRegistry, state: &mut FilterState) -> EcsResult<()> {
        state.exclude(registry.register::<C>()?.id);
        Ok(())
    }
}

impl<S: ComponentSet> QueryFilter for AnyOf<S> {
    fn register(registry: &mut ComponentRegistry, state: &mut FilterState) -> EcsResult<()> {
        S::register(registry, &mut state.any)
    }
}

impl<C: Component> QueryFilter for Added<C> {
    fn register(registry: &mut ComponentRegistry, state: &mut FilterState) -> EcsResult<()> {
        state.track(registry.register::<C>()?.id, ChangeKind::Added)
    }
}

impl<C: Component> QueryFilter for Changed<C> {
    fn register(registry: &mut ComponentRegistry, state: &mut FilterState) -> EcsResult<()> {
        state.track(registry.register::<C>()?.id, ChangeKind::Changed)
    }
}

impl<C: Component> QueryFilter for Removed<C> {
    fn register(registry: &mut ComponentRegistry, state: &mut FilterState) -> EcsResult<()> {
        state.track(registry.register::<C>()?.id, ChangeKind::Removed)
    }
}

/// Tuple of component types, used by [`AnyOf`].
pub trait ComponentSet: 'static {
    /// Registers every member and sets its bit.
    ///
    /// # Errors
    ///
    /// Fails on a full registry.
    fn register(registry: &mut ComponentRegistry, out: &mut Signature) -> EcsResult<()>;
}

macro_rules! impl_tuples {
    ($($name:ident),+) => {
        impl<$($name: Component),+> ComponentSet for ($($name,)+) {
            fn register(registry: &mut ComponentRegistry, out: &mut Signature) -> EcsResult<()> {
                $(out.set(registry.register::<$name>()?.id);)+
                Ok(())
            }
        }

        impl<$($name: QueryFilter),+> QueryFilter for ($($name,)+) {
            fn register(registry: &mut ComponentRegistry, state: &mut FilterState) -> EcsResult<()> {
                $($name::register(registry, state)?;)+
                Ok(())
            }
        }
    };
}

impl_tuples!(A);
impl_tuples!(A, B);
impl_tuples!(A, B, C);
impl_tuples!(A, B, C, D);
impl_tuples!(A, B, C, D, E);
impl_tuples!(A, B, C, D, E, F);
impl_tuples!(A, B, C, D, E, F, G);
impl_tuples!(A, B, C, D, E, F, G, H);

/// Column positions of the terms and change filters inside one archetype.
#[derive(Clone, Copy)]
struct ArchetypeColumns {
    terms: [usize; MAX_QUERY_TERMS],
    changes: [usize; MAX_QUERY_TERMS],
}

/// Typed, pre-resolved query.
///
/// Built against one world's registry; use it only with that world.
pub struct Query<D: QueryData, F: QueryFilter = ()> {
    terms: TermList,
    required: Signature,
    filter: FilterState,
    _marker: PhantomData<fn() -> (D, F)>,
}

impl<D: QueryData, F: QueryFilter> Query<D, F> {
    /// Resolves the query against `world`, registering unknown types.
    ///
    /// # Errors
    ///
    /// Fails on duplicate terms or more than [`MAX_QUERY_TERMS`] terms.
    pub fn new(world: &mut World) -> EcsResult<Self> {
        Self::with_registry(world.store_mut().registry_mut())
    }

    /// Resolves the query against a registry.
    ///
    /// # Errors
    ///
    /// Same as [`Self::new`].
    pub fn with_registry(registry: &mut ComponentRegistry) -> EcsResult<Self> {
        let mut terms = TermList::default();
        D::register(registry, &mut terms)?;
        let mut filter = FilterState::default();
        F::register(registry, &mut filter)?;

        let mut required = filter.all;
        for &id in terms.ids() {
            required.set(id);
        }
        Ok(Self {
            terms,
            required,
            filter,
            _marker: PhantomData,
        })
    }

    /// Resolved data terms.
    #[must_use]
    pub const fn terms(&self) -> &TermList {
        &self.terms
    }

    /// Archetype-level test: non-empty, All/Any/None satisfied.
    #[must_use]
    pub fn matches_archetype(&self, archetype: &Archetype) -> bool {
        let signature = archetype.signature();
        !archetype.is_empty()
            && signature.contains_all(&self.required)
            && (self.filter.any.is_empty() || signature.intersects(&self.filter.any))
            && !signature.intersects(&self.filter.none)
    }

    fn columns(&self, archetype: &Archetype) -> Option<ArchetypeColumns> {
        let mut columns = ArchetypeColumns {
            terms: [0; MAX_QUERY_TERMS],
            changes: [0; MAX_QUERY_TERMS],
        };
        for (slot, &id) in self.terms.ids().iter().enumerate() {
            columns.terms[slot] = archetype.column_index(id)?;
        }
        for (slot, filter) in self.filter.change_filters().enumerate() {
            columns.changes[slot] = archetype.column_index(filter.component)?;
        }
        Some(columns)
    }

    fn chunk_passes(&self, blocks: &[ChangeBlock], columns: &ArchetypeColumns, current: Generation) -> bool {
        self.filter
            .change_filters()
            .zip(columns.changes.iter())
            .all(|(filter, &col)| blocks.get(col).is_some_and(|block| block.check(filter.kind, current)))
    }

    fn row_passes(
        &self,
        rows: &[Box<[RowStamps]>],
        columns: &ArchetypeColumns,
        row: usize,
        current: Generation,
    ) -> bool {
        self.filter
            .change_filters()
            .zip(columns.changes.iter())
            .all(|(filter, &col)| {
                rows.get(col)
                    .and_then(|stamps| stamps.get(row))
                    .map_or(true, |stamp| stamp.check(filter.kind, current))
            })
    }

    fn stamp_chunk_writes(&self, blocks: &mut [ChangeBlock], columns: &ArchetypeColumns, current: Generation) {
        for slot in 0..self.terms.len {
            if self.terms.writes[slot] {
                if let Some(block) = blocks.get_mut(columns.terms[slot]) {
                    block.stamp(ChangeKind::Changed, current);
                }
            }
        }
    }

    fn stamp_row_writes(
        &self,
        rows: &mut [Box<[RowStamps]>],
        columns: &ArchetypeColumns,
        row: usize,
        current: Generation,
    ) {
        for slot in 0..self.terms.len {
            if self.terms.writes[slot] {
                if let Some(stamp) = rows.get_mut(columns.terms[slot]).and_then(|stamps| stamps.get_mut(row)) {
                    stamp.stamp(ChangeKind::Changed, current);
                }
            }
        }
    }

    fn visit<'w>(
        &self,
        store: &'w mut ArchetypeStore,
        mut f: impl FnMut(Entity, D::Item<'w>) -> ControlFlow<()>,
    ) {
        let current = store.generation();
        for archetype in store.archetypes_mut() {
            if !self.matches_archetype(archetype) {
                continue;
            }
            let Some(columns) = self.columns(archetype) else {
                continue;
            };
            for chunk in archetype.chunks_mut() {
                let ChunkViewMut {
                    entities,
                    changes,
                    rows,
                    columns: mut slots,
                } = chunk.view_mut(&columns.terms[..self.terms.len]);
                if !self.chunk_passes(changes, &columns, current) {
                    continue;
                }
                self.stamp_chunk_writes(changes, &columns, current);

                let mut cursor = 0;
                let Some(data) = D::fetch(&mut slots, &mut cursor, entities.len()) else {
                    continue;
                };
                let mut items = D::iter(data);
                for (row, &entity) in entities.iter().enumerate() {
                    let Some(item) = D::next(&mut items) else {
                        break;
                    };
                    if !self.row_passes(rows, &columns, row, current) {
                        continue;
                    }
                    self.stamp_row_writes(rows, &columns, row, current);
                    if f(entity, item).is_break() {
                        return;
                    }
                }
            }
        }
    }

    /// Calls `f` with every matching entity and its item.
    pub fn for_each<'w, Func>(&self, world: &'w mut World, mut f: Func)
    where
        Func: FnMut(Entity, D::Item<'w>),
    {
        self.visit(world.store_mut(), |entity, item| {
            f(entity, item);
            ControlFlow::Continue(())
        });
    }

    /// Calls `f` once per matching chunk with its entities and column slices.
    ///
    /// Only the archetype and chunk filters apply; row filters are left to
    /// the caller, who sees whole spans.
    pub fn for_each_chunk<'w, Func>(&self, world: &'w mut World, mut f: Func)
    where
        Func: FnMut(&'w [Entity], D::Columns<'w>),
    {
        let store = world.store_mut();
        let current = store.generation();
        for archetype in store.archetypes_mut() {
            if !self.matches_archetype(archetype) {
                continue;
            }
            let Some(columns) = self.columns(archetype) else {
                continue;
            };
            for chunk in archetype.chunks_mut() {
                let ChunkViewMut {
                    entities,
                    changes,
                    rows,
                    columns: mut slots,
                } = chunk.view_mut(&columns.terms[..self.terms.len]);
                if !self.chunk_passes(changes, &columns, current) {
                    continue;
                }
                self.stamp_chunk_writes(changes, &columns, current);
                for row in 0..entities.len() {
                    self.stamp_row_writes(rows, &columns, row, current);
                }

                let mut cursor = 0;
                if let Some(data) = D::fetch(&mut slots, &mut cursor, entities.len()) {
                    f(entities, data);
                }
            }
        }
    }

    /// First matching entity and item.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::QueryNoMatch`] when nothing matches.
    pub fn single<'w>(&self, world: &'w mut World) -> EcsResult<(Entity, D::Item<'w>)> {
        let mut found = None;
        self.visit(world.store_mut(), |entity, item| {
            found = Some((entity, item));
            ControlFlow::Break(())
        });
        found.ok_or(EcsError::QueryNoMatch(type_name::<D>()))
    }

    /// Item of one entity, resolved through the entity index.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::EntityNotAlive`] for dead handles and
    /// [`EcsError::QueryNoMatch`] if the entity does not satisfy the query.
    pub fn get<'w>(&self, world: &'w mut World, entity: Entity) -> EcsResult<D::Item<'w>> {
        let no_match = || EcsError::QueryNoMatch(type_name::<D>());
        let store = world.store_mut();
        let location = store.location(entity)?;
        let current = store.generation();

        let archetype = store
            .archetypes_mut()
            .get_mut(location.archetype)
            .ok_or_else(no_match)?;
        if !self.matches_archetype(archetype) {
            return Err(no_match());
        }
        let columns = self.columns(archetype).ok_or_else(no_match)?;
        let chunk = archetype.chunk_mut(location.chunk).ok_or_else(no_match)?;

        let ChunkViewMut {
            entities,
            changes,
            rows,
            columns: mut slots,
        } = chunk.view_mut(&columns.terms[..self.terms.len]);
        if !self.chunk_passes(changes, &columns, current)
            || !self.row_passes(rows, &columns, location.row, current)
        {
            return Err(no_match());
        }
        self.stamp_chunk_writes(changes, &columns, current);
        self.stamp_row_writes(rows, &columns, location.row, current);

        let mut cursor = 0;
        let data = D::fetch(&mut slots, &mut cursor, entities.len()).ok_or_else(no_match)?;
        D::at(data, location.row).ok_or_else(no_match)
    }

    fn row_stored_passes(&self, chunk: &Chunk, columns: &ArchetypeColumns, row: usize, current: Generation) -> bool {
        self.filter
            .change_filters()
            .zip(columns.changes.iter())
            .all(|(filter, &col)| {
                chunk
                    .row_stamps(col, row)
                    .map_or(true, |stamp| stamp.check(filter.kind, current))
            })
    }

    fn matching_chunks<'a>(
        &'a self,
        world: &'a World,
    ) -> impl Iterator<Item = (&'a Chunk, ArchetypeColumns)> + 'a {
        let current = world.store().generation();
        world
            .store()
            .archetypes()
            .iter()
            .filter(|archetype| self.matches_archetype(archetype))
            .filter_map(|archetype| Some((archetype, self.columns(archetype)?)))
            .flat_map(move |(archetype, columns)| {
                archetype.chunks().iter().filter_map(move |chunk| {
                    self.filter
                        .change_filters()
                        .zip(columns.changes.iter())
                        .all(|(filter, &col)| chunk.check_flag(col, filter.kind, current))
                        .then_some((chunk, columns))
                })
            })
    }

    /// Number of matching entities.
    #[must_use]
    pub fn entity_count(&self, world: &World) -> usize {
        let current = world.store().generation();
        self.matching_chunks(world)
            .map(|(chunk, columns)| {
                if self.filter.has_row_filters() {
                    (0..chunk.len())
                        .filter(|&row| self.row_stored_passes(chunk, &columns, row, current))
                        .count()
                } else {
                    chunk.len()
                }
            })
            .sum()
    }

    /// True when nothing matches.
    #[must_use]
    pub fn is_empty(&self, world: &World) -> bool {
        self.entity_count(world) == 0
    }

    /// Matching entities, in storage order.
    #[must_use]
    pub fn entities(&self, world: &World) -> Vec<Entity> {
        let current = world.store().generation();
        let mut out = Vec::new();
        for (chunk, columns) in self.matching_chunks(world) {
            if !self.filter.has_row_filters() {
                out.extend_from_slice(chunk.entities());
                continue;
            }
            for (row, &entity) in chunk.entities().iter().enumerate() {
                if self.row_stored_passes(chunk, &columns, row, current) {
                    out.push(entity);
                }
            }
        }
        out
    }
}

impl<D: QueryData, F: QueryFilter> std::fmt::Debug for Query<D, F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("data", &type_name::<D>())
            .field("filter", &type_name::<F>())
            .field("terms", &self.terms.ids())
            .finish()
    }
}
