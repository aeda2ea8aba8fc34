//! # Component System
//!
//! Components are pure data containers with no behavior.
//! They must be plain old data so columns can be copied, snapshotted and
//! moved between archetypes as raw rows.
//!
//! Every component type gets a dense [`ComponentId`] from the
//! [`ComponentRegistry`] the first time it is registered. The registry is an
//! explicit object owned by the world's store, so two worlds never share ids.

use std::any::{type_name, TypeId};
use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

use crate::ecs::storage::{Column, ColumnStorage};
use crate::error::{EcsError, EcsResult};

/// Dense component identifier, assigned in registration order.
pub type ComponentId = u16;

/// Maximum number of component types a registry can hold.
pub const COMPONENT_CAP: usize = 256;

const SIGNATURE_WORDS: usize = COMPONENT_CAP / 64;

/// Marker trait for ECS components.
///
/// Components must be:
/// - `Copy` + `Pod`: bitwise copyable, no heap ownership
/// - `Zeroable`: fresh rows start zeroed
/// - `Send + Sync`: columns are shared with the scheduler
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
/// #[repr(C)]
/// struct Position {
///     x: f32,
///     y: f32,
/// }
///
/// impl Component for Position {}
/// ```
pub trait Component: Copy + Pod + Zeroable + Send + Sync + 'static {}

/// Registration metadata of a component type.
#[derive(Clone, Copy, Debug)]
pub struct ComponentInfo {
    /// Dense id.
    pub id: ComponentId,
    /// Size of one value in bytes.
    pub size: usize,
    /// Alignment of one value.
    pub align: usize,
    /// Rust type name, used in error messages.
    pub name: &'static str,
    /// Type identity.
    pub type_id: TypeId,
    /// Zobrist key folded into archetype ids. Never zero.
    pub zobrist: u64,
    pub(crate) new_column: fn(usize) -> Box<dyn ColumnStorage>,
}

impl ComponentInfo {
    /// Allocates a zeroed column with room for `capacity` rows.
    #[must_use]
    pub fn new_column(&self, capacity: usize) -> Box<dyn ColumnStorage> {
        (self.new_column)(capacity)
    }
}

fn column_factory<C: Component>(capacity: usize) -> Box<dyn ColumnStorage> {
    Box::new(Column::<C>::new(capacity))
}

/// Append-only component type registry.
pub struct ComponentRegistry {
    infos: Vec<ComponentInfo>,
    by_type: HashMap<TypeId, ComponentId>,
    keys: ChaCha8Rng,
}

impl ComponentRegistry {
    /// Creates an empty registry whose zobrist keys derive from `seed`.
    #[must_use]
    pub fn new(seed: u64) -> Self {
        Self {
            infos: Vec::new(),
            by_type: HashMap::new(),
            keys: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Registers `C`, or returns its existing info.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ComponentCapacity`] once [`COMPONENT_CAP`] types exist.
    pub fn register<C: Component>(&mut self) -> EcsResult<ComponentInfo> {
        let type_id = TypeId::of::<C>();
        if let Some(&id) = self.by_type.get(&type_id) {
            return Ok(self.infos[usize::from(id)]);
        }
        if self.infos.len() >= COMPONENT_CAP {
            return Err(EcsError::ComponentCapacity(COMPONENT_CAP));
        }

        let id = self.infos.len() as ComponentId;
        let info = ComponentInfo {
            id,
            size: std::mem::size_of::<C>(),
            align: std::mem::align_of::<C>(),
            name: type_name::<C>(),
            type_id,
            zobrist: self.next_key(),
            new_column: column_factory::<C>,
        };
        self.infos.push(info);
        self.by_type.insert(type_id, id);
        tracing::trace!(component = info.name, id, size = info.size, "registered component");
        Ok(info)
    }

    /// Makes the marker type `W` resolve to the info of `C`.
    ///
    /// Used for typed access wrappers that share a component's layout.
    ///
    /// # Errors
    ///
    /// Fails when `C` cannot be registered.
    pub fn register_wrapper<W: 'static, C: Component>(&mut self) -> EcsResult<ComponentInfo> {
        let info = self.register::<C>()?;
        self.by_type.insert(TypeId::of::<W>(), info.id);
        Ok(info)
    }

    /// Looks up metadata by id.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ComponentIdUnknown`] for ids never issued.
    pub fn info(&self, id: ComponentId) -> EcsResult<&ComponentInfo> {
        self.infos
            .get(usize::from(id))
            .ok_or(EcsError::ComponentIdUnknown(id))
    }

    /// Looks up metadata by type.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ComponentNotRegistered`] naming `C`.
    pub fn info_of<C: 'static>(&self) -> EcsResult<&ComponentInfo> {
        let id = self.id_of::<C>()?;
        self.info(id)
    }

    /// Dense id of `C`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ComponentNotRegistered`] naming `C`.
    pub fn id_of<C: 'static>(&self) -> EcsResult<ComponentId> {
        self.try_id_of::<C>()
            .ok_or(EcsError::ComponentNotRegistered(type_name::<C>()))
    }

    /// Dense id of `C`, if registered.
    #[inline]
    #[must_use]
    pub fn try_id_of<C: 'static>(&self) -> Option<ComponentId> {
        self.id_of_type(TypeId::of::<C>())
    }

    /// Dense id for a raw type id, if registered.
    #[inline]
    #[must_use]
    pub fn id_of_type(&self, type_id: TypeId) -> Option<ComponentId> {
        self.by_type.get(&type_id).copied()
    }

    /// Number of registered component types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.infos.len()
    }

    /// Returns true when nothing has been registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.infos.is_empty()
    }

    /// All registered infos in id order.
    pub fn iter(&self) -> impl Iterator<Item = &ComponentInfo> {
        self.infos.iter()
    }

    /// Archetype id of a component set: XOR of the members' zobrist keys.
    ///
    /// # Errors
    ///
    /// Fails on ids the registry never issued.
    pub fn archetype_id(&self, ids: &[ComponentId]) -> EcsResult<u64> {
        ids.iter()
            .try_fold(0_u64, |acc, &id| Ok(acc ^ self.info(id)?.zobrist))
    }

    fn next_key(&mut self) -> u64 {
        loop {
            let key = self.keys.next_u64();
            if key != 0 {
                return key;
            }
        }
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new(0)
    }
}

impl std::fmt::Debug for ComponentRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentRegistry")
            .field("components", &self.infos.len())
            .finish_non_exhaustive()
    }
}

/// Bitset over component ids.
///
/// Archetype matching (All/Any/None) reduces to word-wise bit tests.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct Signature {
    words: [u64; SIGNATURE_WORDS],
}

impl Signature {
    /// Empty signature.
    pub const EMPTY: Self = Self {
        words: [0; SIGNATURE_WORDS],
    };

    /// Builds a signature from a list of ids.
    #[must_use]
    pub fn from_ids(ids: &[ComponentId]) -> Self {
        let mut signature = Self::EMPTY;
        for &id in ids {
            signature.set(id);
        }
        signature
    }

    /// Adds `id` to the set.
    #[inline]
    pub fn set(&mut self, id: ComponentId) {
        let id = usize::from(id);
        self.words[id / 64] |= 1_u64 << (id % 64);
    }

    /// Removes `id` from the set.
    #[inline]
    pub fn clear(&mut self, id: ComponentId) {
        let id = usize::from(id);
        self.words[id / 64] &= !(1_u64 << (id % 64));
    }

    /// Tests membership.
    #[inline]
    #[must_use]
    pub fn has(&self, id: ComponentId) -> bool {
        let id = usize::from(id);
        self.words[id / 64] & (1_u64 << (id % 64)) != 0
    }

    /// True if every id in `other` is in `self`.
    #[inline]
    #[must_use]
    pub fn contains_all(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(mine, theirs)| mine & theirs == *theirs)
    }

    /// True if the two sets share at least one id.
    #[inline]
    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .any(|(mine, theirs)| mine & theirs != 0)
    }

    /// True when no id is set.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|&word| word == 0)
    }

    /// Number of ids in the set.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|word| word.count_ones() as usize).sum()
    }

    /// Iterates ids in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = ComponentId> + '_ {
        self.words.iter().enumerate().flat_map(|(index, &word)| {
            (0..64_usize)
                .filter(move |&bit| word & (1_u64 << bit) != 0)
                .map(move |bit| (index * 64 + bit) as ComponentId)
        })
    }
}
