//! # Bundles
//!
//! A bundle is a tuple of components spawned or inserted together, so the
//! entity moves once into its final archetype instead of once per component.
//! [`ErasedComponent`] is the value-typed form used by deferred commands.

use std::any::{type_name, TypeId};

use crate::ecs::chunk::Chunk;
use crate::ecs::component::{Component, ComponentId, ComponentInfo, ComponentRegistry};
use crate::ecs::tracker::{ChangeKind, Generation};
use crate::error::{EcsError, EcsResult};

/// Maximum number of components in one bundle.
pub const MAX_BUNDLE_SIZE: usize = 8;

/// Writes bundle members into one freshly placed row.
pub struct BundleWriter<'a> {
    pub(crate) registry: &'a ComponentRegistry,
    pub(crate) components: &'a [ComponentId],
    pub(crate) chunk: &'a mut Chunk,
    pub(crate) row: usize,
    pub(crate) generation: Generation,
    pub(crate) added: &'a [ComponentId],
}

impl BundleWriter<'_> {
    /// Stores `value` in its column and stamps it.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::Corrupted`] when the row's archetype has no
    /// column for `C`.
    pub fn put<C: Component>(&mut self, value: C) -> EcsResult<()> {
        let id = self.registry.id_of::<C>()?;
        let missing = || EcsError::Corrupted(format!("{} has no column in the bundle archetype", type_name::<C>()));
        let col = self.components.binary_search(&id).map_err(|_| missing())?;
        if !self.chunk.write(col, self.row, value) {
            return Err(missing());
        }
        if self.added.contains(&id) {
            self.chunk
                .set_flag(col, ChangeKind::Added, self.generation, Some(self.row));
        }
        self.chunk
            .set_flag(col, ChangeKind::Changed, self.generation, Some(self.row));
        Ok(())
    }
}

/// A group of components inserted together.
pub trait Bundle: Send + 'static {
    /// Number of members.
    const LEN: usize;

    /// Registers every member, writing ids to `out[..LEN]`.
    ///
    /// # Errors
    ///
    /// Fails when the registry is full.
    fn register(registry: &mut ComponentRegistry, out: &mut [ComponentId; MAX_BUNDLE_SIZE]) -> EcsResult<()>;

    /// Writes every member into the row behind `writer`.
    ///
    /// # Errors
    ///
    /// Fails if the row lacks a column for one of the members.
    fn write(self, writer: &mut BundleWriter<'_>) -> EcsResult<()>;

    /// Converts every member into an erased value.
    fn into_erased(self, out: &mut Vec<ErasedComponent>);

    /// True if one of the members has type id `type_id`.
    fn contains(type_id: TypeId) -> bool;
}

macro_rules! impl_bundle {
    ($len:expr; $($name:ident $index:tt),+) => {
        impl<$($name: Component),+> Bundle for ($($name,)+) {
            const LEN: usize = $len;

            fn register(
                registry: &mut ComponentRegistry,
                out: &mut [ComponentId; MAX_BUNDLE_SIZE],
            ) -> EcsResult<()> {
                $(out[$index] = registry.register::<$name>()?.id;)+
                Ok(())
            }

            fn write(self, writer: &mut BundleWriter<'_>) -> EcsResult<()> {
                $(writer.put(self.$index)?;)+
                Ok(())
            }

            fn into_erased(self, out: &mut Vec<ErasedComponent>) {
                $(out.push(ErasedComponent::new(self.$index));)+
            }

            fn contains(type_id: TypeId) -> bool {
                false $(|| TypeId::of::<$name>() == type_id)+
            }
        }
    };
}

impl_bundle!(1; A 0);
impl_bundle!(2; A 0, B 1);
impl_bundle!(3; A 0, B 1, C 2);
impl_bundle!(4; A 0, B 1, C 2, D 3);
impl_bundle!(5; A 0, B 1, C 2, D 3, E 4);
impl_bundle!(6; A 0, B 1, C 2, D 3, E 4, F 5);
impl_bundle!(7; A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_bundle!(8; A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);

/// A component value with its type erased: raw bytes plus the means to
/// register the type on the receiving world.
pub struct ErasedComponent {
    type_id: TypeId,
    name: &'static str,
    bytes: Vec<u8>,
    register: fn(&mut ComponentRegistry) -> EcsResult<ComponentInfo>,
}

fn register_component<C: Component>(registry: &mut ComponentRegistry) -> EcsResult<ComponentInfo> {
    registry.register::<C>()
}

impl ErasedComponent {
    /// Erases `value`.
    #[must_use]
    pub fn new<C: Component>(value: C) -> Self {
        Self {
            type_id: TypeId::of::<C>(),
            name: type_name::<C>(),
            bytes: bytemuck::bytes_of(&value).to_vec(),
            register: register_component::<C>,
        }
    }

    /// Type identity of the value.
    #[must_use]
    pub const fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Type name of the value.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    /// Raw bytes of the value.
    #[must_use]
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Same type, different payload.
    #[cfg(test)]
    pub(crate) fn with_bytes(mut self, bytes: Vec<u8>) -> Self {
        self.bytes = bytes;
        self
    }

    /// Registers the value's type and returns its info.
    ///
    /// # Errors
    ///
    /// Fails when the registry is full.
    pub fn register(&self, registry: &mut ComponentRegistry) -> EcsResult<ComponentInfo> {
        (self.register)(registry)
    }
}

impl std::fmt::Debug for ErasedComponent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ErasedComponent")
            .field("name", &self.name)
            .field("bytes", &self.bytes.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytemuck::{Pod, Zeroable};

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Armor(u16);
    impl Component for Armor {}

    #[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
    #[repr(C)]
    struct Stamina(f32);
    impl Component for Stamina {}

    #[test]
    fn test_register_tuple() {
        let mut registry = ComponentRegistry::default();
        let mut ids = [0; MAX_BUNDLE_SIZE];
        <(Stamina, Armor)>::register(&mut registry, &mut ids).unwrap();
        assert_eq!(<(Stamina, Armor)>::LEN, 2);
        assert_eq!(&ids[..2], &[0, 1]);
    }

    #[test]
    fn test_into_erased_keeps_bytes() {
        let mut erased = Vec::new();
        (Armor(7), Stamina(0.5)).into_erased(&mut erased);
        assert_eq!(erased.len(), 2);
        assert_eq!(erased[0].type_id(), TypeId::of::<Armor>());
        assert_eq!(erased[0].bytes(), &7_u16.to_ne_bytes());
        assert_eq!(erased[1].bytes(), bytemuck::bytes_of(&Stamina(0.5)));

        let mut registry = ComponentRegistry::default();
        let info = erased[1].register(&mut registry).unwrap();
        assert_eq!(info.size, 4);
        assert!(erased[1].name().contains("Stamina"));
    }
}
