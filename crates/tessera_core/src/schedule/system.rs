//! # Systems
//!
//! A system is a function over the world plus a parameter state:
//!
//! ```rust,ignore
//! let movement = system("movement", |world: &mut World, query: &mut Query<(Write<Position>, Read<Velocity>)>| {
//!     query.for_each(world, |_, (position, velocity)| position.x += velocity.x);
//! })
//! .after("input");
//! ```
//!
//! Parameters implement [`SystemParam`]: they resolve themselves from the
//! world the first time the system runs and declare the types they touch,
//! which the stage uses to batch systems that do not conflict.

use std::any::{type_name, TypeId};
use std::marker::PhantomData;
use std::sync::Arc;

use crate::ecs::query::{Query, QueryData, QueryFilter};
use crate::ecs::resources::Resource;
use crate::ecs::{Commands, World};
use crate::error::{EcsError, EcsResult};

/// Types a system reads and writes.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Dependencies {
    reads: Vec<TypeId>,
    writes: Vec<TypeId>,
    exclusive: bool,
}

impl Dependencies {
    /// Records shared access to `T`.
    pub fn read<T: 'static>(&mut self) {
        let id = TypeId::of::<T>();
        if !self.reads.contains(&id) {
            self.reads.push(id);
        }
    }

    /// Records exclusive access to `T`.
    pub fn write<T: 'static>(&mut self) {
        let id = TypeId::of::<T>();
        if !self.writes.contains(&id) {
            self.writes.push(id);
        }
    }

    /// Marks the system as touching the whole world.
    pub fn set_exclusive(&mut self) {
        self.exclusive = true;
    }

    /// True if the system touches the whole world.
    #[must_use]
    pub const fn is_exclusive(&self) -> bool {
        self.exclusive
    }

    /// Number of distinct types read or written.
    #[must_use]
    pub fn len(&self) -> usize {
        self.reads.len() + self.writes.iter().filter(|id| !self.reads.contains(id)).count()
    }

    /// True when nothing is declared.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.reads.is_empty() && self.writes.is_empty() && !self.exclusive
    }

    /// True if both systems declare any common type, read or written, or
    /// either side is exclusive.
    #[must_use]
    pub fn conflicts_with(&self, other: &Self) -> bool {
        if self.exclusive || other.exclusive {
            return true;
        }
        self.ids()
            .any(|id| other.reads.contains(id) || other.writes.contains(id))
    }

    fn ids(&self) -> impl Iterator<Item = &TypeId> {
        self.reads.iter().chain(&self.writes)
    }

    /// Adds every declaration of `other`.
    pub fn extend(&mut self, other: &Self) {
        for id in &other.reads {
            if !self.reads.contains(id) {
                self.reads.push(*id);
            }
        }
        for id in &other.writes {
            if !self.writes.contains(id) {
                self.writes.push(*id);
            }
        }
        self.exclusive |= other.exclusive;
    }
}

/// State a system receives next to the world.
pub trait SystemParam: Send + Sized + 'static {
    /// Resolves the parameter from the world.
    ///
    /// # Errors
    ///
    /// Fails when something the parameter needs is missing.
    fn init(world: &mut World) -> EcsResult<Self>;

    /// Declares accessed types.
    fn dependencies(dependencies: &mut Dependencies);

    /// Hands deferred work back to the world after the system ran.
    fn apply(&mut self, _world: &mut World) {}
}

impl<D: QueryData, F: QueryFilter> SystemParam for Query<D, F> {
    fn init(world: &mut World) -> EcsResult<Self> {
        Self::new(world)
    }

    fn dependencies(dependencies: &mut Dependencies) {
        D::dependencies(dependencies);
    }
}

impl SystemParam for Commands {
    fn init(world: &mut World) -> EcsResult<Self> {
        Ok(Self::new(Arc::clone(world.allocator())))
    }

    fn dependencies(_: &mut Dependencies) {}

    fn apply(&mut self, world: &mut World) {
        world.push_commands(self);
    }
}

/// Shared access to resource `R`.
pub struct Res<R>(PhantomData<fn() -> R>);

/// Exclusive access to resource `R`.
pub struct ResMut<R>(PhantomData<fn() -> R>);

impl<R: Resource> Res<R> {
    /// The resource.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ResourceMissing`] if it was removed since init.
    pub fn get<'w>(&self, world: &'w World) -> EcsResult<&'w R> {
        world.resource::<R>()
    }
}

impl<R: Resource> ResMut<R> {
    /// The resource, mutably.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::ResourceMissing`] if it was removed since init.
    pub fn get_mut<'w>(&self, world: &'w mut World) -> EcsResult<&'w mut R> {
        world.resource_mut::<R>()
    }
}

impl<R: Resource> SystemParam for Res<R> {
    fn init(world: &mut World) -> EcsResult<Self> {
        if !world.contains_resource::<R>() {
            return Err(EcsError::ResourceMissing(type_name::<R>()));
        }
        Ok(Self(PhantomData))
    }

    fn dependencies(dependencies: &mut Dependencies) {
        dependencies.read::<R>();
    }
}

impl<R: Resource> SystemParam for ResMut<R> {
    fn init(world: &mut World) -> EcsResult<Self> {
        if !world.contains_resource::<R>() {
            return Err(EcsError::ResourceMissing(type_name::<R>()));
        }
        Ok(Self(PhantomData))
    }

    fn dependencies(dependencies: &mut Dependencies) {
        dependencies.write::<R>();
    }
}

impl SystemParam for () {
    fn init(_: &mut World) -> EcsResult<Self> {
        Ok(())
    }

    fn dependencies(_: &mut Dependencies) {}
}

macro_rules! impl_system_param {
    ($($name:ident $index:tt),+) => {
        impl<$($name: SystemParam),+> SystemParam for ($($name,)+) {
            fn init(world: &mut World) -> EcsResult<Self> {
                Ok(($($name::init(world)?,)+))
            }

            fn dependencies(dependencies: &mut Dependencies) {
                $($name::dependencies(dependencies);)+
            }

            fn apply(&mut self, world: &mut World) {
                $(self.$index.apply(world);)+
            }
        }
    };
}

impl_system_param!(A 0);
impl_system_param!(A 0, B 1);
impl_system_param!(A 0, B 1, C 2);
impl_system_param!(A 0, B 1, C 2, D 3);
impl_system_param!(A 0, B 1, C 2, D 3, E 4);
impl_system_param!(A 0, B 1, C 2, D 3, E 4, F 5);
impl_system_param!(A 0, B 1, C 2, D 3, E 4, F 5, G 6);
impl_system_param!(A 0, B 1, C 2, D 3, E 4, F 5, G 6, H 7);

/// Return values a system may produce.
pub trait SystemOutput {
    /// Converts into the stage's result type.
    ///
    /// # Errors
    ///
    /// Passes a system failure through.
    fn into_result(self) -> EcsResult<()>;
}

impl SystemOutput for () {
    fn into_result(self) -> EcsResult<()> {
        Ok(())
    }
}

impl SystemOutput for EcsResult<()> {
    fn into_result(self) -> EcsResult<()> {
        self
    }
}

/// A unit of work scheduled inside a stage.
pub trait System: Send {
    /// Unique label inside its stage.
    fn label(&self) -> &'static str;

    /// Types the system touches.
    fn dependencies(&self) -> &Dependencies;

    /// Runs once against `world`.
    ///
    /// # Errors
    ///
    /// Returns the system's own failure or a parameter resolution error.
    fn run(&mut self, world: &mut World) -> EcsResult<()>;
}

/// [`System`] backed by a closure and its parameter state.
pub struct FunctionSystem<P, F, Out> {
    label: &'static str,
    func: F,
    state: Option<P>,
    dependencies: Dependencies,
    _marker: PhantomData<fn() -> Out>,
}

impl<P, F, Out> FunctionSystem<P, F, Out>
where
    P: SystemParam,
    F: FnMut(&mut World, &mut P) -> Out + Send + 'static,
    Out: SystemOutput + 'static,
{
    /// Wraps `func` under `label`.
    pub fn new(label: &'static str, func: F) -> Self {
        let mut dependencies = Dependencies::default();
        P::dependencies(&mut dependencies);
        Self {
            label,
            func,
            state: None,
            dependencies,
            _marker: PhantomData,
        }
    }
}

impl<P, F, Out> System for FunctionSystem<P, F, Out>
where
    P: SystemParam,
    F: FnMut(&mut World, &mut P) -> Out + Send + 'static,
    Out: SystemOutput + 'static,
{
    fn label(&self) -> &'static str {
        self.label
    }

    fn dependencies(&self) -> &Dependencies {
        &self.dependencies
    }

    fn run(&mut self, world: &mut World) -> EcsResult<()> {
        let mut state = match self.state.take() {
            Some(state) => state,
            None => P::init(world)?,
        };
        let result = (self.func)(world, &mut state).into_result();
        state.apply(world);
        self.state = Some(state);
        result
    }
}

/// Run condition evaluated before each run of one system.
pub type RunCondition = Box<dyn FnMut(&World) -> bool + Send>;

/// A system plus its ordering constraints and run condition.
pub struct SystemConfig {
    pub(crate) system: Box<dyn System>,
    pub(crate) before: Vec<&'static str>,
    pub(crate) after: Vec<&'static str>,
    pub(crate) run_if: Option<RunCondition>,
}

impl SystemConfig {
    /// Wraps an already built system.
    #[must_use]
    pub fn new(system: Box<dyn System>) -> Self {
        Self {
            system,
            before: Vec::new(),
            after: Vec::new(),
            run_if: None,
        }
    }

    /// Label of the wrapped system.
    #[must_use]
    pub fn label(&self) -> &'static str {
        self.system.label()
    }

    /// Runs this system before the one labelled `label`.
    #[must_use]
    pub fn before(mut self, label: &'static str) -> Self {
        self.before.push(label);
        self
    }

    /// Runs this system after the one labelled `label`.
    #[must_use]
    pub fn after(mut self, label: &'static str) -> Self {
        self.after.push(label);
        self
    }

    /// Skips the system whenever `condition` returns false.
    #[must_use]
    pub fn run_if<C>(mut self, condition: C) -> Self
    where
        C: FnMut(&World) -> bool + Send + 'static,
    {
        self.run_if = Some(Box::new(condition));
        self
    }
}

impl std::fmt::Debug for SystemConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemConfig")
            .field("label", &self.system.label())
            .field("before", &self.before)
            .field("after", &self.after)
            .field("run_if", &self.run_if.is_some())
            .finish()
    }
}

/// Builds a system from a closure taking the world and a parameter.
pub fn system<P, F, Out>(label: &'static str, func: F) -> SystemConfig
where
    P: SystemParam,
    F: FnMut(&mut World, &mut P) -> Out + Send + 'static,
    Out: SystemOutput + 'static,
{
    SystemConfig::new(Box::new(FunctionSystem::new(label, func)))
}

/// Builds a system that needs the world alone. It conflicts with every
/// other system, so it always gets a batch to itself.
pub fn exclusive_system<F, Out>(label: &'static str, mut func: F) -> SystemConfig
where
    F: FnMut(&mut World) -> Out + Send + 'static,
    Out: SystemOutput + 'static,
{
    let mut function = FunctionSystem::new(label, move |world: &mut World, _: &mut ()| func(world));
    function.dependencies.set_exclusive();
    SystemConfig::new(Box::new(function))
}

/// Anything [`crate::Schedule::add_systems`] accepts.
pub trait IntoSystemConfigs {
    /// Flattens into individual configs.
    fn into_configs(self) -> Vec<SystemConfig>;
}

impl IntoSystemConfigs for SystemConfig {
    fn into_configs(self) -> Vec<SystemConfig> {
        vec![self]
    }
}

impl IntoSystemConfigs for Vec<SystemConfig> {
    fn into_configs(self) -> Vec<SystemConfig> {
        self
    }
}

impl<const N: usize> IntoSystemConfigs for [SystemConfig; N] {
    fn into_configs(self) -> Vec<SystemConfig> {
        self.into_iter().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::query::{Read, Write};
    use crate::ecs::Component;
    use bytemuck::{Pod, Zeroable};

    #[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
    #[repr(C)]
    struct Health(f32);
    impl Component for Health {}

    #[allow(dead_code)]
    #[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
    #[repr(C)]
    struct Armor(f32);
    impl Component for Armor {}

    struct Clock(u64);

    fn dependencies_of<P: SystemParam>() -> Dependencies {
        let mut dependencies = Dependencies::default();
        P::dependencies(&mut dependencies);
        dependencies
    }

    #[test]
    fn test_conflict_rules() {
        let reader = dependencies_of::<Query<Read<Health>>>();
        let other_reader = dependencies_of::<(Query<Read<Health>>, Res<Clock>)>();
        let writer = dependencies_of::<Query<Write<Health>>>();
        let unrelated = dependencies_of::<Query<Write<Armor>>>();

        assert!(reader.conflicts_with(&other_reader));
        assert!(other_reader.conflicts_with(&reader));
        assert!(reader.conflicts_with(&writer));
        assert!(writer.conflicts_with(&reader));
        assert!(writer.conflicts_with(&writer));
        assert!(!writer.conflicts_with(&unrelated));
        assert!(!reader.conflicts_with(&unrelated));
        assert_eq!(other_reader.len(), 2);
    }

    #[test]
    fn test_exclusive_conflicts_with_everything() {
        let mut exclusive = Dependencies::default();
        exclusive.set_exclusive();
        assert!(exclusive.conflicts_with(&Dependencies::default()));
        assert!(Dependencies::default().conflicts_with(&exclusive));
    }

    #[test]
    fn test_function_system_keeps_state() {
        let mut world = World::new();
        world.spawn_bundle((Health(10.0),)).unwrap();
        world.insert_resource(Clock(0));

        let mut config = system(
            "regen",
            |world: &mut World, (query, clock): &mut (Query<Write<Health>>, ResMut<Clock>)| -> EcsResult<()> {
                query.for_each(world, |_, health| health.0 += 1.0);
                clock.get_mut(world)?.0 += 1;
                Ok(())
            },
        );
        config.system.run(&mut world).unwrap();
        config.system.run(&mut world).unwrap();

        assert_eq!(world.resource::<Clock>().unwrap().0, 2);
        assert!(!config.system.dependencies().is_empty());
    }

    #[test]
    fn test_missing_resource_fails_at_first_run() {
        let mut world = World::new();
        let mut config = system("reader", |_: &mut World, _: &mut Res<Clock>| {});
        assert!(matches!(
            config.system.run(&mut world),
            Err(EcsError::ResourceMissing(_))
        ));
    }

    #[test]
    fn test_commands_param_hands_over_queue() {
        let mut world = World::new();
        let mut config = system("spawner", |_: &mut World, commands: &mut Commands| {
            commands.spawn((Health(1.0),));
        });
        config.system.run(&mut world).unwrap();
        assert_eq!(world.commands().len(), 1);
        world.flush().unwrap();
        assert_eq!(world.entity_count(), 1);
    }
}
