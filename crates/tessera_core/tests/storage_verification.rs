//! # Storage Verification Tests
//!
//! End-to-end checks of the storage engine through the public API:
//!
//! 1. **Entity recycling**: freed ids come back with a new version
//! 2. **Migration**: component bytes survive archetype moves
//! 3. **Density**: swap-remove keeps chunks packed and the index exact
//! 4. **Change window**: stamps visible at g and g+1, gone at g+2
//! 5. **Query completeness**: a query visits exactly the matching entities
//! 6. **Command ordering**: spawns land before hierarchy links
//! 7. **Removal scenario**: 1,000 movers, one loses `Velocity`
//!
//! Run with: cargo test --test storage_verification

use std::collections::HashSet;

use bytemuck::{Pod, Zeroable};
use tessera_core::{
    Added, Changed, Command, Component, Entity, Query, Read, Removed, With, Without, World, WorldConfig, Write,
};

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}
impl Component for Position {}

#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
#[repr(C)]
struct Velocity {
    x: f32,
    y: f32,
    z: f32,
}
impl Component for Velocity {}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
struct Health(u32);
impl Component for Health {}

fn position(seed: u16) -> Position {
    let base = f32::from(seed);
    Position {
        x: base,
        y: base * 0.5,
        z: -base,
    }
}

// ============================================================================
// ENTITY RECYCLING
// ============================================================================

#[test]
fn verify_entity_recycling() {
    let mut world = World::new();
    let first = world.spawn().unwrap();
    let second = world.spawn().unwrap();
    world.despawn(first).unwrap();
    world.despawn(second).unwrap();

    // Lowest freed id first, version bumped.
    let reused = world.spawn().unwrap();
    assert_eq!(reused.id(), first.id());
    assert_eq!(reused.version(), first.version() + 1);
    assert!(!world.is_alive(first));
    assert!(world.get::<Health>(first).is_err());

    let next = world.spawn().unwrap();
    assert_eq!(next.id(), second.id());
}

// ============================================================================
// MIGRATION
// ============================================================================

#[test]
fn verify_migration_preserves_bytes() {
    let mut world = World::new();
    let entity = world.spawn_bundle((position(7), Health(42))).unwrap();
    let before = bytemuck::bytes_of(world.get::<Position>(entity).unwrap()).to_vec();

    world.add_component(entity, Velocity { x: 1.0, y: 2.0, z: 3.0 }).unwrap();
    world.remove_component::<Health>(entity).unwrap();
    world.add_component(entity, Health(43)).unwrap();

    assert_eq!(bytemuck::bytes_of(world.get::<Position>(entity).unwrap()), before.as_slice());
    assert_eq!(world.get::<Health>(entity).unwrap(), &Health(43));
    world.validate().unwrap();
}

// ============================================================================
// DENSITY
// ============================================================================

#[test]
fn verify_swap_remove_density() {
    let config = WorldConfig {
        chunk_bytes: 256,
        ..WorldConfig::default()
    };
    let mut world = World::with_config(&config).unwrap();
    let entities: Vec<Entity> = (0..100_u16)
        .map(|seed| world.spawn_bundle((position(seed),)).unwrap())
        .collect();

    for entity in entities.iter().step_by(3) {
        world.despawn(*entity).unwrap();
    }
    world.validate().unwrap();

    let archetype = world.archetype_of(entities[1]).unwrap();
    let capacity = archetype.chunk_capacity();
    assert_eq!(archetype.len(), 66);
    assert_eq!(archetype.chunks().len(), 66_usize.div_ceil(capacity));
    for chunk in &archetype.chunks()[..archetype.chunks().len() - 1] {
        assert!(chunk.is_full());
    }

    for (seed, entity) in (0..100_u16).zip(&entities) {
        if seed % 3 == 0 {
            assert!(!world.is_alive(*entity));
        } else {
            assert_eq!(world.get::<Position>(*entity).unwrap(), &position(seed));
        }
    }
}

// ============================================================================
// CHANGE WINDOW
// ============================================================================

#[test]
fn verify_change_window() {
    let mut world = World::new();
    let entity = world.spawn_bundle((position(1), Health(10))).unwrap();
    let added = world.query::<Read<Health>, Added<Health>>().unwrap();
    let changed = world.query::<Read<Position>, Changed<Position>>().unwrap();

    // g: spawned
    assert_eq!(added.entity_count(&world), 1);
    world.tick();
    // g + 1
    assert_eq!(added.entity_count(&world), 1);
    world.tick();
    // g + 2
    assert_eq!(added.entity_count(&world), 0);
    assert_eq!(changed.entity_count(&world), 0);

    world.get_mut::<Position>(entity).unwrap().x = 99.0;
    assert_eq!(changed.entity_count(&world), 1);
    world.tick();
    assert_eq!(changed.entity_count(&world), 1);
    world.tick();
    assert_eq!(changed.entity_count(&world), 0);

    world.remove_component::<Health>(entity).unwrap();
    assert_eq!(world.removed_value::<Health>(entity), Some(Health(10)));
    world.tick();
    assert!(world.was_removed::<Health>(entity));
    world.tick();
    assert!(!world.was_removed::<Health>(entity));
}

// ============================================================================
// QUERY COMPLETENESS
// ============================================================================

#[test]
fn verify_query_completeness() {
    let mut world = World::new();
    let mut expected = HashSet::new();
    for seed in 0..300_u16 {
        let entity = match seed % 4 {
            0 => world.spawn_bundle((position(seed),)).unwrap(),
            1 => world.spawn_bundle((position(seed), Velocity::default())).unwrap(),
            2 => world.spawn_bundle((position(seed), Velocity::default(), Health(1))).unwrap(),
            _ => world.spawn_bundle((Velocity::default(), Health(1))).unwrap(),
        };
        if seed % 4 == 1 || seed % 4 == 2 {
            expected.insert(entity);
        }
    }

    let query: Query<(Read<Position>, Write<Velocity>)> = world.query().unwrap();
    let mut seen = HashSet::new();
    query.for_each(&mut world, |entity, _| {
        assert!(seen.insert(entity), "visited {entity} twice");
    });
    assert_eq!(seen, expected);
    assert_eq!(query.entity_count(&world), expected.len());

    let healthy_movers = world.query::<Read<Velocity>, (With<Health>, Without<Position>)>().unwrap();
    assert_eq!(healthy_movers.entity_count(&world), 75);
}

// ============================================================================
// COMMAND ORDERING
// ============================================================================

#[test]
fn verify_spawn_applies_before_add_child() {
    let mut world = World::new();
    let parent = world.spawn().unwrap();

    // Link recorded before the child's spawn.
    let child = world.allocator().allocate();
    let commands = world.commands();
    commands.add_child(parent, child);
    commands.push(Command::Spawn {
        entity: child,
        components: Vec::new(),
    });
    commands.remove_component::<Health>(parent);
    commands.add_component(parent, Health(5));

    // Health is added (90) before it is removed (0).
    assert_eq!(world.flush().unwrap(), 4);
    assert_eq!(world.children(parent), &[child]);
    assert_eq!(world.parent(child), Some(parent));
    assert!(!world.has::<Health>(parent).unwrap());
}

#[test]
fn verify_commands_from_other_threads() {
    let mut world = World::new();
    let sender = world.command_sender();

    let handles: Vec<_> = (0..4_u16)
        .map(|seed| {
            let sender = sender.clone();
            std::thread::spawn(move || sender.spawn((position(seed), Health(u32::from(seed)))))
        })
        .collect();
    let spawned: Vec<Entity> = handles
        .into_iter()
        .map(|handle| handle.join().unwrap().unwrap())
        .collect();

    assert_eq!(world.entity_count(), 0);
    world.flush().unwrap();
    assert_eq!(world.entity_count(), 4);
    for entity in spawned {
        assert!(world.has::<Health>(entity).unwrap());
    }
}

// ============================================================================
// REMOVAL SCENARIO
// ============================================================================

#[test]
fn verify_thousand_movers_one_loses_velocity() {
    let mut world = World::new();
    let movers: Vec<Entity> = (0..1_000_u16)
        .map(|seed| {
            world
                .spawn_bundle((position(seed), Velocity { x: 1.0, y: 0.0, z: 0.0 }))
                .unwrap()
        })
        .collect();
    let target = movers[500];
    let position_before = *world.get::<Position>(target).unwrap();

    world.commands().remove_component::<Velocity>(target);
    world.flush().unwrap();

    let archetype = world.archetype_of(target).unwrap();
    let position_id = world.store().registry().id_of::<Position>().unwrap();
    assert_eq!(archetype.components(), &[position_id]);
    assert_eq!(world.get::<Position>(target).unwrap(), &position_before);
    assert!(world.was_removed::<Velocity>(target));

    let moving = world.query::<(Read<Position>, Read<Velocity>), ()>().unwrap();
    assert_eq!(moving.entity_count(&world), 999);
    assert!(!moving.entities(&world).contains(&target));

    let removed = world.query::<Read<Position>, Removed<Velocity>>().unwrap();
    assert!(removed.entity_count(&world) >= 1);
    world.validate().unwrap();
}
