//! # Archetype Migration Benchmark
//!
//! Compares:
//! 1. Single component add/remove (edge cache hit after the first move)
//! 2. Bundle insert (one move for several components)
//! 3. Despawn with swap-remove backfill
//!
//! Run with: `cargo bench --package tessera_core --bench archetype_benchmark`

#![allow(missing_docs)]
#![allow(dead_code)]

use bytemuck::{Pod, Zeroable};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use tessera_core::{Component, Entity, World};

const ENTITY_COUNT: usize = 10_000;

#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
struct Position {
    x: f32,
    y: f32,
    z: f32,
}
impl Component for Position {}

#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
struct Velocity {
    x: f32,
    y: f32,
    z: f32,
}
impl Component for Velocity {}

#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
struct Burning(u32);
impl Component for Burning {}

#[derive(Clone, Copy, Debug, Default, Pod, Zeroable)]
#[repr(C)]
struct Frozen(u32);
impl Component for Frozen {}

fn populated() -> (World, Vec<Entity>) {
    let mut world = World::new();
    let entities = (0..ENTITY_COUNT)
        .map(|_| {
            world
                .spawn_bundle((Position::default(), Velocity::default()))
                .expect("spawn")
        })
        .collect();
    (world, entities)
}

// =============================================================================
// MIGRATION
// =============================================================================

fn bench_add_remove_component(c: &mut Criterion) {
    let (mut world, entities) = populated();
    c.bench_function("add_remove_component_10k", |b| {
        b.iter(|| {
            for &entity in &entities {
                world.add_component(entity, Burning(1)).expect("add");
            }
            for &entity in &entities {
                black_box(world.remove_component::<Burning>(entity).expect("remove"));
            }
        });
    });
}

fn bench_insert_bundle(c: &mut Criterion) {
    let (mut world, entities) = populated();
    c.bench_function("insert_bundle_then_strip_10k", |b| {
        b.iter(|| {
            for &entity in &entities {
                world.insert_bundle(entity, (Burning(1), Frozen(2))).expect("insert");
            }
            for &entity in &entities {
                world.remove_component::<Burning>(entity).expect("remove");
                world.remove_component::<Frozen>(entity).expect("remove");
            }
            world.tick();
        });
    });
}

// =============================================================================
// DESPAWN
// =============================================================================

fn bench_despawn_respawn(c: &mut Criterion) {
    let (mut world, mut entities) = populated();
    c.bench_function("despawn_respawn_10k", |b| {
        b.iter(|| {
            for entity in entities.drain(..) {
                world.despawn(entity).expect("despawn");
            }
            for _ in 0..ENTITY_COUNT {
                entities.push(
                    world
                        .spawn_bundle((Position::default(), Velocity::default()))
                        .expect("spawn"),
                );
            }
            world.tick();
            black_box(world.archetype_count())
        });
    });
}

criterion_group!(
    benches,
    bench_add_remove_component,
    bench_insert_bundle,
    bench_despawn_respawn,
);

criterion_main!(benches);
