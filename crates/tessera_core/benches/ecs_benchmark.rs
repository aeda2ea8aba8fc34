//! # ECS Performance Benchmark
//!
//! - Spawning bundles straight into their archetype
//! - Linear query iteration over chunk columns
//! - Change-filtered iteration after a sparse write
//!
//! Run with: `cargo bench --package tessera_core --bench ecs_benchmark`

#![allow(missing_docs)]
#![allow(dead_code)]

use bytemuck::{Pod, Zeroable};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use tessera_core::{Changed, Component, Entity, Read, World, WorldConfig, Write};

const ENTITY_COUNT: usize = 100_000;

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

fn populated(count: usize) -> (World, Vec<Entity>) {
    let config = WorldConfig {
        initial_entities: count,
        ..WorldConfig::default()
    };
    let mut world = World::with_config(&config).expect("default config is valid");
    let entities = (0..count)
        .map(|_| {
            world
                .spawn_bundle((Position::default(), Velocity { x: 1.0, y: 0.5, z: 0.25 }))
                .expect("spawn")
        })
        .collect();
    (world, entities)
}

// =============================================================================
// SPAWN
// =============================================================================

fn bench_spawn_bundles(c: &mut Criterion) {
    let mut group = c.benchmark_group("spawn_bundles");
    for count in [1_000, 10_000, ENTITY_COUNT] {
        group.bench_with_input(BenchmarkId::from_parameter(count), &count, |b, &count| {
            b.iter(|| {
                let (world, _) = populated(count);
                black_box(world.entity_count())
            });
        });
    }
    group.finish();
}

fn bench_spawn_via_commands(c: &mut Criterion) {
    c.bench_function("spawn_commands_10k", |b| {
        b.iter(|| {
            let mut world = World::new();
            for _ in 0..10_000 {
                world.commands().spawn((Position::default(), Velocity::default()));
            }
            black_box(world.flush().expect("flush"))
        });
    });
}

// =============================================================================
// ITERATION
// =============================================================================

fn bench_iterate_movement(c: &mut Criterion) {
    let (mut world, _) = populated(ENTITY_COUNT);
    let query = world
        .query::<(Write<Position>, Read<Velocity>), ()>()
        .expect("query");

    c.bench_function("iterate_movement_100k", |b| {
        b.iter(|| {
            query.for_each(&mut world, |_, (position, velocity)| {
                position.x += velocity.x;
                position.y += velocity.y;
                position.z += velocity.z;
            });
        });
    });

    c.bench_function("iterate_movement_chunks_100k", |b| {
        b.iter(|| {
            query.for_each_chunk(&mut world, |_, (positions, velocities)| {
                for (position, velocity) in positions.iter_mut().zip(velocities) {
                    position.x += velocity.x;
                }
            });
        });
    });
}

fn bench_changed_filter(c: &mut Criterion) {
    let (mut world, entities) = populated(ENTITY_COUNT);
    world.tick();
    world.tick();
    let changed = world
        .query::<Read<Position>, Changed<Position>>()
        .expect("query");

    c.bench_function("changed_filter_sparse_writes", |b| {
        b.iter(|| {
            for entity in entities.iter().step_by(1_000) {
                if let Ok(position) = world.get_mut::<Position>(*entity) {
                    position.x += 1.0;
                }
            }
            black_box(changed.entity_count(&world))
        });
    });
}

criterion_group!(
    benches,
    bench_spawn_bundles,
    bench_spawn_via_commands,
    bench_iterate_movement,
    bench_changed_filter,
);

criterion_main!(benches);
