//! Benchmark scenarios for the world core.
//!
//! Each scenario owns a world and drives a realistic workload:
//! - entity churn (create/destroy with id reuse)
//! - archetype migration (components moving entities between chunks)
//! - recorded operation playback
//!
//! Scenarios are seeded for reproducibility.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use worlds_engine::{Entity, Operation, Schema, TypeHash, World};

/// A benchmark scenario: build the initial state once, then run the
/// measured step repeatedly.
pub trait Scenario {
    /// Build the initial world state.
    fn setup(&mut self);
    /// One measured step.
    fn update(&mut self);
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Position {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Velocity {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

#[repr(C)]
#[derive(Debug, Clone, Copy, bytemuck::Pod, bytemuck::Zeroable)]
pub struct Lifetime {
    pub remaining: f32,
}

/// The schema shared by all scenarios.
pub fn scenario_schema() -> Schema {
    let schema = Schema::new();
    schema.register_component_of::<Position>("position");
    schema.register_component_of::<Velocity>("velocity");
    schema.register_component_of::<Lifetime>("lifetime");
    schema.register_array_of::<u32>("samples");
    schema.register_tag("marker");
    schema
}

/// Create/destroy churn over a fixed-size population. Every update
/// destroys a slice of the population and recreates it, exercising id
/// reuse and swap-remove compaction.
pub struct ChurnScenario {
    pub world: World,
    population: usize,
    churn: usize,
    rng: ChaCha8Rng,
    alive: Vec<Entity>,
}

impl ChurnScenario {
    pub fn new(population: usize) -> Self {
        Self {
            world: World::new(scenario_schema()),
            population,
            churn: population / 10,
            rng: ChaCha8Rng::seed_from_u64(12345),
            alive: Vec::new(),
        }
    }

    fn spawn_one(&mut self) -> Entity {
        let entity = self.world.create();
        self.world.add(
            entity,
            Position {
                x: self.rng.gen_range(-100.0..100.0),
                y: self.rng.gen_range(-100.0..100.0),
                z: self.rng.gen_range(-100.0..100.0),
            },
        );
        self.world.add(
            entity,
            Lifetime {
                remaining: self.rng.gen_range(0.5..5.0),
            },
        );
        entity
    }
}

impl Scenario for ChurnScenario {
    fn setup(&mut self) {
        for _ in 0..self.population {
            let entity = self.spawn_one();
            self.alive.push(entity);
        }
    }

    fn update(&mut self) {
        for _ in 0..self.churn {
            let index = self.rng.gen_range(0..self.alive.len());
            let entity = self.alive.swap_remove(index);
            self.world.destroy(entity, true);
        }
        for _ in 0..self.churn {
            let entity = self.spawn_one();
            self.alive.push(entity);
        }
    }
}

/// Archetype migration: a population that keeps gaining and losing a
/// component, bouncing between two chunks while its other data rides
/// along.
pub struct MigrationScenario {
    pub world: World,
    population: usize,
    entities: Vec<Entity>,
    with_velocity: bool,
}

impl MigrationScenario {
    pub fn new(population: usize) -> Self {
        Self {
            world: World::new(scenario_schema()),
            population,
            entities: Vec::new(),
            with_velocity: false,
        }
    }
}

impl Scenario for MigrationScenario {
    fn setup(&mut self) {
        for index in 0..self.population {
            let entity = self.world.create();
            self.world.add(
                entity,
                Position {
                    x: index as f32,
                    y: 0.0,
                    z: 0.0,
                },
            );
            self.entities.push(entity);
        }
    }

    fn update(&mut self) {
        self.with_velocity = !self.with_velocity;
        for entity in &self.entities {
            if self.with_velocity {
                self.world.add(
                    *entity,
                    Velocity {
                        x: 1.0,
                        y: 0.0,
                        z: 0.0,
                    },
                );
            } else {
                self.world.remove::<Velocity>(*entity);
            }
        }
    }
}

/// Recorded operation playback: the same batch of structural edits
/// replayed into a fresh world each update.
pub struct PlaybackScenario {
    operation: Operation,
    batch: usize,
}

impl PlaybackScenario {
    pub fn new(batch: usize) -> Self {
        Self {
            operation: Operation::new(),
            batch,
        }
    }
}

impl Scenario for PlaybackScenario {
    fn setup(&mut self) {
        let position = TypeHash::of_name("position");
        for index in 0..self.batch {
            self.operation.create_entities(1, true);
            self.operation.add_component(
                position,
                bytemuck::bytes_of(&Position {
                    x: index as f32,
                    y: 0.0,
                    z: 0.0,
                }),
            );
            if index > 0 {
                self.operation.set_parent_to_prev_created(1);
            }
        }
    }

    fn update(&mut self) {
        let mut world = World::new(scenario_schema());
        self.operation
            .perform(&mut world)
            .expect("recorded operation must replay");
        assert_eq!(world.entity_count(), self.batch);
    }
}
