//! Systems driving the asteroid field
//!
//! - **spawner**: fetches the level and fills the scene with asteroids
//! - **movement**: integrates every body by the frame's delta time
//! - **wrap_around**: keeps bodies inside the field
//! - **lifetime**: ends the game after a fixed number of frames

use crate::components::{body_of, entity_factory, AsteroidSize, AsteroidSpec, Body};
use crate::config::GameplayConfig;
use ecs_engine::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Deserialize;
use std::cell::Cell;
use std::rc::Rc;

/// Level file fetched by the spawner
pub const LEVEL_PATH: &str = "level.json";

/// Playing field dimensions
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct Field {
    /// Width in field units
    pub width: f64,
    /// Height in field units
    pub height: f64,
}

impl Field {
    /// Whether both sides are finite and positive
    pub fn is_valid(&self) -> bool {
        [self.width, self.height]
            .iter()
            .all(|side| side.is_finite() && *side > 0.0)
    }
}

impl Default for Field {
    fn default() -> Self {
        Self {
            width: 800.0,
            height: 600.0,
        }
    }
}

#[derive(Debug, Deserialize)]
struct Level {
    #[serde(default)]
    field: Field,
    #[serde(default)]
    asteroids: Vec<AsteroidSpec>,
}

fn parse_level(assets: &AssetMap) -> Option<Level> {
    let value = assets.get(LEVEL_PATH)?.as_json()?;
    match serde_json::from_value::<Level>(value.clone()) {
        Ok(mut level) => {
            if !level.field.is_valid() {
                log::error!(
                    "Level {} has an unusable field {}x{}, using the default",
                    LEVEL_PATH,
                    level.field.width,
                    level.field.height
                );
                level.field = Field::default();
            }
            Some(level)
        }
        Err(e) => {
            log::error!("Invalid level {}: {}", LEVEL_PATH, e);
            None
        }
    }
}

/// Queue the level on load and spawn its asteroids once it arrives
///
/// `extra` random asteroids are rolled from `seed` on top of the listed ones.
pub fn spawner(gameplay: &GameplayConfig) -> System {
    let system = System::new("spawner");
    system.on(EventType::Load, |event: &mut GameEvent| {
        if let Some(fetcher) = event.get_fetcher() {
            fetcher.queue_asset(LEVEL_PATH);
        }
    });

    let inner = system.clone();
    let extra = gameplay.asteroid_count;
    let seed = gameplay.seed;
    let max_speed = gameplay.max_speed;
    system.on(EventType::Loaded, move |event: &mut GameEvent| {
        let Some(level) = event.get_assets().and_then(parse_level) else {
            log::warn!("No level loaded, the field stays empty");
            return;
        };

        let factory = entity_factory();
        let mut rng = StdRng::seed_from_u64(seed);
        let random: Vec<AsteroidSpec> = (0..extra)
            .map(|_| {
                let angle = rng.gen_range(0.0..std::f64::consts::TAU);
                let speed = if max_speed > 0.0 { rng.gen_range(0.0..=max_speed) } else { 0.0 };
                AsteroidSpec {
                    x: rng.gen_range(0.0..level.field.width),
                    y: rng.gen_range(0.0..level.field.height),
                    size: AsteroidSize::Large,
                    velocity: [speed * angle.cos(), speed * angle.sin()],
                }
            })
            .collect();

        let listed = level.asteroids.iter().cloned().map(|spec| ("asteroid", spec));
        for (kind, spec) in listed.chain(random.into_iter().map(|spec| ("rock", spec))) {
            let Some(entity) = factory.create(kind, spec) else {
                continue;
            };
            if let Err(e) = inner.add_entity(entity) {
                log::error!("Spawner could not add an asteroid: {}", e);
                return;
            }
        }
        log::info!("Spawned {} asteroids", level.asteroids.len() + extra as usize);
    });
    system
}

/// Integrate every body's position by its velocity
pub fn movement() -> System {
    let system = System::new("movement");
    system.on(EventType::Mounted, |event: &mut GameEvent| {
        if let Some(indexer) = event.get_indexer() {
            indexer.index_components(&["body"]);
        }
    });

    let inner = system.clone();
    system.on(EventType::Update, move |event: &mut GameEvent| {
        let seconds = event.get_delta_time().unwrap_or_default() / 1000.0;
        let bodies = match inner.get_index("body") {
            Ok(bodies) => bodies.unwrap_or_default(),
            Err(e) => {
                log::error!("Movement update failed: {}", e);
                return;
            }
        };
        for body in bodies.iter().filter_map(|value| value.as_component()?.record::<Body>()) {
            body.borrow_mut().advance(seconds);
        }
    });
    system
}

/// Wrap bodies leaving the field back to the opposite edge
///
/// The field size comes from the level, which is queued on load.
pub fn wrap_around() -> System {
    let system = System::new("wrap_around");
    let field = Rc::new(Cell::new(Field::default()));
    system.on(EventType::Load, |event: &mut GameEvent| {
        if let Some(fetcher) = event.get_fetcher() {
            fetcher.queue_asset(LEVEL_PATH);
        }
    });

    let sink = Rc::clone(&field);
    system.on(EventType::Loaded, move |event: &mut GameEvent| {
        if let Some(level) = event.get_assets().and_then(parse_level) {
            sink.set(level.field);
        }
    });

    system.on(EventType::Update, move |event: &mut GameEvent| {
        let Field { width, height } = field.get();
        let Some(entities) = event.get_entities() else {
            return;
        };
        for body in entities.iter().filter_map(body_of) {
            body.borrow_mut().wrap(width, height);
        }
    });
    system
}

/// Stop the game once `max_frames` updates have run
pub fn lifetime(max_frames: u32, frames: Rc<Cell<u32>>) -> System {
    let system = System::new("lifetime");
    let inner = system.clone();
    system.on(EventType::Update, move |_event: &mut GameEvent| {
        frames.set(frames.get() + 1);
        if frames.get() >= max_frames {
            log::info!("Reached {} frames, stopping", max_frames);
            inner.stop_game();
        }
    });
    system
}

/// Systems mounted on the field, in update order
pub const FIELD_SYSTEMS: [&str; 4] = ["spawner", "movement", "wrap_around", "lifetime"];

/// System factory keyed by system name
///
/// `lifetime` systems count their frames into `frames`.
pub fn system_factory(frames: Rc<Cell<u32>>) -> Factory<GameplayConfig, System> {
    let mut factory: Factory<GameplayConfig, System> = Factory::new();
    factory
        .set("spawner", |gameplay: GameplayConfig| spawner(&gameplay))
        .set("movement", |_| movement())
        .set("wrap_around", |_| wrap_around())
        .set("lifetime", move |gameplay: GameplayConfig| {
            lifetime(gameplay.max_frames, Rc::clone(&frames))
        });
    factory
}

/// Build the asteroid field scene with all systems mounted
pub fn field_scene(gameplay: &GameplayConfig, frames: Rc<Cell<u32>>) -> Scene {
    let systems = system_factory(frames);
    let scene = Scene::new();
    for name in FIELD_SYSTEMS {
        if let Some(system) = systems.create(name, gameplay.clone()) {
            scene.set_system(name, system);
        }
    }
    scene
}
