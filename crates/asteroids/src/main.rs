//! Headless asteroid field
//!
//! Loads a level, drifts its asteroids across a wrapping field and stops after
//! a configured number of frames.
//!
//! Usage: `asteroids [config.toml|config.ron]`

mod components;
mod config;
mod systems;

use config::AsteroidsConfig;
use ecs_engine::core::Config;
use ecs_engine::foundation::logging;
use ecs_engine::Game;
use futures::executor::block_on;
use std::cell::Cell;
use std::rc::Rc;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let config = match std::env::args().nth(1) {
        Some(path) => AsteroidsConfig::load_from_file(path)?,
        None => AsteroidsConfig::default(),
    };
    config.validate()?;

    logging::init_with_level(&config.game.log_level);
    log::info!("Starting asteroids");

    let frames = Rc::new(Cell::new(0));
    let game = Game::with_config(&config.game);
    game.add_scene("field", systems::field_scene(&config.gameplay, Rc::clone(&frames)));

    block_on(game.run("field"))?;

    if let Some(scene) = game.get_scene("field") {
        for entity in &scene.get_entities() {
            if let Some(body) = components::body_of(entity) {
                let body = body.borrow();
                log::debug!(
                    "Asteroid {} at ({:.1}, {:.1})",
                    entity.id(),
                    body.position.x,
                    body.position.y
                );
            }
        }
        log::info!(
            "Finished after {} frames with {} asteroids",
            frames.get(),
            scene.get_entities().len()
        );
    }
    Ok(())
}
