//! # ECS Engine
//!
//! A single-threaded Entity-Component-System runtime for games driven by one
//! frame loop.
//!
//! ## Features
//!
//! - **Entities and Components**: identity handles with observable structural changes
//! - **Indexed Queries**: named subsets of a scene's entities kept in sync incrementally
//! - **Event System**: typed events with bubbling, propagation control and async listeners
//! - **Asset Pipeline**: batched, extension-decoded asset fetching with progress events
//! - **Game Loop**: scene switching and per-frame updates on a host frame scheduler
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use ecs_engine::prelude::*;
//!
//! let scene = Scene::new();
//! let physics = System::new("physics");
//! physics.on(EventType::Mounted, |event: &mut GameEvent| {
//!     if let Some(indexer) = event.get_indexer() {
//!         indexer.index_components(&["velocity"]);
//!     }
//! });
//! physics.on(EventType::Update, |event: &mut GameEvent| {
//!     let _dt = event.get_delta_time();
//! });
//! scene.set_system("physics", physics);
//!
//! let game = Game::new(AssetFetcher::new(MemoryFetch::new()), FixedStepFrames::new(16.0));
//! game.add_scene("main", scene);
//! futures::executor::block_on(game.run("main")).unwrap();
//! ```

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic, clippy::nursery)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

// Core engine modules
pub mod core;
pub mod config;

pub mod foundation;
pub mod events;
pub mod ecs;
pub mod assets;
pub mod game;

pub use game::{FixedStepFrames, FrameScheduler, Game, RealtimeFrames};

/// Common imports for engine users
pub mod prelude {
    pub use crate::{
        assets::{Asset, AssetFetcher, AssetKind, AssetMap, Fetch, FileFetch, MemoryFetch},
        core::{Config, GameConfig},
        ecs::{
            AsyncFactory, Component, ComponentIndexer, EcsError, Entity, Factory, IndexValue, Record,
            Scene, System, MAX_UPDATE_RATE,
        },
        events::{EventArg, EventEmitter, EventTarget, EventType, GameEvent, ObservableTarget},
        foundation::collections::{Collection, IndexedCollection},
        game::{FixedStepFrames, FrameScheduler, Game, RealtimeFrames},
    };
}
