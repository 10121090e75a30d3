//! Game: scene registry and the frame loop
//!
//! The game owns named scenes, keeps one of them active and drives it with
//! frames from a [`FrameScheduler`]. `changeScene` and `stopGame` events
//! bubbling up from the active scene (usually sent by its systems) trigger the
//! same transitions as calling [`Game::change_scene`] and [`Game::stop_game`].

use crate::assets::{AssetFetcher, FileFetch};
use crate::core::GameConfig;
use crate::ecs::{EcsError, Scene};
use crate::events::{EventArg, EventEmitter, EventTarget, EventType, GameEvent};
use crate::foundation::time::{self, Timer};
use futures::future::{self, LocalBoxFuture};
use futures::FutureExt;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Frame primitive supplied by the host, one call per display refresh
pub trait FrameScheduler {
    /// Resolve with the timestamp of the next frame in milliseconds
    fn next_frame(&self) -> LocalBoxFuture<'static, f64>;
}

/// Deterministic frames a fixed number of milliseconds apart, without waiting
#[derive(Debug)]
pub struct FixedStepFrames {
    step_ms: f64,
    now: Cell<f64>,
}

impl FixedStepFrames {
    /// Frames starting at 0 and `step_ms` apart
    pub fn new(step_ms: f64) -> Self {
        Self {
            step_ms,
            now: Cell::new(0.0),
        }
    }

    /// Number of milliseconds between frames
    pub fn step_ms(&self) -> f64 {
        self.step_ms
    }
}

impl FrameScheduler for FixedStepFrames {
    fn next_frame(&self) -> LocalBoxFuture<'static, f64> {
        let timestamp = self.now.get();
        self.now.set(timestamp + self.step_ms);
        future::ready(timestamp).boxed_local()
    }
}

/// Frames paced to a target rate on the monotonic clock
///
/// Waiting for the next frame blocks the calling thread.
pub struct RealtimeFrames {
    timer: RefCell<Timer>,
}

impl RealtimeFrames {
    /// Frames at up to `target_fps` per second
    pub fn new(target_fps: u32) -> Self {
        Self {
            timer: RefCell::new(Timer::new(target_fps)),
        }
    }

    /// Frames delivered so far
    pub fn frame_count(&self) -> u64 {
        self.timer.borrow().frame_count()
    }
}

impl FrameScheduler for RealtimeFrames {
    fn next_frame(&self) -> LocalBoxFuture<'static, f64> {
        let wait = self.timer.borrow().time_until_next_frame();
        if !wait.is_zero() {
            std::thread::sleep(wait);
        }
        self.timer.borrow_mut().tick();
        future::ready(time::now_ms()).boxed_local()
    }
}

impl fmt::Debug for RealtimeFrames {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RealtimeFrames")
            .field("frame_interval", &self.timer.borrow().frame_interval())
            .finish()
    }
}

struct GameState {
    scenes: RefCell<HashMap<String, Scene>>,
    active: RefCell<Option<(String, Scene)>>,
    loaded: Cell<bool>,
    running: Cell<bool>,
    fetcher: AssetFetcher,
    scheduler: Rc<dyn FrameScheduler>,
    min_update_interval: Option<f64>,
    events: EventTarget,
    /// Transition types the game is currently announcing itself
    announcing: RefCell<Vec<EventType>>,
}

/// Scene registry plus the loop driving the active scene
#[derive(Clone)]
pub struct Game {
    state: Rc<GameState>,
}

impl Game {
    /// Create a game fetching assets through `fetcher` and paced by `scheduler`
    pub fn new(fetcher: AssetFetcher, scheduler: impl FrameScheduler + 'static) -> Self {
        Self::build(fetcher, Rc::new(scheduler), None)
    }

    /// Create a game from configuration
    ///
    /// Assets are read below `asset_root`, frames are paced to `target_fps` and
    /// every scene ticks at most once per `max_update_rate_ms`.
    pub fn with_config(config: &GameConfig) -> Self {
        log::info!(
            "Creating game (assets: {}, {} fps)",
            config.asset_root,
            config.target_fps
        );
        Self::build(
            AssetFetcher::new(FileFetch::new(&config.asset_root)),
            Rc::new(RealtimeFrames::new(config.target_fps)),
            Some(config.max_update_rate_ms),
        )
    }

    fn build(fetcher: AssetFetcher, scheduler: Rc<dyn FrameScheduler>, min_update_interval: Option<f64>) -> Self {
        let game = Self {
            state: Rc::new(GameState {
                scenes: RefCell::new(HashMap::new()),
                active: RefCell::new(None),
                loaded: Cell::new(false),
                running: Cell::new(false),
                fetcher,
                scheduler,
                min_update_interval,
                events: EventTarget::new(),
                announcing: RefCell::new(Vec::new()),
            }),
        };
        game.listen(EventType::ChangeScene);
        game.listen(EventType::StopGame);
        game
    }

    /// Install the internal listener reacting to a transition request
    fn listen(&self, event_type: EventType) {
        let game = Rc::downgrade(&self.state);
        self.on(event_type, move |event: &mut GameEvent| {
            let Some(game) = game.upgrade().map(|state| Game { state }) else {
                return;
            };
            if game.state.announcing.borrow().contains(event.event_type()) {
                return;
            }
            match event.event_type() {
                EventType::ChangeScene => match event.get_scene_name() {
                    Some(name) => {
                        if let Err(e) = game.change_scene(name) {
                            log::error!("Scene change request failed: {}", e);
                        }
                    }
                    None => log::warn!("Scene change requested without a scene name"),
                },
                EventType::StopGame => game.stop_game(),
                _ => {}
            }
        });
    }

    /// Dispatch a transition event without triggering the internal listener for it
    fn announce(&self, mut event: GameEvent) {
        self.state
            .announcing
            .borrow_mut()
            .push(event.event_type().clone());
        self.dispatch_event(&mut event);
        let mut announcing = self.state.announcing.borrow_mut();
        if let Some(position) = announcing.iter().rposition(|announced| announced == event.event_type()) {
            announcing.remove(position);
        }
    }

    /// Shared asset fetcher handed to scenes when they load
    pub fn fetcher(&self) -> &AssetFetcher {
        &self.state.fetcher
    }

    /// Register a scene under `name`, returning the scene it replaces
    pub fn add_scene(&self, name: impl Into<String>, scene: Scene) -> Option<Scene> {
        let name = name.into();
        if let Some(interval) = self.state.min_update_interval {
            scene.set_min_update_interval(interval);
        }
        log::debug!("Scene '{}' registered", name);
        self.state.scenes.borrow_mut().insert(name, scene)
    }

    /// Unregister a scene, deactivating it if it is active
    pub fn remove_scene(&self, name: &str) -> Option<Scene> {
        let scene = self.state.scenes.borrow_mut().remove(name)?;
        let was_active = self
            .state
            .active
            .borrow()
            .as_ref()
            .is_some_and(|(_, active)| active.ptr_eq(&scene));
        if was_active {
            self.stop_propagating_from(&scene);
            *self.state.active.borrow_mut() = None;
            self.state.loaded.set(false);
            log::info!("Active scene '{}' removed", name);
        }
        Some(scene)
    }

    /// Scene registered under `name`
    pub fn get_scene(&self, name: &str) -> Option<Scene> {
        self.state.scenes.borrow().get(name).cloned()
    }

    /// Currently active scene
    pub fn active_scene(&self) -> Option<Scene> {
        self.state
            .active
            .borrow()
            .as_ref()
            .map(|(_, scene)| scene.clone())
    }

    /// Name of the currently active scene
    pub fn active_scene_name(&self) -> Option<String> {
        self.state
            .active
            .borrow()
            .as_ref()
            .map(|(name, _)| name.clone())
    }

    /// Whether the active scene finished loading
    pub fn is_loaded(&self) -> bool {
        self.state.loaded.get()
    }

    /// Whether the frame loop is running
    pub fn is_running(&self) -> bool {
        self.state.running.get()
    }

    /// Make the scene registered under `name` active
    ///
    /// The scene is marked not loaded; a running loop loads it before its
    /// first update. Fires a bubbling `changeScene` event on the game.
    pub fn change_scene(&self, name: &str) -> Result<(), EcsError> {
        let scene = self
            .get_scene(name)
            .ok_or_else(|| EcsError::UnknownScene(name.to_string()))?;

        let previous = self.state.active.borrow_mut().take();
        if let Some((_, previous)) = previous {
            self.stop_propagating_from(&previous);
        }
        self.propagate_events_from(&scene);
        *self.state.active.borrow_mut() = Some((name.to_string(), scene));
        self.state.loaded.set(false);
        log::info!("Changed scene to '{}'", name);

        self.announce(
            GameEvent::new(EventType::ChangeScene, true)
                .with_arg("scene", EventArg::Text(name.to_string())),
        );
        Ok(())
    }

    async fn load_active(&self) {
        let Some(scene) = self.active_scene() else {
            return;
        };
        scene.load(&self.state.fetcher).await;

        let still_active = self
            .active_scene()
            .is_some_and(|active| active.ptr_eq(&scene));
        if still_active {
            scene.reset_update_clock();
            self.state.loaded.set(true);
        }
    }

    /// Activate and load `name` if needed, then update it every frame until stopped
    pub async fn run(&self, name: &str) -> Result<(), EcsError> {
        if self.is_running() {
            log::warn!("Game is already running");
            return Ok(());
        }
        if self.active_scene_name().as_deref() != Some(name) {
            self.change_scene(name)?;
        }
        if !self.is_loaded() {
            self.load_active().await;
        }

        self.state.running.set(true);
        log::info!("Game loop started with scene '{}'", name);
        while self.is_running() {
            let timestamp = self.state.scheduler.next_frame().await;
            if !self.is_running() {
                break;
            }
            let Some(scene) = self.active_scene() else {
                log::warn!("No active scene left, stopping the game loop");
                self.state.running.set(false);
                break;
            };
            if !self.is_loaded() {
                self.load_active().await;
                continue;
            }
            scene.update(timestamp);
        }
        log::info!("Game loop stopped");
        Ok(())
    }

    /// Stop the frame loop after the current frame and fire a bubbling `stopGame`
    pub fn stop_game(&self) {
        self.state.running.set(false);
        log::info!("Stopping game");
        self.announce(GameEvent::new(EventType::StopGame, true));
    }
}

impl EventEmitter for Game {
    fn event_target(&self) -> &EventTarget {
        &self.state.events
    }
}

impl fmt::Debug for Game {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Game")
            .field("scenes", &self.state.scenes.borrow().len())
            .field("active", &self.active_scene_name())
            .field("loaded", &self.is_loaded())
            .field("running", &self.is_running())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryFetch;
    use crate::ecs::System;
    use futures::executor::block_on;

    fn game() -> Game {
        Game::new(AssetFetcher::new(MemoryFetch::new()), FixedStepFrames::new(20.0))
    }

    /// System that stops the game after `frames` updates
    fn stop_after(frames: usize, log: &Rc<RefCell<Vec<String>>>, label: &'static str) -> System {
        let system = System::new(label);
        let updates = Rc::new(Cell::new(0));
        let inner = system.clone();
        let log = Rc::clone(log);
        system.on(EventType::Update, move |_event: &mut GameEvent| {
            updates.set(updates.get() + 1);
            log.borrow_mut().push(format!("{label} update"));
            if updates.get() >= frames {
                inner.stop_game();
            }
        });
        system
    }

    fn log_loads(scene: &Scene, log: &Rc<RefCell<Vec<String>>>, label: &'static str) {
        let log = Rc::clone(log);
        scene.on(EventType::Load, move |_event: &mut GameEvent| {
            log.borrow_mut().push(format!("{label} load"));
        });
    }

    #[test]
    fn test_change_scene_unknown_fails() {
        let game = game();
        assert_eq!(
            game.change_scene("nowhere"),
            Err(EcsError::UnknownScene("nowhere".to_string()))
        );
        assert!(game.active_scene().is_none());
    }

    #[test]
    fn test_change_scene_announces_once() {
        let game = game();
        game.add_scene("menu", Scene::new());
        let announced = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&announced);
        game.on(EventType::ChangeScene, move |event: &mut GameEvent| {
            log.borrow_mut().extend(event.get_scene_name().map(str::to_string));
        });

        game.change_scene("menu").unwrap();
        assert_eq!(*announced.borrow(), vec!["menu"]);
        assert_eq!(game.active_scene_name().as_deref(), Some("menu"));
        assert!(!game.is_loaded());
        assert_eq!(game.event_target().listener_count(&EventType::ChangeScene), 2);
    }

    #[test]
    fn test_run_loads_then_updates_until_stopped() {
        let game = game();
        let log = Rc::new(RefCell::new(Vec::new()));
        let scene = Scene::new();
        log_loads(&scene, &log, "main");
        scene.set_system("stopper", stop_after(3, &log, "main"));
        game.add_scene("main", scene);

        let stops = Rc::new(Cell::new(0));
        let counter = Rc::clone(&stops);
        game.on(EventType::StopGame, move |_event: &mut GameEvent| counter.set(counter.get() + 1));

        block_on(game.run("main")).unwrap();
        assert!(!game.is_running());
        assert!(game.is_loaded());
        assert_eq!(
            *log.borrow(),
            vec!["main load", "main update", "main update", "main update"]
        );
        assert_eq!(stops.get(), 1);
    }

    #[test]
    fn test_run_skips_load_for_loaded_active_scene() {
        let game = game();
        let log = Rc::new(RefCell::new(Vec::new()));
        let scene = Scene::new();
        log_loads(&scene, &log, "main");
        scene.set_system("stopper", stop_after(1, &log, "main"));
        game.add_scene("main", scene);

        block_on(game.run("main")).unwrap();
        block_on(game.run("main")).unwrap();
        let loads = log.borrow().iter().filter(|entry| *entry == "main load").count();
        assert_eq!(loads, 1);
    }

    #[test]
    fn test_scene_switched_mid_loop_loads_before_update() {
        let game = game();
        let log = Rc::new(RefCell::new(Vec::new()));

        let menu = Scene::new();
        log_loads(&menu, &log, "menu");
        let switcher = System::new("switcher");
        let inner = switcher.clone();
        let menu_log = Rc::clone(&log);
        switcher.on(EventType::Update, move |_event: &mut GameEvent| {
            menu_log.borrow_mut().push("menu update".to_string());
            inner.change_scene("level");
        });
        menu.set_system("switcher", switcher);

        let level = Scene::new();
        log_loads(&level, &log, "level");
        level.set_system("stopper", stop_after(2, &log, "level"));

        game.add_scene("menu", menu);
        game.add_scene("level", level);
        block_on(game.run("menu")).unwrap();

        assert_eq!(game.active_scene_name().as_deref(), Some("level"));
        assert_eq!(
            *log.borrow(),
            vec!["menu load", "menu update", "level load", "level update", "level update"]
        );
    }

    #[test]
    fn test_unknown_scene_request_keeps_running_scene() {
        let game = game();
        let scene = Scene::new();
        let system = System::new("lost");
        let inner = system.clone();
        system.on(EventType::Update, move |_event: &mut GameEvent| {
            inner.change_scene("missing");
            inner.stop_game();
        });
        scene.set_system("lost", system);
        game.add_scene("main", scene);

        block_on(game.run("main")).unwrap();
        assert_eq!(game.active_scene_name().as_deref(), Some("main"));
    }

    #[test]
    fn test_remove_active_scene() {
        let game = game();
        game.add_scene("main", Scene::new());
        game.change_scene("main").unwrap();
        assert!(game.remove_scene("main").is_some());
        assert!(game.active_scene().is_none());
        assert!(game.remove_scene("main").is_none());
        assert!(matches!(block_on(game.run("main")), Err(EcsError::UnknownScene(_))));
    }

    #[test]
    fn test_removing_active_scene_mid_run_ends_loop() {
        let game = game();
        let scene = Scene::new();
        let updates = Rc::new(Cell::new(0));
        let system = System::new("remover");
        let handle = game.clone();
        let counter = Rc::clone(&updates);
        system.on(EventType::Update, move |_event: &mut GameEvent| {
            counter.set(counter.get() + 1);
            handle.remove_scene("main");
        });
        scene.set_system("remover", system);
        game.add_scene("main", scene);

        block_on(game.run("main")).unwrap();
        assert_eq!(updates.get(), 1);
        assert!(!game.is_running());
        assert!(game.active_scene().is_none());
    }

    #[test]
    fn test_transition_listener_keeps_its_place() {
        let game = game();
        for name in ["a", "b"] {
            game.add_scene(name, Scene::new());
        }
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let handle = game.clone();
        game.on(EventType::ChangeScene, move |_event: &mut GameEvent| {
            log.borrow_mut().extend(handle.active_scene_name());
        });

        game.change_scene("a").unwrap();
        let mut request = GameEvent::new(EventType::ChangeScene, true)
            .with_arg("scene", EventArg::Text("b".to_string()));
        game.active_scene().unwrap().dispatch_event(&mut request);

        // The game switches before user listeners see the bubbled request
        assert_eq!(*seen.borrow(), vec!["a", "b"]);
    }

    #[test]
    fn test_fixed_step_frames() {
        let frames = FixedStepFrames::new(10.0);
        let stamps: Vec<f64> = (0..3).map(|_| block_on(frames.next_frame())).collect();
        assert_eq!(stamps, vec![0.0, 10.0, 20.0]);
    }

    #[test]
    fn test_realtime_frames_are_monotonic() {
        let frames = RealtimeFrames::new(1000);
        let first = block_on(frames.next_frame());
        let second = block_on(frames.next_frame());
        assert!(second >= first);
        assert_eq!(frames.frame_count(), 2);
    }

    #[test]
    fn test_with_config_applies_tick_interval() {
        let config = GameConfig::new().with_max_update_rate(50.0);
        let game = Game::with_config(&config);
        let scene = Scene::new();
        game.add_scene("main", scene.clone());
        assert!((scene.min_update_interval() - 50.0).abs() < f64::EPSILON);
    }
}
