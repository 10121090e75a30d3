//! Scene: entity storage, system scheduling and the load pipeline
//!
//! A scene owns one [`IndexedCollection`] of entities. Structural changes on
//! member entities (`setComponent`, `removeComponent`) are reported through
//! `observableChange` before they happen, so the scene only marks the entity
//! as pending and reindexes it lazily: before any query, before registering
//! an index and before each tick.

use super::{Component, Entity, SceneAccess, System};
use crate::assets::{AssetFetcher, AssetMap};
use crate::events::{EventArg, EventEmitter, EventTarget, EventType, GameEvent, ListenerId};
use crate::foundation::collections::{Collection, IndexedCollection};
use futures::future::join_all;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

/// Minimum interval between two advancing ticks, in milliseconds
pub const MAX_UPDATE_RATE: f64 = 1000.0 / 60.0;

/// Slack when comparing a tick's delta against the interval; timestamps are
/// sums of float frame steps
const TICK_TOLERANCE_MS: f64 = 1e-6;

/// Value stored in a scene index
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IndexValue {
    /// The matching entity itself
    Entity(Entity),
    /// A component of the matching entity
    Component(Component),
}

impl IndexValue {
    /// The entity, for entity-valued indexes
    pub fn as_entity(&self) -> Option<&Entity> {
        match self {
            Self::Entity(entity) => Some(entity),
            Self::Component(_) => None,
        }
    }

    /// The component, for component-valued indexes
    pub fn as_component(&self) -> Option<&Component> {
        match self {
            Self::Component(component) => Some(component),
            Self::Entity(_) => None,
        }
    }

    /// The entity this value was derived from
    pub fn entity(&self) -> Option<Entity> {
        match self {
            Self::Entity(entity) => Some(entity.clone()),
            Self::Component(component) => component.get_parent_entity(),
        }
    }
}

impl From<Entity> for IndexValue {
    fn from(entity: Entity) -> Self {
        Self::Entity(entity)
    }
}

impl From<Component> for IndexValue {
    fn from(component: Component) -> Self {
        Self::Component(component)
    }
}

/// Helper handed to systems on `mounted` for declaring component dependencies
#[derive(Clone)]
pub struct ComponentIndexer {
    scene: Weak<SceneState>,
}

impl ComponentIndexer {
    /// For each name, index the component of that name on every entity having one
    ///
    /// The index is registered under the component name. Names that are
    /// already indexed keep their existing indexer.
    pub fn index_components(&self, names: &[&str]) {
        let Some(scene) = self.scene.upgrade().map(|state| Scene { state }) else {
            log::warn!("Component indexer used after its scene was dropped");
            return;
        };
        for name in names {
            let component_name = name.to_string();
            scene.set_index(*name, move |entity: &Entity| {
                entity
                    .get_component(&component_name)
                    .map(IndexValue::Component)
            });
        }
    }
}

impl fmt::Debug for ComponentIndexer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ComponentIndexer")
            .field("attached", &(self.scene.strong_count() > 0))
            .finish()
    }
}

struct SceneState {
    entities: RefCell<IndexedCollection<Entity, IndexValue>>,
    /// Entities whose components changed since they were last indexed
    pending: RefCell<Collection<Entity>>,
    watchers: RefCell<HashMap<Entity, ListenerId>>,
    /// Insertion order is run order
    systems: RefCell<Vec<(String, System)>>,
    events: EventTarget,
    last_update: Cell<Option<f64>>,
    min_update_interval: Cell<f64>,
}

/// Entity storage plus an ordered set of systems
///
/// Cloning the handle shares the same scene. Index functions run while the
/// scene's storage is borrowed and must not call back into the scene.
#[derive(Clone)]
pub struct Scene {
    state: Rc<SceneState>,
}

impl Scene {
    /// Create an empty scene
    pub fn new() -> Self {
        Self {
            state: Rc::new(SceneState {
                entities: RefCell::new(IndexedCollection::new()),
                pending: RefCell::new(Collection::new()),
                watchers: RefCell::new(HashMap::new()),
                systems: RefCell::new(Vec::new()),
                events: EventTarget::new(),
                last_update: Cell::new(None),
                min_update_interval: Cell::new(MAX_UPDATE_RATE),
            }),
        }
    }

    /// Override the minimum tick interval in milliseconds
    pub fn set_min_update_interval(&self, interval_ms: f64) {
        self.state.min_update_interval.set(interval_ms.max(0.0));
    }

    /// Current minimum tick interval in milliseconds
    pub fn min_update_interval(&self) -> f64 {
        self.state.min_update_interval.get()
    }

    /// Add an entity and run it through every index
    ///
    /// Adding a member again reindexes it.
    pub fn add_entity(&self, entity: Entity) {
        self.flush_pending();
        self.state.entities.borrow_mut().add(entity.clone());

        if self.state.watchers.borrow().contains_key(&entity) {
            return;
        }
        let scene = Rc::downgrade(&self.state);
        let watched = entity.downgrade();
        let listener = entity.on(EventType::ObservableChange, move |_event: &mut GameEvent| {
            if let (Some(scene), Some(entity)) = (scene.upgrade(), watched.upgrade()) {
                scene.pending.borrow_mut().add(entity);
            }
        });
        self.state.watchers.borrow_mut().insert(entity.clone(), listener);
        log::trace!("Entity {} added to scene", entity.id());
    }

    /// Remove an entity and everything indexed from it
    pub fn delete_entity(&self, entity: &Entity) -> bool {
        self.state.pending.borrow_mut().delete(entity);
        if let Some(listener) = self.state.watchers.borrow_mut().remove(entity) {
            entity.remove_event_listener(&EventType::ObservableChange, listener);
        }
        let removed = self.state.entities.borrow_mut().delete(entity);
        if removed {
            log::trace!("Entity {} removed from scene", entity.id());
        }
        removed
    }

    /// Whether the entity is a member
    pub fn has_entity(&self, entity: &Entity) -> bool {
        self.state.entities.borrow().has(entity)
    }

    /// Register a named index over the entities
    ///
    /// Registering an existing name is a no-op and returns `false`.
    pub fn set_index<F>(&self, name: impl Into<String>, indexer: F) -> bool
    where
        F: Fn(&Entity) -> Option<IndexValue> + 'static,
    {
        self.flush_pending();
        self.state.entities.borrow_mut().set_index(name, indexer)
    }

    /// Snapshot of every entity
    pub fn get_entities(&self) -> Collection<Entity> {
        self.flush_pending();
        self.state.entities.borrow().items().clone()
    }

    /// Snapshot of the index `name`, `None` if no such index is registered
    pub fn get_index(&self, name: &str) -> Option<Collection<IndexValue>> {
        self.flush_pending();
        self.state.entities.borrow().get_indexed(name).cloned()
    }

    /// Recompute the index entries of one entity now
    pub fn reindex_entity(&self, entity: &Entity) {
        self.state.pending.borrow_mut().delete(entity);
        self.state.entities.borrow_mut().reindex_item(entity);
    }

    fn flush_pending(&self) {
        let pending = std::mem::take(&mut *self.state.pending.borrow_mut());
        if pending.is_empty() {
            return;
        }
        log::trace!("Reindexing {} changed entities", pending.len());
        let mut entities = self.state.entities.borrow_mut();
        for entity in &pending {
            entities.reindex_item(entity);
        }
    }

    /// Attach a system under `name`, replacing any system already registered there
    ///
    /// The system's events bubble to this scene, it gains entity accessors bound
    /// to this scene and receives `mounted` before it is registered.
    pub fn set_system(&self, name: impl Into<String>, system: System) {
        let name = name.into();
        if self.remove_system(&name).is_some() {
            log::debug!("Replacing system '{}'", name);
        }

        self.propagate_events_from(&system);
        let entities = Rc::downgrade(&self.state);
        let index = Rc::downgrade(&self.state);
        let adder = Rc::downgrade(&self.state);
        system.set_scene_access(SceneAccess::new(
            move || {
                entities
                    .upgrade()
                    .map(|state| Scene { state }.get_entities())
                    .unwrap_or_default()
            },
            move |name| index.upgrade().and_then(|state| Scene { state }.get_index(name)),
            move |entity| {
                if let Some(state) = adder.upgrade() {
                    Scene { state }.add_entity(entity);
                }
            },
        ));

        let indexer = ComponentIndexer {
            scene: Rc::downgrade(&self.state),
        };
        system.mounted(self.get_entities(), indexer);

        log::debug!("System '{}' attached as '{}'", system.name(), name);
        self.state.systems.borrow_mut().push((name, system));
    }

    /// System registered under `name`
    pub fn get_system(&self, name: &str) -> Option<System> {
        self.state
            .systems
            .borrow()
            .iter()
            .find(|(registered, _)| registered == name)
            .map(|(_, system)| system.clone())
    }

    /// Detach and return the system registered under `name`
    pub fn remove_system(&self, name: &str) -> Option<System> {
        let system = {
            let mut systems = self.state.systems.borrow_mut();
            let position = systems.iter().position(|(registered, _)| registered == name)?;
            systems.remove(position).1
        };
        self.stop_propagating_from(&system);
        system.clear_scene_access();
        log::debug!("System '{}' detached", name);
        Some(system)
    }

    /// Registered system names in run order
    pub fn system_names(&self) -> Vec<String> {
        self.state
            .systems
            .borrow()
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    fn systems(&self) -> Vec<System> {
        self.state
            .systems
            .borrow()
            .iter()
            .map(|(_, system)| system.clone())
            .collect()
    }

    /// Run the load pipeline and resolve with every fetched asset
    ///
    /// 1. Bubbling `load` on the scene, awaited.
    /// 2. `load` on every system; their listeners queue assets on `fetcher`.
    /// 3. Fetch everything queued, relaying `fetchProgress` through the scene.
    /// 4. Bubbling `loaded` on the scene and `loaded` on every system, together
    ///    with the remaining system `load` work.
    pub async fn load(&self, fetcher: &AssetFetcher) -> AssetMap {
        log::info!("Scene load: setup");
        let setup = GameEvent::new(EventType::Load, true)
            .with_arg("fetcher", EventArg::Fetcher(fetcher.clone()));
        self.dispatch_event_async(setup).await;

        let systems = self.systems();
        let system_loads: Vec<_> = systems.iter().map(|system| system.load(fetcher)).collect();

        log::info!("Scene load: fetching {} queued assets", fetcher.queued().len());
        self.propagate_events_from(fetcher);
        let fetched = fetcher.fetch_assets().await;
        self.stop_propagating_from(fetcher);
        let assets: AssetMap = fetched.into_iter().collect();

        let loaded = GameEvent::new(EventType::Loaded, true)
            .with_arg("assets", EventArg::Assets(assets.clone()));
        let scene_loaded = self.dispatch_event_async(loaded);
        let systems_loaded: Vec<_> = systems
            .iter()
            .map(|system| system.loaded(assets.clone()))
            .collect();
        futures::join!(scene_loaded, join_all(systems_loaded), join_all(system_loads));

        log::info!("Scene load: complete ({} assets)", assets.len());
        assets
    }

    /// Advance the scene by one tick
    ///
    /// The first call records the baseline only. Later calls run when the
    /// elapsed time is zero or at least the minimum tick interval: every system
    /// updates in registration order, then the scene fires a bubbling `update`.
    /// Returns whether the tick advanced.
    #[allow(clippy::float_cmp)]
    pub fn update(&self, timestamp: f64) -> bool {
        let Some(last_update) = self.state.last_update.get() else {
            self.state.last_update.set(Some(timestamp));
            return false;
        };
        let delta_time = timestamp - last_update;
        if delta_time != 0.0 && delta_time + TICK_TOLERANCE_MS < self.min_update_interval() {
            return false;
        }

        for system in self.systems() {
            system.update(self.get_entities(), delta_time, timestamp);
        }
        let mut event = GameEvent::new(EventType::Update, true)
            .with_arg("delta_time", EventArg::Number(delta_time))
            .with_arg("time", EventArg::Number(timestamp));
        self.dispatch_event(&mut event);

        self.state.last_update.set(Some(timestamp));
        true
    }

    /// Forget the tick baseline so the next update only records one
    pub fn reset_update_clock(&self) {
        self.state.last_update.set(None);
    }

    /// Whether both handles refer to the same scene
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl Default for Scene {
    fn default() -> Self {
        Self::new()
    }
}

impl EventEmitter for Scene {
    fn event_target(&self) -> &EventTarget {
        &self.state.events
    }
}

impl fmt::Debug for Scene {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Scene")
            .field("entities", &self.state.entities.borrow().len())
            .field("systems", &self.system_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::assets::MemoryFetch;
    use futures::executor::block_on;
    use serde_json::json;

    fn keyed(value: i64) -> Entity {
        let entity = Entity::new();
        let component = Component::from_value(json!({ "value": value })).unwrap();
        entity.set_component("key", component);
        entity
    }

    fn key_is_five(entity: &Entity) -> Option<IndexValue> {
        let value = entity.get_component("key")?.get("value")?;
        (value == json!(5)).then(|| IndexValue::Entity(entity.clone()))
    }

    #[test]
    fn test_index_counts_matching_entities() {
        let scene = Scene::new();
        scene.set_index("test", key_is_five);
        scene.add_entity(keyed(5));
        scene.add_entity(keyed(5));
        scene.add_entity(keyed(3));

        assert_eq!(scene.get_index("test").map(|index| index.len()), Some(2));
        assert_eq!(scene.get_entities().len(), 3);
        assert!(scene.get_index("missing").is_none());
    }

    #[test]
    fn test_index_registered_after_population() {
        let scene = Scene::new();
        let entities = [keyed(5), keyed(1)];
        for entity in &entities {
            scene.add_entity(entity.clone());
        }
        assert!(scene.set_index("test", key_is_five));
        assert!(!scene.set_index("test", |_entity: &Entity| None));

        let index = scene.get_index("test").unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.has(&IndexValue::Entity(entities[0].clone())));
    }

    #[test]
    fn test_component_changes_reindex_lazily() {
        let scene = Scene::new();
        let entity = Entity::new();
        scene.add_entity(entity.clone());
        ComponentIndexer {
            scene: Rc::downgrade(&scene.state),
        }
        .index_components(&["sprite"]);
        assert_eq!(scene.get_index("sprite").map(|index| index.len()), Some(0));

        let sprite = Component::new();
        entity.set_component("sprite", sprite.clone());
        let index = scene.get_index("sprite").unwrap();
        assert!(index.has(&IndexValue::Component(sprite.clone())));

        let replacement = Component::new();
        entity.set_component("sprite", replacement.clone());
        let index = scene.get_index("sprite").unwrap();
        assert_eq!(index.len(), 1);
        assert!(index.has(&IndexValue::Component(replacement)));

        entity.remove_component("sprite");
        assert_eq!(scene.get_index("sprite").map(|index| index.len()), Some(0));
    }

    #[test]
    fn test_deleted_entity_is_no_longer_watched() {
        let scene = Scene::new();
        scene.set_index("key", |entity: &Entity| {
            entity.get_component("key").map(IndexValue::Component)
        });
        let entity = keyed(1);
        scene.add_entity(entity.clone());
        assert!(scene.delete_entity(&entity));
        assert!(!scene.delete_entity(&entity));
        assert!(!scene.has_entity(&entity));

        entity.set_component("key", Component::new());
        assert_eq!(scene.get_index("key").map(|index| index.len()), Some(0));
        assert_eq!(entity.event_target().listener_count(&EventType::ObservableChange), 0);
    }

    #[test]
    fn test_index_value_entity() {
        let entity = keyed(5);
        let component = entity.get_component("key").unwrap();
        assert_eq!(IndexValue::from(component.clone()).entity(), Some(entity.clone()));
        assert_eq!(IndexValue::from(entity.clone()).as_entity(), Some(&entity));
        assert!(IndexValue::from(entity).as_component().is_none());
    }

    #[test]
    fn test_set_system_wiring() {
        let scene = Scene::new();
        scene.add_entity(keyed(5));
        let system = System::new("render");
        let mounted = Rc::new(Cell::new(0));
        let count = Rc::clone(&mounted);
        system.on(EventType::Mounted, move |event: &mut GameEvent| {
            count.set(event.get_entities().map_or(0, Collection::len));
            if let Some(indexer) = event.get_indexer() {
                indexer.index_components(&["key"]);
            }
        });

        scene.set_system("render", system.clone());
        assert_eq!(mounted.get(), 1);
        assert_eq!(scene.get_index("key").map(|index| index.len()), Some(1));
        assert_eq!(system.get_entities().map(|entities| entities.len()), Ok(1));

        system.add_entity(Entity::new()).unwrap();
        assert_eq!(scene.get_entities().len(), 2);

        let stopped = Rc::new(Cell::new(false));
        let flag = Rc::clone(&stopped);
        scene.on(EventType::StopGame, move |_event: &mut GameEvent| flag.set(true));
        system.stop_game();
        assert!(stopped.get());

        assert!(scene.remove_system("render").is_some());
        assert!(system.get_entities().is_err());
        assert!(scene.system_names().is_empty());
    }

    #[test]
    fn test_systems_run_in_registration_order() {
        let scene = Scene::new();
        let order = Rc::new(RefCell::new(Vec::new()));
        for name in ["physics", "render", "sound"] {
            let system = System::new(name);
            let log = Rc::clone(&order);
            system.on(EventType::Update, move |_event: &mut GameEvent| {
                log.borrow_mut().push(name);
            });
            scene.set_system(name, system);
        }
        let log = Rc::clone(&order);
        scene.on(EventType::Update, move |_event: &mut GameEvent| {
            log.borrow_mut().push("scene");
        });

        scene.update(0.0);
        assert!(scene.update(0.0));
        assert_eq!(*order.borrow(), vec!["physics", "render", "sound", "scene"]);
        assert_eq!(scene.system_names(), vec!["physics", "render", "sound"]);
    }

    #[test]
    fn test_update_throttle() {
        let scene = Scene::new();
        let t0 = 1000.0;
        assert!(!scene.update(t0));
        assert!(scene.update(t0));
        assert!(!scene.update(t0 + 1.0));
        assert!(scene.update(t0 + MAX_UPDATE_RATE));

        scene.reset_update_clock();
        assert!(!scene.update(t0 + 5000.0));
    }

    #[test]
    fn test_update_every_frame_interval_advances() {
        let scene = Scene::new();
        let t0 = 1000.0;
        scene.update(t0);
        for frame in 1..=120 {
            let timestamp = t0 + f64::from(frame) * MAX_UPDATE_RATE;
            assert!(scene.update(timestamp), "frame {} was throttled", frame);
        }
        assert!(!scene.update(t0 + 120.5 * MAX_UPDATE_RATE));
    }

    #[test]
    fn test_load_pipeline_phases() {
        let scene = Scene::new();
        let fetcher = AssetFetcher::new(MemoryFetch::new().with_asset("level.json", r#"{"rocks": 3}"#));
        let phases = Rc::new(RefCell::new(Vec::new()));

        let log = Rc::clone(&phases);
        scene.on_async(EventType::Load, move |_event: &mut GameEvent| {
            let log = Rc::clone(&log);
            async move { log.borrow_mut().push("scene load".to_string()) }
        });
        let system = System::new("level");
        let log = Rc::clone(&phases);
        system.on(EventType::Load, move |event: &mut GameEvent| {
            log.borrow_mut().push("system load".to_string());
            if let Some(fetcher) = event.get_fetcher() {
                fetcher.queue_asset("level.json");
            }
        });
        let log = Rc::clone(&phases);
        system.on(EventType::Loaded, move |event: &mut GameEvent| {
            let rocks = event
                .get_assets()
                .and_then(|assets| assets.get("level.json"))
                .and_then(|asset| asset.as_json())
                .and_then(|level| level["rocks"].as_i64());
            log.borrow_mut().push(format!("system loaded {rocks:?}"));
        });
        scene.set_system("level", system);

        let log = Rc::clone(&phases);
        scene.on(EventType::FetchProgress, move |event: &mut GameEvent| {
            log.borrow_mut().push(format!("progress {:?}", event.get_progress()));
        });
        let log = Rc::clone(&phases);
        scene.on(EventType::Loaded, move |_event: &mut GameEvent| {
            log.borrow_mut().push("scene loaded".to_string());
        });

        let assets = block_on(scene.load(&fetcher));
        assert_eq!(assets.len(), 1);
        assert!(fetcher.queued().is_empty());
        assert_eq!(
            *phases.borrow(),
            vec![
                "scene load",
                "system load",
                "progress Some(1.0)",
                "scene loaded",
                "system loaded Some(3)",
            ]
        );
        assert!(fetcher.event_target().parent().is_none());
    }
}
