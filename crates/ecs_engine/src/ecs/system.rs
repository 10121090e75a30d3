//! Systems: event-driven units of per-frame behaviour
//!
//! A system owns no entity storage. The scene it is attached to injects
//! accessors for reading and adding entities, and everything else happens
//! through events: listeners on `mounted`, `load`, `loaded` and `update`
//! implement the behaviour, while `stopGame` and `changeScene` bubble up to
//! the owning scene and game.

use super::{ComponentIndexer, EcsError, Entity, IndexValue};
use crate::assets::{AssetFetcher, AssetMap};
use crate::events::{EventArg, EventEmitter, EventTarget, EventType, GameEvent};
use crate::foundation::collections::Collection;
use std::cell::RefCell;
use std::fmt;
use std::future::Future;
use std::rc::Rc;

type GetEntities = Rc<dyn Fn() -> Collection<Entity>>;
type GetIndex = Rc<dyn Fn(&str) -> Option<Collection<IndexValue>>>;
type AddEntity = Rc<dyn Fn(Entity)>;

/// Entity accessors a scene injects into its systems
#[derive(Clone)]
pub struct SceneAccess {
    get_entities: GetEntities,
    get_index: GetIndex,
    add_entity: AddEntity,
}

impl SceneAccess {
    /// Bundle accessor functions
    pub fn new<E, I, A>(get_entities: E, get_index: I, add_entity: A) -> Self
    where
        E: Fn() -> Collection<Entity> + 'static,
        I: Fn(&str) -> Option<Collection<IndexValue>> + 'static,
        A: Fn(Entity) + 'static,
    {
        Self {
            get_entities: Rc::new(get_entities),
            get_index: Rc::new(get_index),
            add_entity: Rc::new(add_entity),
        }
    }
}

struct SystemState {
    name: String,
    events: EventTarget,
    access: RefCell<Option<SceneAccess>>,
}

/// Unit of per-frame behaviour driven by events
#[derive(Clone)]
pub struct System {
    state: Rc<SystemState>,
}

impl System {
    /// Create a system with no listeners
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            state: Rc::new(SystemState {
                name: name.into(),
                events: EventTarget::new(),
                access: RefCell::new(None),
            }),
        }
    }

    /// Name used in logs and errors
    pub fn name(&self) -> &str {
        &self.state.name
    }

    /// Inject scene accessors
    pub fn set_scene_access(&self, access: SceneAccess) {
        *self.state.access.borrow_mut() = Some(access);
    }

    /// Remove scene accessors
    pub fn clear_scene_access(&self) {
        *self.state.access.borrow_mut() = None;
    }

    /// Whether scene accessors are injected
    pub fn is_mounted(&self) -> bool {
        self.state.access.borrow().is_some()
    }

    fn access(&self) -> Result<SceneAccess, EcsError> {
        self.state
            .access
            .borrow()
            .clone()
            .ok_or_else(|| EcsError::SystemNotMounted(self.state.name.clone()))
    }

    /// Every entity of the owning scene
    pub fn get_entities(&self) -> Result<Collection<Entity>, EcsError> {
        let access = self.access()?;
        Ok((access.get_entities)())
    }

    /// Derived subset `name` of the owning scene, `None` if no such index exists
    pub fn get_index(&self, name: &str) -> Result<Option<Collection<IndexValue>>, EcsError> {
        let access = self.access()?;
        Ok((access.get_index)(name))
    }

    /// Add an entity to the owning scene
    pub fn add_entity(&self, entity: Entity) -> Result<(), EcsError> {
        let access = self.access()?;
        (access.add_entity)(entity);
        Ok(())
    }

    /// Fire `mounted` with the scene's entities and the component index helper
    pub fn mounted(&self, entities: Collection<Entity>, indexer: ComponentIndexer) {
        log::debug!("System '{}' mounted ({} entities)", self.name(), entities.len());
        let mut event = GameEvent::new(EventType::Mounted, false)
            .with_arg("entities", EventArg::Entities(entities))
            .with_arg("indexer", EventArg::Indexer(indexer));
        self.dispatch_event(&mut event);
    }

    /// Fire `load`; listeners queue their assets on `fetcher`
    ///
    /// Listeners run when this is called; the future waits for their completion.
    pub fn load(&self, fetcher: &AssetFetcher) -> impl Future<Output = ()> + 'static {
        let event = GameEvent::new(EventType::Load, false)
            .with_arg("fetcher", EventArg::Fetcher(fetcher.clone()));
        let dispatch = self.event_target().dispatch_event_async(event);
        async move {
            dispatch.await;
        }
    }

    /// Fire `loaded` with the resolved assets
    pub fn loaded(&self, assets: AssetMap) -> impl Future<Output = ()> + 'static {
        let event = GameEvent::new(EventType::Loaded, false)
            .with_arg("assets", EventArg::Assets(assets));
        let dispatch = self.event_target().dispatch_event_async(event);
        async move {
            dispatch.await;
        }
    }

    /// Fire `update`; runs on every scene tick
    pub fn update(&self, entities: Collection<Entity>, delta_time: f64, timestamp: f64) {
        let mut event = GameEvent::new(EventType::Update, false)
            .with_arg("entities", EventArg::Entities(entities))
            .with_arg("delta_time", EventArg::Number(delta_time))
            .with_arg("time", EventArg::Number(timestamp));
        self.dispatch_event(&mut event);
    }

    /// Ask the game to stop; bubbles through the owning scene
    pub fn stop_game(&self) {
        log::info!("System '{}' requested game stop", self.name());
        self.dispatch_event(&mut GameEvent::new(EventType::StopGame, true));
    }

    /// Ask the game to switch scenes; bubbles through the owning scene
    pub fn change_scene(&self, name: &str) {
        log::info!("System '{}' requested scene change to '{}'", self.name(), name);
        let mut event = GameEvent::new(EventType::ChangeScene, true)
            .with_arg("scene", EventArg::Text(name.to_string()));
        self.dispatch_event(&mut event);
    }

    /// Whether both handles refer to the same system
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl EventEmitter for System {
    fn event_target(&self) -> &EventTarget {
        &self.state.events
    }
}

impl fmt::Debug for System {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("System")
            .field("name", &self.state.name)
            .field("mounted", &self.is_mounted())
            .finish()
    }
}
