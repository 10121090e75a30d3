//! Event system with bubbling propagation
//!
//! Key principles:
//! - Key-value arguments (no order dependency)
//! - Listeners registered per event type on an [`EventTarget`]
//! - Bubbling events climb a single-parent chain after local listeners ran
//! - `stop_propagation` halts bubbling, `stop_immediate_propagation` also
//!   halts the remaining listeners on the current node

pub mod observable;
pub mod target;

pub use observable::{Observable, ObservableTarget};
pub use target::{EventEmitter, EventTarget, ListenerId, ListenerOptions};

use crate::assets::{AssetFetcher, AssetMap};
use crate::ecs::{Component, ComponentIndexer, Entity};
use crate::foundation::collections::Collection;
use crate::foundation::time;
use std::cell::Cell;
use std::collections::HashMap;
use std::fmt;

/// Event type identification
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum EventType {
    /// Scene or system asset loading phase
    Load,
    /// Assets resolved for a scene or system
    Loaded,
    /// System attached to a scene
    Mounted,
    /// Per-tick update
    Update,
    /// Request to stop the game loop
    StopGame,
    /// Request to switch the active scene
    ChangeScene,
    /// One queued asset finished fetching
    FetchProgress,
    /// An observed property was written or an observed method was called
    ObservableChange,
    /// Application-defined event
    Custom(String),
}

impl EventType {
    /// Wire name of the event type
    pub fn as_str(&self) -> &str {
        match self {
            Self::Load => "load",
            Self::Loaded => "loaded",
            Self::Mounted => "mounted",
            Self::Update => "update",
            Self::StopGame => "stopGame",
            Self::ChangeScene => "changeScene",
            Self::FetchProgress => "fetchProgress",
            Self::ObservableChange => "observableChange",
            Self::Custom(name) => name,
        }
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<&str> for EventType {
    fn from(name: &str) -> Self {
        match name {
            "load" => Self::Load,
            "loaded" => Self::Loaded,
            "mounted" => Self::Mounted,
            "update" => Self::Update,
            "stopGame" => Self::StopGame,
            "changeScene" => Self::ChangeScene,
            "fetchProgress" => Self::FetchProgress,
            "observableChange" => Self::ObservableChange,
            other => Self::Custom(other.to_string()),
        }
    }
}

/// Variant for type-safe event arguments
/// Uses key-value pairs to avoid order dependency problems
#[derive(Debug, Clone)]
pub enum EventArg {
    /// Arbitrary data value
    Value(serde_json::Value),
    /// Text such as a property or scene name
    Text(String),
    /// Numeric value such as progress or a time delta
    Number(f64),
    /// Ordered list of arguments
    List(Vec<EventArg>),
    /// Entity handle
    Entity(Entity),
    /// Component handle
    Component(Component),
    /// Snapshot of a scene's entities
    Entities(Collection<Entity>),
    /// Helper registering component-presence indexes on a scene
    Indexer(ComponentIndexer),
    /// Shared asset fetcher
    Fetcher(AssetFetcher),
    /// Resolved assets
    Assets(AssetMap),
}

thread_local! {
    static NEXT_EVENT_ID: Cell<u64> = const { Cell::new(1) };
}

/// Event with propagation control and key-value arguments
#[derive(Debug, Clone)]
pub struct GameEvent {
    event_type: EventType,
    bubbles: bool,
    id: u64,
    target: Option<EventTarget>,
    current_target: Option<EventTarget>,
    timestamp: Option<f64>,
    propagate: bool,
    propagate_immediate: bool,
    visited: Vec<u64>,
    args: HashMap<&'static str, EventArg>,
}

impl GameEvent {
    /// Create a new event; `bubbles` decides whether it climbs to parent targets
    pub fn new(event_type: impl Into<EventType>, bubbles: bool) -> Self {
        let id = NEXT_EVENT_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            id
        });
        Self {
            event_type: event_type.into(),
            bubbles,
            id,
            target: None,
            current_target: None,
            timestamp: None,
            propagate: true,
            propagate_immediate: true,
            visited: Vec::new(),
            args: HashMap::new(),
        }
    }

    /// Add an argument to the event (builder pattern)
    pub fn with_arg(mut self, key: &'static str, value: EventArg) -> Self {
        self.args.insert(key, value);
        self
    }

    /// Set an argument on an existing event
    pub fn set_arg(&mut self, key: &'static str, value: EventArg) {
        self.args.insert(key, value);
    }

    /// Get an argument by key
    pub fn get_arg(&self, key: &str) -> Option<&EventArg> {
        self.args.get(key)
    }

    /// Type of event
    pub fn event_type(&self) -> &EventType {
        &self.event_type
    }

    /// Whether the event climbs to parent targets
    pub fn bubbles(&self) -> bool {
        self.bubbles
    }

    /// Target the event was first dispatched on
    pub fn target(&self) -> Option<&EventTarget> {
        self.target.as_ref()
    }

    /// Target whose listeners are currently running
    pub fn current_target(&self) -> Option<&EventTarget> {
        self.current_target.as_ref()
    }

    /// Monotonic time of the first dispatch in milliseconds
    pub fn timestamp(&self) -> Option<f64> {
        self.timestamp
    }

    /// Whether the event will still bubble
    pub fn propagates(&self) -> bool {
        self.propagate
    }

    /// Whether remaining listeners on the current target will still run
    pub fn propagates_immediately(&self) -> bool {
        self.propagate_immediate
    }

    /// Stop bubbling; remaining listeners on the current target still run
    pub fn stop_propagation(&mut self) {
        self.propagate = false;
    }

    /// Stop bubbling and skip the remaining listeners on the current target
    pub fn stop_immediate_propagation(&mut self) {
        self.propagate = false;
        self.propagate_immediate = false;
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    pub(crate) fn has_visited(&self, target_id: u64) -> bool {
        self.visited.contains(&target_id)
    }

    /// Move the event onto `target`, stamping origin and time on first dispatch
    pub(crate) fn enter(&mut self, target: &EventTarget) {
        if self.target.is_none() {
            self.target = Some(target.clone());
            self.timestamp = Some(time::now_ms());
        }
        self.current_target = Some(target.clone());
        self.visited.push(target.id());
    }

    /// Name of the observed member (`observableChange`)
    pub fn get_prop(&self) -> Option<&str> {
        match self.get_arg("prop") {
            Some(EventArg::Text(prop)) => Some(prop),
            _ => None,
        }
    }

    /// Call arguments or written value (`observableChange`)
    pub fn get_args(&self) -> Option<&[EventArg]> {
        match self.get_arg("args") {
            Some(EventArg::List(args)) => Some(args),
            _ => None,
        }
    }

    /// Entity snapshot (`mounted`, `update`)
    pub fn get_entities(&self) -> Option<&Collection<Entity>> {
        match self.get_arg("entities") {
            Some(EventArg::Entities(entities)) => Some(entities),
            _ => None,
        }
    }

    /// Component index helper (`mounted`)
    pub fn get_indexer(&self) -> Option<&ComponentIndexer> {
        match self.get_arg("indexer") {
            Some(EventArg::Indexer(indexer)) => Some(indexer),
            _ => None,
        }
    }

    /// Shared asset fetcher (`load`)
    pub fn get_fetcher(&self) -> Option<&AssetFetcher> {
        match self.get_arg("fetcher") {
            Some(EventArg::Fetcher(fetcher)) => Some(fetcher),
            _ => None,
        }
    }

    /// Resolved assets (`loaded`)
    pub fn get_assets(&self) -> Option<&AssetMap> {
        match self.get_arg("assets") {
            Some(EventArg::Assets(assets)) => Some(assets),
            _ => None,
        }
    }

    /// Fraction of queued assets settled (`fetchProgress`)
    pub fn get_progress(&self) -> Option<f64> {
        self.get_number("progress")
    }

    /// Milliseconds since the previous tick (`update`)
    pub fn get_delta_time(&self) -> Option<f64> {
        self.get_number("delta_time")
    }

    /// Frame timestamp in milliseconds (`update`)
    pub fn get_time(&self) -> Option<f64> {
        self.get_number("time")
    }

    /// Requested scene name (`changeScene`)
    pub fn get_scene_name(&self) -> Option<&str> {
        self.get_text("scene")
    }

    /// Asset path (`fetchProgress`)
    pub fn get_path(&self) -> Option<&str> {
        self.get_text("path")
    }

    fn get_number(&self, key: &str) -> Option<f64> {
        match self.get_arg(key) {
            Some(EventArg::Number(value)) => Some(*value),
            _ => None,
        }
    }

    fn get_text(&self, key: &str) -> Option<&str> {
        match self.get_arg(key) {
            Some(EventArg::Text(value)) => Some(value),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_type_names_round_trip() {
        for event_type in [
            EventType::Load,
            EventType::Loaded,
            EventType::Mounted,
            EventType::Update,
            EventType::StopGame,
            EventType::ChangeScene,
            EventType::FetchProgress,
            EventType::ObservableChange,
        ] {
            assert_eq!(EventType::from(event_type.as_str()), event_type);
        }
        assert_eq!(EventType::from("explode"), EventType::Custom("explode".to_string()));
        assert_eq!(EventType::StopGame.to_string(), "stopGame");
    }

    #[test]
    fn test_new_event_is_unfired() {
        let event = GameEvent::new(EventType::Update, true);
        assert!(event.bubbles());
        assert!(event.target().is_none());
        assert!(event.current_target().is_none());
        assert!(event.timestamp().is_none());
        assert!(event.propagates());
        assert!(event.propagates_immediately());
    }

    #[test]
    fn test_event_ids_are_unique() {
        let first = GameEvent::new(EventType::Load, false);
        let second = GameEvent::new(EventType::Load, false);
        assert_ne!(first.id(), second.id());
    }

    #[test]
    fn test_stop_immediate_also_stops_bubbling() {
        let mut event = GameEvent::new("custom", true);
        event.stop_immediate_propagation();
        assert!(!event.propagates());
        assert!(!event.propagates_immediately());

        let mut event = GameEvent::new("custom", true);
        event.stop_propagation();
        assert!(!event.propagates());
        assert!(event.propagates_immediately());
    }

    #[test]
    fn test_typed_argument_getters() {
        let event = GameEvent::new(EventType::FetchProgress, true)
            .with_arg("progress", EventArg::Number(0.5))
            .with_arg("path", EventArg::Text("a.json".to_string()));

        assert_eq!(event.get_progress(), Some(0.5));
        assert_eq!(event.get_path(), Some("a.json"));
        assert!(event.get_assets().is_none());
        assert!(event.get_delta_time().is_none());
    }
}
