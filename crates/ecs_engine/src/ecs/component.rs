//! Component value holders
//!
//! A component stores key/value data of its own and can additionally be
//! decorated with existing records, after which reads and writes of the
//! record's keys pass straight through to the record.

use super::{EcsError, Entity, WeakEntity};
use crate::events::{EventArg, EventEmitter, EventTarget, Observable, ObservableTarget};
use serde_json::{Map, Value};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::Rc;

/// Explicit key-list contract for records a component can decorate
///
/// `keys` must list every readable key, including ones computed from other
/// state or provided by an embedded record.
pub trait Record: Any {
    /// Every key the record exposes
    fn keys(&self) -> Vec<String>;

    /// Read a key
    fn get(&self, key: &str) -> Option<Value>;

    /// Write a key, returns `false` if the record does not accept it
    fn set(&mut self, key: &str, value: Value) -> bool;
}

impl Record for Map<String, Value> {
    fn keys(&self) -> Vec<String> {
        self.keys().cloned().collect()
    }

    fn get(&self, key: &str) -> Option<Value> {
        Map::get(self, key).cloned()
    }

    fn set(&mut self, key: &str, value: Value) -> bool {
        self.insert(key.to_string(), value);
        true
    }
}

struct Decoration {
    record: Rc<RefCell<dyn Record>>,
    any: Rc<dyn Any>,
}

thread_local! {
    static NEXT_COMPONENT_ID: Cell<u64> = const { Cell::new(1) };
}

struct ComponentState {
    id: u64,
    parent: RefCell<WeakEntity>,
    properties: RefCell<Map<String, Value>>,
    decorations: RefCell<Vec<Decoration>>,
    /// Key -> index of the decoration that owns it
    forwarded: RefCell<HashMap<String, usize>>,
    events: EventTarget,
    observable: Observable,
}

/// Data holder attached to at most one entity
///
/// Components compare and hash by identity. Writes through
/// [`Component::set`] to a key made observable emit `observableChange` with
/// the new value before the write is applied.
#[derive(Clone)]
pub struct Component {
    state: Rc<ComponentState>,
}

impl Component {
    /// Create an empty component
    pub fn new() -> Self {
        let id = NEXT_COMPONENT_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            id
        });
        Self {
            state: Rc::new(ComponentState {
                id,
                parent: RefCell::new(WeakEntity::default()),
                properties: RefCell::new(Map::new()),
                decorations: RefCell::new(Vec::new()),
                forwarded: RefCell::new(HashMap::new()),
                events: EventTarget::new(),
                observable: Observable::new(),
            }),
        }
    }

    /// Create a component from a JSON object
    pub fn from_value(data: Value) -> Result<Self, EcsError> {
        match data {
            Value::Object(properties) => {
                let component = Self::new();
                *component.state.properties.borrow_mut() = properties;
                Ok(component)
            }
            other => Err(EcsError::InvalidComponentData(format!(
                "expected an object, found {other}"
            ))),
        }
    }

    /// Identifier for logging and debugging
    pub fn id(&self) -> u64 {
        self.state.id
    }

    /// Read a key, from a decorated record if one provides it
    pub fn get(&self, key: &str) -> Option<Value> {
        let owner = self.state.forwarded.borrow().get(key).copied();
        match owner {
            Some(index) => {
                let record = Rc::clone(&self.state.decorations.borrow()[index].record);
                let value = record.borrow().get(key);
                value
            }
            None => self.state.properties.borrow().get(key).cloned(),
        }
    }

    /// Write a key, returns `false` if a decorated record refused it
    pub fn set(&self, key: &str, value: Value) -> bool {
        self.notify_change(key, vec![EventArg::Value(value.clone())]);

        let owner = self.state.forwarded.borrow().get(key).copied();
        match owner {
            Some(index) => {
                let record = Rc::clone(&self.state.decorations.borrow()[index].record);
                let accepted = record.borrow_mut().set(key, value);
                if !accepted {
                    log::debug!("Decorated record of component {} refused key '{}'", self.id(), key);
                }
                accepted
            }
            None => {
                self.state.properties.borrow_mut().insert(key.to_string(), value);
                true
            }
        }
    }

    /// Whether a key is readable on this component
    pub fn has(&self, key: &str) -> bool {
        self.state.forwarded.borrow().contains_key(key)
            || self.state.properties.borrow().contains_key(key)
    }

    /// Every readable key
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.state.properties.borrow().keys().cloned().collect();
        for key in self.state.forwarded.borrow().keys() {
            if !keys.contains(key) {
                keys.push(key.clone());
            }
        }
        keys
    }

    /// Forward the record's keys to it
    ///
    /// The key list is read once, when decorating. Later decorations take over
    /// the keys they share with earlier ones; other keys keep forwarding to the
    /// record that declared them.
    pub fn decorate<R: Record>(&self, record: Rc<RefCell<R>>) {
        let keys = record.borrow().keys();
        let any: Rc<dyn Any> = record.clone();
        let record: Rc<RefCell<dyn Record>> = record;

        let mut decorations = self.state.decorations.borrow_mut();
        let index = decorations.len();
        decorations.push(Decoration { record, any });

        let mut forwarded = self.state.forwarded.borrow_mut();
        for key in &keys {
            forwarded.insert(key.clone(), index);
        }
        log::trace!("Component {} decorated with {} keys", self.id(), keys.len());
    }

    /// The most recently decorated record of type `R`
    pub fn record<R: Record>(&self) -> Option<Rc<RefCell<R>>> {
        self.state
            .decorations
            .borrow()
            .iter()
            .rev()
            .find_map(|decoration| Rc::clone(&decoration.any).downcast::<RefCell<R>>().ok())
    }

    /// Entity this component is attached to
    pub fn get_parent_entity(&self) -> Option<Entity> {
        self.state.parent.borrow().upgrade()
    }

    pub(crate) fn set_parent_entity(&self, entity: Option<&Entity>) {
        *self.state.parent.borrow_mut() = entity.map(Entity::downgrade).unwrap_or_default();
    }

    /// Clear the back-reference if it points at `entity`
    pub(crate) fn release_parent(&self, entity: &Entity) {
        let attached = self.state.parent.borrow().is(entity);
        if attached {
            self.set_parent_entity(None);
        }
    }

    /// Whether both handles refer to the same component
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl Default for Component {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Component {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Component {}

impl Hash for Component {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.state).hash(state);
    }
}

impl fmt::Debug for Component {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Component")
            .field("id", &self.state.id)
            .field("keys", &self.keys())
            .finish()
    }
}

impl EventEmitter for Component {
    fn event_target(&self) -> &EventTarget {
        &self.state.events
    }
}

impl ObservableTarget for Component {
    fn observable(&self) -> &Observable {
        &self.state.observable
    }
}
