//! Entity implementation

use super::Component;
use crate::events::{EventArg, EventEmitter, EventTarget, Observable, ObservableTarget};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::rc::{Rc, Weak};

/// Observed methods every entity reports structural changes through
pub const SET_COMPONENT: &str = "setComponent";
/// See [`SET_COMPONENT`]
pub const REMOVE_COMPONENT: &str = "removeComponent";

thread_local! {
    static NEXT_ENTITY_ID: Cell<u64> = const { Cell::new(1) };
}

struct EntityState {
    id: u64,
    components: RefCell<HashMap<String, Component>>,
    events: EventTarget,
    observable: Observable,
}

/// Container of named components
///
/// Entities compare and hash by identity: clones of the handle are the same
/// entity. `set_component` and `remove_component` are observed, so every call
/// emits `observableChange` before the change is applied.
#[derive(Clone)]
pub struct Entity {
    state: Rc<EntityState>,
}

impl Entity {
    /// Create an entity with no components
    pub fn new() -> Self {
        let id = NEXT_ENTITY_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            id
        });
        Self {
            state: Rc::new(EntityState {
                id,
                components: RefCell::new(HashMap::new()),
                events: EventTarget::new(),
                observable: Observable::with_members(&[SET_COMPONENT, REMOVE_COMPONENT]),
            }),
        }
    }

    /// Identifier for logging and debugging
    pub fn id(&self) -> u64 {
        self.state.id
    }

    /// Attach a component under `name`, replacing any previous one
    pub fn set_component(&self, name: impl Into<String>, component: Component) {
        let name = name.into();
        self.notify_change(
            SET_COMPONENT,
            vec![EventArg::Text(name.clone()), EventArg::Component(component.clone())],
        );

        component.set_parent_entity(Some(self));
        let previous = self.state.components.borrow_mut().insert(name, component.clone());
        if let Some(previous) = previous {
            if !previous.ptr_eq(&component) {
                previous.release_parent(self);
            }
        }
    }

    /// Component stored under `name`
    pub fn get_component(&self, name: &str) -> Option<Component> {
        self.state.components.borrow().get(name).cloned()
    }

    /// Whether a component is stored under `name`
    pub fn has_component(&self, name: &str) -> bool {
        self.state.components.borrow().contains_key(name)
    }

    /// Detach and return the component stored under `name`
    pub fn remove_component(&self, name: &str) -> Option<Component> {
        self.notify_change(REMOVE_COMPONENT, vec![EventArg::Text(name.to_string())]);

        let removed = self.state.components.borrow_mut().remove(name);
        if let Some(component) = &removed {
            component.release_parent(self);
        }
        removed
    }

    /// Names of every attached component
    pub fn component_names(&self) -> Vec<String> {
        self.state.components.borrow().keys().cloned().collect()
    }

    /// Non-owning reference to this entity
    pub fn downgrade(&self) -> WeakEntity {
        WeakEntity {
            state: Rc::downgrade(&self.state),
        }
    }

    /// Whether both handles refer to the same entity
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::new()
    }
}

impl PartialEq for Entity {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Entity {}

impl Hash for Entity {
    fn hash<H: Hasher>(&self, state: &mut H) {
        Rc::as_ptr(&self.state).hash(state);
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.state.id)
            .field("components", &self.component_names())
            .finish()
    }
}

impl EventEmitter for Entity {
    fn event_target(&self) -> &EventTarget {
        &self.state.events
    }
}

impl ObservableTarget for Entity {
    fn observable(&self) -> &Observable {
        &self.state.observable
    }
}

/// Non-owning entity reference, used for component back-references
#[derive(Clone, Default)]
pub struct WeakEntity {
    state: Weak<EntityState>,
}

impl WeakEntity {
    /// The entity, if it is still alive
    pub fn upgrade(&self) -> Option<Entity> {
        self.state.upgrade().map(|state| Entity { state })
    }

    /// Whether this refers to `entity`
    pub fn is(&self, entity: &Entity) -> bool {
        std::ptr::eq(self.state.as_ptr(), Rc::as_ptr(&entity.state))
    }
}

impl fmt::Debug for WeakEntity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(entity) => write!(f, "WeakEntity({})", entity.id()),
            None => f.write_str("WeakEntity(dropped)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::{EventType, GameEvent};
    use std::collections::HashSet;

    #[test]
    fn test_set_and_get_component() {
        let entity = Entity::new();
        let component = Component::new();
        entity.set_component("x", component.clone());

        assert!(entity.has_component("x"));
        assert_eq!(entity.get_component("x"), Some(component.clone()));
        assert_eq!(component.get_parent_entity(), Some(entity.clone()));
    }

    #[test]
    fn test_remove_component() {
        let entity = Entity::new();
        let component = Component::new();
        entity.set_component("x", component.clone());

        assert_eq!(entity.remove_component("x"), Some(component.clone()));
        assert!(!entity.has_component("x"));
        assert!(entity.get_component("x").is_none());
        assert!(component.get_parent_entity().is_none());
        assert!(entity.remove_component("x").is_none());
    }

    #[test]
    fn test_overwrite_releases_previous_component() {
        let entity = Entity::new();
        let first = Component::new();
        let second = Component::new();
        entity.set_component("x", first.clone());
        entity.set_component("x", second.clone());

        assert_eq!(entity.get_component("x"), Some(second.clone()));
        assert!(first.get_parent_entity().is_none());
        assert_eq!(second.get_parent_entity(), Some(entity));
    }

    #[test]
    fn test_identity_semantics() {
        let entity = Entity::new();
        let other = Entity::new();
        let alias = entity.clone();

        let set: HashSet<Entity> = [entity.clone(), alias, other.clone()].into_iter().collect();
        assert_eq!(set.len(), 2);
        assert_ne!(entity, other);
        assert_ne!(entity.id(), other.id());
    }

    #[test]
    fn test_structural_changes_are_observable() {
        let entity = Entity::new();
        let seen = Rc::new(RefCell::new(Vec::new()));
        let log = Rc::clone(&seen);
        let inner = entity.downgrade();
        entity.on(EventType::ObservableChange, move |event: &mut GameEvent| {
            let has_x = inner.upgrade().is_some_and(|entity| entity.has_component("x"));
            log.borrow_mut()
                .push((event.get_prop().unwrap_or_default().to_string(), has_x));
        });

        entity.set_component("x", Component::new());
        entity.remove_component("x");
        assert_eq!(
            *seen.borrow(),
            vec![
                (SET_COMPONENT.to_string(), false),
                (REMOVE_COMPONENT.to_string(), true),
            ]
        );
    }

    #[test]
    fn test_weak_entity() {
        let entity = Entity::new();
        let weak = entity.downgrade();
        assert!(weak.is(&entity));
        assert_eq!(weak.upgrade(), Some(entity.clone()));
        drop(entity);
        assert!(weak.upgrade().is_none());
    }
}
