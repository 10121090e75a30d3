//! Listener registration, dispatch and bubbling

use super::{EventType, GameEvent};
use futures::future::{join_all, LocalBoxFuture};
use futures::FutureExt;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::rc::{Rc, Weak};

/// Identifies one listener registration on one target
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Listener registration options
#[derive(Debug, Clone, Copy, Default)]
pub struct ListenerOptions {
    /// Remove the listener after its first invocation
    pub once: bool,
}

impl ListenerOptions {
    /// Options for a listener that removes itself after running once
    pub fn once() -> Self {
        Self { once: true }
    }
}

type SyncCallback = Rc<dyn Fn(&mut GameEvent)>;
type AsyncCallback = Rc<dyn Fn(&mut GameEvent) -> LocalBoxFuture<'static, ()>>;

#[derive(Clone)]
enum Callback {
    Sync(SyncCallback),
    Async(AsyncCallback),
}

#[derive(Clone)]
struct Listener {
    id: ListenerId,
    once: bool,
    callback: Callback,
}

thread_local! {
    static NEXT_TARGET_ID: Cell<u64> = const { Cell::new(1) };
}

struct TargetState {
    id: u64,
    listeners: RefCell<HashMap<EventType, Vec<Listener>>>,
    parent: RefCell<Weak<TargetState>>,
    /// Events whose listeners are running on this target right now
    active: RefCell<Vec<(u64, EventType)>>,
    next_listener: Cell<u64>,
}

/// Shared handle giving an object listener registration, dispatch and bubbling
///
/// Cloning the handle shares the same listeners and parent link.
#[derive(Clone)]
pub struct EventTarget {
    state: Rc<TargetState>,
}

impl EventTarget {
    /// Create a target with no listeners and no parent
    pub fn new() -> Self {
        let id = NEXT_TARGET_ID.with(|next| {
            let id = next.get();
            next.set(id + 1);
            id
        });
        Self {
            state: Rc::new(TargetState {
                id,
                listeners: RefCell::new(HashMap::new()),
                parent: RefCell::new(Weak::new()),
                active: RefCell::new(Vec::new()),
                next_listener: Cell::new(1),
            }),
        }
    }

    /// Unique identifier of this target
    pub fn id(&self) -> u64 {
        self.state.id
    }

    /// Whether both handles refer to the same target
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Rc::ptr_eq(&self.state, &other.state)
    }

    /// Register a synchronous listener
    pub fn add_event_listener<F>(
        &self,
        event_type: impl Into<EventType>,
        listener: F,
        options: ListenerOptions,
    ) -> ListenerId
    where
        F: Fn(&mut GameEvent) + 'static,
    {
        self.register(event_type.into(), Callback::Sync(Rc::new(listener)), options)
    }

    /// Register a listener returning a future
    ///
    /// The listener body runs when the event is dispatched; the returned future
    /// is awaited by [`EventTarget::dispatch_event_async`].
    pub fn add_async_listener<F, Fut>(
        &self,
        event_type: impl Into<EventType>,
        listener: F,
        options: ListenerOptions,
    ) -> ListenerId
    where
        F: Fn(&mut GameEvent) -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        let callback: AsyncCallback = Rc::new(move |event| listener(event).boxed_local());
        self.register(event_type.into(), Callback::Async(callback), options)
    }

    fn register(&self, event_type: EventType, callback: Callback, options: ListenerOptions) -> ListenerId {
        let id = ListenerId(self.state.next_listener.get());
        self.state.next_listener.set(id.0 + 1);
        log::trace!("Target {} listening for '{}' ({:?})", self.id(), event_type, id);
        self.state
            .listeners
            .borrow_mut()
            .entry(event_type)
            .or_default()
            .push(Listener {
                id,
                once: options.once,
                callback,
            });
        id
    }

    /// Remove a listener, returns `true` if it was registered
    pub fn remove_event_listener(&self, event_type: &EventType, id: ListenerId) -> bool {
        let mut listeners = self.state.listeners.borrow_mut();
        let Some(registered) = listeners.get_mut(event_type) else {
            return false;
        };
        let before = registered.len();
        registered.retain(|listener| listener.id != id);
        before != registered.len()
    }

    /// Number of listeners registered for a type
    pub fn listener_count(&self, event_type: &EventType) -> usize {
        self.state.listeners.borrow().get(event_type).map_or(0, Vec::len)
    }

    fn has_listener(&self, event_type: &EventType, id: ListenerId) -> bool {
        self.state
            .listeners
            .borrow()
            .get(event_type)
            .is_some_and(|listeners| listeners.iter().any(|listener| listener.id == id))
    }

    /// Bubble events dispatched on `child` up to this target
    ///
    /// A child has at most one bubble target; this replaces any previous one.
    pub fn propagate_events_from<E: EventEmitter + ?Sized>(&self, child: &E) {
        *child.event_target().state.parent.borrow_mut() = Rc::downgrade(&self.state);
    }

    /// Stop bubbling events from `child`, if this target is its parent
    pub fn stop_propagating_from<E: EventEmitter + ?Sized>(&self, child: &E) {
        let child = child.event_target();
        let is_parent = child
            .parent()
            .is_some_and(|parent| parent.ptr_eq(self));
        if is_parent {
            *child.state.parent.borrow_mut() = Weak::new();
        }
    }

    /// Current bubble target
    pub fn parent(&self) -> Option<EventTarget> {
        self.state.parent.borrow().upgrade().map(|state| Self { state })
    }

    /// Dispatch an event synchronously
    ///
    /// Dispatching a type nobody listens for is a no-op. Async listeners reached
    /// here are polled once; one that cannot finish immediately is dropped.
    pub fn dispatch_event(&self, event: &mut GameEvent) {
        let mut pending = Vec::new();
        self.propagate(event, &mut pending);
        for future in pending {
            if future.now_or_never().is_none() {
                log::warn!(
                    "Async '{}' listener did not complete during synchronous dispatch",
                    event.event_type()
                );
            }
        }
    }

    /// Dispatch an event and wait for every listener future, bubbled ones included
    ///
    /// Listeners are invoked immediately when this is called; the returned
    /// future resolves with the event once all of them settled.
    pub fn dispatch_event_async(&self, mut event: GameEvent) -> impl Future<Output = GameEvent> + 'static {
        let mut pending = Vec::new();
        self.propagate(&mut event, &mut pending);
        async move {
            join_all(pending).await;
            event
        }
    }

    fn propagate(&self, event: &mut GameEvent, pending: &mut Vec<LocalBoxFuture<'static, ()>>) {
        if event.has_visited(self.id()) {
            log::trace!("'{}' already delivered to target {}", event.event_type(), self.id());
            return;
        }
        if self.is_running_other(event) {
            log::trace!(
                "Suppressed re-entrant '{}' dispatch on target {}",
                event.event_type(),
                self.id()
            );
            return;
        }

        event.enter(self);
        self.run_listeners(event, pending);

        if event.bubbles() && event.propagates() {
            if let Some(parent) = self.parent() {
                parent.propagate(event, pending);
            }
        }
    }

    fn is_running_other(&self, event: &GameEvent) -> bool {
        self.state
            .active
            .borrow()
            .iter()
            .any(|(id, event_type)| *id != event.id() && event_type == event.event_type())
    }

    fn run_listeners(&self, event: &mut GameEvent, pending: &mut Vec<LocalBoxFuture<'static, ()>>) {
        let listeners = self
            .state
            .listeners
            .borrow()
            .get(event.event_type())
            .cloned()
            .unwrap_or_default();
        if listeners.is_empty() {
            return;
        }

        self.state
            .active
            .borrow_mut()
            .push((event.id(), event.event_type().clone()));

        for listener in listeners {
            // Removed by an earlier listener in this pass
            if !self.has_listener(event.event_type(), listener.id) {
                continue;
            }
            if listener.once {
                let event_type = event.event_type().clone();
                self.remove_event_listener(&event_type, listener.id);
            }
            match &listener.callback {
                Callback::Sync(callback) => callback(event),
                Callback::Async(callback) => pending.push(callback(event)),
            }
            if !event.propagates_immediately() {
                break;
            }
        }

        let mut active = self.state.active.borrow_mut();
        if let Some(position) = active.iter().rposition(|(id, _)| *id == event.id()) {
            active.remove(position);
        }
    }
}

impl Default for EventTarget {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for EventTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventTarget").field("id", &self.state.id).finish()
    }
}

/// Event target capability, implemented by delegating to an owned [`EventTarget`]
pub trait EventEmitter {
    /// The owned event target
    fn event_target(&self) -> &EventTarget;

    /// Register a synchronous listener with options
    fn add_event_listener<F>(&self, event_type: impl Into<EventType>, listener: F, options: ListenerOptions) -> ListenerId
    where
        F: Fn(&mut GameEvent) + 'static,
    {
        self.event_target().add_event_listener(event_type, listener, options)
    }

    /// Register a synchronous listener
    fn on<F>(&self, event_type: impl Into<EventType>, listener: F) -> ListenerId
    where
        F: Fn(&mut GameEvent) + 'static,
    {
        self.add_event_listener(event_type, listener, ListenerOptions::default())
    }

    /// Register a synchronous listener that runs at most once
    fn once<F>(&self, event_type: impl Into<EventType>, listener: F) -> ListenerId
    where
        F: Fn(&mut GameEvent) + 'static,
    {
        self.add_event_listener(event_type, listener, ListenerOptions::once())
    }

    /// Register a listener returning a future
    fn on_async<F, Fut>(&self, event_type: impl Into<EventType>, listener: F) -> ListenerId
    where
        F: Fn(&mut GameEvent) -> Fut + 'static,
        Fut: Future<Output = ()> + 'static,
    {
        self.event_target()
            .add_async_listener(event_type, listener, ListenerOptions::default())
    }

    /// Remove a listener
    fn remove_event_listener(&self, event_type: &EventType, id: ListenerId) -> bool {
        self.event_target().remove_event_listener(event_type, id)
    }

    /// Dispatch an event synchronously
    fn dispatch_event(&self, event: &mut GameEvent) {
        self.event_target().dispatch_event(event);
    }

    /// Dispatch an event and wait for every listener future
    fn dispatch_event_async(&self, event: GameEvent) -> LocalBoxFuture<'static, GameEvent> {
        self.event_target().dispatch_event_async(event).boxed_local()
    }

    /// Bubble events dispatched on `child` up to this object
    fn propagate_events_from<E: EventEmitter + ?Sized>(&self, child: &E) {
        self.event_target().propagate_events_from(child.event_target());
    }

    /// Stop bubbling events from `child`
    fn stop_propagating_from<E: EventEmitter + ?Sized>(&self, child: &E) {
        self.event_target().stop_propagating_from(child.event_target());
    }
}

impl EventEmitter for EventTarget {
    fn event_target(&self) -> &EventTarget {
        self
    }
}
