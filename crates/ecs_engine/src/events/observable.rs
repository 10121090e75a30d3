//! Opt-in change notification for properties and methods
//!
//! An object owns an [`Observable`] registry of member names. Writes to an
//! observed property and calls to an observed method emit a non-bubbling
//! `observableChange` event before the effect is applied, carrying the member
//! name (`prop`) and the written value or call arguments (`args`).

use super::{EventArg, EventEmitter, EventType, GameEvent};
use std::cell::RefCell;
use std::collections::HashSet;

/// Registry of observed member names
#[derive(Debug, Default)]
pub struct Observable {
    observed: RefCell<HashSet<String>>,
}

impl Observable {
    /// Create a registry with nothing observed
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with some members observed from the start
    pub fn with_members(members: &[&str]) -> Self {
        let observable = Self::new();
        for member in members {
            observable.make_observable(member);
        }
        observable
    }

    /// Observe a member, returns `false` if it was already observed
    pub fn make_observable(&self, member: &str) -> bool {
        self.observed.borrow_mut().insert(member.to_string())
    }

    /// Whether a member is observed
    pub fn is_observable(&self, member: &str) -> bool {
        self.observed.borrow().contains(member)
    }
}

/// Change notification capability
///
/// Implementors route observed writes and calls through
/// [`ObservableTarget::notify_change`] before applying them, so callers that
/// are unaware of the observation see the same results.
pub trait ObservableTarget: EventEmitter {
    /// The owned registry
    fn observable(&self) -> &Observable;

    /// Observe a property or method; repeat calls are no-ops
    fn make_observable(&self, member: &str) -> bool {
        let added = self.observable().make_observable(member);
        if added {
            log::trace!("Observing '{}' on target {}", member, self.event_target().id());
        }
        added
    }

    /// Whether a member is observed
    fn is_observable(&self, member: &str) -> bool {
        self.observable().is_observable(member)
    }

    /// Emit `observableChange` for `member` if it is observed
    fn notify_change(&self, member: &str, args: Vec<EventArg>) {
        if !self.is_observable(member) {
            return;
        }
        let mut event = GameEvent::new(EventType::ObservableChange, false)
            .with_arg("prop", EventArg::Text(member.to_string()))
            .with_arg("args", EventArg::List(args));
        self.dispatch_event(&mut event);
    }
}
