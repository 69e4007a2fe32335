//! Name-keyed notification dispatcher shared by sources, texture resources and
//! the transition engine.
//!
//! Listeners are stored per event name in registration order. Dispatch walks a
//! snapshot of the list, so a listener may add or remove listeners (itself
//! included) while an event is being delivered.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

/// Fired by a texture resource after every upload (placeholder or real).
pub const UPDATED: &str = "updated";
/// Fired by the transition engine once per completed run.
pub const TRANSITION_END: &str = "transitionEnd";
/// Fired by an image source when decoding completes.
pub const LOAD: &str = "load";

/// Events carry the name they are dispatched under.
pub trait NamedEvent {
    fn name(&self) -> &'static str;
}

/// Token returned by [`EventDispatcher::add_listener`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener<E> = Rc<dyn Fn(&E)>;

pub struct EventDispatcher<E> {
    listeners: RefCell<HashMap<&'static str, Vec<(ListenerId, Listener<E>)>>>,
    next_id: Cell<u64>,
}

impl<E: NamedEvent> EventDispatcher<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_listener<F>(&self, name: &'static str, listener: F) -> ListenerId
    where
        F: Fn(&E) + 'static,
    {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners
            .borrow_mut()
            .entry(name)
            .or_default()
            .push((id, Rc::new(listener)));
        id
    }

    pub fn has_listener(&self, name: &str, id: ListenerId) -> bool {
        self.listeners
            .borrow()
            .get(name)
            .is_some_and(|list| list.iter().any(|(existing, _)| *existing == id))
    }

    /// Removes a listener; returns false when it was not registered.
    pub fn remove_listener(&self, name: &str, id: ListenerId) -> bool {
        let mut listeners = self.listeners.borrow_mut();
        let Some(list) = listeners.get_mut(name) else {
            return false;
        };
        let before = list.len();
        list.retain(|(existing, _)| *existing != id);
        before != list.len()
    }

    pub fn listener_count(&self, name: &str) -> usize {
        self.listeners.borrow().get(name).map_or(0, Vec::len)
    }

    pub fn dispatch(&self, event: &E) {
        let snapshot: Vec<Listener<E>> = match self.listeners.borrow().get(event.name()) {
            Some(list) => list.iter().map(|(_, listener)| listener.clone()).collect(),
            None => return,
        };
        for listener in snapshot {
            listener(event);
        }
    }
}

impl<E> Default for EventDispatcher<E> {
    fn default() -> Self {
        Self {
            listeners: RefCell::new(HashMap::new()),
            next_id: Cell::new(0),
        }
    }
}

impl<E> fmt::Debug for EventDispatcher<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let listeners = self.listeners.borrow();
        let mut names: Vec<_> = listeners
            .iter()
            .map(|(name, list)| (*name, list.len()))
            .collect();
        names.sort_unstable();
        f.debug_struct("EventDispatcher")
            .field("listeners", &names)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Ping;

    impl NamedEvent for Ping {
        fn name(&self) -> &'static str {
            "ping"
        }
    }

    #[test]
    fn dispatch_reaches_listeners_in_registration_order() {
        let dispatcher = EventDispatcher::<Ping>::new();
        let calls = Rc::new(RefCell::new(Vec::new()));
        for tag in ["first", "second", "third"] {
            let calls = calls.clone();
            dispatcher.add_listener("ping", move |_| calls.borrow_mut().push(tag));
        }
        dispatcher.dispatch(&Ping);
        assert_eq!(*calls.borrow(), vec!["first", "second", "third"]);
    }

    #[test]
    fn add_remove_and_has_track_tokens() {
        let dispatcher = EventDispatcher::<Ping>::new();
        let id = dispatcher.add_listener("ping", |_| {});
        assert!(dispatcher.has_listener("ping", id));
        assert!(!dispatcher.has_listener("pong", id));
        assert!(dispatcher.remove_listener("ping", id));
        assert!(!dispatcher.remove_listener("ping", id));
        assert!(!dispatcher.has_listener("ping", id));
        assert_eq!(dispatcher.listener_count("ping"), 0);
    }

    #[test]
    fn listener_removing_itself_does_not_skip_others() {
        let dispatcher = Rc::new(EventDispatcher::<Ping>::new());
        let hits = Rc::new(Cell::new(0));
        let own_id: Rc<Cell<Option<ListenerId>>> = Rc::new(Cell::new(None));

        let id = {
            let weak = Rc::downgrade(&dispatcher);
            let own_id = own_id.clone();
            let hits = hits.clone();
            dispatcher.add_listener("ping", move |_| {
                hits.set(hits.get() + 1);
                if let (Some(dispatcher), Some(id)) = (weak.upgrade(), own_id.get()) {
                    dispatcher.remove_listener("ping", id);
                }
            })
        };
        own_id.set(Some(id));
        {
            let hits = hits.clone();
            dispatcher.add_listener("ping", move |_| hits.set(hits.get() + 10));
        }

        dispatcher.dispatch(&Ping);
        assert_eq!(hits.get(), 11);
        dispatcher.dispatch(&Ping);
        assert_eq!(hits.get(), 21);
    }

    #[test]
    fn dispatch_without_listeners_is_a_no_op() {
        let dispatcher = EventDispatcher::<Ping>::new();
        dispatcher.dispatch(&Ping);
        assert_eq!(dispatcher.listener_count("ping"), 0);
    }
}
