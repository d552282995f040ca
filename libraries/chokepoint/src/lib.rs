//! Collapses concurrent requests for the same key into a single computation.
//!
//! Everything here is single-threaded: the table lives behind a `RefCell` and
//! the shared futures are `!Send`. Never hold a borrow across an `.await`.

use futures::future::{FutureExt, LocalBoxFuture, Shared};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::hash::Hash;
use std::rc::Rc;

/// Identifies one computation started for a key. A newer computation for the
/// same key always gets a larger ticket.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Ticket(u64);

pub type InFlight<V, E> = Shared<LocalBoxFuture<'static, Result<V, E>>>;

struct Entry<V, E> {
    ticket: Ticket,
    future: InFlight<V, E>,
}

pub struct ChokePoint<K, V, E> {
    in_flight: Rc<RefCell<HashMap<K, Entry<V, E>>>>,
    next_ticket: Rc<Cell<u64>>,
}

impl<K, V, E> Clone for ChokePoint<K, V, E> {
    fn clone(&self) -> Self {
        Self {
            in_flight: Rc::clone(&self.in_flight),
            next_ticket: Rc::clone(&self.next_ticket),
        }
    }
}

impl<K, V, E> Default for ChokePoint<K, V, E>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + 'static,
    E: Clone + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V, E> ChokePoint<K, V, E>
where
    K: Clone + Eq + Hash + 'static,
    V: Clone + 'static,
    E: Clone + 'static,
{
    pub fn new() -> Self {
        Self {
            in_flight: Rc::new(RefCell::new(HashMap::new())),
            next_ticket: Rc::new(Cell::new(0)),
        }
    }

    /// Join the computation already running for `key`, or start a new one.
    ///
    /// `compute` is only called when nothing is in flight. It receives the
    /// ticket of the computation it drives, which it can pass to
    /// [`ChokePoint::is_current`] before publishing its result anywhere.
    pub fn get<F, Fut>(&self, key: K, compute: F) -> InFlight<V, E>
    where
        F: FnOnce(Ticket) -> Fut,
        Fut: Future<Output = Result<V, E>> + 'static,
    {
        if let Some(entry) = self.in_flight.borrow().get(&key) {
            return entry.future.clone();
        }

        let ticket = Ticket(self.next_ticket.get());
        self.next_ticket.set(ticket.0 + 1);

        let work = compute(ticket);
        // The table stores this future, so it may only refer back weakly.
        let in_flight = Rc::downgrade(&self.in_flight);
        let key_clone = key.clone();
        let wrapped = async move {
            let result = work.await;
            if let Some(in_flight) = in_flight.upgrade() {
                // Only clear our own marker; a newer computation may own the key now.
                let mut table = in_flight.borrow_mut();
                if table.get(&key_clone).is_some_and(|e| e.ticket == ticket) {
                    table.remove(&key_clone);
                }
            }
            result
        }
        .boxed_local()
        .shared();

        self.in_flight.borrow_mut().insert(
            key,
            Entry {
                ticket,
                future: wrapped.clone(),
            },
        );
        wrapped
    }

    pub fn is_in_flight(&self, key: &K) -> bool {
        self.in_flight.borrow().contains_key(key)
    }

    /// True while `ticket` is still the computation registered for `key`.
    pub fn is_current(&self, key: &K, ticket: Ticket) -> bool {
        self.in_flight
            .borrow()
            .get(key)
            .is_some_and(|e| e.ticket == ticket)
    }

    /// Forget the in-flight computation for `key`. Whoever is already awaiting
    /// it still gets its result, but the next [`ChokePoint::get`] starts over.
    pub fn abandon(&self, key: &K) -> bool {
        let abandoned = self.in_flight.borrow_mut().remove(key).is_some();
        if abandoned {
            log::debug!("abandoned in-flight computation");
        }
        abandoned
    }

    pub fn abandon_where(&self, mut pred: impl FnMut(&K) -> bool) {
        self.in_flight.borrow_mut().retain(|k, _| !pred(k));
    }

    pub fn abandon_all(&self) {
        self.in_flight.borrow_mut().clear();
    }
}
