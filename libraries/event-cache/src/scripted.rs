//! An in-memory [`Transport`] for tests: replies are
//! scripted per path and every exchange is recorded.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, VecDeque};
use std::rc::Rc;

use chrono::{DateTime, Duration, Utc};
use futures::channel::oneshot;
use futures::future::{FutureExt, LocalBoxFuture};
use serde_json::Value;

use crate::cache::Clock;
use crate::transport::{Method, Request, Transport, TransportError};

type Reply = Result<Value, TransportError>;

enum Scripted {
    Ready(Reply),
    Held(oneshot::Receiver<Reply>),
}

#[derive(Default)]
pub struct ScriptedTransport {
    queued: RefCell<HashMap<String, VecDeque<Scripted>>>,
    routes: RefCell<HashMap<String, Reply>>,
    calls: RefCell<Vec<(Method, String)>>,
}

impl ScriptedTransport {
    pub fn new() -> Rc<Self> {
        Rc::new(Self::default())
    }

    /// Answer `path` with `reply` whenever nothing is queued for it.
    pub fn route(&self, path: &str, reply: Reply) {
        self.routes.borrow_mut().insert(path.to_string(), reply);
    }

    /// Answer the next exchange on `path` with `reply`.
    pub fn once(&self, path: &str, reply: Reply) {
        self.enqueue(path, Scripted::Ready(reply));
    }

    /// The next exchange on `path` waits until the returned sender is used.
    pub fn hold(&self, path: &str) -> oneshot::Sender<Reply> {
        let (tx, rx) = oneshot::channel();
        self.enqueue(path, Scripted::Held(rx));
        tx
    }

    pub fn calls(&self) -> Vec<(Method, String)> {
        self.calls.borrow().clone()
    }

    pub fn count(&self, path: &str) -> usize {
        self.calls.borrow().iter().filter(|(_, p)| p == path).count()
    }

    fn enqueue(&self, path: &str, scripted: Scripted) {
        self.queued
            .borrow_mut()
            .entry(path.to_string())
            .or_default()
            .push_back(scripted);
    }
}

impl Transport for ScriptedTransport {
    fn exchange(&self, path: &str, request: Request) -> LocalBoxFuture<'_, Result<Value, TransportError>> {
        self.calls
            .borrow_mut()
            .push((request.method, path.to_string()));

        let queued = self
            .queued
            .borrow_mut()
            .get_mut(path)
            .and_then(VecDeque::pop_front);
        let scripted = queued.unwrap_or_else(|| {
            Scripted::Ready(self.routes.borrow().get(path).cloned().unwrap_or_else(|| {
                Err(TransportError::Status {
                    status: 501,
                    message: format!("no scripted reply for {path}"),
                })
            }))
        });

        async move {
            match scripted {
                Scripted::Ready(reply) => reply,
                Scripted::Held(rx) => rx
                    .await
                    .unwrap_or_else(|_| Err(TransportError::Network("held reply dropped".to_string()))),
            }
        }
        .boxed_local()
    }
}

/// A clock that only moves when told to.
#[derive(Clone)]
pub struct ManualClock(Rc<Cell<DateTime<Utc>>>);

impl ManualClock {
    pub fn new(start: DateTime<Utc>) -> Self {
        Self(Rc::new(Cell::new(start)))
    }

    pub fn advance(&self, by: Duration) {
        self.0.set(self.0.get() + by);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::new(DateTime::UNIX_EPOCH)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        self.0.get()
    }
}
