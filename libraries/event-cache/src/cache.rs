//! # Partitioned fetch cache
//! One entry per [`PartitionKey`]. An entry exists once its key has been
//! fetched successfully; it holds the records, when they were fetched, and
//! whether something has since marked them stale.
//!
//! Everything is single-threaded. We never hold a borrow of the entry table
//! across an `.await`, so the only suspension points are the network exchanges.

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::{Rc, Weak};

use chokepoint::{ChokePoint, InFlight, Ticket};
use chrono::{DateTime, Duration, Utc};
use im::Vector;

use crate::config::ClientConfig;
use crate::error::FetchError;
use crate::filter::CompiledFilter;
use crate::normalize;
use crate::partition::{Partition, PartitionKey, PartitionKind};
use crate::record::{EventId, EventRecord};
use crate::transport::{Request, Transport};

pub type Records = Vector<EventRecord>;

pub trait Clock {
    fn now(&self) -> DateTime<Utc>;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

impl<T: Clock + ?Sized> Clock for Rc<T> {
    fn now(&self) -> DateTime<Utc> {
        (**self).now()
    }
}

#[derive(Clone, Debug)]
pub(crate) struct Entry {
    pub(crate) records: Records,
    pub(crate) fetched_at: DateTime<Utc>,
    pub(crate) stale: bool,
    /// Changes every time the server's answer replaces `records`.
    pub(crate) epoch: u64,
}

pub(crate) struct Inner {
    pub(crate) transport: Rc<dyn Transport>,
    pub(crate) entries: RefCell<HashMap<PartitionKey, Entry>>,
    requests: ChokePoint<PartitionKey, Records, FetchError>,
    stale_after: Duration,
    clock: Box<dyn Clock>,
    next_epoch: Cell<u64>,
}

pub enum Resolution {
    /// Fresh records, no request made.
    Ready(Records),
    /// A request is running; every caller for the key shares it.
    Pending(InFlight<Records, FetchError>),
}

/// The record cache for one session. Cloning gives another handle to the same
/// cache; drop every handle (or call [`EventCache::clear`]) on logout.
#[derive(Clone)]
pub struct EventCache {
    pub(crate) inner: Rc<Inner>,
}

impl EventCache {
    pub fn new(transport: impl Transport + 'static, config: &ClientConfig) -> Self {
        Self::with_clock(transport, config.stale_after(), SystemClock)
    }

    pub fn with_clock(
        transport: impl Transport + 'static,
        stale_after: Duration,
        clock: impl Clock + 'static,
    ) -> Self {
        Self {
            inner: Rc::new(Inner {
                transport: Rc::new(transport),
                entries: RefCell::new(HashMap::new()),
                requests: ChokePoint::new(),
                stale_after,
                clock: Box::new(clock),
                next_epoch: Cell::new(0),
            }),
        }
    }

    /// Fresh cached records right away, or the request that will produce them.
    pub fn try_resolve(&self, key: &PartitionKey) -> Resolution {
        match self.inner.fresh(key) {
            Some(records) => Resolution::Ready(records),
            None => Resolution::Pending(self.inner.fetch(key)),
        }
    }

    pub async fn resolve(&self, key: &PartitionKey) -> Result<Records, FetchError> {
        match self.try_resolve(key) {
            Resolution::Ready(records) => Ok(records),
            Resolution::Pending(request) => request.await,
        }
    }

    pub async fn resolve_filtered(
        &self,
        partition: Partition,
        filter: &CompiledFilter,
    ) -> Result<Records, FetchError> {
        self.resolve(&PartitionKey::filtered(partition, filter)).await
    }

    /// Fetch regardless of freshness, joining a request already in flight.
    pub async fn refresh(&self, key: &PartitionKey) -> Result<Records, FetchError> {
        self.inner.fetch(key).await
    }

    /// Whatever is cached for `key`, fresh or not. Never touches the network.
    pub fn cached(&self, key: &PartitionKey) -> Option<Records> {
        self.inner
            .entries
            .borrow()
            .get(key)
            .map(|entry| entry.records.clone())
    }

    pub fn is_fresh(&self, key: &PartitionKey) -> bool {
        self.inner.fresh(key).is_some()
    }

    pub fn is_pending(&self, key: &PartitionKey) -> bool {
        self.inner.requests.is_in_flight(key)
    }

    pub fn keys(&self) -> Vec<PartitionKey> {
        self.inner.entries.borrow().keys().cloned().collect()
    }

    pub fn invalidate_key(&self, key: &PartitionKey) {
        self.inner.invalidate_where(|k| k == key);
    }

    /// Mark every entry of a partition stale, whatever filter it was fetched with.
    pub fn invalidate(&self, kind: PartitionKind) {
        self.inner.invalidate_where(|k| k.partition().kind() == kind);
    }

    /// Mark every entry holding `id` stale, plus its detail entry.
    pub fn invalidate_record(&self, id: &EventId) {
        self.inner.invalidate_record(id);
    }

    /// Drop everything and forget in-flight requests. Their results, when they
    /// arrive, are not stored.
    pub fn clear(&self) {
        self.inner.requests.abandon_all();
        self.inner.entries.borrow_mut().clear();
        log::info!("Event cache cleared");
    }
}

impl Inner {
    fn fresh(&self, key: &PartitionKey) -> Option<Records> {
        let entries = self.entries.borrow();
        let entry = entries.get(key)?;
        let expires = entry.fetched_at.checked_add_signed(self.stale_after);
        let expired = expires.is_some_and(|expires| self.clock.now() >= expires);
        (!entry.stale && !expired).then(|| entry.records.clone())
    }

    fn fetch(self: &Rc<Self>, key: &PartitionKey) -> InFlight<Records, FetchError> {
        // `requests` stores the future, so it must not keep the cache alive.
        let inner = Rc::downgrade(self);
        let transport = Rc::clone(&self.transport);
        let owned = key.clone();
        self.requests.get(key.clone(), move |ticket| {
            run_fetch(inner, transport, owned, ticket)
        })
    }

    fn store(&self, key: &PartitionKey, records: Records) {
        let epoch = self.next_epoch.get();
        self.next_epoch.set(epoch + 1);
        log::debug!("Caching {} event(s) for {key}", records.len());
        self.entries.borrow_mut().insert(
            key.clone(),
            Entry {
                records,
                fetched_at: self.clock.now(),
                stale: false,
                epoch,
            },
        );
    }

    /// Mark matching entries stale and abandon matching in-flight requests, so
    /// the next resolve for any of them goes to the network.
    pub(crate) fn invalidate_where(&self, mut pred: impl FnMut(&PartitionKey) -> bool) {
        let mut invalidated = 0;
        for (key, entry) in self.entries.borrow_mut().iter_mut() {
            if pred(key) {
                entry.stale = true;
                invalidated += 1;
            }
        }
        self.requests.abandon_where(&mut pred);
        if invalidated > 0 {
            log::debug!("Marked {invalidated} cache entries stale");
        }
    }

    pub(crate) fn invalidate_record(&self, id: &EventId) {
        let detail = PartitionKey::detail(id.clone());
        let holding: Vec<PartitionKey> = self
            .entries
            .borrow()
            .iter()
            .filter(|(_, entry)| entry.records.iter().any(|r| r.id == *id))
            .map(|(key, _)| key.clone())
            .collect();
        self.invalidate_where(|key| *key == detail || holding.contains(key));
    }
}

async fn run_fetch(
    inner: Weak<Inner>,
    transport: Rc<dyn Transport>,
    key: PartitionKey,
    ticket: Ticket,
) -> Result<Records, FetchError> {
    let path = key.path();
    log::debug!("Fetching {key} from {path}");

    let mut records = match transport.exchange(&path, Request::get()).await {
        Ok(payload) => match key.partition() {
            Partition::Detail(_) => normalize::detail(&payload),
            _ => normalize::records(&payload),
        },
        Err(e) if e.is_no_matches() => {
            log::info!("No events match {key}, caching an empty list");
            Vector::new()
        }
        Err(source) => {
            log::warn!("Fetching {key} failed: {source}");
            return Err(FetchError {
                key: key.to_string(),
                source,
            });
        }
    };

    let received = records.len();
    records.retain(|record| key.partition().admits(record));
    if records.len() < received {
        log::debug!(
            "Dropped {} event(s) outside {}",
            received - records.len(),
            key.partition().name()
        );
    }

    match inner.upgrade() {
        Some(inner) if inner.requests.is_current(&key, ticket) => {
            inner.store(&key, records.clone());
        }
        Some(_) => log::debug!("Discarding superseded response for {key}"),
        None => log::debug!("Cache dropped before {key} arrived"),
    }
    Ok(records)
}
