//! # Optimistic mutations
//! Joining, leaving, liking and unliking all follow the same steps:
//! 1. Before anything goes over the network, every cached copy of the record
//!    gets the new flag. The partition whose membership the flag defines
//!    (`mine` for participation, `favorites` for favorites) gains or loses the
//!    record.
//! 2. If the server accepts, everything that was touched is marked stale so the
//!    next read comes from the server.
//! 3. If it refuses, each touched entry gets back the flag value and the
//!    membership (including position) it had before.
//!
//! Mutations on different records don't interact. Two mutations on the same
//! record racing each other are not queued; whichever settles last wins.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture};

use crate::cache::{Entry, EventCache, Inner};
use crate::error::MutationError;
use crate::partition::{PartitionKey, PartitionKind};
use crate::record::{EventId, EventRecord};
use crate::transport::Request;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MutationKind {
    Participation,
    Favorite,
}

impl MutationKind {
    /// The partition made up of exactly the records with this flag set.
    pub fn membership(self) -> PartitionKind {
        match self {
            MutationKind::Participation => PartitionKind::Mine,
            MutationKind::Favorite => PartitionKind::Favorites,
        }
    }

    pub fn flag(self, record: &EventRecord) -> bool {
        match self {
            MutationKind::Participation => record.participating,
            MutationKind::Favorite => record.favorite,
        }
    }

    fn set_flag(self, record: &mut EventRecord, value: bool) {
        match self {
            MutationKind::Participation => record.participating = value,
            MutationKind::Favorite => record.favorite = value,
        }
    }

    pub fn endpoint(self, id: &EventId, value: bool) -> (String, Request) {
        match (self, value) {
            (MutationKind::Participation, true) => (format!("/api/events/{id}/join"), Request::post()),
            (MutationKind::Participation, false) => (format!("/api/events/{id}/leave"), Request::get()),
            (MutationKind::Favorite, true) => (format!("/api/events/{id}/like"), Request::post()),
            (MutationKind::Favorite, false) => (format!("/api/events/{id}/unlike"), Request::delete()),
        }
    }
}

impl fmt::Display for MutationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            MutationKind::Participation => "participation",
            MutationKind::Favorite => "favorite",
        })
    }
}

enum Prior {
    /// The entry held this record at this index.
    Present { index: usize, record: EventRecord },
    /// The record was inserted optimistically.
    Absent,
}

struct Touched {
    key: PartitionKey,
    epoch: u64,
    prior: Prior,
}

impl EventCache {
    /// Apply the change to every cached copy right away and return the request
    /// that confirms or rolls it back. Nothing is sent until it is polled.
    pub fn apply(
        &self,
        kind: MutationKind,
        id: EventId,
        value: bool,
    ) -> LocalBoxFuture<'static, Result<(), MutationError>> {
        let touched = self.inner.write_optimistic(kind, &id, value);
        let inner = Rc::clone(&self.inner);

        async move {
            let (path, request) = kind.endpoint(&id, value);
            match inner.transport.exchange(&path, request).await {
                Ok(_) => {
                    inner.confirm(kind, &id, &touched);
                    Ok(())
                }
                Err(source) => {
                    log::warn!("Server rejected {kind} change for event {id}: {source}");
                    inner.roll_back(kind, &id, touched);
                    Err(MutationError {
                        kind,
                        id,
                        value,
                        source,
                    })
                }
            }
        }
        .boxed_local()
    }

    pub fn join(&self, id: EventId) -> LocalBoxFuture<'static, Result<(), MutationError>> {
        self.apply(MutationKind::Participation, id, true)
    }

    pub fn leave(&self, id: EventId) -> LocalBoxFuture<'static, Result<(), MutationError>> {
        self.apply(MutationKind::Participation, id, false)
    }

    pub fn like(&self, id: EventId) -> LocalBoxFuture<'static, Result<(), MutationError>> {
        self.apply(MutationKind::Favorite, id, true)
    }

    pub fn unlike(&self, id: EventId) -> LocalBoxFuture<'static, Result<(), MutationError>> {
        self.apply(MutationKind::Favorite, id, false)
    }
}

impl Inner {
    fn write_optimistic(&self, kind: MutationKind, id: &EventId, value: bool) -> Vec<Touched> {
        let mut entries = self.entries.borrow_mut();
        let membership = kind.membership();
        // Only needed when the record may have to be added somewhere.
        let source = value.then(|| find_copy(&entries, id)).flatten();

        let mut touched = Vec::new();
        for (key, entry) in entries.iter_mut() {
            let position = entry.records.iter().position(|r| r.id == *id);
            let is_membership = key.partition().kind() == membership;

            let prior = match (position, is_membership) {
                (Some(index), true) if !value => {
                    let record = entry.records.remove(index);
                    Prior::Present { index, record }
                }
                (Some(index), _) => {
                    let record = entry.records[index].clone();
                    if let Some(copy) = entry.records.get_mut(index) {
                        kind.set_flag(copy, value);
                    }
                    Prior::Present { index, record }
                }
                (None, true) if value => {
                    // Without a copy to insert, leave it for the next fetch.
                    let Some(source) = &source else { continue };
                    let mut copy = source.clone();
                    kind.set_flag(&mut copy, value);
                    entry.records.push_back(copy);
                    Prior::Absent
                }
                (None, _) => continue,
            };

            touched.push(Touched {
                key: key.clone(),
                epoch: entry.epoch,
                prior,
            });
        }

        log::info!(
            "Optimistic {kind}={value} for event {id} touched {} cache entries",
            touched.len()
        );
        touched
    }

    fn confirm(&self, kind: MutationKind, id: &EventId, touched: &[Touched]) {
        let membership = kind.membership();
        self.invalidate_where(|key| {
            key.partition().kind() == membership || touched.iter().any(|t| t.key == *key)
        });
        self.invalidate_record(id);
        log::info!("Server accepted {kind} change for event {id}");
    }

    fn roll_back(&self, kind: MutationKind, id: &EventId, touched: Vec<Touched>) {
        let mut entries = self.entries.borrow_mut();
        for Touched { key, epoch, prior } in touched {
            let Some(entry) = entries.get_mut(&key) else {
                continue;
            };
            if entry.epoch != epoch {
                // The server has answered for this key since; its copy wins.
                log::debug!("Not rolling back {key}, it was refetched");
                continue;
            }

            let position = entry.records.iter().position(|r| r.id == *id);
            match (prior, position) {
                (Prior::Present { record, .. }, Some(current)) => {
                    // Only this mutation's flag is restored; the other flag
                    // may have changed since.
                    if let Some(copy) = entry.records.get_mut(current) {
                        kind.set_flag(copy, kind.flag(&record));
                    }
                }
                (Prior::Present { index, record }, None) => {
                    let index = index.min(entry.records.len());
                    entry.records.insert(index, record);
                }
                (Prior::Absent, Some(current)) => {
                    entry.records.remove(current);
                }
                (Prior::Absent, None) => {}
            }
        }
        log::info!("Rolled back optimistic change for event {id}");
    }
}

/// Any cached copy of the record, preferring its detail entry.
fn find_copy(entries: &HashMap<PartitionKey, Entry>, id: &EventId) -> Option<EventRecord> {
    let in_detail = entries
        .get(&PartitionKey::detail(id.clone()))
        .and_then(|entry| entry.records.iter().find(|r| r.id == *id));

    in_detail
        .or_else(|| {
            entries
                .values()
                .flat_map(|entry| entry.records.iter())
                .find(|r| r.id == *id)
        })
        .cloned()
}
