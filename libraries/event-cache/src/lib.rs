//! A client-side cache for an events API, built so that the UI reacts to a
//! user's actions immediately.
//!
//! How it fits together:
//! 1. The UI edits an [`EventFilter`]. [`compile`] splits it into a query the
//!    server understands and a [`ResidualPredicate`] for the rest.
//! 2. The same events are fetched through several partitions ("mine", "active",
//!    "past", "favorites", a single event's detail), each cached separately per
//!    query by [`EventCache`].
//! 3. Joining, leaving, liking and unliking go through [`EventCache::apply`],
//!    which updates every cached copy before the request is sent and undoes the
//!    change if the server refuses it.
//! 4. [`project`] narrows a cached partition by the residual predicate and a
//!    search box, without touching the network.

pub mod cache;
pub mod config;
pub mod error;
pub mod filter;
#[cfg(feature = "http")]
pub mod http;
pub mod mutation;
pub mod normalize;
pub mod partition;
pub mod project;
pub mod record;
#[cfg(any(test, feature = "testing"))]
pub mod scripted;
pub mod transport;

pub use cache::{Clock, EventCache, Records, Resolution, SystemClock};
pub use config::ClientConfig;
pub use error::{FetchError, MutationError};
pub use filter::{CompiledFilter, EventFilter, ResidualPredicate, ServerQuery, compile};
pub use mutation::MutationKind;
pub use partition::{Partition, PartitionKey, PartitionKind};
pub use project::project;
pub use record::{EventId, EventRecord, EventStatus};
pub use transport::{Method, Request, Transport, TransportError};
