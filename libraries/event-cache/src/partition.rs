//! Partitions and the keys the cache stores them under.

use std::fmt;

use crate::filter::{CompiledFilter, ServerQuery};
use crate::record::{EventId, EventRecord, EventStatus};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Partition {
    /// Events the current user takes part in.
    Mine,
    Active,
    Past,
    Favorites,
    Detail(EventId),
}

/// [`Partition`] without the detail id, for "every entry of this partition".
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PartitionKind {
    Mine,
    Active,
    Past,
    Favorites,
    Detail,
}

impl Partition {
    pub fn kind(&self) -> PartitionKind {
        match self {
            Partition::Mine => PartitionKind::Mine,
            Partition::Active => PartitionKind::Active,
            Partition::Past => PartitionKind::Past,
            Partition::Favorites => PartitionKind::Favorites,
            Partition::Detail(_) => PartitionKind::Detail,
        }
    }

    pub fn name(&self) -> &'static str {
        match self.kind() {
            PartitionKind::Mine => "mine",
            PartitionKind::Active => "active",
            PartitionKind::Past => "past",
            PartitionKind::Favorites => "favorites",
            PartitionKind::Detail => "detail",
        }
    }

    /// Whether a record the server returned belongs in this partition. The
    /// server does not restrict `active` by status, so that is done here.
    /// Records without a recognised status are kept.
    pub fn admits(&self, record: &EventRecord) -> bool {
        match (self, record.status) {
            (Partition::Active, Some(status)) => {
                matches!(status, EventStatus::Upcoming | EventStatus::Active)
            }
            (Partition::Past, Some(status)) => status == EventStatus::Completed,
            _ => true,
        }
    }
}

/// A partition together with the server query it was fetched with. Two
/// different filters never share an entry.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PartitionKey {
    partition: Partition,
    query: ServerQuery,
}

impl PartitionKey {
    pub fn new(partition: Partition, query: ServerQuery) -> Self {
        // A single record is never filtered.
        let query = match partition {
            Partition::Detail(_) => ServerQuery::new(),
            _ => query,
        };
        Self { partition, query }
    }

    pub fn filtered(partition: Partition, filter: &CompiledFilter) -> Self {
        Self::new(partition, filter.server_query.clone())
    }

    pub fn detail(id: impl Into<EventId>) -> Self {
        Self::new(Partition::Detail(id.into()), ServerQuery::new())
    }

    pub fn partition(&self) -> &Partition {
        &self.partition
    }

    pub fn query(&self) -> &ServerQuery {
        &self.query
    }

    /// Path and query string of the endpoint serving this key.
    pub fn path(&self) -> String {
        let (base, query) = match &self.partition {
            Partition::Mine => ("/api/events".to_string(), self.query.clone().with("user_id", "-1")),
            Partition::Active => ("/api/events".to_string(), self.query.clone()),
            Partition::Past => (
                "/api/events".to_string(),
                self.query
                    .clone()
                    .with("status", EventStatus::Completed.as_str()),
            ),
            Partition::Favorites => ("/api/events/liked".to_string(), self.query.clone()),
            Partition::Detail(id) => (format!("/api/events/{id}"), ServerQuery::new()),
        };

        if query.is_empty() {
            base
        } else {
            format!("{base}?{query}")
        }
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.partition {
            Partition::Detail(id) => write!(f, "detail({id})"),
            partition if self.query.is_empty() => f.write_str(partition.name()),
            partition => write!(f, "{}?{}", partition.name(), self.query),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn query(pairs: &[(&str, &str)]) -> ServerQuery {
        let mut query = ServerQuery::new();
        for (k, v) in pairs {
            query.push(k, *v);
        }
        query
    }

    #[test]
    fn test_paths() {
        let q = query(&[("city", "Kazan"), ("city", "Moscow")]);

        assert_eq!(
            PartitionKey::new(Partition::Active, q.clone()).path(),
            "/api/events?city=Kazan&city=Moscow"
        );
        assert_eq!(
            PartitionKey::new(Partition::Mine, q.clone()).path(),
            "/api/events?city=Kazan&city=Moscow&user_id=-1"
        );
        assert_eq!(
            PartitionKey::new(Partition::Favorites, ServerQuery::new()).path(),
            "/api/events/liked"
        );
        assert_eq!(PartitionKey::detail("17").path(), "/api/events/17");
    }

    #[test]
    fn test_past_forces_completed_status() {
        let key = PartitionKey::new(Partition::Past, query(&[("status", "active"), ("type", "Meetup")]));
        assert_eq!(key.path(), "/api/events?type=Meetup&status=completed");
    }

    #[test]
    fn test_status_membership() {
        let with_status = |status| {
            let mut record = EventRecord::new("1", "Meetup");
            record.status = status;
            record
        };
        let upcoming = with_status(Some(EventStatus::Upcoming));
        let active = with_status(Some(EventStatus::Active));
        let completed = with_status(Some(EventStatus::Completed));
        let cancelled = with_status(Some(EventStatus::Cancelled));
        let unknown = with_status(None);

        assert!(Partition::Active.admits(&upcoming));
        assert!(Partition::Active.admits(&active));
        assert!(!Partition::Active.admits(&completed));
        assert!(!Partition::Active.admits(&cancelled));
        assert!(Partition::Active.admits(&unknown));

        assert!(Partition::Past.admits(&completed));
        assert!(!Partition::Past.admits(&cancelled));
        assert!(Partition::Mine.admits(&cancelled));
    }

    #[test]
    fn test_filters_do_not_collide() {
        let a = PartitionKey::new(Partition::Active, query(&[("city", "Kazan")]));
        let b = PartitionKey::new(Partition::Active, query(&[("city", "Moscow")]));
        assert_ne!(a, b);
        assert_eq!(a.to_string(), "active?city=Kazan");
    }

    #[test]
    fn test_detail_ignores_query() {
        let key = PartitionKey::new(Partition::Detail("3".into()), query(&[("city", "Kazan")]));
        assert_eq!(key, PartitionKey::detail("3"));
        assert_eq!(key.to_string(), "detail(3)");
    }
}
