use crate::mutation::MutationKind;
use crate::record::EventId;
use crate::transport::TransportError;

/// A fetch that failed for a reason other than "nothing matched". The cached
/// value for the key, if any, is left as it was.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("failed to fetch `{key}`: {source}")]
pub struct FetchError {
    pub key: String,
    pub source: TransportError,
}

/// The server declined a mutation. By the time this is returned every
/// optimistic write made for it has been rolled back.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("{kind} change to {value} for event {id} was rejected: {source}")]
pub struct MutationError {
    pub kind: MutationKind,
    pub id: EventId,
    pub value: bool,
    pub source: TransportError,
}
