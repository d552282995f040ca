//! The request/response exchange the cache is built on.
//!
//! Attaching credentials and reacting to an expired session belong to the
//! implementation; the cache only cares how a failure is classified.

use std::rc::Rc;

use futures::future::LocalBoxFuture;
use serde_json::Value;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Delete,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Request {
    pub method: Method,
    pub body: Option<Value>,
    pub headers: Vec<(String, String)>,
}

impl Request {
    pub fn new(method: Method) -> Self {
        Self {
            method,
            body: None,
            headers: Vec::new(),
        }
    }

    pub fn get() -> Self {
        Self::new(Method::Get)
    }

    pub fn post() -> Self {
        Self::new(Method::Post)
    }

    pub fn delete() -> Self {
        Self::new(Method::Delete)
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    /// The server found nothing for the request (404, 400 or 422).
    #[error("no matching results (status {status})")]
    NoMatches { status: u16 },
    #[error("not authorized")]
    Unauthorized,
    #[error("request failed with status {status}: {message}")]
    Status { status: u16, message: String },
    #[error("network error: {0}")]
    Network(String),
    #[error("could not decode response: {0}")]
    Decode(String),
}

impl TransportError {
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        match status {
            400 | 404 | 422 => TransportError::NoMatches { status },
            401 => TransportError::Unauthorized,
            _ => TransportError::Status {
                status,
                message: message.into(),
            },
        }
    }

    pub fn is_no_matches(&self) -> bool {
        matches!(self, TransportError::NoMatches { .. })
    }
}

pub trait Transport {
    /// Perform one exchange. `path` includes the query string. A successful
    /// response without a body yields `Value::Null`.
    fn exchange(&self, path: &str, request: Request) -> LocalBoxFuture<'_, Result<Value, TransportError>>;
}

impl<T: Transport + ?Sized> Transport for Rc<T> {
    fn exchange(&self, path: &str, request: Request) -> LocalBoxFuture<'_, Result<Value, TransportError>> {
        (**self).exchange(path, request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_classification() {
        assert!(TransportError::from_status(404, "").is_no_matches());
        assert!(TransportError::from_status(400, "").is_no_matches());
        assert!(TransportError::from_status(422, "").is_no_matches());
        assert_eq!(TransportError::from_status(401, "x"), TransportError::Unauthorized);
        assert_eq!(
            TransportError::from_status(503, "down"),
            TransportError::Status {
                status: 503,
                message: "down".to_string()
            }
        );
    }
}
