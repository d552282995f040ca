//! Talking to the events API over HTTP.
use std::cell::RefCell;
use std::rc::Rc;

use futures::future::{FutureExt, LocalBoxFuture};
use serde_json::Value;

use crate::config::ClientConfig;
use crate::transport::{Method, Request, Transport, TransportError};

/// The bearer token for the current login. Cleared when the server answers 401.
#[derive(Debug, Default)]
pub struct Session {
    token: RefCell<Option<String>>,
}

impl Session {
    pub fn new(token: Option<String>) -> Rc<Self> {
        Rc::new(Self {
            token: RefCell::new(token),
        })
    }

    pub fn token(&self) -> Option<String> {
        self.token.borrow().clone()
    }

    pub fn set_token(&self, token: String) {
        *self.token.borrow_mut() = Some(token);
    }

    pub fn clear(&self) {
        self.token.borrow_mut().take();
    }

    pub fn is_logged_in(&self) -> bool {
        self.token.borrow().is_some()
    }
}

pub struct HttpTransport {
    client: reqwest::Client,
    api_url: String,
    session: Rc<Session>,
}

impl HttpTransport {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_session(config, Session::new(config.access_token.clone()))
    }

    pub fn with_session(config: &ClientConfig, session: Rc<Session>) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_url: config.api_url.clone(),
            session,
        }
    }

    pub fn session(&self) -> Rc<Session> {
        Rc::clone(&self.session)
    }
}

impl Transport for HttpTransport {
    fn exchange(&self, path: &str, request: Request) -> LocalBoxFuture<'_, Result<Value, TransportError>> {
        let url = format!("{}{path}", self.api_url);
        let mut builder = match request.method {
            Method::Get => self.client.get(&url),
            Method::Post => self.client.post(&url),
            Method::Delete => self.client.delete(&url),
        };
        builder = builder.header("Content-Type", "application/json");
        if let Some(token) = self.session.token() {
            builder = builder.header("Authorization", format!("Bearer {token}"));
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.json(body);
        }

        async move {
            let response = builder
                .send()
                .await
                .map_err(|e| TransportError::Network(e.to_string()))?;
            let status = response.status();

            if status == reqwest::StatusCode::UNAUTHORIZED {
                log::warn!("{url} answered 401, clearing session");
                self.session.clear();
                return Err(TransportError::Unauthorized);
            }

            let body = response
                .text()
                .await
                .map_err(|e| TransportError::Network(e.to_string()))?;
            let payload = parse_body(&body);

            if !status.is_success() {
                let message = error_message(&payload)
                    .unwrap_or_else(|| format!("HTTP error! Status: {}", status.as_u16()));
                return Err(TransportError::from_status(status.as_u16(), message));
            }

            Ok(payload)
        }
        .boxed_local()
    }
}

/// JSON if it parses, otherwise the raw text. An empty body is `Null`.
fn parse_body(body: &str) -> Value {
    if body.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(body).unwrap_or_else(|_| Value::String(body.to_string()))
}

fn error_message(payload: &Value) -> Option<String> {
    let from_object = ["message", "error", "detail"]
        .iter()
        .find_map(|field| payload.get(*field).and_then(Value::as_str));
    from_object
        .or_else(|| payload.as_str())
        .filter(|message| !message.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_body() {
        assert_eq!(parse_body(""), Value::Null);
        assert_eq!(parse_body("[1]"), json!([1]));
        assert_eq!(parse_body("Not Found"), json!("Not Found"));
    }

    #[test]
    fn test_error_message() {
        assert_eq!(error_message(&json!({"detail": "Event not found"})).as_deref(), Some("Event not found"));
        assert_eq!(error_message(&json!("plain text")).as_deref(), Some("plain text"));
        assert_eq!(error_message(&json!({"code": 3})), None);
        assert_eq!(error_message(&Value::Null), None);
    }

    #[test]
    fn test_session_lifecycle() {
        let session = Session::new(Some("t".to_string()));
        assert!(session.is_logged_in());
        session.clear();
        assert_eq!(session.token(), None);
        session.set_token("u".to_string());
        assert_eq!(session.token().as_deref(), Some("u"));
    }
}
