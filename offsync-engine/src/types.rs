//! Request and response types shared by the gateway, queue and transport.

use crate::error::EngineResult;
use chrono::Duration;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// HTTP verb of a request.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    /// Create/update/delete-style verbs. Only these are ever queued.
    pub fn is_mutating(&self) -> bool {
        !matches!(self, HttpMethod::Get)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Delete => "DELETE",
        }
    }

    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Caller-facing options for [`ApiGateway::request`](crate::gateway::ApiGateway::request).
#[derive(Clone, Debug, Default, PartialEq)]
pub struct RequestOptions {
    pub method: HttpMethod,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Value>,
    /// Overrides the default cache lifetime for a successful GET.
    pub cache_ttl: Option<Duration>,
}

impl RequestOptions {
    pub fn get() -> Self {
        Self::default()
    }

    pub fn post(body: Value) -> Self {
        Self::with_body(HttpMethod::Post, body)
    }

    pub fn put(body: Value) -> Self {
        Self::with_body(HttpMethod::Put, body)
    }

    pub fn patch(body: Value) -> Self {
        Self::with_body(HttpMethod::Patch, body)
    }

    pub fn delete() -> Self {
        Self {
            method: HttpMethod::Delete,
            ..Self::default()
        }
    }

    fn with_body(method: HttpMethod, body: Value) -> Self {
        Self {
            method,
            body: Some(body),
            ..Self::default()
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache_ttl = Some(ttl);
        self
    }

    /// Binds the options to an endpoint.
    pub fn into_request(self, endpoint: &str) -> OutboundRequest {
        OutboundRequest {
            url: endpoint.to_string(),
            method: self.method,
            headers: self.headers,
            body: self.body,
        }
    }
}

/// A fully described request, as sent live or stored in the action queue.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OutboundRequest {
    /// Same-origin path (or absolute URL).
    pub url: String,
    pub method: HttpMethod,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default)]
    pub body: Option<Value>,
}

impl OutboundRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            method: HttpMethod::Get,
            headers: BTreeMap::new(),
            body: None,
        }
    }
}

/// Where a gateway response came from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ResponseSource {
    /// Answered by the server.
    #[default]
    Live,
    /// Served from the encrypted cache.
    Cache,
    /// Stored in the action queue for later replay.
    Queued { action_id: Uuid },
    /// Nothing could answer it.
    Failed,
}

/// The JSON envelope every endpoint returns:
/// `{success, data?, error?, message?}`.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ApiResponse<T = Value> {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip)]
    pub source: ResponseSource,
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
            message: None,
            source: ResponseSource::Live,
        }
    }

    pub fn failure(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
            message: None,
            source: ResponseSource::Failed,
        }
    }

    pub fn is_queued(&self) -> bool {
        matches!(self.source, ResponseSource::Queued { .. })
    }

    pub fn is_from_cache(&self) -> bool {
        self.source == ResponseSource::Cache
    }

    /// Id of the queued action, if this request was deferred.
    pub fn queued_action_id(&self) -> Option<Uuid> {
        match self.source {
            ResponseSource::Queued { action_id } => Some(action_id),
            _ => None,
        }
    }
}

impl ApiResponse<Value> {
    pub(crate) fn from_cache(data: Value) -> Self {
        Self {
            source: ResponseSource::Cache,
            ..Self::ok(data)
        }
    }

    /// The "pending, not failed" answer for a deferred mutating request.
    pub(crate) fn queued(action_id: Uuid) -> Self {
        Self {
            success: false,
            data: Some(serde_json::json!({ "actionId": action_id })),
            error: None,
            message: Some("request queued for sync".to_string()),
            source: ResponseSource::Queued { action_id },
        }
    }

    /// Converts `data` into a concrete type, keeping the envelope.
    pub fn into_typed<T: DeserializeOwned>(self) -> EngineResult<ApiResponse<T>> {
        let data = self.data.map(serde_json::from_value).transpose()?;
        Ok(ApiResponse {
            success: self.success,
            data,
            error: self.error,
            message: self.message,
            source: self.source,
        })
    }
}
