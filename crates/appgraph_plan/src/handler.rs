//! Request handler contract.
//!
//! Handler code lives outside the graph. What the graph fixes is the shape
//! of a call: a method, the path parameters captured by the route tree and a
//! JSON body in, a status and a JSON body out.

use crate::route::{Method, RouteMatch};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

/// Request delivered to a handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerRequest {
    /// Method the request arrived with
    pub method: Method,
    /// Path parameters by name
    #[serde(default)]
    pub path_parameters: BTreeMap<String, String>,
    /// Request body
    #[serde(default)]
    pub body: serde_json::Value,
}

impl HandlerRequest {
    /// Request without parameters or body
    #[must_use]
    pub fn new(method: Method) -> Self {
        Self {
            method,
            path_parameters: BTreeMap::new(),
            body: serde_json::Value::Null,
        }
    }

    /// Build a request from a route match, carrying its captures by name
    #[must_use]
    pub fn from_match(method: Method, route: &RouteMatch, body: serde_json::Value) -> Self {
        Self {
            method,
            path_parameters: route.parameters.clone(),
            body,
        }
    }

    /// Set the body
    #[must_use]
    pub fn with_body(mut self, body: serde_json::Value) -> Self {
        self.body = body;
        self
    }

    /// Add a path parameter
    #[must_use]
    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.path_parameters.insert(name.into(), value.into());
        self
    }

    /// Look up a path parameter
    ///
    /// # Errors
    ///
    /// Returns `MissingParameter` if it was not captured
    pub fn parameter(&self, name: &str) -> Result<&str, HandlerError> {
        self.path_parameters
            .get(name)
            .map(String::as_str)
            .ok_or_else(|| HandlerError::MissingParameter(name.to_string()))
    }
}

/// Response returned by a handler
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerResponse {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: serde_json::Value,
}

impl HandlerResponse {
    /// Response with an explicit status
    #[must_use]
    pub fn new(status: u16, body: serde_json::Value) -> Self {
        Self { status, body }
    }

    /// 200 OK
    #[must_use]
    pub fn ok(body: serde_json::Value) -> Self {
        Self::new(200, body)
    }

    /// 201 Created
    #[must_use]
    pub fn created(body: serde_json::Value) -> Self {
        Self::new(201, body)
    }
}

/// Handler failure
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandlerError {
    /// A path parameter the handler needs was not captured
    #[error("missing path parameter '{0}'")]
    MissingParameter(String),

    /// The body could not be interpreted
    #[error("invalid request body: {0}")]
    InvalidBody(String),

    /// The handler ran and failed
    #[error("handler failed: {0}")]
    Failed(String),
}

impl HandlerError {
    /// Status code an executor reports for this failure
    #[must_use]
    pub fn status(&self) -> u16 {
        match self {
            Self::MissingParameter(_) | Self::InvalidBody(_) => 400,
            Self::Failed(_) => 500,
        }
    }
}

/// The contract every compute unit's handler fulfils
pub trait Handler: Send + Sync {
    /// Handle one request
    ///
    /// # Errors
    ///
    /// Returns a [`HandlerError`] when the request cannot be served
    fn handle(&self, request: HandlerRequest) -> Result<HandlerResponse, HandlerError>;
}

impl<F> Handler for F
where
    F: Fn(HandlerRequest) -> Result<HandlerResponse, HandlerError> + Send + Sync,
{
    fn handle(&self, request: HandlerRequest) -> Result<HandlerResponse, HandlerError> {
        self(request)
    }
}
