//! Remote Gateway: the network boundary of a form.
//!
//! A gateway fetches the current document with GET and submits coalesced
//! changes with PATCH. It knows nothing about the payload envelope; the
//! controller wraps and unwraps bodies before and after calling it.

mod http;

pub use http::HttpGateway;

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

/// HTTP method used against the form's action URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Patch,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Patch => "PATCH",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A successful (2xx) response.
#[derive(Debug, Clone, PartialEq)]
pub struct GatewayResponse {
    pub status: u16,
    /// Parsed JSON body, `Value::Null` when the body was empty
    pub body: Value,
}

/// User-provided network layer.
///
/// Implementations return an error for network failures and for any
/// non-2xx status. They must not retry.
#[async_trait]
pub trait RemoteGateway: Send + Sync {
    /// Send a request. GET carries no body.
    async fn send(&self, method: Method, body: Option<&Value>) -> Result<GatewayResponse>;
}
