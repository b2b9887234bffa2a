//! reqwest-backed gateway.

use super::{GatewayResponse, Method, RemoteGateway};
use crate::error::{Error, Result};
use async_trait::async_trait;
use autopatch_engine::{ContentType, FormConfig};
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde_json::Value;

/// Gateway that talks to the form's action URL over HTTP.
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: Client,
    url: String,
    content_type: ContentType,
}

impl HttpGateway {
    /// Build a gateway from form settings.
    ///
    /// `with_credentials` enables a cookie store so session cookies set by
    /// the remote are sent back on later requests.
    pub fn new(config: &FormConfig) -> Result<Self> {
        let client = Client::builder()
            .cookie_store(config.with_credentials)
            .build()?;

        Ok(Self {
            client,
            url: config.action.clone(),
            content_type: config.content_type,
        })
    }

    /// Target URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl RemoteGateway for HttpGateway {
    async fn send(&self, method: Method, body: Option<&Value>) -> Result<GatewayResponse> {
        let media_type = self.content_type.as_str();
        let mut request = match method {
            Method::Get => self.client.get(&self.url),
            Method::Patch => self.client.patch(&self.url),
        }
        .header(ACCEPT, media_type);

        if let Some(body) = body {
            request = request
                .header(CONTENT_TYPE, media_type)
                .body(serde_json::to_vec(body)?);
        }

        tracing::debug!(%method, url = %self.url, "Sending request");
        let response = request.send().await?;
        let status = response.status();

        if !status.is_success() {
            tracing::warn!(%method, status = status.as_u16(), "Remote rejected request");
            return Err(Error::Status {
                method: method.as_str(),
                status: status.as_u16(),
            });
        }

        // A success status is enough; a body that is not JSON reads as null
        let bytes = response.bytes().await?;
        let body = if bytes.iter().all(u8::is_ascii_whitespace) {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).unwrap_or_else(|e| {
                tracing::debug!(%method, error = %e, "Response body is not JSON");
                Value::Null
            })
        };

        Ok(GatewayResponse {
            status: status.as_u16(),
            body,
        })
    }
}
