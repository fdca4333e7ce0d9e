use crate::error::{Error, Result};

/// Connection settings for one client instance.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the REST boundary, e.g. `http://127.0.0.1:3000/api`.
    pub api_url: String,
    /// WebSocket URL of the realtime gateway, e.g. `ws://127.0.0.1:3000/gateway`.
    pub gateway_url: String,
    /// Bearer token presented on every REST call and on the upgrade request.
    pub token: String,
}

impl ClientConfig {
    pub fn new(api_url: impl Into<String>, gateway_url: impl Into<String>, token: impl Into<String>) -> Self {
        Self {
            api_url: api_url.into(),
            gateway_url: gateway_url.into(),
            token: token.into(),
        }
    }

    /// Read configuration from `WREN_API_URL`, `WREN_GATEWAY_URL` and
    /// `WREN_TOKEN`. The URLs fall back to a local development server;
    /// the token is required.
    pub fn from_env() -> Result<Self> {
        let api_url =
            std::env::var("WREN_API_URL").unwrap_or_else(|_| "http://127.0.0.1:3000/api".into());
        let gateway_url = std::env::var("WREN_GATEWAY_URL")
            .unwrap_or_else(|_| "ws://127.0.0.1:3000/gateway".into());
        let token = std::env::var("WREN_TOKEN")
            .map_err(|_| Error::Config("WREN_TOKEN is not set".to_string()))?;

        Ok(Self {
            api_url,
            gateway_url,
            token,
        })
    }
}
