//! Thin JSON-over-HTTP client for one backend service.
//!
//! Every backend (central, search, updates) is reached through a
//! [`BackendClient`] bound to its base URL. Responses are classified once
//! here so the layers above only ever see a [`ClientError`]:
//!
//! - transport failure or non-success HTTP status → [`ClientError::Network`]
//! - body that does not deserialize → [`ClientError::Backend`]

use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;

use crate::config::{Config, ServiceConfig};
use crate::error::{ClientError, ClientResult};

/// The three backend services the client depends on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Service {
    Central,
    Search,
    Updates,
}

impl Service {
    pub const ALL: [Service; 3] = [Service::Central, Service::Search, Service::Updates];

    pub fn name(&self) -> &'static str {
        match self {
            Service::Central => "central",
            Service::Search => "search",
            Service::Updates => "updates",
        }
    }

    pub fn from_name(name: &str) -> Option<Service> {
        Service::ALL.into_iter().find(|s| s.name() == name)
    }

    pub fn config<'a>(&self, config: &'a Config) -> &'a ServiceConfig {
        match self {
            Service::Central => &config.services.central,
            Service::Search => &config.services.search,
            Service::Updates => &config.services.updates,
        }
    }
}

#[derive(Debug, Clone)]
pub struct BackendClient {
    base_url: String,
    client: reqwest::Client,
}

impl BackendClient {
    pub fn new(base_url: &str, timeout: Duration) -> ClientResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Client for `service` using the URL and request timeout from `config`.
    pub fn for_service(config: &Config, service: Service) -> ClientResult<Self> {
        Self::new(
            &service.config(config).url,
            config.readiness.request_timeout(),
        )
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    pub async fn get_json<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> ClientResult<T> {
        self.request_json(Method::GET, path, query).await
    }

    pub async fn post_json<T: DeserializeOwned>(&self, path: &str) -> ClientResult<T> {
        self.request_json(Method::POST, path, &[]).await
    }

    pub async fn request_json<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        query: &[(&str, String)],
    ) -> ClientResult<T> {
        let url = self.url(path);
        let mut request = self.client.request(method.clone(), &url);
        if !query.is_empty() {
            request = request.query(query);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(http_status_error(status));
        }

        let body = response.bytes().await?;
        serde_json::from_slice(&body).map_err(|e| {
            ClientError::Backend(format!("malformed payload from {} {}: {}", method, url, e))
        })
    }
}

fn http_status_error(status: StatusCode) -> ClientError {
    ClientError::Network(format!("HTTP error! status: {}", status.as_u16()))
}
