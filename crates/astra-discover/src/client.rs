use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::de::DeserializeOwned;
use tracing::{debug, instrument, warn};

use astra_core::{Discovery, DiscoveryError, host_name};
use astra_model::{ComponentId, Location, Registration};

use crate::{DiscoverConfig, DiscoverError, RegisterRequest, RegisterResponse};

/// `Discovery` backed by a remote location service.
///
/// | operation  | request                          |
/// |------------|----------------------------------|
/// | register   | `POST /v1/components`            |
/// | unregister | `DELETE /v1/components/{id}`     |
/// | resolve    | `GET /v1/components/{id}`        |
pub struct HttpDiscovery {
    client: reqwest::Client,
    config: DiscoverConfig,
}

impl HttpDiscovery {
    pub fn new(config: DiscoverConfig) -> Result<Self, DiscoverError> {
        config.validate()?;
        let client = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &DiscoverConfig {
        &self.config
    }

    #[instrument(level = "debug", skip_all, fields(component = %registration.id))]
    async fn try_register(&self, registration: Registration) -> Result<(), DiscoverError> {
        let request = RegisterRequest {
            id: registration.id,
            location: registration.location,
            service: registration.service,
            host: host_name(),
            metadata: self.config.metadata.clone(),
        };

        let response = self
            .client
            .post(self.config.url("v1/components"))
            .json(&request)
            .send()
            .await?
            .error_for_status()?;

        let reply: RegisterResponse = parse(response).await?;
        if !reply.success {
            return Err(DiscoverError::Rejected(reply.message));
        }
        debug!("registered with location service");
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn try_unregister(&self, id: &ComponentId) -> Result<(), DiscoverError> {
        let response = self
            .client
            .delete(self.config.url(&format!("v1/components/{id}")))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            debug!("nothing to unregister");
            return Ok(());
        }
        response.error_for_status()?;
        Ok(())
    }

    #[instrument(level = "debug", skip(self))]
    async fn try_resolve(&self, id: &ComponentId) -> Result<Option<Location>, DiscoverError> {
        let response = self
            .client
            .get(self.config.url(&format!("v1/components/{id}")))
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let location = parse(response.error_for_status()?).await?;
        Ok(Some(location))
    }
}

async fn parse<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, DiscoverError> {
    let body = response.text().await?;
    serde_json::from_str(&body).map_err(|e| {
        warn!(reason = %e, "unparseable response from location service");
        DiscoverError::InvalidResponse(format!("failed to parse response: {e}, body: {body}"))
    })
}

#[async_trait]
impl Discovery for HttpDiscovery {
    async fn register(&self, registration: Registration) -> Result<(), DiscoveryError> {
        Ok(self.try_register(registration).await?)
    }

    async fn unregister(&self, id: &ComponentId) -> Result<(), DiscoveryError> {
        Ok(self.try_unregister(id).await?)
    }

    async fn resolve(&self, id: &ComponentId) -> Result<Option<Location>, DiscoveryError> {
        Ok(self.try_resolve(id).await?)
    }
}
