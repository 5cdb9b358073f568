use std::time::Duration;

use chrono::Utc;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use url::Url;

use super::FleetGateway;
use super::error::GatewayError;
use super::types::{BootResource, BootSource, DeployRequest, Machine, Pool, Tag};

const API_PREFIX: &str = "api/2.0";

/// HTTP client for a MAAS region controller.
pub struct MaasClient {
    base_url: String,
    credentials: ApiKey,
    client: Client,
}

/// The three colon-separated parts of a MAAS API key.
#[derive(Clone)]
struct ApiKey {
    consumer_key: String,
    token: String,
    secret: String,
}

impl ApiKey {
    fn parse(raw: &str) -> Result<Self, GatewayError> {
        let parts: Vec<&str> = raw.trim().split(':').collect();
        match parts.as_slice() {
            [consumer_key, token, secret]
                if !consumer_key.is_empty() && !token.is_empty() && !secret.is_empty() =>
            {
                Ok(Self {
                    consumer_key: consumer_key.to_string(),
                    token: token.to_string(),
                    secret: secret.to_string(),
                })
            }
            _ => Err(GatewayError::Config(
                "API key must have the form consumer_key:token:secret".into(),
            )),
        }
    }

    /// OAuth 1.0 PLAINTEXT header value, fresh nonce and timestamp per call.
    fn authorization(&self) -> String {
        let signature: String =
            url::form_urlencoded::byte_serialize(self.secret.as_bytes()).collect();
        let nonce = uuid::Uuid::new_v4().simple().to_string();
        let timestamp = Utc::now().timestamp();
        format!(
            "OAuth oauth_version=\"1.0\", oauth_signature_method=\"PLAINTEXT\", \
             oauth_consumer_key=\"{}\", oauth_token=\"{}\", oauth_signature=\"&{signature}\", \
             oauth_nonce=\"{nonce}\", oauth_timestamp=\"{timestamp}\"",
            self.consumer_key, self.token
        )
    }
}

impl MaasClient {
    /// `base_url` is the region URL, e.g. `http://maas.lab:5240/MAAS`.
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, GatewayError> {
        if base_url.trim().is_empty() {
            return Err(GatewayError::Config("MAAS URL is not set".into()));
        }
        Url::parse(base_url)?;
        let credentials = ApiKey::parse(api_key)?;
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(10))
            .timeout(timeout)
            .build()
            .expect("failed to build HTTP client");
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            credentials,
            client,
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url, GatewayError> {
        Ok(Url::parse(&format!("{}/{API_PREFIX}/{path}", self.base_url))?)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, GatewayError> {
        let response = request
            .header("Authorization", self.credentials.authorization())
            .header("Accept", "application/json")
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response
                .text()
                .await
                .unwrap_or_else(|_| "unknown error".to_string());
            tracing::warn!(status = status.as_u16(), %message, "MAAS API call rejected");
            return Err(GatewayError::Api {
                status: status.as_u16(),
                message,
            });
        }

        Ok(response.json::<T>().await?)
    }

    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, GatewayError> {
        let url = self.endpoint(path)?;
        tracing::debug!(%url, "GET");
        self.send(self.client.get(url)).await
    }
}

impl FleetGateway for MaasClient {
    async fn list_machines(&self) -> Result<Vec<Machine>, GatewayError> {
        self.get("machines/").await
    }

    async fn list_tags(&self) -> Result<Vec<Tag>, GatewayError> {
        self.get("tags/").await
    }

    async fn list_pools(&self) -> Result<Vec<Pool>, GatewayError> {
        self.get("resourcepools/").await
    }

    async fn list_boot_sources(&self) -> Result<Vec<BootSource>, GatewayError> {
        self.get("boot-sources/").await
    }

    async fn list_boot_resources(&self) -> Result<Vec<BootResource>, GatewayError> {
        self.get("boot-resources/").await
    }

    async fn deploy(
        &self,
        system_id: &str,
        request: &DeployRequest,
    ) -> Result<serde_json::Value, GatewayError> {
        let url = self.endpoint(&format!("machines/{system_id}/"))?;
        let mut form = vec![("op", "deploy"), ("distro_series", request.distro_series.as_str())];
        if let Some(user_data) = &request.user_data {
            form.push(("user_data", user_data.as_str()));
        }
        tracing::debug!(%url, system_id, distro = %request.distro_series, "POST deploy");
        self.send(self.client.post(url).form(&form)).await
    }
}
