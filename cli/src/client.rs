use anyhow::{Context, Result, bail};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::{Deserialize, de::DeserializeOwned};

use bodytrack_core::gateway::WeightGateway;
use bodytrack_core::models::{
    ImportSummary, NewWeightEntry, UserSettings, WeightEntry, WeightEntryPatch,
};
use bodytrack_core::settings::SettingsPatch;

/// [`WeightGateway`] over the REST API of a running `bodytrack serve`.
///
/// Calls block on the runtime handle captured at construction, so they must
/// be made from a blocking thread.
pub struct ApiClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    rt: tokio::runtime::Handle,
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

#[derive(Deserialize)]
struct BatchDeleteBody {
    deleted: usize,
}

impl ApiClient {
    pub fn new(base_url: &str, api_key: Option<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(format!("bodytrack-cli/{}", env!("CARGO_PKG_VERSION")))
            .timeout(std::time::Duration::from_secs(30))
            .connect_timeout(std::time::Duration::from_secs(5))
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
            rt: tokio::runtime::Handle::current(),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let builder = self
            .client
            .request(method, format!("{}/api/v1{path}", self.base_url));
        match self.api_key {
            Some(ref key) => builder.bearer_auth(key),
            None => builder,
        }
    }

    async fn send(&self, builder: RequestBuilder) -> Result<Response> {
        let resp = builder
            .send()
            .await
            .with_context(|| format!("Failed to reach server at {}", self.base_url))?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let message = resp
            .json::<ErrorBody>()
            .await
            .map_or_else(|_| status.to_string(), |b| b.error);
        bail!("Server returned {}: {message}", status.as_u16())
    }

    async fn send_json<T: DeserializeOwned>(&self, builder: RequestBuilder) -> Result<T> {
        self.send(builder)
            .await?
            .json()
            .await
            .context("Failed to parse server response")
    }

    async fn send_text(&self, builder: RequestBuilder) -> Result<String> {
        self.send(builder)
            .await?
            .text()
            .await
            .context("Failed to read server response")
    }

    async fn delete_entries_async(&self, ids: &[String]) -> Result<Option<usize>> {
        let resp = self
            .request(Method::POST, "/weight/batch-delete")
            .json(&serde_json::json!({ "ids": ids }))
            .send()
            .await
            .with_context(|| format!("Failed to reach server at {}", self.base_url))?;
        if matches!(
            resp.status(),
            StatusCode::NOT_FOUND | StatusCode::METHOD_NOT_ALLOWED
        ) {
            return Ok(None);
        }
        if !resp.status().is_success() {
            let status = resp.status();
            let message = resp
                .json::<ErrorBody>()
                .await
                .map_or_else(|_| status.to_string(), |b| b.error);
            bail!("Server returned {}: {message}", status.as_u16());
        }
        let body: BatchDeleteBody = resp
            .json()
            .await
            .context("Failed to parse server response")?;
        Ok(Some(body.deleted))
    }
}

impl WeightGateway for ApiClient {
    fn list_entries(&self) -> Result<Vec<WeightEntry>> {
        self.rt
            .block_on(self.send_json(self.request(Method::GET, "/weight")))
    }

    fn create_entry(&self, entry: &NewWeightEntry) -> Result<WeightEntry> {
        self.rt
            .block_on(self.send_json(self.request(Method::POST, "/weight").json(entry)))
    }

    fn update_entry(&self, id: &str, patch: &WeightEntryPatch) -> Result<WeightEntry> {
        self.rt.block_on(
            self.send_json(
                self.request(Method::PUT, &format!("/weight/{id}"))
                    .json(patch),
            ),
        )
    }

    fn delete_entry(&self, id: &str) -> Result<()> {
        self.rt
            .block_on(self.send(self.request(Method::DELETE, &format!("/weight/{id}"))))
            .map(|_| ())
    }

    fn delete_entries(&self, ids: &[String]) -> Result<Option<usize>> {
        self.rt.block_on(self.delete_entries_async(ids))
    }

    fn import_csv(&self, file_name: &str, data: Vec<u8>) -> Result<ImportSummary> {
        let part = reqwest::multipart::Part::bytes(data)
            .file_name(file_name.to_string())
            .mime_str("text/csv")?;
        let form = reqwest::multipart::Form::new().part("file", part);
        self.rt.block_on(
            self.send_json(
                self.request(Method::POST, "/weight/upload")
                    .multipart(form),
            ),
        )
    }

    fn export_csv(&self) -> Result<String> {
        self.rt
            .block_on(self.send_text(self.request(Method::GET, "/weight/export")))
    }

    fn template_csv(&self) -> Result<String> {
        self.rt
            .block_on(self.send_text(self.request(Method::GET, "/weight/template")))
    }

    fn get_settings(&self) -> Result<UserSettings> {
        self.rt
            .block_on(self.send_json(self.request(Method::GET, "/settings")))
    }

    fn update_settings(&self, patch: &SettingsPatch) -> Result<UserSettings> {
        self.rt
            .block_on(self.send_json(self.request(Method::PUT, "/settings").json(patch)))
    }

    fn reset_settings(&self) -> Result<UserSettings> {
        self.rt
            .block_on(self.send_json(self.request(Method::POST, "/settings/reset")))
    }
}
