use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::api::types::{
    ConnectionToken, CreateMigrationRequest, CreatedTask, Credentials, DeviceList, Envelope,
    FolderInfo, HealthStatus, ScanResult, StorageList, TaskPage, TaskStatus,
};
use crate::config::ClientConfig;
use crate::error::{ClientError, Result};
use crate::input_validation::validate_task_id;

/// Operations exposed by the migration service.
///
/// Every method either yields its typed payload or fails with
/// [`ClientError::RequestFailed`] (or a `Validation` error for arguments that
/// can be rejected locally). No method retries on its own.
#[async_trait]
pub trait MigrationApi: Send + Sync {
    async fn health(&self) -> Result<HealthStatus>;
    async fn scan(&self) -> Result<ScanResult>;
    async fn discover_devices(&self) -> Result<DeviceList>;
    async fn folder_details(&self, path: &str) -> Result<FolderInfo>;
    async fn test_connection(&self, credentials: &Credentials) -> Result<ConnectionToken>;
    async fn list_storages(&self, credentials: &Credentials) -> Result<StorageList>;
    async fn create_migration(&self, request: &CreateMigrationRequest) -> Result<CreatedTask>;
    async fn task_status(&self, task_id: &str) -> Result<TaskStatus>;
    async fn list_tasks(&self, limit: u32, offset: u32) -> Result<TaskPage>;
    async fn pause_task(&self, task_id: &str) -> Result<()>;
    async fn resume_task(&self, task_id: &str) -> Result<()>;
    async fn cancel_task(&self, task_id: &str) -> Result<()>;
}

/// Turn a raw response body into the payload, normalizing every failure into
/// `RequestFailed`.
pub fn decode_envelope<T: DeserializeOwned>(body: &[u8]) -> Result<T> {
    let envelope: Envelope<Value> = serde_json::from_slice(body)
        .map_err(|e| ClientError::RequestFailed(format!("Failed to parse response: {e}")))?;

    if envelope.code != 0 {
        let message = if envelope.message.is_empty() {
            "Request failed".to_string()
        } else {
            envelope.message
        };
        return Err(ClientError::RequestFailed(message));
    }

    serde_json::from_value(envelope.data.unwrap_or(Value::Null))
        .map_err(|e| ClientError::RequestFailed(format!("Failed to parse response: {e}")))
}

#[derive(Serialize)]
struct PathRequest<'a> {
    path: &'a str,
}

/// `MigrationApi` over HTTP.
#[derive(Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

impl HttpGateway {
    pub fn new(config: &ClientConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config.api_url())
    }

    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, route: &str) -> String {
        format!("{}{}", self.base_url, route)
    }

    async fn read<T: DeserializeOwned>(&self, request: reqwest::RequestBuilder) -> Result<T> {
        let response = request
            .header("Accept", "application/json")
            .send()
            .await?;
        // Error envelopes come back with non-2xx codes too, so the status is
        // not inspected; the envelope decides.
        let body = response.bytes().await?;
        decode_envelope(&body)
    }

    async fn get<T: DeserializeOwned>(&self, route: &str) -> Result<T> {
        log::debug!("GET {route}");
        self.read(self.client.get(self.url(route))).await
    }

    async fn post<B: Serialize + Sync, T: DeserializeOwned>(&self, route: &str, body: Option<&B>) -> Result<T> {
        log::debug!("POST {route}");
        let mut request = self.client.post(self.url(route));
        if let Some(body) = body {
            request = request.json(body);
        }
        self.read(request).await
    }

    async fn task_command(&self, task_id: &str, command: &str) -> Result<()> {
        validate_task_id(task_id)?;
        let _: Value = self
            .post::<(), Value>(&format!("/migration/{task_id}/{command}"), None)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl MigrationApi for HttpGateway {
    async fn health(&self) -> Result<HealthStatus> {
        self.get("/health").await
    }

    async fn scan(&self) -> Result<ScanResult> {
        self.get("/scan").await
    }

    async fn discover_devices(&self) -> Result<DeviceList> {
        self.get("/discover").await
    }

    async fn folder_details(&self, path: &str) -> Result<FolderInfo> {
        self.post("/folder/details", Some(&PathRequest { path })).await
    }

    async fn test_connection(&self, credentials: &Credentials) -> Result<ConnectionToken> {
        self.post("/zimaos/test", Some(credentials)).await
    }

    async fn list_storages(&self, credentials: &Credentials) -> Result<StorageList> {
        self.post("/zimaos/storages", Some(credentials)).await
    }

    async fn create_migration(&self, request: &CreateMigrationRequest) -> Result<CreatedTask> {
        self.post("/migration", Some(request)).await
    }

    async fn task_status(&self, task_id: &str) -> Result<TaskStatus> {
        validate_task_id(task_id)?;
        self.get(&format!("/migration/{task_id}")).await
    }

    async fn list_tasks(&self, limit: u32, offset: u32) -> Result<TaskPage> {
        self.get(&format!("/migrations?limit={limit}&offset={offset}"))
            .await
    }

    async fn pause_task(&self, task_id: &str) -> Result<()> {
        self.task_command(task_id, "pause").await
    }

    async fn resume_task(&self, task_id: &str) -> Result<()> {
        self.task_command(task_id, "resume").await
    }

    async fn cancel_task(&self, task_id: &str) -> Result<()> {
        self.task_command(task_id, "cancel").await
    }
}
