use crate::jobs::types::job::Job;
use crate::shared::types::app::ApiResponse;
use crate::sync::error::SyncError;
use crate::sync::remote::{RemoteStore, SyncStatus, Versioned};

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::time::Duration;

/// Talks to the job sync HTTP server
pub struct HttpRemote {
    client: Client,
    base_url: String
}

impl HttpRemote {
    pub fn new(base_url: &str, timeout: Duration) -> Result<HttpRemote, SyncError> {
        let client = Client::builder().timeout(timeout).build()?;
        Ok(HttpRemote { client, base_url: base_url.trim_end_matches('/').to_string() })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/v1/{}", self.base_url, path)
    }

    /// Non-2xx replies and `{success: false}` envelopes both become `Rejected`
    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<Versioned<T>, SyncError> {
        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        let envelope: ApiResponse<T> = match serde_json::from_str(&body) {
            Ok(envelope) => envelope,
            Err(_) if !status.is_success() => {
                return Err(SyncError::Rejected { status: status.as_u16(), message: body });
            },
            Err(err) => return Err(err.into())
        };

        if !status.is_success() || !envelope.success {
            return Err(SyncError::Rejected {
                status: status.as_u16(),
                message: envelope.error.unwrap_or_else(|| "Request failed".to_string())
            });
        }
        match (envelope.data, envelope.version) {
            (Some(data), Some(version)) => Ok(Versioned { data, version }),
            _ => Err(SyncError::Decode("Successful reply without data or version".to_string()))
        }
    }
}

#[async_trait]
impl RemoteStore for HttpRemote {
    async fn get_jobs(&self) -> Result<Versioned<Vec<Job>>, SyncError> {
        self.send(self.client.get(self.url("jobs"))).await
    }

    async fn create_job(&self, job: &Job) -> Result<Versioned<Job>, SyncError> {
        self.send(self.client.post(self.url("jobs")).json(job)).await
    }

    async fn update_job(&self, job_id: &str, patch: &Value) -> Result<Versioned<Job>, SyncError> {
        self.send(self.client.put(self.url(&format!("jobs/{job_id}"))).json(patch)).await
    }

    async fn delete_job(&self, job_id: &str) -> Result<Versioned<bool>, SyncError> {
        self.send(self.client.delete(self.url(&format!("jobs/{job_id}")))).await
    }

    async fn sync_status(&self) -> Result<SyncStatus, SyncError> {
        Ok(self.send::<SyncStatus>(self.client.get(self.url("sync/status"))).await?.data)
    }
}
