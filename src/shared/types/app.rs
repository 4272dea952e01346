use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

#[derive(Serialize, Deserialize, Debug)]
pub struct ErrorResponse {
    pub error: String
}

/// Envelope of every job sync API reply: `{success, data, timestamp, version}`.
/// Failed calls carry `error` instead of `data`, and no version when the store could not
/// report one.
#[derive(Serialize, Deserialize, Debug, Clone)]
pub struct ApiResponse<T> {
    pub success: bool,
    #[serde(default = "Option::default", skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<u64>
}

impl<T> ApiResponse<T> {
    pub fn ok(data: T, version: u64) -> ApiResponse<T> {
        ApiResponse { success: true, data: Some(data), error: None, timestamp: Utc::now(), version: Some(version) }
    }

    pub fn failed(error: &str, version: Option<u64>) -> ApiResponse<T> {
        ApiResponse { success: false, data: None, error: Some(error.to_string()), timestamp: Utc::now(), version }
    }
}

macro_rules! job_not_found {
    ($version: expr) => {
        return Ok(HttpResponse::NotFound().json(ApiResponse::<()>::failed("Job ID does not exist", Some($version))))
    }
}

macro_rules! store_failure {
    ($err: expr) => {{
        log::error!("Job store failure: {}", $err);
        return Ok(HttpResponse::InternalServerError().json(ApiResponse::<()>::failed("Job store failure", None)))
    }}
}

pub(crate) use job_not_found;
pub(crate) use store_failure;
