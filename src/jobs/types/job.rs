//! Job record + related schema shared by the sync layer and the HTTP server

use chrono::{DateTime, Utc};
use serde::{Serialize, Deserialize};

pub type JobId = str;

#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    Assigned,
    Accepted,
    InProgress,
    Completed,
    Cancelled,
    PendingApproval
}

impl JobStatus {
    /// Assigned, accepted or in progress
    pub fn is_active(&self) -> bool {
        matches!(self, JobStatus::Assigned | JobStatus::Accepted | JobStatus::InProgress)
    }

    /// Work is finished, whether or not the payment has been approved yet
    pub fn is_finished(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::PendingApproval)
    }

    /// Transitions the application is known to perform. Nothing enforces this table,
    /// callers may still request any transition.
    pub fn is_known_transition(&self, to: JobStatus) -> bool {
        match (self, to) {
            (JobStatus::Assigned, JobStatus::Accepted) => true,
            (JobStatus::Assigned, JobStatus::Cancelled) => true,
            (JobStatus::Accepted, JobStatus::InProgress) => true,
            (JobStatus::Accepted, JobStatus::Cancelled) => true,
            (JobStatus::InProgress, JobStatus::Completed) => true,
            (JobStatus::InProgress, JobStatus::Cancelled) => true,
            (JobStatus::InProgress, JobStatus::PendingApproval) => true,
            // Admin approval of a bank transfer
            (JobStatus::PendingApproval, JobStatus::Completed) => true,
            _ => false
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            JobStatus::Assigned => write!(f, "assigned"),
            JobStatus::Accepted => write!(f, "accepted"),
            JobStatus::InProgress => write!(f, "in_progress"),
            JobStatus::Completed => write!(f, "completed"),
            JobStatus::Cancelled => write!(f, "cancelled"),
            JobStatus::PendingApproval => write!(f, "pending_approval"),
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "assigned" => Ok(JobStatus::Assigned),
            "accepted" => Ok(JobStatus::Accepted),
            "in_progress" => Ok(JobStatus::InProgress),
            "completed" => Ok(JobStatus::Completed),
            "cancelled" => Ok(JobStatus::Cancelled),
            "pending_approval" => Ok(JobStatus::PendingApproval),
            other => Err(format!("Unknown job status `{other}`"))
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Priority {
    #[default]
    Normal,
    High,
    Urgent
}

impl std::str::FromStr for Priority {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "normal" => Ok(Priority::Normal),
            "high" => Ok(Priority::High),
            "urgent" => Ok(Priority::Urgent),
            other => Err(format!("Unknown priority `{other}`"))
        }
    }
}

#[derive(Clone, Copy, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    #[default]
    Cash,
    Card,
    Check,
    BankTransfer
}

impl std::str::FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cash" => Ok(PaymentMethod::Cash),
            "card" => Ok(PaymentMethod::Card),
            "check" => Ok(PaymentMethod::Check),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            other => Err(format!("Unknown payment method `{other}`"))
        }
    }
}

/// Financial + descriptive record attached once the work (or a travel-only visit) is done
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletionData {
    pub payment_method: PaymentMethod,
    pub total_amount: f64,
    pub worker_commission: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bank_account: Option<String>,
    #[serde(default)]
    pub travel_fee_only: bool,
    #[serde(default)]
    pub work_description: String,
    #[serde(default)]
    pub photos: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub notes: Option<String>
}

/// Partial completion data, only the set fields are written
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CompletionPatch {
    pub payment_method: Option<PaymentMethod>,
    pub total_amount: Option<f64>,
    pub worker_commission: Option<f64>,
    pub bank_account: Option<String>,
    pub travel_fee_only: Option<bool>,
    pub work_description: Option<String>,
    pub photos: Option<Vec<String>>,
    pub notes: Option<String>
}

macro_rules! update_if_not_none {
    ($base: ident, $patch: ident, $property: ident) => {
        if let Some(value) = $patch.$property {
            $base.$property = value;
        }
    };
}

impl CompletionData {
    pub fn apply(&mut self, patch: CompletionPatch) {
        update_if_not_none!(self, patch, payment_method);
        update_if_not_none!(self, patch, total_amount);
        update_if_not_none!(self, patch, worker_commission);
        update_if_not_none!(self, patch, travel_fee_only);
        update_if_not_none!(self, patch, work_description);
        update_if_not_none!(self, patch, photos);
        if patch.bank_account.is_some() { self.bank_account = patch.bank_account; }
        if patch.notes.is_some() { self.notes = patch.notes; }
    }
}

impl From<CompletionData> for CompletionPatch {
    fn from(data: CompletionData) -> Self {
        CompletionPatch {
            payment_method: Some(data.payment_method),
            total_amount: Some(data.total_amount),
            worker_commission: Some(data.worker_commission),
            bank_account: data.bank_account,
            travel_fee_only: Some(data.travel_fee_only),
            work_description: Some(data.work_description),
            photos: Some(data.photos),
            notes: data.notes
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    pub id: String,
    pub client_name: String,
    pub client_phone: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_email: Option<String>,
    pub address: String,
    pub service_type: String,
    #[serde(default)]
    pub description: String,
    pub worker_id: String,
    pub worker_name: String,
    pub status: JobStatus,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scheduled_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub accepted_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub approved_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completion_data: Option<CompletionData>
}

/// Everything the creator of a job supplies. Id and creation time are assigned by the store.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct JobFields {
    pub client_name: String,
    pub client_phone: String,
    #[serde(default)]
    pub client_email: Option<String>,
    pub address: String,
    pub service_type: String,
    #[serde(default)]
    pub description: String,
    pub worker_id: String,
    pub worker_name: String,
    #[serde(default)]
    pub priority: Priority,
    #[serde(default)]
    pub scheduled_date: Option<DateTime<Utc>>,
    /// Defaults to assigned
    #[serde(default)]
    pub status: Option<JobStatus>
}

impl Job {
    pub fn from_fields(id: String, created_at: DateTime<Utc>, fields: JobFields) -> Job {
        Job {
            id,
            client_name: fields.client_name,
            client_phone: fields.client_phone,
            client_email: fields.client_email,
            address: fields.address,
            service_type: fields.service_type,
            description: fields.description,
            worker_id: fields.worker_id,
            worker_name: fields.worker_name,
            status: fields.status.unwrap_or(JobStatus::Assigned),
            priority: fields.priority,
            scheduled_date: fields.scheduled_date,
            created_at,
            accepted_at: None,
            started_at: None,
            completed_at: None,
            approved_at: None,
            completion_data: None
        }
    }

    /// Completion time, falling back to creation time. Used for ordering finished jobs.
    pub fn finished_sort_key(&self) -> DateTime<Utc> {
        self.completed_at.unwrap_or(self.created_at)
    }

    /// `completion_data` is kept iff the job is completed or pending approval
    pub fn normalize_completion(&mut self) {
        if self.status.is_finished() {
            if self.completion_data.is_none() {
                self.completion_data = Some(CompletionData::default());
            }
        } else {
            self.completion_data = None;
        }
    }
}
