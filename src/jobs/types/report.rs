use crate::jobs::types::job::Job;

use chrono::NaiveDate;
use serde::Serialize;

/// Earnings of one worker for one Monday to Sunday week
#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WeeklyFinancialReport {
    pub worker_id: String,
    pub worker_name: String,
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    /// Sum of worker commissions
    pub total_earnings: f64,
    /// Sum of amounts collected from clients
    pub total_collected: f64,
    /// What the worker owes the company. Not clamped, may be negative.
    pub amount_to_hand_over: f64,
    pub completed_jobs: usize,
    pub pending_approval: usize,
    pub travel_fee_only_jobs: usize,
    pub jobs: Vec<Job>
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WorkerWeeklySummary {
    pub worker_id: String,
    pub worker_name: String,
    pub total_earnings: f64,
    pub total_collected: f64,
    /// Clamped to zero
    pub amount_to_hand_over: f64,
    pub completed_jobs: usize,
    pub pending_approval: usize
}

#[derive(Clone, Debug, Serialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AllWorkersWeeklyReport {
    pub week_start: NaiveDate,
    pub week_end: NaiveDate,
    pub workers: Vec<WorkerWeeklySummary>,
    pub total_earnings: f64,
    pub total_collected: f64,
    pub amount_to_hand_over: f64
}
