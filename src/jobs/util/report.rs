//! Weekly earnings aggregation over finished jobs

use crate::jobs::types::job::{Job, JobStatus};
use crate::jobs::types::report::{AllWorkersWeeklyReport, WeeklyFinancialReport, WorkerWeeklySummary};

use chrono::{Datelike, Duration, NaiveDate};
use std::collections::BTreeMap;

/// Monday and Sunday of the week containing `date`
pub fn week_bounds(date: NaiveDate) -> (NaiveDate, NaiveDate) {
    let monday = date - Duration::days(date.weekday().num_days_from_monday() as i64);
    (monday, monday + Duration::days(6))
}

fn completed_in_week(job: &Job, start: NaiveDate, end: NaiveDate) -> bool {
    match job.completed_at {
        Some(at) => {
            let day = at.date_naive();
            day >= start && day <= end
        },
        None => false
    }
}

#[derive(Default)]
struct Totals {
    earnings: f64,
    collected: f64,
    completed: usize,
    pending: usize,
    travel_only: usize
}

impl Totals {
    fn add(&mut self, job: &Job) {
        match job.status {
            JobStatus::Completed => {
                self.completed += 1;
                if let Some(data) = &job.completion_data {
                    self.earnings += data.worker_commission;
                    self.collected += data.total_amount;
                    if data.travel_fee_only { self.travel_only += 1; }
                }
            },
            // Bank transfers only count as revenue once approved
            JobStatus::PendingApproval => self.pending += 1,
            _ => ()
        }
    }
}

pub fn weekly_financial_report<'a, I>(jobs: I, worker_id: &str, week_date: NaiveDate) -> WeeklyFinancialReport
        where I: IntoIterator<Item = &'a Job> {
    let (week_start, week_end) = week_bounds(week_date);
    let mut totals = Totals::default();
    let mut worker_name = String::new();

    let mut week_jobs: Vec<Job> = jobs.into_iter()
        .filter(|j| j.worker_id == worker_id && j.status.is_finished())
        .filter(|j| completed_in_week(j, week_start, week_end))
        .cloned()
        .collect();
    week_jobs.sort_by(|a, b| b.finished_sort_key().cmp(&a.finished_sort_key()));

    for job in &week_jobs {
        totals.add(job);
        if worker_name.is_empty() { worker_name = job.worker_name.clone(); }
    }

    WeeklyFinancialReport {
        worker_id: worker_id.to_string(),
        worker_name,
        week_start,
        week_end,
        total_earnings: totals.earnings,
        total_collected: totals.collected,
        amount_to_hand_over: totals.collected - totals.earnings,
        completed_jobs: totals.completed,
        pending_approval: totals.pending,
        travel_fee_only_jobs: totals.travel_only,
        jobs: week_jobs
    }
}

pub fn all_workers_weekly_report<'a, I>(jobs: I, week_date: NaiveDate) -> AllWorkersWeeklyReport
        where I: IntoIterator<Item = &'a Job> {
    let (week_start, week_end) = week_bounds(week_date);
    let mut per_worker: BTreeMap<String, (String, Totals)> = BTreeMap::new();

    for job in jobs.into_iter().filter(|j| completed_in_week(j, week_start, week_end)) {
        per_worker.entry(job.worker_id.clone())
            .or_insert_with(|| (job.worker_name.clone(), Totals::default()))
            .1.add(job);
    }

    let mut workers: Vec<WorkerWeeklySummary> = per_worker.into_iter()
        .map(|(worker_id, (worker_name, t))| WorkerWeeklySummary {
            worker_id,
            worker_name,
            total_earnings: t.earnings,
            total_collected: t.collected,
            amount_to_hand_over: (t.collected - t.earnings).max(0.0),
            completed_jobs: t.completed,
            pending_approval: t.pending
        })
        .collect();
    workers.sort_by(|a, b| a.worker_name.cmp(&b.worker_name));

    AllWorkersWeeklyReport {
        week_start,
        week_end,
        total_earnings: workers.iter().map(|w| w.total_earnings).sum(),
        total_collected: workers.iter().map(|w| w.total_collected).sum(),
        amount_to_hand_over: workers.iter().map(|w| w.amount_to_hand_over).sum(),
        workers
    }
}
