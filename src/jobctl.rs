use chrono::{NaiveDate, Utc};
use clap::{arg, Parser, Subcommand};
use locksmith_job_sync::jobs::types::job::{CompletionPatch, Job, JobFields, JobStatus, PaymentMethod, Priority};
use locksmith_job_sync::jobs::types::notification::Notification;
use locksmith_job_sync::jobs::types::update::{Actor, JobUpdate};
use locksmith_job_sync::shared::util::config;
use locksmith_job_sync::sync::listener::JobListener;
use locksmith_job_sync::sync::service::JobService;
use std::sync::Arc;
use std::time::Duration;

#[derive(Parser)]
struct Cli {
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List jobs, optionally only one worker's
    List {
        #[arg(long)]
        worker: Option<String>,
    },
    /// Create a job
    Add {
        client_name: String,
        client_phone: String,
        address: String,
        service_type: String,
        worker_id: String,
        worker_name: String,
        #[arg(long, default_value = "normal")]
        priority: Priority,
        #[arg(long, default_value = "")]
        description: String,
    },
    /// Move a job to another status
    Status {
        id: String,
        status: JobStatus,
        #[arg(long, default_value = "admin")]
        actor: String,
        #[arg(long)]
        payment: Option<PaymentMethod>,
        #[arg(long)]
        total: Option<f64>,
        #[arg(long)]
        commission: Option<f64>,
    },
    /// Approve a bank transfer
    Approve { id: String },
    /// Delete a job
    Delete { id: String },
    /// Weekly financial report, for one worker or everyone
    Report {
        #[arg(long)]
        worker: Option<String>,
        #[arg(long, value_parser = parse_date)]
        week: Option<NaiveDate>,
    },
    /// Notifications of a user
    Notifications { user: String },
    /// Pull from the remote now
    Sync,
    /// Print every change until interrupted
    Watch,
}

fn parse_date(date: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(date, "%Y-%m-%d").map_err(|e| format!("Expected YYYY-MM-DD: {e}"))
}

fn print_job(job: &Job) {
    println!("{}  {:<16} {:<20} {:<12} {}", job.id, job.status, job.client_name, job.worker_name, job.address);
}

struct Printer;

impl JobListener for Printer {
    fn on_job_update(&self, job: &Job, update: &JobUpdate) {
        println!("[{}] job {} by {}: {:?}", update.timestamp.format("%H:%M:%S"), job.id, update.actor.name, update.change);
    }

    fn on_notification(&self, notification: &Notification) {
        println!("[notification -> {}] {}: {}", notification.recipient_id, notification.title, notification.message);
    }

    fn on_jobs_reloaded(&self) {
        println!("[reloaded]");
    }
}

// Gives fire and forget pushes a chance to land before the process exits
async fn settle(service: &JobService) {
    if !service.wait_for_pushes(Duration::from_secs(15)).await {
        println!("Warning: remote push still pending, the change is only saved locally");
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let config = config::get_config();
    config.server.init_logging();
    let service = match locksmith_job_sync::sync::connect(config.sync) {
        Ok(service) => service,
        Err(err) => {
            eprintln!("Error: {err}");
            std::process::exit(1);
        }
    };
    if let Err(err) = service.sync_now().await {
        println!("Warning: remote unavailable ({err}), using local data");
    }

    match cli.command {
        Commands::List { worker } => {
            let jobs = match worker {
                Some(worker) => service.get_jobs_for_worker(&worker),
                None => service.get_all_jobs()
            };
            jobs.iter().for_each(print_job);
        },
        Commands::Add { client_name, client_phone, address, service_type, worker_id, worker_name, priority, description } => {
            let job = service.add_job(JobFields {
                client_name,
                client_phone,
                address,
                service_type,
                description,
                worker_id,
                worker_name,
                priority,
                ..Default::default()
            });
            println!("Successfully created job {}", job.id);
            settle(&service).await;
        },
        Commands::Status { id, status, actor, payment, total, commission } => {
            let data = (payment.is_some() || total.is_some() || commission.is_some()).then(|| CompletionPatch {
                payment_method: payment,
                total_amount: total,
                worker_commission: commission,
                ..Default::default()
            });
            match service.update_job_status(&id, status, &Actor::new(&actor, &actor), data) {
                Some(job) => println!("Job {} is now {}", job.id, job.status),
                None => println!("Error: job `{id}` does not exist")
            }
            settle(&service).await;
        },
        Commands::Approve { id } => match service.approve_pending_job(&id, &Actor::admin()) {
            Some(job) => {
                println!("Approved job {}", job.id);
                settle(&service).await;
            },
            None => println!("Error: job `{id}` is not awaiting approval")
        },
        Commands::Delete { id } => {
            if service.delete_job(&id) {
                println!("Successfully deleted job");
                settle(&service).await;
            } else {
                println!("Error: job `{id}` does not exist");
            }
        },
        Commands::Report { worker, week } => {
            let week = week.unwrap_or_else(|| Utc::now().date_naive());
            let output = match worker {
                Some(worker) => serde_json::to_string_pretty(&service.get_weekly_financial_report(&worker, week)),
                None => serde_json::to_string_pretty(&service.get_all_workers_weekly_report(week))
            };
            match output {
                Ok(output) => println!("{output}"),
                Err(err) => eprintln!("Error: {err}")
            }
        },
        Commands::Notifications { user } => {
            println!("{} unread", service.get_unread_notification_count(&user));
            for n in service.get_notifications_for_user(&user) {
                println!("{} {} {}: {}", if n.read { " " } else { "*" }, n.timestamp.format("%d/%m %H:%M"), n.title, n.message);
            }
        },
        Commands::Sync => match service.sync_now().await {
            Ok(true) => println!("Pulled remote changes"),
            Ok(false) => println!("Already up to date"),
            Err(err) => println!("Error: {err}")
        },
        Commands::Watch => {
            service.add_listener("jobctl", Arc::new(Printer));
            service.start();
            println!("Watching tab {}, ctrl-c to stop", service.tab_id());
            if let Err(err) = tokio::signal::ctrl_c().await {
                eprintln!("Error: {err}");
            }
            service.destroy();
        }
    }
}
