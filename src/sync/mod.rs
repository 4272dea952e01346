//! Cross-tab and cross-profile job synchronization

pub mod broadcaster;
pub mod error;
pub mod listener;
pub mod message;
pub mod poller;
pub mod profile;
pub mod remote;
pub mod service;
pub mod storage;

use crate::shared::util::config::{RemoteMode, SyncConfig};
use crate::sync::error::{StorageError, SyncError};
use crate::sync::profile::Profile;
use crate::sync::remote::http::HttpRemote;
use crate::sync::remote::retry::RetryPolicy;
use crate::sync::remote::simulated::SimulatedRemote;
use crate::sync::remote::{RemoteStore, SyncClient};
use crate::sync::service::JobService;
use crate::sync::storage::LocalStorage;

use log::info;
use std::sync::Arc;
use std::time::Duration;

/// The profile described by `store_dir`, in memory when it is unset
pub fn open_profile(config: &SyncConfig) -> Result<Profile, StorageError> {
    match &config.store_dir {
        Some(dir) => Ok(Profile::new(LocalStorage::open(dir)?)),
        None => Ok(Profile::in_memory())
    }
}

/// Remote client for the configured mode. Without `simulated_dir` the simulated central
/// database lives in the profile's own store.
pub fn build_remote(config: &SyncConfig, profile: &Profile) -> Result<Option<SyncClient>, SyncError> {
    let remote: Arc<dyn RemoteStore> = match config.remote {
        RemoteMode::None => return Ok(None),
        RemoteMode::Simulated => {
            let shared = match &config.simulated_dir {
                Some(dir) => LocalStorage::open(dir)?,
                None => profile.storage().clone()
            };
            Arc::new(SimulatedRemote::new(shared, Duration::from_millis(config.simulated_latency_ms)))
        },
        RemoteMode::Http => Arc::new(HttpRemote::new(&config.remote_url, Duration::from_millis(config.request_timeout_ms))?)
    };
    let retry = RetryPolicy::exponential(config.retry_attempts, Duration::from_millis(config.retry_base_delay_ms));
    info!("Remote sync mode: {:?}", config.remote);
    Ok(Some(SyncClient::new(remote, config.remote_poll_interval(), retry)))
}

/// Profile + remote + service in one go, for the binaries
pub fn connect(config: SyncConfig) -> Result<JobService, SyncError> {
    let profile = open_profile(&config)?;
    let remote = build_remote(&config, &profile)?;
    Ok(JobService::new(&profile, config, remote))
}
