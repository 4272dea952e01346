pub mod job;
pub mod notification;
pub mod report;
pub mod update;
