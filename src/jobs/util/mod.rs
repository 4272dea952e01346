pub mod handler;
pub mod id;
pub mod patch;
pub mod report;
