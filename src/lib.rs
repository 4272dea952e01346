pub mod app;
pub mod jobs;
pub mod shared;
pub mod sync;
