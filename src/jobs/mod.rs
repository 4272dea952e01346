pub mod app;
pub mod handlers;
pub mod types;
pub mod util;
