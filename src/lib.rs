pub mod analytics;
pub mod args;
pub mod config;
pub mod data;
pub mod error;
pub mod logging;
pub mod preprocessing;
pub mod session;
pub mod util;
