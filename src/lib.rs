#![allow(clippy::uninlined_format_args)]

pub mod api;
pub mod app;
pub mod community;
pub mod config;
pub mod data;
pub mod error;
pub mod forms;
pub mod loader;
pub mod logging;
pub mod markdown;
pub mod router;
pub mod session;
pub mod storage;
pub mod ui;
pub mod views;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::run;
