//! Meridian accrual node.
//!
//! Service wiring for the accrual subsystem: configuration, SQLite-backed
//! collaborator adapters, the administrative HTTP surface, and the
//! background schedulers for the daily and monthly batches.

pub mod adapters;
pub mod config;
pub mod scheduler;
pub mod server;

pub use adapters::{SqliteDirectory, SqliteGraph, TracingNotifier};
pub use config::{CliArgs, ServiceConfig};
pub use server::AppState;
