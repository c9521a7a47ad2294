#![deny(unsafe_code)]

//! Process and session lifecycle controller.
//!
//! Arbitrates the local service port, coordinates deferred restarts of
//! background processes through a durable store, keeps a registry of those
//! processes and runs the startup and termination sequences.

pub mod api;
pub mod audit;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod errors;
pub mod intent;
pub mod ipc;
pub mod orchestrator;
pub mod persistence;
pub mod phrase;
pub mod speech;
pub mod supervisor;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
