//! Lifecycle orchestration modules.
//!
//! Covers port arbitration, restart coordination and supervision, the
//! process registry, background process spawning and monitoring, power
//! control, and the startup and termination sequences.

pub mod child_monitor;
pub mod port_arbiter;
pub mod power;
pub mod registry;
pub mod restart;
pub mod spawner;
pub mod startup;
pub mod termination;
pub mod watcher;
