//! Controllable concurrent HTTP load generator.
//!
//! The [`engine`] module holds the load-generation core: a [`RunController`]
//! owning the run lifecycle, the ramp-up scheduler, per-user request loops and
//! the shared statistics aggregator. The remaining modules are the command-line
//! host built around it.
//!
//! [`RunController`]: engine::RunController

pub mod commands;
pub mod config;
pub mod engine;
pub mod http;
pub mod report;
pub mod ui;
pub mod utils;
