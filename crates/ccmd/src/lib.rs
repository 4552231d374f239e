//! CCM Daemon - Claude Code session monitor
//!
//! This crate provides the monitoring infrastructure behind `ccmd` and `ccm`:
//! - `process` - Process table access behind the `ProcessSource` trait
//! - `locator` - Matches a process to its session log by creation time
//! - `correlator` - Titles sessions and caches the answer per PID
//! - `registry` - Poll actor that publishes `SessionSnapshot`s
//! - `automation` - Focus/open commands for Terminal.app and tmux
//! - `config` - TOML + environment configuration
//! - `daemon` - PID/log files and process control for `ccmd`
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                       ccmd daemon                           │
//! ├─────────────────────────────────────────────────────────────┤
//! │                                                             │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │   Poll Timer    │────▶│     RegistryActor           │   │
//! │  │     (5 s)       │     │  (owns Poller + caches)     │   │
//! │  └─────────────────┘     └──────────────┬──────────────┘   │
//! │                                         │                   │
//! │                          spawn_blocking │ snapshots         │
//! │                                         ▼                   │
//! │  ┌─────────────────┐     ┌─────────────────────────────┐   │
//! │  │ ProcessSource   │◀────│   watch::Sender             │   │
//! │  │ LogLocator      │     │   (latest snapshot only)    │   │
//! │  └─────────────────┘     └─────────────────────────────┘   │
//! │                                                             │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Panic-Free Guarantees
//!
//! All production code in this crate follows the panic-free policy:
//! - No `.unwrap()`, `.expect()`, `panic!()`, `unreachable!()`, `todo!()`
//! - All fallible operations return `Result` or `Option`
//! - Channel operations handle closure gracefully

pub mod automation;
pub mod config;
pub mod correlator;
pub mod daemon;
pub mod locator;
pub mod process;
pub mod registry;
