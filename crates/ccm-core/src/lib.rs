//! ccm Core - Shared types for Claude Code session monitoring
//!
//! This crate holds the pure half of the monitor: domain types, activity
//! classification, process-table parsing and log title extraction. It does
//! no process spawning and has no async runtime.
//!
//! All code follows the panic-free policy: no `.unwrap()`, `.expect()`,
//! `panic!()`, `unreachable!()`, `todo!()`, or direct indexing `[i]`.

pub mod activity;
pub mod process;
pub mod session;
pub mod title;

// Re-exports for convenience
pub use activity::{classify, is_recent, is_runnable, RECENT_LOG_WINDOW, WORKING_CPU_THRESHOLD};
pub use process::{
    parse_detail_line, parse_lsof_cwd, parse_pid_list, parse_start_time, ProcessDetail,
};
pub use session::{sort_sessions, Session, SessionId, SessionSnapshot, SessionStatus};
pub use title::{clean_title, extract_title, file_stem_title, MAX_TITLE_CHARS, TITLE_SCAN_BYTES};
