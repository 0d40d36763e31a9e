//! # Host Bridge Traits
//!
//! Capability traits the library core depends on but does not implement.
//!
//! ## Overview
//!
//! The core never talks to a concrete database driver, HTTP stack, or wall
//! clock directly. Each of those concerns sits behind a trait in this crate so
//! that hosts (desktop app, CLI, test harness) can inject their own adapter.
//!
//! ## Traits
//!
//! ### Storage
//! - [`KeyValueStore`](storage::KeyValueStore) - Transactional table-per-kind key/value engine
//!
//! ### Remote catalog
//! - [`RemoteClient`](remote::RemoteClient) - Replays collection edits against the remote service
//! - [`ProgressSink`](remote::ProgressSink) - Receives progress for long-running remote calls
//!
//! ### Utilities
//! - [`Clock`](time::Clock) - Time source for deterministic testing
//! - [`LoggerSink`](logging::LoggerSink) - Forward structured logs to host logging
//!
//! ## Error Handling
//!
//! Storage and logging bridges report [`BridgeError`](error::BridgeError).
//! The remote client reports [`ClientError`](remote::ClientError), which keeps
//! communication failures distinguishable from local I/O failures.
//!
//! ## Thread Safety
//!
//! All bridge traits require `Send + Sync` so implementations can be shared
//! across async tasks behind an `Arc`.

pub mod error;
pub mod logging;
pub mod remote;
pub mod storage;
pub mod time;

pub use error::BridgeError;

// Re-export commonly used types
pub use logging::{LogEntry, LogLevel, LoggerSink};
pub use remote::{
    ClientError, ClientResult, NoProgress, ProgressSink, PushReceipt, RemoteClient, RemoteCollection,
};
pub use storage::{KeyValueStore, MapStats};
pub use time::{Clock, SystemClock};
