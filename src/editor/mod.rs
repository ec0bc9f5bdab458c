//! Editor session management
//!
//! The core of the daemon: one [`EditorSession`] per spawned external
//! editor, a shared [`SessionRegistry`] letting later requests reattach
//! to a live editor by correlation key, and the configuration that
//! drives both.
//!
//! # Architecture
//!
//! - **EditorSession**: temp file + editor process + codec binding,
//!   with the poll loop that detects incremental saves and exit
//! - **SessionRegistry**: mutex-guarded map from temp file path to
//!   live session
//! - **EditorConfig**: configuration with builder pattern and
//!   validation

pub mod config;
pub mod error;
pub mod registry;
pub mod session;

pub use config::{EditorConfig, EditorConfigBuilder};
pub use error::{ConfigError, SessionError};
pub use registry::SessionRegistry;
pub use session::{EditOutcome, EditorSession, SessionOutcome};
