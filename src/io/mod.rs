//! I/O layer - external process lifecycle management
//!
//! Generic process supervision used by the editor session layer. The
//! editor runs on the user's display and terminal, so there is no stdio
//! plumbing here; the interesting output of an editor process is its
//! exit status.

pub mod process;

pub use process::{EditorProcess, ProcessError, ProcessState};
