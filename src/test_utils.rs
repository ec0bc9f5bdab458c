//! Test utilities and global setup
//!
//! Shared mock-editor helpers and centralized test logging
//! configuration.

use std::path::Path;
use std::time::Duration;

use crate::editor::config::{EditorConfig, EditorConfigBuilder};
use crate::editor::session::{EditOutcome, EditorSession};

/// Editor config whose "editor" is a shell script
///
/// The script receives the temp file path as `$1`. The poll interval
/// is shrunk so tests spend milliseconds, not seconds, in the wait
/// loop.
pub fn script_editor_config(temp_dir: &Path, script: &str) -> EditorConfig {
    EditorConfigBuilder::new()
        .editor_command(vec![
            "sh".to_string(),
            "-c".to_string(),
            script.to_string(),
            "editor".to_string(),
        ])
        .temp_dir(temp_dir)
        .poll_interval(Duration::from_millis(100))
        .build()
        .expect("test editor config must be valid")
}

/// Drive a session's wait loop until the editor exits, swallowing any
/// increments along the way
pub async fn wait_until_exit(session: &EditorSession) {
    loop {
        match session.wait_for_increment().await.expect("wait failed") {
            EditOutcome::Exited => return,
            EditOutcome::IncrementReady => continue,
        }
    }
}

/// Test logging utilities
#[cfg(feature = "test-logging")]
pub mod logging {
    use std::sync::Once;
    use tracing_subscriber::{EnvFilter, fmt};

    static INIT: Once = Once::new();

    /// Initialize test logging globally - safe to call multiple times
    ///
    /// Respects RUST_LOG with sensible defaults and uses the test
    /// writer so logs do not interfere with test output.
    pub fn init() {
        INIT.call_once(|| {
            let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                // Default filter: debug for our crate, info for noisy dependencies
                EnvFilter::new("debug,tokio=info,hyper=info,tower=info")
            });

            fmt()
                .with_env_filter(env_filter)
                .with_test_writer()
                .with_target(true)
                .with_thread_ids(true)
                .try_init()
                .ok();
        });
    }
}
