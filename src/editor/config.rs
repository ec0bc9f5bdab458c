//! Configuration for editor sessions
//!
//! Provides EditorConfig with builder pattern and validation. The
//! values originate from CLI flags and environment variables; the
//! session layer only ever sees the validated struct.

use std::path::PathBuf;
use std::time::Duration;

use crate::editor::error::ConfigError;

// ============================================================================
// Configuration Constants
// ============================================================================

/// Poll granularity for increment/exit detection (1 second)
///
/// Edit cadence is human-scale, so a 1-second poll is imperceptible
/// overhead and avoids platform-specific file-watch APIs.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(1);

/// Grace delay before deleting a finished session's temp file (5 minutes)
///
/// Tolerates clients that are slow to read the final response or want
/// to inspect the file out-of-band.
pub const DEFAULT_DELETE_DELAY: Duration = Duration::from_secs(5 * 60);

/// Prefix for temp file names, purely for operator legibility
pub const TEMP_FILE_PREFIX: &str = "chrome_";

/// Suffix for temp file names
pub const TEMP_FILE_SUFFIX: &str = ".txt";

// ============================================================================
// Core Configuration Type
// ============================================================================

/// Complete editor session configuration
#[derive(Debug, Clone)]
pub struct EditorConfig {
    /// Editor launch command as an argument vector; the temp file path
    /// is appended as the final argument
    pub editor_command: Vec<String>,

    /// Directory for temp files (None = system temp dir)
    pub temp_dir: Option<PathBuf>,

    /// Return incremental saves instead of blocking until editor exit
    pub incremental: bool,

    /// Verify codec losslessness at spawn time
    pub careful_filtering: bool,

    /// Poll granularity for increment/exit detection
    pub poll_interval: Duration,

    /// Grace delay before deleting a finished session's temp file
    pub delete_delay: Duration,
}

// ============================================================================
// Configuration Builder
// ============================================================================

/// Builder for EditorConfig with validation and defaults
#[derive(Debug, Default)]
pub struct EditorConfigBuilder {
    editor_command: Option<Vec<String>>,
    temp_dir: Option<PathBuf>,
    incremental: Option<bool>,
    careful_filtering: Option<bool>,
    poll_interval: Option<Duration>,
    delete_delay: Option<Duration>,
}

impl EditorConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the editor launch command (argument vector)
    pub fn editor_command(mut self, argv: Vec<String>) -> Self {
        self.editor_command = Some(argv);
        self
    }

    /// Set the temp file directory
    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.temp_dir = Some(dir.into());
        self
    }

    /// Enable or disable incremental edits
    pub fn incremental(mut self, incremental: bool) -> Self {
        self.incremental = Some(incremental);
        self
    }

    /// Enable or disable codec round-trip verification
    pub fn careful_filtering(mut self, careful: bool) -> Self {
        self.careful_filtering = Some(careful);
        self
    }

    /// Set the poll granularity (tests shrink this)
    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    /// Set the temp file deletion grace delay
    pub fn delete_delay(mut self, delay: Duration) -> Self {
        self.delete_delay = Some(delay);
        self
    }

    /// Build and validate the configuration
    pub fn build(self) -> Result<EditorConfig, ConfigError> {
        let editor_command = self
            .editor_command
            .ok_or_else(|| ConfigError::missing_field("editor_command"))?;
        if editor_command.is_empty() || editor_command[0].is_empty() {
            return Err(ConfigError::EmptyEditorCommand);
        }

        let poll_interval = self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL);
        if poll_interval.is_zero() {
            return Err(ConfigError::invalid_interval(
                poll_interval,
                "poll interval must be positive",
            ));
        }

        if let Some(dir) = &self.temp_dir {
            if !dir.is_dir() {
                return Err(ConfigError::InvalidTempDir { path: dir.clone() });
            }
        }

        Ok(EditorConfig {
            editor_command,
            temp_dir: self.temp_dir,
            incremental: self.incremental.unwrap_or(true),
            careful_filtering: self.careful_filtering.unwrap_or(true),
            poll_interval,
            delete_delay: self.delete_delay.unwrap_or(DEFAULT_DELETE_DELAY),
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_builder_defaults() {
        let config = EditorConfigBuilder::new()
            .editor_command(vec!["gvim".to_string(), "-f".to_string()])
            .build()
            .unwrap();

        assert!(config.incremental);
        assert!(config.careful_filtering);
        assert_eq!(config.poll_interval, DEFAULT_POLL_INTERVAL);
        assert_eq!(config.delete_delay, DEFAULT_DELETE_DELAY);
        assert!(config.temp_dir.is_none());
    }

    #[test]
    fn test_missing_editor_command() {
        let result = EditorConfigBuilder::new().build();
        assert!(matches!(result, Err(ConfigError::MissingField { .. })));
    }

    #[test]
    fn test_empty_editor_command() {
        let result = EditorConfigBuilder::new()
            .editor_command(Vec::new())
            .build();
        assert!(matches!(result, Err(ConfigError::EmptyEditorCommand)));
    }

    #[test]
    fn test_zero_poll_interval_rejected() {
        let result = EditorConfigBuilder::new()
            .editor_command(vec!["vi".to_string()])
            .poll_interval(Duration::ZERO)
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidInterval { .. })));
    }

    #[test]
    fn test_nonexistent_temp_dir_rejected() {
        let result = EditorConfigBuilder::new()
            .editor_command(vec!["vi".to_string()])
            .temp_dir("/no/such/directory/for/edit/server")
            .build();
        assert!(matches!(result, Err(ConfigError::InvalidTempDir { .. })));
    }

    #[test]
    fn test_valid_temp_dir_accepted() {
        let temp = tempfile::tempdir().unwrap();
        let config = EditorConfigBuilder::new()
            .editor_command(vec!["vi".to_string()])
            .temp_dir(temp.path())
            .incremental(false)
            .careful_filtering(false)
            .build()
            .unwrap();

        assert_eq!(config.temp_dir.as_deref(), Some(temp.path()));
        assert!(!config.incremental);
        assert!(!config.careful_filtering);
    }
}
