//! Editor session lifecycle
//!
//! An [`EditorSession`] owns one spawned external editor process and
//! its backing temp file. The session is created in response to a
//! request, lives in the registry while the editor runs, and is torn
//! down when the process exits. The poll loop in
//! [`EditorSession::wait_for_increment`] is the only blocking
//! operation a request task performs.

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::ExitStatus;
use std::sync::{Arc, Mutex};
use std::time::SystemTime;
use tracing::{debug, error, info};

use crate::editor::config::{EditorConfig, TEMP_FILE_PREFIX, TEMP_FILE_SUFFIX};
use crate::editor::error::SessionError;
use crate::filters::ContentCodec;
use crate::io::EditorProcess;

// ============================================================================
// Session Outcomes
// ============================================================================

/// Result of one wait on a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditOutcome {
    /// The temp file was saved while the editor is still running
    IncrementReady,
    /// The editor process terminated; the session is finished
    Exited,
}

/// Success/failure classification of a session
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// Still running, or exited with code 0
    Success,
    /// Nonzero exit or signal death, with a human-readable reason
    Failure { reason: String },
}

// ============================================================================
// Editor Session
// ============================================================================

/// One running (or finished) external editor instance
///
/// The temp file path doubles as the registry correlation key. The
/// process handle is exclusively owned by this session; no two
/// sessions ever share a temp file.
pub struct EditorSession {
    /// Backing temp file, also the correlation key
    temp_path: PathBuf,

    /// Codec chosen at spawn (None if no filter matched or decode failed)
    codec: Option<Arc<dyn ContentCodec>>,

    /// The spawned editor process
    process: EditorProcess,

    /// Last observed temp file modification time
    last_mtime: Mutex<SystemTime>,

    /// Whether saves are reported before exit
    incremental: bool,

    /// Poll granularity
    poll_interval: std::time::Duration,
}

impl EditorSession {
    /// Spawn a new editor session for the given content
    ///
    /// Decodes through the codec (falling back to raw content when the
    /// decode fails), writes the temp file, launches the editor with
    /// the file path appended as its final argument, and returns
    /// without waiting for it. Must be called inside a tokio runtime.
    pub fn spawn(
        contents: &str,
        codec: Option<Arc<dyn ContentCodec>>,
        url_hint: Option<&str>,
        config: &EditorConfig,
    ) -> Result<Self, SessionError> {
        info!(
            "Editor using filter: {}",
            if codec.is_some() { "yes" } else { "no" }
        );

        let (text, codec) = match codec {
            Some(codec) => match codec.decode(contents) {
                Ok(decoded) => {
                    if config.careful_filtering {
                        verify_round_trip(codec.as_ref(), &decoded)?;
                    }
                    (decoded, Some(codec))
                }
                Err(e) => {
                    // Show the content undecoded rather than failing the request
                    error!("Failed to decode contents, disabling filter: {}", e);
                    (contents.to_string(), None)
                }
            },
            None => (contents.to_string(), None),
        };

        let temp_path = write_temp_file(&text, url_hint, config)?;
        let last_mtime = std::fs::metadata(&temp_path)?.modified()?;

        let mut argv = config.editor_command.clone();
        argv.push(temp_path.to_string_lossy().into_owned());
        let mut process = EditorProcess::new(argv)?;
        process.start()?;

        Ok(Self {
            temp_path,
            codec,
            process,
            last_mtime: Mutex::new(last_mtime),
            incremental: config.incremental,
            poll_interval: config.poll_interval,
        })
    }

    /// Correlation key clients echo to reattach to this session
    pub fn key(&self) -> String {
        self.temp_path.to_string_lossy().into_owned()
    }

    /// Path of the backing temp file
    pub fn temp_path(&self) -> &Path {
        &self.temp_path
    }

    /// Whether the editor process is still running
    pub fn still_open(&self) -> bool {
        self.exit_status().is_none()
    }

    fn exit_status(&self) -> Option<ExitStatus> {
        self.process.exit_status()
    }

    /// Block until the next saved increment or editor exit
    ///
    /// Polls at the configured granularity: each tick first checks
    /// process exit, then (in incremental mode) compares the temp file
    /// mtime against the last observed value. Bounded only by the
    /// human editing session.
    pub async fn wait_for_increment(&self) -> Result<EditOutcome, SessionError> {
        loop {
            tokio::time::sleep(self.poll_interval).await;

            if self.exit_status().is_some() {
                return Ok(EditOutcome::Exited);
            }

            if !self.incremental {
                continue;
            }

            let mtime = tokio::fs::metadata(&self.temp_path).await?.modified()?;
            let changed = {
                // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
                let mut last = self.last_mtime.lock().unwrap();
                if mtime != *last {
                    info!("new mod time: {:?}, last: {:?}", mtime, *last);
                    *last = mtime;
                    true
                } else {
                    false
                }
            };
            if changed {
                return Ok(EditOutcome::IncrementReady);
            }
        }
    }

    /// Read the temp file's current text, re-encoded through the codec
    ///
    /// Encode failures are logged and the raw text returned; a codec
    /// bug on read-back must not throw the edit away.
    pub async fn current_contents(&self) -> Result<String, SessionError> {
        let raw = tokio::fs::read_to_string(&self.temp_path).await?;
        match &self.codec {
            Some(codec) => match codec.encode(&raw) {
                Ok(encoded) => Ok(encoded),
                Err(e) => {
                    error!("Failed to encode contents, returning raw text: {}", e);
                    Ok(raw)
                }
            },
            None => Ok(raw),
        }
    }

    /// Classify the session's outcome for the client
    pub fn classify_outcome(&self) -> SessionOutcome {
        match self.exit_status() {
            None => SessionOutcome::Success,
            Some(status) if status.success() => SessionOutcome::Success,
            Some(status) => SessionOutcome::Failure {
                reason: failure_reason(status),
            },
        }
    }
}

impl std::fmt::Debug for EditorSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorSession")
            .field("temp_path", &self.temp_path)
            .field("codec", &self.codec.as_ref().map(|_| "ContentCodec"))
            .field("process", &self.process)
            .finish()
    }
}

/// Drop fallback - sessions normally outlive their editor process, so
/// a still-running process here means the session was dropped on an
/// error path before reaching the registry.
impl Drop for EditorSession {
    fn drop(&mut self) {
        if self.process.is_running() {
            debug!(
                "EditorSession dropped with live editor, killing: {}",
                self.temp_path.display()
            );
            self.process.kill_sync();
        }
    }
}

// ============================================================================
// Spawn Helpers
// ============================================================================

/// Assert that decode(encode(decoded)) reproduces the decoded text
///
/// Catches lossy codecs at the earliest possible point; a mismatch is
/// a hard failure for this spawn, not silent corruption later.
fn verify_round_trip(codec: &dyn ContentCodec, decoded: &str) -> Result<(), SessionError> {
    let derived = codec.encode(decoded)?;
    let redecoded = codec.decode(&derived)?;
    if redecoded != decoded {
        return Err(SessionError::LossyCodec {
            decoded: decoded.to_string(),
            redecoded,
        });
    }
    Ok(())
}

/// Write content to a freshly created, persisted temp file
///
/// The name embeds the fixed prefix and, when present, the
/// percent-encoded source URL, purely so an operator can recognize the
/// file in an editor window list.
fn write_temp_file(
    text: &str,
    url_hint: Option<&str>,
    config: &EditorConfig,
) -> Result<PathBuf, SessionError> {
    let mut prefix = String::from(TEMP_FILE_PREFIX);
    if let Some(url) = url_hint {
        prefix.push_str("%%");
        prefix.push_str(&quote_plus(url));
        prefix.push_str("%%");
    }

    let mut builder = tempfile::Builder::new();
    builder.prefix(&prefix).suffix(TEMP_FILE_SUFFIX);
    let mut file = match &config.temp_dir {
        Some(dir) => builder.tempfile_in(dir)?,
        None => builder.tempfile()?,
    };

    file.write_all(text.as_bytes())?;
    let (_file, path) = file.keep().map_err(|e| SessionError::Io(e.error))?;
    debug!("Wrote {} bytes to {}", text.len(), path.display());
    Ok(path)
}

/// Characters kept verbatim by [`quote_plus`]
const QUOTE_SET: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'_')
    .remove(b'.')
    .remove(b'-')
    .remove(b'~')
    .remove(b' ');

/// Form-style percent encoding: spaces become '+'
fn quote_plus(input: &str) -> String {
    utf8_percent_encode(input, QUOTE_SET)
        .to_string()
        .replace(' ', "+")
}

/// Human-readable failure reason for a non-success exit status
fn failure_reason(status: ExitStatus) -> String {
    if let Some(code) = status.code() {
        return format!("text editor returned {}", code);
    }

    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return format!("text editor died on signal {}", signal);
        }
    }

    "text editor terminated abnormally".to_string()
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::filters::CodecError;
    use crate::test_utils::{script_editor_config, wait_until_exit};
    use std::time::Duration;
    use tempfile::tempdir;

    // Auto-initialize logging for all tests in this module
    #[cfg(feature = "test-logging")]
    #[ctor::ctor]
    fn init_test_logging() {
        crate::test_utils::logging::init();
    }

    struct ReversibleCodec;

    impl ContentCodec for ReversibleCodec {
        fn decode(&self, contents: &str) -> Result<String, CodecError> {
            Ok(contents.replace("<br>", "\n"))
        }

        fn encode(&self, contents: &str) -> Result<String, CodecError> {
            Ok(contents.replace('\n', "<br>"))
        }
    }

    struct LossyCodec;

    impl ContentCodec for LossyCodec {
        fn decode(&self, contents: &str) -> Result<String, CodecError> {
            Ok(format!("{contents}!"))
        }

        fn encode(&self, contents: &str) -> Result<String, CodecError> {
            Ok(contents.to_string())
        }
    }

    struct FailingDecode;

    impl ContentCodec for FailingDecode {
        fn decode(&self, _contents: &str) -> Result<String, CodecError> {
            Err(CodecError::transform("decode always fails"))
        }

        fn encode(&self, contents: &str) -> Result<String, CodecError> {
            Ok(contents.to_string())
        }
    }

    struct FailingEncode;

    impl ContentCodec for FailingEncode {
        fn decode(&self, contents: &str) -> Result<String, CodecError> {
            Ok(contents.to_string())
        }

        fn encode(&self, _contents: &str) -> Result<String, CodecError> {
            Err(CodecError::transform("encode always fails"))
        }
    }

    #[tokio::test]
    async fn test_editor_replaces_contents_and_exits() {
        let dir = tempdir().unwrap();
        let config = script_editor_config(dir.path(), r#"printf 'Replaced text\n' > "$1""#);

        let session = EditorSession::spawn("Original text\n", None, None, &config).unwrap();
        wait_until_exit(&session).await;

        assert_eq!(session.classify_outcome(), SessionOutcome::Success);
        assert!(!session.still_open());
        assert_eq!(session.current_contents().await.unwrap(), "Replaced text\n");
    }

    #[tokio::test]
    async fn test_nonzero_exit_classified_as_failure() {
        let dir = tempdir().unwrap();
        let config = script_editor_config(dir.path(), "exit 2");

        let session = EditorSession::spawn("text", None, None, &config).unwrap();
        wait_until_exit(&session).await;

        match session.classify_outcome() {
            SessionOutcome::Failure { reason } => {
                assert!(reason.contains("returned 2"), "reason: {reason}")
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_signal_death_classified_as_failure() {
        let dir = tempdir().unwrap();
        let config = script_editor_config(dir.path(), "kill -9 $$");

        let session = EditorSession::spawn("text", None, None, &config).unwrap();
        wait_until_exit(&session).await;

        match session.classify_outcome() {
            SessionOutcome::Failure { reason } => {
                assert!(reason.contains("signal 9"), "reason: {reason}")
            }
            other => panic!("expected failure, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_incremental_save_detected_before_exit() {
        let dir = tempdir().unwrap();
        let config = script_editor_config(
            dir.path(),
            r#"sleep 0.2; printf 'saved once\n' > "$1"; sleep 5"#,
        );

        let session = EditorSession::spawn("draft", None, None, &config).unwrap();

        let outcome = session.wait_for_increment().await.unwrap();
        assert_eq!(outcome, EditOutcome::IncrementReady);
        assert!(session.still_open());
        assert_eq!(session.classify_outcome(), SessionOutcome::Success);
        assert_eq!(session.current_contents().await.unwrap(), "saved once\n");
        // Drop kills the still-sleeping mock editor
    }

    #[tokio::test]
    async fn test_non_incremental_waits_for_exit() {
        let dir = tempdir().unwrap();
        let mut config = script_editor_config(
            dir.path(),
            r#"printf 'touched\n' > "$1"; sleep 0.3; exit 0"#,
        );
        config.incremental = false;

        let session = EditorSession::spawn("draft", None, None, &config).unwrap();

        // The save must not be reported; only exit terminates the wait
        let outcome = session.wait_for_increment().await.unwrap();
        assert_eq!(outcome, EditOutcome::Exited);
    }

    #[tokio::test]
    async fn test_decode_failure_degrades_to_no_codec() {
        let dir = tempdir().unwrap();
        let config = script_editor_config(dir.path(), "exit 0");

        let session =
            EditorSession::spawn("raw content", Some(Arc::new(FailingDecode)), None, &config)
                .unwrap();
        wait_until_exit(&session).await;

        // Codec was disabled, so the raw (undecoded) content went to the
        // file and comes back without encoding
        assert_eq!(session.current_contents().await.unwrap(), "raw content");
    }

    #[tokio::test]
    async fn test_lossy_codec_fails_spawn() {
        let dir = tempdir().unwrap();
        let config = script_editor_config(dir.path(), "exit 0");

        let result = EditorSession::spawn("content", Some(Arc::new(LossyCodec)), None, &config);
        assert!(matches!(result, Err(SessionError::LossyCodec { .. })));
    }

    #[tokio::test]
    async fn test_round_trip_codec_decodes_for_editing() {
        let dir = tempdir().unwrap();
        let config = script_editor_config(dir.path(), r#"cat "$1" > /dev/null"#);

        let session = EditorSession::spawn(
            "one<br>two",
            Some(Arc::new(ReversibleCodec)),
            None,
            &config,
        )
        .unwrap();
        wait_until_exit(&session).await;

        // File held the decoded form; read-back re-encodes it
        assert_eq!(session.current_contents().await.unwrap(), "one<br>two");
    }

    #[tokio::test]
    async fn test_encode_failure_returns_raw_text() {
        let dir = tempdir().unwrap();
        let mut config = script_editor_config(dir.path(), r#"printf 'Edited\n' > "$1""#);
        config.careful_filtering = false;

        let session =
            EditorSession::spawn("original", Some(Arc::new(FailingEncode)), None, &config)
                .unwrap();
        wait_until_exit(&session).await;

        assert_eq!(session.current_contents().await.unwrap(), "Edited\n");
    }

    #[tokio::test]
    async fn test_temp_file_name_embeds_url_hint() {
        let dir = tempdir().unwrap();
        let config = script_editor_config(dir.path(), "exit 0");

        let session = EditorSession::spawn(
            "text",
            None,
            Some("http://example.com/a b"),
            &config,
        )
        .unwrap();

        let name = session
            .temp_path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .into_owned();
        assert!(
            name.starts_with("chrome_%%http%3A%2F%2Fexample.com%2Fa+b%%"),
            "name: {name}"
        );
        assert!(name.ends_with(".txt"), "name: {name}");

        wait_until_exit(&session).await;
    }

    #[test]
    fn test_quote_plus() {
        assert_eq!(
            quote_plus("http://example.com/a b"),
            "http%3A%2F%2Fexample.com%2Fa+b"
        );
        assert_eq!(quote_plus("plain-safe_chars.txt~"), "plain-safe_chars.txt~");
    }

    #[tokio::test]
    async fn test_wait_reports_each_save_once() {
        let dir = tempdir().unwrap();
        let config = script_editor_config(
            dir.path(),
            r#"sleep 0.2; printf 'first\n' > "$1"; sleep 0.4; printf 'second\n' > "$1"; sleep 5"#,
        );

        let session = EditorSession::spawn("draft", None, None, &config).unwrap();

        assert_eq!(
            session.wait_for_increment().await.unwrap(),
            EditOutcome::IncrementReady
        );
        let first = session.current_contents().await.unwrap();

        assert_eq!(
            session.wait_for_increment().await.unwrap(),
            EditOutcome::IncrementReady
        );
        let second = session.current_contents().await.unwrap();

        assert_eq!(first, "first\n");
        assert_eq!(second, "second\n");
    }

    #[tokio::test]
    async fn test_spawn_failure_with_bad_editor() {
        let dir = tempdir().unwrap();
        let config = crate::editor::config::EditorConfigBuilder::new()
            .editor_command(vec!["nonexistent-editor-binary".to_string()])
            .temp_dir(dir.path())
            .poll_interval(Duration::from_millis(25))
            .build()
            .unwrap();

        let result = EditorSession::spawn("text", None, None, &config);
        assert!(matches!(result, Err(SessionError::Process(_))));
    }
}
