//! Process management layer
//!
//! Handles external editor process lifecycle: spawn, exit detection via
//! a background wait task, and forced termination for cleanup paths.

use std::io;
use std::process::ExitStatus;
use std::sync::{Arc, Mutex};
use tokio::process::Command;
use tokio::task::JoinHandle;
use tracing::{error, info, trace};

// ============================================================================
// Process State Management
// ============================================================================

/// Process lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    /// Process has not been started yet
    NotStarted,
    /// Process is currently running
    Running { pid: u32 },
    /// Process has terminated; the wait task captured its exit status
    Exited { status: ExitStatus },
}

impl ProcessState {
    /// Get the process ID if the process is running
    pub fn pid(&self) -> Option<u32> {
        match self {
            ProcessState::Running { pid } => Some(*pid),
            _ => None,
        }
    }

    /// Check if the process is currently running
    pub fn is_running(&self) -> bool {
        matches!(self, ProcessState::Running { .. })
    }

    /// Get the exit status if the process has terminated
    pub fn exit_status(&self) -> Option<ExitStatus> {
        match self {
            ProcessState::Exited { status } => Some(*status),
            _ => None,
        }
    }
}

// ============================================================================
// Process Management
// ============================================================================

/// Error types for process management
#[derive(Debug, thiserror::Error)]
pub enum ProcessError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Process not started")]
    NotStarted,

    #[error("Process already started")]
    AlreadyStarted,

    #[error("Empty editor command")]
    EmptyCommand,
}

/// Supervises one spawned editor process
///
/// The child inherits stdio (editors talk to the user's display or
/// terminal, not to us). A background wait task reaps the child and
/// publishes its exit status through the shared state, so liveness
/// checks never block.
pub struct EditorProcess {
    /// Command to execute
    command: String,

    /// Command arguments (the temp file path is the final argument)
    args: Vec<String>,

    /// Thread-safe process state
    state: Arc<Mutex<ProcessState>>,

    /// Process wait task handle (waits for child to exit)
    wait_task: Option<JoinHandle<()>>,
}

impl EditorProcess {
    /// Create a new editor process from an argument vector
    ///
    /// `argv[0]` is the executable, the rest are its arguments. The
    /// caller appends the temp file path before construction.
    pub fn new(argv: Vec<String>) -> Result<Self, ProcessError> {
        let mut iter = argv.into_iter();
        let command = iter.next().ok_or(ProcessError::EmptyCommand)?;
        Ok(Self {
            command,
            args: iter.collect(),
            state: Arc::new(Mutex::new(ProcessState::NotStarted)),
            wait_task: None,
        })
    }

    /// Get current process state (thread-safe)
    pub fn state(&self) -> ProcessState {
        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        *self.state.lock().unwrap()
    }

    /// Check if the process is currently running
    pub fn is_running(&self) -> bool {
        self.state().is_running()
    }

    /// Get the exit status once the wait task has observed termination
    pub fn exit_status(&self) -> Option<ExitStatus> {
        self.state().exit_status()
    }

    /// Start the editor process
    ///
    /// Returns as soon as the child is spawned; the wait task picks up
    /// exit detection in the background.
    pub fn start(&mut self) -> Result<(), ProcessError> {
        if !matches!(self.state(), ProcessState::NotStarted) {
            return Err(ProcessError::AlreadyStarted);
        }

        info!("Spawning editor: {} {:?}", self.command, self.args);

        let mut child = Command::new(&self.command)
            .args(&self.args)
            // Lets editor plugins detect they were launched by us
            .env("FROM_EDIT_SERVER", "true")
            .spawn()?;

        let pid = child
            .id()
            .ok_or_else(|| ProcessError::Io(io::Error::other("Failed to get process ID")))?;
        info!("Editor started with PID: {}", pid);

        // Intentional .unwrap() - poisoned mutex indicates serious bug, panic is appropriate
        *self.state.lock().unwrap() = ProcessState::Running { pid };

        let state = Arc::clone(&self.state);
        let task = tokio::spawn(async move {
            trace!("EditorProcess: starting wait task for PID {}", pid);

            match child.wait().await {
                Ok(status) => {
                    info!("Editor PID {} exited with status: {}", pid, status);
                    if let Ok(mut process_state) = state.lock() {
                        *process_state = ProcessState::Exited { status };
                    }
                }
                Err(e) => {
                    // Leave the state as Running; the session's poll loop
                    // keeps the request alive and the error is visible in logs.
                    error!("Error waiting for editor process {}: {}", pid, e);
                }
            }

            trace!("EditorProcess: wait task finished for PID {}", pid);
        });

        self.wait_task = Some(task);
        Ok(())
    }

    /// Synchronous force kill for Drop trait implementations
    ///
    /// Skips async cleanup and sends SIGKILL directly. The wait task is
    /// left running so the child is still reaped.
    pub fn kill_sync(&mut self) {
        let pid = match self.state().pid() {
            Some(pid) => pid,
            None => return, // Never started or already exited
        };

        info!("Force killing editor process with PID: {}", pid);

        #[cfg(unix)]
        unsafe {
            libc::kill(pid as libc::pid_t, libc::SIGKILL);
        }

        #[cfg(not(unix))]
        tracing::warn!("Sync process kill not implemented on this platform");
    }
}

impl std::fmt::Debug for EditorProcess {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EditorProcess")
            .field("command", &self.command)
            .field("args", &self.args)
            .field("state", &self.state())
            .finish()
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    // Auto-initialize logging for all tests in this module
    #[cfg(feature = "test-logging")]
    #[ctor::ctor]
    fn init_test_logging() {
        crate::test_utils::logging::init();
    }

    async fn wait_for_exit(process: &EditorProcess) -> ExitStatus {
        for _ in 0..100 {
            if let Some(status) = process.exit_status() {
                return status;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        panic!("process did not exit within 2s: {:?}", process);
    }

    #[tokio::test]
    async fn test_process_lifecycle() {
        let mut process =
            EditorProcess::new(vec!["true".to_string()]).unwrap();

        assert_eq!(process.state(), ProcessState::NotStarted);
        assert!(!process.is_running());

        process.start().unwrap();

        let status = wait_for_exit(&process).await;
        assert!(status.success());
        assert!(!process.is_running());
    }

    #[tokio::test]
    async fn test_nonzero_exit_code_captured() {
        let mut process = EditorProcess::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "exit 3".to_string(),
        ])
        .unwrap();

        process.start().unwrap();

        let status = wait_for_exit(&process).await;
        assert_eq!(status.code(), Some(3));
    }

    #[tokio::test]
    async fn test_cannot_start_twice() {
        let mut process = EditorProcess::new(vec![
            "sh".to_string(),
            "-c".to_string(),
            "sleep 5".to_string(),
        ])
        .unwrap();

        process.start().unwrap();
        assert!(process.is_running());

        let result = process.start();
        assert!(matches!(result, Err(ProcessError::AlreadyStarted)));

        process.kill_sync();
        let status = wait_for_exit(&process).await;
        assert!(!status.success());
    }

    #[tokio::test]
    async fn test_spawn_failure_surfaces_io_error() {
        let mut process =
            EditorProcess::new(vec!["nonexistent-editor-binary".to_string()]).unwrap();

        let result = process.start();
        assert!(matches!(result, Err(ProcessError::Io(_))));
        assert_eq!(process.state(), ProcessState::NotStarted);
    }

    #[test]
    fn test_empty_command_rejected() {
        let result = EditorProcess::new(Vec::new());
        assert!(matches!(result, Err(ProcessError::EmptyCommand)));
    }

    #[test]
    fn test_process_state_methods() {
        let not_started = ProcessState::NotStarted;
        assert!(!not_started.is_running());
        assert!(not_started.pid().is_none());
        assert!(not_started.exit_status().is_none());

        let running = ProcessState::Running { pid: 12345 };
        assert!(running.is_running());
        assert_eq!(running.pid(), Some(12345));
        assert!(running.exit_status().is_none());
    }
}
