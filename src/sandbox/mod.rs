//! Process-wide script sandbox
//!
//! A single long-lived service that runs small scripts (text transforms and
//! the like) in an isolated interpreter process. Jobs are queued and executed
//! strictly one at a time by a worker task started with
//! [`ScriptSandbox::start`].

mod executor;

use std::sync::OnceLock;
use std::time::Duration;

use serde_json::{Map, Value};
use tokio::sync::{mpsc, oneshot};

pub use executor::PYTHON_BOOTSTRAP;

use crate::{Error, Result};

/// Default per-script timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Pending jobs buffered before `execute` waits for queue space
const QUEUE_DEPTH: usize = 32;

static GLOBAL: OnceLock<ScriptSandbox> = OnceLock::new();

/// Interpreter settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SandboxConfig {
    /// Interpreter executable
    pub program: String,

    /// Arguments passed before the request is written to stdin
    pub args: Vec<String>,

    /// Per-script timeout
    pub timeout: Duration,
}

impl SandboxConfig {
    /// Python interpreter running the bundled bootstrap
    #[must_use]
    pub fn python(interpreter: impl Into<String>) -> Self {
        Self {
            program: interpreter.into(),
            args: vec!["-c".to_string(), PYTHON_BOOTSTRAP.to_string()],
            timeout: DEFAULT_TIMEOUT,
        }
    }
}

impl Default for SandboxConfig {
    fn default() -> Self {
        Self::python("python3")
    }
}

struct Job {
    code: String,
    bindings: Map<String, Value>,
    reply: oneshot::Sender<Result<Value>>,
}

/// Serialized script execution service
pub struct ScriptSandbox {
    config: SandboxConfig,
    queue: OnceLock<mpsc::Sender<Job>>,
}

impl ScriptSandbox {
    /// Create an unstarted sandbox
    #[must_use]
    pub const fn new(config: SandboxConfig) -> Self {
        Self {
            config,
            queue: OnceLock::new(),
        }
    }

    /// Install the process-wide sandbox with explicit settings
    ///
    /// # Errors
    ///
    /// Returns error if the global sandbox was already initialized
    pub fn install(config: SandboxConfig) -> Result<&'static Self> {
        let mut installed = false;
        let sandbox = GLOBAL.get_or_init(|| {
            installed = true;
            Self::new(config)
        });

        if installed {
            Ok(sandbox)
        } else {
            Err(Error::Sandbox("sandbox already initialized".to_string()))
        }
    }

    /// Process-wide sandbox, created with default settings on first use
    #[must_use]
    pub fn global() -> &'static Self {
        GLOBAL.get_or_init(|| Self::new(SandboxConfig::default()))
    }

    /// Interpreter settings
    #[must_use]
    pub const fn config(&self) -> &SandboxConfig {
        &self.config
    }

    /// Start the worker task; calling again is a no-op
    ///
    /// # Errors
    ///
    /// Returns error if called outside a Tokio runtime
    pub fn start(&self) -> Result<()> {
        if self.is_started() {
            return Ok(());
        }

        let handle = tokio::runtime::Handle::try_current()
            .map_err(|e| Error::Sandbox(format!("no async runtime: {e}")))?;

        let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
        if self.queue.set(tx).is_err() {
            // Another caller started it first
            return Ok(());
        }

        handle.spawn(run_worker(self.config.clone(), rx));
        tracing::info!(program = %self.config.program, "script sandbox started");
        Ok(())
    }

    /// Whether `start` has been called
    #[must_use]
    pub fn is_started(&self) -> bool {
        self.queue.get().is_some()
    }

    /// Run `code` with `bindings` as global variables and return its result
    ///
    /// Waits behind any queued jobs.
    ///
    /// # Errors
    ///
    /// Returns error if the sandbox is not started, the worker is gone, or
    /// the script fails
    pub async fn execute(&self, code: &str, bindings: Map<String, Value>) -> Result<Value> {
        let queue = self.queue.get().ok_or_else(|| {
            Error::Sandbox("sandbox is not started; call start() first".to_string())
        })?;

        let (reply, response) = oneshot::channel();
        queue
            .send(Job {
                code: code.to_string(),
                bindings,
                reply,
            })
            .await
            .map_err(|_| Error::Sandbox("sandbox worker stopped".to_string()))?;

        response
            .await
            .map_err(|_| Error::Sandbox("sandbox worker dropped the job".to_string()))?
    }
}

async fn run_worker(config: SandboxConfig, mut jobs: mpsc::Receiver<Job>) {
    while let Some(job) = jobs.recv().await {
        tracing::debug!(code_len = job.code.len(), bindings = job.bindings.len(), "executing script");
        let result = executor::run(&config, &job.code, &job.bindings).await;
        if let Err(e) = &result {
            tracing::debug!(error = %e, "script failed");
        }
        if job.reply.send(result).is_err() {
            tracing::debug!("script caller went away before completion");
        }
    }
    tracing::debug!("script sandbox worker stopped");
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    fn shell(script: &str) -> SandboxConfig {
        SandboxConfig {
            program: "sh".to_string(),
            args: vec!["-c".to_string(), script.to_string()],
            timeout: Duration::from_secs(5),
        }
    }

    #[tokio::test]
    async fn test_execute_before_start_fails() {
        let sandbox = ScriptSandbox::new(shell("echo '{\"results\": 1}'"));
        let err = sandbox.execute("1", Map::new()).await.unwrap_err();
        assert!(matches!(err, Error::Sandbox(ref msg) if msg.contains("not started")));
    }

    #[tokio::test]
    async fn test_execute_returns_results() {
        let sandbox = ScriptSandbox::new(shell("cat > /dev/null; echo '{\"results\": {\"n\": 42}}'"));
        tokio_test::assert_ok!(sandbox.start());
        tokio_test::assert_ok!(sandbox.start());
        assert!(sandbox.is_started());

        let value = sandbox.execute("anything", Map::new()).await.unwrap();
        assert_eq!(value, serde_json::json!({ "n": 42 }));
    }

    #[tokio::test]
    async fn test_script_error_is_reported() {
        let sandbox = ScriptSandbox::new(shell("cat > /dev/null; echo '{\"error\": \"boom\"}'"));
        sandbox.start().unwrap();

        let err = sandbox.execute("raise", Map::new()).await.unwrap_err();
        assert!(matches!(err, Error::Sandbox(ref msg) if msg == "boom"));
    }

    #[tokio::test]
    async fn test_request_reaches_interpreter() {
        // Echo stdin back wrapped as the result
        let sandbox = ScriptSandbox::new(shell("printf '{\"results\": '; cat; printf '}'"));
        sandbox.start().unwrap();

        let mut bindings = Map::new();
        bindings.insert("text".to_string(), Value::from("hello"));
        let value = sandbox.execute("text.upper()", bindings).await.unwrap();

        assert_eq!(value["code"], "text.upper()");
        assert_eq!(value["bindings"]["text"], "hello");
    }

    #[tokio::test]
    async fn test_nonzero_exit_fails() {
        let sandbox = ScriptSandbox::new(shell("cat > /dev/null; exit 3"));
        sandbox.start().unwrap();

        let err = sandbox.execute("x", Map::new()).await.unwrap_err();
        assert!(matches!(err, Error::Sandbox(ref msg) if msg.contains("code 3")));
    }

    #[tokio::test]
    async fn test_timeout() {
        let mut config = shell("sleep 5");
        config.timeout = Duration::from_millis(100);
        let sandbox = ScriptSandbox::new(config);
        sandbox.start().unwrap();

        let err = sandbox.execute("x", Map::new()).await.unwrap_err();
        assert!(matches!(err, Error::Sandbox(ref msg) if msg.contains("timed out")));
    }

    #[tokio::test]
    async fn test_timeout_covers_unread_stdin() {
        // Larger than any pipe buffer, and the interpreter never reads it
        let mut config = shell("sleep 4");
        config.timeout = Duration::from_millis(200);
        let sandbox = ScriptSandbox::new(config);
        sandbox.start().unwrap();

        let code = "x".repeat(1024 * 1024);
        let started = std::time::Instant::now();
        let err = sandbox.execute(&code, Map::new()).await.unwrap_err();

        assert!(matches!(err, Error::Sandbox(ref msg) if msg.contains("timed out")));
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_jobs_run_one_at_a_time() {
        let dir = tempfile::tempdir().unwrap();
        let lock = dir.path().join("busy");
        let script = format!(
            "cat > /dev/null; \
             if [ -e '{lock}' ]; then echo '{{\"error\": \"overlap\"}}'; exit 0; fi; \
             touch '{lock}'; sleep 0.2; rm '{lock}'; echo '{{\"results\": true}}'",
            lock = lock.display()
        );
        let sandbox = ScriptSandbox::new(shell(&script));
        sandbox.start().unwrap();

        let (a, b, c) = tokio::join!(
            sandbox.execute("a", Map::new()),
            sandbox.execute("b", Map::new()),
            sandbox.execute("c", Map::new()),
        );

        for result in [a, b, c] {
            assert_eq!(result.unwrap(), Value::Bool(true));
        }
    }

    #[test]
    fn test_start_outside_runtime_fails() {
        let sandbox = ScriptSandbox::new(SandboxConfig::default());
        tokio_test::assert_err!(sandbox.start());
        assert!(!sandbox.is_started());
    }

    #[test]
    fn test_default_config_is_python() {
        let config = SandboxConfig::default();
        assert_eq!(config.program, "python3");
        assert_eq!(config.args[0], "-c");
        assert_eq!(config.timeout, DEFAULT_TIMEOUT);
    }
}
