//! Script execution via interpreter subprocess

use std::process::Stdio;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tokio::time::timeout;

use super::SandboxConfig;
use crate::{Error, Result};

/// Python bootstrap: binds variables, runs the code, returns the value of
/// the trailing expression
pub const PYTHON_BOOTSTRAP: &str = r#"
import ast, json, sys
request = json.load(sys.stdin)
scope = dict(request.get("bindings") or {})
try:
    tree = ast.parse(request["code"], mode="exec")
    tail = None
    if tree.body and isinstance(tree.body[-1], ast.Expr):
        tail = ast.Expression(tree.body.pop().value)
    exec(compile(tree, "<sandbox>", "exec"), scope)
    value = eval(compile(tail, "<sandbox>", "eval"), scope) if tail is not None else None
    json.dump({"results": value}, sys.stdout, default=str)
except Exception as exc:
    json.dump({"error": str(exc)}, sys.stdout)
"#;

#[derive(Serialize)]
struct ScriptRequest<'a> {
    code: &'a str,
    bindings: &'a Map<String, Value>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ScriptReply {
    Failed { error: String },
    Completed { results: Value },
}

/// Run one script in a fresh interpreter process
///
/// Sends `{ "code", "bindings" }` as JSON on stdin and expects
/// `{ "results": ... }` or `{ "error": "..." }` on stdout.
pub(super) async fn run(
    config: &SandboxConfig,
    code: &str,
    bindings: &Map<String, Value>,
) -> Result<Value> {
    let request = serde_json::to_vec(&ScriptRequest { code, bindings })?;

    let mut child = Command::new(&config.program)
        .args(&config.args)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| Error::Sandbox(format!("failed to spawn {}: {e}", config.program)))?;

    // The deadline covers feeding stdin too; an interpreter that never reads
    // it would otherwise block the write forever
    let exchange = async move {
        if let Some(mut stdin) = child.stdin.take() {
            match stdin.write_all(&request).await {
                Ok(()) => {}
                // Interpreter exited without reading; its output decides
                Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {
                    tracing::debug!("interpreter closed stdin early");
                }
                Err(e) => {
                    return Err(Error::Sandbox(format!(
                        "failed to write to interpreter stdin: {e}"
                    )));
                }
            }
        }

        child
            .wait_with_output()
            .await
            .map_err(|e| Error::Sandbox(format!("script execution failed: {e}")))
    };

    let output = timeout(config.timeout, exchange)
        .await
        .map_err(|_| Error::Sandbox(format!("script timed out after {:?}", config.timeout)))??;

    if !output.stderr.is_empty() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        tracing::debug!(program = %config.program, stderr = %stderr, "interpreter stderr");
    }

    if !output.status.success() {
        let code = output.status.code().unwrap_or(-1);
        return Err(Error::Sandbox(format!("interpreter exited with code {code}")));
    }

    let reply: ScriptReply = serde_json::from_slice(&output.stdout)
        .map_err(|e| Error::Sandbox(format!("failed to parse interpreter output: {e}")))?;

    match reply {
        ScriptReply::Completed { results } => Ok(results),
        ScriptReply::Failed { error } => Err(Error::Sandbox(error)),
    }
}
