//! Native tool availability probing

use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

/// What the availability probe found.
///
/// Cached for the lifetime of one strategy instance only; never stored
/// globally, so a tool installed mid-process is picked up by the next
/// invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ToolCapabilities {
    /// `mongodump` is present and answers `--version`
    pub dump_available: bool,
    /// `mongorestore` is present and answers `--version`
    pub restore_available: bool,
    /// Version string reported by `mongodump`, when obtainable
    pub version: Option<String>,
}

impl ToolCapabilities {
    /// Both tools are usable, so the native copy path is open
    pub fn native_path_available(&self) -> bool {
        self.dump_available && self.restore_available
    }
}

/// Probe both native tools with a per-tool timeout.
///
/// A missing executable, a nonzero exit or a timeout all yield
/// `available = false` without raising; absence of native tooling is
/// an expected state, not a failure.
pub async fn probe(timeout: Duration) -> ToolCapabilities {
    let (dump_version, restore_version) = tokio::join!(
        tool_version("mongodump", timeout),
        tool_version("mongorestore", timeout),
    );

    let capabilities = ToolCapabilities {
        dump_available: dump_version.is_some(),
        restore_available: restore_version.is_some(),
        version: dump_version,
    };
    debug!(
        dump = capabilities.dump_available,
        restore = capabilities.restore_available,
        version = capabilities.version.as_deref().unwrap_or("unknown"),
        "probed native tools"
    );
    capabilities
}

/// Run `<tool> --version` and return the first output line, or `None`
/// when the tool is unusable for any reason.
async fn tool_version(tool: &str, timeout: Duration) -> Option<String> {
    let invocation = Command::new(tool)
        .arg("--version")
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::null())
        .output();

    match tokio::time::timeout(timeout, invocation).await {
        Ok(Ok(output)) if output.status.success() => {
            let stdout = String::from_utf8_lossy(&output.stdout);
            stdout.lines().next().map(|line| line.trim().to_string())
        }
        Ok(Ok(output)) => {
            debug!(tool, code = output.status.code(), "version probe exited nonzero");
            None
        }
        Ok(Err(err)) => {
            debug!(tool, error = %err, "tool not runnable");
            None
        }
        Err(_elapsed) => {
            debug!(tool, "version probe timed out");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_executable_is_not_an_error() {
        let version = tool_version("mongoferry-no-such-binary", Duration::from_secs(1)).await;
        assert_eq!(version, None);
    }

    #[tokio::test]
    async fn probe_of_missing_tools_reports_unavailable() {
        // `probe` shells out to the real tool names; on hosts without
        // the MongoDB tools this exercises the absent branch, on hosts
        // with them the available branch. Either way it must not fail.
        let capabilities = probe(Duration::from_secs(5)).await;
        assert_eq!(
            capabilities.native_path_available(),
            capabilities.dump_available && capabilities.restore_available
        );
    }

    #[test]
    fn native_path_needs_both_tools() {
        let only_dump = ToolCapabilities {
            dump_available: true,
            restore_available: false,
            version: None,
        };
        assert!(!only_dump.native_path_available());
    }
}
