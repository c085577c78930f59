//! Invocation of the native dump/restore executables

use mongoferry_types::{Error, Result};
use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;
use tracing::{debug, info};

/// Namespace mapping for restores (`--nsFrom`/`--nsTo`)
#[derive(Debug, Clone)]
pub struct NsMapping {
    /// Source namespace pattern, e.g. `olddb.*` or `db.users`
    pub from: String,
    /// Target namespace pattern
    pub to: String,
}

impl NsMapping {
    /// Map one whole database onto another
    pub fn database<F: Into<String>, T: Into<String>>(from: F, to: T) -> Self {
        Self {
            from: format!("{}.*", from.into()),
            to: format!("{}.*", to.into()),
        }
    }

    /// Map one collection onto another
    pub fn collection(from_db: &str, from_coll: &str, to_db: &str, to_coll: &str) -> Self {
        Self {
            from: format!("{from_db}.{from_coll}"),
            to: format!("{to_db}.{to_coll}"),
        }
    }
}

/// Runner for the native `mongodump`/`mongorestore` executables.
///
/// Exit code 0 is success; anything else surfaces as
/// [`Error::ToolExecution`] with the captured standard error. A failed
/// invocation is terminal for that attempt; retry policy belongs to
/// the caller.
#[derive(Debug, Clone, Copy, Default)]
pub struct NativeTools;

impl NativeTools {
    /// Dump a database (or one collection of it) into `out_dir`,
    /// producing the standard mongodump directory layout.
    pub async fn dump(
        &self,
        uri: &str,
        database: &str,
        collection: Option<&str>,
        out_dir: &Path,
    ) -> Result<()> {
        let mut cmd = Command::new("mongodump");
        cmd.arg("--uri")
            .arg(uri)
            .arg("--db")
            .arg(database)
            .arg("--out")
            .arg(out_dir);
        if let Some(coll) = collection {
            cmd.arg("--collection").arg(coll);
        }
        info!(database, collection = collection.unwrap_or("*"), "running mongodump");
        run("mongodump", cmd).await
    }

    /// Restore a mongodump directory layout, remapping namespaces.
    pub async fn restore(
        &self,
        uri: &str,
        dump_dir: &Path,
        mapping: &NsMapping,
        drop: bool,
    ) -> Result<()> {
        let mut cmd = Command::new("mongorestore");
        cmd.arg("--uri")
            .arg(uri)
            .arg("--nsFrom")
            .arg(&mapping.from)
            .arg("--nsTo")
            .arg(&mapping.to);
        if drop {
            cmd.arg("--drop");
        }
        cmd.arg(dump_dir);
        info!(from = %mapping.from, to = %mapping.to, drop, "running mongorestore");
        run("mongorestore", cmd).await
    }

    /// Copy by piping `mongodump --archive` on the source straight
    /// into `mongorestore --archive` on the target, no intermediate
    /// file.
    pub async fn pipe_copy(
        &self,
        source_uri: &str,
        source_db: &str,
        collection: Option<&str>,
        target_uri: &str,
        mapping: &NsMapping,
    ) -> Result<()> {
        let mut dump_cmd = Command::new("mongodump");
        dump_cmd
            .arg("--uri")
            .arg(source_uri)
            .arg("--db")
            .arg(source_db)
            .arg("--archive")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        if let Some(coll) = collection {
            dump_cmd.arg("--collection").arg(coll);
        }

        let mut dump = dump_cmd
            .spawn()
            .map_err(|e| Error::tool("mongodump", format!("failed to spawn: {e}")))?;
        let dump_stdout = dump
            .stdout
            .take()
            .ok_or_else(|| Error::tool("mongodump", "stdout was not captured"))?;
        let stdin: Stdio = dump_stdout
            .try_into()
            .map_err(|e| Error::tool("mongodump", format!("failed to wire pipe: {e}")))?;

        let mut restore_cmd = Command::new("mongorestore");
        restore_cmd
            .arg("--uri")
            .arg(target_uri)
            .arg("--archive")
            .arg("--nsFrom")
            .arg(&mapping.from)
            .arg("--nsTo")
            .arg(&mapping.to)
            .stdin(stdin)
            .stdout(Stdio::null())
            .stderr(Stdio::piped());

        let restore = restore_cmd
            .spawn()
            .map_err(|e| Error::tool("mongorestore", format!("failed to spawn: {e}")))?;

        info!(from = %mapping.from, to = %mapping.to, "piping mongodump into mongorestore");
        let (dump_out, restore_out) =
            tokio::join!(dump.wait_with_output(), restore.wait_with_output());

        let dump_out = dump_out.map_err(|e| Error::tool("mongodump", e.to_string()))?;
        let restore_out = restore_out.map_err(|e| Error::tool("mongorestore", e.to_string()))?;

        if !dump_out.status.success() {
            return Err(Error::tool("mongodump", stderr_text(&dump_out.stderr, dump_out.status.code())));
        }
        if !restore_out.status.success() {
            return Err(Error::tool(
                "mongorestore",
                stderr_text(&restore_out.stderr, restore_out.status.code()),
            ));
        }
        Ok(())
    }
}

async fn run(tool: &str, mut cmd: Command) -> Result<()> {
    cmd.stdin(Stdio::null()).stdout(Stdio::null()).stderr(Stdio::piped());
    let output = cmd
        .output()
        .await
        .map_err(|e| Error::tool(tool, format!("failed to spawn: {e}")))?;
    if output.status.success() {
        debug!(tool, "completed");
        Ok(())
    } else {
        Err(Error::tool(tool, stderr_text(&output.stderr, output.status.code())))
    }
}

fn stderr_text(stderr: &[u8], code: Option<i32>) -> String {
    let text = String::from_utf8_lossy(stderr);
    let text = text.trim();
    if text.is_empty() {
        format!("exited with status {}", code.map_or_else(|| "unknown".to_string(), |c| c.to_string()))
    } else {
        text.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongoferry_types::ErrorKind;

    #[test]
    fn ns_mapping_forms() {
        let db = NsMapping::database("olddb", "newdb");
        assert_eq!(db.from, "olddb.*");
        assert_eq!(db.to, "newdb.*");

        let coll = NsMapping::collection("a", "users", "b", "users_copy");
        assert_eq!(coll.from, "a.users");
        assert_eq!(coll.to, "b.users_copy");
    }

    #[test]
    fn stderr_text_falls_back_to_exit_code() {
        assert_eq!(stderr_text(b"", Some(2)), "exited with status 2");
        assert_eq!(stderr_text(b"  boom \n", Some(1)), "boom");
    }

    #[tokio::test]
    async fn spawn_failure_is_a_tool_error() {
        let err = run("mongoferry-no-such-tool", Command::new("mongoferry-no-such-tool"))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ToolExecution);
        assert!(err.to_string().contains("mongoferry-no-such-tool"));
    }
}
