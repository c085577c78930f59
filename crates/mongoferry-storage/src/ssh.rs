//! SSH/SCP storage backend
//!
//! Shells out to the system `ssh` and `scp` binaries rather than
//! carrying an SSH protocol implementation. Every invocation gets the
//! same option set (connect timeout, keep-alives, host key policy,
//! optional identity file), and uploads are verified against the
//! remote file size before they count as done.

use crate::{RemoteFile, StorageBackend};
use async_trait::async_trait;
use mongoferry_config::SshConfig;
use mongoferry_types::{Error, Result};
use std::path::Path;
use std::process::Output;
use tokio::process::Command;
use tracing::{debug, warn};

/// Stores archives in a directory on a remote host reached over SSH
#[derive(Debug, Clone)]
pub struct SshBackend {
    user: String,
    host: String,
    port: Option<u16>,
    remote_dir: String,
    options: SshConfig,
}

impl SshBackend {
    /// Create a backend for `user@host` storing under `remote_dir`
    #[must_use]
    pub fn new(
        user: String,
        host: String,
        port: Option<u16>,
        remote_dir: String,
        options: SshConfig,
    ) -> Self {
        Self {
            user,
            host,
            port,
            remote_dir,
            options,
        }
    }

    /// Common argument list shared by `ssh` and `scp` invocations.
    ///
    /// The two binaries disagree on the port flag (`-p` vs `-P`),
    /// which is the only difference.
    #[must_use]
    pub fn base_args(&self, use_scp: bool) -> Vec<String> {
        let mut args = vec![
            "-o".to_string(),
            format!("ConnectTimeout={}", self.options.connect_timeout_secs),
            "-o".to_string(),
            format!("ServerAliveInterval={}", self.options.keepalive_interval_secs),
            "-o".to_string(),
            format!("ServerAliveCountMax={}", self.options.keepalive_max_count),
            "-o".to_string(),
            "StrictHostKeyChecking=accept-new".to_string(),
        ];
        if let Some(port) = self.port {
            args.push(if use_scp { "-P" } else { "-p" }.to_string());
            args.push(port.to_string());
        }
        if let Some(key) = &self.options.key_file {
            args.push("-i".to_string());
            args.push(key.display().to_string());
        }
        args
    }

    fn target(&self) -> String {
        format!("{}@{}", self.user, self.host)
    }

    fn remote_path(&self, remote_name: &str) -> String {
        format!("{}/{}", self.remote_dir.trim_end_matches('/'), remote_name)
    }

    async fn run_ssh(&self, command: &str) -> Result<Output> {
        let output = Command::new("ssh")
            .args(self.base_args(false))
            .arg(self.target())
            .arg(command)
            .output()
            .await
            .map_err(|e| Error::storage_connection("ssh", e.to_string()))?;
        if output.status.success() {
            Ok(output)
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(Error::storage_connection(
                "ssh",
                format!("remote command '{command}' failed: {stderr}"),
            ))
        }
    }

    async fn run_scp(&self, from: &str, to: &str) -> Result<()> {
        let transfer = Command::new("scp")
            .args(self.base_args(true))
            .arg(from)
            .arg(to)
            // A timed-out transfer must not leave scp running.
            .kill_on_drop(true)
            .output();
        let output = tokio::time::timeout(self.options.transfer_timeout(), transfer)
            .await
            .map_err(|_| Error::Timeout {
                seconds: self.options.transfer_timeout_secs,
            })?
            .map_err(|e| Error::storage_transfer("ssh", e.to_string()))?;
        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            Err(Error::storage_transfer("ssh", format!("scp failed: {stderr}")))
        }
    }

    async fn remote_size(&self, remote_path: &str) -> Result<u64> {
        // stat is not portable to every sshd host, ls -la is.
        if let Ok(output) = self.run_ssh(&format!("stat -c %s {remote_path}")).await {
            let text = String::from_utf8_lossy(&output.stdout);
            if let Ok(size) = text.trim().parse::<u64>() {
                return Ok(size);
            }
        }
        let output = self.run_ssh(&format!("ls -la {remote_path}")).await?;
        let text = String::from_utf8_lossy(&output.stdout);
        text.lines()
            .find_map(parse_ls_line)
            .map(|f| f.size)
            .ok_or_else(|| {
                Error::storage_transfer("ssh", format!("cannot determine size of {remote_path}"))
            })
    }
}

#[async_trait]
impl StorageBackend for SshBackend {
    fn kind(&self) -> &'static str {
        "ssh"
    }

    async fn test_connection(&self) -> Result<()> {
        self.run_ssh("true").await?;
        Ok(())
    }

    async fn put(&self, local: &Path, remote_name: &str) -> Result<()> {
        let local_size = tokio::fs::metadata(local)
            .await
            .map_err(|e| Error::storage_transfer("ssh", e.to_string()))?
            .len();
        self.run_ssh(&format!("mkdir -p {}", self.remote_dir)).await?;

        let remote_path = self.remote_path(remote_name);
        debug!(
            local = %local.display(),
            remote = %remote_path,
            size = local_size,
            "uploading over scp"
        );
        if let Err(e) = self
            .run_scp(
                &local.display().to_string(),
                &format!("{}:{remote_path}", self.target()),
            )
            .await
        {
            // A failed or timed-out scp can leave a partial file behind.
            let _ = self.run_ssh(&format!("rm -f {remote_path}")).await;
            return Err(e);
        }

        let remote_size = self.remote_size(&remote_path).await?;
        if remote_size != local_size {
            warn!(remote = %remote_path, local_size, remote_size, "upload size mismatch");
            // Do not leave a truncated archive behind.
            let _ = self.run_ssh(&format!("rm -f {remote_path}")).await;
            return Err(Error::storage_transfer(
                "ssh",
                format!(
                    "size mismatch after upload of {remote_name}: local {local_size}, remote {remote_size}"
                ),
            ));
        }
        Ok(())
    }

    async fn get(&self, remote_name: &str, local: &Path) -> Result<()> {
        let remote_path = self.remote_path(remote_name);
        self.run_scp(
            &format!("{}:{remote_path}", self.target()),
            &local.display().to_string(),
        )
        .await
    }

    async fn list(&self) -> Result<Vec<RemoteFile>> {
        let output = self.run_ssh(&format!("ls -la {}", self.remote_dir)).await?;
        let text = String::from_utf8_lossy(&output.stdout);
        Ok(text.lines().filter_map(parse_ls_line).collect())
    }

    async fn remove(&self, remote_name: &str) -> Result<()> {
        self.run_ssh(&format!("rm -f {}", self.remote_path(remote_name)))
            .await?;
        Ok(())
    }
}

/// Parse one `ls -la` output line into a file entry.
///
/// Only plain files count; directories, links, and the `total` header
/// are skipped. Modification times are not recovered because `ls`
/// date formats vary by locale and file age.
fn parse_ls_line(line: &str) -> Option<RemoteFile> {
    if !line.starts_with('-') {
        return None;
    }
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 9 {
        return None;
    }
    let size = fields[4].parse::<u64>().ok()?;
    Some(RemoteFile {
        name: fields[8..].join(" "),
        size,
        modified: None,
    })
}
