//! FTP storage backend
//!
//! The FTP protocol client is synchronous, so every operation runs on
//! the blocking thread pool with a fresh connection. Archives move in
//! binary transfer mode.

use crate::{RemoteFile, StorageBackend};
use async_trait::async_trait;
use mongoferry_types::{Error, Result};
use std::path::{Path, PathBuf};
use std::net::ToSocketAddrs;
use std::time::Duration;
use suppaftp::types::FileType;
use suppaftp::FtpStream;
use tracing::debug;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Stores archives in a directory on an FTP server
#[derive(Debug, Clone)]
pub struct FtpBackend {
    host: String,
    port: u16,
    user: String,
    password: String,
    remote_dir: String,
}

impl FtpBackend {
    /// Create a backend for the given server and directory
    #[must_use]
    pub fn new(
        host: String,
        port: u16,
        user: String,
        password: String,
        remote_dir: String,
    ) -> Self {
        Self {
            host,
            port,
            user,
            password,
            remote_dir,
        }
    }

    /// Connect, log in, switch to binary mode, and enter the storage
    /// directory, creating it when missing.
    fn connect(&self) -> Result<FtpStream> {
        let addr = (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| Error::storage_connection("ftp", e.to_string()))?
            .next()
            .ok_or_else(|| {
                Error::storage_connection("ftp", format!("cannot resolve host {}", self.host))
            })?;
        let mut stream = FtpStream::connect_timeout(addr, CONNECT_TIMEOUT)
            .map_err(|e| Error::storage_connection("ftp", e.to_string()))?;
        stream
            .login(&self.user, &self.password)
            .map_err(|e| Error::storage_connection("ftp", format!("login failed: {e}")))?;
        stream
            .transfer_type(FileType::Binary)
            .map_err(|e| Error::storage_connection("ftp", e.to_string()))?;

        if stream.cwd(&self.remote_dir).is_err() {
            // mkdir may race with another writer or report an already
            // existing directory; the cwd that follows is the check
            // that matters.
            let _ = stream.mkdir(&self.remote_dir);
            stream.cwd(&self.remote_dir).map_err(|e| {
                Error::storage_connection(
                    "ftp",
                    format!("cannot enter directory {}: {e}", self.remote_dir),
                )
            })?;
        }
        Ok(stream)
    }

    async fn blocking<T, F>(&self, op: F) -> Result<T>
    where
        T: Send + 'static,
        F: FnOnce(Self) -> Result<T> + Send + 'static,
    {
        let backend = self.clone();
        tokio::task::spawn_blocking(move || op(backend))
            .await
            .map_err(|e| Error::other(format!("ftp task panicked: {e}")))?
    }
}

#[async_trait]
impl StorageBackend for FtpBackend {
    fn kind(&self) -> &'static str {
        "ftp"
    }

    async fn test_connection(&self) -> Result<()> {
        self.blocking(|backend| {
            let mut stream = backend.connect()?;
            let _ = stream.quit();
            Ok(())
        })
        .await
    }

    async fn put(&self, local: &Path, remote_name: &str) -> Result<()> {
        let local: PathBuf = local.to_path_buf();
        let remote_name = remote_name.to_string();
        self.blocking(move |backend| {
            let local_size = std::fs::metadata(&local)
                .map_err(|e| Error::storage_transfer("ftp", e.to_string()))?
                .len();
            let mut file = std::fs::File::open(&local)
                .map_err(|e| Error::storage_transfer("ftp", e.to_string()))?;

            let mut stream = backend.connect()?;
            debug!(remote = %remote_name, size = local_size, "uploading over ftp");
            let written = stream
                .put_file(&remote_name, &mut file)
                .map_err(|e| Error::storage_transfer("ftp", e.to_string()))?;
            if written != local_size {
                let _ = stream.rm(&remote_name);
                let _ = stream.quit();
                return Err(Error::storage_transfer(
                    "ftp",
                    format!(
                        "size mismatch after upload of {remote_name}: local {local_size}, remote {written}"
                    ),
                ));
            }
            let _ = stream.quit();
            Ok(())
        })
        .await
    }

    async fn get(&self, remote_name: &str, local: &Path) -> Result<()> {
        let local: PathBuf = local.to_path_buf();
        let remote_name = remote_name.to_string();
        self.blocking(move |backend| {
            let mut stream = backend.connect()?;
            let bytes = stream
                .retr(&remote_name, |reader| {
                    let mut file = std::fs::File::create(&local)
                        .map_err(suppaftp::FtpError::ConnectionError)?;
                    stream_to_file(reader, &mut file).map_err(suppaftp::FtpError::ConnectionError)
                })
                .map_err(|e| Error::storage_transfer("ftp", e.to_string()))?;
            debug!(remote = %remote_name, bytes, "downloaded over ftp");
            let _ = stream.quit();
            Ok(())
        })
        .await
    }

    async fn list(&self) -> Result<Vec<RemoteFile>> {
        self.blocking(|backend| {
            let mut stream = backend.connect()?;
            let names = stream
                .nlst(None)
                .map_err(|e| Error::storage_transfer("ftp", e.to_string()))?;
            let mut files = Vec::new();
            for name in names {
                // SIZE fails on directories, which is exactly the
                // filter we want.
                if let Ok(size) = stream.size(&name) {
                    files.push(RemoteFile {
                        name,
                        size: size as u64,
                        modified: None,
                    });
                }
            }
            let _ = stream.quit();
            files.sort_by(|a, b| a.name.cmp(&b.name));
            Ok(files)
        })
        .await
    }

    async fn remove(&self, remote_name: &str) -> Result<()> {
        let remote_name = remote_name.to_string();
        self.blocking(move |backend| {
            let mut stream = backend.connect()?;
            stream
                .rm(&remote_name)
                .map_err(|e| Error::storage_transfer("ftp", e.to_string()))?;
            let _ = stream.quit();
            Ok(())
        })
        .await
    }
}

/// Copy a download onto disk in chunks so a multi-gigabyte archive
/// never has to fit in memory.
fn stream_to_file(
    reader: &mut dyn std::io::Read,
    file: &mut std::fs::File,
) -> std::io::Result<u64> {
    std::io::copy(reader, file)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downloads_are_copied_in_chunks_not_buffered() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("archive.tar.gz");
        // Larger than any single read so the copy loop runs more than once.
        let payload = vec![0xa5u8; 256 * 1024];

        let mut reader = std::io::Cursor::new(payload.clone());
        let mut file = std::fs::File::create(&target).unwrap();
        let written = stream_to_file(&mut reader, &mut file).unwrap();

        assert_eq!(written, payload.len() as u64);
        assert_eq!(std::fs::read(&target).unwrap(), payload);
    }

    #[test]
    fn backend_kind_label() {
        let backend = FtpBackend::new(
            "files.example.com".into(),
            21,
            "anon".into(),
            String::new(),
            "/pub".into(),
        );
        assert_eq!(backend.kind(), "ftp");
    }

    #[tokio::test]
    async fn unreachable_server_is_a_connection_error() {
        // TEST-NET-1 address, guaranteed unroutable.
        let backend = FtpBackend::new(
            "192.0.2.1".into(),
            21,
            "anon".into(),
            String::new(),
            "/pub".into(),
        );
        let err = backend.test_connection().await.unwrap_err();
        assert!(err.is_retryable());
    }
}
