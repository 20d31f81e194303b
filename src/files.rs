//! Remote file listing and download.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tempfile::NamedTempFile;
use tracing::{info, warn};

use crate::error::{BridgeError, CallError};
use crate::transport::wire::{FileListing, RemoteFile};
use crate::transport::HttpTransport;
use crate::validation::validate_file_name;

/// A file saved under the local save directory.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadedFile {
    pub local_path: PathBuf,
    pub size_bytes: u64,
    pub saved_at: DateTime<Utc>,
}

pub struct FileRetrieval<'a> {
    transport: &'a HttpTransport,
    save_dir: &'a Path,
    list_timeout: Duration,
    download_timeout: Duration,
}

impl<'a> FileRetrieval<'a> {
    pub fn new(
        transport: &'a HttpTransport,
        save_dir: &'a Path,
        list_timeout: Duration,
        download_timeout: Duration,
    ) -> Self {
        Self {
            transport,
            save_dir,
            list_timeout,
            download_timeout,
        }
    }

    pub fn list_files(&self, path: &str) -> Result<Vec<RemoteFile>, BridgeError> {
        let deadline = self.list_timeout + self.transport.grace();
        let listing: FileListing = self
            .transport
            .get_json("/files", &[("path", path)], deadline)?;
        Ok(listing.into_files())
    }

    /// Stream `remote_path` into the save directory as `local_name`, or as the
    /// remote basename. Nothing is left behind if the transfer fails.
    pub fn download(
        &self,
        remote_path: &str,
        local_name: Option<&str>,
    ) -> Result<DownloadedFile, BridgeError> {
        let name = match local_name.filter(|n| !n.is_empty()) {
            Some(name) => name.to_string(),
            None => remote_basename(remote_path).ok_or_else(|| {
                BridgeError::invalid(format!("cannot derive a file name from '{remote_path}'"))
            })?,
        };
        validate_file_name(&name).map_err(|e| BridgeError::invalid(e.to_string()))?;

        fs::create_dir_all(self.save_dir).map_err(|e| download_error(self.save_dir, e))?;
        let local_path = self.save_dir.join(&name);

        let deadline = self.download_timeout + self.transport.grace();
        let mut response = self
            .transport
            .get_stream("/download", &[("path", remote_path)], deadline)
            .map_err(|e| match e {
                CallError::Remote { status: 404, .. } => BridgeError::Download {
                    reason: format!("file not found: {remote_path}"),
                },
                other => BridgeError::Download {
                    reason: other.to_string(),
                },
            })?;

        let mut temp =
            NamedTempFile::new_in(self.save_dir).map_err(|e| download_error(self.save_dir, e))?;
        let size_bytes = io::copy(&mut response, temp.as_file_mut())
            .and_then(|n| temp.as_file_mut().flush().map(|()| n))
            .map_err(|e| {
                warn!(remote_path, error = %e, "download interrupted");
                BridgeError::Download {
                    reason: format!("transfer of {remote_path} failed: {e}"),
                }
            })?;

        temp.persist(&local_path)
            .map_err(|e| download_error(&local_path, e.error))?;

        info!(remote_path, local_path = %local_path.display(), size_bytes, "downloaded");
        Ok(DownloadedFile {
            local_path,
            size_bytes,
            saved_at: Utc::now(),
        })
    }
}

fn remote_basename(remote_path: &str) -> Option<String> {
    remote_path
        .trim_end_matches('/')
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .map(str::to_string)
}

fn download_error(path: &Path, err: io::Error) -> BridgeError {
    BridgeError::Download {
        reason: format!("cannot write {}: {err}", path.display()),
    }
}
