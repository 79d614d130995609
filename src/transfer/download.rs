use std::{
    fs::{self, File, OpenOptions},
    io::{self, BufWriter, Read, Write},
    path::{Path, PathBuf},
    time::Instant,
};
use tracing::{debug, warn};
use url::Url;
use uuid::Uuid;

use super::{
    http::{ensure_success, request_error, Transport},
    models::DownloadResult,
    progress::{is_cancelled, ProgressTracker, TransferHooks},
};
use crate::{endpoint::Operation, AnonError, Result};

const CHUNK_SIZE: usize = 64 * 1024;
const FALLBACK_FILE_NAME: &str = "download.bin";

/// 流式下载到 `destination`。
///
/// - 目标已存在且 `overwrite=false` 时，在发起请求前返回 `DestinationExists`；
/// - 数据先写入同目录下的隐藏 part 文件，完成后再重命名为目标文件；
/// - 任何失败（状态码、断线、取消、本地写入）都会删除 part 文件，已有文件保持不变。
pub fn stream_download(
    transport: &Transport,
    url: Url,
    destination: &Path,
    overwrite: bool,
    hooks: TransferHooks,
) -> Result<DownloadResult> {
    if destination.is_dir() || (destination.exists() && !overwrite) {
        return Err(AnonError::DestinationExists(destination.to_path_buf()));
    }

    let TransferHooks { progress, cancel } = hooks;
    if is_cancelled(cancel.as_ref()) {
        return Err(AnonError::Cancelled);
    }

    let started = Instant::now();
    debug!(%url, destination = %destination.display(), "starting download");
    let response = transport.client.get(url).send().map_err(request_error)?;
    let mut response = ensure_success(response)?;
    let expected_size = response.content_length();

    let mut part = PartFile::create(destination)?;
    let mut tracker = ProgressTracker::new(Operation::Download, expected_size, progress);
    let mut buffer = vec![0u8; CHUNK_SIZE];
    let mut written: u64 = 0;

    loop {
        if is_cancelled(cancel.as_ref()) {
            debug!(written, "download cancelled");
            return Err(AnonError::Cancelled);
        }
        let read_bytes = match response.read(&mut buffer) {
            Ok(0) => break,
            Ok(n) => n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => {
                return Err(AnonError::Network(format!(
                    "connection lost after {written} bytes: {err}"
                )))
            }
        };
        part.write_all(&buffer[..read_bytes])?;
        written += read_bytes as u64;
        tracker.report(written);
        if transport.transfer_expired(started.elapsed()) {
            return Err(AnonError::Network(format!(
                "transfer time limit exceeded after {written} bytes"
            )));
        }
    }

    if is_cancelled(cancel.as_ref()) {
        return Err(AnonError::Cancelled);
    }
    drop(response);
    part.commit(destination, overwrite)?;
    tracker.finish(written);

    let elapsed = started.elapsed();
    debug!(bytes = written, ?elapsed, "download finished");
    Ok(DownloadResult {
        path: destination.to_path_buf(),
        bytes: written,
        expected_size,
        elapsed,
    })
}

/// 把服务商返回的文件名清理为安全的本地文件名；
/// 清理后为空时使用 `fallback`，仍不可用则使用 `download.bin`。
pub fn sanitize_file_name(raw: &str, fallback: &str) -> String {
    clean_name(raw)
        .or_else(|| clean_name(fallback))
        .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string())
}

fn clean_name(raw: &str) -> Option<String> {
    let sanitized: String = raw
        .trim()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            _ => c,
        })
        .collect();

    let final_name = sanitized.trim();
    if final_name.is_empty() || final_name == "." || final_name == ".." {
        None
    } else {
        Some(final_name.to_string())
    }
}

/// 下载过程中的临时文件。未提交就被丢弃时自动删除。
struct PartFile {
    path: PathBuf,
    writer: Option<BufWriter<File>>,
    committed: bool,
}

impl PartFile {
    fn create(destination: &Path) -> Result<Self> {
        let file_name = destination.file_name().ok_or_else(|| {
            AnonError::Io(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("destination {} has no file name", destination.display()),
            ))
        })?;
        let parent = destination
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .unwrap_or_else(|| Path::new("."));
        let path = parent.join(format!(
            ".{}.{}.part",
            file_name.to_string_lossy(),
            Uuid::new_v4().simple()
        ));
        let file = OpenOptions::new().write(true).create_new(true).open(&path)?;
        Ok(Self {
            path,
            writer: Some(BufWriter::new(file)),
            committed: false,
        })
    }

    fn write_all(&mut self, chunk: &[u8]) -> Result<()> {
        match self.writer.as_mut() {
            Some(writer) => Ok(writer.write_all(chunk)?),
            None => Err(AnonError::Io(io::Error::new(
                io::ErrorKind::Other,
                "part file already closed",
            ))),
        }
    }

    fn commit(mut self, destination: &Path, overwrite: bool) -> Result<()> {
        if let Some(mut writer) = self.writer.take() {
            writer.flush()?;
            writer.get_ref().sync_all()?;
        }
        if !overwrite && destination.exists() {
            return Err(AnonError::DestinationExists(destination.to_path_buf()));
        }
        fs::rename(&self.path, destination)?;
        self.committed = true;
        Ok(())
    }
}

impl Drop for PartFile {
    fn drop(&mut self) {
        self.writer.take();
        if self.committed {
            return;
        }
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(path = %self.path.display(), "failed to remove partial download: {err}");
            }
        }
    }
}
