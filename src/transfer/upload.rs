use reqwest::{
    blocking::{multipart, Body},
    header::{ACCEPT, CONTENT_TYPE},
};
use serde_json::{Map, Value};
use std::{
    fs::File,
    path::Path,
    sync::{Arc, Mutex},
    time::Instant,
};
use tracing::debug;
use url::Url;

use super::{
    http::{decode_object, ensure_success, request_error, Transport},
    models::{value_as_string, UploadResult},
    progress::{is_cancelled, ProgressReader, ProgressTracker, TransferHooks},
};
use crate::{
    endpoint::{Operation, UploadEncoding},
    AnonError, Result,
};

const IDENTIFIER_KEYS: [&str; 3] = ["id", "identifier", "file_id"];
const URL_KEYS: [&str; 2] = ["url", "link"];

/// 流式上传本地文件。源文件不可用时在任何网络请求之前返回 `SourceNotFound`。
///
/// 请求体编码由 `encoding` 决定：multipart 走 `POST`，raw 走 `PUT`。
pub fn stream_upload(
    transport: &Transport,
    url: Url,
    source: &Path,
    encoding: &UploadEncoding,
    hooks: TransferHooks,
) -> Result<UploadResult> {
    let (file, size) = open_source(source)?;

    let TransferHooks { progress, cancel } = hooks;
    if is_cancelled(cancel.as_ref()) {
        return Err(AnonError::Cancelled);
    }

    let tracker = Arc::new(Mutex::new(ProgressTracker::new(
        Operation::Upload,
        Some(size),
        progress,
    )));
    let reader = ProgressReader::new(file, tracker.clone(), cancel.clone());

    let started = Instant::now();
    debug!(%url, source = %source.display(), size, "starting upload");
    let request = match encoding {
        UploadEncoding::Multipart { field } => {
            let file_name = source
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_else(|| "upload.bin".to_string());
            let part = multipart::Part::reader_with_length(reader, size)
                .file_name(file_name)
                .mime_str("application/octet-stream")
                .map_err(request_error)?;
            let form = multipart::Form::new().part(field.clone(), part);
            transport.client.post(url).multipart(form)
        }
        UploadEncoding::Raw => transport
            .client
            .put(url)
            .header(CONTENT_TYPE, "application/octet-stream")
            .body(Body::sized(reader, size)),
    };

    let response = request
        .header(ACCEPT, "application/json")
        .timeout(transport.upload_timeout(size))
        .send()
        .map_err(|err| {
            if is_cancelled(cancel.as_ref()) {
                AnonError::Cancelled
            } else {
                request_error(err)
            }
        })?;
    let response = ensure_success(response)?;
    let fields = decode_object(response)?;

    let identifier = first_string(&fields, &IDENTIFIER_KEYS).ok_or_else(|| {
        AnonError::provider(None, "upload response did not contain a resource identifier")
    })?;
    let url = first_string(&fields, &URL_KEYS);

    if let Ok(mut tracker) = tracker.lock() {
        tracker.finish(size);
    }

    let elapsed = started.elapsed();
    debug!(%identifier, ?elapsed, "upload finished");
    Ok(UploadResult {
        identifier,
        url,
        download_url: None,
        preview_url: None,
        bytes: size,
        elapsed,
        fields,
    })
}

fn open_source(source: &Path) -> Result<(File, u64)> {
    let not_found = || AnonError::SourceNotFound(source.to_path_buf());
    let file = File::open(source).map_err(|_| not_found())?;
    let metadata = file.metadata().map_err(|_| not_found())?;
    if !metadata.is_file() {
        return Err(not_found());
    }
    Ok((file, metadata.len()))
}

fn first_string(fields: &Map<String, Value>, keys: &[&str]) -> Option<String> {
    keys.iter()
        .find_map(|key| fields.get(*key).and_then(value_as_string))
}
