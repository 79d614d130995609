use reqwest::header::ACCEPT;
use tracing::debug;
use url::Url;

use super::{
    http::{decode_object, ensure_success, request_error, Transport},
    models::PreviewResult,
};
use crate::Result;

/// 仅请求元数据，不下载文件内容。整个请求受 `Timeout::read` 约束。
pub fn fetch_preview(transport: &Transport, url: Url) -> Result<PreviewResult> {
    debug!(%url, "fetching preview");
    let response = transport
        .client
        .get(url)
        .header(ACCEPT, "application/json")
        .timeout(transport.timeout.read)
        .send()
        .map_err(request_error)?;

    let response = ensure_success(response)?;
    let fields = decode_object(response)?;
    debug!(fields = fields.len(), "preview decoded");
    Ok(PreviewResult::from_fields(fields))
}
