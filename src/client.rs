use std::{
    fs,
    path::{Path, PathBuf},
};
use tracing::{debug, warn};
use url::Url;

use crate::{
    endpoint::{Endpoint, Operation},
    providers::Provider,
    transfer::{
        fetch_preview, sanitize_file_name, stream_download, stream_upload, CancelToken,
        ClientConfig, DownloadResult, PreviewResult, ProgressListener, TransferHooks, Transport,
        UploadResult,
    },
    AnonError, Result,
};

/// 面向调用方的门面：组合 API 根地址、endpoint 模板与传输句柄。
///
/// 所有操作都不会修改 endpoint 或根地址，同一实例可以被顺序复用。
#[derive(Clone, Debug)]
pub struct AnonPy {
    base_url: Url,
    endpoint: Endpoint,
    transport: Transport,
}

impl AnonPy {
    pub fn new(base_url: &str, endpoint: Endpoint, config: ClientConfig) -> Result<Self> {
        let parsed = Url::parse(base_url)
            .map_err(|e| AnonError::Config(format!("invalid api url {base_url:?}: {e}")))?;
        Self::with_url(parsed, endpoint, config)
    }

    pub fn with_url(base_url: Url, endpoint: Endpoint, config: ClientConfig) -> Result<Self> {
        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(AnonError::Config(format!(
                "api url {base_url} must use http or https"
            )));
        }
        if base_url.scheme() == "http" && config.token.is_some() {
            warn!(
                %base_url,
                "basic credentials are only base64-encoded and will be sent over plain http"
            );
        }
        let transport = Transport::new(&config)?;
        Ok(Self {
            base_url,
            endpoint,
            transport,
        })
    }

    /// 使用内置服务商预设构建客户端。
    pub fn for_provider(provider: Provider, config: ClientConfig) -> Result<Self> {
        Self::new(provider.api_url(), provider.endpoint()?, config)
    }

    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    pub fn endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    pub fn resolve(&self, operation: Operation, identifier: Option<&str>) -> Result<Url> {
        self.endpoint.resolve(&self.base_url, operation, identifier)
    }

    pub fn preview(&self, identifier: &str) -> Result<PreviewResult> {
        let url = self.resolve(Operation::Preview, Some(identifier))?;
        fetch_preview(&self.transport, url)
    }

    /// 下载资源。文件名优先取 `options.file_name`，其次取服务商元数据中的 `name`，
    /// 最后退回到标识符本身。
    pub fn download(&self, identifier: &str, options: DownloadOptions) -> Result<DownloadResult> {
        let url = self.resolve(Operation::Download, Some(identifier))?;
        let DownloadOptions {
            directory,
            file_name,
            overwrite,
            hooks,
        } = options;

        let file_name = self.choose_file_name(identifier, file_name)?;
        let directory = directory.unwrap_or_else(|| PathBuf::from("."));
        fs::create_dir_all(&directory)?;
        let destination = directory.join(file_name);

        stream_download(&self.transport, url, &destination, overwrite, hooks)
    }

    pub fn upload(&self, source: impl AsRef<Path>, options: UploadOptions) -> Result<UploadResult> {
        let url = self.resolve(Operation::Upload, None)?;
        let mut result = stream_upload(
            &self.transport,
            url,
            source.as_ref(),
            self.endpoint.upload_encoding(),
            options.hooks,
        )?;
        result.download_url = self
            .resolve(Operation::Download, Some(&result.identifier))
            .ok();
        result.preview_url = self
            .resolve(Operation::Preview, Some(&result.identifier))
            .ok();
        Ok(result)
    }

    fn choose_file_name(&self, identifier: &str, requested: Option<String>) -> Result<String> {
        if let Some(name) = requested {
            return Ok(sanitize_file_name(&name, identifier));
        }
        match self.preview(identifier) {
            Ok(preview) => Ok(sanitize_file_name(
                preview.name().unwrap_or_default(),
                identifier,
            )),
            Err(AnonError::Provider { status, message }) => {
                debug!(
                    ?status,
                    %message,
                    "preview unavailable, naming download after its identifier"
                );
                Ok(sanitize_file_name(identifier, identifier))
            }
            Err(err) => Err(err),
        }
    }
}

/// `download` 的可选参数。
#[derive(Default)]
pub struct DownloadOptions {
    pub directory: Option<PathBuf>,
    pub file_name: Option<String>,
    pub overwrite: bool,
    pub hooks: TransferHooks,
}

impl DownloadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn directory(mut self, directory: impl Into<PathBuf>) -> Self {
        self.directory = Some(directory.into());
        self
    }

    pub fn file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = Some(file_name.into());
        self
    }

    pub fn overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn progress(mut self, listener: impl ProgressListener + 'static) -> Self {
        self.hooks = self.hooks.with_progress(listener);
        self
    }

    pub fn cancel(mut self, token: CancelToken) -> Self {
        self.hooks = self.hooks.with_cancel(token);
        self
    }
}

/// `upload` 的可选参数。
#[derive(Default)]
pub struct UploadOptions {
    pub hooks: TransferHooks,
}

impl UploadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn progress(mut self, listener: impl ProgressListener + 'static) -> Self {
        self.hooks = self.hooks.with_progress(listener);
        self
    }

    pub fn cancel(mut self, token: CancelToken) -> Self {
        self.hooks = self.hooks.with_cancel(token);
        self
    }
}
