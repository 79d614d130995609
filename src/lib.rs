//! 面向匿名文件托管服务的通用客户端。
//!
//! 每个服务商只需要提供一组 URL 模板（[`Endpoint`]），即可通过 [`AnonPy`]
//! 完成预览、下载与上传；传输过程支持进度监听与取消。

pub mod checksum;
pub mod client;
pub mod db;
pub mod endpoint;
pub mod error;
pub mod providers;
pub mod settings;
pub mod transfer;

pub use client::{AnonPy, DownloadOptions, UploadOptions};
pub use endpoint::{Endpoint, Operation, UploadEncoding};
pub use error::{AnonError, Result};
pub use providers::Provider;
pub use transfer::{
    CancelToken, ClientConfig, DownloadResult, PreviewResult, ProgressEvent, ProgressListener,
    Timeout, TransferHooks, UploadResult,
};
