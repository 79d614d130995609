use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// 所有公开操作共用的错误分类，调用方据此决定提示文案与退出码。
#[derive(Error, Debug)]
pub enum AnonError {
    /// endpoint 模板不合法，或调用时标识符与模板槽位不匹配。
    #[error("endpoint template error: {0}")]
    Template(String),

    /// 上传源文件不存在或不可读，发生在任何网络请求之前。
    #[error("source file not found or unreadable: {}", .0.display())]
    SourceNotFound(PathBuf),

    /// 目标位置已有同名文件且未允许覆盖。
    #[error("destination already exists: {} (use overwrite to replace it)", .0.display())]
    DestinationExists(PathBuf),

    /// 连接失败、连接中断或超时。
    #[error("network error: {0}")]
    Network(String),

    /// 服务端返回失败状态，或成功响应的内容无法解析。
    #[error("{}", provider_message(.status, .message))]
    Provider {
        status: Option<u16>,
        message: String,
    },

    #[error("transfer cancelled")]
    Cancelled,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("history storage error: {0}")]
    Storage(String),
}

impl AnonError {
    pub(crate) fn provider(status: Option<u16>, message: impl Into<String>) -> Self {
        AnonError::Provider {
            status,
            message: message.into(),
        }
    }
}

fn provider_message(status: &Option<u16>, message: &str) -> String {
    match status {
        Some(code) => format!("provider returned HTTP {code}: {message}"),
        None => format!("provider error: {message}"),
    }
}

pub type Result<T> = std::result::Result<T, AnonError>;
