use base64::{engine::general_purpose::STANDARD, Engine as _};
use once_cell::sync::Lazy;
use reqwest::{
    blocking::{Client, Response},
    header::{HeaderMap, HeaderValue, AUTHORIZATION},
    redirect::Policy,
    Proxy, StatusCode,
};
use serde_json::{Map, Value};
use std::time::Duration;

use crate::{AnonError, Result};

/// 默认 User-Agent：包名/版本 + 操作系统/架构。
pub static DEFAULT_USER_AGENT: Lazy<String> = Lazy::new(|| {
    format!(
        "{}/{} {}/{}",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        std::env::consts::OS,
        std::env::consts::ARCH
    )
});

const ERROR_BODY_PREVIEW_CHARS: usize = 200;

/// 未配置 `transfer` 时，上传请求按这个最低速率放宽等待时间。
const MIN_UPLOAD_BYTES_PER_SEC: u64 = 64 * 1024;

/// 请求超时设置。
///
/// - `connect`：每次建立连接的上限；
/// - `read`：等待响应头以及每次读取响应体的上限，预览请求整体也受它约束；
/// - `transfer`：一次完整上传/下载的上限，`None` 表示不限制。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Timeout {
    pub connect: Duration,
    pub read: Duration,
    pub transfer: Option<Duration>,
}

impl Default for Timeout {
    fn default() -> Self {
        Self {
            connect: Duration::from_secs(5),
            read: Duration::from_secs(5),
            transfer: None,
        }
    }
}

/// 构建传输层所需的全部参数。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    pub timeout: Timeout,
    pub user_agent: String,
    /// 以 HTTP Basic 方式发送的凭据（`user:password` 形式，原样编码）。
    pub token: Option<String>,
    pub proxy: Option<String>,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            timeout: Timeout::default(),
            user_agent: DEFAULT_USER_AGENT.clone(),
            token: None,
            proxy: None,
        }
    }
}

/// 可复用的阻塞式 HTTP 传输句柄，由 `AnonPy` 独占持有。
/// 支持顺序复用，不保证多线程并发调用安全。
#[derive(Clone, Debug)]
pub struct Transport {
    pub(crate) client: Client,
    pub(crate) timeout: Timeout,
}

impl Transport {
    pub fn new(config: &ClientConfig) -> Result<Self> {
        Ok(Self {
            client: build_blocking_client(config)?,
            timeout: config.timeout,
        })
    }

    /// 上传请求的整体时限。阻塞客户端把请求体发送与等待响应头算作一次等待，
    /// 因此按文件大小在 `read` 之上追加发送时间。
    pub(crate) fn upload_timeout(&self, size: u64) -> Duration {
        match self.timeout.transfer {
            Some(limit) => limit,
            None => {
                self.timeout
                    .read
                    .saturating_add(Duration::from_secs(size / MIN_UPLOAD_BYTES_PER_SEC))
            }
        }
    }

    /// 下载已超出 `transfer` 上限时返回 `true`。
    pub(crate) fn transfer_expired(&self, elapsed: Duration) -> bool {
        self.timeout.transfer.is_some_and(|limit| elapsed > limit)
    }
}

/// 构建一个带有统一超时、重定向策略与默认请求头的阻塞式 HTTP 客户端。
fn build_blocking_client(config: &ClientConfig) -> Result<Client> {
    let mut headers = HeaderMap::new();
    if let Some(token) = config.token.as_deref().filter(|t| !t.is_empty()) {
        let encoded = STANDARD.encode(token.as_bytes());
        let mut value = HeaderValue::from_str(&format!("Basic {encoded}"))
            .map_err(|e| AnonError::Config(format!("token cannot be sent as a header: {e}")))?;
        value.set_sensitive(true);
        headers.insert(AUTHORIZATION, value);
    }

    let mut builder = Client::builder()
        .user_agent(config.user_agent.clone())
        .default_headers(headers)
        .connect_timeout(config.timeout.connect)
        .timeout(config.timeout.read)
        .redirect(Policy::limited(10));

    if let Some(proxy) = config.proxy.as_deref().filter(|p| !p.trim().is_empty()) {
        let proxy = Proxy::all(proxy)
            .map_err(|e| AnonError::Config(format!("invalid proxy {proxy:?}: {e}")))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| AnonError::Config(format!("failed to build HTTP client: {e}")))
}

/// 将 reqwest 的错误归类为网络错误或服务商错误。
pub(crate) fn request_error(err: reqwest::Error) -> AnonError {
    if err.is_timeout() {
        AnonError::Network(format!("request timed out: {err}"))
    } else if err.is_connect() {
        AnonError::Network(format!("connection failed: {err}"))
    } else if let Some(status) = err.status() {
        AnonError::provider(Some(status.as_u16()), err.to_string())
    } else if err.is_decode() {
        AnonError::provider(None, format!("failed to decode response: {err}"))
    } else {
        AnonError::Network(err.to_string())
    }
}

/// 非 2xx 状态统一转换为 `Provider` 错误，并尽量从响应体中提取说明。
pub(crate) fn ensure_success(response: Response) -> Result<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response.text().unwrap_or_default();
    Err(AnonError::provider(
        Some(status.as_u16()),
        describe_failure(status, &body),
    ))
}

/// 宽松解析：先得到通用键值映射，未知字段全部保留。
/// 响应体声明 `"success": false` 时即使状态码成功也视为失败。
pub(crate) fn decode_object(response: Response) -> Result<Map<String, Value>> {
    let status = response.status().as_u16();
    let body = response.text().map_err(request_error)?;
    let value: Value = serde_json::from_str(&body).map_err(|e| {
        AnonError::provider(Some(status), format!("response body is not valid JSON: {e}"))
    })?;
    let Value::Object(fields) = value else {
        return Err(AnonError::provider(
            Some(status),
            "response body is not a JSON object",
        ));
    };
    if fields.get("success").and_then(Value::as_bool) == Some(false) {
        let message = message_of(&fields).unwrap_or("provider reported failure");
        return Err(AnonError::provider(Some(status), message));
    }
    Ok(fields)
}

fn describe_failure(status: StatusCode, body: &str) -> String {
    let parsed = serde_json::from_str::<Value>(body).ok();
    if let Some(message) = parsed.as_ref().and_then(Value::as_object).and_then(message_of) {
        return message.to_string();
    }
    let trimmed = body.trim();
    if !trimmed.is_empty() {
        return trimmed.chars().take(ERROR_BODY_PREVIEW_CHARS).collect();
    }
    status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string()
}

fn message_of(fields: &Map<String, Value>) -> Option<&str> {
    ["message", "value"]
        .iter()
        .find_map(|key| fields.get(*key).and_then(Value::as_str))
        .filter(|message| !message.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_user_agent_names_package() {
        assert!(DEFAULT_USER_AGENT.starts_with("anonpy/"));
        assert!(DEFAULT_USER_AGENT.contains(std::env::consts::OS));
    }

    #[test]
    fn test_describe_failure_prefers_message() {
        let body = r#"{"success": false, "value": "not_found", "message": "The entity you requested could not be found"}"#;
        assert_eq!(
            describe_failure(StatusCode::NOT_FOUND, body),
            "The entity you requested could not be found"
        );
        let body = r#"{"success": false, "value": "file_not_found"}"#;
        assert_eq!(describe_failure(StatusCode::NOT_FOUND, body), "file_not_found");
    }

    #[test]
    fn test_describe_failure_falls_back_to_body_and_reason() {
        assert_eq!(
            describe_failure(StatusCode::BAD_GATEWAY, "upstream down\n"),
            "upstream down"
        );
        assert_eq!(describe_failure(StatusCode::NOT_FOUND, ""), "Not Found");
    }

    #[test]
    fn test_invalid_proxy_is_config_error() {
        let config = ClientConfig {
            proxy: Some("::not a proxy::".to_string()),
            ..ClientConfig::default()
        };
        assert!(matches!(Transport::new(&config), Err(AnonError::Config(_))));
    }

    #[test]
    fn test_upload_timeout_scales_with_size() {
        let transport = Transport::new(&ClientConfig::default()).unwrap();
        assert_eq!(transport.upload_timeout(0), Duration::from_secs(5));
        assert_eq!(
            transport.upload_timeout(10 * MIN_UPLOAD_BYTES_PER_SEC),
            Duration::from_secs(15)
        );
        assert!(!transport.transfer_expired(Duration::from_secs(3600)));

        let config = ClientConfig {
            timeout: Timeout {
                transfer: Some(Duration::from_secs(60)),
                ..Timeout::default()
            },
            ..ClientConfig::default()
        };
        let transport = Transport::new(&config).unwrap();
        assert_eq!(transport.upload_timeout(u64::MAX), Duration::from_secs(60));
        assert!(transport.transfer_expired(Duration::from_secs(61)));
    }
}
