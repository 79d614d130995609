use serde_json::{Map, Value};
use std::path::PathBuf;
use std::time::Duration;
use url::Url;

/// 预览接口返回的元数据。服务商字段各不相同，这里保留原始键值，
/// 只对常用字段提供带存在性检查的访问器。
#[derive(Clone, Debug, PartialEq, Default)]
pub struct PreviewResult {
    fields: Map<String, Value>,
}

impl PreviewResult {
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &Map<String, Value> {
        &self.fields
    }

    pub fn into_fields(self) -> Map<String, Value> {
        self.fields
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    pub fn name(&self) -> Option<&str> {
        self.fields
            .get("name")
            .and_then(Value::as_str)
            .filter(|name| !name.trim().is_empty())
    }

    /// 兼容数字与数字字符串两种写法。
    pub fn size(&self) -> Option<u64> {
        self.fields.get("size").and_then(value_as_u64)
    }

    pub fn identifier(&self) -> Option<String> {
        self.fields.get("id").and_then(value_as_string)
    }

    pub fn sha256(&self) -> Option<&str> {
        self.fields
            .get("hash_sha256")
            .and_then(Value::as_str)
            .filter(|hash| !hash.is_empty())
    }
}

/// 下载完成后的结果描述：保存路径、实际字节数与耗时。
#[derive(Clone, Debug, PartialEq)]
pub struct DownloadResult {
    pub path: PathBuf,
    pub bytes: u64,
    pub expected_size: Option<u64>,
    pub elapsed: Duration,
}

/// 上传结果。`url` 来自响应体（若服务商提供），
/// `download_url`/`preview_url` 由客户端根据 endpoint 推导。
#[derive(Clone, Debug, PartialEq)]
pub struct UploadResult {
    pub identifier: String,
    pub url: Option<String>,
    pub download_url: Option<Url>,
    pub preview_url: Option<Url>,
    pub bytes: u64,
    pub elapsed: Duration,
    pub fields: Map<String, Value>,
}

pub(crate) fn value_as_u64(value: &Value) -> Option<u64> {
    match value {
        Value::Number(number) => number.as_u64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

pub(crate) fn value_as_string(value: &Value) -> Option<String> {
    match value {
        Value::String(text) if !text.trim().is_empty() => Some(text.clone()),
        Value::Number(number) => Some(number.to_string()),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn preview(value: Value) -> PreviewResult {
        match value {
            Value::Object(fields) => PreviewResult::from_fields(fields),
            other => panic!("not an object: {other}"),
        }
    }

    #[test]
    fn test_preview_accessors() {
        let result = preview(json!({
            "id": "1tdWj9g2",
            "name": "inkscape.exe",
            "size": 453281,
            "hash_sha256": "f11f45487f5e04f161de1691e8b3baa718bc99b210c70735503a4a43eb26cba0",
            "downloads": 1
        }));
        assert_eq!(result.name(), Some("inkscape.exe"));
        assert_eq!(result.size(), Some(453281));
        assert_eq!(result.identifier().as_deref(), Some("1tdWj9g2"));
        assert!(result.sha256().is_some());
        assert_eq!(result.get("downloads"), Some(&json!(1)));
    }

    #[test]
    fn test_preview_missing_fields_degrade_to_none() {
        let result = preview(json!({ "name": "", "size": "n/a", "id": null }));
        assert_eq!(result.name(), None);
        assert_eq!(result.size(), None);
        assert_eq!(result.identifier(), None);
        assert_eq!(result.sha256(), None);
    }

    #[test]
    fn test_preview_size_from_string() {
        let result = preview(json!({ "size": " 2048 ", "id": 42 }));
        assert_eq!(result.size(), Some(2048));
        assert_eq!(result.identifier().as_deref(), Some("42"));
    }
}
