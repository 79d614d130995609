use percent_encoding::{utf8_percent_encode, AsciiSet, CONTROLS};
use serde::{Deserialize, Serialize};
use std::fmt;
use url::Url;

use crate::{AnonError, Result};

/// 模板中标识符的占位符。
pub const SLOT: &str = "{}";

/// 标识符只能落在单个路径段内，`/`、`?`、`#` 等都需要转义。
const SEGMENT: &AsciiSet = &CONTROLS
    .add(b' ')
    .add(b'"')
    .add(b'#')
    .add(b'%')
    .add(b'/')
    .add(b'<')
    .add(b'>')
    .add(b'?')
    .add(b'\\')
    .add(b'`')
    .add(b'{')
    .add(b'}');

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Operation {
    Upload,
    Download,
    Preview,
}

impl Operation {
    pub fn as_str(self) -> &'static str {
        match self {
            Operation::Upload => "upload",
            Operation::Download => "download",
            Operation::Preview => "preview",
        }
    }

    /// download/preview 需要一个标识符，upload 的标识符由服务端分配。
    pub fn takes_identifier(self) -> bool {
        !matches!(self, Operation::Upload)
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// 上传请求体的编码方式，不同服务商约定不同。
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum UploadEncoding {
    /// `POST` + `multipart/form-data`，文件放在指定字段里。
    Multipart { field: String },
    /// `PUT` + `application/octet-stream`，请求体即文件内容。
    Raw,
}

impl Default for UploadEncoding {
    fn default() -> Self {
        UploadEncoding::Multipart {
            field: "file".to_string(),
        }
    }
}

/// 某个服务商的三个相对路径模板。构造时即完成校验，之后不可变。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Endpoint {
    upload: String,
    download: String,
    preview: String,
    upload_encoding: UploadEncoding,
}

impl Endpoint {
    pub fn new(
        upload: impl Into<String>,
        download: impl Into<String>,
        preview: impl Into<String>,
    ) -> Result<Self> {
        let endpoint = Self {
            upload: upload.into(),
            download: download.into(),
            preview: preview.into(),
            upload_encoding: UploadEncoding::default(),
        };
        for operation in [Operation::Upload, Operation::Download, Operation::Preview] {
            validate_template(operation, endpoint.template(operation))?;
        }
        Ok(endpoint)
    }

    pub fn with_upload_encoding(mut self, encoding: UploadEncoding) -> Self {
        self.upload_encoding = encoding;
        self
    }

    pub fn upload_path(&self) -> &str {
        &self.upload
    }

    pub fn download_path(&self) -> &str {
        &self.download
    }

    pub fn preview_path(&self) -> &str {
        &self.preview
    }

    pub fn upload_encoding(&self) -> &UploadEncoding {
        &self.upload_encoding
    }

    pub fn template(&self, operation: Operation) -> &str {
        match operation {
            Operation::Upload => &self.upload,
            Operation::Download => &self.download,
            Operation::Preview => &self.preview,
        }
    }

    /// 把标识符代入模板并拼接到 `base` 之后，生成完整请求地址。
    pub fn resolve(&self, base: &Url, operation: Operation, identifier: Option<&str>) -> Result<Url> {
        let path = fill_template(operation, self.template(operation), identifier)?;
        let joined = format!("{}/{}", base.as_str().trim_end_matches('/'), &path[1..]);
        Url::parse(&joined).map_err(|e| {
            AnonError::Template(format!("{operation} url {joined:?} is not valid: {e}"))
        })
    }
}

fn validate_template(operation: Operation, template: &str) -> Result<()> {
    if template.is_empty() {
        return Err(AnonError::Template(format!("{operation} template is empty")));
    }
    if !template.starts_with('/') {
        return Err(AnonError::Template(format!(
            "{operation} template {template:?} must start with '/'"
        )));
    }
    let slots = template.matches(SLOT).count();
    let expected = usize::from(operation.takes_identifier());
    if slots != expected {
        return Err(AnonError::Template(format!(
            "{operation} template {template:?} has {slots} slot(s), expected {expected}"
        )));
    }
    Ok(())
}

fn fill_template(operation: Operation, template: &str, identifier: Option<&str>) -> Result<String> {
    validate_template(operation, template)?;
    match (operation.takes_identifier(), identifier) {
        (true, Some(id)) if !id.trim().is_empty() => {
            let encoded = utf8_percent_encode(id, SEGMENT).to_string();
            Ok(template.replacen(SLOT, &encoded, 1))
        }
        (true, _) => Err(AnonError::Template(format!(
            "{operation} requires a resource identifier"
        ))),
        (false, None) => Ok(template.to_string()),
        (false, Some(_)) => Err(AnonError::Template(format!(
            "{operation} does not take a resource identifier"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base() -> Url {
        Url::parse("https://mock.provider.com/api/").unwrap()
    }

    fn endpoint() -> Endpoint {
        Endpoint::new("/file", "/file/{}", "/file/{}/info").unwrap()
    }

    #[test]
    fn test_resolve_substitutes_identifier_once() {
        let url = endpoint()
            .resolve(&base(), Operation::Preview, Some("LNcXZ9UM"))
            .unwrap();
        assert_eq!(url.as_str(), "https://mock.provider.com/api/file/LNcXZ9UM/info");
        assert_eq!(url.as_str().matches("LNcXZ9UM").count(), 1);

        let url = endpoint()
            .resolve(&base(), Operation::Download, Some("LNcXZ9UM"))
            .unwrap();
        assert_eq!(url.as_str(), "https://mock.provider.com/api/file/LNcXZ9UM");
    }

    #[test]
    fn test_resolve_upload_without_identifier() {
        let url = endpoint().resolve(&base(), Operation::Upload, None).unwrap();
        assert_eq!(url.as_str(), "https://mock.provider.com/api/file");
    }

    #[test]
    fn test_resolve_base_without_trailing_slash() {
        let base = Url::parse("https://mock.provider.com/api").unwrap();
        let url = endpoint().resolve(&base, Operation::Upload, None).unwrap();
        assert_eq!(url.as_str(), "https://mock.provider.com/api/file");
    }

    #[test]
    fn test_resolve_rejects_slot_mismatch() {
        let ep = endpoint();
        assert!(matches!(
            ep.resolve(&base(), Operation::Download, None),
            Err(AnonError::Template(_))
        ));
        assert!(matches!(
            ep.resolve(&base(), Operation::Preview, Some("  ")),
            Err(AnonError::Template(_))
        ));
        assert!(matches!(
            ep.resolve(&base(), Operation::Upload, Some("abc")),
            Err(AnonError::Template(_))
        ));
    }

    #[test]
    fn test_identifier_stays_in_one_segment() {
        let url = endpoint()
            .resolve(&base(), Operation::Download, Some("a/b?c"))
            .unwrap();
        assert_eq!(url.path(), "/api/file/a%2Fb%3Fc");
    }

    #[test]
    fn test_identifier_is_not_trimmed() {
        let url = endpoint()
            .resolve(&base(), Operation::Download, Some(" abc"))
            .unwrap();
        assert_eq!(url.path(), "/api/file/%20abc");
    }

    #[test]
    fn test_malformed_templates_rejected() {
        let cases = [
            ("", "/file/{}", "/file/{}/info"),
            ("file", "/file/{}", "/file/{}/info"),
            ("/file/{}", "/file/{}", "/file/{}/info"),
            ("/file", "/file", "/file/{}/info"),
            ("/file", "/file/{}/{}", "/file/{}/info"),
            ("/file", "/file/{}", "file/{}/info"),
        ];
        for (upload, download, preview) in cases {
            let result = Endpoint::new(upload, download, preview);
            assert!(
                matches!(result, Err(AnonError::Template(_))),
                "expected template error for {upload:?} {download:?} {preview:?}"
            );
        }
    }

    #[test]
    fn test_upload_encoding_default_is_multipart() {
        assert_eq!(
            endpoint().upload_encoding(),
            &UploadEncoding::Multipart {
                field: "file".to_string()
            }
        );
        let raw = endpoint().with_upload_encoding(UploadEncoding::Raw);
        assert_eq!(raw.upload_encoding(), &UploadEncoding::Raw);
    }
}
