pub mod download_directory;

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use url::Url;

pub use download_directory::{default_download_directory, resolve_download_directory};

use crate::{
    endpoint::{Endpoint, UploadEncoding},
    providers::Provider,
    transfer::{ClientConfig, Timeout, DEFAULT_USER_AGENT},
    AnonError, Result,
};

const QUALIFIER: &str = "com";
const ORGANIZATION: &str = "anonpy";
const APPLICATION: &str = "anonpy";
const CONFIG_FILE_NAME: &str = "anonpy.toml";

/// anonpy 配置文件，对应 `[client]`、`[server]`、`[timeout]` 三个小节。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Settings {
    pub client: ClientSettings,
    pub server: ServerSettings,
    pub timeout: TimeoutSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientSettings {
    /// 下载目录，缺省时使用系统下载目录下的 `anonpy`。
    pub download_directory: Option<PathBuf>,
    pub token: Option<String>,
    pub user_agent: Option<String>,
    pub proxy: Option<String>,
    pub enable_logging: bool,
    pub log_level: String,
    pub verbose: bool,
    /// 下载时不提示直接覆盖同名文件。
    pub force: bool,
}

impl Default for ClientSettings {
    fn default() -> Self {
        Self {
            download_directory: None,
            token: None,
            user_agent: None,
            proxy: None,
            enable_logging: false,
            log_level: "info".to_string(),
            verbose: true,
            force: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EncodingKind {
    #[default]
    Multipart,
    Raw,
}

/// 服务商的 API 根地址与 endpoint 模板。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerSettings {
    pub api: String,
    pub upload: String,
    pub download: String,
    pub preview: String,
    pub upload_encoding: EncodingKind,
    pub upload_field: String,
}

impl Default for ServerSettings {
    fn default() -> Self {
        let provider = Provider::PixelDrain;
        Self {
            api: provider.api_url().to_string(),
            upload: "/file".to_string(),
            download: "/file/{}".to_string(),
            preview: "/file/{}/info".to_string(),
            upload_encoding: EncodingKind::Multipart,
            upload_field: "file".to_string(),
        }
    }
}

impl ServerSettings {
    pub fn from_provider(provider: Provider) -> Result<Self> {
        let endpoint = provider.endpoint()?;
        let (upload_encoding, upload_field) = match endpoint.upload_encoding() {
            UploadEncoding::Multipart { field } => (EncodingKind::Multipart, field.clone()),
            UploadEncoding::Raw => (EncodingKind::Raw, "file".to_string()),
        };
        Ok(Self {
            api: provider.api_url().to_string(),
            upload: endpoint.upload_path().to_string(),
            download: endpoint.download_path().to_string(),
            preview: endpoint.preview_path().to_string(),
            upload_encoding,
            upload_field,
        })
    }

    /// 校验模板并生成不可变的 `Endpoint`。
    pub fn endpoint(&self) -> Result<Endpoint> {
        let encoding = match self.upload_encoding {
            EncodingKind::Multipart => {
                let field = self.upload_field.trim();
                if field.is_empty() {
                    return Err(AnonError::Config("upload_field cannot be empty".into()));
                }
                UploadEncoding::Multipart {
                    field: field.to_string(),
                }
            }
            EncodingKind::Raw => UploadEncoding::Raw,
        };
        Ok(Endpoint::new(&self.upload, &self.download, &self.preview)?.with_upload_encoding(encoding))
    }

    pub fn api_url(&self) -> Result<Url> {
        Url::parse(self.api.trim())
            .map_err(|e| AnonError::Config(format!("invalid api url {:?}: {e}", self.api)))
    }
}

/// 超时设置，单位为秒，允许小数。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutSettings {
    pub connect_secs: f64,
    pub read_secs: f64,
    pub transfer_secs: Option<f64>,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        let timeout = Timeout::default();
        Self {
            connect_secs: timeout.connect.as_secs_f64(),
            read_secs: timeout.read.as_secs_f64(),
            transfer_secs: None,
        }
    }
}

impl TimeoutSettings {
    pub fn to_timeout(&self) -> Result<Timeout> {
        Ok(Timeout {
            connect: seconds("connect_secs", self.connect_secs)?,
            read: seconds("read_secs", self.read_secs)?,
            transfer: self
                .transfer_secs
                .map(|secs| seconds("transfer_secs", secs))
                .transpose()?,
        })
    }
}

fn seconds(name: &str, value: f64) -> Result<Duration> {
    if value <= 0.0 {
        return Err(AnonError::Config(format!("{name} must be positive")));
    }
    Duration::try_from_secs_f64(value)
        .map_err(|e| AnonError::Config(format!("{name} is not a valid duration: {e}")))
}

impl Settings {
    /// 配置文件默认路径：`<config dir>/anonpy.toml`。
    pub fn default_path() -> Result<PathBuf> {
        Ok(project_dirs()?.config_dir().join(CONFIG_FILE_NAME))
    }

    /// 读取配置；文件不存在时返回默认配置。
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Settings::default());
        }

        let content = fs::read_to_string(path)
            .map_err(|e| AnonError::Config(format!("failed to read config file: {e}")))?;

        toml::from_str(&content)
            .map_err(|e| AnonError::Config(format!("failed to parse config file: {e}")))
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent().filter(|dir| !dir.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                AnonError::Config(format!("failed to create config directory: {e}"))
            })?;
        }

        let content = toml::to_string_pretty(self)
            .map_err(|e| AnonError::Config(format!("failed to serialize config: {e}")))?;

        fs::write(path, content)
            .map_err(|e| AnonError::Config(format!("failed to write config file: {e}")))?;

        Ok(())
    }

    /// 用默认值覆盖配置文件。
    pub fn reset(path: &Path) -> Result<Self> {
        let settings = Settings::default();
        settings.save(path)?;
        Ok(settings)
    }

    pub fn client_config(&self) -> Result<ClientConfig> {
        Ok(ClientConfig {
            timeout: self.timeout.to_timeout()?,
            user_agent: self
                .client
                .user_agent
                .clone()
                .filter(|ua| !ua.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_USER_AGENT.clone()),
            token: self.client.token.clone().filter(|t| !t.is_empty()),
            proxy: self.client.proxy.clone().filter(|p| !p.trim().is_empty()),
        })
    }

    pub fn download_directory(&self) -> PathBuf {
        resolve_download_directory(self.client.download_directory.as_deref())
    }
}

pub(crate) fn project_dirs() -> Result<ProjectDirs> {
    ProjectDirs::from(QUALIFIER, ORGANIZATION, APPLICATION)
        .ok_or_else(|| AnonError::Config("failed to resolve application directories".into()))
}

/// 应用数据目录（历史记录与日志文件所在位置）。
pub fn data_dir() -> Result<PathBuf> {
    Ok(project_dirs()?.data_dir().to_path_buf())
}
