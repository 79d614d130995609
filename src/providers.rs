use std::fmt;

use crate::{endpoint::Endpoint, Result};

/// 内置的服务商预设。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Provider {
    PixelDrain,
}

impl Provider {
    pub const ALL: [Provider; 1] = [Provider::PixelDrain];

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|provider| provider.name().eq_ignore_ascii_case(name.trim()))
    }

    pub fn name(self) -> &'static str {
        match self {
            Provider::PixelDrain => "pixeldrain",
        }
    }

    pub fn api_url(self) -> &'static str {
        match self {
            Provider::PixelDrain => "https://pixeldrain.com/api/",
        }
    }

    pub fn endpoint(self) -> Result<Endpoint> {
        match self {
            Provider::PixelDrain => Endpoint::new("/file", "/file/{}", "/file/{}/info"),
        }
    }
}

/// PixelDrain 的 API 根地址与 endpoint。
pub fn pixeldrain() -> Result<(&'static str, Endpoint)> {
    let provider = Provider::PixelDrain;
    Ok((provider.api_url(), provider.endpoint()?))
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
