use directories::UserDirs;
use std::{
    env,
    path::{Path, PathBuf},
};

/// 系统下载目录（没有则用主目录）下的 `anonpy` 子目录；都无法解析时使用当前目录。
pub fn default_download_directory() -> PathBuf {
    if let Some(user_dirs) = UserDirs::new() {
        let base = user_dirs.download_dir().unwrap_or(user_dirs.home_dir());
        return base.join("anonpy");
    }
    env::current_dir().unwrap_or_else(|_| PathBuf::from("."))
}

/// 配置值优先；以 `~` 开头的路径展开为主目录。
pub fn resolve_download_directory(configured: Option<&Path>) -> PathBuf {
    match configured {
        Some(path) if !path.as_os_str().is_empty() => expand_home(path),
        _ => default_download_directory(),
    }
}

fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match UserDirs::new() {
        Some(user_dirs) => user_dirs.home_dir().join(rest),
        None => path.to_path_buf(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configured_directory_wins() {
        let configured = Path::new("/srv/downloads");
        assert_eq!(
            resolve_download_directory(Some(configured)),
            PathBuf::from("/srv/downloads")
        );
    }

    #[test]
    fn test_empty_directory_falls_back_to_default() {
        assert_eq!(
            resolve_download_directory(Some(Path::new(""))),
            default_download_directory()
        );
        assert_eq!(resolve_download_directory(None), default_download_directory());
    }

    #[test]
    fn test_tilde_expands_to_home() {
        if let Some(user_dirs) = UserDirs::new() {
            assert_eq!(
                resolve_download_directory(Some(Path::new("~/downloads"))),
                user_dirs.home_dir().join("downloads")
            );
        }
    }
}
