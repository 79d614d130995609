pub mod commands;
pub mod progress;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "anonpy")]
#[command(author, version, about = "匿名文件分享命令行工具", long_about = None)]
pub struct Cli {
    /// 配置文件路径（默认位于用户配置目录）
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// 用默认值重建配置文件
    #[arg(long)]
    pub reset_config: bool,

    /// 将日志写入数据目录下的 anonpy.log
    #[arg(long, global = true)]
    pub logging: bool,

    /// Basic 认证凭据（`user:password`，PixelDrain 为 `:api-key`）
    #[arg(long, global = true)]
    pub token: Option<String>,

    #[arg(long, global = true)]
    pub user_agent: Option<String>,

    /// 所有请求使用的代理地址
    #[arg(long, global = true)]
    pub proxy: Option<String>,

    /// 使用内置服务商预设（覆盖配置文件中的 [server]）
    #[arg(long, global = true)]
    pub provider: Option<String>,

    /// 不显示进度条与详细输出
    #[arg(short, long, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// 查看资源的元数据
    Preview {
        #[arg(required = true)]
        resource: Vec<String>,
    },

    /// 上传一个或多个文件
    Upload {
        #[arg(required = true)]
        file: Vec<PathBuf>,
    },

    /// 下载资源
    Download {
        #[arg(required_unless_present = "batch_file", conflicts_with = "batch_file")]
        resource: Vec<String>,

        /// 每行一个标识符；`#` 开头的行与空行被忽略
        #[arg(long)]
        batch_file: Option<PathBuf>,

        /// 下载目录（默认取配置文件）
        #[arg(short, long)]
        path: Option<PathBuf>,

        /// 覆盖同名文件，不再询问
        #[arg(short, long)]
        force: bool,

        /// 期望的 SHA-256 值；缺省时使用服务商提供的 hash_sha256
        #[arg(long)]
        checksum: Option<String>,
    },

    /// 查看或清空传输历史
    History {
        #[arg(short, long, default_value = "20")]
        limit: usize,

        #[arg(long)]
        clear: bool,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_download_requires_resource_or_batch_file() {
        assert!(Cli::try_parse_from(["anonpy", "download"]).is_err());
        assert!(Cli::try_parse_from(["anonpy", "download", "--batch-file", "ids.txt"]).is_ok());
        assert!(
            Cli::try_parse_from(["anonpy", "download", "abc", "--batch-file", "ids.txt"]).is_err()
        );
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::try_parse_from(["anonpy", "preview", "LNcXZ9UM", "--quiet"]).unwrap();
        assert!(cli.quiet);
        match cli.command {
            Some(Command::Preview { resource }) => assert_eq!(resource, vec!["LNcXZ9UM"]),
            other => panic!("unexpected command: {other:?}"),
        }
    }
}
