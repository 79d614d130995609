mod cli;

use anonpy::{
    settings::{self, ServerSettings, Settings},
    AnonError, CancelToken, Provider,
};
use anyhow::{anyhow, Context, Result};
use clap::{CommandFactory, Parser};
use colored::*;
use std::{fs::OpenOptions, process::ExitCode, sync::Mutex};
use tracing::{warn, Level};

use cli::{
    commands::{self, DownloadArgs, Session},
    Cli, Command,
};

const LOG_FILE_NAME: &str = "anonpy.log";

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{} {:#}", "ERROR:".red().bold(), err);
            ExitCode::from(exit_code(&err))
        }
    }
}

fn run(cli: Cli) -> Result<()> {
    let config_path = match &cli.config {
        Some(path) => path.clone(),
        None => Settings::default_path()?,
    };

    if cli.reset_config {
        Settings::reset(&config_path)?;
        println!(
            "{} configuration reset at {}",
            "✅".green(),
            config_path.display().to_string().blue().bold()
        );
        if cli.command.is_none() {
            return Ok(());
        }
    }

    let mut settings = Settings::load(&config_path)?;
    apply_overrides(&mut settings, &cli)?;

    if settings.client.enable_logging {
        init_logging(&settings.client.log_level)?;
    }

    let verbose = settings.client.verbose && !cli.quiet;
    let cancel = install_interrupt_handler();

    let Some(command) = cli.command else {
        Cli::command().print_help()?;
        return Ok(());
    };

    match command {
        Command::Preview { resource } => {
            let session = Session::new(&settings, verbose, cancel.clone())?;
            commands::preview(&session, &resource)?
        }
        Command::Upload { file } => {
            let session = Session::new(&settings, verbose, cancel.clone())?;
            commands::upload(&session, &file)?
        }
        Command::Download {
            resource,
            batch_file,
            path,
            force,
            checksum,
        } => {
            let resources = match batch_file {
                Some(batch) => commands::read_batch_file(&batch)?,
                None => resource,
            };
            let directory = match path {
                Some(path) => settings::resolve_download_directory(Some(&path)),
                None => settings.download_directory(),
            };
            let session = Session::new(&settings, verbose, cancel.clone())?;
            commands::download(
                &session,
                DownloadArgs {
                    resources,
                    directory,
                    force: force || settings.client.force,
                    checksum,
                },
            )?
        }
        Command::History { limit, clear } => commands::history(limit, clear)?,
    }

    Ok(())
}

/// Ctrl-C 只触发取消标记，由传输自行收尾并删除未完成的文件。
fn install_interrupt_handler() -> CancelToken {
    let cancel = CancelToken::new();
    let trigger = cancel.clone();
    if let Err(e) = ctrlc::set_handler(move || trigger.cancel()) {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }
    cancel
}

/// 命令行参数优先于配置文件。
fn apply_overrides(settings: &mut Settings, cli: &Cli) -> Result<()> {
    if let Some(name) = &cli.provider {
        let provider = Provider::from_name(name).ok_or_else(|| {
            let known = Provider::ALL
                .iter()
                .map(|p| p.name())
                .collect::<Vec<_>>()
                .join(", ");
            anyhow!("unknown provider {name:?} (available: {known})")
        })?;
        settings.server = ServerSettings::from_provider(provider)?;
    }
    if let Some(token) = &cli.token {
        settings.client.token = Some(token.clone());
    }
    if let Some(user_agent) = &cli.user_agent {
        settings.client.user_agent = Some(user_agent.clone());
    }
    if let Some(proxy) = &cli.proxy {
        settings.client.proxy = Some(proxy.clone());
    }
    if cli.logging {
        settings.client.enable_logging = true;
    }
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let level: Level = level
        .parse()
        .map_err(|_| anyhow!("invalid log level {level:?}"))?;

    let dir = settings::data_dir()?;
    std::fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create {}", dir.display()))?;
    let path = dir.join(LOG_FILE_NAME);
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .with_context(|| format!("failed to open log file {}", path.display()))?;

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .init();
    Ok(())
}

fn exit_code(err: &anyhow::Error) -> u8 {
    let Some(err) = err.chain().find_map(|e| e.downcast_ref::<AnonError>()) else {
        return 1;
    };
    match err {
        AnonError::Template(_) => 2,
        AnonError::SourceNotFound(_) => 3,
        AnonError::DestinationExists(_) => 4,
        AnonError::Network(_) => 5,
        AnonError::Provider { .. } => 6,
        AnonError::Cancelled => 130,
        _ => 1,
    }
}
