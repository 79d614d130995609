use anonpy::{
    checksum,
    db::{HistoryStore, TransferRecord},
    settings::Settings,
    transfer::sanitize_file_name,
    AnonError, AnonPy, CancelToken, DownloadOptions, Operation, PreviewResult, UploadOptions,
};
use anyhow::{bail, Context, Result};
use colored::*;
use serde_json::Value;
use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};
use tracing::{debug, info, warn};

use super::progress::{bar_listener, transfer_bar};

/// 命令执行所需的共享状态。
pub struct Session {
    pub client: AnonPy,
    pub verbose: bool,
    pub history: Option<HistoryStore>,
    /// Ctrl-C 时被触发，正在进行的传输以 `Cancelled` 结束。
    pub cancel: CancelToken,
}

impl Session {
    pub fn new(settings: &Settings, verbose: bool, cancel: CancelToken) -> Result<Self> {
        let endpoint = settings.server.endpoint()?;
        let client = AnonPy::with_url(
            settings.server.api_url()?,
            endpoint,
            settings.client_config()?,
        )?;

        let history = match HistoryStore::open_default() {
            Ok(store) => Some(store),
            Err(e) => {
                warn!(error = %e, "transfer history unavailable");
                None
            }
        };

        Ok(Self {
            client,
            verbose,
            history,
            cancel,
        })
    }

    fn ensure_not_cancelled(&self) -> Result<()> {
        if self.cancel.is_cancelled() {
            return Err(AnonError::Cancelled.into());
        }
        Ok(())
    }

    fn remember(&self, record: TransferRecord) {
        if let Some(store) = &self.history {
            if let Err(e) = store.record(&record) {
                warn!(error = %e, "failed to record transfer history");
            }
        }
    }
}

pub fn preview(session: &Session, resources: &[String]) -> Result<()> {
    for resource in resources {
        session.ensure_not_cancelled()?;
        let preview = session
            .client
            .preview(resource)
            .with_context(|| format!("failed to preview {resource}"))?;

        if session.verbose {
            println!("{}", serde_json::to_string_pretty(preview.fields())?);
        } else {
            println!("{}", preview_line(&preview));
        }
    }
    Ok(())
}

pub fn upload(session: &Session, files: &[PathBuf]) -> Result<()> {
    for file in files {
        session.ensure_not_cancelled()?;
        let label = file
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| file.display().to_string());
        let expected = fs::metadata(file).ok().map(|meta| meta.len());
        let pb = transfer_bar(label.clone(), expected, session.verbose);

        let result = session
            .client
            .upload(
                file,
                UploadOptions::new()
                    .progress(bar_listener(pb.clone()))
                    .cancel(session.cancel.clone()),
            );
        pb.finish_and_clear();
        let result = result.with_context(|| format!("failed to upload {}", file.display()))?;

        let url = result
            .url
            .clone()
            .or_else(|| result.download_url.as_ref().map(|url| url.to_string()))
            .unwrap_or_else(|| result.identifier.clone());
        info!(file = %file.display(), %url, "uploaded");
        println!("URL={}", url.blue().bold());

        let digest = checksum::sha256_file(file)?;
        println!("SHA256={}", digest.blue().bold());

        let mut record = TransferRecord::new(Operation::Upload, &result.identifier, label);
        record.local_path = Some(file.display().to_string());
        record.size = i64::try_from(result.bytes).ok();
        record.url = Some(url);
        session.remember(record);
    }
    Ok(())
}

pub struct DownloadArgs {
    pub resources: Vec<String>,
    pub directory: PathBuf,
    pub force: bool,
    pub checksum: Option<String>,
}

pub fn download(session: &Session, args: DownloadArgs) -> Result<()> {
    let mut corrupt = 0usize;

    for resource in &args.resources {
        session.ensure_not_cancelled()?;
        let preview = lookup(session, resource)?;
        let name = sanitize_file_name(
            preview
                .as_ref()
                .and_then(PreviewResult::name)
                .unwrap_or_default(),
            resource,
        );
        let destination = args.directory.join(&name);

        let mut overwrite = args.force;
        if !args.force && destination.exists() {
            println!(
                "{} The file {} already exists",
                "WARNING:".yellow().bold(),
                destination.display().to_string().blue().bold()
            );
            let proceed = confirm("Proceed with download?")?;
            session.ensure_not_cancelled()?;
            if !proceed {
                println!("{}", "Skipped".yellow());
                continue;
            }
            overwrite = true;
        }

        let pb = transfer_bar(
            name.clone(),
            preview.as_ref().and_then(PreviewResult::size),
            session.verbose,
        );
        let result = session.client.download(
            resource,
            DownloadOptions::new()
                .directory(args.directory.clone())
                .file_name(name.clone())
                .overwrite(overwrite)
                .progress(bar_listener(pb.clone()))
                .cancel(session.cancel.clone()),
        );
        pb.finish_and_clear();
        let result = result.with_context(|| format!("failed to download {resource}"))?;
        println!("PATH={}", result.path.display().to_string().blue().bold());

        let mut record = TransferRecord::new(Operation::Download, resource, name);
        record.local_path = Some(result.path.display().to_string());
        record.size = i64::try_from(result.bytes).ok();
        record.url = session
            .client
            .resolve(Operation::Download, Some(resource))
            .ok()
            .map(|url| url.to_string());
        session.remember(record);

        let expected = args
            .checksum
            .as_deref()
            .or_else(|| preview.as_ref().and_then(PreviewResult::sha256))
            .map(str::to_string);
        if let Some(expected) = expected {
            let (matches, actual) = checksum::verify_sha256(&result.path, &expected)?;
            if session.verbose {
                println!("SHA256={actual}");
            }
            if !matches {
                corrupt += 1;
                println!("{} checksum mismatch for {}", "ERROR:".red().bold(), resource);
                println!("{}", format!("- {}", expected.to_ascii_lowercase()).red());
                println!("{}", format!("+ {actual}").green());
            }
        }
    }

    if corrupt > 0 {
        bail!("{corrupt} download(s) failed checksum verification");
    }
    Ok(())
}

pub fn history(limit: usize, clear: bool) -> Result<()> {
    let store = HistoryStore::open_default()?;

    if clear {
        let removed = store.clear()?;
        println!("{} {} entries removed", "✅".green(), removed.to_string().bold());
        return Ok(());
    }

    let records = store.load(limit)?;
    if records.is_empty() {
        println!("{}", "No transfers recorded yet".yellow());
        return Ok(());
    }

    for record in records {
        let kind = match record.kind {
            Operation::Upload => "upload".green(),
            Operation::Download => "download".cyan(),
            Operation::Preview => "preview".normal(),
        };
        println!(
            "{:<8} {} {} {}",
            kind,
            record.identifier.bold(),
            record.file_name,
            record.url.as_deref().unwrap_or("").dimmed()
        );
    }
    Ok(())
}

/// 批量文件：每行一个标识符，忽略空行与 `#` 注释。
pub fn read_batch_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read batch file {}", path.display()))?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// 下载前取元数据。服务商拒绝预览时退回到以标识符命名，与库的下载行为一致。
fn lookup(session: &Session, resource: &str) -> Result<Option<PreviewResult>> {
    match session.client.preview(resource) {
        Ok(preview) => Ok(Some(preview)),
        Err(AnonError::Provider { status, message }) => {
            debug!(?status, %message, resource, "preview unavailable, using identifier as name");
            Ok(None)
        }
        Err(err) => Err(err).with_context(|| format!("failed to preview {resource}")),
    }
}

fn preview_line(preview: &PreviewResult) -> String {
    preview
        .fields()
        .values()
        .map(|value| match value {
            Value::String(s) => s.clone(),
            other => other.to_string(),
        })
        .collect::<Vec<_>>()
        .join(",")
}

fn confirm(prompt: &str) -> Result<bool> {
    print!("{} {} ", prompt, "[y/N]".dimmed());
    io::stdout().flush()?;

    let mut input = String::new();
    io::stdin().read_line(&mut input)?;
    Ok(input.trim().eq_ignore_ascii_case("y"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use anonpy::{ClientConfig, Endpoint};
    use serde_json::json;
    use tempfile::TempDir;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn session(base: &str, cancel: CancelToken) -> Session {
        let endpoint = Endpoint::new("/file", "/file/{}", "/file/{}/info").unwrap();
        Session {
            client: AnonPy::new(base, endpoint, ClientConfig::default()).unwrap(),
            verbose: false,
            history: None,
            cancel,
        }
    }

    fn download_args(directory: &Path, resource: &str) -> DownloadArgs {
        DownloadArgs {
            resources: vec![resource.to_string()],
            directory: directory.to_path_buf(),
            force: false,
            checksum: None,
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_download_names_file_after_identifier_without_preview() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .and(path("/api/file/hidden1/info"))
            .respond_with(ResponseTemplate::new(403).set_body_json(json!({
                "success": false,
                "value": "forbidden"
            })))
            .mount(&mock_server)
            .await;

        Mock::given(method("GET"))
            .and(path("/api/file/hidden1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(b"payload".to_vec()))
            .expect(1)
            .mount(&mock_server)
            .await;

        let temp = TempDir::new().unwrap();
        let directory = temp.path().to_path_buf();
        let base = format!("{}/api/", mock_server.uri());
        let result = tokio::task::spawn_blocking(move || {
            download(
                &session(&base, CancelToken::new()),
                download_args(&directory, "hidden1"),
            )
        })
        .await
        .unwrap();

        assert!(result.is_ok(), "{result:?}");
        assert_eq!(fs::read(temp.path().join("hidden1")).unwrap(), b"payload");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_interrupted_session_stops_before_transfer() {
        let mock_server = MockServer::start().await;

        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"name": "a.txt"})))
            .expect(0)
            .mount(&mock_server)
            .await;

        let temp = TempDir::new().unwrap();
        let directory = temp.path().to_path_buf();
        let base = format!("{}/api/", mock_server.uri());
        let cancel = CancelToken::new();
        cancel.cancel();
        let err = tokio::task::spawn_blocking(move || {
            download(&session(&base, cancel), download_args(&directory, "abc"))
        })
        .await
        .unwrap()
        .unwrap_err();

        assert!(matches!(
            err.downcast_ref::<AnonError>(),
            Some(AnonError::Cancelled)
        ));
        assert_eq!(fs::read_dir(temp.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_batch_file_skips_comments_and_blanks() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("ids.txt");
        fs::write(&path, "# weekly uploads\nLNcXZ9UM\n\n  1tdWj9g2  \n#abc\n").unwrap();

        assert_eq!(read_batch_file(&path).unwrap(), vec!["LNcXZ9UM", "1tdWj9g2"]);
    }

    #[test]
    fn test_missing_batch_file_is_error() {
        let temp = TempDir::new().unwrap();
        assert!(read_batch_file(&temp.path().join("absent.txt")).is_err());
    }

    #[test]
    fn test_preview_line_joins_values() {
        let value = json!({"id": "LNcXZ9UM", "name": "homework.docx", "size": 2048});
        let Value::Object(fields) = value else {
            unreachable!()
        };
        let line = preview_line(&PreviewResult::from_fields(fields));
        assert_eq!(line, "LNcXZ9UM,homework.docx,2048");
    }
}
