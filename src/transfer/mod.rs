mod download;
mod http;
mod models;
mod preview;
mod progress;
mod upload;

pub use download::{sanitize_file_name, stream_download};
pub use http::{ClientConfig, Timeout, Transport, DEFAULT_USER_AGENT};
pub use models::{DownloadResult, PreviewResult, UploadResult};
pub use preview::fetch_preview;
pub use progress::{CancelToken, ProgressEvent, ProgressListener, TransferHooks};
pub use upload::stream_upload;
