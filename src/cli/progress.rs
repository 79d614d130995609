use anonpy::ProgressEvent;
use indicatif::{ProgressBar, ProgressStyle};

const BAR_TEMPLATE: &str =
    "{spinner:.green} {msg} [{bar:40.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})";

/// 传输进度条。`quiet` 时返回隐藏的进度条，调用方无需区分。
pub fn transfer_bar(message: impl Into<String>, expected: Option<u64>, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }

    let pb = ProgressBar::new(expected.unwrap_or(0));
    if let Ok(style) = ProgressStyle::default_bar().template(BAR_TEMPLATE) {
        pb.set_style(style.progress_chars("#>-"));
    }
    pb.set_message(message.into());
    pb
}

/// 把引擎的进度事件转发给进度条。
pub fn bar_listener(pb: ProgressBar) -> impl FnMut(&ProgressEvent) + Send + 'static {
    move |event: &ProgressEvent| {
        if let Some(total) = event.total {
            pb.set_length(total.max(event.transferred));
        } else if pb.length().is_some_and(|len| len < event.transferred) {
            pb.set_length(event.transferred);
        }
        pb.set_position(event.transferred);
    }
}
