use std::io::{self, Read};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

use crate::endpoint::Operation;

/// 单次进度事件：已传输字节数、预期总量（可能未知）与操作类型。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ProgressEvent {
    pub operation: Operation,
    pub transferred: u64,
    pub total: Option<u64>,
}

impl ProgressEvent {
    /// 总量未知时返回 `None`。
    pub fn fraction(&self) -> Option<f64> {
        match self.total {
            Some(0) => Some(1.0),
            Some(total) => Some((self.transferred as f64 / total as f64).min(1.0)),
            None => None,
        }
    }
}

/// 进度监听器。
///
/// 调用顺序保证：已传输字节数严格递增；成功时最后一次事件为 100%；
/// 失败或取消后不会再收到任何事件。
pub trait ProgressListener: Send {
    fn on_progress(&mut self, event: &ProgressEvent);
}

impl<F> ProgressListener for F
where
    F: FnMut(&ProgressEvent) + Send,
{
    fn on_progress(&mut self, event: &ProgressEvent) {
        self(event)
    }
}

/// 调用方与传输线程共享的取消标记，传输在每个数据块之间检查它。
#[derive(Clone, Debug, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// 单次传输的可选钩子：进度监听与取消。
#[derive(Default)]
pub struct TransferHooks {
    pub progress: Option<Box<dyn ProgressListener>>,
    pub cancel: Option<CancelToken>,
}

impl TransferHooks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_progress(mut self, listener: impl ProgressListener + 'static) -> Self {
        self.progress = Some(Box::new(listener));
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }
}

pub(crate) fn is_cancelled(token: Option<&CancelToken>) -> bool {
    token.is_some_and(CancelToken::is_cancelled)
}

/// 把原始字节计数转成符合监听约定的事件序列。
///
/// 每个事件都延后一个数据块才发出：最后一块留到 `finish` 时以 100% 发出，
/// 失败路径上直接丢弃，因此错误之后不会有多余的进度事件。
pub(crate) struct ProgressTracker {
    operation: Operation,
    total: Option<u64>,
    emitted: Option<u64>,
    pending: Option<u64>,
    listener: Option<Box<dyn ProgressListener>>,
}

impl ProgressTracker {
    pub(crate) fn new(
        operation: Operation,
        total: Option<u64>,
        listener: Option<Box<dyn ProgressListener>>,
    ) -> Self {
        Self {
            operation,
            total,
            emitted: None,
            pending: None,
            listener,
        }
    }

    pub(crate) fn report(&mut self, transferred: u64) {
        let floor = self.pending.or(self.emitted);
        if floor.is_some_and(|seen| transferred <= seen) {
            return;
        }
        if let Some(previous) = self.pending.replace(transferred) {
            self.emit(previous, self.total);
        }
    }

    pub(crate) fn finish(&mut self, transferred: u64) {
        self.pending = None;
        if self.emitted.is_some_and(|seen| transferred <= seen) {
            return;
        }
        self.emit(transferred, Some(transferred));
    }

    fn emit(&mut self, transferred: u64, total: Option<u64>) {
        self.emitted = Some(transferred);
        if let Some(listener) = self.listener.as_mut() {
            listener.on_progress(&ProgressEvent {
                operation: self.operation,
                transferred,
                total,
            });
        }
    }
}

pub(crate) const CANCELLED_MESSAGE: &str = "transfer cancelled";

/// 上传请求体的 Reader：统计已发送字节并在每次读取前检查取消标记。
pub(crate) struct ProgressReader<R: Read> {
    inner: R,
    sent: u64,
    tracker: Arc<Mutex<ProgressTracker>>,
    cancel: Option<CancelToken>,
}

impl<R: Read> ProgressReader<R> {
    pub(crate) fn new(
        inner: R,
        tracker: Arc<Mutex<ProgressTracker>>,
        cancel: Option<CancelToken>,
    ) -> Self {
        Self {
            inner,
            sent: 0,
            tracker,
            cancel,
        }
    }
}

impl<R: Read> Read for ProgressReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if is_cancelled(self.cancel.as_ref()) {
            return Err(io::Error::new(io::ErrorKind::Other, CANCELLED_MESSAGE));
        }
        let read_bytes = self.inner.read(buf)?;
        if read_bytes > 0 {
            self.sent = self.sent.saturating_add(read_bytes as u64);
            if let Ok(mut tracker) = self.tracker.lock() {
                tracker.report(self.sent);
            }
        }
        Ok(read_bytes)
    }
}
