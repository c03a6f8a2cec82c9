use crate::foundation::error::{SpectrumError, SpectrumResult};
use crate::job::cancel::CancelToken;
use crate::sink::OutputSink;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

const QUEUE_DEPTH: usize = 16;

enum Command {
    Write { offset: u64, data: Vec<u8> },
    Barrier(SyncSender<()>),
}

#[derive(Clone, Debug)]
enum Failure {
    Sink(String),
    Cancelled,
}

impl Failure {
    fn to_error(&self) -> SpectrumError {
        match self {
            Self::Sink(msg) => SpectrumError::sink(msg.clone()),
            Self::Cancelled => SpectrumError::Cancelled,
        }
    }
}

#[derive(Default)]
struct Shared {
    failure: Mutex<Option<Failure>>,
    bytes: AtomicU64,
    writes: AtomicU64,
}

impl Shared {
    fn failure(&self) -> Option<Failure> {
        self.failure.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    fn fail(&self, f: Failure) {
        let mut slot = self.failure.lock().unwrap_or_else(|e| e.into_inner());
        if slot.is_none() {
            *slot = Some(f);
        }
    }
}

/// Totals reported when the queue closes.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WriteStats {
    pub writes: u64,
    pub bytes: u64,
}

/// Serializes positioned writes onto one writer thread.
///
/// Each write settles before the next one starts. The cancellation token is checked before every
/// write; the first failure is sticky and every later call reports it.
pub struct WriteQueue {
    tx: Option<SyncSender<Command>>,
    worker: Option<JoinHandle<Box<dyn OutputSink>>>,
    shared: Arc<Shared>,
    target: String,
}

impl WriteQueue {
    pub fn new(sink: Box<dyn OutputSink>, cancel: CancelToken) -> Self {
        let (tx, rx) = mpsc::sync_channel(QUEUE_DEPTH);
        let shared = Arc::new(Shared::default());
        let target = sink.describe();
        let worker_shared = Arc::clone(&shared);
        let worker = std::thread::Builder::new()
            .name("wavyte-spectrum-writer".to_owned())
            .spawn(move || writer_loop(sink, rx, &worker_shared, &cancel));
        match worker {
            Ok(worker) => Self {
                tx: Some(tx),
                worker: Some(worker),
                shared,
                target,
            },
            Err(e) => {
                shared.fail(Failure::Sink(format!("failed to spawn writer thread: {e}")));
                Self {
                    tx: None,
                    worker: None,
                    shared,
                    target,
                }
            }
        }
    }

    /// Destination of the underlying sink.
    pub fn target(&self) -> &str {
        &self.target
    }

    /// Enqueue a write. Blocks when the queue is full.
    pub fn write_at(&self, offset: u64, data: Vec<u8>) -> SpectrumResult<()> {
        self.check()?;
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| SpectrumError::sink("write queue is closed"))?;
        if tx.send(Command::Write { offset, data }).is_err() {
            return Err(self.failure_or("writer thread stopped"));
        }
        Ok(())
    }

    /// Wait until every queued write has settled.
    pub fn flush(&self) -> SpectrumResult<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| SpectrumError::sink("write queue is closed"))?;
        let (ack_tx, ack_rx) = mpsc::sync_channel(1);
        if tx.send(Command::Barrier(ack_tx)).is_err() || ack_rx.recv().is_err() {
            return Err(self.failure_or("writer thread stopped"));
        }
        self.check()
    }

    /// Report the sticky failure, if any.
    pub fn check(&self) -> SpectrumResult<()> {
        match self.shared.failure() {
            Some(f) => Err(f.to_error()),
            None => Ok(()),
        }
    }

    /// Drain the queue and close the sink. On any failure the sink is aborted instead.
    pub fn close(mut self) -> SpectrumResult<WriteStats> {
        let mut sink = self.shutdown()?;
        if let Some(f) = self.shared.failure() {
            sink.abort();
            return Err(f.to_error());
        }
        if let Err(e) = sink.close() {
            sink.abort();
            return Err(e);
        }
        let stats = self.stats();
        tracing::info!(target_path = %self.target, bytes = stats.bytes, writes = stats.writes, "output closed");
        Ok(stats)
    }

    /// Drop pending writes and abort the sink.
    pub fn abort(mut self) {
        self.shared.fail(Failure::Cancelled);
        if let Ok(mut sink) = self.shutdown() {
            sink.abort();
        }
        tracing::debug!(target_path = %self.target, "output aborted");
    }

    pub fn stats(&self) -> WriteStats {
        WriteStats {
            writes: self.shared.writes.load(Ordering::SeqCst),
            bytes: self.shared.bytes.load(Ordering::SeqCst),
        }
    }

    /// Joins the writer and hands back the sink. Sink panics are caught inside the writer, so a
    /// join error means the sink was already dropped during unwinding and cannot be aborted.
    fn shutdown(&mut self) -> SpectrumResult<Box<dyn OutputSink>> {
        drop(self.tx.take());
        let worker = self
            .worker
            .take()
            .ok_or_else(|| self.failure_or("write queue already shut down"))?;
        worker
            .join()
            .map_err(|_| SpectrumError::sink("writer thread panicked"))
    }

    fn failure_or(&self, msg: &str) -> SpectrumError {
        self.shared
            .failure()
            .map(|f| f.to_error())
            .unwrap_or_else(|| SpectrumError::sink(msg))
    }
}

impl Drop for WriteQueue {
    fn drop(&mut self) {
        if self.worker.is_some() {
            self.shared.fail(Failure::Cancelled);
            if let Ok(mut sink) = self.shutdown() {
                sink.abort();
            }
        }
    }
}

impl std::fmt::Debug for WriteQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteQueue")
            .field("target", &self.target)
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

fn writer_loop(
    mut sink: Box<dyn OutputSink>,
    rx: Receiver<Command>,
    shared: &Shared,
    cancel: &CancelToken,
) -> Box<dyn OutputSink> {
    for cmd in rx {
        match cmd {
            Command::Write { offset, data } => {
                if shared.failure().is_some() {
                    continue;
                }
                if cancel.is_cancelled() {
                    shared.fail(Failure::Cancelled);
                    continue;
                }
                let written =
                    std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| sink.write_at(offset, &data)));
                let result = match written {
                    Ok(result) => result,
                    Err(_) => {
                        // The sink stays on this thread so close() can still abort it.
                        tracing::error!(offset, len = data.len(), "output sink panicked during write");
                        shared.fail(Failure::Sink("output sink panicked during write".to_owned()));
                        continue;
                    }
                };
                match result {
                    Ok(()) => {
                        shared.writes.fetch_add(1, Ordering::SeqCst);
                        shared.bytes.fetch_add(data.len() as u64, Ordering::SeqCst);
                    }
                    Err(e) => {
                        tracing::warn!(offset, len = data.len(), error = %e, "output write failed");
                        let msg = match e {
                            SpectrumError::Sink(msg) => msg,
                            other => other.to_string(),
                        };
                        shared.fail(Failure::Sink(msg));
                    }
                }
            }
            Command::Barrier(ack) => {
                let _ = ack.send(());
            }
        }
    }
    sink
}
