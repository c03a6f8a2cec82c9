//! Output destinations for the finished container.
//!
//! Writes are positional; muxers hand over byte ranges in file order and sinks never reorder them.

pub mod queue;

use crate::foundation::error::{SpectrumError, SpectrumResult};
use std::fs::{self, File};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

pub use queue::WriteQueue;

/// Positioned byte destination owned by one render job.
pub trait OutputSink: Send {
    /// Write `data` at absolute `offset`, growing the output as needed.
    fn write_at(&mut self, offset: u64, data: &[u8]) -> SpectrumResult<()>;

    /// Commit the output. Nothing is visible under the final name before this succeeds.
    fn close(&mut self) -> SpectrumResult<()>;

    /// Discard everything written so far.
    fn abort(&mut self);

    /// Human readable destination, used in logs and reports.
    fn describe(&self) -> String;
}

/// Hands out sinks. Acquisition may block (for example on a save dialog).
pub trait SinkProvider: Send + Sync {
    fn acquire(&self, suggested_name: &str) -> SpectrumResult<Box<dyn OutputSink>>;
}

/// Sink writing `<path>.part` and renaming it to `path` on close.
#[derive(Debug)]
pub struct FileSink {
    path: PathBuf,
    part: PathBuf,
    file: Option<File>,
}

impl FileSink {
    pub fn create(path: impl Into<PathBuf>) -> SpectrumResult<Self> {
        let path = path.into();
        let part = part_path(&path);
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                SpectrumError::sink(format!("create directory '{}': {e}", parent.display()))
            })?;
        }
        let file = File::create(&part)
            .map_err(|e| SpectrumError::sink(format!("create '{}': {e}", part.display())))?;
        Ok(Self {
            path,
            part,
            file: Some(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn part_path(&self) -> &Path {
        &self.part
    }
}

fn part_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".part");
    PathBuf::from(name)
}

impl OutputSink for FileSink {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> SpectrumResult<()> {
        let file = self
            .file
            .as_mut()
            .ok_or_else(|| SpectrumError::sink("write after close"))?;
        file.seek(SeekFrom::Start(offset))
            .and_then(|_| file.write_all(data))
            .map_err(|e| {
                SpectrumError::sink(format!(
                    "write {} bytes at {offset} to '{}': {e}",
                    data.len(),
                    self.part.display()
                ))
            })
    }

    fn close(&mut self) -> SpectrumResult<()> {
        let file = self
            .file
            .take()
            .ok_or_else(|| SpectrumError::sink("sink already closed"))?;
        file.sync_all()
            .map_err(|e| SpectrumError::sink(format!("sync '{}': {e}", self.part.display())))?;
        drop(file);
        fs::rename(&self.part, &self.path).map_err(|e| {
            SpectrumError::sink(format!(
                "rename '{}' -> '{}': {e}",
                self.part.display(),
                self.path.display()
            ))
        })?;
        tracing::debug!(path = %self.path.display(), "file sink closed");
        Ok(())
    }

    fn abort(&mut self) {
        self.file = None;
        if let Err(e) = fs::remove_file(&self.part)
            && e.kind() != std::io::ErrorKind::NotFound
        {
            tracing::warn!(path = %self.part.display(), error = %e, "failed to remove partial output");
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

impl Drop for FileSink {
    fn drop(&mut self) {
        if self.file.is_some() {
            self.abort();
        }
    }
}

/// Writes into a directory, either under a fixed name or under the suggested one.
#[derive(Clone, Debug)]
pub struct FileSinkProvider {
    dir: PathBuf,
    file_name: Option<String>,
}

impl FileSinkProvider {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            file_name: None,
        }
    }

    /// Use `path` as the output regardless of the suggested name.
    pub fn fixed(path: impl AsRef<Path>) -> Self {
        let path = path.as_ref();
        Self {
            dir: path.parent().map(Path::to_path_buf).unwrap_or_default(),
            file_name: path.file_name().map(|n| n.to_string_lossy().into_owned()),
        }
    }
}

impl SinkProvider for FileSinkProvider {
    fn acquire(&self, suggested_name: &str) -> SpectrumResult<Box<dyn OutputSink>> {
        let name = self.file_name.as_deref().unwrap_or(suggested_name);
        Ok(Box::new(FileSink::create(self.dir.join(name))?))
    }
}

/// Observable state of a [`MemorySink`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct MemorySinkState {
    pub bytes: Vec<u8>,
    /// `(offset, len)` of every write in arrival order.
    pub writes: Vec<(u64, usize)>,
    pub closed: bool,
    pub aborted: bool,
}

/// In-memory sink. Clones share state, so tests keep a handle while the job owns the sink.
#[derive(Clone, Debug, Default)]
pub struct MemorySink {
    state: Arc<Mutex<MemorySinkState>>,
    fail_after: Option<usize>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every write after the first `n`.
    pub fn failing_after(n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> MemorySinkState {
        self.lock().clone()
    }

    pub fn bytes(&self) -> Vec<u8> {
        self.lock().bytes.clone()
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn is_aborted(&self) -> bool {
        self.lock().aborted
    }

    fn lock(&self) -> MutexGuard<'_, MemorySinkState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl OutputSink for MemorySink {
    fn write_at(&mut self, offset: u64, data: &[u8]) -> SpectrumResult<()> {
        let fail_after = self.fail_after;
        let mut s = self.lock();
        if s.closed || s.aborted {
            return Err(SpectrumError::sink("write to a finished sink"));
        }
        if fail_after.is_some_and(|n| s.writes.len() >= n) {
            return Err(SpectrumError::sink("injected write failure"));
        }
        let start = offset as usize;
        let end = start + data.len();
        if s.bytes.len() < end {
            s.bytes.resize(end, 0);
        }
        s.bytes[start..end].copy_from_slice(data);
        s.writes.push((offset, data.len()));
        Ok(())
    }

    fn close(&mut self) -> SpectrumResult<()> {
        let mut s = self.lock();
        if s.aborted {
            return Err(SpectrumError::sink("close after abort"));
        }
        s.closed = true;
        Ok(())
    }

    fn abort(&mut self) {
        let mut s = self.lock();
        s.aborted = true;
        s.bytes.clear();
    }

    fn describe(&self) -> String {
        "memory".to_owned()
    }
}

/// Provider handing out [`MemorySink`]s and remembering them.
#[derive(Debug, Default)]
pub struct MemorySinkProvider {
    acquired: Mutex<Vec<(String, MemorySink)>>,
    fail_after: Option<usize>,
    refuse: bool,
}

impl MemorySinkProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sinks handed out fail every write after the first `n`.
    pub fn failing_after(n: usize) -> Self {
        Self {
            fail_after: Some(n),
            ..Self::default()
        }
    }

    /// Refuse every acquisition, as when a user dismisses the save dialog.
    pub fn refusing() -> Self {
        Self {
            refuse: true,
            ..Self::default()
        }
    }

    pub fn acquire_count(&self) -> usize {
        self.lock().len()
    }

    /// Most recently acquired sink and the name it was requested under.
    pub fn last(&self) -> Option<(String, MemorySink)> {
        self.lock().last().cloned()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<(String, MemorySink)>> {
        self.acquired.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl SinkProvider for MemorySinkProvider {
    fn acquire(&self, suggested_name: &str) -> SpectrumResult<Box<dyn OutputSink>> {
        if self.refuse {
            return Err(SpectrumError::sink("output destination was not granted"));
        }
        let sink = match self.fail_after {
            Some(n) => MemorySink::failing_after(n),
            None => MemorySink::new(),
        };
        self.lock().push((suggested_name.to_owned(), sink.clone()));
        Ok(Box::new(sink))
    }
}
