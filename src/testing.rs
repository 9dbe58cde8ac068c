//! In-memory collaborators for deterministic engine tests.
//!
//! `MemWorkspace` keeps a `(mtime, length)` table behind an `Arc`, so the
//! clone handed to a context and the clone kept by the test observe the same
//! mutations. Output streams write into the same table, which also serves
//! persisted state files back through `read_file`.

use std::collections::BTreeMap;
use std::io::{self, Write};
use std::sync::{Arc, Mutex};

use camino::{Utf8Path, Utf8PathBuf};

use crate::message::{MessageMap, MessageSink};
use crate::workspace::{Mode, OutputStream, ResourceStatus, WalkEntry, Workspace};

#[derive(Default)]
struct MemFiles {
    /// path -> (last_modified, length)
    stats: BTreeMap<Utf8PathBuf, (i64, u64)>,
    contents: BTreeMap<Utf8PathBuf, Vec<u8>>,
    clock: i64,
}

impl MemFiles {
    fn tick(&mut self) -> i64 {
        self.clock += 1;
        1000 + self.clock
    }
}

#[derive(Clone)]
pub(crate) struct MemWorkspace {
    files: Arc<Mutex<MemFiles>>,
    mode: Mode,
    /// The file table the "previous build" saw; delta walks report only what
    /// differs from it.
    baseline: BTreeMap<Utf8PathBuf, (i64, u64)>,
    /// Whether delta walks report files that vanished since the baseline.
    report_removals: bool,
}

impl MemWorkspace {
    pub(crate) fn new() -> Self {
        Self {
            files: Arc::default(),
            mode: Mode::Normal,
            baseline: BTreeMap::new(),
            report_removals: true,
        }
    }

    pub(crate) fn with_mode(mode: Mode) -> Self {
        Self {
            mode,
            ..Self::new()
        }
    }

    /// Switch to delta reporting, remembering the current table as the
    /// baseline the walk diffs against.
    pub(crate) fn into_delta(mut self) -> Self {
        self.baseline = self.files.lock().unwrap().stats.clone();
        self.mode = Mode::Delta;
        self
    }

    /// Simulate a delta source that never notices deletions.
    pub(crate) fn omit_removals(mut self) -> Self {
        self.report_removals = false;
        self
    }

    pub(crate) fn put(&self, path: impl Into<Utf8PathBuf>, last_modified: i64, length: u64) {
        let mut files = self.files.lock().unwrap();
        files.stats.insert(path.into(), (last_modified, length));
    }

    pub(crate) fn remove(&self, path: &Utf8Path) {
        let mut files = self.files.lock().unwrap();
        files.stats.remove(path);
        files.contents.remove(path);
    }

    pub(crate) fn contents(&self, path: &Utf8Path) -> Option<Vec<u8>> {
        self.files.lock().unwrap().contents.get(path).cloned()
    }

    pub(crate) fn exists(&self, path: &Utf8Path) -> bool {
        self.files.lock().unwrap().stats.contains_key(path)
    }
}

impl Workspace for MemWorkspace {
    fn mode(&self) -> Mode {
        self.mode
    }

    fn escalate(&self) -> Arc<dyn Workspace> {
        // same table, full reporting
        Arc::new(Self {
            files: self.files.clone(),
            mode: Mode::Normal,
            baseline: BTreeMap::new(),
            report_removals: true,
        })
    }

    fn walk(&self, basedir: &Utf8Path, visitor: &mut dyn FnMut(WalkEntry<'_>)) -> io::Result<()> {
        let stats = self.files.lock().unwrap().stats.clone();
        match self.mode {
            Mode::Delta => {
                for (path, &(last_modified, length)) in &stats {
                    if !path.starts_with(basedir) {
                        continue;
                    }
                    let status = match self.baseline.get(path) {
                        None => ResourceStatus::New,
                        Some(&remembered) if remembered != (last_modified, length) => {
                            ResourceStatus::Modified
                        }
                        Some(_) => continue,
                    };
                    visitor(WalkEntry {
                        path,
                        last_modified,
                        length,
                        status,
                    });
                }
                if self.report_removals {
                    for (path, &(last_modified, length)) in &self.baseline {
                        if path.starts_with(basedir) && !stats.contains_key(path) {
                            visitor(WalkEntry {
                                path,
                                last_modified,
                                length,
                                status: ResourceStatus::Removed,
                            });
                        }
                    }
                }
            }
            _ => {
                for (path, &(last_modified, length)) in &stats {
                    if path.starts_with(basedir) {
                        visitor(WalkEntry {
                            path,
                            last_modified,
                            length,
                            status: ResourceStatus::New,
                        });
                    }
                }
            }
        }
        Ok(())
    }

    fn is_present(&self, path: &Utf8Path) -> bool {
        self.files.lock().unwrap().stats.contains_key(path)
    }

    fn stat(&self, path: &Utf8Path) -> Option<(i64, u64)> {
        self.files.lock().unwrap().stats.get(path).copied()
    }

    fn resource_status(&self, path: &Utf8Path, last_modified: i64, length: u64) -> ResourceStatus {
        match self.stat(path) {
            None => ResourceStatus::Removed,
            Some(current) if current == (last_modified, length) => ResourceStatus::Unmodified,
            Some(_) => ResourceStatus::Modified,
        }
    }

    fn read_file(&self, path: &Utf8Path) -> io::Result<Vec<u8>> {
        self.contents(path)
            .ok_or_else(|| io::Error::new(io::ErrorKind::NotFound, path.to_string()))
    }

    fn open_output(&self, path: &Utf8Path) -> io::Result<Box<dyn OutputStream>> {
        Ok(Box::new(MemStream {
            path: path.to_owned(),
            buffer: Vec::new(),
            files: self.files.clone(),
        }))
    }

    fn delete_file(&self, path: &Utf8Path) -> io::Result<()> {
        self.remove(path);
        Ok(())
    }
}

struct MemStream {
    path: Utf8PathBuf,
    buffer: Vec<u8>,
    files: Arc<Mutex<MemFiles>>,
}

impl Write for MemStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl OutputStream for MemStream {
    fn close(self: Box<Self>) -> io::Result<()> {
        let this = *self;
        let mut files = this.files.lock().unwrap();
        let length = this.buffer.len() as u64;
        let last_modified = files.tick();
        files.contents.insert(this.path.clone(), this.buffer);
        files.stats.insert(this.path, (last_modified, length));
        Ok(())
    }
}

/// Sink that remembers everything commit hands it.
#[derive(Default)]
pub(crate) struct RecordingSink {
    pub(crate) cleared: Vec<Utf8PathBuf>,
    pub(crate) all: MessageMap,
    pub(crate) new: MessageMap,
    pub(crate) records: usize,
}

impl MessageSink for RecordingSink {
    fn clear(&mut self, resource: &Utf8Path) {
        self.cleared.push(resource.to_owned());
    }

    fn record(&mut self, all: &MessageMap, new: &MessageMap) {
        self.all = all.clone();
        self.new = new.clone();
        self.records += 1;
    }
}
