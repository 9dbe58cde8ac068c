use std::fs;
use std::io::{self, BufWriter, Write};
use std::sync::Arc;
use std::time::UNIX_EPOCH;

use camino::{Utf8Path, Utf8PathBuf};
use tempfile::NamedTempFile;
use walkdir::WalkDir;

use crate::workspace::{Mode, OutputStream, ResourceStatus, WalkEntry, Workspace};

/// Workspace backed directly by the local filesystem.
///
/// Always walks in [`Mode::Normal`]: every file under the base directory is
/// reported as NEW, and change detection happens entirely through the
/// remembered `(mtime, length)` pairs. Output streams write to a sibling
/// temporary file and rename it over the target on close, so an interrupted
/// write never corrupts what was there before.
#[derive(Debug, Clone, Copy, Default)]
pub struct FilesystemWorkspace;

impl FilesystemWorkspace {
    pub fn new() -> Self {
        Self
    }
}

impl Workspace for FilesystemWorkspace {
    fn mode(&self) -> Mode {
        Mode::Normal
    }

    fn escalate(&self) -> Arc<dyn Workspace> {
        // a NORMAL walk already visits everything
        Arc::new(*self)
    }

    fn walk(&self, basedir: &Utf8Path, visitor: &mut dyn FnMut(WalkEntry<'_>)) -> io::Result<()> {
        for entry in WalkDir::new(basedir) {
            let entry = entry.map_err(io::Error::from)?;
            if !entry.file_type().is_file() {
                continue;
            }
            let Some(path) = Utf8Path::from_path(entry.path()) else {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    format!("non-UTF-8 path under {basedir}: {}", entry.path().display()),
                ));
            };
            let metadata = entry.metadata().map_err(io::Error::from)?;
            visitor(WalkEntry {
                path,
                last_modified: mtime_millis(&metadata),
                length: metadata.len(),
                status: ResourceStatus::New,
            });
        }
        Ok(())
    }

    fn is_present(&self, path: &Utf8Path) -> bool {
        fs::metadata(path).map(|meta| meta.is_file()).unwrap_or(false)
    }

    fn stat(&self, path: &Utf8Path) -> Option<(i64, u64)> {
        let metadata = fs::metadata(path).ok()?;
        metadata
            .is_file()
            .then(|| (mtime_millis(&metadata), metadata.len()))
    }

    fn resource_status(&self, path: &Utf8Path, last_modified: i64, length: u64) -> ResourceStatus {
        match self.stat(path) {
            None => ResourceStatus::Removed,
            Some((mtime, len)) if mtime == last_modified && len == length => {
                ResourceStatus::Unmodified
            }
            Some(_) => ResourceStatus::Modified,
        }
    }

    fn read_file(&self, path: &Utf8Path) -> io::Result<Vec<u8>> {
        fs::read(path)
    }

    fn open_output(&self, path: &Utf8Path) -> io::Result<Box<dyn OutputStream>> {
        let parent = path.parent().ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("output path has no parent directory: {path}"),
            )
        })?;
        fs::create_dir_all(parent)?;

        // the temp file lives next to the target so the rename stays on one
        // filesystem
        let file = NamedTempFile::new_in(parent)?;
        Ok(Box::new(AtomicFileStream {
            target: path.to_owned(),
            file: BufWriter::new(file),
        }))
    }

    fn delete_file(&self, path: &Utf8Path) -> io::Result<()> {
        match fs::remove_file(path) {
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(()),
            other => other,
        }
    }
}

fn mtime_millis(metadata: &fs::Metadata) -> i64 {
    match metadata.modified() {
        Ok(time) => match time.duration_since(UNIX_EPOCH) {
            Ok(elapsed) => elapsed.as_millis() as i64,
            Err(before_epoch) => -(before_epoch.duration().as_millis() as i64),
        },
        Err(_) => 0,
    }
}

/// Buffers writes into a temporary sibling and renames it over the target on
/// close. Dropped without closing, the temporary file is cleaned up and the
/// target keeps its previous contents.
struct AtomicFileStream {
    target: Utf8PathBuf,
    file: BufWriter<NamedTempFile>,
}

impl Write for AtomicFileStream {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.flush()
    }
}

impl OutputStream for AtomicFileStream {
    fn close(self: Box<Self>) -> io::Result<()> {
        let this = *self;
        let file = this.file.into_inner().map_err(io::Error::from)?;
        file.persist(&this.target).map_err(|err| err.error)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tempdir() -> (tempfile::TempDir, Utf8PathBuf) {
        let dir = tempfile::tempdir().unwrap();
        // resolve symlinks up front (macOS tempdirs live behind one)
        let path = Utf8PathBuf::try_from(dir.path().canonicalize().unwrap()).unwrap();
        (dir, path)
    }

    #[test]
    fn test_walk_reports_nested_files() {
        let (_guard, root) = tempdir();
        fs::create_dir_all(root.join("sub")).unwrap();
        fs::write(root.join("a.txt"), b"abc").unwrap();
        fs::write(root.join("sub/b.txt"), b"defgh").unwrap();

        let workspace = FilesystemWorkspace::new();
        let mut seen = Vec::new();
        workspace
            .walk(&root, &mut |entry| {
                seen.push((entry.path.to_owned(), entry.length, entry.status));
            })
            .unwrap();
        seen.sort_by(|a, b| a.0.cmp(&b.0));

        assert_eq!(seen.len(), 2);
        assert_eq!(seen[0], (root.join("a.txt"), 3, ResourceStatus::New));
        assert_eq!(seen[1], (root.join("sub/b.txt"), 5, ResourceStatus::New));
    }

    #[test]
    fn test_resource_status() {
        let (_guard, root) = tempdir();
        let file = root.join("a.txt");
        fs::write(&file, b"abc").unwrap();

        let workspace = FilesystemWorkspace::new();
        let (mtime, length) = workspace.stat(&file).unwrap();

        assert_eq!(
            workspace.resource_status(&file, mtime, length),
            ResourceStatus::Unmodified
        );
        assert_eq!(
            workspace.resource_status(&file, mtime, length + 1),
            ResourceStatus::Modified
        );
        assert_eq!(
            workspace.resource_status(&root.join("gone.txt"), mtime, length),
            ResourceStatus::Removed
        );
    }

    #[test]
    fn test_output_stream_replaces_on_close() {
        let (_guard, root) = tempdir();
        let target = root.join("out/dist.bin");
        let workspace = FilesystemWorkspace::new();

        let mut stream = workspace.open_output(&target).unwrap();
        stream.write_all(b"first").unwrap();
        stream.close().unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"first");

        // a dropped stream leaves the previous contents alone
        let mut stream = workspace.open_output(&target).unwrap();
        stream.write_all(b"aborted").unwrap();
        drop(stream);
        assert_eq!(fs::read(&target).unwrap(), b"first");

        let mut stream = workspace.open_output(&target).unwrap();
        stream.write_all(b"second").unwrap();
        stream.close().unwrap();
        assert_eq!(fs::read(&target).unwrap(), b"second");
    }

    #[test]
    fn test_delete_missing_file_is_ok() {
        let (_guard, root) = tempdir();
        let workspace = FilesystemWorkspace::new();

        assert!(workspace.delete_file(&root.join("missing.txt")).is_ok());
    }

    #[test]
    fn test_is_present_rejects_directories() {
        let (_guard, root) = tempdir();
        let workspace = FilesystemWorkspace::new();

        assert!(!workspace.is_present(&root));
        fs::write(root.join("a.txt"), b"x").unwrap();
        assert!(workspace.is_present(&root.join("a.txt")));
    }
}
