//! crates/backup/src/sink.rs
//!
//! [`OutputSink`]: the write destination abstraction the backup engine
//! writes stream files into, so it never cares whether the destination is
//! a plain directory or a single zip archive streamed to stdout.

use std::fs::{self, File};
use std::io::{self, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// A writable entry inside an [`OutputSink`].
///
/// `set_len`/`seek_to` are only meaningful for the `Raw` stream type (§4.D
/// step 6); an entry that does not support pre-sizing or seeking (e.g. a
/// zip archive member) returns an error rather than silently ignoring the
/// call.
pub trait SinkWriter: Write + Send {
    /// Pre-sizes the entry to `len` bytes, truncating or sparse-extending
    /// as the backing store allows.
    fn set_len(&mut self, len: u64) -> io::Result<()>;
    /// Seeks to `offset` bytes from the start of the entry.
    fn seek_to(&mut self, offset: u64) -> io::Result<()>;
}

/// Where the backup engine writes stream files, qcow sidecars, the domain
/// configuration, and the chain file.
pub trait OutputSink: Send + Sync {
    /// Opens `name` for writing. Overwrites any existing entry of the same
    /// name.
    fn create(&self, name: &str) -> io::Result<Box<dyn SinkWriter>>;

    /// Finalizes a successfully written entry. For a filesystem sink, this
    /// is an atomic rename from `partial_name` to `final_name`; for a zip
    /// archive, entries are already final once written (there is no
    /// `.partial` concept inside a zip central directory) and this is a
    /// no-op.
    fn finalize(&self, partial_name: &str, final_name: &str) -> io::Result<()>;

    /// Whether this sink supports the `.partial`-then-rename discipline.
    /// `false` means callers must write directly under the final name,
    /// since there is no way to rename an already-written entry (a zip
    /// archive's central directory has no rename operation).
    fn supports_partial(&self) -> bool;
}

struct FsWriter(File);

impl Write for FsWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        self.0.flush()
    }
}

impl SinkWriter for FsWriter {
    fn set_len(&mut self, len: u64) -> io::Result<()> {
        self.0.set_len(len)
    }
    fn seek_to(&mut self, offset: u64) -> io::Result<()> {
        self.0.seek(SeekFrom::Start(offset)).map(|_| ())
    }
}

/// A plain directory: real files, `.partial` working names, atomic rename
/// on success.
pub struct FsOutputSink {
    root: PathBuf,
}

impl FsOutputSink {
    /// Writes into `root`, which must already exist.
    #[must_use]
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

impl OutputSink for FsOutputSink {
    fn create(&self, partial_name: &str) -> io::Result<Box<dyn SinkWriter>> {
        let file = File::create(self.root.join(partial_name))?;
        Ok(Box::new(FsWriter(file)))
    }

    fn finalize(&self, partial_name: &str, final_name: &str) -> io::Result<()> {
        fs::rename(self.root.join(partial_name), self.root.join(final_name))
    }

    fn supports_partial(&self) -> bool {
        true
    }
}

struct ZipEntryWriter<'a, W: Write + Seek + Send> {
    archive: &'a Mutex<ZipWriter<W>>,
}

impl<W: Write + Seek + Send> Write for ZipEntryWriter<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut archive = self.archive.lock().expect("zip writer mutex poisoned");
        archive.write(buf)
    }
    fn flush(&mut self) -> io::Result<()> {
        let mut archive = self.archive.lock().expect("zip writer mutex poisoned");
        archive.flush()
    }
}

impl<W: Write + Seek + Send> SinkWriter for ZipEntryWriter<'_, W> {
    fn set_len(&mut self, _len: u64) -> io::Result<()> {
        Err(io::Error::other("zip output sink does not support pre-sizing entries (Raw stream type is not supported here)"))
    }
    fn seek_to(&mut self, _offset: u64) -> io::Result<()> {
        Err(io::Error::other("zip output sink does not support seeking within an entry (Raw stream type is not supported here)"))
    }
}

/// A single zip archive, used for `-o -` stdout-zip mode. Every write goes
/// through one `Mutex<ZipWriter<_>>`, matching the single-writer discipline
/// the concurrency model requires when the sink is a zip archive; the
/// orchestrator is responsible for pinning `worker` to 1 when this sink is
/// selected, since a zip archive can only have one entry open at a time.
pub struct ZipOutputSink<W: Write + Seek + Send> {
    archive: Mutex<ZipWriter<W>>,
}

impl<W: Write + Seek + Send> ZipOutputSink<W> {
    /// Wraps `writer` in a fresh zip archive.
    #[must_use]
    pub fn new(writer: W) -> Self {
        Self { archive: Mutex::new(ZipWriter::new(writer)) }
    }

    /// Finishes the archive, flushing the central directory, and returns
    /// the underlying writer.
    pub fn finish(self) -> zip::result::ZipResult<W> {
        self.archive.into_inner().expect("zip writer mutex poisoned").finish()
    }
}

impl<W: Write + Seek + Send> OutputSink for ZipOutputSink<W> {
    fn create(&self, partial_name: &str) -> io::Result<Box<dyn SinkWriter>> {
        {
            let mut archive = self.archive.lock().expect("zip writer mutex poisoned");
            archive
                .start_file(partial_name, SimpleFileOptions::default())
                .map_err(io::Error::other)?;
        }
        Ok(Box::new(ZipEntryWriter { archive: &self.archive }) as Box<dyn SinkWriter>)
    }

    fn finalize(&self, _partial_name: &str, _final_name: &str) -> io::Result<()> {
        Ok(())
    }

    fn supports_partial(&self) -> bool {
        false
    }
}

/// Returns the final stream-file destination path for a filesystem sink,
/// used by callers that need the path directly (e.g. to write a qcow
/// sidecar alongside it) rather than through the [`OutputSink`] trait.
#[must_use]
pub fn fs_sink_path(root: &Path, name: &str) -> PathBuf {
    root.join(name)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Read;
    use tempfile::tempdir;

    #[test]
    fn fs_sink_writes_under_partial_then_renames() {
        let dir = tempdir().unwrap();
        let sink = FsOutputSink::new(dir.path());
        {
            let mut writer = sink.create("vda.full.data.partial").unwrap();
            writer.write_all(b"hello").unwrap();
        }
        assert!(dir.path().join("vda.full.data.partial").exists());
        sink.finalize("vda.full.data.partial", "vda.full.data").unwrap();
        assert!(!dir.path().join("vda.full.data.partial").exists());
        let mut contents = String::new();
        File::open(dir.path().join("vda.full.data")).unwrap().read_to_string(&mut contents).unwrap();
        assert_eq!(contents, "hello");
    }

    #[test]
    fn fs_sink_writer_supports_truncate_and_seek() {
        let dir = tempdir().unwrap();
        let sink = FsOutputSink::new(dir.path());
        let mut writer = sink.create("vda.raw.partial").unwrap();
        writer.set_len(16).unwrap();
        writer.seek_to(8).unwrap();
        writer.write_all(b"abcd").unwrap();
        drop(writer);
        let metadata = fs::metadata(dir.path().join("vda.raw.partial")).unwrap();
        assert_eq!(metadata.len(), 16);
    }

    #[test]
    fn zip_sink_writes_an_entry() {
        let buf = io::Cursor::new(Vec::new());
        let sink = ZipOutputSink::new(buf);
        {
            let mut writer = sink.create("vda.full.data").unwrap();
            writer.write_all(b"zipped payload").unwrap();
        }
        let buf = sink.finish().unwrap();
        let mut archive = zip::ZipArchive::new(buf).unwrap();
        let mut entry = archive.by_name("vda.full.data").unwrap();
        let mut contents = Vec::new();
        entry.read_to_end(&mut contents).unwrap();
        assert_eq!(contents, b"zipped payload");
    }

    #[test]
    fn zip_sink_rejects_raw_mode_operations() {
        let buf = io::Cursor::new(Vec::new());
        let sink = ZipOutputSink::new(buf);
        let mut writer = sink.create("vda.raw").unwrap();
        assert!(writer.set_len(10).is_err());
        assert!(writer.seek_to(0).is_err());
    }
}
