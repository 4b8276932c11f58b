//! Dump channel (§4.I): adapts a [`RecordChannel`] to spool rows to files
//! instead of streaming them to the caller, ported from
//! `jogasaki::executor::file::dump_channel` (`dump`/`load` executors use the
//! same split between an upstream channel and a directory of output files).
//!
//! Each acquired writer spools rows into its own file under `directory`,
//! rotating to a fresh file once `max_records_per_file` is reached, and
//! reports every filename it produced as a row written to the *parent*
//! channel (so a client doing `SELECT * FROM TABLE(dump(...))` sees a result
//! set of file paths). The final file-name row order across multiple
//! writers is not constrained — each writer reports only its own files,
//! independently.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::{ErrorCode, ErrorInfo};
use crate::record_channel::{RecordChannel, RecordWriter};
use sqlexec_record::RecordMeta;

pub struct DumpChannel {
    parent: Arc<dyn RecordChannel>,
    directory: PathBuf,
    max_records_per_file: usize,
    file_seq: Arc<AtomicU64>,
}

impl DumpChannel {
    pub fn new(parent: Arc<dyn RecordChannel>, directory: impl Into<PathBuf>, max_records_per_file: usize) -> Self {
        Self {
            parent,
            directory: directory.into(),
            max_records_per_file: max_records_per_file.max(1),
            file_seq: Arc::new(AtomicU64::new(0)),
        }
    }
}

impl RecordChannel for DumpChannel {
    fn meta(&self, meta: RecordMeta) {
        self.parent.meta(meta);
    }

    fn acquire(&self, ordered: bool) -> Result<Box<dyn RecordWriter>, ErrorInfo> {
        std::fs::create_dir_all(&self.directory).map_err(|e| {
            ErrorInfo::new(ErrorCode::DumpDirectoryInaccessibleException, format!("{}: {e}", self.directory.display()))
        })?;
        let parent_writer = self.parent.acquire(ordered)?;
        Ok(Box::new(DumpWriter {
            directory: self.directory.clone(),
            max_records_per_file: self.max_records_per_file,
            file_seq: Arc::clone(&self.file_seq),
            current: None,
            produced_files: Vec::new(),
            parent_writer,
        }))
    }
}

struct CurrentFile {
    path: PathBuf,
    writer: BufWriter<File>,
    records: usize,
}

struct DumpWriter {
    directory: PathBuf,
    max_records_per_file: usize,
    file_seq: Arc<AtomicU64>,
    current: Option<CurrentFile>,
    produced_files: Vec<PathBuf>,
    parent_writer: Box<dyn RecordWriter>,
}

impl DumpWriter {
    fn open_new_file(&mut self) -> Result<(), ErrorInfo> {
        let seq = self.file_seq.fetch_add(1, Ordering::Relaxed);
        let path = self.directory.join(format!("dump-{seq:08}.bin"));
        let file = File::create(&path)
            .map_err(|e| ErrorInfo::new(ErrorCode::DumpFileIoException, format!("{}: {e}", path.display())))?;
        self.current = Some(CurrentFile { path, writer: BufWriter::new(file), records: 0 });
        Ok(())
    }

    fn close_current_file(&mut self) -> Result<(), ErrorInfo> {
        if let Some(mut current) = self.current.take() {
            current
                .writer
                .flush()
                .map_err(|e| ErrorInfo::new(ErrorCode::DumpFileIoException, format!("{}: {e}", current.path.display())))?;
            self.produced_files.push(current.path);
        }
        Ok(())
    }
}

impl RecordWriter for DumpWriter {
    /// Spool one row's wire bytes into the current file, length-prefixed
    /// (stand-in for the columnar Parquet-like layout the source writes;
    /// the rotation/filename contract is what this crate actually owns).
    fn write_row(&mut self, bytes: &[u8]) -> Result<(), ErrorInfo> {
        if self.current.is_none() {
            self.open_new_file()?;
        }
        if let Some(current) = &self.current {
            if current.records >= self.max_records_per_file {
                self.close_current_file()?;
                self.open_new_file()?;
            }
        }
        let current = self.current.as_mut().expect("just opened above");
        let len = bytes.len() as u32;
        current
            .writer
            .write_all(&len.to_le_bytes())
            .and_then(|_| current.writer.write_all(bytes))
            .map_err(|e| ErrorInfo::new(ErrorCode::DumpFileIoException, format!("{}: {e}", current.path.display())))?;
        current.records += 1;
        Ok(())
    }

    /// Close the current file (if any rows were spooled) and report every
    /// filename produced since the last commit as a row to the parent
    /// channel's writer.
    fn commit(&mut self) -> Result<(), ErrorInfo> {
        self.close_current_file()?;
        for path in self.produced_files.drain(..) {
            let mut encoder = sqlexec_record::stream::Encoder::new();
            encoder.row(1).character(path.to_string_lossy().as_bytes());
            self.parent_writer.write_row(&encoder.into_bytes())?;
        }
        self.parent_writer.commit()
    }
}

/// Read back rows spooled by [`DumpWriter`]; test/diagnostic helper, not
/// part of the production read path (dumped files are read by the external
/// load executor, out of scope here).
pub fn read_spooled_rows(path: &Path) -> std::io::Result<Vec<Vec<u8>>> {
    let bytes = std::fs::read(path)?;
    let mut rows = Vec::new();
    let mut cursor = bytes.as_slice();
    while !cursor.is_empty() {
        let (len_bytes, rest) = cursor.split_at(4);
        let len = u32::from_le_bytes(len_bytes.try_into().unwrap()) as usize;
        let (row, rest) = rest.split_at(len);
        rows.push(row.to_vec());
        cursor = rest;
    }
    Ok(rows)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record_channel::InMemoryChannel;
    use sqlexec_record::stream::{decode_row, StreamValue};

    #[test]
    fn rotates_files_at_threshold_and_reports_filenames_to_parent() {
        let dir = tempfile::tempdir().unwrap();
        let parent = InMemoryChannel::new();
        let dump = DumpChannel::new(parent.clone(), dir.path(), 2);

        let mut w = dump.acquire(false).unwrap();
        for i in 0..5u8 {
            w.write_row(&[i]).unwrap();
        }
        w.commit().unwrap();

        // 5 rows at 2/file -> 3 files.
        assert_eq!(parent.row_count(), 3);
        for row_bytes in parent.rows() {
            let mut cursor = row_bytes.as_slice();
            let fields = decode_row(&mut cursor);
            match &fields[0] {
                StreamValue::Character(name) => {
                    let path = dir.path().join(String::from_utf8(name.clone()).unwrap());
                    assert!(path.exists());
                }
                other => panic!("expected a character filename row, got {other:?}"),
            }
        }
    }

    #[test]
    fn spooled_rows_round_trip_through_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let parent = InMemoryChannel::new();
        let dump = DumpChannel::new(parent.clone(), dir.path(), 100);
        let mut w = dump.acquire(false).unwrap();
        w.write_row(b"abc").unwrap();
        w.write_row(b"de").unwrap();
        w.commit().unwrap();

        let mut cursor = parent.rows()[0].as_slice();
        let fields = decode_row(&mut cursor);
        let StreamValue::Character(name) = &fields[0] else { panic!("expected filename row") };
        let path = dir.path().join(String::from_utf8(name.clone()).unwrap());
        let rows = read_spooled_rows(&path).unwrap();
        assert_eq!(rows, vec![b"abc".to_vec(), b"de".to_vec()]);
    }
}
