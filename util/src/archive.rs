//! Struct archiving functionality
//!
//! To add archiving functionality to a struct implement the `Archived` trait.
//!
//! Modules running in the cyclic context shall not write files themselves,
//! instead they push records to an `ArchiveThread` which owns the `Archiver`
//! and does the file I/O in the background.

// ---------------------------------------------------------------------------
// IMPORTS
// ---------------------------------------------------------------------------

// External imports
use std::path::Path;
use std::fs::{File, OpenOptions};
use std::sync::mpsc::{sync_channel, SyncSender, TrySendError};
use std::thread::{self, JoinHandle};
use csv::WriterBuilder;
use log::warn;
pub use csv::Writer;
use serde::Serialize;

// Internal imports
use crate::session::Session;

// ---------------------------------------------------------------------------
// DATA STRUCTURES
// ---------------------------------------------------------------------------

/// An object used to write CSV archive files.
///
/// The default archiver has no open file and silently drops records, so that
/// modules built without a session (for example in tests) can still call
/// `write`.
#[derive(Default)]
pub struct Archiver {
    writer: Option<Writer<File>>
}

/// Background thread writing records into an `Archiver`.
///
/// Records are passed over a bounded queue. Pushing never blocks: if the
/// queue is full the record is dropped and counted. The default instance has
/// no thread and drops every record.
pub struct ArchiveThread<T> {
    tx: Option<SyncSender<T>>,
    jh: Option<JoinHandle<()>>,
    num_dropped: u64
}

// ---------------------------------------------------------------------------
// TRAITS
// ---------------------------------------------------------------------------

/// A trait which enables a struct to be archived as a csv.
///
/// To implement this trait, the struct shall have an `Archiver` member which
/// is opened in the struct's `init` function.
pub trait Archived {
    /// Write the archives for this struct
    fn write(&mut self) -> Result<(), Box<dyn std::error::Error>>;
}

// ---------------------------------------------------------------------------
// IMPLEMENTATIONS
// ---------------------------------------------------------------------------

impl Archiver {
    /// Create a new archiver from a paricular path relative to the session's
    /// archive root. Parent directories are created if needed.
    pub fn from_path<P: AsRef<Path>>(
        session: &Session, path: P
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let session_path = session.arch_root.join(path);

        if let Some(parent) = session_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        Self::from_file_path(session_path)
    }

    /// Create a new archiver writing to the given file, truncating it.
    pub fn from_file_path<P: AsRef<Path>>(
        path: P
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let file = OpenOptions::new()
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)?;

        let w = WriterBuilder::new()
            .has_headers(true)
            .from_writer(file);

        Ok(Self {
            writer: Some(w)
        })
    }

    /// Returns true if the archiver has an open file.
    pub fn is_open(&self) -> bool {
        self.writer.is_some()
    }

    /// Serialise a record into the archive.
    pub fn serialise<T: Serialize>(
        &mut self, record: T
    ) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(ref mut w) = self.writer {
            w.serialize(record)?;
        }

        Ok(())
    }

    /// Flush any buffered records to the file.
    pub fn flush(&mut self) -> Result<(), Box<dyn std::error::Error>> {
        if let Some(ref mut w) = self.writer {
            w.flush()?;
        }

        Ok(())
    }
}

impl<T: Serialize + Send + 'static> ArchiveThread<T> {
    /// Start a thread writing into `archiver`, queueing at most `capacity`
    /// records.
    pub fn spawn(
        mut archiver: Archiver, capacity: usize, name: &str
    ) -> Result<Self, std::io::Error> {
        let (tx, rx) = sync_channel::<T>(capacity);
        let name = name.to_string();

        let jh = thread::Builder::new()
            .name(format!("arch_{}", name))
            .spawn(move || {
                // Runs until every sender has been dropped
                for record in rx {
                    if let Err(e) = archiver.serialise(record) {
                        warn!("Could not archive {} record: {}", name, e);
                    }
                }

                if let Err(e) = archiver.flush() {
                    warn!("Could not flush the {} archive: {}", name, e);
                }
            })?;

        Ok(Self {
            tx: Some(tx),
            jh: Some(jh),
            num_dropped: 0
        })
    }

    /// Queue a record for archiving without blocking.
    ///
    /// A record which doesn't fit in the queue is dropped. An error is only
    /// returned if the background thread has stopped.
    pub fn push(&mut self, record: T) -> Result<(), Box<dyn std::error::Error>> {
        let tx = match self.tx {
            Some(ref tx) => tx,
            None => return Ok(())
        };

        match tx.try_send(record) {
            Ok(()) => Ok(()),
            Err(TrySendError::Full(_)) => {
                self.num_dropped += 1;
                Ok(())
            },
            Err(TrySendError::Disconnected(_)) => {
                Err("the archive thread has stopped".into())
            }
        }
    }

    /// Returns true if records are being written to a file.
    pub fn is_running(&self) -> bool {
        self.tx.is_some()
    }

    /// Number of records dropped because the queue was full.
    pub fn num_dropped(&self) -> u64 {
        self.num_dropped
    }
}

impl<T> Default for ArchiveThread<T> {
    fn default() -> Self {
        Self {
            tx: None,
            jh: None,
            num_dropped: 0
        }
    }
}

impl<T> Drop for ArchiveThread<T> {
    /// Close the queue and wait for the queued records to be written.
    fn drop(&mut self) {
        self.tx.take();

        if let Some(jh) = self.jh.take() {
            if jh.join().is_err() {
                warn!("Archive thread panicked");
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[derive(Serialize)]
    struct Record {
        index: usize,
        dist_m: f64,
    }

    #[test]
    fn test_unopened_archiver_is_noop() {
        let mut arch = Archiver::default();
        assert!(!arch.is_open());
        arch.serialise(Record { index: 1, dist_m: 0.5 }).unwrap();
    }

    #[test]
    fn test_archive_writes_csv() {
        let path = std::env::temp_dir()
            .join(format!("util_archive_test_{}.csv", std::process::id()));

        {
            let mut arch = Archiver::from_file_path(&path).unwrap();
            arch.serialise(Record { index: 1, dist_m: 0.5 }).unwrap();
            arch.serialise(Record { index: 2, dist_m: 1.5 }).unwrap();
        }

        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(contents, "index,dist_m\n1,0.5\n2,1.5\n");
    }

    #[test]
    fn test_default_archive_thread_is_noop() {
        let mut arch: ArchiveThread<Record> = ArchiveThread::default();
        assert!(!arch.is_running());
        arch.push(Record { index: 1, dist_m: 0.5 }).unwrap();
        assert_eq!(arch.num_dropped(), 0);
    }

    #[test]
    fn test_archive_thread_writes_in_background() {
        let path = std::env::temp_dir()
            .join(format!("util_archive_thread_test_{}.csv", std::process::id()));

        {
            let mut arch = ArchiveThread::spawn(
                Archiver::from_file_path(&path).unwrap(), 
                64,
                "test"
            ).unwrap();
            assert!(arch.is_running());

            for i in 0..10 {
                arch.push(Record { index: i, dist_m: i as f64 }).unwrap();
            }

            assert_eq!(arch.num_dropped(), 0);
        }

        // Dropping the thread handle writes everything still queued
        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        assert_eq!(contents.lines().count(), 11);
        assert!(contents.starts_with("index,dist_m\n0,0.0\n1,1.0\n"));
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let path = std::env::temp_dir()
            .join(format!("util_archive_full_test_{}.csv", std::process::id()));

        let mut arch = ArchiveThread::spawn(
            Archiver::from_file_path(&path).unwrap(), 
            1,
            "test"
        ).unwrap();

        // A queue of one cannot keep up with a burst of pushes, none of them
        // may block or fail
        let num_pushed = 10_000;
        let start = std::time::Instant::now();
        for i in 0..num_pushed {
            arch.push(Record { index: i, dist_m: 0.0 }).unwrap();
        }
        assert!(start.elapsed() < std::time::Duration::from_secs(1));
        let num_dropped = arch.num_dropped();

        drop(arch);
        let contents = std::fs::read_to_string(&path).unwrap();
        std::fs::remove_file(&path).ok();

        // Every record was either written or counted as dropped
        let num_written = contents.lines().count().saturating_sub(1);
        assert_eq!(num_written as u64 + num_dropped, num_pushed as u64);
    }
}
