// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Thread-safe batched writer for JSON-Lines log files.
//!
//! `write` only enqueues; lines reach the disk in batches when the periodic
//! ticker fires, when the pending count crosses the threshold, or on an
//! explicit `flush`/`close`. At most one flush runs against a sink at a
//! time: opportunistic triggers (ticker, threshold) skip when another flush
//! is in flight, while `flush` and `close` wait for it.

use std::fs::{self, File, OpenOptions};
use std::io::{self, BufWriter, Write as _};
use std::path::Path;
use std::sync::atomic::{AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, TryLockError, Weak};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use crate::error::SinkError;

/// Flush at least this often while the sink is open.
const FLUSH_INTERVAL: Duration = Duration::from_millis(500);

/// A write that brings the pending count to this many lines flushes inline.
const FLUSH_THRESHOLD: usize = 32;

const WRITER_BUF_SIZE: usize = 8192;

const STATE_OPEN: u8 = 0;
const STATE_CLOSING: u8 = 1;
const STATE_CLOSED: u8 = 2;

/// Lifecycle of a [`FileSink`]. Writes are accepted only while `Open`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkState {
    /// Accepting writes; the flush ticker is running.
    Open,
    /// The final drain is in progress.
    Closing,
    /// The file handle has been released; writes are silently dropped.
    Closed,
}

/// Batched file sink for formatted log lines.
///
/// The target file is created (or truncated) on `open` and held with
/// shared-read sharing, so external processes can tail it while the sink
/// writes. Handles are cheap to clone and all clones feed the same file;
/// when the last handle drops without an explicit [`close`](FileSink::close),
/// the final drain still runs best-effort.
#[derive(Clone)]
pub struct FileSink {
    shared: Arc<Shared>,
}

struct Shared {
    tx: mpsc::UnboundedSender<String>,
    /// Lines enqueued since the last flush started; crossing
    /// [`FLUSH_THRESHOLD`] triggers an inline flush on the writing thread.
    pending: AtomicUsize,
    state: AtomicU8,
    cancel: CancellationToken,
    channel: Mutex<Channel>,
}

/// Destination of a drain: a buffered file writer in production, anything
/// `io::Write` otherwise.
type LineWriter = Box<dyn io::Write + Send>;

/// Everything the single-flusher critical section owns.
struct Channel {
    rx: mpsc::UnboundedReceiver<String>,
    /// `None` once closed and the file handle released.
    writer: Option<LineWriter>,
    /// Line whose write failed mid-drain; the next flush retries it first so
    /// dequeue order is preserved and nothing is silently dropped.
    carry: Option<String>,
}

impl FileSink {
    /// Creates (or truncates) the log file at `path` and starts the periodic
    /// flush ticker. Parent directories are created as needed.
    ///
    /// Must be called within a Tokio runtime; the ticker runs as a
    /// background task until [`close`](FileSink::close). Fails only when the
    /// file or a parent directory cannot be created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, SinkError> {
        let path = path.as_ref();
        let file = create_shared_read(path).map_err(|source| SinkError::Create {
            path: path.to_path_buf(),
            source,
        })?;

        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            tx,
            pending: AtomicUsize::new(0),
            state: AtomicU8::new(STATE_OPEN),
            cancel: CancellationToken::new(),
            channel: Mutex::new(Channel {
                rx,
                writer: Some(Box::new(BufWriter::with_capacity(WRITER_BUF_SIZE, file))),
                carry: None,
            }),
        });

        // The ticker holds a weak reference so an abandoned sink can still
        // drop, run its final drain, and stop the task.
        tokio::spawn(run_ticker(Arc::downgrade(&shared)));

        debug!("Opened log sink at {}", path.display());
        Ok(FileSink { shared })
    }

    /// Enqueues one formatted line.
    ///
    /// Never blocks on disk I/O, except that the call whose line brings the
    /// pending count to the threshold performs the flush itself before
    /// returning. Once the sink has left the Open state this is a silent
    /// no-op, so producers need no shutdown coordination.
    pub fn write(&self, line: impl Into<String>) {
        let shared = &self.shared;
        if shared.state.load(Ordering::Acquire) != STATE_OPEN {
            return;
        }
        // Send fails only when the receiver closed between the state check
        // and here; dropping the line matches the write-after-close contract.
        if shared.tx.send(line.into()).is_err() {
            return;
        }
        if shared.pending.fetch_add(1, Ordering::AcqRel) + 1 >= FLUSH_THRESHOLD {
            if let Err(e) = shared.try_flush() {
                error!("Threshold-triggered flush failed, lines stay queued: {e}");
            }
        }
    }

    /// Drains everything currently queued and flushes OS buffers so the
    /// file's contents are visible to readers.
    ///
    /// Unlike the ticker and threshold triggers, this waits for any
    /// in-flight flush instead of skipping, and surfaces disk errors.
    pub fn flush(&self) -> Result<(), SinkError> {
        self.shared.flush_blocking()
    }

    /// Stops the ticker, drains the queue to empty, flushes and releases
    /// the file handle.
    ///
    /// Idempotent: only the first call performs the final drain, later calls
    /// (and later [`write`](FileSink::write)s) are no-ops.
    pub fn close(&self) -> Result<(), SinkError> {
        self.shared.close()
    }

    /// Current lifecycle state.
    pub fn state(&self) -> SinkState {
        match self.shared.state.load(Ordering::Acquire) {
            STATE_OPEN => SinkState::Open,
            STATE_CLOSING => SinkState::Closing,
            _ => SinkState::Closed,
        }
    }
}

#[allow(clippy::expect_used)]
impl Shared {
    /// Opportunistic flush: skips without error when another flush is in
    /// flight. The skipped trigger's lines stay queued and are picked up by
    /// the next flush to run.
    fn try_flush(&self) -> Result<(), SinkError> {
        let mut guard = match self.channel.try_lock() {
            Err(TryLockError::WouldBlock) => return Ok(()),
            other => other.expect("flush lock poisoned"),
        };
        self.drain(&mut guard)
    }

    fn flush_blocking(&self) -> Result<(), SinkError> {
        let mut guard = self.channel.lock().expect("flush lock poisoned");
        self.drain(&mut guard)
    }

    /// The single-flusher critical section: resets the pending count, then
    /// appends queued lines to the file in dequeue order until the queue is
    /// empty, and flushes the stream. Callers hold the channel lock.
    fn drain(&self, channel: &mut Channel) -> Result<(), SinkError> {
        // Writes landing during the drain re-accumulate the count on their
        // own; they are still picked up by the loop below if they arrive in
        // time, and by the next trigger otherwise.
        self.pending.store(0, Ordering::Release);

        let Some(writer) = channel.writer.as_mut() else {
            return Ok(());
        };

        if let Some(line) = channel.carry.take() {
            if let Err(source) = write_line(writer, &line) {
                channel.carry = Some(line);
                return Err(SinkError::Flush(source));
            }
        }
        while let Ok(line) = channel.rx.try_recv() {
            if let Err(source) = write_line(writer, &line) {
                channel.carry = Some(line);
                return Err(SinkError::Flush(source));
            }
        }

        writer.flush().map_err(SinkError::Flush)
    }

    fn close(&self) -> Result<(), SinkError> {
        if self
            .state
            .compare_exchange(
                STATE_OPEN,
                STATE_CLOSING,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_err()
        {
            return Ok(());
        }

        // Stop the ticker first so no automatic flush races the final drain.
        self.cancel.cancel();

        let mut guard = self.channel.lock().expect("flush lock poisoned");
        // Refuse further sends; everything already enqueued is still drained.
        guard.rx.close();
        let result = self.drain(&mut guard);
        // Release the handle even when the drain failed: close is the last
        // trigger, and it reports the loss to its caller instead of holding
        // the file forever.
        drop(guard.writer.take());
        self.state.store(STATE_CLOSED, Ordering::Release);

        debug!("Log sink closed");
        result
    }
}

impl Drop for Shared {
    fn drop(&mut self) {
        // Last handle gone without an explicit close.
        if let Err(e) = self.close() {
            error!("Final drain on drop failed: {e}");
        }
    }
}

async fn run_ticker(shared: Weak<Shared>) {
    let cancel = match shared.upgrade() {
        Some(shared) => shared.cancel.clone(),
        None => return,
    };

    let mut ticker = tokio::time::interval(FLUSH_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }
        let Some(shared) = shared.upgrade() else {
            break;
        };
        if let Err(e) = shared.try_flush() {
            error!("Periodic flush failed, lines stay queued: {e}");
        }
    }
    debug!("Flush ticker stopped");
}

fn write_line(writer: &mut impl io::Write, line: &str) -> io::Result<()> {
    writer.write_all(line.as_bytes())?;
    writer.write_all(b"\n")
}

/// Opens `path` for writing (create/truncate) with shared-read sharing so
/// external readers can tail the file while the sink holds it. Creates
/// missing parent directories first.
fn create_shared_read(path: &Path) -> io::Result<File> {
    if let Some(dir) = path.parent() {
        if !dir.as_os_str().is_empty() {
            fs::create_dir_all(dir)?;
        }
    }

    let mut options = OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(windows)]
    {
        use std::os::windows::fs::OpenOptionsExt;
        // FILE_SHARE_READ; POSIX platforms share by default.
        options.share_mode(0x1);
    }
    options.open(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    /// Writer that fails on demand and records what reached it.
    struct FlakyWriter {
        fail: Arc<AtomicBool>,
        written: Arc<Mutex<Vec<u8>>>,
    }

    impl io::Write for FlakyWriter {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            if self.fail.load(Ordering::Acquire) {
                return Err(io::Error::other("disk full"));
            }
            self.written
                .lock()
                .expect("written lock")
                .extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            if self.fail.load(Ordering::Acquire) {
                return Err(io::Error::other("disk full"));
            }
            Ok(())
        }
    }

    fn shared_with_flaky_writer() -> (Arc<Shared>, Arc<AtomicBool>, Arc<Mutex<Vec<u8>>>) {
        let fail = Arc::new(AtomicBool::new(false));
        let written = Arc::new(Mutex::new(Vec::new()));
        let (tx, rx) = mpsc::unbounded_channel();
        let shared = Arc::new(Shared {
            tx,
            pending: AtomicUsize::new(0),
            state: AtomicU8::new(STATE_OPEN),
            cancel: CancellationToken::new(),
            channel: Mutex::new(Channel {
                rx,
                writer: Some(Box::new(FlakyWriter {
                    fail: Arc::clone(&fail),
                    written: Arc::clone(&written),
                })),
                carry: None,
            }),
        });
        (shared, fail, written)
    }

    fn written_string(written: &Mutex<Vec<u8>>) -> String {
        String::from_utf8(written.lock().expect("written lock").clone()).expect("utf8 output")
    }

    #[test]
    fn failed_drain_keeps_lines_queued_and_retries_in_order() {
        let (shared, fail, written) = shared_with_flaky_writer();
        for n in 0..3 {
            shared.tx.send(format!("line {n}")).expect("send");
        }

        fail.store(true, Ordering::Release);
        let result = shared.flush_blocking();
        assert!(matches!(result, Err(SinkError::Flush(_))));
        // Nothing reached the file, nothing was dropped.
        assert!(written.lock().expect("written lock").is_empty());

        fail.store(false, Ordering::Release);
        shared.flush_blocking().expect("retry succeeds");
        assert_eq!(written_string(&written), "line 0\nline 1\nline 2\n");
    }

    #[test]
    fn mid_queue_failure_preserves_order_across_flushes() {
        let (shared, fail, written) = shared_with_flaky_writer();
        shared.tx.send("first".to_owned()).expect("send");
        shared.flush_blocking().expect("healthy flush");

        shared.tx.send("second".to_owned()).expect("send");
        shared.tx.send("third".to_owned()).expect("send");
        fail.store(true, Ordering::Release);
        assert!(shared.flush_blocking().is_err());

        fail.store(false, Ordering::Release);
        shared.flush_blocking().expect("retry succeeds");
        assert_eq!(written_string(&written), "first\nsecond\nthird\n");
    }

    #[test]
    fn close_surfaces_drain_errors_and_still_releases_the_writer() {
        let (shared, fail, written) = shared_with_flaky_writer();
        shared.tx.send("doomed".to_owned()).expect("send");

        fail.store(true, Ordering::Release);
        let result = shared.close();
        assert!(matches!(result, Err(SinkError::Flush(_))));
        assert_eq!(shared.state.load(Ordering::Acquire), STATE_CLOSED);
        assert!(shared.channel.lock().expect("channel lock").writer.is_none());
        assert!(written.lock().expect("written lock").is_empty());

        // Still idempotent after a failed final drain.
        shared.close().expect("second close is a no-op");
    }
}
