//! Bounded worker pool.
//!
//! A fixed fleet of OS threads drains a bounded task channel. Shutdown is
//! signalled by closing a quit channel; in-flight tasks observe it through
//! the pool's cancellation token. When a memory limit is configured,
//! submissions stall while the process is over it.

use crossbeam_channel::{bounded, select, Receiver, Sender};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

/// A unit of work. Invoked with the pool's cancellation token.
pub type Task = Box<dyn FnOnce(&CancelToken) -> anyhow::Result<()> + Send + 'static>;

/// How long a stalled submission sleeps between memory probes.
const MEMORY_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Cooperative cancellation flag shared between the pool and its tasks.
#[derive(Clone, Debug, Default)]
pub struct CancelToken {
    flag: Arc<AtomicBool>,
}

impl CancelToken {
    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Relaxed)
    }

    fn cancel(&self) {
        self.flag.store(true, Ordering::Relaxed);
    }
}

pub struct WorkerPool {
    task_tx: Option<Sender<Task>>,
    task_rx: Receiver<Task>,
    quit_tx: Option<Sender<()>>,
    quit_rx: Receiver<()>,
    cancel: CancelToken,
    workers: Vec<JoinHandle<()>>,
    max_workers: usize,
    max_memory_mb: u64,
}

impl WorkerPool {
    /// Creates a stopped pool. The task queue holds `max_workers * 10`
    /// entries; submissions beyond that block until a worker drains one.
    pub fn new(max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        let (task_tx, task_rx) = bounded(max_workers * 10);
        let (quit_tx, quit_rx) = bounded(0);
        Self {
            task_tx: Some(task_tx),
            task_rx,
            quit_tx: Some(quit_tx),
            quit_rx,
            cancel: CancelToken::default(),
            workers: Vec::new(),
            max_workers,
            max_memory_mb: 0,
        }
    }

    /// Caps process memory; submissions stall while RSS is at or above the
    /// limit. Zero disables the gate.
    pub fn with_memory_limit(mut self, max_memory_mb: u64) -> Self {
        self.max_memory_mb = max_memory_mb;
        self
    }

    pub fn set_memory_limit(&mut self, max_memory_mb: u64) {
        self.max_memory_mb = max_memory_mb;
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Spins up the workers.
    pub fn start(&mut self) {
        if !self.workers.is_empty() {
            return;
        }
        for id in 0..self.max_workers {
            let task_rx = self.task_rx.clone();
            let quit_rx = self.quit_rx.clone();
            let cancel = self.cancel.clone();
            let handle = thread::Builder::new()
                .name(format!("pool-worker-{}", id))
                .spawn(move || worker_loop(task_rx, quit_rx, cancel))
                .expect("failed to spawn pool worker");
            self.workers.push(handle);
        }
    }

    /// Enqueues a task, stalling first if the memory gate is closed.
    /// Returns silently if the pool is stopped while waiting.
    pub fn submit(&self, task: Task) {
        let task_tx = match &self.task_tx {
            Some(tx) => tx,
            None => return,
        };

        while !self.memory_ok() {
            log::warn!(
                "memory limit exceeded ({} MB), stalling submission",
                self.max_memory_mb
            );
            match self.quit_rx.recv_timeout(MEMORY_POLL_INTERVAL) {
                // Shutdown wins over the stall.
                Ok(()) => return,
                Err(crossbeam_channel::RecvTimeoutError::Disconnected) => return,
                Err(crossbeam_channel::RecvTimeoutError::Timeout) => {}
            }
        }

        select! {
            send(task_tx, task) -> res => {
                if res.is_err() {
                    log::debug!("task dropped: pool already stopped");
                }
            }
            recv(self.quit_rx) -> _ => {}
        }
    }

    /// Signals cancellation, closes the channels, and waits for every
    /// worker to exit. Queued-but-unstarted tasks may be discarded.
    pub fn stop(&mut self) {
        self.cancel.cancel();
        self.quit_tx.take();
        self.task_tx.take();
        for handle in self.workers.drain(..) {
            let _ = handle.join();
        }
        log::debug!("worker pool stopped");
    }

    fn memory_ok(&self) -> bool {
        if self.max_memory_mb == 0 {
            return true;
        }
        let usage_mb = current_rss_bytes() / (1024 * 1024);
        usage_mb < self.max_memory_mb
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        if !self.workers.is_empty() {
            self.stop();
        }
    }
}

fn worker_loop(task_rx: Receiver<Task>, quit_rx: Receiver<()>, cancel: CancelToken) {
    loop {
        select! {
            recv(task_rx) -> msg => match msg {
                Ok(task) => {
                    if let Err(e) = task(&cancel) {
                        log::debug!("task error: {:#}", e);
                    }
                }
                Err(_) => return,
            },
            recv(quit_rx) -> _ => return,
        }
    }
}

/// Current process resident set size, best effort. A probe failure reads
/// as zero, which the gate treats as "within limit".
#[cfg(target_os = "linux")]
fn current_rss_bytes() -> u64 {
    statm_rss_bytes().unwrap_or_else(rusage_maxrss_bytes)
}

#[cfg(all(unix, not(target_os = "linux")))]
fn current_rss_bytes() -> u64 {
    rusage_maxrss_bytes()
}

#[cfg(not(unix))]
fn current_rss_bytes() -> u64 {
    0
}

#[cfg(target_os = "linux")]
fn statm_rss_bytes() -> Option<u64> {
    let statm = std::fs::read_to_string("/proc/self/statm").ok()?;
    let rss_pages: u64 = statm.split_whitespace().nth(1)?.parse().ok()?;
    let page_size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    let page_size = if page_size > 0 { page_size as u64 } else { 4096 };
    Some(rss_pages * page_size)
}

/// High-water RSS via getrusage. Linux/BSD report KiB, macOS bytes.
#[cfg(unix)]
fn rusage_maxrss_bytes() -> u64 {
    // SAFETY: a zeroed rusage is a valid out-parameter and the error
    // return is checked.
    let ru = unsafe {
        let mut ru: libc::rusage = std::mem::zeroed();
        if libc::getrusage(libc::RUSAGE_SELF, &mut ru) != 0 {
            return 0;
        }
        ru
    };
    let rss = if ru.ru_maxrss <= 0 {
        0
    } else {
        ru.ru_maxrss as u64
    };
    #[cfg(target_os = "macos")]
    {
        rss
    }
    #[cfg(not(target_os = "macos"))]
    {
        rss.saturating_mul(1024)
    }
}
