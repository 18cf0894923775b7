use std::collections::HashMap;
use std::io;
use std::sync::{Mutex, RwLock};
use std::thread;
use std::time::Duration;

use ksio_types::Key;

use crate::error::{StoreError, StoreResult};
use crate::traits::StorageBackend;

/// Direction of a recorded transfer.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TransferKind {
    Read,
    Write,
}

/// One transfer observed by an [`InMemoryBackend`], in completion order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransferRecord {
    pub kind: TransferKind,
    pub key: Key,
    /// Bytes written, or bytes returned by a successful read.
    pub data: Vec<u8>,
    pub ok: bool,
}

#[derive(Default)]
struct Faults {
    reads: HashMap<Key, usize>,
    writes: HashMap<Key, usize>,
}

#[derive(Default)]
struct Activity {
    active: HashMap<Key, usize>,
    peak: HashMap<Key, usize>,
}

/// In-memory, HashMap-based storage backend.
///
/// Intended for tests and embedding. Besides storing content it keeps a log
/// of every transfer, tracks the peak number of simultaneous transfers per
/// key, can be told to fail upcoming transfers, and can simulate slow media
/// with a per-transfer delay.
pub struct InMemoryBackend {
    files: RwLock<HashMap<Key, Vec<u8>>>,
    log: Mutex<Vec<TransferRecord>>,
    faults: Mutex<Faults>,
    activity: Mutex<Activity>,
    latency: Duration,
    key_latency: RwLock<HashMap<Key, Duration>>,
}

impl InMemoryBackend {
    /// Create a new empty backend with no simulated latency.
    pub fn new() -> Self {
        Self {
            files: RwLock::new(HashMap::new()),
            log: Mutex::new(Vec::new()),
            faults: Mutex::new(Faults::default()),
            activity: Mutex::new(Activity::default()),
            latency: Duration::ZERO,
            key_latency: RwLock::new(HashMap::new()),
        }
    }

    /// Delay every transfer by `latency`.
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    /// Delay transfers on `key` by `latency` instead of the global delay.
    pub fn set_key_latency(&self, key: &Key, latency: Duration) {
        self.key_latency
            .write()
            .expect("lock poisoned")
            .insert(key.clone(), latency);
    }

    /// Store content directly, bypassing the transfer log.
    pub fn seed(&self, key: &Key, data: impl Into<Vec<u8>>) {
        self.files
            .write()
            .expect("lock poisoned")
            .insert(key.clone(), data.into());
    }

    /// Current content under `key`, bypassing the transfer log.
    pub fn get(&self, key: &Key) -> Option<Vec<u8>> {
        self.files.read().expect("lock poisoned").get(key).cloned()
    }

    /// Make the next read of `key` fail with an I/O error.
    pub fn fail_next_read(&self, key: &Key) {
        *self
            .faults
            .lock()
            .expect("lock poisoned")
            .reads
            .entry(key.clone())
            .or_default() += 1;
    }

    /// Make the next write of `key` fail with an I/O error. The stored
    /// content is left untouched.
    pub fn fail_next_write(&self, key: &Key) {
        *self
            .faults
            .lock()
            .expect("lock poisoned")
            .writes
            .entry(key.clone())
            .or_default() += 1;
    }

    /// Every transfer, in completion order.
    pub fn transfers(&self) -> Vec<TransferRecord> {
        self.log.lock().expect("lock poisoned").clone()
    }

    /// Successful and failed writes, in completion order.
    pub fn writes(&self) -> Vec<(Key, Vec<u8>)> {
        self.log
            .lock()
            .expect("lock poisoned")
            .iter()
            .filter(|r| r.kind == TransferKind::Write)
            .map(|r| (r.key.clone(), r.data.clone()))
            .collect()
    }

    /// Number of write transfers attempted.
    pub fn write_count(&self) -> usize {
        self.count(TransferKind::Write)
    }

    /// Number of read transfers attempted.
    pub fn read_count(&self) -> usize {
        self.count(TransferKind::Read)
    }

    /// Highest number of transfers ever observed running on `key` at once.
    pub fn peak_concurrency(&self, key: &Key) -> usize {
        self.activity
            .lock()
            .expect("lock poisoned")
            .peak
            .get(key)
            .copied()
            .unwrap_or(0)
    }

    fn count(&self, kind: TransferKind) -> usize {
        self.log
            .lock()
            .expect("lock poisoned")
            .iter()
            .filter(|r| r.kind == kind)
            .count()
    }

    fn enter(&self, key: &Key) {
        let mut activity = self.activity.lock().expect("lock poisoned");
        let active = activity.active.entry(key.clone()).or_default();
        *active += 1;
        let now = *active;
        let peak = activity.peak.entry(key.clone()).or_default();
        *peak = (*peak).max(now);
    }

    fn leave(&self, key: &Key) {
        let mut activity = self.activity.lock().expect("lock poisoned");
        if let Some(active) = activity.active.get_mut(key) {
            *active -= 1;
            if *active == 0 {
                activity.active.remove(key);
            }
        }
    }

    fn delay(&self, key: &Key) {
        let latency = self
            .key_latency
            .read()
            .expect("lock poisoned")
            .get(key)
            .copied()
            .unwrap_or(self.latency);
        if !latency.is_zero() {
            thread::sleep(latency);
        }
    }

    fn take_fault(&self, key: &Key, kind: TransferKind) -> bool {
        let mut faults = self.faults.lock().expect("lock poisoned");
        let pending = match kind {
            TransferKind::Read => &mut faults.reads,
            TransferKind::Write => &mut faults.writes,
        };
        match pending.get_mut(key) {
            Some(n) if *n > 0 => {
                *n -= 1;
                if *n == 0 {
                    pending.remove(key);
                }
                true
            }
            _ => false,
        }
    }

    fn record(&self, kind: TransferKind, key: &Key, data: Vec<u8>, ok: bool) {
        self.log.lock().expect("lock poisoned").push(TransferRecord {
            kind,
            key: key.clone(),
            data,
            ok,
        });
    }

    fn injected(key: &Key) -> StoreError {
        StoreError::Io {
            key: key.clone(),
            source: io::Error::new(io::ErrorKind::Other, "injected fault"),
        }
    }
}

impl Default for InMemoryBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageBackend for InMemoryBackend {
    fn read(&self, key: &Key) -> StoreResult<Vec<u8>> {
        self.enter(key);
        self.delay(key);
        let result = if self.take_fault(key, TransferKind::Read) {
            Err(Self::injected(key))
        } else {
            self.files
                .read()
                .expect("lock poisoned")
                .get(key)
                .cloned()
                .ok_or_else(|| StoreError::NotFound(key.clone()))
        };
        match &result {
            Ok(data) => self.record(TransferKind::Read, key, data.clone(), true),
            Err(_) => self.record(TransferKind::Read, key, Vec::new(), false),
        }
        self.leave(key);
        result
    }

    fn write(&self, key: &Key, data: &[u8]) -> StoreResult<()> {
        self.enter(key);
        self.delay(key);
        let result = if self.take_fault(key, TransferKind::Write) {
            Err(Self::injected(key))
        } else {
            self.files
                .write()
                .expect("lock poisoned")
                .insert(key.clone(), data.to_vec());
            Ok(())
        };
        self.record(TransferKind::Write, key, data.to_vec(), result.is_ok());
        self.leave(key);
        result
    }

    fn exists(&self, key: &Key) -> StoreResult<bool> {
        Ok(self.files.read().expect("lock poisoned").contains_key(key))
    }
}

impl std::fmt::Debug for InMemoryBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys = self.files.read().expect("lock poisoned").len();
        f.debug_struct("InMemoryBackend")
            .field("key_count", &keys)
            .field("latency", &self.latency)
            .finish()
    }
}
