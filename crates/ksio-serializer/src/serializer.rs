use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use bytes::Bytes;
use ksio_store::StorageBackend;
use ksio_types::{Key, OpError, Ticket};
use serde::{Deserialize, Serialize};
use tokio::runtime::Handle;
use tokio::sync::{oneshot, Notify};
use tracing::{debug, info, trace};

use crate::chain::{Admission, ChainTable, Retirement, StartSignal};
use crate::config::{ReadConsistency, SerializerConfig};
use crate::error::{SerializerError, SerializerResult};
use crate::operation::{Operation, OperationKind, OperationResult, ReadResult, WriteResult};
use crate::pending::Pending;

/// Point-in-time view of a serializer's bookkeeping.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SerializerStats {
    /// Keys with at least one unretired operation.
    pub live_chains: usize,
    /// Unretired operations across all keys.
    pub in_flight: usize,
    /// Operations ever submitted, including shadow-served reads.
    pub submitted: u64,
    /// Operations retired after running against the backend.
    pub completed: u64,
    /// Reads answered from a shadow payload.
    pub shadow_hits: u64,
}

#[derive(Default)]
struct Counters {
    submitted: AtomicU64,
    completed: AtomicU64,
    shadow_hits: AtomicU64,
}

/// A submission's place in its chain: the signal it waits on before
/// starting and the sender it completes once retired.
struct Link {
    ticket: Ticket,
    wait_on: Option<StartSignal>,
    done: oneshot::Sender<()>,
}

struct Inner<B> {
    backend: Arc<B>,
    config: SerializerConfig,
    handle: Handle,
    table: Mutex<ChainTable>,
    next_ticket: AtomicU64,
    counters: Counters,
    idle: Notify,
}

impl<B: StorageBackend> Inner<B> {
    fn mark_started(&self, key: &Key, ticket: Ticket) {
        self.table
            .lock()
            .expect("chain table lock poisoned")
            .mark_started(key, ticket);
    }

    fn retire(&self, key: &Key, ticket: Ticket) {
        let (retirement, idle) = {
            let mut table = self.table.lock().expect("chain table lock poisoned");
            let retirement = table.retire(key, ticket);
            (retirement, table.is_empty())
        };
        self.counters.completed.fetch_add(1, Ordering::Relaxed);
        match retirement {
            Retirement::Drained => debug!(key = %key, %ticket, "chain drained"),
            Retirement::Superseded => trace!(key = %key, %ticket, "retired behind newer tail"),
            Retirement::Untracked => debug!(key = %key, %ticket, "retired without a chain entry"),
        }
        if idle {
            self.idle.notify_waiters();
        }
    }
}

/// Keyed operation serializer.
///
/// Turns concurrently submitted reads and writes into per-key FIFO chains.
/// Operations on the same key run one at a time in submission order;
/// operations on different keys run in parallel on the runtime's blocking
/// pool. Chain entries are dropped as soon as a key has no unretired
/// operation, so bookkeeping is bounded by the number of busy keys.
///
/// Each instance owns its own table and lock. Every access to a given
/// resource must flow through the same instance; two serializers over the
/// same backend give no ordering guarantees relative to each other.
///
/// Cloning is cheap and yields a handle to the same instance.
pub struct KeyedSerializer<B> {
    inner: Arc<Inner<B>>,
}

impl<B> Clone for KeyedSerializer<B> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<B: StorageBackend> KeyedSerializer<B> {
    /// Create a serializer running on the current tokio runtime.
    pub fn new(backend: Arc<B>, config: SerializerConfig) -> SerializerResult<Self> {
        let handle =
            Handle::try_current().map_err(|e| SerializerError::NoRuntime(e.to_string()))?;
        Ok(Self::with_handle(backend, config, handle))
    }

    /// Create a serializer that schedules its work on `handle`.
    pub fn with_handle(backend: Arc<B>, config: SerializerConfig, handle: Handle) -> Self {
        info!(read_consistency = ?config.read_consistency, "keyed serializer started");
        Self {
            inner: Arc::new(Inner {
                backend,
                config,
                handle,
                table: Mutex::new(ChainTable::new()),
                next_ticket: AtomicU64::new(1),
                counters: Counters::default(),
                idle: Notify::new(),
            }),
        }
    }

    /// Submit an operation. Returns immediately.
    pub fn submit(&self, operation: Operation) -> Pending<OperationResult> {
        match operation {
            Operation::Read { key } => match self.admit_read(&key) {
                Ok(link) => self.spawn(
                    key,
                    OperationKind::Read,
                    link,
                    |backend, key| OperationResult::Read(read_body(backend, key)),
                    |key| OperationResult::abandoned(OperationKind::Read, key),
                ),
                Err(payload) => Pending::ready(key, OperationResult::Read(Ok(payload)), |key| {
                    OperationResult::abandoned(OperationKind::Read, key)
                }),
            },
            Operation::Write { key, payload } => {
                let link = self.admit_write(&key, &payload);
                self.spawn(
                    key,
                    OperationKind::Write,
                    link,
                    move |backend, key| OperationResult::Write(write_body(backend, key, &payload)),
                    |key| OperationResult::abandoned(OperationKind::Write, key),
                )
            }
        }
    }

    /// Submit a read of `key`.
    pub fn read(&self, key: Key) -> Pending<ReadResult> {
        match self.admit_read(&key) {
            Ok(link) => self.spawn(key, OperationKind::Read, link, read_body, abandoned_read),
            Err(payload) => Pending::ready(key, Ok(payload), abandoned_read),
        }
    }

    /// Submit a write of `payload` to `key`.
    pub fn write(&self, key: Key, payload: impl Into<Bytes>) -> Pending<WriteResult> {
        let payload = payload.into();
        let link = self.admit_write(&key, &payload);
        self.spawn(
            key,
            OperationKind::Write,
            link,
            move |backend, key| write_body(backend, key, &payload),
            abandoned_write,
        )
    }

    /// Current bookkeeping counters.
    pub fn stats(&self) -> SerializerStats {
        let (live_chains, in_flight) = {
            let table = self.inner.table.lock().expect("chain table lock poisoned");
            (table.len(), table.in_flight())
        };
        SerializerStats {
            live_chains,
            in_flight,
            submitted: self.inner.counters.submitted.load(Ordering::Relaxed),
            completed: self.inner.counters.completed.load(Ordering::Relaxed),
            shadow_hits: self.inner.counters.shadow_hits.load(Ordering::Relaxed),
        }
    }

    /// Unretired operations chained on `key`.
    pub fn chain_depth(&self, key: &Key) -> usize {
        self.inner
            .table
            .lock()
            .expect("chain table lock poisoned")
            .depth(key)
    }

    /// Number of keys with at least one unretired operation.
    pub fn live_chains(&self) -> usize {
        self.inner
            .table
            .lock()
            .expect("chain table lock poisoned")
            .len()
    }

    /// Returns `true` when no chain is live.
    pub fn is_idle(&self) -> bool {
        self.live_chains() == 0
    }

    /// Wait until every chain has drained.
    pub async fn quiesce(&self) {
        loop {
            let notified = self.inner.idle.notified();
            if self.is_idle() {
                return;
            }
            notified.await;
        }
    }

    pub fn backend(&self) -> &Arc<B> {
        &self.inner.backend
    }

    pub fn config(&self) -> &SerializerConfig {
        &self.inner.config
    }

    /// Runtime the serializer schedules its work on.
    pub fn handle(&self) -> &Handle {
        &self.inner.handle
    }

    fn issue(&self) -> (Ticket, oneshot::Sender<()>, StartSignal) {
        let ticket = Ticket::from_raw(self.inner.next_ticket.fetch_add(1, Ordering::Relaxed));
        let (done, signal) = oneshot::channel();
        self.inner.counters.submitted.fetch_add(1, Ordering::Relaxed);
        (ticket, done, signal)
    }

    /// Register a read. On a shadow hit returns the shadow payload as `Err`
    /// so the caller resolves without spawning anything.
    fn admit_read(&self, key: &Key) -> Result<Link, Bytes> {
        let allow_shadow = self.inner.config.read_consistency == ReadConsistency::Shadow;
        let (ticket, done, signal) = self.issue();
        let admission = self
            .inner
            .table
            .lock()
            .expect("chain table lock poisoned")
            .admit_read(key, ticket, signal, allow_shadow);
        match admission {
            Admission::Shadowed(payload) => {
                self.inner.counters.shadow_hits.fetch_add(1, Ordering::Relaxed);
                trace!(key = %key, len = payload.len(), "read served from shadow");
                Err(payload)
            }
            Admission::Chained(wait_on) => {
                trace!(key = %key, %ticket, chained = wait_on.is_some(), "read submitted");
                Ok(Link {
                    ticket,
                    wait_on,
                    done,
                })
            }
        }
    }

    fn admit_write(&self, key: &Key, payload: &Bytes) -> Link {
        let shadow = match self.inner.config.read_consistency {
            ReadConsistency::Shadow => Some(payload.clone()),
            ReadConsistency::StrictChain => None,
        };
        let (ticket, done, signal) = self.issue();
        let wait_on = self
            .inner
            .table
            .lock()
            .expect("chain table lock poisoned")
            .admit_write(key, ticket, signal, shadow);
        trace!(key = %key, %ticket, chained = wait_on.is_some(), len = payload.len(), "write submitted");
        Link {
            ticket,
            wait_on,
            done,
        }
    }

    /// Run one chained operation: wait for the predecessor's start signal,
    /// perform the blocking transfer, retire, then post the start signal for
    /// the successor. Waiting is an async suspension, so a long chain holds
    /// no worker thread.
    fn spawn<T, F>(
        &self,
        key: Key,
        kind: OperationKind,
        link: Link,
        body: F,
        abandoned: fn(Key) -> T,
    ) -> Pending<T>
    where
        T: Send + 'static,
        F: FnOnce(&B, &Key) -> T + Send + 'static,
    {
        let Link {
            ticket,
            wait_on,
            done,
        } = link;
        let (result_tx, result_rx) = oneshot::channel();
        let inner = Arc::clone(&self.inner);
        let task_key = key.clone();
        self.inner.handle.spawn(async move {
            let key = task_key;
            if let Some(predecessor) = wait_on {
                // An error means the predecessor was torn down; it has
                // still reached a terminal state, so proceed.
                let _ = predecessor.await;
            }
            inner.mark_started(&key, ticket);
            trace!(key = %key, %ticket, %kind, "operation running");

            let backend = Arc::clone(&inner.backend);
            let body_key = key.clone();
            let result = match tokio::task::spawn_blocking(move || body(&*backend, &body_key)).await
            {
                Ok(result) => result,
                Err(e) => {
                    debug!(key = %key, %ticket, error = %e, "operation body did not complete");
                    abandoned(key.clone())
                }
            };

            inner.retire(&key, ticket);
            let _ = done.send(());
            let _ = result_tx.send(result);
        });
        Pending::waiting(result_rx, key, ticket, abandoned)
    }
}

impl<B> std::fmt::Debug for KeyedSerializer<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let live = self
            .inner
            .table
            .lock()
            .map(|t| t.len())
            .unwrap_or_default();
        f.debug_struct("KeyedSerializer")
            .field("config", &self.inner.config)
            .field("live_chains", &live)
            .finish()
    }
}

fn read_body<B: StorageBackend>(backend: &B, key: &Key) -> ReadResult {
    let result = backend.read(key).map(Bytes::from).map_err(OpError::from);
    trace!(key = %key, ok = result.is_ok(), "read transfer finished");
    result
}

fn write_body<B: StorageBackend>(backend: &B, key: &Key, payload: &[u8]) -> WriteResult {
    let result = WriteResult::from(backend.write(key, payload).map_err(OpError::from));
    trace!(key = %key, len = payload.len(), ok = result.success, "write transfer finished");
    result
}

fn abandoned_read(key: Key) -> ReadResult {
    Err(OpError::Abandoned { key })
}

fn abandoned_write(key: Key) -> WriteResult {
    WriteResult::failed(OpError::Abandoned { key })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use ksio_store::{InMemoryBackend, StoreError, StoreResult};
    use tokio::time::Instant;

    fn key(s: &str) -> Key {
        Key::new(s).unwrap()
    }

    fn serializer(
        backend: InMemoryBackend,
        config: SerializerConfig,
    ) -> KeyedSerializer<InMemoryBackend> {
        KeyedSerializer::new(Arc::new(backend), config).unwrap()
    }

    fn both_modes() -> [SerializerConfig; 2] {
        [SerializerConfig::default(), SerializerConfig::strict()]
    }

    // -----------------------------------------------------------------------
    // Ordering
    // -----------------------------------------------------------------------

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn write_write_read_sees_last_write() {
        for config in both_modes() {
            let s = serializer(InMemoryBackend::new(), config);
            for trial in 0..1000 {
                let k = key(&format!("trial-{}", trial % 7));
                let w1 = s.write(k.clone(), &b"a"[..]);
                let w2 = s.write(k.clone(), &b"b"[..]);
                let r = s.read(k);
                let (w1, w2, r) = tokio::join!(w1, w2, r);
                assert!(w1.success && w2.success);
                assert_eq!(r.unwrap().as_ref(), b"b", "trial {trial}");
            }
            s.quiesce().await;
            assert_eq!(s.stats().live_chains, 0);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concrete_scenario_two_writes_then_read() {
        for config in both_modes() {
            let backend = InMemoryBackend::new().with_latency(Duration::from_millis(5));
            let s = serializer(backend, config);
            let k = key("a.txt");

            let callers = [
                tokio::spawn({
                    let s = s.clone();
                    let k = k.clone();
                    let w = s.write(k, &b"hello"[..]);
                    async move { w.await.success }
                }),
                tokio::spawn({
                    let s = s.clone();
                    let k = k.clone();
                    let w = s.write(k, &b"world"[..]);
                    async move { w.await.success }
                }),
            ];
            let read = s.read(k.clone());
            for caller in callers {
                assert!(caller.await.unwrap());
            }
            assert_eq!(read.await.unwrap().as_ref(), b"world");

            let writes = s.backend().writes();
            assert_eq!(
                writes,
                vec![(k.clone(), b"hello".to_vec()), (k.clone(), b"world".to_vec())]
            );
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn one_transfer_at_a_time_per_key() {
        let backend = InMemoryBackend::new().with_latency(Duration::from_millis(2));
        let s = serializer(backend, SerializerConfig::strict());
        let k = key("busy");
        let pending: Vec<_> = (0..50u8)
            .map(|i| {
                if i % 3 == 0 {
                    tokio::spawn({
                        let r = s.read(k.clone());
                        async move { r.await.is_ok() || i == 0 }
                    })
                } else {
                    tokio::spawn({
                        let w = s.write(k.clone(), vec![i]);
                        async move { w.await.success }
                    })
                }
            })
            .collect();
        for p in pending {
            assert!(p.await.unwrap());
        }
        assert_eq!(s.backend().peak_concurrency(&k), 1);
        assert_eq!(s.backend().get(&k).unwrap(), vec![49]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn tickets_increase_in_submission_order() {
        let s = serializer(InMemoryBackend::new(), SerializerConfig::strict());
        let a = s.write(key("a"), &b"1"[..]);
        let b = s.write(key("b"), &b"2"[..]);
        let c = s.read(key("a"));
        assert!(a.ticket() < b.ticket());
        assert!(b.ticket() < c.ticket());
        let _ = tokio::join!(a, b, c);
    }

    #[test]
    fn submitters_on_many_threads_share_one_serializer() {
        const THREADS: usize = 8;
        const ROUNDS: usize = 50;

        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(4)
            .enable_all()
            .build()
            .unwrap();
        let backend = InMemoryBackend::new().with_latency(Duration::from_micros(200));
        let s = KeyedSerializer::with_handle(
            Arc::new(backend),
            SerializerConfig::default(),
            rt.handle().clone(),
        );
        let shared = key("shared.log");
        let start = std::sync::Barrier::new(THREADS);

        let stale: usize = std::thread::scope(|scope| {
            let workers: Vec<_> = (0..THREADS)
                .map(|t| {
                    let s = s.clone();
                    let shared = shared.clone();
                    let start = &start;
                    let handle = rt.handle().clone();
                    scope.spawn(move || {
                        let own = key(&format!("thread-{t}.txt"));
                        start.wait();
                        let mut rounds = Vec::with_capacity(ROUNDS);
                        for i in 0..ROUNDS {
                            let payload = format!("{t}:{i}");
                            let own_write = s.write(own.clone(), payload.clone());
                            let own_read = s.read(own.clone());
                            let shared_write = s.write(shared.clone(), payload.clone());
                            rounds.push((payload, own_write, own_read, shared_write));
                        }
                        handle.block_on(async move {
                            let mut stale = 0usize;
                            for (payload, own_write, own_read, shared_write) in rounds {
                                assert!(own_write.await.success);
                                assert!(shared_write.await.success);
                                match own_read.await {
                                    Ok(bytes) if bytes.as_ref() == payload.as_bytes() => {}
                                    _ => stale += 1,
                                }
                            }
                            stale
                        })
                    })
                })
                .collect();
            workers.into_iter().map(|w| w.join().unwrap()).sum()
        });

        rt.block_on(s.quiesce());
        assert_eq!(stale, 0);
        assert_eq!(s.live_chains(), 0);
        assert_eq!(s.backend().peak_concurrency(&shared), 1);
        for t in 0..THREADS {
            assert_eq!(s.backend().peak_concurrency(&key(&format!("thread-{t}.txt"))), 1);
        }

        let stats = s.stats();
        let shadow_hits = stats.shadow_hits as usize;
        assert_eq!(stats.submitted as usize, THREADS * ROUNDS * 3);
        assert_eq!(s.backend().write_count(), THREADS * ROUNDS * 2);
        assert_eq!(s.backend().read_count() + shadow_hits, THREADS * ROUNDS);

        // The shared key ends on some thread's final round.
        let last = String::from_utf8(s.backend().get(&shared).unwrap()).unwrap();
        assert!(last.ends_with(&format!(":{}", ROUNDS - 1)), "{last}");
    }

    // -----------------------------------------------------------------------
    // Independence
    // -----------------------------------------------------------------------

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn slow_key_does_not_delay_fast_key() {
        let backend = InMemoryBackend::new();
        let slow = key("slow.bin");
        let fast = key("fast.bin");
        backend.set_key_latency(&slow, Duration::from_millis(400));
        let s = serializer(backend, SerializerConfig::default());

        let start = Instant::now();
        let slow_write = s.write(slow.clone(), vec![0u8; 16]);
        let fast_write = s.write(fast.clone(), vec![1u8; 16]);

        assert!(fast_write.await.success);
        assert!(start.elapsed() < Duration::from_millis(300));
        assert_eq!(s.chain_depth(&fast), 0);
        assert_eq!(s.chain_depth(&slow), 1);

        assert!(slow_write.await.success);
        assert!(start.elapsed() >= Duration::from_millis(400));
    }

    // -----------------------------------------------------------------------
    // Cleanup
    // -----------------------------------------------------------------------

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn chains_are_removed_once_drained() {
        let s = serializer(InMemoryBackend::new(), SerializerConfig::default());
        let k = key("history.log");
        let pending: Vec<_> = (0..100u32)
            .map(|i| s.write(k.clone(), i.to_le_bytes().to_vec()))
            .collect();
        assert!(s.stats().submitted >= 100);
        for p in pending {
            assert!(p.await.success);
        }
        s.quiesce().await;

        let stats = s.stats();
        assert_eq!(stats.live_chains, 0);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.completed, 100);
        assert_eq!(s.chain_depth(&k), 0);
        assert!(s.is_idle());

        // A fresh submission on the same key starts a new chain.
        let w = s.write(k.clone(), &b"again"[..]);
        assert!(s.chain_depth(&k) <= 1);
        assert!(w.await.success);
        s.quiesce().await;
        assert_eq!(s.live_chains(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn live_chains_track_busy_keys() {
        let backend = InMemoryBackend::new().with_latency(Duration::from_millis(100));
        let s = serializer(backend, SerializerConfig::default());
        let writes: Vec<_> = (0..5)
            .map(|i| s.write(key(&format!("k{i}")), &b"x"[..]))
            .collect();
        let extra = s.write(key("k0"), &b"y"[..]);

        let stats = s.stats();
        assert_eq!(stats.live_chains, 5);
        assert_eq!(stats.in_flight, 6);
        assert_eq!(s.chain_depth(&key("k0")), 2);

        for w in writes {
            w.await;
        }
        extra.await;
        s.quiesce().await;
        assert_eq!(s.stats().live_chains, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn quiesce_returns_immediately_when_idle() {
        let s = serializer(InMemoryBackend::new(), SerializerConfig::default());
        tokio::time::timeout(Duration::from_secs(1), s.quiesce())
            .await
            .expect("idle serializer should quiesce at once");
    }

    // -----------------------------------------------------------------------
    // Read-your-write
    // -----------------------------------------------------------------------

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn read_after_write_from_another_thread_sees_value() {
        for config in both_modes() {
            for value in [&b""[..], &b"v"[..], &b"a longer value"[..]] {
                let s = serializer(InMemoryBackend::new(), config.clone());
                let k = key("shared.txt");
                s.backend().seed(&k, b"stale".to_vec());

                let write = s.write(k.clone(), value);
                let reader = {
                    let s = s.clone();
                    let k = k.clone();
                    std::thread::spawn(move || s.read(k))
                };
                let read = reader.join().expect("reader thread should not panic");

                assert!(write.await.success);
                assert_eq!(read.await.unwrap().as_ref(), value);
            }
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn running_write_serves_read_from_shadow() {
        let backend = InMemoryBackend::new().with_latency(Duration::from_millis(300));
        let s = serializer(backend, SerializerConfig::default());
        let k = key("save.json");

        let write = s.write(k.clone(), &b"{\"level\":3}"[..]);
        // Let the transfer start.
        tokio::time::sleep(Duration::from_millis(50)).await;

        let start = Instant::now();
        let read = s.read(k.clone());
        assert!(read.ticket().is_none());
        assert_eq!(read.await.unwrap().as_ref(), b"{\"level\":3}");
        assert!(start.elapsed() < Duration::from_millis(100));

        assert!(write.await.success);
        assert_eq!(s.backend().read_count(), 0);
        assert_eq!(s.stats().shadow_hits, 1);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn strict_chain_reads_wait_for_the_write() {
        let backend = InMemoryBackend::new().with_latency(Duration::from_millis(150));
        let s = serializer(backend, SerializerConfig::strict());
        let k = key("save.json");

        let write = s.write(k.clone(), &b"v2"[..]);
        tokio::time::sleep(Duration::from_millis(30)).await;
        let read = s.read(k.clone());
        assert!(read.ticket().is_some());

        assert_eq!(read.await.unwrap().as_ref(), b"v2");
        assert!(write.await.success);
        assert_eq!(s.backend().read_count(), 1);
        assert_eq!(s.stats().shadow_hits, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn queued_write_is_not_bypassed_by_a_read() {
        // W1 running, W2 queued: a read must not return W1's payload.
        let backend = InMemoryBackend::new().with_latency(Duration::from_millis(100));
        let s = serializer(backend, SerializerConfig::default());
        let k = key("doc.txt");

        let w1 = s.write(k.clone(), &b"one"[..]);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let w2 = s.write(k.clone(), &b"two"[..]);
        let read = s.read(k.clone());

        assert_eq!(read.await.unwrap().as_ref(), b"two");
        assert!(w1.await.success && w2.await.success);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn write_queued_after_shadow_read_still_runs_in_order() {
        let backend = InMemoryBackend::new().with_latency(Duration::from_millis(100));
        let s = serializer(backend, SerializerConfig::default());
        let k = key("doc.txt");

        let w1 = s.write(k.clone(), &b"one"[..]);
        tokio::time::sleep(Duration::from_millis(20)).await;
        let r1 = s.read(k.clone());
        let w2 = s.write(k.clone(), &b"two"[..]);
        let r2 = s.read(k.clone());

        assert_eq!(r1.await.unwrap().as_ref(), b"one");
        assert_eq!(r2.await.unwrap().as_ref(), b"two");
        assert!(w1.await.success && w2.await.success);
        assert_eq!(
            s.backend().writes(),
            vec![(k.clone(), b"one".to_vec()), (k.clone(), b"two".to_vec())]
        );
    }

    // -----------------------------------------------------------------------
    // Failures
    // -----------------------------------------------------------------------

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn failed_write_does_not_break_the_chain() {
        for config in both_modes() {
            let backend = InMemoryBackend::new();
            let k = key("a.txt");
            backend.seed(&k, b"original".to_vec());
            backend.fail_next_write(&k);
            let s = serializer(backend, config);

            let w1 = s.write(k.clone(), &b"lost"[..]);
            let w2 = s.write(k.clone(), &b"kept"[..]);
            let r = s.read(k.clone());

            let w1 = w1.await;
            assert!(!w1.success);
            assert!(matches!(w1.error, Some(OpError::IoFailure { .. })));
            assert!(w2.await.success);
            assert_eq!(r.await.unwrap().as_ref(), b"kept");

            s.quiesce().await;
            assert_eq!(s.stats().live_chains, 0);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn failed_write_alone_leaves_backend_content() {
        let backend = InMemoryBackend::new();
        let k = key("a.txt");
        backend.seed(&k, b"original".to_vec());
        backend.fail_next_write(&k);
        let s = serializer(backend, SerializerConfig::strict());

        assert!(!s.write(k.clone(), &b"lost"[..]).await.success);
        assert_eq!(s.read(k).await.unwrap().as_ref(), b"original");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn missing_key_reads_as_unavailable() {
        let s = serializer(InMemoryBackend::new(), SerializerConfig::default());
        let err = s.read(key("nowhere.txt")).await.unwrap_err();
        assert!(err.is_unavailable());
        assert_eq!(err.key(), &key("nowhere.txt"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn failed_read_does_not_block_successor() {
        let backend = InMemoryBackend::new();
        let k = key("a.txt");
        backend.seed(&k, b"data".to_vec());
        backend.fail_next_read(&k);
        let s = serializer(backend, SerializerConfig::default());

        let r1 = s.read(k.clone());
        let r2 = s.read(k.clone());
        assert!(r1.await.is_err());
        assert_eq!(r2.await.unwrap().as_ref(), b"data");
    }

    /// Backend whose first write panics.
    struct PanicOnce {
        inner: InMemoryBackend,
        armed: Mutex<bool>,
    }

    impl StorageBackend for PanicOnce {
        fn read(&self, key: &Key) -> StoreResult<Vec<u8>> {
            self.inner.read(key)
        }

        fn write(&self, key: &Key, data: &[u8]) -> StoreResult<()> {
            let fire = std::mem::replace(&mut *self.armed.lock().unwrap(), false);
            if fire {
                panic!("backend exploded");
            }
            self.inner.write(key, data)
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn panicking_backend_is_reported_as_abandoned() {
        let backend = PanicOnce {
            inner: InMemoryBackend::new(),
            armed: Mutex::new(true),
        };
        let s = KeyedSerializer::new(Arc::new(backend), SerializerConfig::default()).unwrap();
        let k = key("a.txt");

        let w1 = s.write(k.clone(), &b"boom"[..]);
        let w2 = s.write(k.clone(), &b"fine"[..]);

        let w1 = w1.await;
        assert!(matches!(w1.error, Some(OpError::Abandoned { .. })));
        assert!(w2.await.success);
        assert_eq!(s.read(k).await.unwrap().as_ref(), b"fine");
        s.quiesce().await;
        assert_eq!(s.live_chains(), 0);
    }

    // -----------------------------------------------------------------------
    // Construction and generic submission
    // -----------------------------------------------------------------------

    #[test]
    fn new_outside_runtime_fails() {
        let result = KeyedSerializer::new(Arc::new(InMemoryBackend::new()), SerializerConfig::default());
        assert!(matches!(result, Err(SerializerError::NoRuntime(_))));
    }

    #[test]
    fn with_handle_submits_from_plain_threads() {
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap();
        let s = KeyedSerializer::with_handle(
            Arc::new(InMemoryBackend::new()),
            SerializerConfig::default(),
            rt.handle().clone(),
        );
        let k = key("plain.txt");
        let w = s.write(k.clone(), &b"from a plain thread"[..]);
        let r = s.read(k);
        let (w, r) = rt.block_on(async { tokio::join!(w, r) });
        assert!(w.success);
        assert_eq!(r.unwrap().as_ref(), b"from a plain thread");
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn submit_accepts_generic_operations() {
        let s = serializer(InMemoryBackend::new(), SerializerConfig::strict());
        let k = key("generic.bin");

        let w = s.submit(Operation::write(k.clone(), vec![1, 2, 3]));
        let r = s.submit(Operation::read(k.clone()));

        let w = w.await;
        assert_eq!(w.kind(), OperationKind::Write);
        assert!(w.is_success());
        let r = r.await;
        assert_eq!(r.bytes().unwrap().as_ref(), &[1, 2, 3]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn dropped_handle_still_runs_operation() {
        let s = serializer(InMemoryBackend::new(), SerializerConfig::default());
        let k = key("fire-and-forget");
        drop(s.write(k.clone(), &b"done"[..]));
        s.quiesce().await;
        assert_eq!(s.backend().get(&k).unwrap(), b"done");
    }

    #[test]
    fn store_error_conversion_is_used_for_results() {
        let err: OpError = StoreError::Locked(key("x")).into();
        assert!(err.is_unavailable());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn debug_format() {
        let s = serializer(InMemoryBackend::new(), SerializerConfig::default());
        let debug = format!("{s:?}");
        assert!(debug.contains("KeyedSerializer"));
        assert!(debug.contains("live_chains"));
    }

    // -----------------------------------------------------------------------
    // Randomized sequences
    // -----------------------------------------------------------------------

    #[derive(Clone, Debug)]
    enum Step {
        Write(usize, Vec<u8>),
        Read(usize),
    }

    fn step() -> impl proptest::strategy::Strategy<Value = Step> {
        use proptest::prelude::*;
        prop_oneof![
            (0..3usize, proptest::collection::vec(any::<u8>(), 0..8))
                .prop_map(|(k, v)| Step::Write(k, v)),
            (0..3usize).prop_map(Step::Read),
        ]
    }

    proptest::proptest! {
        #![proptest_config(proptest::prelude::ProptestConfig::with_cases(32))]

        #[test]
        fn reads_observe_the_latest_prior_write(
            steps in proptest::collection::vec(step(), 1..40),
            strict in proptest::bool::ANY,
        ) {
            let rt = tokio::runtime::Builder::new_multi_thread()
                .worker_threads(2)
                .enable_all()
                .build()
                .unwrap();
            let config = if strict { SerializerConfig::strict() } else { SerializerConfig::default() };
            let s = KeyedSerializer::with_handle(
                Arc::new(InMemoryBackend::new()),
                config,
                rt.handle().clone(),
            );
            let keys = [key("p0"), key("p1"), key("p2")];

            let mut latest: [Option<Vec<u8>>; 3] = [None, None, None];
            let mut reads = Vec::new();
            let mut writes = Vec::new();
            for step in &steps {
                match step {
                    Step::Write(k, v) => {
                        latest[*k] = Some(v.clone());
                        writes.push(s.write(keys[*k].clone(), v.clone()));
                    }
                    Step::Read(k) => reads.push((latest[*k].clone(), s.read(keys[*k].clone()))),
                }
            }

            rt.block_on(async {
                for w in writes {
                    assert!(w.await.success);
                }
                for (expected, pending) in reads {
                    match expected {
                        Some(v) => assert_eq!(pending.await.unwrap().as_ref(), v.as_slice()),
                        None => assert!(pending.await.unwrap_err().is_unavailable()),
                    }
                }
                s.quiesce().await;
            });
            proptest::prop_assert_eq!(s.stats().live_chains, 0);
            proptest::prop_assert_eq!(s.stats().in_flight, 0);
        }
    }
}
