//! Worker Pool: a bounded producer/consumer thread pool
//! with backpressure and per-worker statistics.

use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        mpsc, Arc, Mutex,
    },
    thread,
    time::{Duration, Instant},
};

/// Configuration for a [`WorkerPool`].
#[derive(Clone, Debug)]
pub struct PoolConfig {
    /// Number of worker threads. Capped at 64.
    pub num_threads: usize,
    /// Capacity of the input (and output) bounded queues.
    pub queue_size: usize,
    /// Fill-ratio threshold above which submission sleeps proportionally.
    pub backpressure_threshold: f64,
}

impl Default for PoolConfig {
    fn default() -> Self {
        PoolConfig {
            num_threads: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            queue_size: 10_000,
            backpressure_threshold: 0.8,
        }
    }
}

/// A unit of generation work: `count` expansions of `grammar_name`.
#[derive(Clone, Debug)]
pub struct Batch {
    /// Monotonically increasing batch identifier.
    pub batch_id: u64,
    /// Which grammar rule to expand.
    pub grammar_name: String,
    /// How many expansions to produce.
    pub count: usize,
    /// Wall-clock instant the batch was created, for queue-time accounting.
    pub created_at: Instant,
    /// The produced query texts, populated once `completed` is true.
    pub queries: Vec<String>,
    /// Set once the worker has finished (successfully or not).
    pub completed: bool,
    /// Present iff generation failed.
    pub error: Option<String>,
}

impl Batch {
    fn new(batch_id: u64, grammar_name: String, count: usize) -> Self {
        Batch {
            batch_id,
            grammar_name,
            count,
            created_at: Instant::now(),
            queries: Vec::new(),
            completed: false,
            error: None,
        }
    }
}

/// Per-worker-thread counters.
#[derive(Debug, Default)]
pub struct WorkerStats {
    /// Total queries generated by this worker.
    pub queries_generated: AtomicU64,
    /// Total batches completed by this worker.
    pub batches_completed: AtomicU64,
    /// Wall-clock time spent generating, in nanoseconds.
    pub generation_time_ns: AtomicU64,
    /// Wall-clock time spent idle (waiting on the input queue), in nanoseconds.
    pub idle_time_ns: AtomicU64,
    /// Wall-clock time batches spent queued before this worker claimed them.
    pub queue_time_ns: AtomicU64,
    /// Number of generation errors.
    pub errors: AtomicU64,
}

impl WorkerStats {
    /// `1 - idle / (idle + generation)`, the fraction of time spent doing
    /// useful work rather than waiting for input.
    pub fn efficiency(&self) -> f64 {
        let idle = self.idle_time_ns.load(Ordering::Relaxed) as f64;
        let generation = self.generation_time_ns.load(Ordering::Relaxed) as f64;
        let total = idle + generation;
        if total > 0.0 {
            1.0 - idle / total
        } else {
            0.0
        }
    }
}

/// Aggregate statistics across every worker.
#[derive(Clone, Copy, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct PoolStats {
    /// Total queries generated across all workers.
    pub total_queries: u64,
    /// Total batches completed across all workers.
    pub total_batches: u64,
    /// Total generation errors across all workers.
    pub total_errors: u64,
    /// Average per-worker efficiency.
    pub average_efficiency: f64,
}

struct Job {
    batch: Batch,
    reply: mpsc::SyncSender<Batch>,
    outstanding: Arc<AtomicU64>,
}

/// A handle to a batch submitted to the pool, completed asynchronously by a
/// worker thread. `wait()` blocks until the worker has finished.
pub struct BatchHandle {
    receiver: mpsc::Receiver<Batch>,
}

impl BatchHandle {
    /// Blocks until the batch completes, returning it.
    pub fn wait(self) -> Batch {
        self.receiver
            .recv()
            .unwrap_or_else(|_| Batch::new(0, String::new(), 0))
    }

    /// Waits up to `timeout`, returning `None` if the batch hasn't
    /// completed yet (e.g. during a shutdown drain).
    pub fn wait_timeout(self, timeout: Duration) -> Option<Batch> {
        self.receiver.recv_timeout(timeout).ok()
    }
}

/// A bounded, multi-threaded pool of query-generation workers.
///
/// Spawns `config.num_threads` worker threads sharing one input queue; each
/// batch submitted gets its own one-shot reply channel rather than a shared
/// output queue, which keeps `submit_batch`'s `Future`-like contract simple
/// without sacrificing the bounded-queue backpressure.
pub struct WorkerPool {
    config: PoolConfig,
    input: mpsc::SyncSender<Job>,
    outstanding: Arc<AtomicU64>,
    batch_counter: AtomicU64,
    stats: Arc<Vec<WorkerStats>>,
    workers: Vec<thread::JoinHandle<()>>,
    shutdown: Arc<Mutex<bool>>,
}

impl WorkerPool {
    /// Spawns the pool, using `generate` (grammar name, count) -> queries as
    /// each worker's generation function. `generate` must be `Send + Sync`
    /// so every worker thread can share it.
    pub fn new<F>(config: PoolConfig, generate: F) -> Self
    where
        F: Fn(&str, usize) -> Result<Vec<String>, String> + Send + Sync + 'static,
    {
        let num_threads = config.num_threads.min(64).max(1);
        let (input_tx, input_rx) = mpsc::sync_channel::<Job>(config.queue_size);
        let input_rx = Arc::new(Mutex::new(input_rx));
        let generate = Arc::new(generate);
        let stats: Arc<Vec<WorkerStats>> = Arc::new((0..num_threads).map(|_| WorkerStats::default()).collect());
        let shutdown = Arc::new(Mutex::new(false));

        let mut workers = Vec::with_capacity(num_threads);
        for worker_id in 0..num_threads {
            let input_rx = Arc::clone(&input_rx);
            let generate = Arc::clone(&generate);
            let stats = Arc::clone(&stats);
            let shutdown = Arc::clone(&shutdown);
            workers.push(thread::Builder::new()
                .name(format!("rqg-worker-{}", worker_id))
                .spawn(move || worker_loop(worker_id, &input_rx, &generate, &stats, &shutdown))
                .expect("failed to spawn worker thread"));
        }

        WorkerPool {
            config,
            input: input_tx,
            outstanding: Arc::new(AtomicU64::new(0)),
            batch_counter: AtomicU64::new(0),
            stats,
            workers,
            shutdown,
        }
    }

    /// Submits one batch, applying backpressure if the queue is heavily
    /// loaded (sleep proportional to how far the fill ratio exceeds
    /// `backpressure_threshold`).
    pub fn submit_batch(&self, grammar_name: &str, count: usize) -> BatchHandle {
        let fill_ratio = self.outstanding.load(Ordering::Relaxed) as f64 / self.config.queue_size as f64;
        if fill_ratio > self.config.backpressure_threshold {
            let excess = fill_ratio - self.config.backpressure_threshold;
            thread::sleep(Duration::from_secs_f64(0.1 * excess));
        }

        let batch_id = self.batch_counter.fetch_add(1, Ordering::Relaxed);
        let batch = Batch::new(batch_id, grammar_name.to_owned(), count);
        let (reply_tx, reply_rx) = mpsc::sync_channel(1);
        self.outstanding.fetch_add(1, Ordering::Relaxed);
        let job = Job {
            batch,
            reply: reply_tx,
            outstanding: Arc::clone(&self.outstanding),
        };
        let _ = self.input.send(job);
        BatchHandle { receiver: reply_rx }
    }

    /// Splits `total_count` into `batch_size`-sized batches and submits all
    /// of them, returning one handle per batch.
    pub fn submit_batches(&self, grammar_name: &str, total_count: usize, batch_size: usize) -> Vec<BatchHandle> {
        let mut handles = Vec::new();
        let mut remaining = total_count;
        while remaining > 0 {
            let size = remaining.min(batch_size.max(1));
            handles.push(self.submit_batch(grammar_name, size));
            remaining -= size;
        }
        handles
    }

    /// Aggregate statistics across all workers.
    pub fn stats(&self) -> PoolStats {
        let mut total_queries = 0;
        let mut total_batches = 0;
        let mut total_errors = 0;
        let mut efficiencies = Vec::with_capacity(self.stats.len());
        for worker_stats in self.stats.iter() {
            total_queries += worker_stats.queries_generated.load(Ordering::Relaxed);
            total_batches += worker_stats.batches_completed.load(Ordering::Relaxed);
            total_errors += worker_stats.errors.load(Ordering::Relaxed);
            efficiencies.push(worker_stats.efficiency());
        }
        let average_efficiency = if efficiencies.is_empty() {
            0.0
        } else {
            efficiencies.iter().sum::<f64>() / efficiencies.len() as f64
        };
        PoolStats {
            total_queries,
            total_batches,
            total_errors,
            average_efficiency,
        }
    }

    /// Closes the input queue and waits (up to `timeout`, if given) for
    /// every worker to finish its current batch and exit.
    pub fn shutdown(self, timeout: Option<Duration>) {
        *self.shutdown.lock().unwrap_or_else(|e| e.into_inner()) = true;
        drop(self.input);
        let deadline = timeout.map(|t| Instant::now() + t);
        for worker in self.workers {
            if let Some(deadline) = deadline {
                if Instant::now() >= deadline {
                    break;
                }
            }
            let _ = worker.join();
        }
    }
}

fn worker_loop(
    worker_id: usize,
    input_rx: &Arc<Mutex<mpsc::Receiver<Job>>>,
    generate: &Arc<dyn Fn(&str, usize) -> Result<Vec<String>, String> + Send + Sync>,
    stats: &Arc<Vec<WorkerStats>>,
    shutdown: &Arc<Mutex<bool>>,
) {
    let my_stats = &stats[worker_id];
    loop {
        let wait_start = Instant::now();
        let job = {
            let guard = input_rx.lock().unwrap_or_else(|e| e.into_inner());
            guard.recv_timeout(Duration::from_secs(1))
        };
        my_stats
            .idle_time_ns
            .fetch_add(wait_start.elapsed().as_nanos() as u64, Ordering::Relaxed);

        let job = match job {
            Ok(job) => job,
            Err(mpsc::RecvTimeoutError::Timeout) => {
                if *shutdown.lock().unwrap_or_else(|e| e.into_inner()) {
                    return;
                }
                continue;
            }
            Err(mpsc::RecvTimeoutError::Disconnected) => return,
        };

        my_stats
            .queue_time_ns
            .fetch_add(job.batch.created_at.elapsed().as_nanos() as u64, Ordering::Relaxed);

        let mut batch = job.batch;
        let gen_start = Instant::now();
        match generate(&batch.grammar_name, batch.count) {
            Ok(queries) => {
                my_stats.queries_generated.fetch_add(queries.len() as u64, Ordering::Relaxed);
                batch.queries = queries;
            }
            Err(e) => {
                my_stats.errors.fetch_add(1, Ordering::Relaxed);
                batch.error = Some(e);
            }
        }
        my_stats
            .generation_time_ns
            .fetch_add(gen_start.elapsed().as_nanos() as u64, Ordering::Relaxed);
        my_stats.batches_completed.fetch_add(1, Ordering::Relaxed);
        batch.completed = true;
        job.outstanding.fetch_sub(1, Ordering::Relaxed);
        let _ = job.reply.send(batch);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn submit_batch_returns_requested_count() {
        let pool = WorkerPool::new(
            PoolConfig {
                num_threads: 2,
                queue_size: 16,
                backpressure_threshold: 0.8,
            },
            |name, count| Ok((0..count).map(|i| format!("{}-{}", name, i)).collect()),
        );
        let handle = pool.submit_batch("q", 5);
        let batch = handle.wait();
        assert_eq!(batch.queries.len(), 5);
        assert!(batch.completed);
        pool.shutdown(Some(Duration::from_secs(2)));
    }

    #[test]
    fn submit_batches_splits_total_count() {
        let pool = WorkerPool::new(
            PoolConfig {
                num_threads: 2,
                queue_size: 16,
                backpressure_threshold: 0.8,
            },
            |name, count| Ok((0..count).map(|i| format!("{}-{}", name, i)).collect()),
        );
        let handles = pool.submit_batches("q", 25, 10);
        let total: usize = handles.into_iter().map(|h| h.wait().queries.len()).sum();
        assert_eq!(total, 25);
        pool.shutdown(Some(Duration::from_secs(2)));
    }

    #[test]
    fn errors_are_recorded_in_the_batch() {
        let pool = WorkerPool::new(
            PoolConfig {
                num_threads: 1,
                queue_size: 4,
                backpressure_threshold: 0.8,
            },
            |_name, _count| Err("boom".to_owned()),
        );
        let batch = pool.submit_batch("q", 1).wait();
        assert_eq!(batch.error.as_deref(), Some("boom"));
        pool.shutdown(Some(Duration::from_secs(2)));
    }
}
