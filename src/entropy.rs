//! Entropy Manager.
//!
//! Hands each thread its own reseeding RNG. Deterministic mode derives every
//! thread's initial state from a base seed so that, for a fixed base seed and
//! a fixed thread-assignment, each thread's own draw sequence reproduces
//! exactly; production mode seeds from OS entropy instead.

use rand::{Rng, RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;
use sha2::{Digest, Sha512};
use std::{
    cell::RefCell,
    collections::{hash_map::DefaultHasher, HashMap},
    hash::{Hash, Hasher},
    sync::atomic::{AtomicU64, Ordering as AtomicOrdering},
};

/// Configuration for the entropy manager.
#[derive(Clone, Copy, Debug)]
pub struct EntropyConfig {
    /// Deterministic base seed. `None` means "seed from OS entropy".
    pub base_seed: Option<u64>,
    /// Number of draws between automatic reseeds.
    pub reseed_interval: u64,
    /// Number of live thread-local generators above which the next
    /// registration triggers a lazy sweep of the liveness counter.
    pub gc_threshold: u64,
}

impl Default for EntropyConfig {
    fn default() -> Self {
        EntropyConfig {
            base_seed: None,
            reseed_interval: 1_000_000,
            gc_threshold: 100,
        }
    }
}

/// 256-bit RNG state, expanded and mixed via SHA-512.
#[derive(Clone, Copy)]
struct State([u8; 32]);

impl State {
    fn from_seed_and_counter(seed: u64, counter: u64) -> Self {
        let mut hasher = Sha512::new();
        hasher.update(seed.to_le_bytes());
        hasher.update(counter.to_le_bytes());
        let digest = hasher.finalize();
        let mut state = [0u8; 32];
        state.copy_from_slice(&digest[..32]);
        State(state)
    }

    fn from_os_entropy() -> Self {
        let mut state = [0u8; 32];
        rand::thread_rng().fill_bytes(&mut state);
        State(state)
    }

    fn mix(&mut self, fresh: &[u8; 32]) {
        let mut hasher = Sha512::new();
        hasher.update(self.0);
        hasher.update(fresh);
        let digest = hasher.finalize();
        self.0.copy_from_slice(&digest[..32]);
    }

    fn fingerprint(&self) -> String {
        data_encoding::HEXLOWER.encode(&self.0[..8])
    }

    fn to_rng_seed(self) -> [u8; 32] {
        self.0
    }
}

/// A reseeding, thread-owned random number generator.
///
/// Exposes the draw primitives grammar elements and the data generator need
/// directly, so they never reach for `rand` themselves.
pub struct EnhancedRandom {
    rng: ChaCha20Rng,
    state: State,
    draws_since_reseed: u64,
    reseed_interval: u64,
}

impl EnhancedRandom {
    fn new(state: State, reseed_interval: u64) -> Self {
        let rng = ChaCha20Rng::from_seed(state.to_rng_seed());
        EnhancedRandom {
            rng,
            state,
            draws_since_reseed: 0,
            reseed_interval,
        }
    }

    fn tick(&mut self) {
        self.draws_since_reseed += 1;
        if self.draws_since_reseed >= self.reseed_interval {
            self.reseed();
        }
    }

    fn reseed(&mut self) {
        let mut fresh = [0u8; 32];
        // Deterministic mode still mixes in fresh OS entropy on reseed; only
        // the *initial* state is reproducible, not the reseed schedule.
        rand::thread_rng().fill_bytes(&mut fresh);
        self.state.mix(&fresh);
        self.rng = ChaCha20Rng::from_seed(self.state.to_rng_seed());
        self.draws_since_reseed = 0;
    }

    /// Draws a float in `[0, 1)`.
    pub fn random(&mut self) -> f64 {
        self.tick();
        self.rng.gen::<f64>()
    }

    /// Draws an integer in the inclusive range `[a, b]`.
    pub fn randint(&mut self, a: i64, b: i64) -> i64 {
        self.tick();
        self.rng.gen_range(a..=b)
    }

    /// Draws a float uniformly in `[a, b)`.
    pub fn uniform(&mut self, a: f64, b: f64) -> f64 {
        self.tick();
        self.rng.gen_range(a..b)
    }

    /// Picks a uniformly random element from `seq`.
    pub fn choice<'a, T>(&mut self, seq: &'a [T]) -> &'a T {
        self.tick();
        let idx = self.rng.gen_range(0..seq.len());
        &seq[idx]
    }

    /// Picks an element of `seq` according to `weights` (same length,
    /// non-negative, not all zero).
    pub fn weighted_choice<'a, T>(&mut self, seq: &'a [T], weights: &[f64]) -> &'a T {
        self.tick();
        let total: f64 = weights.iter().sum();
        let mut target = self.rng.gen_range(0.0..total);
        for (item, &w) in seq.iter().zip(weights) {
            if target < w {
                return item;
            }
            target -= w;
        }
        &seq[seq.len() - 1]
    }

    /// Draws from a normal distribution with mean `mu` and stddev `sigma`.
    pub fn gauss(&mut self, mu: f64, sigma: f64) -> f64 {
        self.tick();
        use rand_distr::{Distribution, Normal};
        let dist = Normal::new(mu, sigma).unwrap_or_else(|_| Normal::new(0.0, 1.0).unwrap());
        dist.sample(&mut self.rng)
    }

    /// A 16-hex-character fingerprint of the current internal state.
    pub fn state_fingerprint(&self) -> String {
        self.state.fingerprint()
    }

    /// Direct access to the underlying RNG, for callers (grammar expansion,
    /// data generation) that need a `rand::Rng`/`rand_distr::Distribution`
    /// sampler rather than the named convenience methods above.
    pub fn rng_mut(&mut self) -> &mut ChaCha20Rng {
        self.tick();
        &mut self.rng
    }
}

// Keyed by manager id rather than a single slot: two `EntropyManager`s
// sharing a thread (e.g. a worker thread reused across independent
// deterministic runs) must not see each other's advanced RNG state, so each
// manager instance gets its own entry in this thread's map.
thread_local! {
    static THREAD_RNGS: RefCell<HashMap<u64, EnhancedRandom>> = RefCell::new(HashMap::new());
}

static LIVE_GENERATORS: AtomicU64 = AtomicU64::new(0);
static NEXT_MANAGER_ID: AtomicU64 = AtomicU64::new(1);

/// Shared, read-only entropy manager.
///
/// Holds only configuration and a unique identity; the actual RNG state
/// lives in thread-local storage, created lazily the first time a thread
/// calls [`EntropyManager::with_rng`] on *this* manager. Cloning a manager
/// preserves its identity (and hence its thread-local RNGs); constructing a
/// new one via [`EntropyManager::new`] always gets a fresh identity.
#[derive(Clone)]
pub struct EntropyManager {
    config: EntropyConfig,
    id: u64,
}

impl EntropyManager {
    /// Builds a manager from the given configuration.
    pub fn new(config: EntropyConfig) -> Self {
        EntropyManager {
            config,
            id: NEXT_MANAGER_ID.fetch_add(1, AtomicOrdering::Relaxed),
        }
    }

    fn thread_seed(&self, thread_id: u64) -> u64 {
        let base = self.config.base_seed.unwrap_or(0);
        let mut hasher = DefaultHasher::new();
        (base, thread_id).hash(&mut hasher);
        hasher.finish() & 0x7FFF_FFFF
    }

    fn ensure_initialized(&self) {
        THREAD_RNGS.with(|cell| {
            if cell.borrow().contains_key(&self.id) {
                return;
            }
            let thread_id = current_thread_numeric_id();
            let state = match self.config.base_seed {
                Some(_) => State::from_seed_and_counter(self.thread_seed(thread_id), 0),
                None => State::from_os_entropy(),
            };
            let rng = EnhancedRandom::new(state, self.config.reseed_interval);
            cell.borrow_mut().insert(self.id, rng);

            let live = LIVE_GENERATORS.fetch_add(1, AtomicOrdering::Relaxed) + 1;
            if live > self.config.gc_threshold {
                // Lazy GC: Rust has no portable way to enumerate dead
                // threads' TLS slots, so we simply reset the counter —
                // each thread's own slots are reclaimed by the runtime when
                // the thread exits regardless.
                LIVE_GENERATORS.store(1, AtomicOrdering::Relaxed);
            }
        });
    }

    /// Runs `f` with exclusive access to the calling thread's RNG for this
    /// manager, initializing it on first use.
    pub fn with_rng<R>(&self, f: impl FnOnce(&mut EnhancedRandom) -> R) -> R {
        self.ensure_initialized();
        THREAD_RNGS.with(|cell| {
            let mut guard = cell.borrow_mut();
            f(guard.get_mut(&self.id).expect("initialized above"))
        })
    }

    /// Aggregate statistics beyond the bare state fingerprint: number of
    /// live per-thread generators and the configured reseed interval.
    pub fn statistics(&self) -> EntropyStatistics {
        EntropyStatistics {
            live_generators: LIVE_GENERATORS.load(AtomicOrdering::Relaxed),
            reseed_interval: self.config.reseed_interval,
            deterministic: self.config.base_seed.is_some(),
        }
    }
}

/// A snapshot of entropy-manager-wide counters, exported in checkpoints.
#[derive(Clone, Copy, Debug, serde::Serialize, serde::Deserialize)]
pub struct EntropyStatistics {
    /// Number of thread-local generators believed to still be live.
    pub live_generators: u64,
    /// Configured reseed interval (draws).
    pub reseed_interval: u64,
    /// Whether the manager is running in deterministic (seeded) mode.
    pub deterministic: bool,
}

fn current_thread_numeric_id() -> u64 {
    let mut hasher = DefaultHasher::new();
    std::thread::current().id().hash(&mut hasher);
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deterministic_seed_is_reproducible_within_a_thread() {
        let manager = EntropyManager::new(EntropyConfig {
            base_seed: Some(42),
            ..EntropyConfig::default()
        });
        let first: i64 = manager.with_rng(|rng| rng.randint(0, 1_000_000));
        let second: i64 = manager.with_rng(|rng| rng.randint(0, 1_000_000));
        assert_ne!(first, second, "sequential draws on one thread must advance");
    }

    #[test]
    fn independent_managers_with_the_same_seed_reproduce_on_one_thread() {
        // Two distinct `EntropyManager`s sharing the same thread (e.g. a
        // worker thread reused across two deterministic runs) must not
        // leak state into each other: each gets its own thread-local slot
        // keyed by manager identity, so the same base seed reproduces the
        // same draw sequence regardless of what ran earlier on this thread.
        let a = EntropyManager::new(EntropyConfig { base_seed: Some(42), ..EntropyConfig::default() });
        let b = EntropyManager::new(EntropyConfig { base_seed: Some(42), ..EntropyConfig::default() });
        let from_a: Vec<i64> = (0..10).map(|_| a.with_rng(|rng| rng.randint(0, 1_000_000))).collect();
        let from_b: Vec<i64> = (0..10).map(|_| b.with_rng(|rng| rng.randint(0, 1_000_000))).collect();
        assert_eq!(from_a, from_b);
    }

    #[test]
    fn weighted_choice_picks_from_the_slice() {
        let manager = EntropyManager::new(EntropyConfig {
            base_seed: Some(7),
            ..EntropyConfig::default()
        });
        let options = ["a", "b"];
        let weights = [9.0, 1.0];
        let picked = manager.with_rng(|rng| *rng.weighted_choice(&options, &weights));
        assert!(options.contains(&picked));
    }

    #[test]
    fn state_fingerprint_is_sixteen_hex_chars() {
        let manager = EntropyManager::new(EntropyConfig {
            base_seed: Some(1),
            ..EntropyConfig::default()
        });
        let fp = manager.with_rng(|rng| rng.state_fingerprint());
        assert_eq!(fp.len(), 16);
        assert!(fp.chars().all(|c| c.is_ascii_hexdigit()));
    }
}
