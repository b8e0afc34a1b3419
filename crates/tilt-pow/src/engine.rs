//! The Tilthash engine: epoch-indexed caches and datasets with on-disk
//! dumps, in-memory LRU eviction and background pre-generation of the
//! next epoch, plus seal verification.

use crate::algorithm::{generate_cache, generate_dataset, hashimoto_light, seed_hash};
use crate::dump::{endian_suffix, memory_map, memory_map_and_generate, Dump};
use crate::error::{PowError, PowResult};
use crate::meter::Meter;
use crate::sizes::{cache_size, dataset_size, EPOCH_LENGTH};
use parking_lot::Mutex;
use rand::rngs::StdRng;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tilt_primitives::U512;
use tilt_types::BlockHeader;
use tracing::{debug, info, trace, warn};

/// Data structure version used in dump file names
pub(crate) const ALGORITHM_REVISION: u32 = 23;

/// Tester-mode cache bytes
pub(crate) const TEST_CACHE_BYTES: u64 = 1024;
/// Tester-mode dataset bytes
pub(crate) const TEST_DATASET_BYTES: u64 = 32 * 1024;

/// Epoch artifact backing: plain memory or a memory-mapped dump
pub(crate) enum Words {
    Mem(Vec<u32>),
    Disk(Dump),
}

impl Words {
    fn as_slice(&self) -> &[u32] {
        match self {
            Words::Mem(words) => words,
            Words::Disk(dump) => dump.words(),
        }
    }
}

fn dump_path(dir: &Path, prefix: &str, epoch: u64) -> PathBuf {
    let seed = seed_hash(epoch * EPOCH_LENGTH + 1);
    dir.join(format!(
        "{}-R{}-{}{}",
        prefix,
        ALGORITHM_REVISION,
        hex::encode(&seed.as_bytes()[..8]),
        endian_suffix()
    ))
}

/// Delete artifacts older than `epoch - limit` under the same naming
/// convention
fn sweep_stale(dir: &Path, prefix: &str, epoch: u64, limit: u64) {
    if epoch < limit {
        return;
    }
    for stale in (0..=epoch - limit).rev() {
        let _ = std::fs::remove_file(dump_path(dir, prefix, stale));
    }
}

/// A verification cache for one epoch. Generation happens at most once,
/// even under concurrent callers; later callers block on the first.
pub struct Cache {
    epoch: u64,
    data: OnceLock<Words>,
    used: Mutex<Instant>,
}

impl Cache {
    fn new(epoch: u64) -> Self {
        Self {
            epoch,
            data: OnceLock::new(),
            used: Mutex::new(Instant::now()),
        }
    }

    /// The cache words; empty until generated
    pub fn words(&self) -> &[u32] {
        self.data.get().map(Words::as_slice).unwrap_or(&[])
    }

    pub(crate) fn generate(&self, dir: Option<&Path>, limit: u64, test: bool) -> &Words {
        self.data.get_or_init(|| {
            if test {
                let mut words = vec![0u32; (TEST_CACHE_BYTES / 4) as usize];
                generate_cache(&mut words, self.epoch, seed_hash(self.epoch * EPOCH_LENGTH + 1));
                return Words::Mem(words);
            }
            let size = cache_size(self.epoch * EPOCH_LENGTH + 1);
            let seed = seed_hash(self.epoch * EPOCH_LENGTH + 1);

            let Some(dir) = dir else {
                let mut words = vec![0u32; (size / 4) as usize];
                generate_cache(&mut words, self.epoch, seed);
                return Words::Mem(words);
            };

            let path = dump_path(dir, "cache", self.epoch);
            match memory_map(&path) {
                Ok(dump) => {
                    debug!(epoch = self.epoch, "loaded old tilthash cache from disk");
                    return Words::Disk(dump);
                }
                Err(err) => debug!(epoch = self.epoch, %err, "failed to load old tilthash cache"),
            }

            let epoch = self.epoch;
            match memory_map_and_generate(&path, size, |buf| generate_cache(buf, epoch, seed)) {
                Ok(dump) => {
                    sweep_stale(dir, "cache", self.epoch, limit);
                    Words::Disk(dump)
                }
                Err(err) => {
                    warn!(epoch = self.epoch, %err, "failed to generate mapped tilthash cache");
                    let mut words = vec![0u32; (size / 4) as usize];
                    generate_cache(&mut words, self.epoch, seed);
                    Words::Mem(words)
                }
            }
        })
    }
}

/// A full mining dataset for one epoch, produced from the same epoch's
/// cache
pub struct Dataset {
    epoch: u64,
    data: OnceLock<Words>,
    used: Mutex<Instant>,
}

impl Dataset {
    fn new(epoch: u64) -> Self {
        Self {
            epoch,
            data: OnceLock::new(),
            used: Mutex::new(Instant::now()),
        }
    }

    /// The dataset words; empty until generated
    pub fn words(&self) -> &[u32] {
        self.data.get().map(Words::as_slice).unwrap_or(&[])
    }

    pub(crate) fn generate(&self, dir: Option<&Path>, limit: u64, test: bool) -> &Words {
        self.data.get_or_init(|| {
            let seed = seed_hash(self.epoch * EPOCH_LENGTH + 1);
            if test {
                let mut cache = vec![0u32; (TEST_CACHE_BYTES / 4) as usize];
                generate_cache(&mut cache, self.epoch, seed);
                let mut words = vec![0u32; (TEST_DATASET_BYTES / 4) as usize];
                generate_dataset(&mut words, self.epoch, &cache);
                return Words::Mem(words);
            }
            let csize = cache_size(self.epoch * EPOCH_LENGTH + 1);
            let dsize = dataset_size(self.epoch * EPOCH_LENGTH + 1);

            let Some(dir) = dir else {
                let mut cache = vec![0u32; (csize / 4) as usize];
                generate_cache(&mut cache, self.epoch, seed);
                let mut words = vec![0u32; (dsize / 4) as usize];
                generate_dataset(&mut words, self.epoch, &cache);
                return Words::Mem(words);
            };

            let path = dump_path(dir, "full", self.epoch);
            match memory_map(&path) {
                Ok(dump) => {
                    debug!(epoch = self.epoch, "loaded old tilthash dataset from disk");
                    return Words::Disk(dump);
                }
                Err(err) => debug!(epoch = self.epoch, %err, "failed to load old tilthash dataset"),
            }

            let mut cache = vec![0u32; (csize / 4) as usize];
            generate_cache(&mut cache, self.epoch, seed);

            let epoch = self.epoch;
            let result = memory_map_and_generate(&path, dsize, |buf| {
                generate_dataset(buf, epoch, &cache)
            });
            match result {
                Ok(dump) => {
                    sweep_stale(dir, "full", self.epoch, limit);
                    Words::Disk(dump)
                }
                Err(err) => {
                    warn!(epoch = self.epoch, %err, "failed to generate mapped tilthash dataset");
                    let mut words = vec![0u32; (dsize / 4) as usize];
                    generate_dataset(&mut words, self.epoch, &cache);
                    Words::Mem(words)
                }
            }
        })
    }
}

/// Storage and retention options for the engine
#[derive(Clone, Debug)]
pub struct EngineConfig {
    /// Where verification caches are dumped; None keeps them in memory
    pub cache_dir: Option<PathBuf>,
    /// Caches kept in memory (at least one is always pinned)
    pub caches_in_mem: usize,
    /// Epochs of caches retained on disk
    pub caches_on_disk: u64,
    /// Where mining datasets are dumped; None keeps them in memory
    pub dag_dir: Option<PathBuf>,
    /// Datasets kept in memory
    pub dags_in_mem: usize,
    /// Epochs of datasets retained on disk
    pub dags_on_disk: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cache_dir: None,
            caches_in_mem: 2,
            caches_on_disk: 3,
            dag_dir: None,
            dags_in_mem: 1,
            dags_on_disk: 2,
        }
    }
}

struct Store<T> {
    map: HashMap<u64, Arc<T>>,
    future: Option<Arc<T>>,
}

impl<T> Store<T> {
    fn new() -> Self {
        Self {
            map: HashMap::new(),
            future: None,
        }
    }
}

/// The proof-of-work consensus engine
pub struct Tilthash {
    config: EngineConfig,

    caches: Mutex<Store<Cache>>,
    datasets: Mutex<Store<Dataset>>,

    // Mining fields
    pub(crate) rand: Mutex<Option<StdRng>>,
    pub(crate) threads: Mutex<i32>,
    pub(crate) update: AtomicBool,
    pub(crate) hashrate: Meter,

    // Testing hooks
    pub(crate) tester: bool,
    pub(crate) shared: Option<Arc<Tilthash>>,
    pub(crate) fake_mode: bool,
    pub(crate) fake_full: bool,
    pub(crate) fake_fail: Option<u64>,
    pub(crate) fake_delay: Option<Duration>,
}

impl Tilthash {
    fn base(config: EngineConfig) -> Self {
        Self {
            config,
            caches: Mutex::new(Store::new()),
            datasets: Mutex::new(Store::new()),
            rand: Mutex::new(None),
            threads: Mutex::new(0),
            update: AtomicBool::new(false),
            hashrate: Meter::new(),
            tester: false,
            shared: None,
            fake_mode: false,
            fake_full: false,
            fake_fail: None,
            fake_delay: None,
        }
    }

    /// Create a full-sized engine
    pub fn new(mut config: EngineConfig) -> Self {
        if config.caches_in_mem == 0 {
            warn!(requested = 0, "one tilthash cache must always be in memory");
            config.caches_in_mem = 1;
        }
        if let Some(dir) = &config.cache_dir {
            if config.caches_on_disk > 0 {
                info!(dir = %dir.display(), count = config.caches_on_disk, "disk storage enabled for tilthash caches");
            }
        }
        if let Some(dir) = &config.dag_dir {
            if config.dags_on_disk > 0 {
                info!(dir = %dir.display(), count = config.dags_on_disk, "disk storage enabled for tilthash DAGs");
            }
        }
        Self::base(config)
    }

    /// Create a small engine with 1 KiB caches and 32 KiB datasets, only
    /// useful for testing
    pub fn new_tester() -> Self {
        let mut engine = Self::base(EngineConfig {
            caches_in_mem: 1,
            ..EngineConfig::default()
        });
        engine.tester = true;
        engine
    }

    /// A fake engine accepting every seal as valid
    pub fn new_faker() -> Self {
        let mut engine = Self::base(EngineConfig::default());
        engine.fake_mode = true;
        engine
    }

    /// A fake engine accepting every seal except block `fail`
    pub fn new_fake_failer(fail: u64) -> Self {
        let mut engine = Self::new_faker();
        engine.fake_fail = Some(fail);
        engine
    }

    /// A fake engine that sleeps `delay` before every verification
    pub fn new_fake_delayer(delay: Duration) -> Self {
        let mut engine = Self::new_faker();
        engine.fake_delay = Some(delay);
        engine
    }

    /// A fake engine skipping every consensus check
    pub fn new_full_faker() -> Self {
        let mut engine = Self::new_faker();
        engine.fake_full = true;
        engine
    }

    /// An engine delegating to the process-wide shared instance, so many
    /// users avoid regenerating the same caches
    pub fn new_shared() -> Self {
        let mut engine = Self::base(EngineConfig::default());
        engine.shared = Some(shared());
        engine
    }

    /// Retrieve (generating if needed) the verification cache for `block`
    pub fn cache(&self, block: u64) -> Arc<Cache> {
        let epoch = block / EPOCH_LENGTH;
        let mut scheduled_future: Option<Arc<Cache>> = None;

        let current = {
            let mut store = self.caches.lock();

            let current = if let Some(hit) = store.map.get(&epoch).cloned() {
                hit
            } else {
                // Evict least-recently-used caches down to the limit
                while !store.map.is_empty() && store.map.len() >= self.config.caches_in_mem {
                    let lru = store
                        .map
                        .iter()
                        .min_by_key(|(_, c)| *c.used.lock())
                        .map(|(e, _)| *e);
                    match lru {
                        Some(evict) => {
                            store.map.remove(&evict);
                            trace!(epoch = evict, "evicted tilthash cache");
                        }
                        None => break,
                    }
                }
                // Adopt the pre-generated future cache when it matches
                let fresh = match store.future.take() {
                    Some(future) if future.epoch == epoch => {
                        trace!(epoch, "using pre-generated cache");
                        future
                    }
                    other => {
                        store.future = other;
                        trace!(epoch, "requiring new tilthash cache");
                        Arc::new(Cache::new(epoch))
                    }
                };
                store.map.insert(epoch, fresh.clone());
                *fresh.used.lock() = Instant::now();
                fresh
            };

            // Keep one future slot pointed past the current epoch
            if store.future.as_ref().map_or(true, |f| f.epoch <= epoch) {
                trace!(epoch = epoch + 1, "requiring new future tilthash cache");
                let future = Arc::new(Cache::new(epoch + 1));
                store.future = Some(future.clone());
                scheduled_future = Some(future);
            }
            current
        };

        // Generation happens outside the engine lock; the per-entry
        // one-shot makes duplicates impossible
        current.generate(
            self.config.cache_dir.as_deref(),
            self.config.caches_on_disk,
            self.tester,
        );
        *current.used.lock() = Instant::now();

        if let Some(future) = scheduled_future {
            let dir = self.config.cache_dir.clone();
            let limit = self.config.caches_on_disk;
            let tester = self.tester;
            std::thread::spawn(move || {
                future.generate(dir.as_deref(), limit, tester);
            });
        }
        current
    }

    /// Retrieve (generating if needed) the mining dataset for `block`
    pub fn dataset(&self, block: u64) -> Arc<Dataset> {
        let epoch = block / EPOCH_LENGTH;
        let mut scheduled_future: Option<Arc<Dataset>> = None;

        let current = {
            let mut store = self.datasets.lock();

            let current = if let Some(hit) = store.map.get(&epoch).cloned() {
                hit
            } else {
                while !store.map.is_empty() && store.map.len() >= self.config.dags_in_mem {
                    let lru = store
                        .map
                        .iter()
                        .min_by_key(|(_, d)| *d.used.lock())
                        .map(|(e, _)| *e);
                    match lru {
                        Some(evict) => {
                            store.map.remove(&evict);
                            trace!(epoch = evict, "evicted tilthash dataset");
                        }
                        None => break,
                    }
                }
                let fresh = match store.future.take() {
                    Some(future) if future.epoch == epoch => {
                        trace!(epoch, "using pre-generated dataset");
                        future
                    }
                    other => {
                        store.future = other;
                        trace!(epoch, "requiring new tilthash dataset");
                        Arc::new(Dataset::new(epoch))
                    }
                };
                store.map.insert(epoch, fresh.clone());
                *fresh.used.lock() = Instant::now();
                fresh
            };

            if store.future.as_ref().map_or(true, |f| f.epoch <= epoch) {
                trace!(epoch = epoch + 1, "requiring new future tilthash dataset");
                let future = Arc::new(Dataset::new(epoch + 1));
                store.future = Some(future.clone());
                scheduled_future = Some(future);
            }
            current
        };

        current.generate(
            self.config.dag_dir.as_deref(),
            self.config.dags_on_disk,
            self.tester,
        );
        *current.used.lock() = Instant::now();

        if let Some(future) = scheduled_future {
            let dir = self.config.dag_dir.clone();
            let limit = self.config.dags_on_disk;
            let tester = self.tester;
            std::thread::spawn(move || {
                future.generate(dir.as_deref(), limit, tester);
            });
        }
        current
    }

    /// Number of mining threads currently configured. This does not mean
    /// mining is running.
    pub fn threads(&self) -> i32 {
        *self.threads.lock()
    }

    /// Update the mining thread count and nudge any running seal to pick
    /// it up. Zero means all logical CPUs; negative idles the miner.
    pub fn set_threads(&self, threads: i32) {
        if let Some(shared) = &self.shared {
            shared.set_threads(threads);
            return;
        }
        *self.threads.lock() = threads;
        self.update.store(true, std::sync::atomic::Ordering::Release);
    }

    /// Measured rate of search attempts per second over the last minute
    pub fn hashrate(&self) -> f64 {
        self.hashrate.rate()
    }

    /// Whether the engine runs tester-sized artifacts
    pub fn is_tester(&self) -> bool {
        self.tester
    }

    /// Verify that `header`'s seal satisfies its difficulty
    pub fn verify_seal(&self, header: &BlockHeader) -> PowResult<()> {
        if self.fake_full {
            return Ok(());
        }
        if self.fake_mode {
            if let Some(delay) = self.fake_delay {
                std::thread::sleep(delay);
            }
            if self.fake_fail == Some(header.number) {
                return Err(PowError::InvalidPow);
            }
            return Ok(());
        }
        if let Some(shared) = &self.shared {
            return shared.verify_seal(header);
        }
        if header.difficulty.is_zero() {
            return Err(PowError::InvalidDifficulty);
        }

        let cache = self.cache(header.number);
        let size = if self.tester {
            TEST_DATASET_BYTES
        } else {
            dataset_size(header.number)
        };

        let (digest, result) = hashimoto_light(
            size,
            cache.words(),
            &header.hash_no_nonce(),
            header.nonce,
        );
        if digest != header.mix_digest {
            return Err(PowError::InvalidMixDigest);
        }
        let target = (U512::one() << 256) / U512::from(header.difficulty);
        if U512::from(result.to_word()) > target {
            return Err(PowError::InvalidPow);
        }
        Ok(())
    }
}

/// The process-wide shared engine, created on first use
pub fn shared() -> Arc<Tilthash> {
    static SHARED: OnceLock<Arc<Tilthash>> = OnceLock::new();
    SHARED
        .get_or_init(|| {
            Arc::new(Tilthash::new(EngineConfig {
                caches_in_mem: 3,
                caches_on_disk: 0,
                dags_in_mem: 1,
                dags_on_disk: 0,
                ..EngineConfig::default()
            }))
        })
        .clone()
}

/// Generate the next epoch's verification cache into `dir` ahead of time
pub fn make_cache(block: u64, dir: &Path) {
    let cache = Cache::new(block / EPOCH_LENGTH + 1);
    cache.generate(Some(dir), u64::MAX, false);
}

/// Generate the next epoch's mining dataset into `dir` ahead of time
pub fn make_dataset(block: u64, dir: &Path) {
    let dataset = Dataset::new(block / EPOCH_LENGTH + 1);
    dataset.generate(Some(dir), u64::MAX, false);
}
