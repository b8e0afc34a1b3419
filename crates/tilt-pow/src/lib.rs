//! # tilt-pow
//!
//! The Tilthash proof-of-work engine: deterministic per-epoch caches and
//! datasets, the hashimoto mix function, memory-mapped dump files with
//! LRU eviction, and a multi-threaded sealer with cooperative abort.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod algorithm;
mod dump;
mod engine;
mod error;
mod meter;
mod sealer;
mod sizes;

pub use dump::{memory_map, memory_map_and_generate, Dump, DUMP_MAGIC};
pub use engine::{make_cache, make_dataset, shared, Cache, Dataset, EngineConfig, Tilthash};
pub use error::{PowError, PowResult};
pub use meter::Meter;
pub use sizes::{cache_size, dataset_size, EPOCH_LENGTH};
