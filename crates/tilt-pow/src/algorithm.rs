//! The deterministic dataset generation and hashimoto mix functions.
//!
//! A per-epoch seed is hashed into a pseudorandom cache; dataset items are
//! derived from the cache by FNV-combining `DATASET_PARENTS` parents; the
//! hashimoto loop folds `ACCESSES` dataset rows into a 32-byte mix digest
//! and final result hash. Light verification derives dataset items on the
//! fly from the cache and must agree bitwise with the full dataset path.

use crate::sizes::{EPOCH_LENGTH, HASH_BYTES, MIX_BYTES};
use tilt_crypto::{keccak256, keccak512};
use tilt_primitives::H256;

/// Number of parents of each dataset item
const DATASET_PARENTS: u32 = 256;
/// Rounds of cache production
const CACHE_ROUNDS: usize = 3;
/// Dataset rows folded per hashimoto run
const ACCESSES: usize = 64;

const FNV_PRIME: u32 = 0x01000193;

/// Words per hash (64 bytes)
const HASH_WORDS: usize = 16;

fn fnv(a: u32, b: u32) -> u32 {
    a.wrapping_mul(FNV_PRIME) ^ b
}

fn fnv_hash(mix: &mut [u32], data: &[u32]) {
    for (m, d) in mix.iter_mut().zip(data) {
        *m = m.wrapping_mul(FNV_PRIME) ^ d;
    }
}

/// Seed for generating the cache and dataset of the epoch containing
/// `block`: a keccak256 chain applied once per epoch
pub fn seed_hash(block: u64) -> H256 {
    let mut seed = H256::ZERO;
    for _ in 0..block / EPOCH_LENGTH {
        seed = keccak256(seed.as_bytes());
    }
    seed
}

/// Fill `cache` with the verification cache of `epoch`.
///
/// The byte stream is produced as a keccak512 chain followed by
/// `CACHE_ROUNDS` passes of the memo-hash strengthening; words are its
/// little-endian 32-bit reading, independent of host order.
pub fn generate_cache(cache: &mut [u32], epoch: u64, seed: H256) {
    let start = std::time::Instant::now();
    let size = cache.len() * 4;
    let rows = size / HASH_BYTES as usize;
    let mut bytes = vec![0u8; size];

    // Sequentially produce the initial chain
    bytes[..HASH_BYTES as usize].copy_from_slice(&keccak512(seed.as_bytes()));
    for row in 1..rows {
        let prev = (row - 1) * HASH_BYTES as usize;
        let hash = keccak512(&bytes[prev..prev + HASH_BYTES as usize]);
        bytes[row * HASH_BYTES as usize..(row + 1) * HASH_BYTES as usize]
            .copy_from_slice(&hash);
    }

    // A low-round version of randmemohash
    let mut temp = [0u8; HASH_BYTES as usize];
    for _ in 0..CACHE_ROUNDS {
        for row in 0..rows {
            let src = ((row + rows - 1) % rows) * HASH_BYTES as usize;
            let dst = row * HASH_BYTES as usize;
            let xor = (read_u32_le(&bytes, dst) as usize % rows) * HASH_BYTES as usize;
            for i in 0..HASH_BYTES as usize {
                temp[i] = bytes[src + i] ^ bytes[xor + i];
            }
            let hash = keccak512(&temp);
            bytes[dst..dst + HASH_BYTES as usize].copy_from_slice(&hash);
        }
    }

    for (i, word) in cache.iter_mut().enumerate() {
        *word = read_u32_le(&bytes, i * 4);
    }
    tracing::debug!(epoch, elapsed = ?start.elapsed(), "generated tilthash cache");
}

fn read_u32_le(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

/// Derive the 64-byte dataset item at `index` from the cache
pub fn generate_dataset_item(cache: &[u32], index: u32) -> [u8; 64] {
    let rows = (cache.len() / HASH_WORDS) as u32;

    // Initialize the mix from the indexed cache row
    let mut mix = [0u8; HASH_BYTES as usize];
    let base = ((index % rows) * HASH_WORDS as u32) as usize;
    mix[..4].copy_from_slice(&(cache[base] ^ index).to_le_bytes());
    for i in 1..HASH_WORDS {
        mix[i * 4..i * 4 + 4].copy_from_slice(&cache[base + i].to_le_bytes());
    }
    let mix = keccak512(&mix);

    // Fold in the parents
    let mut int_mix = [0u32; HASH_WORDS];
    for (i, word) in int_mix.iter_mut().enumerate() {
        *word = read_u32_le(&mix, i * 4);
    }
    for parent in 0..DATASET_PARENTS {
        let row = fnv(index ^ parent, int_mix[parent as usize % HASH_WORDS]) % rows;
        let start = (row * HASH_WORDS as u32) as usize;
        fnv_hash(&mut int_mix, &cache[start..start + HASH_WORDS]);
    }

    let mut out = [0u8; HASH_BYTES as usize];
    for (i, word) in int_mix.iter().enumerate() {
        out[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
    }
    keccak512(&out)
}

/// Fill `dataset` with the full mining dataset of `epoch`, derived from
/// the same epoch's `cache`. Items are generated on all available cores.
pub fn generate_dataset(dataset: &mut [u32], epoch: u64, cache: &[u32]) {
    let start = std::time::Instant::now();
    let items = dataset.len() / HASH_WORDS;
    if items == 0 {
        return;
    }
    let threads = num_cpus::get().max(1);
    let chunk_items = items.div_ceil(threads).max(1);

    std::thread::scope(|scope| {
        for (chunk_index, chunk) in dataset.chunks_mut(chunk_items * HASH_WORDS).enumerate() {
            let first = (chunk_index * chunk_items) as u32;
            scope.spawn(move || {
                for (i, item_words) in chunk.chunks_mut(HASH_WORDS).enumerate() {
                    let item = generate_dataset_item(cache, first + i as u32);
                    for (j, word) in item_words.iter_mut().enumerate() {
                        *word = read_u32_le(&item, j * 4);
                    }
                }
            });
        }
    });
    tracing::debug!(epoch, items, elapsed = ?start.elapsed(), "generated tilthash dataset");
}

/// The core mix: fold `ACCESSES` dataset rows selected by `hash` and
/// `nonce` into `(mix_digest, result)`. `lookup` fetches a 16-word
/// dataset item; `size` is the dataset's byte length.
fn hashimoto(
    hash: &H256,
    nonce: u64,
    size: u64,
    lookup: impl Fn(u32) -> [u32; HASH_WORDS],
) -> (H256, H256) {
    let rows = (size / MIX_BYTES) as u32;

    // Combine header hash and nonce into the per-attempt seed
    let mut seed_input = [0u8; 40];
    seed_input[..32].copy_from_slice(hash.as_bytes());
    seed_input[32..].copy_from_slice(&nonce.to_le_bytes());
    let seed = keccak512(&seed_input);
    let seed_head = read_u32_le(&seed, 0);

    // The mix starts as the seed words repeated to MIX_BYTES
    const MIX_WORDS: usize = MIX_BYTES as usize / 4;
    let mut mix = [0u32; MIX_WORDS];
    for (i, word) in mix.iter_mut().enumerate() {
        *word = read_u32_le(&seed, (i % HASH_WORDS) * 4);
    }

    let mut temp = [0u32; MIX_WORDS];
    for access in 0..ACCESSES as u32 {
        let parent = fnv(access ^ seed_head, mix[access as usize % MIX_WORDS]) % rows;
        for j in 0..(MIX_BYTES / HASH_BYTES) as u32 {
            let item = lookup(2 * parent + j);
            let start = (j as usize) * HASH_WORDS;
            temp[start..start + HASH_WORDS].copy_from_slice(&item);
        }
        fnv_hash(&mut mix, &temp);
    }

    // Compress the mix down to 8 words
    let mut digest_bytes = [0u8; 32];
    for i in 0..MIX_WORDS / 4 {
        let word = fnv(fnv(fnv(mix[4 * i], mix[4 * i + 1]), mix[4 * i + 2]), mix[4 * i + 3]);
        digest_bytes[i * 4..i * 4 + 4].copy_from_slice(&word.to_le_bytes());
    }
    let digest = H256::from_bytes(digest_bytes);

    let mut result_input = Vec::with_capacity(seed.len() + digest_bytes.len());
    result_input.extend_from_slice(&seed);
    result_input.extend_from_slice(&digest_bytes);
    (digest, keccak256(&result_input))
}

/// Hashimoto over the verification cache, deriving dataset items on the
/// fly. `size` is the byte size of the epoch's full dataset.
pub fn hashimoto_light(size: u64, cache: &[u32], hash: &H256, nonce: u64) -> (H256, H256) {
    hashimoto(hash, nonce, size, |index| {
        let item = generate_dataset_item(cache, index);
        let mut words = [0u32; HASH_WORDS];
        for (i, word) in words.iter_mut().enumerate() {
            *word = read_u32_le(&item, i * 4);
        }
        words
    })
}

/// Hashimoto over a pre-generated full dataset
pub fn hashimoto_full(dataset: &[u32], hash: &H256, nonce: u64) -> (H256, H256) {
    hashimoto(hash, nonce, dataset.len() as u64 * 4, |index| {
        let start = index as usize * HASH_WORDS;
        let mut words = [0u32; HASH_WORDS];
        words.copy_from_slice(&dataset[start..start + HASH_WORDS]);
        words
    })
}
