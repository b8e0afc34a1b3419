//! End-to-end engine tests at tester scale

use std::sync::atomic::AtomicBool;
use tilt_pow::algorithm::{hashimoto_light, seed_hash};
use tilt_pow::{cache_size, dataset_size, memory_map, memory_map_and_generate, Tilthash};
use tilt_primitives::U256;
use tilt_types::{Block, BlockHeader};

const TEST_DATASET_BYTES: u64 = 32 * 1024;

#[test]
fn tester_cache_regeneration_is_byte_equal() {
    let engine = Tilthash::new_tester();
    let first = engine.cache(0).words().to_vec();

    // A second engine regenerates from scratch
    let other = Tilthash::new_tester();
    let second = other.cache(0).words().to_vec();
    assert_eq!(first, second);
}

#[test]
fn seal_and_verify_against_light_hashimoto() {
    let engine = Tilthash::new_tester();
    let block = Block::new(BlockHeader {
        number: 1,
        difficulty: U256::one(),
        ..Default::default()
    });

    let stop = AtomicBool::new(false);
    let sealed = engine
        .seal(&block, &stop)
        .expect("sealing cannot fail")
        .expect("difficulty one always seals");

    // The reported mix digest must match an independent light run
    let cache = engine.cache(sealed.header.number);
    let (mix, _result) = hashimoto_light(
        TEST_DATASET_BYTES,
        cache.words(),
        &sealed.header.hash_no_nonce(),
        sealed.header.nonce,
    );
    assert_eq!(mix, sealed.header.mix_digest);

    // And full verification accepts the seal
    engine.verify_seal(&sealed.header).expect("seal must verify");
}

#[test]
fn verification_rejects_tampered_nonce() {
    let engine = Tilthash::new_tester();
    let block = Block::new(BlockHeader {
        number: 1,
        difficulty: U256::from(256u64),
        ..Default::default()
    });

    let stop = AtomicBool::new(false);
    let sealed = engine.seal(&block, &stop).unwrap().unwrap();
    engine.verify_seal(&sealed.header).expect("honest seal");

    let mut tampered = sealed.header.clone();
    tampered.nonce = tampered.nonce.wrapping_add(1);
    assert!(engine.verify_seal(&tampered).is_err());
}

#[test]
fn dump_roundtrip_byte_for_byte() {
    let dir = std::path::PathBuf::from(format!(
        "/tmp/tilt_pow_it_{}_{}",
        std::process::id(),
        std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap()
            .as_nanos()
    ));
    let path = dir.join("cache-R23-deadbeef00112233");

    // Generate a tester-scale cache in memory, dump it, and map it back
    let mut words = vec![0u32; 256];
    tilt_pow::algorithm::generate_cache(&mut words, 0, seed_hash(1));

    let dump = memory_map_and_generate(&path, (words.len() * 4) as u64, |buf| {
        buf.copy_from_slice(&words)
    })
    .unwrap();
    assert_eq!(dump.words(), &words[..]);
    drop(dump);

    let dump = memory_map(&path).unwrap();
    assert_eq!(dump.words(), &words[..]);
    drop(dump);

    let _ = std::fs::remove_dir_all(&dir);
}

#[test]
fn sizes_are_stable_within_an_epoch() {
    for block in [0u64, 1, 29999] {
        assert_eq!(cache_size(block), cache_size(0));
        assert_eq!(dataset_size(block), dataset_size(0));
    }
    assert_ne!(cache_size(30000), cache_size(0));
}

// Full-scale cache generation takes a while; run explicitly with
// `cargo test -- --ignored` when touching the generation code.
#[test]
#[ignore]
fn make_cache_writes_canonical_file() {
    let dir = std::path::PathBuf::from(format!(
        "/tmp/tilt_pow_makecache_{}",
        std::process::id()
    ));
    tilt_pow::make_cache(0, &dir);

    let entries: Vec<_> = std::fs::read_dir(&dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    assert_eq!(entries.len(), 1);
    assert!(entries[0].starts_with("cache-R23-"));

    let dump = memory_map(&dir.join(&entries[0])).unwrap();
    // make_cache prepares the epoch after the given block
    assert_eq!(
        dump.words().len() as u64,
        cache_size(tilt_pow::EPOCH_LENGTH + 1) / 4
    );
    let _ = std::fs::remove_dir_all(&dir);
}
