//! Multi-threaded nonce search

use crate::engine::Tilthash;
use crate::error::PowResult;
use crate::algorithm::hashimoto_full;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc;
use std::time::Duration;
use tilt_primitives::{H256, U512};
use tilt_types::Block;
use tracing::trace;

/// How often the seal loop wakes to poll the stop and update flags
const SEAL_POLL: Duration = Duration::from_millis(25);

/// Attempts batched between hashrate meter updates
const HASHRATE_BATCH: u64 = 1 << 15;

enum Outcome {
    Found(Block),
    Stopped,
    Restart,
}

impl Tilthash {
    /// Search for a nonce satisfying the block's difficulty.
    ///
    /// Returns `Ok(Some(sealed))` when a worker finds a seal,
    /// `Ok(None)` when the caller raises `stop`. A thread-count change
    /// through [`Tilthash::set_threads`] aborts the current attempt and
    /// restarts with fresh workers.
    pub fn seal(&self, block: &Block, stop: &AtomicBool) -> PowResult<Option<Block>> {
        // Fake engines return a zeroed seal immediately
        if self.fake_mode {
            let mut header = block.header();
            header.nonce = 0;
            header.mix_digest = H256::ZERO;
            return Ok(Some(block.with_seal(header)));
        }
        if let Some(shared) = &self.shared {
            return shared.seal(block, stop);
        }

        loop {
            self.update.store(false, Ordering::Release);

            let threads = {
                let mut rand = self.rand.lock();
                if rand.is_none() {
                    *rand = Some(rand::rngs::StdRng::from_entropy());
                }
                *self.threads.lock()
            };
            let workers = if threads == 0 {
                num_cpus::get()
            } else if threads < 0 {
                // Negative counts idle the miner without tearing down the
                // surrounding machinery
                0
            } else {
                threads as usize
            };

            let abort = AtomicBool::new(false);
            let (found_tx, found_rx) = mpsc::channel();

            let outcome = std::thread::scope(|scope| {
                for id in 0..workers {
                    let seed = {
                        let mut rand = self.rand.lock();
                        match rand.as_mut() {
                            Some(rng) => rng.gen::<u64>(),
                            None => 0,
                        }
                    };
                    let tx = found_tx.clone();
                    let abort = &abort;
                    scope.spawn(move || self.mine(block, id, seed, abort, tx));
                }
                drop(found_tx);

                // Wait until sealing terminates, a nonce is found, or the
                // thread count changes under us
                let result = loop {
                    if stop.load(Ordering::Acquire) {
                        break Outcome::Stopped;
                    }
                    if self.update.load(Ordering::Acquire) {
                        break Outcome::Restart;
                    }
                    match found_rx.recv_timeout(SEAL_POLL) {
                        Ok(sealed) => break Outcome::Found(sealed),
                        Err(mpsc::RecvTimeoutError::Timeout) => continue,
                        Err(mpsc::RecvTimeoutError::Disconnected) => {
                            // No workers are running (idle); keep watching
                            // the control flags
                            std::thread::sleep(SEAL_POLL);
                        }
                    }
                };
                abort.store(true, Ordering::Release);
                // Leaving the scope joins all workers
                result
            });

            match outcome {
                Outcome::Found(sealed) => return Ok(Some(sealed)),
                Outcome::Stopped => return Ok(None),
                Outcome::Restart => continue,
            }
        }
    }

    /// One search worker: walk nonces from `seed` until aborted or a
    /// result below the target is found
    fn mine(
        &self,
        block: &Block,
        id: usize,
        seed: u64,
        abort: &AtomicBool,
        found: mpsc::Sender<Block>,
    ) {
        let header = block.header();
        let hash = header.hash_no_nonce();
        // A zero difficulty would make the target division meaningless;
        // clamp so the search trivially succeeds instead of trapping
        let difficulty = header.difficulty.max(tilt_primitives::U256::one());
        let target = (U512::one() << 256) / U512::from(difficulty);
        let dataset = self.dataset(header.number);

        let mut attempts: u64 = 0;
        let mut nonce = seed;
        trace!(miner = id, seed, "started tilthash nonce search");
        loop {
            if abort.load(Ordering::Acquire) {
                trace!(miner = id, attempts = nonce.wrapping_sub(seed), "tilthash nonce search aborted");
                self.hashrate.mark(attempts);
                return;
            }
            // Batch meter updates to amortize contention
            attempts += 1;
            if attempts % HASHRATE_BATCH == 0 {
                self.hashrate.mark(attempts);
                attempts = 0;
            }

            let (digest, result) = hashimoto_full(dataset.words(), &hash, nonce);
            if U512::from(result.to_word()) <= target {
                let mut sealed = header.clone();
                sealed.nonce = nonce;
                sealed.mix_digest = digest;

                // Deliver unless an abort raced us to it
                match found.send(block.with_seal(sealed)) {
                    Ok(()) => trace!(miner = id, nonce, "tilthash nonce found and reported"),
                    Err(_) => trace!(miner = id, nonce, "tilthash nonce found but discarded"),
                }
                return;
            }
            nonce = nonce.wrapping_add(1);
        }
    }
}
