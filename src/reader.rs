//! Plot reader pool: one reader thread per bucket of plot files, streaming
//! the active scoop out of each file's interleaved stagger layout into
//! slab-sized buffers and posting [`VerifyJob`]s.

use crate::arbiter::MemoryArbiter;
use crate::coordinator::{BlockContext, BlockCoordinator};
use crate::job::VerifyJob;
use crate::plot::{PlotFile, SCOOP_SIZE};
use crate::queue::VerifyProducer;
use crossbeam_channel::Receiver;
use std::fs::File;
use std::io::{self, Read, Seek, SeekFrom};
use std::sync::Arc;

/// Largest slab a reader will ever request, before clamping to the
/// arbiter's current limit: the largest power-of-two not exceeding a
/// policy cap (e.g. 256 KiB).
const POLICY_CAP_BYTES: u64 = 256 * 1024;

pub struct PlotReader {
    plots: Vec<PlotFile>,
    coordinator: Arc<BlockCoordinator>,
    arbiter: Arc<MemoryArbiter>,
    queue: VerifyProducer,
}

impl PlotReader {
    pub fn new(
        plots: Vec<PlotFile>,
        coordinator: Arc<BlockCoordinator>,
        arbiter: Arc<MemoryArbiter>,
        queue: VerifyProducer,
    ) -> Self {
        PlotReader { plots, coordinator, arbiter, queue }
    }

    /// Runs one scan per round received on `rounds`, until the channel is
    /// closed (shutdown).
    pub fn run(&self, rounds: Receiver<BlockContext>) {
        for ctx in rounds {
            for plot in &self.plots {
                if !self.coordinator.is_current(ctx.height) {
                    break;
                }
                if let Err(e) = self.scan_plot(plot, &ctx) {
                    error!("plot read error, skipping file: path={}, err={}", plot.path.display(), e);
                }
            }
        }
    }

    fn scan_plot(&self, plot: &PlotFile, ctx: &BlockContext) -> io::Result<()> {
        let mut file = File::open(&plot.path)?;
        let slab_scoops = self.slab_size_scoops(plot);

        for stagger_index in 0..plot.num_staggers() {
            if !self.coordinator.is_current(ctx.height) {
                return Ok(());
            }

            let stagger_base = stagger_index * plot.stagger_size();
            let scoop_base = stagger_base + plot.scoop_offset_in_stagger(ctx.scoop_number);

            let mut done = 0u64;
            while done < plot.stagger {
                if !self.coordinator.is_current(ctx.height) {
                    return Ok(());
                }

                let take = slab_scoops.min(plot.stagger - done);
                let n_bytes = take * SCOOP_SIZE as u64;

                let reservation = match self.arbiter.reserve(n_bytes) {
                    Some(r) => r,
                    None => return Ok(()), // cancelled mid-reserve
                };

                let mut buffer = vec![0u8; n_bytes as usize];
                let offset = scoop_base + done * SCOOP_SIZE as u64;
                file.seek(SeekFrom::Start(offset))?;
                if let Err(e) = file.read_exact(&mut buffer) {
                    self.arbiter.release(reservation.bytes);
                    return Err(e);
                }

                let job = VerifyJob {
                    buffer,
                    account_id: plot.account_id,
                    nonce_start: plot.start_nonce,
                    nonce_read: stagger_index * plot.stagger + done,
                    input_path: plot.path.clone(),
                    block: ctx.height,
                    gensig: ctx.gensig,
                    base_target: ctx.base_target,
                    memory_size: reservation.bytes,
                };

                if self.queue.enqueue(job).is_err() {
                    // Queue shut down underneath us; undo the reservation.
                    self.arbiter.release(reservation.bytes);
                    return Ok(());
                }

                done += take;
            }
        }
        Ok(())
    }

    /// Largest power-of-two scoop count whose byte size fits both the
    /// policy cap and the arbiter's current limit, never below one scoop,
    /// so a tiny `maxBufferSizeMB` still makes progress.
    fn slab_size_scoops(&self, plot: &PlotFile) -> u64 {
        let cap_bytes = POLICY_CAP_BYTES.min(self.arbiter.limit().max(SCOOP_SIZE as u64));
        let max_scoops = (cap_bytes / SCOOP_SIZE as u64).max(1);
        prev_pow2(max_scoops).min(plot.stagger).max(1)
    }
}

fn prev_pow2(n: u64) -> u64 {
    if n == 0 {
        0
    } else {
        1u64 << (63 - n.leading_zeros())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::poc_hashing::deadline_for_scoop;
    use crate::verifier::Verifier;
    use crate::shabal_engine::SimdWidth;
    use std::path::PathBuf;
    use std::io::Write;
    use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    struct RecordingSubmitter {
        calls: Mutex<Vec<(u64, u64, u64, u64, PathBuf)>>,
    }

    impl crate::coordinator::Submitter for RecordingSubmitter {
        fn submit_nonce(&self, nonce: u64, account_id: u64, deadline: u64, block: u64, path: &std::path::Path) {
            self.calls.lock().unwrap().push((nonce, account_id, deadline, block, path.to_path_buf()));
        }
    }

    /// Writes a plot file with `nonces` nonces / `stagger` stagger and
    /// deterministic-but-arbitrary scoop content (byte value = nonce index
    /// mod 251, so every scoop in the file is distinguishable).
    fn write_fixture_plot(dir: &std::path::Path, account: u64, start: u64, nonces: u64, stagger: u64) -> PlotFile {
        let name = format!("{}_{}_{}_{}", account, start, nonces, stagger);
        let path = dir.join(&name);
        let mut f = File::create(&path).unwrap();
        for nonce_idx in 0..nonces {
            for scoop in 0..4096u32 {
                let mut block = [0u8; SCOOP_SIZE];
                block[0] = (nonce_idx % 251) as u8;
                block[1] = (scoop % 251) as u8;
                f.write_all(&block).unwrap();
            }
        }
        crate::plot::PlotFile::from_path(&path).unwrap()
    }

    fn reference_scan(plot: &PlotFile, scoop_number: u32, gensig: &[u8; 32], base_target: u64) -> (u64, u64) {
        let mut file = File::open(&plot.path).unwrap();
        let mut best = (u64::MAX, u64::MAX); // (deadline, nonce)
        for stagger_index in 0..plot.num_staggers() {
            let base = stagger_index * plot.stagger_size() + plot.scoop_offset_in_stagger(scoop_number);
            for n in 0..plot.stagger {
                let mut scoop = [0u8; SCOOP_SIZE];
                file.seek(SeekFrom::Start(base + n * SCOOP_SIZE as u64)).unwrap();
                file.read_exact(&mut scoop).unwrap();
                let deadline = deadline_for_scoop(gensig, &scoop, base_target).unwrap();
                let nonce = plot.start_nonce + stagger_index * plot.stagger + n;
                if deadline < best.0 {
                    best = (deadline, nonce);
                }
            }
        }
        best
    }

    fn run_pipeline(plot: PlotFile, ctx: BlockContext, arbiter_limit: u64) -> Arc<RecordingSubmitter> {
        let submitter = Arc::new(RecordingSubmitter { calls: Mutex::new(Vec::new()) });
        let coordinator = Arc::new(BlockCoordinator::new(submitter.clone()));
        coordinator.on_new_block(ctx.height, ctx.gensig, ctx.base_target);
        let arbiter = Arc::new(MemoryArbiter::new(arbiter_limit));
        let (producer, consumer) = crate::queue::channel(4);

        let reader = PlotReader::new(vec![plot], coordinator.clone(), arbiter.clone(), producer);
        let processed = Arc::new(AtomicU64::new(0));
        let verifier = Verifier::new(consumer, arbiter.clone(), coordinator.clone(), SimdWidth::Scalar, processed);

        let (tx_round, rx_round) = crossbeam_channel::unbounded();
        tx_round.send(ctx).unwrap();
        drop(tx_round);

        let verifier_handle = std::thread::spawn(move || verifier.run());
        reader.run(rx_round);
        drop(reader); // drops the reader's producer clone, the last live one
        verifier_handle.join().unwrap();

        submitter
    }

    #[test]
    fn matches_reference_scan_across_two_staggers() {
        let dir = tempdir().unwrap();
        let plot = write_fixture_plot(dir.path(), 1337, 0, 8, 4);
        let gensig = [0u8; 32];
        let ctx = BlockContext { height: 1, gensig, base_target: 1, scoop_number: 17 };
        let expected = reference_scan(&plot, 17, &gensig, 1);

        let submitter = run_pipeline(plot, ctx, 1 << 20);
        let calls = submitter.calls.lock().unwrap();
        let best = calls.iter().min_by_key(|c| c.2).unwrap();
        assert_eq!(best.0, expected.1);
        assert_eq!(best.2, expected.0);
    }

    #[test]
    fn tiny_arbiter_limit_still_makes_progress() {
        let dir = tempdir().unwrap();
        let plot = write_fixture_plot(dir.path(), 1, 0, 4, 4);
        let gensig = [1u8; 32];
        let ctx = BlockContext { height: 1, gensig, base_target: 1, scoop_number: 3 };
        let expected = reference_scan(&plot, 3, &gensig, 1);

        // One scoop's worth of bytes only.
        let submitter = run_pipeline(plot, ctx, SCOOP_SIZE as u64);
        let calls = submitter.calls.lock().unwrap();
        let best = calls.iter().min_by_key(|c| c.2).unwrap();
        assert_eq!(best.0, expected.1);
        assert_eq!(best.2, expected.0);
    }

    #[test]
    fn block_change_mid_scan_drops_remaining_work_and_frees_memory() {
        let dir = tempdir().unwrap();
        // Many staggers so the reader has plenty of chances to observe the
        // height flip mid-scan.
        let plot = write_fixture_plot(dir.path(), 1, 0, 64, 1);

        let submitter = Arc::new(RecordingSubmitter { calls: Mutex::new(Vec::new()) });
        let coordinator = Arc::new(BlockCoordinator::new(submitter.clone()));
        coordinator.on_new_block(1, [0; 32], 1);
        let arbiter = Arc::new(MemoryArbiter::new(SCOOP_SIZE as u64 * 2));
        let (producer, consumer) = crate::queue::channel(2);

        let reader = PlotReader::new(vec![plot], coordinator.clone(), arbiter.clone(), producer);
        let ctx = BlockContext { height: 1, gensig: [0; 32], base_target: 1, scoop_number: 0 };

        let flip = Arc::new(AtomicBool::new(false));
        let flip_clone = flip.clone();
        let coordinator_clone = coordinator.clone();
        let flipper = std::thread::spawn(move || {
            // Flip as soon as we can observe at least one job went through.
            std::thread::sleep(std::time::Duration::from_millis(5));
            coordinator_clone.on_new_block(2, [0; 32], 1);
            flip_clone.store(true, Ordering::Relaxed);
        });

        let processed = Arc::new(AtomicU64::new(0));
        let verifier = Verifier::new(consumer, arbiter.clone(), coordinator.clone(), SimdWidth::Scalar, processed);
        let verifier_handle = std::thread::spawn(move || verifier.run());

        let (tx_round, rx_round) = crossbeam_channel::unbounded();
        tx_round.send(ctx).unwrap();
        drop(tx_round);
        reader.run(rx_round);
        drop(reader); // drops the reader's producer clone, the last live one
        verifier_handle.join().unwrap();
        flipper.join().unwrap();

        assert_eq!(arbiter.outstanding(), 0);
        for call in submitter.calls.lock().unwrap().iter() {
            assert_eq!(call.3, 1);
        }
        let _ = flip.load(Ordering::Relaxed);
    }
}
