//! Wires the ambient stack (config, pool client) to the core verification
//! pipeline: partitions the plot registry across reader threads, starts
//! the verifier pool, and drives the `getMiningInfo` polling loop that
//! feeds new [`BlockContext`]s into the coordinator.

use crate::arbiter::MemoryArbiter;
use crate::config::Cfg;
use crate::coordinator::{BlockContext, BlockCoordinator, Submitter};
use crate::plot::{PlotFile, PlotRegistry};
use crate::poc_hashing::decode_gensig;
use crate::queue;
use crate::reader::PlotReader;
use crate::request::RequestHandler;
use crate::shabal_engine::SimdWidth;
use crate::verifier::Verifier;
use crossbeam_channel::{Receiver, Sender};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;

/// Bridges the coordinator's `Submitter` contract to the ambient pool
/// client's non-blocking retry queue. Holds a gensig cache rather than an
/// `Arc<BlockCoordinator>` back-reference, which would otherwise cycle
/// with the coordinator's own `Arc<dyn Submitter>`.
struct PoolSubmitter {
    request_handler: RequestHandler,
    current_gensig: Arc<Mutex<[u8; 32]>>,
}

impl Submitter for PoolSubmitter {
    fn submit_nonce(&self, nonce: u64, account_id: u64, deadline: u64, block: u64, plot_path: &Path) {
        info!(
            "nonce found: account={}, nonce={}, deadline={}, block={}, plot={}",
            account_id, nonce, deadline, block, plot_path.display()
        );
        let gensig = *self.current_gensig.lock().unwrap();
        // Block height doubles as the chain height here: the coordinator
        // tracks exactly one notion of "current block".
        self.request_handler
            .submit_nonce(account_id, nonce, block, block, deadline, deadline, gensig);
    }
}

pub struct Miner {
    cfg: Cfg,
    coordinator: Arc<BlockCoordinator>,
    arbiter: Arc<MemoryArbiter>,
    request_handler: RequestHandler,
    registry: PlotRegistry,
    round_txs: Vec<Sender<BlockContext>>,
    reader_handles: Vec<JoinHandle<()>>,
    verifier_handles: Vec<JoinHandle<()>>,
    processed: Arc<AtomicU64>,
    current_gensig: Arc<Mutex<[u8; 32]>>,
}

impl Miner {
    pub fn new(cfg: Cfg) -> Miner {
        let registry = PlotRegistry::scan(&cfg.plots);
        info!(
            "plots: {} files, {} nonces, {:.2} GiB",
            registry.plots().len(),
            registry.total_nonces(),
            registry.total_size() as f64 / (1024.0 * 1024.0 * 1024.0)
        );

        let arbiter = Arc::new(MemoryArbiter::new(cfg.max_buffer_size_bytes()));

        let verifier_threads = if cfg.cpu_threads == 0 { num_cpus::get() } else { cfg.cpu_threads };
        let reader_threads = if cfg.reader_threads == 0 {
            registry.plots().len().max(1).min(num_cpus::get())
        } else {
            cfg.reader_threads
        };

        let (producer, consumer) = queue::channel(verifier_threads * 2);

        let request_handler = RequestHandler::new(
            cfg.mining_info_url.clone(),
            cfg.wallet_url.clone(),
            cfg.secret_phrase.clone(),
            Duration::from_secs(cfg.timeout),
            cfg.send_proxy_details,
            cfg.additional_headers.clone(),
            cfg.submission_max_retry,
        );

        let current_gensig = Arc::new(Mutex::new([0u8; 32]));
        let submitter = Arc::new(PoolSubmitter {
            request_handler: request_handler.clone(),
            current_gensig: current_gensig.clone(),
        });
        let coordinator = Arc::new(BlockCoordinator::new(submitter));

        let core_ids = if cfg.cpu_thread_pinning {
            core_affinity::get_core_ids().unwrap_or_default()
        } else {
            Vec::new()
        };

        let mut round_txs = Vec::with_capacity(reader_threads);
        let mut reader_handles = Vec::with_capacity(reader_threads);
        for (i, bucket) in partition(registry.plots(), reader_threads).into_iter().enumerate() {
            let (tx, rx): (Sender<BlockContext>, Receiver<BlockContext>) = crossbeam_channel::unbounded();
            let reader = PlotReader::new(bucket, coordinator.clone(), arbiter.clone(), producer.clone());
            let core = core_ids.get(i % core_ids.len().max(1)).copied();
            reader_handles.push(std::thread::Builder::new()
                .name(format!("reader-{}", i))
                .spawn(move || {
                    if let Some(core) = core {
                        core_affinity::set_for_current(core);
                    }
                    reader.run(rx);
                })
                .expect("failed to spawn reader thread"));
            round_txs.push(tx);
        }

        let width = SimdWidth::detect();
        info!("verifier simd width: {:?}", width);
        let processed = Arc::new(AtomicU64::new(0));
        let mut verifier_handles = Vec::with_capacity(verifier_threads);
        for i in 0..verifier_threads {
            let verifier = Verifier::new(consumer.clone(), arbiter.clone(), coordinator.clone(), width, processed.clone());
            let core = core_ids.get(i % core_ids.len().max(1)).copied();
            verifier_handles.push(std::thread::Builder::new()
                .name(format!("verifier-{}", i))
                .spawn(move || {
                    if let Some(core) = core {
                        core_affinity::set_for_current(core);
                    }
                    verifier.run();
                })
                .expect("failed to spawn verifier thread"));
        }

        Miner {
            cfg,
            coordinator,
            arbiter,
            request_handler,
            registry,
            round_txs,
            reader_handles,
            verifier_handles,
            processed,
            current_gensig,
        }
    }

    /// Polls `getMiningInfo` until `shutdown` resolves, feeding each
    /// distinct block into the coordinator and broadcasting it to every
    /// reader.
    pub async fn run(&self, shutdown: impl std::future::Future<Output = ()>) {
        let mut interval = tokio::time::interval(Duration::from_millis(self.cfg.get_mining_info_interval_ms));
        let mut last_gensig = String::new();
        let mut outage = false;

        tokio::pin!(shutdown);
        loop {
            tokio::select! {
                _ = interval.tick() => {
                    let capacity = self.registry.total_nonces();
                    match self.request_handler.get_mining_info(capacity).await {
                        Ok(info) if info.generation_signature != last_gensig => {
                            if outage {
                                info!("outage resolved");
                                outage = false;
                            }
                            last_gensig = info.generation_signature.clone();
                            match decode_gensig(&info.generation_signature) {
                                Ok(gensig) => {
                                    *self.current_gensig.lock().unwrap() = gensig;
                                    let ctx = self.coordinator.on_new_block(info.height, gensig, info.base_target);
                                    info!(
                                        "new block: height={}, scoop={}, base_target={}",
                                        ctx.height, ctx.scoop_number, ctx.base_target
                                    );
                                    for tx in &self.round_txs {
                                        let _ = tx.send(ctx.clone());
                                    }
                                }
                                Err(e) => error!("malformed generation signature: {}", e),
                            }
                        }
                        Ok(_) => {}
                        Err(e) => {
                            if !outage {
                                error!("mining info outage: {}", e);
                            }
                            outage = true;
                        }
                    }
                }
                _ = &mut shutdown => {
                    break;
                }
            }
        }

        self.shutdown();
    }

    fn shutdown(&self) {
        self.coordinator.shutdown();
        self.arbiter.cancel();
    }

    pub fn processed_scoops(&self) -> u64 {
        self.processed.load(Ordering::Relaxed)
    }

    /// Joins every worker thread after [`Miner::shutdown`] has run; drops
    /// the reader broadcast channels first so reader threads see a closed
    /// channel and readers/verifiers unwind.
    pub fn join(mut self) {
        self.round_txs.clear();
        for h in self.reader_handles.drain(..) {
            let _ = h.join();
        }
        for h in self.verifier_handles.drain(..) {
            let _ = h.join();
        }
    }
}

/// Round-robins plots across `n` buckets so each reader thread gets a
/// roughly even share.
fn partition(plots: &[PlotFile], n: usize) -> Vec<Vec<PlotFile>> {
    let mut buckets: Vec<Vec<PlotFile>> = (0..n.max(1)).map(|_| Vec::new()).collect();
    for (i, plot) in plots.iter().enumerate() {
        buckets[i % buckets.len()].push(plot.clone());
    }
    buckets
}
