#![warn(unused_extern_crates)]
#[macro_use]
extern crate log;

mod arbiter;
mod com;
mod config;
mod coordinator;
mod error;
mod job;
mod logger;
mod miner;
mod plot;
mod poc_hashing;
mod queue;
mod reader;
mod request;
mod shabal_engine;
mod verifier;

use crate::config::load_cfg;
use crate::miner::Miner;
use crate::shabal_engine::SimdWidth;
use clap::Parser;
use std::process;

#[derive(Parser)]
#[command(name = "bencher", about = "A proof-of-capacity plot verifier", version)]
struct Cli {
    /// Location of the config file
    #[arg(short, long, value_name = "FILE", default_value = "config.yaml")]
    config: String,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let cfg = match load_cfg(&cli.config) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("failed to load config {}: {}", cli.config, e);
            process::exit(1);
        }
    };

    logger::init_logger(&cfg);

    info!("bencher v.{}", env!("CARGO_PKG_VERSION"));

    let cpuid = raw_cpuid::CpuId::new();
    let cpu_name = cpuid
        .get_extended_function_info()
        .and_then(|info| info.processor_brand_string().map(|s| s.trim().to_owned()))
        .unwrap_or_else(|| "unknown cpu".to_owned());

    info!(
        "cpu: {} [simd: {:?}, {} logical cores]",
        cpu_name,
        SimdWidth::detect(),
        num_cpus::get()
    );
    info!(
        "mode: {}",
        if cfg.secret_phrase.is_empty() { "pool" } else { "solo" }
    );

    let miner = Miner::new(cfg);

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("shutdown requested");
    };
    miner.run(shutdown).await;
    let processed = miner.processed_scoops();
    miner.join();

    info!("bencher stopped after {} scoops processed", processed);
}
