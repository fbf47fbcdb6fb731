//! Configuration loading. Field set and defaults ported from creepMiner's
//! `MinerConfig` (`examples/original_source/src/MinerConfig.hpp`), the
//! pool-facing config the teacher's own `Cfg` descends from.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use url::Url;

/// `output.*` verbosity toggles, ported 1:1 from creepMiner's `Output`
/// struct.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OutputCfg {
    #[serde(default = "default_true")]
    pub progress: bool,
    #[serde(default)]
    pub debug: bool,
    #[serde(default = "default_true")]
    pub nonce_found: bool,
    #[serde(default)]
    pub nonce_found_plot: bool,
    #[serde(default)]
    pub nonce_confirmed_plot: bool,
    #[serde(default)]
    pub plot_done: bool,
    #[serde(default)]
    pub dir_done: bool,
    #[serde(default = "default_true")]
    pub last_winner: bool,
}

impl Default for OutputCfg {
    fn default() -> Self {
        OutputCfg {
            progress: true,
            debug: false,
            nonce_found: true,
            nonce_found_plot: false,
            nonce_confirmed_plot: false,
            plot_done: false,
            dir_done: false,
            last_winner: true,
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Cfg {
    pub pool_url: Url,
    pub mining_info_url: Url,
    pub wallet_url: Url,

    #[serde(default = "default_secret_phrase")]
    pub secret_phrase: String,

    pub plots: Vec<String>,

    #[serde(rename = "maxBufferSizeMB", default = "default_max_buffer_size_mb")]
    pub max_buffer_size_mb: u64,

    #[serde(default = "default_retry")]
    pub submission_max_retry: usize,
    #[serde(default = "default_retry")]
    pub send_max_retry: usize,
    #[serde(default = "default_retry")]
    pub receive_max_retry: usize,

    #[serde(default = "default_timeout")]
    pub timeout: u64,
    #[serde(default = "default_send_timeout")]
    pub send_timeout: u64,
    #[serde(default = "default_receive_timeout")]
    pub receive_timeout: u64,

    #[serde(default)]
    pub max_submit_threads: usize,

    #[serde(default)]
    pub output: OutputCfg,

    #[serde(default)]
    pub send_proxy_details: bool,
    #[serde(default)]
    pub additional_headers: HashMap<String, String>,

    /// 0 = autodetect.
    #[serde(default)]
    pub reader_threads: usize,
    #[serde(default)]
    pub cpu_threads: usize,
    #[serde(default)]
    pub cpu_thread_pinning: bool,

    #[serde(default = "default_get_mining_info_interval")]
    pub get_mining_info_interval_ms: u64,

    #[serde(default = "default_console_log_level")]
    pub console_log_level: String,
    #[serde(default = "default_logfile_log_level")]
    pub logfile_log_level: String,
    #[serde(default = "default_logfile_max_count")]
    pub logfile_max_count: u32,
    #[serde(default = "default_logfile_max_size")]
    pub logfile_max_size: u64,
    #[serde(default = "default_console_log_pattern")]
    pub console_log_pattern: String,
    #[serde(default = "default_logfile_log_pattern")]
    pub logfile_log_pattern: String,
}

fn default_secret_phrase() -> String {
    String::new()
}

fn default_max_buffer_size_mb() -> u64 {
    128
}

fn default_retry() -> usize {
    3
}

fn default_timeout() -> u64 {
    30
}

fn default_send_timeout() -> u64 {
    3
}

fn default_receive_timeout() -> u64 {
    3
}

fn default_get_mining_info_interval() -> u64 {
    3000
}

fn default_console_log_level() -> String {
    "Info".to_owned()
}

fn default_logfile_log_level() -> String {
    "Warn".to_owned()
}

fn default_logfile_max_count() -> u32 {
    10
}

fn default_logfile_max_size() -> u64 {
    20
}

fn default_console_log_pattern() -> String {
    "\r{d(%H:%M:%S.%3f%z)} [{h({l}):<5}] [{T}] [{t}] - {M}:{m}{n}".to_owned()
}

fn default_logfile_log_pattern() -> String {
    "\r{d(%Y-%m-%dT%H:%M:%S.%3f%z)} [{h({l}):<5}] [{T}] [{f}:{L}] [{t}] - {M}:{m}{n}".to_owned()
}

impl Cfg {
    pub fn max_buffer_size_bytes(&self) -> u64 {
        self.max_buffer_size_mb * 1024 * 1024
    }
}

pub fn load_cfg(path: &str) -> Result<Cfg, ConfigError> {
    let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_owned(),
        source,
    })?;
    serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
        path: path.to_owned(),
        source,
    })
}

/// Re-resolves `plots:` without restarting the process (ported from
/// creepMiner's `MinerConfig::rescan()`); the actual directory walk lives
/// in [`crate::plot::PlotRegistry::scan`].
pub fn rescan(cfg: &Cfg) -> crate::plot::PlotRegistry {
    crate::plot::PlotRegistry::scan(&cfg.plots)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_cfg(yaml: &str) -> NamedTempFile {
        let mut f = NamedTempFile::new().unwrap();
        f.write_all(yaml.as_bytes()).unwrap();
        f
    }

    #[test]
    fn loads_required_fields_and_applies_defaults() {
        let f = write_cfg(
            "poolUrl: http://pool.example/burst\n\
             miningInfoUrl: http://pool.example/burst\n\
             walletUrl: http://pool.example/burst\n\
             plots: [\"/mnt/plots\"]\n",
        );
        let cfg = load_cfg(f.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.max_buffer_size_mb, 128);
        assert_eq!(cfg.submission_max_retry, 3);
        assert_eq!(cfg.timeout, 30);
        assert!(cfg.output.progress);
        assert!(!cfg.output.debug);
    }

    #[test]
    fn overrides_defaults_when_present() {
        let f = write_cfg(
            "poolUrl: http://pool.example/burst\n\
             miningInfoUrl: http://pool.example/burst\n\
             walletUrl: http://pool.example/burst\n\
             plots: []\n\
             maxBufferSizeMB: 256\n\
             output:\n  debug: true\n",
        );
        let cfg = load_cfg(f.path().to_str().unwrap()).unwrap();
        assert_eq!(cfg.max_buffer_size_mb, 256);
        assert_eq!(cfg.max_buffer_size_bytes(), 256 * 1024 * 1024);
        assert!(cfg.output.debug);
    }

    #[test]
    fn missing_file_is_a_config_error_not_a_panic() {
        let result = load_cfg("/nonexistent/path/config.yaml");
        assert!(matches!(result, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn malformed_yaml_is_a_config_error() {
        let f = write_cfg("not: [valid, yaml: structure");
        let result = load_cfg(f.path().to_str().unwrap());
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }
}
