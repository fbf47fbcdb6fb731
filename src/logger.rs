//! Installs the global `log` backend, ported from the teacher's
//! `log4rs`-based logging. Two appenders: a console appender at
//! `consoleLogLevel` and a size-rolled file appender at `logfileLogLevel`,
//! both using `Cfg`'s pattern strings.

use crate::config::Cfg;
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::rolling_file::policy::compound::roll::fixed_window::FixedWindowRoller;
use log4rs::append::rolling_file::policy::compound::trigger::size::SizeTrigger;
use log4rs::append::rolling_file::policy::compound::CompoundPolicy;
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use log4rs::filter::threshold::ThresholdFilter;

fn level_from_str(level: &str) -> LevelFilter {
    level.parse().unwrap_or(LevelFilter::Info)
}

/// Builds and installs the process-wide logger from `cfg`. Panics only on
/// a malformed log file pattern, which is a startup-time configuration
/// error in the same class as an unparsable YAML file.
pub fn init_logger(cfg: &Cfg) {
    let console_level = level_from_str(&cfg.console_log_level);
    let logfile_level = level_from_str(&cfg.logfile_log_level);

    let console = ConsoleAppender::builder()
        .encoder(Box::new(PatternEncoder::new(&cfg.console_log_pattern)))
        .build();

    let window_size = cfg.logfile_max_count.max(1);
    let fixed_window_roller = FixedWindowRoller::builder()
        .build("log/bencher.{}.log", window_size)
        .expect("invalid logfile roller configuration");
    let size_trigger = SizeTrigger::new(cfg.logfile_max_size * 1024 * 1024);
    let compound_policy = CompoundPolicy::new(Box::new(size_trigger), Box::new(fixed_window_roller));

    let logfile = RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(&cfg.logfile_log_pattern)))
        .build("log/bencher.log", Box::new(compound_policy))
        .expect("failed to initialize rolling file appender");

    let config = Config::builder()
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(console_level)))
                .build("console", Box::new(console)),
        )
        .appender(
            Appender::builder()
                .filter(Box::new(ThresholdFilter::new(logfile_level)))
                .build("logfile", Box::new(logfile)),
        )
        .build(
            Root::builder()
                .appender("console")
                .appender("logfile")
                .build(console_level.max(logfile_level)),
        )
        .expect("failed to assemble log4rs config");

    log4rs::init_config(config).expect("failed to install logger");
}
