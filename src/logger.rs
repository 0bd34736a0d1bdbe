//! log4rs setup. Application logs go to `app.log` (or stderr); structured query events on
//! the `booklite::query` target go to their own `query.log`.

use crate::config::AppConfig;
use crate::errors::DbError;
use crate::querylog;
use log::LevelFilter;
use log4rs::append::console::{ConsoleAppender, Target};
use log4rs::append::rolling_file::RollingFileAppender;
use log4rs::append::rolling_file::policy::compound::{
    CompoundPolicy, roll::fixed_window::FixedWindowRoller, trigger::size::SizeTrigger,
};
use log4rs::config::{Appender, Config, Logger, Root};
use log4rs::encode::pattern::PatternEncoder;
use std::path::Path;

const PATTERN: &str = "{d(%Y-%m-%d %H:%M:%S%.3f)} [{l}] {t} - {m}{n}";
/// Query events are already JSON; keep the line bare apart from a timestamp.
const QUERY_PATTERN: &str = "{d(%Y-%m-%dT%H:%M:%S%.3f)} {m}{n}";
const ROLL_BYTES: u64 = 10 * 1024 * 1024;

fn config_err(e: impl std::fmt::Display) -> DbError {
    DbError::Config(format!("logging: {e}"))
}

fn rolling(dir: &Path, stem: &str, pattern: &str, keep: u32) -> Result<RollingFileAppender, DbError> {
    let roller = FixedWindowRoller::builder()
        .build(&format!("{}", dir.join(format!("{stem}.{{}}.log")).display()), keep)
        .map_err(config_err)?;
    let policy = CompoundPolicy::new(Box::new(SizeTrigger::new(ROLL_BYTES)), Box::new(roller));
    RollingFileAppender::builder()
        .encoder(Box::new(PatternEncoder::new(pattern)))
        .build(dir.join(format!("{stem}.log")), Box::new(policy))
        .map_err(config_err)
}

fn install(config: Config) -> Result<(), DbError> {
    if let Err(e) = log4rs::init_config(config) {
        // a logger is already installed for this process; keep it
        log::debug!("logging already configured: {e}");
    }
    Ok(())
}

/// Rolling `app.log` and `query.log` under `dir`, keeping `retention` rolled files each.
///
/// # Errors
/// Returns `Io` if `dir` cannot be created and `Config` if log4rs rejects the setup.
pub fn configure_logging(dir: &Path, level: LevelFilter, retention: u32) -> Result<(), DbError> {
    std::fs::create_dir_all(dir)?;
    let app = rolling(dir, "app", PATTERN, retention)?;
    let queries = rolling(dir, "query", QUERY_PATTERN, retention)?;
    let config = Config::builder()
        .appender(Appender::builder().build("app", Box::new(app)))
        .appender(Appender::builder().build("query", Box::new(queries)))
        .logger(Logger::builder().appender("query").additive(false).build(querylog::TARGET, level))
        .build(Root::builder().appender("app").build(level))
        .map_err(config_err)?;
    install(config)
}

/// Everything, query events included, to stderr.
///
/// # Errors
/// Returns `Config` if log4rs rejects the setup.
pub fn init_console(level: LevelFilter) -> Result<(), DbError> {
    let console = ConsoleAppender::builder()
        .target(Target::Stderr)
        .encoder(Box::new(PatternEncoder::new(PATTERN)))
        .build();
    let config = Config::builder()
        .appender(Appender::builder().build("console", Box::new(console)))
        .build(Root::builder().appender("console").build(level))
        .map_err(config_err)?;
    install(config)
}

/// Files when `log_dir` is set, the console otherwise.
///
/// # Errors
/// See [`configure_logging`] and [`init_console`].
pub fn init_from_config(cfg: &AppConfig) -> Result<(), DbError> {
    let level = cfg.log_level()?;
    match &cfg.log_dir {
        Some(dir) => configure_logging(dir, level, cfg.log_retention()),
        None => init_console(level),
    }
}
