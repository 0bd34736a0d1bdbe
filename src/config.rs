//! Application settings layered from TOML files and `BOOKLITE_*` environment variables.
//!
//! Precedence per field: explicit config file > `$BOOKLITE_CONFIG` > `./booklite.toml` >
//! environment variables > built-in defaults. Every field is optional so layers can be merged.

use crate::errors::DbError;
use crate::query::ExplainVerbosity;
use crate::types::BOOKS_COLLECTION;
use log::LevelFilter;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::str::FromStr;

pub const CONFIG_ENV: &str = "BOOKLITE_CONFIG";
pub const DEFAULT_CONFIG_FILE: &str = "booklite.toml";

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    pub collection: Option<String>,
    /// JSON or NDJSON file of books to load instead of the built-in sample.
    pub seed_file: Option<PathBuf>,
    /// Extra generated books appended after the seed data.
    pub random_count: Option<usize>,
    pub random_seed: Option<u64>,
    /// Rolling log files go here; console logging when unset.
    pub log_dir: Option<PathBuf>,
    pub log_level: Option<String>,
    /// Number of rolled log files kept.
    pub log_retention: Option<u32>,
    pub explain_verbosity: Option<String>,
}

fn parse_env<T: FromStr>(key: &str, raw: String) -> Result<T, DbError> {
    raw.parse().map_err(|_| DbError::Config(format!("{key}={raw:?} is not valid")))
}

fn env_number<T: FromStr>(var: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>, DbError> {
    var(key).map(|raw| parse_env(key, raw)).transpose()
}

impl AppConfig {
    /// # Errors
    /// Returns `Toml` for invalid syntax or unknown keys.
    pub fn from_toml_str(s: &str) -> Result<Self, DbError> {
        Ok(toml::from_str(s)?)
    }

    /// # Errors
    /// Returns `Io` if the file cannot be read, `Toml` if it does not parse.
    pub fn from_file(path: &Path) -> Result<Self, DbError> {
        Self::from_toml_str(&std::fs::read_to_string(path)?)
    }

    /// Fills every unset field from `other`.
    pub fn fill_from(&mut self, other: Self) {
        self.collection = self.collection.take().or(other.collection);
        self.seed_file = self.seed_file.take().or(other.seed_file);
        self.random_count = self.random_count.or(other.random_count);
        self.random_seed = self.random_seed.or(other.random_seed);
        self.log_dir = self.log_dir.take().or(other.log_dir);
        self.log_level = self.log_level.take().or(other.log_level);
        self.log_retention = self.log_retention.or(other.log_retention);
        self.explain_verbosity = self.explain_verbosity.take().or(other.explain_verbosity);
    }

    /// Fills unset fields from `BOOKLITE_*` variables as reported by `var`.
    ///
    /// # Errors
    /// Returns `Config` for numeric variables that do not parse.
    pub fn fill_from_env<F>(&mut self, var: F) -> Result<(), DbError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Self {
            collection: var("BOOKLITE_COLLECTION"),
            seed_file: var("BOOKLITE_SEED_FILE").map(PathBuf::from),
            random_count: env_number(&var, "BOOKLITE_RANDOM_COUNT")?,
            random_seed: env_number(&var, "BOOKLITE_RANDOM_SEED")?,
            log_dir: var("BOOKLITE_LOG_DIR").map(PathBuf::from),
            log_level: var("BOOKLITE_LOG_LEVEL"),
            log_retention: env_number(&var, "BOOKLITE_LOG_RETENTION")?,
            explain_verbosity: var("BOOKLITE_EXPLAIN_VERBOSITY"),
        };
        self.fill_from(env);
        Ok(())
    }

    /// Loads from the process environment and working directory.
    ///
    /// # Errors
    /// See [`AppConfig::load_with`].
    pub fn load(explicit: Option<&Path>) -> Result<Self, DbError> {
        let cwd = std::env::current_dir().ok();
        Self::load_with(explicit, cwd.as_deref(), |k| std::env::var(k).ok())
    }

    /// Layers config files and environment variables.
    ///
    /// # Errors
    /// Returns `Config` when an explicitly named file (argument or `$BOOKLITE_CONFIG`)
    /// does not exist, and propagates read/parse errors of any file that does.
    pub fn load_with<F>(explicit: Option<&Path>, cwd: Option<&Path>, var: F) -> Result<Self, DbError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut paths: Vec<(PathBuf, bool)> = Vec::new();
        if let Some(p) = explicit {
            paths.push((p.to_path_buf(), true));
        }
        if let Some(p) = var(CONFIG_ENV) {
            paths.push((PathBuf::from(p), true));
        }
        if let Some(dir) = cwd {
            paths.push((dir.join(DEFAULT_CONFIG_FILE), false));
        }
        let mut cfg = Self::default();
        for (path, required) in paths {
            if !path.exists() {
                if required {
                    return Err(DbError::Config(format!("config file {} not found", path.display())));
                }
                continue;
            }
            log::debug!("reading config {}", path.display());
            cfg.fill_from(Self::from_file(&path)?);
        }
        cfg.fill_from_env(var)?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// # Errors
    /// Returns `Config` for an unknown log level or explain verbosity, or an empty collection name.
    pub fn validate(&self) -> Result<(), DbError> {
        self.log_level()?;
        self.explain_verbosity()?;
        if self.collection.as_deref().is_some_and(|c| c.trim().is_empty()) {
            return Err(DbError::Config("collection must not be empty".into()));
        }
        Ok(())
    }

    #[must_use]
    pub fn collection(&self) -> &str {
        self.collection.as_deref().unwrap_or(BOOKS_COLLECTION)
    }

    /// # Errors
    /// Returns `Config` for names `log` does not know.
    pub fn log_level(&self) -> Result<LevelFilter, DbError> {
        match &self.log_level {
            None => Ok(LevelFilter::Info),
            Some(s) => s.parse().map_err(|_| DbError::Config(format!("unknown log level {s:?}"))),
        }
    }

    #[must_use]
    pub fn log_retention(&self) -> u32 {
        self.log_retention.unwrap_or(7)
    }

    /// # Errors
    /// Returns `Config` for anything but the three shell verbosity names.
    pub fn explain_verbosity(&self) -> Result<ExplainVerbosity, DbError> {
        match &self.explain_verbosity {
            None => Ok(ExplainVerbosity::default()),
            Some(s) => s.parse().map_err(|e: DbError| DbError::Config(e.to_string())),
        }
    }
}
