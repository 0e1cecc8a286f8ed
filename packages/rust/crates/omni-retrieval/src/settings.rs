//! Runtime settings loader for omni-retrieval.
//!
//! Loads and merges:
//! - System defaults: `<PRJ_ROOT>/packages/conf/retrieval.yaml`
//! - User overrides:  `<PRJ_CONFIG_HOME>/omni-dev-fusion/retrieval.yaml`
//! - Environment:     `OMNI_RETRIEVAL_*`
//!
//! Merge precedence is env over user over system.

use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::error::RetrievalError;
use crate::types::{RetrievalConfig, validate_weight};

const DEFAULT_SYSTEM_SETTINGS_RELATIVE_PATH: &str = "packages/conf/retrieval.yaml";
const DEFAULT_USER_SETTINGS_RELATIVE_PATH: &str = "omni-dev-fusion/retrieval.yaml";
const DEFAULT_CONFIG_HOME_RELATIVE_PATH: &str = ".config";

/// Default cache time-to-live (one hour).
pub const DEFAULT_CACHE_TTL_SECS: u64 = 3_600;
/// Default cache capacity.
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 1_000;
/// Default per-signal candidate multiplier over `top_k`.
pub const DEFAULT_CANDIDATE_MULTIPLIER: usize = 2;

/// Query cache options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheSettings {
    /// When false every cache operation is a pass-through
    pub enabled: bool,
    /// Entry lifetime in seconds; 0 disables time expiry
    pub ttl_secs: u64,
    /// Capacity bound (at least 1)
    pub max_entries: usize,
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            enabled: true,
            ttl_secs: DEFAULT_CACHE_TTL_SECS,
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
        }
    }
}

impl CacheSettings {
    /// Return settings with `max_entries` clamped to at least 1.
    #[must_use]
    pub fn normalized(mut self) -> Self {
        self.max_entries = self.max_entries.max(1);
        self
    }
}

/// Resolved retriever settings.
#[derive(Debug, Clone, PartialEq)]
pub struct RetrievalSettings {
    /// Config used by `retrieve_default`
    pub default_config: RetrievalConfig,
    /// Each signal is asked for `top_k * candidate_multiplier` candidates
    pub candidate_multiplier: usize,
    /// Query cache options
    pub cache: CacheSettings,
}

impl Default for RetrievalSettings {
    fn default() -> Self {
        Self {
            default_config: RetrievalConfig::default(),
            candidate_multiplier: DEFAULT_CANDIDATE_MULTIPLIER,
            cache: CacheSettings::default(),
        }
    }
}

/// On-disk settings file; every field optional.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrievalSettingsFile {
    /// `retrieval:` block
    #[serde(default)]
    pub retrieval: RetrievalSection,
    /// `cache:` block
    #[serde(default)]
    pub cache: CacheSection,
}

/// `retrieval:` block of the settings file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RetrievalSection {
    /// Default vector weight
    pub vector_weight: Option<f32>,
    /// Default keyword weight
    pub keyword_weight: Option<f32>,
    /// Default result count
    pub top_k: Option<usize>,
    /// Per-signal candidate multiplier
    pub candidate_multiplier: Option<usize>,
}

/// `cache:` block of the settings file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CacheSection {
    /// Cache on/off
    pub enabled: Option<bool>,
    /// Entry lifetime in seconds
    pub ttl_secs: Option<u64>,
    /// Capacity bound
    pub max_entries: Option<usize>,
}

impl RetrievalSettingsFile {
    fn merge(self, overlay: Self) -> Self {
        Self {
            retrieval: self.retrieval.merge(overlay.retrieval),
            cache: self.cache.merge(overlay.cache),
        }
    }

    /// Apply `OMNI_RETRIEVAL_*` overrides read through `lookup`.
    ///
    /// Unparseable values are logged and ignored.
    #[must_use]
    pub fn with_env_overrides<F>(self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Self {
            retrieval: RetrievalSection {
                vector_weight: env_parse(&lookup, "OMNI_RETRIEVAL_VECTOR_WEIGHT"),
                keyword_weight: env_parse(&lookup, "OMNI_RETRIEVAL_KEYWORD_WEIGHT"),
                top_k: env_parse(&lookup, "OMNI_RETRIEVAL_TOP_K"),
                candidate_multiplier: env_parse(&lookup, "OMNI_RETRIEVAL_CANDIDATE_MULTIPLIER"),
            },
            cache: CacheSection {
                enabled: env_bool(&lookup, "OMNI_RETRIEVAL_CACHE_ENABLED"),
                ttl_secs: env_parse(&lookup, "OMNI_RETRIEVAL_CACHE_TTL_SECS"),
                max_entries: env_parse(&lookup, "OMNI_RETRIEVAL_CACHE_MAX_ENTRIES"),
            },
        };
        self.merge(env)
    }

    /// Fill defaults and validate.
    ///
    /// # Errors
    ///
    /// Returns [`RetrievalError::Settings`] for negative or non-finite weights,
    /// a zero `top_k` or a zero `candidate_multiplier`.
    pub fn resolve(self) -> Result<RetrievalSettings, RetrievalError> {
        let defaults = RetrievalSettings::default();
        let default_config = RetrievalConfig {
            vector_weight: self
                .retrieval
                .vector_weight
                .unwrap_or(defaults.default_config.vector_weight),
            keyword_weight: self
                .retrieval
                .keyword_weight
                .unwrap_or(defaults.default_config.keyword_weight),
            top_k: self.retrieval.top_k.unwrap_or(defaults.default_config.top_k),
        };
        validate_weight("vector_weight", default_config.vector_weight)
            .and_then(|()| validate_weight("keyword_weight", default_config.keyword_weight))
            .map_err(|error| RetrievalError::Settings(error.to_string()))?;
        if default_config.top_k == 0 {
            return Err(RetrievalError::Settings("top_k must be positive".to_string()));
        }
        let candidate_multiplier = self
            .retrieval
            .candidate_multiplier
            .unwrap_or(defaults.candidate_multiplier);
        if candidate_multiplier == 0 {
            return Err(RetrievalError::Settings(
                "candidate_multiplier must be positive".to_string(),
            ));
        }
        Ok(RetrievalSettings {
            default_config,
            candidate_multiplier,
            cache: CacheSettings {
                enabled: self.cache.enabled.unwrap_or(defaults.cache.enabled),
                ttl_secs: self.cache.ttl_secs.unwrap_or(defaults.cache.ttl_secs),
                max_entries: self.cache.max_entries.unwrap_or(defaults.cache.max_entries),
            }
            .normalized(),
        })
    }
}

impl RetrievalSection {
    fn merge(self, overlay: Self) -> Self {
        Self {
            vector_weight: overlay.vector_weight.or(self.vector_weight),
            keyword_weight: overlay.keyword_weight.or(self.keyword_weight),
            top_k: overlay.top_k.or(self.top_k),
            candidate_multiplier: overlay.candidate_multiplier.or(self.candidate_multiplier),
        }
    }
}

impl CacheSection {
    fn merge(self, overlay: Self) -> Self {
        Self {
            enabled: overlay.enabled.or(self.enabled),
            ttl_secs: overlay.ttl_secs.or(self.ttl_secs),
            max_entries: overlay.max_entries.or(self.max_entries),
        }
    }
}

/// Load settings from the default paths and the process environment.
///
/// # Errors
///
/// See [`RetrievalSettingsFile::resolve`].
pub fn load_retrieval_settings() -> Result<RetrievalSettings, RetrievalError> {
    let (system_path, user_path) = retrieval_settings_paths();
    load_retrieval_settings_from_paths(&system_path, &user_path)
        .with_env_overrides(|name| std::env::var(name).ok())
        .resolve()
}

#[doc(hidden)]
pub fn retrieval_settings_paths() -> (PathBuf, PathBuf) {
    let root = project_root();
    let system_path = root.join(DEFAULT_SYSTEM_SETTINGS_RELATIVE_PATH);
    let user_path = resolve_config_home(&root).join(DEFAULT_USER_SETTINGS_RELATIVE_PATH);
    (system_path, user_path)
}

/// Load and merge the two settings files (user over system), without env.
#[must_use]
pub fn load_retrieval_settings_from_paths(system: &Path, user: &Path) -> RetrievalSettingsFile {
    load_one(system).merge(load_one(user))
}

fn load_one(path: &Path) -> RetrievalSettingsFile {
    if !path.exists() {
        return RetrievalSettingsFile::default();
    }
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) => {
            tracing::warn!(
                path = %path.display(),
                error = %error,
                "failed to read retrieval settings file; ignoring"
            );
            return RetrievalSettingsFile::default();
        }
    };
    match serde_yaml::from_str::<RetrievalSettingsFile>(&raw) {
        Ok(value) => value,
        Err(error) => {
            tracing::warn!(
                path = %path.display(),
                error = %error,
                "failed to parse retrieval settings yaml; ignoring file"
            );
            RetrievalSettingsFile::default()
        }
    }
}

fn project_root() -> PathBuf {
    std::env::var("PRJ_ROOT")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")))
}

fn resolve_config_home(project_root: &Path) -> PathBuf {
    let configured = std::env::var("PRJ_CONFIG_HOME")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .unwrap_or_else(|| DEFAULT_CONFIG_HOME_RELATIVE_PATH.to_string());
    let path = PathBuf::from(configured);
    if path.is_absolute() {
        path
    } else {
        project_root.join(path)
    }
}

fn env_parse<F, T>(lookup: &F, name: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    let raw = lookup(name)?;
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return None;
    }
    match trimmed.parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            tracing::warn!(
                event = "retrieval.settings.env.invalid",
                name,
                value = %trimmed,
                "ignoring unparseable retrieval setting"
            );
            None
        }
    }
}

fn env_bool<F>(lookup: &F, name: &str) -> Option<bool>
where
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(name)?;
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
