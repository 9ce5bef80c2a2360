//! Binding-file discovery and daemon settings.
//!
//! Two independent concerns live here. [`load_bindings`] resolves the DSL
//! source(s) a run should evaluate — either one inline string or a glob of
//! `*.cfg` files — and parses them with [`rx_parser::parse`]; loading is
//! all-or-nothing across the whole invocation, matching the reference
//! daemon's behavior of aborting outright on the first bad file rather than
//! skipping it. [`Settings`] is a small TOML file of daemon-level defaults
//! (log level, quiet mode, the binding glob itself) that a CLI's flags can
//! override; it follows the teacher's tolerant-of-missing-or-malformed-file
//! `load_from` convention, since an absent settings file just means "use
//! the defaults" rather than a hard error.

use std::path::{Path, PathBuf};

use rx_parser::ParsedBinding;
use serde::Deserialize;

/// The default location the reference daemon scanned for binding files,
/// expressed as a glob pattern.
pub const DEFAULT_BINDING_GLOB: &str = "/etc/evreactor/*.cfg";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("glob pattern '{pattern}' is invalid: {source}")]
    Glob {
        pattern: String,
        #[source]
        source: glob::PatternError,
    },
    #[error(transparent)]
    GlobWalk(#[from] glob::GlobError),
    #[error("{0}")]
    Parse(#[from] rx_parser::ParseError),
}

/// Load bindings from exactly one inline DSL string (the `-e` flag).
pub fn load_inline(text: &str) -> Result<Vec<ParsedBinding>, ConfigError> {
    Ok(rx_parser::parse("<inline>", text)?)
}

/// Load and concatenate bindings from every file matched by `glob_pattern`,
/// in glob match order. A syntax error in any one file discards the whole
/// batch — there is no partial-load fallback, mirroring the reference
/// daemon's refusal to run with a partially-understood rule set.
///
/// It is not an error for the pattern to match zero files; the caller
/// decides whether an empty rule set is acceptable (the reference daemon
/// treats it as fatal in non-monitor mode).
pub fn load_glob(glob_pattern: &str) -> Result<Vec<ParsedBinding>, ConfigError> {
    let paths = glob::glob(glob_pattern).map_err(|source| ConfigError::Glob {
        pattern: glob_pattern.to_string(),
        source,
    })?;

    let mut bindings = Vec::new();
    for entry in paths {
        let path = entry?;
        let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Io {
            path: path.clone(),
            source,
        })?;
        let label = path.to_string_lossy().into_owned();
        bindings.extend(rx_parser::parse(&label, &text)?);
    }

    tracing::debug!(pattern = glob_pattern, loaded = bindings.len(), "bindings loaded from glob");
    Ok(bindings)
}

/// Daemon-level defaults, independent of the binding DSL itself. Absent or
/// malformed files fall back to [`Settings::default`] rather than failing
/// the run — the settings file is a convenience, not a required input.
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub daemon: DaemonSettings,
    #[serde(default)]
    pub config: ConfigSettings,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DaemonSettings {
    #[serde(default)]
    pub quiet: bool,
    #[serde(default = "DaemonSettings::default_log_level")]
    pub log_level: String,
}

impl DaemonSettings {
    fn default_log_level() -> String {
        "info".to_string()
    }
}

impl Default for DaemonSettings {
    fn default() -> Self {
        Self {
            quiet: false,
            log_level: Self::default_log_level(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSettings {
    #[serde(default = "ConfigSettings::default_glob")]
    pub glob: String,
}

impl ConfigSettings {
    fn default_glob() -> String {
        DEFAULT_BINDING_GLOB.to_string()
    }
}

impl Default for ConfigSettings {
    fn default() -> Self {
        Self {
            glob: Self::default_glob(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            daemon: DaemonSettings::default(),
            config: ConfigSettings::default(),
        }
    }
}

/// `$XDG_CONFIG_HOME/evreactor/config.toml`, falling back to the platform
/// config directory `dirs::config_dir` resolves.
pub fn discover_settings_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("evreactor")
        .join("config.toml")
}

/// Load daemon settings from `path`, or [`discover_settings_path`] if
/// `path` is `None`. A missing file or a parse error both yield
/// [`Settings::default`]; only I/O errors other than "not found" propagate,
/// since those usually indicate a real permissions problem worth surfacing.
pub fn load_settings(path: Option<&Path>) -> Settings {
    let path = match path {
        Some(p) => p.to_path_buf(),
        None => discover_settings_path(),
    };

    match std::fs::read_to_string(&path) {
        Ok(text) => toml::from_str(&text).unwrap_or_else(|e| {
            tracing::warn!(path = %path.display(), error = %e, "settings file malformed, using defaults");
            Settings::default()
        }),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Settings::default(),
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "could not read settings file, using defaults");
            Settings::default()
        }
    }
}
