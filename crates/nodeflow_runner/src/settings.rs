// SPDX-License-Identifier: MIT OR Apache-2.0
//! Runner settings.
//!
//! Settings come from an optional RON file, then positional arguments override them:
//!
//! ```text
//! nodeflow [--settings FILE] [GRAPH] [ITERATIONS]
//! ```
//!
//! Without `--settings` nor a graph argument, `nodeflow.ron` is read from the working
//! directory when present.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Current settings format version
pub const SETTINGS_FORMAT_VERSION: u32 = 1;

/// Settings file looked up in the working directory
pub const SETTINGS_FILE_NAME: &str = "nodeflow.ron";

/// Log filter used when neither `RUST_LOG` nor the settings set one
pub const DEFAULT_LOG_FILTER: &str = "nodeflow_graph=info,nodeflow_runner=info";

/// Error raised while reading settings or arguments
#[derive(Debug, thiserror::Error)]
pub enum SettingsError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// RON parse error
    #[error("RON parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// The file was written by a newer runner
    #[error("Settings version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version found in the file
        found: u32,
        /// Latest supported version
        supported: u32,
    },

    /// Malformed command line
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// No graph file given
    #[error("No graph file given (usage: nodeflow [--settings FILE] [GRAPH] [ITERATIONS])")]
    MissingGraph,
}

/// What the runner loads and how many passes it executes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSettings {
    /// Settings format version
    pub version: u32,
    /// Graph file, `.ron` or `.json`
    pub graph: PathBuf,
    /// Number of `execute()` passes
    #[serde(default = "default_iterations")]
    pub iterations: u32,
    /// `tracing` filter directives, e.g. `nodeflow_graph=debug`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_filter: Option<String>,
}

fn default_iterations() -> u32 {
    1
}

impl Default for RunSettings {
    fn default() -> Self {
        Self {
            version: SETTINGS_FORMAT_VERSION,
            graph: PathBuf::new(),
            iterations: default_iterations(),
            log_filter: None,
        }
    }
}

impl RunSettings {
    /// Load settings from a file.
    ///
    /// A relative graph path is resolved against the settings file's directory.
    pub fn load(path: &Path) -> Result<Self, SettingsError> {
        let content = std::fs::read_to_string(path)?;
        let mut settings: RunSettings = ron::from_str(&content)?;

        if settings.version > SETTINGS_FORMAT_VERSION {
            return Err(SettingsError::UnsupportedVersion {
                found: settings.version,
                supported: SETTINGS_FORMAT_VERSION,
            });
        }

        if settings.graph.is_relative() {
            if let Some(dir) = path.parent() {
                settings.graph = dir.join(&settings.graph);
            }
        }
        Ok(settings)
    }

    /// Build settings from the command line arguments (program name excluded)
    pub fn from_args(args: &[String]) -> Result<Self, SettingsError> {
        let mut file = None;
        let mut positional = Vec::new();
        let mut args = args.iter();
        while let Some(arg) = args.next() {
            match arg.as_str() {
                "-s" | "--settings" => {
                    let path = args.next().ok_or_else(|| {
                        SettingsError::InvalidArgument(format!("{arg} expects a file"))
                    })?;
                    file = Some(PathBuf::from(path));
                }
                flag if flag.starts_with('-') => {
                    return Err(SettingsError::InvalidArgument(flag.to_string()));
                }
                value => positional.push(value),
            }
        }
        if positional.len() > 2 {
            return Err(SettingsError::InvalidArgument(positional[2].to_string()));
        }

        let local = Path::new(SETTINGS_FILE_NAME);
        let mut settings = match file {
            Some(path) => Self::load(&path)?,
            None if positional.is_empty() && local.exists() => Self::load(local)?,
            None => Self::default(),
        };

        if let Some(graph) = positional.first() {
            settings.graph = PathBuf::from(*graph);
        }
        if let Some(iterations) = positional.get(1) {
            settings.iterations = iterations.parse().map_err(|_| {
                SettingsError::InvalidArgument(format!("iteration count {iterations}"))
            })?;
        }

        if settings.graph.as_os_str().is_empty() {
            return Err(SettingsError::MissingGraph);
        }
        Ok(settings)
    }

    /// Log filter directives to install
    pub fn log_filter(&self) -> &str {
        self.log_filter.as_deref().unwrap_or(DEFAULT_LOG_FILTER)
    }
}
