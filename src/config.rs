// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Mark Wells <contact@markwells.dev>

//! Configuration for the bridge and the language server it hosts.

use anyhow::{Context, Result};
use clap::ValueEnum;
use serde::Deserialize;
use std::fmt;
use std::path::PathBuf;

use crate::bridge::ProgramEnv;

/// Default destination the program is told to log to.
pub const DEFAULT_LOG_FILE: &str = "/dev/stderr";
/// Default variable carrying the program's log verbosity.
pub const DEFAULT_LOG_LEVEL_VAR: &str = "RUNE_LOG";
/// Default variable carrying the program's log destination.
pub const DEFAULT_LOG_FILE_VAR: &str = "RUNE_LOG_FILE";

/// Log verbosity injected into the embedded program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    /// Most verbose.
    Trace,
    /// Debugging output.
    Debug,
    /// Informational output.
    Info,
    /// Warnings only.
    Warn,
    /// Errors only.
    Error,
}

impl LogLevel {
    /// Lowercase name as understood by the program's log filter.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Bridge settings loaded from the config file and environment.
#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    /// Log verbosity handed to the language server at startup (unset: none)
    #[serde(default)]
    pub log_level: Option<LogLevel>,

    /// Where the language server should write its logs
    #[serde(default = "default_log_file")]
    pub log_file: String,

    /// Environment variable that carries `log_level`
    #[serde(default = "default_log_level_var")]
    pub log_level_var: String,

    /// Environment variable that carries `log_file`
    #[serde(default = "default_log_file_var")]
    pub log_file_var: String,

    /// Language server to run when none is given on the command line
    #[serde(default)]
    pub server: Option<ServerConfig>,
}

/// A language server command line.
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    /// The command to execute (e.g., "rune-languageserver")
    pub command: String,

    /// Arguments to pass to the command
    #[serde(default)]
    pub args: Vec<String>,
}

fn default_log_file() -> String {
    DEFAULT_LOG_FILE.to_string()
}

fn default_log_level_var() -> String {
    DEFAULT_LOG_LEVEL_VAR.to_string()
}

fn default_log_file_var() -> String {
    DEFAULT_LOG_FILE_VAR.to_string()
}

impl Config {
    /// Load configuration from standard paths or a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if a configuration source cannot be read or does not
    /// deserialize.
    pub fn load(explicit_file: Option<PathBuf>) -> Result<Self> {
        let mut builder = config::Config::builder();

        // 1. Start with defaults
        builder = builder
            .set_default("log_file", DEFAULT_LOG_FILE)?
            .set_default("log_level_var", DEFAULT_LOG_LEVEL_VAR)?
            .set_default("log_file_var", DEFAULT_LOG_FILE_VAR)?;

        // 2. Load from user config directory (~/.config/stdio-bridge/config.toml)
        if let Some(config_dir) = dirs::config_dir() {
            let config_path = config_dir.join("stdio-bridge").join("config.toml");
            if config_path.exists() {
                builder = builder.add_source(config::File::from(config_path));
            }
        }

        // 3. Load from explicit file if provided
        if let Some(path) = explicit_file {
            builder = builder.add_source(config::File::from(path));
        }

        // 4. Load from environment variables (STDIO_BRIDGE_LOG_LEVEL, etc.)
        builder = builder.add_source(config::Environment::with_prefix("STDIO_BRIDGE"));

        let config = builder
            .build()
            .context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }

    /// Runtime options for a [`LanguageServer`](crate::bridge::LanguageServer).
    #[must_use]
    pub fn bridge_options(&self) -> BridgeOptions {
        BridgeOptions {
            log_level: self.log_level,
            log_file: self.log_file.clone(),
            log_level_var: self.log_level_var.clone(),
            log_file_var: self.log_file_var.clone(),
        }
    }
}

/// Startup configuration applied to the program when it signals readiness.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeOptions {
    /// Log verbosity to inject; nothing is injected when unset.
    pub log_level: Option<LogLevel>,
    /// Log destination injected alongside the verbosity.
    pub log_file: String,
    /// Variable name for the verbosity.
    pub log_level_var: String,
    /// Variable name for the destination.
    pub log_file_var: String,
}

impl Default for BridgeOptions {
    fn default() -> Self {
        Self {
            log_level: None,
            log_file: default_log_file(),
            log_level_var: default_log_level_var(),
            log_file_var: default_log_file_var(),
        }
    }
}

impl BridgeOptions {
    /// Options with the given log verbosity and default everything else.
    #[must_use]
    pub fn with_log_level(level: LogLevel) -> Self {
        Self {
            log_level: Some(level),
            ..Self::default()
        }
    }

    /// Writes the startup configuration into the program's environment.
    pub fn apply(&self, env: &mut ProgramEnv) {
        if let Some(level) = self.log_level {
            env.set(self.log_level_var.as_str(), level.as_str());
            env.set(self.log_file_var.as_str(), self.log_file.as_str());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_apply_without_level_leaves_env_untouched() {
        let mut env = ProgramEnv::new();
        BridgeOptions::default().apply(&mut env);
        assert!(env.is_empty());
    }

    #[test]
    fn test_apply_injects_level_and_destination() {
        let mut env = ProgramEnv::from_iter([("HOME", "/home/rune")]);
        BridgeOptions::with_log_level(LogLevel::Debug).apply(&mut env);

        assert_eq!(env.get("RUNE_LOG"), Some("debug"));
        assert_eq!(env.get("RUNE_LOG_FILE"), Some("/dev/stderr"));
        assert_eq!(env.get("HOME"), Some("/home/rune"));
    }

    #[test]
    fn test_apply_honours_custom_variable_names() {
        let options = BridgeOptions {
            log_level: Some(LogLevel::Trace),
            log_file: "/tmp/ls.log".to_string(),
            log_level_var: "LS_LOG".to_string(),
            log_file_var: "LS_LOG_FILE".to_string(),
        };
        let mut env = ProgramEnv::new();
        options.apply(&mut env);

        let vars: Vec<_> = env.iter().collect();
        assert_eq!(vars, vec![("LS_LOG", "trace"), ("LS_LOG_FILE", "/tmp/ls.log")]);
    }
}
