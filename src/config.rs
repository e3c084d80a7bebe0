use std::fs;
use std::path::Path;

use serde::Deserialize;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Reading config {path}: {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("Parsing config: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Compiler settings. Every field has a default, so an empty YAML document is
/// a valid configuration.
#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub limits: Limits,
    pub lexer: LexerConfig,
    pub backend: BackendConfig,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Limits {
    pub max_variables: usize,
    pub max_functions: usize,
    /// Capacity of each function's private table (parameters plus locals).
    pub max_locals: usize,
    pub max_name_len: usize,
}

impl Default for Limits {
    fn default() -> Self {
        Self {
            max_variables: 100,
            max_functions: 10,
            max_locals: 10,
            max_name_len: 20,
        }
    }
}

/// How the digits after a `.` in a number literal are interpreted.
#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FractionMode {
    /// All digits are concatenated and divided by the count of fraction
    /// digits: `3.14` reads as `314 / 2`.
    #[default]
    DigitCount,
    /// Ordinary positional decimal: `3.14` reads as `3.14`.
    Positional,
}

#[derive(Debug, Clone, Default, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LexerConfig {
    pub fractions: FractionMode,
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct BackendConfig {
    /// Slots reserved per activation.
    pub frame_size: usize,
    pub frame_pointer: String,
    /// Registers carrying call arguments, in parameter order.
    pub arg_registers: Vec<String>,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            frame_size: 10,
            frame_pointer: "rax".to_string(),
            arg_registers: vec!["rbx".to_string(), "rcx".to_string(), "rdx".to_string()],
        }
    }
}

impl Config {
    pub fn from_yaml(source: &str) -> Result<Self, ConfigError> {
        let config: Config = serde_yaml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let source = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.backend.frame_size == 0 {
            return Err(ConfigError::Invalid(
                "backend.frame_size must be at least 1".to_string(),
            ));
        }
        if self.limits.max_name_len == 0 {
            return Err(ConfigError::Invalid(
                "limits.max_name_len must be at least 1".to_string(),
            ));
        }
        let registers = std::iter::once(&self.backend.frame_pointer)
            .chain(&self.backend.arg_registers)
            .collect::<Vec<_>>();
        if let Some(empty) = registers.iter().position(|name| name.trim().is_empty()) {
            return Err(ConfigError::Invalid(format!(
                "register #{empty} has an empty name"
            )));
        }
        for (index, name) in registers.iter().enumerate() {
            if registers[..index].contains(name) {
                return Err(ConfigError::Invalid(format!(
                    "register '{name}' is used twice"
                )));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use indoc::indoc;

    #[test]
    fn empty_document_uses_defaults() {
        let config = Config::from_yaml("{}").expect("valid config");
        assert_eq!(config, Config::default());
        assert_eq!(config.backend.arg_registers, ["rbx", "rcx", "rdx"]);
        assert_eq!(config.lexer.fractions, FractionMode::DigitCount);
    }

    #[test]
    fn partial_override_keeps_other_defaults() {
        let config = Config::from_yaml(indoc! {"
            lexer:
              fractions: positional
            backend:
              frame_size: 4
        "})
        .expect("valid config");
        assert_eq!(config.lexer.fractions, FractionMode::Positional);
        assert_eq!(config.backend.frame_size, 4);
        assert_eq!(config.backend.frame_pointer, "rax");
        assert_eq!(config.limits.max_locals, 10);
    }

    #[test]
    fn rejects_zero_frame_and_duplicate_registers() {
        let err = Config::from_yaml("backend:\n  frame_size: 0\n").expect_err("invalid");
        assert!(err.to_string().contains("frame_size"));

        let err = Config::from_yaml("backend:\n  arg_registers: [rax]\n").expect_err("invalid");
        assert!(err.to_string().contains("'rax' is used twice"));
    }

    #[test]
    fn rejects_unknown_keys() {
        assert!(matches!(
            Config::from_yaml("limits:\n  max_vars: 3\n"),
            Err(ConfigError::Parse(_))
        ));
    }
}
