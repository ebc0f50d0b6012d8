//! Loader configuration.
//!
//! Everything can be given in a YAML file; every key is optional:
//!
//! ```yaml
//! data_dir: results
//! extension: csv
//! convention: auto          # auto | two-row | single-row | headerless
//! delimiter: ";"            # sniffed per file when absent
//! positional_layout: v1
//! label_field: merkmal
//! text_fields: [wahlbezirkName]
//! reload_interval_secs: 300
//! ```

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fmt, fs,
    path::{Path, PathBuf},
    str::FromStr,
};

use crate::process::header::{positional_layout, HeaderConvention, HeaderOptions};
use crate::process::utils::PROVENANCE_FIELDS;
use crate::process::ReadOptions;

/// Which header convention the loader applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ConventionSetting {
    /// Detect per file.
    #[default]
    Auto,
    TwoRow,
    SingleRow,
    Headerless,
}

impl ConventionSetting {
    pub fn fixed(&self) -> Option<HeaderConvention> {
        match self {
            ConventionSetting::Auto => None,
            ConventionSetting::TwoRow => Some(HeaderConvention::TwoRow),
            ConventionSetting::SingleRow => Some(HeaderConvention::SingleRow),
            ConventionSetting::Headerless => Some(HeaderConvention::Headerless),
        }
    }
}

impl fmt::Display for ConventionSetting {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.fixed() {
            Some(c) => write!(f, "{}", c),
            None => f.write_str("auto"),
        }
    }
}

impl FromStr for ConventionSetting {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        if s.trim().eq_ignore_ascii_case("auto") {
            return Ok(ConventionSetting::Auto);
        }
        Ok(match s.parse::<HeaderConvention>()? {
            HeaderConvention::TwoRow => ConventionSetting::TwoRow,
            HeaderConvention::SingleRow => ConventionSetting::SingleRow,
            HeaderConvention::Headerless => ConventionSetting::Headerless,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LoaderConfig {
    pub data_dir: PathBuf,
    pub extension: String,
    pub convention: ConventionSetting,
    pub delimiter: Option<char>,
    pub positional_layout: String,
    pub label_field: String,
    pub text_fields: Vec<String>,
    pub reload_interval_secs: Option<u64>,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("results"),
            extension: "csv".to_string(),
            convention: ConventionSetting::Auto,
            delimiter: None,
            positional_layout: "v1".to_string(),
            label_field: "merkmal".to_string(),
            text_fields: Vec::new(),
            reload_interval_secs: None,
        }
    }
}

impl LoaderConfig {
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Reject settings the loader cannot act on.
    pub fn validate(&self) -> Result<()> {
        let ext = self.extension.trim_start_matches('.');
        if ext.is_empty() {
            bail!("extension must not be empty");
        }
        if positional_layout(&self.positional_layout).is_none() {
            bail!("unknown positional_layout `{}`", self.positional_layout);
        }
        if let Some(d) = self.delimiter {
            if !d.is_ascii() || d.is_ascii_alphanumeric() || d == '"' || d == '\n' {
                bail!("unsupported delimiter {:?}", d);
            }
        }
        if !is_field_name(&self.label_field) {
            bail!(
                "label_field `{}` must match [A-Za-z][A-Za-z0-9]*",
                self.label_field
            );
        }
        Ok(())
    }

    /// Label, provenance and configured text columns are never parsed as numbers.
    pub fn is_text_field(&self, name: &str) -> bool {
        name == self.label_field
            || PROVENANCE_FIELDS.contains(&name)
            || self.text_fields.iter().any(|f| f == name)
    }

    pub fn extension(&self) -> &str {
        self.extension.trim_start_matches('.')
    }

    pub fn read_options(&self) -> ReadOptions<'_> {
        ReadOptions {
            convention: self.convention.fixed(),
            delimiter: self.delimiter.map(|c| c as u8),
            header: HeaderOptions {
                label: &self.label_field,
                positional_layout: &self.positional_layout,
            },
        }
    }
}

fn is_field_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars.next().map_or(false, |c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric())
}

/// Read a YAML config file, or fall back to defaults when no path is given.
pub fn load_config(path: Option<&Path>) -> Result<LoaderConfig> {
    let config = match path {
        Some(p) => {
            let text = fs::read_to_string(p).with_context(|| format!("reading config {:?}", p))?;
            serde_yaml::from_str::<LoaderConfig>(&text)
                .with_context(|| format!("parsing config {:?}", p))?
        }
        None => LoaderConfig::default(),
    };
    config.validate()?;
    Ok(config)
}
