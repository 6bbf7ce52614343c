//! Evaluation and registration configuration.
//!
//! Configuration is plain serde data so it can be loaded from JSON or,
//! with the `toml` feature, from TOML files.
use serde::de::Error;
use serde::{Deserialize, Serialize};

/// How result map names are derived from the basename.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SuffixMode {
    /// `<basename>_<index>`, zero padded to the width of the map count
    #[default]
    Num,
    /// `<basename>_<start time>`
    Time,
    /// `<basename>_<start truncated to the granularity unit>`
    Gran,
}

impl SuffixMode {
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "num" | "index" => Some(SuffixMode::Num),
            "time" => Some(SuffixMode::Time),
            "gran" | "granularity" => Some(SuffixMode::Gran),
            _ => None,
        }
    }
}

/// Temporal algebra configuration
///
/// # Example
///
/// ```rust
/// use spatio_algebra::{Config, SuffixMode};
///
/// let json = r#"{
///     "mapset": "climate",
///     "suffix": "time",
///     "strict": true
/// }"#;
/// let config = Config::from_json(json).unwrap();
/// assert_eq!(config.suffix, SuffixMode::Time);
/// assert!(!config.dry_run);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Mapset that receives result datasets and maps
    #[serde(default = "Config::default_mapset")]
    pub mapset: String,

    /// Creator recorded in catalog rows
    #[serde(default = "Config::default_creator")]
    pub creator: String,

    /// Semantic type used when no input dataset provides one
    #[serde(default = "Config::default_semantic_type")]
    pub semantic_type: String,

    /// Compute the plan without calling the kernel or writing the catalog
    #[serde(default)]
    pub dry_run: bool,

    /// Log every matched pair at info level
    #[serde(default)]
    pub debug: bool,

    /// Abort the whole run when the kernel fails for one pair
    #[serde(default)]
    pub strict: bool,

    /// Replace an existing result dataset and its maps
    #[serde(default)]
    pub overwrite: bool,

    #[serde(default)]
    pub suffix: SuffixMode,
}

impl Config {
    fn default_mapset() -> String {
        "PERMANENT".to_string()
    }

    fn default_creator() -> String {
        "spatio-algebra".to_string()
    }

    fn default_semantic_type() -> String {
        "mean".to_string()
    }

    pub fn with_mapset(mut self, mapset: impl Into<String>) -> Self {
        self.mapset = mapset.into();
        self
    }

    pub fn with_creator(mut self, creator: impl Into<String>) -> Self {
        self.creator = creator.into();
        self
    }

    pub fn with_semantic_type(mut self, semantic_type: impl Into<String>) -> Self {
        self.semantic_type = semantic_type.into();
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_suffix(mut self, suffix: SuffixMode) -> Self {
        self.suffix = suffix;
        self
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), String> {
        if self.mapset.trim().is_empty() {
            return Err("Mapset must not be empty".to_string());
        }
        if self.mapset.contains('@') {
            return Err(format!("Mapset `{}` must not contain '@'", self.mapset));
        }
        if self.semantic_type.trim().is_empty() {
            return Err("Semantic type must not be empty".to_string());
        }
        Ok(())
    }

    /// Load configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        let config: Config = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as JSON string
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load configuration from TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> Result<Self, toml::de::Error> {
        let config: Config = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as TOML string (requires toml feature)
    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            mapset: Self::default_mapset(),
            creator: Self::default_creator(),
            semantic_type: Self::default_semantic_type(),
            dry_run: false,
            debug: false,
            strict: false,
            overwrite: false,
            suffix: SuffixMode::default(),
        }
    }
}
