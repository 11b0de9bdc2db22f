//! Tunables for identity matching, paging, scrolling and read receipts.
//!
//! Every struct deserializes with `#[serde(default)]`, so a config file only
//! needs to carry the values it overrides.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_COUNTRY_CODE: &str = "55";
pub const DEFAULT_USER_SUFFIX: &str = "@s.whatsapp.net";
pub const LEGACY_USER_SUFFIX: &str = "@c.us";
pub const HIDDEN_USER_SUFFIX: &str = "@lid";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct IdentityConfig {
    /// Country calling code added to or stripped from canonical ids.
    pub country_code: String,
    /// Channel suffix annotations, in lookup order.
    pub suffixes: Vec<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            country_code: DEFAULT_COUNTRY_CODE.to_string(),
            suffixes: vec![
                DEFAULT_USER_SUFFIX.to_string(),
                LEGACY_USER_SUFFIX.to_string(),
                HIDDEN_USER_SUFFIX.to_string(),
            ],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct PagingConfig {
    pub page_size: usize,
    /// Near-top distance (px) that triggers `load_more` on touch viewports.
    pub near_top_touch: f64,
    /// Near-top distance (px) that triggers `load_more` on pointer viewports.
    pub near_top_pointer: f64,
    /// Viewports narrower than this (px) are treated as touch-primary.
    pub touch_breakpoint_width: f64,
}

impl Default for PagingConfig {
    fn default() -> Self {
        Self {
            page_size: 20,
            near_top_touch: 300.0,
            near_top_pointer: 100.0,
            touch_breakpoint_width: 768.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ScrollConfig {
    pub near_bottom: f64,
    pub initial_settle_ms: u64,
    pub append_settle_ms: u64,
    pub prepend_settle_ms: u64,
}

impl Default for ScrollConfig {
    fn default() -> Self {
        Self {
            near_bottom: 150.0,
            initial_settle_ms: 150,
            append_settle_ms: 50,
            prepend_settle_ms: 50,
        }
    }
}

impl ScrollConfig {
    pub fn initial_settle(&self) -> Duration {
        Duration::from_millis(self.initial_settle_ms)
    }

    pub fn append_settle(&self) -> Duration {
        Duration::from_millis(self.append_settle_ms)
    }

    pub fn prepend_settle(&self) -> Duration {
        Duration::from_millis(self.prepend_settle_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ReadConfig {
    /// Delay between opening a conversation and writing its read cursor.
    pub cursor_settle_ms: u64,
}

impl Default for ReadConfig {
    fn default() -> Self {
        Self {
            cursor_settle_ms: 500,
        }
    }
}

impl ReadConfig {
    pub fn cursor_settle(&self) -> Duration {
        Duration::from_millis(self.cursor_settle_ms)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct InboxConfig {
    pub identity: IdentityConfig,
    pub paging: PagingConfig,
    pub scroll: ScrollConfig,
    pub read: ReadConfig,
}

impl InboxConfig {
    pub fn from_json_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_json_str(&raw)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.paging.page_size == 0 {
            return Err(ConfigError::Invalid("paging.pageSize must be > 0".into()));
        }
        if !self.identity.country_code.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::Invalid(format!(
                "identity.countryCode must be digits, got {:?}",
                self.identity.country_code
            )));
        }
        Ok(())
    }
}
