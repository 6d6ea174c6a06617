use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::excerpt::ExcerptBudget;
use crate::farm::FarmSpec;

pub const DEFAULT_USER_AGENT: &str = "wikiembed/0.1";
pub const DEFAULT_CONFIG_FILE: &str = "wikiembed.toml";
pub const DEFAULT_TIMEOUT_MS: u64 = 10_000;
pub const DEFAULT_RETRIES: usize = 1;
pub const DEFAULT_RETRY_DELAY_MS: u64 = 300;

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct EmbedConfig {
    #[serde(default)]
    pub http: HttpSection,
    #[serde(default)]
    pub excerpt: ExcerptBudget,
    #[serde(default)]
    pub hops: HopSection,
    #[serde(default)]
    pub farms: Vec<FarmSpec>,
    #[serde(default)]
    pub commands: Vec<CommandSet>,
    #[serde(default)]
    pub sites: Vec<SiteSpec>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Default, PartialEq, Eq)]
pub struct HttpSection {
    pub user_agent: Option<String>,
    pub timeout_ms: Option<u64>,
    pub retries: Option<usize>,
    pub retry_delay_ms: Option<u64>,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(default)]
pub struct HopSection {
    pub default: u32,
    pub elevated: u32,
}

impl Default for HopSection {
    fn default() -> Self {
        Self {
            default: 2,
            elevated: 5,
        }
    }
}

impl HopSection {
    pub fn limit(&self, elevated: bool) -> u32 {
        if elevated { self.elevated } else { self.default }
    }
}

/// Game-specific shortcuts for one wiki: `<alias> <args>` becomes a page title.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct CommandSet {
    /// Base URL of the wiki the set belongs to.
    pub wiki: String,
    pub name: String,
    /// Alias to title template; `$1` receives the arguments.
    #[serde(default)]
    pub aliases: BTreeMap<String, String>,
}

impl CommandSet {
    pub fn rewrite(&self, title: &str) -> Option<(String, String)> {
        let (alias, args) = match title.split_once(' ') {
            Some((alias, args)) => (alias, args.trim()),
            None => (title, ""),
        };
        let alias = alias.to_lowercase();
        let template = self.aliases.get(&alias)?;
        let rewritten = template.replace("$1", args).trim().to_string();
        Some((rewritten, format!("{} {alias}", self.name)))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct SiteSpec {
    pub name: String,
    pub url: String,
    pub article_path: Option<String>,
}

impl EmbedConfig {
    /// Resolve user agent: env WIKIEMBED_USER_AGENT > config > DEFAULT_USER_AGENT.
    pub fn user_agent(&self) -> String {
        env_override("WIKIEMBED_USER_AGENT")
            .or_else(|| self.http.user_agent.clone())
            .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string())
    }

    pub fn timeout_ms(&self) -> u64 {
        env_override_parsed("WIKIEMBED_HTTP_TIMEOUT_MS")
            .or(self.http.timeout_ms)
            .unwrap_or(DEFAULT_TIMEOUT_MS)
    }

    pub fn retries(&self) -> usize {
        env_override_parsed("WIKIEMBED_HTTP_RETRIES")
            .or(self.http.retries)
            .unwrap_or(DEFAULT_RETRIES)
    }

    pub fn retry_delay_ms(&self) -> u64 {
        env_override_parsed("WIKIEMBED_HTTP_RETRY_DELAY_MS")
            .or(self.http.retry_delay_ms)
            .unwrap_or(DEFAULT_RETRY_DELAY_MS)
    }
}

/// Load and parse an EmbedConfig from a TOML file. Returns default if file doesn't exist.
pub fn load_config(config_path: &Path) -> Result<EmbedConfig> {
    if !config_path.exists() {
        return Ok(EmbedConfig::default());
    }
    let content = fs::read_to_string(config_path)
        .with_context(|| format!("failed to read {}", config_path.display()))?;
    let parsed: EmbedConfig = toml::from_str(&content)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    Ok(parsed)
}

fn env_override(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_override_parsed<T: std::str::FromStr>(key: &str) -> Option<T> {
    env_override(key).and_then(|value| value.parse::<T>().ok())
}
