use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use humanscore_provider::ProviderConfig;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub name: String,
    #[serde(default = "default_env")]
    pub env: String,
}

fn default_env() -> String {
    "dev".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_bind")]
    pub bind: String,
}

fn default_bind() -> String {
    "127.0.0.1:8787".to_string()
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: default_bind(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    Memory,
    #[default]
    Sqlite,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    #[serde(default)]
    pub kind: StoreKind,
    /// Relative paths resolve against the workspace root.
    #[serde(default = "default_store_path")]
    pub path: String,
}

fn default_store_path() -> String {
    "data/sessions.db".to_string()
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::default(),
            path: default_store_path(),
        }
    }
}

impl StoreConfig {
    pub fn resolved_path(&self, root: &Path) -> PathBuf {
        let path = Path::new(&self.path);
        if path.is_absolute() {
            path.to_path_buf()
        } else {
            root.join(path)
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoalescerConfig {
    /// Pending events that force an immediate flush.
    #[serde(default = "default_flush_threshold")]
    pub flush_threshold: usize,
    #[serde(default = "default_flush_delay_ms")]
    pub flush_delay_ms: u64,
    /// Skip events whose step number is already stored for the session.
    #[serde(default)]
    pub dedupe_by_step: bool,
}

fn default_flush_threshold() -> usize {
    3
}

fn default_flush_delay_ms() -> u64 {
    1000
}

impl Default for CoalescerConfig {
    fn default() -> Self {
        Self {
            flush_threshold: default_flush_threshold(),
            flush_delay_ms: default_flush_delay_ms(),
            dedupe_by_step: false,
        }
    }
}

impl CoalescerConfig {
    pub fn flush_delay(&self) -> Duration {
        Duration::from_millis(self.flush_delay_ms)
    }
}

/// One provider asked to answer the quiz itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BaselineProviderSpec {
    /// Key used in baseline maps and the enriched breakdown.
    pub name: String,
    pub provider_id: String,
    pub model: String,
    #[serde(default = "default_baseline_temperature")]
    pub temperature: f32,
    #[serde(default = "default_baseline_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_baseline_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_baseline_temperature() -> f32 {
    0.9
}

fn default_baseline_max_tokens() -> u32 {
    2048
}

fn default_baseline_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisLinkConfig {
    pub provider_id: String,
    pub model: String,
    #[serde(default = "default_analysis_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_analysis_temperature")]
    pub temperature: f32,
    #[serde(default = "default_analysis_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_analysis_max_tokens() -> u32 {
    4096
}

fn default_analysis_temperature() -> f32 {
    0.2
}

fn default_analysis_timeout_ms() -> u64 {
    60_000
}

impl AnalysisLinkConfig {
    pub fn label(&self) -> String {
        format!("{}/{}", self.provider_id, self.model)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Primary first, then transport fallbacks.
    pub chain: Vec<AnalysisLinkConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MainConfig {
    pub app: AppConfig,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub coalescer: CoalescerConfig,
    pub analysis: AnalysisConfig,
    #[serde(default)]
    pub baselines: Vec<BaselineProviderSpec>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HumanscoreConfig {
    pub main: MainConfig,
    #[serde(default)]
    pub providers: Vec<ProviderConfig>,
}

pub fn resolve_env_var(raw: &str) -> String {
    let mut output = String::new();
    let mut rest = raw;

    while let Some(start) = rest.find("${") {
        output.push_str(&rest[..start]);

        let candidate = &rest[start + 2..];
        let Some(end) = candidate.find('}') else {
            output.push_str(&rest[start..]);
            return output;
        };

        let key = &candidate[..end];
        output.push_str(&std::env::var(key).unwrap_or_default());
        rest = &candidate[end + 1..];
    }

    output.push_str(rest);
    output
}

/// Loads `main.yaml` and `providers.d/*.yaml` from `root`, resolves `${ENV}`
/// placeholders and validates cross references.
pub fn load_config(root: &Path) -> Result<HumanscoreConfig> {
    let mut main: MainConfig = read_yaml_file(&root.join("main.yaml"))?;
    let providers_dir = root.join("providers.d");
    let mut providers = if providers_dir.is_dir() {
        read_yaml_dir::<ProviderConfig>(&providers_dir)?
    } else {
        Vec::new()
    };

    resolve_main_env(&mut main);
    resolve_providers_env(&mut providers);

    let config = HumanscoreConfig { main, providers };
    validate_config(&config)?;
    Ok(config)
}

pub fn validate_config(config: &HumanscoreConfig) -> Result<()> {
    let mut provider_ids = HashSet::new();
    for provider in &config.providers {
        if !provider_ids.insert(provider.id.as_str()) {
            return Err(anyhow!("duplicate provider_id: {}", provider.id));
        }
    }

    let coalescer = &config.main.coalescer;
    if coalescer.flush_threshold == 0 {
        return Err(anyhow!("coalescer.flush_threshold must be at least 1"));
    }
    if coalescer.flush_delay_ms == 0 {
        return Err(anyhow!("coalescer.flush_delay_ms must be at least 1"));
    }

    if config.main.analysis.chain.is_empty() {
        return Err(anyhow!("analysis.chain must name at least one provider"));
    }
    for link in &config.main.analysis.chain {
        if !provider_ids.contains(link.provider_id.as_str()) {
            return Err(anyhow!(
                "unknown provider_id in analysis chain: {}",
                link.provider_id
            ));
        }
    }

    let mut names = HashSet::new();
    for baseline in &config.main.baselines {
        if !names.insert(baseline.name.as_str()) {
            return Err(anyhow!("duplicate baseline name: {}", baseline.name));
        }
        if !provider_ids.contains(baseline.provider_id.as_str()) {
            return Err(anyhow!(
                "unknown provider_id in baselines: {}",
                baseline.provider_id
            ));
        }
    }

    Ok(())
}

fn read_yaml_file<T>(path: &Path) -> Result<T>
where
    T: for<'de> Deserialize<'de>,
{
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file: {}", path.display()))?;
    serde_yaml::from_str(&content)
        .with_context(|| format!("failed to parse yaml file: {}", path.display()))
}

fn read_yaml_dir<T>(dir: &Path) -> Result<Vec<T>>
where
    T: for<'de> Deserialize<'de>,
{
    let mut paths = Vec::new();
    for entry in fs::read_dir(dir)
        .with_context(|| format!("failed to read config dir: {}", dir.display()))?
    {
        let entry =
            entry.with_context(|| format!("failed to read dir entry: {}", dir.display()))?;
        let path = entry.path();
        if matches!(
            path.extension().and_then(|ext| ext.to_str()),
            Some("yaml" | "yml")
        ) {
            paths.push(path);
        }
    }
    paths.sort();

    paths.iter().map(|path| read_yaml_file::<T>(path)).collect()
}

fn resolve_main_env(main: &mut MainConfig) {
    main.app.name = resolve_env_var(&main.app.name);
    main.server.bind = resolve_env_var(&main.server.bind);
    main.store.path = resolve_env_var(&main.store.path);

    for link in &mut main.analysis.chain {
        link.provider_id = resolve_env_var(&link.provider_id);
        link.model = resolve_env_var(&link.model);
    }

    for baseline in &mut main.baselines {
        baseline.provider_id = resolve_env_var(&baseline.provider_id);
        baseline.model = resolve_env_var(&baseline.model);
    }
}

fn resolve_providers_env(providers: &mut [ProviderConfig]) {
    for provider in providers {
        provider.id = resolve_env_var(&provider.id);
        provider.api_key = provider
            .api_key
            .as_deref()
            .map(resolve_env_var)
            .filter(|key| !key.trim().is_empty());
        provider.base_url = provider
            .base_url
            .as_deref()
            .map(resolve_env_var)
            .filter(|url| !url.trim().is_empty());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture_config_root() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../config")
    }

    #[test]
    fn load_config_from_workspace_fixtures() {
        let config = load_config(&fixture_config_root()).unwrap();
        assert_eq!(config.main.app.name, "humanscore");
        assert_eq!(config.main.coalescer, CoalescerConfig::default());
        assert_eq!(config.main.analysis.chain.len(), 2);
        assert_eq!(config.main.baselines.len(), 3);
        assert_eq!(config.providers.len(), 3);
    }

    #[test]
    fn coalescer_section_defaults_when_partial() {
        let parsed: CoalescerConfig = serde_yaml::from_str("flush_threshold: 5").unwrap();
        assert_eq!(parsed.flush_threshold, 5);
        assert_eq!(parsed.flush_delay_ms, 1000);
        assert!(!parsed.dedupe_by_step);
    }

    #[test]
    fn validate_config_detects_unknown_provider_in_chain() {
        let mut config = load_config(&fixture_config_root()).unwrap();
        config.main.analysis.chain[0].provider_id = "nope".into();
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("unknown provider_id in analysis chain"));
    }

    #[test]
    fn validate_config_detects_duplicate_provider_id() {
        let mut config = load_config(&fixture_config_root()).unwrap();
        let duplicate = config.providers[0].clone();
        config.providers.push(duplicate);
        let err = validate_config(&config).unwrap_err();
        assert!(err.to_string().contains("duplicate provider_id"));
    }

    #[test]
    fn validate_config_rejects_zero_threshold() {
        let mut config = load_config(&fixture_config_root()).unwrap();
        config.main.coalescer.flush_threshold = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn missing_env_key_becomes_absent_credential() {
        let mut providers = vec![humanscore_provider::ProviderConfig::new(
            "x",
            humanscore_provider::ProviderType::OpenAI,
        )
        .with_api_key("${HUMANSCORE_TEST_SURELY_UNSET_KEY}")];
        resolve_providers_env(&mut providers);
        assert!(providers[0].api_key.is_none());
    }

    #[test]
    fn resolve_env_var_replaces_env_placeholder() {
        let expected = std::env::var("PATH").unwrap();
        assert_eq!(resolve_env_var("${PATH}"), expected);
    }

    #[test]
    fn resolve_env_var_unclosed_bracket() {
        assert_eq!(resolve_env_var("prefix_${UNCLOSED"), "prefix_${UNCLOSED");
    }

    #[test]
    fn relative_store_path_resolves_against_root() {
        let store = StoreConfig::default();
        assert_eq!(
            store.resolved_path(Path::new("/srv/hs")),
            PathBuf::from("/srv/hs/data/sessions.db")
        );
    }
}
