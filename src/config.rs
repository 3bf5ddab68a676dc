use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding the default CLI binary name.
pub const BIN_ENV: &str = "GAUNTLET_BIN";

/// Validated run configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// CLI binary the suites drive.
    pub bin: String,
    /// Budget for the whole run, all suites together.
    pub timeout: Duration,
    /// Budget for a single CLI invocation.
    pub invoke_timeout: Duration,
    /// Environment variable holding the API base URL.
    pub base_url_env: String,
    /// Environment variable holding the bearer token.
    pub token_env: String,
    pub suites: Vec<SuiteConfig>,
}

#[derive(Debug, Clone)]
pub struct SuiteConfig {
    pub name: String,
    pub file: String,
    /// Extra variables exposed to the script through `env.get`.
    pub env: HashMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default = "default_bin")]
    bin: String,
    #[serde(default = "default_timeout")]
    timeout: String,
    #[serde(default = "default_invoke_timeout")]
    invoke_timeout: String,
    #[serde(default = "default_base_url_env")]
    base_url_env: String,
    #[serde(default = "default_token_env")]
    token_env: String,
    #[serde(default)]
    suites: Vec<RawSuite>,
}

#[derive(Debug, Deserialize)]
struct RawSuite {
    name: Option<String>,
    file: String,
    #[serde(default)]
    env: HashMap<String, String>,
}

fn default_bin() -> String {
    std::env::var(BIN_ENV).unwrap_or_else(|_| "xbe".to_string())
}

fn default_timeout() -> String {
    "120s".to_string()
}

fn default_invoke_timeout() -> String {
    "30s".to_string()
}

fn default_base_url_env() -> String {
    "XBE_BASE_URL".to_string()
}

fn default_token_env() -> String {
    "XBE_TOKEN".to_string()
}

pub fn parse_duration(s: &str) -> Result<Duration> {
    let s = s.trim();
    if let Some(ms) = s.strip_suffix("ms") {
        let v: u64 = ms.trim().parse().context("invalid milliseconds value")?;
        return Ok(Duration::from_millis(v));
    }
    if let Some(secs) = s.strip_suffix('s') {
        let v: u64 = secs.trim().parse().context("invalid seconds value")?;
        return Ok(Duration::from_secs(v));
    }
    if let Some(mins) = s.strip_suffix('m') {
        let v: u64 = mins.trim().parse().context("invalid minutes value")?;
        return Ok(Duration::from_secs(v * 60));
    }
    bail!("invalid duration format: {s:?} (expected e.g. 500ms, 30s, 5m)")
}

fn suite_name_from_file(file: &str) -> String {
    Path::new(file)
        .file_stem()
        .map(|stem| stem.to_string_lossy().into_owned())
        .unwrap_or_else(|| file.to_string())
}

fn validate(raw: RawConfig) -> Result<Config> {
    let timeout = parse_duration(&raw.timeout)
        .with_context(|| format!("invalid timeout {:?}", raw.timeout))?;
    let invoke_timeout = parse_duration(&raw.invoke_timeout)
        .with_context(|| format!("invalid invoke_timeout {:?}", raw.invoke_timeout))?;

    let mut suites = Vec::with_capacity(raw.suites.len());
    for suite in raw.suites {
        if suite.file.trim().is_empty() {
            bail!("suite with empty file path");
        }
        suites.push(SuiteConfig {
            name: suite
                .name
                .unwrap_or_else(|| suite_name_from_file(&suite.file)),
            file: suite.file,
            env: suite.env,
        });
    }

    Ok(Config {
        bin: raw.bin,
        timeout,
        invoke_timeout,
        base_url_env: raw.base_url_env,
        token_env: raw.token_env,
        suites,
    })
}

pub fn parse(text: &str) -> Result<Config> {
    let raw: RawConfig = serde_yml::from_str(text).context("parsing YAML")?;
    validate(raw)
}

pub fn load(path: &Path) -> Result<Config> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    parse(&text)
}

/// A config with defaults and no suites, for `exec` and ad-hoc runs.
pub fn defaults(bin: Option<String>) -> Config {
    Config {
        bin: bin.unwrap_or_else(default_bin),
        timeout: Duration::from_secs(120),
        invoke_timeout: Duration::from_secs(30),
        base_url_env: default_base_url_env(),
        token_env: default_token_env(),
        suites: Vec::new(),
    }
}

/// A config whose suites are the given script files, for `gauntlet run a.lua b.lua`.
pub fn from_files(files: &[PathBuf], bin: Option<String>) -> Config {
    let mut cfg = defaults(bin);
    cfg.suites = files
        .iter()
        .map(|file| {
            let file = file.to_string_lossy().into_owned();
            SuiteConfig {
                name: suite_name_from_file(&file),
                file,
                env: HashMap::new(),
            }
        })
        .collect();
    cfg
}

/// The service under test, resolved once per run from the process
/// environment. Missing or empty variables resolve to `None`; builtins
/// that need them report the variable name in their errors.
#[derive(Debug, Clone)]
pub struct Target {
    pub bin: String,
    pub invoke_timeout: Duration,
    pub base_url: Option<String>,
    pub token: Option<String>,
    pub base_url_env: String,
    pub token_env: String,
}

impl Target {
    pub fn resolve(config: &Config) -> Self {
        let read = |name: &str| std::env::var(name).ok().filter(|value| !value.is_empty());
        Target {
            bin: config.bin.clone(),
            invoke_timeout: config.invoke_timeout,
            base_url: read(&config.base_url_env),
            token: read(&config.token_env),
            base_url_env: config.base_url_env.clone(),
            token_env: config.token_env.clone(),
        }
    }
}
