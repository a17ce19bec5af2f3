//! Scaffold configuration: TOML file, then environment, then CLI overrides.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Scaffold configuration (TOML).
///
/// Missing fields default to sensible values; a missing file means all defaults.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct ScaffoldConfig {
    pub oracle: OracleConfig,
    pub generation: GenerationConfig,
    pub execution: ExecutionConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OracleConfig {
    /// OpenAI-compatible chat completions URL.
    pub endpoint: String,

    /// Bearer token. Never written back out.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,

    pub model: String,

    /// Per-request wall-clock limit for the HTTP call.
    pub request_timeout_secs: u64,

    pub temperature: f32,
}

impl Default for OracleConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            api_key: None,
            model: "gpt-4o-mini".to_string(),
            request_timeout_secs: 120,
            temperature: 0.2,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct GenerationConfig {
    /// Attempts per generated file before it is skipped.
    pub file_attempts: u32,

    /// Extra oracle calls within one attempt after a transient failure.
    pub transient_retries: u32,

    /// Pause between attempts and between transient retries.
    pub retry_pause_ms: u64,

    /// Upper bound on the serialized generation context in a prompt.
    pub context_budget_bytes: usize,

    /// Upper bound on a whole per-file prompt.
    pub prompt_budget_bytes: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            file_attempts: 3,
            transient_retries: 1,
            retry_pause_ms: 1_000,
            context_budget_bytes: 40_000,
            prompt_budget_bytes: 60_000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Interpreter used both to run the entry file and to install packages.
    pub interpreter: String,

    /// Arguments after the interpreter that invoke the package installer.
    pub install_args: Vec<String>,

    /// Optional wall-clock limit per launch. Unset means no limit.
    pub timeout_secs: Option<u64>,

    /// Truncate captured stdout/stderr beyond this many bytes.
    pub output_limit_bytes: usize,

    /// Ask the oracle to review the entry file after execution.
    pub self_validate: bool,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            interpreter: "python3".to_string(),
            install_args: vec!["-m".to_string(), "pip".to_string(), "install".to_string()],
            timeout_secs: None,
            output_limit_bytes: 1_000_000,
            self_validate: true,
        }
    }
}

impl ScaffoldConfig {
    pub fn validate(&self) -> Result<()> {
        if self.oracle.endpoint.trim().is_empty() {
            return Err(anyhow!("oracle.endpoint must be non-empty"));
        }
        if self.oracle.model.trim().is_empty() {
            return Err(anyhow!("oracle.model must be non-empty"));
        }
        if self.oracle.request_timeout_secs == 0 {
            return Err(anyhow!("oracle.request_timeout_secs must be > 0"));
        }
        if self.generation.file_attempts == 0 {
            return Err(anyhow!("generation.file_attempts must be > 0"));
        }
        if self.generation.prompt_budget_bytes == 0 {
            return Err(anyhow!("generation.prompt_budget_bytes must be > 0"));
        }
        if self.execution.interpreter.trim().is_empty() {
            return Err(anyhow!("execution.interpreter must be non-empty"));
        }
        if self.execution.install_args.is_empty() {
            return Err(anyhow!("execution.install_args must be a non-empty array"));
        }
        if self.execution.output_limit_bytes == 0 {
            return Err(anyhow!("execution.output_limit_bytes must be > 0"));
        }
        if self.execution.timeout_secs == Some(0) {
            return Err(anyhow!("execution.timeout_secs must be > 0 when set"));
        }
        Ok(())
    }

    /// Apply `SCAFFOLD_*` environment overrides using `lookup` (usually `std::env::var`).
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        if let Some(endpoint) = get("SCAFFOLD_ENDPOINT") {
            self.oracle.endpoint = endpoint;
        }
        if let Some(key) = get("SCAFFOLD_API_KEY").or_else(|| get("OPENAI_API_KEY")) {
            self.oracle.api_key = Some(key);
        }
        if let Some(model) = get("SCAFFOLD_MODEL") {
            self.oracle.model = model;
        }
        if let Some(interpreter) = get("SCAFFOLD_PYTHON") {
            self.execution.interpreter = interpreter;
        }
        if let Some(raw) = get("SCAFFOLD_FILE_ATTEMPTS") {
            self.generation.file_attempts = raw
                .trim()
                .parse()
                .with_context(|| format!("parse SCAFFOLD_FILE_ATTEMPTS={raw}"))?;
        }
        if let Some(raw) = get("SCAFFOLD_TRANSIENT_RETRIES") {
            self.generation.transient_retries = raw
                .trim()
                .parse()
                .with_context(|| format!("parse SCAFFOLD_TRANSIENT_RETRIES={raw}"))?;
        }
        self.validate()
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `ScaffoldConfig::default()`.
pub fn load_config(path: &Path) -> Result<ScaffoldConfig> {
    if !path.exists() {
        let cfg = ScaffoldConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: ScaffoldConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}
