//! Hub config — serde structs for ~/.sinain/sinain.json
//!
//! Pure types and parsing only. Secrets may be supplied via environment
//! variables (SINAIN_GATEWAY_TOKEN, SINAIN_HOOK_TOKEN, SINAIN_MODEL_KEY);
//! env values win over the file.

use crate::types::EscalationMode;
use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct HubConfig {
    #[serde(rename = "wsPort")]
    pub ws_port: Option<u16>,
    pub agent: AgentConfig,
    pub escalation: EscalationConfig,
    pub openclaw: OpenclawConfig,
    #[serde(rename = "situationMdPath")]
    pub situation_md_path: Option<String>,
    #[serde(rename = "situationMdEnabled")]
    pub situation_md_enabled: Option<bool>,
    #[serde(rename = "traceEnabled")]
    pub trace_enabled: Option<bool>,
    #[serde(rename = "traceDir")]
    pub trace_dir: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub enabled: bool,
    pub model: String,
    #[serde(rename = "fallbackModels")]
    pub fallback_models: Vec<String>,
    #[serde(rename = "baseUrl")]
    pub base_url: String,
    #[serde(rename = "apiKey")]
    pub api_key: Option<String>,
    #[serde(rename = "maxTokens")]
    pub max_tokens: u32,
    pub temperature: f32,
    #[serde(rename = "debounceMs")]
    pub debounce_ms: u64,
    #[serde(rename = "maxIntervalMs")]
    pub max_interval_ms: u64,
    #[serde(rename = "cooldownMs")]
    pub cooldown_ms: u64,
    #[serde(rename = "maxAgeMs")]
    pub max_age_ms: u64,
    #[serde(rename = "pushToFeed")]
    pub push_to_feed: bool,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            model: "gpt-4o-mini".to_string(),
            fallback_models: Vec::new(),
            base_url: "https://api.openai.com/v1".to_string(),
            api_key: None,
            max_tokens: 512,
            temperature: 0.3,
            debounce_ms: 3_000,
            max_interval_ms: 30_000,
            cooldown_ms: 5_000,
            max_age_ms: 120_000,
            push_to_feed: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EscalationConfig {
    pub mode: EscalationMode,
    #[serde(rename = "cooldownMs")]
    pub cooldown_ms: u64,
}

impl Default for EscalationConfig {
    fn default() -> Self {
        Self {
            mode: EscalationMode::Selective,
            cooldown_ms: 90_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OpenclawConfig {
    #[serde(rename = "gatewayWsUrl")]
    pub gateway_ws_url: Option<String>,
    #[serde(rename = "gatewayToken")]
    pub gateway_token: Option<String>,
    #[serde(rename = "hookUrl")]
    pub hook_url: Option<String>,
    #[serde(rename = "hookToken")]
    pub hook_token: Option<String>,
    #[serde(rename = "sessionKey")]
    pub session_key: String,
}

impl Default for OpenclawConfig {
    fn default() -> Self {
        Self {
            gateway_ws_url: None,
            gateway_token: None,
            hook_url: None,
            hook_token: None,
            session_key: "sinain-hud".to_string(),
        }
    }
}

pub const DEFAULT_WS_PORT: u16 = 8790;

impl HubConfig {
    /// Load from a specific path. Missing file or bad JSON yields defaults.
    pub fn load(path: &Path) -> Self {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_default(),
            Err(_) => Self::default(),
        };
        config.apply_env();
        config
    }

    /// Discover from ~/.sinain/sinain.json.
    pub fn discover() -> Self {
        Self::load(&Self::default_path())
    }

    /// Default path: ~/.sinain/sinain.json
    pub fn default_path() -> PathBuf {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
        PathBuf::from(home).join(".sinain").join("sinain.json")
    }

    fn apply_env(&mut self) {
        if let Ok(token) = std::env::var("SINAIN_GATEWAY_TOKEN") {
            self.openclaw.gateway_token = Some(token);
        }
        if let Ok(token) = std::env::var("SINAIN_HOOK_TOKEN") {
            self.openclaw.hook_token = Some(token);
        }
        if let Ok(key) = std::env::var("SINAIN_MODEL_KEY") {
            self.agent.api_key = Some(key);
        }
    }

    pub fn ws_port(&self) -> u16 {
        self.ws_port.unwrap_or(DEFAULT_WS_PORT)
    }

    pub fn trace_enabled(&self) -> bool {
        self.trace_enabled.unwrap_or(true)
    }

    pub fn trace_dir(&self) -> PathBuf {
        self.trace_dir
            .as_deref()
            .map(expand_tilde)
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
                PathBuf::from(home).join(".sinain").join("traces")
            })
    }

    pub fn situation_md_enabled(&self) -> bool {
        self.situation_md_enabled.unwrap_or(true)
    }

    pub fn situation_md_path(&self) -> PathBuf {
        self.situation_md_path
            .as_deref()
            .map(expand_tilde)
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".into());
                PathBuf::from(home).join(".sinain").join("situation.md")
            })
    }

    /// The model chain: primary first, then fallbacks in order.
    pub fn model_chain(&self) -> Vec<String> {
        let mut chain = vec![self.agent.model.clone()];
        chain.extend(self.agent.fallback_models.iter().cloned());
        chain
    }
}

pub fn expand_tilde(path: &str) -> PathBuf {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(rest);
        }
    }
    PathBuf::from(path)
}
