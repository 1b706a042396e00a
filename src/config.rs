use std::path::PathBuf;

use crate::errors::AppError;
use crate::models::{GeminiModel, GenerationConfig};

/// Environment variables checked for the Gemini credential, in order.
pub const API_KEY_VARS: [&str; 2] = ["GEMINI_API_KEY", "API_KEY"];

const DEFAULT_PORT: u16 = 3000;

/// Settings needed to open chat sessions. Absent credential means no sessions at all.
#[derive(Debug, Clone)]
pub struct ChatConfig {
    pub api_key: String,
    pub base_url: Option<String>,
    pub default_model: GeminiModel,
    pub generation: GenerationConfig,
}

impl ChatConfig {
    pub fn from_env() -> Result<Self, AppError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, AppError> {
        let api_key = API_KEY_VARS
            .iter()
            .filter_map(|var| lookup(var))
            .map(|v| v.trim().to_string())
            .find(|v| !v.is_empty())
            .ok_or_else(|| AppError::MissingCredential { var: API_KEY_VARS[0].to_string() })?;

        let base_url = lookup("GEMINI_BASE_URL")
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty());

        let default_model = match lookup("GEMINI_MODEL").filter(|v| !v.trim().is_empty()) {
            Some(raw) => raw.parse::<GeminiModel>().map_err(|_| AppError::InvalidConfig {
                key: "GEMINI_MODEL".to_string(),
                message: format!("'{raw}' is not a supported model"),
            })?,
            None => GeminiModel::default(),
        };

        Ok(Self {
            api_key,
            base_url,
            default_model,
            generation: GenerationConfig::default(),
        })
    }
}

/// Settings for the HTTP listener; always available.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerConfig {
    pub port: u16,
    pub static_dir: Option<PathBuf>,
}

impl ServerConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let port = lookup("PORT")
            .and_then(|p| p.trim().parse().ok())
            .unwrap_or(DEFAULT_PORT);
        let static_dir = lookup("FRONTEND_DIST")
            .filter(|v| !v.trim().is_empty())
            .map(PathBuf::from);
        Self { port, static_dir }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> =
            pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn missing_credential_is_a_configuration_error() {
        let err = ChatConfig::from_lookup(env(&[])).unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("GEMINI_API_KEY"));

        let err = ChatConfig::from_lookup(env(&[("GEMINI_API_KEY", "   ")])).unwrap_err();
        assert!(matches!(err, AppError::MissingCredential { .. }));
    }

    #[test]
    fn falls_back_to_generic_api_key() {
        let cfg = ChatConfig::from_lookup(env(&[("API_KEY", "secret")])).unwrap();
        assert_eq!(cfg.api_key, "secret");
        assert_eq!(cfg.default_model, GeminiModel::Flash);
        assert_eq!(cfg.generation.top_k, 40);
        assert!(cfg.base_url.is_none());
    }

    #[test]
    fn rejects_unknown_default_model() {
        let err = ChatConfig::from_lookup(env(&[
            ("GEMINI_API_KEY", "k"),
            ("GEMINI_MODEL", "not-a-model"),
        ]))
        .unwrap_err();
        assert!(matches!(err, AppError::InvalidConfig { .. }));

        let cfg = ChatConfig::from_lookup(env(&[
            ("GEMINI_API_KEY", "k"),
            ("GEMINI_MODEL", "gemini-3-pro-preview"),
        ]))
        .unwrap();
        assert_eq!(cfg.default_model, GeminiModel::Pro);
    }

    #[test]
    fn server_defaults() {
        let cfg = ServerConfig::from_lookup(env(&[("PORT", "nope")]));
        assert_eq!(cfg, ServerConfig { port: 3000, static_dir: None });

        let cfg = ServerConfig::from_lookup(env(&[("PORT", "8081"), ("FRONTEND_DIST", "dist")]));
        assert_eq!(cfg.port, 8081);
        assert_eq!(cfg.static_dir, Some(PathBuf::from("dist")));
    }
}
