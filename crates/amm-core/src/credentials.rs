//! Provider credentials and request authorization.
//!
//! Some model hosts need a token: Hugging Face takes an optional bearer
//! header, Civitai requires a `token` query parameter. The request is fully
//! formed here, before any job exists, so a missing mandatory token fails fast.

use std::collections::HashMap;

use crate::asset::HttpSource;
use crate::config::AmmConfig;
use crate::url_model::{host_matches, host_of};
use crate::AmmError;

pub trait CredentialProvider: Send + Sync {
    /// Token for `provider` (see `Provider::name`), if configured.
    fn token(&self, provider: &str) -> Option<String>;
}

/// Tokens from the `[tokens]` config table, optionally falling back to env vars.
#[derive(Debug, Clone, Default)]
pub struct ConfigCredentials {
    tokens: HashMap<String, String>,
    use_env: bool,
}

impl ConfigCredentials {
    /// Only the given tokens; the environment is ignored.
    pub fn new(tokens: HashMap<String, String>) -> Self {
        Self {
            tokens,
            use_env: false,
        }
    }

    /// Tokens from config, then `HF_TOKEN` / `CIVITAI_API_TOKEN`.
    pub fn from_config(cfg: &AmmConfig) -> Self {
        Self {
            tokens: cfg.tokens.clone(),
            use_env: true,
        }
    }
}

impl CredentialProvider for ConfigCredentials {
    fn token(&self, provider: &str) -> Option<String> {
        let configured = self
            .tokens
            .get(provider)
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty());
        if configured.is_some() || !self.use_env {
            return configured;
        }
        let var = Provider::from_name(provider)?.env_var();
        std::env::var(var).ok().filter(|t| !t.trim().is_empty())
    }
}

/// Known hosts with their own authentication scheme.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Provider {
    HuggingFace,
    Civitai,
}

impl Provider {
    pub fn for_url(url: &str) -> Option<Provider> {
        let host = host_of(url)?;
        if host_matches(&host, "huggingface.co") {
            Some(Provider::HuggingFace)
        } else if host_matches(&host, "civitai.com") {
            Some(Provider::Civitai)
        } else {
            None
        }
    }

    pub fn from_name(name: &str) -> Option<Provider> {
        match name {
            "huggingface" => Some(Provider::HuggingFace),
            "civitai" => Some(Provider::Civitai),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Provider::HuggingFace => "huggingface",
            Provider::Civitai => "civitai",
        }
    }

    fn env_var(self) -> &'static str {
        match self {
            Provider::HuggingFace => "HF_TOKEN",
            Provider::Civitai => "CIVITAI_API_TOKEN",
        }
    }

    /// Whether downloads from this provider fail without a token.
    pub fn requires_token(self) -> bool {
        matches!(self, Provider::Civitai)
    }
}

/// Final URL and headers for an HTTP transfer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PreparedRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
}

/// Builds the authorized request for `source`.
pub fn authorize(
    source: &HttpSource,
    credentials: &dyn CredentialProvider,
) -> Result<PreparedRequest, AmmError> {
    let mut prepared = PreparedRequest {
        url: source.url.clone(),
        headers: source.headers.clone(),
    };
    let Some(provider) = Provider::for_url(&source.url) else {
        return Ok(prepared);
    };
    let token = credentials.token(provider.name());
    match (provider, token) {
        (Provider::HuggingFace, Some(token)) => {
            prepared
                .headers
                .insert("Authorization".to_string(), format!("Bearer {}", token));
        }
        (Provider::Civitai, Some(token)) => {
            let mut url = url::Url::parse(&source.url)
                .map_err(|e| AmmError::precondition(format!("invalid URL {}: {}", source.url, e)))?;
            let others: Vec<(String, String)> = url
                .query_pairs()
                .filter(|(k, _)| k != "token")
                .map(|(k, v)| (k.into_owned(), v.into_owned()))
                .collect();
            url.query_pairs_mut()
                .clear()
                .extend_pairs(others)
                .append_pair("token", &token);
            prepared.url = url.into();
        }
        (p, None) if p.requires_token() => {
            return Err(AmmError::precondition(format!(
                "{} token required to download {}",
                p.name(),
                source.url
            )));
        }
        (_, None) => {}
    }
    Ok(prepared)
}
