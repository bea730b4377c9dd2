use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::errors::CompletionError;

/// Which model tier a completion runs on.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelTier {
    /// Fast and inexpensive; used for think decisions and synthesis.
    Cheap,
    /// Used for anything the user will read.
    Quality,
}

impl std::fmt::Display for ModelTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Cheap => write!(f, "cheap"),
            Self::Quality => write!(f, "quality"),
        }
    }
}

impl std::str::FromStr for ModelTier {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "cheap" => Ok(Self::Cheap),
            "quality" => Ok(Self::Quality),
            other => Err(format!("unknown model tier: {other}")),
        }
    }
}

/// A single prompt sent to the completion service.
#[derive(Clone, Debug)]
pub struct CompletionRequest {
    pub tier: ModelTier,
    pub system: Option<String>,
    pub prompt: String,
    pub max_tokens: u32,
}

impl CompletionRequest {
    pub fn new(tier: ModelTier, prompt: impl Into<String>) -> Self {
        Self {
            tier,
            system: None,
            prompt: prompt.into(),
            max_tokens: 1024,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = Some(system.into());
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

/// Black-box text completion: prompt + tier in, text out.
#[async_trait]
pub trait CompletionService: Send + Sync {
    fn name(&self) -> &str;

    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_builder() {
        let req = CompletionRequest::new(ModelTier::Quality, "hello")
            .with_system("be brief")
            .with_max_tokens(2048);
        assert_eq!(req.tier, ModelTier::Quality);
        assert_eq!(req.system.as_deref(), Some("be brief"));
        assert_eq!(req.prompt, "hello");
        assert_eq!(req.max_tokens, 2048);
    }

    #[test]
    fn tier_parse_and_display() {
        for tier in [ModelTier::Cheap, ModelTier::Quality] {
            let parsed: ModelTier = tier.to_string().parse().unwrap();
            assert_eq!(parsed, tier);
        }
        assert!("premium".parse::<ModelTier>().is_err());
        assert_eq!(serde_json::to_string(&ModelTier::Cheap).unwrap(), "\"cheap\"");
    }
}
