use serde::{Deserialize, Serialize};

/// Runtime switches for one engine instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    /// Save every answer through the backend before advancing. When off,
    /// answers only reach the backend with the completion call.
    pub persist_answers: bool,
    /// The user is signed in: `requireLogin` quizzes may start and
    /// `requiredLogin` steps are skipped.
    pub authenticated: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            persist_answers: true,
            authenticated: false,
        }
    }
}

impl EngineConfig {
    pub fn from_json(raw: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(raw)
    }

    pub fn authenticated(mut self, authenticated: bool) -> Self {
        self.authenticated = authenticated;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config = EngineConfig::from_json(r#"{ "authenticated": true }"#).expect("config");
        assert!(config.persist_answers);
        assert!(config.authenticated);
        assert_eq!(EngineConfig::from_json("{}").expect("config"), EngineConfig::default());
    }
}
