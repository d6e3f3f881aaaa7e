//! User-level settings stored by the backend.
//!
//! Field names match the backend's config keys on the wire. These are
//! consumed by onboarding and the assistant pane; the session engine itself
//! never reads them.

use serde::{Deserialize, Serialize};

/// Key/value user configuration held by the backend process.
///
/// All fields are optional: a partial value sent to the backend updates only
/// the keys that are present.
#[derive(Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai_api_base: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai_api_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai_api_model: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub full_name: Option<String>,
}

impl UserConfig {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.openai_api_base.is_none()
            && self.openai_api_key.is_none()
            && self.openai_api_model.is_none()
            && self.full_name.is_none()
    }
}

// Manual Debug impl to prevent leaking the credential in logs.
impl std::fmt::Debug for UserConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn mask(opt: Option<&String>) -> &'static str {
            if opt.is_some() { "[REDACTED]" } else { "None" }
        }
        f.debug_struct("UserConfig")
            .field("openai_api_base", &self.openai_api_base)
            .field("openai_api_key", &mask(self.openai_api_key.as_ref()))
            .field("openai_api_model", &self.openai_api_model)
            .field("full_name", &self.full_name)
            .finish()
    }
}
