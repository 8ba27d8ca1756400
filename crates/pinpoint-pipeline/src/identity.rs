//! Caller identity.

use pinpoint_models::AuthorId;

use crate::config::PipelineConfig;

/// Supplies the authenticated author, if any.
pub trait IdentityProvider: Send + Sync {
    fn current_author(&self) -> Option<AuthorId>;
}

/// A fixed identity, typically read from configuration.
#[derive(Debug, Clone, Default)]
pub struct StaticIdentity {
    author: Option<AuthorId>,
}

impl StaticIdentity {
    pub fn signed_in(author: AuthorId) -> Self {
        Self {
            author: Some(author),
        }
    }

    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn from_config(config: &PipelineConfig) -> Self {
        Self {
            author: config.author_id.clone().map(AuthorId::new),
        }
    }
}

impl IdentityProvider for StaticIdentity {
    fn current_author(&self) -> Option<AuthorId> {
        self.author.clone()
    }
}
