use serde::{Deserialize, Serialize};
use thiserror::Error;

use stockroom_core::UserId;

/// An authenticated identity (the acting user).
///
/// Every owned record is written with `user_id` as its owner, so the identity
/// doubles as the provenance of each write.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Identity {
    user_id: UserId,
    email: Option<String>,
}

impl Identity {
    pub fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            email: None,
        }
    }

    pub fn with_email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub fn user_id(&self) -> UserId {
        self.user_id
    }

    pub fn email(&self) -> Option<&str> {
        self.email.as_deref()
    }
}

#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum AuthError {
    #[error("not authenticated")]
    NotAuthenticated,
}

/// Source of the current authenticated identity.
///
/// Implementations answer "who is acting right now", or `None` when nobody is
/// signed in. Callers must fail closed on `None`.
pub trait IdentityProvider: Send + Sync {
    fn current_identity(&self) -> Option<Identity>;
}

impl IdentityProvider for Identity {
    fn current_identity(&self) -> Option<Identity> {
        Some(self.clone())
    }
}

impl IdentityProvider for Option<Identity> {
    fn current_identity(&self) -> Option<Identity> {
        self.clone()
    }
}

impl<P> IdentityProvider for std::sync::Arc<P>
where
    P: IdentityProvider + ?Sized,
{
    fn current_identity(&self) -> Option<Identity> {
        (**self).current_identity()
    }
}

/// Provider for unauthenticated callers.
#[derive(Debug, Default, Clone, Copy)]
pub struct Anonymous;

impl IdentityProvider for Anonymous {
    fn current_identity(&self) -> Option<Identity> {
        None
    }
}

/// Resolve the acting identity or fail closed.
pub fn require_identity(provider: &dyn IdentityProvider) -> Result<Identity, AuthError> {
    provider
        .current_identity()
        .ok_or(AuthError::NotAuthenticated)
}
