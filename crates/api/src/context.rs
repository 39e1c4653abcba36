use stockroom_auth::{Identity, IdentityProvider};
use stockroom_core::UserId;

/// The signed-in user for a request.
///
/// Inserted by the auth middleware; every domain route requires it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserContext {
    identity: Identity,
}

impl UserContext {
    pub fn new(identity: Identity) -> Self {
        Self { identity }
    }

    pub fn user_id(&self) -> UserId {
        self.identity.user_id()
    }

    pub fn email(&self) -> Option<&str> {
        self.identity.email()
    }
}

impl IdentityProvider for UserContext {
    fn current_identity(&self) -> Option<Identity> {
        Some(self.identity.clone())
    }
}
