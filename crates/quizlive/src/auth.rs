//! Authentication hook for the handshake.
//!
//! Quizlive doesn't manage accounts. The embedding application implements
//! [`Authenticator`] over whatever it uses (JWT, session cookies, an auth
//! service) and the server calls it once per connection, during the
//! handshake. Connections without a token stay anonymous: they may join
//! open rooms but can't host.

use quizlive_protocol::UserId;

/// Who a token belongs to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: UserId,
    pub display_name: String,
}

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// The token was invalid, expired, or otherwise refused.
    #[error("authentication failed: {0}")]
    Rejected(String),
}

/// Validates a client's token and returns their identity.
///
/// # Example
///
/// ```rust
/// use quizlive::{AuthError, Authenticator, Identity};
/// use quizlive_protocol::UserId;
///
/// struct ApiKeys;
///
/// impl Authenticator for ApiKeys {
///     async fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
///         match token {
///             "k-frizzle" => Ok(Identity {
///                 user_id: UserId("frizzle".into()),
///                 display_name: "Ms. Frizzle".into(),
///             }),
///             _ => Err(AuthError::Rejected("unknown key".into())),
///         }
///     }
/// }
/// ```
pub trait Authenticator: Send + Sync + 'static {
    /// Called when a handshake carries a token.
    fn authenticate(
        &self,
        token: &str,
    ) -> impl std::future::Future<Output = Result<Identity, AuthError>> + Send;
}

/// Trusts the token as the user id. For demos and tests only.
#[derive(Debug, Clone, Copy, Default)]
pub struct TrustedTokenAuth;

impl Authenticator for TrustedTokenAuth {
    async fn authenticate(&self, token: &str) -> Result<Identity, AuthError> {
        let token = token.trim();
        if token.is_empty() {
            return Err(AuthError::Rejected("empty token".into()));
        }
        Ok(Identity {
            user_id: UserId(token.to_string()),
            display_name: token.to_string(),
        })
    }
}
