//! Authentication errors.

use thiserror::Error;

/// Why a provider rejected the credentials it found.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthFailure {
    /// The token is not well formed.
    #[error("malformed token: {0}")]
    MalformedToken(String),

    /// The signature does not verify.
    #[error("token signature is invalid")]
    InvalidSignature,

    /// The token was signed with an unsupported algorithm.
    #[error("unsupported token algorithm {0}")]
    UnsupportedAlgorithm(String),

    /// The token was issued by someone else.
    #[error("token issuer {0} is not trusted")]
    UntrustedIssuer(String),

    /// The token has expired.
    #[error("token expired")]
    TokenExpired,

    /// A refresh token was presented where an access token is required.
    #[error("refresh tokens cannot authenticate requests")]
    RefreshTokenNotAccepted,

    /// An access token was presented where a refresh token is required.
    #[error("not a refresh token")]
    NotARefreshToken,

    /// Username or password did not match.
    #[error("invalid username or password")]
    InvalidCredentials,

    /// No ticket with this id exists.
    #[error("unknown ticket")]
    UnknownTicket,

    /// The ticket's lifetime has passed.
    #[error("ticket expired")]
    TicketExpired,

    /// The ticket was already redeemed.
    #[error("ticket already consumed")]
    TicketConsumed,

    /// The credential store failed.
    #[error("credential store unavailable: {0}")]
    Backend(String),
}

/// Misconfiguration detected while building providers.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AuthSetupError {
    /// The signing secret is too short.
    #[error("signing secret must be at least {min} bytes, got {actual}")]
    WeakSecret {
        /// Minimum accepted length.
        min: usize,
        /// Length supplied.
        actual: usize,
    },

    /// Two providers share a name.
    #[error("auth provider {0} is registered twice")]
    DuplicateProvider(String),

    /// A route names a provider nobody registered.
    #[error("unknown auth provider {0}")]
    UnknownProvider(String),

    /// Token minting failed.
    #[error("failed to issue token: {0}")]
    Issue(String),
}
