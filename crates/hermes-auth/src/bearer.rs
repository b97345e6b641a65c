//! HMAC-signed bearer tokens.
//!
//! Tokens have the compact `header.claims.signature` shape, each part
//! base64url without padding. Only HS256 is accepted.
//!
//! Tokens come in two kinds. Access tokens authenticate requests. Refresh
//! tokens carry a `refresh` claim, live longer, and are only good for
//! minting a new pair through [`BearerTokenProvider::refresh`].

use async_trait::async_trait;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use chrono::{DateTime, Duration, TimeZone, Utc};
use hermes_core::{Identity, Request};
use hmac::{Hmac, Mac};
use http::header::AUTHORIZATION;
use serde::{Deserialize, Serialize};
use sha2::Sha256;

use crate::error::{AuthFailure, AuthSetupError};
use crate::provider::{AuthOutcome, AuthProvider};

type HmacSha256 = Hmac<Sha256>;

/// Minimum signing secret length in bytes.
pub const MIN_SECRET_LEN: usize = 32;

const ALGORITHM: &str = "HS256";

/// Settings for [`BearerTokenProvider`].
#[derive(Clone)]
pub struct BearerConfig {
    /// Expected `iss` claim.
    pub issuer: String,
    /// HMAC key.
    pub secret: Vec<u8>,
    /// Lifetime of tokens minted by [`BearerTokenProvider::issue`].
    pub access_ttl: Duration,
    /// Lifetime of refresh tokens minted by [`BearerTokenProvider::issue_pair`].
    pub refresh_ttl: Duration,
    /// Clock skew tolerated when checking `exp`.
    pub leeway: Duration,
}

impl std::fmt::Debug for BearerConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BearerConfig")
            .field("issuer", &self.issuer)
            .field("secret", &"<redacted>")
            .field("access_ttl", &self.access_ttl)
            .field("refresh_ttl", &self.refresh_ttl)
            .field("leeway", &self.leeway)
            .finish()
    }
}

impl BearerConfig {
    /// 15 minute access tokens, 7 day refresh tokens, no leeway.
    #[must_use]
    pub fn new(issuer: impl Into<String>, secret: impl Into<Vec<u8>>) -> Self {
        Self {
            issuer: issuer.into(),
            secret: secret.into(),
            access_ttl: Duration::minutes(15),
            refresh_ttl: Duration::days(7),
            leeway: Duration::zero(),
        }
    }

    /// Sets the token lifetime.
    #[must_use]
    pub fn with_access_ttl(mut self, ttl: Duration) -> Self {
        self.access_ttl = ttl;
        self
    }

    /// Sets the refresh token lifetime.
    #[must_use]
    pub fn with_refresh_ttl(mut self, ttl: Duration) -> Self {
        self.refresh_ttl = ttl;
        self
    }

    /// Sets the expiry leeway.
    #[must_use]
    pub fn with_leeway(mut self, leeway: Duration) -> Self {
        self.leeway = leeway;
        self
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct Header {
    alg: String,
    typ: String,
}

/// Claims carried by a bearer token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    /// Principal.
    pub sub: String,
    /// Granted scopes.
    #[serde(default)]
    pub scopes: Vec<String>,
    /// Issued at, seconds since the epoch.
    pub iat: i64,
    /// Expires at, seconds since the epoch.
    pub exp: i64,
    /// Issuer.
    pub iss: String,
    /// Marks a refresh token.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub refresh: bool,
}

/// An access token with the refresh token that renews it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenPair {
    /// Authenticates requests.
    pub access_token: String,
    /// Access token lifetime in seconds.
    pub expires_in: i64,
    /// Exchanged for a new pair once the access token expires.
    pub refresh_token: String,
    /// Refresh token lifetime in seconds.
    pub refresh_expires_in: i64,
}

/// Authenticates `Authorization: Bearer <token>` headers.
///
/// # Example
///
/// ```
/// use hermes_auth::{BearerConfig, BearerTokenProvider};
///
/// let provider = BearerTokenProvider::new(BearerConfig::new("hermes", vec![42u8; 32])).unwrap();
/// let token = provider.issue("node-agent", &["nodes:read"]).unwrap();
/// let claims = provider.verify(&token).unwrap();
/// assert_eq!(claims.sub, "node-agent");
/// ```
#[derive(Debug, Clone)]
pub struct BearerTokenProvider {
    config: BearerConfig,
}

impl BearerTokenProvider {
    /// Provider name used in route policies.
    pub const NAME: &'static str = "bearer";

    /// Creates the provider. Rejects secrets shorter than [`MIN_SECRET_LEN`].
    pub fn new(config: BearerConfig) -> Result<Self, AuthSetupError> {
        if config.secret.len() < MIN_SECRET_LEN {
            return Err(AuthSetupError::WeakSecret {
                min: MIN_SECRET_LEN,
                actual: config.secret.len(),
            });
        }
        Ok(Self { config })
    }

    /// Mints a token for `principal`, valid from now.
    pub fn issue(&self, principal: &str, scopes: &[&str]) -> Result<String, AuthSetupError> {
        self.issue_at(principal, scopes, Utc::now())
    }

    /// Mints a token as if issued at `now`.
    pub fn issue_at(
        &self,
        principal: &str,
        scopes: &[&str],
        now: DateTime<Utc>,
    ) -> Result<String, AuthSetupError> {
        let scopes = scopes.iter().map(|s| (*s).to_string()).collect();
        self.sign(&self.claims(principal, scopes, now, false))
    }

    /// Mints an access token and a refresh token for `principal`.
    pub fn issue_pair(&self, principal: &str, scopes: &[&str]) -> Result<TokenPair, AuthSetupError> {
        let scopes = scopes.iter().map(|s| (*s).to_string()).collect();
        self.issue_pair_at(principal, scopes, Utc::now())
    }

    /// Mints a pair as if issued at `now`.
    pub fn issue_pair_at(
        &self,
        principal: &str,
        scopes: Vec<String>,
        now: DateTime<Utc>,
    ) -> Result<TokenPair, AuthSetupError> {
        let access = self.claims(principal, scopes.clone(), now, false);
        let refresh = self.claims(principal, scopes, now, true);
        Ok(TokenPair {
            access_token: self.sign(&access)?,
            expires_in: self.config.access_ttl.num_seconds(),
            refresh_token: self.sign(&refresh)?,
            refresh_expires_in: self.config.refresh_ttl.num_seconds(),
        })
    }

    /// Exchanges a refresh token for a new pair with the same principal and
    /// scopes.
    pub fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AuthFailure> {
        self.refresh_at(refresh_token, Utc::now())
    }

    /// Exchanges a refresh token as of `now`.
    pub fn refresh_at(&self, refresh_token: &str, now: DateTime<Utc>) -> Result<TokenPair, AuthFailure> {
        let claims = self.decode_at(refresh_token, now)?;
        if !claims.refresh {
            return Err(AuthFailure::NotARefreshToken);
        }
        self.issue_pair_at(&claims.sub, claims.scopes, now)
            .map_err(|e| AuthFailure::Backend(e.to_string()))
    }

    fn claims(&self, principal: &str, scopes: Vec<String>, now: DateTime<Utc>, refresh: bool) -> Claims {
        let ttl = if refresh {
            self.config.refresh_ttl
        } else {
            self.config.access_ttl
        };
        Claims {
            sub: principal.to_string(),
            scopes,
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            iss: self.config.issuer.clone(),
            refresh,
        }
    }

    fn sign(&self, claims: &Claims) -> Result<String, AuthSetupError> {
        let header = Header {
            alg: ALGORITHM.to_string(),
            typ: "JWT".to_string(),
        };

        let header = serde_json::to_vec(&header).map_err(|e| AuthSetupError::Issue(e.to_string()))?;
        let claims = serde_json::to_vec(claims).map_err(|e| AuthSetupError::Issue(e.to_string()))?;
        let signing_input = format!(
            "{}.{}",
            URL_SAFE_NO_PAD.encode(header),
            URL_SAFE_NO_PAD.encode(claims)
        );
        let signature = self.mac()?.chain_update(signing_input.as_bytes()).finalize();
        Ok(format!(
            "{signing_input}.{}",
            URL_SAFE_NO_PAD.encode(signature.into_bytes())
        ))
    }

    /// Verifies a token against the current time.
    pub fn verify(&self, token: &str) -> Result<Claims, AuthFailure> {
        self.verify_at(token, Utc::now())
    }

    /// Verifies an access token as of `now`. Refresh tokens are refused.
    pub fn verify_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthFailure> {
        let claims = self.decode_at(token, now)?;
        if claims.refresh {
            return Err(AuthFailure::RefreshTokenNotAccepted);
        }
        Ok(claims)
    }

    /// Checks signature, algorithm, issuer and expiry of either kind of token.
    ///
    /// The signature is checked before anything in the payload is trusted.
    fn decode_at(&self, token: &str, now: DateTime<Utc>) -> Result<Claims, AuthFailure> {
        let mut parts = token.split('.');
        let (Some(header), Some(claims), Some(signature), None) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            return Err(AuthFailure::MalformedToken("expected three segments".into()));
        };

        let signature = decode_segment(signature)?;
        let signing_input_len = header.len() + 1 + claims.len();
        let mac = self
            .mac()
            .map_err(|e| AuthFailure::Backend(e.to_string()))?
            .chain_update(&token.as_bytes()[..signing_input_len]);
        mac.verify_slice(&signature)
            .map_err(|_| AuthFailure::InvalidSignature)?;

        let header: Header = serde_json::from_slice(&decode_segment(header)?)
            .map_err(|e| AuthFailure::MalformedToken(e.to_string()))?;
        if header.alg != ALGORITHM {
            return Err(AuthFailure::UnsupportedAlgorithm(header.alg));
        }

        let claims: Claims = serde_json::from_slice(&decode_segment(claims)?)
            .map_err(|e| AuthFailure::MalformedToken(e.to_string()))?;
        if claims.iss != self.config.issuer {
            return Err(AuthFailure::UntrustedIssuer(claims.iss));
        }
        if now.timestamp() >= claims.exp + self.config.leeway.num_seconds() {
            return Err(AuthFailure::TokenExpired);
        }
        Ok(claims)
    }

    fn mac(&self) -> Result<HmacSha256, AuthSetupError> {
        HmacSha256::new_from_slice(&self.config.secret).map_err(|e| AuthSetupError::Issue(e.to_string()))
    }

    fn identity(claims: Claims) -> Identity {
        let identity = Identity::new(claims.sub, Self::NAME).with_scopes(claims.scopes);
        match Utc.timestamp_opt(claims.exp, 0).single() {
            Some(expires_at) => identity.with_expiry(expires_at),
            None => identity,
        }
    }
}

fn decode_segment(segment: &str) -> Result<Vec<u8>, AuthFailure> {
    URL_SAFE_NO_PAD
        .decode(segment)
        .map_err(|e| AuthFailure::MalformedToken(e.to_string()))
}

/// Extracts the token from an `Authorization: Bearer` header.
///
/// The scheme is case-insensitive.
fn bearer_token(request: &Request) -> Option<&str> {
    let value = request.header(AUTHORIZATION)?;
    let (scheme, token) = value.split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("bearer") {
        return None;
    }
    let token = token.trim();
    (!token.is_empty()).then_some(token)
}

fn is_token_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.')
}

#[async_trait]
impl AuthProvider for BearerTokenProvider {
    fn name(&self) -> &str {
        Self::NAME
    }

    async fn authenticate(&self, request: &Request) -> AuthOutcome {
        let Some(token) = bearer_token(request) else {
            return AuthOutcome::Absent;
        };
        if !token.chars().all(is_token_char) {
            return AuthOutcome::Rejected(AuthFailure::MalformedToken(
                "invalid characters".into(),
            ));
        }
        match self.verify(token) {
            Ok(claims) => AuthOutcome::Authenticated(Self::identity(claims)),
            Err(failure) => AuthOutcome::Rejected(failure),
        }
    }

    fn challenge(&self) -> Option<String> {
        Some(format!("Bearer realm=\"{}\"", self.config.issuer))
    }
}
