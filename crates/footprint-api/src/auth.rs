// Authentication strategies and shared session state
//
// Credentials say *how* to authenticate; `Session` holds what the service
// handed back (bearer access token + anti-forgery token). Every outgoing
// request reads the session, the login flow and the response observer
// write it. Reads never block: the tokens live in one `ArcSwap` snapshot
// so a request always sees a consistent access/XSRF pair.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use arc_swap::ArcSwap;
use secrecy::SecretString;
use tracing::trace;

/// Which authentication strategy a client uses.
///
/// Marker enum (no data) -- the actual credentials live in [`Credentials`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthStrategy {
    /// Username/password exchanged for a session cookie + bearer token.
    Session,
    /// Static API key sent as a header on every request.
    ApiKey,
}

/// Credentials for authenticating with the service.
#[derive(Debug, Clone)]
pub enum Credentials {
    /// Session login. `login()` trades these for an access token.
    Password {
        username: String,
        password: SecretString,
    },

    /// Static key sent in the `FootprintApiKey` header. No login round-trip.
    ApiKey { key: SecretString },
}

impl Credentials {
    pub fn strategy(&self) -> AuthStrategy {
        match self {
            Self::Password { .. } => AuthStrategy::Session,
            Self::ApiKey { .. } => AuthStrategy::ApiKey,
        }
    }
}

/// One consistent view of the session tokens.
#[derive(Debug, Clone, Default)]
pub struct SessionTokens {
    /// Bearer token from the login response body.
    pub access: Option<SecretString>,
    /// Anti-forgery token from the `XSRF-TOKEN` cookie.
    pub xsrf: Option<String>,
}

/// Mutable session state shared by every request a client makes.
///
/// Owned by the HTTP client and handed to the request-signing step by
/// reference. The generation counter bumps on every successful login, which
/// lets observers tell whether a re-login already happened since they last
/// looked.
#[derive(Debug)]
pub struct Session {
    tokens: ArcSwap<SessionTokens>,
    generation: AtomicU64,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            tokens: ArcSwap::from_pointee(SessionTokens::default()),
            generation: AtomicU64::new(0),
        }
    }
}

impl Session {
    /// Current token snapshot (cheap `Arc` clone).
    pub fn tokens(&self) -> Arc<SessionTokens> {
        self.tokens.load_full()
    }

    pub fn access_token(&self) -> Option<SecretString> {
        self.tokens.load().access.clone()
    }

    pub fn xsrf_token(&self) -> Option<String> {
        self.tokens.load().xsrf.clone()
    }

    /// Number of completed logins.
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::Acquire)
    }

    /// Overwrite the stored access token, keeping the XSRF token.
    ///
    /// Used when a token is issued out-of-band; a stale value here is
    /// recovered by the next 401 and re-login.
    pub fn replace_access_token(&self, token: SecretString) {
        self.tokens.rcu(|current| SessionTokens {
            access: Some(token.clone()),
            xsrf: current.xsrf.clone(),
        });
    }

    /// Drop both tokens ahead of a fresh login.
    pub(crate) fn clear(&self) {
        self.tokens.store(Arc::new(SessionTokens::default()));
    }

    /// Install the tokens from a successful login.
    pub(crate) fn establish(&self, access: Option<SecretString>, xsrf: Option<String>) {
        self.tokens.store(Arc::new(SessionTokens { access, xsrf }));
        self.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Record a rotated anti-forgery token seen on any response.
    pub(crate) fn rotate_xsrf(&self, token: &str) {
        let current = self.tokens.load();
        if current.xsrf.as_deref() == Some(token) {
            return;
        }
        trace!("XSRF token rotated");
        self.tokens.rcu(|current| SessionTokens {
            access: current.access.clone(),
            xsrf: Some(token.to_owned()),
        });
    }
}

#[cfg(test)]
mod tests {
    use secrecy::ExposeSecret;

    use super::*;

    #[test]
    fn establish_bumps_generation() {
        let session = Session::default();
        assert_eq!(session.generation(), 0);

        session.establish(Some(SecretString::from("tok".to_owned())), Some("x1".into()));
        assert_eq!(session.generation(), 1);
        assert_eq!(
            session.access_token().map(|t| t.expose_secret().to_owned()),
            Some("tok".into())
        );
        assert_eq!(session.xsrf_token().as_deref(), Some("x1"));
    }

    #[test]
    fn replacing_access_token_keeps_xsrf() {
        let session = Session::default();
        session.establish(Some(SecretString::from("good".to_owned())), Some("x1".into()));

        session.replace_access_token(SecretString::from("stale".to_owned()));

        let tokens = session.tokens();
        assert_eq!(tokens.access.as_ref().map(|t| t.expose_secret()), Some("stale"));
        assert_eq!(tokens.xsrf.as_deref(), Some("x1"));
        assert_eq!(session.generation(), 1);
    }

    #[test]
    fn rotation_and_clear() {
        let session = Session::default();
        session.rotate_xsrf("x2");
        assert_eq!(session.xsrf_token().as_deref(), Some("x2"));

        session.clear();
        assert!(session.xsrf_token().is_none());
        assert!(session.access_token().is_none());
    }

    #[test]
    fn strategy_follows_credentials() {
        let creds = Credentials::ApiKey {
            key: SecretString::from("k".to_owned()),
        };
        assert_eq!(creds.strategy(), AuthStrategy::ApiKey);
    }
}
