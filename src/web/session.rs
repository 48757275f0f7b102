use std::net::SocketAddr;

use dashmap::DashMap;
use rand::distributions::Alphanumeric;
use rand::Rng;

/// Cookie carrying the session token.
pub const SESSION_COOKIE: &str = "session";

const TOKEN_LEN: usize = 48;

/// An authenticated identity attached to a session cookie.
#[derive(Debug, Clone)]
pub struct SessionUser {
    pub snowflake: String,
    pub username: String,
    pub avatar_url: String,

    /// OAuth bearer token, used to re-derive guild membership on fetch
    pub access_token: String,
}

/// What a request arrives with before any gate runs: the session user, if
/// the cookie resolved to one, and the peer address for audit logging.
#[derive(Debug, Clone)]
pub struct RequestIdentity {
    pub user: Option<SessionUser>,
    pub remote: Option<SocketAddr>,
}

/// In-memory session registry keyed by opaque cookie token.
#[derive(Default)]
pub struct SessionStore {
    sessions: DashMap<String, SessionUser>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a freshly authenticated user and returns the cookie token.
    pub fn create(&self, user: SessionUser) -> String {
        let token: String = rand::thread_rng()
            .sample_iter(&Alphanumeric)
            .take(TOKEN_LEN)
            .map(char::from)
            .collect();

        self.sessions.insert(token.clone(), user);
        token
    }

    pub fn get(&self, token: &str) -> Option<SessionUser> {
        self.sessions.get(token).map(|entry| entry.value().clone())
    }
}
