//! Session Management
//!
//! Per-connection player context and the registry that hands it out.
//! A session is created on first contact and mutated in place by the
//! handshake and by position updates. It is removed when the connection
//! closes.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::fmt;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};

/// Unique session identifier.
pub type SessionId = [u8; 16];

/// Stable player identity derived from the account email.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PlayerUid(pub [u8; 16]);

impl PlayerUid {
    /// Create from raw bytes.
    pub const fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Convert to UUID string.
    pub fn to_uuid_string(&self) -> String {
        uuid::Uuid::from_bytes(self.0).to_string()
    }

    /// Get raw bytes.
    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for PlayerUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PlayerUid({})", hex::encode(&self.0[..4]))
    }
}

/// Last reported geographic position.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Position {
    /// Degrees north.
    pub latitude: f64,
    /// Degrees east.
    pub longitude: f64,
}

impl Position {
    /// Create a new position.
    pub const fn new(latitude: f64, longitude: f64) -> Self {
        Self { latitude, longitude }
    }
}

/// Mutable per-connection player state.
#[derive(Debug, Clone)]
pub struct Player {
    /// Derived identity, set by a successful google handshake.
    pub uid: Option<PlayerUid>,
    /// Account email.
    pub email: Option<String>,
    /// Whether the provider reported the email as verified.
    pub email_verified: bool,
    /// One-way flag, flipped by the handshake.
    pub authenticated: bool,
    /// Last known position.
    pub position: Position,
    /// Team affiliation (0 = none).
    pub team: i32,
    /// Premium currency balance.
    pub pokecoins: i32,
    /// Stardust balance.
    pub stardust: i32,
    /// When the player context was created.
    pub created_at: DateTime<Utc>,
}

impl Player {
    /// Fresh, unauthenticated player.
    pub fn new() -> Self {
        Self {
            uid: None,
            email: None,
            email_verified: false,
            authenticated: false,
            position: Position::default(),
            team: 0,
            pokecoins: 0,
            stardust: 0,
            created_at: Utc::now(),
        }
    }

    /// Display name: the local part of the email, or "trainer".
    pub fn username(&self) -> String {
        self.email
            .as_deref()
            .and_then(|email| email.split('@').next())
            .filter(|local| !local.is_empty())
            .unwrap_or("trainer")
            .to_string()
    }

    /// Authenticated but not yet allowed to make requests.
    pub fn awaiting_verification(&self) -> bool {
        self.authenticated && !self.email_verified
    }

    /// Store a new position.
    pub fn update_position(&mut self, position: Position) {
        self.position = position;
    }
}

impl Default for Player {
    fn default() -> Self {
        Self::new()
    }
}

/// A connection's session.
#[derive(Debug)]
pub struct Session {
    /// Unique session identifier.
    pub id: SessionId,
    /// Remote address the session is bound to.
    pub peer: SocketAddr,
    /// Player context.
    pub player: Player,
}

// =============================================================================
// SESSION MANAGER
// =============================================================================

/// Manages all active sessions.
///
/// Each session sits behind its own mutex; holding it for the length of a
/// call is what serializes envelope processing per session.
pub struct SessionManager {
    sessions: RwLock<BTreeMap<SocketAddr, Arc<Mutex<Session>>>>,
}

impl SessionManager {
    /// Create new session manager.
    pub fn new() -> Self {
        Self {
            sessions: RwLock::new(BTreeMap::new()),
        }
    }

    /// Look up the session for a peer, creating it on first contact.
    pub async fn get_or_create(&self, peer: SocketAddr) -> Arc<Mutex<Session>> {
        if let Some(session) = self.sessions.read().await.get(&peer) {
            return session.clone();
        }

        let mut sessions = self.sessions.write().await;
        sessions
            .entry(peer)
            .or_insert_with(|| {
                Arc::new(Mutex::new(Session {
                    id: uuid::Uuid::new_v4().into_bytes(),
                    peer,
                    player: Player::new(),
                }))
            })
            .clone()
    }

    /// Remove a session.
    pub async fn remove(&self, peer: &SocketAddr) -> bool {
        self.sessions.write().await.remove(peer).is_some()
    }

    /// Get active session count.
    pub async fn session_count(&self) -> usize {
        self.sessions.read().await.len()
    }

    /// Count sessions that completed the handshake.
    pub async fn authenticated_count(&self) -> usize {
        let sessions: Vec<_> = self.sessions.read().await.values().cloned().collect();
        let mut count = 0;
        for session in sessions {
            if session.lock().await.player.authenticated {
                count += 1;
            }
        }
        count
    }
}

impl Default for SessionManager {
    fn default() -> Self {
        Self::new()
    }
}
