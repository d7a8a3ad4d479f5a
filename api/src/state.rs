//! API State Management

use credit_ledger::{Economy, GuestCreditPool};
use dashmap::DashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use crate::{ApiError, ApiResult};

/// Guest sessions untouched for this long are dropped
pub const DEFAULT_GUEST_IDLE_TIMEOUT: Duration = Duration::from_secs(30 * 60);

/// A guest's credit pool and when it last sent a message
#[derive(Debug)]
pub struct GuestSession {
    pub pool: GuestCreditPool,
    last_used: Instant,
}

impl GuestSession {
    pub fn new() -> Self {
        Self {
            pool: GuestCreditPool::seeded(),
            last_used: Instant::now(),
        }
    }

    pub fn touch(&mut self) {
        self.last_used = Instant::now();
    }

    pub fn is_idle(&self, timeout: Duration) -> bool {
        self.last_used.elapsed() >= timeout
    }
}

impl Default for GuestSession {
    fn default() -> Self {
        Self::new()
    }
}

/// Guest chat sessions keyed by an opaque session id
pub type GuestSessions = Arc<DashMap<String, Arc<Mutex<GuestSession>>>>;

#[derive(Clone)]
pub struct ApiState {
    pub economy: Economy,
    pub guest_sessions: GuestSessions,
    pub start_time: std::time::Instant,
    pub admin_token: Option<String>,
    pub guest_idle_timeout: Duration,
}

impl ApiState {
    pub fn new(economy: Economy, admin_token: Option<String>) -> Self {
        Self {
            economy,
            guest_sessions: Arc::new(DashMap::new()),
            start_time: std::time::Instant::now(),
            admin_token,
            guest_idle_timeout: DEFAULT_GUEST_IDLE_TIMEOUT,
        }
    }

    pub fn with_guest_idle_timeout(mut self, timeout: Duration) -> Self {
        self.guest_idle_timeout = timeout;
        self
    }

    /// Check a `Bearer` token against the configured admin token.
    /// Admin routes are disabled when no token is configured.
    pub fn authorize_admin(&self, header: Option<&str>) -> ApiResult<()> {
        let Some(expected) = self.admin_token.as_deref() else {
            return Err(ApiError::Unauthorized("admin API disabled".to_string()));
        };
        match header.and_then(|h| h.strip_prefix("Bearer ")) {
            Some(token) if token == expected => Ok(()),
            Some(_) => {
                tracing::warn!("rejected admin request with wrong token");
                Err(ApiError::Unauthorized("invalid admin token".to_string()))
            }
            None => Err(ApiError::Unauthorized("missing admin token".to_string())),
        }
    }

    /// Live guest session by id. An idle session is dropped on access.
    pub async fn guest_session(&self, id: &str) -> ApiResult<Arc<Mutex<GuestSession>>> {
        let session = self
            .guest_sessions
            .get(id)
            .map(|entry| entry.clone())
            .ok_or_else(|| ApiError::NotFound(format!("guest session {}", id)))?;

        if session.lock().await.is_idle(self.guest_idle_timeout) {
            self.guest_sessions.remove(id);
            tracing::debug!("guest session {} expired", id);
            return Err(ApiError::NotFound(format!("guest session {}", id)));
        }
        Ok(session)
    }

    /// Register a session after its first message went through
    pub fn open_guest_session(&self, session: GuestSession) -> String {
        let id = uuid::Uuid::new_v4().to_string();
        self.guest_sessions
            .insert(id.clone(), Arc::new(Mutex::new(session)));
        tracing::debug!("opened guest session {}", id);
        id
    }

    /// Drop idle guest sessions; returns how many were removed.
    /// Sessions busy with a request are kept.
    pub fn evict_idle_guest_sessions(&self) -> usize {
        let before = self.guest_sessions.len();
        let timeout = self.guest_idle_timeout;
        self.guest_sessions.retain(|_, session| match session.try_lock() {
            Ok(session) => !session.is_idle(timeout),
            Err(_) => true,
        });
        let evicted = before.saturating_sub(self.guest_sessions.len());
        if evicted > 0 {
            tracing::info!("evicted {} idle guest sessions", evicted);
        }
        evicted
    }

    pub fn spawn_guest_sweeper(&self, every: Duration) -> JoinHandle<()> {
        let state = self.clone();
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            loop {
                ticker.tick().await;
                state.evict_idle_guest_sessions();
            }
        })
    }
}
