//! Bearer-token sessions, kept in memory.

use std::future::{ready, Ready};
use std::time::{Duration, Instant};

use actix_web::dev::Payload;
use actix_web::http::header::AUTHORIZATION;
use actix_web::{web, FromRequest, HttpRequest};
use dashmap::DashMap;
use fi_core::error::AppError;
use uuid::Uuid;

use crate::error::ApiError;
use crate::handlers::AppState;

struct Session {
    user_id: Uuid,
    issued_at: Instant,
}

/// Maps opaque tokens to user ids. Sessions end on logout, after `ttl`, or
/// on restart.
pub struct SessionStore {
    tokens: DashMap<String, Session>,
    ttl: Duration,
}

impl SessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            tokens: DashMap::new(),
            ttl,
        }
    }

    /// Issues a token for `user_id`, dropping any sessions that have expired.
    pub fn create(&self, user_id: Uuid) -> String {
        self.tokens
            .retain(|_, session| session.issued_at.elapsed() < self.ttl);

        let token = Uuid::new_v4().simple().to_string();
        self.tokens.insert(
            token.clone(),
            Session {
                user_id,
                issued_at: Instant::now(),
            },
        );
        token
    }

    pub fn resolve(&self, token: &str) -> Option<Uuid> {
        {
            let session = self.tokens.get(token)?;
            if session.issued_at.elapsed() < self.ttl {
                return Some(session.user_id);
            }
        }
        // Read guard is released above; removing under it would deadlock.
        self.tokens.remove(token);
        None
    }

    pub fn revoke(&self, token: &str) {
        self.tokens.remove(token);
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }
}

/// The logged-in caller, taken from `Authorization: Bearer <token>`.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: Uuid,
    pub token: String,
}

fn not_logged_in() -> ApiError {
    AppError::Unauthorized("You need to login first.".into()).into()
}

impl FromRequest for CurrentUser {
    type Error = ApiError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        let token = req
            .headers()
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(str::trim);

        let result = match (token, req.app_data::<web::Data<AppState>>()) {
            (Some(token), Some(state)) => state
                .sessions
                .resolve(token)
                .map(|id| CurrentUser {
                    id,
                    token: token.to_string(),
                })
                .ok_or_else(not_logged_in),
            _ => Err(not_logged_in()),
        };
        ready(result)
    }
}
