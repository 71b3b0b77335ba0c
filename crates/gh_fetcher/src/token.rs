use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use common::config::GithubToken;
use tokio::sync::Mutex;

use crate::model::RateLimitUpdate;

const ANONYMOUS_ID: &str = "anonymous";

#[derive(Debug, Clone)]
pub struct RateLimitState {
    pub limit: i64,
    pub remaining: i64,
    pub reset_at: DateTime<Utc>,
}

impl RateLimitState {
    fn new(limit: i64) -> Self {
        Self {
            limit,
            remaining: limit,
            reset_at: Utc::now(),
        }
    }

    fn update(&mut self, update: RateLimitUpdate) {
        self.limit = update.limit;
        self.remaining = update.remaining;
        self.reset_at = update.reset;
    }

    fn consume(&mut self, cost: i64) {
        self.remaining = (self.remaining - cost).max(0);
    }

    fn available(&self, now: DateTime<Utc>) -> bool {
        self.remaining > 0 || self.reset_at <= now
    }
}

#[derive(Debug, Clone)]
pub struct Credential {
    pub id: String,
    pub secret: Option<String>,
}

impl Credential {
    pub fn authorization(&self) -> Option<String> {
        self.secret.as_ref().map(|secret| format!("token {secret}"))
    }
}

#[derive(Debug)]
struct TokenState {
    credential: Credential,
    rate: RateLimitState,
}

#[derive(Debug)]
pub enum TokenSelection {
    Use(Credential),
    Wait(Duration),
}

/// Core-budget rate limit tracking across the configured tokens. With no
/// tokens a single anonymous slot is tracked so unauthenticated runs still
/// honour the 60/hour limit GitHub reports.
#[derive(Clone)]
pub struct TokenPool {
    inner: Arc<Mutex<Vec<TokenState>>>,
}

impl TokenPool {
    pub fn new(tokens: Vec<GithubToken>) -> Self {
        let mut states: Vec<TokenState> = tokens
            .into_iter()
            .map(|token| TokenState {
                credential: Credential {
                    id: token.id,
                    secret: Some(token.secret),
                },
                rate: RateLimitState::new(5000),
            })
            .collect();
        if states.is_empty() {
            states.push(TokenState {
                credential: Credential {
                    id: ANONYMOUS_ID.to_string(),
                    secret: None,
                },
                rate: RateLimitState::new(60),
            });
        }
        Self {
            inner: Arc::new(Mutex::new(states)),
        }
    }

    pub async fn pick(&self) -> TokenSelection {
        let guard = self.inner.lock().await;
        let now = Utc::now();
        let mut best: Option<(f64, &TokenState)> = None;
        let mut next_reset: Option<Duration> = None;

        for state in guard.iter() {
            if state.rate.available(now) {
                let score = state.rate.remaining as f64 / state.rate.limit.max(1) as f64;
                if best.map_or(true, |(best_score, _)| score > best_score) {
                    best = Some((score, state));
                }
            } else {
                let wait = (state.rate.reset_at - now).to_std().unwrap_or_default();
                next_reset = Some(next_reset.map_or(wait, |existing| existing.min(wait)));
            }
        }

        match (best, next_reset) {
            (Some((_, state)), _) => TokenSelection::Use(state.credential.clone()),
            (None, Some(wait)) => TokenSelection::Wait(wait),
            (None, None) => TokenSelection::Wait(Duration::from_secs(1)),
        }
    }

    pub async fn update(&self, token_id: &str, update: RateLimitUpdate) {
        let mut guard = self.inner.lock().await;
        if let Some(state) = guard.iter_mut().find(|s| s.credential.id == token_id) {
            state.rate.update(update);
        }
    }

    pub async fn consume(&self, token_id: &str, amount: i64) {
        let mut guard = self.inner.lock().await;
        if let Some(state) = guard.iter_mut().find(|s| s.credential.id == token_id) {
            state.rate.consume(amount);
        }
    }

    pub async fn remaining(&self, token_id: &str) -> Option<i64> {
        let guard = self.inner.lock().await;
        guard
            .iter()
            .find(|s| s.credential.id == token_id)
            .map(|s| s.rate.remaining)
    }
}
