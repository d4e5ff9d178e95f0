/*
 * Responsibility
 * - decoder が取り出した claims と、信用してよい時間帯 (exp / nbf) を持つ
 * - validate() は時間系 claim だけを見る (署名検証は decoder 側の責務)
 * - 1 request の間だけ生きる
 */
use std::collections::BTreeMap;

use chrono::Utc;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("token expired at {expires_at} (now {now}, leeway {leeway}s)")]
    Expired {
        expires_at: i64,
        now: i64,
        leeway: u64,
    },
    #[error("token not valid before {not_before} (now {now}, leeway {leeway}s)")]
    NotYetValid {
        not_before: i64,
        now: i64,
        leeway: u64,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Token {
    // Claim name -> header-ready value. BTreeMap keeps header emission deterministic.
    claims: BTreeMap<String, String>,
    expires_at: Option<i64>,
    not_before: Option<i64>,
    leeway: u64,
}

impl Token {
    pub fn new(claims: BTreeMap<String, String>) -> Self {
        Self {
            claims,
            expires_at: None,
            not_before: None,
            leeway: 0,
        }
    }

    pub fn with_expires_at(mut self, expires_at: Option<i64>) -> Self {
        self.expires_at = expires_at;
        self
    }

    pub fn with_not_before(mut self, not_before: Option<i64>) -> Self {
        self.not_before = not_before;
        self
    }

    pub fn with_leeway(mut self, leeway_seconds: u64) -> Self {
        self.leeway = leeway_seconds;
        self
    }

    pub fn claims(&self) -> &BTreeMap<String, String> {
        &self.claims
    }

    /// Check the token's time window against the current UTC clock.
    pub fn validate(&self) -> Result<(), ValidationError> {
        self.validate_at(Utc::now().timestamp())
    }

    /// Same as [`Token::validate`] with an explicit clock (seconds since epoch).
    ///
    /// Absent `exp` / `nbf` never fail.
    pub fn validate_at(&self, now: i64) -> Result<(), ValidationError> {
        let leeway = i64::try_from(self.leeway).unwrap_or(i64::MAX);

        if let Some(expires_at) = self.expires_at {
            if now > expires_at.saturating_add(leeway) {
                return Err(ValidationError::Expired {
                    expires_at,
                    now,
                    leeway: self.leeway,
                });
            }
        }

        if let Some(not_before) = self.not_before {
            if now.saturating_add(leeway) < not_before {
                return Err(ValidationError::NotYetValid {
                    not_before,
                    now,
                    leeway: self.leeway,
                });
            }
        }

        Ok(())
    }
}
