use std::collections::HashMap;

use chrono::{DateTime, Duration, Utc};

/// Tokens closer than this to expiry are treated as expired.
pub const EXPIRY_MARGIN_SECS: i64 = 300;
/// Lifetime assumed when the token endpoint omits `expires_in`.
pub const DEFAULT_LIFETIME_SECS: i64 = 3599;

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

/// In-memory access tokens keyed by account id.
#[derive(Debug, Default)]
pub struct CredentialCache {
    tokens: HashMap<String, CachedToken>,
}

impl CredentialCache {
    /// A cached token that is still good for at least the safety margin.
    pub fn get(&self, account_id: &str, now: DateTime<Utc>) -> Option<&str> {
        self.tokens
            .get(account_id)
            .filter(|t| t.expires_at - Duration::seconds(EXPIRY_MARGIN_SECS) > now)
            .map(|t| t.access_token.as_str())
    }

    pub fn insert(&mut self, account_id: &str, access_token: &str, expires_in: Option<u64>, now: DateTime<Utc>) {
        // Lifetimes chrono cannot represent fall back to the default; sums
        // past the end of time are clamped.
        let lifetime = expires_in
            .and_then(|s| i64::try_from(s).ok())
            .and_then(Duration::try_seconds)
            .unwrap_or_else(|| Duration::seconds(DEFAULT_LIFETIME_SECS));
        let expires_at = now.checked_add_signed(lifetime).unwrap_or(DateTime::<Utc>::MAX_UTC);
        self.tokens.insert(
            account_id.to_string(),
            CachedToken {
                access_token: access_token.to_string(),
                expires_at,
            },
        );
    }

    pub fn clear(&mut self) {
        self.tokens.clear();
    }
}
