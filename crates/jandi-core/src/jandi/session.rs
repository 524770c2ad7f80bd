//! Session state for an authenticated Jandi client.
//!
//! An access token is considered expired [`AccessToken::EXPIRY_MARGIN_SECS`]
//! before the server says it is, so a request never goes out with a token
//! that lapses mid-flight.

use std::fmt;

use chrono::{DateTime, TimeDelta, Utc};

use crate::CoreError;
use crate::jandi::models::{MeResponse, TokenResponse};

/// A short-lived bearer token obtained from the token exchange.
#[derive(Clone, PartialEq, Eq)]
pub struct AccessToken {
    secret: String,
    expires_at: DateTime<Utc>,
    generation: u64,
}

impl AccessToken {
    /// Seconds subtracted from the server-reported lifetime.
    pub const EXPIRY_MARGIN_SECS: i64 = 300;

    /// Build a token issued at `issued_at` that the server says lives `expires_in` seconds.
    ///
    /// Returns `None` when the lifetime does not fit in a timestamp.
    #[must_use]
    pub fn issue(
        secret: impl Into<String>,
        expires_in: i64,
        issued_at: DateTime<Utc>,
        generation: u64,
    ) -> Option<Self> {
        let lifetime = expires_in
            .checked_sub(Self::EXPIRY_MARGIN_SECS)
            .and_then(TimeDelta::try_seconds)?;

        Some(Self {
            secret: secret.into(),
            expires_at: issued_at.checked_add_signed(lifetime)?,
            generation,
        })
    }

    /// Whether the token may still be used at `now`.
    #[must_use]
    pub fn is_valid_at(&self, now: DateTime<Utc>) -> bool {
        now < self.expires_at
    }

    /// Instant from which the token is treated as expired.
    #[must_use]
    pub const fn expires_at(&self) -> DateTime<Utc> {
        self.expires_at
    }

    /// Position of this token in the sequence of tokens issued to the session.
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    /// Value for the `Authorization` header.
    #[must_use]
    pub fn authorization(&self) -> String {
        format!("bearer {}", self.secret)
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AccessToken")
            .field("secret", &"<redacted>")
            .field("expires_at", &self.expires_at)
            .field("generation", &self.generation)
            .finish()
    }
}

/// The team, member and account the session acts as.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// Team the session is scoped to (first membership).
    pub team_id: String,
    /// Member id of the account within that team.
    pub member_id: String,
    /// Account UUID.
    pub account_id: String,
}

impl Identity {
    /// Derive the identity from the `/account-api/v1/me` payload.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::NoMembership`] if the account belongs to no team.
    pub fn from_me(me: MeResponse) -> Result<Self, CoreError> {
        let Some(membership) = me.memberships.into_iter().next() else {
            return Err(CoreError::NoMembership { account_id: me.uuid });
        };

        Ok(Self {
            team_id: membership.team_id.to_string(),
            member_id: membership.member_id.to_string(),
            account_id: me.uuid,
        })
    }
}

/// Holder for the current access token.
///
/// Lives behind the client's refresh lock; every mutation happens while that
/// lock is held.
#[derive(Debug, Default)]
pub struct TokenSlot {
    current: Option<AccessToken>,
    issued: u64,
}

impl TokenSlot {
    /// The current token, if present and unexpired at `now`.
    #[must_use]
    pub fn usable(&self, now: DateTime<Utc>) -> Option<&AccessToken> {
        self.current.as_ref().filter(|token| token.is_valid_at(now))
    }

    /// A usable token issued after the one with generation `rejected`.
    #[must_use]
    pub fn replaced_since(&self, rejected: u64, now: DateTime<Utc>) -> Option<&AccessToken> {
        self.usable(now).filter(|token| token.generation > rejected)
    }

    /// Install a freshly exchanged token and return it.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Serialization`] if the reported lifetime is out of
    /// range; the current token is left in place.
    pub fn install(
        &mut self,
        grant: TokenResponse,
        issued_at: DateTime<Utc>,
    ) -> Result<&AccessToken, CoreError> {
        let expires_in = grant.expires_in;
        let token = AccessToken::issue(grant.access_token, expires_in, issued_at, self.issued + 1)
            .ok_or_else(|| {
                CoreError::Serialization(format!("token lifetime out of range: {expires_in}s"))
            })?;

        self.issued += 1;
        Ok(&*self.current.insert(token))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jandi::models::{EntityId, Membership};

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000 + secs, 0).expect("valid timestamp")
    }

    fn grant(token: &str, expires_in: i64) -> TokenResponse {
        TokenResponse {
            access_token: token.to_string(),
            expires_in,
        }
    }

    fn issue(expires_in: i64) -> AccessToken {
        AccessToken::issue("X", expires_in, at(0), 1).expect("lifetime in range")
    }

    #[test]
    fn token_expires_margin_seconds_early() {
        let token = issue(3600);

        assert!(token.is_valid_at(at(0)));
        assert!(token.is_valid_at(at(3600 - 301)));
        assert!(!token.is_valid_at(at(3600 - 300)));
        assert!(!token.is_valid_at(at(3600)));
    }

    #[test]
    fn short_lifetime_is_expired_immediately() {
        let token = issue(200);
        assert!(!token.is_valid_at(at(0)));
    }

    #[test]
    fn authorization_header_uses_lowercase_bearer() {
        let token = AccessToken::issue("abc", 3600, at(0), 1).expect("token");
        assert_eq!(token.authorization(), "bearer abc");
    }

    #[test]
    fn debug_never_prints_secret() {
        let token = AccessToken::issue("very-secret", 3600, at(0), 1).expect("token");
        assert!(!format!("{token:?}").contains("very-secret"));
    }

    #[test]
    fn slot_starts_empty_and_counts_installs() {
        let mut slot = TokenSlot::default();
        assert!(slot.usable(at(0)).is_none());

        let first = slot.install(grant("A", 3600), at(0)).expect("install").clone();
        assert_eq!(first.generation(), 1);
        assert_eq!(slot.usable(at(10)), Some(&first));

        let second = slot.install(grant("B", 3600), at(20)).expect("install").clone();
        assert_eq!(second.generation(), 2);
        assert_eq!(
            slot.usable(at(30)).map(AccessToken::authorization).as_deref(),
            Some("bearer B")
        );
    }

    #[test]
    fn replaced_since_only_reports_newer_tokens() {
        let mut slot = TokenSlot::default();
        slot.install(grant("A", 3600), at(0)).expect("install");

        assert!(slot.replaced_since(1, at(5)).is_none());
        assert_eq!(
            slot.replaced_since(0, at(5)).map(AccessToken::generation),
            Some(1)
        );
    }

    #[test]
    fn out_of_range_lifetimes_are_rejected() {
        assert!(AccessToken::issue("X", i64::MAX, at(0), 1).is_none());
        assert!(AccessToken::issue("X", i64::MIN, at(0), 1).is_none());
        assert!(AccessToken::issue("X", i64::MAX / 1000 - 1, at(0), 1).is_none());
    }

    #[test]
    fn rejected_lifetime_keeps_current_token() {
        let mut slot = TokenSlot::default();
        slot.install(grant("A", 3600), at(0)).expect("install");

        let err = slot
            .install(grant("B", i64::MAX), at(10))
            .expect_err("lifetime out of range");

        assert!(matches!(err, CoreError::Serialization(ref msg) if msg.contains("out of range")));
        let kept = slot.usable(at(20)).expect("first token still usable");
        assert_eq!(kept.generation(), 1);
        assert_eq!(kept.authorization(), "bearer A");
    }

    #[test]
    fn identity_uses_first_membership() {
        let me = MeResponse {
            uuid: "u1".to_string(),
            memberships: vec![
                Membership {
                    team_id: EntityId::Number(1),
                    member_id: EntityId::Number(2),
                },
                Membership {
                    team_id: EntityId::Number(9),
                    member_id: EntityId::Number(9),
                },
            ],
        };

        let identity = Identity::from_me(me).expect("identity");
        assert_eq!(identity.team_id, "1");
        assert_eq!(identity.member_id, "2");
        assert_eq!(identity.account_id, "u1");
    }

    #[test]
    fn identity_without_membership_is_rejected() {
        let me = MeResponse {
            uuid: "u1".to_string(),
            memberships: Vec::new(),
        };

        let err = Identity::from_me(me).expect_err("no membership");
        assert!(matches!(err, CoreError::NoMembership { ref account_id } if account_id == "u1"));
    }
}
