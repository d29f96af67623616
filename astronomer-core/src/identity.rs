//! Identity resolution for envelopes
//!
//! The host runtime tracks who the visitor is ([`UserState`]); a call may also
//! carry explicit ids. Resolution combines the two without ever failing:
//!
//! - `anonymousId` is the tracked value, or a fresh v4 UUID. A generated id is
//!   not written back into the [`UserState`].
//! - `userId` is the explicit id, else the tracked one, else absent.
//! - Alias calls take `userId` from `to` and `previousId` from `from`, falling
//!   back to the anonymous id resolved for the same call.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Identity currently tracked by the host runtime
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserState {
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub anonymous_id: Option<String>,
}

impl UserState {
    pub fn new(user_id: Option<String>, anonymous_id: Option<String>) -> Self {
        Self {
            user_id,
            anonymous_id,
        }
    }

    /// Forget any cached identity
    pub fn reset(&mut self) {
        self.user_id = None;
        self.anonymous_id = None;
    }
}

/// Identity fields stamped onto an envelope
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub anonymous_id: String,
    pub user_id: Option<String>,
}

/// Identity for an alias call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AliasIdentity {
    pub anonymous_id: String,
    pub user_id: String,
    pub previous_id: String,
}

/// A new 36-character random identifier
pub fn generate_id() -> String {
    Uuid::new_v4().to_string()
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.is_empty())
}

/// Computes identity fields from tracked state and explicit call arguments
pub struct IdentityResolver;

impl IdentityResolver {
    /// Tracked anonymous id, or a freshly generated one
    pub fn anonymous_id(state: &UserState) -> String {
        non_empty(state.anonymous_id.as_deref())
            .map(str::to_string)
            .unwrap_or_else(generate_id)
    }

    /// Identity for page, identify, track and group calls
    pub fn resolve(state: &UserState, explicit_user_id: Option<&str>) -> Identity {
        let user_id = non_empty(explicit_user_id)
            .or_else(|| non_empty(state.user_id.as_deref()))
            .map(str::to_string);

        Identity {
            anonymous_id: Self::anonymous_id(state),
            user_id,
        }
    }

    /// Identity for an alias call; `to` must already be validated
    pub fn resolve_alias(state: &UserState, to: &str, from: Option<&str>) -> AliasIdentity {
        let anonymous_id = Self::anonymous_id(state);
        let previous_id = non_empty(from)
            .map(str::to_string)
            .unwrap_or_else(|| anonymous_id.clone());

        AliasIdentity {
            anonymous_id,
            user_id: to.to_string(),
            previous_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generated_id_shape() {
        let id = generate_id();
        assert_eq!(id.len(), 36);
        assert_eq!(id.matches('-').count(), 4);
        assert_ne!(id, generate_id());
    }

    #[test]
    fn test_tracked_anonymous_id_used() {
        let state = UserState::new(None, Some("anon-id".to_string()));
        let identity = IdentityResolver::resolve(&state, None);
        assert_eq!(identity.anonymous_id, "anon-id");
        assert!(identity.user_id.is_none());
    }

    #[test]
    fn test_anonymous_id_generated_and_not_persisted() {
        let state = UserState::default();
        let first = IdentityResolver::resolve(&state, None);
        let second = IdentityResolver::resolve(&state, None);

        assert_eq!(first.anonymous_id.len(), 36);
        assert_ne!(first.anonymous_id, second.anonymous_id);
        assert!(state.anonymous_id.is_none());
    }

    #[test]
    fn test_anonymous_id_present_with_user_id() {
        let identity = IdentityResolver::resolve(&UserState::default(), Some("baz"));
        assert_eq!(identity.user_id.as_deref(), Some("baz"));
        assert_eq!(identity.anonymous_id.len(), 36);
    }

    #[test]
    fn test_tracked_user_id_used() {
        let state = UserState::new(Some("user-id".to_string()), None);
        let identity = IdentityResolver::resolve(&state, None);
        assert_eq!(identity.user_id.as_deref(), Some("user-id"));
    }

    #[test]
    fn test_explicit_user_id_not_replaced() {
        let state = UserState::new(Some("user-id".to_string()), None);
        let identity = IdentityResolver::resolve(&state, Some("existing-id"));
        assert_eq!(identity.user_id.as_deref(), Some("existing-id"));
    }

    #[test]
    fn test_empty_ids_are_absent() {
        let state = UserState::new(Some(String::new()), Some(String::new()));
        let identity = IdentityResolver::resolve(&state, Some(""));
        assert!(identity.user_id.is_none());
        assert_eq!(identity.anonymous_id.len(), 36);
    }

    #[test]
    fn test_alias_with_from() {
        let alias = IdentityResolver::resolve_alias(&UserState::default(), "to", Some("from"));
        assert_eq!(alias.user_id, "to");
        assert_eq!(alias.previous_id, "from");
    }

    #[test]
    fn test_alias_falls_back_to_tracked_anonymous_id() {
        let state = UserState::new(None, Some("anon-id".to_string()));
        let alias = IdentityResolver::resolve_alias(&state, "to", None);
        assert_eq!(alias.previous_id, "anon-id");
        assert_eq!(alias.anonymous_id, "anon-id");
    }

    #[test]
    fn test_alias_falls_back_to_generated_id() {
        let alias = IdentityResolver::resolve_alias(&UserState::default(), "to", None);
        assert_eq!(alias.previous_id.len(), 36);
        assert_eq!(alias.previous_id, alias.anonymous_id);
    }

    #[test]
    fn test_reset_clears_state() {
        let mut state = UserState::new(Some("u".to_string()), Some("a".to_string()));
        state.reset();
        assert_eq!(state, UserState::default());
    }
}
