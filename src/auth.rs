use async_trait::async_trait;
use dashmap::{DashMap, DashSet};
use serde::{Deserialize, Serialize};

/// Verified caller identity. `is_admin` is a signed claim attached at
/// authentication time; the engine trusts it without re-querying a user
/// store. Only the direct-HTTP admin listing re-verifies the credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub uid: String,
    pub email: String,
    pub is_admin: bool,
}

impl Identity {
    pub fn new(uid: impl Into<String>, email: impl Into<String>, is_admin: bool) -> Self {
        Self {
            uid: uid.into(),
            email: email.into(),
            is_admin,
        }
    }

    /// Placeholder identity substituted for unauthenticated submits, only
    /// when the explicit test-identity flag is enabled.
    pub fn test_placeholder() -> Self {
        Self::new("test-user-id-123", "test@example.com", false)
    }
}

/// Authentication collaborator: verifies a bearer credential and produces
/// the identity it proves.
#[async_trait]
pub trait TokenVerifier: Send + Sync {
    async fn verify(&self, token: &str) -> Option<Identity>;
}

/// In-process reference verifier: opaque bearer tokens mapped to identities,
/// plus the set of emails carrying the admin claim.
pub struct TokenRegistry {
    tokens: DashMap<String, Identity>,
    admin_emails: DashSet<String>,
}

impl Default for TokenRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenRegistry {
    pub fn new() -> Self {
        Self {
            tokens: DashMap::new(),
            admin_emails: DashSet::new(),
        }
    }

    /// Register a token for an identity. Token issuance itself (login) is an
    /// external concern; the registry only records the result.
    pub fn issue(&self, token: impl Into<String>, identity: Identity) {
        if identity.is_admin {
            self.admin_emails.insert(identity.email.clone());
        }
        self.tokens.insert(token.into(), identity);
    }

    /// Grant the admin claim to every future session of `email` and revoke
    /// the account's live tokens so it must re-authenticate. Returns the
    /// number of tokens revoked.
    pub fn grant_admin(&self, email: &str) -> usize {
        self.admin_emails.insert(email.to_string());
        let stale: Vec<String> = self
            .tokens
            .iter()
            .filter(|entry| entry.value().email == email)
            .map(|entry| entry.key().clone())
            .collect();
        for token in &stale {
            self.tokens.remove(token);
        }
        stale.len()
    }

    pub fn is_admin_email(&self, email: &str) -> bool {
        self.admin_emails.contains(email)
    }
}

#[async_trait]
impl TokenVerifier for TokenRegistry {
    async fn verify(&self, token: &str) -> Option<Identity> {
        let mut identity = self.tokens.get(token)?.value().clone();
        // The claim set is read fresh from the registry at verification time,
        // so a grant takes effect on the next verified call.
        identity.is_admin = identity.is_admin || self.admin_emails.contains(&identity.email);
        Some(identity)
    }
}

/// Strip the `Bearer ` scheme from an Authorization header value.
pub fn bearer_token(header_value: &str) -> Option<&str> {
    header_value
        .strip_prefix("Bearer ")
        .map(str::trim)
        .filter(|t| !t.is_empty())
}
