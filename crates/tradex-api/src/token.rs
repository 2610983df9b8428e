//! Session access token holder.
//!
//! A single mutable slot. Overwritten and cleared tokens are zeroized.

use parking_lot::RwLock;
use serde_json::Value;
use std::fmt;
use tracing::debug;
use zeroize::Zeroizing;

#[derive(Default)]
pub struct TokenHolder {
    slot: RwLock<Option<Zeroizing<String>>>,
}

impl TokenHolder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `token`, replacing any previous one.
    pub fn set(&self, token: impl Into<String>) {
        let token = Zeroizing::new(token.into());
        *self.slot.write() = Some(token);
        debug!("Access token stored");
    }

    pub fn get(&self) -> Option<String> {
        self.slot.read().as_ref().map(|t| t.as_str().to_owned())
    }

    pub fn clear(&self) {
        *self.slot.write() = None;
    }

    pub fn is_authenticated(&self) -> bool {
        self.slot.read().as_ref().is_some_and(|t| !t.is_empty())
    }

    /// Store the `access_token` of a `public/auth` result. Returns whether
    /// one was found.
    pub fn store_from_auth_result(&self, result: &Value) -> bool {
        match result.get("access_token").and_then(Value::as_str) {
            Some(token) if !token.is_empty() => {
                self.set(token);
                true
            }
            _ => false,
        }
    }
}

impl fmt::Debug for TokenHolder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenHolder")
            .field("authenticated", &self.is_authenticated())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_set_replace_clear() {
        let holder = TokenHolder::new();
        assert!(!holder.is_authenticated());
        assert!(holder.get().is_none());

        holder.set("first");
        holder.set("second");
        assert_eq!(holder.get().as_deref(), Some("second"));
        assert!(holder.is_authenticated());

        holder.clear();
        assert!(!holder.is_authenticated());
    }

    #[test]
    fn test_store_from_auth_result() {
        let holder = TokenHolder::new();
        let result = json!({"access_token": "abc123", "expires_in": 900, "token_type": "bearer"});
        assert!(holder.store_from_auth_result(&result));
        assert_eq!(holder.get().as_deref(), Some("abc123"));

        assert!(!holder.store_from_auth_result(&json!({"token_type": "bearer"})));
        assert_eq!(holder.get().as_deref(), Some("abc123"));
    }
}
