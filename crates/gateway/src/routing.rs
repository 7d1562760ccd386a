//! Order routing keys
//!
//! An order is identified on the venue by `{front_id}_{session_id}_{order_ref}`.
//! The key is rebuilt from vendor callbacks, so it survives restarts of the
//! local process as long as the venue session does.

use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RoutingKey {
    pub front_id: i32,
    pub session_id: i32,
    pub order_ref: String,
}

impl RoutingKey {
    pub fn new(front_id: i32, session_id: i32, order_ref: impl Into<String>) -> Self {
        Self {
            front_id,
            session_id,
            order_ref: order_ref.into(),
        }
    }

    /// Split a key back into its fields. The order ref may itself contain `_`.
    pub fn parse(key: &str) -> Option<Self> {
        let mut parts = key.splitn(3, '_');
        let front_id = parts.next()?.parse().ok()?;
        let session_id = parts.next()?.parse().ok()?;
        let order_ref = parts.next().filter(|r| !r.is_empty())?;
        Some(Self::new(front_id, session_id, order_ref))
    }
}

impl fmt::Display for RoutingKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}_{}", self.front_id, self.session_id, self.order_ref)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_and_parse() {
        let key = RoutingKey::new(1, -2037, "42");
        assert_eq!(key.to_string(), "1_-2037_42");
        assert_eq!(RoutingKey::parse("1_-2037_42"), Some(key));
        assert_eq!(
            RoutingKey::parse("3_7_ref_with_underscores").map(|k| k.order_ref),
            Some("ref_with_underscores".to_string())
        );
    }

    #[test]
    fn test_parse_rejects_malformed() {
        assert_eq!(RoutingKey::parse(""), None);
        assert_eq!(RoutingKey::parse("1_2"), None);
        assert_eq!(RoutingKey::parse("1_2_"), None);
        assert_eq!(RoutingKey::parse("x_2_3"), None);
    }
}
