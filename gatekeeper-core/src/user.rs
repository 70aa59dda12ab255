use serde_json::Value;

/// Authenticated caller extracted from a verified token.
///
/// Every field is optional in the token; missing claims default to empty
/// strings. The absence of a `User` on the context means the caller is
/// unauthenticated.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct User {
    pub id: String,
    pub username: String,
    pub user_no: String,
    pub role_no: String,
}

impl User {
    /// Build a `User` from raw claim values, string-coercing each one.
    pub fn from_claims(
        id: Option<&Value>,
        username: Option<&Value>,
        user_no: Option<&Value>,
        role_no: Option<&Value>,
    ) -> Self {
        Self {
            id: coerce(id),
            username: coerce(username),
            user_no: coerce(user_no),
            role_no: coerce(role_no),
        }
    }
}

/// Claim values may arrive as strings, numbers, or booleans depending on
/// the issuer; render all of them as strings, anything else as empty.
fn coerce(value: Option<&Value>) -> String {
    match value {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Bool(b)) => b.to_string(),
        _ => String::new(),
    }
}
