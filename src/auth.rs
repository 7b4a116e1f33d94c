use crate::model::Owner;

/// Shared-password check for the `AUTH` handshake. The owner named in a
/// successful `AUTH` becomes the caller identity for the connection.
#[derive(Debug, Clone)]
pub struct PasswordAuth {
    password: String,
}

impl PasswordAuth {
    pub fn new(password: String) -> Self {
        Self { password }
    }

    /// Returns the authenticated caller, or None if the password is wrong.
    pub fn authenticate(&self, owner: Owner, password: &str) -> Option<Owner> {
        if owner.as_str().is_empty() || !constant_time_eq(self.password.as_bytes(), password.as_bytes()) {
            return None;
        }
        Some(owner)
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}
