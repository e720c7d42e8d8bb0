//! Operator credential check.
//!
//! Passwords are stored as argon2 PHC strings. Lookups for unknown users still
//! run one full verification against a dummy hash.

use argon2::{
    password_hash::SaltString, Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
};
use rand_core::OsRng;
use subtle::ConstantTimeEq;

use crate::error::{FleetError, Result};

const DUMMY_PASSWORD: &str = "lifeline-dummy-credential";

/// Hash a password into a PHC string suitable for `LIFELINE_USERS`.
pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|err| FleetError::InvalidHash(err.to_string()))?;
    Ok(hash.to_string())
}

fn verify_password(phc: &str, password: &str) -> bool {
    match PasswordHash::new(phc) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(_) => false,
    }
}

#[derive(Debug, Clone)]
struct Credential {
    username: String,
    phc: String,
}

#[derive(Debug, Clone)]
pub struct AuthGate {
    users: Vec<Credential>,
    dummy_hash: String,
}

impl AuthGate {
    pub fn new() -> Result<Self> {
        Ok(Self {
            users: Vec::new(),
            dummy_hash: hash_password(DUMMY_PASSWORD)?,
        })
    }

    /// Register a user. `phc` must parse as a PHC hash string.
    pub fn with_user(mut self, username: impl Into<String>, phc: impl Into<String>) -> Result<Self> {
        let username = username.into();
        let phc = phc.into();
        if username.is_empty() {
            return Err(FleetError::InvalidHash("empty username".to_string()));
        }
        PasswordHash::new(&phc)
            .map_err(|err| FleetError::InvalidHash(format!("{username}: {err}")))?;
        self.users.retain(|c| c.username != username);
        self.users.push(Credential { username, phc });
        Ok(self)
    }

    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// `true` only for a known user with the right password.
    pub fn authenticate(&self, username: &str, password: &str) -> bool {
        let mut matched: Option<&str> = None;
        for credential in &self.users {
            let same: bool = credential
                .username
                .as_bytes()
                .ct_eq(username.as_bytes())
                .into();
            if same && matched.is_none() {
                matched = Some(credential.phc.as_str());
            }
        }

        let phc = matched.unwrap_or(self.dummy_hash.as_str());
        let verified = verify_password(phc, password);
        verified && matched.is_some()
    }

    pub fn check(&self, username: &str, password: &str) -> Result<()> {
        if self.authenticate(username, password) {
            Ok(())
        } else {
            Err(FleetError::AuthFailure)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gate() -> AuthGate {
        let hash = hash_password("rotor-wash").expect("hash");
        AuthGate::new()
            .expect("gate")
            .with_user("dispatch", hash)
            .expect("user")
    }

    #[test]
    fn test_known_user_with_correct_password() {
        let gate = gate();
        assert!(gate.authenticate("dispatch", "rotor-wash"));
        assert_eq!(gate.check("dispatch", "rotor-wash"), Ok(()));
    }

    #[test]
    fn test_wrong_password_and_unknown_user_look_the_same() {
        let gate = gate();
        assert!(!gate.authenticate("dispatch", "wrong"));
        assert!(!gate.authenticate("nobody", "rotor-wash"));
        assert!(!gate.authenticate("nobody", DUMMY_PASSWORD));
        assert_eq!(gate.check("nobody", "x"), Err(FleetError::AuthFailure));
        assert_eq!(gate.check("dispatch", "x"), Err(FleetError::AuthFailure));
    }

    #[test]
    fn test_rejects_non_phc_hash() {
        let result = AuthGate::new().expect("gate").with_user("dispatch", "plaintext");
        assert!(matches!(result, Err(FleetError::InvalidHash(_))));
    }

    #[test]
    fn test_hash_is_salted() {
        let a = hash_password("same").expect("hash");
        let b = hash_password("same").expect("hash");
        assert_ne!(a, b);
        assert!(a.starts_with("$argon2"));
    }
}
