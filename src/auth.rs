use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use serde::{Deserialize, Serialize};

use crate::error::{AppError, Result};

/// Who a session belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Principal {
    Patient { id: u64 },
    Admin { id: u64 },
}

impl Principal {
    pub fn is_admin(&self) -> bool {
        matches!(self, Self::Admin { .. })
    }

    pub fn patient_id(&self) -> Option<u64> {
        match self {
            Self::Patient { id } => Some(*id),
            Self::Admin { .. } => None,
        }
    }

    /// Doctors have no login, so only admins can read a doctor's book.
    pub fn can_view_doctor_appointments(&self) -> bool {
        self.is_admin()
    }
}

pub fn hash_password(password: &str) -> Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| AppError::PasswordHash(e.to_string()))
}

/// A malformed stored hash counts as a mismatch rather than an error.
pub fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(parsed) => Argon2::default()
            .verify_password(password.as_bytes(), &parsed)
            .is_ok(),
        Err(e) => {
            tracing::warn!(error = %e, "unparseable password hash");
            false
        }
    }
}

/// Runs Argon2 on the blocking pool instead of an async worker.
pub async fn hash_password_blocking(password: String) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| AppError::PasswordHash(e.to_string()))?
}

pub async fn verify_password_blocking(password: String, stored_hash: String) -> Result<bool> {
    tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|e| AppError::PasswordHash(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_is_salted_and_verifies() {
        let first = hash_password("hunter2").unwrap();
        let second = hash_password("hunter2").unwrap();

        assert_ne!(first, "hunter2");
        assert_ne!(first, second);
        assert!(verify_password("hunter2", &first));
        assert!(verify_password("hunter2", &second));
        assert!(!verify_password("hunter3", &first));
    }

    #[test]
    fn garbage_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[test]
    fn principal_roundtrips_as_tagged_json() {
        let json = serde_json::to_value(Principal::Admin { id: 7 }).unwrap();
        assert_eq!(json, serde_json::json!({"type": "admin", "id": 7}));
        assert!(Principal::Admin { id: 7 }.can_view_doctor_appointments());
        assert!(!Principal::Patient { id: 3 }.can_view_doctor_appointments());
    }

    #[tokio::test]
    async fn blocking_pool_hash_verifies() {
        let hash = hash_password_blocking("hunter2".to_string()).await.unwrap();

        assert!(verify_password_blocking("hunter2".to_string(), hash.clone())
            .await
            .unwrap());
        assert!(!verify_password_blocking("hunter3".to_string(), hash)
            .await
            .unwrap());
    }
}
