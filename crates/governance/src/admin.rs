//! Administrative credential guard.
//!
//! Guards the quota reset trigger. With no key configured every attempt is
//! refused.

use secrecy::{ExposeSecret, Secret};
use sha2::{Digest, Sha256};

use fixit_core::{Error, Result};

#[derive(Clone, Default)]
pub struct AdminGuard {
    key: Option<Secret<String>>,
}

impl AdminGuard {
    pub fn new(key: Option<Secret<String>>) -> Self {
        let key = key.filter(|k| !k.expose_secret().is_empty());
        if key.is_none() {
            tracing::warn!("No admin key configured, administrative endpoints are disabled");
        }
        Self { key }
    }

    pub fn is_configured(&self) -> bool {
        self.key.is_some()
    }

    /// Check a presented credential.
    pub fn verify(&self, presented: &str) -> Result<()> {
        let Some(key) = &self.key else {
            return Err(Error::Unauthorized);
        };

        // Digests have equal length, so the comparison touches every byte.
        let expected = Sha256::digest(key.expose_secret().as_bytes());
        let actual = Sha256::digest(presented.as_bytes());
        let diff = expected
            .iter()
            .zip(actual.iter())
            .fold(0u8, |acc, (a, b)| acc | (a ^ b));

        if diff == 0 {
            Ok(())
        } else {
            tracing::warn!("Rejected administrative request with invalid key");
            Err(Error::Unauthorized)
        }
    }
}

impl std::fmt::Debug for AdminGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdminGuard")
            .field("configured", &self.is_configured())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verify_accepts_only_the_configured_key() {
        let guard = AdminGuard::new(Some(Secret::new("s3cret".to_string())));
        assert!(guard.verify("s3cret").is_ok());
        assert!(matches!(guard.verify("wrong"), Err(Error::Unauthorized)));
        assert!(matches!(guard.verify(""), Err(Error::Unauthorized)));
    }

    #[test]
    fn test_unconfigured_guard_refuses_everything() {
        let guard = AdminGuard::new(None);
        assert!(!guard.is_configured());
        assert!(guard.verify("").is_err());

        let blank = AdminGuard::new(Some(Secret::new(String::new())));
        assert!(blank.verify("").is_err());
    }

    #[test]
    fn test_debug_hides_key() {
        let guard = AdminGuard::new(Some(Secret::new("s3cret".to_string())));
        assert!(!format!("{:?}", guard).contains("s3cret"));
    }
}
