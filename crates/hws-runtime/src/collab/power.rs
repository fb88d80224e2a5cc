//! Power profile interface.

use super::CollabError;

/// A selectable power profile.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PowerProfile {
    /// Provider-specific identifier.
    pub id: String,
    /// Human-readable name scripts select by.
    pub name: String,
}

/// Enumerates and activates power profiles.
pub trait PowerProfiles: Send + Sync {
    /// Lists available profiles.
    ///
    /// # Errors
    ///
    /// Returns [`CollabError`] if the provider cannot be queried.
    fn list(&self) -> Result<Vec<PowerProfile>, CollabError>;

    /// Activates a profile. Must run on the primary thread.
    ///
    /// # Errors
    ///
    /// Returns [`CollabError`] if activation fails.
    fn activate(&self, profile: &PowerProfile) -> Result<(), CollabError>;

    /// Finds a profile by name.
    ///
    /// # Errors
    ///
    /// Returns [`CollabError::NotFound`] if no profile has that name.
    fn find(&self, name: &str) -> Result<PowerProfile, CollabError> {
        self.list()?
            .into_iter()
            .find(|p| p.name == name)
            .ok_or_else(|| CollabError::NotFound(format!("power profile '{name}'")))
    }
}

/// Provider used when the platform exposes no power profiles.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPowerProfiles;

impl PowerProfiles for NoPowerProfiles {
    fn list(&self) -> Result<Vec<PowerProfile>, CollabError> {
        Ok(Vec::new())
    }

    fn activate(&self, profile: &PowerProfile) -> Result<(), CollabError> {
        Err(CollabError::NotFound(format!("power profile '{}'", profile.name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_provider_finds_nothing() {
        assert!(NoPowerProfiles.list().unwrap().is_empty());
        assert!(matches!(
            NoPowerProfiles.find("Balanced"),
            Err(CollabError::NotFound(_))
        ));
    }
}
