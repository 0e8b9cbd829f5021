//! Identity matching configuration.

use serde::{Deserialize, Serialize};

/// Organization-level switches for the matching rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    /// MRN-issuing organizations whose submissions are anonymized. Their
    /// birth dates are only reliable to the year and their NIs are not
    /// required to corroborate a match.
    pub anonymised_organizations: Vec<String>,
    /// MRN organizations whose numbers are stable across facilities, so an
    /// MRN may be used to find the same person in other feeds.
    pub nationally_stable_identifier_types: Vec<String>,
}

impl IdentityConfig {
    /// Whether `organization` is configured as anonymized.
    pub fn is_anonymised(&self, organization: &str) -> bool {
        self.anonymised_organizations
            .iter()
            .any(|o| o.eq_ignore_ascii_case(organization))
    }

    /// Whether MRNs issued by `organization` identify a person nationally.
    pub fn is_nationally_stable(&self, organization: &str) -> bool {
        self.nationally_stable_identifier_types
            .iter()
            .any(|o| o.eq_ignore_ascii_case(organization))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookups_ignore_case() {
        let config = IdentityConfig {
            anonymised_organizations: vec!["ANON".into()],
            nationally_stable_identifier_types: vec!["NHS".into()],
        };
        assert!(config.is_anonymised("anon"));
        assert!(!config.is_anonymised("LOCAL"));
        assert!(config.is_nationally_stable("nhs"));
    }
}
