//! # Ingest Configuration
//!
//! One YAML document configures the whole stack. Every field has a default,
//! so an empty file (or no file) yields a working configuration:
//!
//! ```yaml
//! reference_utc_offset_secs: 0
//! anonymised_organizations: [ANON]
//! nationally_stable_identifier_types: [NHS, CHI, HSC]
//! volatile_fields: [/header/sent_at]
//! deletion_policies:
//!   diagnosis: { policy: never }
//!   encounter: { policy: windowed, timestamp_column: started_at }
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use rdc_core::ReferenceZone;
use rdc_identity::IdentityConfig;
use rdc_investigate::InvestigationConfig;
use rdc_merge::{clinical_catalogue, Catalogue, DeletionPolicy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors loading or applying configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("cannot read configuration {path}: {source}")]
    Io {
        /// Path that failed.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The configuration is not valid YAML or has the wrong shape.
    #[error("invalid configuration: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// The configuration parsed but a value is out of range.
    #[error("invalid configuration value: {0}")]
    Invalid(String),
}

/// Stack-wide configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// UTC offset, in seconds, of the zone stored datetimes are expressed in.
    pub reference_utc_offset_secs: i32,
    /// MRN organizations whose submissions are anonymized.
    pub anonymised_organizations: Vec<String>,
    /// MRN organizations whose numbers identify a person nationally.
    pub nationally_stable_identifier_types: Vec<String>,
    /// JSON pointers excluded from document digests.
    pub volatile_fields: Vec<String>,
    /// Per-kind deletion-policy overrides for the clinical catalogue.
    pub deletion_policies: BTreeMap<String, DeletionPolicy>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            reference_utc_offset_secs: 0,
            anonymised_organizations: Vec::new(),
            nationally_stable_identifier_types: vec!["NHS".into(), "CHI".into(), "HSC".into()],
            volatile_fields: InvestigationConfig::default().volatile_fields,
            deletion_policies: BTreeMap::new(),
        }
    }
}

impl IngestConfig {
    /// Parse a YAML configuration.
    pub fn from_yaml_str(yaml: &str) -> Result<Self, ConfigError> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: Self = serde_yaml::from_str(yaml)?;
        config.reference_zone()?;
        Ok(config)
    }

    /// Read and parse a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let config = Self::from_yaml_str(&content)?;
        tracing::debug!(path = %path.display(), "configuration loaded");
        Ok(config)
    }

    /// Matching switches for the identity engine.
    pub fn identity_config(&self) -> IdentityConfig {
        IdentityConfig {
            anonymised_organizations: self.anonymised_organizations.clone(),
            nationally_stable_identifier_types: self.nationally_stable_identifier_types.clone(),
        }
    }

    /// Digest settings for investigations.
    pub fn investigation_config(&self) -> InvestigationConfig {
        InvestigationConfig {
            volatile_fields: self.volatile_fields.clone(),
        }
    }

    /// The zone stored datetimes are expressed in.
    pub fn reference_zone(&self) -> Result<ReferenceZone, ConfigError> {
        ReferenceZone::from_offset_secs(self.reference_utc_offset_secs)
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }

    /// The clinical catalogue with this configuration's overrides applied.
    pub fn catalogue(&self) -> Result<Catalogue, ConfigError> {
        clinical_catalogue()
            .and_then(|c| c.with_deletion_policies(&self.deletion_policies))
            .map_err(|e| ConfigError::Invalid(e.to_string()))
    }
}
