//! # Coded Values
//!
//! A coded value is a `(code, coding standard, description)` triple, e.g.
//! `("N18.5", "ICD-10", "Chronic kidney disease, stage 5")`. The merge engine
//! writes the three persisted columns together or clears them together.

use serde::{Deserialize, Serialize};

/// A code drawn from a coding standard, with its human-readable description.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CodedValue {
    /// The code itself.
    pub code: String,
    /// The coding standard the code belongs to (e.g. "SNOMED", "ICD-10", "LOCAL").
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub coding_standard: Option<String>,
    /// Human-readable description of the code.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

impl CodedValue {
    /// Create a coded value with all three components.
    pub fn new(
        code: impl Into<String>,
        coding_standard: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            code: code.into(),
            coding_standard: Some(coding_standard.into()),
            description: Some(description.into()),
        }
    }

    /// Create a bare code with neither standard nor description.
    pub fn bare(code: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            coding_standard: None,
            description: None,
        }
    }

    /// Persisted column names for a coded field: `{base}_code`, `{base}_codestd`,
    /// `{base}_codedesc`.
    pub fn columns(base: &str) -> [String; 3] {
        [
            format!("{base}_code"),
            format!("{base}_codestd"),
            format!("{base}_codedesc"),
        ]
    }
}

impl std::fmt::Display for CodedValue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.coding_standard {
            Some(std) => write!(f, "{std}:{}", self.code),
            None => f.write_str(&self.code),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn column_names() {
        assert_eq!(
            CodedValue::columns("drug_product_generic"),
            [
                "drug_product_generic_code".to_string(),
                "drug_product_generic_codestd".to_string(),
                "drug_product_generic_codedesc".to_string(),
            ]
        );
    }

    #[test]
    fn display_with_and_without_standard() {
        assert_eq!(CodedValue::new("N18.5", "ICD-10", "CKD 5").to_string(), "ICD-10:N18.5");
        assert_eq!(CodedValue::bare("X").to_string(), "X");
    }

    #[test]
    fn serde_omits_missing_components() {
        let json = serde_json::to_string(&CodedValue::bare("X")).unwrap();
        assert_eq!(json, r#"{"code":"X"}"#);
        let back: CodedValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, CodedValue::bare("X"));
    }
}
