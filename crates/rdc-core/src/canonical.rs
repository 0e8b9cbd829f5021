//! # Canonical Serialization — JCS Byte Production
//!
//! `CanonicalBytes` is the sole construction path for bytes used in digest
//! computation. Document snapshots attached to investigations are addressed
//! by the SHA-256 of these bytes, so two submissions of the same logical
//! document must produce the same byte sequence.
//!
//! ## Rules
//!
//! 1. Serialization uses `serde_jcs` (RFC 8785): sorted keys, compact
//!    separators, deterministic number formatting.
//! 2. Volatile fields are removed before serialization. They are addressed by
//!    JSON pointer (RFC 6901), e.g. `/header/sent_at` for the transmission
//!    timestamp that differs on every resend of the same data.
//!    A pointer that does not resolve is ignored.

use serde::Serialize;
use serde_json::Value;

use crate::error::CanonicalizationError;

/// Bytes produced exclusively by JCS canonicalization.
///
/// The inner `Vec<u8>` is private; the only constructors are
/// [`CanonicalBytes::new()`] and [`CanonicalBytes::without_fields()`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CanonicalBytes(Vec<u8>);

impl CanonicalBytes {
    /// Construct canonical bytes from any serializable value.
    pub fn new(obj: &impl Serialize) -> Result<Self, CanonicalizationError> {
        let value = serde_json::to_value(obj)?;
        Ok(Self(serialize_canonical(&value)?))
    }

    /// Construct canonical bytes after removing the fields addressed by
    /// `volatile` (JSON pointers).
    ///
    /// # Errors
    ///
    /// Returns `CanonicalizationError::InvalidPointer` if a pointer is neither
    /// empty nor starts with `/`.
    pub fn without_fields<S: AsRef<str>>(
        obj: &impl Serialize,
        volatile: &[S],
    ) -> Result<Self, CanonicalizationError> {
        let mut value = serde_json::to_value(obj)?;
        for pointer in volatile {
            remove_pointer(&mut value, pointer.as_ref())?;
        }
        Ok(Self(serialize_canonical(&value)?))
    }

    /// Access the canonical bytes for digest computation.
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Returns the length of the canonical byte sequence.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Returns true if the canonical byte sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl AsRef<[u8]> for CanonicalBytes {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

/// Remove the value addressed by `pointer` from `root`.
fn remove_pointer(root: &mut Value, pointer: &str) -> Result<(), CanonicalizationError> {
    if pointer.is_empty() {
        // The empty pointer addresses the whole document; stripping it makes
        // every document identical, which is never what a caller wants.
        return Ok(());
    }
    let Some((parent, last)) = pointer.rsplit_once('/') else {
        return Err(CanonicalizationError::InvalidPointer(pointer.to_string()));
    };
    if !parent.is_empty() && !parent.starts_with('/') {
        return Err(CanonicalizationError::InvalidPointer(pointer.to_string()));
    }
    let last = last.replace("~1", "/").replace("~0", "~");

    match root.pointer_mut(parent) {
        Some(Value::Object(map)) => {
            map.remove(&last);
        }
        Some(Value::Array(items)) => {
            if let Some(i) = last.parse::<usize>().ok().filter(|i| *i < items.len()) {
                items.remove(i);
            }
        }
        _ => {}
    }
    Ok(())
}

fn serialize_canonical(value: &Value) -> Result<Vec<u8>, CanonicalizationError> {
    let s = serde_jcs::to_string(value)?;
    Ok(s.into_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sorted_keys_compact() {
        let data = serde_json::json!({"b": 2, "a": 1, "c": "hello"});
        let cb = CanonicalBytes::new(&data).expect("should canonicalize");
        assert_eq!(cb.as_bytes(), br#"{"a":1,"b":2,"c":"hello"}"#);
    }

    #[test]
    fn nested_objects_sorted() {
        let data = serde_json::json!({"outer": {"b": 2, "a": 1}, "list": [3, 2, 1]});
        let cb = CanonicalBytes::new(&data).unwrap();
        assert_eq!(cb.as_bytes(), br#"{"list":[3,2,1],"outer":{"a":1,"b":2}}"#);
    }

    #[test]
    fn decimal_values_are_accepted() {
        let data = serde_json::json!({"value": 1.5});
        let cb = CanonicalBytes::new(&data).unwrap();
        assert_eq!(cb.as_bytes(), br#"{"value":1.5}"#);
    }

    #[test]
    fn volatile_field_is_removed() {
        let data = serde_json::json!({
            "header": {"sending_facility": "RXX", "sent_at": "2026-01-01T10:00:00Z"},
            "patient": {"gender": "F"}
        });
        let cb = CanonicalBytes::without_fields(&data, &["/header/sent_at"]).unwrap();
        assert_eq!(
            cb.as_bytes(),
            br#"{"header":{"sending_facility":"RXX"},"patient":{"gender":"F"}}"#
        );
    }

    #[test]
    fn resends_with_different_transmission_time_are_identical() {
        let a = serde_json::json!({"header": {"sending_facility": "RXX", "sent_at": "2026-01-01T10:00:00Z"}});
        let b = serde_json::json!({"header": {"sending_facility": "RXX", "sent_at": "2026-03-09T17:45:12Z"}});
        let volatile = ["/header/sent_at"];
        assert_eq!(
            CanonicalBytes::without_fields(&a, &volatile).unwrap(),
            CanonicalBytes::without_fields(&b, &volatile).unwrap()
        );
    }

    #[test]
    fn unresolved_pointer_is_ignored() {
        let data = serde_json::json!({"a": 1});
        let cb = CanonicalBytes::without_fields(&data, &["/missing/deeper"]).unwrap();
        assert_eq!(cb.as_bytes(), br#"{"a":1}"#);
    }

    #[test]
    fn pointer_into_array_and_escapes() {
        let data = serde_json::json!({"a/b": [{"x": 1, "y": 2}]});
        let cb = CanonicalBytes::without_fields(&data, &["/a~1b/0/y"]).unwrap();
        assert_eq!(cb.as_bytes(), br#"{"a/b":[{"x":1}]}"#);
    }

    #[test]
    fn top_level_pointer_and_scalar_parent() {
        let data = serde_json::json!({"a": 1, "b": {"c": 2}});
        let cb = CanonicalBytes::without_fields(&data, &["/a", "/b/c/d"]).unwrap();
        assert_eq!(cb.as_bytes(), br#"{"b":{"c":2}}"#);
    }

    #[test]
    fn relative_pointer_rejected() {
        let data = serde_json::json!({"a": 1});
        let result = CanonicalBytes::without_fields(&data, &["a"]);
        assert!(matches!(result, Err(CanonicalizationError::InvalidPointer(_))));
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn json_value() -> impl Strategy<Value = Value> {
        let leaf = prop_oneof![
            Just(Value::Null),
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(|n| serde_json::json!(n)),
            "[a-zA-Z0-9_ ]{0,20}".prop_map(Value::String),
        ];
        leaf.prop_recursive(3, 32, 6, |inner| {
            prop_oneof![
                prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
                prop::collection::btree_map("[a-z]{1,8}", inner, 0..6)
                    .prop_map(|m| Value::Object(m.into_iter().collect())),
            ]
        })
    }

    proptest! {
        #[test]
        fn canonicalization_is_deterministic(value in json_value()) {
            let a = CanonicalBytes::new(&value).unwrap();
            let b = CanonicalBytes::new(&value).unwrap();
            prop_assert_eq!(a, b);
        }

        #[test]
        fn stripping_absent_field_is_identity(value in json_value()) {
            let plain = CanonicalBytes::new(&value).unwrap();
            let stripped = CanonicalBytes::without_fields(&value, &["/__absent__"]).unwrap();
            prop_assert_eq!(plain, stripped);
        }
    }
}
