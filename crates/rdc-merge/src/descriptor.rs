//! # Entity Descriptors
//!
//! One generic mapper serves every entity type. What differs per type is
//! data: how its natural key is derived, which leaves map to which columns,
//! and which child collections it owns with what cardinality and deletion
//! policy. A [`Catalogue`] holds the descriptors of one document shape.

use std::collections::BTreeMap;

use rdc_core::{KeyError, NaturalKey, Pid};
use serde::{Deserialize, Serialize};

use crate::document::Node;
use crate::error::MergeError;

/// How an entity's natural key is derived.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "rule", rename_all = "snake_case")]
pub enum KeyRule {
    /// The patient root: `{pid}`.
    Root,
    /// Position under the parent: `{parent}:{seq}`.
    Sequence,
    /// The parent's own key, for singleton children.
    Parent,
    /// A business identifier carried by the node: `{pid}:{value}`.
    BusinessId {
        /// Leaf holding the identifier.
        field: String,
    },
    /// An order line item: `{orderKey}:{prePostOrEmpty}:{serviceId}:{seq}`.
    OrderItem {
        /// Leaf holding the optional pre/post flag.
        pre_post: String,
        /// Leaf holding the service id.
        service: String,
    },
}

impl KeyRule {
    /// Derive the key of `node`, the `seq`-th item of its collection.
    pub fn derive(
        &self,
        kind: &str,
        node: &Node,
        pid: &Pid,
        parent: Option<&NaturalKey>,
        seq: usize,
    ) -> Result<NaturalKey, KeyError> {
        let require_parent = || {
            parent.ok_or_else(|| KeyError::MissingParent {
                kind: kind.to_string(),
            })
        };
        match self {
            Self::Root => Ok(NaturalKey::root(pid)),
            Self::Sequence => Ok(NaturalKey::child(require_parent()?, seq)),
            Self::Parent => Ok(NaturalKey::singleton(require_parent()?)),
            Self::BusinessId { field } => {
                let value = node
                    .field(field)
                    .and_then(|leaf| leaf.as_key_component())
                    .ok_or_else(|| KeyError::MissingBusinessId {
                        kind: kind.to_string(),
                        field: field.clone(),
                    })?;
                NaturalKey::order(pid, &value)
            }
            Self::OrderItem { pre_post, service } => {
                let order = require_parent()?;
                let service_id = node
                    .field(service)
                    .and_then(|leaf| leaf.as_key_component())
                    .ok_or_else(|| KeyError::MissingBusinessId {
                        kind: kind.to_string(),
                        field: service.clone(),
                    })?;
                let flag = node.field(pre_post).and_then(|leaf| leaf.as_key_component());
                Ok(NaturalKey::order_item(order, flag.as_deref(), &service_id, seq))
            }
        }
    }
}

/// A scalar leaf mapped onto a column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldSpec {
    /// Leaf name in the document.
    pub source: String,
    /// Persisted column.
    pub column: String,
    /// Whether the sender must always supply the leaf.
    #[serde(default)]
    pub mandatory: bool,
}

/// A coded leaf mapped onto a column triple; see
/// [`rdc_core::CodedValue::columns`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodedFieldSpec {
    /// Leaf name in the document.
    pub source: String,
    /// Base name of the three persisted columns.
    pub column: String,
    /// Whether the sender must always supply the leaf.
    #[serde(default)]
    pub mandatory: bool,
}

/// How many items a child collection may hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Cardinality {
    /// Any number.
    Many,
    /// At most one.
    Singleton,
}

/// When a persisted child missing from a submission is deleted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum DeletionPolicy {
    /// Every persisted child not re-confirmed is deleted.
    Full,
    /// Only children whose timestamp lies strictly inside the submitted
    /// window are deleted; without a window nothing is.
    Windowed {
        /// Column holding each child's defining timestamp.
        timestamp_column: String,
    },
    /// Absence is never conclusive.
    Never,
}

/// A child collection owned by an entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChildSpec {
    /// Collection name in the document.
    pub collection: String,
    /// Entity kind of the items.
    pub kind: String,
    /// Cardinality.
    pub cardinality: Cardinality,
    /// Deletion policy.
    pub deletion: DeletionPolicy,
}

/// Everything the mapper needs to know about one entity type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EntityDescriptor {
    /// Entity kind; also the record kind in storage.
    pub kind: String,
    /// Natural-key rule.
    pub key: KeyRule,
    /// Scalar fields.
    #[serde(default)]
    pub fields: Vec<FieldSpec>,
    /// Coded fields.
    #[serde(default)]
    pub coded: Vec<CodedFieldSpec>,
    /// Child collections.
    #[serde(default)]
    pub children: Vec<ChildSpec>,
}

impl EntityDescriptor {
    /// A descriptor with no fields or children.
    pub fn new(kind: &str, key: KeyRule) -> Self {
        Self {
            kind: kind.to_string(),
            key,
            fields: Vec::new(),
            coded: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Map leaf `source` onto column `column`.
    pub fn field(mut self, source: &str, column: &str) -> Self {
        self.fields.push(FieldSpec {
            source: source.to_string(),
            column: column.to_string(),
            mandatory: false,
        });
        self
    }

    /// Map a mandatory leaf.
    pub fn mandatory(mut self, source: &str, column: &str) -> Self {
        self.fields.push(FieldSpec {
            source: source.to_string(),
            column: column.to_string(),
            mandatory: true,
        });
        self
    }

    /// Map a coded leaf onto a column triple.
    pub fn coded(mut self, source: &str, column: &str) -> Self {
        self.coded.push(CodedFieldSpec {
            source: source.to_string(),
            column: column.to_string(),
            mandatory: false,
        });
        self
    }

    /// Declare a child collection.
    pub fn child(
        mut self,
        collection: &str,
        kind: &str,
        cardinality: Cardinality,
        deletion: DeletionPolicy,
    ) -> Self {
        self.children.push(ChildSpec {
            collection: collection.to_string(),
            kind: kind.to_string(),
            cardinality,
            deletion,
        });
        self
    }
}

/// The descriptors of one document shape, rooted at a patient entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Catalogue {
    root: String,
    descriptors: BTreeMap<String, EntityDescriptor>,
}

impl Catalogue {
    /// Build a catalogue and check that every child kind is described and
    /// the root uses the root key rule.
    pub fn new(root: &str, descriptors: Vec<EntityDescriptor>) -> Result<Self, MergeError> {
        let descriptors: BTreeMap<String, EntityDescriptor> = descriptors
            .into_iter()
            .map(|d| (d.kind.clone(), d))
            .collect();
        let catalogue = Self {
            root: root.to_string(),
            descriptors,
        };
        catalogue.validate()?;
        Ok(catalogue)
    }

    fn validate(&self) -> Result<(), MergeError> {
        let root = self.root()?;
        if root.key != KeyRule::Root {
            return Err(MergeError::InvalidDescriptor {
                kind: root.kind.clone(),
                reason: "the root entity must use the root key rule".into(),
            });
        }
        for descriptor in self.descriptors.values() {
            for child in &descriptor.children {
                let child_descriptor = self.get(&child.kind)?;
                if child_descriptor.key == KeyRule::Root {
                    return Err(MergeError::InvalidDescriptor {
                        kind: child.kind.clone(),
                        reason: "only the root entity may use the root key rule".into(),
                    });
                }
                if child_descriptor.key == KeyRule::Parent
                    && child.cardinality != Cardinality::Singleton
                {
                    return Err(MergeError::InvalidDescriptor {
                        kind: child.kind.clone(),
                        reason: "parent-keyed children must be singletons".into(),
                    });
                }
            }
        }
        Ok(())
    }

    /// The root descriptor.
    pub fn root(&self) -> Result<&EntityDescriptor, MergeError> {
        self.get(&self.root)
    }

    /// The descriptor of `kind`.
    pub fn get(&self, kind: &str) -> Result<&EntityDescriptor, MergeError> {
        self.descriptors
            .get(kind)
            .ok_or_else(|| MergeError::UnknownKind(kind.to_string()))
    }

    /// Every described kind.
    pub fn kinds(&self) -> impl Iterator<Item = &str> {
        self.descriptors.keys().map(String::as_str)
    }

    /// Replace the deletion policy of every collection holding `kind`.
    pub fn set_deletion_policy(&mut self, kind: &str, policy: DeletionPolicy) -> Result<(), MergeError> {
        self.get(kind)?;
        let mut applied = 0usize;
        for descriptor in self.descriptors.values_mut() {
            for child in descriptor.children.iter_mut().filter(|c| c.kind == kind) {
                child.deletion = policy.clone();
                applied += 1;
            }
        }
        if applied == 0 {
            return Err(MergeError::InvalidDescriptor {
                kind: kind.to_string(),
                reason: "no collection holds this kind".into(),
            });
        }
        tracing::debug!(kind, policy = ?policy, "deletion policy overridden");
        Ok(())
    }

    /// Apply a set of deletion-policy overrides.
    pub fn with_deletion_policies(
        mut self,
        overrides: &BTreeMap<String, DeletionPolicy>,
    ) -> Result<Self, MergeError> {
        for (kind, policy) in overrides {
            self.set_deletion_policy(kind, policy.clone())?;
        }
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Leaf;

    #[test]
    fn key_rules_follow_persisted_formats() {
        let pid = Pid::new("1000000001");
        let root = NaturalKey::root(&pid);
        let node = Node::new()
            .with("placer_id", Leaf::text("P1"))
            .with("service_id", Leaf::text("HB"))
            .with("pre_post", Leaf::text("PRE"));

        assert_eq!(KeyRule::Root.derive("patient", &node, &pid, None, 0).unwrap().as_str(), "1000000001");
        assert_eq!(
            KeyRule::Sequence.derive("name", &node, &pid, Some(&root), 2).unwrap().as_str(),
            "1000000001:2"
        );
        assert_eq!(
            KeyRule::Parent.derive("family_doctor", &node, &pid, Some(&root), 0).unwrap(),
            root
        );
        let order = KeyRule::BusinessId { field: "placer_id".into() }
            .derive("lab_order", &node, &pid, Some(&root), 5)
            .unwrap();
        assert_eq!(order.as_str(), "1000000001:P1");
        let item = KeyRule::OrderItem { pre_post: "pre_post".into(), service: "service_id".into() }
            .derive("result_item", &node, &pid, Some(&order), 0)
            .unwrap();
        assert_eq!(item.as_str(), "1000000001:P1:PRE:HB:0");

        let bare = Node::new().with("service_id", Leaf::text("HB"));
        let item = KeyRule::OrderItem { pre_post: "pre_post".into(), service: "service_id".into() }
            .derive("result_item", &bare, &pid, Some(&order), 1)
            .unwrap();
        assert_eq!(item.as_str(), "1000000001:P1::HB:1");
    }

    #[test]
    fn missing_components_are_key_errors() {
        let pid = Pid::new("1");
        let err = KeyRule::BusinessId { field: "placer_id".into() }
            .derive("lab_order", &Node::new(), &pid, None, 0)
            .unwrap_err();
        assert!(matches!(err, KeyError::MissingBusinessId { .. }));
        let err = KeyRule::Sequence.derive("name", &Node::new(), &pid, None, 0).unwrap_err();
        assert!(matches!(err, KeyError::MissingParent { .. }));
    }

    #[test]
    fn catalogue_rejects_unknown_children_and_misplaced_rules() {
        let patient = EntityDescriptor::new("patient", KeyRule::Root).child(
            "names",
            "name",
            Cardinality::Many,
            DeletionPolicy::Full,
        );
        assert!(matches!(
            Catalogue::new("patient", vec![patient.clone()]),
            Err(MergeError::UnknownKind(_))
        ));
        let doctor = EntityDescriptor::new("name", KeyRule::Parent);
        assert!(matches!(
            Catalogue::new("patient", vec![patient, doctor]),
            Err(MergeError::InvalidDescriptor { .. })
        ));
    }

    #[test]
    fn deletion_policy_override_applies_to_kind() {
        let patient = EntityDescriptor::new("patient", KeyRule::Root).child(
            "names",
            "name",
            Cardinality::Many,
            DeletionPolicy::Full,
        );
        let name = EntityDescriptor::new("name", KeyRule::Sequence);
        let mut catalogue = Catalogue::new("patient", vec![patient, name]).unwrap();
        catalogue.set_deletion_policy("name", DeletionPolicy::Never).unwrap();
        assert_eq!(
            catalogue.root().unwrap().children[0].deletion,
            DeletionPolicy::Never
        );
        assert!(catalogue.set_deletion_policy("patient", DeletionPolicy::Never).is_err());
        assert!(catalogue.set_deletion_policy("nothing", DeletionPolicy::Never).is_err());
    }

    #[test]
    fn deletion_policy_yaml_shape() {
        let policy: DeletionPolicy =
            serde_json::from_str(r#"{"policy":"windowed","timestamp_column":"observed_at"}"#).unwrap();
        assert_eq!(
            policy,
            DeletionPolicy::Windowed { timestamp_column: "observed_at".into() }
        );
        let never: DeletionPolicy = serde_json::from_str(r#"{"policy":"never"}"#).unwrap();
        assert_eq!(never, DeletionPolicy::Never);
    }
}
