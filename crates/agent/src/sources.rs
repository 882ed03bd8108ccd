//! Role to knowledge-source mapping.
//!
//! Built once from an immutable [`SourcesConfig`]. A role enables an ordered
//! list of scopes; each scope resolves to a collection through exactly one
//! selector. Unknown roles resolve to nothing.

use mimir_config::SourcesConfig;
use mimir_core::knowledge::Scope;
use mimir_store::naming::{personal_collection, role_collection};
use serde::Serialize;
use std::collections::HashMap;
use tracing::warn;

/// How a scope picks its collection.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "kind", content = "collection", rename_all = "snake_case")]
pub enum CollectionSelector {
    Fixed(String),
    /// The collection named after the session's role
    OwnedByRole,
    /// The collection owned by the requesting user
    OwnedByUser,
}

impl CollectionSelector {
    pub fn resolve(&self, role: &str, user_id: &str) -> String {
        match self {
            Self::Fixed(id) => id.clone(),
            Self::OwnedByRole => role_collection(role),
            Self::OwnedByUser => personal_collection(user_id),
        }
    }
}

/// One enabled scope of a role, before per-request resolution.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct SourceSlot {
    pub scope: Scope,
    pub selector: CollectionSelector,
}

/// A slot resolved against a concrete session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedSource {
    pub scope: Scope,
    pub collection_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceDescriptor {
    pub scope: Scope,
    pub label: String,
    pub description: String,
}

#[derive(Debug, Clone)]
pub struct SourceRegistry {
    common_collection: String,
    data_mart_collection: String,
    roles: HashMap<String, Vec<Scope>>,
    order: Vec<String>,
}

impl SourceRegistry {
    pub fn new(config: &SourcesConfig) -> Self {
        let mut roles = HashMap::new();
        let mut order = Vec::new();
        for role in &config.roles {
            let mut scopes: Vec<Scope> = Vec::new();
            for tag in &role.scopes {
                match tag.parse::<Scope>() {
                    Ok(scope) if !scopes.contains(&scope) => scopes.push(scope),
                    Ok(_) => {}
                    Err(e) => warn!(role = %role.name, error = %e, "Ignoring scope tag"),
                }
            }
            if roles.insert(role.name.clone(), scopes).is_none() {
                order.push(role.name.clone());
            }
        }
        Self {
            common_collection: config.common_collection.clone(),
            data_mart_collection: config.data_mart_collection.clone(),
            roles,
            order,
        }
    }

    /// Configured roles, in configuration order.
    pub fn roles(&self) -> &[String] {
        &self.order
    }

    pub fn has_role(&self, role: &str) -> bool {
        self.roles.contains_key(role)
    }

    pub fn common_collection(&self) -> &str {
        &self.common_collection
    }

    pub fn data_mart_collection(&self) -> &str {
        &self.data_mart_collection
    }

    fn selector(&self, scope: Scope) -> CollectionSelector {
        match scope {
            Scope::Common => CollectionSelector::Fixed(self.common_collection.clone()),
            Scope::DataMart => CollectionSelector::Fixed(self.data_mart_collection.clone()),
            Scope::RoleSpecific => CollectionSelector::OwnedByRole,
            Scope::Personal => CollectionSelector::OwnedByUser,
        }
    }

    /// Ordered slots for a role; empty for an unknown role.
    pub fn sources_for(&self, role: &str) -> Vec<SourceSlot> {
        self.roles
            .get(role)
            .map(|scopes| {
                scopes
                    .iter()
                    .map(|&scope| SourceSlot {
                        scope,
                        selector: self.selector(scope),
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Concrete collections for one session.
    pub fn resolve(&self, role: &str, user_id: &str) -> Vec<ResolvedSource> {
        self.sources_for(role)
            .into_iter()
            .map(|slot| ResolvedSource {
                scope: slot.scope,
                collection_id: slot.selector.resolve(role, user_id),
            })
            .collect()
    }

    pub fn describe(&self, role: &str) -> Vec<SourceDescriptor> {
        self.sources_for(role)
            .into_iter()
            .map(|slot| {
                let (label, description) = match slot.scope {
                    Scope::Common => ("common_knowledge", "Shared knowledge base and documentation".to_string()),
                    Scope::DataMart => ("data_mart", "Business metrics and analytical data".to_string()),
                    Scope::RoleSpecific => ("role_specific", format!("Content specific to the {role} role")),
                    Scope::Personal => ("user_documents", "Your uploaded documents and files".to_string()),
                };
                SourceDescriptor {
                    scope: slot.scope,
                    label: label.to_string(),
                    description,
                }
            })
            .collect()
    }
}

/// Attribution label stored on a passage at ingestion time.
pub fn source_label(scope: Scope, collection_id: &str, document: &str) -> String {
    if document.is_empty() {
        format!("{scope}:{collection_id}")
    } else {
        format!("{scope}:{collection_id}/{document}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mimir_config::RoleSources;

    fn config() -> SourcesConfig {
        SourcesConfig {
            common_collection: "common_kb".into(),
            data_mart_collection: "mart".into(),
            roles: vec![
                RoleSources {
                    name: "Analyst-Gaming".into(),
                    scopes: vec!["personal".into(), "common".into(), "role".into(), "common".into()],
                },
                RoleSources {
                    name: "viewer".into(),
                    scopes: vec!["common".into()],
                },
                RoleSources {
                    name: "locked".into(),
                    scopes: vec![],
                },
            ],
        }
    }

    #[test]
    fn sources_keep_order_and_collapse_duplicates() {
        let registry = SourceRegistry::new(&config());
        let scopes: Vec<_> = registry.sources_for("Analyst-Gaming").into_iter().map(|s| s.scope).collect();
        assert_eq!(scopes, vec![Scope::Personal, Scope::Common, Scope::RoleSpecific]);
    }

    #[test]
    fn sources_for_is_idempotent() {
        let registry = SourceRegistry::new(&config());
        for role in ["Analyst-Gaming", "viewer", "locked", "ghost"] {
            assert_eq!(registry.sources_for(role), registry.sources_for(role));
        }
    }

    #[test]
    fn unknown_role_has_no_sources() {
        let registry = SourceRegistry::new(&config());
        assert!(registry.sources_for("ghost").is_empty());
        assert!(registry.resolve("ghost", "u1").is_empty());
        assert!(!registry.has_role("ghost"));
    }

    #[test]
    fn selectors_resolve_per_session() {
        let registry = SourceRegistry::new(&config());
        let resolved = registry.resolve("Analyst-Gaming", "alice@example.com");
        let ids: Vec<_> = resolved.iter().map(|r| r.collection_id.as_str()).collect();
        let personal = personal_collection("alice@example.com");
        assert!(personal.starts_with("user_docs_alice_example_com_"));
        assert_eq!(ids, vec![personal.as_str(), "common_kb", "role_analyst-gaming"]);
    }

    #[test]
    fn describe_uses_role_in_role_specific_text() {
        let registry = SourceRegistry::new(&SourcesConfig::default());
        let described = registry.describe("Leadership-Gaming");
        assert_eq!(described.len(), 4);
        let role = described.iter().find(|d| d.scope == Scope::RoleSpecific).unwrap();
        assert!(role.description.contains("Leadership-Gaming"));
        assert_eq!(registry.roles().len(), 4);
    }

    #[test]
    fn labels_carry_scope_and_collection() {
        assert_eq!(source_label(Scope::Personal, "user_docs_u1", "policy.txt"), "personal:user_docs_u1/policy.txt");
        assert_eq!(source_label(Scope::Common, "common_kb", ""), "common:common_kb");
    }
}
