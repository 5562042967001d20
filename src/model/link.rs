use crate::model::{is_entity_id, Entity, EntitySchema, FieldDefinition, FieldType, Id};
use std::collections::HashSet;

/// Property keys recognized as link-holding when no schema is available.
/// The schema-driven path is authoritative; this set is a best-effort
/// fallback for legacy records.
pub const LINK_FIELD_CANDIDATES: [&str; 8] = [
    "linked_ids",
    "linkedIds",
    "linked_entities",
    "linkedEntities",
    "linked_entity_id",
    "linkedEntityId",
    "linked_entity_ids",
    "linkedEntityIds",
];

pub fn is_link_field_name(name: &str) -> bool {
    LINK_FIELD_CANDIDATES
        .iter()
        .any(|candidate| candidate.eq_ignore_ascii_case(name))
}

/// A reference to another entity discovered in a parent's properties.
///
/// `ByReference` identifiers always carry a non-empty target entity type;
/// classification drops values for which no target can be determined.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LinkIdentifier {
    ById { id: Id },
    ByReference { value: String, target_entity_type: String },
}

impl LinkIdentifier {
    /// Deduplication key: stable across casing of the target type.
    pub fn cache_key(&self) -> String {
        match self {
            LinkIdentifier::ById { id } => format!("id:{id}"),
            LinkIdentifier::ByReference {
                value,
                target_entity_type,
            } => format!("ref:{}:{}", target_entity_type.to_lowercase(), value),
        }
    }
}

/// Classify one populated field value into link identifiers.
///
/// Direct reference kinds (ENTITY_REFERENCE, ENTITY_REFERENCE_ARRAY,
/// ENTITY_ID) yield `ById` links when the value parses as an identifier;
/// otherwise the value is downgraded to a business-key reference against the
/// field's declared target type. REFERENCE-kind fields are outbound links
/// only when they declare a target; without one they are the entity's own
/// business key and yield nothing. For the direct kinds, `self_type_fallback`
/// decides whether an undeclared target defaults to the parent's own type or
/// the value is dropped as unresolvable.
pub fn classify_field_value(
    field: &FieldDefinition,
    raw: &serde_json::Value,
    parent_entity_type: &str,
    self_type_fallback: bool,
) -> Vec<LinkIdentifier> {
    if !field.field_type.is_reference_like() {
        return Vec::new();
    }

    let declared = field.declared_target().map(str::to_string);
    let target = match field.field_type {
        FieldType::Reference => declared,
        _ => declared.or_else(|| {
            if self_type_fallback {
                Some(parent_entity_type.to_string())
            } else {
                None
            }
        }),
    };

    let mut links = Vec::new();
    for value in string_values(raw) {
        match field.field_type {
            FieldType::Reference => {
                if let Some(target) = &target {
                    links.push(LinkIdentifier::ByReference {
                        value,
                        target_entity_type: target.clone(),
                    });
                }
            }
            _ => {
                if is_entity_id(&value) {
                    links.push(LinkIdentifier::ById { id: value });
                } else if let Some(target) = &target {
                    links.push(LinkIdentifier::ByReference {
                        value,
                        target_entity_type: target.clone(),
                    });
                }
            }
        }
    }
    links
}

/// Collect every link identifier held by an entity's properties, deduplicated
/// by cache key in discovery order.
///
/// With a schema, reference-like fields drive the walk. Without one, only the
/// recognized link-like property names are scanned and their values treated
/// as direct identifiers.
pub fn collect_link_identifiers(
    entity: &Entity,
    schema: Option<&EntitySchema>,
    self_type_fallback: bool,
) -> Vec<LinkIdentifier> {
    let mut links = Vec::new();

    match schema {
        Some(schema) => {
            for field in &schema.fields {
                if !field.field_type.is_reference_like() {
                    continue;
                }
                if let Some(raw) = entity.properties.get(&field.name) {
                    links.extend(classify_field_value(
                        field,
                        raw,
                        &entity.entity_type,
                        self_type_fallback,
                    ));
                }
            }
        }
        None => {
            for (key, raw) in &entity.properties {
                if !is_link_field_name(key) {
                    continue;
                }
                for value in string_values(raw) {
                    links.push(LinkIdentifier::ById { id: value });
                }
            }
        }
    }

    let mut seen = HashSet::new();
    links.retain(|link| seen.insert(link.cache_key()));
    links
}

fn string_values(raw: &serde_json::Value) -> Vec<String> {
    match raw {
        serde_json::Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                Vec::new()
            } else {
                vec![trimmed.to_string()]
            }
        }
        serde_json::Value::Array(items) => items
            .iter()
            .filter_map(|item| item.as_str())
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::generate_id;
    use std::collections::HashMap;

    fn entity_with(properties: HashMap<String, serde_json::Value>) -> Entity {
        Entity::new(
            "org-1".to_string(),
            "Component",
            "schema-1".to_string(),
            "plant.line1",
            properties,
        )
    }

    fn component_schema() -> EntitySchema {
        EntitySchema::new(
            "org-1".to_string(),
            "Component",
            vec![
                FieldDefinition::new("name", FieldType::String),
                FieldDefinition::new("owner", FieldType::EntityReference).with_target("Team"),
                FieldDefinition::new("parts", FieldType::EntityReferenceArray).with_target("Part"),
                FieldDefinition::new("assembly", FieldType::Reference).with_target("Assembly"),
                FieldDefinition::new("twin", FieldType::EntityReference),
            ],
        )
    }

    #[test]
    fn entity_reference_with_valid_id_is_by_id() {
        let id = generate_id();
        let schema = component_schema();
        let field = schema.find_field("owner").unwrap();
        let links = classify_field_value(field, &serde_json::json!(id), "Component", true);
        assert_eq!(links, vec![LinkIdentifier::ById { id }]);
    }

    #[test]
    fn entity_reference_with_business_key_falls_back_to_declared_target() {
        let schema = component_schema();
        let field = schema.find_field("owner").unwrap();
        let links = classify_field_value(field, &serde_json::json!("TEAM-A"), "Component", true);
        assert_eq!(
            links,
            vec![LinkIdentifier::ByReference {
                value: "TEAM-A".to_string(),
                target_entity_type: "Team".to_string(),
            }]
        );
    }

    #[test]
    fn reference_kind_is_always_a_business_key() {
        let schema = component_schema();
        let field = schema.find_field("assembly").unwrap();
        // Even an id-shaped value stays a business key for REFERENCE fields.
        let id = generate_id();
        let links = classify_field_value(field, &serde_json::json!(id), "Component", true);
        assert_eq!(
            links,
            vec![LinkIdentifier::ByReference {
                value: id,
                target_entity_type: "Assembly".to_string(),
            }]
        );
    }

    #[test]
    fn undeclared_reference_field_is_the_entitys_own_key() {
        let field = FieldDefinition::new("tag", FieldType::Reference);
        let links = classify_field_value(&field, &serde_json::json!("CMP-1"), "Component", true);
        assert!(links.is_empty());
    }

    #[test]
    fn array_fields_yield_one_link_per_element() {
        let schema = component_schema();
        let field = schema.find_field("parts").unwrap();
        let a = generate_id();
        let b = generate_id();
        let links =
            classify_field_value(field, &serde_json::json!([a, b, "  "]), "Component", true);
        assert_eq!(links.len(), 2);
    }

    // The parent-type default for undeclared targets is policy, not verified
    // original behavior; both settings are exercised here.
    #[test]
    fn undeclared_target_defaults_to_parent_type_when_policy_allows() {
        let schema = component_schema();
        let field = schema.find_field("twin").unwrap();
        let links = classify_field_value(field, &serde_json::json!("CMP-7"), "Component", true);
        assert_eq!(
            links,
            vec![LinkIdentifier::ByReference {
                value: "CMP-7".to_string(),
                target_entity_type: "Component".to_string(),
            }]
        );
    }

    #[test]
    fn undeclared_target_is_dropped_when_policy_disallows() {
        let schema = component_schema();
        let field = schema.find_field("twin").unwrap();
        let links = classify_field_value(field, &serde_json::json!("CMP-7"), "Component", false);
        assert!(links.is_empty());
    }

    #[test]
    fn collection_deduplicates_across_fields() {
        let id = generate_id();
        let schema = component_schema();
        let entity = entity_with(HashMap::from([
            ("owner".to_string(), serde_json::json!(id)),
            ("parts".to_string(), serde_json::json!([id])),
        ]));
        let links = collect_link_identifiers(&entity, Some(&schema), true);
        assert_eq!(links.len(), 1);
    }

    #[test]
    fn schemaless_fallback_uses_recognized_keys_only() {
        let id = generate_id();
        let entity = entity_with(HashMap::from([
            ("linked_ids".to_string(), serde_json::json!([id.clone()])),
            ("unrelated".to_string(), serde_json::json!("x")),
        ]));
        let links = collect_link_identifiers(&entity, None, true);
        assert_eq!(links, vec![LinkIdentifier::ById { id }]);
    }

    #[test]
    fn non_reference_fields_produce_nothing() {
        let schema = component_schema();
        let entity = entity_with(HashMap::from([(
            "name".to_string(),
            serde_json::json!("pump"),
        )]));
        assert!(collect_link_identifiers(&entity, Some(&schema), true).is_empty());
    }

    #[test]
    fn cache_key_is_case_insensitive_on_target_type() {
        let a = LinkIdentifier::ByReference {
            value: "K-1".to_string(),
            target_entity_type: "Team".to_string(),
        };
        let b = LinkIdentifier::ByReference {
            value: "K-1".to_string(),
            target_entity_type: "TEAM".to_string(),
        };
        assert_eq!(a.cache_key(), b.cache_key());
    }
}
