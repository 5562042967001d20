use crate::model::{
    Entity, EntitySchema, FieldDefinition, FieldType, Id, JoinType, NewJoinDefinition,
};
use crate::store::traits::Store;
use anyhow::Result;
use std::collections::HashMap;

const DEMO_ORG: &str = "demo-org";

fn entity(
    entity_type: &str,
    schema_id: &Id,
    path: &str,
    properties: HashMap<String, serde_json::Value>,
) -> Entity {
    Entity::new(
        DEMO_ORG.to_string(),
        entity_type,
        schema_id.clone(),
        path,
        properties,
    )
}

/// Load a small demo organization: a plant hierarchy of components owned by
/// teams, with one persisted join between them.
pub async fn load_seed_data<S: Store>(store: &S) -> Result<()> {
    let team_schema = store
        .upsert_schema(EntitySchema::new(
            DEMO_ORG.to_string(),
            "Team",
            vec![
                FieldDefinition::new("code", FieldType::Reference),
                FieldDefinition::new("name", FieldType::String),
            ],
        ))
        .await?;
    let assembly_schema = store
        .upsert_schema(EntitySchema::new(
            DEMO_ORG.to_string(),
            "Assembly",
            vec![
                FieldDefinition::new("code", FieldType::Reference),
                FieldDefinition::new("name", FieldType::String),
            ],
        ))
        .await?;
    let component_schema = store
        .upsert_schema(EntitySchema::new(
            DEMO_ORG.to_string(),
            "Component",
            vec![
                FieldDefinition::new("tag", FieldType::Reference),
                FieldDefinition::new("name", FieldType::String),
                FieldDefinition::new("owner", FieldType::EntityReference).with_target("Team"),
                FieldDefinition::new("assembly", FieldType::Reference).with_target("Assembly"),
                FieldDefinition::new("parts", FieldType::EntityReferenceArray)
                    .with_target("Component"),
            ],
        ))
        .await?;

    for (code, name, path) in [
        ("TEAM-ALPHA", "Alpha maintenance crew", "org.teams.alpha"),
        ("TEAM-BETA", "Beta maintenance crew", "org.teams.beta"),
    ] {
        store
            .upsert_entity(entity(
                "Team",
                &team_schema.id,
                path,
                HashMap::from([
                    ("code".to_string(), serde_json::json!(code)),
                    ("name".to_string(), serde_json::json!(name)),
                ]),
            ))
            .await?;
    }

    store
        .upsert_entity(entity(
            "Assembly",
            &assembly_schema.id,
            "org.assemblies.a100",
            HashMap::from([
                ("code".to_string(), serde_json::json!("ASM-100")),
                ("name".to_string(), serde_json::json!("Pump skid")),
            ]),
        ))
        .await?;

    for path in ["plant", "plant.line1", "plant.line2"] {
        store
            .upsert_entity(entity(
                "Component",
                &component_schema.id,
                path,
                HashMap::from([(
                    "tag".to_string(),
                    serde_json::json!(path.to_uppercase().replace('.', "-")),
                )]),
            ))
            .await?;
    }

    let impeller = store
        .upsert_entity(entity(
            "Component",
            &component_schema.id,
            "plant.line1.c101",
            HashMap::from([
                ("tag".to_string(), serde_json::json!("CMP-101")),
                ("name".to_string(), serde_json::json!("Impeller")),
                ("owner".to_string(), serde_json::json!("TEAM-ALPHA")),
            ]),
        ))
        .await?;
    store
        .upsert_entity(entity(
            "Component",
            &component_schema.id,
            "plant.line1.c100",
            HashMap::from([
                ("tag".to_string(), serde_json::json!("CMP-100")),
                ("name".to_string(), serde_json::json!("Feed pump")),
                ("owner".to_string(), serde_json::json!("TEAM-ALPHA")),
                ("assembly".to_string(), serde_json::json!("ASM-100")),
                ("parts".to_string(), serde_json::json!([impeller.id])),
            ]),
        ))
        .await?;
    store
        .upsert_entity(entity(
            "Component",
            &component_schema.id,
            "plant.line2.c200",
            HashMap::from([
                ("tag".to_string(), serde_json::json!("CMP-200")),
                ("name".to_string(), serde_json::json!("Conveyor drive")),
                ("owner".to_string(), serde_json::json!("TEAM-BETA")),
            ]),
        ))
        .await?;

    store
        .insert_join_definition(
            &DEMO_ORG.to_string(),
            &NewJoinDefinition {
                name: "components by owning team".to_string(),
                description: Some("Which team maintains which component".to_string()),
                join_type: JoinType::Reference,
                left_entity_type: "Component".to_string(),
                right_entity_type: "Team".to_string(),
                join_field: Some("owner".to_string()),
                left_filters: Vec::new(),
                right_filters: Vec::new(),
                sort_criteria: Vec::new(),
            },
            Some("owner".to_string()),
            Some(FieldType::EntityReference),
        )
        .await?;

    Ok(())
}
