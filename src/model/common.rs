use uuid::Uuid;

pub type Id = String;

pub fn generate_id() -> Id {
    Uuid::new_v4().to_string()
}

/// Check whether a raw string is a well-formed opaque entity identifier.
///
/// Identifiers are UUID-shaped; anything else found in a reference-typed
/// property is treated as a business-key reference value instead.
pub fn is_entity_id(raw: &str) -> bool {
    Uuid::parse_str(raw.trim()).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_parse_back() {
        let id = generate_id();
        assert!(is_entity_id(&id));
    }

    #[test]
    fn business_keys_are_not_ids() {
        assert!(!is_entity_id("PUMP-001"));
        assert!(!is_entity_id(""));
        assert!(is_entity_id("  6f2d4db0-9b1c-4c55-a6f7-67e0e9d12345  "));
    }
}
