//! Security Registry — field-name obfuscation for secured collections.
//!
//! Logical field names map through this registry to opaque UUIDs at rest;
//! the core only ever reads/writes via registry-resolved names, never the
//! obfuscated ones directly (§6, §9 "secured ORM models with field
//! obfuscation"). This is deliberately a thin deterministic mapping rather
//! than a cryptographic scheme — the spec treats encryption-at-rest as an
//! external concern ("cryptographic field-obfuscation at rest" is listed
//! among the out-of-scope collaborators in §1); what the core owns is the
//! logical-name <-> opaque-id mapping contract.

use dashmap::DashMap;
use uuid::Uuid;

pub struct SecurityRegistry {
    forward: DashMap<String, Uuid>,
    backward: DashMap<Uuid, String>,
}

impl Default for SecurityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl SecurityRegistry {
    pub fn new() -> Self {
        Self { forward: DashMap::new(), backward: DashMap::new() }
    }

    /// Resolve a logical field name to its opaque at-rest identifier,
    /// allocating one deterministically (keyed off the field name) on
    /// first use.
    pub fn resolve(&self, logical_field: &str) -> Uuid {
        if let Some(existing) = self.forward.get(logical_field) {
            return *existing;
        }
        let id = Uuid::new_v5(&Uuid::NAMESPACE_OID, logical_field.as_bytes());
        self.forward.insert(logical_field.to_string(), id);
        self.backward.insert(id, logical_field.to_string());
        id
    }

    pub fn logical_name(&self, opaque: Uuid) -> Option<String> {
        self.backward.get(&opaque).map(|s| s.clone())
    }

    /// Deterministic timestamp offset applied to values passing through a
    /// secured collection, per §6 ("timestamps pass through a deterministic
    /// offset"). Zero offset is a valid, explicit choice when no shift is
    /// configured.
    pub fn timestamp_offset_secs(&self) -> i64 {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolve_is_stable() {
        let reg = SecurityRegistry::new();
        let a = reg.resolve("consciousness_score");
        let b = reg.resolve("consciousness_score");
        assert_eq!(a, b);
    }

    #[test]
    fn different_fields_get_different_ids() {
        let reg = SecurityRegistry::new();
        assert_ne!(reg.resolve("field_a"), reg.resolve("field_b"));
    }

    #[test]
    fn backward_lookup_round_trips() {
        let reg = SecurityRegistry::new();
        let id = reg.resolve("reciprocity_balance");
        assert_eq!(reg.logical_name(id).as_deref(), Some("reciprocity_balance"));
    }
}
