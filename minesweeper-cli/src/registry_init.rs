//! Registry initialization
//!
//! This module registers every record type the binary saves or loads.

use anyhow::{Context, Result};
use games_minesweeper::GameSave;
use reflect_core::{register_types, Registry};
use tracing::info;

/// Register all record types with `registry`
pub fn register_all(registry: &Registry) -> Result<()> {
    register_types!(registry, GameSave).context("failed to register record types")
}

/// Initialize the process-wide registry
///
/// This function should be called once at startup, before any save is loaded.
pub fn initialize_registry() -> Result<&'static Registry> {
    let registry = reflect_core::shared();
    register_all(registry)?;

    info!(
        types = registry.registered_types().len(),
        converters = registry.serializable_types().len(),
        "initialized registry"
    );
    for class in registry.registered_types() {
        info!(class = %class, fields = ?registry.get_field_names_of(&class), "registered type");
    }
    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_all() {
        let registry = Registry::new();
        register_all(&registry).unwrap();

        assert!(registry.is_registered("GameSave"));
        assert_eq!(
            registry.get_field_names_of("GameSave"),
            vec!["over", "mine", "step", "areas"]
        );
        assert_eq!(registry.get_method_names("GameSave"), vec!["reveal"]);
    }

    #[test]
    fn test_initialize_shared_registry_twice() {
        let first = initialize_registry().unwrap();
        let second = initialize_registry().unwrap();
        assert!(std::ptr::eq(first, second));
        assert!(first.is_registered("GameSave"));
    }
}
