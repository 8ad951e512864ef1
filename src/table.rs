use crate::config::ConfigCatalog;
use crate::types::{AreaId, PropKey, PropertyId, PropertyValue, AREA_ID_GLOBAL};
use std::collections::HashMap;
use tracing::debug;

/// Mutable current-value store keyed by (propId, areaId).
///
/// Holds at most one value per key. Absence means "not available", not a
/// default: a declared property with no initial value stays out of the
/// table until the first successful set.
#[derive(Debug, Default)]
pub struct PropertyTable {
    values: HashMap<PropKey, PropertyValue>,
}

impl PropertyTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, prop_id: PropertyId, area_id: AreaId) -> Option<&PropertyValue> {
        self.values.get(&PropKey::new(prop_id, area_id))
    }

    /// Overwrites unconditionally.
    pub fn put(&mut self, value: PropertyValue) {
        self.values.insert(value.key(), value);
    }

    /// Re-stamps an existing value with a fresh timestamp and returns the
    /// updated copy. Used by the periodic sampler; a property that never
    /// received a value yields `None`.
    pub fn refresh_timestamp(
        &mut self,
        prop_id: PropertyId,
        area_id: AreaId,
        timestamp: i64,
    ) -> Option<PropertyValue> {
        let value = self.values.get_mut(&PropKey::new(prop_id, area_id))?;
        value.timestamp = timestamp;
        Some(value.clone())
    }

    /// Seeds initial values from the catalog's declarations.
    ///
    /// Global properties store their global initial value at area 0, if one
    /// was declared. Properties with areas store the per-area initial value
    /// when present, falling back to the global initial value, else staying
    /// empty.
    pub fn seed(&mut self, catalog: &ConfigCatalog, timestamp: i64) {
        for declaration in catalog.declarations() {
            let config = &declaration.config;

            if config.is_global() {
                if let Some(initial) = &declaration.initial_value {
                    self.put(PropertyValue::new(
                        config.prop_id,
                        AREA_ID_GLOBAL,
                        timestamp,
                        initial.clone(),
                    ));
                }
                continue;
            }

            for area in &config.area_configs {
                let initial = declaration
                    .initial_area_values
                    .get(&area.area_id)
                    .or(declaration.initial_value.as_ref());
                if let Some(initial) = initial {
                    self.put(PropertyValue::new(
                        config.prop_id,
                        area.area_id,
                        timestamp,
                        initial.clone(),
                    ));
                }
            }
        }
        debug!(seeded = self.values.len(), "property table seeded");
    }
}
