use crate::config::{ConfigCatalog, PropertyConfig, GATING_PROPERTIES};
use crate::error::BusError;
use crate::table::PropertyTable;
use crate::types::{AreaId, PropertyId, RawPropValues};
use tracing::error;

/// Requested direction of a property access.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessIntent {
    Read,
    Write,
}

/// Fails with `AccessDenied` unless the property's resolved access mode
/// (area-level, falling back to property-level) permits the intent.
pub fn check_access(
    config: &PropertyConfig,
    area_id: AreaId,
    intent: AccessIntent,
) -> Result<(), BusError> {
    let access = config.access_at(area_id);
    let permitted = match intent {
        AccessIntent::Read => access.can_read(),
        AccessIntent::Write => access.can_write(),
    };
    if permitted {
        Ok(())
    } else {
        let direction = match intent {
            AccessIntent::Read => "read",
            AccessIntent::Write => "write",
        };
        Err(BusError::AccessDenied(format!(
            "property {} doesn't have {direction} permission",
            config.prop_id
        )))
    }
}

/// Checks every numeric element of the payload against the area's declared
/// bounds for its type.
///
/// A bounds pair of exactly `(0, 0)` disables the check for that type.
/// Areas without a declared config, and non-numeric payloads, skip range
/// checking entirely. Fails with `InvalidArgument` on the first
/// out-of-range element.
pub fn check_range(
    config: &PropertyConfig,
    area_id: AreaId,
    values: &RawPropValues,
) -> Result<(), BusError> {
    let Some(area) = config.area_config(area_id) else {
        return Ok(());
    };

    if let Some((min, max)) = area.int32_bounds() {
        for &v in &values.int32_values {
            if v < min || v > max {
                error!(
                    prop_id = config.prop_id,
                    area_id, min, max, value = v,
                    "int32 value outside the declared range"
                );
                return Err(BusError::InvalidArgument(format!(
                    "value {v} outside range [{min}, {max}] for property {} area {area_id}",
                    config.prop_id
                )));
            }
        }
    }

    if let Some((min, max)) = area.int64_bounds() {
        for &v in &values.int64_values {
            if v < min || v > max {
                error!(
                    prop_id = config.prop_id,
                    area_id, min, max, value = v,
                    "int64 value outside the declared range"
                );
                return Err(BusError::InvalidArgument(format!(
                    "value {v} outside range [{min}, {max}] for property {} area {area_id}",
                    config.prop_id
                )));
            }
        }
    }

    if let Some((min, max)) = area.float_bounds() {
        for &v in &values.float_values {
            if v < min || v > max {
                error!(
                    prop_id = config.prop_id,
                    area_id, min, max, value = v,
                    "float value outside the declared range"
                );
                return Err(BusError::InvalidArgument(format!(
                    "value {v} outside range [{min}, {max}] for property {} area {area_id}",
                    config.prop_id
                )));
            }
        }
    }

    Ok(())
}

/// Checks the dependency gate for a property.
///
/// A property is gated when some gating property's `config_array` lists it.
/// The gate is read at the gating property's declared area whose bitmask
/// contains the requested areaId. No matching gate area is
/// `InvalidArgument`; a missing gate value or a first int32 element of zero
/// means the dependent is `NotAvailable`.
///
/// Reads the gating value straight from the already-locked table so the
/// check never re-enters the dispatcher's lock.
pub fn check_dependency_available(
    catalog: &ConfigCatalog,
    table: &PropertyTable,
    prop_id: PropertyId,
    area_id: AreaId,
) -> Result<(), BusError> {
    for &gate_id in GATING_PROPERTIES {
        if gate_id == prop_id {
            continue;
        }
        let Some(gate_config) = catalog.config_for(gate_id) else {
            continue;
        };
        if !gate_config.config_array.contains(&prop_id) {
            continue;
        }

        let gate_area_id = if gate_config.is_global() {
            if area_id != 0 {
                return Err(BusError::InvalidArgument(format!(
                    "no area of gating property {gate_id} matches area {area_id}"
                )));
            }
            0
        } else {
            gate_config
                .area_configs
                .iter()
                .map(|a| a.area_id)
                .find(|&gate_area| gate_area & area_id == area_id)
                .ok_or_else(|| {
                    BusError::InvalidArgument(format!(
                        "no area of gating property {gate_id} matches area {area_id}"
                    ))
                })?
        };

        let gate_on = table
            .get(gate_id, gate_area_id)
            .and_then(|v| v.value.int32_values.first().copied())
            .is_some_and(|first| first != 0);
        if !gate_on {
            return Err(BusError::NotAvailable(format!(
                "property {prop_id} is unavailable while gating property {gate_id} is off"
            )));
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{props, AreaConfig, ConfigDeclaration, InMemorySource};
    use crate::types::{AccessMode, ChangeMode, PropertyValue};

    const FAN_SPEED: PropertyId = 356517120;

    fn bounded_config() -> PropertyConfig {
        let mut area = AreaConfig::new(1);
        area.min_int32_value = 0;
        area.max_int32_value = 6;
        area.min_float_value = -10.0;
        area.max_float_value = 10.0;
        PropertyConfig {
            prop_id: FAN_SPEED,
            access: AccessMode::ReadWrite,
            change_mode: ChangeMode::OnChange,
            area_configs: vec![area],
            config_array: vec![],
            sample_rate_min: 0.0,
            sample_rate_max: 0.0,
            global: false,
        }
    }

    #[test]
    fn test_access_intent_checks() {
        let mut config = bounded_config();
        config.access = AccessMode::Read;
        assert!(check_access(&config, 1, AccessIntent::Read).is_ok());
        assert!(matches!(
            check_access(&config, 1, AccessIntent::Write),
            Err(BusError::AccessDenied(_))
        ));

        config.access = AccessMode::None;
        assert!(check_access(&config, 1, AccessIntent::Read).is_err());
    }

    #[test]
    fn test_area_access_override_wins() {
        let mut config = bounded_config();
        config.area_configs[0].access = Some(AccessMode::Read);
        assert!(check_access(&config, 1, AccessIntent::Write).is_err());
        assert!(check_access(&config, 1, AccessIntent::Read).is_ok());
    }

    #[test]
    fn test_range_check_per_type() {
        let config = bounded_config();
        assert!(check_range(&config, 1, &RawPropValues::int32(vec![0, 3, 6])).is_ok());
        assert!(matches!(
            check_range(&config, 1, &RawPropValues::int32(vec![3, 7])),
            Err(BusError::InvalidArgument(_))
        ));
        assert!(check_range(&config, 1, &RawPropValues::float(vec![-10.0, 9.5])).is_ok());
        assert!(check_range(&config, 1, &RawPropValues::float(vec![10.5])).is_err());
        // int64 bounds are (0, 0), so any int64 payload passes.
        assert!(check_range(&config, 1, &RawPropValues::int64(vec![i64::MAX])).is_ok());
        // Non-numeric payloads skip range checking.
        assert!(check_range(&config, 1, &RawPropValues::string("free text")).is_ok());
    }

    #[test]
    fn test_range_check_skipped_without_area_config() {
        let config = bounded_config();
        assert!(check_range(&config, 99, &RawPropValues::int32(vec![1000])).is_ok());
    }

    fn gated_fixture(gate_value: Option<i32>) -> (ConfigCatalog, PropertyTable) {
        let gate = PropertyConfig {
            prop_id: props::HVAC_POWER_ON,
            access: AccessMode::ReadWrite,
            change_mode: ChangeMode::OnChange,
            area_configs: vec![AreaConfig::new(5)],
            config_array: vec![FAN_SPEED],
            sample_rate_min: 0.0,
            sample_rate_max: 0.0,
            global: false,
        };
        let source = InMemorySource::new(
            "test",
            vec![
                ConfigDeclaration::new(gate),
                ConfigDeclaration::new(bounded_config()),
            ],
        );
        let catalog = ConfigCatalog::from_sources(&source, &[]).unwrap();
        let mut table = PropertyTable::new();
        if let Some(v) = gate_value {
            table.put(PropertyValue::new(
                props::HVAC_POWER_ON,
                5,
                100,
                RawPropValues::int32(vec![v]),
            ));
        }
        (catalog, table)
    }

    #[test]
    fn test_gate_on_permits_dependent() {
        let (catalog, table) = gated_fixture(Some(1));
        assert!(check_dependency_available(&catalog, &table, FAN_SPEED, 1).is_ok());
        assert!(check_dependency_available(&catalog, &table, FAN_SPEED, 4).is_ok());
    }

    #[test]
    fn test_gate_off_makes_dependent_unavailable() {
        let (catalog, table) = gated_fixture(Some(0));
        assert!(matches!(
            check_dependency_available(&catalog, &table, FAN_SPEED, 1),
            Err(BusError::NotAvailable(_))
        ));
    }

    #[test]
    fn test_missing_gate_value_means_unavailable() {
        let (catalog, table) = gated_fixture(None);
        assert!(matches!(
            check_dependency_available(&catalog, &table, FAN_SPEED, 1),
            Err(BusError::NotAvailable(_))
        ));
    }

    #[test]
    fn test_no_matching_gate_area_is_invalid() {
        let (catalog, table) = gated_fixture(Some(1));
        // Area 8 is not contained in the gate's area bitmask 5.
        assert!(matches!(
            check_dependency_available(&catalog, &table, FAN_SPEED, 8),
            Err(BusError::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_ungated_property_passes() {
        let (catalog, table) = gated_fixture(Some(0));
        assert!(check_dependency_available(&catalog, &table, 42, 1).is_ok());
    }
}
