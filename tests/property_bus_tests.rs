use carbus::*;
use std::sync::Arc;

const FAN_SPEED: PropertyId = 356517120;
const INFO_MODEL: PropertyId = 286261505;
const CABIN_TEMP: PropertyId = 358614275;
const ODOMETER: PropertyId = 291504644;

const AREA_LEFT: AreaId = 1;
const AREA_RIGHT: AreaId = 4;

fn fan_speed_declaration() -> ConfigDeclaration {
    let mut left = AreaConfig::new(AREA_LEFT);
    left.min_int32_value = 0;
    left.max_int32_value = 6;
    let mut right = AreaConfig::new(AREA_RIGHT);
    right.min_int32_value = 0;
    right.max_int32_value = 6;
    ConfigDeclaration::new(PropertyConfig {
        prop_id: FAN_SPEED,
        access: AccessMode::ReadWrite,
        change_mode: ChangeMode::OnChange,
        area_configs: vec![left, right],
        config_array: vec![],
        sample_rate_min: 0.0,
        sample_rate_max: 0.0,
        global: false,
    })
    .with_initial_value(RawPropValues::int32(vec![1]))
    .with_area_value(AREA_RIGHT, RawPropValues::int32(vec![2]))
}

fn declarations() -> Vec<ConfigDeclaration> {
    let model = ConfigDeclaration::new(PropertyConfig {
        prop_id: INFO_MODEL,
        access: AccessMode::Read,
        change_mode: ChangeMode::Static,
        area_configs: vec![],
        config_array: vec![],
        sample_rate_min: 0.0,
        sample_rate_max: 0.0,
        global: true,
    })
    .with_initial_value(RawPropValues::string("Emulated Vehicle"));

    // Global on-change property with no initial value.
    let cabin_temp = ConfigDeclaration::new(PropertyConfig {
        prop_id: CABIN_TEMP,
        access: AccessMode::ReadWrite,
        change_mode: ChangeMode::OnChange,
        area_configs: vec![],
        config_array: vec![],
        sample_rate_min: 0.0,
        sample_rate_max: 0.0,
        global: true,
    });

    // Write-only from the caller's perspective.
    let odometer = ConfigDeclaration::new(PropertyConfig {
        prop_id: ODOMETER,
        access: AccessMode::Write,
        change_mode: ChangeMode::OnChange,
        area_configs: vec![],
        config_array: vec![],
        sample_rate_min: 0.0,
        sample_rate_max: 0.0,
        global: true,
    });

    vec![fan_speed_declaration(), model, cabin_temp, odometer]
}

fn new_bus() -> PropertyBus {
    let baseline = InMemorySource::new("test baseline", declarations());
    PropertyBus::new(Arc::new(UnconnectedRealBus), &baseline, &[]).unwrap()
}

#[test]
fn test_set_then_get_roundtrip_with_fresh_timestamp() {
    let bus = new_bus();
    let before = bus.get(FAN_SPEED, AREA_LEFT).unwrap().timestamp;

    bus.set(PropertyValue::new(
        FAN_SPEED,
        AREA_LEFT,
        0,
        RawPropValues::int32(vec![5]),
    ))
    .unwrap();

    let after = bus.get(FAN_SPEED, AREA_LEFT).unwrap();
    assert_eq!(after.value.int32_values, vec![5]);
    assert!(after.timestamp >= before);
}

#[test]
fn test_unknown_property_is_invalid_argument() {
    let bus = new_bus();
    assert!(matches!(
        bus.get(999, 0),
        Err(BusError::InvalidArgument(_))
    ));
    assert!(matches!(
        bus.set(PropertyValue::new(999, 0, 0, RawPropValues::int32(vec![1]))),
        Err(BusError::InvalidArgument(_))
    ));
}

#[test]
fn test_unsupported_area_is_invalid_argument() {
    let bus = new_bus();
    assert!(matches!(
        bus.get(FAN_SPEED, 16),
        Err(BusError::InvalidArgument(_))
    ));
    assert!(matches!(
        bus.set(PropertyValue::new(
            FAN_SPEED,
            16,
            0,
            RawPropValues::int32(vec![1])
        )),
        Err(BusError::InvalidArgument(_))
    ));
}

#[test]
fn test_global_property_ignores_area_id() {
    let bus = new_bus();
    // Any areaId resolves to 0 for a global property.
    let value = bus.get(INFO_MODEL, 12345).unwrap();
    assert_eq!(value.area_id, AREA_ID_GLOBAL);
    assert_eq!(value.value.string_value.as_deref(), Some("Emulated Vehicle"));
}

#[test]
fn test_access_mode_enforced() {
    let bus = new_bus();
    assert!(matches!(
        bus.set(PropertyValue::new(
            INFO_MODEL,
            0,
            0,
            RawPropValues::string("hacked")
        )),
        Err(BusError::AccessDenied(_))
    ));
    assert!(matches!(
        bus.get(ODOMETER, 0),
        Err(BusError::AccessDenied(_))
    ));
    assert!(bus
        .set(PropertyValue::new(
            ODOMETER,
            0,
            0,
            RawPropValues::float(vec![12000.5])
        ))
        .is_ok());
}

#[test]
fn test_absent_value_is_not_available_until_first_set() {
    let bus = new_bus();
    assert!(matches!(
        bus.get(CABIN_TEMP, 0),
        Err(BusError::NotAvailable(_))
    ));

    bus.set(PropertyValue::new(
        CABIN_TEMP,
        0,
        0,
        RawPropValues::float(vec![21.5]),
    ))
    .unwrap();
    assert_eq!(
        bus.get(CABIN_TEMP, 0).unwrap().value.float_values,
        vec![21.5]
    );
}

#[test]
fn test_out_of_range_set_is_invalid_argument() {
    let bus = new_bus();
    assert!(matches!(
        bus.set(PropertyValue::new(
            FAN_SPEED,
            AREA_LEFT,
            0,
            RawPropValues::int32(vec![7])
        )),
        Err(BusError::InvalidArgument(_))
    ));
    // The rejected set must not clobber the stored value.
    assert_eq!(
        bus.get(FAN_SPEED, AREA_LEFT).unwrap().value.int32_values,
        vec![1]
    );
}

#[test]
fn test_zero_zero_bounds_disable_range_check() {
    let bus = new_bus();
    // CABIN_TEMP is global with no declared areas, so no bounds apply.
    assert!(bus
        .set(PropertyValue::new(
            CABIN_TEMP,
            0,
            0,
            RawPropValues::float(vec![9999.0])
        ))
        .is_ok());
}

#[test]
fn test_per_area_seeding_with_global_fallback() {
    let bus = new_bus();
    // Left area fell back to the global initial value, right had its own.
    assert_eq!(
        bus.get(FAN_SPEED, AREA_LEFT).unwrap().value.int32_values,
        vec![1]
    );
    assert_eq!(
        bus.get(FAN_SPEED, AREA_RIGHT).unwrap().value.int32_values,
        vec![2]
    );
}

#[test]
fn test_config_enumeration() {
    let bus = new_bus();
    assert_eq!(bus.all_property_configs().len(), 4);

    let config = bus.property_config(FAN_SPEED).unwrap();
    assert_eq!(config.change_mode, ChangeMode::OnChange);
    assert_eq!(config.supported_area_ids(), vec![AREA_LEFT, AREA_RIGHT]);
    assert!(bus.property_config(999).is_none());
}

#[test]
fn test_overlay_redefines_property_wholesale() {
    let baseline = InMemorySource::new("baseline", declarations());
    let mut redefined = fan_speed_declaration();
    redefined.config.access = AccessMode::Read;
    let overlay = InMemorySource::new("overlay", vec![redefined]);

    let bus = PropertyBus::new(
        Arc::new(UnconnectedRealBus),
        &baseline,
        &[&overlay as &dyn DeclarationSource],
    )
    .unwrap();

    assert!(matches!(
        bus.set(PropertyValue::new(
            FAN_SPEED,
            AREA_LEFT,
            0,
            RawPropValues::int32(vec![3])
        )),
        Err(BusError::AccessDenied(_))
    ));
}
