use crate::error::{DeclarationError, StartupError};
use crate::types::{AccessMode, AreaId, ChangeMode, PropertyId, RawPropValues};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Well-known property ids the emulator treats specially.
pub mod props {
    use crate::types::PropertyId;

    /// Gates the availability of the HVAC properties listed in its
    /// `config_array`.
    pub const HVAC_POWER_ON: PropertyId = 354419984;

    /// Never simulated; always delegated to the real bus.
    pub const VEHICLE_MAP_SERVICE: PropertyId = 299895808;

    /// Never simulated; always delegated to the real bus.
    pub const OBD2_FREEZE_FRAME_CLEAR: PropertyId = 299896067;
}

/// The fixed set of properties this emulator does not simulate. Get/Set/
/// Subscribe/Unsubscribe for these are forwarded verbatim to the real bus.
pub const SPECIAL_PROPERTIES: &[PropertyId] =
    &[props::VEHICLE_MAP_SERVICE, props::OBD2_FREEZE_FRAME_CLEAR];

/// Properties whose value gates the availability of other properties. A
/// gating property lists its dependents in its `config_array`.
pub const GATING_PROPERTIES: &[PropertyId] = &[props::HVAC_POWER_ON];

/// Checks if a property belongs to the fixed special set.
pub fn is_special(prop_id: PropertyId) -> bool {
    SPECIAL_PROPERTIES.contains(&prop_id)
}

/// Per-area configuration of one property.
///
/// A `(min, max)` pair of exactly `(0, 0)` means "unbounded" for that type,
/// matching the hardware bus convention.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AreaConfig {
    pub area_id: AreaId,
    /// Area-level access override; falls back to the property-level mode.
    #[serde(default)]
    pub access: Option<AccessMode>,
    #[serde(default)]
    pub min_int32_value: i32,
    #[serde(default)]
    pub max_int32_value: i32,
    #[serde(default)]
    pub min_int64_value: i64,
    #[serde(default)]
    pub max_int64_value: i64,
    #[serde(default)]
    pub min_float_value: f32,
    #[serde(default)]
    pub max_float_value: f32,
}

impl AreaConfig {
    /// An unbounded area config with no access override.
    pub fn new(area_id: AreaId) -> Self {
        Self {
            area_id,
            access: None,
            min_int32_value: 0,
            max_int32_value: 0,
            min_int64_value: 0,
            max_int64_value: 0,
            min_float_value: 0.0,
            max_float_value: 0.0,
        }
    }

    pub fn int32_bounds(&self) -> Option<(i32, i32)> {
        if self.min_int32_value == 0 && self.max_int32_value == 0 {
            None
        } else {
            Some((self.min_int32_value, self.max_int32_value))
        }
    }

    pub fn int64_bounds(&self) -> Option<(i64, i64)> {
        if self.min_int64_value == 0 && self.max_int64_value == 0 {
            None
        } else {
            Some((self.min_int64_value, self.max_int64_value))
        }
    }

    pub fn float_bounds(&self) -> Option<(f32, f32)> {
        if self.min_float_value == 0.0 && self.max_float_value == 0.0 {
            None
        } else {
            Some((self.min_float_value, self.max_float_value))
        }
    }
}

/// Immutable per-property configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyConfig {
    pub prop_id: PropertyId,
    pub access: AccessMode,
    pub change_mode: ChangeMode,
    #[serde(default)]
    pub area_configs: Vec<AreaConfig>,
    /// Opaque config metadata. For gating properties this lists the propIds
    /// made unavailable while the gate is off.
    #[serde(default)]
    pub config_array: Vec<i32>,
    /// Sample rate bounds in Hz; only meaningful for `Continuous`.
    #[serde(default)]
    pub sample_rate_min: f32,
    #[serde(default)]
    pub sample_rate_max: f32,
    /// When `true` the areaId is ignored and fixed to 0.
    #[serde(default)]
    pub global: bool,
}

impl PropertyConfig {
    /// A property with no declared areas is global with one implicit area 0.
    pub fn is_global(&self) -> bool {
        self.global || self.area_configs.is_empty()
    }

    pub fn area_config(&self, area_id: AreaId) -> Option<&AreaConfig> {
        self.area_configs.iter().find(|a| a.area_id == area_id)
    }

    pub fn supported_area_ids(&self) -> Vec<AreaId> {
        self.area_configs.iter().map(|a| a.area_id).collect()
    }

    /// Resolves the access mode at an area, falling back to the
    /// property-level mode.
    pub fn access_at(&self, area_id: AreaId) -> AccessMode {
        self.area_config(area_id)
            .and_then(|a| a.access)
            .unwrap_or(self.access)
    }
}

/// One property declaration handed over by the external config parser: the
/// property configuration plus optional initial values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConfigDeclaration {
    pub config: PropertyConfig,
    /// Global initial value; also the per-area fallback.
    #[serde(default)]
    pub initial_value: Option<RawPropValues>,
    /// Per-area initial values, taking precedence over `initial_value`.
    #[serde(default)]
    pub initial_area_values: HashMap<AreaId, RawPropValues>,
}

impl ConfigDeclaration {
    pub fn new(config: PropertyConfig) -> Self {
        Self {
            config,
            initial_value: None,
            initial_area_values: HashMap::new(),
        }
    }

    pub fn with_initial_value(mut self, value: RawPropValues) -> Self {
        self.initial_value = Some(value);
        self
    }

    pub fn with_area_value(mut self, area_id: AreaId, value: RawPropValues) -> Self {
        self.initial_area_values.insert(area_id, value);
        self
    }
}

/// Boundary to the external declaration parser. The file format lives
/// entirely on the other side of this trait; the catalog only ever sees
/// already-structured declarations.
pub trait DeclarationSource {
    /// Name used in logs when a source is skipped.
    fn name(&self) -> &str;

    fn load(&self) -> Result<Vec<ConfigDeclaration>, DeclarationError>;
}

/// A declaration source backed by an in-memory list, used by tests and
/// embedded demo configurations.
#[derive(Debug, Clone)]
pub struct InMemorySource {
    name: String,
    declarations: Vec<ConfigDeclaration>,
}

impl InMemorySource {
    pub fn new(name: impl Into<String>, declarations: Vec<ConfigDeclaration>) -> Self {
        Self {
            name: name.into(),
            declarations,
        }
    }
}

impl DeclarationSource for InMemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self) -> Result<Vec<ConfigDeclaration>, DeclarationError> {
        Ok(self.declarations.clone())
    }
}

/// Immutable per-property configuration catalog, built once at bus
/// construction from an ordered list of declaration sources.
///
/// Later declarations for the same propId override earlier ones in full,
/// config and initial values both, never field-by-field.
#[derive(Debug, Default)]
pub struct ConfigCatalog {
    declarations: HashMap<PropertyId, ConfigDeclaration>,
}

impl ConfigCatalog {
    /// Builds the catalog from the mandatory baseline source plus optional
    /// overlay sources.
    ///
    /// A failing baseline is fatal. A failing overlay is skipped with a
    /// warning so one malformed overlay cannot prevent the emulator from
    /// starting.
    pub fn from_sources(
        baseline: &dyn DeclarationSource,
        overlays: &[&dyn DeclarationSource],
    ) -> Result<Self, StartupError> {
        let mut catalog = Self::default();
        catalog.absorb(baseline.load()?);
        debug!(
            source = baseline.name(),
            properties = catalog.declarations.len(),
            "loaded baseline declarations"
        );

        for overlay in overlays {
            match overlay.load() {
                Ok(declarations) => {
                    debug!(
                        source = overlay.name(),
                        properties = declarations.len(),
                        "applying overlay declarations"
                    );
                    catalog.absorb(declarations);
                }
                Err(e) => {
                    warn!(source = overlay.name(), error = %e, "skipping overlay");
                }
            }
        }

        Ok(catalog)
    }

    fn absorb(&mut self, declarations: Vec<ConfigDeclaration>) {
        for declaration in declarations {
            self.declarations
                .insert(declaration.config.prop_id, declaration);
        }
    }

    /// Replaces one property's config wholesale, keeping any declared
    /// initial values. Used only for special properties whose authoritative
    /// config comes from the real bus.
    pub(crate) fn override_config(&mut self, config: PropertyConfig) {
        let prop_id = config.prop_id;
        self.declarations
            .entry(prop_id)
            .and_modify(|d| d.config = config.clone())
            .or_insert_with(|| ConfigDeclaration::new(config));
        debug!(prop_id, "special property config taken from the real bus");
    }

    pub fn config_for(&self, prop_id: PropertyId) -> Option<&PropertyConfig> {
        self.declarations.get(&prop_id).map(|d| &d.config)
    }

    pub fn is_global(&self, prop_id: PropertyId) -> bool {
        self.config_for(prop_id).is_some_and(PropertyConfig::is_global)
    }

    /// Empty for unknown properties and for global properties with no
    /// declared areas.
    pub fn supported_area_ids(&self, prop_id: PropertyId) -> Vec<AreaId> {
        self.config_for(prop_id)
            .map(PropertyConfig::supported_area_ids)
            .unwrap_or_default()
    }

    pub fn declarations(&self) -> impl Iterator<Item = &ConfigDeclaration> {
        self.declarations.values()
    }

    pub fn configs(&self) -> impl Iterator<Item = &PropertyConfig> {
        self.declarations.values().map(|d| &d.config)
    }
}
