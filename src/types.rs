use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Integer identifier of a semantic vehicle signal (e.g. fan speed).
pub type PropertyId = i32;

/// Bitmask identifying a vehicle zone a property value applies to.
/// `0` for global properties.
pub type AreaId = i32;

/// The area id used for global properties.
pub const AREA_ID_GLOBAL: AreaId = 0;

/// Read/write permission of a property, mirroring the hardware bus access
/// modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AccessMode {
    None,
    Read,
    Write,
    ReadWrite,
}

impl AccessMode {
    pub fn can_read(self) -> bool {
        matches!(self, AccessMode::Read | AccessMode::ReadWrite)
    }

    pub fn can_write(self) -> bool {
        matches!(self, AccessMode::Write | AccessMode::ReadWrite)
    }
}

/// How a property's value evolves over time.
///
/// `Static` properties never change and cannot be subscribed. `OnChange`
/// properties notify subscribers on every successful set. `Continuous`
/// properties are re-delivered periodically at a negotiated sample rate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChangeMode {
    Static,
    OnChange,
    Continuous,
}

/// Composite key identifying one stored value: a property at one area.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PropKey {
    pub prop_id: PropertyId,
    pub area_id: AreaId,
}

impl PropKey {
    pub fn new(prop_id: PropertyId, area_id: AreaId) -> Self {
        Self { prop_id, area_id }
    }
}

/// Typed payload of a property value. Only the vector(s) relevant to the
/// property's declared type are populated; the rest stay empty.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawPropValues {
    #[serde(default)]
    pub int32_values: Vec<i32>,
    #[serde(default)]
    pub int64_values: Vec<i64>,
    #[serde(default)]
    pub float_values: Vec<f32>,
    #[serde(default, with = "serde_bytes")]
    pub byte_values: Vec<u8>,
    #[serde(default)]
    pub string_value: Option<String>,
}

impl RawPropValues {
    pub fn int32(values: Vec<i32>) -> Self {
        Self {
            int32_values: values,
            ..Self::default()
        }
    }

    pub fn int64(values: Vec<i64>) -> Self {
        Self {
            int64_values: values,
            ..Self::default()
        }
    }

    pub fn float(values: Vec<f32>) -> Self {
        Self {
            float_values: values,
            ..Self::default()
        }
    }

    pub fn bytes(values: Vec<u8>) -> Self {
        Self {
            byte_values: values,
            ..Self::default()
        }
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self {
            string_value: Some(value.into()),
            ..Self::default()
        }
    }

    /// `true` if no payload vector carries any data.
    pub fn is_empty(&self) -> bool {
        self.int32_values.is_empty()
            && self.int64_values.is_empty()
            && self.float_values.is_empty()
            && self.byte_values.is_empty()
            && self.string_value.is_none()
    }
}

/// One property value as stored in the table and delivered to subscribers.
///
/// The timestamp is monotonic nanoseconds, stamped on every write. Absence
/// of a `PropertyValue` in the table means "not available", never a default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PropertyValue {
    pub prop_id: PropertyId,
    pub area_id: AreaId,
    pub timestamp: i64,
    pub value: RawPropValues,
}

impl PropertyValue {
    pub fn new(
        prop_id: PropertyId,
        area_id: AreaId,
        timestamp: i64,
        value: RawPropValues,
    ) -> Self {
        Self {
            prop_id,
            area_id,
            timestamp,
            value,
        }
    }

    pub fn key(&self) -> PropKey {
        PropKey::new(self.prop_id, self.area_id)
    }
}

/// One subscription request entry.
///
/// Empty `area_ids` means "every supported area" of the property. The
/// sample rate only applies to `Continuous` properties and is clamped into
/// the property's declared rate bounds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubscribeOptions {
    pub prop_id: PropertyId,
    #[serde(default)]
    pub area_ids: Vec<AreaId>,
    #[serde(default)]
    pub sample_rate: f32,
}

/// Receives property events for one subscription client.
///
/// Callbacks are always invoked with no internal lock held; a slow callback
/// delays only its own deliveries.
pub trait PropertyEventCallback: Send + Sync {
    fn on_property_event(&self, value: PropertyValue);
}

/// Monotonic clock stamping property writes, anchored at bus construction.
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    start: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn now_nanos(&self) -> i64 {
        self.start.elapsed().as_nanos() as i64
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}
