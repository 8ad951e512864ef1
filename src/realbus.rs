use crate::config::PropertyConfig;
use crate::error::BusError;
use crate::types::{AreaId, PropertyId, PropertyValue, SubscribeOptions};
use tracing::debug;

/// The real hardware bus collaborator.
///
/// The emulator forwards the fixed set of special properties here verbatim
/// and does not interpret their payloads. It also asks the real bus for the
/// authoritative config of each special property at construction.
pub trait RealBus: Send + Sync {
    /// Authoritative config for a special property, if the real bus knows
    /// it. Overrides any declaration metadata at construction.
    fn property_config(&self, prop_id: PropertyId) -> Option<PropertyConfig>;

    fn get(&self, prop_id: PropertyId, area_id: AreaId) -> Result<PropertyValue, BusError>;

    fn set(&self, value: &PropertyValue) -> Result<(), BusError>;

    fn subscribe(&self, options: &SubscribeOptions) -> Result<(), BusError>;

    fn unsubscribe(&self, prop_id: PropertyId) -> Result<(), BusError>;
}

/// Stand-in for deployments with no real bus attached: every delegated
/// operation fails with `NotAvailable`.
#[derive(Debug, Default)]
pub struct UnconnectedRealBus;

impl RealBus for UnconnectedRealBus {
    fn property_config(&self, _prop_id: PropertyId) -> Option<PropertyConfig> {
        None
    }

    fn get(&self, prop_id: PropertyId, _area_id: AreaId) -> Result<PropertyValue, BusError> {
        debug!(prop_id, "get delegated with no real bus attached");
        Err(BusError::NotAvailable("no real bus attached".into()))
    }

    fn set(&self, value: &PropertyValue) -> Result<(), BusError> {
        debug!(prop_id = value.prop_id, "set delegated with no real bus attached");
        Err(BusError::NotAvailable("no real bus attached".into()))
    }

    fn subscribe(&self, options: &SubscribeOptions) -> Result<(), BusError> {
        debug!(prop_id = options.prop_id, "subscribe delegated with no real bus attached");
        Err(BusError::NotAvailable("no real bus attached".into()))
    }

    fn unsubscribe(&self, prop_id: PropertyId) -> Result<(), BusError> {
        debug!(prop_id, "unsubscribe delegated with no real bus attached");
        Err(BusError::NotAvailable("no real bus attached".into()))
    }
}
