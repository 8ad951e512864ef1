use crate::config::{is_special, ConfigCatalog, DeclarationSource, PropertyConfig, SPECIAL_PROPERTIES};
use crate::error::{BusError, StartupError};
use crate::guard::{self, AccessIntent};
use crate::realbus::RealBus;
use crate::registry::{ClientId, SubscriptionRegistry, UpdaterHandle};
use crate::scheduler::{Scheduler, UpdaterSpec};
use crate::table::PropertyTable;
use crate::types::{
    AreaId, ChangeMode, MonotonicClock, PropKey, PropertyEventCallback, PropertyId,
    PropertyValue, SubscribeOptions, AREA_ID_GLOBAL,
};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, warn};

/// The single mutual-exclusion domain of one emulated bus: the value table,
/// the subscription registry, and the scheduler's updater index (held
/// inside the registry).
pub(crate) struct CoreState {
    pub(crate) table: PropertyTable,
    pub(crate) registry: SubscriptionRegistry,
}

impl CoreState {
    pub(crate) fn new() -> Self {
        Self {
            table: PropertyTable::new(),
            registry: SubscriptionRegistry::new(),
        }
    }
}

/// Handle identifying one subscription client of a [`PropertyBus`].
///
/// Created by [`PropertyBus::new_subscription_client`]; passed to
/// subscribe/unsubscribe and consumed by
/// [`PropertyBus::disconnect_client`], which tears down everything the
/// client owns.
#[derive(Debug)]
pub struct SubscriptionClient {
    id: ClientId,
}

/// The emulated vehicle hardware property bus.
///
/// Answers Get/Set/Subscribe/Unsubscribe with the same contract a real
/// hardware bus would: access-mode checks, value-range validation,
/// dependency-gated availability, on-change fan-out, and periodic sampling
/// for continuous properties. The fixed set of special properties is
/// forwarded verbatim to the real bus collaborator.
pub struct PropertyBus {
    catalog: ConfigCatalog,
    real_bus: Arc<dyn RealBus>,
    clock: MonotonicClock,
    state: Arc<Mutex<CoreState>>,
    scheduler: Scheduler,
    next_client_id: AtomicU64,
}

impl PropertyBus {
    /// Builds a bus from the mandatory baseline declarations plus optional
    /// overlays.
    ///
    /// A failing baseline source is fatal. A failing overlay is skipped
    /// with a warning. Special properties take their authoritative config
    /// from the real bus when it provides one.
    pub fn new(
        real_bus: Arc<dyn RealBus>,
        baseline: &dyn DeclarationSource,
        overlays: &[&dyn DeclarationSource],
    ) -> Result<Self, StartupError> {
        let mut catalog = ConfigCatalog::from_sources(baseline, overlays)?;
        for &prop_id in SPECIAL_PROPERTIES {
            if let Some(config) = real_bus.property_config(prop_id) {
                catalog.override_config(config);
            }
        }

        let clock = MonotonicClock::new();
        let mut core = CoreState::new();
        core.table.seed(&catalog, clock.now_nanos());

        let state = Arc::new(Mutex::new(core));
        let scheduler = Scheduler::spawn(Arc::clone(&state), clock);

        debug!("property bus emulator constructed");
        Ok(Self {
            catalog,
            real_bus,
            clock,
            state,
            scheduler,
            next_client_id: AtomicU64::new(1),
        })
    }

    /// Gets the current value of a property at an area.
    ///
    /// The areaId is ignored for global properties. Fails
    /// `InvalidArgument` for an unknown propId or unsupported areaId,
    /// `AccessDenied` when the property is not readable, and
    /// `NotAvailable` when no value is stored or a dependency gate is off.
    pub fn get(&self, prop_id: PropertyId, area_id: AreaId) -> Result<PropertyValue, BusError> {
        let config = self.checked_config(prop_id)?;
        let area_id = effective_area_id(config, area_id);
        check_area_supported(config, area_id)?;
        guard::check_access(config, area_id, AccessIntent::Read)?;

        if is_special(prop_id) {
            return self.real_bus.get(prop_id, area_id);
        }

        let core = self.lock_state();
        guard::check_dependency_available(&self.catalog, &core.table, prop_id, area_id)?;
        core.table
            .get(prop_id, area_id)
            .cloned()
            .ok_or_else(|| {
                BusError::NotAvailable(format!(
                    "property {prop_id} area {area_id} has no value"
                ))
            })
    }

    /// Sets a property value, then fans the update out to on-change
    /// subscribers of that (propId, areaId).
    ///
    /// The stored value gets a fresh monotonic timestamp. Subscriber
    /// callbacks are invoked after the write is committed and the internal
    /// lock released.
    pub fn set(&self, value: PropertyValue) -> Result<(), BusError> {
        let prop_id = value.prop_id;
        let config = self.checked_config(prop_id)?;
        let area_id = effective_area_id(config, value.area_id);
        check_area_supported(config, area_id)?;
        guard::check_access(config, area_id, AccessIntent::Write)?;

        if is_special(prop_id) {
            return self.real_bus.set(&value);
        }

        guard::check_range(config, area_id, &value.value)?;

        let stamped = PropertyValue::new(prop_id, area_id, self.clock.now_nanos(), value.value);
        let subscribers = {
            let mut core = self.lock_state();
            guard::check_dependency_available(&self.catalog, &core.table, prop_id, area_id)?;
            core.table.put(stamped.clone());
            core.registry
                .snapshot_subscribers(PropKey::new(prop_id, area_id))
        };
        for callback in subscribers {
            callback.on_property_event(stamped.clone());
        }
        Ok(())
    }

    /// Registers a new subscription client delivering events to `callback`.
    pub fn new_subscription_client(
        &self,
        callback: Arc<dyn PropertyEventCallback>,
    ) -> SubscriptionClient {
        let id = self.next_client_id.fetch_add(1, Ordering::Relaxed);
        self.lock_state().registry.register_client(id, callback);
        SubscriptionClient { id }
    }

    /// Subscribes the client to each requested property.
    ///
    /// Empty `area_ids` subscribes every supported area. Static properties
    /// cannot be subscribed. Continuous subscriptions clamp the requested
    /// rate into the property's declared bounds; re-subscribing the same
    /// (propId, areaId) at the same rate is a no-op, at a different rate
    /// the old updater is replaced.
    pub fn subscribe(
        &self,
        client: &SubscriptionClient,
        options: &[SubscribeOptions],
    ) -> Result<(), BusError> {
        for option in options {
            let prop_id = option.prop_id;
            let config = self.checked_config(prop_id)?;

            if is_special(prop_id) {
                self.subscribe_special(client, option)?;
                continue;
            }

            let area_ids = resolve_subscribed_areas(config, &option.area_ids)?;
            match config.change_mode {
                ChangeMode::Static => {
                    return Err(BusError::InvalidArgument(format!(
                        "static property {prop_id} cannot be subscribed"
                    )));
                }
                ChangeMode::OnChange => {
                    let mut core = self.lock_state();
                    for &area_id in &area_ids {
                        debug!(client = client.id, prop_id, area_id, "on-change subscription");
                        core.registry
                            .subscribe_on_change(client.id, PropKey::new(prop_id, area_id));
                    }
                }
                ChangeMode::Continuous => {
                    let rate = clamped_sample_rate(config, option.sample_rate)?;
                    self.subscribe_continuous(client, config, &area_ids, rate)?;
                }
            }
        }
        Ok(())
    }

    /// Unsubscribes the client from a property across all areas, stopping
    /// any continuous updaters it owns for it.
    pub fn unsubscribe(
        &self,
        client: &SubscriptionClient,
        prop_id: PropertyId,
    ) -> Result<(), BusError> {
        let config = self.checked_config(prop_id)?;

        if is_special(prop_id) {
            self.lock_state()
                .registry
                .unsubscribe_on_change(client.id, prop_id);
            return self.real_bus.unsubscribe(prop_id);
        }

        match config.change_mode {
            ChangeMode::Static => Err(BusError::InvalidArgument(format!(
                "static property {prop_id} cannot be unsubscribed"
            ))),
            ChangeMode::OnChange => {
                debug!(client = client.id, prop_id, "on-change unsubscription");
                self.lock_state()
                    .registry
                    .unsubscribe_on_change(client.id, prop_id);
                Ok(())
            }
            ChangeMode::Continuous => {
                let handles = {
                    let mut core = self.lock_state();
                    core.registry.remove_updaters_for_prop(client.id, prop_id)
                };
                self.stop_updaters(handles);
                Ok(())
            }
        }
    }

    /// Tears down everything the client owns: on-change registrations and
    /// continuous updaters across all properties.
    pub fn disconnect_client(&self, client: SubscriptionClient) {
        let handles = self.lock_state().registry.remove_client(client.id);
        self.stop_updaters(handles);
    }

    /// Every known property config, for manager-layer enumeration.
    pub fn all_property_configs(&self) -> Vec<PropertyConfig> {
        self.catalog.configs().cloned().collect()
    }

    /// The config of one property, if known.
    pub fn property_config(&self, prop_id: PropertyId) -> Option<PropertyConfig> {
        self.catalog.config_for(prop_id).cloned()
    }

    /// Routes an inbound event from the real bus to locally subscribed
    /// clients. Malformed events (unknown propId or empty payload) are
    /// logged and dropped.
    pub fn handle_real_bus_event(&self, value: PropertyValue) {
        if self.catalog.config_for(value.prop_id).is_none() || value.value.is_empty() {
            warn!(
                prop_id = value.prop_id,
                area_id = value.area_id,
                "ignoring malformed event from the real bus"
            );
            return;
        }
        let subscribers = self
            .lock_state()
            .registry
            .snapshot_subscribers(value.key());
        for callback in subscribers {
            callback.on_property_event(value.clone());
        }
    }

    fn subscribe_special(
        &self,
        client: &SubscriptionClient,
        option: &SubscribeOptions,
    ) -> Result<(), BusError> {
        debug!(
            client = client.id,
            prop_id = option.prop_id,
            "delegating subscription to the real bus"
        );
        self.real_bus.subscribe(option)?;
        // Record the client locally so inbound real-bus events can be
        // routed back to it.
        let area_ids: &[AreaId] = if option.area_ids.is_empty() {
            &[AREA_ID_GLOBAL]
        } else {
            &option.area_ids
        };
        let mut core = self.lock_state();
        for &area_id in area_ids {
            core.registry
                .subscribe_on_change(client.id, PropKey::new(option.prop_id, area_id));
        }
        Ok(())
    }

    fn subscribe_continuous(
        &self,
        client: &SubscriptionClient,
        config: &PropertyConfig,
        area_ids: &[AreaId],
        rate: f32,
    ) -> Result<(), BusError> {
        let prop_id = config.prop_id;
        let mut core = self.lock_state();
        let callback = core.registry.callback_of(client.id).ok_or_else(|| {
            BusError::InvalidArgument(format!("unknown subscription client {}", client.id))
        })?;

        for &area_id in area_ids {
            let key = PropKey::new(prop_id, area_id);
            if let Some(active_rate) = core.registry.updater_rate(client.id, key) {
                if active_rate == rate {
                    debug!(
                        client = client.id,
                        prop_id, area_id, "sample rate unchanged, keeping active updater"
                    );
                    continue;
                }
                // Replace: stop the old updater before arming the new one.
                if let Some(old) = core.registry.remove_updater(client.id, key) {
                    old.stopped.store(true, Ordering::Release);
                    self.scheduler.stop(old.id);
                }
            }

            let stopped = Arc::new(AtomicBool::new(false));
            let id = self.scheduler.allocate_id();
            core.registry.insert_updater(
                client.id,
                key,
                UpdaterHandle {
                    id,
                    sample_rate: rate,
                    stopped: Arc::clone(&stopped),
                },
            );
            self.scheduler.start(UpdaterSpec {
                id,
                prop_id,
                area_id,
                interval: Duration::from_millis((1000.0 / rate) as u64),
                stopped,
                callback: Arc::clone(&callback),
            });
        }
        Ok(())
    }

    fn stop_updaters(&self, handles: Vec<UpdaterHandle>) {
        for handle in handles {
            handle.stopped.store(true, Ordering::Release);
            self.scheduler.stop(handle.id);
        }
    }

    fn checked_config(&self, prop_id: PropertyId) -> Result<&PropertyConfig, BusError> {
        self.catalog.config_for(prop_id).ok_or_else(|| {
            BusError::InvalidArgument(format!("property {prop_id} is not supported"))
        })
    }

    fn lock_state(&self) -> MutexGuard<'_, CoreState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn effective_area_id(config: &PropertyConfig, area_id: AreaId) -> AreaId {
    if config.is_global() {
        AREA_ID_GLOBAL
    } else {
        area_id
    }
}

fn check_area_supported(config: &PropertyConfig, area_id: AreaId) -> Result<(), BusError> {
    if config.is_global() || config.area_config(area_id).is_some() {
        Ok(())
    } else {
        Err(BusError::InvalidArgument(format!(
            "area {area_id} is not supported by property {}",
            config.prop_id
        )))
    }
}

/// Resolves the areas a subscription applies to: the requested areas after
/// validation, every supported area when none are requested, and `[0]` for
/// global properties.
fn resolve_subscribed_areas(
    config: &PropertyConfig,
    requested: &[AreaId],
) -> Result<Vec<AreaId>, BusError> {
    if config.is_global() {
        return Ok(vec![AREA_ID_GLOBAL]);
    }
    if requested.is_empty() {
        return Ok(config.supported_area_ids());
    }
    for &area_id in requested {
        check_area_supported(config, area_id)?;
    }
    Ok(requested.to_vec())
}

/// Clamps the requested rate into the property's declared bounds. A
/// non-positive effective rate cannot arm a timer and is rejected.
fn clamped_sample_rate(config: &PropertyConfig, requested: f32) -> Result<f32, BusError> {
    let rate = requested
        .max(config.sample_rate_min)
        .min(config.sample_rate_max);
    if rate <= 0.0 {
        return Err(BusError::InvalidArgument(format!(
            "property {} has no usable sample rate (requested {requested} Hz)",
            config.prop_id
        )));
    }
    if rate != requested {
        warn!(
            prop_id = config.prop_id,
            requested, clamped = rate, "sample rate clamped into declared bounds"
        );
    }
    Ok(rate)
}
