//! # Vehicle Property Bus Emulator
//!
//! An in-memory emulation of a vehicle hardware property bus for development
//! and testing: typed, area-scoped properties answering Get/Set/Subscribe/
//! Unsubscribe with the same contract a real hardware bus would.
//!
//! ## Features
//!
//! - **Typed property store**: int32/int64/float/byte/string payloads keyed
//!   by (propId, areaId), seeded from declarative configuration
//! - **Hardware-bus validation**: access-mode checks, per-area value ranges,
//!   dependency-gated availability
//! - **Change notification**: on-change fan-out and continuous sampling at a
//!   negotiated rate with per-updater re-arming timers
//! - **Real-bus delegation**: a fixed set of special properties is forwarded
//!   verbatim to the real bus collaborator
//! - **Overlay configuration**: baseline declarations plus optional overlays,
//!   where a broken overlay never prevents startup
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use carbus::{InMemorySource, PropertyBus, UnconnectedRealBus};
//!
//! // An empty baseline: every property comes from overlay declarations.
//! let baseline = InMemorySource::new("baseline", vec![]);
//! let bus = PropertyBus::new(Arc::new(UnconnectedRealBus), &baseline, &[]).unwrap();
//!
//! assert!(bus.all_property_configs().is_empty());
//! ```
//!
//! ## Architecture
//!
//! - [`config`] - Declarations, the parser boundary, and the config catalog
//! - [`table`] - Current-value store keyed by (propId, areaId)
//! - [`guard`] - Access, range, and dependency-gate validation
//! - [`registry`] - On-change subscribers and continuous updater index
//! - [`scheduler`] - Periodic sampling on a dedicated worker thread
//! - [`dispatcher`] - The public bus API composing all of the above
//! - [`realbus`] - The real hardware bus collaborator boundary

#![deny(warnings)]
#![deny(clippy::all)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::cast_sign_loss)]

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod guard;
pub mod realbus;
pub mod registry;
pub mod scheduler;
pub mod table;
pub mod types;

// Re-export the main public types for convenience.
pub use config::{
    is_special, props, AreaConfig, ConfigCatalog, ConfigDeclaration, DeclarationSource,
    InMemorySource, PropertyConfig, GATING_PROPERTIES, SPECIAL_PROPERTIES,
};
pub use dispatcher::{PropertyBus, SubscriptionClient};
pub use error::{BusError, DeclarationError, StartupError};
pub use realbus::{RealBus, UnconnectedRealBus};
pub use types::{
    AccessMode, AreaId, ChangeMode, PropKey, PropertyEventCallback, PropertyId, PropertyValue,
    RawPropValues, SubscribeOptions, AREA_ID_GLOBAL,
};
