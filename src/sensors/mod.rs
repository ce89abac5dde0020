//! Sensor sources.
//!
//! Each [`SensorManager`] provides a fixed set of [`SensorDefinition`]s and
//! writes fresh values into the local store. Pushing values to servers is
//! left to the reconciliation pass.

pub mod battery;
pub mod definition;
pub mod last_reboot;
pub mod last_update;
pub mod manager;
pub mod registry;

pub use definition::{SensorDefinition, SensorType, SensorValue, StateType, UpdateType};
pub use manager::{GrantedPermissions, PermissionChecker, SensorContext, SensorManager};
pub use registry::SensorRegistry;
