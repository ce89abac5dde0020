//! Keeping servers in step with the local sensor store.
//!
//! [`reconcile::SyncEngine`] reconciles one server. The
//! [`dispatcher::UpdateDispatcher`] turns triggers into passes over all
//! servers, fed by system events and the periodic [`worker::SensorWorker`].

pub mod dispatcher;
pub mod events;
pub mod power_watch;
pub mod reconcile;
pub mod worker;

pub use dispatcher::UpdateDispatcher;
pub use events::{SystemEvent, Trigger};
pub use power_watch::PowerWatcher;
pub use reconcile::{SyncEngine, SyncReport};
pub use worker::SensorWorker;
