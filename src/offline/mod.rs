//! Service worker: cache versioning, fetch bypass rules and the PWA manifest.
//!
//! [`ServiceWorkerPolicy`] is the single source of the worker's constants. The
//! script served at `/service-worker.js` is rendered from it and
//! [`OfflineCache`] replays the browser lifecycle against it in tests.

pub mod cache;
pub mod policy;
pub mod routes;

pub use cache::{OfflineCache, Served};
pub use policy::{ServiceWorkerPolicy, Strategy};
pub use routes::{manifest, no_store_middleware, service_worker};
