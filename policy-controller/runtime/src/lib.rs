//! Compiles and publishes per-proxy configuration.
//!
//! Each connected proxy owns a compile job. Jobs are triggered by resource
//! changes, proxy connections and a periodic resync; the [`Scheduler`]
//! serializes them per proxy and retries those that could not complete.

#![deny(warnings, rust_2018_idioms)]
#![forbid(unsafe_code)]

pub use mesh_policy_controller_core as core;
pub use mesh_policy_controller_resolver as resolver;
pub use mesh_policy_controller_snapshot as snapshot;

mod admin;
mod args;
mod ca;
mod certs;
mod compile;
mod metrics;
mod proxy;
mod publish;
mod reconcile;
mod registry;
mod resources;
mod scheduler;
mod store;

pub use self::{
    admin::Admin,
    args::Args,
    ca::SelfSignedAuthority,
    certs::{aligned_expiration, CertBinder},
    compile::{Compiler, Outcome},
    metrics::Metrics,
    proxy::Proxy,
    publish::{Publisher, CONFIG_FILE},
    reconcile::Reconciler,
    registry::ProxyRegistry,
    scheduler::{Backoff, Job, Scheduler},
    store::{FsConfigStore, MemoryConfigStore},
};
