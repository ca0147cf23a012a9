//! Real-time host telemetry broadcast service.
//!
//! A long-running process that bootstraps a persistent shared secret,
//! samples host resource metrics on a fixed interval, and pushes each
//! snapshot to all admitted WebSocket subscribers. See the module docs for
//! the individual pieces:
//!
//! - [`credentials`] — token bootstrap and persistence
//! - [`metrics`] — host sampling into immutable snapshots
//! - [`registry`] — subscriber admission and the broadcast group
//! - [`broadcast`] — the periodic sample-and-broadcast cycle
//! - [`http`] — WebSocket transport and one-shot REST surface

pub mod broadcast;
pub mod config;
pub mod credentials;
pub mod http;
pub mod identity;
pub mod metrics;
pub mod registry;
pub mod state;
