//! Capacity allocation engine: tracks people, projects and time-bounded
//! fractional engagements, enforces per-person capacity, finds available
//! people for a skill set and reports utilization. Served over the
//! PostgreSQL wire protocol by the `loadline` binary.

pub mod auth;
pub mod compactor;
pub mod config;
pub mod engine;
pub mod interval;
pub mod limits;
pub mod model;
pub mod observability;
pub mod sql;
pub mod tls;
pub mod wal;
pub mod wire;
