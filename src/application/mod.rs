//! Application layer - orchestration of domain logic.
//!
//! This layer coordinates the domain logic and manages the runtime behavior:
//! - Rate limiters and the per-log-site state store
//! - The metadata processor and handlers
//! - The fluent statement API and the logger
//! - Scoped logging contexts
//!
//! ## Ports
//!
//! The application layer defines ports (traits) that infrastructure
//! adapters must implement. This keeps the application layer independent
//! from infrastructure details.

pub mod context;
pub mod handler;
pub mod limiters;
pub mod log_site_map;
pub mod logger;
pub mod metrics;
pub mod ports;
pub mod processor;
pub mod record;
pub mod scoped;
pub mod state_store;
