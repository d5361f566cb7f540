//! Real-time fan-out core for the Huddle platform.
//!
//! The [`ws`] module owns the hub: the registry of live connections, the
//! room index, and the per-connection actor that pumps frames between the
//! hub and one WebSocket. The [`api`] module is the HTTP surface: the
//! WebSocket upgrade route and the publish endpoints the REST layer calls
//! when a domain event occurs.

pub mod api;
pub mod ws;
