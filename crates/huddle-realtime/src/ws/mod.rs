//! Real-time fan-out over WebSocket.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────────┐
//! │                       REST / application layer                   │
//! │   publish(room, event)              publish_all(event)           │
//! └───────────────────────────────┬──────────────────────────────────┘
//!                                 │
//! ┌───────────────────────────────▼──────────────────────────────────┐
//! │                               Hub                                │
//! │   - registry of live connections (ConnId -> queue sender)        │
//! │   - room index (room key -> member set)                          │
//! │   - non-blocking fan-out with send-or-evict backpressure         │
//! └───────┬──────────────────────────────────────────────┬───────────┘
//!         │ bounded outbound queue                       │
//! ┌───────▼───────────┐                        ┌─────────▼─────────┐
//! │ Connection actor  │                        │ Connection actor  │
//! │ read + write loop │           ...          │ read + write loop │
//! └───────────────────┘                        └───────────────────┘
//! ```
//!
//! Each connection actor owns exactly one WebSocket. The write loop
//! drains the connection's bounded queue onto the wire; the read loop
//! applies `join`/`leave`/`ping` control frames against the hub.
//! Publishers never block: a subscriber whose queue is full is evicted
//! (or skipped, depending on [`OverflowPolicy`]) instead of slowing the
//! publishing request handler down.

mod handler;
mod hub;
mod types;

pub use handler::ws_handler;
pub use hub::{
    ConnId, DEFAULT_PING_INTERVAL_SECS, DEFAULT_QUEUE_CAPACITY, Hub, HubConfig, HubError,
    OverflowPolicy, PublishError, Registration,
};
pub use types::{ControlFrame, EventEnvelope, Frame, SystemFrame, room};
