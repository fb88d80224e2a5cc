//! hwscript event bus.
//!
//! A best-effort publish/subscribe channel between the running script and
//! other parties on the local machine.
//!
//! - [`EventBus`]: thread-safe session registry with addressed
//!   [`send`](EventBus::send), [`broadcast`](EventBus::broadcast) and a
//!   single inbound handler
//! - [`BusServer`]: WebSocket transport (`127.0.0.1:9081` by default)
//!
//! There is no persistence, acknowledgement or retry. Messages to sessions
//! that have gone away are dropped without error.
//!
//! # Example
//!
//! ```
//! use hws_bus::EventBus;
//! use tokio::sync::mpsc;
//!
//! let bus = EventBus::new();
//! let (tx, mut rx) = mpsc::unbounded_channel();
//! let id = bus.open_session(tx);
//!
//! bus.send(&id, "hello");
//! assert_eq!(rx.try_recv().unwrap(), "hello");
//! ```

mod bus;
mod error;
mod server;
mod session;

pub use bus::{EventBus, InboundHandler, Outbound};
pub use error::BusError;
pub use server::{serve, BusServer, BUS_THREAD_NAME};
pub use session::SessionId;
