//! Canonical wire types for gantry terminal sessions.
//!
//! While a terminal workload is being prepared, the server streams JSON
//! envelopes to the client over the WebSocket. Once the workload is attached,
//! the channel switches to raw terminal bytes and these types are no longer
//! used.

mod setup;

pub use setup::SetupMessage;
