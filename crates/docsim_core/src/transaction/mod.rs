//! Transaction management.
//!
//! docsim emulates serializable isolation with:
//! - **Atomicity**: each call's writes live in a write layer that is
//!   committed or discarded as a whole
//! - **Isolation**: a FIFO gate lets one top-level transaction run at a time
//! - **Nesting**: calls made from inside a function push further layers
//!   without waiting for the gate

mod gate;
mod manager;

pub use gate::{GatePermit, TransactionGate};
pub use manager::{TransactionManager, TransactionScope};
