//! Vendor adapters
//!
//! Implementations of [`crate::vendor::VendorApi`]. Live broker SDK bindings
//! sit next to the simulator; the session does not know which one it drives.

pub mod simulator;

pub use simulator::{CallKind, SimulatedVendor, VendorCall};
