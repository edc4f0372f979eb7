//! Companion core for BLE health peripherals.
//!
//! Two halves:
//!
//! - [`dfu`] - a callback-driven state machine that drives the legacy
//!   Nordic BLE DFU protocol to replace firmware on a peripheral, over any
//!   [`dfu::GattLink`] implementation the embedding application provides.
//! - [`codec`] - bit-exact codecs for the record formats health-sensor
//!   profiles notify (glucose and CGM measurements) and the control-point
//!   PDUs used to query them (record access, CGM specific ops).
//!
//! The crate performs no BLE I/O of its own: platform integrations
//! implement the link trait, feed inbound events to the DFU controller,
//! and run the decoded records through whatever UI or storage they carry.

pub mod codec;
pub mod dfu;
