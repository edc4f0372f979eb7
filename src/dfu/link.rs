//! GATT link abstraction for DFU communication.
//!
//! The core never talks to a BLE stack directly. A platform integration
//! implements [`GattLink`] for outbound operations and feeds inbound
//! events to the controller as [`LinkEvent`] values, in arrival order.

use uuid::Uuid;

#[cfg(test)]
use mockall::automock;

use super::error::DfuResult;

/// Outbound operations on a connected BLE peripheral.
///
/// This abstraction allows for mocking in tests and keeps the core
/// independent of any particular BLE stack.
#[cfg_attr(test, automock)]
pub trait GattLink {
    /// Initiate a connection to the peripheral.
    fn connect(&mut self) -> DfuResult<()>;

    /// Start service discovery for the given service.
    fn start_discovery(&mut self, service: Uuid) -> DfuResult<()>;

    /// Subscribe to notifications on a characteristic.
    fn subscribe(&mut self, characteristic: Uuid) -> DfuResult<()>;

    /// Write to a characteristic with response.
    fn write(&mut self, characteristic: Uuid, data: &[u8]) -> DfuResult<()>;

    /// Write to a characteristic without response (firmware data stream).
    fn write_without_response(&mut self, characteristic: Uuid, data: &[u8]) -> DfuResult<()>;

    /// Tear the connection down.
    fn disconnect(&mut self) -> DfuResult<()>;
}

/// Inbound events delivered by the platform integration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LinkEvent {
    /// The peripheral connection is established.
    Connected,

    /// The connection dropped.
    Disconnected,

    /// Service discovery finished; lists the characteristics found under
    /// the DFU service.
    ServicesDiscovered { characteristics: Vec<Uuid> },

    /// A notification arrived on a subscribed characteristic.
    Notification { characteristic: Uuid, data: Vec<u8> },
}
