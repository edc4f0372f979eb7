//! Configuration constants for the Nordic BLE DFU protocol.

use uuid::Uuid;

// ============================================================================
// DFU Service UUIDs
// ============================================================================

/// Legacy DFU service (00001530-1212-EFDE-1523-785FEABCD123).
pub const DFU_SERVICE_UUID: Uuid = Uuid::from_u128(0x00001530_1212_EFDE_1523_785FEABCD123);

/// DFU control point characteristic. Commands out, responses back as
/// notifications.
pub const DFU_CONTROL_POINT_UUID: Uuid = Uuid::from_u128(0x00001531_1212_EFDE_1523_785FEABCD123);

/// DFU packet characteristic. Init-packet payload and raw firmware bytes,
/// written without response.
pub const DFU_PACKET_UUID: Uuid = Uuid::from_u128(0x00001532_1212_EFDE_1523_785FEABCD123);

/// DFU version characteristic. Only present on bootloaders speaking the
/// extended protocol; its presence selects the protocol variant.
pub const DFU_VERSION_UUID: Uuid = Uuid::from_u128(0x00001534_1212_EFDE_1523_785FEABCD123);

// ============================================================================
// Transfer Configuration
// ============================================================================

/// Maximum payload of one firmware-data write (ATT default MTU minus
/// overhead).
pub const PACKET_SIZE: usize = 20;

/// Default number of packets between receipt notifications.
pub const DEFAULT_RECEIPT_INTERVAL: u16 = 10;

/// Init-packet transfer sub-command: payload follows on the packet
/// characteristic.
pub const INIT_PACKET_BEGIN: u8 = 0x00;

/// Init-packet transfer sub-command: payload complete.
pub const INIT_PACKET_COMPLETE: u8 = 0x01;

// ============================================================================
// DFU Opcodes (legacy BLE DFU protocol)
// ============================================================================

/// Control-point operation opcodes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DfuOpcode {
    /// Start DFU with image type and sizes
    StartDfu = 0x01,
    /// Initialize DFU parameters (send init packet data)
    InitDfuParams = 0x02,
    /// Receive firmware image (data chunks)
    ReceiveFirmwareImage = 0x03,
    /// Validate the received firmware
    ValidateFirmware = 0x04,
    /// Activate firmware and reset device
    ActivateAndReset = 0x05,
    /// System reset
    SystemReset = 0x06,
    /// Report received image size (diagnostic)
    ReportReceivedImageSize = 0x07,
    /// Request packet receipt notification interval
    PacketReceiptNotificationRequest = 0x08,
    /// Response from bootloader
    Response = 0x10,
    /// Packet receipt notification from bootloader
    PacketReceiptNotification = 0x11,
}

impl DfuOpcode {
    /// Parse an opcode from a byte value.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(DfuOpcode::StartDfu),
            0x02 => Some(DfuOpcode::InitDfuParams),
            0x03 => Some(DfuOpcode::ReceiveFirmwareImage),
            0x04 => Some(DfuOpcode::ValidateFirmware),
            0x05 => Some(DfuOpcode::ActivateAndReset),
            0x06 => Some(DfuOpcode::SystemReset),
            0x07 => Some(DfuOpcode::ReportReceivedImageSize),
            0x08 => Some(DfuOpcode::PacketReceiptNotificationRequest),
            0x10 => Some(DfuOpcode::Response),
            0x11 => Some(DfuOpcode::PacketReceiptNotification),
            _ => None,
        }
    }
}

/// Firmware image type (what component is being updated).
///
/// Sent as a single byte in the StartDfu command in extended mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum FirmwareType {
    SoftDevice = 0x01,
    Bootloader = 0x02,
    SoftDeviceBootloader = 0x03,
    Application = 0x04,
}

/// DFU response status codes from the bootloader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum DfuResponseStatus {
    Success = 0x01,
    InvalidState = 0x02,
    NotSupported = 0x03,
    DataSizeExceedsLimit = 0x04,
    CrcError = 0x05,
    OperationFailed = 0x06,
}

impl DfuResponseStatus {
    /// Parse a status code from a byte value.
    pub fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0x01 => Some(DfuResponseStatus::Success),
            0x02 => Some(DfuResponseStatus::InvalidState),
            0x03 => Some(DfuResponseStatus::NotSupported),
            0x04 => Some(DfuResponseStatus::DataSizeExceedsLimit),
            0x05 => Some(DfuResponseStatus::CrcError),
            0x06 => Some(DfuResponseStatus::OperationFailed),
            _ => None,
        }
    }

    /// Get a human-readable description.
    pub fn description(&self) -> &'static str {
        match self {
            DfuResponseStatus::Success => "Operation successful",
            DfuResponseStatus::InvalidState => "Invalid state for this operation",
            DfuResponseStatus::NotSupported => "Operation not supported",
            DfuResponseStatus::DataSizeExceedsLimit => "Data size exceeds limit",
            DfuResponseStatus::CrcError => "CRC validation failed",
            DfuResponseStatus::OperationFailed => "Operation failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_opcode_round_trip() {
        for byte in [0x01, 0x02, 0x03, 0x04, 0x05, 0x06, 0x07, 0x08, 0x10, 0x11] {
            let opcode = DfuOpcode::from_byte(byte).unwrap();
            assert_eq!(opcode as u8, byte);
        }
        assert_eq!(DfuOpcode::from_byte(0x09), None);
        assert_eq!(DfuOpcode::from_byte(0xFF), None);
    }

    #[test]
    fn test_status_from_byte() {
        assert_eq!(
            DfuResponseStatus::from_byte(0x01),
            Some(DfuResponseStatus::Success)
        );
        assert_eq!(
            DfuResponseStatus::from_byte(0x06),
            Some(DfuResponseStatus::OperationFailed)
        );
        assert_eq!(DfuResponseStatus::from_byte(0x00), None);
        assert_eq!(DfuResponseStatus::from_byte(0x07), None);
    }

    #[test]
    fn test_service_uuid_text_form() {
        assert_eq!(
            DFU_SERVICE_UUID.to_string(),
            "00001530-1212-efde-1523-785feabcd123"
        );
        assert_eq!(
            DFU_CONTROL_POINT_UUID.to_string(),
            "00001531-1212-efde-1523-785feabcd123"
        );
    }
}
