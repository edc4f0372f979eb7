//! Control-point PDU encoding and notification parsing for BLE DFU.
//!
//! Commands are short opcode-prefixed byte strings written to the control
//! point characteristic; the bootloader answers with response (0x10) and
//! packet-receipt (0x11) notifications on the same characteristic.

use super::config::{DfuOpcode, DfuResponseStatus, FirmwareType, INIT_PACKET_BEGIN, INIT_PACKET_COMPLETE};
use super::error::{DfuError, DfuResult};

// ============================================================================
// Command Builders
// ============================================================================

/// Build an extended StartDfu command.
///
/// Format: [0x01, firmware_type, sizes...] where a combined
/// softdevice+bootloader image carries both sizes (4+4) and every other
/// type carries its single size (4), little-endian.
pub fn build_start_command(
    firmware_type: FirmwareType,
    softdevice_size: u32,
    bootloader_size: u32,
    app_size: u32,
) -> Vec<u8> {
    let mut pdu = vec![DfuOpcode::StartDfu as u8, firmware_type as u8];
    match firmware_type {
        FirmwareType::SoftDeviceBootloader => {
            pdu.extend_from_slice(&softdevice_size.to_le_bytes());
            pdu.extend_from_slice(&bootloader_size.to_le_bytes());
        }
        FirmwareType::SoftDevice => pdu.extend_from_slice(&softdevice_size.to_le_bytes()),
        FirmwareType::Bootloader => pdu.extend_from_slice(&bootloader_size.to_le_bytes()),
        FirmwareType::Application => pdu.extend_from_slice(&app_size.to_le_bytes()),
    }
    pdu
}

/// Build a legacy StartDfu command: [0x01, size:4 LE], no firmware type.
pub fn build_legacy_start_command(size: u32) -> Vec<u8> {
    let mut pdu = vec![DfuOpcode::StartDfu as u8];
    pdu.extend_from_slice(&size.to_le_bytes());
    pdu
}

/// Build the init-packet begin marker: [0x02, 0x00].
///
/// The init-packet payload itself goes over the packet characteristic
/// between the begin and complete markers.
pub fn build_init_packet_begin() -> Vec<u8> {
    vec![DfuOpcode::InitDfuParams as u8, INIT_PACKET_BEGIN]
}

/// Build the init-packet complete marker: [0x02, 0x01].
pub fn build_init_packet_complete() -> Vec<u8> {
    vec![DfuOpcode::InitDfuParams as u8, INIT_PACKET_COMPLETE]
}

/// Build a ReceiveFirmwareImage command: [0x03].
pub fn build_receive_command() -> Vec<u8> {
    vec![DfuOpcode::ReceiveFirmwareImage as u8]
}

/// Build a ValidateFirmware command: [0x04].
pub fn build_validate_command() -> Vec<u8> {
    vec![DfuOpcode::ValidateFirmware as u8]
}

/// Build an ActivateAndReset command: [0x05].
pub fn build_activate_command() -> Vec<u8> {
    vec![DfuOpcode::ActivateAndReset as u8]
}

/// Build a SystemReset command: [0x06]. Discards the received image.
pub fn build_reset_command() -> Vec<u8> {
    vec![DfuOpcode::SystemReset as u8]
}

/// Build a PacketReceiptNotificationRequest: [0x08, interval:2 LE].
///
/// Interval 0 disables receipt notifications.
pub fn build_receipt_request(interval: u16) -> Vec<u8> {
    let mut pdu = vec![DfuOpcode::PacketReceiptNotificationRequest as u8];
    pdu.extend_from_slice(&interval.to_le_bytes());
    pdu
}

// ============================================================================
// Notification Parsing
// ============================================================================

/// A response notification from the bootloader: [0x10, request, status].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProtocolResponse {
    /// The command this response answers.
    pub request: DfuOpcode,
    pub status: DfuResponseStatus,
}

impl ProtocolResponse {
    pub fn is_success(&self) -> bool {
        self.status == DfuResponseStatus::Success
    }
}

/// A classified control-point notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ControlPointNotification {
    Response(ProtocolResponse),
    /// Flow-control acknowledgement: [0x11, bytes_received:4 LE].
    PacketReceipt { bytes_received: u32 },
}

/// Parse a control-point notification.
pub fn parse_notification(data: &[u8]) -> DfuResult<ControlPointNotification> {
    let opcode = *data.first().ok_or(DfuError::UnexpectedResponse { opcode: 0 })?;
    match DfuOpcode::from_byte(opcode) {
        Some(DfuOpcode::Response) => {
            if data.len() < 3 {
                return Err(DfuError::UnexpectedResponse { opcode });
            }
            let request = DfuOpcode::from_byte(data[1])
                .ok_or(DfuError::UnexpectedResponse { opcode: data[1] })?;
            let status = DfuResponseStatus::from_byte(data[2]).ok_or(DfuError::PeripheralError {
                request,
                status: data[2],
            })?;
            Ok(ControlPointNotification::Response(ProtocolResponse {
                request,
                status,
            }))
        }
        Some(DfuOpcode::PacketReceiptNotification) => {
            if data.len() < 5 {
                return Err(DfuError::UnexpectedResponse { opcode });
            }
            let bytes_received = u32::from_le_bytes([data[1], data[2], data[3], data[4]]);
            Ok(ControlPointNotification::PacketReceipt { bytes_received })
        }
        _ => Err(DfuError::UnexpectedResponse { opcode }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extended_start_application() {
        let pdu = build_start_command(FirmwareType::Application, 0, 0, 0x0001_0203);
        assert_eq!(pdu, vec![0x01, 0x04, 0x03, 0x02, 0x01, 0x00]);
    }

    #[test]
    fn test_extended_start_combined_carries_both_sizes() {
        let pdu = build_start_command(FirmwareType::SoftDeviceBootloader, 300, 120, 0);
        assert_eq!(
            pdu,
            vec![0x01, 0x03, 0x2C, 0x01, 0x00, 0x00, 0x78, 0x00, 0x00, 0x00]
        );
    }

    #[test]
    fn test_legacy_start_has_no_type_byte() {
        assert_eq!(
            build_legacy_start_command(1050),
            vec![0x01, 0x1A, 0x04, 0x00, 0x00]
        );
    }

    #[test]
    fn test_init_packet_markers() {
        assert_eq!(build_init_packet_begin(), vec![0x02, 0x00]);
        assert_eq!(build_init_packet_complete(), vec![0x02, 0x01]);
    }

    #[test]
    fn test_receipt_request() {
        assert_eq!(build_receipt_request(10), vec![0x08, 0x0A, 0x00]);
        assert_eq!(build_receipt_request(0), vec![0x08, 0x00, 0x00]);
    }

    #[test]
    fn test_parse_success_response() {
        let parsed = parse_notification(&[0x10, 0x03, 0x01]).unwrap();
        assert_eq!(
            parsed,
            ControlPointNotification::Response(ProtocolResponse {
                request: DfuOpcode::ReceiveFirmwareImage,
                status: DfuResponseStatus::Success,
            })
        );
    }

    #[test]
    fn test_parse_packet_receipt() {
        let parsed = parse_notification(&[0x11, 0xC8, 0x00, 0x00, 0x00]).unwrap();
        assert_eq!(
            parsed,
            ControlPointNotification::PacketReceipt { bytes_received: 200 }
        );
    }

    #[test]
    fn test_parse_unknown_opcode() {
        assert!(matches!(
            parse_notification(&[0x42]),
            Err(DfuError::UnexpectedResponse { opcode: 0x42 })
        ));
    }

    #[test]
    fn test_parse_invalid_status_is_peripheral_error() {
        assert!(matches!(
            parse_notification(&[0x10, 0x04, 0x09]),
            Err(DfuError::PeripheralError {
                request: DfuOpcode::ValidateFirmware,
                status: 0x09,
            })
        ));
    }

    #[test]
    fn test_parse_truncated_response() {
        assert!(parse_notification(&[0x10, 0x03]).is_err());
        assert!(parse_notification(&[0x11, 0x01]).is_err());
        assert!(parse_notification(&[]).is_err());
    }
}
