//! Error types for the BLE DFU session.

use thiserror::Error;
use uuid::Uuid;

use crate::codec::CodecError;
use crate::dfu::config::DfuOpcode;

/// Result type alias for DFU operations.
pub type DfuResult<T> = Result<T, DfuError>;

/// Errors that can occur during a DFU session.
#[derive(Debug, Error)]
pub enum DfuError {
    /// A control-point notification failed to decode.
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// The peripheral does not expose the DFU service.
    #[error("DFU service not found on peripheral")]
    ServiceNotFound,

    /// The DFU service is missing a required characteristic.
    #[error("Required characteristic {uuid} not found")]
    CharacteristicNotFound { uuid: Uuid },

    /// A notification arrived that the state machine was not waiting for.
    #[error("Unexpected notification with opcode 0x{opcode:02X}")]
    UnexpectedResponse { opcode: u8 },

    /// The bootloader answered a request with a non-success status.
    #[error("Peripheral rejected {request:?}: status 0x{status:02X}")]
    PeripheralError { request: DfuOpcode, status: u8 },

    /// The link dropped while a transfer was in progress.
    #[error("Link disconnected mid-transfer")]
    LinkDisconnected,

    /// An operation was invoked from a state that does not allow it.
    #[error("Cannot {operation}: {reason}")]
    InvalidState {
        operation: &'static str,
        reason: String,
    },

    /// A control-point command was issued while another awaits its response.
    #[error("Command {pending:?} is still awaiting its response")]
    CommandOutstanding { pending: DfuOpcode },

    /// Failure reported by the underlying GATT link.
    #[error("Link error: {reason}")]
    Link { reason: String },
}

impl DfuError {
    /// Get a user-friendly error code for support purposes.
    pub fn error_code(&self) -> &'static str {
        match self {
            DfuError::Codec(_) => "DFU-001",
            DfuError::ServiceNotFound => "DFU-010",
            DfuError::CharacteristicNotFound { .. } => "DFU-011",
            DfuError::UnexpectedResponse { .. } => "DFU-020",
            DfuError::PeripheralError { .. } => "DFU-021",
            DfuError::LinkDisconnected => "DFU-030",
            DfuError::InvalidState { .. } => "DFU-040",
            DfuError::CommandOutstanding { .. } => "DFU-041",
            DfuError::Link { .. } => "DFU-050",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dfu::config::DFU_VERSION_UUID;

    #[test]
    fn test_error_codes() {
        assert_eq!(DfuError::ServiceNotFound.error_code(), "DFU-010");
        assert_eq!(DfuError::LinkDisconnected.error_code(), "DFU-030");
        assert_eq!(
            DfuError::PeripheralError {
                request: DfuOpcode::ValidateFirmware,
                status: 0x05,
            }
            .error_code(),
            "DFU-021"
        );
    }

    #[test]
    fn test_display_carries_diagnostics() {
        let err = DfuError::CharacteristicNotFound {
            uuid: DFU_VERSION_UUID,
        };
        assert!(err.to_string().contains("00001534"));

        let err = DfuError::PeripheralError {
            request: DfuOpcode::StartDfu,
            status: 0x02,
        };
        assert!(err.to_string().contains("0x02"));
    }
}
