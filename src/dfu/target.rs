//! Adapter around a GATT link speaking the DFU protocol to one peripheral.
//!
//! Owns the resolved characteristic handles and enforces the
//! single-outstanding-command discipline: one control-point command may be
//! in flight at a time, so every failure attributes to exactly one request.

use log::{debug, info};
use uuid::Uuid;

use super::config::{
    DfuOpcode, DFU_CONTROL_POINT_UUID, DFU_PACKET_UUID, DFU_SERVICE_UUID, DFU_VERSION_UUID,
};
use super::error::{DfuError, DfuResult};
use super::firmware::FirmwareImage;
use super::link::GattLink;
use super::packet;

/// Which protocol generation the bootloader speaks, decided by whether the
/// DFU version characteristic was discovered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum ProtocolVariant {
    /// Original protocol: untyped start command, no init packet.
    Legacy,
    /// SDK 7.0+ protocol: typed start command, init packet, version query.
    Extended,
}

/// Characteristic handles resolved during discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DiscoveredCharacteristics {
    pub control_point: Uuid,
    pub packet: Uuid,
    pub version: Option<Uuid>,
}

impl DiscoveredCharacteristics {
    pub fn variant(&self) -> ProtocolVariant {
        if self.version.is_some() {
            ProtocolVariant::Extended
        } else {
            ProtocolVariant::Legacy
        }
    }
}

/// DFU protocol operations against one connected peripheral.
pub struct DfuTargetAdapter<L: GattLink> {
    link: L,
    characteristics: Option<DiscoveredCharacteristics>,
    /// Control-point command awaiting its response notification.
    pending: Option<DfuOpcode>,
}

impl<L: GattLink> DfuTargetAdapter<L> {
    pub fn new(link: L) -> Self {
        Self {
            link,
            characteristics: None,
            pending: None,
        }
    }

    pub fn connect(&mut self) -> DfuResult<()> {
        self.link.connect()
    }

    pub fn disconnect(&mut self) -> DfuResult<()> {
        self.link.disconnect()
    }

    pub fn start_discovery(&mut self) -> DfuResult<()> {
        self.link.start_discovery(DFU_SERVICE_UUID)
    }

    /// Resolve the discovered characteristic list and subscribe to
    /// control-point notifications.
    ///
    /// Fails when the control point or packet characteristic is missing;
    /// the version characteristic is optional and selects the protocol
    /// variant.
    pub fn resolve_characteristics(
        &mut self,
        discovered: &[Uuid],
    ) -> DfuResult<DiscoveredCharacteristics> {
        if discovered.is_empty() {
            return Err(DfuError::ServiceNotFound);
        }
        let require = |uuid: Uuid| -> DfuResult<Uuid> {
            if discovered.contains(&uuid) {
                Ok(uuid)
            } else {
                Err(DfuError::CharacteristicNotFound { uuid })
            }
        };
        let characteristics = DiscoveredCharacteristics {
            control_point: require(DFU_CONTROL_POINT_UUID)?,
            packet: require(DFU_PACKET_UUID)?,
            version: discovered
                .contains(&DFU_VERSION_UUID)
                .then_some(DFU_VERSION_UUID),
        };

        self.link.subscribe(characteristics.control_point)?;
        info!(
            "DFU characteristics resolved, {:?} protocol",
            characteristics.variant()
        );

        self.characteristics = Some(characteristics);
        Ok(characteristics)
    }

    pub fn variant(&self) -> Option<ProtocolVariant> {
        self.characteristics.map(|c| c.variant())
    }

    /// The command currently awaiting its response, if any.
    pub fn pending(&self) -> Option<DfuOpcode> {
        self.pending
    }

    /// Clear the pending command after its response arrived. Errors when
    /// the response answers a different request than the one in flight.
    pub fn complete_pending(&mut self, request: DfuOpcode) -> DfuResult<()> {
        match self.pending.take() {
            Some(pending) if pending == request => Ok(()),
            _ => Err(DfuError::UnexpectedResponse {
                opcode: request as u8,
            }),
        }
    }

    /// Forget the pending command (session teardown).
    pub fn clear_pending(&mut self) {
        self.pending = None;
    }

    pub fn send_notification_request(&mut self, interval: u16) -> DfuResult<()> {
        // The bootloader does not answer this command; nothing pends.
        let characteristics = self.require_characteristics()?;
        debug!("requesting packet receipt every {} packet(s)", interval);
        self.link.write(
            characteristics.control_point,
            &packet::build_receipt_request(interval),
        )
    }

    /// Send the start command appropriate to the protocol variant.
    pub fn send_start_command(&mut self, image: &FirmwareImage) -> DfuResult<()> {
        let characteristics = self.require_characteristics()?;
        self.begin_command(DfuOpcode::StartDfu)?;

        let (softdevice, bootloader, app) = image.part_sizes();
        let pdu = match characteristics.variant() {
            ProtocolVariant::Extended => {
                packet::build_start_command(image.firmware_type(), softdevice, bootloader, app)
            }
            ProtocolVariant::Legacy => packet::build_legacy_start_command(image.size()),
        };
        info!(
            "starting DFU: {:?}, {} bytes",
            image.firmware_type(),
            image.size()
        );
        self.link.write(characteristics.control_point, &pdu)
    }

    /// Upload the init packet: begin marker on the control point, payload
    /// on the packet characteristic, then the complete marker.
    pub fn send_init_packet(&mut self, init_data: &[u8]) -> DfuResult<()> {
        let characteristics = self.require_characteristics()?;
        self.begin_command(DfuOpcode::InitDfuParams)?;

        debug!("uploading init packet, {} bytes", init_data.len());
        self.link.write(
            characteristics.control_point,
            &packet::build_init_packet_begin(),
        )?;
        self.link
            .write_without_response(characteristics.packet, init_data)?;
        self.link.write(
            characteristics.control_point,
            &packet::build_init_packet_complete(),
        )
    }

    pub fn send_receive_command(&mut self) -> DfuResult<()> {
        let characteristics = self.require_characteristics()?;
        self.begin_command(DfuOpcode::ReceiveFirmwareImage)?;
        self.link
            .write(characteristics.control_point, &packet::build_receive_command())
    }

    /// Stream one firmware-data chunk. Fire-and-forget, never pends.
    pub fn send_firmware_data(&mut self, chunk: &[u8]) -> DfuResult<()> {
        let characteristics = self.require_characteristics()?;
        self.link
            .write_without_response(characteristics.packet, chunk)
    }

    pub fn send_validate_command(&mut self) -> DfuResult<()> {
        let characteristics = self.require_characteristics()?;
        self.begin_command(DfuOpcode::ValidateFirmware)?;
        self.link
            .write(characteristics.control_point, &packet::build_validate_command())
    }

    /// Reset the peripheral. `activate` selects activate-and-reset (boot
    /// the new image) over plain system reset (discard it). The peripheral
    /// reboots instead of responding, so nothing pends.
    pub fn send_reset(&mut self, activate: bool) -> DfuResult<()> {
        let characteristics = self.require_characteristics()?;
        self.pending = None;
        let pdu = if activate {
            packet::build_activate_command()
        } else {
            packet::build_reset_command()
        };
        self.link.write(characteristics.control_point, &pdu)
    }

    fn require_characteristics(&self) -> DfuResult<DiscoveredCharacteristics> {
        self.characteristics.ok_or(DfuError::InvalidState {
            operation: "send command",
            reason: "characteristics not yet discovered".into(),
        })
    }

    fn begin_command(&mut self, opcode: DfuOpcode) -> DfuResult<()> {
        if let Some(pending) = self.pending {
            return Err(DfuError::CommandOutstanding { pending });
        }
        self.pending = Some(opcode);
        Ok(())
    }
}
