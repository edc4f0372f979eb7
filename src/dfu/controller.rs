//! DFU session state machine.
//!
//! Drives one firmware transfer against one peripheral: the caller feeds
//! link events in arrival order and the controller walks the protocol
//! handshake, streams firmware data through the chunker, and reports
//! progress through a typed event callback.
//!
//! Handshake sequence:
//! 1. Connect and discover the DFU service characteristics
//! 2. PacketReceiptNotificationRequest - flow control interval
//! 3. StartDfu - image type and sizes
//! 4. InitDfuParams - metadata upload (extended protocol only)
//! 5. ReceiveFirmwareImage - open the data stream
//! 6. Firmware data packets, pausing at each receipt boundary
//! 7. ValidateFirmware, then ActivateAndReset

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};

use super::chunker::FirmwareChunker;
use super::config::{DfuOpcode, DEFAULT_RECEIPT_INTERVAL};
use super::error::{DfuError, DfuResult};
use super::firmware::{FirmwareImage, InitPacket};
use super::link::{GattLink, LinkEvent};
use super::packet::{parse_notification, ControlPointNotification, ProtocolResponse};
use super::target::{DfuTargetAdapter, ProtocolVariant};

/// Controller states. Terminal states accept no further operations except
/// the expected post-reset disconnect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum DfuState {
    Init,
    Discovering,
    Idle,
    SendNotificationRequest,
    SendStartCommand,
    SendInitPacket,
    SendReceiveCommand,
    SendFirmwareData,
    WaitReceipt,
    SendValidateCommand,
    SendReset,
    Paused,
    Finished,
    Canceled,
    Error,
}

impl DfuState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DfuState::Finished | DfuState::Canceled | DfuState::Error)
    }
}

/// Session progress events for the embedding application.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "event", content = "data")]
pub enum DfuEvent {
    /// Peripheral connection established.
    Connected,
    /// Characteristics resolved and protocol variant selected.
    DiscoveryComplete { variant: ProtocolVariant },
    /// Transfer handshake begun.
    Started,
    /// Init packet accepted by the bootloader.
    InitPacketSent,
    /// Firmware data streaming.
    Uploading { bytes_sent: usize, total: usize },
    /// Image received, validation requested.
    Validating,
    /// Validation passed, activate-and-reset issued.
    Activating,
    /// Transfer complete; the peripheral reboots into the new image.
    Completed,
    /// Streaming suspended at a packet boundary.
    Paused,
    /// Streaming resumed from the last acknowledged packet.
    Resumed,
    /// Transfer canceled; the previous image stays active.
    Canceled,
    /// A notification arrived that no state was waiting for.
    UnexpectedNotification { opcode: u8 },
    /// The session failed.
    Failed { code: String, message: String },
}

impl DfuEvent {
    /// Get a percentage estimate for this event.
    pub fn percent(&self) -> f32 {
        match self {
            DfuEvent::Connected => 0.0,
            DfuEvent::DiscoveryComplete { .. } => 2.0,
            DfuEvent::Started => 5.0,
            DfuEvent::InitPacketSent => 8.0,
            DfuEvent::Uploading { bytes_sent, total } => {
                if *total == 0 {
                    8.0
                } else {
                    8.0 + (*bytes_sent as f32 / *total as f32) * 87.0
                }
            }
            DfuEvent::Validating => 95.0,
            DfuEvent::Activating => 98.0,
            DfuEvent::Completed => 100.0,
            // Session interruptions don't map to progress.
            DfuEvent::Paused
            | DfuEvent::Resumed
            | DfuEvent::Canceled
            | DfuEvent::UnexpectedNotification { .. }
            | DfuEvent::Failed { .. } => -1.0,
        }
    }

    /// Get a human-readable message for this event.
    pub fn message(&self) -> String {
        match self {
            DfuEvent::Connected => "Connected to peripheral".into(),
            DfuEvent::DiscoveryComplete { variant } => {
                format!("DFU service found ({:?} protocol)", variant)
            }
            DfuEvent::Started => "Starting firmware transfer...".into(),
            DfuEvent::InitPacketSent => "Initialization data accepted".into(),
            DfuEvent::Uploading { bytes_sent, total } => {
                let percent = if *total == 0 {
                    0
                } else {
                    (bytes_sent * 100) / total
                };
                format!("Uploading firmware... {}%", percent)
            }
            DfuEvent::Validating => "Validating firmware...".into(),
            DfuEvent::Activating => "Activating new firmware...".into(),
            DfuEvent::Completed => "Update complete!".into(),
            DfuEvent::Paused => "Transfer paused".into(),
            DfuEvent::Resumed => "Transfer resumed".into(),
            DfuEvent::Canceled => "Transfer canceled".into(),
            DfuEvent::UnexpectedNotification { opcode } => {
                format!("Ignoring unexpected notification (opcode 0x{:02X})", opcode)
            }
            DfuEvent::Failed { code, message } => format!("Update failed [{}]: {}", code, message),
        }
    }
}

/// One DFU session against one peripheral.
///
/// Owns its adapter, chunker and firmware exclusively; a new transfer
/// needs a new controller.
pub struct DfuController<L: GattLink, F: FnMut(DfuEvent)> {
    adapter: DfuTargetAdapter<L>,
    image: FirmwareImage,
    init_packet: Option<InitPacket>,
    chunker: Option<FirmwareChunker>,
    state: DfuState,
    receipt_interval: u16,
    pause_requested: bool,
    events: F,
}

impl<L: GattLink, F: FnMut(DfuEvent)> DfuController<L, F> {
    pub fn new(link: L, image: FirmwareImage, events: F) -> Self {
        Self {
            adapter: DfuTargetAdapter::new(link),
            image,
            init_packet: None,
            chunker: None,
            state: DfuState::Init,
            receipt_interval: DEFAULT_RECEIPT_INTERVAL,
            pause_requested: false,
            events,
        }
    }

    /// Attach init-packet metadata for extended-protocol bootloaders.
    pub fn set_init_packet(&mut self, packet: InitPacket) {
        self.init_packet = Some(packet);
    }

    /// Override the packet receipt interval. 0 disables flow control.
    pub fn set_receipt_interval(&mut self, interval: u16) {
        self.receipt_interval = interval;
    }

    pub fn state(&self) -> DfuState {
        self.state
    }

    pub fn variant(&self) -> Option<ProtocolVariant> {
        self.adapter.variant()
    }

    /// Initiate the connection. Discovery and the rest of the session are
    /// driven by the events the link feeds back.
    pub fn connect(&mut self) -> DfuResult<()> {
        if self.state != DfuState::Init {
            return Err(self.invalid_state("connect"));
        }
        self.adapter.connect()
    }

    /// Process one link event, in arrival order.
    pub fn handle_event(&mut self, event: LinkEvent) -> DfuResult<()> {
        match event {
            LinkEvent::Connected => match self.state {
                DfuState::Init => {
                    self.emit(DfuEvent::Connected);
                    self.state = DfuState::Discovering;
                    self.adapter.start_discovery()
                }
                // The peripheral reconnecting after its post-reset reboot
                // must not reanimate a completed session.
                state if state.is_terminal() => {
                    debug!("ignoring reconnect in terminal state {:?}", state);
                    Ok(())
                }
                _ => Err(self.invalid_state("handle connect")),
            },
            LinkEvent::ServicesDiscovered { characteristics } => {
                if self.state != DfuState::Discovering {
                    return Err(self.invalid_state("complete discovery"));
                }
                match self.adapter.resolve_characteristics(&characteristics) {
                    Ok(resolved) => {
                        self.state = DfuState::Idle;
                        self.emit(DfuEvent::DiscoveryComplete {
                            variant: resolved.variant(),
                        });
                        Ok(())
                    }
                    Err(err) => self.fail(err),
                }
            }
            LinkEvent::Disconnected => {
                if self.state.is_terminal() {
                    // Expected after the reset command reboots the target.
                    debug!("peripheral disconnected after reset");
                    Ok(())
                } else {
                    self.fail(DfuError::LinkDisconnected)
                }
            }
            LinkEvent::Notification { characteristic, data } => {
                debug!("notification on {}: {:02X?}", characteristic, data);
                match parse_notification(&data) {
                    Ok(ControlPointNotification::Response(response)) => {
                        let result = self.handle_response(response);
                        self.ensure_failure_recorded(result)
                    }
                    Ok(ControlPointNotification::PacketReceipt { bytes_received }) => {
                        let result = self.handle_receipt(bytes_received);
                        self.ensure_failure_recorded(result)
                    }
                    Err(DfuError::UnexpectedResponse { opcode }) => {
                        // Unknown PDUs are reported but never kill the session.
                        warn!("unrecognized control-point notification 0x{:02X}", opcode);
                        self.emit(DfuEvent::UnexpectedNotification { opcode });
                        Ok(())
                    }
                    Err(err) => self.fail(err),
                }
            }
        }
    }

    /// Begin the transfer handshake. Only legal from `Idle`.
    pub fn start_transfer(&mut self) -> DfuResult<()> {
        if self.state != DfuState::Idle {
            return Err(self.invalid_state("start transfer"));
        }

        self.state = DfuState::SendNotificationRequest;
        self.adapter
            .send_notification_request(self.receipt_interval)?;

        self.state = DfuState::SendStartCommand;
        self.adapter.send_start_command(&self.image)?;
        self.emit(DfuEvent::Started);
        Ok(())
    }

    /// Abandon the transfer. The peripheral resets without activating and
    /// the previously installed image stays in place.
    pub fn cancel_transfer(&mut self) -> DfuResult<()> {
        if self.state.is_terminal() {
            return Err(self.invalid_state("cancel"));
        }
        match self.state {
            // Nothing sent yet; there is no session on the target to reset.
            DfuState::Init | DfuState::Discovering => self.adapter.disconnect()?,
            _ => {
                self.adapter.clear_pending();
                self.adapter.send_reset(false)?;
            }
        }
        info!("transfer canceled");
        self.state = DfuState::Canceled;
        self.emit(DfuEvent::Canceled);
        Ok(())
    }

    /// Suspend streaming at the next packet boundary. Legal only while
    /// firmware data is moving.
    pub fn pause_transfer(&mut self) -> DfuResult<()> {
        match self.state {
            DfuState::SendFirmwareData | DfuState::WaitReceipt => {
                // Once the final packet left there is no boundary left to
                // park at; an accepted pause here would never take effect.
                if self.chunker.as_ref().is_some_and(FirmwareChunker::all_sent) {
                    return Err(DfuError::InvalidState {
                        operation: "pause",
                        reason: "all packets already sent".into(),
                    });
                }
                self.pause_requested = true;
                Ok(())
            }
            _ => Err(self.invalid_state("pause")),
        }
    }

    /// Continue a paused transfer from the last acknowledged packet.
    pub fn resume_transfer(&mut self) -> DfuResult<()> {
        if self.state != DfuState::Paused {
            return Err(self.invalid_state("resume"));
        }
        self.state = DfuState::SendFirmwareData;
        self.emit(DfuEvent::Resumed);
        self.pump()
    }

    fn handle_response(&mut self, response: ProtocolResponse) -> DfuResult<()> {
        if self.adapter.pending() != Some(response.request) {
            warn!(
                "response for {:?} arrived while waiting on {:?}",
                response.request,
                self.adapter.pending()
            );
            self.emit(DfuEvent::UnexpectedNotification {
                opcode: response.request as u8,
            });
            return Ok(());
        }
        self.adapter.complete_pending(response.request)?;

        if !response.is_success() {
            return self.fail(DfuError::PeripheralError {
                request: response.request,
                status: response.status as u8,
            });
        }

        match (self.state, response.request) {
            (DfuState::SendStartCommand, DfuOpcode::StartDfu) => {
                let wants_init = self.adapter.variant() == Some(ProtocolVariant::Extended)
                    && self.init_packet.is_some();
                if wants_init {
                    self.state = DfuState::SendInitPacket;
                    let bytes = self
                        .init_packet
                        .as_ref()
                        .map(InitPacket::to_bytes)
                        .unwrap_or_default();
                    self.adapter.send_init_packet(&bytes)
                } else {
                    self.begin_data_stream()
                }
            }
            (DfuState::SendInitPacket, DfuOpcode::InitDfuParams) => {
                self.emit(DfuEvent::InitPacketSent);
                self.begin_data_stream()
            }
            (DfuState::SendFirmwareData, DfuOpcode::ReceiveFirmwareImage) => {
                let all_sent = self.chunker.as_ref().is_some_and(FirmwareChunker::all_sent);
                if !all_sent {
                    return self.fail(DfuError::UnexpectedResponse {
                        opcode: response.request as u8,
                    });
                }
                info!("image received by bootloader, validating");
                self.state = DfuState::SendValidateCommand;
                self.adapter.send_validate_command()?;
                self.emit(DfuEvent::Validating);
                Ok(())
            }
            (DfuState::SendValidateCommand, DfuOpcode::ValidateFirmware) => {
                self.state = DfuState::SendReset;
                self.adapter.send_reset(true)?;
                self.emit(DfuEvent::Activating);
                self.state = DfuState::Finished;
                self.emit(DfuEvent::Completed);
                Ok(())
            }
            (_, request) => {
                warn!("response {:?} not expected in {:?}", request, self.state);
                self.emit(DfuEvent::UnexpectedNotification {
                    opcode: request as u8,
                });
                Ok(())
            }
        }
    }

    fn handle_receipt(&mut self, bytes_received: u32) -> DfuResult<()> {
        let Some(chunker) = self.chunker.as_mut() else {
            warn!("packet receipt with no transfer in progress");
            self.emit(DfuEvent::UnexpectedNotification {
                opcode: DfuOpcode::PacketReceiptNotification as u8,
            });
            return Ok(());
        };
        if bytes_received as usize != chunker.bytes_sent() {
            warn!(
                "receipt reports {} bytes, {} sent",
                bytes_received,
                chunker.bytes_sent()
            );
        }
        chunker.acknowledge();

        match self.state {
            DfuState::WaitReceipt => {
                self.state = DfuState::SendFirmwareData;
                self.pump()
            }
            // Receipts can still arrive while parked elsewhere (for
            // example right after the final packet); the acknowledgement
            // above is all they carry.
            _ => Ok(()),
        }
    }

    /// Open the data stream and start pushing packets.
    fn begin_data_stream(&mut self) -> DfuResult<()> {
        self.state = DfuState::SendFirmwareData;
        self.chunker = Some(FirmwareChunker::new(
            self.image.data().to_vec(),
            self.receipt_interval,
        ));
        self.adapter.send_receive_command()?;
        self.pump()
    }

    /// Push packets until the receipt boundary, a pause request, or the
    /// end of the image.
    fn pump(&mut self) -> DfuResult<()> {
        loop {
            if self.pause_requested {
                self.pause_requested = false;
                self.state = DfuState::Paused;
                info!("transfer paused at packet boundary");
                self.emit(DfuEvent::Paused);
                return Ok(());
            }

            let Some(chunker) = self.chunker.as_mut() else {
                return Ok(());
            };
            if chunker.at_receipt_boundary() {
                self.state = DfuState::WaitReceipt;
                return Ok(());
            }
            let Some(packet) = chunker.next_packet() else {
                // All packets out; the transfer-complete response to
                // ReceiveFirmwareImage drives the next step.
                return Ok(());
            };
            let bytes_sent = chunker.bytes_sent();
            let total = chunker.total_bytes();

            self.adapter.send_firmware_data(packet.bytes())?;
            self.emit(DfuEvent::Uploading { bytes_sent, total });
        }
    }

    fn emit(&mut self, event: DfuEvent) {
        (self.events)(event);
    }

    fn invalid_state(&self, operation: &'static str) -> DfuError {
        DfuError::InvalidState {
            operation,
            reason: format!("not legal in state {:?}", self.state),
        }
    }

    /// Notification dispatch can fail on a link write after the protocol
    /// checks passed; those errors still have to end the session and reach
    /// the event channel like any other failure.
    fn ensure_failure_recorded(&mut self, result: DfuResult<()>) -> DfuResult<()> {
        match result {
            Err(err) if self.state != DfuState::Error => self.fail(err),
            other => other,
        }
    }

    /// Record the failure, report it, and surface the error to the caller.
    fn fail(&mut self, err: DfuError) -> DfuResult<()> {
        warn!("DFU session failed: {}", err);
        self.state = DfuState::Error;
        self.emit(DfuEvent::Failed {
            code: err.error_code().to_string(),
            message: err.to_string(),
        });
        Err(err)
    }
}
