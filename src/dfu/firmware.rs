//! Firmware image and init-packet data for a DFU session.
//!
//! The caller supplies raw firmware bytes (already extracted from whatever
//! distribution package they came in), the image type, and optionally the
//! init-packet metadata an extended-protocol bootloader expects before the
//! data stream starts.

use serde::{Deserialize, Serialize};

use super::config::FirmwareType;

/// A firmware image ready for transfer.
///
/// A combined softdevice+bootloader image carries both parts concatenated
/// in one buffer with the individual sizes preserved, because the start
/// command reports them separately.
#[derive(Debug, Clone)]
pub struct FirmwareImage {
    firmware_type: FirmwareType,
    data: Vec<u8>,
    softdevice_size: u32,
    bootloader_size: u32,
}

impl FirmwareImage {
    /// A single-part image (application, softdevice or bootloader alone).
    pub fn new(firmware_type: FirmwareType, data: Vec<u8>) -> Self {
        Self {
            firmware_type,
            data,
            softdevice_size: 0,
            bootloader_size: 0,
        }
    }

    /// A combined softdevice+bootloader image.
    pub fn combined(softdevice: Vec<u8>, bootloader: Vec<u8>) -> Self {
        let softdevice_size = softdevice.len() as u32;
        let bootloader_size = bootloader.len() as u32;
        let mut data = softdevice;
        data.extend(bootloader);
        Self {
            firmware_type: FirmwareType::SoftDeviceBootloader,
            data,
            softdevice_size,
            bootloader_size,
        }
    }

    pub fn firmware_type(&self) -> FirmwareType {
        self.firmware_type
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn size(&self) -> u32 {
        self.data.len() as u32
    }

    /// Sizes for the extended start command: (softdevice, bootloader,
    /// application). Exactly one slot is non-zero except for combined
    /// images.
    pub fn part_sizes(&self) -> (u32, u32, u32) {
        match self.firmware_type {
            FirmwareType::SoftDevice => (self.size(), 0, 0),
            FirmwareType::Bootloader => (0, self.size(), 0),
            FirmwareType::SoftDeviceBootloader => (self.softdevice_size, self.bootloader_size, 0),
            FirmwareType::Application => (0, 0, self.size()),
        }
    }

    /// CRC-16/CCITT-FALSE over the full image, as the init packet carries.
    pub fn crc16(&self) -> u16 {
        crc16::State::<crc16::CCITT_FALSE>::calculate(&self.data)
    }
}

/// Init-packet metadata uploaded before firmware data in extended DFU.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InitPacket {
    /// Device type identifier, 0xFFFF to skip the check.
    pub device_type: u16,
    /// Device revision, 0xFFFF to skip the check.
    pub device_revision: u16,
    /// Application version, 0xFFFF_FFFF to skip the check.
    pub application_version: u32,
    /// SoftDevice firmware IDs this image is compatible with.
    pub softdevice_req: Vec<u16>,
    /// CRC-16/CCITT-FALSE of the firmware image.
    pub firmware_crc16: u16,
}

impl InitPacket {
    /// An init packet that skips every compatibility check but still
    /// carries the firmware CRC.
    pub fn permissive(firmware_crc16: u16) -> Self {
        Self {
            device_type: 0xFFFF,
            device_revision: 0xFFFF,
            application_version: 0xFFFF_FFFF,
            softdevice_req: vec![0xFFFE],
            firmware_crc16,
        }
    }

    /// Whether this packet's CRC matches the image it accompanies.
    pub fn crc_matches(&self, image: &FirmwareImage) -> bool {
        self.firmware_crc16 == image.crc16()
    }

    /// Encode to the packed little-endian wire form the bootloader parses.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(12 + 2 * self.softdevice_req.len());
        out.extend_from_slice(&self.device_type.to_le_bytes());
        out.extend_from_slice(&self.device_revision.to_le_bytes());
        out.extend_from_slice(&self.application_version.to_le_bytes());
        out.extend_from_slice(&(self.softdevice_req.len() as u16).to_le_bytes());
        for id in &self.softdevice_req {
            out.extend_from_slice(&id.to_le_bytes());
        }
        out.extend_from_slice(&self.firmware_crc16.to_le_bytes());
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_part_sizes_single_image() {
        let app = FirmwareImage::new(FirmwareType::Application, vec![0u8; 100]);
        assert_eq!(app.part_sizes(), (0, 0, 100));

        let sd = FirmwareImage::new(FirmwareType::SoftDevice, vec![0u8; 200]);
        assert_eq!(sd.part_sizes(), (200, 0, 0));

        let bl = FirmwareImage::new(FirmwareType::Bootloader, vec![0u8; 50]);
        assert_eq!(bl.part_sizes(), (0, 50, 0));
    }

    #[test]
    fn test_combined_image_keeps_part_sizes() {
        let image = FirmwareImage::combined(vec![0xAA; 300], vec![0xBB; 120]);
        assert_eq!(image.firmware_type(), FirmwareType::SoftDeviceBootloader);
        assert_eq!(image.size(), 420);
        assert_eq!(image.part_sizes(), (300, 120, 0));
        assert_eq!(image.data()[299], 0xAA);
        assert_eq!(image.data()[300], 0xBB);
    }

    #[test]
    fn test_crc16_ccitt_false_known_vector() {
        // "123456789" is the standard CRC-16/CCITT-FALSE check input.
        let image = FirmwareImage::new(FirmwareType::Application, b"123456789".to_vec());
        assert_eq!(image.crc16(), 0x29B1);
    }

    #[test]
    fn test_init_packet_wire_form() {
        let packet = InitPacket {
            device_type: 0x0102,
            device_revision: 0x0304,
            application_version: 0x0506_0708,
            softdevice_req: vec![0x00A1, 0x00B2],
            firmware_crc16: 0xC3D4,
        };
        assert_eq!(
            packet.to_bytes(),
            vec![
                0x02, 0x01, // device type LE
                0x04, 0x03, // device revision LE
                0x08, 0x07, 0x06, 0x05, // application version LE
                0x02, 0x00, // softdevice count LE
                0xA1, 0x00, 0xB2, 0x00, // softdevice IDs LE
                0xD4, 0xC3, // CRC LE
            ]
        );
    }

    #[test]
    fn test_permissive_packet_matches_image_crc() {
        let image = FirmwareImage::new(FirmwareType::Application, b"123456789".to_vec());
        let packet = InitPacket::permissive(image.crc16());
        assert!(packet.crc_matches(&image));

        let other = FirmwareImage::new(FirmwareType::Application, b"987654321".to_vec());
        assert!(!packet.crc_matches(&other));
    }
}
