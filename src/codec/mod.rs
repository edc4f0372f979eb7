//! Binary codecs for health-sensor characteristic values.
//!
//! BLE health profiles (Glucose, CGM, Health Thermometer, ...) encode their
//! records as packed little-endian byte layouts with a leading flags byte
//! gating which optional fields follow. This module provides the primitive
//! readers those record decoders compose:
//!
//! - unsigned/signed 8/16/32-bit little-endian integers
//! - IEEE-11073 16-bit SFLOAT and 32-bit FLOAT (base-10 exponent)
//! - the 7-byte packed date-time
//! - nibble pairs (two 4-bit values in one byte)
//!
//! Every reader consumes bytes through a [`ByteReader`] cursor and advances
//! it by exactly the field's declared width, or fails with
//! [`CodecError::OutOfData`] without moving the cursor.

mod cgm;
mod glucose;
mod racp;

pub use cgm::{
    CgmOpCode, CgmOperand, CgmOpsPdu, CgmRecord, CgmResponseCode, CgmSensorStatus,
};
pub use glucose::{
    CarbohydrateId, GlucoseContext, GlucoseRecord, GlucoseUnit, Health, Meal, MedicationId,
    MedicationUnit, SampleLocation, SampleType, SensorStatus, Tester,
};
pub use racp::{FilterType, RacpOpCode, RacpOperand, RacpOperator, RacpPdu, RacpResponseCode};

use chrono::{NaiveDate, NaiveDateTime};
use thiserror::Error;

/// Result type alias for codec operations.
pub type CodecResult<T> = Result<T, CodecError>;

/// Errors that can occur while decoding or encoding wire data.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The buffer ended before a field's declared width.
    #[error("out of data: needed {needed} more byte(s), {remaining} remaining")]
    OutOfData { needed: usize, remaining: usize },

    /// A packed date-time did not form a valid calendar timestamp.
    #[error("invalid date-time {year:04}-{month:02}-{day:02} {hour:02}:{minute:02}:{second:02}")]
    InvalidDateTime {
        year: u16,
        month: u8,
        day: u8,
        hour: u8,
        minute: u8,
        second: u8,
    },

    /// An op-code byte outside the defined range for the PDU family.
    #[error("unknown op code 0x{0:02X}")]
    UnknownOpCode(u8),

    /// An operator byte outside the defined range.
    #[error("unknown operator 0x{0:02X}")]
    UnknownOperator(u8),

    /// The operand does not fit the op-code/operator combination.
    #[error("invalid operand for op code 0x{op_code:02X}, operator 0x{operator:02X}")]
    InvalidOperand { op_code: u8, operator: u8 },
}

/// A pair of 4-bit values decoded from one byte.
///
/// `first` is the high nibble, `second` the low nibble: `0x12` decodes to
/// `first = 0x1, second = 0x2`. The ordering is a field contract — record
/// decoders rely on it to map sub-fields (sample type vs. location, tester
/// vs. health) onto the right half of the byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Nibble {
    pub first: u8,
    pub second: u8,
}

// IEEE-11073 reserved mantissa encodings, in order from the first reserved
// value: +infinity, NaN, NRes, reserved-for-future-use, -infinity.
const RESERVED_FLOAT_VALUES: [f32; 5] =
    [f32::INFINITY, f32::NAN, f32::NAN, f32::NAN, f32::NEG_INFINITY];

const SFLOAT_FIRST_RESERVED: i32 = 0x07FE;
const SFLOAT_NEGATIVE_INFINITY: i32 = 0x0802;
const FLOAT_FIRST_RESERVED: i32 = 0x007F_FFFE;
const FLOAT_NEGATIVE_INFINITY: i32 = 0x0080_0002;

/// Cursor over a byte buffer for field-by-field decoding.
///
/// The reader never mutates the underlying buffer. Each `read_*` method
/// advances the position by exactly the field width on success; on
/// `OutOfData` the position is left where it was.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Current cursor position in bytes from the start of the buffer.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Bytes left to read.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// Take `width` raw bytes, advancing the cursor.
    pub fn take(&mut self, width: usize) -> CodecResult<&'a [u8]> {
        if self.remaining() < width {
            return Err(CodecError::OutOfData {
                needed: width - self.remaining(),
                remaining: self.remaining(),
            });
        }
        let slice = &self.data[self.pos..self.pos + width];
        self.pos += width;
        Ok(slice)
    }

    /// Skip `width` bytes without decoding them.
    pub fn skip(&mut self, width: usize) -> CodecResult<()> {
        self.take(width).map(|_| ())
    }

    pub fn read_u8(&mut self) -> CodecResult<u8> {
        Ok(self.take(1)?[0])
    }

    pub fn read_i8(&mut self) -> CodecResult<i8> {
        Ok(self.take(1)?[0] as i8)
    }

    pub fn read_u16(&mut self) -> CodecResult<u16> {
        let b = self.take(2)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_i16(&mut self) -> CodecResult<i16> {
        let b = self.take(2)?;
        Ok(i16::from_le_bytes([b[0], b[1]]))
    }

    pub fn read_u32(&mut self) -> CodecResult<u32> {
        let b = self.take(4)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    pub fn read_i32(&mut self) -> CodecResult<i32> {
        let b = self.take(4)?;
        Ok(i32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    /// Read an IEEE-11073 16-bit SFLOAT.
    ///
    /// Layout: 4-bit signed base-10 exponent in the high nibble, 12-bit
    /// signed mantissa below. Reserved mantissa values decode to
    /// +/-infinity and NaN.
    pub fn read_sfloat(&mut self) -> CodecResult<f32> {
        let raw = self.read_u16()?;
        let mut mantissa = (raw & 0x0FFF) as i32;
        let mut exponent = (raw >> 12) as i32;
        if exponent >= 0x08 {
            exponent -= 0x10;
        }

        if (SFLOAT_FIRST_RESERVED..=SFLOAT_NEGATIVE_INFINITY).contains(&mantissa) {
            return Ok(RESERVED_FLOAT_VALUES[(mantissa - SFLOAT_FIRST_RESERVED) as usize]);
        }
        if mantissa > 0x0800 {
            mantissa -= 0x1000;
        }
        Ok((mantissa as f64 * 10f64.powi(exponent)) as f32)
    }

    /// Read an IEEE-11073 32-bit FLOAT.
    ///
    /// Layout: 8-bit signed base-10 exponent in the high byte, 24-bit
    /// signed mantissa below.
    pub fn read_float(&mut self) -> CodecResult<f32> {
        let raw = self.read_u32()?;
        let mut mantissa = (raw & 0x00FF_FFFF) as i32;
        let exponent = (raw >> 24) as u8 as i8 as i32;

        if (FLOAT_FIRST_RESERVED..=FLOAT_NEGATIVE_INFINITY).contains(&mantissa) {
            return Ok(RESERVED_FLOAT_VALUES[(mantissa - FLOAT_FIRST_RESERVED) as usize]);
        }
        if mantissa >= 0x0080_0000 {
            mantissa -= 0x0100_0000;
        }
        Ok((mantissa as f64 * 10f64.powi(exponent)) as f32)
    }

    /// Read a 7-byte packed date-time: year u16, then month, day, hour,
    /// minute, second. No timezone.
    pub fn read_date_time(&mut self) -> CodecResult<NaiveDateTime> {
        // Reserve the read so a short buffer fails before any field decode.
        let start = self.pos;
        let year = self.read_u16()?;
        let rest = match self.take(5) {
            Ok(rest) => rest,
            Err(e) => {
                self.pos = start;
                return Err(e);
            }
        };
        let (month, day, hour, minute, second) = (rest[0], rest[1], rest[2], rest[3], rest[4]);

        NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32)
            .and_then(|d| d.and_hms_opt(hour as u32, minute as u32, second as u32))
            .ok_or(CodecError::InvalidDateTime {
                year,
                month,
                day,
                hour,
                minute,
                second,
            })
    }

    /// Read one byte as a nibble pair, high nibble first.
    pub fn read_nibble(&mut self) -> CodecResult<Nibble> {
        let value = self.read_u8()?;
        Ok(Nibble {
            first: value >> 4,
            second: value & 0x0F,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_primitives_advance_exact_width() {
        let data = [0x01, 0x34, 0x12, 0x78, 0x56, 0x34, 0x12];
        let mut r = ByteReader::new(&data);

        assert_eq!(r.read_u8().unwrap(), 0x01);
        assert_eq!(r.position(), 1);
        assert_eq!(r.read_u16().unwrap(), 0x1234);
        assert_eq!(r.position(), 3);
        assert_eq!(r.read_u32().unwrap(), 0x12345678);
        assert_eq!(r.position(), 7);
        assert_eq!(r.remaining(), 0);
    }

    #[test]
    fn test_back_to_back_fields_recover_values() {
        let mut data = Vec::new();
        data.extend_from_slice(&0xBEEFu16.to_le_bytes());
        data.extend_from_slice(&(-1234i16).to_le_bytes());
        data.extend_from_slice(&0xDEADBEEFu32.to_le_bytes());

        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_u16().unwrap(), 0xBEEF);
        assert_eq!(r.read_i16().unwrap(), -1234);
        assert_eq!(r.read_u32().unwrap(), 0xDEADBEEF);
    }

    #[test]
    fn test_out_of_data_leaves_cursor() {
        let data = [0x01];
        let mut r = ByteReader::new(&data);

        let err = r.read_u16().unwrap_err();
        assert_eq!(
            err,
            CodecError::OutOfData {
                needed: 1,
                remaining: 1
            }
        );
        assert_eq!(r.position(), 0);

        // The single byte is still readable afterwards.
        assert_eq!(r.read_u8().unwrap(), 0x01);
    }

    #[test]
    fn test_signed_reads() {
        let data = [0xFF, 0xFE, 0xFF];
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_i8().unwrap(), -1);
        assert_eq!(r.read_i16().unwrap(), -2);
    }

    #[test]
    fn test_sfloat_positive() {
        // exponent 0, mantissa 72
        let data = 72u16.to_le_bytes();
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_sfloat().unwrap(), 72.0);
    }

    #[test]
    fn test_sfloat_negative_exponent() {
        // exponent -1 (0xF), mantissa 365 -> 36.5
        let raw: u16 = (0xF << 12) | 365;
        let data = raw.to_le_bytes();
        let mut r = ByteReader::new(&data);
        let v = r.read_sfloat().unwrap();
        assert!((v - 36.5).abs() < 1e-6);
    }

    #[test]
    fn test_sfloat_negative_mantissa() {
        // mantissa -5 in 12-bit two's complement, exponent 0
        let raw: u16 = 0x1000 - 5;
        let data = raw.to_le_bytes();
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_sfloat().unwrap(), -5.0);
    }

    #[test]
    fn test_sfloat_reserved_values() {
        for (mantissa, check) in [
            (0x07FEu16, f32::is_infinite as fn(f32) -> bool),
            (0x07FF, f32::is_nan),
            (0x0800, f32::is_nan),
            (0x0801, f32::is_nan),
            (0x0802, f32::is_infinite),
        ] {
            let data = mantissa.to_le_bytes();
            let mut r = ByteReader::new(&data);
            assert!(check(r.read_sfloat().unwrap()), "mantissa 0x{mantissa:04X}");
        }

        // Sign of the infinities.
        let positive = 0x07FEu16.to_le_bytes();
        let mut r = ByteReader::new(&positive);
        assert_eq!(r.read_sfloat().unwrap(), f32::INFINITY);
        let negative = 0x0802u16.to_le_bytes();
        let mut r = ByteReader::new(&negative);
        assert_eq!(r.read_sfloat().unwrap(), f32::NEG_INFINITY);
    }

    #[test]
    fn test_float_roundtrip_values() {
        // exponent -2, mantissa 3690 -> 36.90
        let raw: u32 = ((-2i8 as u8 as u32) << 24) | 3690;
        let data = raw.to_le_bytes();
        let mut r = ByteReader::new(&data);
        let v = r.read_float().unwrap();
        assert!((v - 36.9).abs() < 1e-4);
    }

    #[test]
    fn test_float_negative_mantissa() {
        let raw: u32 = 0x0100_0000 - 42; // mantissa -42, exponent 0
        let data = raw.to_le_bytes();
        let mut r = ByteReader::new(&data);
        assert_eq!(r.read_float().unwrap(), -42.0);
    }

    #[test]
    fn test_date_time() {
        let mut data = Vec::new();
        data.extend_from_slice(&2024u16.to_le_bytes());
        data.extend_from_slice(&[3, 14, 15, 9, 26]);

        let mut r = ByteReader::new(&data);
        let ts = r.read_date_time().unwrap();
        assert_eq!(
            ts,
            NaiveDate::from_ymd_opt(2024, 3, 14)
                .unwrap()
                .and_hms_opt(15, 9, 26)
                .unwrap()
        );
        assert_eq!(r.position(), 7);
    }

    #[test]
    fn test_date_time_invalid_fields() {
        let mut data = Vec::new();
        data.extend_from_slice(&2024u16.to_le_bytes());
        data.extend_from_slice(&[13, 1, 0, 0, 0]); // month 13

        let mut r = ByteReader::new(&data);
        assert!(matches!(
            r.read_date_time(),
            Err(CodecError::InvalidDateTime { month: 13, .. })
        ));
    }

    #[test]
    fn test_date_time_short_buffer_restores_cursor() {
        let data = [0xE8, 0x07, 1]; // year + month only
        let mut r = ByteReader::new(&data);
        assert!(matches!(
            r.read_date_time(),
            Err(CodecError::OutOfData { .. })
        ));
        assert_eq!(r.position(), 0);
    }

    #[test]
    fn test_nibble_high_first() {
        let data = [0x12];
        let mut r = ByteReader::new(&data);
        let nibble = r.read_nibble().unwrap();
        assert_eq!(nibble.first, 0x1);
        assert_eq!(nibble.second, 0x2);
        assert_eq!(r.position(), 1);
    }
}
