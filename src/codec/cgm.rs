//! Continuous glucose monitoring record and specific-ops control-point
//! codecs.
//!
//! The measurement layout differs from the plain glucose record: size and
//! flags lead, the concentration and session time offset are mandatory,
//! and the optional fields trail in status/trend/quality order.

use serde::Serialize;

use super::{ByteReader, CodecError, CodecResult};

/// Sensor status annunciation bitfield from a CGM measurement.
///
/// Accessor per defined bit; undefined bits are readable through the raw
/// value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CgmSensorStatus(pub u32);

impl CgmSensorStatus {
    pub fn session_stopped(self) -> bool {
        self.0 & (1 << 0) != 0
    }
    pub fn device_battery_low(self) -> bool {
        self.0 & (1 << 1) != 0
    }
    pub fn sensor_type_incorrect(self) -> bool {
        self.0 & (1 << 2) != 0
    }
    pub fn sensor_malfunction(self) -> bool {
        self.0 & (1 << 3) != 0
    }
    pub fn device_specific_alert(self) -> bool {
        self.0 & (1 << 4) != 0
    }
    pub fn general_device_fault(self) -> bool {
        self.0 & (1 << 5) != 0
    }
    pub fn time_synchronization_required(self) -> bool {
        self.0 & (1 << 8) != 0
    }
    pub fn calibration_not_allowed(self) -> bool {
        self.0 & (1 << 9) != 0
    }
    pub fn calibration_recommended(self) -> bool {
        self.0 & (1 << 10) != 0
    }
    pub fn calibration_required(self) -> bool {
        self.0 & (1 << 11) != 0
    }
    pub fn temperature_too_high(self) -> bool {
        self.0 & (1 << 12) != 0
    }
    pub fn temperature_too_low(self) -> bool {
        self.0 & (1 << 13) != 0
    }
    pub fn result_lower_than_patient_low(self) -> bool {
        self.0 & (1 << 16) != 0
    }
    pub fn result_higher_than_patient_high(self) -> bool {
        self.0 & (1 << 17) != 0
    }
    pub fn result_lower_than_hypo(self) -> bool {
        self.0 & (1 << 18) != 0
    }
    pub fn result_higher_than_hyper(self) -> bool {
        self.0 & (1 << 19) != 0
    }
    pub fn rate_of_decrease_exceeded(self) -> bool {
        self.0 & (1 << 20) != 0
    }
    pub fn rate_of_increase_exceeded(self) -> bool {
        self.0 & (1 << 21) != 0
    }
    pub fn result_lower_than_device_limit(self) -> bool {
        self.0 & (1 << 22) != 0
    }
    pub fn result_higher_than_device_limit(self) -> bool {
        self.0 & (1 << 23) != 0
    }
}

/// A decoded CGM measurement record. Concentration is always in mg/dL.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CgmRecord {
    /// Measurement size octet as sent by the sensor.
    pub measurement_size: u8,
    /// Glucose concentration in mg/dL.
    pub concentration: f32,
    /// Minutes since the session started.
    pub time_offset_minutes: i16,
    pub sensor_status: Option<CgmSensorStatus>,
    /// Rate of change in (mg/dL)/min, when the sensor reports trend.
    pub trend: Option<f32>,
    /// Measurement quality in percent.
    pub quality: Option<f32>,
    /// Whether the warning octet of the annunciation field is in use.
    pub warning_present: bool,
    /// Whether the calibration/temperature octet is in use.
    pub cal_temp_present: bool,
}

impl CgmRecord {
    /// Decode a record from a CGM Measurement notification payload.
    pub fn decode(data: &[u8]) -> CodecResult<Self> {
        let mut r = ByteReader::new(data);

        let measurement_size = r.read_u8()?;
        let flags = r.read_u8()?;
        let trend_present = flags & 0x01 != 0;
        let quality_present = flags & 0x02 != 0;
        let warning_present = flags & 0x20 != 0;
        let cal_temp_present = flags & 0x40 != 0;
        let status_present = flags & 0x80 != 0;

        let concentration = r.read_sfloat()?;
        let time_offset_minutes = r.read_i16()?;

        let sensor_status = if status_present {
            Some(CgmSensorStatus(r.read_u32()?))
        } else {
            None
        };
        let trend = if trend_present {
            Some(r.read_sfloat()?)
        } else {
            None
        };
        let quality = if quality_present {
            Some(r.read_sfloat()?)
        } else {
            None
        };

        Ok(Self {
            measurement_size,
            concentration,
            time_offset_minutes,
            sensor_status,
            trend,
            quality,
            warning_present,
            cal_temp_present,
        })
    }
}

/// CGM Specific Ops Control Point operation codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum CgmOpCode {
    SetCommunicationInterval = 1,
    GetCommunicationInterval = 2,
    CommunicationIntervalResponse = 3,
    SetGlucoseCalibrationValue = 4,
    GetGlucoseCalibrationValue = 5,
    GlucoseCalibrationValueResponse = 6,
    SetPatientHighAlertLevel = 7,
    GetPatientHighAlertLevel = 8,
    PatientHighAlertLevelResponse = 9,
    SetPatientLowAlertLevel = 10,
    GetPatientLowAlertLevel = 11,
    PatientLowAlertLevelResponse = 12,
    SetHypoAlertLevel = 13,
    GetHypoAlertLevel = 14,
    HypoAlertLevelResponse = 15,
    SetHyperAlertLevel = 16,
    GetHyperAlertLevel = 17,
    HyperAlertLevelResponse = 18,
    SetRateOfDecreaseAlertLevel = 19,
    GetRateOfDecreaseAlertLevel = 20,
    RateOfDecreaseAlertLevelResponse = 21,
    SetRateOfIncreaseAlertLevel = 22,
    GetRateOfIncreaseAlertLevel = 23,
    RateOfIncreaseAlertLevelResponse = 24,
    ResetDeviceSpecificAlert = 25,
    StartSession = 26,
    StopSession = 27,
    ResponseCode = 28,
}

impl CgmOpCode {
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            1 => Some(CgmOpCode::SetCommunicationInterval),
            2 => Some(CgmOpCode::GetCommunicationInterval),
            3 => Some(CgmOpCode::CommunicationIntervalResponse),
            4 => Some(CgmOpCode::SetGlucoseCalibrationValue),
            5 => Some(CgmOpCode::GetGlucoseCalibrationValue),
            6 => Some(CgmOpCode::GlucoseCalibrationValueResponse),
            7 => Some(CgmOpCode::SetPatientHighAlertLevel),
            8 => Some(CgmOpCode::GetPatientHighAlertLevel),
            9 => Some(CgmOpCode::PatientHighAlertLevelResponse),
            10 => Some(CgmOpCode::SetPatientLowAlertLevel),
            11 => Some(CgmOpCode::GetPatientLowAlertLevel),
            12 => Some(CgmOpCode::PatientLowAlertLevelResponse),
            13 => Some(CgmOpCode::SetHypoAlertLevel),
            14 => Some(CgmOpCode::GetHypoAlertLevel),
            15 => Some(CgmOpCode::HypoAlertLevelResponse),
            16 => Some(CgmOpCode::SetHyperAlertLevel),
            17 => Some(CgmOpCode::GetHyperAlertLevel),
            18 => Some(CgmOpCode::HyperAlertLevelResponse),
            19 => Some(CgmOpCode::SetRateOfDecreaseAlertLevel),
            20 => Some(CgmOpCode::GetRateOfDecreaseAlertLevel),
            21 => Some(CgmOpCode::RateOfDecreaseAlertLevelResponse),
            22 => Some(CgmOpCode::SetRateOfIncreaseAlertLevel),
            23 => Some(CgmOpCode::GetRateOfIncreaseAlertLevel),
            24 => Some(CgmOpCode::RateOfIncreaseAlertLevelResponse),
            25 => Some(CgmOpCode::ResetDeviceSpecificAlert),
            26 => Some(CgmOpCode::StartSession),
            27 => Some(CgmOpCode::StopSession),
            28 => Some(CgmOpCode::ResponseCode),
            _ => None,
        }
    }

    /// Whether this op code is a request carrying no operand.
    fn bare(self) -> bool {
        matches!(
            self,
            CgmOpCode::GetCommunicationInterval
                | CgmOpCode::GetPatientHighAlertLevel
                | CgmOpCode::GetPatientLowAlertLevel
                | CgmOpCode::GetHypoAlertLevel
                | CgmOpCode::GetHyperAlertLevel
                | CgmOpCode::GetRateOfDecreaseAlertLevel
                | CgmOpCode::GetRateOfIncreaseAlertLevel
                | CgmOpCode::ResetDeviceSpecificAlert
                | CgmOpCode::StartSession
                | CgmOpCode::StopSession
        )
    }

    /// Whether this op code carries a little-endian 16-bit value.
    fn takes_value(self) -> bool {
        matches!(
            self,
            CgmOpCode::GetGlucoseCalibrationValue
                | CgmOpCode::SetPatientHighAlertLevel
                | CgmOpCode::PatientHighAlertLevelResponse
                | CgmOpCode::SetPatientLowAlertLevel
                | CgmOpCode::PatientLowAlertLevelResponse
                | CgmOpCode::SetHypoAlertLevel
                | CgmOpCode::HypoAlertLevelResponse
                | CgmOpCode::SetHyperAlertLevel
                | CgmOpCode::HyperAlertLevelResponse
                | CgmOpCode::SetRateOfDecreaseAlertLevel
                | CgmOpCode::RateOfDecreaseAlertLevelResponse
                | CgmOpCode::SetRateOfIncreaseAlertLevel
                | CgmOpCode::RateOfIncreaseAlertLevelResponse
        )
    }
}

/// Response codes returned inside a `ResponseCode` PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum CgmResponseCode {
    Success = 1,
    OpCodeNotSupported = 2,
    InvalidOperand = 3,
    ProcedureNotCompleted = 4,
    ParameterOutOfRange = 5,
}

impl CgmResponseCode {
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            1 => Some(CgmResponseCode::Success),
            2 => Some(CgmResponseCode::OpCodeNotSupported),
            3 => Some(CgmResponseCode::InvalidOperand),
            4 => Some(CgmResponseCode::ProcedureNotCompleted),
            5 => Some(CgmResponseCode::ParameterOutOfRange),
            _ => None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            CgmResponseCode::Success => "success",
            CgmResponseCode::OpCodeNotSupported => "op code not supported",
            CgmResponseCode::InvalidOperand => "invalid operand",
            CgmResponseCode::ProcedureNotCompleted => "procedure not completed",
            CgmResponseCode::ParameterOutOfRange => "parameter out of range",
        }
    }
}

/// Operand of a specific-ops PDU, keyed by its op code at construction so
/// an op code cannot carry the wrong payload shape.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub enum CgmOperand {
    None,
    /// Communication interval in minutes.
    CommunicationInterval(u8),
    /// Raw little-endian 16-bit value (alert levels, calibration record
    /// numbers). Alert levels are SFLOAT-encoded by the sensor.
    Value(u16),
    /// General response: the request this answers plus its outcome.
    Response {
        request_op_code: CgmOpCode,
        response_code: CgmResponseCode,
    },
}

/// A CGM Specific Ops Control Point PDU.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CgmOpsPdu {
    pub op_code: CgmOpCode,
    pub operand: CgmOperand,
}

impl CgmOpsPdu {
    /// Build a PDU, rejecting operand shapes the op code does not take.
    pub fn new(op_code: CgmOpCode, operand: CgmOperand) -> CodecResult<Self> {
        let valid = match operand {
            CgmOperand::None => op_code.bare(),
            CgmOperand::CommunicationInterval(_) => matches!(
                op_code,
                CgmOpCode::SetCommunicationInterval | CgmOpCode::CommunicationIntervalResponse
            ),
            CgmOperand::Value(_) => op_code.takes_value(),
            CgmOperand::Response { .. } => op_code == CgmOpCode::ResponseCode,
        };
        if !valid {
            return Err(CodecError::InvalidOperand {
                op_code: op_code as u8,
                operator: 0,
            });
        }
        Ok(Self { op_code, operand })
    }

    pub fn start_session() -> Self {
        Self {
            op_code: CgmOpCode::StartSession,
            operand: CgmOperand::None,
        }
    }

    pub fn stop_session() -> Self {
        Self {
            op_code: CgmOpCode::StopSession,
            operand: CgmOperand::None,
        }
    }

    pub fn set_communication_interval(minutes: u8) -> Self {
        Self {
            op_code: CgmOpCode::SetCommunicationInterval,
            operand: CgmOperand::CommunicationInterval(minutes),
        }
    }

    pub fn get_communication_interval() -> Self {
        Self {
            op_code: CgmOpCode::GetCommunicationInterval,
            operand: CgmOperand::None,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        // Shared control-point frame: op code, then operator (always the
        // null operator for specific ops), then the operand bytes.
        let mut out = vec![self.op_code as u8, 0x00];
        match self.operand {
            CgmOperand::None => {}
            CgmOperand::CommunicationInterval(minutes) => out.push(minutes),
            CgmOperand::Value(value) => out.extend_from_slice(&value.to_le_bytes()),
            CgmOperand::Response {
                request_op_code,
                response_code,
            } => {
                out.push(request_op_code as u8);
                out.push(response_code as u8);
            }
        }
        out
    }

    pub fn decode(data: &[u8]) -> CodecResult<Self> {
        let mut r = ByteReader::new(data);
        let raw_op = r.read_u8()?;
        let op_code = CgmOpCode::from_byte(raw_op).ok_or(CodecError::UnknownOpCode(raw_op))?;
        r.skip(1)?; // operator octet, always null for specific ops

        let operand = match op_code {
            CgmOpCode::SetCommunicationInterval | CgmOpCode::CommunicationIntervalResponse => {
                CgmOperand::CommunicationInterval(r.read_u8()?)
            }
            CgmOpCode::ResponseCode => {
                let raw_request = r.read_u8()?;
                let request_op_code = CgmOpCode::from_byte(raw_request)
                    .ok_or(CodecError::UnknownOpCode(raw_request))?;
                let raw_code = r.read_u8()?;
                let response_code = CgmResponseCode::from_byte(raw_code).ok_or(
                    CodecError::InvalidOperand {
                        op_code: raw_op,
                        operator: raw_code,
                    },
                )?;
                CgmOperand::Response {
                    request_op_code,
                    response_code,
                }
            }
            op if op.takes_value() => CgmOperand::Value(r.read_u16()?),
            _ => CgmOperand::None,
        };

        Ok(Self { op_code, operand })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_measurement() {
        let mut data = vec![6u8, 0x00]; // size, flags: nothing optional
        data.extend_from_slice(&105u16.to_le_bytes()); // SFLOAT 105 mg/dL
        data.extend_from_slice(&30i16.to_le_bytes());

        let record = CgmRecord::decode(&data).unwrap();
        assert_eq!(record.measurement_size, 6);
        assert_eq!(record.concentration, 105.0);
        assert_eq!(record.time_offset_minutes, 30);
        assert_eq!(record.sensor_status, None);
        assert_eq!(record.trend, None);
        assert_eq!(record.quality, None);
        assert!(!record.warning_present);
        assert!(!record.cal_temp_present);
    }

    #[test]
    fn test_measurement_with_status_trend_quality() {
        let mut data = vec![13u8, 0x01 | 0x02 | 0x20 | 0x80];
        data.extend_from_slice(&92u16.to_le_bytes());
        data.extend_from_slice(&(-5i16).to_le_bytes());
        data.extend_from_slice(&0x0000_0002u32.to_le_bytes()); // battery low
        data.extend_from_slice(&3u16.to_le_bytes()); // trend SFLOAT 3
        data.extend_from_slice(&95u16.to_le_bytes()); // quality SFLOAT 95

        let record = CgmRecord::decode(&data).unwrap();
        assert_eq!(record.concentration, 92.0);
        assert_eq!(record.time_offset_minutes, -5);
        let status = record.sensor_status.unwrap();
        assert!(status.device_battery_low());
        assert!(!status.session_stopped());
        assert_eq!(record.trend, Some(3.0));
        assert_eq!(record.quality, Some(95.0));
        assert!(record.warning_present);
    }

    #[test]
    fn test_truncated_measurement() {
        let data = [13u8, 0x80, 0x5C, 0x00]; // status flagged, buffer ends early
        assert!(matches!(
            CgmRecord::decode(&data),
            Err(CodecError::OutOfData { .. })
        ));
    }

    #[test]
    fn test_start_session_encoding() {
        assert_eq!(CgmOpsPdu::start_session().encode(), vec![26, 0x00]);
        assert_eq!(CgmOpsPdu::stop_session().encode(), vec![27, 0x00]);
    }

    #[test]
    fn test_communication_interval_round_trip() {
        let pdu = CgmOpsPdu::set_communication_interval(5);
        let bytes = pdu.encode();
        assert_eq!(bytes, vec![1, 0x00, 5]);
        assert_eq!(CgmOpsPdu::decode(&bytes).unwrap(), pdu);
    }

    #[test]
    fn test_response_decode() {
        let pdu = CgmOpsPdu::decode(&[28, 0x00, 26, 1]).unwrap();
        assert_eq!(pdu.op_code, CgmOpCode::ResponseCode);
        assert_eq!(
            pdu.operand,
            CgmOperand::Response {
                request_op_code: CgmOpCode::StartSession,
                response_code: CgmResponseCode::Success,
            }
        );
    }

    #[test]
    fn test_alert_level_value_round_trip() {
        let pdu = CgmOpsPdu::new(CgmOpCode::SetHypoAlertLevel, CgmOperand::Value(70)).unwrap();
        let bytes = pdu.encode();
        assert_eq!(bytes, vec![13, 0x00, 70, 0]);
        assert_eq!(CgmOpsPdu::decode(&bytes).unwrap(), pdu);
    }

    #[test]
    fn test_mismatched_operand_rejected() {
        assert!(matches!(
            CgmOpsPdu::new(CgmOpCode::StartSession, CgmOperand::Value(1)),
            Err(CodecError::InvalidOperand { .. })
        ));
        assert!(matches!(
            CgmOpsPdu::new(
                CgmOpCode::SetCommunicationInterval,
                CgmOperand::Response {
                    request_op_code: CgmOpCode::StartSession,
                    response_code: CgmResponseCode::Success,
                }
            ),
            Err(CodecError::InvalidOperand { .. })
        ));
    }

    #[test]
    fn test_unknown_op_code() {
        assert!(matches!(
            CgmOpsPdu::decode(&[0xAA, 0x00]),
            Err(CodecError::UnknownOpCode(0xAA))
        ));
    }
}
