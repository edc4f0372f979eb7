//! Record Access Control Point codec.
//!
//! Builds and parses the control-point PDUs used to query, count and
//! delete stored measurement records on glucose and CGM sensors. The
//! operand shape is fixed by the op code and operator at construction, so
//! a PDU with an impossible combination cannot be represented.

use serde::Serialize;

use super::{ByteReader, CodecError, CodecResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum RacpOpCode {
    ReportStoredRecords = 1,
    DeleteStoredRecords = 2,
    AbortOperation = 3,
    ReportNumberOfStoredRecords = 4,
    NumberOfStoredRecordsResponse = 5,
    ResponseCode = 6,
}

impl RacpOpCode {
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            1 => Some(RacpOpCode::ReportStoredRecords),
            2 => Some(RacpOpCode::DeleteStoredRecords),
            3 => Some(RacpOpCode::AbortOperation),
            4 => Some(RacpOpCode::ReportNumberOfStoredRecords),
            5 => Some(RacpOpCode::NumberOfStoredRecordsResponse),
            6 => Some(RacpOpCode::ResponseCode),
            _ => None,
        }
    }

    /// Op codes that select records through an operator and filter.
    fn selects_records(self) -> bool {
        matches!(
            self,
            RacpOpCode::ReportStoredRecords
                | RacpOpCode::DeleteStoredRecords
                | RacpOpCode::ReportNumberOfStoredRecords
        )
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum RacpOperator {
    Null = 0,
    AllRecords = 1,
    LessThanOrEqualTo = 2,
    GreaterThanOrEqualTo = 3,
    WithinRangeInclusive = 4,
    FirstRecord = 5,
    LastRecord = 6,
}

impl RacpOperator {
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            0 => Some(RacpOperator::Null),
            1 => Some(RacpOperator::AllRecords),
            2 => Some(RacpOperator::LessThanOrEqualTo),
            3 => Some(RacpOperator::GreaterThanOrEqualTo),
            4 => Some(RacpOperator::WithinRangeInclusive),
            5 => Some(RacpOperator::FirstRecord),
            6 => Some(RacpOperator::LastRecord),
            _ => None,
        }
    }
}

/// Which record field a bounded operator filters on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum FilterType {
    SequenceNumber = 1,
    UserFacingTime = 2,
}

impl FilterType {
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            1 => Some(FilterType::SequenceNumber),
            2 => Some(FilterType::UserFacingTime),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum RacpResponseCode {
    Success = 1,
    OpCodeNotSupported = 2,
    InvalidOperator = 3,
    OperatorNotSupported = 4,
    InvalidOperand = 5,
    NoRecordsFound = 6,
    AbortUnsuccessful = 7,
    ProcedureNotCompleted = 8,
    OperandNotSupported = 9,
}

impl RacpResponseCode {
    pub fn from_byte(value: u8) -> Option<Self> {
        match value {
            1 => Some(RacpResponseCode::Success),
            2 => Some(RacpResponseCode::OpCodeNotSupported),
            3 => Some(RacpResponseCode::InvalidOperator),
            4 => Some(RacpResponseCode::OperatorNotSupported),
            5 => Some(RacpResponseCode::InvalidOperand),
            6 => Some(RacpResponseCode::NoRecordsFound),
            7 => Some(RacpResponseCode::AbortUnsuccessful),
            8 => Some(RacpResponseCode::ProcedureNotCompleted),
            9 => Some(RacpResponseCode::OperandNotSupported),
            _ => None,
        }
    }

    pub fn description(self) -> &'static str {
        match self {
            RacpResponseCode::Success => "success",
            RacpResponseCode::OpCodeNotSupported => "op code not supported",
            RacpResponseCode::InvalidOperator => "invalid operator",
            RacpResponseCode::OperatorNotSupported => "operator not supported",
            RacpResponseCode::InvalidOperand => "invalid operand",
            RacpResponseCode::NoRecordsFound => "no records found",
            RacpResponseCode::AbortUnsuccessful => "abort unsuccessful",
            RacpResponseCode::ProcedureNotCompleted => "procedure not completed",
            RacpResponseCode::OperandNotSupported => "operand not supported",
        }
    }
}

/// RACP operand, one variant per wire shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum RacpOperand {
    None,
    /// Single bound for less-than/greater-than operators.
    SingleBound { filter: FilterType, param: u16 },
    /// Inclusive bounds for the within-range operator.
    Range {
        filter: FilterType,
        from: u16,
        to: u16,
    },
    /// Record count carried by a number-of-records response.
    NumberOfRecords(u16),
    /// General response: the request this answers plus its outcome.
    Response {
        request_op_code: RacpOpCode,
        response_code: RacpResponseCode,
    },
}

/// A Record Access Control Point PDU.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RacpPdu {
    pub op_code: RacpOpCode,
    pub operator: RacpOperator,
    pub operand: RacpOperand,
}

impl RacpPdu {
    /// Build a PDU, rejecting op-code/operator/operand combinations the
    /// protocol does not define.
    pub fn new(
        op_code: RacpOpCode,
        operator: RacpOperator,
        operand: RacpOperand,
    ) -> CodecResult<Self> {
        let invalid = || CodecError::InvalidOperand {
            op_code: op_code as u8,
            operator: operator as u8,
        };

        if op_code.selects_records() {
            let valid = match operator {
                RacpOperator::AllRecords | RacpOperator::FirstRecord | RacpOperator::LastRecord => {
                    operand == RacpOperand::None
                }
                RacpOperator::LessThanOrEqualTo | RacpOperator::GreaterThanOrEqualTo => {
                    matches!(operand, RacpOperand::SingleBound { .. })
                }
                RacpOperator::WithinRangeInclusive => matches!(operand, RacpOperand::Range { .. }),
                RacpOperator::Null => false,
            };
            if !valid {
                return Err(invalid());
            }
        } else {
            if operator != RacpOperator::Null {
                return Err(invalid());
            }
            let valid = match op_code {
                RacpOpCode::AbortOperation => operand == RacpOperand::None,
                RacpOpCode::NumberOfStoredRecordsResponse => {
                    matches!(operand, RacpOperand::NumberOfRecords(_))
                }
                // A response answers a request, never another response.
                RacpOpCode::ResponseCode => matches!(
                    operand,
                    RacpOperand::Response { request_op_code, .. }
                        if request_op_code != RacpOpCode::ResponseCode
                ),
                _ => false,
            };
            if !valid {
                return Err(invalid());
            }
        }

        Ok(Self {
            op_code,
            operator,
            operand,
        })
    }

    pub fn report_all_records() -> Self {
        Self {
            op_code: RacpOpCode::ReportStoredRecords,
            operator: RacpOperator::AllRecords,
            operand: RacpOperand::None,
        }
    }

    pub fn report_first_record() -> Self {
        Self {
            op_code: RacpOpCode::ReportStoredRecords,
            operator: RacpOperator::FirstRecord,
            operand: RacpOperand::None,
        }
    }

    pub fn report_last_record() -> Self {
        Self {
            op_code: RacpOpCode::ReportStoredRecords,
            operator: RacpOperator::LastRecord,
            operand: RacpOperand::None,
        }
    }

    /// Records with sequence number greater than or equal to `from`.
    pub fn report_records_from(from: u16) -> Self {
        Self {
            op_code: RacpOpCode::ReportStoredRecords,
            operator: RacpOperator::GreaterThanOrEqualTo,
            operand: RacpOperand::SingleBound {
                filter: FilterType::SequenceNumber,
                param: from,
            },
        }
    }

    /// Records with sequence number in `from..=to`.
    pub fn report_records_within(from: u16, to: u16) -> Self {
        Self {
            op_code: RacpOpCode::ReportStoredRecords,
            operator: RacpOperator::WithinRangeInclusive,
            operand: RacpOperand::Range {
                filter: FilterType::SequenceNumber,
                from,
                to,
            },
        }
    }

    pub fn delete_all_records() -> Self {
        Self {
            op_code: RacpOpCode::DeleteStoredRecords,
            operator: RacpOperator::AllRecords,
            operand: RacpOperand::None,
        }
    }

    pub fn abort() -> Self {
        Self {
            op_code: RacpOpCode::AbortOperation,
            operator: RacpOperator::Null,
            operand: RacpOperand::None,
        }
    }

    pub fn report_number_of_all_records() -> Self {
        Self {
            op_code: RacpOpCode::ReportNumberOfStoredRecords,
            operator: RacpOperator::AllRecords,
            operand: RacpOperand::None,
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.op_code as u8, self.operator as u8];
        match self.operand {
            RacpOperand::None => {}
            RacpOperand::SingleBound { filter, param } => {
                out.push(filter as u8);
                out.extend_from_slice(&param.to_le_bytes());
            }
            RacpOperand::Range { filter, from, to } => {
                out.push(filter as u8);
                out.extend_from_slice(&from.to_le_bytes());
                out.extend_from_slice(&to.to_le_bytes());
            }
            RacpOperand::NumberOfRecords(count) => out.extend_from_slice(&count.to_le_bytes()),
            RacpOperand::Response {
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
        let raw_operator = r.read_u8()?;

        let op_code = RacpOpCode::from_byte(raw_op).ok_or(CodecError::UnknownOpCode(raw_op))?;
        let operator =
            RacpOperator::from_byte(raw_operator).ok_or(CodecError::UnknownOperator(raw_operator))?;

        let invalid = || CodecError::InvalidOperand {
            op_code: raw_op,
            operator: raw_operator,
        };

        let operand = match op_code {
            RacpOpCode::NumberOfStoredRecordsResponse => {
                RacpOperand::NumberOfRecords(r.read_u16()?)
            }
            RacpOpCode::ResponseCode => {
                let raw_request = r.read_u8()?;
                let request_op_code =
                    RacpOpCode::from_byte(raw_request).ok_or(CodecError::UnknownOpCode(raw_request))?;
                let response_code =
                    RacpResponseCode::from_byte(r.read_u8()?).ok_or_else(invalid)?;
                RacpOperand::Response {
                    request_op_code,
                    response_code,
                }
            }
            _ => match operator {
                RacpOperator::LessThanOrEqualTo | RacpOperator::GreaterThanOrEqualTo => {
                    let filter = FilterType::from_byte(r.read_u8()?).ok_or_else(invalid)?;
                    RacpOperand::SingleBound {
                        filter,
                        param: r.read_u16()?,
                    }
                }
                RacpOperator::WithinRangeInclusive => {
                    let filter = FilterType::from_byte(r.read_u8()?).ok_or_else(invalid)?;
                    RacpOperand::Range {
                        filter,
                        from: r.read_u16()?,
                        to: r.read_u16()?,
                    }
                }
                _ => RacpOperand::None,
            },
        };

        Self::new(op_code, operator, operand)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_report_all_records_encoding() {
        assert_eq!(RacpPdu::report_all_records().encode(), vec![1, 1]);
    }

    #[test]
    fn test_abort_encoding() {
        assert_eq!(RacpPdu::abort().encode(), vec![3, 0]);
    }

    #[test]
    fn test_greater_or_equal_encoding() {
        let pdu = RacpPdu::report_records_from(0x0102);
        assert_eq!(pdu.encode(), vec![1, 3, 1, 0x02, 0x01]);
    }

    #[test]
    fn test_within_range_round_trip() {
        let pdu = RacpPdu::report_records_within(10, 20);
        let bytes = pdu.encode();
        assert_eq!(bytes, vec![1, 4, 1, 10, 0, 20, 0]);

        let decoded = RacpPdu::decode(&bytes).unwrap();
        assert_eq!(decoded, pdu);
        assert_eq!(
            decoded.operand,
            RacpOperand::Range {
                filter: FilterType::SequenceNumber,
                from: 10,
                to: 20,
            }
        );
    }

    #[test]
    fn test_number_of_records_response_decode() {
        let pdu = RacpPdu::decode(&[5, 0, 0x2A, 0x00]).unwrap();
        assert_eq!(pdu.op_code, RacpOpCode::NumberOfStoredRecordsResponse);
        assert_eq!(pdu.operand, RacpOperand::NumberOfRecords(42));
    }

    #[test]
    fn test_response_code_decode() {
        let pdu = RacpPdu::decode(&[6, 0, 1, 6]).unwrap();
        assert_eq!(pdu.op_code, RacpOpCode::ResponseCode);
        assert_eq!(
            pdu.operand,
            RacpOperand::Response {
                request_op_code: RacpOpCode::ReportStoredRecords,
                response_code: RacpResponseCode::NoRecordsFound,
            }
        );
    }

    #[test]
    fn test_response_op_code_parses() {
        assert_eq!(RacpOpCode::from_byte(6), Some(RacpOpCode::ResponseCode));
    }

    #[test]
    fn test_response_answering_a_response_rejected() {
        assert!(matches!(
            RacpPdu::decode(&[6, 0, 6, 1]),
            Err(CodecError::InvalidOperand { .. })
        ));
    }

    #[test]
    fn test_invalid_combination_rejected() {
        // within-range operator without a range operand
        assert!(matches!(
            RacpPdu::new(
                RacpOpCode::ReportStoredRecords,
                RacpOperator::WithinRangeInclusive,
                RacpOperand::None,
            ),
            Err(CodecError::InvalidOperand { .. })
        ));
        // abort never takes an operator
        assert!(matches!(
            RacpPdu::new(
                RacpOpCode::AbortOperation,
                RacpOperator::AllRecords,
                RacpOperand::None,
            ),
            Err(CodecError::InvalidOperand { .. })
        ));
    }

    #[test]
    fn test_unknown_operator_rejected() {
        assert!(matches!(
            RacpPdu::decode(&[1, 9]),
            Err(CodecError::UnknownOperator(9))
        ));
    }

    #[test]
    fn test_truncated_pdu() {
        assert!(matches!(
            RacpPdu::decode(&[1, 4, 1, 10]),
            Err(CodecError::OutOfData { .. })
        ));
    }
}
