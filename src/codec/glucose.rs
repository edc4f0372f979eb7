//! Glucose measurement and measurement-context record decoders.
//!
//! Layouts follow the Bluetooth Glucose Service: a flags byte gates which
//! optional fields are present, and fields appear in fixed wire order.
//! Fields the flags mark absent decode to `None` and consume no bytes.

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use super::{ByteReader, CodecResult};

/// Glucose concentration unit, from bit 2 of the measurement flags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum GlucoseUnit {
    /// kg/L (weight concentration).
    KgPerLitre,
    /// mol/L (molar concentration).
    MolPerLitre,
}

/// Sample type from the low nibble of the type/location byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum SampleType {
    Reserved = 0,
    CapillaryWholeBlood = 1,
    CapillaryPlasma = 2,
    VenousWholeBlood = 3,
    VenousPlasma = 4,
    ArterialWholeBlood = 5,
    ArterialPlasma = 6,
    UndeterminedWholeBlood = 7,
    UndeterminedPlasma = 8,
    InterstitialFluid = 9,
    ControlSolution = 10,
}

impl SampleType {
    pub fn from_nibble(value: u8) -> Self {
        match value {
            1 => SampleType::CapillaryWholeBlood,
            2 => SampleType::CapillaryPlasma,
            3 => SampleType::VenousWholeBlood,
            4 => SampleType::VenousPlasma,
            5 => SampleType::ArterialWholeBlood,
            6 => SampleType::ArterialPlasma,
            7 => SampleType::UndeterminedWholeBlood,
            8 => SampleType::UndeterminedPlasma,
            9 => SampleType::InterstitialFluid,
            10 => SampleType::ControlSolution,
            _ => SampleType::Reserved,
        }
    }
}

/// Sample location from the high nibble of the type/location byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum SampleLocation {
    Reserved = 0,
    Finger = 1,
    AlternateSiteTest = 2,
    Earlobe = 3,
    ControlSolution = 4,
    NotAvailable = 15,
}

impl SampleLocation {
    pub fn from_nibble(value: u8) -> Self {
        match value {
            1 => SampleLocation::Finger,
            2 => SampleLocation::AlternateSiteTest,
            3 => SampleLocation::Earlobe,
            4 => SampleLocation::ControlSolution,
            15 => SampleLocation::NotAvailable,
            _ => SampleLocation::Reserved,
        }
    }
}

/// Sensor status annunciation bitfield.
///
/// Explicit mask accessors instead of a bit-packed struct so the layout
/// never depends on host bit order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SensorStatus(pub u16);

impl SensorStatus {
    pub fn battery_low(self) -> bool {
        self.0 & 0x0001 != 0
    }
    pub fn sensor_malfunction(self) -> bool {
        self.0 & 0x0002 != 0
    }
    pub fn sample_size_insufficient(self) -> bool {
        self.0 & 0x0004 != 0
    }
    pub fn strip_insertion_error(self) -> bool {
        self.0 & 0x0008 != 0
    }
    pub fn strip_type_incorrect(self) -> bool {
        self.0 & 0x0010 != 0
    }
    pub fn result_too_high(self) -> bool {
        self.0 & 0x0020 != 0
    }
    pub fn result_too_low(self) -> bool {
        self.0 & 0x0040 != 0
    }
    pub fn temperature_too_high(self) -> bool {
        self.0 & 0x0080 != 0
    }
    pub fn temperature_too_low(self) -> bool {
        self.0 & 0x0100 != 0
    }
    pub fn read_interrupted(self) -> bool {
        self.0 & 0x0200 != 0
    }
    pub fn general_device_fault(self) -> bool {
        self.0 & 0x0400 != 0
    }
    pub fn time_fault(self) -> bool {
        self.0 & 0x0800 != 0
    }
}

/// A decoded glucose measurement record.
///
/// Immutable once decoded; one instance per received notification. The
/// optional context record arrives in a separate notification and is
/// matched to this record by sequence number.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlucoseRecord {
    pub sequence_number: u16,
    /// Base time, already shifted by the time offset when one is present.
    pub timestamp: NaiveDateTime,
    /// User-facing time offset in minutes, when present.
    pub time_offset_minutes: Option<i16>,
    pub concentration: Option<f32>,
    pub unit: Option<GlucoseUnit>,
    pub sample_type: Option<SampleType>,
    pub sample_location: Option<SampleLocation>,
    pub sensor_status: Option<SensorStatus>,
    /// Whether a context record follows for this sequence number.
    pub context_follows: bool,
    pub context: Option<GlucoseContext>,
}

impl GlucoseRecord {
    /// Decode a record from a Glucose Measurement notification payload.
    pub fn decode(data: &[u8]) -> CodecResult<Self> {
        let mut r = ByteReader::new(data);

        let flags = r.read_u8()?;
        let time_offset_present = flags & 0x01 != 0;
        let concentration_present = flags & 0x02 != 0;
        let unit = if (flags & 0x04) >> 2 == 0 {
            GlucoseUnit::KgPerLitre
        } else {
            GlucoseUnit::MolPerLitre
        };
        let status_present = flags & 0x08 != 0;
        let context_follows = flags & 0x10 != 0;

        let sequence_number = r.read_u16()?;
        let mut timestamp = r.read_date_time()?;

        let time_offset_minutes = if time_offset_present {
            let offset = r.read_i16()?;
            timestamp += Duration::minutes(offset as i64);
            Some(offset)
        } else {
            None
        };

        let (concentration, unit, sample_type, sample_location) = if concentration_present {
            let value = r.read_sfloat()?;
            let nibble = r.read_nibble()?;
            (
                Some(value),
                Some(unit),
                Some(SampleType::from_nibble(nibble.second)),
                Some(SampleLocation::from_nibble(nibble.first)),
            )
        } else {
            (None, None, None, None)
        };

        let sensor_status = if status_present {
            Some(SensorStatus(r.read_u16()?))
        } else {
            None
        };

        Ok(Self {
            sequence_number,
            timestamp,
            time_offset_minutes,
            concentration,
            unit,
            sample_type,
            sample_location,
            sensor_status,
            context_follows,
            context: None,
        })
    }

    /// Attach the context record received for the same sequence number.
    pub fn with_context(mut self, context: GlucoseContext) -> Self {
        self.context = Some(context);
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum CarbohydrateId {
    Reserved = 0,
    Breakfast = 1,
    Lunch = 2,
    Dinner = 3,
    Snack = 4,
    Drink = 5,
    Supper = 6,
    Brunch = 7,
}

impl CarbohydrateId {
    pub fn from_byte(value: u8) -> Self {
        match value {
            1 => CarbohydrateId::Breakfast,
            2 => CarbohydrateId::Lunch,
            3 => CarbohydrateId::Dinner,
            4 => CarbohydrateId::Snack,
            5 => CarbohydrateId::Drink,
            6 => CarbohydrateId::Supper,
            7 => CarbohydrateId::Brunch,
            _ => CarbohydrateId::Reserved,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum Meal {
    Reserved = 0,
    Preprandial = 1,
    Postprandial = 2,
    Fasting = 3,
    Casual = 4,
    Bedtime = 5,
}

impl Meal {
    pub fn from_byte(value: u8) -> Self {
        match value {
            1 => Meal::Preprandial,
            2 => Meal::Postprandial,
            3 => Meal::Fasting,
            4 => Meal::Casual,
            5 => Meal::Bedtime,
            _ => Meal::Reserved,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum Tester {
    Reserved = 0,
    TesterSelf = 1,
    HealthcareProfessional = 2,
    LabTest = 3,
    NotAvailable = 15,
}

impl Tester {
    pub fn from_nibble(value: u8) -> Self {
        match value {
            1 => Tester::TesterSelf,
            2 => Tester::HealthcareProfessional,
            3 => Tester::LabTest,
            15 => Tester::NotAvailable,
            _ => Tester::Reserved,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum Health {
    Reserved = 0,
    MinorHealthIssues = 1,
    MajorHealthIssues = 2,
    DuringMenses = 3,
    UnderStress = 4,
    NoHealthIssues = 5,
    NotAvailable = 15,
}

impl Health {
    pub fn from_nibble(value: u8) -> Self {
        match value {
            1 => Health::MinorHealthIssues,
            2 => Health::MajorHealthIssues,
            3 => Health::DuringMenses,
            4 => Health::UnderStress,
            5 => Health::NoHealthIssues,
            15 => Health::NotAvailable,
            _ => Health::Reserved,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[repr(u8)]
pub enum MedicationId {
    Reserved = 0,
    RapidActingInsulin = 1,
    ShortActingInsulin = 2,
    IntermediateActingInsulin = 3,
    LongActingInsulin = 4,
    PreMixedInsulin = 5,
}

impl MedicationId {
    pub fn from_byte(value: u8) -> Self {
        match value {
            1 => MedicationId::RapidActingInsulin,
            2 => MedicationId::ShortActingInsulin,
            3 => MedicationId::IntermediateActingInsulin,
            4 => MedicationId::LongActingInsulin,
            5 => MedicationId::PreMixedInsulin,
            _ => MedicationId::Reserved,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MedicationUnit {
    Kilograms,
    Litres,
}

/// A decoded glucose measurement context record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GlucoseContext {
    pub sequence_number: u16,
    pub carbohydrate_id: Option<CarbohydrateId>,
    /// Carbohydrate mass in kilograms.
    pub carbohydrate: Option<f32>,
    pub meal: Option<Meal>,
    pub tester: Option<Tester>,
    pub health: Option<Health>,
    /// Exercise duration in seconds.
    pub exercise_duration: Option<u16>,
    /// Exercise intensity in percent.
    pub exercise_intensity: Option<u8>,
    pub medication_id: Option<MedicationId>,
    /// Medication amount in kilograms or litres, per `medication_unit`.
    pub medication: Option<f32>,
    pub medication_unit: Option<MedicationUnit>,
    /// Glycated haemoglobin in percent.
    pub hba1c: Option<f32>,
}

impl GlucoseContext {
    /// Decode a record from a Glucose Measurement Context notification
    /// payload.
    pub fn decode(data: &[u8]) -> CodecResult<Self> {
        let mut r = ByteReader::new(data);

        let flags = r.read_u8()?;
        let carbohydrate_present = flags & 0x01 != 0;
        let meal_present = flags & 0x02 != 0;
        let tester_health_present = flags & 0x04 != 0;
        let exercise_present = flags & 0x08 != 0;
        let medication_present = flags & 0x10 != 0;
        let medication_unit = if (flags & 0x20) >> 5 == 0 {
            MedicationUnit::Kilograms
        } else {
            MedicationUnit::Litres
        };
        let hba1c_present = flags & 0x40 != 0;
        let extended_flags = flags & 0x80 != 0;

        let sequence_number = r.read_u16()?;

        if extended_flags {
            // Extended flags octet, no fields defined yet.
            r.skip(1)?;
        }

        let (carbohydrate_id, carbohydrate) = if carbohydrate_present {
            let id = CarbohydrateId::from_byte(r.read_u8()?);
            let mass = r.read_sfloat()? / 1000.0;
            (Some(id), Some(mass))
        } else {
            (None, None)
        };

        let meal = if meal_present {
            Some(Meal::from_byte(r.read_u8()?))
        } else {
            None
        };

        let (tester, health) = if tester_health_present {
            let nibble = r.read_nibble()?;
            (
                Some(Tester::from_nibble(nibble.second)),
                Some(Health::from_nibble(nibble.first)),
            )
        } else {
            (None, None)
        };

        let (exercise_duration, exercise_intensity) = if exercise_present {
            (Some(r.read_u16()?), Some(r.read_u8()?))
        } else {
            (None, None)
        };

        let (medication_id, medication, medication_unit) = if medication_present {
            let id = MedicationId::from_byte(r.read_u8()?);
            let amount = r.read_sfloat()? / 1_000_000.0;
            (Some(id), Some(amount), Some(medication_unit))
        } else {
            (None, None, None)
        };

        let hba1c = if hba1c_present {
            Some(r.read_sfloat()?)
        } else {
            None
        };

        Ok(Self {
            sequence_number,
            carbohydrate_id,
            carbohydrate,
            meal,
            tester,
            health,
            exercise_duration,
            exercise_intensity,
            medication_id,
            medication,
            medication_unit,
            hba1c,
        })
    }
}
