//! Barometric altitude conversions.
//!
//! These formulas are calibration-sensitive: altitude displays elsewhere depend on the
//! exact constants in `constants.rs`.

use crate::constants::{
    BAROMETRIC_EXPONENT, BAROMETRIC_SCALE_METERS, FEET_TO_METERS, ISA_REFERENCE_PRESSURE_HPA,
    METERS_TO_FEET, QNH_LAPSE_RATE_METERS_PER_HPA,
};

/// Altitude in meters for `pressure_hpa` relative to `reference_hpa`.
///
/// Falls back to the ISA reference when `reference_hpa` is absent or not a usable
/// pressure. Returns `None` when `pressure_hpa` is not a finite positive number.
pub fn altitude_by_pressure(pressure_hpa: f64, reference_hpa: Option<f64>) -> Option<f64> {
    if !pressure_hpa.is_finite() || pressure_hpa <= 0.0 {
        return None;
    }
    let qnh = reference_hpa
        .filter(|q| q.is_finite() && *q > 0.0)
        .unwrap_or(ISA_REFERENCE_PRESSURE_HPA);
    Some(BAROMETRIC_SCALE_METERS * (1.0 - (pressure_hpa / qnh).powf(BAROMETRIC_EXPONENT)))
}

/// Applies the linear 8.23 m/hPa correction to an ISA-referenced altitude.
pub fn isa_to_qnh_altitude(isa_altitude_m: f64, qnh_hpa: f64) -> f64 {
    isa_altitude_m + (ISA_REFERENCE_PRESSURE_HPA - qnh_hpa) * QNH_LAPSE_RATE_METERS_PER_HPA
}

pub fn meters_to_feet(meters: f64) -> f64 {
    meters * METERS_TO_FEET
}

pub fn feet_to_meters(feet: f64) -> f64 {
    feet * FEET_TO_METERS
}

/// Altitude tagged with the pressure reference it should be displayed against.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ReferencedAltitude {
    /// Below the transition altitude: local QNH reference.
    Qnh(f64),
    /// At or above the transition altitude: ISA standard reference (flight levels).
    Standard(f64),
}

impl ReferencedAltitude {
    pub fn meters(&self) -> f64 {
        match self {
            ReferencedAltitude::Qnh(m) | ReferencedAltitude::Standard(m) => *m,
        }
    }

    pub fn is_standard(&self) -> bool {
        matches!(self, ReferencedAltitude::Standard(_))
    }

    /// Flight level (hundreds of feet) when on the standard reference.
    pub fn flight_level(&self) -> Option<u32> {
        match self {
            ReferencedAltitude::Standard(m) if *m >= 0.0 => {
                Some((meters_to_feet(*m) / 100.0).round() as u32)
            }
            _ => None,
        }
    }
}

/// Picks the display reference for an ISA altitude given the local QNH and the
/// transition altitude in feet.
pub fn reference_altitude(
    isa_altitude_m: f64,
    qnh_hpa: f64,
    transition_altitude_ft: f64,
) -> ReferencedAltitude {
    let qnh_altitude = isa_to_qnh_altitude(isa_altitude_m, qnh_hpa);
    if meters_to_feet(qnh_altitude) < transition_altitude_ft {
        ReferencedAltitude::Qnh(qnh_altitude)
    } else {
        ReferencedAltitude::Standard(isa_altitude_m)
    }
}
