//! Print parameter capability metadata and unit conversion.
//!
//! Each format declares which parameters are editable globally and/or per
//! layer through [`ParameterModifier`] lists on its descriptor. Modifiers are
//! pure metadata; the values themselves live on the job and its layers.
//!
//! Speeds are stored canonically in millimeters per minute. Formats declare
//! their native unit and values are converted explicitly at the
//! decode/encode boundary, never by aliasing.

use std::fmt;

/// The core's internal speed unit.
pub const CORE_SPEED_UNIT: SpeedUnit = SpeedUnit::MillimetersPerMinute;

/// Decimal digits kept for Z heights (micrometer resolution).
pub const HEIGHT_DECIMALS: u8 = 3;

/// Decimal digits kept for exposure/lift values.
pub const VALUE_DECIMALS: u8 = 2;

/// Rounds to `decimals` places, ties away from zero.
///
/// Used at every step of the cumulative Z sum to bound accumulation drift.
pub fn round_away(value: f32, decimals: u8) -> f32 {
    let scale = 10f32.powi(i32::from(decimals));
    (value * scale).round() / scale
}

/// Rounds a Z height to micrometer resolution.
pub fn round_height(value: f32) -> f32 {
    round_away(value, HEIGHT_DECIMALS)
}

/// Rounds an exposure/lift value to its declared precision.
pub fn round_value(value: f32) -> f32 {
    round_away(value, VALUE_DECIMALS)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SpeedUnit {
    MillimetersPerMinute,
    MillimetersPerSecond,
    CentimetersPerMinute,
}

impl SpeedUnit {
    fn mm_per_minute(self) -> f32 {
        match self {
            SpeedUnit::MillimetersPerMinute => 1.0,
            SpeedUnit::MillimetersPerSecond => 60.0,
            SpeedUnit::CentimetersPerMinute => 10.0,
        }
    }
}

impl fmt::Display for SpeedUnit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            SpeedUnit::MillimetersPerMinute => "mm/min",
            SpeedUnit::MillimetersPerSecond => "mm/s",
            SpeedUnit::CentimetersPerMinute => "cm/min",
        };
        f.write_str(label)
    }
}

/// Converts a speed between units without rounding.
pub fn convert_speed(value: f32, from: SpeedUnit, to: SpeedUnit) -> f32 {
    if from == to {
        return value;
    }
    value * from.mm_per_minute() / to.mm_per_minute()
}

/// Converts a speed and rounds to the declared precision.
pub fn convert_speed_rounded(value: f32, from: SpeedUnit, to: SpeedUnit, decimals: u8) -> f32 {
    round_away(convert_speed(value, from, to), decimals)
}

/// A print parameter a format may declare editable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ParameterId {
    BottomLayerCount,
    TransitionLayerCount,
    BottomExposureTime,
    ExposureTime,
    BottomLiftHeight,
    BottomLiftSpeed,
    LiftHeight,
    LiftSpeed,
    PositionZ,
}

impl fmt::Display for ParameterId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            ParameterId::BottomLayerCount => "bottom layer count",
            ParameterId::TransitionLayerCount => "transition layer count",
            ParameterId::BottomExposureTime => "bottom exposure time",
            ParameterId::ExposureTime => "exposure time",
            ParameterId::BottomLiftHeight => "bottom lift height",
            ParameterId::BottomLiftSpeed => "bottom lift speed",
            ParameterId::LiftHeight => "lift height",
            ParameterId::LiftSpeed => "lift speed",
            ParameterId::PositionZ => "position Z",
        };
        f.write_str(label)
    }
}

/// Whether a parameter is being edited globally or on a single layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParameterScope {
    Global,
    PerLayer,
}

impl fmt::Display for ParameterScope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ParameterScope::Global => "globally",
            ParameterScope::PerLayer => "per layer",
        })
    }
}

/// Capability declaration for one editable parameter.
#[derive(Debug, Clone, Copy)]
pub struct ParameterModifier {
    pub id: ParameterId,
    pub min: f32,
    pub max: f32,
    pub decimals: u8,
}

impl ParameterModifier {
    pub const fn new(id: ParameterId, min: f32, max: f32, decimals: u8) -> Self {
        Self {
            id,
            min,
            max,
            decimals,
        }
    }

    pub const BOTTOM_LAYER_COUNT: Self =
        Self::new(ParameterId::BottomLayerCount, 0.0, 1000.0, 0);
    pub const TRANSITION_LAYER_COUNT: Self =
        Self::new(ParameterId::TransitionLayerCount, 0.0, 1000.0, 0);
    pub const BOTTOM_EXPOSURE_TIME: Self =
        Self::new(ParameterId::BottomExposureTime, 0.0, 1000.0, VALUE_DECIMALS);
    pub const EXPOSURE_TIME: Self =
        Self::new(ParameterId::ExposureTime, 0.0, 1000.0, VALUE_DECIMALS);
    pub const BOTTOM_LIFT_HEIGHT: Self =
        Self::new(ParameterId::BottomLiftHeight, 0.0, 100.0, VALUE_DECIMALS);
    pub const BOTTOM_LIFT_SPEED: Self =
        Self::new(ParameterId::BottomLiftSpeed, 0.0, 5000.0, VALUE_DECIMALS);
    pub const LIFT_HEIGHT: Self =
        Self::new(ParameterId::LiftHeight, 0.0, 100.0, VALUE_DECIMALS);
    pub const LIFT_SPEED: Self =
        Self::new(ParameterId::LiftSpeed, 0.0, 5000.0, VALUE_DECIMALS);
    pub const POSITION_Z: Self =
        Self::new(ParameterId::PositionZ, 0.0, 10000.0, HEIGHT_DECIMALS);

    pub fn contains(&self, value: f32) -> bool {
        value >= self.min && value <= self.max
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn speed_conversion_identity() {
        let v = convert_speed(123.4, SpeedUnit::MillimetersPerMinute, CORE_SPEED_UNIT);
        assert_eq!(v, 123.4);
    }

    #[test]
    fn native_lift_speed_round_trips() {
        // 60 mm/s must survive the canonical round trip exactly.
        let canonical = convert_speed_rounded(
            60.0,
            SpeedUnit::MillimetersPerSecond,
            CORE_SPEED_UNIT,
            VALUE_DECIMALS,
        );
        assert_eq!(canonical, 3600.0);

        let native = convert_speed_rounded(
            canonical,
            CORE_SPEED_UNIT,
            SpeedUnit::MillimetersPerSecond,
            VALUE_DECIMALS,
        );
        assert_eq!(native, 60.0);
    }

    #[test]
    fn centimeters_per_minute() {
        assert_eq!(
            convert_speed(5.0, SpeedUnit::CentimetersPerMinute, CORE_SPEED_UNIT),
            50.0
        );
    }

    #[test]
    fn rounding_is_half_away_from_zero() {
        assert_eq!(round_away(0.125, 2), 0.13);
        assert_eq!(round_away(-0.125, 2), -0.13);
        assert_eq!(round_height(0.0505), 0.051);
    }

    #[test]
    fn modifier_range_check() {
        assert!(ParameterModifier::EXPOSURE_TIME.contains(2.5));
        assert!(!ParameterModifier::LIFT_HEIGHT.contains(-1.0));
    }
}
