use std::f64::consts::PI;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::MeridianError;

/// Radius of the sphere that defines the length of a degree.
const DEGREE_SPHERE_RADIUS: f64 = 6_370_997.0;

/// Units of projected coordinates.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Units {
    /// Radians.
    Radians,
    /// Degrees.
    Degrees,
    /// International feet.
    Feet,
    /// Meters.
    Meters,
    /// Screen pixels.
    Pixels,
    /// Pixels of a tile.
    TilePixels,
    /// US survey feet.
    UsFeet,
}

impl Units {
    /// Length of one unit in meters, if it has a fixed linear size.
    pub fn meters_per_unit(&self) -> Option<f64> {
        match self {
            Units::Radians => Some(DEGREE_SPHERE_RADIUS),
            Units::Degrees => Some(2.0 * PI * DEGREE_SPHERE_RADIUS / 360.0),
            Units::Feet => Some(0.3048),
            Units::Meters => Some(1.0),
            Units::UsFeet => Some(1200.0 / 3937.0),
            Units::Pixels | Units::TilePixels => None,
        }
    }

    fn as_str(&self) -> &'static str {
        match self {
            Units::Radians => "radians",
            Units::Degrees => "degrees",
            Units::Feet => "ft",
            Units::Meters => "m",
            Units::Pixels => "pixels",
            Units::TilePixels => "tile-pixels",
            Units::UsFeet => "us-ft",
        }
    }
}

impl Display for Units {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Units {
    type Err = MeridianError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "radians" => Ok(Units::Radians),
            "degrees" => Ok(Units::Degrees),
            "ft" => Ok(Units::Feet),
            "m" => Ok(Units::Meters),
            "pixels" => Ok(Units::Pixels),
            "tile-pixels" => Ok(Units::TilePixels),
            "us-ft" => Ok(Units::UsFeet),
            other => Err(MeridianError::Generic(format!("unknown units: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use approx::assert_abs_diff_eq;

    use super::*;

    #[test]
    fn degree_length() {
        let mpu = Units::Degrees.meters_per_unit().expect("degrees have length");
        assert_abs_diff_eq!(mpu, 111_194.87, epsilon = 0.01);
        assert_eq!(Units::Pixels.meters_per_unit(), None);
    }

    #[test]
    fn parse_units() {
        for units in [
            Units::Radians,
            Units::Degrees,
            Units::Feet,
            Units::Meters,
            Units::Pixels,
            Units::TilePixels,
            Units::UsFeet,
        ] {
            assert_eq!(units.to_string().parse::<Units>().ok(), Some(units));
        }

        assert!("furlongs".parse::<Units>().is_err());
    }
}
