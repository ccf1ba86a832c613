use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::ModelError;

/// Physical units attached to a parameter value.
///
/// Only identity matters to this crate; no conversion between units is performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Units {
    #[default]
    #[serde(rename = "none")]
    NoUnits,
    #[serde(rename = "um")]
    Micrometer,
    #[serde(rename = "mm")]
    Millimeter,
    #[serde(rename = "m")]
    Meter,
    #[serde(rename = "km")]
    Kilometer,
    #[serde(rename = "deg")]
    Degree,
    #[serde(rename = "arcsec")]
    Arcsec,
    #[serde(rename = "rad")]
    Radian,
    #[serde(rename = "s")]
    Second,
    #[serde(rename = "ms")]
    Millisecond,
    #[serde(rename = "K")]
    Kelvin,
    #[serde(rename = "V")]
    Volt,
    #[serde(rename = "A")]
    Ampere,
    #[serde(rename = "count")]
    Count,
}

impl Units {
    pub fn symbol(&self) -> &'static str {
        match self {
            Units::NoUnits => "none",
            Units::Micrometer => "um",
            Units::Millimeter => "mm",
            Units::Meter => "m",
            Units::Kilometer => "km",
            Units::Degree => "deg",
            Units::Arcsec => "arcsec",
            Units::Radian => "rad",
            Units::Second => "s",
            Units::Millisecond => "ms",
            Units::Kelvin => "K",
            Units::Volt => "V",
            Units::Ampere => "A",
            Units::Count => "count",
        }
    }
}

impl fmt::Display for Units {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

impl FromStr for Units {
    type Err = ModelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let units = match s.trim() {
            "none" | "" => Units::NoUnits,
            "um" => Units::Micrometer,
            "mm" => Units::Millimeter,
            "m" => Units::Meter,
            "km" => Units::Kilometer,
            "deg" => Units::Degree,
            "arcsec" => Units::Arcsec,
            "rad" => Units::Radian,
            "s" => Units::Second,
            "ms" => Units::Millisecond,
            "K" => Units::Kelvin,
            "V" => Units::Volt,
            "A" => Units::Ampere,
            "count" => Units::Count,
            other => return Err(ModelError::UnknownUnits(other.to_string())),
        };
        Ok(units)
    }
}
