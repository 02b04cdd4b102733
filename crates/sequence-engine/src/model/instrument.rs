//! Instrument configuration.
//!
//! The engine treats instrument configuration as opaque apart from the
//! fields that key calibration lookup (grating, filter, focal plane unit,
//! binning, gain) and the exposure time used for time accounting.

use serde::{Deserialize, Serialize};

use super::units::{TimeSpan, Wavelength};

/// Supported instruments.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Instrument {
    GmosNorth,
    GmosSouth,
    Flamingos2,
}

impl std::fmt::Display for Instrument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Instrument::GmosNorth => "gmos_north",
            Instrument::GmosSouth => "gmos_south",
            Instrument::Flamingos2 => "flamingos2",
        };
        write!(f, "{}", s)
    }
}

impl std::str::FromStr for Instrument {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().replace('-', "_").as_str() {
            "gmos_north" | "gmosnorth" | "gmos_n" => Ok(Instrument::GmosNorth),
            "gmos_south" | "gmossouth" | "gmos_s" => Ok(Instrument::GmosSouth),
            "flamingos2" | "f2" => Ok(Instrument::Flamingos2),
            other => Err(format!("unknown instrument: {other}")),
        }
    }
}

/// Observing mode of an observation; selects the template family.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObservingMode {
    GmosNorthLongSlit,
    GmosSouthLongSlit,
    Flamingos2LongSlit,
}

impl ObservingMode {
    pub fn instrument(&self) -> Instrument {
        match self {
            ObservingMode::GmosNorthLongSlit => Instrument::GmosNorth,
            ObservingMode::GmosSouthLongSlit => Instrument::GmosSouth,
            ObservingMode::Flamingos2LongSlit => Instrument::Flamingos2,
        }
    }
}

/// Amplifier gain setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AmpGain {
    Low,
    High,
}

impl std::fmt::Display for AmpGain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AmpGain::Low => write!(f, "low"),
            AmpGain::High => write!(f, "high"),
        }
    }
}

/// Detector readout: binning and gain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Readout {
    pub x_bin: u8,
    pub y_bin: u8,
    pub amp_gain: AmpGain,
}

impl Readout {
    pub fn new(x_bin: u8, y_bin: u8, amp_gain: AmpGain) -> Self {
        Self {
            x_bin,
            y_bin,
            amp_gain,
        }
    }
}

/// Grating (disperser) configuration.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GratingConfig {
    pub name: String,
    pub order: i8,
    /// Central wavelength.
    pub wavelength: Wavelength,
}

/// Instrument configuration of a single step.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct InstrumentConfig {
    pub instrument: Instrument,
    pub exposure: TimeSpan,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub readout: Option<Readout>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grating: Option<GratingConfig>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fpu: Option<String>,
}

impl InstrumentConfig {
    /// Central wavelength, when dispersed.
    pub fn wavelength(&self) -> Option<Wavelength> {
        self.grating.as_ref().map(|g| g.wavelength)
    }

    /// Copy of this configuration with a different exposure time.
    pub fn with_exposure(&self, exposure: TimeSpan) -> Self {
        Self {
            exposure,
            ..self.clone()
        }
    }
}
