//! Calibration table keys.
//!
//! A key holds the discrete instrument fields a calibration depends on.
//! The central wavelength is matched separately against row ranges.

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};
use crate::model::{AmpGain, Instrument, InstrumentConfig};

/// Grating identity as far as calibrations are concerned.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GratingKey {
    pub name: String,
    pub order: i8,
}

/// GMOS (north or south) calibration key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct GmosKey {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grating: Option<GratingKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fpu: Option<String>,
    pub x_bin: u8,
    pub y_bin: u8,
    pub amp_gain: AmpGain,
}

/// Flamingos 2 calibration key; the detector has no binning or gain choice.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct F2Key {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub disperser: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filter: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fpu: Option<String>,
}

/// Instrument-specific calibration key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "instrument", rename_all = "snake_case")]
pub enum CalibrationKey {
    GmosNorth(GmosKey),
    GmosSouth(GmosKey),
    Flamingos2(F2Key),
}

impl CalibrationKey {
    /// Derive the key from a step's instrument configuration.
    pub fn from_config(config: &InstrumentConfig) -> EngineResult<Self> {
        match config.instrument {
            Instrument::GmosNorth => Ok(CalibrationKey::GmosNorth(gmos_key(config)?)),
            Instrument::GmosSouth => Ok(CalibrationKey::GmosSouth(gmos_key(config)?)),
            Instrument::Flamingos2 => Ok(CalibrationKey::Flamingos2(F2Key {
                disperser: config.grating.as_ref().map(|g| g.name.clone()),
                filter: config.filter.clone(),
                fpu: config.fpu.clone(),
            })),
        }
    }

    pub fn instrument(&self) -> Instrument {
        match self {
            CalibrationKey::GmosNorth(_) => Instrument::GmosNorth,
            CalibrationKey::GmosSouth(_) => Instrument::GmosSouth,
            CalibrationKey::Flamingos2(_) => Instrument::Flamingos2,
        }
    }

    pub fn grating(&self) -> Option<String> {
        match self {
            CalibrationKey::GmosNorth(k) | CalibrationKey::GmosSouth(k) => k
                .grating
                .as_ref()
                .map(|g| format!("{} (order {})", g.name, g.order)),
            CalibrationKey::Flamingos2(k) => k.disperser.clone(),
        }
    }

    pub fn filter(&self) -> Option<&str> {
        match self {
            CalibrationKey::GmosNorth(k) | CalibrationKey::GmosSouth(k) => k.filter.as_deref(),
            CalibrationKey::Flamingos2(k) => k.filter.as_deref(),
        }
    }

    pub fn fpu(&self) -> Option<&str> {
        match self {
            CalibrationKey::GmosNorth(k) | CalibrationKey::GmosSouth(k) => k.fpu.as_deref(),
            CalibrationKey::Flamingos2(k) => k.fpu.as_deref(),
        }
    }

    /// `(x_bin, y_bin)`, GMOS only.
    pub fn binning(&self) -> Option<(u8, u8)> {
        match self {
            CalibrationKey::GmosNorth(k) | CalibrationKey::GmosSouth(k) => Some((k.x_bin, k.y_bin)),
            CalibrationKey::Flamingos2(_) => None,
        }
    }

    pub fn amp_gain(&self) -> Option<AmpGain> {
        match self {
            CalibrationKey::GmosNorth(k) | CalibrationKey::GmosSouth(k) => Some(k.amp_gain),
            CalibrationKey::Flamingos2(_) => None,
        }
    }
}

fn gmos_key(config: &InstrumentConfig) -> EngineResult<GmosKey> {
    let readout = config.readout.ok_or_else(|| {
        EngineError::Configuration(format!(
            "{} configuration has no detector readout",
            config.instrument
        ))
    })?;
    Ok(GmosKey {
        grating: config.grating.as_ref().map(|g| GratingKey {
            name: g.name.clone(),
            order: g.order,
        }),
        filter: config.filter.clone(),
        fpu: config.fpu.clone(),
        x_bin: readout.x_bin,
        y_bin: readout.y_bin,
        amp_gain: readout.amp_gain,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{GratingConfig, Readout, TimeSpan, Wavelength};

    fn gmos_config() -> InstrumentConfig {
        InstrumentConfig {
            instrument: Instrument::GmosNorth,
            exposure: TimeSpan::from_secs(600),
            readout: Some(Readout::new(2, 2, AmpGain::Low)),
            grating: Some(GratingConfig {
                name: "B600_G5307".to_string(),
                order: 1,
                wavelength: Wavelength::from_nanometers(520),
            }),
            filter: None,
            fpu: Some("LongSlit_1_00".to_string()),
        }
    }

    #[test]
    fn test_key_ignores_wavelength_and_exposure() {
        let a = CalibrationKey::from_config(&gmos_config()).unwrap();
        let mut other = gmos_config();
        other.exposure = TimeSpan::from_secs(1);
        if let Some(g) = other.grating.as_mut() {
            g.wavelength = Wavelength::from_nanometers(700);
        }
        assert_eq!(a, CalibrationKey::from_config(&other).unwrap());
        assert_eq!(a.instrument(), Instrument::GmosNorth);
        assert_eq!(a.binning(), Some((2, 2)));
    }

    #[test]
    fn test_gmos_without_readout_is_configuration_error() {
        let mut config = gmos_config();
        config.readout = None;
        assert!(matches!(
            CalibrationKey::from_config(&config),
            Err(EngineError::Configuration(_))
        ));
    }

    #[test]
    fn test_key_tagged_by_instrument() {
        let yaml = r#"
instrument: flamingos2
disperser: R1200JH
fpu: LongSlit_2
"#;
        let key: CalibrationKey = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(key.instrument(), Instrument::Flamingos2);
        assert_eq!(key.grating().as_deref(), Some("R1200JH"));
        assert!(key.amp_gain().is_none());
    }
}
