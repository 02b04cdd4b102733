//! Calibration lookup engine.
//!
//! Resolves template calibration placeholders into concrete calibration
//! unit settings using a versioned table keyed by instrument configuration
//! and wavelength.

mod key;
mod lookup;
mod table;

pub use key::{CalibrationKey, F2Key, GmosKey, GratingKey};
pub use lookup::{CalibrationStep, UnmatchedCalibration};
pub use table::{CalibrationRow, CalibrationTable, WavelengthRange};
