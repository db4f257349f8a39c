//! Silicon photomultiplier device model
//!
//! This crate holds the configuration side of a SiPM simulation and the
//! feature extraction run on its output:
//!
//! - [`hardware`]: device properties with validated setters, name based
//!   dispatch and settings file loading
//! - [`photometry`]: photon detection efficiency, either a single value or a
//!   spectrum resampled onto a fixed wavelength grid
//! - [`signal`]: sampled analog waveforms and the timing and charge features
//!   computed over a time window
//! - [`diagnostics`]: non-fatal reports such as unknown property names
//!
//! ```
//! use sipm::{AnalogSignal, DeviceProperties};
//!
//! let mut properties = DeviceProperties::default();
//! properties.set_property("Size", 3.0).unwrap();
//! assert_eq!(properties.n_cells(), 14_400);
//!
//! let signal = AnalogSignal::new(vec![0.0, 0.0, 1.0, 2.0, 1.0, 0.0], 1.0).unwrap();
//! assert_eq!(signal.peak(0.0, 5.0, 0.0), 2.0);
//! ```

pub mod algo;
pub mod diagnostics;
pub mod hardware;
pub mod photometry;
pub mod signal;

pub use diagnostics::{Diagnostic, DiagnosticSink, LogSink};
pub use hardware::{DeviceProperties, HitDistribution, PropertyError, SettingsError};
pub use photometry::{Pde, PdeSpectrum, PdeType};
pub use signal::{AnalogSignal, SignalError};
