//! SiPM device properties
//!
//! [`DeviceProperties`] holds every physical parameter the simulation needs:
//! geometry, pulse shape, noise sources and detection efficiency. It starts
//! from compiled-in defaults, is adjusted through validated setters (by hand
//! or from a settings file) and is then handed read-only to a simulator.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::diagnostics::{Diagnostic, DiagnosticSink, LogSink};
use crate::photometry::pde::{Pde, PdeError, PdeSpectrum, PdeType};

/// Largest number of cells along one side that keeps the total cell count in a `u32`
const MAX_SIDE_CELLS: f64 = 65_535.0;

/// Errors raised by the typed property setters
#[derive(Debug, Error, PartialEq)]
pub enum PropertyError {
    #[error("Invalid value {value} for {name}: {reason}")]
    InvalidParameter {
        name: &'static str,
        value: f64,
        reason: &'static str,
    },

    #[error("Invalid PDE spectrum: {0}")]
    Pde(#[from] PdeError),
}

fn invalid(name: &'static str, value: f64, reason: &'static str) -> PropertyError {
    PropertyError::InvalidParameter {
        name,
        value,
        reason,
    }
}

fn positive(name: &'static str, value: f64) -> Result<f64, PropertyError> {
    if value.is_finite() && value > 0.0 {
        Ok(value)
    } else {
        Err(invalid(name, value, "must be finite and positive"))
    }
}

fn non_negative(name: &'static str, value: f64) -> Result<f64, PropertyError> {
    if value.is_finite() && value >= 0.0 {
        Ok(value)
    } else {
        Err(invalid(name, value, "must be finite and non-negative"))
    }
}

fn probability(name: &'static str, value: f64) -> Result<f64, PropertyError> {
    if (0.0..=1.0).contains(&value) {
        Ok(value)
    } else {
        Err(invalid(name, value, "must be between 0.0 and 1.0"))
    }
}

fn finite(name: &'static str, value: f64) -> Result<f64, PropertyError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(invalid(name, value, "must be finite"))
    }
}

/// Cells along one side of a device of `size` mm with `pitch` µm cells
fn side_cells(size: f64, pitch: f64) -> f64 {
    (1000.0 * size / pitch).round()
}

/// A device must hold at least one cell and its cell count must fit a `u32`
fn check_geometry(size: f64, pitch: f64) -> Result<(), PropertyError> {
    let side = side_cells(size, pitch);
    if side < 1.0 {
        return Err(invalid("cells per side", side, "device would contain no cells"));
    }
    if side > MAX_SIDE_CELLS {
        return Err(invalid("cells per side", side, "device would contain too many cells"));
    }
    Ok(())
}

/// Where photons are assumed to land on the cell grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum HitDistribution {
    /// Photons spread evenly over the whole device
    #[default]
    Uniform,
    /// Photons concentrated in a circle around the device center
    Circle,
    /// Photons follow a Gaussian profile around the device center
    Gaussian,
}

impl fmt::Display for HitDistribution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HitDistribution::Uniform => write!(f, "Uniform"),
            HitDistribution::Circle => write!(f, "Circle"),
            HitDistribution::Gaussian => write!(f, "Gaussian"),
        }
    }
}

type Setter = fn(&mut DeviceProperties, f64) -> Result<(), PropertyError>;

/// Lower-case property names accepted by [`DeviceProperties::set_property`]
static SETTERS: Lazy<HashMap<&'static str, Setter>> = Lazy::new(|| {
    let mut setters: HashMap<&'static str, Setter> = HashMap::new();
    setters.insert("size", DeviceProperties::set_size);
    setters.insert("pitch", DeviceProperties::set_pitch);
    setters.insert("sampling", DeviceProperties::set_sampling);
    setters.insert("cellrecovery", DeviceProperties::set_recovery_time);
    setters.insert("recoverytime", DeviceProperties::set_recovery_time);
    setters.insert("signallength", DeviceProperties::set_signal_length);
    setters.insert("risetime", DeviceProperties::set_rise_time);
    setters.insert("falltimefast", DeviceProperties::set_fall_time_fast);
    setters.insert("falltimeslow", DeviceProperties::set_fall_time_slow);
    setters.insert(
        "slowcomponentfraction",
        DeviceProperties::set_slow_component_fraction,
    );
    setters.insert("tauapfast", DeviceProperties::set_tau_ap_fast);
    setters.insert("tauapslow", DeviceProperties::set_tau_ap_slow);
    setters.insert("ccgv", DeviceProperties::set_ccgv);
    setters.insert("snr", DeviceProperties::set_snr);
    setters.insert("pde", DeviceProperties::set_pde);
    setters.insert("dcr", DeviceProperties::set_dcr);
    setters.insert("xt", DeviceProperties::set_xt);
    setters.insert("dxt", DeviceProperties::set_dxt);
    setters.insert("ap", DeviceProperties::set_ap);
    setters
});

/// Check if a property name (any case) has a setter
pub fn is_known_property(name: &str) -> bool {
    SETTERS.contains_key(name.to_lowercase().as_str())
}

/// Physical description of a SiPM
///
/// Every setter validates its input and rejects values outside the physical
/// domain of the parameter with [`PropertyError::InvalidParameter`], leaving
/// the object untouched. Derived quantities (cell count, signal points,
/// linear SNR) are computed from the stored values on every call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceProperties {
    /// Side of the device in mm
    size: f64,
    /// Side of a single cell in µm
    pitch: f64,
    hit_distribution: HitDistribution,

    /// Sampling period in ns
    sampling: f64,
    /// Length of the generated signal in ns
    signal_length: f64,
    /// Signal rise time in ns
    rise_time: f64,
    /// Fast component of the signal decay in ns
    fall_time_fast: f64,
    /// Slow component of the signal decay in ns
    fall_time_slow: f64,
    slow_component_fraction: f64,
    has_slow_component: bool,
    /// Cell recovery time in ns
    recovery_time: f64,

    /// Dark count rate in Hz
    dcr: f64,
    has_dcr: bool,
    xt: f64,
    has_xt: bool,
    /// Delayed crosstalk as a fraction of crosstalk
    dxt: f64,
    has_dxt: bool,
    ap: f64,
    has_ap: bool,
    /// Afterpulse time constants in ns
    tau_ap_fast: f64,
    tau_ap_slow: f64,

    ccgv: f64,
    snr_db: f64,
    pde: Pde,
}

impl Default for DeviceProperties {
    fn default() -> Self {
        Self {
            size: 1.0,
            pitch: 25.0,
            hit_distribution: HitDistribution::Uniform,
            sampling: 1.0,
            signal_length: 500.0,
            rise_time: 1.0,
            fall_time_fast: 50.0,
            fall_time_slow: 100.0,
            slow_component_fraction: 0.8,
            has_slow_component: false,
            recovery_time: 50.0,
            dcr: 200e3,
            has_dcr: true,
            xt: 0.05,
            has_xt: true,
            dxt: 0.05,
            has_dxt: false,
            ap: 0.03,
            has_ap: true,
            tau_ap_fast: 10.0,
            tau_ap_slow: 80.0,
            ccgv: 0.05,
            snr_db: 30.0,
            pde: Pde::Off,
        }
    }
}

impl DeviceProperties {
    /// Properties at their compiled-in defaults
    pub fn new() -> Self {
        Self::default()
    }

    // =========================================================================
    // Generic setter
    // =========================================================================

    /// Set a property by name, reporting unknown names through `log`
    ///
    /// See [`DeviceProperties::set_property_with`].
    pub fn set_property(&mut self, name: &str, value: f64) -> Result<(), PropertyError> {
        self.set_property_with(name, value, &mut LogSink)
    }

    /// Set a property by name
    ///
    /// The name is matched case-insensitively against the names accepted in
    /// settings files. An unknown name is reported to `sink` as
    /// [`Diagnostic::UnknownProperty`] and otherwise ignored.
    ///
    /// # Errors
    ///
    /// Returns the error of the typed setter when the value is rejected.
    pub fn set_property_with(
        &mut self,
        name: &str,
        value: f64,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<(), PropertyError> {
        match SETTERS.get(name.to_lowercase().as_str()) {
            Some(setter) => setter(self, value),
            None => {
                sink.report(Diagnostic::UnknownProperty {
                    name: name.to_string(),
                });
                Ok(())
            }
        }
    }

    // =========================================================================
    // Geometry
    // =========================================================================

    /// Set the side of the device in mm
    ///
    /// Only the value itself is checked here, since settings may change size
    /// and pitch in either order. The combined cell count is checked by
    /// [`DeviceProperties::set_geometry`] and [`DeviceProperties::validate`].
    pub fn set_size(&mut self, size: f64) -> Result<(), PropertyError> {
        self.size = positive("size", size)?;
        Ok(())
    }

    /// Set the side of a cell in µm
    ///
    /// See [`DeviceProperties::set_size`] about the cell count.
    pub fn set_pitch(&mut self, pitch: f64) -> Result<(), PropertyError> {
        self.pitch = positive("pitch", pitch)?;
        Ok(())
    }

    /// Set device side (mm) and cell pitch (µm) together
    ///
    /// Rejects combinations with no cells or more than 65535 cells per side.
    pub fn set_geometry(&mut self, size: f64, pitch: f64) -> Result<(), PropertyError> {
        let size = positive("size", size)?;
        let pitch = positive("pitch", pitch)?;
        check_geometry(size, pitch)?;
        self.size = size;
        self.pitch = pitch;
        Ok(())
    }

    pub fn set_hit_distribution(&mut self, hit_distribution: HitDistribution) {
        self.hit_distribution = hit_distribution;
    }

    /// Side of the device in mm
    pub fn size(&self) -> f64 {
        self.size
    }

    /// Side of a cell in µm
    pub fn pitch(&self) -> f64 {
        self.pitch
    }

    /// Number of cells along one side of the device
    ///
    /// Clamped to `1..=65535` for geometries that [`DeviceProperties::validate`]
    /// would reject.
    pub fn n_side_cells(&self) -> u32 {
        side_cells(self.size, self.pitch).clamp(1.0, MAX_SIDE_CELLS) as u32
    }

    /// Total number of cells in the device
    pub fn n_cells(&self) -> u32 {
        let side = self.n_side_cells();
        side * side
    }

    pub fn hit_distribution(&self) -> HitDistribution {
        self.hit_distribution
    }

    // =========================================================================
    // Signal shape and timing
    // =========================================================================

    /// Set the sampling period in ns
    pub fn set_sampling(&mut self, sampling: f64) -> Result<(), PropertyError> {
        self.sampling = positive("sampling", sampling)?;
        Ok(())
    }

    /// Set the length of the generated signal in ns
    pub fn set_signal_length(&mut self, signal_length: f64) -> Result<(), PropertyError> {
        self.signal_length = positive("signal_length", signal_length)?;
        Ok(())
    }

    /// Set the signal rise time in ns
    pub fn set_rise_time(&mut self, rise_time: f64) -> Result<(), PropertyError> {
        self.rise_time = non_negative("rise_time", rise_time)?;
        Ok(())
    }

    /// Set the fast decay time in ns
    pub fn set_fall_time_fast(&mut self, fall_time: f64) -> Result<(), PropertyError> {
        self.fall_time_fast = positive("fall_time_fast", fall_time)?;
        Ok(())
    }

    /// Set the slow decay time in ns and enable the slow component
    pub fn set_fall_time_slow(&mut self, fall_time: f64) -> Result<(), PropertyError> {
        self.fall_time_slow = positive("fall_time_slow", fall_time)?;
        self.has_slow_component = true;
        Ok(())
    }

    /// Set the weight of the slow component and enable it
    pub fn set_slow_component_fraction(&mut self, fraction: f64) -> Result<(), PropertyError> {
        self.slow_component_fraction = probability("slow_component_fraction", fraction)?;
        self.has_slow_component = true;
        Ok(())
    }

    pub fn disable_slow_component(&mut self) {
        self.has_slow_component = false;
    }

    /// Set the cell recovery time in ns
    pub fn set_recovery_time(&mut self, recovery_time: f64) -> Result<(), PropertyError> {
        self.recovery_time = positive("recovery_time", recovery_time)?;
        Ok(())
    }

    /// Sampling period in ns
    pub fn sampling(&self) -> f64 {
        self.sampling
    }

    /// Length of the generated signal in ns
    pub fn signal_length(&self) -> f64 {
        self.signal_length
    }

    /// Number of samples in a generated signal
    pub fn signal_points(&self) -> u32 {
        (self.signal_length / self.sampling).round() as u32
    }

    pub fn rise_time(&self) -> f64 {
        self.rise_time
    }

    pub fn fall_time_fast(&self) -> f64 {
        self.fall_time_fast
    }

    pub fn fall_time_slow(&self) -> f64 {
        self.fall_time_slow
    }

    pub fn slow_component_fraction(&self) -> f64 {
        self.slow_component_fraction
    }

    pub fn has_slow_component(&self) -> bool {
        self.has_slow_component
    }

    pub fn recovery_time(&self) -> f64 {
        self.recovery_time
    }

    // =========================================================================
    // Noise
    // =========================================================================

    /// Set the dark count rate in Hz and enable dark counts
    pub fn set_dcr(&mut self, dcr: f64) -> Result<(), PropertyError> {
        self.dcr = non_negative("dcr", dcr)?;
        self.has_dcr = true;
        Ok(())
    }

    /// Set the optical crosstalk probability and enable crosstalk
    pub fn set_xt(&mut self, xt: f64) -> Result<(), PropertyError> {
        self.xt = probability("xt", xt)?;
        self.has_xt = true;
        Ok(())
    }

    /// Set the delayed fraction of optical crosstalk and enable it
    ///
    /// Delayed crosstalk only has an effect while crosstalk is enabled.
    pub fn set_dxt(&mut self, dxt: f64) -> Result<(), PropertyError> {
        self.dxt = probability("dxt", dxt)?;
        self.has_dxt = true;
        Ok(())
    }

    /// Set the afterpulse probability and enable afterpulses
    pub fn set_ap(&mut self, ap: f64) -> Result<(), PropertyError> {
        self.ap = probability("ap", ap)?;
        self.has_ap = true;
        Ok(())
    }

    /// Set the fast afterpulse time constant in ns
    pub fn set_tau_ap_fast(&mut self, tau: f64) -> Result<(), PropertyError> {
        self.tau_ap_fast = positive("tau_ap_fast", tau)?;
        Ok(())
    }

    /// Set the slow afterpulse time constant in ns
    pub fn set_tau_ap_slow(&mut self, tau: f64) -> Result<(), PropertyError> {
        self.tau_ap_slow = positive("tau_ap_slow", tau)?;
        Ok(())
    }

    pub fn disable_dcr(&mut self) {
        self.has_dcr = false;
    }

    pub fn disable_xt(&mut self) {
        self.has_xt = false;
    }

    pub fn disable_dxt(&mut self) {
        self.has_dxt = false;
    }

    pub fn disable_ap(&mut self) {
        self.has_ap = false;
    }

    /// Dark count rate in Hz
    pub fn dcr(&self) -> f64 {
        self.dcr
    }

    pub fn has_dcr(&self) -> bool {
        self.has_dcr
    }

    pub fn xt(&self) -> f64 {
        self.xt
    }

    pub fn has_xt(&self) -> bool {
        self.has_xt
    }

    pub fn dxt(&self) -> f64 {
        self.dxt
    }

    pub fn has_dxt(&self) -> bool {
        self.has_dxt
    }

    pub fn ap(&self) -> f64 {
        self.ap
    }

    pub fn has_ap(&self) -> bool {
        self.has_ap
    }

    pub fn tau_ap_fast(&self) -> f64 {
        self.tau_ap_fast
    }

    pub fn tau_ap_slow(&self) -> f64 {
        self.tau_ap_slow
    }

    // =========================================================================
    // Gain and SNR
    // =========================================================================

    /// Set the relative cell-to-cell gain variation
    pub fn set_ccgv(&mut self, ccgv: f64) -> Result<(), PropertyError> {
        self.ccgv = non_negative("ccgv", ccgv)?;
        Ok(())
    }

    /// Set the signal-to-noise ratio in dB
    pub fn set_snr(&mut self, snr_db: f64) -> Result<(), PropertyError> {
        self.snr_db = finite("snr", snr_db)?;
        Ok(())
    }

    pub fn ccgv(&self) -> f64 {
        self.ccgv
    }

    /// Signal-to-noise ratio in dB
    pub fn snr_db(&self) -> f64 {
        self.snr_db
    }

    /// Noise amplitude relative to a single photoelectron: `10^(-snr_db/20)`
    pub fn snr_linear(&self) -> f64 {
        10f64.powf(-self.snr_db / 20.0)
    }

    // =========================================================================
    // Photon detection efficiency
    // =========================================================================

    /// Use a wavelength independent PDE, replacing any spectrum
    pub fn set_pde(&mut self, pde: f64) -> Result<(), PropertyError> {
        self.pde = Pde::Scalar(probability("pde", pde)?);
        Ok(())
    }

    /// Use a wavelength dependent PDE resampled from a measured curve
    ///
    /// See [`PdeSpectrum::resample`] for the resampling rules.
    pub fn set_pde_spectrum(
        &mut self,
        wavelengths: &[f64],
        efficiencies: &[f64],
    ) -> Result<(), PropertyError> {
        let spectrum = PdeSpectrum::resample(wavelengths, efficiencies)?;
        log::debug!(
            "Resampled PDE spectrum from {} points onto {:.1}..{:.1} nm",
            wavelengths.len(),
            spectrum.wavelengths()[0],
            spectrum.wavelengths()[spectrum.wavelengths().len() - 1],
        );
        self.pde = Pde::Spectrum(spectrum);
        Ok(())
    }

    /// Detect every photon
    pub fn disable_pde(&mut self) {
        self.pde = Pde::Off;
    }

    pub fn pde(&self) -> &Pde {
        &self.pde
    }

    pub fn pde_type(&self) -> PdeType {
        self.pde.pde_type()
    }

    /// The resampled spectrum, if a spectral PDE is active
    pub fn pde_spectrum(&self) -> Option<&PdeSpectrum> {
        match &self.pde {
            Pde::Spectrum(spectrum) => Some(spectrum),
            _ => None,
        }
    }

    /// Probability that a photon of the given wavelength (nm) is detected
    pub fn pde_at(&self, wavelength: f64) -> f64 {
        self.pde.at(wavelength)
    }

    // =========================================================================
    // Validation and persistence
    // =========================================================================

    /// Check every stored value against the setter domains
    ///
    /// Useful for properties that did not come through the setters, such as
    /// deserialized ones.
    pub fn validate(&self) -> Result<(), PropertyError> {
        positive("size", self.size)?;
        positive("pitch", self.pitch)?;
        check_geometry(self.size, self.pitch)?;
        positive("sampling", self.sampling)?;
        positive("signal_length", self.signal_length)?;
        non_negative("rise_time", self.rise_time)?;
        positive("fall_time_fast", self.fall_time_fast)?;
        positive("fall_time_slow", self.fall_time_slow)?;
        probability("slow_component_fraction", self.slow_component_fraction)?;
        positive("recovery_time", self.recovery_time)?;
        non_negative("dcr", self.dcr)?;
        probability("xt", self.xt)?;
        probability("dxt", self.dxt)?;
        probability("ap", self.ap)?;
        positive("tau_ap_fast", self.tau_ap_fast)?;
        positive("tau_ap_slow", self.tau_ap_slow)?;
        non_negative("ccgv", self.ccgv)?;
        finite("snr", self.snr_db)?;
        match &self.pde {
            Pde::Off => {}
            Pde::Scalar(pde) => {
                probability("pde", *pde)?;
            }
            Pde::Spectrum(spectrum) => spectrum.validate()?,
        }
        Ok(())
    }

    /// Save to JSON file
    pub fn save_to_file(&self, path: &Path) -> Result<(), std::io::Error> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        std::fs::write(path, json)
    }

    /// Load from JSON file, rejecting out-of-domain values
    pub fn load_from_file(path: &Path) -> Result<Self, std::io::Error> {
        let json = std::fs::read_to_string(path)?;
        let properties: Self = serde_json::from_str(&json)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        properties
            .validate()
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        Ok(properties)
    }
}

impl fmt::Display for DeviceProperties {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "===> SiPM Properties <===")?;
        writeln!(f, "Address: {:p}", self)?;
        writeln!(f, "Size: {:.2} mm", self.size)?;
        writeln!(f, "Pitch: {:.2} um", self.pitch)?;
        writeln!(f, "Number of cells: {}", self.n_cells())?;
        writeln!(f, "Hit distribution: {}", self.hit_distribution)?;
        writeln!(f, "Cell recovery time: {:.2} ns", self.recovery_time)?;

        if self.has_dcr {
            writeln!(f, "Dark count rate: {:.2} kHz", self.dcr / 1e3)?;
        } else {
            writeln!(f, "Dark count is OFF")?;
        }
        if self.has_xt {
            writeln!(f, "Optical crosstalk probability: {:.2} %", self.xt * 100.0)?;
        } else {
            writeln!(f, "Optical crosstalk is OFF")?;
        }
        if self.has_xt && self.has_dxt {
            writeln!(
                f,
                "Delayed optical crosstalk probability (as a fraction of xt): {:.2} %",
                self.dxt * 100.0
            )?;
        } else {
            writeln!(f, "Delayed optical crosstalk is OFF")?;
        }
        if self.has_ap {
            writeln!(f, "Afterpulse probability: {:.2} %", self.ap * 100.0)?;
            writeln!(f, "Tau afterpulses (fast): {:.2} ns", self.tau_ap_fast)?;
            writeln!(f, "Tau afterpulses (slow): {:.2} ns", self.tau_ap_slow)?;
        } else {
            writeln!(f, "Afterpulse is OFF")?;
        }

        writeln!(f, "Cell-to-cell gain variation: {:.2} %", self.ccgv * 100.0)?;
        writeln!(f, "SNR: {:.2} dB", self.snr_db)?;

        match &self.pde {
            Pde::Off => writeln!(f, "Photon detection efficiency is OFF (100 %)")?,
            Pde::Scalar(pde) => {
                writeln!(f, "Photon detection efficiency: {:.2} %", pde * 100.0)?
            }
            Pde::Spectrum(spectrum) => {
                writeln!(f, "Photon detection efficiency: depending on wavelength")?;
                writeln!(f, "Photon wavelength\tDetection efficiency")?;
                for (wavelength, efficiency) in spectrum.iter() {
                    writeln!(f, "{wavelength:.2} -> {efficiency:.2}")?;
                }
            }
        }

        writeln!(f, "Rising time of signal: {:.2} ns", self.rise_time)?;
        writeln!(f, "Falling time of signal (fast): {:.2} ns", self.fall_time_fast)?;
        if self.has_slow_component {
            writeln!(f, "Falling time of signal (slow): {:.2} ns", self.fall_time_slow)?;
            writeln!(
                f,
                "Slow component fraction: {:.2} %",
                self.slow_component_fraction * 100.0
            )?;
        }
        writeln!(f, "Signal length: {:.2} ns", self.signal_length)?;
        writeln!(f, "Sampling time: {:.2} ns", self.sampling)
    }
}
