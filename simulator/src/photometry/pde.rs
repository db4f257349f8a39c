//! Photon detection efficiency (PDE) models
//!
//! A SiPM either detects every photon, detects photons with a fixed
//! probability, or has a wavelength dependent efficiency. Spectral curves are
//! resampled onto a fixed grid of [`PDE_SPECTRUM_POINTS`] wavelengths so the
//! simulator never carries an arbitrary user table around.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::algo::misc::{interp, linear_between, power_law_between};

/// Number of points in a resampled PDE spectrum
pub const PDE_SPECTRUM_POINTS: usize = 32;

/// Errors that can occur when building a PDE spectrum
#[derive(Debug, Error, PartialEq)]
pub enum PdeError {
    #[error("Wavelength and efficiency vectors must have the same length ({0} != {1})")]
    LengthMismatch(usize, usize),

    #[error("At least two distinct wavelengths are required, got {0}")]
    InsufficientPoints(usize),

    #[error("Wavelengths must be finite and positive, got {0}")]
    InvalidWavelength(f64),

    #[error("Efficiency values must be between 0.0 and 1.0, got {0}")]
    OutOfRange(f64),

    #[error("Spectrum grid must have {expected} points, got {0}", expected = PDE_SPECTRUM_POINTS)]
    GridSize(usize),

    #[error("Spectrum wavelengths must be strictly ascending")]
    NotAscending,
}

/// Which PDE model is active
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PdeType {
    /// Every photon is detected
    None,
    /// A single wavelength independent efficiency
    Simple,
    /// Wavelength dependent efficiency
    Spectrum,
}

/// Detection efficiency sampled on a uniform wavelength grid
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PdeSpectrum {
    /// Wavelengths in nanometers, uniformly spaced and ascending
    wavelengths: Vec<f64>,

    /// Efficiency (>= 0.0) at each wavelength
    efficiencies: Vec<f64>,

    /// Largest measured wavelength, one grid step past the last point
    max_wavelength: f64,
}

impl PdeSpectrum {
    /// Resample a measured efficiency curve onto the fixed grid.
    ///
    /// The input does not need to be sorted or uniformly spaced. When a
    /// wavelength appears more than once the last occurrence wins. The grid
    /// starts at the smallest wavelength and advances in steps of
    /// `(max - min) / 32`, so its last point sits one step below the largest
    /// input wavelength.
    ///
    /// Each grid point is interpolated in log-log space between the two
    /// bracketing input samples. When that is undefined or negative (a zero
    /// efficiency on the bracket) linear interpolation is used instead, and
    /// anything still negative is clamped to zero.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The vectors have different lengths
    /// - Fewer than two distinct wavelengths are given
    /// - A wavelength is not finite and positive
    /// - An efficiency is outside `[0.0, 1.0]`
    pub fn resample(wavelengths: &[f64], efficiencies: &[f64]) -> Result<Self, PdeError> {
        let table = build_table(wavelengths, efficiencies)?;

        let xmin = table[0].0;
        let xmax = table[table.len() - 1].0;
        let dx = (xmax - xmin) / PDE_SPECTRUM_POINTS as f64;

        let mut new_wavelengths = Vec::with_capacity(PDE_SPECTRUM_POINTS);
        let mut new_efficiencies = Vec::with_capacity(PDE_SPECTRUM_POINTS);

        for i in 0..PDE_SPECTRUM_POINTS {
            let newx = xmin + i as f64 * dx;

            // First sample strictly above newx, kept off both table ends
            let upper = table
                .partition_point(|&(x, _)| x <= newx)
                .clamp(1, table.len() - 1);
            let lower = table[upper - 1];
            let upper = table[upper];

            let mut newy = power_law_between(newx, lower, upper);
            if newy.is_nan() || newy < 0.0 {
                newy = linear_between(newx, lower, upper);
            }
            let newy = newy.max(0.0);

            new_wavelengths.push(newx);
            new_efficiencies.push(newy);
        }

        Ok(Self {
            wavelengths: new_wavelengths,
            efficiencies: new_efficiencies,
            max_wavelength: xmax,
        })
    }

    /// Check the structure of a spectrum that did not come from
    /// [`PdeSpectrum::resample`], such as a deserialized one
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The grid does not have [`PDE_SPECTRUM_POINTS`] wavelengths and
    ///   efficiencies
    /// - A wavelength is not finite and positive, or the upper edge is
    /// - The wavelengths, followed by the upper edge, are not strictly ascending
    /// - An efficiency is outside `[0.0, 1.0]`
    pub fn validate(&self) -> Result<(), PdeError> {
        if self.wavelengths.len() != self.efficiencies.len() {
            return Err(PdeError::LengthMismatch(
                self.wavelengths.len(),
                self.efficiencies.len(),
            ));
        }
        if self.wavelengths.len() != PDE_SPECTRUM_POINTS {
            return Err(PdeError::GridSize(self.wavelengths.len()));
        }

        let edges = self.wavelengths.iter().chain(std::iter::once(&self.max_wavelength));
        for &wavelength in edges.clone() {
            if !wavelength.is_finite() || wavelength <= 0.0 {
                return Err(PdeError::InvalidWavelength(wavelength));
            }
        }
        let ascending = edges
            .clone()
            .zip(edges.skip(1))
            .all(|(lower, upper)| lower < upper);
        if !ascending {
            return Err(PdeError::NotAscending);
        }

        for &efficiency in &self.efficiencies {
            if !(0.0..=1.0).contains(&efficiency) {
                return Err(PdeError::OutOfRange(efficiency));
            }
        }
        Ok(())
    }

    /// Grid wavelengths in nanometers
    pub fn wavelengths(&self) -> &[f64] {
        &self.wavelengths
    }

    /// Efficiency at each grid wavelength
    pub fn efficiencies(&self) -> &[f64] {
        &self.efficiencies
    }

    /// Largest wavelength of the measured curve in nanometers
    pub fn max_wavelength(&self) -> f64 {
        self.max_wavelength
    }

    /// Iterate over `(wavelength, efficiency)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.wavelengths
            .iter()
            .copied()
            .zip(self.efficiencies.iter().copied())
    }

    /// Get the efficiency at a specific wavelength
    ///
    /// Linear between grid points. Between the last grid point and the
    /// largest measured wavelength the last value holds; outside the
    /// measured band the efficiency is 0.0.
    pub fn at(&self, wavelength: f64) -> f64 {
        match (self.wavelengths.last(), self.efficiencies.last()) {
            (Some(&x), Some(&y)) if wavelength > x && wavelength <= self.max_wavelength => y,
            _ => interp(wavelength, &self.wavelengths, &self.efficiencies).unwrap_or(0.0),
        }
    }
}

/// Sorted, deduplicated `(wavelength, efficiency)` table
fn build_table(wavelengths: &[f64], efficiencies: &[f64]) -> Result<Vec<(f64, f64)>, PdeError> {
    if wavelengths.len() != efficiencies.len() {
        return Err(PdeError::LengthMismatch(
            wavelengths.len(),
            efficiencies.len(),
        ));
    }

    for (&wavelength, &efficiency) in wavelengths.iter().zip(efficiencies) {
        if !wavelength.is_finite() || wavelength <= 0.0 {
            return Err(PdeError::InvalidWavelength(wavelength));
        }
        if !(0.0..=1.0).contains(&efficiency) {
            return Err(PdeError::OutOfRange(efficiency));
        }
    }

    // Stable sort keeps input order among equal wavelengths
    let mut pairs: Vec<(f64, f64)> = wavelengths
        .iter()
        .copied()
        .zip(efficiencies.iter().copied())
        .collect();
    pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

    let mut table: Vec<(f64, f64)> = Vec::with_capacity(pairs.len());
    for (x, y) in pairs {
        match table.last_mut() {
            Some(last) if last.0 == x => last.1 = y,
            _ => table.push((x, y)),
        }
    }

    if table.len() < 2 {
        return Err(PdeError::InsufficientPoints(table.len()));
    }

    Ok(table)
}

/// Photon detection efficiency of a device
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub enum Pde {
    /// PDE is off: every photon is detected
    #[default]
    Off,
    /// Same detection probability at every wavelength
    Scalar(f64),
    /// Wavelength dependent detection probability
    Spectrum(PdeSpectrum),
}

impl Pde {
    /// Which model is active
    pub fn pde_type(&self) -> PdeType {
        match self {
            Pde::Off => PdeType::None,
            Pde::Scalar(_) => PdeType::Simple,
            Pde::Spectrum(_) => PdeType::Spectrum,
        }
    }

    /// Probability that a photon of the given wavelength (nm) is detected
    pub fn at(&self, wavelength: f64) -> f64 {
        match self {
            Pde::Off => 1.0,
            Pde::Scalar(pde) => *pde,
            Pde::Spectrum(spectrum) => spectrum.at(wavelength),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rand::rngs::StdRng;
    use rand::{Rng, SeedableRng};

    fn measured_curve() -> (Vec<f64>, Vec<f64>) {
        (
            vec![300.0, 350.0, 400.0, 450.0, 500.0, 600.0, 700.0, 800.0, 900.0],
            vec![0.05, 0.25, 0.42, 0.50, 0.45, 0.32, 0.20, 0.10, 0.04],
        )
    }

    #[test]
    fn test_resample_grid_shape() {
        let (wav, pde) = measured_curve();
        let spectrum = PdeSpectrum::resample(&wav, &pde).unwrap();

        assert_eq!(spectrum.wavelengths().len(), PDE_SPECTRUM_POINTS);
        assert_eq!(spectrum.efficiencies().len(), PDE_SPECTRUM_POINTS);

        assert_eq!(spectrum.wavelengths()[0], 300.0);
        let dx = 600.0 / 32.0;
        assert_relative_eq!(spectrum.wavelengths()[31], 900.0 - dx, epsilon = 1e-9);

        for w in spectrum.wavelengths().windows(2) {
            assert!(w[1] > w[0]);
            assert_relative_eq!(w[1] - w[0], dx, epsilon = 1e-9);
        }
        assert!(spectrum.efficiencies().iter().all(|&e| e >= 0.0));
    }

    #[test]
    fn test_first_point_reproduces_input() {
        let (wav, pde) = measured_curve();
        let spectrum = PdeSpectrum::resample(&wav, &pde).unwrap();
        assert_relative_eq!(spectrum.efficiencies()[0], 0.05, epsilon = 1e-12);
    }

    #[test]
    fn test_two_point_power_law() {
        // Two points span a single bracket: every grid value follows the power law
        let spectrum = PdeSpectrum::resample(&[400.0, 800.0], &[0.2, 0.4]).unwrap();
        let exponent = (0.4f64 / 0.2).ln() / 2.0f64.ln();

        for (x, y) in spectrum.iter() {
            let expected = 0.2 * (x / 400.0).powf(exponent);
            assert_relative_eq!(y, expected, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_unsorted_input_matches_sorted() {
        let (wav, pde) = measured_curve();
        let sorted = PdeSpectrum::resample(&wav, &pde).unwrap();

        let mut pairs: Vec<(f64, f64)> = wav.iter().copied().zip(pde.iter().copied()).collect();
        pairs.reverse();
        pairs.swap(1, 5);
        let (wav_shuffled, pde_shuffled): (Vec<f64>, Vec<f64>) = pairs.into_iter().unzip();
        let shuffled = PdeSpectrum::resample(&wav_shuffled, &pde_shuffled).unwrap();

        assert_eq!(sorted, shuffled);
    }

    #[test]
    fn test_duplicate_wavelength_last_wins() {
        let first = PdeSpectrum::resample(&[400.0, 400.0, 600.0], &[0.9, 0.3, 0.5]).unwrap();
        let expected = PdeSpectrum::resample(&[400.0, 600.0], &[0.3, 0.5]).unwrap();
        assert_eq!(first, expected);
        assert_relative_eq!(first.efficiencies()[0], 0.3, epsilon = 1e-12);
    }

    #[test]
    fn test_zero_efficiency_collapses_power_law() {
        let spectrum = PdeSpectrum::resample(&[400.0, 500.0, 600.0], &[0.0, 0.5, 0.0]).unwrap();

        // Inside a bracket touching zero the power law is zero everywhere
        assert_eq!(spectrum.efficiencies()[0], 0.0);
        assert_eq!(spectrum.efficiencies()[5], 0.0);
        assert_eq!(spectrum.efficiencies()[20], 0.0);
        for &y in spectrum.efficiencies() {
            assert!(y.is_finite());
            assert!(y >= 0.0);
        }
    }

    #[test]
    fn test_undefined_power_law_falls_back_to_linear() {
        // Grid point 16 lands exactly on 500 nm and its bracket ends at zero,
        // so the log-log form evaluates ln(0) * ln(1)
        let spectrum = PdeSpectrum::resample(&[300.0, 500.0, 700.0], &[0.2, 0.5, 0.0]).unwrap();
        assert_eq!(spectrum.wavelengths()[16], 500.0);
        assert_relative_eq!(spectrum.efficiencies()[16], 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_randomized_inputs_stay_on_grid() {
        let mut rng = StdRng::seed_from_u64(7);

        for _ in 0..50 {
            let n = rng.random_range(2..40);
            let wav: Vec<f64> = (0..n).map(|_| rng.random_range(250.0..1000.0)).collect();
            let pde: Vec<f64> = (0..n).map(|_| rng.random_range(0.0..=1.0)).collect();

            let xmin = wav.iter().copied().fold(f64::INFINITY, f64::min);
            let xmax = wav.iter().copied().fold(f64::NEG_INFINITY, f64::max);

            let spectrum = match PdeSpectrum::resample(&wav, &pde) {
                Ok(spectrum) => spectrum,
                Err(PdeError::InsufficientPoints(_)) => continue,
                Err(e) => panic!("unexpected error: {e}"),
            };

            assert_eq!(spectrum.wavelengths().len(), PDE_SPECTRUM_POINTS);
            assert_eq!(spectrum.wavelengths()[0], xmin);
            assert!(*spectrum.wavelengths().last().unwrap() < xmax);
            assert!(spectrum.wavelengths().windows(2).all(|w| w[1] > w[0]));
            assert!(spectrum
                .efficiencies()
                .iter()
                .all(|&e| e.is_finite() && e >= 0.0));
        }
    }

    #[test]
    fn test_invalid_inputs() {
        assert_eq!(
            PdeSpectrum::resample(&[400.0, 500.0], &[0.1]),
            Err(PdeError::LengthMismatch(2, 1))
        );
        assert_eq!(
            PdeSpectrum::resample(&[400.0], &[0.1]),
            Err(PdeError::InsufficientPoints(1))
        );
        assert_eq!(
            PdeSpectrum::resample(&[400.0, 400.0], &[0.1, 0.2]),
            Err(PdeError::InsufficientPoints(1))
        );
        assert_eq!(
            PdeSpectrum::resample(&[-400.0, 500.0], &[0.1, 0.2]),
            Err(PdeError::InvalidWavelength(-400.0))
        );
        assert_eq!(
            PdeSpectrum::resample(&[400.0, 500.0], &[0.1, 1.2]),
            Err(PdeError::OutOfRange(1.2))
        );
        assert!(matches!(
            PdeSpectrum::resample(&[400.0, f64::NAN], &[0.1, 0.2]),
            Err(PdeError::InvalidWavelength(_))
        ));
    }

    #[test]
    fn test_spectrum_lookup() {
        let spectrum = PdeSpectrum::resample(&[400.0, 800.0], &[0.2, 0.4]).unwrap();

        assert_relative_eq!(spectrum.at(400.0), 0.2, epsilon = 1e-12);
        let x = spectrum.wavelengths()[10];
        assert_relative_eq!(spectrum.at(x), spectrum.efficiencies()[10], epsilon = 1e-12);

        // Outside the measured band nothing is detected
        assert_eq!(spectrum.at(300.0), 0.0);
        assert_eq!(spectrum.at(900.0), 0.0);
        assert_eq!(spectrum.at(800.5), 0.0);
    }

    #[test]
    fn test_lookup_holds_last_value_up_to_band_end() {
        let spectrum = PdeSpectrum::resample(&[400.0, 800.0], &[0.2, 0.4]).unwrap();
        let last = spectrum.efficiencies()[PDE_SPECTRUM_POINTS - 1];

        assert_eq!(spectrum.max_wavelength(), 800.0);
        assert!(spectrum.wavelengths()[PDE_SPECTRUM_POINTS - 1] < 790.0);
        assert_relative_eq!(last, 0.4 * 787.5 / 800.0, epsilon = 1e-9);
        assert_eq!(spectrum.at(790.0), last);
        assert_eq!(spectrum.at(800.0), last);
        assert!(spectrum.at(800.0) > 0.39);
    }

    #[test]
    fn test_resampled_spectrum_validates() {
        let (wav, pde) = measured_curve();
        let spectrum = PdeSpectrum::resample(&wav, &pde).unwrap();
        assert_eq!(spectrum.validate(), Ok(()));
    }

    #[test]
    fn test_malformed_spectrum_is_rejected() {
        let valid = PdeSpectrum::resample(&[400.0, 800.0], &[0.2, 0.4]).unwrap();

        let mut unsorted = valid.clone();
        unsorted.wavelengths.swap(3, 4);
        assert_eq!(unsorted.validate(), Err(PdeError::NotAscending));

        let mut short = valid.clone();
        short.wavelengths.truncate(3);
        short.efficiencies.truncate(3);
        assert_eq!(short.validate(), Err(PdeError::GridSize(3)));

        let mut uneven = valid.clone();
        uneven.efficiencies.pop();
        assert_eq!(uneven.validate(), Err(PdeError::LengthMismatch(32, 31)));

        let mut non_finite = valid.clone();
        non_finite.wavelengths[5] = f64::NAN;
        assert!(matches!(
            non_finite.validate(),
            Err(PdeError::InvalidWavelength(_))
        ));

        let mut edge_inside = valid.clone();
        edge_inside.max_wavelength = 500.0;
        assert_eq!(edge_inside.validate(), Err(PdeError::NotAscending));

        let mut too_efficient = valid;
        too_efficient.efficiencies[0] = 1.5;
        assert_eq!(too_efficient.validate(), Err(PdeError::OutOfRange(1.5)));
    }

    #[test]
    fn test_pde_variants() {
        assert_eq!(Pde::default().pde_type(), PdeType::None);
        assert_eq!(Pde::Off.at(500.0), 1.0);

        let scalar = Pde::Scalar(0.35);
        assert_eq!(scalar.pde_type(), PdeType::Simple);
        assert_eq!(scalar.at(250.0), 0.35);
        assert_eq!(scalar.at(900.0), 0.35);

        let spectrum = Pde::Spectrum(PdeSpectrum::resample(&[400.0, 800.0], &[0.2, 0.4]).unwrap());
        assert_eq!(spectrum.pde_type(), PdeType::Spectrum);
        assert_relative_eq!(spectrum.at(400.0), 0.2, epsilon = 1e-12);
    }
}
