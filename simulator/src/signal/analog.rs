//! Sampled analog output of a SiPM
//!
//! [`AnalogSignal`] stores the generated waveform at a fixed sampling period.
//! Amplitudes are scaled so that one photoelectron, without noise, peaks at
//! 1.0; SNR and gain variation are expressed relative to that height.
//!
//! # Feature windows
//!
//! Every feature query takes a closed time window `[t0, t1]` in ns. Sample
//! `i` sits at `i * sampling` and takes part when that time falls inside the
//! window. Windows are clamped to the waveform. A window that selects no
//! sample at all (outside the waveform, reversed or with a non-finite bound)
//! gives an empty result: `0.0` for [`integral`](AnalogSignal::integral),
//! [`peak`](AnalogSignal::peak) and [`tot`](AnalogSignal::tot), and `None`
//! for [`toa`](AnalogSignal::toa) and [`top`](AnalogSignal::top).

use std::fmt;
use std::ops::{Index, IndexMut, RangeInclusive};

use thiserror::Error;

/// Slack when converting window bounds to sample indices, in samples
const INDEX_TOLERANCE: f64 = 1e-9;

#[derive(Debug, Error, PartialEq)]
pub enum SignalError {
    #[error("Sampling period must be finite and positive, got {0}")]
    InvalidSampling(f64),
}

/// A waveform sampled at a fixed period
#[derive(Debug, Clone, PartialEq)]
pub struct AnalogSignal {
    waveform: Vec<f32>,
    /// Sampling period in ns
    sampling: f64,
}

impl AnalogSignal {
    /// Wrap precomputed samples taken every `sampling` ns
    pub fn new(waveform: Vec<f32>, sampling: f64) -> Result<Self, SignalError> {
        if !sampling.is_finite() || sampling <= 0.0 {
            return Err(SignalError::InvalidSampling(sampling));
        }
        Ok(Self { waveform, sampling })
    }

    /// A flat signal of `points` samples
    pub fn zeros(points: usize, sampling: f64) -> Result<Self, SignalError> {
        Self::new(vec![0.0; points], sampling)
    }

    /// Number of samples
    pub fn len(&self) -> usize {
        self.waveform.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waveform.is_empty()
    }

    /// Sampling period in ns
    pub fn sampling(&self) -> f64 {
        self.sampling
    }

    /// Number of samples divided by the sampling period
    ///
    /// Kept for compatibility with existing consumers. Note that this is not
    /// the time span of the waveform; use [`AnalogSignal::duration`] for that.
    pub fn length(&self) -> f64 {
        self.waveform.len() as f64 / self.sampling
    }

    /// Time spanned by the waveform in ns
    pub fn duration(&self) -> f64 {
        self.waveform.len() as f64 * self.sampling
    }

    pub fn waveform(&self) -> &[f32] {
        &self.waveform
    }

    /// Mutable access to the raw samples for waveform producers
    pub fn waveform_mut(&mut self) -> &mut [f32] {
        &mut self.waveform
    }

    pub fn into_waveform(self) -> Vec<f32> {
        self.waveform
    }

    /// Sample indices covered by `[t0, t1]`, or `None` if there are none
    fn window(&self, t0: f64, t1: f64) -> Option<RangeInclusive<usize>> {
        if !t0.is_finite() || !t1.is_finite() || t1 < t0 || self.waveform.is_empty() {
            return None;
        }

        let first = (t0 / self.sampling - INDEX_TOLERANCE).ceil().max(0.0);
        let last = (t1 / self.sampling + INDEX_TOLERANCE).floor();
        let last_index = (self.waveform.len() - 1) as f64;

        if last < 0.0 || first > last_index || first > last {
            return None;
        }

        Some(first as usize..=last.min(last_index) as usize)
    }

    /// Samples in the window, tagged with their index
    fn samples(&self, t0: f64, t1: f64) -> impl Iterator<Item = (usize, f64)> + '_ {
        let range = self.window(t0, t1).unwrap_or(1..=0);
        let start = *range.start();
        self.waveform
            .get(range)
            .unwrap_or(&[])
            .iter()
            .enumerate()
            .map(move |(offset, &value)| (start + offset, value as f64))
    }

    fn time_of(&self, index: usize) -> f64 {
        index as f64 * self.sampling
    }

    /// Integral of the baseline-subtracted signal over `[t0, t1]`
    ///
    /// Sum of `sample - baseline` times the sampling period, in units of
    /// amplitude·ns.
    pub fn integral(&self, t0: f64, t1: f64, baseline: f64) -> f64 {
        self.samples(t0, t1)
            .map(|(_, value)| value - baseline)
            .sum::<f64>()
            * self.sampling
    }

    /// Highest baseline-subtracted sample in `[t0, t1]`
    pub fn peak(&self, t0: f64, t1: f64, baseline: f64) -> f64 {
        self.samples(t0, t1)
            .map(|(_, value)| value - baseline)
            .reduce(f64::max)
            .unwrap_or(0.0)
    }

    /// Time spent above `threshold` in `[t0, t1]`, in ns
    pub fn tot(&self, t0: f64, t1: f64, threshold: f64) -> f64 {
        let above = self
            .samples(t0, t1)
            .filter(|&(_, value)| value > threshold)
            .count();
        above as f64 * self.sampling
    }

    /// Time of the first sample above `threshold` in `[t0, t1]`
    ///
    /// Times are measured from the start of the waveform. `None` when no
    /// sample in the window exceeds the threshold.
    pub fn toa(&self, t0: f64, t1: f64, threshold: f64) -> Option<f64> {
        self.samples(t0, t1)
            .find(|&(_, value)| value > threshold)
            .map(|(index, _)| self.time_of(index))
    }

    /// Time of the highest sample in `[t0, t1]`
    ///
    /// Ties resolve to the earliest sample. `None` when the maximum is below
    /// `threshold`.
    pub fn top(&self, t0: f64, t1: f64, threshold: f64) -> Option<f64> {
        let (index, value) = self.samples(t0, t1).fold(None, |best, (index, value)| {
            match best {
                Some((_, best_value)) if best_value >= value => best,
                _ => Some((index, value)),
            }
        })?;

        if value < threshold {
            return None;
        }
        Some(self.time_of(index))
    }
}

impl Index<usize> for AnalogSignal {
    type Output = f32;

    fn index(&self, index: usize) -> &f32 {
        &self.waveform[index]
    }
}

impl IndexMut<usize> for AnalogSignal {
    fn index_mut(&mut self, index: usize) -> &mut f32 {
        &mut self.waveform[index]
    }
}

impl fmt::Display for AnalogSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "===> SiPM Analog Signal <===")?;
        writeln!(f, "Address: {:p}", self)?;
        writeln!(f, "Signal length is: {:.2} ns", self.duration())?;
        writeln!(f, "Signal is sampled every: {:.2} ns", self.sampling)?;
        writeln!(f, "Signal contains: {} points", self.waveform.len())
    }
}
