//! Sampled SiPM output signals

pub mod analog;

pub use analog::{AnalogSignal, SignalError};
