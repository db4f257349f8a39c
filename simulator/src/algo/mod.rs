//! Numerical helpers shared by the photometry and signal code

pub mod misc;

pub use misc::{interp, InterpError};
