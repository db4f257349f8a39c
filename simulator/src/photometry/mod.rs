//! Photon detection efficiency models

pub mod pde;

pub use pde::{Pde, PdeError, PdeSpectrum, PdeType, PDE_SPECTRUM_POINTS};
