//! SiPM device configuration

pub mod properties;
pub mod settings;

pub use properties::{is_known_property, DeviceProperties, HitDistribution, PropertyError};
pub use settings::{parse_line, Assignment, SettingsError};
