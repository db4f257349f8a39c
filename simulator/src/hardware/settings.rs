//! Loading [`DeviceProperties`] from `name=value` settings files
//!
//! The format is one assignment per line:
//!
//! ```text
//! # 6x6 mm device with 25 um cells
//! size = 6
//! pitch = 25
//! // noise
//! dcr = 300e3
//! ```
//!
//! Whitespace anywhere on a line is ignored, lines starting with `#` or `/`
//! are comments and property names are case-insensitive. Unknown names are
//! reported and skipped; a value that is not a number fails the whole load.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use thiserror::Error;

use super::properties::{DeviceProperties, PropertyError};
use crate::diagnostics::{Diagnostic, DiagnosticSink, LogSink};

/// Errors that abort loading a settings source
#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Line {line}: cannot parse a numeric value from '{content}'")]
    Parse { line: usize, content: String },

    #[error("Line {line}: {source}")]
    InvalidParameter {
        line: usize,
        #[source]
        source: PropertyError,
    },

    #[error("Settings describe an invalid device: {0}")]
    InvalidDevice(#[source] PropertyError),

    #[error("Failed to read settings: {0}")]
    Io(#[from] std::io::Error),
}

/// One meaningful settings line
#[derive(Debug, Clone, PartialEq)]
pub struct Assignment {
    pub name: String,
    pub value: f64,
}

/// Parse a single settings line
///
/// Returns `Ok(None)` for blank and comment lines. A line without `=` or
/// with a value that does not parse as `f64` is an error; the returned
/// string is the line with whitespace removed.
pub fn parse_line(line: &str) -> Result<Option<Assignment>, String> {
    let compact: String = line.chars().filter(|c| !c.is_whitespace()).collect();

    if compact.is_empty() || compact.starts_with('#') || compact.starts_with('/') {
        return Ok(None);
    }

    let (name, value) = compact.split_once('=').ok_or_else(|| compact.clone())?;
    let value = value.parse::<f64>().map_err(|_| compact.clone())?;

    Ok(Some(Assignment {
        name: name.to_string(),
        value,
    }))
}

impl DeviceProperties {
    /// Load properties from a settings file, reporting through `log`
    ///
    /// See [`DeviceProperties::read_settings_with`].
    pub fn read_settings(path: impl AsRef<Path>) -> Result<Self, SettingsError> {
        Self::read_settings_with(path, &mut LogSink)
    }

    /// Load properties from a settings file
    ///
    /// Every assignment is applied on top of the defaults, in file order.
    /// A file that cannot be opened is reported to `sink` as
    /// [`Diagnostic::SettingsUnreadable`] and yields default properties.
    ///
    /// # Errors
    ///
    /// - [`SettingsError::Parse`] for a line whose value is not a number
    /// - [`SettingsError::InvalidParameter`] for a value a setter rejects
    /// - [`SettingsError::InvalidDevice`] when the final combination is
    ///   invalid, such as a size and pitch giving no cells
    /// - [`SettingsError::Io`] when reading fails after the file was opened
    pub fn read_settings_with(
        path: impl AsRef<Path>,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<Self, SettingsError> {
        let path = path.as_ref();
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                sink.report(Diagnostic::SettingsUnreadable {
                    path: path.to_path_buf(),
                    reason: e.to_string(),
                });
                return Ok(Self::default());
            }
        };

        log::debug!("Reading SiPM settings from {}", path.display());
        Self::from_settings_reader(BufReader::new(file), sink)
    }

    /// Load properties from any buffered settings source
    pub fn from_settings_reader<R: BufRead>(
        reader: R,
        sink: &mut dyn DiagnosticSink,
    ) -> Result<Self, SettingsError> {
        let mut properties = Self::default();

        for (index, line) in reader.lines().enumerate() {
            let line = line?;
            let line_number = index + 1;

            let assignment = parse_line(&line).map_err(|content| SettingsError::Parse {
                line: line_number,
                content,
            })?;

            if let Some(Assignment { name, value }) = assignment {
                properties
                    .set_property_with(&name, value, sink)
                    .map_err(|source| SettingsError::InvalidParameter {
                        line: line_number,
                        source,
                    })?;
            }
        }

        properties.validate().map_err(SettingsError::InvalidDevice)?;
        Ok(properties)
    }
}
