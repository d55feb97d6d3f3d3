// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

/*! Error handling. */

use {std::path::PathBuf, thiserror::Error};

/// Primary crate error type.
#[derive(Debug, Error)]
pub enum HwpackError {
    #[error("ConfigError: {key}: {reason} (value: {value:?})")]
    Config {
        key: String,
        value: String,
        reason: String,
    },

    #[error("ConfigFileMissing: no such config file: {}", .0.display())]
    ConfigFileMissing(PathBuf),

    #[error("DependencyNotSatisfied: unable to satisfy dependencies of {}", .0.join(", "))]
    DependencyNotSatisfied(Vec<String>),

    #[error("FetchError: failed to fetch {item}: {message}")]
    Fetch { item: String, message: String },

    #[error("SubcommandFailed: {argv:?} failed\nstdout:\n{stdout}\nstderr:\n{stderr}")]
    SubcommandFailed {
        argv: Vec<String>,
        stdout: String,
        stderr: String,
    },

    #[error("ArchiveError: {0}")]
    Archive(String),

    #[error("unsupported hwpack format: {0}")]
    UnsupportedFormat(String),

    #[error(
        "conflicting values for field {field}: {first:?} from {} and {second:?} from {}",
        .first_source.display(),
        .second_source.display()
    )]
    ConflictingField {
        field: String,
        first: String,
        first_source: PathBuf,
        second: String,
        second_source: PathBuf,
    },

    #[error("unknown relationship field for generated package: {0}")]
    UnknownRelationship(String),

    #[error("control file parse error: {0}")]
    ControlParse(String),

    #[error("required field missing in control file: {0}")]
    ControlRequiredFieldMissing(String),

    #[error("control file not found in binary package")]
    ControlFileNotFound,

    #[error("failed to parse dependency expression: {0}")]
    DependencyParse(String),

    #[error("the epoch component has non-digit characters: {0}")]
    EpochNonNumeric(String),

    #[error("upstream_version component has illegal character: {0}")]
    UpstreamVersionIllegalChar(String),

    #[error("debian_revision component has illegal character: {0}")]
    DebianRevisionIllegalChar(String),

    #[error("unknown entry in binary package archive: {0}")]
    DebUnknownBinaryPackageEntry(String),

    #[error("unknown compression in deb archive file: {0}")]
    DebUnknownCompression(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("integer parsing error: {0}")]
    ParseInt(#[from] std::num::ParseIntError),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),

    #[cfg(feature = "http")]
    #[error("HTTP error: {0}")]
    Reqwest(#[from] reqwest::Error),
}

impl HwpackError {
    /// Construct a [HwpackError::Config] from its parts.
    pub fn config(key: impl ToString, value: impl ToString, reason: impl ToString) -> Self {
        Self::Config {
            key: key.to_string(),
            value: value.to_string(),
            reason: reason.to_string(),
        }
    }
}

impl<W> From<std::io::IntoInnerError<W>> for HwpackError {
    fn from(e: std::io::IntoInnerError<W>) -> Self {
        Self::Io(e.into())
    }
}

/// Result wrapper for this crate.
pub type Result<T> = std::result::Result<T, HwpackError>;
