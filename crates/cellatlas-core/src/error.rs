//! Error types for cellatlas-core.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using the library's Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for cellatlas-core
#[derive(Error, Debug)]
pub enum Error {
    /// Zero or multiple candidate source containers in the target directory
    #[error("input ambiguity: {0}")]
    InputAmbiguity(#[from] InputAmbiguityError),

    /// Malformed container, missing field, or unresolvable reference
    #[error("data format: {0}")]
    DataFormat(#[from] DataFormatError),

    /// Failure encoding, writing, or reading a registry artifact
    #[error("serialization: {0}")]
    Serialization(#[from] SerializationError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Name the compilation phase in which this error surfaced, for the
    /// user-visible abort message.
    #[must_use]
    pub fn phase(&self) -> &'static str {
        match self {
            Self::InputAmbiguity(_) => "source discovery",
            Self::DataFormat(_) => "container read",
            Self::Serialization(_) => "artifact serialization",
            Self::Io(_) => "filesystem access",
        }
    }
}

/// Source-container discovery errors. Compilation requires exactly one
/// candidate container in the target directory.
#[derive(Error, Debug)]
pub enum InputAmbiguityError {
    /// No file matched the source glob
    #[error("no registration container matching '{pattern}' in {}", .dir.display())]
    NoSourceFile { dir: PathBuf, pattern: String },

    /// More than one file matched the source glob
    #[error("{count} registration containers matching '{pattern}' in {}; expected exactly one", .dir.display())]
    MultipleSourceFiles {
        dir: PathBuf,
        pattern: String,
        count: usize,
    },

    /// The target directory produced an unusable glob pattern
    #[error("invalid source pattern: {0}")]
    Pattern(#[from] glob::PatternError),
}

/// Container format errors: the file exists but cannot be read as a
/// registration container.
#[derive(Error, Debug)]
pub enum DataFormatError {
    /// Container is not a readable ZIP archive
    #[error("container is not a readable archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// Container has no manifest entry
    #[error("container has no 'registry.json' manifest")]
    MissingManifest,

    /// Manifest is not valid JSON
    #[error("container manifest is not valid JSON: {0}")]
    Manifest(#[from] serde_json::Error),

    /// A required struct field is absent
    #[error("missing required field '{0}' in registration struct")]
    MissingField(String),

    /// A reference handle does not resolve to a dataset
    #[error("reference '{0}' does not resolve to a dataset")]
    BrokenReference(String),

    /// Dataset payload is shorter or longer than its declared shape
    #[error("dataset '{path}' truncated: expected {expected} bytes, found {found}")]
    Truncated {
        path: String,
        expected: usize,
        found: usize,
    },

    /// Dataset has the wrong number of axes for its field
    #[error("dataset '{path}' has {got} axes; expected {want}")]
    WrongRank {
        path: String,
        want: usize,
        got: usize,
    },
}

/// Registry artifact errors, covering both the write and the re-load side.
#[derive(Error, Debug)]
pub enum SerializationError {
    /// MessagePack encoding failed
    #[error("failed to encode {artifact}: {source}")]
    Encode {
        artifact: &'static str,
        source: rmp_serde::encode::Error,
    },

    /// MessagePack decoding failed
    #[error("failed to decode {artifact}: {source}")]
    Decode {
        artifact: &'static str,
        source: rmp_serde::decode::Error,
    },

    /// Staging write failed
    #[error("failed to write {}: {source}", .path.display())]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Final rename into place failed
    #[error("failed to publish {}: {source}", .path.display())]
    Rename {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A loaded blob's shape disagrees with its data length
    #[error("{artifact} blob shape {shape:?} does not match {len} data elements")]
    ShapeMismatch {
        artifact: &'static str,
        shape: Vec<usize>,
        len: usize,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phase_names_are_stable() {
        let err = Error::from(InputAmbiguityError::NoSourceFile {
            dir: PathBuf::from("/tmp/x"),
            pattern: "cellreg*.regz".to_string(),
        });
        assert_eq!(err.phase(), "source discovery");

        let err = Error::from(DataFormatError::MissingField("refs".to_string()));
        assert_eq!(err.phase(), "container read");
    }

    #[test]
    fn ambiguity_messages_name_the_directory() {
        let err = InputAmbiguityError::MultipleSourceFiles {
            dir: PathBuf::from("/data/mouse1"),
            pattern: "cellreg*.regz".to_string(),
            count: 3,
        };
        let msg = err.to_string();
        assert!(msg.contains("/data/mouse1"), "message: {msg}");
        assert!(msg.contains("3 registration containers"), "message: {msg}");
    }
}
