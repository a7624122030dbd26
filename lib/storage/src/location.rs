use merlin_core::{Error, Result};
use std::fmt;
use std::path::{Path, PathBuf};

const FILE_SCHEME: &str = "file://";
const LOCAL_FILE_SCHEME: &str = "local-file://";

/// Where an artifact version lives. Only local directories are supported;
/// `file://` and `local-file://` both name one.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ArtifactLocation {
    LocalFile(PathBuf),
}

impl ArtifactLocation {
    /// Parse a location URI. Anything but the local-file scheme is rejected
    /// before any I/O happens.
    pub fn parse(uri: &str) -> Result<Self> {
        let uri = uri.trim();
        let path = uri
            .strip_prefix(LOCAL_FILE_SCHEME)
            .or_else(|| uri.strip_prefix(FILE_SCHEME))
            .ok_or_else(|| Error::UnsupportedLocationScheme(uri.to_string()))?;
        if path.is_empty() {
            return Err(Error::UnsupportedLocationScheme(uri.to_string()));
        }
        Ok(ArtifactLocation::LocalFile(PathBuf::from(path)))
    }

    #[must_use]
    pub fn local(path: impl Into<PathBuf>) -> Self {
        ArtifactLocation::LocalFile(path.into())
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ArtifactLocation::LocalFile(p) => p,
        }
    }

    /// URI form stored in the registry, with a trailing slash for directories
    #[must_use]
    pub fn to_uri(&self) -> String {
        match self {
            ArtifactLocation::LocalFile(p) => {
                let s = p.to_string_lossy();
                if s.ends_with('/') {
                    format!("{}{}", FILE_SCHEME, s)
                } else {
                    format!("{}{}/", FILE_SCHEME, s)
                }
            }
        }
    }
}

impl fmt::Display for ArtifactLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_uri())
    }
}
