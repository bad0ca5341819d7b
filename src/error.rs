use std::error::Error;
use std::fmt;

/// Crate-wide error type. The leading variants are the user-facing taxonomy;
/// the trailing ones carry infrastructure failures unchanged. Every
/// user-facing message includes a remediation hint where one exists.
#[derive(Debug)]
pub enum PrimertoolError {
    /// Malformed accession, chromosome, exon index or variant description.
    InvalidInput(String),
    /// Reference sequence store failure (missing assembly, bad interval).
    GenomeStore(String),
    /// A remote collaborator (normalization service, annotation store,
    /// uniqueness oracle) was unreachable or returned a non-actionable error.
    RemoteService(String),
    /// The external primer design tool failed or produced unreadable output.
    DesignTool(String),
    /// Intronic variant whose offset is too large to adjust automatically.
    IntronicPositionTooFar(String),
    /// Exon exceeds the maximum insert size.
    ExonTooLarge(String),
    /// Widening exhausted without a uniquely binding primer pair.
    NoPrimerFound(String),
    Io(std::io::Error),
    Http(reqwest::Error),
    Json(serde_json::Error),
}

impl Error for PrimertoolError {}

impl fmt::Display for PrimertoolError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::InvalidInput(msg)
            | Self::GenomeStore(msg)
            | Self::RemoteService(msg)
            | Self::DesignTool(msg)
            | Self::IntronicPositionTooFar(msg)
            | Self::ExonTooLarge(msg)
            | Self::NoPrimerFound(msg) => write!(f, "{msg}"),
            Self::Io(err) => write!(f, "{err}"),
            Self::Http(err) => write!(f, "{err}"),
            Self::Json(err) => write!(f, "{err}"),
        }
    }
}

impl From<std::io::Error> for PrimertoolError {
    fn from(err: std::io::Error) -> Self {
        PrimertoolError::Io(err)
    }
}

impl From<reqwest::Error> for PrimertoolError {
    fn from(err: reqwest::Error) -> Self {
        PrimertoolError::Http(err)
    }
}

impl From<serde_json::Error> for PrimertoolError {
    fn from(err: serde_json::Error) -> Self {
        PrimertoolError::Json(err)
    }
}
