use thiserror::Error;
use uuid::Uuid;

/// Failure to apply a unified-diff payload to a piece of content.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PatchError {
    #[error("Malformed hunk header: {0:?}")]
    MalformedHeader(String),
    #[error("Unexpected patch line {line_no}: {line:?}")]
    MalformedLine { line_no: usize, line: String },
    #[error("Hunk truncated at patch line {line_no}")]
    Truncated { line_no: usize },
    #[error("Hunk at line {position} is out of range for content of {len} lines")]
    OutOfRange { position: usize, len: usize },
    #[error("Content mismatch at line {line}: expected {expected:?}, found {found:?}")]
    Mismatch {
        line: usize,
        expected: String,
        found: String,
    },
}

/// Errors raised by a [`VersionArchive`](crate::archive::VersionArchive) backend.
#[derive(Error, Debug, Clone)]
pub enum ArchiveError {
    #[error("Archive backend error: {0}")]
    Backend(String),
    #[error("Archive codec error: {0}")]
    Codec(String),
}

/// Errors from the version store.
///
/// Everything except `VersionNotFound` means the persisted history can no
/// longer be trusted for the document in question.
#[derive(Error, Debug)]
pub enum VersionError {
    #[error("Version {requested} not found (current version is {current})")]
    VersionNotFound { requested: u32, current: u32 },
    #[error("Corrupt delta for version {version}: {reason}")]
    CorruptDelta { version: u32, reason: String },
    #[error("Archived delta for version {version} of document {document_id} is missing")]
    MissingArchivedVersion { document_id: Uuid, version: u32 },
    #[error("Broken version chain in document {document_id}: expected version {expected}, found {found}")]
    BrokenChain {
        document_id: Uuid,
        expected: u32,
        found: u32,
    },
    #[error("Archive error: {0}")]
    Archive(#[from] ArchiveError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version_error_display() {
        let err = VersionError::VersionNotFound { requested: 9, current: 4 };
        let text = err.to_string();
        assert!(text.contains('9'));
        assert!(text.contains('4'));

        let err = VersionError::from(ArchiveError::Backend("disk full".into()));
        assert!(err.to_string().contains("disk full"));
    }
}
