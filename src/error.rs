//! Crate-wide error type.
//!
//! Codec-internal variants exist so `codec` can log the precise cause with
//! `log::warn!`, but they collapse to `Failed` once they cross the public
//! API — callers only ever see the kinds listed in the public surface.

#[derive(Debug, thiserror::Error)]
pub enum FsIndexError {
    #[error("operation failed: {0}")]
    Failed(String),

    #[error("resource busy")]
    Busy,

    #[error("unknown search view: {0}")]
    UnknownSearchView(u32),

    #[error("entry not found")]
    EntryNotFound,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("snapshot magic mismatch")]
    MagicMismatch,

    #[error("snapshot version mismatch: file is major {file_major}, crate supports {crate_major}")]
    VersionMismatch { file_major: u16, crate_major: u16 },

    #[error("snapshot truncated")]
    Truncated,

    #[error("unknown sort id: {0}")]
    UnknownSortId(u32),
}

impl FsIndexError {
    /// Collapses codec-internal variants to `Failed`, logging the original
    /// cause first. Public-facing kinds (`Busy`, `UnknownSearchView`,
    /// `EntryNotFound`) pass through unchanged.
    pub fn into_public(self) -> Self {
        match &self {
            FsIndexError::MagicMismatch
            | FsIndexError::VersionMismatch { .. }
            | FsIndexError::Truncated
            | FsIndexError::UnknownSortId(_) => {
                log::warn!("codec error collapsed to Failed: {self}");
                FsIndexError::Failed(self.to_string())
            }
            _ => self,
        }
    }
}

pub type Result<T> = std::result::Result<T, FsIndexError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codec_errors_collapse_to_failed() {
        let err = FsIndexError::MagicMismatch.into_public();
        assert!(matches!(err, FsIndexError::Failed(_)));

        let err = FsIndexError::VersionMismatch {
            file_major: 9,
            crate_major: 1,
        }
        .into_public();
        assert!(matches!(err, FsIndexError::Failed(_)));
    }

    #[test]
    fn public_errors_pass_through() {
        assert!(matches!(FsIndexError::Busy.into_public(), FsIndexError::Busy));
        assert!(matches!(
            FsIndexError::EntryNotFound.into_public(),
            FsIndexError::EntryNotFound
        ));
        assert!(matches!(
            FsIndexError::UnknownSearchView(3).into_public(),
            FsIndexError::UnknownSearchView(3)
        ));
    }
}
