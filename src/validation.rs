use thiserror::Error;
use uuid::Uuid;

use crate::pagination::PageRequestError;

/// A request that was rejected before touching the database.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} is required")]
    MissingField { field: &'static str },
    #[error("Invalid {kind}")]
    InvalidId { kind: &'static str, value: String },
    #[error("{0}")]
    Page(#[from] PageRequestError),
    #[error("Cannot sort by {0:?}")]
    UnknownSortField(String),
    #[error("Sort type must be \"asc\" or \"desc\", got {0:?}")]
    UnknownSortDirection(String),
}

/// Returns the trimmed value, or [`ValidationError::MissingField`] when it is
/// absent or blank.
///
/// # Errors
/// Will return [`Err`] when `value` is [`None`] or only whitespace.
pub fn require_text(field: &'static str, value: Option<&str>) -> Result<String, ValidationError> {
    match value.map(str::trim) {
        Some(text) if !text.is_empty() => Ok(text.to_owned()),
        _ => Err(ValidationError::MissingField { field }),
    }
}

/// Like [`require_text`], but an absent or blank value is not an error.
#[must_use]
pub fn optional_text(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|text| !text.is_empty())
        .map(str::to_owned)
}

/// # Errors
/// Will return [`Err`] when `raw` is not a UUID.
pub fn parse_id(kind: &'static str, raw: &str) -> Result<Uuid, ValidationError> {
    Uuid::parse_str(raw.trim()).map_err(|_| ValidationError::InvalidId {
        kind,
        value: raw.to_owned(),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_require_text_trims() {
        assert_eq!(require_text("title", Some("  hello ")).unwrap(), "hello");
    }

    #[test]
    fn test_require_text_rejects_missing_and_blank() {
        for value in [None, Some(""), Some("   \n")] {
            assert_eq!(
                require_text("title", value).unwrap_err(),
                ValidationError::MissingField { field: "title" }
            );
        }
    }

    #[test]
    fn test_optional_text() {
        assert_eq!(optional_text(Some(" a ")), Some("a".to_owned()));
        assert_eq!(optional_text(Some(" ")), None);
        assert_eq!(optional_text(None), None);
    }

    #[test]
    fn test_parse_id() {
        let id = Uuid::new_v4();
        assert_eq!(parse_id("videoId", &id.to_string()).unwrap(), id);

        let err = parse_id("videoId", "65a1f0c2e4b0a1b2c3d4e5f6").unwrap_err();
        assert_eq!(err.to_string(), "Invalid videoId");
        assert!(matches!(
            err,
            ValidationError::InvalidId { kind: "videoId", value } if value == "65a1f0c2e4b0a1b2c3d4e5f6"
        ));
    }
}
