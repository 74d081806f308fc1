use sea_orm::{DbConn, DbErr, EntityTrait, PaginatorTrait, Select};
use serde::Serialize;
use thiserror::Error;

pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;
pub const MAX_LIMIT: u64 = 100;

/// Largest row offset the database accepts.
const MAX_OFFSET: u64 = i64::MAX.unsigned_abs();

/// A 1-based page of `limit` items.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PageRequest {
    page: u64,
    limit: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PageRequestError {
    #[error("page must be a positive integer, got {0:?}")]
    InvalidPage(String),
    #[error("limit must be an integer between 1 and {MAX_LIMIT}, got {0:?}")]
    InvalidLimit(String),
}

impl PageRequest {
    /// # Errors
    /// Will return [`Err`] when either number is out of range,
    /// including a page whose first row lies past what the database can address.
    pub fn new(page: u64, limit: u64) -> Result<Self, PageRequestError> {
        if limit == 0 || limit > MAX_LIMIT {
            return Err(PageRequestError::InvalidLimit(limit.to_string()));
        }
        let offset = page.checked_sub(1).and_then(|skipped| skipped.checked_mul(limit));
        if offset.is_none_or(|offset| offset > MAX_OFFSET) {
            return Err(PageRequestError::InvalidPage(page.to_string()));
        }
        Ok(Self { page, limit })
    }

    /// Parses raw query parameters, falling back to the defaults for absent ones.
    ///
    /// # Errors
    /// Will return [`Err`] when a parameter is not a number or is out of range.
    pub fn parse(page: Option<&str>, limit: Option<&str>) -> Result<Self, PageRequestError> {
        let page = match page.map(str::trim) {
            None | Some("") => DEFAULT_PAGE,
            Some(raw) => raw
                .parse()
                .map_err(|_| PageRequestError::InvalidPage(raw.to_owned()))?,
        };
        let limit = match limit.map(str::trim) {
            None | Some("") => DEFAULT_LIMIT,
            Some(raw) => raw
                .parse()
                .map_err(|_| PageRequestError::InvalidLimit(raw.to_owned()))?,
        };
        Self::new(page, limit)
    }

    #[must_use]
    pub const fn page(self) -> u64 {
        self.page
    }

    #[must_use]
    pub const fn limit(self) -> u64 {
        self.limit
    }
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub docs: Vec<T>,
    pub total_docs: u64,
    pub page: u64,
    pub limit: u64,
    pub total_pages: u64,
}

impl<T> Page<T> {
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<Page<U>, E> {
        Ok(Page {
            docs: self.docs.into_iter().map(f).collect::<Result<_, _>>()?,
            total_docs: self.total_docs,
            page: self.page,
            limit: self.limit,
            total_pages: self.total_pages,
        })
    }
}

/// Runs `select` through the database paginator.
///
/// # Errors
/// Will return [`Err`] when either the count or the page query fails.
pub async fn fetch_page<E>(
    select: Select<E>,
    db: &DbConn,
    request: PageRequest,
) -> Result<Page<E::Model>, DbErr>
where
    E: EntityTrait,
    E::Model: Sync,
{
    let paginator = select.paginate(db, request.limit);
    let totals = paginator.num_items_and_pages().await?;
    let docs = paginator.fetch_page(request.page - 1).await?;
    Ok(Page {
        docs,
        total_docs: totals.number_of_items,
        page: request.page,
        limit: request.limit,
        total_pages: totals.number_of_pages,
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_defaults() {
        assert_eq!(PageRequest::parse(None, None).unwrap(), PageRequest::default());
        assert_eq!(
            PageRequest::parse(Some(""), Some(" ")).unwrap(),
            PageRequest::new(1, 10).unwrap()
        );
    }

    #[test]
    fn test_parse_values() {
        let request = PageRequest::parse(Some("3"), Some("25")).unwrap();
        assert_eq!(request.page(), 3);
        assert_eq!(request.limit(), 25);
    }

    #[test]
    fn test_parse_rejects_garbage() {
        assert_eq!(
            PageRequest::parse(Some("two"), None).unwrap_err(),
            PageRequestError::InvalidPage("two".to_owned())
        );
        assert_eq!(
            PageRequest::parse(None, Some("-1")).unwrap_err(),
            PageRequestError::InvalidLimit("-1".to_owned())
        );
    }

    #[test]
    fn test_parse_rejects_out_of_range() {
        assert_eq!(
            PageRequest::parse(Some("0"), None).unwrap_err(),
            PageRequestError::InvalidPage("0".to_owned())
        );
        assert!(matches!(
            PageRequest::parse(None, Some("0")),
            Err(PageRequestError::InvalidLimit(_))
        ));
        assert!(matches!(
            PageRequest::parse(None, Some("101")),
            Err(PageRequestError::InvalidLimit(_))
        ));
        assert!(PageRequest::parse(None, Some("100")).is_ok());
    }

    #[test]
    fn test_parse_rejects_unreachable_page() {
        assert_eq!(
            PageRequest::parse(Some("18446744073709551615"), Some("10")).unwrap_err(),
            PageRequestError::InvalidPage("18446744073709551615".to_owned())
        );

        let last_page = MAX_OFFSET / 10 + 1;
        assert!(PageRequest::new(last_page, 10).is_ok());
        assert_eq!(
            PageRequest::new(last_page + 1, 10).unwrap_err(),
            PageRequestError::InvalidPage((last_page + 1).to_string())
        );
    }

    #[test]
    fn test_try_map() {
        let page = Page {
            docs: vec![1, 2, 3],
            total_docs: 13,
            page: 2,
            limit: 3,
            total_pages: 5,
        };
        let mapped: Page<String> = page
            .try_map(|n| Ok::<_, std::convert::Infallible>(n.to_string()))
            .unwrap();
        assert_eq!(mapped.docs, ["1", "2", "3"]);
        assert_eq!(mapped.total_docs, 13);
        assert_eq!(mapped.total_pages, 5);
    }
}
