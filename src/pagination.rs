use serde::Deserialize;

/// `?skip=&limit=` query parameters shared by every list endpoint.
#[derive(Debug, Default, Clone, Copy, Deserialize)]
pub struct Pagination {
    pub skip: Option<i64>,
    pub limit: Option<i64>,
}

/// Resolved OFFSET/LIMIT pair, safe to bind straight into SQL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    pub offset: i64,
    pub limit: i64,
}

impl Pagination {
    /// Negative skips become 0 and the limit is clamped to `1..=max_limit`.
    pub fn page(&self, default_limit: i64, max_limit: i64) -> Page {
        Page {
            offset: self.skip.unwrap_or(0).max(0),
            limit: self.limit.unwrap_or(default_limit).clamp(1, max_limit),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_apply_when_absent() {
        let page = Pagination::default().page(10, 50);
        assert_eq!(page, Page { offset: 0, limit: 10 });
    }

    #[test]
    fn hostile_values_are_clamped() {
        let page = Pagination {
            skip: Some(-20),
            limit: Some(1_000_000),
        }
        .page(10, 50);
        assert_eq!(page, Page { offset: 0, limit: 50 });

        let page = Pagination {
            skip: Some(5),
            limit: Some(0),
        }
        .page(10, 50);
        assert_eq!(page, Page { offset: 5, limit: 1 });
    }
}
