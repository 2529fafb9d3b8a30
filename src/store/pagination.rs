use std::fmt;

use serde::{Deserialize, Serialize};

pub const MAX_PAGE_LIMIT: u32 = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[serde(alias = "ASC")]
    Asc,
    #[serde(alias = "DESC")]
    Desc,
}

impl SortOrder {
    pub fn as_sql(self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Feed paging parameters. Only bounds are checked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaginatedQuery {
    pub limit: u32,
    pub offset: u32,
    pub sort: SortOrder,
}

impl Default for PaginatedQuery {
    fn default() -> Self {
        Self {
            limit: MAX_PAGE_LIMIT,
            offset: 0,
            sort: SortOrder::Desc,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaginationError(pub String);

impl fmt::Display for PaginationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::error::Error for PaginationError {}

/// Raw `limit`, `offset` and `sort` query parameters; absent ones take
/// the defaults of [`PaginatedQuery`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct PageParams {
    pub limit: Option<u32>,
    pub offset: Option<u32>,
    pub sort: Option<SortOrder>,
}

impl TryFrom<PageParams> for PaginatedQuery {
    type Error = PaginationError;

    fn try_from(params: PageParams) -> Result<Self, Self::Error> {
        let defaults = Self::default();
        let limit = params.limit.unwrap_or(defaults.limit);
        if !(1..=MAX_PAGE_LIMIT).contains(&limit) {
            return Err(PaginationError(format!(
                "limit must be between 1 and {}",
                MAX_PAGE_LIMIT
            )));
        }

        Ok(Self {
            limit,
            offset: params.offset.unwrap_or(defaults.offset),
            sort: params.sort.unwrap_or(defaults.sort),
        })
    }
}
