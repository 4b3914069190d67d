//! Report listing queries
//!
//! Turns raw query-string values into a validated [`ReportQuery`]: optional
//! category / doctor filters, a case-insensitive title search, a sort order and
//! 1-indexed page/limit pagination. Both stores evaluate the same query model.

use crate::{MediTrackError, ReportCategory, ReportDetails, Result};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use utoipa::ToSchema;
use uuid::Uuid;

pub const DEFAULT_PAGE: u32 = 1;
pub const DEFAULT_LIMIT: u32 = 10;
pub const MAX_LIMIT: u32 = 100;

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// Report fields that may be sorted on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    ReportDate,
    Title,
    Category,
}

impl SortField {
    fn parse(name: &str) -> Option<Self> {
        match name {
            "createdAt" | "created_at" => Some(SortField::CreatedAt),
            "reportDate" | "report_date" => Some(SortField::ReportDate),
            "title" => Some(SortField::Title),
            "category" => Some(SortField::Category),
            _ => None,
        }
    }

    /// Column name in the `reports` table
    pub fn column(&self) -> &'static str {
        match self {
            SortField::CreatedAt => "created_at",
            SortField::ReportDate => "report_date",
            SortField::Title => "title",
            SortField::Category => "category",
        }
    }
}

/// Sort order for report listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortOrder {
    pub field: SortField,
    pub direction: SortDirection,
}

impl Default for SortOrder {
    /// Newest first
    fn default() -> Self {
        Self {
            field: SortField::CreatedAt,
            direction: SortDirection::Desc,
        }
    }
}

impl SortOrder {
    /// Parse a `sort` parameter.
    ///
    /// `date` and `-date` sort by report date ascending / descending; any other
    /// value names a field, with a leading `-` for descending order.
    pub fn parse(raw: &str) -> Result<Self> {
        let raw = raw.trim();
        match raw {
            "" => return Ok(Self::default()),
            "date" => {
                return Ok(Self {
                    field: SortField::ReportDate,
                    direction: SortDirection::Asc,
                })
            }
            "-date" => {
                return Ok(Self {
                    field: SortField::ReportDate,
                    direction: SortDirection::Desc,
                })
            }
            _ => {}
        }

        let (name, direction) = match raw.strip_prefix('-') {
            Some(name) => (name, SortDirection::Desc),
            None => (raw, SortDirection::Asc),
        };

        let field = SortField::parse(name).ok_or_else(|| {
            MediTrackError::Validation(format!(
                "Cannot sort by '{name}': expected one of title, category, reportDate, createdAt"
            ))
        })?;

        Ok(Self { field, direction })
    }

    /// Compare two reports under this order. Ties fall back to the report id
    /// so listings are stable across pages.
    pub fn compare(&self, a: &ReportDetails, b: &ReportDetails) -> Ordering {
        let (a, b) = (&a.report, &b.report);
        let ordering = match self.field {
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::ReportDate => a.report_date.cmp(&b.report_date),
            SortField::Title => a.title.cmp(&b.title),
            SortField::Category => a.category.as_str().cmp(b.category.as_str()),
        };
        let ordering = match self.direction {
            SortDirection::Asc => ordering,
            SortDirection::Desc => ordering.reverse(),
        };
        ordering.then_with(|| a.id.cmp(&b.id))
    }
}

/// 1-indexed page request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageRequest {
    pub page: u32,
    pub limit: u32,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl PageRequest {
    pub fn new(page: Option<u32>, limit: Option<u32>) -> Result<Self> {
        let page = page.unwrap_or(DEFAULT_PAGE);
        let limit = limit.unwrap_or(DEFAULT_LIMIT);

        if page == 0 {
            return Err(MediTrackError::Validation(
                "page must be 1 or greater".to_string(),
            ));
        }
        if limit == 0 || limit > MAX_LIMIT {
            return Err(MediTrackError::Validation(format!(
                "limit must be between 1 and {MAX_LIMIT}"
            )));
        }

        Ok(Self { page, limit })
    }

    /// Number of rows to skip
    pub fn offset(&self) -> u64 {
        u64::from(self.page - 1) * u64::from(self.limit)
    }
}

/// Pagination block returned with every report listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct Pagination {
    pub total: u64,
    pub page: u32,
    pub pages: u64,
    pub limit: u32,
}

impl Pagination {
    pub fn new(total: u64, request: PageRequest) -> Self {
        Self {
            total,
            page: request.page,
            pages: total.div_ceil(u64::from(request.limit)),
            limit: request.limit,
        }
    }
}

/// Filters applied on top of the ownership scope
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportFilter {
    pub category: Option<ReportCategory>,
    pub doctor_id: Option<Uuid>,
    /// Case-insensitive substring of the title
    pub search: Option<String>,
}

impl ReportFilter {
    pub fn matches(&self, details: &ReportDetails) -> bool {
        let report = &details.report;
        if let Some(category) = self.category {
            if report.category != category {
                return false;
            }
        }
        if let Some(doctor_id) = self.doctor_id {
            if report.doctor_id != Some(doctor_id) {
                return false;
            }
        }
        if let Some(search) = &self.search {
            if !report.title.to_lowercase().contains(&search.to_lowercase()) {
                return false;
            }
        }
        true
    }
}

/// A complete report listing request
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReportQuery {
    pub filter: ReportFilter,
    pub sort: SortOrder,
    pub page: PageRequest,
}

impl ReportQuery {
    /// Build a query from raw query-string values. Empty strings count as absent.
    pub fn from_params(
        category: Option<&str>,
        doctor: Option<&str>,
        search: Option<&str>,
        sort: Option<&str>,
        page: Option<&str>,
        limit: Option<&str>,
    ) -> Result<Self> {
        fn present(v: Option<&str>) -> Option<&str> {
            v.map(str::trim).filter(|v| !v.is_empty())
        }

        let category = present(category).map(str::parse).transpose()?;
        let doctor_id = present(doctor)
            .map(|raw| {
                Uuid::parse_str(raw)
                    .map_err(|_| MediTrackError::Validation(format!("Invalid doctor id '{raw}'")))
            })
            .transpose()?;
        let search = present(search).map(str::to_string);
        let sort = present(sort).map(SortOrder::parse).transpose()?.unwrap_or_default();
        let page = PageRequest::new(
            present(page).map(|p| parse_number("page", p)).transpose()?,
            present(limit).map(|l| parse_number("limit", l)).transpose()?,
        )?;

        Ok(Self {
            filter: ReportFilter {
                category,
                doctor_id,
                search,
            },
            sort,
            page,
        })
    }
}

fn parse_number(name: &str, raw: &str) -> Result<u32> {
    raw.parse()
        .map_err(|_| MediTrackError::Validation(format!("{name} must be a positive integer")))
}

/// One page of reports
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct ReportPage {
    pub data: Vec<ReportDetails>,
    pub pagination: Pagination,
}
