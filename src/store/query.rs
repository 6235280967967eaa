use std::cmp::Ordering;

use chrono::{DateTime, Duration, NaiveDate, NaiveTime, Utc};

use crate::error::AppError;
use crate::models::{to_chrono, ListOrdersParams, Order, OrderStatus};

const DEFAULT_LIMIT: u64 = 10;
const MAX_LIMIT: u64 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortField {
    CreatedAt,
    Total,
    Subtotal,
    Status,
    CustomerEmail,
    CustomerName,
}

impl SortField {
    /// Document path of the field.
    pub fn path(self) -> &'static str {
        match self {
            SortField::CreatedAt => "createdAt",
            SortField::Total => "total",
            SortField::Subtotal => "subtotal",
            SortField::Status => "status",
            SortField::CustomerEmail => "customerInfo.email",
            SortField::CustomerName => "customerInfo.fullName",
        }
    }

    fn parse(raw: &str) -> Option<Self> {
        match raw {
            "createdAt" => Some(SortField::CreatedAt),
            "total" => Some(SortField::Total),
            "subtotal" => Some(SortField::Subtotal),
            "status" => Some(SortField::Status),
            "customerInfo.email" | "customerEmail" => Some(SortField::CustomerEmail),
            "customerInfo.fullName" | "customerName" => Some(SortField::CustomerName),
            _ => None,
        }
    }

    fn compare(self, a: &Order, b: &Order) -> Ordering {
        match self {
            SortField::CreatedAt => a.created_at.cmp(&b.created_at),
            SortField::Total => a.total.total_cmp(&b.total),
            SortField::Subtotal => a.subtotal.total_cmp(&b.subtotal),
            SortField::Status => a.status.as_str().cmp(b.status.as_str()),
            SortField::CustomerEmail => a.customer_info.email.cmp(&b.customer_info.email),
            SortField::CustomerName => a.customer_info.full_name.cmp(&b.customer_info.full_name),
        }
    }
}

/// Validated order listing request.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderQuery {
    pub status: Option<OrderStatus>,
    pub customer_email: Option<String>,
    pub created_from: Option<DateTime<Utc>>,
    pub created_to: Option<DateTime<Utc>>,
    pub sort_by: SortField,
    pub descending: bool,
    /// 1-based.
    pub page: u64,
    pub limit: u64,
}

impl Default for OrderQuery {
    fn default() -> Self {
        OrderQuery {
            status: None,
            customer_email: None,
            created_from: None,
            created_to: None,
            sort_by: SortField::CreatedAt,
            descending: true,
            page: 1,
            limit: DEFAULT_LIMIT,
        }
    }
}

impl OrderQuery {
    pub fn from_params(params: &ListOrdersParams) -> Result<Self, AppError> {
        let status = non_empty(&params.status)
            .map(|s| s.parse::<OrderStatus>().map_err(AppError::Validation))
            .transpose()?;
        let sort_by = match non_empty(&params.sort_by) {
            Some(raw) => SortField::parse(raw)
                .ok_or_else(|| AppError::Validation(format!("cannot sort orders by {raw}")))?,
            None => SortField::CreatedAt,
        };
        let descending = match non_empty(&params.sort_order) {
            Some("asc") => false,
            Some("desc") | None => true,
            Some(other) => return Err(AppError::Validation(format!("unknown sort order: {other}"))),
        };
        let created_from = non_empty(&params.start_date)
            .map(|raw| parse_date(raw, false))
            .transpose()?;
        let created_to = non_empty(&params.end_date)
            .map(|raw| parse_date(raw, true))
            .transpose()?;

        let page = params.page.unwrap_or(1).max(1) as u64;
        let limit = params
            .limit
            .map(|l| l.clamp(1, MAX_LIMIT as i64) as u64)
            .unwrap_or(DEFAULT_LIMIT);
        // Skips are sent to the database as signed 64-bit integers.
        if (page - 1).checked_mul(limit).map_or(true, |skip| skip > i64::MAX as u64) {
            return Err(AppError::Validation(format!("page {page} is out of range")));
        }

        Ok(OrderQuery {
            status,
            customer_email: non_empty(&params.customer_email).map(str::to_string),
            created_from,
            created_to,
            sort_by,
            descending,
            page,
            limit,
        })
    }

    pub fn skip(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }

    pub fn total_pages(&self, total: u64) -> u64 {
        total.div_ceil(self.limit)
    }

    /// Cancelled orders are hidden unless asked for by status.
    pub fn matches(&self, order: &Order) -> bool {
        let status_ok = match self.status {
            Some(status) => order.status == status,
            None => order.status != OrderStatus::Cancelled,
        };
        let email_ok = self
            .customer_email
            .as_ref()
            .map_or(true, |email| &order.customer_info.email == email);
        let created = to_chrono(order.created_at);
        let from_ok = self.created_from.map_or(true, |from| created >= from);
        let to_ok = self.created_to.map_or(true, |to| created <= to);
        status_ok && email_ok && from_ok && to_ok
    }

    pub fn compare(&self, a: &Order, b: &Order) -> Ordering {
        let ordering = self.sort_by.compare(a, b);
        if self.descending {
            ordering.reverse()
        } else {
            ordering
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// RFC 3339, or a bare date meaning the start (or end) of that day in UTC.
fn parse_date(raw: &str, end_of_day: bool) -> Result<DateTime<Utc>, AppError> {
    if let Ok(at) = DateTime::parse_from_rfc3339(raw) {
        return Ok(at.with_timezone(&Utc));
    }
    let day = NaiveDate::parse_from_str(raw, "%Y-%m-%d")
        .map_err(|_| AppError::Validation(format!("invalid date: {raw}")))?;
    let start = day.and_time(NaiveTime::MIN).and_utc();
    Ok(if end_of_day {
        start + Duration::days(1) - Duration::milliseconds(1)
    } else {
        start
    })
}
