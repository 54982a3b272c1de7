//! Filtering and ordering for slip listings
use super::slip::{Slip, SlipState};
use chrono::NaiveDate;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    Id,
    Requester,
    Department,
    Created,
    State,
    /// Earliest expected return date over a loan's items, undated last.
    ExpectedReturn,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SortKey {
    pub field: SortField,
    pub descending: bool,
}

/// Listing criteria. Every criterion left empty matches everything.
#[derive(Debug, Clone, Default)]
pub struct SlipFilter {
    pub search: Option<String>,
    pub state: Option<SlipState>,
    pub department: Option<String>,
    pub created_from: Option<NaiveDate>,
    pub created_to: Option<NaiveDate>,
    pub sort: SortKey,
}

impl Default for SortKey {
    // newest first
    fn default() -> Self {
        Self {
            field: SortField::Id,
            descending: true,
        }
    }
}

impl SortKey {
    /// Parses `field` or `-field`. Unknown fields give `None` so callers can
    /// keep their current order.
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.trim();
        let (descending, name) = match s.strip_prefix('-') {
            Some(rest) => (true, rest),
            None => (false, s),
        };
        let field = match name {
            "id" => SortField::Id,
            "requester" => SortField::Requester,
            "department" => SortField::Department,
            "created" => SortField::Created,
            "state" => SortField::State,
            "expected_return" => SortField::ExpectedReturn,
            _ => return None,
        };
        Some(Self { field, descending })
    }

    fn compare(&self, a: &Slip, b: &Slip) -> Ordering {
        let ord = match self.field {
            SortField::Id => a.id().cmp(&b.id()),
            SortField::Requester => a.requester().name.cmp(&b.requester().name),
            SortField::Department => a.requester().department.cmp(&b.requester().department),
            SortField::Created => a.created_at().cmp(&b.created_at()),
            SortField::State => a.state().as_str().cmp(b.state().as_str()),
            SortField::ExpectedReturn => match (earliest_return(a), earliest_return(b)) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => Ordering::Less,
                (None, Some(_)) => Ordering::Greater,
                (None, None) => Ordering::Equal,
            },
        }
        .then_with(|| a.id().cmp(&b.id()));

        if self.descending { ord.reverse() } else { ord }
    }
}

impl SlipFilter {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn search(mut self, query: &str) -> Self {
        self.search = Some(query.to_string());
        self
    }
    pub fn state(mut self, state: SlipState) -> Self {
        self.state = Some(state);
        self
    }
    pub fn department(mut self, department: &str) -> Self {
        self.department = Some(department.to_string());
        self
    }
    pub fn created_between(mut self, from: Option<NaiveDate>, to: Option<NaiveDate>) -> Self {
        self.created_from = from;
        self.created_to = to;
        self
    }
    pub fn sort(mut self, sort: SortKey) -> Self {
        self.sort = sort;
        self
    }

    pub fn matches(&self, slip: &Slip) -> bool {
        if let Some(query) = non_blank(&self.search) {
            let query = query.to_lowercase();
            let requester = slip.requester();
            let hit = slip.id().to_string().contains(&query)
                || requester.name.to_lowercase().contains(&query)
                || requester.employee_code.to_lowercase().contains(&query);
            if !hit {
                return false;
            }
        }
        if self.state.is_some_and(|s| s != slip.state()) {
            return false;
        }
        if let Some(dept) = non_blank(&self.department) {
            if !slip
                .requester()
                .department
                .to_lowercase()
                .contains(&dept.to_lowercase())
            {
                return false;
            }
        }
        let created = slip.created_at().date();
        if self.created_from.is_some_and(|from| created < from) {
            return false;
        }
        if self.created_to.is_some_and(|to| created > to) {
            return false;
        }
        true
    }

    pub fn apply(&self, slips: Vec<Slip>) -> Vec<Slip> {
        let mut hits: Vec<Slip> = slips.into_iter().filter(|s| self.matches(s)).collect();
        hits.sort_by(|a, b| self.sort.compare(a, b));
        hits
    }
}

fn earliest_return(slip: &Slip) -> Option<NaiveDate> {
    slip.items()
        .iter()
        .filter_map(|item| item.loan.as_ref()?.expected_return)
        .map(|day| day.to_naive())
        .min()
}

fn non_blank(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}
