use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{trace, warn};
use url::form_urlencoded::byte_serialize;

pub const PAGE: &str = "page";
pub const PER_PAGE: &str = "per_page";
pub const SEARCH: &str = "search";
pub const SORT: &str = "sort";
/// Internal bookkeeping key, persisted but never sent to the server.
pub const SCROLL_POSITION: &str = "scrollPosition";

/// A single filter value. Untagged so the persisted JSON looks like the
/// blobs the server-rendered pages have always used: numbers, strings,
/// booleans and plain arrays.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Flag(bool),
    Int(i64),
    Text(String),
    List(Vec<String>),
}

impl FilterValue {
    pub fn as_int(&self) -> Option<i64> {
        match self {
            FilterValue::Int(n) => Some(*n),
            FilterValue::Text(s) => s.trim().parse().ok(),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FilterValue::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Coerces a value to an ordered sequence. Legacy persisted state stored
    /// multi-select values as a comma-joined string, so strings are split.
    pub fn as_list(&self) -> Vec<String> {
        match self {
            FilterValue::List(items) => items.clone(),
            FilterValue::Text(s) if !s.is_empty() => {
                s.split(',').map(|p| p.to_string()).collect()
            }
            _ => Vec::new(),
        }
    }

    /// The value as it goes into the query string; `None` means "omit".
    fn query_value(&self) -> Option<String> {
        match self {
            FilterValue::Flag(b) => Some(b.to_string()),
            FilterValue::Int(n) => Some(n.to_string()),
            FilterValue::Text(s) if s.is_empty() => None,
            FilterValue::Text(s) => Some(s.clone()),
            // Sequences are always emitted, even empty, so the server can
            // distinguish "nothing selected" from "filter not present".
            FilterValue::List(items) => Some(
                items
                    .iter()
                    .map(|i| encode(i))
                    .collect::<Vec<_>>()
                    .join(","),
            ),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// A parsed sort directive: a bare field sorts ascending, a `-` prefix
/// descending. Exactly one field is active at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortDirective {
    pub field: String,
    pub order: SortOrder,
}

impl SortDirective {
    pub fn parse(raw: &str) -> Option<Self> {
        if raw.is_empty() {
            return None;
        }
        match raw.strip_prefix('-') {
            Some(field) if !field.is_empty() => Some(Self {
                field: field.to_string(),
                order: SortOrder::Descending,
            }),
            Some(_) => None,
            None => Some(Self {
                field: raw.to_string(),
                order: SortOrder::Ascending,
            }),
        }
    }

    pub fn encode(&self) -> String {
        match self.order {
            SortOrder::Ascending => self.field.clone(),
            SortOrder::Descending => format!("-{}", self.field),
        }
    }
}

/// The in-memory, persisted record of all active query/sort/pagination
/// parameters for one table view. A `BTreeMap` keeps the query string
/// deterministic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filters {
    values: BTreeMap<String, FilterValue>,
}

impl Filters {
    pub fn new(per_page: i64) -> Self {
        let mut values = BTreeMap::new();
        values.insert(PAGE.to_string(), FilterValue::Int(1));
        values.insert(PER_PAGE.to_string(), FilterValue::Int(per_page));
        values.insert(SCROLL_POSITION.to_string(), FilterValue::Int(0));
        Self { values }
    }

    pub fn get(&self, name: &str) -> Option<&FilterValue> {
        self.values.get(name)
    }

    pub fn page(&self) -> i64 {
        self.get(PAGE).and_then(FilterValue::as_int).unwrap_or(1).max(1)
    }

    /// Changes the page without resetting anything else.
    pub fn set_page(&mut self, page: i64) {
        self.values
            .insert(PAGE.to_string(), FilterValue::Int(page.max(1)));
    }

    pub fn scroll(&self) -> i64 {
        self.get(SCROLL_POSITION)
            .and_then(FilterValue::as_int)
            .unwrap_or(0)
            .max(0)
    }

    pub fn set_scroll(&mut self, offset: i64) {
        self.values
            .insert(SCROLL_POSITION.to_string(), FilterValue::Int(offset.max(0)));
    }

    /// Mutates a filter. Any change other than page/scroll snaps the view
    /// back to the first page and the left edge.
    pub fn set(&mut self, name: &str, value: FilterValue) {
        match name {
            PAGE => {
                let page = value.as_int().unwrap_or(1);
                self.set_page(page);
            }
            SCROLL_POSITION => {
                let offset = value.as_int().unwrap_or(0);
                self.set_scroll(offset);
            }
            _ => {
                trace!(name, ?value, "filter updated");
                self.values.insert(name.to_string(), value);
                self.set_page(1);
                self.set_scroll(0);
            }
        }
    }

    /// Writes a value without touching page/scroll. Used when merging
    /// restored state, where no user action happened.
    pub fn insert_quiet(&mut self, name: &str, value: FilterValue) {
        self.values.insert(name.to_string(), value);
    }

    pub fn remove(&mut self, name: &str) {
        self.values.remove(name);
    }

    /// Merges stored state over the current values, quietly.
    pub fn merge(&mut self, other: Filters) {
        for (name, value) in other.values {
            self.values.insert(name, value);
        }
    }

    pub fn sort_raw(&self) -> Option<&str> {
        self.get(SORT).and_then(FilterValue::as_text).filter(|s| !s.is_empty())
    }

    pub fn sort(&self) -> Option<SortDirective> {
        self.sort_raw().and_then(SortDirective::parse)
    }

    /// Applies one click on a sortable column: ascending, then descending,
    /// then unsorted; a different column always starts ascending and clears
    /// the previous directive. Resets the page either way.
    pub fn cycle_sort(&mut self, field: &str) -> Option<SortDirective> {
        let current = self.sort_raw().map(|s| s.to_string());
        let next = if current.as_deref() == Some(field) {
            Some(format!("-{field}"))
        } else if current.as_deref() == Some(&format!("-{field}")) {
            None
        } else {
            Some(field.to_string())
        };
        match &next {
            Some(raw) => {
                self.values
                    .insert(SORT.to_string(), FilterValue::Text(raw.clone()));
            }
            None => self.remove(SORT),
        }
        self.set_page(1);
        next.as_deref().and_then(SortDirective::parse)
    }

    /// Serializes the map to a query string. Bookkeeping keys are excluded,
    /// empty scalars omitted, sequences comma-joined.
    pub fn build_query(&self) -> String {
        let mut pairs = Vec::new();
        for (key, value) in &self.values {
            if key == SCROLL_POSITION {
                continue;
            }
            if let Some(v) = value.query_value() {
                let encoded = match value {
                    // list items were encoded individually to keep the commas
                    FilterValue::List(_) => v,
                    _ => encode(&v),
                };
                pairs.push(format!("{}={}", encode(key), encoded));
            }
        }
        pairs.join("&")
    }

    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            warn!(error = %e, "cannot serialize filters");
            "{}".to_string()
        })
    }

    /// `None` on malformed input; callers fall back to defaults.
    pub fn from_json(raw: &str) -> Option<Self> {
        serde_json::from_str(raw).ok()
    }
}

fn encode(component: &str) -> String {
    byte_serialize(component.as_bytes()).collect()
}
