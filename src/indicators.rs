//! Sort indicator management: maps the three-state sort directive onto
//! glyphs on the region headers, keeping exactly one column non-neutral.

use crate::filters::{SortDirective, SortOrder};
use crate::table::{SmartTable, SortHeader};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortState {
    #[default]
    Neutral,
    Ascending,
    Descending,
}

#[derive(Debug, Clone)]
pub struct IndicatorConfig {
    pub ascending: String,
    pub descending: String,
    pub neutral: String,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        Self {
            ascending: "▲".to_string(),
            descending: "▼".to_string(),
            neutral: "⇅".to_string(),
        }
    }
}

/// Clears every header to neutral, then applies the directive's state to the
/// matching column.
pub fn update_sort_indicators(
    headers: &mut [SortHeader],
    sort: Option<&SortDirective>,
    config: &IndicatorConfig,
) {
    for header in headers.iter_mut() {
        header.state = SortState::Neutral;
        header.glyph = config.neutral.clone();
    }
    let Some(directive) = sort else {
        return;
    };
    if let Some(header) = headers.iter_mut().find(|h| h.field == directive.field) {
        match directive.order {
            SortOrder::Ascending => {
                header.state = SortState::Ascending;
                header.glyph = config.ascending.clone();
            }
            SortOrder::Descending => {
                header.state = SortState::Descending;
                header.glyph = config.descending.clone();
            }
        }
    }
}

/// Installs an indicator configuration on a table. The table reapplies it on
/// every sort change and after every fragment replacement, which is what the
/// rebind-after-replace contract requires.
pub fn enhance_table_sorting(table: &mut SmartTable, config: IndicatorConfig) {
    table.set_indicator_config(config);
}
