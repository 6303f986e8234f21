use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, trace, warn};

use crate::controls::{Checkbox, MultiSelectControl, SliderControl};
use crate::filters::{FilterValue, Filters};
use crate::storage::{Storage, read_json_object, write_json_object};

/// User interaction routed to a widget by the owning table. Widgets ignore
/// variants that do not apply to them.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetInput {
    /// Continuous handle movement; updates the visible labels only.
    SliderDrag(f64, f64),
    /// Handle released; this is the committing event.
    SliderRelease(f64, f64),
    /// Toggle the checkbox carrying this value.
    Toggle(String),
    /// Replace the multi-select selection.
    Select(Vec<String>),
    Reset,
    ToggleDropdown,
    OutsideClick,
}

/// What the table should do after routing an input to a widget.
#[derive(Debug, Clone, PartialEq)]
pub enum Reaction {
    /// Nothing happened.
    None,
    /// Display-only change, no filter mutation and no refetch.
    Preview,
    /// Write these entries into the filter map, reset the page, persist and
    /// refetch, in that order.
    Commit(Vec<(String, FilterValue)>),
}

/// Read-only view of a widget for rendering.
#[derive(Debug, Clone, PartialEq)]
pub enum WidgetView<'a> {
    Slider {
        low_label: &'a str,
        high_label: &'a str,
        low: f64,
        high: f64,
        min: f64,
        max: f64,
        step: f64,
    },
    Checkboxes(Vec<(&'a str, bool)>),
    MultiSelect {
        options: &'a [String],
        selected: &'a [String],
        missing: bool,
    },
    Dropdown {
        open: bool,
        entries: Vec<(&'a str, bool)>,
    },
}

/// One filter control bound to one (or a pair of) filter-map entries.
///
/// Widgets never persist or refetch the table's filters themselves; they
/// report a `Reaction` and the owning table applies it, so all persistence
/// for a filter set flows through one authority. Widgets with an
/// `ExternalScope` additionally mirror their committed value into that
/// separate storage key, for consumers outside the table's lifecycle.
pub trait FilterWidget {
    /// The filter-map keys this widget drives.
    fn filter_names(&self) -> Vec<String>;

    /// Restores the displayed control from the authoritative filter map.
    fn init(&mut self, filters: &Filters);

    /// Current committed value.
    fn value(&self) -> FilterValue;

    /// Resynchronizes the displayed value from the filter map; used by the
    /// table's rehydration pass after state is loaded from storage.
    fn set_value(&mut self, filters: &Filters);

    fn handle(&mut self, input: WidgetInput) -> Reaction;

    /// Called once per event-loop tick; widgets with deferred restoration
    /// return entries to write back into the filter map, quietly.
    fn tick(&mut self, filters: &Filters) -> Option<Vec<(String, FilterValue)>> {
        let _ = filters;
        None
    }

    fn view(&self) -> WidgetView<'_>;

    fn destroy(&mut self) {}
}

/// A widget's private persistence slot in shared storage, distinct from the
/// owning table's state key.
#[derive(Clone)]
pub struct ExternalScope {
    storage: Rc<dyn Storage>,
    pub storage_key: String,
}

impl ExternalScope {
    pub fn new(storage: Rc<dyn Storage>, storage_key: impl Into<String>) -> Self {
        Self {
            storage,
            storage_key: storage_key.into(),
        }
    }

    fn persist(&self, name: &str, values: &[String]) {
        let mut saved = read_json_object(self.storage.as_ref(), &self.storage_key);
        saved.insert(
            name.to_string(),
            Value::Array(values.iter().map(|v| Value::String(v.clone())).collect()),
        );
        write_json_object(self.storage.as_ref(), &self.storage_key, &saved);
    }

    /// Returns the stored sequence, or `None` when nothing usable is stored.
    /// Non-array values are not trusted.
    fn restore(&self, name: &str) -> Option<Vec<String>> {
        let saved = read_json_object(self.storage.as_ref(), &self.storage_key);
        match saved.get(name) {
            Some(Value::Array(items)) => Some(
                items
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect(),
            ),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------- RangeSlider

/// Two-handle numeric range over `[min_name, max_name]`. Dragging updates
/// the visible labels only; the filter map and the refetch happen on
/// release, so the server is not flooded while the user drags.
pub struct RangeSlider {
    min_name: String,
    max_name: String,
    control: SliderControl,
    low_label: String,
    high_label: String,
    committed: (i64, i64),
}

impl RangeSlider {
    /// The persisted table state is authoritative: construction restores the
    /// handle positions from `filters`, not from the control's defaults.
    pub fn new(
        min_name: impl Into<String>,
        max_name: impl Into<String>,
        control: SliderControl,
        filters: &Filters,
    ) -> Self {
        let mut slider = Self {
            min_name: min_name.into(),
            max_name: max_name.into(),
            control,
            low_label: String::new(),
            high_label: String::new(),
            committed: (0, 0),
        };
        slider.init(filters);
        slider
    }

    fn refresh_labels(&mut self) {
        let (low, high) = self.control.rounded();
        self.low_label = low.to_string();
        self.high_label = high.to_string();
    }
}

impl FilterWidget for RangeSlider {
    fn filter_names(&self) -> Vec<String> {
        vec![self.min_name.clone(), self.max_name.clone()]
    }

    fn init(&mut self, filters: &Filters) {
        let low = filters
            .get(&self.min_name)
            .and_then(FilterValue::as_int)
            .map(|n| n as f64)
            .unwrap_or(self.control.min);
        let high = filters
            .get(&self.max_name)
            .and_then(FilterValue::as_int)
            .map(|n| n as f64)
            .unwrap_or(self.control.max);
        self.control.set(low, high);
        self.committed = self.control.rounded();
        self.refresh_labels();
    }

    fn value(&self) -> FilterValue {
        FilterValue::List(vec![
            self.committed.0.to_string(),
            self.committed.1.to_string(),
        ])
    }

    fn set_value(&mut self, filters: &Filters) {
        self.init(filters);
    }

    fn handle(&mut self, input: WidgetInput) -> Reaction {
        match input {
            WidgetInput::SliderDrag(low, high) => {
                self.control.set(low, high);
                self.refresh_labels();
                Reaction::Preview
            }
            WidgetInput::SliderRelease(low, high) => {
                self.control.set(low, high);
                self.refresh_labels();
                self.committed = self.control.rounded();
                debug!(
                    min = self.committed.0,
                    max = self.committed.1,
                    "range slider changed"
                );
                Reaction::Commit(vec![
                    (self.min_name.clone(), FilterValue::Int(self.committed.0)),
                    (self.max_name.clone(), FilterValue::Int(self.committed.1)),
                ])
            }
            _ => Reaction::None,
        }
    }

    fn view(&self) -> WidgetView<'_> {
        WidgetView::Slider {
            low_label: &self.low_label,
            high_label: &self.high_label,
            low: self.control.low,
            high: self.control.high,
            min: self.control.min,
            max: self.control.max,
            step: self.control.step,
        }
    }
}

// -------------------------------------------------------------- CountryFilter

/// Checkbox group sharing one filter name. The committed value is the
/// checked values in control order, not in toggle order.
pub struct CountryFilter {
    name: String,
    boxes: Vec<Checkbox>,
    defaults: Vec<bool>,
}

impl CountryFilter {
    pub fn new(name: impl Into<String>, boxes: Vec<Checkbox>, filters: &Filters) -> Self {
        let defaults = boxes.iter().map(|cb| cb.checked).collect();
        let mut filter = Self {
            name: name.into(),
            boxes,
            defaults,
        };
        filter.init(filters);
        filter
    }

    fn checked(&self) -> Vec<String> {
        self.boxes
            .iter()
            .filter(|cb| cb.checked)
            .map(|cb| cb.value.clone())
            .collect()
    }
}

impl FilterWidget for CountryFilter {
    fn filter_names(&self) -> Vec<String> {
        vec![self.name.clone()]
    }

    fn init(&mut self, filters: &Filters) {
        match filters.get(&self.name) {
            Some(FilterValue::List(saved)) => {
                let saved = saved.clone();
                for cb in &mut self.boxes {
                    cb.checked = saved.contains(&cb.value);
                }
            }
            // no entry means nothing overrides the construction defaults,
            // which is what a filter reset produces
            None => {
                for (cb, default) in self.boxes.iter_mut().zip(&self.defaults) {
                    cb.checked = *default;
                }
            }
            // non-sequence values are ignored, the displayed state stays
            Some(_) => {}
        }
    }

    fn value(&self) -> FilterValue {
        FilterValue::List(self.checked())
    }

    fn set_value(&mut self, filters: &Filters) {
        self.init(filters);
    }

    fn handle(&mut self, input: WidgetInput) -> Reaction {
        match input {
            WidgetInput::Toggle(value) => {
                let Some(cb) = self.boxes.iter_mut().find(|cb| cb.value == value) else {
                    return Reaction::None;
                };
                cb.checked = !cb.checked;
                Reaction::Commit(vec![(self.name.clone(), FilterValue::List(self.checked()))])
            }
            _ => Reaction::None,
        }
    }

    fn view(&self) -> WidgetView<'_> {
        WidgetView::Checkboxes(
            self.boxes
                .iter()
                .map(|cb| (cb.label.as_str(), cb.checked))
                .collect(),
        )
    }
}

// ---------------------------------------------------------- MultiSelectFilter

/// Searchable multi-select. The underlying control initializes
/// asynchronously relative to construction, so value restoration is
/// deferred by one event-loop tick; restoring reads the table's filters
/// first, then the external scope, then falls back to empty.
pub struct MultiSelectFilter {
    name: String,
    control: Option<MultiSelectControl>,
    external: Option<ExternalScope>,
    pending_restore: bool,
}

impl MultiSelectFilter {
    /// A missing control logs a warning and produces an inert widget; every
    /// operation on it is a no-op.
    pub fn new(
        selector: &str,
        name: impl Into<String>,
        control: Option<MultiSelectControl>,
        external: Option<ExternalScope>,
    ) -> Self {
        if control.is_none() {
            warn!(selector, "MultiSelectFilter: no control found, widget disabled");
        }
        Self {
            name: name.into(),
            control,
            external,
            pending_restore: false,
        }
    }

    fn restored_values(&self, filters: &Filters) -> Vec<String> {
        let mut values = filters
            .get(&self.name)
            .map(FilterValue::as_list)
            .unwrap_or_default();
        if let Some(external) = &self.external
            && let Some(stored) = external.restore(&self.name)
        {
            values = stored;
        }
        values
    }
}

impl FilterWidget for MultiSelectFilter {
    fn filter_names(&self) -> Vec<String> {
        vec![self.name.clone()]
    }

    fn init(&mut self, _filters: &Filters) {
        if self.control.is_some() {
            self.pending_restore = true;
        }
    }

    fn value(&self) -> FilterValue {
        FilterValue::List(
            self.control
                .as_ref()
                .map(|c| c.selected.clone())
                .unwrap_or_default(),
        )
    }

    fn set_value(&mut self, filters: &Filters) {
        let values = filters
            .get(&self.name)
            .map(FilterValue::as_list)
            .unwrap_or_default();
        if let Some(control) = &mut self.control {
            control.selected = values;
        }
    }

    fn handle(&mut self, input: WidgetInput) -> Reaction {
        let Some(control) = &mut self.control else {
            return Reaction::None;
        };
        match input {
            WidgetInput::Select(values) => {
                control.selected = values.clone();
                if let Some(external) = &self.external {
                    external.persist(&self.name, &values);
                }
                Reaction::Commit(vec![(self.name.clone(), FilterValue::List(values))])
            }
            _ => Reaction::None,
        }
    }

    fn tick(&mut self, filters: &Filters) -> Option<Vec<(String, FilterValue)>> {
        if !self.pending_restore {
            return None;
        }
        self.pending_restore = false;
        let values = self.restored_values(filters);
        trace!(name = self.name, ?values, "deferred multi-select restore");
        if let Some(control) = &mut self.control {
            control.selected = values.clone();
        }
        Some(vec![(self.name.clone(), FilterValue::List(values))])
    }

    fn view(&self) -> WidgetView<'_> {
        match &self.control {
            Some(control) => WidgetView::MultiSelect {
                options: &control.options,
                selected: &control.selected,
                missing: false,
            },
            None => WidgetView::MultiSelect {
                options: &[],
                selected: &[],
                missing: true,
            },
        }
    }
}

// -------------------------------------------------------- MultiCheckboxFilter

/// Independently toggleable checkboxes inside a dropdown container. The
/// reset affordance clears checks and filter value together; a click
/// outside the container closes the dropdown.
pub struct MultiCheckboxFilter {
    name: String,
    boxes: Vec<Checkbox>,
    external: Option<ExternalScope>,
    dropdown_open: bool,
}

impl MultiCheckboxFilter {
    pub fn new(
        name: impl Into<String>,
        boxes: Vec<Checkbox>,
        external: Option<ExternalScope>,
        filters: &Filters,
    ) -> Self {
        let mut filter = Self {
            name: name.into(),
            boxes,
            external,
            dropdown_open: false,
        };
        filter.init(filters);
        filter
    }

    fn checked(&self) -> Vec<String> {
        self.boxes
            .iter()
            .filter(|cb| cb.checked)
            .map(|cb| cb.value.clone())
            .collect()
    }

    fn commit(&self, values: Vec<String>) -> Reaction {
        if let Some(external) = &self.external {
            external.persist(&self.name, &values);
        }
        Reaction::Commit(vec![(self.name.clone(), FilterValue::List(values))])
    }
}

impl FilterWidget for MultiCheckboxFilter {
    fn filter_names(&self) -> Vec<String> {
        vec![self.name.clone()]
    }

    fn init(&mut self, filters: &Filters) {
        let saved = filters
            .get(&self.name)
            .map(FilterValue::as_list)
            .unwrap_or_default();
        if !saved.is_empty() {
            for cb in &mut self.boxes {
                cb.checked = saved.contains(&cb.value);
            }
        }
    }

    fn value(&self) -> FilterValue {
        FilterValue::List(self.checked())
    }

    fn set_value(&mut self, filters: &Filters) {
        let values = filters
            .get(&self.name)
            .map(FilterValue::as_list)
            .unwrap_or_default();
        for cb in &mut self.boxes {
            cb.checked = values.contains(&cb.value);
        }
    }

    fn handle(&mut self, input: WidgetInput) -> Reaction {
        match input {
            WidgetInput::Toggle(value) => {
                let Some(cb) = self.boxes.iter_mut().find(|cb| cb.value == value) else {
                    return Reaction::None;
                };
                cb.checked = !cb.checked;
                self.commit(self.checked())
            }
            WidgetInput::Reset => {
                for cb in &mut self.boxes {
                    cb.checked = false;
                }
                self.commit(Vec::new())
            }
            WidgetInput::ToggleDropdown => {
                self.dropdown_open = !self.dropdown_open;
                Reaction::Preview
            }
            WidgetInput::OutsideClick => {
                if self.dropdown_open {
                    self.dropdown_open = false;
                    Reaction::Preview
                } else {
                    Reaction::None
                }
            }
            _ => Reaction::None,
        }
    }

    fn view(&self) -> WidgetView<'_> {
        WidgetView::Dropdown {
            open: self.dropdown_open,
            entries: self
                .boxes
                .iter()
                .map(|cb| (cb.label.as_str(), cb.checked))
                .collect(),
        }
    }

    fn destroy(&mut self) {
        self.dropdown_open = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn boxes() -> Vec<Checkbox> {
        vec![
            Checkbox::new("BE", "Belgium", false),
            Checkbox::new("NL", "Netherlands", false),
            Checkbox::new("LU", "Luxembourg", false),
        ]
    }

    #[test]
    fn slider_drag_previews_and_release_commits() {
        let filters = Filters::new(25);
        let mut slider = RangeSlider::new(
            "min_elo",
            "max_elo",
            SliderControl::new(0.0, 5000.0, 25.0),
            &filters,
        );

        let reaction = slider.handle(WidgetInput::SliderDrag(500.0, 1800.0));
        assert_eq!(reaction, Reaction::Preview);
        // labels follow the drag, the committed value does not
        assert_eq!(
            slider.value(),
            FilterValue::List(vec!["0".into(), "5000".into()])
        );

        let reaction = slider.handle(WidgetInput::SliderRelease(500.0, 1800.0));
        assert_eq!(
            reaction,
            Reaction::Commit(vec![
                ("min_elo".into(), FilterValue::Int(500)),
                ("max_elo".into(), FilterValue::Int(1800)),
            ])
        );
    }

    #[test]
    fn slider_restores_from_filters_not_defaults() {
        let mut filters = Filters::new(25);
        filters.insert_quiet("min_elo", FilterValue::Int(1000));
        filters.insert_quiet("max_elo", FilterValue::Int(2000));
        let slider = RangeSlider::new(
            "min_elo",
            "max_elo",
            SliderControl::new(0.0, 5000.0, 25.0),
            &filters,
        );
        assert_eq!(
            slider.value(),
            FilterValue::List(vec!["1000".into(), "2000".into()])
        );
    }

    #[test]
    fn country_filter_commits_in_control_order() {
        let filters = Filters::new(25);
        let mut widget = CountryFilter::new("countries", boxes(), &filters);
        // toggled out of display order
        widget.handle(WidgetInput::Toggle("LU".into()));
        let reaction = widget.handle(WidgetInput::Toggle("BE".into()));
        assert_eq!(
            reaction,
            Reaction::Commit(vec![(
                "countries".into(),
                FilterValue::List(vec!["BE".into(), "LU".into()])
            )])
        );
    }

    #[test]
    fn country_filter_restores_checked_set() {
        let mut filters = Filters::new(25);
        filters.insert_quiet("countries", FilterValue::List(vec!["NL".into()]));
        let widget = CountryFilter::new("countries", boxes(), &filters);
        assert_eq!(widget.value(), FilterValue::List(vec!["NL".into()]));
    }

    #[test]
    fn country_filter_returns_to_defaults_when_the_entry_is_gone() {
        let filters = Filters::new(25);
        let mut widget = CountryFilter::new(
            "countries",
            vec![
                Checkbox::new("BE", "Belgium", true),
                Checkbox::new("NL", "Netherlands", true),
            ],
            &filters,
        );
        widget.handle(WidgetInput::Toggle("NL".into()));
        assert_eq!(widget.value(), FilterValue::List(vec!["BE".into()]));

        // rehydrating against a map without the entry restores the defaults
        widget.set_value(&filters);
        assert_eq!(
            widget.value(),
            FilterValue::List(vec!["BE".into(), "NL".into()])
        );
    }

    #[test]
    fn multiselect_missing_control_is_inert() {
        let mut widget = MultiSelectFilter::new("#season-select", "seasons", None, None);
        let filters = Filters::new(25);
        widget.init(&filters);
        assert_eq!(widget.tick(&filters), None);
        assert_eq!(
            widget.handle(WidgetInput::Select(vec!["S30".into()])),
            Reaction::None
        );
        assert_eq!(widget.value(), FilterValue::List(vec![]));
    }

    #[test]
    fn multiselect_restore_is_deferred_one_tick() {
        let mut filters = Filters::new(25);
        filters.insert_quiet("seasons", FilterValue::Text("S29,S30".into()));
        let mut widget = MultiSelectFilter::new(
            "#season-select",
            "seasons",
            Some(MultiSelectControl::new(vec!["S29".into(), "S30".into()])),
            None,
        );
        widget.init(&filters);
        // nothing restored until the next tick
        assert_eq!(widget.value(), FilterValue::List(vec![]));
        let entries = widget.tick(&filters).expect("deferred restore");
        assert_eq!(
            entries,
            vec![(
                "seasons".into(),
                FilterValue::List(vec!["S29".into(), "S30".into()])
            )]
        );
        // one-shot
        assert_eq!(widget.tick(&filters), None);
    }

    #[test]
    fn multiselect_external_scope_wins_over_table_filters() {
        let storage: Rc<dyn Storage> = Rc::new(MemoryStorage::new());
        storage.set("seasonFilters", r#"{"seasons":["S31"]}"#);
        let mut filters = Filters::new(25);
        filters.insert_quiet("seasons", FilterValue::List(vec!["S29".into()]));

        let mut widget = MultiSelectFilter::new(
            "#season-select",
            "seasons",
            Some(MultiSelectControl::new(vec![])),
            Some(ExternalScope::new(storage, "seasonFilters")),
        );
        widget.init(&filters);
        let entries = widget.tick(&filters).expect("restore");
        assert_eq!(
            entries[0].1,
            FilterValue::List(vec!["S31".into()])
        );
    }

    #[test]
    fn multiselect_nonarray_external_value_is_not_trusted() {
        let storage: Rc<dyn Storage> = Rc::new(MemoryStorage::new());
        storage.set("seasonFilters", r#"{"seasons":"S31"}"#);
        let filters = Filters::new(25);
        let mut widget = MultiSelectFilter::new(
            "#season-select",
            "seasons",
            Some(MultiSelectControl::new(vec![])),
            Some(ExternalScope::new(storage, "seasonFilters")),
        );
        widget.init(&filters);
        let entries = widget.tick(&filters).expect("restore");
        assert_eq!(entries[0].1, FilterValue::List(vec![]));
    }

    #[test]
    fn multiselect_commit_mirrors_into_external_scope() {
        let storage: Rc<dyn Storage> = Rc::new(MemoryStorage::new());
        let mut widget = MultiSelectFilter::new(
            "#season-select",
            "seasons",
            Some(MultiSelectControl::new(vec![])),
            Some(ExternalScope::new(storage.clone(), "seasonFilters")),
        );
        widget.handle(WidgetInput::Select(vec!["S30".into()]));
        let saved = read_json_object(storage.as_ref(), "seasonFilters");
        assert_eq!(saved.get("seasons"), Some(&serde_json::json!(["S30"])));
    }

    #[test]
    fn multicheckbox_reset_clears_checks_and_value() {
        let mut filters = Filters::new(25);
        filters.insert_quiet("columns", FilterValue::List(vec!["elo".into()]));
        let mut widget = MultiCheckboxFilter::new(
            "columns",
            vec![
                Checkbox::new("elo", "Elo", false),
                Checkbox::new("maps", "Maps", false),
            ],
            None,
            &filters,
        );
        assert_eq!(widget.value(), FilterValue::List(vec!["elo".into()]));

        let reaction = widget.handle(WidgetInput::Reset);
        assert_eq!(
            reaction,
            Reaction::Commit(vec![("columns".into(), FilterValue::List(vec![]))])
        );
        assert_eq!(widget.value(), FilterValue::List(vec![]));
    }

    #[test]
    fn multicheckbox_outside_click_closes_open_dropdown() {
        let filters = Filters::new(25);
        let mut widget = MultiCheckboxFilter::new("columns", Vec::new(), None, &filters);
        assert_eq!(widget.handle(WidgetInput::OutsideClick), Reaction::None);
        widget.handle(WidgetInput::ToggleDropdown);
        assert!(matches!(widget.view(), WidgetView::Dropdown { open: true, .. }));
        assert_eq!(widget.handle(WidgetInput::OutsideClick), Reaction::Preview);
        assert!(matches!(
            widget.view(),
            WidgetView::Dropdown { open: false, .. }
        ));
    }
}
