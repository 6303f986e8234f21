use std::collections::BTreeMap;
use std::rc::Rc;

use serde_json::Value;
use tracing::trace;

use crate::controls::{Checkbox, SelectControl, SliderControl, TextControl};
use crate::filters::FilterValue;
use crate::storage::{Storage, read_json_object, write_json_object};

/// The bound slice of a page's filter form: whichever controls the page
/// happens to have. Absent controls are simply skipped, matching the
/// optional-element tolerance of the original pages.
///
/// `sort`/`page` mirror the form's dataset: they belong to no visible
/// control but travel with the form state.
#[derive(Debug, Default)]
pub struct Form {
    pub search: Option<TextControl>,
    pub per_page: Option<SelectControl>,
    pub countries: Vec<Checkbox>,
    pub columns: Vec<Checkbox>,
    pub elo_slider: Option<SliderControl>,
    pub sort: String,
    pub page: String,
}

const DEFAULT_MIN_ELO: i64 = 0;
const DEFAULT_MAX_ELO: i64 = 5000;

/// Two-way binding between a `Form` and one persisted JSON blob.
#[derive(Clone)]
pub struct FilterState {
    storage: Rc<dyn Storage>,
    pub storage_key: String,
}

impl FilterState {
    pub fn new(storage: Rc<dyn Storage>, storage_key: impl Into<String>) -> Self {
        Self {
            storage,
            storage_key: storage_key.into(),
        }
    }

    /// Pushes the stored blob into the bound controls. Missing or malformed
    /// state leaves the controls untouched. A country checkbox with no
    /// stored preference defaults to checked; column checkboxes are only
    /// touched when a preference exists.
    pub fn load(&self, form: &mut Form) {
        let saved = read_json_object(self.storage.as_ref(), &self.storage_key);

        if let Some(search) = saved.get("search").and_then(Value::as_str)
            && let Some(input) = &mut form.search
        {
            input.value = search.to_string();
        }
        if let Some(per_page) = saved.get("per_page")
            && let Some(select) = &mut form.per_page
        {
            select.value = json_as_string(per_page);
        }

        let stored_countries = saved.get("countries").and_then(Value::as_array);
        for cb in &mut form.countries {
            cb.checked = match stored_countries {
                Some(values) => values.iter().any(|v| v.as_str() == Some(&cb.value)),
                None => true,
            };
        }

        if let Some(columns) = saved.get("columns").and_then(Value::as_array) {
            for cb in &mut form.columns {
                cb.checked = columns.iter().any(|v| v.as_str() == Some(&cb.value));
            }
        }

        if let (Some(min), Some(max), Some(slider)) = (
            saved.get("min_elo").and_then(Value::as_i64),
            saved.get("max_elo").and_then(Value::as_i64),
            form.elo_slider.as_mut(),
        ) {
            slider.set(min as f64, max as f64);
        }

        if let Some(sort) = saved.get("sort").and_then(Value::as_str) {
            form.sort = sort.to_string();
        }
        if let Some(page) = saved.get("page").and_then(page_number)
            && page > 1
        {
            form.page = page.to_string();
        }
        trace!(key = self.storage_key, "filter state loaded into form");
    }

    /// Reads the controls back out and persists them, merged with any
    /// caller-supplied overrides, overwriting prior state.
    pub fn save(&self, form: &Form, extra: &[(String, FilterValue)]) {
        let mut combined = self.extract(form);
        for (name, value) in extra {
            combined.insert(name.clone(), value.clone());
        }
        let mut object = serde_json::Map::new();
        for (name, value) in &combined {
            if let Ok(v) = serde_json::to_value(value) {
                object.insert(name.clone(), v);
            }
        }
        write_json_object(self.storage.as_ref(), &self.storage_key, &object);
    }

    /// Same extraction as `save`, without persisting. Used to build the
    /// outgoing query.
    pub fn get_filters(&self, form: &Form) -> BTreeMap<String, FilterValue> {
        self.extract(form)
    }

    /// Writes the page number onto the form dataset only; no persistence,
    /// no refetch.
    pub fn set_page(&self, form: &mut Form, page: i64) {
        form.page = page.to_string();
    }

    fn extract(&self, form: &Form) -> BTreeMap<String, FilterValue> {
        let (min_elo, max_elo) = form
            .elo_slider
            .as_ref()
            .map(|s| s.rounded())
            .unwrap_or((DEFAULT_MIN_ELO, DEFAULT_MAX_ELO));

        let countries = form
            .countries
            .iter()
            .filter(|cb| cb.checked)
            .map(|cb| cb.value.clone())
            .collect();

        let mut filters = BTreeMap::new();
        filters.insert(
            "search".to_string(),
            FilterValue::Text(
                form.search
                    .as_ref()
                    .map(|s| s.value.trim().to_string())
                    .unwrap_or_default(),
            ),
        );
        filters.insert("min_elo".to_string(), FilterValue::Int(min_elo));
        filters.insert("max_elo".to_string(), FilterValue::Int(max_elo));
        filters.insert("countries".to_string(), FilterValue::List(countries));
        filters.insert(
            "per_page".to_string(),
            FilterValue::Text(
                form.per_page
                    .as_ref()
                    .map(|s| s.value.clone())
                    .unwrap_or_else(|| "25".to_string()),
            ),
        );
        filters.insert("sort".to_string(), FilterValue::Text(form.sort.clone()));
        filters.insert(
            "page".to_string(),
            FilterValue::Text(if form.page.is_empty() {
                "1".to_string()
            } else {
                form.page.clone()
            }),
        );
        filters
    }
}

fn json_as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// The page lands in the blob as the form's dataset string, but older blobs
/// carry it as a number; both parse.
fn page_number(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn form() -> Form {
        Form {
            search: Some(TextControl::new("")),
            per_page: Some(SelectControl::new(
                vec!["25".into(), "50".into(), "100".into()],
                "25",
            )),
            countries: vec![
                Checkbox::new("BE", "Belgium", true),
                Checkbox::new("NL", "Netherlands", true),
                Checkbox::new("LU", "Luxembourg", true),
            ],
            columns: vec![
                Checkbox::new("elo", "Elo", true),
                Checkbox::new("maps", "Maps", true),
            ],
            elo_slider: Some(SliderControl::new(0.0, 5000.0, 25.0)),
            sort: String::new(),
            page: String::new(),
        }
    }

    #[test]
    fn save_then_load_roundtrips_control_state() {
        let storage: Rc<dyn Storage> = Rc::new(MemoryStorage::new());
        let state = FilterState::new(storage.clone(), "leaderboardFilters");

        let mut source = form();
        source.search.as_mut().unwrap().value = "  zywoo ".to_string();
        source.per_page.as_mut().unwrap().value = "50".to_string();
        source.countries[1].checked = false;
        source.elo_slider.as_mut().unwrap().set(500.0, 1800.0);
        state.save(&source, &[]);

        let mut fresh = form();
        let state2 = FilterState::new(storage, "leaderboardFilters");
        state2.load(&mut fresh);

        assert_eq!(fresh.search.as_ref().unwrap().value, "zywoo");
        assert_eq!(fresh.per_page.as_ref().unwrap().value, "50");
        let checked: Vec<&str> = fresh
            .countries
            .iter()
            .filter(|cb| cb.checked)
            .map(|cb| cb.value.as_str())
            .collect();
        assert_eq!(checked, vec!["BE", "LU"]);
        assert_eq!(fresh.elo_slider.as_ref().unwrap().rounded(), (500, 1800));
    }

    #[test]
    fn countries_default_to_checked_without_stored_preference() {
        let storage: Rc<dyn Storage> = Rc::new(MemoryStorage::new());
        let state = FilterState::new(storage, "freshKey");
        let mut f = form();
        f.countries[0].checked = false;
        state.load(&mut f);
        assert!(f.countries.iter().all(|cb| cb.checked));
    }

    #[test]
    fn malformed_blob_leaves_controls_untouched() {
        let storage: Rc<dyn Storage> = Rc::new(MemoryStorage::new());
        storage.set("k", "{{{");
        let state = FilterState::new(storage, "k");
        let mut f = form();
        f.search.as_mut().unwrap().value = "typed".to_string();
        state.load(&mut f);
        assert_eq!(f.search.as_ref().unwrap().value, "typed");
    }

    #[test]
    fn get_filters_extracts_without_persisting() {
        let storage: Rc<dyn Storage> = Rc::new(MemoryStorage::new());
        let state = FilterState::new(storage.clone(), "k");
        let mut f = form();
        f.search.as_mut().unwrap().value = "apex ".to_string();
        f.elo_slider.as_mut().unwrap().set(100.0, 900.0);

        let filters = state.get_filters(&f);
        assert_eq!(
            filters.get("search"),
            Some(&FilterValue::Text("apex".into()))
        );
        assert_eq!(filters.get("min_elo"), Some(&FilterValue::Int(100)));
        assert_eq!(filters.get("max_elo"), Some(&FilterValue::Int(900)));
        assert_eq!(storage.get("k"), None);
    }

    #[test]
    fn set_page_only_touches_the_form_dataset() {
        let storage: Rc<dyn Storage> = Rc::new(MemoryStorage::new());
        let state = FilterState::new(storage.clone(), "k");
        let mut f = form();
        state.set_page(&mut f, 7);
        assert_eq!(f.page, "7");
        assert_eq!(storage.get("k"), None);
    }

    #[test]
    fn deep_page_roundtrips_through_save_and_load() {
        let storage: Rc<dyn Storage> = Rc::new(MemoryStorage::new());
        let state = FilterState::new(storage.clone(), "k");

        let mut source = form();
        source.page = "3".to_string();
        state.save(&source, &[]);

        let mut fresh = form();
        FilterState::new(storage, "k").load(&mut fresh);
        assert_eq!(fresh.page, "3");
    }

    #[test]
    fn stored_sort_and_deep_page_land_on_the_dataset() {
        let storage: Rc<dyn Storage> = Rc::new(MemoryStorage::new());
        storage.set("k", r#"{"sort":"-elo","page":3}"#);
        let state = FilterState::new(storage, "k");
        let mut f = form();
        state.load(&mut f);
        assert_eq!(f.sort, "-elo");
        assert_eq!(f.page, "3");
    }
}
