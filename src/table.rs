use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{Receiver, Sender, channel};
use std::time::{Duration, Instant};

use derive_setters::Setters;
use regex::Regex;
use tracing::{debug, error, info, trace, warn};

use crate::domain::LvError;
use crate::fetch::{ColumnSpec, DataSource, FetchOutcome, spawn_fetch};
use crate::filters::{FilterValue, Filters, SEARCH};
use crate::indicators::{IndicatorConfig, SortState, update_sort_indicators};
use crate::pagination::{self, PageLink, parse_page_links};
use crate::storage::Storage;
use crate::widgets::{FilterWidget, Reaction, WidgetInput, WidgetView};

/// A sortable column header parsed from the fragment.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SortHeader {
    pub field: String,
    pub label: String,
    pub state: SortState,
    pub glyph: String,
}

/// The table region as one disposable view: rebuilt from scratch out of
/// every fetched fragment, which is how listeners survive markup
/// replacement. Holds the raw markup plus everything parsed out of it.
#[derive(Debug, Default)]
pub struct Region {
    pub markup: String,
    pub headers: Vec<SortHeader>,
    pub rows: Vec<Vec<String>>,
    pub page_links: Vec<PageLink>,
    /// Horizontal scroll offset in columns. Reset by replacement, restored
    /// by the table afterwards.
    pub scroll: usize,
    pub error: Option<String>,
}

impl Region {
    pub fn from_fragment(fragment: &str) -> Self {
        let th = Regex::new(r"(?s)<th\b[^>]*>(.*?)</th>").unwrap();
        let th_tag = Regex::new(r"<th\b[^>]*>").unwrap();
        let field_attr = Regex::new(r#"data-field="([^"]*)""#).unwrap();
        let tr = Regex::new(r"(?s)<tr\b[^>]*>(.*?)</tr>").unwrap();
        let td = Regex::new(r"(?s)<td\b[^>]*>(.*?)</td>").unwrap();

        let mut headers = Vec::new();
        for capture in th.captures_iter(fragment) {
            let tag = th_tag
                .find(&capture[0])
                .map(|m| m.as_str().to_string())
                .unwrap_or_default();
            if !tag.contains("sortable") {
                continue;
            }
            let Some(field) = field_attr.captures(&tag).map(|c| c[1].to_string()) else {
                continue;
            };
            headers.push(SortHeader {
                field,
                label: strip_tags(&capture[1]).trim().to_string(),
                state: SortState::Neutral,
                glyph: String::new(),
            });
        }

        let mut rows = Vec::new();
        for capture in tr.captures_iter(fragment) {
            let cells: Vec<String> = td
                .captures_iter(&capture[1])
                .map(|c| strip_tags(&c[1]).trim().to_string())
                .collect();
            if !cells.is_empty() {
                rows.push(cells);
            }
        }

        Self {
            markup: fragment.to_string(),
            headers,
            rows,
            page_links: parse_page_links(fragment),
            scroll: 0,
            error: None,
        }
    }

    /// The inline error view shown in place of the table, never a blank
    /// region.
    pub fn error_view(message: String) -> Self {
        Self {
            error: Some(message),
            ..Self::default()
        }
    }
}

/// Drops markup tags and decodes the handful of entities the fragments use.
pub fn strip_tags(markup: &str) -> String {
    let tag = Regex::new(r"<[^>]*>").unwrap();
    tag.replace_all(markup, "")
        .replace("&amp;", "&")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&nbsp;", " ")
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableStatus {
    Idle,
    Loading,
    Error,
}

#[derive(Debug, Clone, Setters)]
#[setters(into, prefix = "with_")]
pub struct TableOptions {
    /// Storage key the filter map is persisted under.
    pub state_key: String,
    /// Endpoint returning the table fragment.
    pub data_url: String,
    pub container_id: String,
    pub region_id: String,
    pub per_page_default: i64,
    /// Quiet window applied to free-text inputs before a fetch is issued.
    pub debounce: Duration,
    /// Delay before the scroll offset is restored after a replacement, so
    /// the new content's layout can settle.
    pub settle_delay: Duration,
    #[setters(skip)]
    pub initial_filters: Vec<(String, FilterValue)>,
}

impl Default for TableOptions {
    fn default() -> Self {
        Self {
            state_key: "smartTableState".to_string(),
            data_url: "/".to_string(),
            container_id: "stats-container".to_string(),
            region_id: "stats-table-box".to_string(),
            per_page_default: 25,
            debounce: Duration::from_millis(300),
            settle_delay: Duration::from_millis(50),
            initial_filters: Vec::new(),
        }
    }
}

impl TableOptions {
    pub fn with_initial_filter(mut self, name: impl Into<String>, value: FilterValue) -> Self {
        self.initial_filters.push((name.into(), value));
        self
    }
}

/// The table controller. Owns the filter map, builds query strings, fetches
/// the region fragment, rebuilds the region view from each response and
/// persists/restores its state through the shared storage.
///
/// States: idle -> loading -> (success | error) -> idle. Issuing a fetch
/// cancels the previous in-flight one, so the last issued request always
/// wins.
pub struct SmartTable {
    options: TableOptions,
    filters: Filters,
    storage: Rc<dyn Storage>,
    source: Arc<dyn DataSource>,
    region: Region,
    widgets: BTreeMap<String, Box<dyn FilterWidget>>,
    after_render: Vec<Box<dyn FnMut(&Region) -> Result<(), LvError>>>,
    indicator_config: IndicatorConfig,
    column_meta: HashMap<String, ColumnSpec>,
    outcome_tx: Sender<FetchOutcome>,
    outcome_rx: Receiver<FetchOutcome>,
    generation: u64,
    cancel: Option<Arc<AtomicBool>>,
    status: TableStatus,
    pending_search: Option<(String, Instant)>,
    restore_at: Option<Instant>,
    restoring_scroll: bool,
    current_url: String,
}

impl SmartTable {
    /// Fails fast when the container or the nested table region is missing
    /// from the server-rendered page; the component cannot function without
    /// them. Every other absent element is someone else's optional feature.
    pub fn new(
        page_markup: &str,
        options: TableOptions,
        source: Arc<dyn DataSource>,
        storage: Rc<dyn Storage>,
    ) -> Result<Self, LvError> {
        let container_marker = format!("id=\"{}\"", options.container_id);
        let Some(container_at) = page_markup.find(&container_marker) else {
            return Err(LvError::MissingContainer(options.container_id.clone()));
        };
        let region_marker = format!("id=\"{}\"", options.region_id);
        if !page_markup[container_at..].contains(&region_marker) {
            return Err(LvError::MissingRegion(options.region_id.clone()));
        }

        let mut filters = Filters::new(options.per_page_default);
        for (name, value) in &options.initial_filters {
            filters.insert_quiet(name, value.clone());
        }

        let (outcome_tx, outcome_rx) = channel();
        Ok(Self {
            current_url: options.data_url.clone(),
            options,
            filters,
            storage,
            source,
            region: Region::default(),
            widgets: BTreeMap::new(),
            after_render: Vec::new(),
            indicator_config: IndicatorConfig::default(),
            column_meta: HashMap::new(),
            outcome_tx,
            outcome_rx,
            generation: 0,
            cancel: None,
            status: TableStatus::Idle,
            pending_search: None,
            restore_at: None,
            restoring_scroll: false,
        })
    }

    /// Load persisted state, resync the widgets from it, fetch.
    pub fn init(&mut self) {
        self.load_state();
        self.rehydrate_widgets();
        self.fetch_data();
    }

    pub fn filters(&self) -> &Filters {
        &self.filters
    }

    pub fn region(&self) -> &Region {
        &self.region
    }

    pub fn status(&self) -> TableStatus {
        self.status
    }

    /// The URL of the last issued request, mirroring what a browser would
    /// show in the address bar after a history replacement.
    pub fn current_url(&self) -> &str {
        &self.current_url
    }

    pub fn set_indicator_config(&mut self, config: IndicatorConfig) {
        self.indicator_config = config;
        self.apply_indicators();
    }

    pub fn set_column_meta(&mut self, meta: HashMap<String, ColumnSpec>) {
        self.column_meta = meta;
    }

    pub fn column_meta(&self) -> &HashMap<String, ColumnSpec> {
        &self.column_meta
    }

    // ------------------------------------------------------------- widgets

    /// Widgets can be added after construction; names must match the filter
    /// keys they drive.
    pub fn register_widget(&mut self, name: impl Into<String>, widget: Box<dyn FilterWidget>) {
        let name = name.into();
        debug!(name, "registered filter widget");
        self.widgets.insert(name, widget);
    }

    pub fn widget_view(&self, name: &str) -> Option<WidgetView<'_>> {
        self.widgets.get(name).map(|w| w.view())
    }

    /// Asks every registered widget to resynchronize its displayed value
    /// from the authoritative filter map.
    pub fn rehydrate_widgets(&mut self) {
        for widget in self.widgets.values_mut() {
            widget.set_value(&self.filters);
        }
    }

    /// Routes a user interaction to a widget and applies its reaction as one
    /// atomic step: filter write, page reset, persist, refetch.
    pub fn widget_event(&mut self, name: &str, input: WidgetInput) {
        let reaction = match self.widgets.get_mut(name) {
            Some(widget) => widget.handle(input),
            None => {
                warn!(name, "no widget registered under this name");
                return;
            }
        };
        match reaction {
            Reaction::Commit(entries) => {
                for (key, value) in entries {
                    self.filters.set(&key, value);
                }
                self.save_state();
                self.fetch_data();
            }
            Reaction::Preview | Reaction::None => {}
        }
    }

    // ------------------------------------------------------------- filters

    /// Debounced free-text path: the fetch happens once the input has been
    /// quiet for the debounce window, for the latest text only.
    pub fn search_changed(&mut self, text: impl Into<String>) {
        self.pending_search = Some((text.into(), Instant::now()));
    }

    /// Writes a filter without the page reset, persistence or refetch of
    /// `input_changed`. For values restored from outside the table before
    /// the first fetch.
    pub fn seed_filter(&mut self, name: &str, value: FilterValue) {
        self.filters.insert_quiet(name, value);
    }

    /// Immediate path for selects and checkboxes bound by name.
    pub fn input_changed(&mut self, name: &str, value: FilterValue) {
        self.filters.set(name, value);
        self.save_state();
        self.fetch_data();
    }

    /// Restores the built-in defaults plus the constructor-supplied initial
    /// filters, discarding any persisted overrides.
    pub fn reset(&mut self) {
        info!("resetting filters to defaults");
        self.pending_search = None;
        self.filters = Filters::new(self.options.per_page_default);
        for (name, value) in &self.options.initial_filters {
            self.filters.insert_quiet(name, value.clone());
        }
        self.rehydrate_widgets();
        self.save_state();
        self.fetch_data();
    }

    /// One click on a sortable header, by position in the region.
    pub fn sort_click(&mut self, header_index: usize) {
        let Some(field) = self
            .region
            .headers
            .get(header_index)
            .map(|h| h.field.clone())
        else {
            return;
        };
        self.sort_by_field(&field);
    }

    pub fn sort_by_field(&mut self, field: &str) {
        self.filters.cycle_sort(field);
        self.apply_indicators();
        self.fetch_data();
    }

    pub fn go_to_page(&mut self, page: i64) {
        self.filters.set_page(page);
        self.save_state();
        self.fetch_data();
    }

    /// Dispatches a click on the n-th rendered pagination link.
    pub fn page_clicked(&mut self, index: usize) {
        let mut clicked = None;
        pagination::dispatch(&self.region.page_links, index, |page| clicked = Some(page));
        if let Some(page) = clicked {
            debug!(page, "pagination link clicked");
            self.go_to_page(page);
        }
    }

    /// Records a user-driven horizontal scroll. Suppressed while an
    /// automated restoration is in flight, so the restoration is not
    /// recorded as user input.
    pub fn scrolled(&mut self, offset: usize) {
        if self.restoring_scroll {
            return;
        }
        self.region.scroll = offset;
        self.filters.set_scroll(offset as i64);
    }

    // --------------------------------------------------------- persistence

    pub fn save_state(&mut self) {
        self.storage
            .set(&self.options.state_key, &self.filters.to_json());
    }

    /// Merges persisted state over the current filters; missing or
    /// malformed blobs leave the defaults in place.
    pub fn load_state(&mut self) {
        let Some(raw) = self.storage.get(&self.options.state_key) else {
            return;
        };
        match Filters::from_json(&raw) {
            Some(stored) => {
                self.filters.merge(stored);
                trace!(key = self.options.state_key, "restored persisted filters");
            }
            None => warn!(key = self.options.state_key, "invalid saved state, ignoring"),
        }
    }

    // ------------------------------------------------------------ fetching

    /// Captures the scroll offset, persists, rebuilds the query and issues
    /// the request, cancelling whatever was in flight.
    pub fn fetch_data(&mut self) {
        self.region.error = None;
        self.filters.set_scroll(self.region.scroll as i64);
        self.save_state();

        let query = self.filters.build_query();
        let url = if query.is_empty() {
            self.options.data_url.clone()
        } else {
            format!("{}?{}", self.options.data_url, query)
        };
        // address-bar sync: replace, never push
        self.current_url = url.clone();
        debug!(url, "fetching table fragment");

        if let Some(previous) = self.cancel.take() {
            previous.store(true, Ordering::Relaxed);
        }
        self.generation += 1;
        let cancel = Arc::new(AtomicBool::new(false));
        self.cancel = Some(cancel.clone());
        self.status = TableStatus::Loading;
        spawn_fetch(
            self.source.clone(),
            url,
            self.generation,
            cancel,
            self.outcome_tx.clone(),
        );
    }

    /// Re-issues the last fetch; the user-visible recovery path after an
    /// error. Filters are untouched.
    pub fn retry(&mut self) {
        self.fetch_data();
    }

    /// Drains debounce timers, widget ticks, fetch outcomes and the pending
    /// scroll restoration. Called once per event-loop tick; returns true
    /// when anything changed.
    pub fn poll(&mut self) -> bool {
        let mut changed = false;

        if let Some((text, issued)) = self.pending_search.take() {
            if issued.elapsed() >= self.options.debounce {
                self.filters.set(SEARCH, FilterValue::Text(text));
                self.save_state();
                self.fetch_data();
                changed = true;
            } else {
                self.pending_search = Some((text, issued));
            }
        }

        let mut restored = Vec::new();
        for widget in self.widgets.values_mut() {
            if let Some(entries) = widget.tick(&self.filters) {
                restored.extend(entries);
            }
        }
        for (name, value) in restored {
            self.filters.insert_quiet(&name, value);
            changed = true;
        }

        while let Ok(outcome) = self.outcome_rx.try_recv() {
            if outcome.generation != self.generation {
                trace!(
                    generation = outcome.generation,
                    current = self.generation,
                    "dropping stale fetch outcome"
                );
                continue;
            }
            self.cancel = None;
            match outcome.result {
                Ok(fragment) if fragment.status < 400 => {
                    self.apply_fragment(&fragment.body);
                    self.status = TableStatus::Idle;
                }
                Ok(fragment) => {
                    error!(url = outcome.url, status = fragment.status, "fetch failed");
                    self.region =
                        Region::error_view(format!("Error: status {}", fragment.status));
                    self.status = TableStatus::Error;
                }
                Err(e) => {
                    error!(url = outcome.url, error = %e, "fetch failed");
                    self.region = Region::error_view(format!("Error: {e}"));
                    self.status = TableStatus::Error;
                }
            }
            changed = true;
        }

        if let Some(at) = self.restore_at
            && Instant::now() >= at
        {
            self.region.scroll = self.filters.scroll() as usize;
            self.restore_at = None;
            self.restoring_scroll = false;
            trace!(offset = self.region.scroll, "restored scroll position");
            changed = true;
        }

        changed
    }

    /// Replaces the region with a freshly parsed view and re-establishes
    /// everything the old view carried: sort indicators, pagination links,
    /// scroll offset, after-render behavior.
    fn apply_fragment(&mut self, body: &str) {
        self.region = Region::from_fragment(body);
        for header in &mut self.region.headers {
            if let Some(label) = self
                .column_meta
                .get(&header.field)
                .and_then(|spec| spec.label.clone())
            {
                header.label = label;
            }
        }
        self.apply_indicators();

        if self.filters.scroll() > 0 {
            self.restoring_scroll = true;
            self.restore_at = Some(Instant::now() + self.options.settle_delay);
        }

        for (index, hook) in self.after_render.iter_mut().enumerate() {
            if let Err(e) = hook(&self.region) {
                error!(hook = index, error = %e, "after-render hook failed");
            }
        }
    }

    fn apply_indicators(&mut self) {
        let sort = self.filters.sort();
        update_sort_indicators(
            &mut self.region.headers,
            sort.as_ref(),
            &self.indicator_config,
        );
    }

    /// Registers a callback invoked after every successful fetch/replace
    /// cycle. A failing callback is logged and does not stop the others.
    pub fn on_after_render(
        &mut self,
        callback: impl FnMut(&Region) -> Result<(), LvError> + 'static,
    ) {
        self.after_render.push(Box::new(callback));
    }

    /// Tears down the widgets and drops pending work. Called on shutdown.
    pub fn destroy(&mut self) {
        if let Some(token) = self.cancel.take() {
            token.store(true, Ordering::Relaxed);
        }
        for (_, mut widget) in std::mem::take(&mut self.widgets) {
            widget.destroy();
        }
        self.after_render.clear();
    }
}
