use std::rc::Rc;

use ratatui::crossterm::event::KeyEvent;
use tracing::{debug, trace};

use crate::domain::Message;
use crate::filters::{FilterValue, PER_PAGE};
use crate::inputter::{InputResult, Inputter};
use crate::state::{FilterState, Form};
use crate::storage::Storage;
use crate::table::SmartTable;
use crate::tabs::SeasonTabs;
use crate::widgets::WidgetInput;

const THEME_KEY: &str = "theme";
const SEASON_FILTER: &str = "seasons";
const PER_PAGE_OPTIONS: [i64; 3] = [25, 50, 100];

#[derive(Debug, PartialEq)]
pub enum Status {
    Ready,
    Quitting,
}

/// Focusable elements, in tab order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Focus {
    Tabs,
    Search,
    PerPage,
    Countries,
    Slider,
    Columns,
    Table,
}

const FOCUS_ORDER: [Focus; 7] = [
    Focus::Tabs,
    Focus::Search,
    Focus::PerPage,
    Focus::Countries,
    Focus::Slider,
    Focus::Columns,
    Focus::Table,
];

/// Application state: the table controller plus everything around it that
/// the UI renders. Messages come in from the controller; `tick` drives the
/// table's background work once per loop iteration.
pub struct App {
    pub status: Status,
    table: SmartTable,
    tabs: SeasonTabs,
    storage: Rc<dyn Storage>,
    panel: FilterState,
    form: Form,
    focus: Focus,
    input: Inputter,
    last_input: InputResult,
    searching: bool,
    search_before: String,
    show_help: bool,
    dark_theme: bool,
    country_values: Vec<String>,
    column_values: Vec<String>,
    country_cursor: usize,
    column_cursor: usize,
    header_cursor: usize,
}

impl App {
    pub fn new(
        table: SmartTable,
        tabs: SeasonTabs,
        storage: Rc<dyn Storage>,
        panel: FilterState,
        form: Form,
        country_values: Vec<String>,
        column_values: Vec<String>,
    ) -> Self {
        let dark_theme = storage.get(THEME_KEY).as_deref() != Some("light");
        Self {
            status: Status::Ready,
            table,
            tabs,
            storage,
            panel,
            form,
            focus: Focus::Table,
            input: Inputter::default(),
            last_input: InputResult::default(),
            searching: false,
            search_before: String::new(),
            show_help: false,
            dark_theme,
            country_values,
            column_values,
            country_cursor: 0,
            column_cursor: 0,
            header_cursor: 0,
        }
    }

    /// Restores table state, seeds the season filter from the restored tab
    /// selection and issues the first fetch.
    pub fn init(&mut self) {
        if let Some(label) = self.tabs.selected() {
            let label = label.to_string();
            self.table
                .seed_filter(SEASON_FILTER, FilterValue::List(vec![label]));
        }
        self.table.init();
    }

    pub fn table(&self) -> &SmartTable {
        &self.table
    }

    pub fn tabs(&self) -> &SeasonTabs {
        &self.tabs
    }

    pub fn focus(&self) -> Focus {
        self.focus
    }

    pub fn searching(&self) -> bool {
        self.searching
    }

    pub fn search_input(&self) -> &InputResult {
        &self.last_input
    }

    pub fn show_help(&self) -> bool {
        self.show_help
    }

    pub fn dark_theme(&self) -> bool {
        self.dark_theme
    }

    pub fn country_cursor(&self) -> usize {
        self.country_cursor
    }

    pub fn column_cursor(&self) -> usize {
        self.column_cursor
    }

    pub fn header_cursor(&self) -> usize {
        self.header_cursor
    }

    /// The controller routes keys unmapped while the search editor is open.
    pub fn raw_keyevents(&self) -> bool {
        self.searching
    }

    /// Drives the table's deferred work. Returns true when the view changed.
    pub fn tick(&mut self) -> bool {
        self.table.poll()
    }

    pub fn quit(&mut self) {
        self.snapshot_panel();
        self.table.destroy();
        self.status = Status::Quitting;
    }

    /// Writes the panel's current values back through the form binding so
    /// the next start seeds the table from the last session.
    fn snapshot_panel(&mut self) {
        let filters = self.table.filters();
        if let Some(input) = &mut self.form.search {
            input.value = filters
                .get("search")
                .and_then(FilterValue::as_text)
                .unwrap_or_default()
                .to_string();
        }
        if let Some(select) = &mut self.form.per_page
            && let Some(per_page) = filters.get(PER_PAGE).and_then(FilterValue::as_int)
        {
            select.value = per_page.to_string();
        }
        if let Some(selected) = filters.get("countries").map(FilterValue::as_list) {
            for cb in &mut self.form.countries {
                cb.checked = selected.contains(&cb.value);
            }
        }
        if let Some(slider) = &mut self.form.elo_slider
            && let (Some(min), Some(max)) = (
                filters.get("min_elo").and_then(FilterValue::as_int),
                filters.get("max_elo").and_then(FilterValue::as_int),
            )
        {
            slider.set(min as f64, max as f64);
        }
        self.form.sort = filters.sort_raw().unwrap_or_default().to_string();
        self.panel.set_page(&mut self.form, filters.page());
        self.panel.save(&self.form, &[]);
    }

    pub fn update(&mut self, message: Message) {
        trace!("Update: focus {:?}, message {message:?}", self.focus);
        if self.show_help {
            match message {
                Message::Quit => self.quit(),
                _ => self.show_help = false,
            }
            return;
        }
        match message {
            Message::Quit => self.quit(),
            Message::Help => self.show_help = true,
            Message::FocusNext => self.cycle_focus(1),
            Message::FocusPrev => self.cycle_focus(-1),
            Message::BeginSearch => self.begin_search(),
            Message::RawKey(key) => self.search_key(key),
            Message::NextPage => self.change_page(1),
            Message::PrevPage => self.change_page(-1),
            Message::ResetFilters => self.table.reset(),
            Message::Retry => self.table.retry(),
            Message::ToggleTheme => self.toggle_theme(),
            Message::MoveUp => self.move_vertical(-1),
            Message::MoveDown => self.move_vertical(1),
            Message::MoveLeft => self.move_horizontal(-1),
            Message::MoveRight => self.move_horizontal(1),
            Message::Activate => self.activate(),
        }
    }

    fn cycle_focus(&mut self, step: i32) {
        let current = FOCUS_ORDER
            .iter()
            .position(|f| *f == self.focus)
            .unwrap_or(0);
        let len = FOCUS_ORDER.len() as i32;
        let next = (current as i32 + step).rem_euclid(len) as usize;
        self.focus = FOCUS_ORDER[next];
        // leaving the columns dropdown closes it
        if self.focus != Focus::Columns {
            self.table
                .widget_event("columns", WidgetInput::OutsideClick);
        }
    }

    // ------------------------------------------------------------- search

    fn begin_search(&mut self) {
        self.searching = true;
        self.focus = Focus::Search;
        self.search_before = self
            .table
            .filters()
            .get("search")
            .and_then(FilterValue::as_text)
            .unwrap_or_default()
            .to_string();
        self.input.set(&self.search_before);
        self.last_input = self.input.get();
    }

    fn search_key(&mut self, key: KeyEvent) {
        if !self.searching {
            return;
        }
        self.last_input = self.input.read(key);
        if self.last_input.finished {
            self.searching = false;
            if self.last_input.canceled {
                // editing abandoned, put the previous text back
                self.table.search_changed(self.search_before.clone());
            } else {
                self.table.search_changed(self.last_input.input.clone());
            }
        } else {
            // live, debounced as-you-type filtering
            self.table.search_changed(self.last_input.input.clone());
        }
    }

    // ----------------------------------------------------------- movement

    fn move_vertical(&mut self, step: i32) {
        match self.focus {
            Focus::PerPage => self.cycle_per_page(step),
            Focus::Countries => {
                self.country_cursor =
                    cycle(self.country_cursor, step, self.country_values.len());
            }
            Focus::Columns => {
                self.column_cursor = cycle(self.column_cursor, step, self.column_values.len());
            }
            Focus::Slider => self.nudge_slider(0.0, step as f64),
            Focus::Table => {
                let offset = self.table.region().scroll as i32 + step;
                self.table.scrolled(offset.max(0) as usize);
            }
            _ => {}
        }
    }

    fn move_horizontal(&mut self, step: i32) {
        match self.focus {
            Focus::Tabs => self.switch_season(step),
            Focus::Slider => self.nudge_slider(step as f64, 0.0),
            Focus::Table => {
                let count = self.table.region().headers.len();
                self.header_cursor = cycle(self.header_cursor, step, count);
            }
            _ => {}
        }
    }

    fn activate(&mut self) {
        match self.focus {
            Focus::Countries => {
                if let Some(value) = self.country_values.get(self.country_cursor).cloned() {
                    self.table
                        .widget_event("countries", WidgetInput::Toggle(value));
                }
            }
            Focus::Columns => {
                if let Some(value) = self.column_values.get(self.column_cursor).cloned() {
                    self.table
                        .widget_event("columns", WidgetInput::Toggle(value));
                } else {
                    self.table
                        .widget_event("columns", WidgetInput::ToggleDropdown);
                }
            }
            Focus::Slider => self.release_slider(),
            Focus::Table => self.table.sort_click(self.header_cursor),
            _ => {}
        }
    }

    // ------------------------------------------------------------ widgets

    fn slider_handles(&self) -> Option<(f64, f64, f64)> {
        match self.table.widget_view("elo") {
            Some(crate::widgets::WidgetView::Slider {
                low, high, step, ..
            }) => Some((low, high, step)),
            _ => None,
        }
    }

    /// Arrow keys drag the handles: left/right moves the low handle,
    /// up/down the high one. Display-only until released with enter.
    fn nudge_slider(&mut self, low_steps: f64, high_steps: f64) {
        let Some((low, high, step)) = self.slider_handles() else {
            return;
        };
        self.table.widget_event(
            "elo",
            WidgetInput::SliderDrag(low + low_steps * step, high - high_steps * step),
        );
    }

    fn release_slider(&mut self) {
        let Some((low, high, _)) = self.slider_handles() else {
            return;
        };
        self.table
            .widget_event("elo", WidgetInput::SliderRelease(low, high));
    }

    fn cycle_per_page(&mut self, step: i32) {
        let current = self
            .table
            .filters()
            .get(PER_PAGE)
            .and_then(FilterValue::as_int)
            .unwrap_or(PER_PAGE_OPTIONS[0]);
        let index = PER_PAGE_OPTIONS
            .iter()
            .position(|&o| o == current)
            .unwrap_or(0);
        let next = cycle(index, step, PER_PAGE_OPTIONS.len());
        if next != index {
            self.table
                .input_changed(PER_PAGE, FilterValue::Int(PER_PAGE_OPTIONS[next]));
        }
    }

    fn switch_season(&mut self, step: i32) {
        let label = if step > 0 {
            self.tabs.next()
        } else {
            self.tabs.prev()
        };
        if let Some(label) = label {
            let label = label.to_string();
            debug!(season = label, "season switched");
            self.table
                .widget_event(SEASON_FILTER, WidgetInput::Select(vec![label]));
        }
    }

    fn change_page(&mut self, step: i64) {
        let page = (self.table.filters().page() + step).max(1);
        self.table.go_to_page(page);
    }

    fn toggle_theme(&mut self) {
        self.dark_theme = !self.dark_theme;
        self.storage.set(
            THEME_KEY,
            if self.dark_theme { "dark" } else { "light" },
        );
    }
}

fn cycle(current: usize, step: i32, len: usize) -> usize {
    if len == 0 {
        return 0;
    }
    (current as i32 + step).rem_euclid(len as i32) as usize
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controls::{
        Checkbox, MultiSelectControl, SelectControl, SliderControl, TextControl,
    };
    use crate::domain::LvError;
    use crate::fetch::{DataSource, Fragment};
    use crate::filters::Filters;
    use crate::storage::MemoryStorage;
    use crate::table::{SmartTable, TableOptions};
    use crate::widgets::{CountryFilter, MultiCheckboxFilter, MultiSelectFilter, RangeSlider};
    use ratatui::crossterm::event::{KeyCode, KeyModifiers};
    use std::sync::Arc;
    use std::thread;
    use std::time::{Duration, Instant};

    const PAGE: &str = r#"
        <div id="stats-container">
          <div id="stats-table-box"></div>
        </div>"#;

    struct Silent;

    impl DataSource for Silent {
        fn get(&self, url: &str) -> Result<Fragment, LvError> {
            Ok(Fragment {
                status: 200,
                body: url.to_string(),
            })
        }
    }

    fn app() -> App {
        let storage: Rc<dyn Storage> = Rc::new(MemoryStorage::new());
        let options = TableOptions::default()
            .with_data_url("/leaderboard")
            .with_debounce(Duration::from_millis(10))
            .with_settle_delay(Duration::from_millis(5));
        let mut table =
            SmartTable::new(PAGE, options, Arc::new(Silent), storage.clone()).expect("table");
        let empty = Filters::new(25);
        table.register_widget(
            "countries",
            Box::new(CountryFilter::new(
                "countries",
                vec![
                    Checkbox::new("BE", "Belgium", true),
                    Checkbox::new("NL", "Netherlands", true),
                ],
                &empty,
            )),
        );
        table.register_widget(
            "columns",
            Box::new(MultiCheckboxFilter::new(
                "columns",
                vec![
                    Checkbox::new("elo", "Elo", false),
                    Checkbox::new("maps", "Maps", false),
                ],
                None,
                &empty,
            )),
        );
        table.register_widget(
            "elo",
            Box::new(RangeSlider::new(
                "min_elo",
                "max_elo",
                SliderControl::new(0.0, 5000.0, 25.0),
                &empty,
            )),
        );
        table.register_widget(
            "seasons",
            Box::new(MultiSelectFilter::new(
                "#season-select",
                "seasons",
                Some(MultiSelectControl::new(vec![
                    "S30".to_string(),
                    "S31".to_string(),
                ])),
                None,
            )),
        );
        let tabs = SeasonTabs::new(
            vec!["S30".to_string(), "S31".to_string()],
            storage.clone(),
        );
        let panel = FilterState::new(storage.clone(), "leaderboardFilters");
        let form = Form {
            search: Some(TextControl::new("")),
            per_page: Some(SelectControl::new(
                vec!["25".into(), "50".into(), "100".into()],
                "25",
            )),
            countries: vec![
                Checkbox::new("BE", "Belgium", true),
                Checkbox::new("NL", "Netherlands", true),
            ],
            columns: Vec::new(),
            elo_slider: Some(SliderControl::new(0.0, 5000.0, 25.0)),
            sort: String::new(),
            page: String::new(),
        };
        App::new(
            table,
            tabs,
            storage,
            panel,
            form,
            vec!["BE".to_string(), "NL".to_string()],
            vec!["elo".to_string(), "maps".to_string()],
        )
    }

    fn pump(app: &mut App, total_ms: u64) {
        let deadline = Instant::now() + Duration::from_millis(total_ms);
        while Instant::now() < deadline {
            app.tick();
            thread::sleep(Duration::from_millis(2));
        }
    }

    #[test]
    fn focus_cycles_forward_and_backward() {
        let mut app = app();
        assert_eq!(app.focus(), Focus::Table);
        app.update(Message::FocusNext);
        assert_eq!(app.focus(), Focus::Tabs);
        app.update(Message::FocusPrev);
        assert_eq!(app.focus(), Focus::Table);
    }

    #[test]
    fn search_flow_commits_through_the_debounce() {
        let mut app = app();
        app.update(Message::BeginSearch);
        assert!(app.raw_keyevents());
        for c in "navi".chars() {
            app.update(Message::RawKey(KeyEvent::new(
                KeyCode::Char(c),
                KeyModifiers::NONE,
            )));
        }
        app.update(Message::RawKey(KeyEvent::new(
            KeyCode::Enter,
            KeyModifiers::NONE,
        )));
        assert!(!app.raw_keyevents());
        pump(&mut app, 80);
        assert_eq!(
            app.table().filters().get("search"),
            Some(&FilterValue::Text("navi".into()))
        );
    }

    #[test]
    fn escape_restores_the_previous_search() {
        let mut app = app();
        app.table_mut_for_tests().input_changed(
            "search",
            FilterValue::Text("original".into()),
        );
        app.update(Message::BeginSearch);
        app.update(Message::RawKey(KeyEvent::new(
            KeyCode::Char('x'),
            KeyModifiers::NONE,
        )));
        app.update(Message::RawKey(KeyEvent::new(
            KeyCode::Esc,
            KeyModifiers::NONE,
        )));
        pump(&mut app, 80);
        assert_eq!(
            app.table().filters().get("search"),
            Some(&FilterValue::Text("original".into()))
        );
    }

    #[test]
    fn theme_toggle_is_persisted() {
        let mut app = app();
        assert!(app.dark_theme());
        app.update(Message::ToggleTheme);
        assert!(!app.dark_theme());
        assert_eq!(app.storage.get(THEME_KEY).as_deref(), Some("light"));
    }

    #[test]
    fn season_switch_routes_into_the_filters() {
        let mut app = app();
        app.update(Message::FocusNext); // Tabs
        app.update(Message::MoveRight);
        pump(&mut app, 50);
        assert_eq!(app.tabs().selected(), Some("S31"));
        assert_eq!(
            app.table().filters().get("seasons"),
            Some(&FilterValue::List(vec!["S31".into()]))
        );
        assert_eq!(app.table().filters().page(), 1);
    }

    #[test]
    fn slider_arrows_preview_and_enter_commits() {
        let mut app = app();
        while app.focus() != Focus::Slider {
            app.update(Message::FocusNext);
        }
        app.update(Message::MoveRight); // low handle up one step
        assert_eq!(app.table().filters().get("min_elo"), None);
        app.update(Message::Activate);
        pump(&mut app, 50);
        assert_eq!(
            app.table().filters().get("min_elo"),
            Some(&FilterValue::Int(25))
        );
    }

    #[test]
    fn per_page_cycles_through_the_options() {
        let mut app = app();
        while app.focus() != Focus::PerPage {
            app.update(Message::FocusNext);
        }
        app.update(Message::MoveDown);
        pump(&mut app, 50);
        assert_eq!(
            app.table().filters().get(PER_PAGE),
            Some(&FilterValue::Int(50))
        );
    }

    #[test]
    fn help_overlay_swallows_the_next_key() {
        let mut app = app();
        app.update(Message::Help);
        assert!(app.show_help());
        app.update(Message::FocusNext);
        assert!(!app.show_help());
        assert_eq!(app.focus(), Focus::Table);
    }

    #[test]
    fn quitting_tears_the_table_down() {
        let mut app = app();
        app.update(Message::Quit);
        assert_eq!(app.status, Status::Quitting);
    }

    #[test]
    fn quitting_snapshots_the_filter_panel() {
        let mut app = app();
        app.table_mut_for_tests()
            .input_changed("search", FilterValue::Text("kray".into()));
        app.table_mut_for_tests().go_to_page(3);
        app.update(Message::Quit);

        let saved = app.storage.get("leaderboardFilters").expect("panel blob");
        assert!(saved.contains(r#""search":"kray""#));
        assert!(saved.contains(r#""page":"3""#));
    }

    impl App {
        fn table_mut_for_tests(&mut self) -> &mut SmartTable {
            &mut self.table
        }
    }
}
