use std::fs;
use std::process::ExitCode;
use std::rc::Rc;
use std::sync::Arc;

use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

mod controller;
mod controls;
mod domain;
mod fetch;
mod filters;
mod indicators;
mod inputter;
mod model;
mod pagination;
mod state;
mod storage;
mod table;
mod tabs;
mod ui;
mod widgets;

use controller::Controller;
use controls::{Checkbox, MultiSelectControl, SelectControl, SliderControl, TextControl};
use domain::{AppConfig, LvError};
use fetch::{DataSource, HttpSource, fetch_column_meta};
use filters::FilterValue;
use indicators::{IndicatorConfig, enhance_table_sorting};
use model::{App, Status};
use state::{FilterState, Form};
use storage::FileStorage;
use table::{SmartTable, TableOptions};
use tabs::SeasonTabs;
use widgets::{CountryFilter, ExternalScope, MultiCheckboxFilter, MultiSelectFilter, RangeSlider};

/// Terminal client for a ladder statistics server.
#[derive(Parser, Debug)]
#[command(version, about)]
struct Cli {
    /// Server base URL
    #[arg(long, default_value = "http://localhost:8000")]
    base_url: String,

    /// Leaderboard page path
    #[arg(long, default_value = "/leaderboard")]
    path: String,

    /// Comma separated season labels for the tab strip
    #[arg(long, default_value = "S29,S30,S31")]
    seasons: String,

    /// Where filter and UI state is persisted
    #[arg(long, default_value = "~/.local/state/ladderview/state.json")]
    state_file: String,

    /// Event poll interval in milliseconds
    #[arg(long, default_value_t = 100)]
    poll_ms: u64,

    /// Write logs to this file; set RUST_LOG to control verbosity
    #[arg(long)]
    log_file: Option<String>,
}

fn main() -> ExitCode {
    match run() {
        Err(e) => {
            ratatui::restore();
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
        Ok(_) => {
            ratatui::restore();
            ExitCode::SUCCESS
        }
    }
}

fn run() -> Result<(), LvError> {
    let cli = Cli::parse();

    if let Some(log_file) = &cli.log_file {
        let file = fs::File::create(log_file)?;
        tracing_subscriber::fmt()
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
            )
            .with_writer(file)
            .with_ansi(false)
            .init();
    }

    let state_file = shellexpand::full(&cli.state_file)
        .map(|s| s.into_owned())
        .unwrap_or(cli.state_file.clone());
    if let Some(parent) = std::path::Path::new(&state_file).parent() {
        fs::create_dir_all(parent)?;
    }

    let cfg = AppConfig {
        event_poll_time: cli.poll_ms,
        base_url: cli.base_url.clone(),
        page_path: cli.path.clone(),
        state_file: state_file.clone().into(),
    };
    info!(?cfg, "starting ladderview");

    let storage: Rc<dyn storage::Storage> = Rc::new(FileStorage::new(state_file.into()));
    let source = Arc::new(HttpSource::new()?);

    let page_url = format!("{}{}", cfg.base_url, cfg.page_path);
    let page = source.get(&page_url)?;

    let country_boxes = vec![
        Checkbox::new("BE", "Belgium", true),
        Checkbox::new("NL", "Netherlands", true),
        Checkbox::new("LU", "Luxembourg", true),
    ];

    let panel = FilterState::new(storage.clone(), "leaderboardFilters");
    let mut form = Form {
        search: Some(TextControl::new("")),
        per_page: Some(SelectControl::new(
            vec!["25".to_string(), "50".to_string(), "100".to_string()],
            "25",
        )),
        countries: country_boxes.clone(),
        columns: Vec::new(),
        elo_slider: Some(SliderControl::new(0.0, 5000.0, 25.0)),
        sort: String::new(),
        page: String::new(),
    };
    panel.load(&mut form);

    let mut options = TableOptions::default()
        .with_state_key("leaderboardTableState")
        .with_data_url(page_url.clone());
    // the last panel snapshot seeds the starting filters; the table's own
    // persisted state still wins where present
    for (name, value) in panel.get_filters(&form) {
        if matches!(&value, FilterValue::Text(t) if t.is_empty()) {
            continue;
        }
        options = options.with_initial_filter(name, value);
    }
    let mut table = SmartTable::new(&page.body, options, source.clone(), storage.clone())?;

    let meta = fetch_column_meta(source.as_ref(), &format!("{page_url}/columns"));
    let mut column_values: Vec<String> = meta.keys().cloned().collect();
    column_values.sort();
    if column_values.is_empty() {
        column_values = vec!["elo".to_string(), "maps".to_string(), "winrate".to_string()];
    }
    table.set_column_meta(meta);

    let country_values = vec!["BE".to_string(), "NL".to_string(), "LU".to_string()];
    table.register_widget(
        "countries",
        Box::new(CountryFilter::new(
            "countries",
            country_boxes,
            table.filters(),
        )),
    );

    let column_boxes = column_values
        .iter()
        .map(|value| Checkbox::new(value.clone(), value.clone(), false))
        .collect();
    table.register_widget(
        "columns",
        Box::new(MultiCheckboxFilter::new(
            "columns",
            column_boxes,
            Some(ExternalScope::new(storage.clone(), "columnFilters")),
            table.filters(),
        )),
    );

    table.register_widget(
        "elo",
        Box::new(RangeSlider::new(
            "min_elo",
            "max_elo",
            SliderControl::new(0.0, 5000.0, 25.0),
            table.filters(),
        )),
    );

    let seasons: Vec<String> = cli
        .seasons
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();
    table.register_widget(
        "seasons",
        Box::new(MultiSelectFilter::new(
            "#season-select",
            "seasons",
            Some(MultiSelectControl::new(seasons.clone())),
            Some(ExternalScope::new(storage.clone(), "seasonFilters")),
        )),
    );

    enhance_table_sorting(&mut table, IndicatorConfig::default());

    let season_tabs = SeasonTabs::new(seasons, storage.clone());

    let mut app = App::new(
        table,
        season_tabs,
        storage,
        panel,
        form,
        country_values,
        column_values,
    );
    app.init();

    let controller = Controller::new(&cfg);
    let mut terminal = ratatui::init();

    while app.status != Status::Quitting {
        app.tick();
        terminal.draw(|frame| ui::draw(&app, frame))?;
        if let Some(message) = controller.handle_event(&app)? {
            app.update(message);
        }
    }

    Ok(())
}
