use std::path::PathBuf;

use thiserror::Error;

use ratatui::crossterm::event::KeyEvent;

#[derive(Debug, Error)]
pub enum LvError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("container `#{0}` not found in page")]
    MissingContainer(String),
    #[error("table region `#{0}` not found in page")]
    MissingRegion(String),
    #[error("{0}")]
    Callback(String),
}

/// Runtime configuration assembled from the CLI in `main`.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub event_poll_time: u64,
    pub base_url: String,
    pub page_path: String,
    pub state_file: PathBuf,
}

/// Everything the controller can ask the model to do. Keys are mapped to
/// messages in `controller.rs`; the model decides what a message means for
/// the currently focused element.
#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Quit,
    Help,
    FocusNext,
    FocusPrev,
    MoveUp,
    MoveDown,
    MoveLeft,
    MoveRight,
    Activate,
    BeginSearch,
    RawKey(KeyEvent),
    NextPage,
    PrevPage,
    ResetFilters,
    Retry,
    ToggleTheme,
}

pub const HELP_TEXT: &str = "\
 ladderview key bindings

  q          quit            /       edit search
  tab/S-tab  cycle focus     enter   activate / commit
  arrows     move / adjust   space   toggle checkbox
  n / p      next/prev page  R       reset filters
  r          retry fetch     t       toggle dark/light
  ?          this help
";
