use std::time::Duration;
use tracing::trace;

use crate::domain::{AppConfig, LvError, Message};
use crate::model::App;
use ratatui::crossterm::event::{self, Event, KeyCode};

pub struct Controller {
    event_poll_time: u64,
}

impl Controller {
    pub fn new(cfg: &AppConfig) -> Self {
        Self {
            event_poll_time: cfg.event_poll_time,
        }
    }

    pub fn handle_event(&self, app: &App) -> Result<Option<Message>, LvError> {
        if event::poll(Duration::from_millis(self.event_poll_time))?
            && let Event::Key(key) = event::read()?
            && key.kind == event::KeyEventKind::Press
        {
            // while the search editor is active, keys go to it unmapped
            if app.raw_keyevents() {
                return Ok(Some(Message::RawKey(key)));
            }
            return Ok(self.handle_key(key));
        }
        Ok(None)
    }

    fn handle_key(&self, key: event::KeyEvent) -> Option<Message> {
        let message = match key.code {
            KeyCode::Char('q') => Some(Message::Quit),
            KeyCode::Char('?') => Some(Message::Help),
            KeyCode::Tab => Some(Message::FocusNext),
            KeyCode::BackTab => Some(Message::FocusPrev),
            KeyCode::Up => Some(Message::MoveUp),
            KeyCode::Down => Some(Message::MoveDown),
            KeyCode::Left => Some(Message::MoveLeft),
            KeyCode::Right => Some(Message::MoveRight),
            KeyCode::Enter => Some(Message::Activate),
            KeyCode::Char(' ') => Some(Message::Activate),
            KeyCode::Char('/') => Some(Message::BeginSearch),
            KeyCode::Char('n') => Some(Message::NextPage),
            KeyCode::Char('p') => Some(Message::PrevPage),
            KeyCode::Char('R') => Some(Message::ResetFilters),
            KeyCode::Char('r') => Some(Message::Retry),
            KeyCode::Char('t') => Some(Message::ToggleTheme),
            _ => None,
        };
        trace!("Mapped: {key:?} => {message:?}");
        message
    }
}
