use ratatui::crossterm::event::{self, KeyCode, KeyModifiers};

/// Minimal line editor for the search box. Cursor positions are in chars;
/// byte offsets are resolved only at insertion time.
#[derive(Default)]
pub struct Inputter {
    current_input: String,
    cursor_pos: usize,
    finished: bool,
    canceled: bool,
}

#[derive(Default, Clone)]
pub struct InputResult {
    pub input: String,
    pub finished: bool,
    pub canceled: bool,
    pub cursor_pos: usize,
}

impl Inputter {
    pub fn read(&mut self, key: event::KeyEvent) -> InputResult {
        match (key.code, key.modifiers) {
            (KeyCode::Enter, KeyModifiers::NONE) => self.enter(),
            (KeyCode::Esc, KeyModifiers::NONE) => self.escape(),
            (KeyCode::Backspace, KeyModifiers::NONE) => self.backspace(),
            (KeyCode::Left, KeyModifiers::NONE) => self.left(),
            (KeyCode::Right, KeyModifiers::NONE) => self.right(),
            (kc, km) => self.key(kc, km),
        }
    }

    /// Seeds the editor with an existing value, cursor at the end.
    pub fn set(&mut self, s: &str) {
        self.current_input = s.to_string();
        self.cursor_pos = s.chars().count();
        self.finished = false;
        self.canceled = false;
    }

    pub fn get(&self) -> InputResult {
        InputResult {
            canceled: self.canceled,
            finished: self.finished,
            input: self.current_input.clone(),
            cursor_pos: self.cursor_pos,
        }
    }

    pub fn clear(&mut self) {
        self.canceled = false;
        self.finished = false;
        self.current_input.clear();
        self.cursor_pos = 0;
    }

    fn enter(&mut self) -> InputResult {
        self.finished = true;
        self.get()
    }

    fn escape(&mut self) -> InputResult {
        self.clear();
        self.canceled = true;
        self.finished = true;
        self.get()
    }

    fn backspace(&mut self) -> InputResult {
        if self.cursor_pos > 0 {
            self.cursor_pos -= 1;
            let at = self.byte_pos();
            self.current_input.remove(at);
        }
        self.get()
    }

    fn left(&mut self) -> InputResult {
        self.cursor_pos = self.cursor_pos.saturating_sub(1);
        self.get()
    }

    fn right(&mut self) -> InputResult {
        if self.cursor_pos < self.current_input.chars().count() {
            self.cursor_pos += 1;
        }
        self.get()
    }

    fn key(&mut self, code: KeyCode, _modifier: KeyModifiers) -> InputResult {
        if let Some(chr) = code.as_char() {
            let at = self.byte_pos();
            self.current_input.insert(at, chr);
            self.cursor_pos += 1;
        }
        self.get()
    }

    fn byte_pos(&self) -> usize {
        self.current_input
            .char_indices()
            .nth(self.cursor_pos)
            .map(|(byte_idx, _)| byte_idx)
            .unwrap_or(self.current_input.len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ratatui::crossterm::event::KeyEvent;

    fn press(inputter: &mut Inputter, code: KeyCode) -> InputResult {
        inputter.read(KeyEvent::new(code, KeyModifiers::NONE))
    }

    #[test]
    fn typing_and_editing_in_the_middle() {
        let mut inputter = Inputter::default();
        for c in "navi".chars() {
            press(&mut inputter, KeyCode::Char(c));
        }
        press(&mut inputter, KeyCode::Left);
        press(&mut inputter, KeyCode::Left);
        press(&mut inputter, KeyCode::Char('x'));
        assert_eq!(inputter.get().input, "naxvi");

        let result = press(&mut inputter, KeyCode::Backspace);
        assert_eq!(result.input, "navi");
    }

    #[test]
    fn set_places_the_cursor_after_multibyte_text() {
        let mut inputter = Inputter::default();
        inputter.set("ümlaut");
        press(&mut inputter, KeyCode::Char('!'));
        assert_eq!(inputter.get().input, "ümlaut!");
    }

    #[test]
    fn escape_cancels_and_clears() {
        let mut inputter = Inputter::default();
        inputter.set("typed");
        let result = press(&mut inputter, KeyCode::Esc);
        assert!(result.canceled && result.finished);
        assert!(result.input.is_empty());
    }

    #[test]
    fn enter_finishes_with_the_current_text() {
        let mut inputter = Inputter::default();
        inputter.set("kray");
        let result = press(&mut inputter, KeyCode::Enter);
        assert!(result.finished && !result.canceled);
        assert_eq!(result.input, "kray");
    }
}
