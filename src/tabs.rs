use std::rc::Rc;

use tracing::debug;

use crate::storage::Storage;

const SELECTED_SEASON: &str = "selectedSeason";

/// Season tab strip. The selection is persisted on its own storage key,
/// outside any table state, and restored on construction; an unknown or
/// missing stored value falls back to the first tab.
pub struct SeasonTabs {
    storage: Rc<dyn Storage>,
    labels: Vec<String>,
    selected: usize,
}

impl SeasonTabs {
    pub fn new(labels: Vec<String>, storage: Rc<dyn Storage>) -> Self {
        let selected = storage
            .get(SELECTED_SEASON)
            .and_then(|saved| labels.iter().position(|l| *l == saved))
            .unwrap_or(0);
        Self {
            storage,
            labels,
            selected,
        }
    }

    pub fn labels(&self) -> &[String] {
        &self.labels
    }

    pub fn selected_index(&self) -> usize {
        self.selected
    }

    pub fn selected(&self) -> Option<&str> {
        self.labels.get(self.selected).map(String::as_str)
    }

    /// Activates the tab at `index` and persists the choice. Returns the
    /// newly selected label so the caller can route it into its filters;
    /// `None` when the index is out of range or already active.
    pub fn select(&mut self, index: usize) -> Option<&str> {
        if index >= self.labels.len() || index == self.selected {
            return None;
        }
        self.selected = index;
        let label = &self.labels[index];
        debug!(label, "season tab selected");
        self.storage.set(SELECTED_SEASON, label);
        Some(label)
    }

    pub fn next(&mut self) -> Option<&str> {
        if self.labels.is_empty() {
            return None;
        }
        let index = (self.selected + 1) % self.labels.len();
        self.select(index)
    }

    pub fn prev(&mut self) -> Option<&str> {
        if self.labels.is_empty() {
            return None;
        }
        let index = (self.selected + self.labels.len() - 1) % self.labels.len();
        self.select(index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;

    fn seasons() -> Vec<String> {
        vec!["S29".to_string(), "S30".to_string(), "S31".to_string()]
    }

    #[test]
    fn defaults_to_first_tab_without_a_stored_selection() {
        let storage: Rc<dyn Storage> = Rc::new(MemoryStorage::new());
        let tabs = SeasonTabs::new(seasons(), storage);
        assert_eq!(tabs.selected(), Some("S29"));
    }

    #[test]
    fn selection_is_persisted_and_restored() {
        let storage: Rc<dyn Storage> = Rc::new(MemoryStorage::new());
        let mut tabs = SeasonTabs::new(seasons(), storage.clone());
        assert_eq!(tabs.select(2), Some("S31"));
        assert_eq!(storage.get(SELECTED_SEASON).as_deref(), Some("S31"));

        let restored = SeasonTabs::new(seasons(), storage);
        assert_eq!(restored.selected(), Some("S31"));
    }

    #[test]
    fn unknown_stored_value_falls_back_to_first() {
        let storage: Rc<dyn Storage> = Rc::new(MemoryStorage::new());
        storage.set(SELECTED_SEASON, "S99");
        let tabs = SeasonTabs::new(seasons(), storage);
        assert_eq!(tabs.selected_index(), 0);
    }

    #[test]
    fn reselecting_the_active_tab_is_a_noop() {
        let storage: Rc<dyn Storage> = Rc::new(MemoryStorage::new());
        let mut tabs = SeasonTabs::new(seasons(), storage);
        assert_eq!(tabs.select(0), None);
        assert_eq!(tabs.select(9), None);
    }

    #[test]
    fn next_and_prev_wrap_around() {
        let storage: Rc<dyn Storage> = Rc::new(MemoryStorage::new());
        let mut tabs = SeasonTabs::new(seasons(), storage);
        assert_eq!(tabs.next(), Some("S30"));
        assert_eq!(tabs.next(), Some("S31"));
        assert_eq!(tabs.next(), Some("S29"));
        assert_eq!(tabs.prev(), Some("S31"));
    }
}
