//! Plain control state, the stand-in for the form elements a server-rendered
//! page would carry. Widgets and `FilterState` read and write these; the UI
//! renders them.

#[derive(Debug, Default, Clone, PartialEq)]
pub struct TextControl {
    pub value: String,
}

impl TextControl {
    pub fn new(value: impl Into<String>) -> Self {
        Self { value: value.into() }
    }
}

/// Single-choice select, e.g. the per-page dropdown.
#[derive(Debug, Clone, PartialEq)]
pub struct SelectControl {
    pub options: Vec<String>,
    pub value: String,
}

impl SelectControl {
    pub fn new(options: Vec<String>, value: impl Into<String>) -> Self {
        Self { options, value: value.into() }
    }
}

/// Searchable multi-select, the Tom Select stand-in.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MultiSelectControl {
    pub options: Vec<String>,
    pub selected: Vec<String>,
}

impl MultiSelectControl {
    pub fn new(options: Vec<String>) -> Self {
        Self { options, selected: Vec::new() }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Checkbox {
    pub value: String,
    pub label: String,
    pub checked: bool,
}

impl Checkbox {
    pub fn new(value: impl Into<String>, label: impl Into<String>, checked: bool) -> Self {
        Self {
            value: value.into(),
            label: label.into(),
            checked,
        }
    }
}

/// Two-handle numeric range control.
#[derive(Debug, Clone, PartialEq)]
pub struct SliderControl {
    pub min: f64,
    pub max: f64,
    pub step: f64,
    pub low: f64,
    pub high: f64,
}

impl SliderControl {
    pub fn new(min: f64, max: f64, step: f64) -> Self {
        Self {
            min,
            max,
            step,
            low: min,
            high: max,
        }
    }

    /// Moves the handles, clamped to the range and to each other.
    pub fn set(&mut self, low: f64, high: f64) {
        let low = low.clamp(self.min, self.max);
        let high = high.clamp(self.min, self.max);
        self.low = low.min(high);
        self.high = high.max(low);
    }

    /// Handle positions rounded to whole numbers, as committed to filters.
    pub fn rounded(&self) -> (i64, i64) {
        (self.low.round() as i64, self.high.round() as i64)
    }
}
