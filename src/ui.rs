use ratatui::{
    Frame,
    layout::{Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Cell, Clear, Paragraph, Row, Table, Tabs},
};

use crate::domain::HELP_TEXT;
use crate::fetch::ColumnSpec;
use crate::model::{App, Focus};
use crate::table::TableStatus;
use crate::widgets::WidgetView;

pub struct Theme {
    pub fg: Color,
    pub bg: Color,
    pub accent: Color,
    pub dim: Color,
    pub good: Color,
    pub bad: Color,
}

impl Theme {
    pub fn dark() -> Self {
        Self {
            fg: Color::White,
            bg: Color::Black,
            accent: Color::Cyan,
            dim: Color::DarkGray,
            good: Color::Green,
            bad: Color::Red,
        }
    }

    pub fn light() -> Self {
        Self {
            fg: Color::Black,
            bg: Color::White,
            accent: Color::Blue,
            dim: Color::Gray,
            good: Color::Green,
            bad: Color::Red,
        }
    }
}

pub fn draw(app: &App, frame: &mut Frame) {
    let theme = if app.dark_theme() {
        Theme::dark()
    } else {
        Theme::light()
    };

    let base = Style::default().fg(theme.fg).bg(theme.bg);
    frame.render_widget(Block::default().style(base), frame.area());

    let [tabs_area, filter_area, table_area, pager_area, status_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Length(5),
        Constraint::Min(3),
        Constraint::Length(1),
        Constraint::Length(1),
    ])
    .areas(frame.area());

    draw_tabs(app, &theme, frame, tabs_area);
    draw_filter_panel(app, &theme, frame, filter_area);
    draw_table(app, &theme, frame, table_area);
    draw_pager(app, &theme, frame, pager_area);
    draw_status(app, &theme, frame, status_area);

    if app.show_help() {
        draw_help(&theme, frame);
    }
}

fn focus_style(app: &App, focus: Focus, theme: &Theme) -> Style {
    if app.focus() == focus {
        Style::default()
            .fg(theme.accent)
            .add_modifier(Modifier::BOLD)
    } else {
        Style::default().fg(theme.fg)
    }
}

fn draw_tabs(app: &App, theme: &Theme, frame: &mut Frame, area: Rect) {
    let tabs = Tabs::new(app.tabs().labels().to_vec())
        .select(app.tabs().selected_index())
        .style(focus_style(app, Focus::Tabs, theme))
        .highlight_style(
            Style::default()
                .fg(theme.bg)
                .bg(theme.accent)
                .add_modifier(Modifier::BOLD),
        );
    frame.render_widget(tabs, area);
}

fn checkbox_spans<'a>(
    entries: &[(&'a str, bool)],
    cursor: usize,
    focused: bool,
    theme: &Theme,
) -> Vec<Span<'a>> {
    let mut spans = Vec::new();
    for (index, (label, checked)) in entries.iter().enumerate() {
        let mark = if *checked { "[x] " } else { "[ ] " };
        let style = if focused && index == cursor {
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(theme.fg)
        };
        spans.push(Span::styled(format!("{mark}{label}  "), style));
    }
    spans
}

fn draw_filter_panel(app: &App, theme: &Theme, frame: &mut Frame, area: Rect) {
    let mut lines = Vec::new();

    let search = if app.searching() {
        let input = app.search_input();
        let (before, after) = split_at_char(&input.input, input.cursor_pos);
        Line::from(vec![
            Span::styled("search: ", focus_style(app, Focus::Search, theme)),
            Span::raw(before),
            Span::styled("█", Style::default().fg(theme.accent)),
            Span::raw(after),
        ])
    } else {
        let current = app
            .table()
            .filters()
            .get("search")
            .and_then(crate::filters::FilterValue::as_text)
            .unwrap_or_default()
            .to_string();
        Line::from(vec![
            Span::styled("search: ", focus_style(app, Focus::Search, theme)),
            Span::raw(current),
            Span::styled("  (/ to edit)", Style::default().fg(theme.dim)),
        ])
    };
    lines.push(search);

    let per_page = app
        .table()
        .filters()
        .get("per_page")
        .and_then(crate::filters::FilterValue::as_int)
        .unwrap_or(25);
    lines.push(Line::from(vec![
        Span::styled("per page: ", focus_style(app, Focus::PerPage, theme)),
        Span::raw(per_page.to_string()),
    ]));

    if let Some(WidgetView::Checkboxes(entries)) = app.table().widget_view("countries") {
        let mut spans = vec![Span::styled(
            "countries: ",
            focus_style(app, Focus::Countries, theme),
        )];
        spans.extend(checkbox_spans(
            &entries,
            app.country_cursor(),
            app.focus() == Focus::Countries,
            theme,
        ));
        lines.push(Line::from(spans));
    }

    if let Some(WidgetView::Slider {
        low_label,
        high_label,
        ..
    }) = app.table().widget_view("elo")
    {
        lines.push(Line::from(vec![
            Span::styled("elo: ", focus_style(app, Focus::Slider, theme)),
            Span::raw(format!("{low_label} – {high_label}")),
        ]));
    }

    if let Some(WidgetView::Dropdown { open, entries }) = app.table().widget_view("columns") {
        let mut spans = vec![Span::styled(
            if open { "columns ▾: " } else { "columns ▸: " },
            focus_style(app, Focus::Columns, theme),
        )];
        if open || app.focus() == Focus::Columns {
            spans.extend(checkbox_spans(
                &entries,
                app.column_cursor(),
                app.focus() == Focus::Columns,
                theme,
            ));
        } else {
            let count = entries.iter().filter(|(_, checked)| *checked).count();
            spans.push(Span::styled(
                format!("{count} selected"),
                Style::default().fg(theme.dim),
            ));
        }
        lines.push(Line::from(spans));
    }

    frame.render_widget(Paragraph::new(lines), area);
}

fn draw_table(app: &App, theme: &Theme, frame: &mut Frame, area: Rect) {
    let region = app.table().region();
    let block = Block::default()
        .borders(Borders::ALL)
        .border_style(focus_style(app, Focus::Table, theme));

    if let Some(message) = &region.error {
        let error = Paragraph::new(vec![
            Line::from(Span::styled(
                message.clone(),
                Style::default().fg(theme.bad),
            )),
            Line::from(Span::styled(
                "press r to retry",
                Style::default().fg(theme.dim),
            )),
        ])
        .block(block);
        frame.render_widget(error, area);
        return;
    }

    // horizontal scroll drops leading columns
    let skip = region.scroll.min(region.headers.len().saturating_sub(1));
    let header_cells: Vec<Cell> = region
        .headers
        .iter()
        .enumerate()
        .skip(skip)
        .map(|(index, h)| {
            let style = if app.focus() == Focus::Table && index == app.header_cursor() {
                Style::default()
                    .fg(theme.accent)
                    .add_modifier(Modifier::BOLD | Modifier::UNDERLINED)
            } else {
                Style::default().fg(theme.fg).add_modifier(Modifier::BOLD)
            };
            Cell::from(format!("{} {}", h.label, h.glyph)).style(style)
        })
        .collect();

    let meta = app.table().column_meta();
    let rows: Vec<Row> = region
        .rows
        .iter()
        .map(|cells| {
            Row::new(
                cells
                    .iter()
                    .enumerate()
                    .skip(skip)
                    .map(|(index, cell)| {
                        let spec = region.headers.get(index).and_then(|h| meta.get(&h.field));
                        styled_cell(cell, spec, theme)
                    })
                    .collect::<Vec<Cell>>(),
            )
        })
        .collect();

    let count = region.headers.len().saturating_sub(skip).max(1);
    let widths = vec![Constraint::Fill(1); count];
    let table = Table::new(rows, widths)
        .header(Row::new(header_cells))
        .block(block);
    frame.render_widget(table, area);
}

/// Applies the server's rendering hints: rounding plus good/bad coloring.
fn styled_cell<'a>(raw: &'a str, spec: Option<&ColumnSpec>, theme: &Theme) -> Cell<'a> {
    let Some(spec) = spec else {
        return Cell::from(raw);
    };
    let Ok(value) = raw.parse::<f64>() else {
        return Cell::from(raw);
    };
    let text = match spec.round {
        Some(digits) => format!("{0:.1$}", value, digits as usize),
        None => raw.to_string(),
    };
    let style = match (spec.good, spec.bad) {
        (Some(good), _) if value >= good => Style::default().fg(theme.good),
        (_, Some(bad)) if value <= bad => Style::default().fg(theme.bad),
        _ => Style::default(),
    };
    Cell::from(text).style(style)
}

fn draw_pager(app: &App, theme: &Theme, frame: &mut Frame, area: Rect) {
    let region = app.table().region();
    let page = app.table().filters().page();
    let mut spans = vec![Span::styled(
        format!("page {page}  "),
        Style::default().fg(theme.fg),
    )];
    for link in &region.page_links {
        let style = if link.page == page {
            Style::default()
                .fg(theme.accent)
                .add_modifier(Modifier::BOLD)
        } else {
            Style::default().fg(theme.dim)
        };
        spans.push(Span::styled(format!("[{}] ", link.label), style));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), area);
}

fn draw_status(app: &App, theme: &Theme, frame: &mut Frame, area: Rect) {
    let state = match app.table().status() {
        TableStatus::Loading => Span::styled("loading…", Style::default().fg(theme.accent)),
        TableStatus::Error => Span::styled("error", Style::default().fg(theme.bad)),
        TableStatus::Idle => Span::styled("ready", Style::default().fg(theme.dim)),
    };
    let line = Line::from(vec![
        state,
        Span::raw("  "),
        Span::styled(
            app.table().current_url().to_string(),
            Style::default().fg(theme.dim),
        ),
        Span::styled("   ? help", Style::default().fg(theme.dim)),
    ]);
    frame.render_widget(Paragraph::new(line), area);
}

fn draw_help(theme: &Theme, frame: &mut Frame) {
    let area = centered(frame.area(), 60, 14);
    frame.render_widget(Clear, area);
    let help = Paragraph::new(HELP_TEXT).block(
        Block::default()
            .borders(Borders::ALL)
            .title(" help ")
            .border_style(Style::default().fg(theme.accent)),
    );
    frame.render_widget(help, area);
}

fn centered(area: Rect, width: u16, height: u16) -> Rect {
    let width = width.min(area.width);
    let height = height.min(area.height);
    Rect {
        x: area.x + (area.width - width) / 2,
        y: area.y + (area.height - height) / 2,
        width,
        height,
    }
}

fn split_at_char(s: &str, chars: usize) -> (String, String) {
    let at = s
        .char_indices()
        .nth(chars)
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    (s[..at].to_string(), s[at..].to_string())
}
