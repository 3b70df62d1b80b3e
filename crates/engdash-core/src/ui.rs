use crate::keybinds::InputMode;
use crate::page::{ActionButton, PageChrome, PageStatus};
use ratatui::{
    Frame,
    layout::{Constraint, Flex, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Paragraph, Tabs},
};

/// Render the top tab bar showing the dashboard pages.
pub fn render_tab_bar(frame: &mut Frame, area: Rect, pages: &[&str], active: Option<usize>) {
    let titles: Vec<Line> = pages
        .iter()
        .enumerate()
        .map(|(i, p)| Line::from(format!("{} {}", i + 1, p)))
        .collect();

    let tabs = Tabs::new(titles)
        .select(active)
        .highlight_style(Style::default().add_modifier(Modifier::BOLD | Modifier::UNDERLINED))
        .style(Style::default().add_modifier(Modifier::DIM))
        .divider(Span::raw(" | "));

    frame.render_widget(tabs, area);
}

/// Render the bottom status bar: mode, page, last refresh and the latest
/// error (which takes the place of the hint text).
pub fn render_status_bar(
    frame: &mut Frame,
    area: Rect,
    mode: InputMode,
    page_name: &str,
    status: &PageStatus,
    hint: &str,
) {
    let mut spans = vec![
        Span::styled(
            format!(" {} ", mode.label()),
            Style::default().add_modifier(Modifier::BOLD | Modifier::REVERSED),
        ),
        Span::raw(" "),
        Span::styled(page_name.to_string(), Style::default().add_modifier(Modifier::BOLD)),
    ];

    if status.loading {
        spans.push(Span::raw("  loading\u{2026}"));
    } else if let Some(at) = status.refreshed_at {
        spans.push(Span::styled(
            format!("  refreshed {}", at.format("%H:%M:%S")),
            Style::default().add_modifier(Modifier::DIM),
        ));
    }

    spans.push(Span::raw("  "));
    match &status.error {
        Some(err) => spans.push(Span::styled(
            err.clone(),
            Style::default().fg(Color::Red).add_modifier(Modifier::BOLD),
        )),
        None => spans.push(Span::styled(
            hint.to_string(),
            Style::default().add_modifier(Modifier::DIM),
        )),
    }

    let bar = Paragraph::new(Line::from(spans)).style(Style::default().add_modifier(Modifier::REVERSED));
    frame.render_widget(bar, area);
}

/// Render the command-line input at the bottom of the screen.
pub fn render_command_line(frame: &mut Frame, area: Rect, input: &str, cursor_column: u16) {
    let line = Line::from(vec![
        Span::styled(":", Style::default().add_modifier(Modifier::BOLD)),
        Span::raw(input),
    ]);
    frame.render_widget(Paragraph::new(line), area);
    frame.set_cursor_position((area.x + 1 + cursor_column, area.y));
}

/// Render the page header: title, subtitle and the action buttons on the
/// right.
pub fn render_page_header(frame: &mut Frame, area: Rect, chrome: &PageChrome) {
    let buttons: Vec<&ActionButton> = chrome.primary.iter().chain(chrome.secondary.iter()).collect();
    let buttons_width: u16 = buttons
        .iter()
        .map(|b| b.display_width() + 1)
        .sum();

    let [title_area, buttons_area] =
        Layout::horizontal([Constraint::Min(1), Constraint::Length(buttons_width)]).areas(area);

    let mut title = vec![Span::styled(
        chrome.title.clone(),
        Style::default().add_modifier(Modifier::BOLD),
    )];
    if let Some(subtitle) = &chrome.subtitle {
        title.push(Span::styled(
            format!("  {subtitle}"),
            Style::default().add_modifier(Modifier::DIM),
        ));
    }
    frame.render_widget(Paragraph::new(Line::from(title)), title_area);

    let mut spans = Vec::new();
    for (i, button) in buttons.iter().enumerate() {
        let style = if i == 0 && chrome.primary.is_some() {
            Style::default().fg(Color::Black).bg(Color::Blue).add_modifier(Modifier::BOLD)
        } else {
            Style::default().add_modifier(Modifier::REVERSED)
        };
        spans.push(Span::styled(button.text(), style));
        spans.push(Span::raw(" "));
    }
    frame.render_widget(Paragraph::new(Line::from(spans)), buttons_area);
}

/// Standard layout: tab bar (1 line) + main content + status bar (1 line).
/// Returns (tab_area, content_area, status_area).
pub fn standard_layout(area: Rect) -> (Rect, Rect, Rect) {
    let [tab_area, content_area, status_area] = Layout::vertical([
        Constraint::Length(1),
        Constraint::Min(1),
        Constraint::Length(1),
    ])
    .areas(area);

    (tab_area, content_area, status_area)
}

/// Split a page area into header (1 line) and body.
pub fn page_layout(area: Rect) -> (Rect, Rect) {
    let [header, body] = Layout::vertical([Constraint::Length(1), Constraint::Min(1)]).areas(area);
    (header, body)
}

/// Create a standard bordered block for a page section.
pub fn page_block(title: &str, focused: bool) -> Block<'_> {
    let border_style = if focused {
        Style::default().fg(Color::Blue)
    } else {
        Style::default().add_modifier(Modifier::DIM)
    };
    Block::default()
        .title(format!(" {} ", title))
        .borders(Borders::ALL)
        .border_style(border_style)
}

/// `pct` percent of `len`, computed wide so large terminals cannot overflow.
pub fn percent_of(len: u16, pct: u16) -> u16 {
    (u32::from(len) * u32::from(pct) / 100) as u16
}

/// Helper to create a centered rect within a given area.
pub fn centered_rect(width: u16, height: u16, area: Rect) -> Rect {
    let vertical = Layout::vertical([Constraint::Length(height)]).flex(Flex::Center);
    let horizontal = Layout::horizontal([Constraint::Length(width)]).flex(Flex::Center);
    let [area] = vertical.areas(area);
    let [area] = horizontal.areas(area);
    area
}
