use engdash_core::ancestry::render_hierarchy_preview;
use engdash_core::option_tree::{OptionTreeRenderConfig, render_option_tree};
use engdash_core::ui::{centered_rect, page_block};
use ratatui::{
    Frame,
    layout::{Alignment, Constraint, Layout, Rect},
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, Borders, Clear, List, ListItem, Paragraph, Wrap},
};

use crate::form::EntityForm;
use crate::kind::{EntityKind, FieldKind};
use crate::list::{EntityList, ListView};
use crate::page::PendingDelete;

/// Render the list view: search line, rows, footer.
pub fn render_list(frame: &mut Frame, area: Rect, list: &EntityList, searching: bool) {
    let [search_area, list_area, info_area] = Layout::vertical([
        Constraint::Length(3),
        Constraint::Min(1),
        Constraint::Length(1),
    ])
    .areas(area);

    render_search(frame, search_area, list, searching);

    let kind = list.kind();
    match &list.view {
        ListView::Flat(listing) => {
            let items: Vec<ListItem> = listing
                .page_indices()
                .iter()
                .filter_map(|&i| list.items().get(i))
                .map(|entity| {
                    let mut spans = vec![Span::styled(
                        entity.display_name(),
                        Style::default().fg(Color::White),
                    )];
                    if let Some(subtitle) = kind.subtitle(entity) {
                        spans.push(Span::styled(
                            format!("  {subtitle}"),
                            Style::default().fg(Color::DarkGray),
                        ));
                    }
                    ListItem::new(Line::from(spans))
                })
                .collect();

            let widget = List::new(items)
                .block(page_block(kind.name, !searching))
                .highlight_style(
                    Style::default()
                        .bg(Color::Rgb(40, 40, 60))
                        .add_modifier(Modifier::BOLD),
                )
                .highlight_symbol("> ");
            let mut state = listing.list_state.clone();
            frame.render_stateful_widget(widget, list_area, &mut state);

            let total = listing.filtered.len();
            let page = &listing.pagination;
            let info = Paragraph::new(Line::from(vec![
                Span::styled(
                    format!(" page {}/{}", page.page() + 1, page.page_count(total).max(1)),
                    Style::default().fg(Color::Cyan),
                ),
                Span::styled(
                    "  ]/[:page  Enter:open  a:new  dd:del  /:search",
                    Style::default().fg(Color::DarkGray),
                ),
            ]));
            frame.render_widget(info, info_area);
        }
        ListView::Tree(tree) => {
            let block = page_block(kind.name, !searching);
            let inner = block.inner(list_area);
            frame.render_widget(block, list_area);

            let subtitle = |key: &str| -> Option<String> {
                let id = key.parse::<i64>().ok()?;
                list.find(id).and_then(|e| kind.subtitle(e))
            };
            let config = OptionTreeRenderConfig {
                focused: !searching,
                leaf_icon: None,
                subtitle: Some(&subtitle),
            };
            render_option_tree(frame, inner, tree, &config);

            let info = Paragraph::new(Span::styled(
                " l/h:fold  E/C:all  Enter:open  a:new  dd:del  /:search",
                Style::default().fg(Color::DarkGray),
            ));
            frame.render_widget(info, info_area);
        }
    }
}

fn render_search(frame: &mut Frame, area: Rect, list: &EntityList, searching: bool) {
    let border = if searching {
        Style::default().fg(Color::Green)
    } else {
        Style::default().fg(Color::DarkGray)
    };
    let block = Block::default()
        .title(" Search ")
        .borders(Borders::ALL)
        .border_style(border);
    let inner = block.inner(area);
    frame.render_widget(block, area);

    let text = if list.query().is_empty() && !searching {
        Span::styled(
            format!("/ to search {}", list.kind().name.to_lowercase()),
            Style::default().fg(Color::DarkGray),
        )
    } else {
        Span::raw(list.query().to_string())
    };
    frame.render_widget(Paragraph::new(text), inner);

    if searching {
        frame.set_cursor_position((inner.x + list.search.cursor_column(), inner.y));
    }
}

/// Render the details form next to the hierarchy preview (tree kinds).
pub fn render_form(frame: &mut Frame, area: Rect, form: &EntityForm) {
    let kind = form.kind();
    let (form_area, preview_area) = if kind.tree {
        let [left, right] =
            Layout::horizontal([Constraint::Percentage(60), Constraint::Percentage(40)])
                .areas(area);
        (left, Some(right))
    } else {
        (area, None)
    };

    let block = page_block(kind.name, !form.is_editing());
    let inner = block.inner(form_area);
    frame.render_widget(block, form_area);

    let mut constraints: Vec<Constraint> = form.fields().iter().map(|_| Constraint::Length(3)).collect();
    constraints.push(Constraint::Min(1));
    let rows = Layout::vertical(constraints).split(inner);

    for (i, field) in form.fields().iter().enumerate() {
        let focused = i == form.focus();
        let editing = focused && form.is_editing();
        let border = match (focused, editing) {
            (true, true) => Style::default().fg(Color::Green),
            (true, false) => Style::default().fg(Color::Blue),
            _ => Style::default().fg(Color::DarkGray),
        };
        let mut title = format!(" {} ", field.label);
        if field.required {
            title = format!(" {} * ", field.label);
        }
        let field_block = Block::default()
            .title(title)
            .borders(Borders::ALL)
            .border_style(border);
        let field_inner = field_block.inner(rows[i]);
        frame.render_widget(field_block, rows[i]);

        let value = form.display_value(i);
        let text = match field.kind {
            FieldKind::Parent if value.is_empty() => Span::styled(
                "(no parent)  e:choose",
                Style::default().fg(Color::DarkGray),
            ),
            FieldKind::Parent => Span::styled(
                format!("{value}  e:change  x:clear"),
                Style::default().fg(Color::Cyan),
            ),
            FieldKind::Text => Span::raw(value),
        };
        frame.render_widget(Paragraph::new(text), field_inner);

        if editing && field.kind == FieldKind::Text {
            frame.set_cursor_position((
                field_inner.x + form.input(i).cursor_column(),
                field_inner.y,
            ));
        }
    }

    let footer = rows[rows.len() - 1];
    let mut lines = Vec::new();
    if form.saving {
        lines.push(Line::from(Span::styled(
            "Saving…",
            Style::default().fg(Color::Yellow),
        )));
    }
    if let Some(error) = &form.error {
        lines.push(Line::from(Span::styled(
            error.clone(),
            Style::default().fg(Color::Red),
        )));
    }
    if form.is_dirty() && !form.saving {
        lines.push(Line::from(Span::styled(
            "unsaved changes  Enter/Ctrl-s:save  Esc:discard",
            Style::default().fg(Color::DarkGray),
        )));
    }
    frame.render_widget(Paragraph::new(lines).wrap(Wrap { trim: true }), footer);

    if let Some(preview_area) = preview_area {
        let block = page_block("Hierarchy", false);
        let inner = block.inner(preview_area);
        frame.render_widget(block, preview_area);
        render_hierarchy_preview(frame, inner, &form.preview(), "(this record)");
    }
}

/// Centered one-line message for loading / not found / failed states.
pub fn render_details_message(frame: &mut Frame, area: Rect, message: &str, is_error: bool) {
    let style = if is_error {
        Style::default().fg(Color::Red)
    } else {
        Style::default().add_modifier(Modifier::DIM)
    };
    let [_, middle, _] = Layout::vertical([
        Constraint::Fill(1),
        Constraint::Length(3),
        Constraint::Fill(1),
    ])
    .areas(area);
    let lines = vec![
        Line::from(Span::styled(message.to_string(), style)),
        Line::from(""),
        Line::from(Span::styled(
            "Esc:back  R:retry",
            Style::default().fg(Color::DarkGray),
        )),
    ];
    frame.render_widget(
        Paragraph::new(lines)
            .alignment(Alignment::Center)
            .wrap(Wrap { trim: true }),
        middle,
    );
}

/// The y/n dialog shown before a delete.
pub fn render_delete_confirm(
    frame: &mut Frame,
    area: Rect,
    kind: &EntityKind,
    pending: &PendingDelete,
) {
    let text = format!("Delete {} \"{}\"?", kind.singular, pending.name);
    let width = (text.chars().count() as u16 + 6).clamp(30, area.width.saturating_sub(4).max(30));
    let popup = centered_rect(width, 5, area);
    frame.render_widget(Clear, popup);

    let block = Block::default()
        .title(" Confirm ")
        .borders(Borders::ALL)
        .border_style(Style::default().fg(Color::Red));
    let lines = vec![
        Line::from(Span::styled(text, Style::default().add_modifier(Modifier::BOLD))),
        Line::from(""),
        Line::from(vec![
            Span::styled("y", Style::default().fg(Color::Red).add_modifier(Modifier::BOLD)),
            Span::raw(":delete  "),
            Span::styled("any other key", Style::default().add_modifier(Modifier::BOLD)),
            Span::raw(":cancel"),
        ]),
    ];
    frame.render_widget(
        Paragraph::new(lines).block(block).alignment(Alignment::Center),
        popup,
    );
}
