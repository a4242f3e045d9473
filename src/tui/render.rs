// ABOUTME: Draws the log viewer: container tabs, filter input, log pane and status line
//
// Log lines carry ANSI highlight markers; they are converted to styled text
// with ansi-to-tui so filter matches show up highlighted.

use super::events::ViewState;
use crate::viewer::{SessionState, ViewerController, ViewerError};
use ansi_to_tui::IntoText;
use ratatui::{
    prelude::*,
    style::{Color, Modifier, Style},
    text::{Line, Span},
    widgets::{Block, BorderType, Borders, Paragraph, Tabs},
};
use std::collections::VecDeque;

const ACCENT: Color = Color::Rgb(100, 149, 237);
const GOLD: Color = Color::Rgb(255, 215, 0);
const ERROR_RED: Color = Color::Rgb(230, 90, 90);
const MUTED_GRAY: Color = Color::Rgb(120, 120, 140);
const SOFT_WHITE: Color = Color::Rgb(220, 220, 230);

pub fn render(frame: &mut Frame, controller: &ViewerController, view: &ViewState) {
    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints([
            Constraint::Length(3),
            Constraint::Length(3),
            Constraint::Min(3),
            Constraint::Length(1),
        ])
        .split(frame.size());

    render_containers(frame, chunks[0], controller);
    render_filter(frame, chunks[1], controller);
    render_logs(frame, chunks[2], controller, view);
    render_status(frame, chunks[3], controller, view);
}

fn render_containers(frame: &mut Frame, area: Rect, controller: &ViewerController) {
    let selected = controller
        .containers()
        .iter()
        .position(|c| c == controller.container())
        .unwrap_or(0);

    let titles: Vec<Line> = controller
        .containers()
        .iter()
        .enumerate()
        .map(|(i, name)| Line::from(format!("{} {}", i + 1, name)))
        .collect();

    let tabs = Tabs::new(titles)
        .select(selected)
        .block(
            Block::default()
                .borders(Borders::ALL)
                .border_type(BorderType::Rounded)
                .border_style(Style::default().fg(ACCENT))
                .title(Span::styled(
                    format!(" {} ", controller.target()),
                    Style::default().fg(GOLD).add_modifier(Modifier::BOLD),
                )),
        )
        .style(Style::default().fg(SOFT_WHITE))
        .highlight_style(Style::default().fg(GOLD).add_modifier(Modifier::BOLD | Modifier::UNDERLINED));

    frame.render_widget(tabs, area);
}

fn render_filter(frame: &mut Frame, area: Rect, controller: &ViewerController) {
    let invalid = matches!(
        controller.state().error(),
        Some(ViewerError::FilterCompile(_))
    );
    let border = if invalid { ERROR_RED } else { ACCENT };

    let mut spans = vec![Span::styled(
        controller.raw_filter().to_string(),
        Style::default().fg(SOFT_WHITE),
    )];
    if controller.is_filter_pending() {
        spans.push(Span::styled("  (pending)", Style::default().fg(MUTED_GRAY)));
    }

    let input = Paragraph::new(Line::from(spans)).block(
        Block::default()
            .borders(Borders::ALL)
            .border_type(BorderType::Rounded)
            .border_style(Style::default().fg(border))
            .title(" Filter "),
    );
    frame.render_widget(input, area);
}

fn render_logs(frame: &mut Frame, area: Rect, controller: &ViewerController, view: &ViewState) {
    let block = Block::default()
        .borders(Borders::ALL)
        .border_type(BorderType::Rounded)
        .border_style(Style::default().fg(ACCENT))
        .title(format!(" Logs [{}] ", controller.container()));

    let lines = controller.lines();
    if lines.is_empty() {
        let placeholder = placeholder(controller.state());
        let paragraph = Paragraph::new(placeholder)
            .block(block)
            .style(Style::default().fg(MUTED_GRAY))
            .alignment(Alignment::Center);
        frame.render_widget(paragraph, area);
        return;
    }

    let visible = usize::from(area.height.saturating_sub(2));
    let width = usize::from(area.width.saturating_sub(2));
    let scroll_back = view.scroll_back.min(lines.len().saturating_sub(visible));
    let end = lines.len() - scroll_back;

    // Wrap here so the newest line stays on the bottom row
    let mut rows: VecDeque<Line<'static>> = VecDeque::new();
    for line in lines.range(..end).rev() {
        let styled = line
            .text
            .as_str()
            .into_text()
            .unwrap_or_else(|_| Text::raw(line.text.clone()));
        for text_line in styled.lines.iter().rev() {
            for row in wrap_line(text_line, width).into_iter().rev() {
                rows.push_front(row);
            }
        }
        if rows.len() >= visible {
            break;
        }
    }
    while rows.len() > visible {
        rows.pop_front();
    }

    let paragraph = Paragraph::new(Vec::from(rows)).block(block);
    frame.render_widget(paragraph, area);
}

/// Split one styled line into rows of at most `width` columns
fn wrap_line(line: &Line<'_>, width: usize) -> Vec<Line<'static>> {
    if width == 0 {
        return Vec::new();
    }

    let mut rows = Vec::new();
    let mut row: Vec<Span<'static>> = Vec::new();
    let mut row_width = 0;
    for grapheme in line.styled_graphemes(Style::default()) {
        let grapheme_width = Span::raw(grapheme.symbol).width();
        if row_width > 0 && row_width + grapheme_width > width {
            rows.push(Line::from(std::mem::take(&mut row)));
            row_width = 0;
        }
        match row.last_mut().filter(|span| span.style == grapheme.style) {
            Some(span) => span.content.to_mut().push_str(grapheme.symbol),
            None => row.push(Span::styled(grapheme.symbol.to_string(), grapheme.style)),
        }
        row_width += grapheme_width;
    }
    rows.push(Line::from(row));
    rows
}

fn placeholder(state: &SessionState) -> &'static str {
    match state {
        SessionState::Idle => "No container selected",
        SessionState::Connecting { .. } => "Waiting for data...",
        SessionState::Streaming { caught_up: true, .. } => "No log lines for this selection",
        SessionState::Streaming { .. } => "",
        SessionState::Errored { .. } => "Log stream unavailable",
    }
}

fn render_status(frame: &mut Frame, area: Rect, controller: &ViewerController, view: &ViewState) {
    let line = if let Some(error) = controller.state().error() {
        Line::from(vec![
            Span::styled(" ERROR ", Style::default().fg(Color::Black).bg(ERROR_RED)),
            Span::styled(format!(" {error}"), Style::default().fg(ERROR_RED)),
            Span::styled("  Ctrl-R retry", Style::default().fg(MUTED_GRAY)),
        ])
    } else if let Some(notice) = &view.notice {
        Line::from(Span::styled(notice.clone(), Style::default().fg(ERROR_RED)))
    } else {
        let mut spans = vec![Span::styled(
            format!(" {} ", controller.state().name()),
            Style::default().fg(Color::Black).bg(ACCENT),
        )];
        spans.push(Span::styled(
            format!(" {} lines", controller.lines().len()),
            Style::default().fg(SOFT_WHITE),
        ));
        if view.scroll_back > 0 {
            spans.push(Span::styled(
                format!("  scrolled back {} (End to follow)", view.scroll_back),
                Style::default().fg(GOLD),
            ));
        }
        spans.push(Span::styled(
            "  Tab/←→ container  Alt+1-9 jump  ↑↓ PgUp/PgDn scroll  Esc quit",
            Style::default().fg(MUTED_GRAY),
        ));
        Line::from(spans)
    };

    frame.render_widget(Paragraph::new(line), area);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ViewerConfig;
    use crate::models::StepTarget;
    use crate::source::{ManualLogSource, SourceError};
    use crate::stream::MulticastHub;
    use ratatui::{backend::TestBackend, Terminal};
    use std::sync::Arc;

    fn draw(controller: &ViewerController, view: &ViewState) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 20)).unwrap();
        terminal
            .draw(|frame| render(frame, controller, view))
            .unwrap();
        let buffer = terminal.backend().buffer().clone();
        buffer
            .content()
            .iter()
            .map(ratatui::buffer::Cell::symbol)
            .collect::<String>()
    }

    fn setup() -> (ManualLogSource, ViewerController) {
        let source = ManualLogSource::new();
        let hub = MulticastHub::new(Arc::new(source.clone()), None);
        let controller = ViewerController::new(
            StepTarget::new("argo", "build", "compile"),
            ViewerConfig::default(),
            hub,
        );
        (source, controller)
    }

    #[tokio::test]
    async fn test_connecting_shows_waiting_placeholder() {
        let (_source, mut controller) = setup();
        controller.start();

        let screen = draw(&controller, &ViewState::default());
        assert!(screen.contains("argo/build/compile"));
        assert!(screen.contains("Waiting for data..."));
        assert!(screen.contains("connecting"));
    }

    #[tokio::test]
    async fn test_lines_render_without_escape_codes() {
        let (source, controller) = setup();
        let mut controller = controller.with_filter("disk");
        controller.start();
        source.latest_feed().unwrap().push("error: disk full");
        controller.next_update().await;

        let screen = draw(&controller, &ViewState::default());
        assert!(screen.contains("error: disk full"));
        assert!(!screen.contains("[43;1m"));
    }

    #[tokio::test]
    async fn test_newest_line_stays_visible_when_lines_wrap() {
        let (source, mut controller) = setup();
        controller.start();
        let feed = source.latest_feed().unwrap();
        for i in 0..10 {
            feed.push(format!("line{i}-{}", "x".repeat(150)));
        }
        feed.push("newest");
        for _ in 0..11 {
            controller.next_update().await;
        }

        let screen = draw(&controller, &ViewState::default());
        assert!(screen.contains("newest"));
    }

    #[test]
    fn test_wrap_line_splits_at_width_and_keeps_styles() {
        let bold = Style::default().add_modifier(Modifier::BOLD);
        let line = Line::from(vec![Span::raw("abcd"), Span::styled("efg", bold)]);

        let rows = wrap_line(&line, 3);
        let texts: Vec<String> = rows
            .iter()
            .map(|row| row.spans.iter().map(|span| span.content.as_ref()).collect())
            .collect();
        assert_eq!(texts, vec!["abc", "def", "g"]);
        assert_eq!(rows[1].spans[1].style, bold);
        assert_eq!(wrap_line(&Line::from(""), 3).len(), 1);
    }

    #[tokio::test]
    async fn test_source_error_is_shown() {
        let (source, mut controller) = setup();
        controller.start();
        source
            .latest_feed()
            .unwrap()
            .fail(SourceError::Connect("connection refused".to_string()));
        controller.next_update().await;

        let screen = draw(&controller, &ViewState::default());
        assert!(screen.contains("ERROR"));
        assert!(screen.contains("connection refused"));
    }
}
