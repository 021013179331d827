use eino_engine::view::{self, Header, MessageBody, MessageView};
use eino_shared::Role;
use ratatui::Frame;
use ratatui::layout::{Constraint, Flex, Layout, Rect};
use ratatui::style::{Color, Modifier, Style, Stylize};
use ratatui::text::{Line, Span, Text};
use ratatui::widgets::{Block, Clear, List, ListItem, ListState, Paragraph, Wrap};

use super::markdown::{plain_lines, render_markdown};
use super::{App, Confirm, Focus, Modal};

const SIDEBAR_WIDTH: u16 = 32;
const MAX_INPUT_LINES: u16 = 6;
const TYPING_FRAMES: [&str; 3] = ["●∙∙", "∙●∙", "∙∙●"];

fn border(focused: bool) -> Style {
    if focused {
        Style::default().fg(Color::Cyan)
    } else {
        Style::default().fg(Color::DarkGray)
    }
}

pub fn draw(frame: &mut Frame, app: &mut App) {
    let [body, status] =
        Layout::vertical([Constraint::Min(3), Constraint::Length(1)]).areas(frame.area());
    let [side, main] =
        Layout::horizontal([Constraint::Length(SIDEBAR_WIDTH), Constraint::Min(20)]).areas(body);

    let input_lines = (app.input.split('\n').count() as u16).clamp(1, MAX_INPUT_LINES);
    let [header, thread, input] = Layout::vertical([
        Constraint::Length(4),
        Constraint::Min(3),
        Constraint::Length(input_lines + 2),
    ])
    .areas(main);

    draw_sidebar(frame, app, side);
    draw_header(frame, app, header);
    draw_thread(frame, app, thread);
    draw_input(frame, app, input);
    draw_status(frame, app, status);

    if let Some(modal) = &app.modal {
        draw_modal(frame, modal);
    }
}

fn draw_sidebar(frame: &mut Frame, app: &App, area: Rect) {
    let [search, list] = Layout::vertical([Constraint::Length(3), Constraint::Min(1)]).areas(area);

    let query = if app.filter.is_empty() && app.focus != Focus::Search {
        Line::from("搜索对话…".dark_gray())
    } else {
        Line::from(app.filter.clone())
    };
    frame.render_widget(
        Paragraph::new(query).block(
            Block::bordered()
                .title(" 搜索 Ctrl+F ")
                .border_style(border(app.focus == Focus::Search)),
        ),
        search,
    );
    if app.focus == Focus::Search && app.modal.is_none() {
        let width = Line::from(app.filter.as_str()).width() as u16;
        frame.set_cursor_position((search.x + 1 + width, search.y + 1));
    }

    let items: Vec<ListItem> = app
        .entries()
        .into_iter()
        .map(|entry| {
            let marker = if entry.active { "● " } else { "  " };
            let mut title = Line::from(vec![Span::raw(marker), Span::raw(entry.title)]);
            if entry.active {
                title = title.bold().yellow();
            }
            ListItem::new(Text::from(vec![
                title,
                Line::from(format!("  {}", entry.created)).dark_gray(),
            ]))
        })
        .collect();

    let mut state = ListState::default();
    if !items.is_empty() {
        state.select(Some(app.selected));
    }

    let highlight = if app.focus == Focus::Sidebar {
        Style::default().add_modifier(Modifier::REVERSED)
    } else {
        Style::default()
    };
    let widget = List::new(items).highlight_style(highlight).block(
        Block::bordered()
            .title(" 对话 Ctrl+N ")
            .border_style(border(app.focus == Focus::Sidebar)),
    );
    frame.render_stateful_widget(widget, list, &mut state);
}

fn draw_header(frame: &mut Frame, app: &App, area: Rect) {
    let lines = match view::header(&app.store) {
        Header::Empty => vec![
            Line::from(view::EMPTY_TITLE.bold()),
            Line::from(view::EMPTY_SUBTITLE.dark_gray()),
        ],
        Header::Conversation { title, created } => vec![
            Line::from(Span::raw(title).bold()),
            Line::from(vec![
                Span::raw(format!("创建于 {}", created)).dark_gray(),
                Span::raw("   Ctrl+R 重命名 · Ctrl+K 清空").dark_gray(),
            ]),
        ],
    };
    frame.render_widget(
        Paragraph::new(lines).block(Block::bordered().border_style(border(false))),
        area,
    );
}

fn meta_line(message: &MessageView) -> Line<'static> {
    let color = match message.role {
        Role::User => Color::Cyan,
        Role::Assistant => Color::Magenta,
    };
    Line::from(vec![
        Span::styled(message.author, Style::default().fg(color).bold()),
        Span::raw("  "),
        Span::raw(message.time.clone()).dark_gray(),
    ])
}

/// Builds the thread and attaches copy labels to its code block headers.
fn thread_lines(app: &mut App) -> Vec<Line<'static>> {
    let mut lines = Vec::new();
    let mut blocks = Vec::new();
    let mut labelled = Vec::new();

    for message in view::thread(&app.store) {
        lines.push(meta_line(&message));
        match &message.body {
            MessageBody::Typing => {
                let dots = TYPING_FRAMES[app.tick % TYPING_FRAMES.len()];
                lines.push(Line::from(dots.magenta()));
            }
            MessageBody::Plain(text) => lines.extend(plain_lines(text)),
            MessageBody::Rich(text) if !app.markdown => lines.extend(plain_lines(text)),
            MessageBody::Rich(text) => match render_markdown(text) {
                Ok(rendered) => {
                    let offset = lines.len();
                    for block in rendered.code_blocks {
                        labelled.push((offset + block.line, blocks.len()));
                        blocks.push(block.code);
                    }
                    lines.extend(rendered.lines);
                }
                Err(e) => {
                    tracing::debug!(error = %e, "Falling back to plain text");
                    lines.extend(plain_lines(text));
                }
            },
        }
        lines.push(Line::default());
    }

    app.copy.attach(blocks);
    for (line, index) in labelled {
        let label = if index < 9 {
            format!("  Alt+{} {}", index + 1, app.copy.label(index))
        } else {
            format!("  {}", app.copy.label(index))
        };
        lines[line].push_span(Span::raw(label).dark_gray());
    }
    lines
}

fn wrapped_height(line: &Line<'static>, width: u16) -> usize {
    Paragraph::new(line.clone())
        .wrap(Wrap { trim: false })
        .line_count(width)
}

/// Lays out only the tail of the thread that can reach the viewport, so
/// threads of any length stay pinned to their latest line.
fn draw_thread(frame: &mut Frame, app: &mut App, area: Rect) {
    let mut lines = thread_lines(app);
    let width = area.width.saturating_sub(2);
    let visible = area.height.saturating_sub(2) as usize;
    let wanted = visible + app.scroll_back as usize;

    let mut start = lines.len();
    let mut height = 0usize;
    while start > 0 && height < wanted {
        start -= 1;
        height += wrapped_height(&lines[start], width);
    }

    let back = (app.scroll_back as usize).min(height.saturating_sub(visible));
    app.scroll_back = back as u16;
    let offset = u16::try_from(height.saturating_sub(visible + back)).unwrap_or(u16::MAX);

    let tail = lines.split_off(start);
    let paragraph = Paragraph::new(tail)
        .wrap(Wrap { trim: false })
        .block(Block::bordered().border_style(border(false)))
        .scroll((offset, 0));
    frame.render_widget(paragraph, area);
}

fn draw_input(frame: &mut Frame, app: &App, area: Rect) {
    let title = if app.is_sending() {
        " 等待回复… "
    } else {
        " Enter 发送 · Alt+Enter 换行 "
    };
    let lines: Vec<Line> = app.input.split('\n').map(Line::from).collect();
    let visible = area.height.saturating_sub(2);
    let hidden = (lines.len() as u16).saturating_sub(visible);

    frame.render_widget(
        Paragraph::new(lines.clone())
            .scroll((hidden, 0))
            .block(Block::bordered().title(title).border_style(border(app.focus == Focus::Input))),
        area,
    );

    if app.focus == Focus::Input && app.modal.is_none() {
        let row = (lines.len() as u16).saturating_sub(1).saturating_sub(hidden);
        let col = lines.last().map(|l| l.width()).unwrap_or(0) as u16;
        let x = (area.x + 1 + col).min(area.right().saturating_sub(2));
        frame.set_cursor_position((x, area.y + 1 + row));
    }
}

fn draw_status(frame: &mut Frame, app: &App, area: Rect) {
    let line = match &app.status {
        Some(status) => Line::from(status.as_str().red()),
        None => Line::from("Tab 切换焦点 · PgUp/PgDn 滚动 · Alt+数字 复制代码 · Esc 退出".dark_gray()),
    };
    frame.render_widget(Paragraph::new(line), area);
}

fn popup(area: Rect, width: u16, height: u16) -> Rect {
    let [row] = Layout::vertical([Constraint::Length(height)])
        .flex(Flex::Center)
        .areas(area);
    let [cell] = Layout::horizontal([Constraint::Length(width)])
        .flex(Flex::Center)
        .areas(row);
    cell
}

fn draw_modal(frame: &mut Frame, modal: &Modal) {
    let area = popup(frame.area(), 50, 5);
    let (title, body) = match modal {
        Modal::Rename { buffer, .. } => (" 重命名 ", format!("{}▏", buffer)),
        Modal::Confirm(Confirm::Delete(_)) => (" 删除 ", "确认删除此对话？ (y/n)".to_string()),
        Modal::Confirm(Confirm::Clear(_)) => {
            (" 清空 ", "确认清空此对话？此操作不可撤销。 (y/n)".to_string())
        }
    };

    frame.render_widget(Clear, area);
    frame.render_widget(
        Paragraph::new(vec![Line::default(), Line::from(body)])
            .wrap(Wrap { trim: false })
            .block(Block::bordered().title(title).border_style(border(true))),
        area,
    );
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ui::Action;
    use crate::ui::tests::app_with;
    use ratatui::Terminal;
    use ratatui::backend::TestBackend;

    fn screen(app: &mut App) -> String {
        let mut terminal = Terminal::new(TestBackend::new(100, 30)).unwrap();
        terminal.draw(|frame| draw(frame, app)).unwrap();
        terminal
            .backend()
            .buffer()
            .content
            .iter()
            .map(|cell| cell.symbol())
            .collect()
    }

    #[test]
    fn draws_sidebar_and_thread() {
        let mut app = app_with(&["Trip Plan", "Budget"]);
        for c in "where to?".chars() {
            app.apply(Action::Insert(c));
        }
        app.apply(Action::Send);
        app.finish_send(Ok("Try **Lisbon**".into()));

        let text = screen(&mut app);
        assert!(text.contains("Trip Plan"));
        assert!(text.contains("Budget"));
        assert!(text.contains("where to?"));
        assert!(text.contains("Lisbon"));
        assert!(!text.contains("**"));
    }

    #[test]
    fn code_blocks_get_copy_labels() {
        let mut app = app_with(&["Code"]);
        for c in "show me".chars() {
            app.apply(Action::Insert(c));
        }
        app.apply(Action::Send);
        app.finish_send(Ok("```rust\nfn main() {}\n```".into()));

        // Redrawing must not add labels
        screen(&mut app);
        let text = screen(&mut app);
        assert_eq!(text.matches("Alt+1").count(), 1);
        assert!(!text.contains("Alt+2"));
    }

    #[test]
    fn plain_mode_shows_raw_markdown() {
        let mut app = app_with(&["Raw"]);
        app.markdown = false;
        for c in "q".chars() {
            app.apply(Action::Insert(c));
        }
        app.apply(Action::Send);
        app.finish_send(Ok("Try **Lisbon**".into()));

        assert!(screen(&mut app).contains("**Lisbon**"));
    }

    #[test]
    fn modal_is_drawn_on_top() {
        let mut app = app_with(&["Chat"]);
        app.apply(Action::ClearActive);
        assert!(screen(&mut app).contains("(y/n)"));
    }

    fn answer(app: &mut App, question: &str, reply: String) {
        for c in question.chars() {
            app.apply(Action::Insert(c));
        }
        app.apply(Action::Send);
        app.finish_send(Ok(reply));
    }

    #[test]
    fn too_deep_markdown_falls_back_to_plain_text() {
        let mut app = app_with(&["Deep"]);
        let nested = format!("{} deep", ">".repeat(30));
        answer(&mut app, "nest", nested.clone());

        assert!(screen(&mut app).contains(&nested));
    }

    #[test]
    fn thread_taller_than_viewport_shows_latest_line() {
        let mut app = app_with(&["Long"]);
        let reply: String = (0..60).map(|i| format!("line {}\n\n", i)).collect();
        answer(&mut app, "count", format!("{}LATEST_LINE", reply));

        let text = screen(&mut app);
        assert!(text.contains("LATEST_LINE"));
        assert!(!text.contains("line 0 "));

        app.apply(Action::ScrollUp);
        assert!(!screen(&mut app).contains("LATEST_LINE"));
        app.apply(Action::ScrollDown);
        assert!(screen(&mut app).contains("LATEST_LINE"));
    }

    #[test]
    fn huge_thread_stays_pinned_to_latest_line() {
        let mut app = app_with(&["Huge"]);
        app.markdown = false;
        answer(&mut app, "flood", format!("{}LATEST_LINE", "x\n".repeat(70_000)));

        assert!(screen(&mut app).contains("LATEST_LINE"));
    }
}
