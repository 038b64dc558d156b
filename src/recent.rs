use iced::widget::{button, column, container, scrollable, text};
use iced::{Element, Length};
use unicode_width::{UnicodeWidthChar, UnicodeWidthStr};

use crate::Message;

/// Display columns available to one history entry in the side panel.
const ENTRY_WIDTH: usize = 30;

/// First line of `entry`, cut to `max` display columns with a trailing ellipsis.
pub fn truncate_entry(entry: &str, max: usize) -> String {
    let line = entry.lines().next().unwrap_or_default().trim();
    let multi_line = entry.trim().lines().nth(1).is_some();

    if line.width() <= max && !multi_line {
        return line.to_string();
    }

    let budget = max.saturating_sub(1);
    let mut out = String::new();
    let mut used = 0;
    for ch in line.chars() {
        let w = ch.width().unwrap_or(0);
        if used + w > budget {
            break;
        }
        out.push(ch);
        used += w;
    }
    out.push('…');
    out
}

/// Newest-first list of past questions. Clicking an entry replays it; the list
/// itself is never reordered by a click.
pub fn view<'a>(history: &'a [String], busy: bool) -> Element<'a, Message> {
    if history.is_empty() {
        return container(text("No recent questions yet.").size(12))
            .padding([8, 12])
            .into();
    }

    let items = history.iter().map(|entry| {
        button(text(truncate_entry(entry, ENTRY_WIDTH)).size(13))
            .on_press_maybe((!busy).then(|| Message::HistorySelected(entry.clone())))
            .style(button::text)
            .width(Length::Fill)
            .padding([4, 12])
            .into()
    });

    scrollable(column(items).spacing(2))
        .height(Length::Fill)
        .into()
}
