//! Text and JSON rendering of talks for the terminal.

use serde::Serialize;

use crate::talk::Talk;

/// Shown when there are no talks to list.
pub const EMPTY_LIST_MESSAGE: &str = "Hmm... seems quiet in here...";

/// A talk together with the user's attendance.
#[derive(Debug, Clone, Serialize)]
pub struct TalkView<'a> {
    /// The talk itself.
    #[serde(flatten)]
    pub talk: &'a Talk,
    /// Whether the talk is a favorite.
    pub attending: bool,
}

/// Render one talk as an indented block.
#[must_use]
pub fn talk_block(talk: &Talk, attending: bool) -> String {
    let marker = if attending { "[x]" } else { "[ ]" };
    let mut out = format!("{marker} {}\n", talk.title);
    if !talk.subtitle.is_empty() {
        out.push_str(&format!("    {}\n", talk.subtitle));
    }
    out.push_str(&format!(
        "    {} - {} ({} min)\n",
        talk.display_start(),
        talk.display_end(),
        talk.duration
    ));
    out
}

/// Render a list of talks, or the empty-list message.
#[must_use]
pub fn talk_list(views: &[TalkView<'_>]) -> String {
    if views.is_empty() {
        return format!("{EMPTY_LIST_MESSAGE}\n");
    }
    views
        .iter()
        .map(|view| talk_block(view.talk, view.attending))
        .collect::<Vec<_>>()
        .join("\n")
}
