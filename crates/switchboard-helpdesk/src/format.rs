// SPDX-FileCopyrightText: 2026 Switchboard Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Text formatting between protocol markup and platform markdown.
//!
//! | style  | protocol | platform   |
//! |--------|----------|------------|
//! | bold   | `*b*`    | `**b**`    |
//! | italic | `_i_`    | `*i*`      |
//! | strike | `~s~`    | `~~s~~`    |
//!
//! Conversion is a single regex pass so converted spans are never re-read.

use std::sync::LazyLock;

use regex::{Captures, Regex};
use switchboard_core::events::NormalizedMessage;
use switchboard_core::identifier;
use switchboard_core::types::Direction;

static PROTOCOL_MARKUP: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?P<pre>^|[^\w*_~])(?:\*(?P<b>[^*\n]+)\*|_(?P<i>[^_\n]+)_|~(?P<s>[^~\n]+)~)")
        .unwrap()
});

static PLATFORM_MARKDOWN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(
        r"(?P<pre>^|[^\w*~])(?:\*\*(?P<b>[^*\n]+)\*\*|\*(?P<i>[^*\n]+)\*|~~(?P<s>[^~\n]+)~~)",
    )
    .unwrap()
});

fn rewrite(re: &Regex, text: &str, bold: &str, italic: &str, strike: &str) -> String {
    re.replace_all(text, |caps: &Captures| {
        let pre = caps.name("pre").map_or("", |m| m.as_str());
        let (marker, inner) = if let Some(m) = caps.name("b") {
            (bold, m.as_str())
        } else if let Some(m) = caps.name("i") {
            (italic, m.as_str())
        } else if let Some(m) = caps.name("s") {
            (strike, m.as_str())
        } else {
            return caps[0].to_string();
        };
        format!("{pre}{marker}{inner}{marker}")
    })
    .into_owned()
}

/// Protocol markup to platform markdown.
pub fn to_markdown(text: &str) -> String {
    rewrite(&PROTOCOL_MARKUP, text, "**", "*", "~~")
}

/// Platform markdown to protocol markup.
pub fn to_protocol(text: &str) -> String {
    rewrite(&PLATFORM_MARKDOWN, text, "*", "_", "~")
}

/// Content posted to the platform for an inbound message. Incoming group
/// messages are prefixed with the author.
pub fn inbound_content(message: &NormalizedMessage) -> String {
    let body = to_markdown(&message.text);
    if !message.is_group || message.direction == Direction::Outgoing {
        return body;
    }
    let author = message
        .sender_name
        .as_deref()
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .or_else(|| {
            identifier::normalize(&message.sender)
                .ok()
                .and_then(|jid| jid.phone_number())
        })
        .unwrap_or_else(|| message.sender.clone());
    format!("**{author}:**\n{body}")
}

/// Protocol text for an agent reply, optionally signed with the agent's name.
pub fn outbound_content(content: &str, agent: Option<&str>, sign: bool) -> String {
    let body = to_protocol(content);
    match agent.map(str::trim).filter(|a| !a.is_empty()) {
        Some(agent) if sign => format!("*{agent}:*\n{body}"),
        _ => body,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use switchboard_core::events::ContentType;

    #[test]
    fn protocol_to_markdown() {
        assert_eq!(to_markdown("*bold* and _it_ ~gone~"), "**bold** and *it* ~~gone~~");
    }

    #[test]
    fn markdown_to_protocol() {
        assert_eq!(to_protocol("**bold** and *it* ~~gone~~"), "*bold* and _it_ ~gone~");
    }

    #[test]
    fn identifiers_with_underscores_are_left_alone() {
        assert_eq!(to_markdown("see snake_case_name here"), "see snake_case_name here");
        assert_eq!(to_markdown("2*3*4"), "2*3*4");
    }

    #[test]
    fn markup_across_lines_is_not_joined() {
        assert_eq!(to_markdown("*open\nclose*"), "*open\nclose*");
    }

    fn group_message(sender_name: Option<&str>) -> NormalizedMessage {
        NormalizedMessage {
            session_id: "s1".into(),
            message_id: "m1".into(),
            direction: Direction::Incoming,
            chat: "120363000000000000@g.us".into(),
            sender: "5511987654321@s.whatsapp.net".into(),
            sender_name: sender_name.map(str::to_string),
            is_group: true,
            timestamp: Utc::now(),
            content_type: ContentType::Text,
            text: "*oi*".into(),
        }
    }

    #[test]
    fn group_messages_carry_author() {
        assert_eq!(inbound_content(&group_message(Some("Ana"))), "**Ana:**\n**oi**");
        assert_eq!(
            inbound_content(&group_message(None)),
            "**+5511987654321:**\n**oi**"
        );
    }

    #[test]
    fn signature_only_when_enabled() {
        assert_eq!(outbound_content("**ok**", Some("Bia"), true), "*Bia:*\n*ok*");
        assert_eq!(outbound_content("**ok**", Some("Bia"), false), "*ok*");
        assert_eq!(outbound_content("ok", None, true), "ok");
    }
}
