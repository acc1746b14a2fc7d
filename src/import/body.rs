//! Turning an ENML note body into the HTML block of a page.

use std::sync::OnceLock;

use chrono::{DateTime, Utc};
use regex::Regex;

/// Preamble every page body starts with.
pub const HTML_PREAMBLE: &str = "<!DOCTYPE html><head></head>";

fn style_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r#"(?i)(<(?:div|span).)style="[^"]*""#).expect("style regex"))
}

fn comment_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)<!--.*?-->").expect("comment regex"))
}

fn prolog_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)(?:<!\[CDATA\[)?<\?xml\s[^?]*\?>").expect("prolog regex")
    })
}

fn doctype_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#"(?i)(?:<!\[CDATA\[)?<!DOCTYPE\s+en-note\s+\w+\s+"https?://xml\.evernote\.com/pub/enml\d*\.dtd">"#,
        )
        .expect("doctype regex")
    })
}

fn empty_note_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"(?i)<en-note\b[^>/]*/>(?:\s*\]\]>)?").expect("empty en-note regex")
    })
}

fn note_start_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<en-note\b[^>/]*>").expect("en-note start regex"))
}

fn note_end_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)</en-note\s*>(?:\s*\]\]>)?").expect("en-note end regex"))
}

fn date_line_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?im)^date:(.*)$").expect("date line regex"))
}

fn cdata_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?is)<!\[CDATA\[(.*)\]\]>").expect("cdata regex"))
}

/// Strip the ENML wrapper and Evernote-only markup from a note body.
///
/// `<en-note>` becomes `<body>`; the result is trimmed and starts with
/// [`HTML_PREAMBLE`].
pub fn transform_body(content: &str) -> String {
    let body = style_re().replace_all(content, "$1");
    let body = comment_re().replace_all(&body, "");
    let body = prolog_re().replace_all(&body, "");
    let body = doctype_re().replace_all(&body, "");
    let body = empty_note_re().replace_all(&body, "<body></body>");
    let body = note_start_re().replace_all(&body, "<body>");
    let body = note_end_re().replace_all(&body, "</body>");

    format!("{}{}", HTML_PREAMBLE, body.trim())
}

/// Final touches applied to a body right before it is embedded in a page.
pub fn finalize_body(html: &str, date: DateTime<Utc>) -> String {
    let date_line = format!("Date: {}", date.format("%a, %d %b %Y %H:%M:%S Z"));
    let body = date_line_re().replace_all(html, regex::NoExpand(&date_line));
    let body = body
        .replace("&apos;", "'")
        .replace('\u{2019}', "'")
        .replace('\u{2018}', "'");
    // A literal CDATA section would end the page's own CDATA early
    cdata_re()
        .replace_all(&body, "&lt;![CDATA[$1]]&gt;")
        .into_owned()
}
