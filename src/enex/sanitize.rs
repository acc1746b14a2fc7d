//! Pre-parse repair of raw `<note>` fragments.
//!
//! Evernote writes some fields without escaping them, so a fragment is not
//! reliably well-formed XML until these rules have run. Each rule is a plain
//! text rewrite, independent of the others, and leaves already-repaired text
//! unchanged.

use std::sync::OnceLock;

use regex::{Captures, Regex};

/// Characters that cannot appear in a file name on the destination platform.
const INVALID_FILENAME_CHARS: &[char] = &['"', '<', '>', '|', ':', '*', '?', '\\', '/'];

fn title_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<title>(.*?)</title>").expect("title regex"))
}

fn author_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<author>(.*?)</author>").expect("author regex"))
}

fn file_name_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)<file-name>(.*?)</file-name>").expect("file-name regex"))
}

/// Repair the known-bad spots of a raw note fragment.
///
/// Never fails; text the rules do not recognise is returned untouched.
pub fn sanitize_note_xml(text: &str) -> String {
    // The note's own title precedes <content>, so only the first <title> is
    // touched; a later one could sit inside the CDATA body.
    let text = title_re().replacen(text, 1, |caps: &Captures<'_>| {
        format!("<title>{}</title>", escape_loose(&caps[1]))
    });
    let text = author_re().replace_all(&text, |caps: &Captures<'_>| {
        format!("<author>{}</author>", escape_loose(&caps[1]))
    });
    let text = file_name_re().replace_all(&text, |caps: &Captures<'_>| {
        format!("<file-name>{}</file-name>", sanitize_file_name_text(&caps[1]))
    });
    text.into_owned()
}

/// Escape raw `& " ' < > @` in element text.
///
/// An `&` that already starts one of the five XML entities or a numeric
/// character reference is left alone; any other `&` (including HTML-only
/// entities such as `&nbsp;`) becomes `&amp;` so the XML parser accepts it
/// and the later HTML decode restores it.
pub fn escape_loose(text: &str) -> String {
    escape_preserving_references(text, true)
}

fn escape_preserving_references(text: &str, escape_at: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for (i, c) in text.char_indices() {
        match c {
            '&' if starts_with_xml_reference(&text[i..]) => out.push('&'),
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '@' if escape_at => out.push_str("&#64;"),
            c => out.push(c),
        }
    }
    out
}

fn starts_with_xml_reference(text: &str) -> bool {
    let Some(end) = text.find(';') else {
        return false;
    };
    let name = &text[1..end];
    match name {
        "amp" | "lt" | "gt" | "quot" | "apos" => true,
        _ => {
            if let Some(hex) = name.strip_prefix("#x").or_else(|| name.strip_prefix("#X")) {
                !hex.is_empty() && hex.chars().all(|c| c.is_ascii_hexdigit())
            } else if let Some(dec) = name.strip_prefix('#') {
                !dec.is_empty() && dec.chars().all(|c| c.is_ascii_digit())
            } else {
                false
            }
        }
    }
}

/// Remove characters that are illegal in file names (including control characters).
pub fn strip_invalid_filename_chars(name: &str) -> String {
    name.chars()
        .filter(|c| !c.is_control() && !INVALID_FILENAME_CHARS.contains(c))
        .collect()
}

fn sanitize_file_name_text(raw: &str) -> String {
    let name = raw.replace("&nbsp;", " ");
    escape_preserving_references(&strip_invalid_filename_chars(&name), false)
}

/// Best-effort title of a fragment that could not be parsed.
pub fn guess_title(text: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| Regex::new(r"(?i)<title>(.+)</title>").expect("guess title regex"));
    re.captures(text)
        .map(|caps| caps[1].to_string())
        .filter(|title| !title.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escapes_raw_ampersand_in_title() {
        let raw = "<note><title>Tom & Jerry</title><content/></note>";
        assert_eq!(
            sanitize_note_xml(raw),
            "<note><title>Tom &amp; Jerry</title><content/></note>"
        );
    }

    #[test]
    fn test_escapes_special_chars_in_title() {
        let raw = r#"<note><title>"a" < 'b' > c@d</title></note>"#;
        assert_eq!(
            sanitize_note_xml(raw),
            "<note><title>&quot;a&quot; &lt; &apos;b&apos; &gt; c&#64;d</title></note>"
        );
    }

    #[test]
    fn test_keeps_existing_entities_in_title() {
        let raw = "<note><title>A &amp; B &#233; &#xE9;</title></note>";
        assert_eq!(sanitize_note_xml(raw), raw);
    }

    #[test]
    fn test_html_entity_in_title_is_escaped_for_xml() {
        let raw = "<note><title>a&nbsp;b</title></note>";
        assert_eq!(
            sanitize_note_xml(raw),
            "<note><title>a&amp;nbsp;b</title></note>"
        );
    }

    #[test]
    fn test_only_first_title_is_rewritten() {
        let raw = "<note><title>x & y</title><content><![CDATA[<title>a & b</title>]]></content></note>";
        let sanitized = sanitize_note_xml(raw);
        assert!(sanitized.contains("<title>x &amp; y</title>"));
        assert!(sanitized.contains("<title>a & b</title>"));
    }

    #[test]
    fn test_escapes_author() {
        let raw = "<note-attributes><author>me & you <me@example.com></author></note-attributes>";
        assert_eq!(
            sanitize_note_xml(raw),
            "<note-attributes><author>me &amp; you &lt;me&#64;example.com&gt;</author></note-attributes>"
        );
    }

    #[test]
    fn test_file_name_rule() {
        let raw = "<file-name>my&nbsp;file: v1/2 & notes.pdf</file-name>";
        assert_eq!(
            sanitize_note_xml(raw),
            "<file-name>my file v12 &amp; notes.pdf</file-name>"
        );
    }

    #[test]
    fn test_untouched_when_nothing_matches() {
        let raw = "<note><content><![CDATA[<en-note/>]]></content></note>";
        assert_eq!(sanitize_note_xml(raw), raw);
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        let samples = [
            "<note><title>Tom & Jerry's \"best\" <episodes> @home</title></note>",
            "<note><title>ok</title><note-attributes><author>a&b</author></note-attributes></note>",
            "<resource><resource-attributes><file-name>x&nbsp;y's:z.png</file-name></resource-attributes></resource>",
            "<note><title>a&nbsp;b &amp; c</title></note>",
        ];
        for raw in samples {
            let once = sanitize_note_xml(raw);
            assert_eq!(sanitize_note_xml(&once), once, "not idempotent for {:?}", raw);
        }
    }

    #[test]
    fn test_guess_title() {
        assert_eq!(
            guess_title("<note><title>Broken & note</title>"),
            Some("Broken & note".to_string())
        );
        assert_eq!(guess_title("<note><content/></note>"), None);
    }

    #[test]
    fn test_strip_invalid_filename_chars() {
        assert_eq!(strip_invalid_filename_chars("a<b>:c|d?e*f\"g\\h/i\u{7}"), "abcdefghi");
    }
}
