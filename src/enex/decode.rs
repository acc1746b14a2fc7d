//! Text decoding for ENEX fields.
//!
//! Evernote exports carry two kinds of encoded text: HTML entities in nearly
//! every field, and RFC 2047 encoded-words (`=?charset?B|Q?data?=`) in titles,
//! file names and, occasionally, note bodies that came in through email.

use std::sync::OnceLock;

use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use encoding_rs::Encoding;
use regex::{Captures, Regex};

/// Prefix that marks a field as MIME encoded.
pub const ENCODED_WORD_PREFIX: &str = "=?";

/// Transfer encoding of a single encoded-word.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WordEncoding {
    Base64,
    QuotedPrintable,
}

fn encoded_word_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"=\?([^?\s]+)\?([bBqQ])\?([^?\s]*)\?=").expect("encoded-word regex")
    })
}

/// Decode HTML entities (`&amp;`, `&lt;`, `&#64;`, `&nbsp;` ...) to literal characters.
pub fn decode_html(text: &str) -> String {
    html_escape::decode_html_entities(text).into_owned()
}

/// Encode `& < > "` as HTML entities.
pub fn encode_html(text: &str) -> String {
    html_escape::encode_quoted_attribute(text).into_owned()
}

/// Escape `& < > " '` for use in XML text or attribute values.
pub fn escape_xml(text: &str) -> String {
    quick_xml::escape::escape(text).into_owned()
}

/// HTML-decode a field, then MIME-decode it when it starts with `=?`.
pub fn decode_field(raw: &str) -> String {
    let decoded = decode_html(raw);
    if decoded.starts_with(ENCODED_WORD_PREFIX) {
        decode_mime_words(&decoded)
    } else {
        decoded
    }
}

/// Decode every RFC 2047 encoded-word in `text`.
///
/// Whitespace between two adjacent encoded-words is dropped (header folding),
/// other text is kept as is. An encoded-word that cannot be decoded (unknown
/// charset, broken payload) is passed through unmodified.
pub fn decode_mime_words(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut last_end = 0;
    let mut previous_was_word = false;

    for caps in encoded_word_re().captures_iter(text) {
        let Some(whole) = caps.get(0) else { continue };
        let between = &text[last_end..whole.start()];
        if !(previous_was_word && between.chars().all(char::is_whitespace)) {
            out.push_str(between);
        }

        match decode_word(&caps) {
            Some(decoded) => out.push_str(&decoded),
            None => out.push_str(whole.as_str()),
        }

        last_end = whole.end();
        previous_was_word = true;
    }

    out.push_str(&text[last_end..]);
    out
}

fn decode_word(caps: &Captures<'_>) -> Option<String> {
    // RFC 2231 allows a language suffix: charset*lang
    let label = caps[1].split('*').next()?;
    let encoding = Encoding::for_label(label.as_bytes())?;
    let payload = &caps[3];

    let bytes = match &caps[2] {
        "b" | "B" => BASE64.decode(payload).ok()?,
        _ => decode_q(payload)?,
    };

    let (decoded, had_errors) = encoding.decode_without_bom_handling(&bytes);
    if had_errors {
        return None;
    }
    Some(decoded.into_owned())
}

/// Decode the "Q" flavour of quoted-printable used inside encoded-words.
fn decode_q(payload: &str) -> Option<Vec<u8>> {
    let bytes = payload.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'_' => out.push(b' '),
            b'=' => {
                let hex = payload.get(i + 1..i + 3)?;
                out.push(u8::from_str_radix(hex, 16).ok()?);
                i += 2;
            }
            b => out.push(b),
        }
        i += 1;
    }
    Some(out)
}

/// Encode `text` as a single encoded-word in the given charset.
///
/// Returns `None` when the charset label is unknown.
pub fn encode_mime_word(text: &str, charset: &str, encoding: WordEncoding) -> Option<String> {
    let target = Encoding::for_label(charset.as_bytes())?;
    let (bytes, _, _) = target.encode(text);

    let payload = match encoding {
        WordEncoding::Base64 => BASE64.encode(&bytes),
        WordEncoding::QuotedPrintable => encode_q(&bytes),
    };
    let marker = match encoding {
        WordEncoding::Base64 => 'B',
        WordEncoding::QuotedPrintable => 'Q',
    };
    Some(format!("=?{}?{}?{}?=", charset, marker, payload))
}

fn encode_q(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for &b in bytes {
        match b {
            b' ' => out.push('_'),
            b'a'..=b'z' | b'A'..=b'Z' | b'0'..=b'9' | b'!' | b'*' | b'+' | b'-' | b'/' => {
                out.push(b as char)
            }
            _ => out.push_str(&format!("={:02X}", b)),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_html_entities() {
        assert_eq!(decode_html("Tom &amp; Jerry &lt;3"), "Tom & Jerry <3");
        assert_eq!(decode_html("&#64;home"), "@home");
        assert_eq!(decode_html("caf&eacute;"), "café");
    }

    #[test]
    fn test_html_round_trip() {
        let samples = ["a & b", "<tag attr=\"x\">", "it's", "&amp; already", "plain"];
        for s in samples {
            assert_eq!(decode_html(&encode_html(s)), s, "round trip of {:?}", s);
        }
    }

    #[test]
    fn test_escape_xml() {
        assert_eq!(escape_xml(r#"a<b>&"c'"#), "a&lt;b&gt;&amp;&quot;c&apos;");
    }

    #[test]
    fn test_decode_base64_word() {
        // "Grüße" in UTF-8
        assert_eq!(decode_mime_words("=?UTF-8?B?R3LDvMOfZQ==?="), "Grüße");
    }

    #[test]
    fn test_decode_quoted_printable_word() {
        assert_eq!(
            decode_mime_words("=?iso-8859-1?Q?Caf=E9_au_lait?="),
            "Café au lait"
        );
    }

    #[test]
    fn test_decode_folded_words_are_concatenated() {
        let folded = "=?UTF-8?B?SGVsbG8g?=\r\n =?UTF-8?Q?W=C3=B6rld?=";
        assert_eq!(decode_mime_words(folded), "Hello Wörld");
    }

    #[test]
    fn test_text_between_words_is_kept() {
        let mixed = "=?UTF-8?Q?a?= and =?UTF-8?Q?b?=";
        assert_eq!(decode_mime_words(mixed), "a and b");
    }

    #[test]
    fn test_malformed_word_passes_through() {
        let text = "=?no-such-charset?B?SGVsbG8=?= =?UTF-8?B?V29ybGQ=?=";
        assert_eq!(decode_mime_words(text), "=?no-such-charset?B?SGVsbG8=?=World");

        let broken = "=?UTF-8?Q?bad=Z?=";
        assert_eq!(decode_mime_words(broken), broken);
    }

    #[test]
    fn test_mime_codec_round_trip() {
        for text in ["Grüße aus Köln", "plain ascii", "a_b=c?d"] {
            for encoding in [WordEncoding::Base64, WordEncoding::QuotedPrintable] {
                let word = encode_mime_word(text, "UTF-8", encoding).unwrap();
                assert!(word.starts_with(ENCODED_WORD_PREFIX));
                assert_eq!(decode_mime_words(&word), text);
            }
        }
    }

    #[test]
    fn test_decode_field_only_decodes_prefixed_text() {
        assert_eq!(decode_field("=?UTF-8?B?SGk=?="), "Hi");
        assert_eq!(decode_field("Re: =?UTF-8?B?SGk=?="), "Re: =?UTF-8?B?SGk=?=");
        assert_eq!(decode_field("A &amp; B"), "A & B");
    }
}
