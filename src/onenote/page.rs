//! Page documents in the OneNote 2013 page schema.

use std::path::Path;

use chrono::{DateTime, Utc};
use rand::Rng;

use super::hierarchy::ONENOTE_NS;
use crate::enex::decode::escape_xml;

/// Timestamp format of page and outline elements.
pub const PAGE_DATE_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

/// Everything a page document is assembled from.
#[derive(Debug, Clone)]
pub struct PageContent<'a> {
    /// Plain title; escaped on output
    pub title: &'a str,
    pub date: DateTime<Utc>,
    /// Transformed HTML body
    pub body: &'a str,
    /// `InsertedFile` directives, already rendered
    pub attachments: &'a str,
    pub source_url: Option<&'a str>,
}

pub fn format_page_date(date: DateTime<Utc>) -> String {
    date.format(PAGE_DATE_FORMAT).to_string()
}

/// `file://` URL for a local path.
pub fn file_url(path: &Path) -> String {
    let path = path.to_string_lossy().replace('\\', "/");
    if path.starts_with('/') {
        format!("file://{}", path)
    } else {
        format!("file:///{}", path)
    }
}

/// Directive that attaches a file to the page.
pub fn inserted_file(path: &Path, preferred_name: &str) -> String {
    format!(
        r#"<one:InsertedFile pathSource="{}" preferredName="{}" />"#,
        escape_xml(&path.to_string_lossy()),
        preferred_name
    )
}

/// Escape a title for the page document, keeping apostrophes readable.
pub fn page_title(title: &str) -> String {
    escape_xml(title).replace("&apos;", "'")
}

/// Assemble the full page document for the page `page_id`.
pub fn page_xml(page_id: &str, content: &PageContent<'_>) -> String {
    let title = page_title(content.title);
    let date = format_page_date(content.date);
    let outline_id: i32 = rand::thread_rng().gen_range(0..i32::MAX);

    let source = match content.source_url.filter(|url| !url.is_empty()) {
        Some(url) => format!(
            r#"<one:OE alignment="left" quickStyleIndex="2"><one:T><![CDATA[From &lt;<a href="{0}">{0}</a>&gt; ]]></one:T></one:OE>"#,
            url
        ),
        None => String::new(),
    };

    format!(
        concat!(
            r#"<?xml version="1.0"?>"#,
            r#"<one:Page xmlns:one="{ns}" ID="{page_id}" dateTime="{date}">"#,
            r#"<one:Title selected="partial" lang="en-US">"#,
            r#"<one:OE creationTime="{date}" lastModifiedTime="{date}">"#,
            r#"<one:T><![CDATA[{title}]]></one:T> </one:OE></one:Title>"#,
            "{attachments}",
            r#"<one:Outline><one:Meta name="{title}" content="{outline_id}"/>"#,
            r#"<one:OEChildren><one:HTMLBlock><one:Data><![CDATA[{body}]]></one:Data></one:HTMLBlock>"#,
            "{source}",
            "</one:OEChildren></one:Outline></one:Page>"
        ),
        ns = ONENOTE_NS,
        page_id = page_id,
        date = date,
        title = title,
        attachments = content.attachments,
        outline_id = outline_id,
        body = content.body,
        source = source,
    )
}
