//! OPML interchange: parsing subscription documents and serializing the
//! cache back out.
//!
//! Outlines carry `text`/`title` and `xmlUrl` plus custom per-feed
//! preference attributes (`openInBrowser`, `blockedWords`,
//! `showPreviewImages`). Unknown attributes are tolerated on parse; export
//! emits every known preference attribute that has a value.

use quick_xml::events::Event;
use quick_xml::Reader;
use thiserror::Error;

use crate::storage::{Feed, FeedPreferences};

/// Maximum allowed nesting depth for outline elements. Prevents stack
/// pressure from maliciously nested documents.
const MAX_OPML_DEPTH: usize = 50;

/// Errors that can occur during OPML handling.
#[derive(Debug, Error)]
pub enum OpmlError {
    /// Outline nesting depth exceeds the safety limit.
    #[error("OPML nesting depth exceeds maximum of {0} levels")]
    MaxDepthExceeded(usize),

    /// XML parsing or writing failed.
    #[error("XML error: {0}")]
    Xml(String),
}

/// One feed outline extracted from an OPML document: the subscription URL
/// plus whatever import-controlled preferences the document carried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outline {
    /// Display title, from `title` falling back to `text`, then to the URL.
    pub title: String,
    /// Feed URL from `xmlUrl`.
    pub xml_url: String,
    /// Website URL from `htmlUrl`, if present.
    pub html_url: Option<String>,
    /// Preference attributes; absent attributes stay `None` so import can
    /// merge non-destructively.
    pub prefs: FeedPreferences,
}

/// Parse an OPML document into feed outlines.
///
/// Handles nested and flat structures alike: any `<outline>` with an
/// `xmlUrl` attribute is a subscription, wherever it sits; grouping
/// outlines without one are traversed but not returned. Unknown attributes
/// are ignored.
pub fn parse_opml(content: &str) -> Result<Vec<Outline>, OpmlError> {
    let mut reader = Reader::from_str(content);
    reader.config_mut().trim_text(true);

    let mut outlines = Vec::new();
    let mut buf = Vec::new();
    let mut depth: usize = 0;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) if e.name().as_ref() == b"outline" => {
                depth += 1;
                if depth > MAX_OPML_DEPTH {
                    return Err(OpmlError::MaxDepthExceeded(MAX_OPML_DEPTH));
                }
                if let Some(outline) = parse_outline_attributes(&e, &reader)? {
                    outlines.push(outline);
                }
            }
            Ok(Event::Empty(e)) if e.name().as_ref() == b"outline" => {
                // Self-closing outline doesn't affect depth
                if let Some(outline) = parse_outline_attributes(&e, &reader)? {
                    outlines.push(outline);
                }
            }
            Ok(Event::End(e)) if e.name().as_ref() == b"outline" => {
                depth = depth.saturating_sub(1);
            }
            Ok(Event::Eof) => break,
            Err(e) => return Err(OpmlError::Xml(e.to_string())),
            _ => {}
        }
        buf.clear();
    }

    Ok(outlines)
}

fn parse_outline_attributes(
    e: &quick_xml::events::BytesStart<'_>,
    reader: &Reader<&[u8]>,
) -> Result<Option<Outline>, OpmlError> {
    let mut xml_url = None;
    let mut html_url = None;
    let mut title = None;
    let mut prefs = FeedPreferences::default();

    let decoder = reader.decoder();
    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed OPML attribute");
                continue;
            }
        };
        let value = attr
            .decode_and_unescape_value(decoder)
            .map_err(|e| OpmlError::Xml(e.to_string()))?;
        match attr.key.as_ref() {
            b"xmlUrl" => xml_url = Some(value.to_string()),
            b"htmlUrl" => html_url = Some(value.to_string()),
            b"title" => title = Some(value.to_string()),
            b"text" => {
                if title.is_none() {
                    title = Some(value.to_string());
                }
            }
            b"openInBrowser" => prefs.open_entries_in_browser = parse_bool(&value),
            b"blockedWords" => {
                if !value.is_empty() {
                    prefs.blocked_words = Some(value.to_string());
                }
            }
            b"showPreviewImages" => prefs.show_preview_images = parse_bool(&value),
            _ => {}
        }
    }

    Ok(xml_url.map(|url| Outline {
        title: title.unwrap_or_else(|| url.clone()),
        xml_url: url,
        html_url,
        prefs,
    }))
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

/// Serialize feeds as an OPML 2.0 document. Pure: reads its input, touches
/// nothing.
pub fn export_opml(feeds: &[Feed]) -> Result<String, OpmlError> {
    use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
    use quick_xml::Writer;
    use std::io::Cursor;

    fn xml_err(e: impl std::fmt::Display) -> OpmlError {
        OpmlError::Xml(e.to_string())
    }

    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    writer
        .write_event(Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)))
        .map_err(xml_err)?;

    let mut opml = BytesStart::new("opml");
    opml.push_attribute(("version", "2.0"));
    writer.write_event(Event::Start(opml)).map_err(xml_err)?;

    writer
        .write_event(Event::Start(BytesStart::new("head")))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Start(BytesStart::new("title")))
        .map_err(xml_err)?;
    writer
        .write_event(Event::Text(BytesText::new("lede subscriptions")))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("title")))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("head")))
        .map_err(xml_err)?;

    writer
        .write_event(Event::Start(BytesStart::new("body")))
        .map_err(xml_err)?;

    for feed in feeds {
        let mut outline = BytesStart::new("outline");
        outline.push_attribute(("type", "rss"));
        outline.push_attribute(("text", feed.title.as_str()));
        outline.push_attribute(("title", feed.title.as_str()));
        outline.push_attribute(("xmlUrl", feed.self_link.as_str()));
        if let Some(alternate) = &feed.alternate_link {
            outline.push_attribute(("htmlUrl", alternate.as_str()));
        }
        outline.push_attribute((
            "openInBrowser",
            if feed.open_entries_in_browser {
                "true"
            } else {
                "false"
            },
        ));
        if let Some(blocked) = &feed.blocked_words {
            outline.push_attribute(("blockedWords", blocked.as_str()));
        }
        if let Some(show) = feed.show_preview_images {
            outline.push_attribute(("showPreviewImages", if show { "true" } else { "false" }));
        }
        writer.write_event(Event::Empty(outline)).map_err(xml_err)?;
    }

    writer
        .write_event(Event::End(BytesEnd::new("body")))
        .map_err(xml_err)?;
    writer
        .write_event(Event::End(BytesEnd::new("opml")))
        .map_err(xml_err)?;

    let result = writer.into_inner().into_inner();
    String::from_utf8(result).map_err(xml_err)
}
