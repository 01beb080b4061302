//! Minimal reader for `207 Multi-Status` PROPFIND replies.

use crate::error::Result;
use chrono::{DateTime, Utc};
use quick_xml::events::Event;
use quick_xml::Reader;

pub const REQUEST_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:">
  <d:prop>
    <d:getlastmodified/>
    <d:resourcetype/>
  </d:prop>
</d:propfind>"#;

#[derive(Debug, Default, Clone, PartialEq)]
pub struct PropEntry {
    // Still percent-encoded.
    pub href: String,
    pub last_modified: Option<DateTime<Utc>>,
    pub is_collection: bool,
}

#[derive(Clone, Copy)]
enum Field {
    Href,
    LastModified,
}

pub fn parse_multistatus(xml: &str) -> Result<Vec<PropEntry>> {
    let mut reader = Reader::from_str(xml);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<PropEntry> = None;
    let mut field: Option<Field> = None;

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"response" => current = Some(PropEntry::default()),
                b"href" => field = Some(Field::Href),
                b"getlastmodified" => field = Some(Field::LastModified),
                b"collection" => {
                    if let Some(entry) = current.as_mut() {
                        entry.is_collection = true;
                    }
                }
                _ => {}
            },
            Event::Empty(e) => {
                if e.local_name().as_ref() == b"collection" {
                    if let Some(entry) = current.as_mut() {
                        entry.is_collection = true;
                    }
                }
            }
            Event::Text(t) => {
                let text = t.unescape()?;
                if let (Some(entry), Some(f)) = (current.as_mut(), field) {
                    match f {
                        Field::Href => entry.href.push_str(&text),
                        Field::LastModified => {
                            entry.last_modified = DateTime::parse_from_rfc2822(text.trim())
                                .ok()
                                .map(|t| t.with_timezone(&Utc));
                        }
                    }
                }
            }
            Event::End(e) => match e.local_name().as_ref() {
                b"response" => {
                    if let Some(entry) = current.take() {
                        entries.push(entry);
                    }
                }
                b"href" | b"getlastmodified" => field = None,
                _ => {}
            },
            Event::Eof => break,
            _ => {}
        }
    }

    Ok(entries)
}
