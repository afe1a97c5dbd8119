//! Sitemap XML parsing
//!
//! Element names are matched on their local part, so documents that declare
//! the sitemaps.org namespace with or without a prefix parse the same way.

use super::{ChangeFrequency, DiscoveredUrl, SitemapError};
use quick_xml::events::Event;
use quick_xml::Reader;
use tracing::debug;

/// A parsed sitemap document
#[derive(Debug, Clone, PartialEq)]
pub enum SitemapDocument {
    /// `<sitemapindex>`: child sitemap locations in document order
    Index(Vec<String>),
    /// `<urlset>`: page entries in document order
    UrlSet(Vec<DiscoveredUrl>),
}

impl SitemapDocument {
    pub fn len(&self) -> usize {
        match self {
            SitemapDocument::Index(children) => children.len(),
            SitemapDocument::UrlSet(entries) => entries.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RootKind {
    Index,
    UrlSet,
}

impl RootKind {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"sitemapindex" => Some(RootKind::Index),
            b"urlset" => Some(RootKind::UrlSet),
            _ => None,
        }
    }

    fn entry_name(&self) -> &'static [u8] {
        match self {
            RootKind::Index => b"sitemap",
            RootKind::UrlSet => b"url",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Field {
    Loc,
    LastMod,
    ChangeFreq,
    Priority,
}

impl Field {
    fn from_name(name: &[u8]) -> Option<Self> {
        match name {
            b"loc" => Some(Field::Loc),
            b"lastmod" => Some(Field::LastMod),
            b"changefreq" => Some(Field::ChangeFreq),
            b"priority" => Some(Field::Priority),
            _ => None,
        }
    }
}

/// Text collected for the entry currently being read
#[derive(Debug, Default)]
struct EntryText {
    loc: String,
    last_modified: String,
    change_freq: String,
    priority: String,
}

impl EntryText {
    fn push(&mut self, field: Field, text: &str) {
        let target = match field {
            Field::Loc => &mut self.loc,
            Field::LastMod => &mut self.last_modified,
            Field::ChangeFreq => &mut self.change_freq,
            Field::Priority => &mut self.priority,
        };
        target.push_str(text);
    }

    fn loc(&self) -> Option<String> {
        non_empty(&self.loc)
    }

    fn into_discovered(self) -> Option<DiscoveredUrl> {
        let loc = self.loc()?;

        let change_freq = non_empty(&self.change_freq).and_then(|value| {
            let parsed = ChangeFrequency::parse(&value);
            if parsed.is_none() {
                debug!(%loc, %value, "ignoring unknown changefreq");
            }
            parsed
        });

        let priority = non_empty(&self.priority).and_then(|value| {
            let parsed = value
                .parse::<f64>()
                .ok()
                .filter(|p| (0.0..=1.0).contains(p));
            if parsed.is_none() {
                debug!(%loc, %value, "ignoring invalid priority");
            }
            parsed
        });

        Some(DiscoveredUrl {
            loc,
            last_modified: non_empty(&self.last_modified),
            change_freq,
            priority,
        })
    }
}

fn non_empty(value: &str) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

/// Parse a sitemap or sitemap-index body.
///
/// `url` is only used to label errors. Entries without a `<loc>` are skipped.
pub fn parse_document(url: &str, body: &[u8]) -> Result<SitemapDocument, SitemapError> {
    let parse_error = |message: String| SitemapError::Parse {
        url: url.to_string(),
        message,
    };

    let mut reader = Reader::from_reader(body);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();

    let mut root: Option<RootKind> = None;
    let mut root_closed = false;
    let mut depth = 0usize;
    let mut entry: Option<EntryText> = None;
    let mut field: Option<Field> = None;

    let mut children = Vec::new();
    let mut entries = Vec::new();
    let mut skipped = 0usize;

    loop {
        let event = match reader.read_event_into(&mut buf) {
            Ok(event) => event,
            Err(e) => {
                return Err(parse_error(format!(
                    "{} at byte {}",
                    e,
                    reader.buffer_position()
                )))
            }
        };

        match event {
            Event::Start(ref e) | Event::Empty(ref e) if depth == 0 => {
                if root_closed {
                    return Err(parse_error("multiple root elements".to_string()));
                }
                let name = e.local_name();
                let kind = RootKind::from_name(name.as_ref()).ok_or_else(|| {
                    parse_error(format!(
                        "unrecognized root element <{}>",
                        String::from_utf8_lossy(name.as_ref())
                    ))
                })?;
                root = Some(kind);
                if matches!(event, Event::Start(_)) {
                    depth += 1;
                } else {
                    root_closed = true;
                }
            }
            Event::Start(ref e) => {
                let name = e.local_name();
                match (depth, root) {
                    (1, Some(kind)) if name.as_ref() == kind.entry_name() => {
                        entry = Some(EntryText::default());
                    }
                    (2, _) if entry.is_some() => field = Field::from_name(name.as_ref()),
                    _ => {}
                }
                depth += 1;
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                match depth {
                    0 => root_closed = true,
                    1 => {
                        if let Some(text) = entry.take() {
                            let before = children.len() + entries.len();
                            match root {
                                Some(RootKind::Index) => children.extend(text.loc()),
                                Some(RootKind::UrlSet) => entries.extend(text.into_discovered()),
                                None => {}
                            }
                            if children.len() + entries.len() == before {
                                skipped += 1;
                            }
                        }
                    }
                    2 => field = None,
                    _ => {}
                }
            }
            Event::Text(ref e) if depth == 0 => {
                if !e.iter().all(u8::is_ascii_whitespace) {
                    return Err(parse_error("text outside the root element".to_string()));
                }
            }
            Event::CData(_) if depth == 0 => {
                return Err(parse_error("text outside the root element".to_string()));
            }
            Event::Text(ref e) if depth == 3 => {
                if let (Some(text), Some(field)) = (entry.as_mut(), field) {
                    let value = e
                        .unescape()
                        .map_err(|err| parse_error(err.to_string()))?;
                    text.push(field, &value);
                }
            }
            Event::CData(ref e) if depth == 3 => {
                if let (Some(text), Some(field)) = (entry.as_mut(), field) {
                    text.push(field, &String::from_utf8_lossy(e));
                }
            }
            Event::Eof => break,
            _ => {}
        }

        buf.clear();
    }

    if depth != 0 {
        return Err(parse_error("unexpected end of document".to_string()));
    }

    let root = root.ok_or_else(|| parse_error("document has no root element".to_string()))?;

    if skipped > 0 {
        debug!(%url, skipped, "skipped sitemap entries without <loc>");
    }

    Ok(match root {
        RootKind::Index => SitemapDocument::Index(children),
        RootKind::UrlSet => SitemapDocument::UrlSet(entries),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const URL: &str = "https://ex.com/sitemap.xml";

    fn parse(xml: &str) -> Result<SitemapDocument, SitemapError> {
        parse_document(URL, xml.as_bytes())
    }

    #[test]
    fn test_parse_urlset_metadata() {
        let xml = r#"<?xml version="1.0" encoding="UTF-8"?>
<urlset xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <url>
    <loc> https://ex.com/a?x=1&amp;y=2 </loc>
    <lastmod>2024-05-01</lastmod>
    <changefreq>Weekly</changefreq>
    <priority>0.8</priority>
  </url>
  <url>
    <loc>https://ex.com/b</loc>
  </url>
</urlset>"#;

        let SitemapDocument::UrlSet(entries) = parse(xml).unwrap() else {
            panic!("expected urlset");
        };

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].loc, "https://ex.com/a?x=1&y=2");
        assert_eq!(entries[0].last_modified.as_deref(), Some("2024-05-01"));
        assert_eq!(entries[0].change_freq, Some(ChangeFrequency::Weekly));
        assert_eq!(entries[0].priority, Some(0.8));
        assert_eq!(entries[1], DiscoveredUrl::new("https://ex.com/b"));
    }

    #[test]
    fn test_parse_index() {
        let xml = r#"<sitemapindex xmlns="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sitemap><loc>https://ex.com/a.xml</loc><lastmod>2024-01-01</lastmod></sitemap>
  <sitemap><loc>https://ex.com/b.xml.gz</loc></sitemap>
</sitemapindex>"#;

        assert_eq!(
            parse(xml).unwrap(),
            SitemapDocument::Index(vec![
                "https://ex.com/a.xml".to_string(),
                "https://ex.com/b.xml.gz".to_string(),
            ])
        );
    }

    #[test]
    fn test_prefixed_namespace() {
        let xml = r#"<sm:urlset xmlns:sm="http://www.sitemaps.org/schemas/sitemap/0.9">
  <sm:url><sm:loc>https://ex.com/a</sm:loc></sm:url>
</sm:urlset>"#;

        assert_eq!(parse(xml).unwrap().len(), 1);
    }

    #[test]
    fn test_entries_without_loc_are_skipped() {
        let xml = r#"<urlset>
  <url><lastmod>2024-01-01</lastmod></url>
  <url><loc>   </loc></url>
  <url/>
  <url><loc>https://ex.com/kept</loc></url>
</urlset>"#;

        let SitemapDocument::UrlSet(entries) = parse(xml).unwrap() else {
            panic!("expected urlset");
        };
        assert_eq!(entries, vec![DiscoveredUrl::new("https://ex.com/kept")]);
    }

    #[test]
    fn test_invalid_metadata_is_dropped() {
        let xml = r#"<urlset><url>
  <loc>https://ex.com/a</loc>
  <changefreq>sometimes</changefreq>
  <priority>7</priority>
</url></urlset>"#;

        let SitemapDocument::UrlSet(entries) = parse(xml).unwrap() else {
            panic!("expected urlset");
        };
        assert_eq!(entries[0].change_freq, None);
        assert_eq!(entries[0].priority, None);
    }

    #[test]
    fn test_cdata_loc() {
        let xml = "<urlset><url><loc><![CDATA[https://ex.com/c]]></loc></url></urlset>";
        assert_eq!(
            parse(xml).unwrap(),
            SitemapDocument::UrlSet(vec![DiscoveredUrl::new("https://ex.com/c")])
        );
    }

    #[test]
    fn test_nested_extension_elements_ignored() {
        let xml = r#"<urlset xmlns:image="http://www.google.com/schemas/sitemap-image/1.1">
  <url>
    <loc>https://ex.com/a</loc>
    <image:image><image:loc>https://ex.com/a.png</image:loc></image:image>
  </url>
</urlset>"#;

        assert_eq!(
            parse(xml).unwrap(),
            SitemapDocument::UrlSet(vec![DiscoveredUrl::new("https://ex.com/a")])
        );
    }

    #[test]
    fn test_empty_documents() {
        assert!(parse("<sitemapindex/>").unwrap().is_empty());
        assert!(parse("<urlset></urlset>").unwrap().is_empty());
    }

    #[test]
    fn test_malformed_xml() {
        assert!(matches!(
            parse("<urlset><url><loc>x</url></urlset>"),
            Err(SitemapError::Parse { .. })
        ));
        assert!(matches!(
            parse("<urlset><url>"),
            Err(SitemapError::Parse { .. })
        ));
        assert!(matches!(parse("not xml at all"), Err(SitemapError::Parse { .. })));
        assert!(matches!(parse(""), Err(SitemapError::Parse { .. })));
    }

    #[test]
    fn test_text_outside_root() {
        let trailing = parse("<urlset><url><loc>https://a</loc></url></urlset>trailing").unwrap_err();
        assert!(matches!(trailing, SitemapError::Parse { .. }));
        assert!(trailing.to_string().contains("text outside the root element"));

        assert!(matches!(
            parse("junk<urlset></urlset>"),
            Err(SitemapError::Parse { .. })
        ));
        assert!(matches!(
            parse("<urlset></urlset><![CDATA[x]]>"),
            Err(SitemapError::Parse { .. })
        ));
        assert!(parse("<?xml version=\"1.0\"?>\n<urlset></urlset>\n").is_ok());
    }

    #[test]
    fn test_unrecognized_root() {
        let err = parse("<html><body/></html>").unwrap_err();
        assert!(err.to_string().contains("unrecognized root element <html>"));
    }
}
