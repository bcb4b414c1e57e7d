//! Streaming access to the placemarks of a KML document.
//!
//! The document is pulled event by event. Only `Placemark` sub-trees are
//! materialized, each into a small owned [`Element`] tree that is handed out
//! as soon as its closing tag is read.

use quick_xml::encoding::Decoder;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::{Namespace, ResolveResult};
use quick_xml::NsReader;
use std::io::BufRead;

use crate::error::ExtractError;

pub const KML_NAMESPACE: &[u8] = b"http://www.opengis.net/kml/2.2";

const PLACEMARK: &str = "Placemark";

/// An owned element of a placemark sub-tree.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Element {
    pub name: String,
    /// Bound to the KML 2.2 namespace.
    pub kml: bool,
    pub attributes: Vec<(String, String)>,
    pub text: String,
    pub children: Vec<Element>,
    /// First decoding problem seen while reading this element.
    pub malformed: Option<String>,
}

impl Element {
    fn from_start(start: &BytesStart<'_>, kml: bool, decoder: Decoder) -> Self {
        let mut element = Element {
            name: String::from_utf8_lossy(start.local_name().as_ref()).into_owned(),
            kml,
            ..Default::default()
        };

        for attr in start.attributes() {
            let decoded = attr.map_err(|e| e.to_string()).and_then(|attr| {
                let key = String::from_utf8_lossy(attr.key.local_name().as_ref()).into_owned();
                attr.decode_and_unescape_value(decoder)
                    .map(|value| (key, value.into_owned()))
                    .map_err(|e| e.to_string())
            });
            match decoded {
                Ok(pair) => element.attributes.push(pair),
                Err(reason) => {
                    element.malformed.get_or_insert(reason);
                }
            }
        }

        element
    }

    /// True for a KML-namespaced element with the given local name.
    pub fn is(&self, name: &str) -> bool {
        self.kml && self.name == name
    }

    /// First matching descendant in document order.
    pub fn find(&self, name: &str) -> Option<&Element> {
        self.children.iter().find_map(|child| {
            if child.is(name) {
                Some(child)
            } else {
                child.find(name)
            }
        })
    }

    /// All matching descendants in document order.
    pub fn find_all<'a>(&'a self, name: &str) -> Vec<&'a Element> {
        let mut found = Vec::new();
        self.collect_matching(name, &mut found);
        found
    }

    fn collect_matching<'a>(&'a self, name: &str, found: &mut Vec<&'a Element>) {
        for child in &self.children {
            if child.is(name) {
                found.push(child);
            }
            child.collect_matching(name, found);
        }
    }

    pub fn child(&self, name: &str) -> Option<&Element> {
        self.children.iter().find(|child| child.is(name))
    }

    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// The first decoding problem anywhere in this sub-tree.
    pub fn malformed(&self) -> Option<&str> {
        self.malformed
            .as_deref()
            .or_else(|| self.children.iter().find_map(Element::malformed))
    }
}

enum Step {
    Open(Element),
    Leaf(Element),
    Close,
    Text(Result<String, String>),
    Eof,
    Skip,
}

/// Iterator over the placemark sub-trees of a KML document.
///
/// Yields an error and then stops if the document itself is not well-formed.
pub struct PlacemarkReader<R> {
    reader: NsReader<R>,
    buf: Vec<u8>,
    depth: usize,
    seen_root: bool,
    open: Vec<Element>,
    finished: bool,
}

impl<R: BufRead> PlacemarkReader<R> {
    pub fn new(source: R) -> Self {
        Self {
            reader: NsReader::from_reader(source),
            buf: Vec::new(),
            depth: 0,
            seen_root: false,
            open: Vec::new(),
            finished: false,
        }
    }

    fn next_step(&mut self) -> Result<Step, ExtractError> {
        let position = self.reader.buffer_position() as u64;
        let (ns, event) = self
            .reader
            .read_resolved_event_into(&mut self.buf)
            .map_err(|source| ExtractError::Parse { position, source })?;
        let kml = matches!(ns, ResolveResult::Bound(Namespace(uri)) if uri == KML_NAMESPACE);
        // Follows the encoding named in the XML declaration once it is read.
        let decoder = self.reader.decoder();

        let step = match event {
            Event::Start(start) => Step::Open(Element::from_start(&start, kml, decoder)),
            Event::Empty(start) => Step::Leaf(Element::from_start(&start, kml, decoder)),
            Event::End(_) => Step::Close,
            Event::Text(text) => Step::Text(
                text.unescape()
                    .map(|t| t.into_owned())
                    .map_err(|e| e.to_string()),
            ),
            Event::CData(cdata) => Step::Text(
                decoder
                    .decode(&cdata)
                    .map(|t| t.into_owned())
                    .map_err(|e| e.to_string()),
            ),
            Event::Eof => Step::Eof,
            _ => Step::Skip,
        };
        self.buf.clear();
        Ok(step)
    }

    fn structure_error(&self, reason: impl Into<String>) -> ExtractError {
        ExtractError::Structure {
            position: self.reader.buffer_position() as u64,
            reason: reason.into(),
        }
    }

    fn advance(&mut self) -> Result<Option<Element>, ExtractError> {
        loop {
            match self.next_step()? {
                Step::Open(element) => {
                    self.depth += 1;
                    self.seen_root = true;
                    if !self.open.is_empty() || element.is(PLACEMARK) {
                        self.open.push(element);
                    }
                }
                Step::Leaf(element) => {
                    self.seen_root = true;
                    if let Some(parent) = self.open.last_mut() {
                        parent.children.push(element);
                    } else if element.is(PLACEMARK) {
                        return Ok(Some(element));
                    }
                }
                Step::Close => {
                    self.depth = self.depth.saturating_sub(1);
                    if let Some(element) = self.open.pop() {
                        match self.open.last_mut() {
                            Some(parent) => parent.children.push(element),
                            None => return Ok(Some(element)),
                        }
                    }
                }
                Step::Text(Ok(text)) => {
                    if let Some(current) = self.open.last_mut() {
                        current.text.push_str(&text);
                    }
                }
                Step::Text(Err(reason)) => match self.open.last_mut() {
                    Some(current) => {
                        current.malformed.get_or_insert(reason);
                    }
                    None => return Err(self.structure_error(reason)),
                },
                Step::Eof => {
                    if self.depth > 0 {
                        return Err(self.structure_error(format!(
                            "unexpected end of document with {} unclosed element(s)",
                            self.depth
                        )));
                    }
                    if !self.seen_root {
                        return Err(self.structure_error("document has no root element"));
                    }
                    return Ok(None);
                }
                Step::Skip => {}
            }
        }
    }
}

impl<R: BufRead> Iterator for PlacemarkReader<R> {
    type Item = Result<Element, ExtractError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.advance() {
            Ok(Some(element)) => Some(Ok(element)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(e) => {
                self.finished = true;
                Some(Err(e))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn placemarks(doc: &str) -> Vec<Result<Element, ExtractError>> {
        PlacemarkReader::new(doc.as_bytes()).collect()
    }

    #[test]
    fn test_yields_each_placemark() {
        let doc = r#"<?xml version="1.0" encoding="UTF-8"?>
<kml xmlns="http://www.opengis.net/kml/2.2">
  <Document>
    <Folder>
      <Placemark><name>a</name></Placemark>
      <Placemark><name>b</name></Placemark>
    </Folder>
    <Placemark><name>c</name></Placemark>
  </Document>
</kml>"#;
        let names: Vec<String> = placemarks(doc)
            .into_iter()
            .map(|p| p.unwrap().find("name").unwrap().text.clone())
            .collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_ignores_foreign_namespace() {
        let doc = r#"<kml xmlns="http://www.opengis.net/kml/2.2" xmlns:x="urn:other">
  <x:Placemark><name>skip</name></x:Placemark>
  <Placemark><name>keep</name></Placemark>
</kml>"#;
        let found = placemarks(doc);
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].as_ref().unwrap().find("name").unwrap().text, "keep");
    }

    #[test]
    fn test_unprefixed_document_has_no_placemarks() {
        let doc = "<kml><Placemark><name>a</name></Placemark></kml>";
        assert!(placemarks(doc).is_empty());
    }

    #[test]
    fn test_keeps_cdata_and_attributes() {
        let doc = r#"<kml xmlns="http://www.opengis.net/kml/2.2"><Placemark>
  <description><![CDATA[<b>bold</b>]]></description>
  <ExtendedData><Data name="speed"><value>12</value></Data></ExtendedData>
</Placemark></kml>"#;
        let placemark = placemarks(doc).remove(0).unwrap();
        assert_eq!(placemark.find("description").unwrap().text, "<b>bold</b>");
        let data = placemark.find_all("Data");
        assert_eq!(data.len(), 1);
        assert_eq!(data[0].attribute("name"), Some("speed"));
        assert_eq!(data[0].child("value").unwrap().text, "12");
    }

    #[test]
    fn test_empty_placemark_element() {
        let doc = r#"<kml xmlns="http://www.opengis.net/kml/2.2"><Placemark/></kml>"#;
        let found = placemarks(doc);
        assert_eq!(found.len(), 1);
        assert!(found[0].as_ref().unwrap().children.is_empty());
    }

    #[test]
    fn test_bad_entity_marks_placemark_malformed() {
        let doc = r#"<kml xmlns="http://www.opengis.net/kml/2.2">
  <Placemark><name>a &bogus; b</name></Placemark>
  <Placemark><name>fine</name></Placemark>
</kml>"#;
        let found = placemarks(doc);
        assert_eq!(found.len(), 2);
        assert!(found[0].as_ref().unwrap().malformed().is_some());
        assert!(found[1].as_ref().unwrap().malformed().is_none());
    }

    #[test]
    fn test_declared_latin1_encoding_is_decoded() {
        let mut doc = br#"<?xml version="1.0" encoding="ISO-8859-1"?>
<kml xmlns="http://www.opengis.net/kml/2.2"><Placemark><name>M"#
            .to_vec();
        doc.push(0xFC);
        doc.extend_from_slice(br#"nchen</name><ExtendedData><Data name="Stra"#);
        doc.push(0xDF);
        doc.extend_from_slice(br#"e"><value>x</value></Data></ExtendedData></Placemark></kml>"#);

        let found: Vec<_> = PlacemarkReader::new(doc.as_slice()).collect();
        assert_eq!(found.len(), 1);
        let placemark = found[0].as_ref().unwrap();
        assert!(placemark.malformed().is_none());
        assert_eq!(placemark.find("name").unwrap().text, "M\u{fc}nchen");
        assert_eq!(placemark.find("Data").unwrap().attribute("name"), Some("Stra\u{df}e"));
    }

    #[test]
    fn test_mismatched_tags_are_fatal() {
        let doc = r#"<kml xmlns="http://www.opengis.net/kml/2.2"><Placemark><name>a</Placemark></kml>"#;
        let found = placemarks(doc);
        assert!(matches!(found.last(), Some(Err(ExtractError::Parse { .. }))));
    }

    #[test]
    fn test_truncated_document_is_fatal() {
        let doc = r#"<kml xmlns="http://www.opengis.net/kml/2.2"><Document><Placemark><name>a</name></Placemark>"#;
        let found = placemarks(doc);
        assert_eq!(found.len(), 2);
        assert!(found[0].is_ok());
        assert!(matches!(
            found[1],
            Err(ExtractError::Structure { .. }) | Err(ExtractError::Parse { .. })
        ));
    }

    #[test]
    fn test_empty_document_is_fatal() {
        let found = placemarks("");
        assert!(matches!(found.as_slice(), [Err(ExtractError::Structure { .. })]));
    }
}
