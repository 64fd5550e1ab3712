//! Exclusive XML Canonicalization 1.0 (without comments, empty prefix list).
//!
//! Works on a standalone fragment with exactly one root element, which is how
//! the envelope builder signs `Timestamp` and `SignedInfo` before embedding them.

use super::{local_part, XmlError};
use crate::error::{KpsError, KpsResult};
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Canonical bytes of `fragment`. Identical input always yields identical output.
pub fn canonicalize(fragment: &str) -> KpsResult<Vec<u8>> {
    let normalized = fragment.trim().replace("\r\n", "\n").replace('\r', "\n");
    Canonicalizer::default()
        .run(&normalized)
        .map(String::into_bytes)
        .map_err(|e| KpsError::MalformedFragment(e.to_string()))
}

#[derive(Default)]
struct Canonicalizer {
    out: String,
    /// Declarations present in the input, one frame per open element.
    declared: Vec<Vec<(String, String)>>,
    /// Declarations written to the output, one frame per open element.
    rendered: Vec<Vec<(String, String)>>,
    roots: usize,
}

impl Canonicalizer {
    fn run(mut self, xml: &str) -> Result<String, XmlError> {
        let mut reader = Reader::from_str(xml);
        loop {
            match reader.read_event()? {
                Event::Start(start) => self.open(&start)?,
                Event::Empty(start) => {
                    self.open(&start)?;
                    let name = std::str::from_utf8(start.name().as_ref())?.to_string();
                    self.close(&name);
                }
                Event::End(end) => {
                    let name = std::str::from_utf8(end.name().as_ref())?.to_string();
                    self.close(&name);
                }
                Event::Text(text) => {
                    if self.depth() > 0 {
                        let value = text.unescape()?;
                        push_text(&mut self.out, &value);
                    } else if !text.iter().all(u8::is_ascii_whitespace) {
                        return Err(XmlError::new("text outside the root element"));
                    }
                }
                Event::CData(data) => {
                    if self.depth() == 0 {
                        return Err(XmlError::new("CDATA outside the root element"));
                    }
                    let raw = data.into_inner();
                    push_text(&mut self.out, std::str::from_utf8(&raw)?);
                }
                Event::PI(pi) => {
                    if self.depth() > 0 {
                        push_pi(&mut self.out, std::str::from_utf8(&pi)?);
                    }
                }
                Event::Eof => break,
                // declaration, doctype and comments are not part of the canonical form
                _ => {}
            }
        }

        if self.depth() != 0 {
            return Err(XmlError::new("unclosed element at end of fragment"));
        }
        if self.roots != 1 {
            return Err(XmlError::new(format!(
                "expected exactly one root element, found {}",
                self.roots
            )));
        }
        Ok(self.out)
    }

    fn depth(&self) -> usize {
        self.declared.len()
    }

    fn open(&mut self, start: &BytesStart<'_>) -> Result<(), XmlError> {
        if self.depth() == 0 && self.roots > 0 {
            return Err(XmlError::new("more than one root element"));
        }
        let qname = std::str::from_utf8(start.name().as_ref())?.to_string();

        let mut declarations = Vec::new();
        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr?;
            let key = std::str::from_utf8(attr.key.as_ref())?.to_string();
            let value = attribute_value(&attr.value)?;
            if key == "xmlns" {
                declarations.push((String::new(), value));
            } else if let Some(prefix) = key.strip_prefix("xmlns:") {
                declarations.push((prefix.to_string(), value));
            } else {
                attributes.push((key, value));
            }
        }
        self.declared.push(declarations);

        // prefixes visibly utilized by this element and its attributes
        let mut utilized = vec![prefix_of(&qname).to_string()];
        for (key, _) in &attributes {
            let prefix = prefix_of(key);
            if !prefix.is_empty() && !utilized.iter().any(|p| p == prefix) {
                utilized.push(prefix.to_string());
            }
        }

        let mut namespaces = Vec::new();
        for prefix in utilized {
            if prefix == "xml" {
                continue;
            }
            let uri = match self.resolve(&prefix) {
                Some(uri) => uri.to_string(),
                None if prefix.is_empty() => String::new(),
                None => return Err(XmlError::new(format!("undeclared prefix '{prefix}'"))),
            };
            let already = self.rendered_binding(&prefix);
            let needs_render = if prefix.is_empty() {
                already.unwrap_or("") != uri
            } else {
                already != Some(uri.as_str())
            };
            if needs_render {
                namespaces.push((prefix, uri));
            }
        }
        namespaces.sort();

        let mut keyed = Vec::with_capacity(attributes.len());
        for (key, value) in attributes {
            let prefix = prefix_of(&key);
            let uri = match prefix {
                "" => String::new(),
                "xml" => XML_NS.to_string(),
                p => self
                    .resolve(p)
                    .ok_or_else(|| XmlError::new(format!("undeclared prefix '{p}'")))?
                    .to_string(),
            };
            let local = local_part(&key).to_string();
            keyed.push(((uri, local), key, value));
        }
        keyed.sort_by(|a, b| a.0.cmp(&b.0));

        self.out.push('<');
        self.out.push_str(&qname);
        for (prefix, uri) in &namespaces {
            if prefix.is_empty() {
                self.out.push_str(" xmlns=\"");
            } else {
                self.out.push_str(" xmlns:");
                self.out.push_str(prefix);
                self.out.push_str("=\"");
            }
            push_attr(&mut self.out, uri);
            self.out.push('"');
        }
        for (_, key, value) in &keyed {
            self.out.push(' ');
            self.out.push_str(key);
            self.out.push_str("=\"");
            push_attr(&mut self.out, value);
            self.out.push('"');
        }
        self.out.push('>');
        self.rendered.push(namespaces);
        Ok(())
    }

    fn close(&mut self, qname: &str) {
        self.out.push_str("</");
        self.out.push_str(qname);
        self.out.push('>');
        self.declared.pop();
        self.rendered.pop();
        if self.depth() == 0 {
            self.roots += 1;
        }
    }

    fn resolve(&self, prefix: &str) -> Option<&str> {
        lookup(&self.declared, prefix)
    }

    fn rendered_binding(&self, prefix: &str) -> Option<&str> {
        lookup(&self.rendered, prefix)
    }
}

fn lookup<'a>(frames: &'a [Vec<(String, String)>], prefix: &str) -> Option<&'a str> {
    frames
        .iter()
        .rev()
        .flat_map(|frame| frame.iter())
        .find(|(p, _)| p == prefix)
        .map(|(_, uri)| uri.as_str())
}

fn prefix_of(qname: &str) -> &str {
    qname.split_once(':').map_or("", |(prefix, _)| prefix)
}

/// Attribute-value normalization: literal whitespace becomes a space, then
/// references are resolved.
fn attribute_value(raw: &[u8]) -> Result<String, XmlError> {
    let raw = std::str::from_utf8(raw)?;
    let spaced: String = raw
        .chars()
        .map(|c| if matches!(c, '\t' | '\n' | '\r') { ' ' } else { c })
        .collect();
    Ok(quick_xml::escape::unescape(&spaced)?.into_owned())
}

/// `<?target data?>` with exactly one space before non-empty data; the data keeps
/// its trailing whitespace.
fn push_pi(out: &mut String, raw: &str) {
    let (target, data) = match raw.find(|c: char| c.is_ascii_whitespace()) {
        Some(at) => (&raw[..at], raw[at..].trim_start()),
        None => (raw, ""),
    };
    out.push_str("<?");
    out.push_str(target);
    if !data.is_empty() {
        out.push(' ');
        out.push_str(data);
    }
    out.push_str("?>");
}

fn push_text(out: &mut String, text: &str) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
}

fn push_attr(out: &mut String, value: &str) {
    for c in value.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '"' => out.push_str("&quot;"),
            '\t' => out.push_str("&#x9;"),
            '\n' => out.push_str("&#xA;"),
            '\r' => out.push_str("&#xD;"),
            c => out.push(c),
        }
    }
}
