//! Minimal XML walking on top of quick-xml
//!
//! Service documents (UWS job lists, VOTables, VOSI table sets) are read by
//! small state machines that only care about local element names, attribute
//! values and text. `walk` flattens quick-xml events into that shape:
//! namespace prefixes are dropped and empty elements produce an `Open`
//! immediately followed by a `Close`.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};

/// Flattened XML event
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Node {
    Open {
        name: String,
        attributes: Vec<(String, String)>,
    },
    Text(String),
    Close(String),
}

/// Value of the attribute with local name `name`
pub(crate) fn attribute<'a>(attributes: &'a [(String, String)], name: &str) -> Option<&'a str> {
    attributes
        .iter()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.as_str())
}

/// Feed every node of `document` to `visit`, stopping at the first error
pub(crate) fn walk<F>(document: &[u8], mut visit: F) -> Result<(), String>
where
    F: FnMut(Node) -> Result<(), String>,
{
    let mut reader = Reader::from_reader(document);
    reader.config_mut().trim_text(true);
    let mut buf = Vec::new();
    let mut depth = 0usize;
    let mut seen_root = false;

    loop {
        let event = reader
            .read_event_into(&mut buf)
            .map_err(|e| format!("XML error at byte {}: {}", reader.buffer_position(), e))?;

        match event {
            Event::Start(start) => {
                let name = local_name(start.local_name().as_ref());
                visit(Node::Open {
                    attributes: attributes(&start)?,
                    name,
                })?;
                depth += 1;
                seen_root = true;
            }
            Event::Empty(start) => {
                let name = local_name(start.local_name().as_ref());
                visit(Node::Open {
                    attributes: attributes(&start)?,
                    name: name.clone(),
                })?;
                visit(Node::Close(name))?;
                seen_root = true;
            }
            Event::End(end) => {
                depth = depth.saturating_sub(1);
                visit(Node::Close(local_name(end.local_name().as_ref())))?;
            }
            Event::Text(text) => {
                let text = text.unescape().map_err(|e| e.to_string())?;
                if !text.is_empty() {
                    visit(Node::Text(text.into_owned()))?;
                }
            }
            Event::CData(data) => {
                visit(Node::Text(String::from_utf8_lossy(&data).into_owned()))?;
            }
            Event::Eof => {
                if !seen_root {
                    return Err("document has no root element".to_string());
                }
                if depth != 0 {
                    return Err("document ended inside an element".to_string());
                }
                return Ok(());
            }
            _ => {}
        }
        buf.clear();
    }
}

fn local_name(raw: &[u8]) -> String {
    String::from_utf8_lossy(raw).into_owned()
}

fn attributes(start: &BytesStart<'_>) -> Result<Vec<(String, String)>, String> {
    start
        .attributes()
        .map(|attribute| {
            let attribute = attribute.map_err(|e| e.to_string())?;
            let key = local_name(attribute.key.local_name().as_ref());
            let value = attribute.unescape_value().map_err(|e| e.to_string())?;
            Ok((key, value.into_owned()))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nodes(document: &str) -> Result<Vec<Node>, String> {
        let mut out = Vec::new();
        walk(document.as_bytes(), |node| {
            out.push(node);
            Ok(())
        })?;
        Ok(out)
    }

    #[test]
    fn test_prefixes_dropped_and_empty_elements_closed() {
        let out = nodes(
            r#"<uws:jobs xmlns:uws="u"><uws:jobref id="1" xlink:href="h"/><x>a &amp; b</x></uws:jobs>"#,
        )
        .unwrap();

        assert_eq!(
            out,
            vec![
                Node::Open {
                    name: "jobs".into(),
                    attributes: vec![("uws".into(), "u".into())],
                },
                Node::Open {
                    name: "jobref".into(),
                    attributes: vec![("id".into(), "1".into()), ("href".into(), "h".into())],
                },
                Node::Close("jobref".into()),
                Node::Open {
                    name: "x".into(),
                    attributes: vec![],
                },
                Node::Text("a & b".into()),
                Node::Close("x".into()),
                Node::Close("jobs".into()),
            ]
        );
    }

    #[test]
    fn test_rejects_truncated_and_empty_documents() {
        assert!(nodes("<a><b>text</b>").is_err());
        assert!(nodes("").is_err());
        assert!(nodes("<a></b>").is_err());
    }

    #[test]
    fn test_attribute_lookup() {
        let attrs = vec![("name".to_string(), "ra".to_string())];
        assert_eq!(attribute(&attrs, "name"), Some("ra"));
        assert_eq!(attribute(&attrs, "unit"), None);
    }
}
