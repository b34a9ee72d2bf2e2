//! Event front end over `quick-xml`.
//!
//! Elements are materialized one at a time as start events arrive. Each
//! element keeps a shared link to its parent so the ancestor chain stays
//! navigable while the element is open. Text is not buffered, so
//! [`Node::text`] is always `None` here.

use super::Node;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;
use quick_xml::reader::NsReader;
use std::collections::HashMap;
use std::sync::Arc;

/// An element seen by the event front end.
#[derive(Debug)]
pub struct StreamElement {
    local_name: String,
    namespace: Option<String>,
    attributes: Vec<StreamAttribute>,
    position: usize,
    parent: Option<StreamNode>,
}

#[derive(Debug)]
struct StreamAttribute {
    local_name: String,
    namespace: Option<String>,
    value: String,
}

/// Cheaply clonable handle on a [`StreamElement`].
#[derive(Debug, Clone)]
pub struct StreamNode(Arc<StreamElement>);

/// Start/end element events.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Start(StreamNode),
    End(StreamNode),
}

/// Errors from the event front end.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    #[error("XML error at byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("Malformed XML: {0}")]
    Malformed(String),
}

type SiblingKey = (Option<String>, String);

/// Pull parser producing [`StreamEvent`]s.
pub struct StreamParser<'i> {
    reader: NsReader<&'i [u8]>,
    open: Vec<(StreamNode, HashMap<SiblingKey, usize>)>,
    root_counts: HashMap<SiblingKey, usize>,
    pending_end: Option<StreamNode>,
    finished: bool,
}

impl<'i> StreamParser<'i> {
    pub fn new(xml: &'i str) -> Self {
        let mut reader = NsReader::from_str(xml);
        reader.config_mut().trim_text(true);
        Self {
            reader,
            open: Vec::new(),
            root_counts: HashMap::new(),
            pending_end: None,
            finished: false,
        }
    }

    fn next_event(&mut self) -> Result<Option<StreamEvent>, StreamError> {
        if let Some(node) = self.pending_end.take() {
            return Ok(Some(StreamEvent::End(node)));
        }

        loop {
            let event = self.reader.read_event().map_err(|source| StreamError::Xml {
                position: self.reader.buffer_position() as u64,
                source,
            })?;

            match event {
                Event::Start(start) => {
                    let node = self.open_element(&start)?;
                    self.open.push((node.clone(), HashMap::new()));
                    return Ok(Some(StreamEvent::Start(node)));
                }
                Event::Empty(start) => {
                    let node = self.open_element(&start)?;
                    self.pending_end = Some(node.clone());
                    return Ok(Some(StreamEvent::Start(node)));
                }
                Event::End(_) => {
                    let (node, _) = self
                        .open
                        .pop()
                        .ok_or_else(|| StreamError::Malformed("unexpected end tag".to_string()))?;
                    return Ok(Some(StreamEvent::End(node)));
                }
                Event::Eof => {
                    if !self.open.is_empty() {
                        return Err(StreamError::Malformed(format!(
                            "{} unclosed element(s) at end of document",
                            self.open.len()
                        )));
                    }
                    return Ok(None);
                }
                _ => {}
            }
        }
    }

    fn open_element(&mut self, start: &BytesStart<'_>) -> Result<StreamNode, StreamError> {
        let (resolved, local) = self.reader.resolve_element(start.name());
        let namespace = namespace_of(resolved)?;
        let local_name = utf8(local.as_ref())?;

        let mut attributes = Vec::new();
        for attr in start.attributes() {
            let attr = attr.map_err(|e| StreamError::Malformed(e.to_string()))?;
            if attr.key.as_namespace_binding().is_some() {
                continue;
            }
            let (resolved, local) = self.reader.resolve_attribute(attr.key);
            let value = attr
                .unescape_value()
                .map_err(|e| StreamError::Malformed(e.to_string()))?;
            attributes.push(StreamAttribute {
                local_name: utf8(local.as_ref())?,
                namespace: namespace_of(resolved)?,
                value: value.into_owned(),
            });
        }

        let key = (namespace.clone(), local_name.clone());
        let counts = match self.open.last_mut() {
            Some((_, counts)) => counts,
            None => &mut self.root_counts,
        };
        let position = counts.entry(key).or_insert(0);
        *position += 1;
        let position = *position;

        Ok(StreamNode(Arc::new(StreamElement {
            local_name,
            namespace,
            attributes,
            position,
            parent: self.open.last().map(|(node, _)| node.clone()),
        })))
    }
}

impl Iterator for StreamParser<'_> {
    type Item = Result<StreamEvent, StreamError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.next_event() {
            Ok(Some(event)) => Some(Ok(event)),
            Ok(None) => {
                self.finished = true;
                None
            }
            Err(err) => {
                self.finished = true;
                Some(Err(err))
            }
        }
    }
}

fn namespace_of(resolved: ResolveResult<'_>) -> Result<Option<String>, StreamError> {
    match resolved {
        ResolveResult::Bound(ns) => Ok(Some(utf8(ns.as_ref())?)),
        ResolveResult::Unbound => Ok(None),
        ResolveResult::Unknown(prefix) => Err(StreamError::Malformed(format!(
            "unknown namespace prefix '{}'",
            String::from_utf8_lossy(&prefix)
        ))),
    }
}

fn utf8(bytes: &[u8]) -> Result<String, StreamError> {
    std::str::from_utf8(bytes)
        .map(str::to_string)
        .map_err(|e| StreamError::Malformed(e.to_string()))
}

impl Node for StreamNode {
    fn local_name(&self) -> &str {
        &self.0.local_name
    }

    fn namespace(&self) -> Option<&str> {
        self.0.namespace.as_deref()
    }

    fn parent(&self) -> Option<Self> {
        self.0.parent.clone()
    }

    fn attribute(&self, local_name: &str, namespace: Option<&str>) -> Option<&str> {
        self.0
            .attributes
            .iter()
            .find(|a| {
                a.local_name == local_name
                    && namespace.map_or(true, |ns| a.namespace.as_deref() == Some(ns))
            })
            .map(|a| a.value.as_str())
    }

    fn attributes(&self) -> Vec<(String, String)> {
        self.0
            .attributes
            .iter()
            .map(|a| (a.local_name.clone(), a.value.clone()))
            .collect()
    }

    fn text(&self) -> Option<String> {
        None
    }

    fn position(&self) -> usize {
        self.0.position
    }
}
