//! Source loaders and a borrowed view over nodes of either input tree.

use std::path::Path;

use serde_json::{Map, Value};

use crate::error::{Error, Result};
use crate::hierarchy::item::SourceTag;

/// Reads and parses one JSON export. A missing file or bad JSON is fatal for the run.
pub fn load_json(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Err(Error::MissingInput(path.to_path_buf()));
    }
    let raw = std::fs::read_to_string(path).map_err(|_| Error::MissingInput(path.to_path_buf()))?;
    parse_json(&raw, &path.display().to_string())
}

pub fn parse_json(raw: &str, origin: &str) -> Result<Value> {
    serde_json::from_str(raw).map_err(|source| Error::InvalidJson {
        path: origin.to_string(),
        source,
    })
}

/// One node of the raw JCR tree or of the model tree.
#[derive(Debug, Clone, Copy)]
pub struct SourceNode<'a> {
    pub key: &'a str,
    pub fields: &'a Map<String, Value>,
    pub tag: SourceTag,
}

impl<'a> SourceNode<'a> {
    pub fn new(key: &'a str, fields: &'a Map<String, Value>, tag: SourceTag) -> Self {
        SourceNode { key, fields, tag }
    }

    /// Root view of a whole document; `None` when it is not a JSON object.
    pub fn root(value: &'a Value, tag: SourceTag) -> Option<Self> {
        value.as_object().map(|fields| SourceNode::new("", fields, tag))
    }

    /// Ordered child nodes.
    ///
    /// Raw tree: object-valued properties without a namespace colon, in document order.
    /// Model tree: `:items`, ordered by `:itemsOrder` when present.
    pub fn children(&self) -> Vec<SourceNode<'a>> {
        match self.tag {
            SourceTag::Primary => self
                .fields
                .iter()
                .filter(|(k, _)| !k.contains(':'))
                .filter_map(|(k, v)| v.as_object().map(|o| SourceNode::new(k.as_str(), o, self.tag)))
                .collect(),
            SourceTag::Secondary => {
                let Some(items) = self.fields.get(":items").and_then(Value::as_object) else {
                    return Vec::new();
                };
                let order = self.fields.get(":itemsOrder").and_then(Value::as_array);
                match order {
                    Some(order) => order
                        .iter()
                        .filter_map(Value::as_str)
                        .filter_map(|k| {
                            let (key, value) = items.get_key_value(k)?;
                            value.as_object().map(|o| SourceNode::new(key.as_str(), o, self.tag))
                        })
                        .collect(),
                    None => items
                        .iter()
                        .filter_map(|(k, v)| v.as_object().map(|o| SourceNode::new(k.as_str(), o, self.tag)))
                        .collect(),
                }
            }
        }
    }

    pub fn str_field(&self, name: &str) -> Option<&'a str> {
        self.fields
            .get(name)
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|s| !s.is_empty())
    }

    /// `a.b` style lookup into nested objects.
    pub fn nested_str(&self, dotted: &str) -> Option<&'a str> {
        let mut parts = dotted.split('.');
        let mut current = self.fields.get(parts.next()?)?;
        for part in parts {
            current = current.get(part)?;
        }
        current.as_str().map(str::trim).filter(|s| !s.is_empty())
    }

    pub fn object_field(&self, name: &str) -> Option<&'a Map<String, Value>> {
        self.fields.get(name).and_then(Value::as_object)
    }

    pub fn type_hint(&self) -> Option<&'a str> {
        match self.tag {
            SourceTag::Primary => self.str_field("sling:resourceType"),
            SourceTag::Secondary => self.str_field(":type").or_else(|| self.str_field("sling:resourceType")),
        }
    }

    pub fn title(&self) -> Option<&'a str> {
        match self.tag {
            SourceTag::Primary => self.str_field("jcr:title").or_else(|| self.str_field("title")),
            SourceTag::Secondary => self.str_field("title").or_else(|| self.str_field("jcr:title")),
        }
    }

    pub fn panel_title(&self) -> Option<&'a str> {
        self.str_field("cq:panelTitle")
    }

    pub fn text(&self) -> Option<&'a str> {
        self.str_field("text")
    }

    pub fn id(&self) -> Option<&'a str> {
        self.str_field("id")
    }
}
