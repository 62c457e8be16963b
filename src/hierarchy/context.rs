use std::collections::HashMap;

use serde_json::Value;

use super::dialect::{AemDialect, SourceDialect};
use super::html;
use super::item::SourceTag;
use crate::source::SourceNode;

/// Cross-reference data from the raw tree for one title.
#[derive(Debug, Clone, Default)]
pub struct IndexedNode {
    pub resource_type: Option<String>,
    pub storage_url: Option<String>,
}

/// Run parameters shared by every extraction.
#[derive(Debug, Clone)]
pub struct RunParams {
    pub host: String,
    pub page_path: String,
    pub max_depth: usize,
    pub path_separator: String,
}

impl Default for RunParams {
    fn default() -> Self {
        RunParams {
            host: String::new(),
            page_path: String::new(),
            max_depth: 64,
            path_separator: " > ".to_string(),
        }
    }
}

/// Lookup tables built once before the extraction walks and only read afterwards.
pub struct ExtractContext {
    pub params: RunParams,
    pub dialect: Box<dyn SourceDialect>,
    by_title: HashMap<String, IndexedNode>,
    analytics_by_id: HashMap<String, String>,
}

impl ExtractContext {
    pub fn build(raw: &Value, model: Option<&Value>, params: RunParams) -> Self {
        Self::with_dialect(raw, model, params, Box::new(AemDialect))
    }

    pub fn with_dialect(
        raw: &Value,
        model: Option<&Value>,
        params: RunParams,
        dialect: Box<dyn SourceDialect>,
    ) -> Self {
        let by_title = SourceNode::root(raw, SourceTag::Primary)
            .map(|root| index_titles(root, params.max_depth))
            .unwrap_or_default();
        let analytics_by_id = model.map(collect_data_layer).unwrap_or_default();
        ExtractContext {
            params,
            dialect,
            by_title,
            analytics_by_id,
        }
    }

    pub fn lookup_title(&self, title: &str) -> Option<&IndexedNode> {
        self.by_title.get(title)
    }

    pub fn analytics_url(&self, id: &str) -> Option<&str> {
        self.analytics_by_id.get(id).map(String::as_str)
    }

    pub fn dialect(&self) -> &dyn SourceDialect {
        self.dialect.as_ref()
    }
}

/// First occurrence wins for each title.
fn index_titles(root: SourceNode<'_>, max_depth: usize) -> HashMap<String, IndexedNode> {
    let mut index = HashMap::new();
    let mut stack: Vec<(SourceNode<'_>, usize)> = root.children().into_iter().rev().map(|c| (c, 0)).collect();
    while let Some((node, depth)) = stack.pop() {
        let title = node.panel_title().or_else(|| node.title()).and_then(html::strip_html);
        if let Some(title) = title.filter(|t| !t.is_empty()) {
            index.entry(title).or_insert_with(|| IndexedNode {
                resource_type: node.type_hint().map(str::to_string),
                storage_url: node.str_field("linkURL").and_then(html::normalize_url),
            });
        }
        if depth < max_depth {
            stack.extend(node.children().into_iter().rev().map(|c| (c, depth + 1)));
        }
    }
    index
}

/// Model exports carry a `dataLayer` object per component, keyed by component id.
fn collect_data_layer(model: &Value) -> HashMap<String, String> {
    let mut map = HashMap::new();
    let mut stack: Vec<&Value> = vec![model];
    while let Some(value) = stack.pop() {
        match value {
            Value::Object(obj) => {
                if let Some(layer) = obj.get("dataLayer").and_then(Value::as_object) {
                    for (id, entry) in layer {
                        let url = entry
                            .get("xdm:linkURL")
                            .and_then(Value::as_str)
                            .and_then(html::normalize_url);
                        if let Some(url) = url {
                            map.entry(id.clone()).or_insert(url);
                        }
                    }
                }
                stack.extend(obj.values());
            }
            Value::Array(arr) => stack.extend(arr.iter()),
            _ => {}
        }
    }
    map
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn indexes_raw_titles() {
        let raw = json!({
            "container": {
                "button": {"jcr:title": "Download", "linkURL": "/content/site/en/download", "sling:resourceType": "site/components/button"}
            }
        });
        let ctx = ExtractContext::build(&raw, None, RunParams::default());
        let hit = ctx.lookup_title("Download").unwrap();
        assert_eq!(hit.storage_url.as_deref(), Some("/content/site/en/download"));
        assert_eq!(hit.resource_type.as_deref(), Some("site/components/button"));
    }

    #[test]
    fn collects_data_layer_urls() {
        let model = json!({
            ":items": {
                "button": {
                    "id": "button-1a2b3c4d",
                    "dataLayer": {"button-1a2b3c4d": {"xdm:linkURL": "https://www.example.com/en/plans.html"}}
                }
            }
        });
        let ctx = ExtractContext::build(&json!({}), Some(&model), RunParams::default());
        assert_eq!(ctx.analytics_url("button-1a2b3c4d"), Some("/en/plans.html"));
        assert_eq!(ctx.analytics_url("unknown"), None);
    }
}
