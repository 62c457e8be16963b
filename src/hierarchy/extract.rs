//! Per-node field extraction: title, kind, link sources, text, image URL.

use chrono::DateTime;
use serde_json::Value;
use tracing::debug;

use super::context::ExtractContext;
use super::html;
use super::item::{HierarchyItem, ItemKind, LinkSources, SourceTag};
use crate::source::SourceNode;

/// Titles taken from a text payload are cut to this many chars.
const MAX_TEXT_TITLE_CHARS: usize = 100;

pub struct Extracted {
    pub item: HierarchyItem,
    /// Keys of children folded into `item.text`; the builder does not emit them.
    pub consumed: Vec<String>,
}

enum TitleResolution {
    Resolved(String),
    Fallback(String),
    Unresolvable,
}

/// Returns `None` when the node is unresolvable markup and carries no text.
pub fn extract_item(node: &SourceNode<'_>, key_path: &[&str], ctx: &ExtractContext) -> Option<Extracted> {
    let kind = classify(node, ctx);
    let text_bearing = kind == ItemKind::Text || node.text().is_some();

    let mut item = HierarchyItem::new(String::new(), kind, node.key, node.tag);
    item.panel_title = node.panel_title().and_then(html::strip_html).filter(|t| !t.is_empty());
    item.id = node.id().map(str::to_string);

    match resolve_title(node) {
        TitleResolution::Resolved(title) | TitleResolution::Fallback(title) => item.title = title,
        TitleResolution::Unresolvable if text_bearing => {
            item.title = html::humanize_key(node.key);
            item.text = node.text().map(html::strip_html_lossy).filter(|t| !t.is_empty());
        }
        TitleResolution::Unresolvable => {
            debug!(key = node.key, "skipping node with unresolvable markup title");
            return None;
        }
    }

    let mut consumed = Vec::new();
    if item.text.is_none() {
        if let Some(text) = node.text() {
            item.text = html::normalize_text(text);
        } else if kind != ItemKind::Text {
            let (text, keys) = collect_text_fragments(node, ctx);
            item.text = text;
            consumed = keys;
        }
    }

    item.link_sources = link_sources(node, kind, &item.title, ctx);
    item.image_url = image_url(node, key_path, ctx);

    Some(Extracted { item, consumed })
}

/// Type hint, then the raw tree's hint for the same title, then key prefix, then `item`.
pub fn classify(node: &SourceNode<'_>, ctx: &ExtractContext) -> ItemKind {
    let dialect = ctx.dialect();
    let hint = match node.type_hint() {
        Some(hint) => Some(hint),
        None => indexed_type_hint(node, ctx),
    };
    hint.and_then(|hint| dialect.kind_from_type_hint(hint))
        .or_else(|| dialect.kind_from_key(node.key))
        .unwrap_or(ItemKind::Item)
}

/// Model nodes without `:type` borrow the resource type of the raw node with the same title.
fn indexed_type_hint<'c>(node: &SourceNode<'_>, ctx: &'c ExtractContext) -> Option<&'c str> {
    if node.tag != SourceTag::Secondary {
        return None;
    }
    let title = node.panel_title().or_else(|| node.title()).and_then(html::strip_html)?;
    ctx.lookup_title(&title)?.resource_type.as_deref()
}

fn resolve_title(node: &SourceNode<'_>) -> TitleResolution {
    let candidates = [
        (node.panel_title(), false),
        (node.title(), false),
        (node.text(), true),
    ];
    let Some((raw, from_text)) = candidates.into_iter().find_map(|(v, t)| v.map(|v| (v, t))) else {
        return TitleResolution::Fallback(html::humanize_key(node.key));
    };
    match html::strip_html(raw) {
        Some(title) if title.is_empty() => TitleResolution::Fallback(html::humanize_key(node.key)),
        Some(title) if from_text => TitleResolution::Resolved(truncate_chars(&title, MAX_TEXT_TITLE_CHARS)),
        Some(title) => TitleResolution::Resolved(title),
        None => TitleResolution::Unresolvable,
    }
}

/// Leaf text components among the direct children, newline-joined in child order.
fn collect_text_fragments(node: &SourceNode<'_>, ctx: &ExtractContext) -> (Option<String>, Vec<String>) {
    let mut parts = Vec::new();
    let mut keys = Vec::new();
    for child in node.children() {
        if classify(&child, ctx) != ItemKind::Text || !child.children().is_empty() {
            continue;
        }
        if let Some(text) = child.text().and_then(html::normalize_text) {
            parts.push(text);
            keys.push(child.key.to_string());
        }
    }
    if parts.is_empty() {
        (None, keys)
    } else {
        (Some(parts.join("\n")), keys)
    }
}

fn link_sources(node: &SourceNode<'_>, kind: ItemKind, title: &str, ctx: &ExtractContext) -> LinkSources {
    let mut links = LinkSources::default();
    let raw_link = node.str_field("linkURL");

    links.offer_clickable(node.nested_str("link.url").and_then(html::normalize_url));
    if kind == ItemKind::Button {
        for field in ["buttonLink", "searchLink"] {
            let candidate = node.str_field(field).or_else(|| node.nested_str(&format!("{}.url", field)));
            links.offer_clickable(candidate.and_then(html::normalize_url));
        }
        links.offer_clickable(raw_link.and_then(html::normalize_url));
    }

    links.storage_url = raw_link.and_then(html::normalize_url);

    links.analytics_url = node
        .id()
        .and_then(|id| ctx.analytics_url(id))
        .map(str::to_string)
        .or_else(|| own_data_layer_url(node));

    links.image_resource_url = node
        .nested_str("imageResource.linkURL")
        .or_else(|| node.nested_str("imageResource.link.url"))
        .and_then(html::normalize_url);

    if links.is_empty() && node.tag == SourceTag::Secondary {
        if let Some(hit) = ctx.lookup_title(title) {
            links.storage_url = hit.storage_url.clone();
        }
    }
    links
}

fn own_data_layer_url(node: &SourceNode<'_>) -> Option<String> {
    node.object_field("dataLayer")?
        .values()
        .find_map(|entry| entry.get("xdm:linkURL").and_then(Value::as_str))
        .and_then(html::normalize_url)
}

fn image_url(node: &SourceNode<'_>, key_path: &[&str], ctx: &ExtractContext) -> Option<String> {
    let host = &ctx.params.host;
    if let Some(src) = node.nested_str("imageResource.src").or_else(|| node.str_field("src")) {
        return Some(absolute(host, src));
    }
    let file_reference = node.str_field("fileReference")?;
    let filename = sanitize_filename(file_reference.rsplit('/').next().unwrap_or(file_reference));
    if filename.is_empty() {
        return None;
    }
    let ext = filename.rsplit_once('.').map(|(_, ext)| ext).unwrap_or("jpeg");
    let timestamp = last_modified_millis(node).unwrap_or(0);
    let mut url = format!(
        "{}{}/_jcr_content/{}.coreimg.{}/{}/{}",
        host,
        ctx.params.page_path,
        key_path.join("/"),
        ext,
        timestamp,
        filename
    );
    if let Some(id) = node.id() {
        url.push_str("?id=");
        url.push_str(id);
    }
    Some(url)
}

fn absolute(host: &str, src: &str) -> String {
    if src.starts_with("http://") || src.starts_with("https://") {
        src.to_string()
    } else {
        format!("{}{}", host, src)
    }
}

/// `jcr:lastModified` as RFC 3339 or AEM's JavaScript date string; `lastModified` as epoch millis.
pub fn last_modified_millis(node: &SourceNode<'_>) -> Option<i64> {
    if let Some(ms) = node.fields.get("lastModified").and_then(Value::as_i64) {
        return Some(ms);
    }
    let raw = node.str_field("jcr:lastModified").or_else(|| node.str_field("cq:lastModified"))?;
    parse_timestamp(raw)
}

pub fn parse_timestamp(raw: &str) -> Option<i64> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.timestamp_millis());
    }
    // "Wed Jan 10 2024 12:00:00 GMT+0000"
    let trimmed = raw.split(" (").next().unwrap_or(raw);
    DateTime::parse_from_str(trimmed, "%a %b %d %Y %H:%M:%S GMT%z")
        .ok()
        .map(|dt| dt.timestamp_millis())
}

pub fn sanitize_filename(name: &str) -> String {
    name.trim()
        .to_lowercase()
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

fn truncate_chars(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect::<String>().trim_end().to_string()
    }
}
