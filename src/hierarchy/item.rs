use serde::{Deserialize, Serialize};

/// Structural classification of a hierarchy node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemKind {
    Tab,
    Accordion,
    Button,
    Teaser,
    Text,
    Container,
    Title,
    Section,
    Item,
}

impl ItemKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ItemKind::Tab => "tab",
            ItemKind::Accordion => "accordion",
            ItemKind::Button => "button",
            ItemKind::Teaser => "teaser",
            ItemKind::Text => "text",
            ItemKind::Container => "container",
            ItemKind::Title => "title",
            ItemKind::Section => "section",
            ItemKind::Item => "item",
        }
    }
}

/// Which input tree produced a node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceTag {
    Primary,
    Secondary,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LinkSources {
    pub clickable_url: Option<String>,
    pub storage_url: Option<String>,
    pub analytics_url: Option<String>,
    pub image_resource_url: Option<String>,
}

impl LinkSources {
    pub fn is_empty(&self) -> bool {
        self.clickable_url.is_none()
            && self.storage_url.is_none()
            && self.analytics_url.is_none()
            && self.image_resource_url.is_none()
    }

    /// The URL shown in flattened output: clickable, then storage, analytics, image.
    pub fn primary(&self) -> Option<&str> {
        self.clickable_url
            .as_deref()
            .or(self.storage_url.as_deref())
            .or(self.analytics_url.as_deref())
            .or(self.image_resource_url.as_deref())
    }

    /// Sets the clickable URL unless a higher-priority field already filled it.
    pub fn offer_clickable(&mut self, url: Option<String>) {
        if self.clickable_url.is_none() {
            self.clickable_url = url;
        }
    }

    /// Fills every empty field from `other`.
    pub fn fill_from(&mut self, other: &LinkSources) {
        if self.clickable_url.is_none() {
            self.clickable_url = other.clickable_url.clone();
        }
        if self.storage_url.is_none() {
            self.storage_url = other.storage_url.clone();
        }
        if self.analytics_url.is_none() {
            self.analytics_url = other.analytics_url.clone();
        }
        if self.image_resource_url.is_none() {
            self.image_resource_url = other.image_resource_url.clone();
        }
    }
}

/// Canonical normalized node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HierarchyItem {
    pub title: String,
    #[serde(default)]
    pub path: String,
    #[serde(rename = "type")]
    pub kind: ItemKind,
    pub key: String,
    #[serde(default)]
    pub link_sources: LinkSources,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub panel_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Top-level section this node descended from in its source tree.
    #[serde(skip)]
    pub section: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub section_order: Option<usize>,
    /// Ancestor labels in the source tree, spliced wrappers included.
    #[serde(skip)]
    pub source_path: String,
    /// Direct child of an accordion component in its source tree.
    #[serde(skip)]
    pub accordion_panel: bool,
    #[serde(rename = "source")]
    pub source_tag: SourceTag,
    #[serde(rename = "items", default, skip_serializing_if = "Vec::is_empty")]
    pub children: Vec<HierarchyItem>,
}

impl HierarchyItem {
    pub fn new(title: impl Into<String>, kind: ItemKind, key: impl Into<String>, source_tag: SourceTag) -> Self {
        HierarchyItem {
            title: title.into(),
            path: String::new(),
            kind,
            key: key.into(),
            link_sources: LinkSources::default(),
            text: None,
            image_url: None,
            panel_title: None,
            id: None,
            section: None,
            section_order: None,
            source_path: String::new(),
            accordion_panel: false,
            source_tag,
            children: Vec::new(),
        }
    }

    pub fn has_text(&self) -> bool {
        self.text.as_deref().is_some_and(|t| !t.trim().is_empty())
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn text_len(&self) -> usize {
        self.text.as_deref().map(|t| t.chars().count()).unwrap_or(0)
    }
}

/// Final output document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageHierarchy {
    pub title: String,
    pub items: Vec<HierarchyItem>,
    #[serde(rename = "linkURL")]
    pub link_url: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub banner_images: Vec<String>,
}

/// One flattened output row.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FlatRow {
    pub path: String,
    pub title: String,
    #[serde(rename = "imageUrl")]
    pub image_url: String,
    #[serde(rename = "linkURL")]
    pub link_url: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
}

/// Depth-first, document-order flattening.
pub fn flatten(items: &[HierarchyItem]) -> Vec<FlatRow> {
    let mut rows = Vec::new();
    let mut stack: Vec<&HierarchyItem> = items.iter().rev().collect();
    while let Some(item) = stack.pop() {
        rows.push(FlatRow {
            path: item.path.clone(),
            title: item.title.clone(),
            image_url: item.image_url.clone().unwrap_or_default(),
            link_url: item.link_sources.primary().unwrap_or_default().to_string(),
            kind: item.kind.as_str().to_string(),
            text: item.text.clone().unwrap_or_default(),
        });
        stack.extend(item.children.iter().rev());
    }
    rows
}
