//! Naming conventions of one CMS export shape.
//!
//! Every hard-coded key prefix, component name and boilerplate string the
//! reconciliation passes depend on lives behind [`SourceDialect`], so a
//! different export can supply its own set without touching the passes.

use std::sync::LazyLock;

use regex::Regex;

use super::html;
use super::item::ItemKind;

static GENERIC_KEY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^(?:container|item|tabs|accordion|responsivegrid|par|root)(?:[_-]?\d+|_[A-Za-z0-9_-]+)?$").unwrap()
});
static REAL_BUTTON_ID_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^button-[0-9a-f]{6,}$").unwrap());

pub trait SourceDialect: Send + Sync {
    /// Wrapper keys that are never emitted as nodes; their children are spliced into the parent.
    fn is_structural_wrapper(&self, key: &str, panel_title: Option<&str>) -> bool;

    /// Whether `title` is nothing more than a generated component key
    /// (`container_3`, or its humanized fallback `Container 3`).
    fn is_generic_title(&self, title: &str, key: &str) -> bool;

    fn kind_from_type_hint(&self, resource_type: &str) -> Option<ItemKind>;

    fn kind_from_key(&self, key: &str) -> Option<ItemKind>;

    fn is_accordion_key(&self, key: &str) -> bool;

    /// Title marks a structural wrapper of the given kind (`tab`, `tab_2`, `item_x`).
    /// Leaf components are never wrappers, whatever their title.
    fn is_wrapper_title(&self, title: &str, kind: ItemKind) -> bool;

    /// Authoring instructions that leak into exports as text nodes.
    fn is_boilerplate_text(&self, text: &str) -> bool;

    /// Items that are authoring artifacts, never content.
    fn is_ignored_title(&self, title: &str) -> bool;

    /// Ids of authored button components, as opposed to synthetic custom-button ids.
    fn is_real_button_id(&self, id: &str) -> bool;

    /// Top-level components whose image is a page banner.
    fn is_banner(&self, key: &str, resource_type: Option<&str>) -> bool;
}

/// Conventions of AEM Core Components exports.
#[derive(Debug, Default, Clone, Copy)]
pub struct AemDialect;

const BOILERPLATE: &[&str] = &[
    "click on the tabs below",
    "select a tab to view",
    "expand each section below",
    "use the tabs above to navigate",
    "drag components here",
];

const IGNORED_TITLES: &[&str] = &["Content Store Request Form"];

impl SourceDialect for AemDialect {
    fn is_structural_wrapper(&self, key: &str, panel_title: Option<&str>) -> bool {
        let has_panel_title = panel_title.is_some_and(|t| !t.trim().is_empty());
        key == "tabs" || (key.starts_with("tabs_") && !has_panel_title)
    }

    fn is_generic_title(&self, title: &str, key: &str) -> bool {
        let title = title.trim();
        GENERIC_KEY_RE.is_match(key) && (title == key || title == html::humanize_key(key))
    }

    fn kind_from_type_hint(&self, resource_type: &str) -> Option<ItemKind> {
        let component = resource_type.rsplit('/').next().unwrap_or(resource_type).to_ascii_lowercase();
        let kind = match component.as_str() {
            c if c.contains("accordion") => ItemKind::Accordion,
            c if c.contains("tabs") => ItemKind::Tab,
            c if c.contains("button") => ItemKind::Button,
            c if c.contains("teaser") => ItemKind::Teaser,
            c if c.contains("text") => ItemKind::Text,
            c if c.contains("title") => ItemKind::Title,
            c if c.contains("container") || c.contains("responsivegrid") => ItemKind::Container,
            _ => return None,
        };
        Some(kind)
    }

    fn kind_from_key(&self, key: &str) -> Option<ItemKind> {
        let key = key.to_ascii_lowercase();
        let kind = if key.starts_with("teaser") {
            ItemKind::Teaser
        } else if key.starts_with("button") {
            ItemKind::Button
        } else if key.starts_with("accordion") {
            ItemKind::Accordion
        } else if key.starts_with("tabs") {
            ItemKind::Tab
        } else if key.starts_with("text") {
            ItemKind::Text
        } else if key.starts_with("title") {
            ItemKind::Title
        } else if key.starts_with("container") || key.starts_with("item_") {
            ItemKind::Container
        } else {
            return None;
        };
        Some(kind)
    }

    fn is_accordion_key(&self, key: &str) -> bool {
        let key = key.to_ascii_lowercase();
        key.starts_with("accordion") || key.contains("_accordion")
    }

    fn is_wrapper_title(&self, title: &str, kind: ItemKind) -> bool {
        if !matches!(kind, ItemKind::Tab | ItemKind::Accordion | ItemKind::Container | ItemKind::Item) {
            return false;
        }
        let title = title.trim().to_ascii_lowercase();
        let name = kind.as_str();
        title == name || title.starts_with(&format!("{}_", name)) || title.starts_with("item_")
    }

    fn is_boilerplate_text(&self, text: &str) -> bool {
        let lower = text.trim().to_lowercase();
        BOILERPLATE.iter().any(|b| lower.starts_with(b))
    }

    fn is_ignored_title(&self, title: &str) -> bool {
        IGNORED_TITLES.iter().any(|t| t.eq_ignore_ascii_case(title.trim()))
    }

    fn is_real_button_id(&self, id: &str) -> bool {
        REAL_BUTTON_ID_RE.is_match(id) && !id.contains("custom")
    }

    fn is_banner(&self, key: &str, resource_type: Option<&str>) -> bool {
        let key = key.to_ascii_lowercase();
        key.starts_with("banner")
            || key.starts_with("hero")
            || resource_type.is_some_and(|t| {
                let component = t.rsplit('/').next().unwrap_or(t);
                component.contains("banner") || component.contains("hero")
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_wrappers() {
        let d = AemDialect;
        assert!(d.is_structural_wrapper("tabs", Some("Ignored")));
        assert!(d.is_structural_wrapper("tabs_123", None));
        assert!(!d.is_structural_wrapper("tabs_123", Some("Overview")));
        assert!(!d.is_structural_wrapper("container", None));
    }

    #[test]
    fn generic_titles() {
        let d = AemDialect;
        assert!(d.is_generic_title("container_3", "container_3"));
        assert!(d.is_generic_title("root", "root"));
        assert!(d.is_generic_title("Container 3", "container_3"));
        assert!(!d.is_generic_title("Root Page", "root"));
        assert!(!d.is_generic_title("Promo", "container_3"));
        assert!(!d.is_generic_title("container_3", "container_4"));
    }

    #[test]
    fn kind_from_hint_then_key() {
        let d = AemDialect;
        assert_eq!(d.kind_from_type_hint("site/components/content/button"), Some(ItemKind::Button));
        assert_eq!(d.kind_from_type_hint("core/wcm/components/tabs/v1/tabs"), Some(ItemKind::Tab));
        assert_eq!(d.kind_from_type_hint("site/components/image"), None);
        assert_eq!(d.kind_from_key("teaser_copy"), Some(ItemKind::Teaser));
        assert_eq!(d.kind_from_key("item_1689"), Some(ItemKind::Container));
        assert_eq!(d.kind_from_key("image"), None);
    }

    #[test]
    fn accordion_keys() {
        let d = AemDialect;
        assert!(d.is_accordion_key("accordion_copy"));
        assert!(d.is_accordion_key("faq_accordion"));
        assert!(!d.is_accordion_key("item_1234"));
    }

    #[test]
    fn wrapper_titles() {
        let d = AemDialect;
        assert!(d.is_wrapper_title("tab", ItemKind::Tab));
        assert!(d.is_wrapper_title("container_12", ItemKind::Container));
        assert!(d.is_wrapper_title("item_1234", ItemKind::Tab));
        assert!(!d.is_wrapper_title("Overview", ItemKind::Tab));
        assert!(d.is_wrapper_title("Accordion", ItemKind::Accordion));
        assert!(!d.is_wrapper_title("Teaser", ItemKind::Teaser));
        assert!(!d.is_wrapper_title("button", ItemKind::Button));
    }

    #[test]
    fn button_ids() {
        let d = AemDialect;
        assert!(d.is_real_button_id("button-4f2a9c1e"));
        assert!(!d.is_real_button_id("custom-button-1"));
        assert!(!d.is_real_button_id("teaser-4f2a9c1e"));
    }

    #[test]
    fn ignored_and_boilerplate() {
        let d = AemDialect;
        assert!(d.is_ignored_title("Content Store Request Form"));
        assert!(d.is_boilerplate_text("Click on the tabs below to learn more."));
        assert!(!d.is_boilerplate_text("Pricing details"));
    }
}
