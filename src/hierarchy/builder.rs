//! Walks one source tree into nested [`HierarchyItem`]s.
//!
//! Traversal is iterative: a work stack of frames, each carrying the node
//! and the scope inherited from its parent (parent slot, raw key path,
//! display path, source path, depth, section). Items are allocated into an
//! arena in pre-order and assembled into the nested tree at the end.

use tracing::warn;

use super::context::ExtractContext;
use super::extract::{classify, extract_item};
use super::html;
use super::item::{HierarchyItem, ItemKind, SourceTag};
use crate::source::SourceNode;

pub struct BuildOutput {
    pub items: Vec<HierarchyItem>,
    /// Section titles in order of first appearance.
    pub sections: Vec<String>,
    pub banner_images: Vec<String>,
}

struct Frame<'a> {
    node: SourceNode<'a>,
    scope: Scope<'a>,
}

#[derive(Clone)]
struct Scope<'a> {
    parent: Option<usize>,
    key_path: Vec<&'a str>,
    /// Titles of emitted ancestors only.
    display_path: String,
    /// Every ancestor except structural wrappers, spliced ones included.
    source_path: String,
    depth: usize,
    section: Option<String>,
    in_accordion: bool,
}

struct Slot {
    item: HierarchyItem,
    children: Vec<usize>,
}

pub fn build_tree(root: SourceNode<'_>, ctx: &ExtractContext) -> BuildOutput {
    let dialect = ctx.dialect();
    let separator = ctx.params.path_separator.as_str();
    let max_depth = ctx.params.max_depth;

    let mut arena: Vec<Slot> = Vec::new();
    let mut top: Vec<usize> = Vec::new();
    let mut sections: Vec<String> = Vec::new();
    let mut banner_images: Vec<String> = Vec::new();

    let mut stack: Vec<Frame<'_>> = Vec::new();
    let root_scope = Scope {
        parent: None,
        key_path: Vec::new(),
        display_path: String::new(),
        source_path: String::new(),
        depth: 0,
        section: None,
        in_accordion: false,
    };
    push_children(&mut stack, &root, root_scope, &[]);

    while let Some(Frame { node, scope }) = stack.pop() {
        if scope.depth > max_depth {
            warn!(key = node.key, depth = scope.depth, "max depth exceeded, branch truncated");
            continue;
        }
        let at_top = scope.parent.is_none();
        let key_path = child_key_path(&scope.key_path, node.key);

        if dialect.is_structural_wrapper(node.key, node.panel_title()) {
            let inner = Scope {
                key_path,
                depth: scope.depth + 1,
                in_accordion: false,
                ..scope
            };
            push_children(&mut stack, &node, inner, &[]);
            continue;
        }

        let kind = classify(&node, ctx);
        if at_top && scope.section.is_none() && kind == ItemKind::Container {
            if let Some((title, title_key)) = section_heading(&node, ctx) {
                if !sections.contains(&title) {
                    sections.push(title.clone());
                }
                let inner = Scope {
                    key_path,
                    source_path: join_path(&scope.source_path, &title, separator),
                    depth: scope.depth + 1,
                    section: Some(title),
                    in_accordion: false,
                    ..scope
                };
                push_children(&mut stack, &node, inner, &[title_key]);
                continue;
            }
        }

        let Some(extracted) = extract_item(&node, &key_path, ctx) else {
            push_children(&mut stack, &node, spliced(scope, &node, key_path, kind, separator), &[]);
            continue;
        };
        let mut item = extracted.item;

        let unwrappable = matches!(item.kind, ItemKind::Container | ItemKind::Item);
        if unwrappable && dialect.is_generic_title(&item.title, node.key) && !item.has_text() {
            let inner = spliced(scope, &node, key_path, kind, separator);
            push_children(&mut stack, &node, inner, &extracted.consumed);
            continue;
        }

        item.section = scope.section.clone();
        item.path = join_path(&scope.display_path, &item.title, separator);
        item.source_path = join_path(&scope.source_path, &item.title, separator);
        item.accordion_panel = scope.in_accordion;

        // Page banners are reported separately, not as content.
        if at_top && node.tag == SourceTag::Primary && dialect.is_banner(node.key, node.type_hint()) {
            if let Some(url) = item.image_url.take() {
                banner_images.push(url);
                continue;
            }
        }

        let slot = arena.len();
        let inner = Scope {
            parent: Some(slot),
            key_path,
            display_path: item.path.clone(),
            source_path: item.source_path.clone(),
            depth: scope.depth + 1,
            section: scope.section,
            in_accordion: item.kind == ItemKind::Accordion,
        };
        arena.push(Slot {
            item,
            children: Vec::new(),
        });
        match scope.parent {
            Some(parent) => arena[parent].children.push(slot),
            None => top.push(slot),
        }
        push_children(&mut stack, &node, inner, &extracted.consumed);
    }

    BuildOutput {
        items: assemble(arena, &top),
        sections,
        banner_images,
    }
}

/// A top-level container whose direct children include a title component.
fn section_heading(node: &SourceNode<'_>, ctx: &ExtractContext) -> Option<(String, String)> {
    node.children().into_iter().find_map(|child| {
        if classify(&child, ctx) != ItemKind::Title {
            return None;
        }
        let title = child.title().or_else(|| child.text()).and_then(html::strip_html)?;
        if title.is_empty() {
            None
        } else {
            Some((title, child.key.to_string()))
        }
    })
}

/// Scope for the children of a node that is skipped but still named in the source path.
fn spliced<'a>(scope: Scope<'a>, node: &SourceNode<'a>, key_path: Vec<&'a str>, kind: ItemKind, separator: &str) -> Scope<'a> {
    Scope {
        key_path,
        source_path: join_path(&scope.source_path, &html::humanize_key(node.key), separator),
        depth: scope.depth + 1,
        in_accordion: kind == ItemKind::Accordion,
        ..scope
    }
}

fn push_children<'a>(stack: &mut Vec<Frame<'a>>, node: &SourceNode<'a>, scope: Scope<'a>, skip: &[String]) {
    // Reversed so children pop in document order.
    for child in node.children().into_iter().rev() {
        if skip.iter().any(|k| k == child.key) {
            continue;
        }
        stack.push(Frame {
            node: child,
            scope: scope.clone(),
        });
    }
}

fn child_key_path<'a>(parent: &[&'a str], key: &'a str) -> Vec<&'a str> {
    let mut path = parent.to_vec();
    if !key.is_empty() {
        path.push(key);
    }
    path
}

pub fn join_path(parent: &str, title: &str, separator: &str) -> String {
    if parent.is_empty() {
        title.to_string()
    } else {
        format!("{}{}{}", parent, separator, title)
    }
}

/// Slots are allocated parent-before-child, so building from the back sees children first.
fn assemble(arena: Vec<Slot>, top: &[usize]) -> Vec<HierarchyItem> {
    let mut built: Vec<Option<HierarchyItem>> = Vec::with_capacity(arena.len());
    let mut child_lists: Vec<Vec<usize>> = Vec::with_capacity(arena.len());
    for slot in arena {
        built.push(Some(slot.item));
        child_lists.push(slot.children);
    }
    for idx in (0..built.len()).rev() {
        let children: Vec<HierarchyItem> = child_lists[idx].iter().filter_map(|&c| built[c].take()).collect();
        if let Some(item) = built[idx].as_mut() {
            item.children = children;
        }
    }
    top.iter().filter_map(|&i| built[i].take()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::context::RunParams;
    use serde_json::{json, Value};

    fn build(doc: &Value, tag: SourceTag, max_depth: usize) -> BuildOutput {
        let params = RunParams {
            max_depth,
            ..RunParams::default()
        };
        let ctx = ExtractContext::build(doc, None, params);
        build_tree(SourceNode::root(doc, tag).unwrap(), &ctx)
    }

    fn titles(items: &[HierarchyItem]) -> Vec<&str> {
        items.iter().map(|i| i.title.as_str()).collect()
    }

    #[test]
    fn tabs_wrapper_spliced() {
        let doc = json!({
            "tabs": {
                "sling:resourceType": "site/components/tabs",
                "item_1": {"cq:panelTitle": "Overview", "sling:resourceType": "site/components/container"},
                "item_2": {"cq:panelTitle": "Pricing", "sling:resourceType": "site/components/container"}
            },
            "button": {"jcr:title": "Contact", "sling:resourceType": "site/components/button"}
        });
        let out = build(&doc, SourceTag::Primary, 64);
        assert_eq!(titles(&out.items), vec!["Overview", "Pricing", "Contact"]);
    }

    #[test]
    fn generic_title_container_unwrapped_unless_text() {
        let doc = json!({
            "container_3": {
                "jcr:title": "container_3",
                "button": {"jcr:title": "Go", "sling:resourceType": "site/components/button"}
            },
            "container_4": {"jcr:title": "container_4", "text": "<p>Kept</p>"}
        });
        let out = build(&doc, SourceTag::Primary, 64);
        assert_eq!(titles(&out.items), vec!["Go", "container_4"]);
        assert_eq!(out.items[1].text.as_deref(), Some("<p>Kept</p>"));
    }

    #[test]
    fn nested_paths_and_order() {
        let doc = json!({
            "item_1": {
                "cq:panelTitle": "Overview",
                "sling:resourceType": "site/components/container",
                "button": {"jcr:title": "First", "sling:resourceType": "site/components/button"},
                "button_2": {"jcr:title": "Second", "sling:resourceType": "site/components/button"}
            }
        });
        let out = build(&doc, SourceTag::Primary, 64);
        let tab = &out.items[0];
        assert_eq!(titles(&tab.children), vec!["First", "Second"]);
        assert_eq!(tab.children[1].path, "Overview > Second");
    }

    #[test]
    fn sections_recorded_from_title_components() {
        let doc = json!({
            "root": {
                "sling:resourceType": "site/components/container",
                "jcr:title": "root",
                "container": {
                    "sling:resourceType": "site/components/container",
                    "title": {"sling:resourceType": "site/components/title", "jcr:title": "Promo"},
                    "teaser": {"sling:resourceType": "site/components/teaser", "jcr:title": "Summer Deal"}
                },
                "button": {"jcr:title": "Loose", "sling:resourceType": "site/components/button"}
            }
        });
        let out = build(&doc, SourceTag::Primary, 64);
        assert_eq!(out.sections, vec!["Promo".to_string()]);
        assert_eq!(titles(&out.items), vec!["Summer Deal", "Loose"]);
        assert_eq!(out.items[0].section.as_deref(), Some("Promo"));
        assert_eq!(out.items[1].section, None);
    }

    #[test]
    fn text_fragments_not_emitted_twice() {
        let doc = json!({
            "item_1": {
                "cq:panelTitle": "Details",
                "sling:resourceType": "site/components/container",
                "text": {"sling:resourceType": "site/components/text", "text": "intro"},
                "button": {"jcr:title": "Go", "sling:resourceType": "site/components/button"}
            }
        });
        let out = build(&doc, SourceTag::Primary, 64);
        assert_eq!(out.items[0].text.as_deref(), Some("intro"));
        assert_eq!(titles(&out.items[0].children), vec!["Go"]);
    }

    #[test]
    fn depth_limit_truncates_branch_only() {
        let mut deep = json!({"jcr:title": "Leaf", "sling:resourceType": "site/components/button"});
        for i in 0..10 {
            deep = json!({ "cq:panelTitle": format!("Level {}", i), "sling:resourceType": "site/components/container", "child": deep });
        }
        let doc = json!({"item_deep": deep, "button": {"jcr:title": "Sibling", "sling:resourceType": "site/components/button"}});
        let out = build(&doc, SourceTag::Primary, 3);
        assert_eq!(titles(&out.items), vec!["Level 9", "Sibling"]);
        let mut depth = 0;
        let mut node = &out.items[0];
        while let Some(child) = node.children.first() {
            node = child;
            depth += 1;
        }
        assert_eq!(depth, 3);
    }

    #[test]
    fn model_tree_uses_items_order() {
        let doc = json!({
            ":items": {
                "b": {":type": "site/components/button", "title": "Second"},
                "a": {":type": "site/components/button", "title": "First"}
            },
            ":itemsOrder": ["a", "b"]
        });
        let out = build(&doc, SourceTag::Secondary, 64);
        assert_eq!(titles(&out.items), vec!["First", "Second"]);
        assert!(out.items.iter().all(|i| i.source_tag == SourceTag::Secondary));
    }

    #[test]
    fn source_path_names_spliced_ancestors() {
        let doc = json!({
            "container_1": {
                "tabs": {
                    "item_1": {
                        "cq:panelTitle": "Deals",
                        "sling:resourceType": "site/components/container",
                        "button": {"jcr:title": "Buy", "sling:resourceType": "site/components/button"}
                    }
                }
            }
        });
        let out = build(&doc, SourceTag::Primary, 64);
        let deals = &out.items[0];
        assert_eq!(deals.path, "Deals");
        assert_eq!(deals.source_path, "Container 1 > Deals");
        assert_eq!(deals.children[0].source_path, "Container 1 > Deals > Buy");
    }

    #[test]
    fn accordion_children_marked_as_panels() {
        let doc = json!({
            "faq": {
                "sling:resourceType": "core/wcm/components/accordion/v1/accordion",
                "jcr:title": "FAQ",
                "item_1": {"cq:panelTitle": "How do I pay?", "sling:resourceType": "site/components/container"}
            },
            "item_2": {"cq:panelTitle": "Overview", "sling:resourceType": "site/components/container"}
        });
        let out = build(&doc, SourceTag::Primary, 64);
        assert_eq!(out.items[0].kind, ItemKind::Accordion);
        assert!(!out.items[0].accordion_panel);
        assert!(out.items[0].children[0].accordion_panel);
        assert!(!out.items[1].accordion_panel);
    }

    #[test]
    fn banner_images_collected() {
        let doc = json!({
            "banner": {"sling:resourceType": "site/components/banner", "fileReference": "/content/dam/site/hero.png"}
        });
        let out = build(&doc, SourceTag::Primary, 64);
        assert!(out.items.is_empty());
        assert_eq!(out.banner_images.len(), 1);
        assert!(out.banner_images[0].ends_with("/0/hero.png"));
    }
}
