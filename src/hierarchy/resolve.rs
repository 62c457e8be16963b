//! Type resolution: a fixed, ordered list of whole-tree rewrite passes.
//!
//! Each pass is a named function `Vec<HierarchyItem> -> Vec<HierarchyItem>`
//! so it can be exercised on its own. Later passes rely on earlier ones
//! having already reclassified nodes.

use tracing::{debug, info};

use super::dialect::SourceDialect;
use super::extract::sanitize_filename;
use super::item::{HierarchyItem, ItemKind};
use super::walk;

pub const TEXT_TITLE: &str = "Text";

pub struct ResolveCtx<'a> {
    pub dialect: &'a dyn SourceDialect,
    pub max_depth: usize,
}

type Pass = fn(Vec<HierarchyItem>, &ResolveCtx<'_>) -> Vec<HierarchyItem>;

/// Full sequence for freshly built trees.
pub const FULL_PASSES: &[(&str, Pass)] = &[
    ("unwrap", unwrap_wrappers),
    ("accordions", convert_accordions),
    ("tabs", convert_tabs),
    ("hoist_text", hoist_text),
    ("residual_text", convert_residual_text),
    ("prune", prune_empty),
];

/// Second, partial run over merged trees.
pub const MERGED_PASSES: &[(&str, Pass)] = &[
    ("accordions", convert_accordions),
    ("tabs", convert_tabs),
    ("hoist_text", hoist_text),
    ("residual_text", convert_residual_text),
    ("prune", prune_empty),
];

pub fn run_passes(mut items: Vec<HierarchyItem>, passes: &[(&str, Pass)], ctx: &ResolveCtx<'_>) -> Vec<HierarchyItem> {
    for (name, pass) in passes {
        let before = count(&items);
        items = pass(items, ctx);
        debug!(pass = name, before, after = count(&items), "type resolver pass");
    }
    items
}

fn count(items: &[HierarchyItem]) -> usize {
    let mut n = 0;
    walk::visit(items, |_, _| n += 1);
    n
}

/// Pass 1: drop structural wrapper nodes, re-parenting their children.
///
/// A node carrying links or an image is never a wrapper. Unwrapping any
/// non-leaf wrapper also strips boilerplate instruction text and ignored
/// authoring artifacts from the whole tree, once.
pub fn unwrap_wrappers(items: Vec<HierarchyItem>, ctx: &ResolveCtx<'_>) -> Vec<HierarchyItem> {
    let mut unwrapped_parent = false;
    let items = walk::rewrite(items, ctx.max_depth, |item| {
        let carries_links = !item.link_sources.is_empty() || item.image_url.is_some();
        if carries_links || item.kind == ItemKind::Section || !ctx.dialect.is_wrapper_title(&item.title, item.kind) {
            return vec![item];
        }
        match (item.has_children(), item.has_text()) {
            (false, false) => Vec::new(),
            (false, true) | (true, true) => vec![item],
            (true, false) => {
                unwrapped_parent = true;
                item.children
            }
        }
    });
    if unwrapped_parent {
        remove_boilerplate(items, ctx)
    } else {
        items
    }
}

fn remove_boilerplate(items: Vec<HierarchyItem>, ctx: &ResolveCtx<'_>) -> Vec<HierarchyItem> {
    walk::rewrite(items, ctx.max_depth, |item| {
        let ignored = ctx.dialect.is_ignored_title(&item.title);
        let boilerplate = item.kind == ItemKind::Text
            && !item.has_children()
            && item.text.as_deref().is_some_and(|t| ctx.dialect.is_boilerplate_text(&super::html::strip_html_lossy(t)));
        if ignored || boilerplate {
            info!(title = %item.title, "removing authoring artifact");
            Vec::new()
        } else {
            vec![item]
        }
    })
}

/// Panel of an accordion component, or a node keyed like one.
fn accordion_shaped(item: &HierarchyItem, ctx: &ResolveCtx<'_>) -> bool {
    item.accordion_panel || ctx.dialect.is_accordion_key(&item.key)
}

/// Pass 2: leaf containers with a panel title, accordion shape and text become accordions.
pub fn convert_accordions(items: Vec<HierarchyItem>, ctx: &ResolveCtx<'_>) -> Vec<HierarchyItem> {
    walk::rewrite(items, ctx.max_depth, |mut item| {
        if item.kind == ItemKind::Container
            && item.panel_title.is_some()
            && accordion_shaped(&item, ctx)
            && item.has_text()
            && !item.has_children()
        {
            item.kind = ItemKind::Accordion;
        }
        vec![item]
    })
}

/// Pass 3: containers with children or a panel title become tabs.
pub fn convert_tabs(items: Vec<HierarchyItem>, ctx: &ResolveCtx<'_>) -> Vec<HierarchyItem> {
    walk::rewrite(items, ctx.max_depth, |mut item| {
        if item.kind == ItemKind::Container
            && (item.has_children() || item.panel_title.is_some())
            && !accordion_shaped(&item, ctx)
        {
            item.kind = ItemKind::Tab;
        }
        vec![item]
    })
}

/// Pass 4: a node with children never carries text; the text moves to a leading `Text` child.
///
/// The synthetic key includes the parent title: panel keys such as `item_1`
/// repeat across tabs components.
pub fn hoist_text(items: Vec<HierarchyItem>, ctx: &ResolveCtx<'_>) -> Vec<HierarchyItem> {
    walk::rewrite(items, ctx.max_depth, |mut item| {
        if item.has_children() {
            if let Some(text) = item.text.take().filter(|t| !t.trim().is_empty()) {
                let key = format!("{}_{}_text", item.key, sanitize_filename(&item.title));
                let mut leading = HierarchyItem::new(TEXT_TITLE, ItemKind::Text, key, item.source_tag);
                leading.text = Some(text);
                leading.section = item.section.clone();
                item.children.insert(0, leading);
            }
        }
        vec![item]
    })
}

/// Pass 5: leftover leaf containers with text become `Text` nodes.
pub fn convert_residual_text(items: Vec<HierarchyItem>, ctx: &ResolveCtx<'_>) -> Vec<HierarchyItem> {
    walk::rewrite(items, ctx.max_depth, |mut item| {
        if item.kind == ItemKind::Container && item.has_text() && !item.has_children() {
            item.kind = ItemKind::Text;
            item.title = TEXT_TITLE.to_string();
        }
        vec![item]
    })
}

/// Pass 6: containers and sections with neither children nor text are removed, bottom-up.
pub fn prune_empty(items: Vec<HierarchyItem>, ctx: &ResolveCtx<'_>) -> Vec<HierarchyItem> {
    walk::rewrite(items, ctx.max_depth, |item| {
        let prunable = matches!(item.kind, ItemKind::Container | ItemKind::Section);
        if prunable && !item.has_children() && !item.has_text() {
            Vec::new()
        } else {
            vec![item]
        }
    })
}

// ── Tests ──
