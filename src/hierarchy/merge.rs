//! Folding the model tree into the raw tree, then removing duplicates.
//!
//! Dedup runs in two passes. The first groups nodes by `(kind, key, title)`
//! and keeps every member whose content conflicts; only true duplicates
//! collapse to one survivor. The second collapses nodes that share a path
//! when some of them carry nothing.

use std::collections::HashMap;

use itertools::Itertools;
use tracing::{debug, warn};

use super::dialect::SourceDialect;
use super::item::{HierarchyItem, ItemKind, SourceTag};
use super::paths;
use super::walk;

const PANEL_TITLE_WEIGHT: f64 = 10.0;
const REAL_BUTTON_ID_WEIGHT: f64 = 5.0;
const TEXT_CHAR_WEIGHT: f64 = 0.001;

/// Appends secondary items into the primary tree. Same-level nodes that
/// share kind and title and both have children are merged recursively;
/// items matching a node inside a primary section are routed into it.
/// Anything else is appended and left for [`dedup_items`].
pub fn fold(mut primary: Vec<HierarchyItem>, secondary: Vec<HierarchyItem>) -> Vec<HierarchyItem> {
    let mut stack: Vec<(&mut Vec<HierarchyItem>, Vec<HierarchyItem>)> = vec![(&mut primary, secondary)];
    while let Some((target, incoming)) = stack.pop() {
        let mut nested: Vec<(usize, Vec<HierarchyItem>)> = Vec::new();
        for mut item in incoming {
            let same = |t: &HierarchyItem| {
                t.kind == item.kind && t.title == item.title && t.has_children() && item.has_children()
            };
            if let Some(pos) = target.iter().position(same) {
                let existing = &mut target[pos];
                existing.link_sources.fill_from(&item.link_sources);
                if existing.section_order.is_none() {
                    existing.section_order = item.section_order;
                }
                route(&mut nested, pos, std::mem::take(&mut item.children));
            } else if let Some(pos) = target
                .iter()
                .position(|t| t.kind == ItemKind::Section && t.children.iter().any(same))
            {
                route(&mut nested, pos, vec![item]);
            } else {
                target.push(item);
            }
        }
        for (pos, child) in target.iter_mut().enumerate() {
            if let Some(idx) = nested.iter().position(|(p, _)| *p == pos) {
                let (_, incoming) = nested.swap_remove(idx);
                stack.push((&mut child.children, incoming));
            }
        }
    }
    primary
}

fn route(nested: &mut Vec<(usize, Vec<HierarchyItem>)>, pos: usize, items: Vec<HierarchyItem>) {
    match nested.iter_mut().find(|(p, _)| *p == pos) {
        Some((_, pending)) => pending.extend(items),
        None => nested.push((pos, items)),
    }
}

/// Tie-break score for a duplicate group member.
pub fn score(item: &HierarchyItem, dialect: &dyn SourceDialect) -> f64 {
    let mut score = 0.0;
    if item.panel_title.is_some() {
        score += PANEL_TITLE_WEIGHT;
    }
    if item.id.as_deref().is_some_and(|id| dialect.is_real_button_id(id)) {
        score += REAL_BUTTON_ID_WEIGHT;
    }
    score + item.text_len() as f64 * TEXT_CHAR_WEIGHT
}

/// Members of a group have content that must not be collapsed.
fn conflicting(members: &[&HierarchyItem]) -> bool {
    fn differs<F>(members: &[&HierarchyItem], field: F) -> bool
    where
        F: Fn(&HierarchyItem) -> Option<&str>,
    {
        !members.iter().filter_map(|&m| field(m)).filter(|v| !v.is_empty()).all_equal()
    }

    match members[0].kind {
        ItemKind::Button => {
            differs(members, |m| m.link_sources.clickable_url.as_deref())
                || differs(members, |m| m.link_sources.analytics_url.as_deref())
                || differs(members, |m| m.link_sources.storage_url.as_deref())
        }
        ItemKind::Accordion => differs(members, |m| m.text.as_deref().map(str::trim)),
        _ => false,
    }
}

/// Top-level section a node lives under.
fn section_of(items: &[HierarchyItem], addr: &[usize], item: &HierarchyItem) -> Option<String> {
    match addr.first().and_then(|&i| items.get(i)) {
        Some(root) if root.kind == ItemKind::Section && addr.len() > 1 => Some(root.title.clone()),
        _ => item.section.clone(),
    }
}

struct Resolution {
    survivor: Vec<usize>,
    dropped: Vec<Vec<usize>>,
}

/// Collapses `(kind, key, title)` duplicates to one survivor each.
pub fn dedup_items(items: &mut Vec<HierarchyItem>, dialect: &dyn SourceDialect, separator: &str) {
    paths::recalculate(items, separator);

    let mut resolutions: Vec<Resolution> = Vec::new();
    {
        let view: &[HierarchyItem] = items;
        let nodes = walk::addresses(view);
        let groups = nodes
            .iter()
            .into_group_map_by(|(_, item)| (item.kind, item.key.clone(), item.title.clone()));
        // Stable processing order: first-seen address of each group.
        let ordered = groups.into_values().filter(|g| g.len() > 1).sorted_by(|a, b| a[0].0.cmp(&b[0].0));

        for group in ordered {
            let by_section = group
                .into_iter()
                .map(|(addr, item)| (section_of(view, addr, item), (addr, *item)))
                .into_group_map();
            for (section, members) in by_section.into_iter().sorted_by(|a, b| a.1[0].0.cmp(b.1[0].0)) {
                if members.len() < 2 {
                    continue;
                }
                let refs: Vec<&HierarchyItem> = members.iter().map(|(_, item)| *item).collect();
                if conflicting(&refs) {
                    debug!(title = %refs[0].title, kind = refs[0].kind.as_str(), "conflicting duplicates kept");
                    continue;
                }
                let survivor = if refs.iter().map(|m| m.path.as_str()).all_equal() {
                    warn!(path = %refs[0].path, count = refs.len(), "same-path duplicates, keeping first");
                    0
                } else {
                    best_member(&refs, dialect)
                };
                debug!(
                    title = %refs[0].title,
                    section = section.as_deref().unwrap_or("-"),
                    dropped = refs.len() - 1,
                    "duplicates collapsed"
                );
                resolutions.push(Resolution {
                    survivor: members[survivor].0.clone(),
                    dropped: members
                        .iter()
                        .enumerate()
                        .filter(|(i, _)| *i != survivor)
                        .map(|(_, (addr, _))| addr.to_vec())
                        .collect(),
                });
            }
        }
    }

    apply(items, resolutions);
}

/// Highest score wins; ties prefer the primary source, then first seen.
fn best_member(members: &[&HierarchyItem], dialect: &dyn SourceDialect) -> usize {
    let mut best = 0;
    let mut best_score = score(members[0], dialect);
    for (i, member) in members.iter().enumerate().skip(1) {
        let s = score(member, dialect);
        let promotes_primary =
            s == best_score && member.source_tag == SourceTag::Primary && members[best].source_tag != SourceTag::Primary;
        if s > best_score || promotes_primary {
            best = i;
            best_score = s;
        }
    }
    best
}

/// Merges dropped members' links into survivors, then removes the dropped nodes.
fn apply(items: &mut Vec<HierarchyItem>, resolutions: Vec<Resolution>) {
    let survivors: Vec<Vec<usize>> = resolutions.iter().map(|r| r.survivor.clone()).collect();
    let mut doomed = Vec::new();
    for res in resolutions {
        for addr in res.dropped {
            // Never remove an ancestor of a node that is kept.
            if survivors.iter().any(|s| s.starts_with(&addr)) {
                continue;
            }
            let Some(dropped) = walk::get_mut(items, &addr).map(|d| (d.link_sources.clone(), d.section_order)) else {
                continue;
            };
            if let Some(survivor) = walk::get_mut(items, &res.survivor) {
                survivor.link_sources.fill_from(&dropped.0);
                if survivor.section_order.is_none() {
                    survivor.section_order = dropped.1;
                }
            }
            doomed.push(addr);
        }
    }
    walk::remove_all(items, doomed);
}

fn has_content(item: &HierarchyItem) -> bool {
    item.has_children() || item.has_text() || !item.link_sources.is_empty() || item.image_url.is_some()
}

/// Drops content-less nodes that share their path with a node carrying content.
pub fn dedup_paths(items: &mut Vec<HierarchyItem>, separator: &str) {
    paths::recalculate(items, separator);

    let mut doomed = Vec::new();
    let mut carried: Vec<(Vec<usize>, usize)> = Vec::new();
    {
        let nodes = walk::addresses(items);
        let mut by_path: HashMap<&str, Vec<&(Vec<usize>, &HierarchyItem)>> = HashMap::new();
        for node in &nodes {
            by_path.entry(node.1.path.as_str()).or_default().push(node);
        }
        for group in by_path.values().filter(|g| g.len() > 1) {
            let (rich, empty): (Vec<_>, Vec<_>) = group.iter().copied().partition(|(_, item)| has_content(item));
            let Some(keeper) = rich.first() else {
                continue;
            };
            for (addr, item) in empty {
                if keeper.1.section_order.is_none() {
                    if let Some(order) = item.section_order {
                        carried.push((keeper.0.clone(), order));
                    }
                }
                debug!(path = %item.path, "empty duplicate path removed");
                doomed.push(addr.clone());
            }
        }
    }

    for (addr, order) in carried {
        if let Some(keeper) = walk::get_mut(items, &addr) {
            keeper.section_order.get_or_insert(order);
        }
    }
    walk::remove_all(items, doomed);
}

// ── Tests ──
