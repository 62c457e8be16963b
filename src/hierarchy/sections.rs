use std::collections::HashMap;

use tracing::debug;

use super::item::{HierarchyItem, ItemKind};

/// Partitions top-level items into titled sections.
///
/// Section membership recorded by the builder is preferred; items with no
/// membership stay at the top level where they were. Only when that yields
/// no section at all are items grouped by the first ancestor in their source
/// path, ignoring ancestors every item shares.
pub fn group_sections(items: Vec<HierarchyItem>, section_order: &[String], separator: &str) -> Vec<HierarchyItem> {
    let has_metadata = items.iter().any(|i| i.section.is_some());
    if has_metadata {
        cluster(items, section_order, |item| item.section.clone())
    } else {
        let shared = shared_ancestors(&items, separator);
        debug!(shared, "no section metadata, grouping by source path prefix");
        cluster(items, &[], |item| first_ancestor(&item.source_path, separator, shared))
    }
}

/// Groups items by `membership`, placing each section where its first member appeared.
fn cluster<F>(items: Vec<HierarchyItem>, section_order: &[String], membership: F) -> Vec<HierarchyItem>
where
    F: Fn(&HierarchyItem) -> Option<String>,
{
    enum Entry {
        Loose(HierarchyItem),
        Section(usize),
    }

    let mut entries: Vec<Entry> = Vec::new();
    let mut sections: Vec<(String, Vec<HierarchyItem>)> = Vec::new();
    let mut index: HashMap<String, usize> = HashMap::new();

    for item in items {
        match membership(&item) {
            Some(title) => {
                let idx = *index.entry(title.clone()).or_insert_with(|| {
                    sections.push((title, Vec::new()));
                    entries.push(Entry::Section(sections.len() - 1));
                    sections.len() - 1
                });
                sections[idx].1.push(item);
            }
            None => entries.push(Entry::Loose(item)),
        }
    }

    let mut built: Vec<Option<(String, Vec<HierarchyItem>)>> = sections.into_iter().map(Some).collect();
    let mut out = Vec::with_capacity(entries.len());
    for (position, entry) in entries.into_iter().enumerate() {
        match entry {
            Entry::Loose(item) => out.push(item),
            Entry::Section(idx) => {
                let Some((title, members)) = built[idx].take() else {
                    continue;
                };
                let order = section_order.iter().position(|s| *s == title).unwrap_or(position);
                out.push(make_section(title, members, order));
            }
        }
    }
    out
}

fn make_section(title: String, mut members: Vec<HierarchyItem>, order: usize) -> HierarchyItem {
    // "Promo" > "Promo" collapses to the single item
    if members.len() == 1 && members[0].title == title {
        let mut only = members.remove(0);
        only.section_order = Some(order);
        return only;
    }
    let source_tag = members[0].source_tag;
    let mut section = HierarchyItem::new(title.clone(), ItemKind::Section, section_key(&title), source_tag);
    section.section = Some(title);
    section.section_order = Some(order);
    section.children = members;
    section
}

pub fn section_key(title: &str) -> String {
    let slug: String = title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_alphanumeric() { c } else { '_' })
        .collect();
    format!("section_{}", slug.trim_matches('_'))
}

/// Number of leading ancestor segments common to every item's source path.
fn shared_ancestors(items: &[HierarchyItem], separator: &str) -> usize {
    let ancestors: Vec<Vec<&str>> = items
        .iter()
        .map(|item| {
            let mut parts: Vec<&str> = item.source_path.split(separator).collect();
            parts.pop();
            parts
        })
        .collect();
    let Some((first, rest)) = ancestors.split_first() else {
        return 0;
    };
    (0..first.len())
        .take_while(|&n| rest.iter().all(|a| a.get(n) == Some(&first[n])))
        .count()
}

/// The segment after the `skip` shared ones, if the item sits below it.
fn first_ancestor(path: &str, separator: &str, skip: usize) -> Option<String> {
    let mut parts = path.split(separator).skip(skip);
    let first = parts.next()?.trim();
    parts.next()?;
    if first.is_empty() {
        None
    } else {
        Some(first.to_string())
    }
}

// ── Tests ──
