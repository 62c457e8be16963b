//! Iterative traversal helpers over owned item trees.

use tracing::warn;

use super::item::HierarchyItem;

/// Bottom-up rewrite: each node is handed to `f` after its children were
/// rewritten, and is replaced by whatever `f` returns (nothing, itself,
/// its children, ...). Branches deeper than `max_depth` are passed to `f`
/// without their descendants being visited.
pub fn rewrite<F>(items: Vec<HierarchyItem>, max_depth: usize, mut f: F) -> Vec<HierarchyItem>
where
    F: FnMut(HierarchyItem) -> Vec<HierarchyItem>,
{
    struct Frame {
        pending: std::vec::IntoIter<HierarchyItem>,
        done: Vec<HierarchyItem>,
        owner: Option<HierarchyItem>,
    }

    let mut stack = vec![Frame {
        pending: items.into_iter(),
        done: Vec::new(),
        owner: None,
    }];

    loop {
        let depth = stack.len() - 1;
        let Some(top) = stack.last_mut() else {
            return Vec::new();
        };
        match top.pending.next() {
            Some(mut item) if item.has_children() && depth < max_depth => {
                let children = std::mem::take(&mut item.children);
                stack.push(Frame {
                    pending: children.into_iter(),
                    done: Vec::new(),
                    owner: Some(item),
                });
            }
            Some(item) => {
                if item.has_children() {
                    warn!(title = %item.title, depth, "max depth exceeded, subtree not rewritten");
                }
                top.done.extend(f(item));
            }
            None => {
                let Some(frame) = stack.pop() else {
                    return Vec::new();
                };
                match (frame.owner, stack.last_mut()) {
                    (Some(mut owner), Some(parent)) => {
                        owner.children = frame.done;
                        parent.done.extend(f(owner));
                    }
                    _ => return frame.done,
                }
            }
        }
    }
}

/// Pre-order visit with depth.
pub fn visit<F>(items: &[HierarchyItem], mut f: F)
where
    F: FnMut(&HierarchyItem, usize),
{
    let mut stack: Vec<(&HierarchyItem, usize)> = items.iter().rev().map(|i| (i, 0)).collect();
    while let Some((item, depth)) = stack.pop() {
        f(item, depth);
        stack.extend(item.children.iter().rev().map(|c| (c, depth + 1)));
    }
}

/// Pre-order list of every node with its index address from the roots.
pub fn addresses(items: &[HierarchyItem]) -> Vec<(Vec<usize>, &HierarchyItem)> {
    let mut out = Vec::new();
    let mut stack: Vec<(Vec<usize>, &HierarchyItem)> =
        items.iter().enumerate().rev().map(|(i, item)| (vec![i], item)).collect();
    while let Some((addr, item)) = stack.pop() {
        for (i, child) in item.children.iter().enumerate().rev() {
            let mut child_addr = addr.clone();
            child_addr.push(i);
            stack.push((child_addr, child));
        }
        out.push((addr, item));
    }
    out
}

pub fn get_mut<'a>(items: &'a mut [HierarchyItem], addr: &[usize]) -> Option<&'a mut HierarchyItem> {
    let (first, rest) = addr.split_first()?;
    let mut current = items.get_mut(*first)?;
    for &i in rest {
        current = current.children.get_mut(i)?;
    }
    Some(current)
}

/// Removes every addressed node. Later siblings and deeper nodes go first so
/// the remaining addresses stay valid.
pub fn remove_all(items: &mut Vec<HierarchyItem>, mut addrs: Vec<Vec<usize>>) -> Vec<HierarchyItem> {
    addrs.sort();
    addrs.dedup();
    let mut removed = Vec::new();
    for addr in addrs.into_iter().rev() {
        let Some((&last, parent)) = addr.split_last() else {
            continue;
        };
        let siblings = if parent.is_empty() {
            Some(&mut *items)
        } else {
            get_mut(items, parent).map(|p| &mut p.children)
        };
        if let Some(siblings) = siblings {
            if last < siblings.len() {
                removed.push(siblings.remove(last));
            }
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hierarchy::item::{ItemKind, SourceTag};

    fn node(title: &str, children: Vec<HierarchyItem>) -> HierarchyItem {
        let mut i = HierarchyItem::new(title, ItemKind::Container, title, SourceTag::Primary);
        i.children = children;
        i
    }

    #[test]
    fn rewrite_is_bottom_up() {
        let tree = vec![node("a", vec![node("b", vec![node("c", vec![])])])];
        let mut seen = Vec::new();
        let out = rewrite(tree, 64, |item| {
            seen.push(item.title.clone());
            vec![item]
        });
        assert_eq!(seen, vec!["c", "b", "a"]);
        assert_eq!(out[0].children[0].children[0].title, "c");
    }

    #[test]
    fn rewrite_can_splice_and_drop() {
        let tree = vec![node("a", vec![node("wrap", vec![node("x", vec![]), node("y", vec![])]), node("drop", vec![])])];
        let out = rewrite(tree, 64, |item| match item.title.as_str() {
            "wrap" => item.children,
            "drop" => Vec::new(),
            _ => vec![item],
        });
        let titles: Vec<&str> = out[0].children.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["x", "y"]);
    }

    #[test]
    fn rewrite_depth_guard_keeps_subtree() {
        let tree = vec![node("a", vec![node("b", vec![node("c", vec![])])])];
        let mut seen = Vec::new();
        let out = rewrite(tree, 1, |item| {
            seen.push(item.title.clone());
            vec![item]
        });
        assert_eq!(seen, vec!["b", "a"]);
        assert_eq!(out[0].children[0].children[0].title, "c");
    }

    #[test]
    fn addresses_and_removal() {
        let mut tree = vec![node("a", vec![node("b", vec![]), node("c", vec![])]), node("d", vec![])];
        let addrs: Vec<Vec<usize>> = addresses(&tree).into_iter().map(|(a, _)| a).collect();
        assert_eq!(addrs, vec![vec![0], vec![0, 0], vec![0, 1], vec![1]]);
        let removed = remove_all(&mut tree, vec![vec![0, 0], vec![1]]);
        assert_eq!(removed.len(), 2);
        assert_eq!(tree.len(), 1);
        assert_eq!(tree[0].children[0].title, "c");
    }
}
