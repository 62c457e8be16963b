use super::builder::join_path;
use super::item::HierarchyItem;

/// Rewrites every `path` from tree position: roots get their title, children
/// get `parent.path + separator + title`.
pub fn recalculate(items: &mut [HierarchyItem], separator: &str) {
    let mut stack: Vec<(&mut HierarchyItem, String)> = items.iter_mut().map(|i| (i, String::new())).collect();
    while let Some((item, parent_path)) = stack.pop() {
        item.path = join_path(&parent_path, &item.title, separator);
        let own = item.path.clone();
        stack.extend(item.children.iter_mut().map(|c| (c, own.clone())));
    }
}
