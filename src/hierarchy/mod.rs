pub mod builder;
pub mod context;
pub mod dialect;
pub mod extract;
pub mod html;
pub mod item;
pub mod merge;
pub mod paths;
pub mod resolve;
pub mod sections;
pub mod walk;

use serde_json::Value;
use tracing::info;

use crate::source::SourceNode;
use builder::{build_tree, BuildOutput};
use context::{ExtractContext, RunParams};
use item::{HierarchyItem, PageHierarchy, SourceTag};
use resolve::ResolveCtx;

/// Pipeline: build both trees → group sections → resolve → merge + dedup → resolve again → paths.
pub fn reconcile(raw: &Value, model: Option<&Value>, params: RunParams) -> PageHierarchy {
    let content = raw.get("jcr:content").unwrap_or(raw);
    let page_title = content
        .get("jcr:title")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| last_segment(&params.page_path));
    let link_url = format!("{}.html", params.page_path);

    let ctx = ExtractContext::build(content, model, params);
    let (primary, secondary) = rayon::join(
        || SourceNode::root(content, SourceTag::Primary).map(|root| build_tree(root, &ctx)),
        || model.and_then(|m| SourceNode::root(m, SourceTag::Secondary)).map(|root| build_tree(root, &ctx)),
    );

    let separator = ctx.params.path_separator.as_str();
    let resolve_ctx = ResolveCtx {
        dialect: ctx.dialect(),
        max_depth: ctx.params.max_depth,
    };

    let mut banner_images = Vec::new();
    let mut prepare = |output: Option<BuildOutput>| -> Vec<HierarchyItem> {
        let Some(output) = output else {
            return Vec::new();
        };
        banner_images.extend(output.banner_images);
        let grouped = sections::group_sections(output.items, &output.sections, separator);
        resolve::run_passes(grouped, resolve::FULL_PASSES, &resolve_ctx)
    };
    let primary = prepare(primary);
    let secondary = prepare(secondary);
    info!(primary = primary.len(), secondary = secondary.len(), "top-level items before merge");

    let mut items = merge::fold(primary, secondary);
    merge::dedup_items(&mut items, ctx.dialect(), separator);
    merge::dedup_paths(&mut items, separator);
    let mut items = resolve::run_passes(items, resolve::MERGED_PASSES, &resolve_ctx);
    paths::recalculate(&mut items, separator);

    banner_images.dedup();
    PageHierarchy {
        title: page_title,
        items,
        link_url,
        banner_images,
    }
}

fn last_segment(page_path: &str) -> String {
    page_path.rsplit('/').next().unwrap_or_default().to_string()
}

// ── Tests ──
