//! Parent/child category deduplication.
//!
//! Supplier navigation often lists a category next to its own subcategories.
//! Crawling both fetches the same products twice, so a parent that already
//! lists enough products replaces its children.

use crate::config::SelectionConfig;
use crate::selection::validator::CategoryValidator;
use crate::urls;
use std::collections::HashSet;
use tracing::debug;

/// A parent URL and the direct children claimed by it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryGroup {
    pub parent: String,
    pub children: Vec<String>,
}

/// True when `child` sits below `parent` by 1..=`max_extra_segments` path segments
/// on the same host.
fn is_direct_child(parent: &str, child: &str, max_extra_segments: usize) -> bool {
    let (parent_host, _) = urls::host_and_path(parent);
    let (child_host, _) = urls::host_and_path(child);
    if parent_host != child_host {
        return false;
    }

    let prefix = format!("{}/", urls::category_path(parent));
    let child_path = urls::category_path(child);
    let Some(suffix) = child_path.strip_prefix(&prefix) else {
        return false;
    };

    let extra = suffix.split('/').filter(|s| !s.is_empty()).count();
    (1..=max_extra_segments).contains(&extra)
}

/// Groups URLs into parents and their direct children.
///
/// Exact duplicates (same normalized URL) collapse to their first occurrence.
/// Shallow URLs claim children first; every URL ends up either as a parent or
/// inside exactly one parent's children. Groups keep the input order of their
/// parents, children keep input order.
pub fn build_tree(urls_in: &[String], max_extra_segments: usize) -> Vec<CategoryGroup> {
    let mut seen = HashSet::new();
    let unique: Vec<&String> = urls_in.iter().filter(|u| seen.insert(urls::normalize(u))).collect();

    // Stable: equal depths keep input order
    let mut by_depth: Vec<usize> = (0..unique.len()).collect();
    by_depth.sort_by_key(|&i| urls::path_depth(unique[i]));

    let mut claimed = vec![false; unique.len()];
    let mut groups: Vec<(usize, CategoryGroup)> = Vec::new();

    for (pos, &i) in by_depth.iter().enumerate() {
        if claimed[i] {
            continue;
        }
        claimed[i] = true;

        let mut children: Vec<usize> = by_depth[pos + 1..]
            .iter()
            .copied()
            .filter(|&j| !claimed[j] && is_direct_child(unique[i], unique[j], max_extra_segments))
            .collect();
        children.sort_unstable();

        for &j in &children {
            claimed[j] = true;
        }

        groups.push((
            i,
            CategoryGroup {
                parent: unique[i].clone(),
                children: children.into_iter().map(|j| unique[j].clone()).collect(),
            },
        ));
    }

    groups.sort_by_key(|(i, _)| *i);
    groups.into_iter().map(|(_, group)| group).collect()
}

/// Drops children whose parent already lists enough products.
///
/// Only parents with children are validated; singletons pass through.
pub async fn dedupe(
    urls_in: &[String],
    validator: &dyn CategoryValidator,
    config: &SelectionConfig,
) -> Vec<String> {
    let mut out = Vec::new();

    for group in build_tree(urls_in, config.max_child_segments) {
        if group.children.is_empty() {
            out.push(group.parent);
            continue;
        }

        let validation = validator.validate(&group.parent).await;
        if validation.product_count >= config.min_products {
            debug!(
                "{} lists {} products; dropping {} subcategories",
                group.parent,
                validation.product_count,
                group.children.len()
            );
            out.push(group.parent);
        } else {
            debug!(
                "{} lists {} products; keeping {} subcategories",
                group.parent,
                validation.product_count,
                group.children.len()
            );
            out.push(group.parent);
            out.extend(group.children);
        }
    }

    out
}
