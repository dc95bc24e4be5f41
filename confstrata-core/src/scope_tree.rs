//! Scope hierarchy: resolution and merging with the commerce source of truth.
//!
//! The tree holds one root per configuration system. The root with code
//! [`COMMERCE_ROOT_CODE`] mirrors the commerce website / store group / store view
//! hierarchy; every other root (custom integrations) is owned by its operators and
//! is never touched by a commerce sync.

use crate::error::{Result, StrataError};
use crate::types::{ScopeNode, ScopeRef};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use ulid::Ulid;

pub const COMMERCE_ROOT_CODE: &str = "global";

pub const LEVEL_GLOBAL: &str = "global";
pub const LEVEL_WEBSITE: &str = "website";
pub const LEVEL_STORE: &str = "store";
pub const LEVEL_STORE_VIEW: &str = "store_view";

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScopeTree {
    pub roots: Vec<ScopeNode>,
}

/// How a caller names a scope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ScopeSelector {
    Id { id: String },
    CodeLevel { code: String, level: String },
}

impl ScopeSelector {
    pub fn by_id(id: impl Into<String>) -> Self {
        ScopeSelector::Id { id: id.into() }
    }

    pub fn by_code(code: impl Into<String>, level: impl Into<String>) -> Self {
        ScopeSelector::CodeLevel {
            code: code.into(),
            level: level.into(),
        }
    }

    pub fn validate(&self) -> Result<()> {
        match self {
            ScopeSelector::Id { id } if id.trim().is_empty() => Err(StrataError::InvalidScope(
                "scope id cannot be empty".to_string(),
            )),
            ScopeSelector::CodeLevel { code, level }
                if code.trim().is_empty() || level.trim().is_empty() =>
            {
                Err(StrataError::InvalidScope(
                    "scope code and level are both required".to_string(),
                ))
            }
            _ => Ok(()),
        }
    }

    fn matches(&self, node: &ScopeNode) -> bool {
        match self {
            ScopeSelector::Id { id } => node.id == *id,
            ScopeSelector::CodeLevel { code, level } => node.code == *code && node.level == *level,
        }
    }

    fn describe(&self) -> String {
        match self {
            ScopeSelector::Id { id } => format!("id={}", id),
            ScopeSelector::CodeLevel { code, level } => format!("code={} level={}", code, level),
        }
    }
}

impl ScopeTree {
    pub fn new(roots: Vec<ScopeNode>) -> Self {
        Self { roots }
    }

    /// Tree used before anything has been synced: a lone global scope.
    pub fn with_global_root() -> Self {
        Self::new(vec![ScopeNode {
            id: COMMERCE_ROOT_CODE.to_string(),
            code: COMMERCE_ROOT_CODE.to_string(),
            label: "Global".to_string(),
            level: LEVEL_GLOBAL.to_string(),
            is_editable: true,
            is_final: false,
            is_removable: false,
            commerce_id: None,
            children: None,
        }])
    }

    pub fn commerce_root(&self) -> Option<&ScopeNode> {
        self.roots
            .iter()
            .find(|root| root.code == COMMERCE_ROOT_CODE)
    }

    pub fn find(&self, selector: &ScopeSelector) -> Option<&ScopeNode> {
        fn walk<'a>(nodes: &'a [ScopeNode], selector: &ScopeSelector) -> Option<&'a ScopeNode> {
            for node in nodes {
                if selector.matches(node) {
                    return Some(node);
                }
                if let Some(found) = walk(node.children(), selector) {
                    return Some(found);
                }
            }
            None
        }

        walk(&self.roots, selector)
    }

    pub fn find_by_id(&self, id: &str) -> Option<&ScopeNode> {
        self.find(&ScopeSelector::by_id(id))
    }

    pub fn find_by_code_level(&self, code: &str, level: &str) -> Option<&ScopeNode> {
        self.find(&ScopeSelector::by_code(code, level))
    }

    /// Scopes from the root down to (and including) the selected one.
    pub fn ancestor_chain(&self, selector: &ScopeSelector) -> Option<Vec<ScopeRef>> {
        fn walk(nodes: &[ScopeNode], selector: &ScopeSelector, path: &mut Vec<ScopeRef>) -> bool {
            for node in nodes {
                path.push(node.scope_ref());
                if selector.matches(node) || walk(node.children(), selector, path) {
                    return true;
                }
                path.pop();
            }
            false
        }

        let mut path = Vec::new();
        walk(&self.roots, selector, &mut path).then_some(path)
    }

    /// Validates the selector and resolves it to its ancestor chain.
    pub fn resolve(&self, selector: &ScopeSelector) -> Result<Vec<ScopeRef>> {
        selector.validate()?;
        self.ancestor_chain(selector)
            .ok_or_else(|| StrataError::ScopeNotFound(selector.describe()))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommerceWebsite {
    pub id: i64,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub default_group_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommerceStoreGroup {
    pub id: i64,
    pub website_id: i64,
    pub code: String,
    pub name: String,
    #[serde(default)]
    pub root_category_id: Option<i64>,
    #[serde(default)]
    pub default_store_id: Option<i64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommerceStoreView {
    pub id: i64,
    pub code: String,
    pub name: String,
    pub website_id: i64,
    pub store_group_id: i64,
    #[serde(default)]
    pub is_active: Option<i64>,
}

/// Snapshot of the external commerce hierarchy.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CommerceHierarchy {
    #[serde(default)]
    pub websites: Vec<CommerceWebsite>,
    #[serde(default)]
    pub store_groups: Vec<CommerceStoreGroup>,
    #[serde(default)]
    pub store_views: Vec<CommerceStoreView>,
}

// Commerce reserves id 0 for its admin website/group/view.
const ADMIN_ID: i64 = 0;

type NodeKey = (String, String, i64);

/// Existing commerce-sourced nodes keyed by (parent id, level, commerce id).
struct ExistingIndex<'a> {
    nodes: HashMap<NodeKey, &'a ScopeNode>,
}

impl<'a> ExistingIndex<'a> {
    fn build(tree: &'a ScopeTree) -> (Self, &'a str) {
        let mut nodes = HashMap::new();
        let root_id = match tree.commerce_root() {
            Some(root) => {
                Self::index_children(root, &mut nodes);
                root.id.as_str()
            }
            None => "",
        };
        (Self { nodes }, root_id)
    }

    fn index_children(parent: &'a ScopeNode, nodes: &mut HashMap<NodeKey, &'a ScopeNode>) {
        for child in parent.children() {
            if let Some(commerce_id) = child.commerce_id {
                nodes.insert((parent.id.clone(), child.level.clone(), commerce_id), child);
            }
            Self::index_children(child, nodes);
        }
    }

    fn get(&self, parent_id: &str, level: &str, commerce_id: i64) -> Option<&'a ScopeNode> {
        self.nodes
            .get(&(parent_id.to_string(), level.to_string(), commerce_id))
            .copied()
    }
}

fn merge_node(
    index: &ExistingIndex<'_>,
    parent_id: &str,
    level: &str,
    commerce_id: i64,
    code: &str,
    label: &str,
) -> ScopeNode {
    match index.get(parent_id, level, commerce_id) {
        Some(existing) => ScopeNode {
            code: code.to_string(),
            label: label.to_string(),
            children: None,
            ..existing.clone()
        },
        None => {
            let id = Ulid::new().to_string();
            tracing::debug!(
                "minted scope id={} for {} commerce_id={}",
                id,
                level,
                commerce_id
            );
            ScopeNode {
                id,
                code: code.to_string(),
                label: label.to_string(),
                level: level.to_string(),
                is_editable: true,
                is_final: level == LEVEL_STORE_VIEW,
                is_removable: false,
                commerce_id: Some(commerce_id),
                children: None,
            }
        }
    }
}

fn non_empty(children: Vec<ScopeNode>) -> Option<Vec<ScopeNode>> {
    if children.is_empty() {
        None
    } else {
        Some(children)
    }
}

/// Rebuild the website / store group / store view subtree from `fresh`,
/// keeping the ids of nodes that already exist under the same parent.
///
/// Returns the websites, i.e. the new children of the commerce root.
pub fn merge_commerce_scopes(fresh: &CommerceHierarchy, existing: &ScopeTree) -> Vec<ScopeNode> {
    let (index, root_id) = ExistingIndex::build(existing);

    let mut groups_by_website: HashMap<i64, Vec<&CommerceStoreGroup>> = HashMap::new();
    for group in fresh.store_groups.iter().filter(|g| g.id != ADMIN_ID) {
        groups_by_website.entry(group.website_id).or_default().push(group);
    }

    let mut views_by_group: HashMap<i64, Vec<&CommerceStoreView>> = HashMap::new();
    for view in fresh.store_views.iter().filter(|v| v.id != ADMIN_ID) {
        views_by_group.entry(view.store_group_id).or_default().push(view);
    }

    let mut websites = Vec::new();
    for website in fresh.websites.iter().filter(|w| w.id != ADMIN_ID) {
        let mut website_node = merge_node(
            &index,
            root_id,
            LEVEL_WEBSITE,
            website.id,
            &website.code,
            &website.name,
        );

        let mut group_nodes = Vec::new();
        for group in groups_by_website.remove(&website.id).unwrap_or_default() {
            let mut group_node = merge_node(
                &index,
                &website_node.id,
                LEVEL_STORE,
                group.id,
                &group.code,
                &group.name,
            );

            let view_nodes: Vec<ScopeNode> = views_by_group
                .remove(&group.id)
                .unwrap_or_default()
                .into_iter()
                .map(|view| {
                    merge_node(
                        &index,
                        &group_node.id,
                        LEVEL_STORE_VIEW,
                        view.id,
                        &view.code,
                        &view.name,
                    )
                })
                .collect();

            group_node.children = non_empty(view_nodes);
            group_nodes.push(group_node);
        }

        website_node.children = non_empty(group_nodes);
        websites.push(website_node);
    }

    for (website_id, groups) in &groups_by_website {
        tracing::warn!(
            "skipping {} store group(s) of unknown website {}",
            groups.len(),
            website_id
        );
    }
    for (group_id, views) in &views_by_group {
        tracing::warn!(
            "skipping {} store view(s) of unknown store group {}",
            views.len(),
            group_id
        );
    }

    websites
}

/// Swap the commerce root's children for `subtree`; every other root is kept as is.
pub fn build_updated_scope_tree(subtree: Vec<ScopeNode>, existing: &ScopeTree) -> ScopeTree {
    let children = non_empty(subtree);
    let mut roots = existing.roots.clone();

    match roots.iter_mut().find(|root| root.code == COMMERCE_ROOT_CODE) {
        Some(root) => root.children = children,
        None => {
            let mut root = ScopeTree::with_global_root().roots.remove(0);
            root.children = children;
            roots.insert(0, root);
        }
    }

    ScopeTree::new(roots)
}
