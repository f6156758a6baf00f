//! FILENAME: pivot-dataset/src/tree.rs
//! Tree Builder - Turns sorted key arrays into header trees.
//!
//! Nodes are built in an arena: a path -> index map scoped to one build call
//! deduplicates shared prefixes, children are index lists. The arena is then
//! materialized into owned `HeaderTreeNode`s.
//!
//! Node ids are the flat cube keys the node stands for, so a root-to-leaf id
//! path resolves straight to cube cells:
//! - dimension node: flat key of its path
//! - subtotal node: the subtotal key of its boundary
//! - grand-total node: the grand-total label
//! - indicator leaf: parent id + separator + indicator key

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::definition::Indicator;
use crate::value::{flat_key, DimensionKey, KEY_SEPARATOR};

/// One header node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct HeaderTreeNode {
    #[serde(default)]
    pub id: String,

    pub value: String,

    #[serde(default)]
    pub dimension_key: Option<String>,

    #[serde(default)]
    pub indicator_key: Option<String>,

    /// Number of dimension levels spanned (grand-total node only).
    #[serde(default)]
    pub row_span: Option<usize>,

    #[serde(default)]
    pub children: Vec<HeaderTreeNode>,
}

impl HeaderTreeNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

fn child_id(parent_id: &str, part: &str) -> String {
    let mut id = String::with_capacity(parent_id.len() + part.len() + 1);
    id.push_str(parent_id);
    id.push(KEY_SEPARATOR);
    id.push_str(part);
    id
}

fn indicator_nodes(parent_id: &str, indicators: &[Indicator]) -> Vec<HeaderTreeNode> {
    indicators
        .iter()
        .map(|indicator| HeaderTreeNode {
            id: child_id(parent_id, &indicator.key),
            value: indicator.display_title().to_string(),
            indicator_key: Some(indicator.key.clone()),
            ..Default::default()
        })
        .collect()
}

// ============================================================================
// BUILD OPTIONS
// ============================================================================

/// Inputs of one tree build.
#[derive(Debug, Clone, Copy)]
pub struct TreeBuildOptions<'a> {
    pub dimensions: &'a [String],
    /// Indicators hung under the deepest nodes, when this axis carries them.
    pub indicators: Option<&'a [Indicator]>,
    /// Per dimension: synthesize a subtotal chain below nodes of this level.
    pub subtotal_flags: &'a [bool],
    pub grand_total: bool,
    pub grand_total_label: &'a str,
    pub sub_total_label: &'a str,
    /// Whether subtotal cube keys end with the literal subtotal label.
    pub label_subtotal_keys: bool,
}

impl<'a> TreeBuildOptions<'a> {
    fn indicators(&self) -> &'a [Indicator] {
        self.indicators.unwrap_or(&[])
    }
}

// ============================================================================
// ARENA
// ============================================================================

struct ArenaNode {
    node: HeaderTreeNode,
    children: Vec<usize>,
}

#[derive(Default)]
struct Arena {
    nodes: Vec<ArenaNode>,
    roots: Vec<usize>,
    by_path: FxHashMap<String, usize>,
}

impl Arena {
    fn push(&mut self, node: HeaderTreeNode) -> usize {
        self.nodes.push(ArenaNode {
            node,
            children: Vec::new(),
        });
        self.nodes.len() - 1
    }

    fn materialize(&mut self, index: usize) -> HeaderTreeNode {
        let children = std::mem::take(&mut self.nodes[index].children);
        let mut node = std::mem::take(&mut self.nodes[index].node);
        let mut built: Vec<HeaderTreeNode> =
            children.into_iter().map(|child| self.materialize(child)).collect();
        // Indicator leaves are created eagerly on the node itself.
        built.append(&mut node.children);
        node.children = built;
        node
    }

    fn into_tree(mut self) -> Vec<HeaderTreeNode> {
        let roots = std::mem::take(&mut self.roots);
        roots.into_iter().map(|root| self.materialize(root)).collect()
    }
}

// ============================================================================
// BUILDERS
// ============================================================================

/// Subtotal placeholder chain below a node at `index`, one level per deeper
/// dimension; indicators hang under the deepest chain node.
fn subtotal_chain(
    path_id: &str,
    index: usize,
    depth: usize,
    options: &TreeBuildOptions<'_>,
) -> HeaderTreeNode {
    let id = if options.label_subtotal_keys {
        child_id(path_id, options.sub_total_label)
    } else {
        path_id.to_string()
    };

    let mut level = depth - 1;
    let mut deepest = HeaderTreeNode {
        id: id.clone(),
        value: options.sub_total_label.to_string(),
        dimension_key: options.dimensions.get(level).cloned(),
        children: indicator_nodes(&id, options.indicators()),
        ..Default::default()
    };
    while level > index + 1 {
        level -= 1;
        deepest = HeaderTreeNode {
            id: id.clone(),
            value: options.sub_total_label.to_string(),
            dimension_key: options.dimensions.get(level).cloned(),
            children: vec![deepest],
            ..Default::default()
        };
    }
    deepest
}

/// Grid-layout builder: subtotal chains and an optional trailing grand-total node.
pub fn build_tree(keys: &[DimensionKey], options: &TreeBuildOptions<'_>) -> Vec<HeaderTreeNode> {
    let mut arena = Arena::default();

    for key in keys {
        let mut parent: Option<usize> = None;
        let mut path: Vec<&str> = Vec::with_capacity(key.len());
        for (index, value) in key.iter().enumerate() {
            path.push(value);
            let path_id = flat_key(&path);
            if let Some(&existing) = arena.by_path.get(&path_id) {
                parent = Some(existing);
                continue;
            }

            let is_deepest = index + 1 == key.len();
            let mut node = HeaderTreeNode {
                value: value.clone(),
                dimension_key: options.dimensions.get(index).cloned(),
                children: if is_deepest {
                    indicator_nodes(&path_id, options.indicators())
                } else {
                    Vec::new()
                },
                ..Default::default()
            };
            let chain = (!is_deepest && options.subtotal_flags.get(index).copied().unwrap_or(false))
                .then(|| subtotal_chain(&path_id, index, key.len(), options));
            node.id = path_id.clone();

            let created = arena.push(node);
            if let Some(chain) = chain {
                let chain = arena.push(chain);
                arena.nodes[created].children.push(chain);
            }
            arena.by_path.insert(path_id, created);
            attach(&mut arena, parent, created, index, options.subtotal_flags);
            parent = Some(created);
        }
    }

    let mut tree = arena.into_tree();
    if options.grand_total {
        let id = options.grand_total_label.to_string();
        tree.push(HeaderTreeNode {
            children: indicator_nodes(&id, options.indicators()),
            id,
            value: options.grand_total_label.to_string(),
            dimension_key: options.dimensions.first().cloned(),
            row_span: Some(options.dimensions.len()),
            ..Default::default()
        });
    }
    tree
}

/// Attaches a new node. Below a subtotal boundary the parent's last child is
/// its subtotal chain, so the node goes in front of it.
fn attach(arena: &mut Arena, parent: Option<usize>, child: usize, index: usize, flags: &[bool]) {
    let Some(parent) = parent else {
        arena.roots.push(child);
        return;
    };
    let parent_has_chain = index > 0 && flags.get(index - 1).copied().unwrap_or(false);
    let siblings = &mut arena.nodes[parent].children;
    if parent_has_chain && !siblings.is_empty() {
        siblings.insert(siblings.len() - 1, child);
    } else {
        siblings.push(child);
    }
}

/// Tree-hierarchy builder: plain nesting, no subtotal or grand-total nodes.
pub fn build_plain_tree(keys: &[DimensionKey], options: &TreeBuildOptions<'_>) -> Vec<HeaderTreeNode> {
    let plain = TreeBuildOptions {
        subtotal_flags: &[],
        grand_total: false,
        ..*options
    };
    build_tree(keys, &plain)
}

// ============================================================================
// FLATTENING & CUSTOM TREES
// ============================================================================

/// One root-to-leaf id path per leaf, depth first.
pub fn tree_to_paths(tree: &[HeaderTreeNode]) -> Vec<Vec<String>> {
    fn walk(node: &HeaderTreeNode, path: &mut Vec<String>, paths: &mut Vec<Vec<String>>) {
        path.push(node.id.clone());
        if node.children.is_empty() {
            paths.push(path.clone());
        } else {
            for child in &node.children {
                walk(child, path, paths);
            }
        }
        path.pop();
    }

    let mut paths = Vec::new();
    let mut path = Vec::new();
    for node in tree {
        walk(node, &mut path, &mut paths);
    }
    paths
}

/// Normalizes a caller-supplied tree.
///
/// When `indicators` is given (the axis carries indicators), every leaf with
/// no indicator on itself or an ancestor gains the full indicator list, and an
/// empty tree becomes the indicator list. Nodes without an id get their path id.
pub fn normalize_custom_tree(
    mut tree: Vec<HeaderTreeNode>,
    indicators: Option<&[Indicator]>,
) -> Vec<HeaderTreeNode> {
    fn fill(nodes: &mut [HeaderTreeNode], parent_id: Option<&str>, has_indicator: bool, indicators: Option<&[Indicator]>) {
        for node in nodes.iter_mut() {
            if node.id.is_empty() {
                let part = node.indicator_key.as_deref().unwrap_or(&node.value);
                node.id = match parent_id {
                    Some(parent_id) => child_id(parent_id, part),
                    None => part.to_string(),
                };
            }
            let covered = has_indicator || node.indicator_key.is_some();
            match indicators {
                Some(indicators) if !covered && node.children.is_empty() => {
                    node.children = indicator_nodes(&node.id, indicators);
                }
                _ => fill(&mut node.children, Some(&node.id), covered, indicators),
            }
        }
    }

    if tree.is_empty() {
        if let Some(indicators) = indicators {
            return indicators
                .iter()
                .map(|indicator| HeaderTreeNode {
                    id: indicator.key.clone(),
                    value: indicator.display_title().to_string(),
                    indicator_key: Some(indicator.key.clone()),
                    ..Default::default()
                })
                .collect();
        }
        return tree;
    }

    fill(&mut tree, None, false, indicators);
    tree
}
