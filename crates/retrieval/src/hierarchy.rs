//! Multi-granularity evidence hierarchy
//!
//! Each unit becomes a root node. Every level below re-splits its parent's
//! text at the next, smaller chunk size, down to the leaves. Spans are
//! contiguous, so concatenating any node's leaves gives back its text.

use crate::evidence::{EvidenceUnit, UnitKind};
use augment_common::errors::{AppError, Result};
use std::collections::HashMap;
use text_splitter::{ChunkConfig, TextSplitter};
use uuid::Uuid;

/// A node in the hierarchy
#[derive(Debug, Clone)]
pub struct EvidenceNode {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    /// 0 for leaves
    pub depth: usize,
    pub child_ids: Vec<Uuid>,
    unit: EvidenceUnit,
}

impl EvidenceNode {
    /// Unit holding this node's span; shares the node id
    pub fn unit(&self) -> &EvidenceUnit {
        &self.unit
    }

    pub fn is_leaf(&self) -> bool {
        self.child_ids.is_empty()
    }
}

/// Parent/child relation over every node built from one unit set
#[derive(Debug, Default)]
pub struct Hierarchy {
    nodes: HashMap<Uuid, EvidenceNode>,
    roots: Vec<Uuid>,
    leaves: Vec<Uuid>,
}

impl Hierarchy {
    pub fn get(&self, id: &Uuid) -> Option<&EvidenceNode> {
        self.nodes.get(id)
    }

    pub fn parent_of(&self, id: &Uuid) -> Option<&EvidenceNode> {
        self.nodes
            .get(id)
            .and_then(|n| n.parent_id)
            .and_then(|p| self.nodes.get(&p))
    }

    pub fn roots(&self) -> impl Iterator<Item = &EvidenceNode> {
        self.roots.iter().filter_map(|id| self.nodes.get(id))
    }

    /// Leaves in document order
    pub fn leaves(&self) -> impl Iterator<Item = &EvidenceNode> {
        self.leaves.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Leaves under `id`, in document order
    pub fn leaves_under(&self, id: &Uuid) -> Vec<&EvidenceNode> {
        let mut out = Vec::new();
        let mut stack = vec![*id];
        while let Some(current) = stack.pop() {
            let Some(node) = self.nodes.get(&current) else {
                continue;
            };
            if node.is_leaf() {
                out.push(node);
            } else {
                stack.extend(node.child_ids.iter().rev());
            }
        }
        out
    }

    /// Concatenated text of the leaves under `id`
    pub fn reconstruct(&self, id: &Uuid) -> String {
        self.leaves_under(id)
            .into_iter()
            .map(|n| n.unit.text_content())
            .collect()
    }
}

/// Builds hierarchies for a fixed list of chunk sizes
pub struct HierarchyBuilder {
    chunk_sizes: Vec<usize>,
    splitters: Vec<TextSplitter<text_splitter::Characters>>,
}

impl HierarchyBuilder {
    /// `chunk_sizes` run from the coarsest level to the leaves
    pub fn new(chunk_sizes: &[usize]) -> Result<Self> {
        if chunk_sizes.is_empty() {
            return Err(AppError::IndexBuild {
                message: "at least one chunk size is required".to_string(),
            });
        }
        if chunk_sizes.iter().any(|&s| s == 0) {
            return Err(AppError::IndexBuild {
                message: "chunk sizes must be positive".to_string(),
            });
        }
        if chunk_sizes.windows(2).any(|w| w[1] >= w[0]) {
            return Err(AppError::IndexBuild {
                message: format!("chunk sizes must decrease: {:?}", chunk_sizes),
            });
        }

        let splitters = chunk_sizes
            .iter()
            .map(|&size| TextSplitter::new(ChunkConfig::new(size)))
            .collect();

        Ok(Self {
            chunk_sizes: chunk_sizes.to_vec(),
            splitters,
        })
    }

    pub fn levels(&self) -> usize {
        self.chunk_sizes.len()
    }

    /// Build the hierarchy for a unit set
    pub fn build(&self, units: &[EvidenceUnit]) -> Result<Hierarchy> {
        if units.is_empty() {
            return Err(AppError::IndexBuild {
                message: "cannot build a hierarchy from zero units".to_string(),
            });
        }

        let mut hierarchy = Hierarchy::default();
        for unit in units {
            let root_id = Uuid::new_v4();
            let root = unit.with_id(root_id);
            hierarchy.roots.push(root_id);

            if unit.kind() == UnitKind::Image {
                // Images are not split
                hierarchy.nodes.insert(
                    root_id,
                    EvidenceNode {
                        id: root_id,
                        parent_id: None,
                        depth: 0,
                        child_ids: Vec::new(),
                        unit: root,
                    },
                );
                hierarchy.leaves.push(root_id);
                continue;
            }

            let child_ids = self.split_level(&mut hierarchy, root_id, unit, 0);
            hierarchy.nodes.insert(
                root_id,
                EvidenceNode {
                    id: root_id,
                    parent_id: None,
                    depth: self.levels(),
                    child_ids,
                    unit: root,
                },
            );
        }

        tracing::debug!(
            units = units.len(),
            nodes = hierarchy.len(),
            leaves = hierarchy.leaves.len(),
            "Built evidence hierarchy"
        );
        Ok(hierarchy)
    }

    /// Split `parent`'s text at `level`, recursing down to the leaves
    fn split_level(
        &self,
        hierarchy: &mut Hierarchy,
        parent_id: Uuid,
        parent: &EvidenceUnit,
        level: usize,
    ) -> Vec<Uuid> {
        let depth = self.levels() - 1 - level;
        let mut child_ids = Vec::new();

        for span in split_spans(&self.splitters[level], parent.text_content()) {
            let id = Uuid::new_v4();
            let unit = EvidenceUnit::derived(id, parent, span);
            let grandchildren = if depth > 0 {
                self.split_level(hierarchy, id, &unit, level + 1)
            } else {
                hierarchy.leaves.push(id);
                Vec::new()
            };

            hierarchy.nodes.insert(
                id,
                EvidenceNode {
                    id,
                    parent_id: Some(parent_id),
                    depth,
                    child_ids: grandchildren,
                    unit,
                },
            );
            child_ids.push(id);
        }

        child_ids
    }
}

/// Contiguous spans covering all of `text`, one per chunk
///
/// Each span runs from one chunk's start offset to the next, so whitespace
/// the splitter trims stays attached to the preceding span. Always returns
/// at least one span.
fn split_spans<'a>(splitter: &TextSplitter<text_splitter::Characters>, text: &'a str) -> Vec<&'a str> {
    let mut starts: Vec<usize> = splitter.chunk_indices(text).map(|(offset, _)| offset).collect();
    starts.dedup();

    if starts.is_empty() {
        return vec![text];
    }
    starts[0] = 0;

    let mut spans = Vec::with_capacity(starts.len());
    for (i, &start) in starts.iter().enumerate() {
        let end = starts.get(i + 1).copied().unwrap_or(text.len());
        spans.push(&text[start..end]);
    }
    spans
}
