use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use super::{actor::ActorId, from_millis};
use crate::ingest::timestamp::Precision;

/// Arena-backed comment tree.
///
/// Nodes own their children by index into `nodes`; a parent is always pushed
/// before its children, so iterating `nodes` in order visits parents first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommentTree<T> {
    pub nodes: Vec<TreeNode<T>>,
    pub roots: Vec<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeNode<T> {
    pub parent: Option<usize>,
    pub children: Vec<usize>,
    /// Index among siblings.
    pub position: usize,
    pub item: T,
}

impl<T> Default for CommentTree<T> {
    fn default() -> Self {
        Self {
            nodes: Vec::new(),
            roots: Vec::new(),
        }
    }
}

impl<T> CommentTree<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends `item` under `parent` (or as a root) and returns its index.
    ///
    /// # Panics
    /// If `parent` is not an index already in the tree.
    pub fn push(&mut self, parent: Option<usize>, item: T) -> usize {
        let index = self.nodes.len();
        let position = match parent {
            Some(p) => {
                let siblings = &mut self.nodes[p].children;
                siblings.push(index);
                siblings.len() - 1
            }
            None => {
                self.roots.push(index);
                self.roots.len() - 1
            }
        };
        self.nodes.push(TreeNode {
            parent,
            children: Vec::new(),
            position,
            item,
        });
        index
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&TreeNode<T>> {
        self.nodes.get(index)
    }

    pub fn children(&self, index: usize) -> impl Iterator<Item = &TreeNode<T>> {
        self.nodes
            .get(index)
            .into_iter()
            .flat_map(|node| node.children.iter().map(|c| &self.nodes[*c]))
    }

    pub fn depth(&self, mut index: usize) -> usize {
        let mut depth = 0;
        while let Some(parent) = self.nodes.get(index).and_then(|n| n.parent) {
            depth += 1;
            index = parent;
        }
        depth
    }
}

/// A comment as stored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Comment {
    pub id: String,
    pub post_id: String,
    pub parent_id: Option<String>,
    pub position: i64,
    pub author_id: ActorId,
    pub content: String,
    pub raw_timestamp: String,
    pub relative_age: Option<String>,
    pub approx_instant: Option<DateTime<Utc>>,
    pub precision: Precision,
    pub reactions_count: i64,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

/// Represents the 'comments' table in the database.
#[derive(Debug, Clone, FromRow)]
pub(crate) struct CommentRow {
    pub id: String,
    pub post_id: String,
    pub parent_id: Option<String>,
    pub position: i64,
    pub author_id: String,
    pub content: String,
    pub raw_timestamp: String,
    pub relative_age: Option<String>,
    pub approx_instant_ms: Option<i64>,
    pub precision: String,
    pub reactions_count: i64,
    pub first_seen_ms: i64,
    pub last_seen_ms: i64,
}

impl From<CommentRow> for Comment {
    fn from(row: CommentRow) -> Self {
        Comment {
            id: row.id,
            post_id: row.post_id,
            parent_id: row.parent_id,
            position: row.position,
            author_id: ActorId(row.author_id),
            content: row.content,
            raw_timestamp: row.raw_timestamp,
            relative_age: row.relative_age,
            approx_instant: row.approx_instant_ms.map(from_millis),
            precision: Precision::parse(&row.precision),
            reactions_count: row.reactions_count,
            first_seen_at: from_millis(row.first_seen_ms),
            last_seen_at: from_millis(row.last_seen_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positions_and_depth() {
        let mut tree = CommentTree::new();
        let a = tree.push(None, "a");
        let b = tree.push(None, "b");
        let a1 = tree.push(Some(a), "a1");
        let a2 = tree.push(Some(a), "a2");
        let a2x = tree.push(Some(a2), "a2x");

        assert_eq!(tree.roots, vec![a, b]);
        assert_eq!(tree.nodes[b].position, 1);
        assert_eq!(tree.nodes[a1].position, 0);
        assert_eq!(tree.nodes[a2].position, 1);
        assert_eq!(tree.depth(a2x), 2);
        assert_eq!(
            tree.children(a).map(|n| n.item).collect::<Vec<_>>(),
            vec!["a1", "a2"]
        );
    }
}
