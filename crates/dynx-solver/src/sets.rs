//! Node sets and element sets for grouping entities.
//!
//! Sets are ordered and duplicate-free. They are filled with
//! [`Selection`]s, which reproduce the usual `add(set, start, end, stride)`
//! range semantics: both bounds are inclusive and the stride picks every
//! k-th id starting from `start`.

use std::collections::{HashMap, HashSet};

use crate::error::{Result, SolverError};
use crate::mesh::Mesh;

/// A group of ids to add to a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Selection {
    Single(i32),
    /// Inclusive range `start..=end`
    Range(i32, i32),
    /// `start, start + stride, ...` up to and including `end`
    Strided { start: i32, end: i32, stride: i32 },
}

impl Selection {
    /// Expand the selection into ids, in ascending order.
    pub fn ids(&self) -> Result<Vec<i32>> {
        match *self {
            Selection::Single(id) => Ok(vec![id]),
            Selection::Range(start, end) => Selection::Strided {
                start,
                end,
                stride: 1,
            }
            .ids(),
            Selection::Strided { start, end, stride } => {
                if stride <= 0 {
                    return Err(SolverError::config(format!(
                        "invalid stride {stride} in range {start}..={end}"
                    )));
                }
                if end < start {
                    return Err(SolverError::config(format!(
                        "empty range {start}..={end}"
                    )));
                }
                let mut ids = Vec::new();
                let mut id = start as i64;
                while id <= end as i64 {
                    ids.push(id as i32);
                    id += stride as i64;
                }
                Ok(ids)
            }
        }
    }
}

impl From<i32> for Selection {
    fn from(id: i32) -> Self {
        Selection::Single(id)
    }
}

impl From<std::ops::RangeInclusive<i32>> for Selection {
    fn from(range: std::ops::RangeInclusive<i32>) -> Self {
        Selection::Range(*range.start(), *range.end())
    }
}

/// A named, ordered, duplicate-free list of ids
#[derive(Debug, Clone, Default)]
pub struct IdSet {
    /// Set name
    pub name: String,
    ids: Vec<i32>,
    members: HashSet<i32>,
}

impl IdSet {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ids: Vec::new(),
            members: HashSet::new(),
        }
    }

    /// Append an id; returns false if it was already present.
    pub fn insert(&mut self, id: i32) -> bool {
        if self.members.insert(id) {
            self.ids.push(id);
            true
        } else {
            false
        }
    }

    pub fn contains(&self, id: i32) -> bool {
        self.members.contains(&id)
    }

    /// Ids in insertion order
    pub fn ids(&self) -> &[i32] {
        &self.ids
    }

    pub fn iter(&self) -> impl Iterator<Item = i32> + '_ {
        self.ids.iter().copied()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

/// A named set of nodes
pub type NodeSet = IdSet;
/// A named set of elements
pub type ElementSet = IdSet;

/// Collection of all sets in the model
#[derive(Debug, Clone, Default)]
pub struct Sets {
    node_sets: HashMap<String, NodeSet>,
    element_sets: HashMap<String, ElementSet>,
}

impl Sets {
    /// Create an empty sets collection
    pub fn new() -> Self {
        Self::default()
    }

    /// Add ids to a node set, creating it if needed. Every id must exist
    /// in the mesh.
    pub fn add_nodes(
        &mut self,
        mesh: &Mesh,
        set_name: &str,
        selection: impl Into<Selection>,
    ) -> Result<usize> {
        let ids = selection.into().ids()?;
        if let Some(missing) = ids.iter().find(|id| !mesh.contains_node(**id)) {
            return Err(SolverError::config(format!(
                "node set '{set_name}': node {missing} does not exist"
            )));
        }
        let set = self
            .node_sets
            .entry(set_name.to_string())
            .or_insert_with(|| NodeSet::new(set_name));
        Ok(ids.into_iter().filter(|id| set.insert(*id)).count())
    }

    /// Add ids to an element set, creating it if needed. Every id must
    /// exist in the mesh.
    pub fn add_elements(
        &mut self,
        mesh: &Mesh,
        set_name: &str,
        selection: impl Into<Selection>,
    ) -> Result<usize> {
        let ids = selection.into().ids()?;
        if let Some(missing) = ids.iter().find(|id| !mesh.contains_element(**id)) {
            return Err(SolverError::config(format!(
                "element set '{set_name}': element {missing} does not exist"
            )));
        }
        let set = self
            .element_sets
            .entry(set_name.to_string())
            .or_insert_with(|| ElementSet::new(set_name));
        Ok(ids.into_iter().filter(|id| set.insert(*id)).count())
    }

    /// Put every element of the mesh into a set
    pub fn add_all_elements(&mut self, mesh: &Mesh, set_name: &str) -> usize {
        let set = self
            .element_sets
            .entry(set_name.to_string())
            .or_insert_with(|| ElementSet::new(set_name));
        mesh.elements()
            .iter()
            .filter(|element| set.insert(element.id))
            .count()
    }

    /// Put every node of the mesh into a set
    pub fn add_all_nodes(&mut self, mesh: &Mesh, set_name: &str) -> usize {
        let set = self
            .node_sets
            .entry(set_name.to_string())
            .or_insert_with(|| NodeSet::new(set_name));
        mesh.nodes().iter().filter(|node| set.insert(node.id)).count()
    }

    pub fn node_set(&self, name: &str) -> Option<&NodeSet> {
        self.node_sets.get(name)
    }

    pub fn element_set(&self, name: &str) -> Option<&ElementSet> {
        self.element_sets.get(name)
    }

    /// Get nodes from a node set by name
    pub fn get_nodes(&self, set_name: &str) -> Option<&[i32]> {
        self.node_sets.get(set_name).map(|s| s.ids())
    }

    /// Get elements from an element set by name
    pub fn get_elements(&self, set_name: &str) -> Option<&[i32]> {
        self.element_sets.get(set_name).map(|s| s.ids())
    }

    pub fn require_node_set(&self, set_name: &str) -> Result<&NodeSet> {
        self.node_sets
            .get(set_name)
            .ok_or_else(|| SolverError::config(format!("unknown node set '{set_name}'")))
    }

    pub fn require_element_set(&self, set_name: &str) -> Result<&ElementSet> {
        self.element_sets
            .get(set_name)
            .ok_or_else(|| SolverError::config(format!("unknown element set '{set_name}'")))
    }
}
