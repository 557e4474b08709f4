//! Broader-code hierarchy integrity.
//!
//! A scheme's codes form a forest through their optional broader code. The
//! [`HierarchyResolver`] validates that forest and derives hierarchy levels
//! from it. All checks run on a [`BroaderGraph`], an adjacency map keyed by
//! lower-cased code value, built once per batch before anything is committed.
//!
//! # Example
//!
//! ```
//! use codelist_persistence::hierarchy::{BroaderGraph, HierarchyResolver};
//!
//! let mut graph = BroaderGraph::new();
//! graph.insert("A", None);
//! graph.insert("B", Some("A"));
//! graph.insert("C", Some("B"));
//!
//! let levels = HierarchyResolver::default().validate(&graph).unwrap();
//! assert_eq!(levels.get("c"), Some(&3));
//! ```

use std::collections::{HashMap, HashSet};

use uuid::Uuid;

use crate::error::ValidationError;
use crate::model::{Code, natural_key};

/// Default maximum depth of a broader-code chain.
pub const DEFAULT_MAX_HIERARCHY_LEVEL: u32 = 10;

/// Hierarchy levels keyed by lower-cased code value.
pub type HierarchyLevels = HashMap<String, u32>;

/// Adjacency map from code to broader code.
#[derive(Debug, Clone, Default)]
pub struct BroaderGraph {
    parents: HashMap<String, Option<String>>,
    display: HashMap<String, String>,
    keys: Vec<String>,
}

impl BroaderGraph {
    /// Creates an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the graph from a complete code set of one scheme.
    ///
    /// Fails with [`ValidationError::BroaderCodeNotFound`] when a broader code
    /// id names no code in the set.
    pub fn from_codes(codes: &[Code]) -> Result<Self, ValidationError> {
        let by_id: HashMap<Uuid, &str> = codes
            .iter()
            .map(|code| (code.id, code.code_value.as_str()))
            .collect();

        let mut graph = Self::new();
        for code in codes {
            let broader = match code.broader_code_id {
                Some(id) => match by_id.get(&id) {
                    Some(value) => Some(*value),
                    None => {
                        return Err(ValidationError::BroaderCodeNotFound {
                            code_value: code.code_value.clone(),
                            broader: id.to_string(),
                        });
                    }
                },
                None => None,
            };
            graph.insert(&code.code_value, broader);
        }
        Ok(graph)
    }

    /// Inserts or replaces the edge of a code.
    pub fn insert(&mut self, code_value: &str, broader: Option<&str>) {
        let key = natural_key(code_value);
        if !self.parents.contains_key(&key) {
            self.keys.push(key.clone());
        }
        self.display.insert(key.clone(), code_value.to_string());
        self.parents.insert(key, broader.map(natural_key));
    }

    /// Returns the lower-cased broader code of a code, if any.
    pub fn broader_of(&self, code_value: &str) -> Option<&str> {
        self.parents
            .get(&natural_key(code_value))
            .and_then(|parent| parent.as_deref())
    }

    /// Returns true if the graph holds the code.
    pub fn contains(&self, code_value: &str) -> bool {
        self.parents.contains_key(&natural_key(code_value))
    }

    /// Number of codes in the graph.
    pub fn len(&self) -> usize {
        self.keys.len()
    }

    /// Returns true if the graph holds no codes.
    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    /// Lower-cased keys in insertion order.
    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.keys.iter().map(String::as_str)
    }

    fn display_name(&self, key: &str) -> String {
        self.display
            .get(key)
            .cloned()
            .unwrap_or_else(|| key.to_string())
    }
}

/// Validates broader-code forests and assigns hierarchy levels.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HierarchyResolver {
    max_level: u32,
}

impl Default for HierarchyResolver {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HIERARCHY_LEVEL)
    }
}

impl HierarchyResolver {
    /// Creates a resolver with the given maximum chain depth.
    pub fn new(max_level: u32) -> Self {
        Self {
            max_level: max_level.max(1),
        }
    }

    /// Returns the configured maximum depth.
    pub fn max_level(&self) -> u32 {
        self.max_level
    }

    /// Assigns levels by fixed-point propagation.
    ///
    /// Round 1 resolves every code without a broader code. Round `L` resolves
    /// every code whose broader code was resolved in round `L - 1`. Propagation
    /// stops at the first round that resolves nothing; codes left over are
    /// reported as [`ValidationError::UnresolvedHierarchy`].
    pub fn evaluate_levels(&self, graph: &BroaderGraph) -> Result<HierarchyLevels, ValidationError> {
        let mut levels = HierarchyLevels::with_capacity(graph.len());
        let mut level = 1u32;

        loop {
            let resolved: Vec<&String> = graph
                .keys
                .iter()
                .filter(|key| !levels.contains_key(*key))
                .filter(|key| match graph.parents.get(*key).and_then(Option::as_ref) {
                    None => level == 1,
                    Some(parent) => levels.get(parent) == Some(&(level - 1)),
                })
                .collect();

            if resolved.is_empty() {
                break;
            }
            for key in resolved {
                levels.insert(key.clone(), level);
            }
            level += 1;
        }

        if levels.len() < graph.len() {
            let mut code_values: Vec<String> = graph
                .keys
                .iter()
                .filter(|key| !levels.contains_key(*key))
                .map(|key| graph.display_name(key))
                .collect();
            code_values.sort();
            return Err(ValidationError::UnresolvedHierarchy { code_values });
        }

        Ok(levels)
    }

    /// Walks the broader chain of one code.
    ///
    /// Returns the depth of the code (1 for a root). Fails when the chain
    /// revisits a code or grows past the maximum depth.
    pub fn check_code(&self, graph: &BroaderGraph, code_value: &str) -> Result<u32, ValidationError> {
        let start = natural_key(code_value);
        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(start.as_str());

        let mut current = start.as_str();
        let mut depth = 1u32;
        while let Some(parent) = graph.parents.get(current).and_then(Option::as_deref) {
            if !visited.insert(parent) {
                return Err(ValidationError::CyclicHierarchy {
                    code_value: graph.display_name(&start),
                });
            }
            depth += 1;
            if depth > self.max_level {
                return Err(ValidationError::MaxHierarchyLevelExceeded {
                    code_value: graph.display_name(&start),
                    max_level: self.max_level,
                });
            }
            current = parent;
        }
        Ok(depth)
    }

    /// Runs every structural check and returns the level of each code.
    ///
    /// Nothing is mutated; callers apply the returned levels.
    pub fn validate(&self, graph: &BroaderGraph) -> Result<HierarchyLevels, ValidationError> {
        for key in &graph.keys {
            if let Some(parent) = graph.parents.get(key).and_then(Option::as_ref) {
                if parent == key {
                    return Err(ValidationError::SelfReferencingBroaderCode {
                        code_value: graph.display_name(key),
                    });
                }
                if !graph.parents.contains_key(parent) {
                    return Err(ValidationError::BroaderCodeNotFound {
                        code_value: graph.display_name(key),
                        broader: parent.clone(),
                    });
                }
            }
        }

        for key in &graph.keys {
            self.check_code(graph, key)?;
        }

        self.evaluate_levels(graph)
    }
}
