use crate::constants::{RECIPE_FILE, VERSION_FILE};
use crate::status::NodeState;
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Stable arena index of an image inside a [`BuildGraph`]
pub type NodeId = usize;

/// One buildable image directory
#[derive(Clone, Debug)]
pub struct ImageNode {
    pub id: NodeId,
    pub name: String,
    pub dir: PathBuf,
    /// Reference declared by the first `FROM` line
    pub base_ref: String,
    pub base_ref_line: Option<usize>,
    pub recipe_lines: Vec<String>,
    /// Contents of the version marker, empty when absent
    pub version: String,
    /// Version tags from the last bump, full version first
    pub tags: Vec<String>,
    pub state: Arc<NodeState>,
}

impl ImageNode {
    pub fn new(name: impl Into<String>, dir: PathBuf) -> Self {
        let name = name.into();
        Self {
            id: 0,
            state: Arc::new(NodeState::new(name.clone())),
            name,
            dir,
            base_ref: String::new(),
            base_ref_line: None,
            recipe_lines: Vec::new(),
            version: String::new(),
            tags: Vec::new(),
        }
    }

    /// `registry/name`, or just `name` without a registry
    pub fn image(&self, registry: &str) -> String {
        if registry.is_empty() {
            self.name.clone()
        } else {
            format!("{}/{}", registry.trim_end_matches('/'), self.name)
        }
    }

    /// `registry/name:version`, the string dependents' `FROM` lines must equal
    pub fn qualified_ref(&self, registry: &str) -> String {
        format!("{}:{}", self.image(registry), self.version)
    }

    pub fn recipe_path(&self) -> PathBuf {
        self.dir.join(RECIPE_FILE)
    }

    pub fn version_path(&self) -> PathBuf {
        self.dir.join(VERSION_FILE)
    }
}

/// Image dependency graph. Edges are never stored: `A -> B` holds exactly
/// when `B.base_ref == A.qualified_ref()` at the moment of the query.
#[derive(Debug, Clone, Default)]
pub struct BuildGraph {
    pub registry: String,
    pub base_dir: PathBuf,
    pub nodes: Vec<ImageNode>,
    by_name: HashMap<String, NodeId>,
}

impl BuildGraph {
    pub fn new(registry: impl Into<String>, base_dir: impl AsRef<Path>) -> Self {
        Self {
            registry: registry.into(),
            base_dir: base_dir.as_ref().to_path_buf(),
            nodes: Vec::new(),
            by_name: HashMap::new(),
        }
    }

    /// Adds a node, replacing any node already registered under the same name.
    pub fn insert(&mut self, mut node: ImageNode) -> NodeId {
        if let Some(&id) = self.by_name.get(&node.name) {
            node.id = id;
            self.nodes[id] = node;
            return id;
        }
        let id = self.nodes.len();
        node.id = id;
        self.by_name.insert(node.name.clone(), id);
        self.nodes.push(node);
        id
    }

    pub fn lookup(&self, name: &str) -> Option<NodeId> {
        self.by_name.get(name).copied()
    }

    pub fn node(&self, id: NodeId) -> &ImageNode {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut ImageNode {
        &mut self.nodes[id]
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn qualified_ref(&self, id: NodeId) -> String {
        self.nodes[id].qualified_ref(&self.registry)
    }

    /// Nodes whose base reference equals `reference`, in name order.
    pub fn nodes_based_on(&self, reference: &str) -> Vec<NodeId> {
        let mut found: Vec<NodeId> = self
            .nodes
            .iter()
            .filter(|n| !n.base_ref.is_empty() && n.base_ref == reference)
            .map(|n| n.id)
            .collect();
        found.sort_by(|a, b| self.nodes[*a].name.cmp(&self.nodes[*b].name));
        found
    }

    /// Direct dependents of `id`, evaluated against its current reference.
    pub fn dependents(&self, id: NodeId) -> Vec<NodeId> {
        let mut deps = self.nodes_based_on(&self.qualified_ref(id));
        deps.retain(|&d| d != id);
        deps
    }

    /// Every node reachable from `id`, excluding `id` itself. Cycle-safe.
    pub fn descendants(&self, id: NodeId) -> BTreeSet<NodeId> {
        let index = self.ref_index();
        let mut seen = BTreeSet::new();
        let mut queue: VecDeque<NodeId> = index.dependents(self, id).into();
        while let Some(next) = queue.pop_front() {
            if next == id || !seen.insert(next) {
                continue;
            }
            queue.extend(index.dependents(self, next));
        }
        seen
    }

    /// Snapshot of the string-matched relation for one traversal pass.
    pub fn ref_index(&self) -> RefIndex {
        let mut children: HashMap<String, Vec<NodeId>> = HashMap::new();
        for node in &self.nodes {
            if !node.base_ref.is_empty() {
                children.entry(node.base_ref.clone()).or_default().push(node.id);
            }
        }
        for ids in children.values_mut() {
            ids.sort_by(|a, b| self.nodes[*a].name.cmp(&self.nodes[*b].name));
        }
        RefIndex { children }
    }

    /// Render the dependency diagram in dot format. External base images
    /// appear as plain nodes so the full ancestry is visible.
    pub fn to_dot(&self) -> String {
        let mut out = String::from("digraph G {\n  node [shape=rectangle];\n  rankdir=LR;\n  splines=polyline;\n");
        let mut nodes: Vec<&ImageNode> = self.nodes.iter().collect();
        nodes.sort_by(|a, b| a.name.cmp(&b.name));
        for node in nodes {
            if node.base_ref.is_empty() {
                let _ = writeln!(out, "  \"{}\";", node.qualified_ref(&self.registry));
            } else {
                let _ = writeln!(
                    out,
                    "  \"{}\" -> \"{}\";",
                    node.base_ref,
                    node.qualified_ref(&self.registry)
                );
            }
        }
        out.push_str("}\n");
        out
    }
}

/// Children keyed by the base reference they declare. Valid until any
/// node's version or base reference changes.
#[derive(Debug, Clone, Default)]
pub struct RefIndex {
    children: HashMap<String, Vec<NodeId>>,
}

impl RefIndex {
    pub fn dependents(&self, graph: &BuildGraph, id: NodeId) -> Vec<NodeId> {
        self.children
            .get(&graph.qualified_ref(id))
            .map(|ids| ids.iter().copied().filter(|&c| c != id).collect())
            .unwrap_or_default()
    }
}
