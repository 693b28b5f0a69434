//! Dependency resolution for plugin load order.
//!
//! The resolver runs a depth-first traversal over the declared dependency
//! graph. Each plugin is appended to the order after all of its dependencies,
//! visiting descriptors in input order and dependencies in declared order, so
//! the result is deterministic for a given input.
//!
//! Nodes are tracked with three marks:
//!
//! - `Unvisited` - not reached yet
//! - `InProgress` - on the current traversal path
//! - `Done` - already appended to the order
//!
//! Reaching an `InProgress` node again means the graph has a cycle.

use crate::error::ResolveError;
use crate::plugin::PluginDescriptor;
use std::collections::HashMap;
use tracing::{debug, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mark {
    Unvisited,
    InProgress,
    Done,
}

/// Computes plugin load orders. Never calls a plugin hook.
#[derive(Debug, Default, Clone, Copy)]
pub struct DependencyResolver;

impl DependencyResolver {
    pub fn new() -> Self {
        Self
    }

    /// Resolves the load order of `descriptors`.
    ///
    /// Returns indices into `descriptors`, dependencies first. When several
    /// descriptors share a name only the first is kept; the others are left
    /// out of the result.
    pub fn resolve(&self, descriptors: &[PluginDescriptor]) -> Result<Vec<usize>, ResolveError> {
        let graph: Vec<(&str, &[String])> = descriptors
            .iter()
            .map(|descriptor| (descriptor.name(), descriptor.dependencies()))
            .collect();
        self.resolve_graph(&graph)
    }

    /// Resolves a graph given as `(name, dependencies)` pairs and returns
    /// the plugin names in load order.
    pub fn resolve_names<S: AsRef<str>>(
        &self,
        graph: &[(S, Vec<S>)],
    ) -> Result<Vec<String>, ResolveError> {
        let dependencies: Vec<Vec<String>> = graph
            .iter()
            .map(|(_, deps)| deps.iter().map(|d| d.as_ref().to_string()).collect())
            .collect();
        let nodes: Vec<(&str, &[String])> = graph
            .iter()
            .zip(dependencies.iter())
            .map(|((name, _), deps)| (name.as_ref(), deps.as_slice()))
            .collect();

        let order = self.resolve_graph(&nodes)?;
        Ok(order.into_iter().map(|index| nodes[index].0.to_string()).collect())
    }

    fn resolve_graph(&self, nodes: &[(&str, &[String])]) -> Result<Vec<usize>, ResolveError> {
        let mut by_name: HashMap<&str, usize> = HashMap::with_capacity(nodes.len());
        for (index, (name, _)) in nodes.iter().enumerate() {
            if by_name.contains_key(name) {
                warn!("Duplicate plugin name [{}], keeping the first registration", name);
                continue;
            }
            by_name.insert(*name, index);
        }

        let mut traversal = Traversal {
            nodes,
            by_name: &by_name,
            marks: vec![Mark::Unvisited; nodes.len()],
            path: Vec::new(),
            order: Vec::with_capacity(by_name.len()),
        };

        for (index, (name, _)) in nodes.iter().enumerate() {
            // Skip coalesced duplicates
            if by_name.get(name) == Some(&index) {
                traversal.visit(index)?;
            }
        }

        debug!(
            "Resolved load order: {:?}",
            traversal.order.iter().map(|i| nodes[*i].0).collect::<Vec<_>>()
        );
        Ok(traversal.order)
    }
}

struct Traversal<'a> {
    nodes: &'a [(&'a str, &'a [String])],
    by_name: &'a HashMap<&'a str, usize>,
    marks: Vec<Mark>,
    path: Vec<usize>,
    order: Vec<usize>,
}

impl Traversal<'_> {
    fn visit(&mut self, index: usize) -> Result<(), ResolveError> {
        match self.marks[index] {
            Mark::Done => return Ok(()),
            Mark::InProgress => return Err(self.cycle_from(index)),
            Mark::Unvisited => {}
        }

        self.marks[index] = Mark::InProgress;
        self.path.push(index);

        let (name, dependencies) = self.nodes[index];
        for dependency in dependencies {
            let Some(&next) = self.by_name.get(dependency.as_str()) else {
                return Err(ResolveError::MissingDependency {
                    dependency: dependency.clone(),
                    requested_by: name.to_string(),
                });
            };
            self.visit(next)?;
        }

        self.path.pop();
        self.marks[index] = Mark::Done;
        self.order.push(index);
        Ok(())
    }

    /// Builds the cycle report: the path from `repeated` back to itself.
    fn cycle_from(&self, repeated: usize) -> ResolveError {
        let start = self
            .path
            .iter()
            .position(|index| *index == repeated)
            .unwrap_or(0);
        let mut cycle: Vec<String> = self.path[start..]
            .iter()
            .map(|index| self.nodes[*index].0.to_string())
            .collect();
        cycle.push(self.nodes[repeated].0.to_string());
        ResolveError::CircularDependency { cycle }
    }
}
