//! # Dependency Graph Builder
//!
//! Turns the registry's declarations into a validated DAG:
//!
//! - `wait_for` entries and a `parent` become [`EdgeStrength::WaitFor`] edges.
//! - `references` entries and `{ resource, output }` values become
//!   [`EdgeStrength::ReferenceOnly`] edges, upgraded to `WaitFor` when the same
//!   pair is also waited on.
//!
//! Every name must be registered and the whole edge set, both strengths, must
//! be acyclic. The builder also fixes one topological order with ties broken
//! by declaration order.

use crate::error::BuildError;
use crate::registry::Registry;
use std::collections::{BTreeSet, HashMap};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EdgeStrength {
    /// The dependent may start concurrently but consumes the dependency's values.
    ReferenceOnly,
    /// The dependent may not start until the dependency is ready.
    WaitFor,
}

impl fmt::Display for EdgeStrength {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EdgeStrength::ReferenceOnly => write!(f, "reference"),
            EdgeStrength::WaitFor => write!(f, "wait-for"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyEdge {
    pub dependent: String,
    pub dependency: String,
    pub strength: EdgeStrength,
}

/// Immutable DAG over resource names.
#[derive(Debug, Clone)]
pub struct DependencyGraph {
    names: Vec<String>,
    index: HashMap<String, usize>,
    /// dependent -> (dependency, strength), in declaration order of the dependent's list.
    deps: Vec<Vec<(usize, EdgeStrength)>>,
    /// dependency -> dependents
    rdeps: Vec<Vec<usize>>,
    order: Vec<usize>,
}

impl DependencyGraph {
    pub fn build(registry: &Registry) -> Result<Self, BuildError> {
        let names: Vec<String> = registry.resources().iter().map(|r| r.name.clone()).collect();
        let index: HashMap<String, usize> = names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.clone(), i))
            .collect();

        let mut deps: Vec<Vec<(usize, EdgeStrength)>> = vec![Vec::new(); names.len()];

        for (i, resource) in registry.resources().iter().enumerate() {
            let lookup = |name: &str| {
                index
                    .get(name)
                    .copied()
                    .ok_or_else(|| BuildError::UnknownReference {
                        name: name.to_string(),
                        referenced_by: resource.name.clone(),
                    })
            };

            for param in resource.parameters() {
                if registry.parameter(param).is_none() {
                    return Err(BuildError::UnknownParameter {
                        name: param.to_string(),
                        referenced_by: resource.name.clone(),
                    });
                }
            }

            let waits = resource.parent.iter().chain(resource.wait_for.iter());
            let refs = resource
                .references
                .iter()
                .map(String::as_str)
                .chain(resource.output_sources());

            let mut edges: Vec<(usize, EdgeStrength)> = Vec::new();
            for name in waits {
                let target = lookup(name.as_str())?;
                add_edge(&mut edges, target, EdgeStrength::WaitFor);
            }
            for name in refs {
                let target = lookup(name)?;
                add_edge(&mut edges, target, EdgeStrength::ReferenceOnly);
            }
            deps[i] = edges;
        }

        if let Some(cycle) = find_cycle(&deps) {
            return Err(BuildError::CyclicDependency {
                cycle: cycle.into_iter().map(|i| names[i].clone()).collect(),
            });
        }

        let mut rdeps: Vec<Vec<usize>> = vec![Vec::new(); names.len()];
        for (dependent, edges) in deps.iter().enumerate() {
            for &(dependency, _) in edges {
                rdeps[dependency].push(dependent);
            }
        }

        let order = topological_order(&deps, &rdeps);

        Ok(Self {
            names,
            index,
            deps,
            rdeps,
            order,
        })
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Names in declaration order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// A serial start order consistent with every edge.
    pub fn topological_order(&self) -> Vec<&str> {
        self.order.iter().map(|&i| self.names[i].as_str()).collect()
    }

    pub fn edges(&self) -> Vec<DependencyEdge> {
        self.deps
            .iter()
            .enumerate()
            .flat_map(|(dependent, edges)| {
                edges.iter().map(move |&(dependency, strength)| DependencyEdge {
                    dependent: self.names[dependent].clone(),
                    dependency: self.names[dependency].clone(),
                    strength,
                })
            })
            .collect()
    }

    /// Direct dependencies of `name` with their edge strength.
    pub fn dependencies(&self, name: &str) -> Vec<(&str, EdgeStrength)> {
        match self.index.get(name) {
            Some(&i) => self.deps[i]
                .iter()
                .map(|&(d, strength)| (self.names[d].as_str(), strength))
                .collect(),
            None => Vec::new(),
        }
    }

    /// Dependencies `name` must see `Ready` before it may start.
    pub fn wait_for(&self, name: &str) -> Vec<&str> {
        self.dependencies(name)
            .into_iter()
            .filter(|(_, strength)| *strength == EdgeStrength::WaitFor)
            .map(|(dep, _)| dep)
            .collect()
    }

    pub fn dependents(&self, name: &str) -> Vec<&str> {
        match self.index.get(name) {
            Some(&i) => self.rdeps[i].iter().map(|&d| self.names[d].as_str()).collect(),
            None => Vec::new(),
        }
    }

    /// Everything that depends on `name`, directly or not, in declaration order.
    pub fn transitive_dependents(&self, name: &str) -> Vec<&str> {
        let Some(&start) = self.index.get(name) else {
            return Vec::new();
        };
        let mut seen = BTreeSet::new();
        let mut stack = vec![start];
        while let Some(node) = stack.pop() {
            for &dependent in &self.rdeps[node] {
                if seen.insert(dependent) {
                    stack.push(dependent);
                }
            }
        }
        seen.into_iter().map(|i| self.names[i].as_str()).collect()
    }
}

fn add_edge(edges: &mut Vec<(usize, EdgeStrength)>, target: usize, strength: EdgeStrength) {
    match edges.iter_mut().find(|(t, _)| *t == target) {
        Some(existing) => existing.1 = existing.1.max(strength),
        None => edges.push((target, strength)),
    }
}

#[derive(Clone, Copy, PartialEq)]
enum Color {
    White,
    Grey,
    Black,
}

/// Depth-first search with grey/black marking. Returns the nodes of the first
/// cycle found, in dependency order starting from where the cycle was entered.
fn find_cycle(deps: &[Vec<(usize, EdgeStrength)>]) -> Option<Vec<usize>> {
    let mut color = vec![Color::White; deps.len()];
    let mut stack: Vec<usize> = Vec::new();

    fn visit(
        node: usize,
        deps: &[Vec<(usize, EdgeStrength)>],
        color: &mut [Color],
        stack: &mut Vec<usize>,
    ) -> Option<Vec<usize>> {
        color[node] = Color::Grey;
        stack.push(node);
        for &(next, _) in &deps[node] {
            match color[next] {
                Color::Grey => {
                    let start = stack.iter().position(|&n| n == next).unwrap_or(0);
                    return Some(stack[start..].to_vec());
                }
                Color::White => {
                    if let Some(cycle) = visit(next, deps, color, stack) {
                        return Some(cycle);
                    }
                }
                Color::Black => {}
            }
        }
        stack.pop();
        color[node] = Color::Black;
        None
    }

    for node in 0..deps.len() {
        if color[node] == Color::White {
            if let Some(cycle) = visit(node, deps, &mut color, &mut stack) {
                return Some(cycle);
            }
        }
    }
    None
}

/// Kahn's algorithm; among ready nodes the earliest declared goes first.
fn topological_order(deps: &[Vec<(usize, EdgeStrength)>], rdeps: &[Vec<usize>]) -> Vec<usize> {
    let mut remaining: Vec<usize> = deps.iter().map(Vec::len).collect();
    let mut ready: BTreeSet<usize> = (0..deps.len()).filter(|&i| remaining[i] == 0).collect();
    let mut order = Vec::with_capacity(deps.len());

    while let Some(node) = ready.pop_first() {
        order.push(node);
        for &dependent in &rdeps[node] {
            remaining[dependent] -= 1;
            if remaining[dependent] == 0 {
                ready.insert(dependent);
            }
        }
    }
    order
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parameter::Parameter;
    use crate::resource::{ConfigValue, Resource};

    fn registry(resources: Vec<Resource>) -> Registry {
        let mut registry = Registry::new();
        for resource in resources {
            registry.register(resource).unwrap();
        }
        registry
    }

    fn position(order: &[&str], name: &str) -> usize {
        order.iter().position(|n| *n == name).unwrap()
    }

    #[test]
    fn reference_upgraded_by_explicit_wait() {
        let graph = DependencyGraph::build(&registry(vec![
            Resource::new("db", "settle"),
            Resource::new("app", "settle").with_reference("db").wait_for("db"),
        ]))
        .unwrap();

        assert_eq!(graph.dependencies("app"), vec![("db", EdgeStrength::WaitFor)]);
        assert_eq!(graph.edges().len(), 1);
    }

    #[test]
    fn output_values_imply_reference_edges() {
        let graph = DependencyGraph::build(&registry(vec![
            Resource::new("db", "settle"),
            Resource::new("app", "settle").with_env("DB", ConfigValue::output("db", "url")),
        ]))
        .unwrap();

        assert_eq!(
            graph.dependencies("app"),
            vec![("db", EdgeStrength::ReferenceOnly)]
        );
        assert!(graph.wait_for("app").is_empty());
    }

    #[test]
    fn parent_implies_wait_for() {
        let graph = DependencyGraph::build(&registry(vec![
            Resource::new("server", "settle"),
            Resource::new("db", "settle").with_parent("server"),
        ]))
        .unwrap();
        assert_eq!(graph.wait_for("db"), vec!["server"]);
    }

    #[test]
    fn order_respects_edges_and_declaration_ties() {
        // Declared out of dependency order on purpose.
        let graph = DependencyGraph::build(&registry(vec![
            Resource::new("s", "settle").wait_for("q").wait_for("r"),
            Resource::new("q", "settle").wait_for("p"),
            Resource::new("r", "settle").with_reference("p"),
            Resource::new("p", "settle"),
            Resource::new("lonely", "settle"),
        ]))
        .unwrap();

        let order = graph.topological_order();
        assert_eq!(order, vec!["p", "q", "r", "s", "lonely"]);
        for edge in graph.edges() {
            assert!(position(&order, &edge.dependency) < position(&order, &edge.dependent));
        }
    }

    #[test]
    fn two_node_cycle_names_both() {
        let err = DependencyGraph::build(&registry(vec![
            Resource::new("a", "settle").wait_for("b"),
            Resource::new("b", "settle").wait_for("a"),
        ]))
        .unwrap_err();

        assert_eq!(
            err,
            BuildError::CyclicDependency {
                cycle: vec!["a".into(), "b".into()]
            }
        );
    }

    #[test]
    fn reference_edges_count_towards_cycles() {
        let err = DependencyGraph::build(&registry(vec![
            Resource::new("a", "settle").with_reference("b"),
            Resource::new("b", "settle").with_reference("c"),
            Resource::new("c", "settle").wait_for("a"),
        ]))
        .unwrap_err();

        let BuildError::CyclicDependency { cycle } = err else {
            panic!("expected a cycle");
        };
        assert_eq!(cycle, vec!["a", "b", "c"]);
    }

    #[test]
    fn self_dependency_is_a_cycle() {
        let err = DependencyGraph::build(&registry(vec![Resource::new("a", "settle").wait_for("a")]))
            .unwrap_err();
        assert_eq!(err, BuildError::CyclicDependency { cycle: vec!["a".into()] });
    }

    #[test]
    fn unknown_reference_is_rejected() {
        let err = DependencyGraph::build(&registry(vec![Resource::new("app", "settle").wait_for("ghost")]))
            .unwrap_err();
        assert_eq!(
            err,
            BuildError::UnknownReference {
                name: "ghost".into(),
                referenced_by: "app".into()
            }
        );
    }

    #[test]
    fn unknown_parameter_is_rejected() {
        let mut reg = registry(vec![
            Resource::new("app", "settle").with_config("pw", ConfigValue::parameter("password")),
        ]);
        assert!(matches!(
            DependencyGraph::build(&reg),
            Err(BuildError::UnknownParameter { .. })
        ));

        reg.register_parameter(Parameter::secret("password")).unwrap();
        assert!(DependencyGraph::build(&reg).is_ok());
    }

    #[test]
    fn transitive_dependents_follow_both_strengths() {
        let graph = DependencyGraph::build(&registry(vec![
            Resource::new("p", "settle"),
            Resource::new("q", "settle").wait_for("p"),
            Resource::new("r", "settle").with_reference("q"),
            Resource::new("x", "settle"),
        ]))
        .unwrap();

        assert_eq!(graph.transitive_dependents("p"), vec!["q", "r"]);
        assert!(graph.transitive_dependents("x").is_empty());
    }

    #[test]
    fn random_acyclic_graphs_order_every_edge() {
        // Small deterministic LCG so the test needs no extra crates.
        let mut seed: u64 = 0x2545_f491_4f6c_dd1d;
        let mut next = move || {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            (seed >> 33) as usize
        };

        for _ in 0..50 {
            let n = 2 + next() % 10;
            // Only point at earlier indices so the graph is acyclic, then shuffle declaration order.
            let mut resources: Vec<Resource> = (0..n)
                .map(|i| {
                    let mut r = Resource::new(format!("r{i}"), "settle");
                    for j in 0..i {
                        match next() % 4 {
                            0 => r = r.wait_for(format!("r{j}")),
                            1 => r = r.with_reference(format!("r{j}")),
                            _ => {}
                        }
                    }
                    r
                })
                .collect();
            for i in (1..resources.len()).rev() {
                resources.swap(i, next() % (i + 1));
            }

            let graph = DependencyGraph::build(&registry(resources)).unwrap();
            let order = graph.topological_order();
            assert_eq!(order.len(), n);
            for edge in graph.edges() {
                assert!(position(&order, &edge.dependency) < position(&order, &edge.dependent));
            }
        }
    }
}
