use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::ExecutorError;
use crate::executor::types::TaskLike;

/// Bare dependency node: an id and the ids it depends on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GraphNode {
    pub id: String,
    pub depends_on: Vec<String>,
}

impl TaskLike for GraphNode {
    fn id(&self) -> &str {
        &self.id
    }

    fn dependencies(&self) -> &[String] {
        &self.depends_on
    }
}

/// Task dependency graph (DAG)
#[derive(Debug, Clone)]
pub struct TaskGraph<T: TaskLike> {
    /// Task nodes: task_id -> Task
    pub nodes: HashMap<String, T>,

    /// Dependency edges: task_id -> list of dependencies
    pub edges: HashMap<String, Vec<String>>,

    /// Reverse edges: task_id -> list of tasks that depend on it
    pub reverse_edges: HashMap<String, Vec<String>>,

    /// Original insertion order (for stable sorting)
    insertion_order: Vec<String>,
}

impl TaskGraph<GraphNode> {
    /// Build from a `node -> dependencies` mapping. Keys are inserted in sorted
    /// order so that layering output is reproducible for unordered inputs.
    pub fn from_map<I>(map: I) -> Result<Self, ExecutorError>
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        let sorted: BTreeMap<String, Vec<String>> = map.into_iter().collect();
        let nodes: Vec<GraphNode> = sorted
            .into_iter()
            .map(|(id, depends_on)| GraphNode { id, depends_on })
            .collect();
        Self::from_tasks(&nodes)
    }
}

impl<T: TaskLike> TaskGraph<T> {
    /// Construct task graph from task list
    pub fn from_tasks(tasks: &[T]) -> Result<Self, ExecutorError> {
        let mut nodes = HashMap::new();
        let mut edges = HashMap::new();
        let mut reverse_edges: HashMap<String, Vec<String>> = HashMap::new();
        let mut insertion_order = Vec::new();

        for task in tasks {
            if nodes.contains_key(task.id()) {
                return Err(ExecutorError::DuplicateTaskId(task.id().to_string()));
            }

            let task_id = task.id().to_string();
            let dependencies = task.dependencies().to_vec();

            nodes.insert(task_id.clone(), task.clone());
            edges.insert(task_id.clone(), dependencies.clone());
            insertion_order.push(task_id.clone());

            for dep in dependencies {
                reverse_edges.entry(dep).or_default().push(task_id.clone());
            }
        }

        Ok(Self {
            nodes,
            edges,
            reverse_edges,
            insertion_order,
        })
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Validate dependency relationships
    pub fn validate(&self) -> Result<(), ExecutorError> {
        for task_id in &self.insertion_order {
            for dep in self.edges.get(task_id).into_iter().flatten() {
                if !self.nodes.contains_key(dep) {
                    return Err(ExecutorError::DependencyNotFound {
                        task_id: task_id.clone(),
                        missing_dep: dep.clone(),
                    });
                }
            }
        }

        if let Some(cycle) = self.detect_cycle() {
            return Err(ExecutorError::CircularDependency(cycle));
        }

        Ok(())
    }

    /// Full check used before any side effect: the DFS-based sort must succeed
    /// and Kahn layering must consume every node.
    pub fn check(&self) -> Result<Vec<Vec<String>>, ExecutorError> {
        self.validate()?;
        self.topological_order()?;
        self.concurrency_layers()
    }

    /// Strict dependency order: every node appears after all of its
    /// dependencies. Fails with the members of the first cycle found.
    ///
    /// Dependencies that are not nodes of the graph are ignored here;
    /// [`TaskGraph::validate`] reports them.
    pub fn topological_order(&self) -> Result<Vec<String>, ExecutorError> {
        let mut order = Vec::with_capacity(self.nodes.len());
        let mut done: HashSet<&str> = HashSet::new();
        let mut on_path: Vec<&str> = Vec::new();

        for task_id in &self.insertion_order {
            self.visit_post_order(task_id, &mut done, &mut on_path, &mut order)?;
        }

        Ok(order)
    }

    fn visit_post_order<'a>(
        &'a self,
        node: &'a str,
        done: &mut HashSet<&'a str>,
        on_path: &mut Vec<&'a str>,
        order: &mut Vec<String>,
    ) -> Result<(), ExecutorError> {
        if done.contains(node) {
            return Ok(());
        }
        if let Some(pos) = on_path.iter().position(|n| *n == node) {
            let mut cycle: Vec<String> = on_path[pos..].iter().map(|s| s.to_string()).collect();
            cycle.push(node.to_string());
            return Err(ExecutorError::CircularDependency(format_cycle_path(&cycle)));
        }

        on_path.push(node);
        for dep in self.edges.get(node).into_iter().flatten() {
            if self.nodes.contains_key(dep) {
                self.visit_post_order(dep, done, on_path, order)?;
            }
        }
        on_path.pop();

        done.insert(node);
        order.push(node.to_string());
        Ok(())
    }

    /// Partition nodes into concurrency layers using Kahn's algorithm.
    ///
    /// Every member of layer *k* depends only on members of layers `< k`.
    /// Within a layer, nodes keep their insertion order.
    ///
    /// # Algorithm
    ///
    /// 1. Calculate in-degree (dependency count) for all nodes
    /// 2. Collect all nodes with in-degree 0 (first layer)
    /// 3. Remove these nodes and update in-degrees
    /// 4. Repeat until no new layer appears
    ///
    /// Nodes left with a positive in-degree are reported as
    /// [`ExecutorError::UnresolvedLayering`], never silently dropped.
    pub fn concurrency_layers(&self) -> Result<Vec<Vec<String>>, ExecutorError> {
        let position: HashMap<&str, usize> = self
            .insertion_order
            .iter()
            .enumerate()
            .map(|(i, id)| (id.as_str(), i))
            .collect();
        let by_position = |id: &String| position.get(id.as_str()).copied().unwrap_or(usize::MAX);

        // edges[A] = [B, C] means A depends on B and C, so A's in-degree is 2
        let mut in_degree: HashMap<&str, usize> = self
            .nodes
            .keys()
            .map(|id| {
                let degree = self.edges.get(id).map(Vec::len).unwrap_or(0);
                (id.as_str(), degree)
            })
            .collect();

        let mut layers: Vec<Vec<String>> = Vec::new();
        let mut current: Vec<String> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(id, _)| id.to_string())
            .collect();
        current.sort_by_key(by_position);

        let mut processed = 0;

        while !current.is_empty() {
            processed += current.len();
            let mut next = Vec::new();

            for task_id in &current {
                for dependent in self.reverse_edges.get(task_id).into_iter().flatten() {
                    if let Some(degree) = in_degree.get_mut(dependent.as_str()) {
                        *degree = degree.saturating_sub(1);
                        if *degree == 0 {
                            next.push(dependent.clone());
                        }
                    }
                }
            }

            next.sort_by_key(by_position);
            next.dedup();
            layers.push(std::mem::replace(&mut current, next));
        }

        if processed != self.nodes.len() {
            let mut leftover: Vec<String> = in_degree
                .into_iter()
                .filter(|(_, degree)| *degree > 0)
                .map(|(id, _)| id.to_string())
                .collect();
            leftover.sort_by_key(by_position);
            return Err(ExecutorError::UnresolvedLayering(leftover));
        }

        Ok(layers)
    }

    /// Detect circular dependencies using DFS
    ///
    /// # Time Complexity
    ///
    /// O(V + E) where V = number of tasks, E = number of dependencies
    fn detect_cycle(&self) -> Option<String> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for task_id in &self.insertion_order {
            if !visited.contains(task_id) && self.dfs_cycle(task_id, &mut visited, &mut stack) {
                return Some(format_cycle_path(&stack));
            }
        }

        None
    }

    fn dfs_cycle(
        &self,
        node: &str,
        visited: &mut HashSet<String>,
        stack: &mut Vec<String>,
    ) -> bool {
        visited.insert(node.to_string());
        stack.push(node.to_string());

        if let Some(dependencies) = self.edges.get(node) {
            for dep in dependencies {
                if let Some(pos) = stack.iter().position(|x| x == dep) {
                    stack.push(dep.clone());
                    *stack = stack[pos..].to_vec();
                    return true;
                }

                if !visited.contains(dep) && self.dfs_cycle(dep, visited, stack) {
                    return true;
                }
            }
        }

        stack.pop();
        false
    }
}

fn format_cycle_path(stack: &[String]) -> String {
    stack.join(" -> ")
}

#[cfg(test)]
mod tests {
    use super::*;

    fn graph(pairs: &[(&str, &[&str])]) -> TaskGraph<GraphNode> {
        TaskGraph::from_map(pairs.iter().map(|(id, deps)| {
            (
                id.to_string(),
                deps.iter().map(|d| d.to_string()).collect::<Vec<_>>(),
            )
        }))
        .unwrap()
    }

    #[test]
    fn layers_follow_dependencies() {
        let g = graph(&[("setup", &[]), ("a", &["setup"]), ("b", &["setup"]), ("c", &["a", "b"])]);
        let layers = g.check().unwrap();
        assert_eq!(
            layers,
            vec![
                vec!["setup".to_string()],
                vec!["a".to_string(), "b".to_string()],
                vec!["c".to_string()],
            ]
        );
    }

    #[test]
    fn layering_is_stable_across_runs() {
        let g = graph(&[("x", &["w"]), ("y", &["w"]), ("z", &["x"]), ("w", &[])]);
        let first = g.concurrency_layers().unwrap();
        for _ in 0..10 {
            let again = graph(&[("w", &[]), ("z", &["x"]), ("y", &["w"]), ("x", &["w"])]);
            assert_eq!(again.concurrency_layers().unwrap(), first);
        }
    }

    #[test]
    fn two_node_cycle_is_rejected_by_sort() {
        let g = graph(&[("x", &["y"]), ("y", &["x"])]);
        match g.topological_order() {
            Err(ExecutorError::CircularDependency(path)) => {
                assert!(path.contains('x') && path.contains('y'));
            }
            other => panic!("expected cycle, got {other:?}"),
        }
        assert!(matches!(
            g.validate(),
            Err(ExecutorError::CircularDependency(_))
        ));
    }

    #[test]
    fn layering_rejects_leftover_nodes() {
        let g = graph(&[("x", &["y"]), ("y", &["x"]), ("free", &[])]);
        match g.concurrency_layers() {
            Err(ExecutorError::UnresolvedLayering(left)) => {
                assert_eq!(left, vec!["x".to_string(), "y".to_string()]);
            }
            other => panic!("expected unresolved layering, got {other:?}"),
        }
    }

    #[test]
    fn missing_dependency_is_reported() {
        let g = graph(&[("a", &["ghost"])]);
        assert_eq!(
            g.validate(),
            Err(ExecutorError::DependencyNotFound {
                task_id: "a".into(),
                missing_dep: "ghost".into(),
            })
        );
    }

    #[test]
    fn topological_order_puts_dependencies_first() {
        let g = graph(&[("c", &["b"]), ("b", &["a"]), ("a", &[])]);
        let order = g.topological_order().unwrap();
        let pos = |id: &str| order.iter().position(|x| x == id).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("c"));
    }

    #[test]
    fn duplicate_ids_are_rejected() {
        let nodes = vec![
            GraphNode {
                id: "a".into(),
                depends_on: vec![],
            },
            GraphNode {
                id: "a".into(),
                depends_on: vec![],
            },
        ];
        assert_eq!(
            TaskGraph::from_tasks(&nodes).unwrap_err(),
            ExecutorError::DuplicateTaskId("a".into())
        );
    }
}
