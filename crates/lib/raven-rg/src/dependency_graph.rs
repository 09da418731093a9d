use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};

/// Why one pass has to run before another.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) enum DependencyKind {
    /// Reader needs the content the writer produced.
    ReadAfterWrite,
    /// Next writer must not clobber content a reader still needs.
    WriteAfterRead,
    /// Writers of consecutive versions of one resource.
    WriteAfterWrite,
}

#[derive(Clone, Copy, Debug)]
pub(crate) struct Dependency {
    pub(crate) kind: DependencyKind,
    /// Frame local index of the resource the dependency comes from.
    pub(crate) resource: usize,
}

/// Passes are nodes, `from -> to` means `from` must execute before `to`.
pub(crate) struct DependencyGraph {
    successors: Vec<Vec<usize>>,
    edges: HashMap<(usize, usize), Dependency>,
}

/// Passes and resources on one cycle, in cycle order.
#[derive(Debug)]
pub(crate) struct DependencyCycle {
    pub(crate) passes: Vec<usize>,
    pub(crate) resources: Vec<usize>,
}

impl DependencyGraph {
    pub(crate) fn new(pass_count: usize) -> Self {
        Self {
            successors: vec![Vec::new(); pass_count],
            edges: HashMap::new(),
        }
    }

    pub(crate) fn pass_count(&self) -> usize {
        self.successors.len()
    }

    /// Self edges and duplicates are ignored.
    pub(crate) fn add_edge(&mut self, from: usize, to: usize, dependency: Dependency) {
        if from == to || self.edges.contains_key(&(from, to)) {
            return;
        }

        self.edges.insert((from, to), dependency);
        self.successors[from].push(to);
    }

    pub(crate) fn dependency(&self, from: usize, to: usize) -> Option<&Dependency> {
        self.edges.get(&(from, to))
    }

    pub(crate) fn edge_count(&self) -> usize {
        self.edges.len()
    }

    /// Kahn's algorithm over `nodes`. Among all passes ready at the same time the one declared
    /// first runs first, so the order is deterministic from frame to frame.
    pub(crate) fn topological_order(&self, nodes: &[usize]) -> Result<Vec<usize>, DependencyCycle> {
        let mut active = vec![false; self.pass_count()];
        for &node in nodes {
            active[node] = true;
        }

        let mut in_degree = vec![0usize; self.pass_count()];
        for &node in nodes {
            for &succ in &self.successors[node] {
                if active[succ] {
                    in_degree[succ] += 1;
                }
            }
        }

        let mut ready: BinaryHeap<Reverse<usize>> = nodes.iter()
            .copied()
            .filter(|&node| in_degree[node] == 0)
            .map(Reverse)
            .collect();

        let mut order = Vec::with_capacity(nodes.len());
        while let Some(Reverse(node)) = ready.pop() {
            order.push(node);

            for &succ in &self.successors[node] {
                if !active[succ] {
                    continue;
                }

                in_degree[succ] -= 1;
                if in_degree[succ] == 0 {
                    ready.push(Reverse(succ));
                }
            }
        }

        if order.len() == nodes.len() {
            Ok(order)
        } else {
            let remaining: Vec<_> = nodes.iter()
                .copied()
                .filter(|&node| in_degree[node] > 0)
                .collect();

            Err(self.find_cycle(&remaining))
        }
    }

    /// Walk backwards along unsatisfied edges from any blocked pass until a pass repeats.
    /// Every blocked pass has a blocked predecessor, so the walk always closes a cycle.
    fn find_cycle(&self, blocked: &[usize]) -> DependencyCycle {
        let mut is_blocked = vec![false; self.pass_count()];
        for &node in blocked {
            is_blocked[node] = true;
        }

        let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); self.pass_count()];
        for &(from, to) in self.edges.keys() {
            if is_blocked[from] && is_blocked[to] {
                predecessors[to].push(from);
            }
        }
        for preds in predecessors.iter_mut() {
            preds.sort_unstable();
        }

        let mut visited_at: HashMap<usize, usize> = HashMap::new();
        let mut path = Vec::new();
        let mut node = blocked.iter().copied().min().unwrap_or(0);

        loop {
            if let Some(&start) = visited_at.get(&node) {
                // path[start..] is the cycle walked backwards
                let mut passes: Vec<usize> = path[start..].to_vec();
                passes.reverse();

                let resources = passes.iter()
                    .enumerate()
                    .filter_map(|(i, &from)| {
                        let to = passes[(i + 1) % passes.len()];
                        self.dependency(from, to).map(|dep| dep.resource)
                    })
                    .collect();

                return DependencyCycle { passes, resources };
            }

            visited_at.insert(node, path.len());
            path.push(node);

            match predecessors[node].first() {
                Some(&pred) => node = pred,
                None => {
                    return DependencyCycle {
                        passes: path,
                        resources: Vec::new(),
                    };
                }
            }
        }
    }

    /// Passes reachable backwards from `roots`, following only edges that carry content.
    pub(crate) fn contributors(&self, roots: &[usize]) -> Vec<bool> {
        let mut predecessors: Vec<Vec<usize>> = vec![Vec::new(); self.pass_count()];
        for (&(from, to), dep) in &self.edges {
            if dep.kind != DependencyKind::WriteAfterRead {
                predecessors[to].push(from);
            }
        }

        let mut needed = vec![false; self.pass_count()];
        let mut stack: Vec<usize> = roots.to_vec();

        while let Some(node) = stack.pop() {
            if needed[node] {
                continue;
            }
            needed[node] = true;
            stack.extend(predecessors[node].iter().copied().filter(|&pred| !needed[pred]));
        }

        needed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dep(resource: usize) -> Dependency {
        Dependency {
            kind: DependencyKind::ReadAfterWrite,
            resource,
        }
    }

    #[test]
    fn ties_are_broken_by_declaration_order() {
        // 0 and 2 are independent, 1 depends on 2
        let mut graph = DependencyGraph::new(3);
        graph.add_edge(2, 1, dep(0));

        let order = graph.topological_order(&[0, 1, 2]).unwrap();
        assert_eq!(order, vec![0, 2, 1]);
    }

    #[test]
    fn independent_passes_keep_declaration_order() {
        let graph = DependencyGraph::new(4);
        assert_eq!(graph.topological_order(&[0, 1, 2, 3]).unwrap(), vec![0, 1, 2, 3]);
    }

    #[test]
    fn self_and_duplicate_edges_are_ignored() {
        let mut graph = DependencyGraph::new(2);
        graph.add_edge(0, 0, dep(0));
        graph.add_edge(0, 1, dep(0));
        graph.add_edge(0, 1, dep(1));
        assert_eq!(graph.edge_count(), 1);
        assert_eq!(graph.dependency(0, 1).unwrap().resource, 0);
    }

    #[test]
    fn cycle_reports_passes_and_resources() {
        // 0 -> 1 through resource 7, 1 -> 0 through resource 3, 2 hangs off the cycle
        let mut graph = DependencyGraph::new(3);
        graph.add_edge(0, 1, dep(7));
        graph.add_edge(1, 0, dep(3));
        graph.add_edge(1, 2, dep(5));

        let cycle = graph.topological_order(&[0, 1, 2]).unwrap_err();
        let mut passes = cycle.passes.clone();
        passes.sort_unstable();
        assert_eq!(passes, vec![0, 1]);

        let mut resources = cycle.resources.clone();
        resources.sort_unstable();
        assert_eq!(resources, vec![3, 7]);
    }

    #[test]
    fn contributors_ignore_write_after_read_edges() {
        let mut graph = DependencyGraph::new(3);
        graph.add_edge(0, 2, dep(0));
        graph.add_edge(1, 2, Dependency { kind: DependencyKind::WriteAfterRead, resource: 1 });

        let needed = graph.contributors(&[2]);
        assert_eq!(needed, vec![true, false, true]);
    }
}
