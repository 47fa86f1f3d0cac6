//! Static scheduler
//!
//! Orders actor firings topologically over the causality graph. An edge
//! `a -> b` exists when some output of `a` feeds an input of `b` on which one
//! of `b`'s outputs depends within the same instant. Inputs that no output
//! depends on (delays, integrator derivatives) carry no edge, which is how
//! non-strict actors break cycles.

use std::collections::BTreeSet;

use fixsim_types::CyclePolicy;
use tracing::{debug, warn};

use super::schedule::Schedule;
use crate::error::KernelError;
use crate::network::{ActorId, Network};

/// Dependency graph over the actors of a network
#[derive(Debug, Clone)]
pub struct CausalityGraph {
    nodes: Vec<ActorId>,
    edges: Vec<Vec<usize>>,
    strict: Vec<bool>,
}

impl CausalityGraph {
    pub fn from_network(network: &Network) -> Self {
        let nodes: Vec<ActorId> = network.actor_ids().to_vec();
        let index_of = |id: ActorId| nodes.iter().position(|&n| n == id);
        let mut edges = vec![Vec::new(); nodes.len()];
        let strict = nodes
            .iter()
            .map(|&id| network.actor(id).map_or(true, |a| a.is_strict()))
            .collect();

        for c in network.connections() {
            let (Some(from), Some(to)) = (index_of(c.source.actor), index_of(c.target.actor)) else {
                continue;
            };
            let Some(target) = network.actor(c.target.actor) else {
                continue;
            };
            // sinks have no outputs to protect, they still wait for their inputs
            let causal = target.num_outputs() == 0
                || (0..target.num_outputs())
                    .any(|out| target.output_depends_on_input(c.target.port, out));
            if causal && !edges[from].contains(&to) {
                edges[from].push(to);
            }
        }

        Self {
            nodes,
            edges,
            strict,
        }
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn actors(&self) -> &[ActorId] {
        &self.nodes
    }

    /// Strongly connected components (Tarjan), each sorted by discovery order
    pub fn components(&self) -> Vec<Vec<usize>> {
        struct Tarjan<'g> {
            edges: &'g [Vec<usize>],
            index: Vec<Option<usize>>,
            low: Vec<usize>,
            on_stack: Vec<bool>,
            stack: Vec<usize>,
            next: usize,
            components: Vec<Vec<usize>>,
        }

        impl Tarjan<'_> {
            fn visit(&mut self, v: usize) {
                self.index[v] = Some(self.next);
                self.low[v] = self.next;
                self.next += 1;
                self.stack.push(v);
                self.on_stack[v] = true;

                for i in 0..self.edges[v].len() {
                    let w = self.edges[v][i];
                    match self.index[w] {
                        None => {
                            self.visit(w);
                            self.low[v] = self.low[v].min(self.low[w]);
                        }
                        Some(wi) if self.on_stack[w] => self.low[v] = self.low[v].min(wi),
                        Some(_) => {}
                    }
                }

                if Some(self.low[v]) == self.index[v] {
                    let mut component = Vec::new();
                    while let Some(w) = self.stack.pop() {
                        self.on_stack[w] = false;
                        component.push(w);
                        if w == v {
                            break;
                        }
                    }
                    component.sort_unstable();
                    self.components.push(component);
                }
            }
        }

        let n = self.nodes.len();
        let mut tarjan = Tarjan {
            edges: &self.edges,
            index: vec![None; n],
            low: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::new(),
            next: 0,
            components: Vec::new(),
        };
        for v in 0..n {
            if tarjan.index[v].is_none() {
                tarjan.visit(v);
            }
        }
        tarjan.components
    }

    /// Components that form a dependency cycle
    pub fn cycles(&self) -> Vec<Vec<ActorId>> {
        self.components()
            .into_iter()
            .filter(|c| self.is_cycle(c))
            .map(|c| c.iter().map(|&i| self.nodes[i]).collect())
            .collect()
    }

    fn is_cycle(&self, component: &[usize]) -> bool {
        component.len() > 1 || self.edges[component[0]].contains(&component[0])
    }

    /// Topological order of the components, ties broken by discovery order,
    /// members of a component in discovery order. Also returns the cycles no
    /// non-strict member breaks.
    pub fn topological_order(&self) -> (Vec<ActorId>, Vec<Vec<ActorId>>) {
        let components = self.components();
        let mut component_of = vec![0; self.nodes.len()];
        for (c, members) in components.iter().enumerate() {
            for &m in members {
                component_of[m] = c;
            }
        }

        let mut successors: Vec<BTreeSet<usize>> = vec![BTreeSet::new(); components.len()];
        let mut in_degree = vec![0usize; components.len()];
        for (from, targets) in self.edges.iter().enumerate() {
            for &to in targets {
                let (a, b) = (component_of[from], component_of[to]);
                if a != b && successors[a].insert(b) {
                    in_degree[b] += 1;
                }
            }
        }

        // keyed by the smallest discovery index of the component
        let mut ready: BTreeSet<(usize, usize)> = (0..components.len())
            .filter(|&c| in_degree[c] == 0)
            .map(|c| (components[c][0], c))
            .collect();

        let mut order = Vec::with_capacity(self.nodes.len());
        let mut unbroken = Vec::new();
        while let Some((_, c)) = ready.pop_first() {
            let members = &components[c];
            if self.is_cycle(members) && members.iter().all(|&m| self.strict[m]) {
                unbroken.push(members.iter().map(|&m| self.nodes[m]).collect());
            }
            order.extend(members.iter().map(|&m| self.nodes[m]));
            for &next in &successors[c] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    ready.insert((components[next][0], next));
                }
            }
        }
        (order, unbroken)
    }
}

/// Memoizing scheduler keyed on the network's structural version
#[derive(Debug, Clone, Default)]
pub struct Scheduler {
    policy: CyclePolicy,
    cache: Option<(u64, Schedule)>,
    computations: usize,
}

impl Scheduler {
    pub fn new(policy: CyclePolicy) -> Self {
        Self {
            policy,
            cache: None,
            computations: 0,
        }
    }

    pub fn policy(&self) -> CyclePolicy {
        self.policy
    }

    /// Whether the cached schedule matches the network's structure
    pub fn is_valid(&self, network: &Network) -> bool {
        matches!(&self.cache, Some((version, _)) if *version == network.version())
    }

    /// Drop the cached schedule
    pub fn invalidate(&mut self) {
        self.cache = None;
    }

    /// Number of times a schedule was actually computed
    pub fn computations(&self) -> usize {
        self.computations
    }

    /// The schedule for `network`, recomputed only after structural changes
    pub fn schedule(&mut self, network: &Network) -> Result<&Schedule, KernelError> {
        let (version, schedule) = match self.cache.take() {
            Some((version, schedule)) if version == network.version() => (version, schedule),
            _ => (network.version(), self.compute(network)?),
        };
        let (_, schedule) = self.cache.insert((version, schedule));
        Ok(schedule)
    }

    fn compute(&mut self, network: &Network) -> Result<Schedule, KernelError> {
        let graph = CausalityGraph::from_network(network);
        let (order, unbroken) = graph.topological_order();
        self.computations += 1;

        for cycle in &unbroken {
            let names: Vec<String> = cycle
                .iter()
                .filter_map(|&id| network.name(id).map(str::to_string))
                .collect();
            match self.policy {
                CyclePolicy::Reject => return Err(KernelError::NotSchedulable { actors: names }),
                CyclePolicy::Defer => {
                    warn!(actors = ?names, "dependency cycle without a non-strict actor")
                }
            }
        }

        debug!(
            actors = order.len(),
            version = network.version(),
            "schedule computed"
        );
        Ok(Schedule::from_order(order))
    }
}
