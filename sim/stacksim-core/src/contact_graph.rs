//! Ordering bodies for contact resolution.
//!
//! Each frame the bodies form a directed graph: an edge `i → k` means body
//! `i` would come to rest on body `k`. Resolving contacts from the bottom of
//! a stack upward converges much faster than an arbitrary order, so the
//! graph is condensed into strongly connected components with Tarjan's
//! algorithm and the components are laid out supports first.
//!
//! Tarjan emits a component only after every component reachable from it,
//! which is exactly "supports before the bodies they support". Bodies that
//! rest on each other in a cycle end up in the same component and keep
//! their prior relative order.

use stacksim_types::BodyId;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Result of ordering the contact graph.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ContactOrdering {
    /// Bodies in processing order, supports first.
    pub order: Vec<BodyId>,
    /// Component index of each body, indexed by [`BodyId`]. Components are
    /// numbered in processing order.
    pub component_of: Vec<usize>,
    /// Number of strongly connected components.
    pub component_count: usize,
}

impl ContactOrdering {
    /// Ordering in which every body is its own component, in the given order.
    #[must_use]
    pub fn singletons(order: Vec<BodyId>) -> Self {
        let mut component_of = vec![0; order.len()];
        for (component, id) in order.iter().enumerate() {
            if let Some(slot) = component_of.get_mut(id.index()) {
                *slot = component;
            }
        }
        Self {
            component_count: order.len(),
            order,
            component_of,
        }
    }

    /// Component of a body, `None` for unknown ids.
    #[must_use]
    pub fn component(&self, id: BodyId) -> Option<usize> {
        self.component_of.get(id.index()).copied()
    }

    /// The components in processing order, each as a slice of the order.
    #[must_use]
    pub fn components(&self) -> Vec<&[BodyId]> {
        let mut out = Vec::with_capacity(self.component_count);
        let mut start = 0;
        for end in 1..=self.order.len() {
            let boundary = end == self.order.len()
                || self.component(self.order[end]) != self.component(self.order[start]);
            if boundary {
                out.push(&self.order[start..end]);
                start = end;
            }
        }
        out
    }

    /// Whether a body shares its component with another body.
    #[must_use]
    pub fn is_in_cycle(&self, id: BodyId) -> bool {
        let Some(component) = self.component(id) else {
            return false;
        };
        self.component_of.iter().filter(|&&c| c == component).count() > 1
    }
}

/// Bookkeeping for one run of Tarjan's algorithm, indexed by body index.
#[derive(Debug)]
struct TarjanContext {
    index: Vec<Option<usize>>,
    lowlink: Vec<usize>,
    on_stack: Vec<bool>,
    stack: Vec<usize>,
    next_index: usize,
    components: Vec<Vec<usize>>,
}

impl TarjanContext {
    fn new(n: usize) -> Self {
        Self {
            index: vec![None; n],
            lowlink: vec![0; n],
            on_stack: vec![false; n],
            stack: Vec::with_capacity(n),
            next_index: 0,
            components: Vec::new(),
        }
    }

    fn visit(&mut self, v: usize) {
        self.index[v] = Some(self.next_index);
        self.lowlink[v] = self.next_index;
        self.next_index += 1;
        self.stack.push(v);
        self.on_stack[v] = true;
    }

    /// Iterative strong-connect from `root`.
    fn strong_connect(&mut self, root: usize, adjacency: &[Vec<usize>]) {
        // (node, next edge to explore)
        let mut call_stack = vec![(root, 0usize)];
        self.visit(root);

        while let Some(frame) = call_stack.last_mut() {
            let v = frame.0;
            if let Some(&w) = adjacency[v].get(frame.1) {
                frame.1 += 1;
                match self.index[w] {
                    None => {
                        self.visit(w);
                        call_stack.push((w, 0));
                    }
                    Some(w_index) if self.on_stack[w] => {
                        self.lowlink[v] = self.lowlink[v].min(w_index);
                    }
                    Some(_) => {}
                }
                continue;
            }

            call_stack.pop();
            if let Some(&(parent, _)) = call_stack.last() {
                self.lowlink[parent] = self.lowlink[parent].min(self.lowlink[v]);
            }

            if Some(self.lowlink[v]) == self.index[v] {
                let mut component = Vec::new();
                while let Some(w) = self.stack.pop() {
                    self.on_stack[w] = false;
                    component.push(w);
                    if w == v {
                        break;
                    }
                }
                self.components.push(component);
            }
        }
    }
}

/// Order bodies so that supports come before what rests on them.
///
/// `adjacency[i]` lists the bodies `i` rests on; out-of-range entries are
/// ignored. Roots are visited in `prior_order`, which must be a permutation
/// of `0..adjacency.len()`. Members of one component keep their relative
/// position from `prior_order`.
#[must_use]
pub fn topological_order(prior_order: &[BodyId], adjacency: &[Vec<usize>]) -> ContactOrdering {
    let n = adjacency.len();
    let adjacency: Vec<Vec<usize>> = adjacency
        .iter()
        .map(|edges| edges.iter().copied().filter(|&k| k < n).collect())
        .collect();

    let mut rank = vec![usize::MAX; n];
    for (position, id) in prior_order.iter().enumerate() {
        if let Some(slot) = rank.get_mut(id.index()) {
            *slot = position;
        }
    }

    let mut ctx = TarjanContext::new(n);
    for id in prior_order {
        let v = id.index();
        if v < n && ctx.index[v].is_none() {
            ctx.strong_connect(v, &adjacency);
        }
    }

    let mut order = Vec::with_capacity(n);
    let mut component_of = vec![0; n];
    for (component, mut members) in ctx.components.into_iter().enumerate() {
        members.sort_by_key(|&m| rank[m]);
        for m in members {
            component_of[m] = component;
            order.push(BodyId::new(m));
        }
    }

    ContactOrdering {
        component_count: component_of.iter().max().map_or(0, |&c| c + 1),
        order,
        component_of,
    }
}
