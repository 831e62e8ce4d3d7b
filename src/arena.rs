//! Pool-allocated node arena: `VNode`/`QNode` storage with an explicit
//! free list, so the planner can release a pruned subtree without relying
//! on reference counting or a garbage collector.
//!
//! Mirrors the original's intent (§3/§9 of SPEC_FULL.md): avoid allocator
//! churn across millions of node creations, and make lifetime explicit —
//! the planner owns the arena, the root owns the tree, the tree owns the
//! belief particles.

use std::collections::HashMap;

use crate::belief::BeliefState;
use crate::simulator::Simulator;
use crate::stats::RunningStatistic;

/// Handle to a `VNode` living in an `Arena`. Opaque index, not a pointer:
/// stays valid until the arena frees it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct VNodeHandle(usize);

/// Handle to a `QNode` living in an `Arena`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct QNodeHandle(usize);

/// Observation/belief node: the root of a subtree reached by one specific
/// history. Owns exactly `num_actions` `QNode` children and a bag of
/// belief particles.
pub struct VNode<S> {
    children: Vec<QNodeHandle>,
    belief: BeliefState<S>,
    /// Aggregate return statistic across every simulation that has passed
    /// through this node — Invariant 1 (§8): its count equals the sum of
    /// its children's `QNode::value` counts.
    pub value: RunningStatistic,
}

impl<S> VNode<S> {
    pub fn child(&self, action: usize) -> QNodeHandle {
        self.children[action]
    }

    pub fn num_actions(&self) -> usize {
        self.children.len()
    }

    pub fn belief(&self) -> &BeliefState<S> {
        &self.belief
    }

    pub fn belief_mut(&mut self) -> &mut BeliefState<S> {
        &mut self.belief
    }
}

/// Action node: one per `(parent VNode, action)`. Holds the backed-up
/// return statistic, the AMAF statistic used by RAVE, and a sparse
/// observation -> `VNode` map (most observations never appear).
pub struct QNode {
    pub value: RunningStatistic,
    pub amaf: RunningStatistic,
    children: HashMap<usize, VNodeHandle>,
}

impl QNode {
    fn new() -> Self {
        Self {
            value: RunningStatistic::new(),
            amaf: RunningStatistic::new(),
            children: HashMap::new(),
        }
    }

    pub fn child(&self, observation: usize) -> Option<VNodeHandle> {
        self.children.get(&observation).copied()
    }

    pub fn set_child(&mut self, observation: usize, vnode: VNodeHandle) {
        self.children.insert(observation, vnode);
    }

    pub fn children(&self) -> impl Iterator<Item = (usize, VNodeHandle)> + '_ {
        self.children.iter().map(|(&o, &v)| (o, v))
    }
}

enum Slot<T> {
    Occupied(T),
    Free,
}

/// Free-list-backed slab allocator for `VNode`/`QNode`s.
pub struct Arena<S> {
    vnodes: Vec<Slot<VNode<S>>>,
    qnodes: Vec<Slot<QNode>>,
    vnode_free: Vec<usize>,
    qnode_free: Vec<usize>,
    vnodes_allocated: u64,
    vnodes_freed: u64,
    qnodes_allocated: u64,
    qnodes_freed: u64,
}

impl<S> Default for Arena<S> {
    fn default() -> Self {
        Self {
            vnodes: Vec::new(),
            qnodes: Vec::new(),
            vnode_free: Vec::new(),
            qnode_free: Vec::new(),
            vnodes_allocated: 0,
            vnodes_freed: 0,
            qnodes_allocated: 0,
            qnodes_freed: 0,
        }
    }
}

impl<S> Arena<S> {
    pub fn new() -> Self {
        Self::default()
    }

    fn alloc_qnode(&mut self) -> QNodeHandle {
        self.qnodes_allocated += 1;
        if let Some(idx) = self.qnode_free.pop() {
            self.qnodes[idx] = Slot::Occupied(QNode::new());
            QNodeHandle(idx)
        } else {
            self.qnodes.push(Slot::Occupied(QNode::new()));
            QNodeHandle(self.qnodes.len() - 1)
        }
    }

    /// Allocate a fresh `VNode` with exactly `num_actions` children, all
    /// fields reset to their defaults (zero visits, empty belief).
    pub fn alloc_vnode(&mut self, num_actions: usize) -> VNodeHandle {
        self.vnodes_allocated += 1;
        let children: Vec<QNodeHandle> = (0..num_actions).map(|_| self.alloc_qnode()).collect();
        let node = VNode {
            children,
            belief: BeliefState::new(),
            value: RunningStatistic::new(),
        };
        if let Some(idx) = self.vnode_free.pop() {
            self.vnodes[idx] = Slot::Occupied(node);
            VNodeHandle(idx)
        } else {
            self.vnodes.push(Slot::Occupied(node));
            VNodeHandle(self.vnodes.len() - 1)
        }
    }

    pub fn vnode(&self, handle: VNodeHandle) -> &VNode<S> {
        match &self.vnodes[handle.0] {
            Slot::Occupied(v) => v,
            Slot::Free => panic!("use of freed VNode handle"),
        }
    }

    pub fn vnode_mut(&mut self, handle: VNodeHandle) -> &mut VNode<S> {
        match &mut self.vnodes[handle.0] {
            Slot::Occupied(v) => v,
            Slot::Free => panic!("use of freed VNode handle"),
        }
    }

    pub fn qnode(&self, handle: QNodeHandle) -> &QNode {
        match &self.qnodes[handle.0] {
            Slot::Occupied(q) => q,
            Slot::Free => panic!("use of freed QNode handle"),
        }
    }

    pub fn qnode_mut(&mut self, handle: QNodeHandle) -> &mut QNode {
        match &mut self.qnodes[handle.0] {
            Slot::Occupied(q) => q,
            Slot::Free => panic!("use of freed QNode handle"),
        }
    }

    /// Recursively free `handle` and everything reachable from it: every
    /// observation child's subtree, then this node's belief particles
    /// (via `Simulator::free_state`).
    pub fn free_vnode<Sim: Simulator<State = S>>(&mut self, sim: &Sim, handle: VNodeHandle) {
        let node = match std::mem::replace(&mut self.vnodes[handle.0], Slot::Free) {
            Slot::Occupied(v) => v,
            Slot::Free => panic!("double free of VNode handle"),
        };
        self.vnodes_freed += 1;
        self.vnode_free.push(handle.0);
        for qh in node.children {
            self.free_qnode(sim, qh);
        }
        for particle in node.belief.into_particles() {
            sim.free_state(particle);
        }
    }

    fn free_qnode<Sim: Simulator<State = S>>(&mut self, sim: &Sim, handle: QNodeHandle) {
        let node = match std::mem::replace(&mut self.qnodes[handle.0], Slot::Free) {
            Slot::Occupied(q) => q,
            Slot::Free => panic!("double free of QNode handle"),
        };
        self.qnodes_freed += 1;
        self.qnode_free.push(handle.0);
        for (_, vh) in node.children {
            self.free_vnode(sim, vh);
        }
    }

    /// Total allocations minus total frees, across both node types —
    /// Invariant 3 (§8): this equals the number of nodes reachable from
    /// the current root.
    pub fn live_nodes(&self) -> u64 {
        (self.vnodes_allocated - self.vnodes_freed) + (self.qnodes_allocated - self.qnodes_freed)
    }

    pub fn vnodes_allocated(&self) -> u64 {
        self.vnodes_allocated
    }

    pub fn vnodes_freed(&self) -> u64 {
        self.vnodes_freed
    }
}
