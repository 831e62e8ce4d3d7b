//! `Simulator`: the external generative-model interface the core is
//! polymorphic over. Concrete problems (battleship, pocman, rocksample,
//! tag, network, ...) implement this trait; the core never sees their
//! internals.

use crate::arena::VNodeHandle;
use crate::arena::{Arena, QNode};
use crate::belief::BeliefState;
use crate::history::History;
use rand::Rng;

/// How much domain knowledge a `Simulator` contributes to tree priors and
/// rollout action selection, applied independently to each.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
#[repr(u8)]
pub enum KnowledgeLevel {
    Pure = 0,
    Legal = 1,
    Smart = 2,
}

/// Knowledge levels applied to the tree prior and to rollout action
/// selection, plus the seed count/value used to bias preferred actions in
/// the tree (`SmartTreeCount`/`SmartTreeValue` in the original source).
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Knowledge {
    pub rollout_level: KnowledgeLevel,
    pub tree_level: KnowledgeLevel,
    pub smart_tree_count: u64,
    pub smart_tree_value: f64,
}

impl Default for Knowledge {
    fn default() -> Self {
        Self {
            rollout_level: KnowledgeLevel::Legal,
            tree_level: KnowledgeLevel::Legal,
            smart_tree_count: 10,
            smart_tree_value: 1.0,
        }
    }
}

/// Which phase of a simulation the planner is currently in, and whether
/// the particle filter is believed consistent with the real history.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Tree,
    Rollout,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParticleStatus {
    Consistent,
    Inconsistent,
    Resampled,
    OutOfParticles,
}

/// Mutable status the planner threads through a simulation: which phase it
/// is in, and how it currently regards the particle filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Status {
    pub phase: Phase,
    pub particles: ParticleStatus,
}

impl Default for Status {
    fn default() -> Self {
        Self {
            phase: Phase::Tree,
            particles: ParticleStatus::Consistent,
        }
    }
}

/// The external generative model the planner searches against.
///
/// Mandatory operations model the POMDP's generative process
/// (`create_start_state`/`step`/`copy`) and its static shape
/// (`num_actions`/`num_observations`/`discount`/`reward_range`). Optional
/// hooks default to the same behavior the original C++ `SIMULATOR` base
/// class ships: uniform rollout action selection, no domain knowledge, no
/// local-move-based reinvigoration, no alpha-vector value function.
pub trait Simulator {
    type State: Clone;

    fn num_actions(&self) -> usize;
    fn num_observations(&self) -> usize;
    fn discount(&self) -> f64;
    fn reward_range(&self) -> f64;
    fn knowledge(&self) -> Knowledge {
        Knowledge::default()
    }

    /// Sample a start state from the initial belief.
    fn create_start_state<R: Rng + ?Sized>(&self, rng: &mut R) -> Self::State;

    /// Deep-copy a state. The core never mutates a state it didn't create
    /// via `create_start_state` or `copy`.
    fn copy(&self, state: &Self::State) -> Self::State;

    /// Release a state the core no longer needs. Default: drop it. A
    /// simulator that tracks external resources per state (e.g. for
    /// allocation-count testing) can override this.
    fn free_state(&self, state: Self::State) {
        drop(state);
    }

    /// Advance `state` in place by `action`, producing an observation and
    /// reward. Returns `true` if the episode has terminated.
    fn step<R: Rng + ?Sized>(
        &self,
        state: &mut Self::State,
        action: usize,
        rng: &mut R,
    ) -> StepResult;

    /// `ceil(log accuracy / log discount)` when `discount < 1`, else
    /// `undiscounted_horizon`.
    fn horizon(&self, accuracy: f64, undiscounted_horizon: u32) -> f64 {
        let discount = self.discount();
        if discount >= 1.0 {
            undiscounted_horizon as f64
        } else {
            accuracy.ln() / discount.ln()
        }
    }

    /// Generate the set of legal actions in `state`. Default: every action
    /// is legal.
    fn generate_legal(&self, _state: &Self::State, _history: &History, _status: &Status) -> Vec<usize> {
        (0..self.num_actions()).collect()
    }

    /// Generate the set of domain-preferred actions in `state`. Default:
    /// empty (no preference).
    fn generate_preferred(&self, _state: &Self::State, _history: &History, _status: &Status) -> Vec<usize> {
        Vec::new()
    }

    /// Perturb `state` in place into a history-consistent neighbor after
    /// the last action/observation in `history` were replayed against it.
    /// Used by particle reinvigoration (`create_transform`). Default:
    /// always accept (no perturbation needed).
    ///
    /// Implementers must treat `state` here as no more privileged than any
    /// other particle: this hook (like `select_random`) must not use
    /// information a real agent wouldn't have, since the driver's
    /// particle-exhaustion fallback calls `select_random` against the
    /// *real* environment's state using the *simulation* simulator.
    fn local_move(
        &self,
        _state: &mut Self::State,
        _history: &History,
        _last_observation: usize,
        _status: &Status,
    ) -> bool {
        true
    }

    /// Choose a rollout action. Default chain: if `RolloutLevel >= Smart`,
    /// sample uniformly among `generate_preferred`'s results (falling
    /// through if empty); else if `>= Legal`, sample among
    /// `generate_legal`'s results; else uniform over all actions.
    ///
    /// See the `local_move` doc comment: this may be called with a state
    /// that belongs to the *real* environment during the driver's
    /// particle-exhaustion fallback, so implementations must not use
    /// information beyond what `state`'s fully-observable fields expose.
    fn select_random<R: Rng + ?Sized>(
        &self,
        state: &Self::State,
        history: &History,
        status: &Status,
        rng: &mut R,
    ) -> usize {
        let knowledge = self.knowledge();
        if knowledge.rollout_level >= KnowledgeLevel::Smart {
            let preferred = self.generate_preferred(state, history, status);
            if !preferred.is_empty() {
                return preferred[rng.random_range(0..preferred.len())];
            }
        }
        if knowledge.rollout_level >= KnowledgeLevel::Legal {
            let legal = self.generate_legal(state, history, status);
            if !legal.is_empty() {
                return legal[rng.random_range(0..legal.len())];
            }
        }
        rng.random_range(0..self.num_actions())
    }

    /// Seed a freshly-allocated `VNode`'s children with domain-knowledge
    /// priors. Default per the original `SIMULATOR::Prior`:
    /// - `tree_level == Pure` (or no state to reason about): no-op, every
    ///   child stays at count 0 / value 0.
    /// - Otherwise every child starts "forbidden" (huge count, `-inf`
    ///   value) and is un-forbidden by `generate_legal` (reset to
    ///   count 0 / value 0) and then, if `tree_level >= Smart`, further
    ///   seeded by `generate_preferred` with `smart_tree_count`/
    ///   `smart_tree_value`.
    fn prior(
        &self,
        state: Option<&Self::State>,
        history: &History,
        status: &Status,
        arena: &mut Arena<Self::State>,
        vnode: VNodeHandle,
    ) {
        let knowledge = self.knowledge();
        let state = match (knowledge.tree_level, state) {
            (KnowledgeLevel::Pure, _) | (_, None) => return,
            (_, Some(s)) => s,
        };

        const LARGE_COUNT: u64 = 1_000_000;
        for a in 0..self.num_actions() {
            let q = arena.qnode_mut(arena.vnode(vnode).child(a));
            q.value.set(LARGE_COUNT, f64::NEG_INFINITY);
        }

        if knowledge.tree_level >= KnowledgeLevel::Legal {
            for a in self.generate_legal(state, history, status) {
                let q = arena.qnode_mut(arena.vnode(vnode).child(a));
                q.value.set(0, 0.0);
                q.amaf.set(0, 0.0);
            }
        }

        if knowledge.tree_level >= KnowledgeLevel::Smart {
            for a in self.generate_preferred(state, history, status) {
                let q = arena.qnode_mut(arena.vnode(vnode).child(a));
                q.value.set(knowledge.smart_tree_count, knowledge.smart_tree_value);
                q.amaf.set(knowledge.smart_tree_count, knowledge.smart_tree_value);
            }
        }
    }

    /// Optional alpha-vector value function, for simulators with an exact
    /// POMDP solution available. Default: none.
    fn has_alpha(&self) -> bool {
        false
    }

    fn alpha_value(&self, _qnode: &QNode) -> Option<(f64, u64)> {
        None
    }

    /// Display hooks: forward to `log::debug!` by default, never to a
    /// writer threaded through the core.
    fn display_state(&self, _state: &Self::State) {}
    fn display_beliefs(&self, _beliefs: &BeliefState<Self::State>) {}
    fn display_action(&self, action: usize) {
        log::debug!("action {action}");
    }
    fn display_observation(&self, observation: usize) {
        log::debug!("observation {observation}");
    }
    fn display_reward(&self, reward: f64) {
        log::debug!("reward {reward}");
    }
}

/// Result of stepping a `Simulator`: the observation, reward, and whether
/// the episode terminated.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepResult {
    pub observation: usize,
    pub reward: f64,
    pub terminal: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn knowledge_levels_order() {
        assert!(KnowledgeLevel::Pure < KnowledgeLevel::Legal);
        assert!(KnowledgeLevel::Legal < KnowledgeLevel::Smart);
    }

    #[test]
    fn discount_one_uses_undiscounted_horizon() {
        struct Dummy;
        impl Simulator for Dummy {
            type State = ();
            fn num_actions(&self) -> usize { 1 }
            fn num_observations(&self) -> usize { 1 }
            fn discount(&self) -> f64 { 1.0 }
            fn reward_range(&self) -> f64 { 1.0 }
            fn create_start_state<R: Rng + ?Sized>(&self, _rng: &mut R) -> Self::State {}
            fn copy(&self, _s: &Self::State) -> Self::State {}
            fn step<R: Rng + ?Sized>(&self, _s: &mut Self::State, _a: usize, _rng: &mut R) -> StepResult {
                StepResult { observation: 0, reward: 0.0, terminal: true }
            }
        }
        assert_eq!(Dummy.horizon(0.01, 1000), 1000.0);
    }
}
