//! `BeliefState`: the particle filter. An unordered bag of owned state
//! samples approximating the posterior over hidden state given a history.

use rand::Rng;

use crate::simulator::Simulator;

/// A bag of owned particles. `add_sample` takes ownership; `get_sample`
/// returns a uniformly-random particle without removing it (callers that
/// need an owned copy call `Simulator::copy` on the result).
#[derive(Debug)]
pub struct BeliefState<S> {
    particles: Vec<S>,
}

// Written by hand rather than `#[derive(Default)]`: the derive macro would
// add a spurious `S: Default` bound, but an empty particle bag never needs
// one.
impl<S> Default for BeliefState<S> {
    fn default() -> Self {
        Self::new()
    }
}

impl<S> BeliefState<S> {
    pub fn new() -> Self {
        Self { particles: Vec::new() }
    }

    pub fn add_sample(&mut self, state: S) {
        self.particles.push(state);
    }

    pub fn size(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Uniform-with-replacement sample; does not remove the particle.
    pub fn get_sample<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<&S> {
        if self.particles.is_empty() {
            None
        } else {
            Some(&self.particles[rng.random_range(0..self.particles.len())])
        }
    }

    pub fn particles(&self) -> &[S] {
        &self.particles
    }

    pub fn into_particles(self) -> Vec<S> {
        self.particles
    }

    /// Release every particle through the simulator and empty the bag.
    pub fn free<Sim: Simulator<State = S>>(&mut self, sim: &Sim) {
        for particle in self.particles.drain(..) {
            sim.free_state(particle);
        }
    }
}

impl<S: Clone> BeliefState<S> {
    /// Deep-copy every particle via `Simulator::copy` into a fresh bag.
    pub fn deep_copy<Sim: Simulator<State = S>>(&self, sim: &Sim) -> Self {
        Self {
            particles: self.particles.iter().map(|s| sim.copy(s)).collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulator::StepResult;
    use rand::rngs::SmallRng;
    use rand::SeedableRng;
    use std::cell::Cell;
    use std::rc::Rc;

    struct CountingSim {
        frees: Rc<Cell<u32>>,
    }
    impl Simulator for CountingSim {
        type State = u32;
        fn num_actions(&self) -> usize {
            1
        }
        fn num_observations(&self) -> usize {
            1
        }
        fn discount(&self) -> f64 {
            1.0
        }
        fn reward_range(&self) -> f64 {
            1.0
        }
        fn create_start_state<R: Rng + ?Sized>(&self, _rng: &mut R) -> Self::State {
            0
        }
        fn copy(&self, s: &Self::State) -> Self::State {
            *s
        }
        fn step<R: Rng + ?Sized>(&self, _s: &mut Self::State, _a: usize, _rng: &mut R) -> StepResult {
            StepResult { observation: 0, reward: 0.0, terminal: true }
        }
        fn free_state(&self, _state: Self::State) {
            self.frees.set(self.frees.get() + 1);
        }
    }

    #[test]
    fn copy_then_free_nets_zero_particles() {
        let frees = Rc::new(Cell::new(0));
        let sim = CountingSim { frees: frees.clone() };
        let mut belief = BeliefState::new();
        for s in 0..5u32 {
            belief.add_sample(s);
        }
        let mut copy = belief.deep_copy(&sim);
        assert_eq!(copy.size(), 5);
        copy.free(&sim);
        assert_eq!(copy.size(), 0);
        assert_eq!(frees.get(), 5);
    }

    #[test]
    fn get_sample_is_uniform_and_nondestructive() {
        let mut rng = SmallRng::seed_from_u64(42);
        let mut belief = BeliefState::new();
        for s in 0..10u32 {
            belief.add_sample(s);
        }
        let before = belief.size();
        let sampled = *belief.get_sample(&mut rng).unwrap();
        assert!(sampled < 10);
        assert_eq!(belief.size(), before);
    }

    #[test]
    fn empty_belief_returns_no_sample() {
        let mut rng = SmallRng::seed_from_u64(1);
        let belief: BeliefState<u32> = BeliefState::new();
        assert!(belief.get_sample(&mut rng).is_none());
    }
}
