//! The classic Tiger problem: a two-state, three-action continuing POMDP
//! used throughout the POMCP literature as the smallest non-trivial
//! partially-observable domain. Not derived from any one upstream file —
//! built directly against the `pomcp::simulator::Simulator` trait to
//! exercise the engine end to end.

use pomcp::simulator::{Simulator, StepResult};
use rand::Rng;

pub const LISTEN: usize = 0;
pub const OPEN_LEFT: usize = 1;
pub const OPEN_RIGHT: usize = 2;

pub const HEAR_LEFT: usize = 0;
pub const HEAR_RIGHT: usize = 1;

/// `tiger_left == true` means the tiger is behind the left door.
pub struct Tiger {
    pub listen_accuracy: f64,
}

impl Default for Tiger {
    fn default() -> Self {
        Self { listen_accuracy: 0.85 }
    }
}

impl Simulator for Tiger {
    type State = bool;

    fn num_actions(&self) -> usize {
        3
    }

    fn num_observations(&self) -> usize {
        2
    }

    fn discount(&self) -> f64 {
        0.95
    }

    fn reward_range(&self) -> f64 {
        110.0
    }

    fn create_start_state<R: Rng + ?Sized>(&self, rng: &mut R) -> Self::State {
        rng.random_bool(0.5)
    }

    fn copy(&self, state: &Self::State) -> Self::State {
        *state
    }

    fn step<R: Rng + ?Sized>(&self, state: &mut Self::State, action: usize, rng: &mut R) -> StepResult {
        match action {
            LISTEN => {
                let true_obs = if *state { HEAR_LEFT } else { HEAR_RIGHT };
                let wrong_obs = 1 - true_obs;
                let observation = if rng.random_bool(self.listen_accuracy) { true_obs } else { wrong_obs };
                StepResult { observation, reward: -1.0, terminal: false }
            }
            OPEN_LEFT | OPEN_RIGHT => {
                let opened_left = action == OPEN_LEFT;
                let tiger_behind_opened_door = opened_left == *state;
                let reward = if tiger_behind_opened_door { -100.0 } else { 10.0 };
                *state = rng.random_bool(0.5);
                let observation = if rng.random_bool(0.5) { HEAR_LEFT } else { HEAR_RIGHT };
                StepResult { observation, reward, terminal: false }
            }
            _ => panic!("Tiger has 3 actions: listen={LISTEN}, open_left={OPEN_LEFT}, open_right={OPEN_RIGHT}"),
        }
    }

    fn display_state(&self, state: &Self::State) {
        log::debug!("tiger behind {}", if *state { "left" } else { "right" });
    }
}
