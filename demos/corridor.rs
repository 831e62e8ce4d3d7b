//! A 1-D partially-observable corridor: the agent's true position is
//! hidden behind a noisy sensor, and must walk off either end to
//! terminate. Small enough to run `NumStartStates` in the hundreds, large
//! enough that the belief actually narrows over several steps.

use pomcp::simulator::{Simulator, StepResult};
use rand::Rng;

pub const LEFT: usize = 0;
pub const RIGHT: usize = 1;

pub const WIDTH: i32 = 5;
pub const PIT: i32 = 0;
pub const GOAL: i32 = WIDTH - 1;

/// Position in `0..WIDTH`, starting uniformly in the interior.
pub struct Corridor {
    pub sensor_accuracy: f64,
}

impl Default for Corridor {
    fn default() -> Self {
        Self { sensor_accuracy: 0.8 }
    }
}

impl Corridor {
    fn noisy_observation<R: Rng + ?Sized>(&self, position: i32, rng: &mut R) -> usize {
        let observed = if rng.random_bool(self.sensor_accuracy) {
            position
        } else if rng.random_bool(0.5) {
            (position - 1).clamp(PIT, GOAL)
        } else {
            (position + 1).clamp(PIT, GOAL)
        };
        observed as usize
    }
}

impl Simulator for Corridor {
    type State = i32;

    fn num_actions(&self) -> usize {
        2
    }

    fn num_observations(&self) -> usize {
        WIDTH as usize
    }

    fn discount(&self) -> f64 {
        0.99
    }

    fn reward_range(&self) -> f64 {
        2.0
    }

    fn create_start_state<R: Rng + ?Sized>(&self, rng: &mut R) -> Self::State {
        rng.random_range(1..GOAL)
    }

    fn copy(&self, state: &Self::State) -> Self::State {
        *state
    }

    fn step<R: Rng + ?Sized>(&self, state: &mut Self::State, action: usize, rng: &mut R) -> StepResult {
        *state += if action == RIGHT { 1 } else { -1 };
        *state = (*state).clamp(PIT, GOAL);

        let terminal = *state == PIT || *state == GOAL;
        let reward = if *state == GOAL {
            1.0
        } else if *state == PIT {
            -1.0
        } else {
            0.0
        };
        let observation = self.noisy_observation(*state, rng);
        StepResult { observation, reward, terminal }
    }

    fn display_state(&self, state: &Self::State) {
        log::debug!("position {state}");
    }
}
