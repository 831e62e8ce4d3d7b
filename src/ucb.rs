//! Process-wide fast UCB lookup table: precomputed `sqrt(ln N / n)` for
//! `N < UCB_N`, `n < UCB_n`. Lookups outside this window fall through to
//! the direct computation; `n == 0` is `+inf` (every action tried once).
//!
//! The table itself carries no exploration constant — that's applied per
//! planner at score time (§9 design notes) — so one process-wide table
//! serves every `Planner` regardless of its `exploration_constant`.

use std::sync::OnceLock;

const UCB_N: usize = 10_000;
const UCB_N_SMALL: usize = 100;

struct UcbTable {
    values: Vec<f64>,
}

impl UcbTable {
    fn build() -> Self {
        let mut values = vec![0.0; UCB_N * UCB_N_SMALL];
        for big_n in 0..UCB_N {
            for small_n in 0..UCB_N_SMALL {
                values[big_n * UCB_N_SMALL + small_n] = if small_n == 0 {
                    f64::INFINITY
                } else {
                    ((big_n.max(1) as f64).ln() / small_n as f64).sqrt()
                };
            }
        }
        Self { values }
    }

    fn get(&self, big_n: usize, small_n: usize) -> f64 {
        self.values[big_n * UCB_N_SMALL + small_n]
    }
}

static TABLE: OnceLock<UcbTable> = OnceLock::new();

/// `sqrt(ln(max(big_n, 1)) / small_n)`, `+inf` when `small_n == 0`. Uses
/// the precomputed table when both arguments are in range, otherwise
/// computes directly.
pub fn fast_ucb(big_n: u64, small_n: u64, log_big_n: f64) -> f64 {
    if small_n == 0 {
        return f64::INFINITY;
    }
    if (big_n as usize) < UCB_N && (small_n as usize) < UCB_N_SMALL {
        TABLE.get_or_init(UcbTable::build).get(big_n as usize, small_n as usize)
    } else {
        (log_big_n / small_n as f64).sqrt()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn zero_visits_is_infinite() {
        assert_eq!(fast_ucb(5, 0, 5.0_f64.ln()), f64::INFINITY);
    }

    #[test]
    fn table_matches_direct_computation() {
        for (big_n, small_n) in [(1u64, 1u64), (50, 3), (9999, 99)] {
            let log_n = (big_n.max(1) as f64).ln();
            let table_val = fast_ucb(big_n, small_n, log_n);
            let direct = (log_n / small_n as f64).sqrt();
            assert!((table_val - direct).abs() < 1e-9);
        }
    }

    #[test]
    fn falls_through_outside_table_window() {
        let big_n = 20_000u64;
        let small_n = 5u64;
        let log_n = (big_n as f64).ln();
        let expected = (log_n / small_n as f64).sqrt();
        assert!((fast_ucb(big_n, small_n, log_n) - expected).abs() < 1e-9);
    }
}
