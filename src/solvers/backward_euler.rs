//! Implicit backward Euler method

use fixsim_types::SolverType;

use super::base::{IntegratorState, RoundSolver, Rounds};

/// Implicit backward Euler method
///
/// First-order, A-stable and L-stable.
///
/// # Mathematical Form
/// ```text
/// x_{n+1} = x_n + h * f(x_{n+1}, t_{n+1})
/// ```
///
/// Every round is evaluated at `t + h`. The implicit equation is solved by
/// fixed-point iteration across rounds: the derivative observed in round `k`
/// yields the iterate `x_{k+1} = x_n + h * f(x_k)`. The step is resolved once
/// the correction between successive iterates drops below the value
/// resolution.
///
/// # Characteristics
/// - Order: 1
/// - Fixed timestep
/// - Rounds: until converged, bounded by the director's maximum iterations
#[derive(Debug, Clone, Copy, Default)]
pub struct BackwardEuler;

impl RoundSolver for BackwardEuler {
    fn solver_type(&self) -> SolverType {
        SolverType::BackwardEuler
    }

    fn order(&self) -> usize {
        1
    }

    fn rounds(&self) -> Rounds {
        Rounds::UntilConverged
    }

    fn time_fraction(&self, _round: usize) -> f64 {
        1.0
    }

    fn aux_variable_count(&self) -> usize {
        1
    }

    fn is_fixed_step(&self) -> bool {
        true
    }

    fn integrate(&self, _round: usize, step: f64, derivative: f64, state: &mut IntegratorState) {
        state.ensure_aux(1);
        state.aux[0] = derivative;
        let next = state.committed + step * derivative;
        state.correction = (next - state.tentative).abs();
        state.tentative = next;
    }

    fn local_error(&self, _step: f64, _state: &IntegratorState) -> Option<f64> {
        None
    }

    fn is_converged(&self, state: &IntegratorState, value_resolution: f64) -> bool {
        state.correction < value_resolution
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_iterates_converge_to_implicit_solution() {
        let solver = BackwardEuler;
        let h = 0.1;
        let mut state = IntegratorState::new(1.0);
        let mut round = 0;
        while round < 2 || !solver.is_converged(&state, 1e-12) {
            let k = -state.tentative;
            solver.integrate(round, h, k, &mut state);
            round += 1;
            assert!(round < 50);
        }
        // x1 = x0 / (1 + h)
        assert_relative_eq!(state.tentative, 1.0 / 1.1, epsilon = 1e-11);
    }

    #[test]
    fn test_every_round_at_step_end() {
        let solver = BackwardEuler;
        assert_eq!(solver.time_fraction(0), 1.0);
        assert_eq!(solver.time_fraction(7), 1.0);
        assert!(solver.local_error(0.1, &IntegratorState::new(0.0)).is_none());
    }
}
