//! Table-driven explicit Runge-Kutta solvers
//!
//! Each round stores the derivative sample of one stage and, while stages
//! remain, moves the tentative state to the next stage point
//! `x0 + h * sum(a_rj * k_j)`. The last tableau row is the propagated
//! solution; the remaining rounds evaluate the model at the end point so that
//! embedded error estimates (and downstream actors) see the new state.

use fixsim_types::SolverType;

use super::base::{IntegratorState, RoundSolver, Rounds};

/// Butcher tableau with an optional embedded error estimate
#[derive(Debug)]
pub struct Tableau {
    /// Time fraction of each round
    pub fractions: &'static [f64],
    /// Stage coefficients, one row per integrating round
    pub rows: &'static [&'static [f64]],
    /// Error weights over the derivative samples, empty if none
    pub error: &'static [f64],
    pub order: usize,
    pub error_order: usize,
}

/// Forward Euler, 2 rounds
///
/// Round 0 samples the derivative at the step start and moves to the end
/// point; round 1 evaluates the model at the end point.
static FORWARD_EULER: Tableau = Tableau {
    fractions: &[0.0, 1.0],
    rows: &[&[1.0]],
    error: &[],
    order: 1,
    error_order: 1,
};

/// Bogacki-Shampine 3(2), first same as last
///
/// The fourth derivative sample, taken at the end point, only feeds the
/// error estimate.
#[rustfmt::skip]
static RK23: Tableau = Tableau {
    fractions: &[0.0, 1.0/2.0, 3.0/4.0, 1.0],
    rows: &[
        &[1.0/2.0],
        &[0.0, 3.0/4.0],
        &[2.0/9.0, 1.0/3.0, 4.0/9.0],
    ],
    error: &[-5.0/72.0, 1.0/12.0, 1.0/9.0, -1.0/8.0],
    order: 3,
    error_order: 2,
};

/// Cash-Karp 5(4)
#[rustfmt::skip]
static RK45: Tableau = Tableau {
    fractions: &[0.0, 1.0/5.0, 3.0/10.0, 3.0/5.0, 1.0, 7.0/8.0, 1.0],
    rows: &[
        &[1.0/5.0],
        &[3.0/40.0, 9.0/40.0],
        &[3.0/10.0, -9.0/10.0, 6.0/5.0],
        &[-11.0/54.0, 5.0/2.0, -70.0/27.0, 35.0/27.0],
        &[1631.0/55296.0, 175.0/512.0, 575.0/13824.0, 44275.0/110592.0, 253.0/4096.0],
        &[37.0/378.0, 0.0, 250.0/621.0, 125.0/594.0, 0.0, 512.0/1771.0],
    ],
    error: &[-277.0/64512.0, 0.0, 6925.0/370944.0, -6925.0/202752.0, -277.0/14336.0, 277.0/7084.0],
    order: 5,
    error_order: 4,
};

/// Explicit Runge-Kutta solver driven by a [`Tableau`]
///
/// # Characteristics
/// - `ForwardEuler`: order 1, fixed step, 2 rounds
/// - `ExplicitRK23`: order 3 with embedded order 2 estimate, 4 rounds
/// - `ExplicitRK45`: order 5 with embedded order 4 estimate, 7 rounds
///
/// # References
/// - Bogacki, P., & Shampine, L. F. (1989). "A 3(2) pair of Runge-Kutta
///   formulas". Applied Mathematics Letters, 2(4), 321-325.
/// - Cash, J. R., & Karp, A. H. (1990). "A variable order Runge-Kutta method
///   for initial value problems with rapidly varying right-hand sides".
///   ACM Transactions on Mathematical Software, 16(3), 201-222.
#[derive(Debug, Clone)]
pub struct ExplicitRungeKutta {
    solver_type: SolverType,
    tableau: &'static Tableau,
}

impl ExplicitRungeKutta {
    pub fn forward_euler() -> Self {
        Self {
            solver_type: SolverType::ForwardEuler,
            tableau: &FORWARD_EULER,
        }
    }

    pub fn rk23() -> Self {
        Self {
            solver_type: SolverType::ExplicitRK23,
            tableau: &RK23,
        }
    }

    pub fn rk45() -> Self {
        Self {
            solver_type: SolverType::ExplicitRK45,
            tableau: &RK45,
        }
    }

    pub fn tableau(&self) -> &'static Tableau {
        self.tableau
    }
}

impl RoundSolver for ExplicitRungeKutta {
    fn solver_type(&self) -> SolverType {
        self.solver_type
    }

    fn order(&self) -> usize {
        self.tableau.order
    }

    fn error_order(&self) -> usize {
        self.tableau.error_order
    }

    fn rounds(&self) -> Rounds {
        Rounds::Fixed(self.tableau.fractions.len())
    }

    fn time_fraction(&self, round: usize) -> f64 {
        self.tableau.fractions.get(round).copied().unwrap_or(1.0)
    }

    fn aux_variable_count(&self) -> usize {
        self.tableau.rows.len().max(self.tableau.error.len())
    }

    fn is_fixed_step(&self) -> bool {
        self.tableau.error.is_empty()
    }

    fn integrate(&self, round: usize, step: f64, derivative: f64, state: &mut IntegratorState) {
        state.ensure_aux(self.aux_variable_count());
        if let Some(slot) = state.aux.get_mut(round) {
            *slot = derivative;
        }
        if let Some(row) = self.tableau.rows.get(round) {
            let slope: f64 = row.iter().zip(&state.aux).map(|(a, k)| a * k).sum();
            state.tentative = state.committed + step * slope;
        }
    }

    fn local_error(&self, step: f64, state: &IntegratorState) -> Option<f64> {
        if self.tableau.error.is_empty() {
            return None;
        }
        let slope: f64 = self
            .tableau
            .error
            .iter()
            .zip(&state.aux)
            .map(|(e, k)| e * k)
            .sum();
        Some((step * slope).abs())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    /// Drive the rounds of `steps` steps of dx/dt = f(x)
    fn integrate<F: Fn(f64) -> f64>(
        solver: &ExplicitRungeKutta,
        f: F,
        x0: f64,
        h: f64,
        steps: usize,
    ) -> IntegratorState {
        let mut state = IntegratorState::new(x0);
        let Rounds::Fixed(rounds) = solver.rounds() else {
            panic!("explicit solver must have fixed rounds");
        };
        for _ in 0..steps {
            for round in 0..rounds {
                let k = f(state.tentative);
                solver.integrate(round, h, k, &mut state);
            }
            state.commit();
        }
        state
    }

    #[test]
    fn test_forward_euler_decay() {
        let solver = ExplicitRungeKutta::forward_euler();
        let state = integrate(&solver, |x| -x, 1.0, 0.1, 10);
        assert_relative_eq!(state.committed, 0.9f64.powi(10), epsilon = 1e-12);
        assert!(solver.is_fixed_step());
    }

    #[test]
    fn test_rk23_decay() {
        let solver = ExplicitRungeKutta::rk23();
        let state = integrate(&solver, |x| -x, 1.0, 0.1, 10);
        assert_relative_eq!(state.committed, (-1.0f64).exp(), max_relative = 1e-4);
    }

    #[test]
    fn test_rk45_decay() {
        let solver = ExplicitRungeKutta::rk45();
        let state = integrate(&solver, |x| -x, 1.0, 0.1, 10);
        assert_relative_eq!(state.committed, (-1.0f64).exp(), max_relative = 1e-7);
    }

    #[test]
    fn test_error_estimate_constant_derivative() {
        let solver = ExplicitRungeKutta::rk45();
        let state = integrate(&solver, |_| 1.0, 0.0, 0.5, 1);
        assert_relative_eq!(state.committed, 0.5, epsilon = 1e-14);
        assert!(solver.local_error(0.5, &state).unwrap() < 1e-14);
    }

    #[test]
    fn test_error_estimate_detects_large_step() {
        let solver = ExplicitRungeKutta::rk23();
        let mut state = IntegratorState::new(1.0);
        for round in 0..4 {
            let k = -10.0 * state.tentative;
            solver.integrate(round, 1.0, k, &mut state);
        }
        assert!(solver.local_error(1.0, &state).unwrap() > 1e-2);
    }

    #[test]
    fn test_tableau_rows_consistent() {
        for solver in [
            ExplicitRungeKutta::forward_euler(),
            ExplicitRungeKutta::rk23(),
            ExplicitRungeKutta::rk45(),
        ] {
            for (r, row) in solver.tableau().rows.iter().enumerate() {
                let c: f64 = row.iter().sum();
                assert_relative_eq!(c, solver.time_fraction(r + 1), epsilon = 1e-14);
            }
        }
    }
}
