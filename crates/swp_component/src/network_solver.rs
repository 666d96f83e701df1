//! The seam a `st_venant` [`Canal`](crate::Canal) uses instead of an
//! ordinary `step` call.

use swp_diag::SimError;

use crate::canal::Canal;

/// A solver capable of advancing a reach of hydrodynamically-coupled canals
/// together, rather than one at a time.
///
/// `st_venant` canals expose [`Canal::get_equations`] and
/// [`Canal::update_state`] instead of participating in ordinary topological
/// `step` calls; a harness built with `st_venant` canals in its topology
/// must have a `NetworkSolver` registered, or construction fails with
/// [`SimError::InvalidConfig`].
///
/// This core ships no solver implementation: full Saint-Venant equation
/// solving is an external collaborator's responsibility. Callers inject
/// their own implementation (or a test double) through this trait.
pub trait NetworkSolver {
    /// Solves the coupled system formed by `canals` for the current tick,
    /// mutating each canal's state in place via `update_state`.
    ///
    /// # Errors
    ///
    /// Returns [`SimError::SolverDivergence`] if the solver fails to
    /// converge within its own iteration bound.
    fn solve(&mut self, canals: &mut [&mut Canal]) -> Result<(), SimError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use swp_bus::Fields;

    struct NoOpSolver;
    impl NetworkSolver for NoOpSolver {
        fn solve(&mut self, _canals: &mut [&mut Canal]) -> Result<(), SimError> {
            Ok(())
        }
    }

    #[test]
    fn test_solver_trait_object_is_usable() {
        let mut solver: Box<dyn NetworkSolver> = Box::new(NoOpSolver);
        let mut canals: Vec<&mut Canal> = Vec::new();
        assert!(solver.solve(&mut canals).is_ok());
        let _ = Fields::new();
    }
}
