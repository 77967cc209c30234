//! Routing decision taken after every validation.

use serde::{Deserialize, Serialize};

/// Where the run goes after a validation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Route {
    Refine,
    Finalize,
}

/// Finalize on a pass or once the refinement budget is spent, otherwise refine
pub fn route_after_validation(
    validation_passed: bool,
    refinement_iteration: u32,
    max_refinement_iterations: u32,
) -> Route {
    if validation_passed || refinement_iteration >= max_refinement_iterations {
        Route::Finalize
    } else {
        Route::Refine
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pass_always_finalizes() {
        for max in 0..6 {
            for iteration in 0..10 {
                assert_eq!(route_after_validation(true, iteration, max), Route::Finalize);
            }
        }
    }

    #[test]
    fn test_failure_refines_until_budget_spent() {
        for max in 0..6 {
            for iteration in 0..10 {
                let expected = if iteration >= max {
                    Route::Finalize
                } else {
                    Route::Refine
                };
                assert_eq!(route_after_validation(false, iteration, max), expected);
            }
        }
    }
}
