//! Property tests for the ledger engine
//!
//! Random Receive/Move/Remove sequences must keep every material equal to its
//! live lots, every lot equal to its ledger entries, and the stock total equal
//! to what was received minus what was removed.

mod common;

use common::{fixture, Fixture};
use inventory_ledger::LedgerError;
use ledger_shared::{MaterialFilter, MaterialId, MoveCommand, RemoveCommand};
use proptest::prelude::*;

#[derive(Debug, Clone)]
enum Step {
    Receive {
        stock: usize,
        cost: i64,
        quantity: i32,
        location: usize,
    },
    Move {
        pick: usize,
        location: usize,
        quantity: i32,
    },
    Remove {
        pick: usize,
        quantity: i32,
    },
}

fn step_strategy() -> impl Strategy<Value = Step> {
    prop_oneof![
        (0..3usize, 1..4i64, 1..20i32, 0..3usize).prop_map(|(stock, cost, quantity, location)| {
            Step::Receive {
                stock,
                cost,
                quantity,
                location,
            }
        }),
        (any::<usize>(), 0..3usize, 1..25i32).prop_map(|(pick, location, quantity)| Step::Move {
            pick,
            location,
            quantity,
        }),
        (any::<usize>(), 1..25i32).prop_map(|(pick, quantity)| Step::Remove { pick, quantity }),
    ]
}

/// Failures a valid command may legitimately hit
fn is_expected(err: &LedgerError) -> bool {
    matches!(
        err.root(),
        LedgerError::InvalidQuantity { .. } | LedgerError::Validation { .. }
    )
}

async fn total_on_hand(f: &Fixture) -> i64 {
    f.engine
        .materials(&MaterialFilter::default())
        .await
        .unwrap()
        .iter()
        .map(|l| i64::from(l.material.quantity))
        .sum()
}

async fn run_steps(steps: Vec<Step>) -> Result<(), TestCaseError> {
    let f = fixture().await;
    let locations = [f.loc1, f.loc2, f.loc3];
    let mut known: Vec<MaterialId> = Vec::new();
    let mut received = 0i64;
    let mut removed = 0i64;

    for step in steps {
        match step {
            Step::Receive {
                stock,
                cost,
                quantity,
                location,
            } => {
                let receipt = f
                    .stock(&format!("S{stock}"), cost, quantity, locations[location])
                    .await;
                if !known.contains(&receipt.material_id) {
                    known.push(receipt.material_id);
                }
                received += i64::from(quantity);
            }
            Step::Move {
                pick,
                location,
                quantity,
            } => {
                if known.is_empty() {
                    continue;
                }
                let material_id = known[pick % known.len()];
                match f
                    .engine
                    .move_material(MoveCommand {
                        material_id,
                        location_id: locations[location],
                        quantity,
                        notes: None,
                    })
                    .await
                {
                    Ok(receipt) => {
                        if !known.contains(&receipt.destination_id) {
                            known.push(receipt.destination_id);
                        }
                    }
                    Err(e) => prop_assert!(is_expected(&e), "unexpected error: {e}"),
                }
            }
            Step::Remove { pick, quantity } => {
                if known.is_empty() {
                    continue;
                }
                let material_id = known[pick % known.len()];
                match f
                    .engine
                    .remove(RemoveCommand {
                        material_id,
                        quantity,
                        job_ticket: None,
                    })
                    .await
                {
                    Ok(_) => removed += i64::from(quantity),
                    Err(e) => prop_assert!(is_expected(&e), "unexpected error: {e}"),
                }
            }
        }

        let report = f.engine.audit().await.unwrap();
        prop_assert!(report.is_clean(), "{:?}", report.discrepancies);
        prop_assert_eq!(total_on_hand(&f).await, received - removed);
    }

    Ok(())
}

// ============================================================================
// Property Tests
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Every committed command leaves the ledger reconciled and conserves stock
    #[test]
    fn prop_random_commands_keep_ledger_balanced(
        steps in prop::collection::vec(step_strategy(), 1..40)
    ) {
        tokio_test::block_on(run_steps(steps))?;
    }

    /// A move never changes the total of its stock id
    #[test]
    fn prop_move_conserves_quantity(
        first in 1..30i32,
        second in 1..30i32,
        moved in 1..60i32,
    ) {
        tokio_test::block_on(async {
            let f = fixture().await;
            let source = f.stock("S1", 10, first, f.loc1).await.material_id;
            f.stock("S1", 12, second, f.loc1).await;

            let result = f
                .engine
                .move_material(MoveCommand {
                    material_id: source,
                    location_id: f.loc2,
                    quantity: moved,
                    notes: None,
                })
                .await;

            match result {
                Ok(receipt) => {
                    prop_assert!(moved <= first + second);
                    prop_assert_eq!(
                        receipt.source_quantity + receipt.destination_quantity,
                        first + second
                    );
                }
                Err(e) => {
                    prop_assert!(moved > first + second);
                    let is_invalid_quantity =
                        matches!(e.root(), LedgerError::InvalidQuantity { .. });
                    prop_assert!(is_invalid_quantity);
                }
            }
            prop_assert_eq!(total_on_hand(&f).await, i64::from(first + second));
            Ok(())
        })?;
    }
}
