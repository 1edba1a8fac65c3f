//! Reconciliation of materials, lots and the transaction log
//!
//! Read-only. Discrepancies are reported for an operator to investigate; the
//! ledger is never repaired automatically.

use ledger_shared::{LotId, MaterialId, Quantity};
use serde::Serialize;

use crate::store::{LotBalance, MaterialBalance};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum Discrepancy {
    /// Material quantity differs from the sum of its live lots
    MaterialLots {
        material_id: MaterialId,
        quantity: Quantity,
        lot_total: i64,
    },
    /// Lot quantity differs from the sum of its ledger entries
    LotLedger {
        price_id: LotId,
        quantity: Quantity,
        ledger_total: i64,
    },
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditReport {
    pub materials_checked: usize,
    pub lots_checked: usize,
    pub discrepancies: Vec<Discrepancy>,
}

impl AuditReport {
    pub fn is_clean(&self) -> bool {
        self.discrepancies.is_empty()
    }
}

pub fn find_discrepancies(materials: &[MaterialBalance], lots: &[LotBalance]) -> AuditReport {
    let material_gaps = materials
        .iter()
        .filter(|b| i64::from(b.quantity) != b.lot_total)
        .map(|b| Discrepancy::MaterialLots {
            material_id: b.material_id,
            quantity: b.quantity,
            lot_total: b.lot_total,
        });

    let lot_gaps = lots
        .iter()
        .filter(|b| i64::from(b.quantity) != b.ledger_total)
        .map(|b| Discrepancy::LotLedger {
            price_id: b.price_id,
            quantity: b.quantity,
            ledger_total: b.ledger_total,
        });

    AuditReport {
        materials_checked: materials.len(),
        lots_checked: lots.len(),
        discrepancies: material_gaps.chain(lot_gaps).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balanced_ledger_is_clean() {
        let materials = vec![MaterialBalance {
            material_id: 1,
            quantity: 20,
            lot_total: 20,
        }];
        let lots = vec![LotBalance {
            price_id: 1,
            quantity: 20,
            ledger_total: 20,
        }];

        let report = find_discrepancies(&materials, &lots);

        assert!(report.is_clean());
        assert_eq!(report.materials_checked, 1);
        assert_eq!(report.lots_checked, 1);
    }

    #[test]
    fn test_both_kinds_reported() {
        let materials = vec![
            MaterialBalance {
                material_id: 1,
                quantity: 20,
                lot_total: 15,
            },
            MaterialBalance {
                material_id: 2,
                quantity: 0,
                lot_total: 0,
            },
        ];
        let lots = vec![LotBalance {
            price_id: 4,
            quantity: 3,
            ledger_total: 5,
        }];

        let report = find_discrepancies(&materials, &lots);

        assert_eq!(
            report.discrepancies,
            vec![
                Discrepancy::MaterialLots {
                    material_id: 1,
                    quantity: 20,
                    lot_total: 15
                },
                Discrepancy::LotLedger {
                    price_id: 4,
                    quantity: 3,
                    ledger_total: 5
                },
            ]
        );
    }

    #[test]
    fn test_discrepancy_json_shape() {
        let json = serde_json::to_value(Discrepancy::LotLedger {
            price_id: 4,
            quantity: 3,
            ledger_total: 5,
        })
        .unwrap();

        assert_eq!(json["kind"], "lotLedger");
        assert_eq!(json["ledgerTotal"], 5);
    }
}
