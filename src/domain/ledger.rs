use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Advance, CashBoxId, Cents, LedgerEntry};

/// Money that moved through one box, split by side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BoxMovements {
    pub credits: Cents,
    pub debits: Cents,
    /// Linked advances; counted on the credit side
    pub advances: Cents,
}

impl BoxMovements {
    pub fn new(credits: Cents, debits: Cents, advances: Cents) -> Self {
        Self {
            credits,
            debits,
            advances,
        }
    }

    /// Sum a box's entries and linked advances. Entries with neither side
    /// set contribute nothing.
    pub fn from_parts(entries: &[LedgerEntry], advances: &[Advance]) -> Self {
        Self {
            credits: entries.iter().map(LedgerEntry::credit_or_zero).sum(),
            debits: entries.iter().map(LedgerEntry::debit_or_zero).sum(),
            advances: advances.iter().map(|a| a.amount).sum(),
        }
    }

    /// Credits plus advances minus debits.
    pub fn net(&self) -> Cents {
        self.credits + self.advances - self.debits
    }
}

/// closing = opening + credits + advances - debits
pub fn closing_balance(opening: Cents, movements: &BoxMovements) -> Cents {
    opening + movements.net()
}

/// What the reconciliation pass needs to know about one visible box.
#[derive(Debug, Clone)]
pub struct ChainLink {
    pub cash_box_id: CashBoxId,
    pub number: i64,
    pub created_at: DateTime<Utc>,
    pub manual_opening: Option<Cents>,
    pub movements: BoxMovements,
}

/// Recomputed balances for one box.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BalanceUpdate {
    pub cash_box_id: CashBoxId,
    pub number: i64,
    pub opening_balance: Cents,
    pub closing_balance: Cents,
}

/// Walk one employee's visible boxes in number order and carry each
/// closing balance into the next box's opening balance.
///
/// The first box opens at its manual opening value, or zero. Boxes sharing a
/// number are ordered by creation time. Returns one update per box, in walk
/// order.
pub fn reconcile_chain(mut links: Vec<ChainLink>) -> Vec<BalanceUpdate> {
    links.sort_by(|a, b| {
        a.number
            .cmp(&b.number)
            .then(a.created_at.cmp(&b.created_at))
            .then(a.cash_box_id.cmp(&b.cash_box_id))
    });

    let mut updates = Vec::with_capacity(links.len());
    let mut carried: Option<Cents> = None;

    for link in links {
        let opening = match carried {
            Some(previous_closing) => previous_closing,
            None => link.manual_opening.unwrap_or(0),
        };
        let closing = closing_balance(opening, &link.movements);
        carried = Some(closing);

        updates.push(BalanceUpdate {
            cash_box_id: link.cash_box_id,
            number: link.number,
            opening_balance: opening,
            closing_balance: closing,
        });
    }

    updates
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, NaiveDate};
    use uuid::Uuid;

    use super::*;
    use crate::domain::NewLedgerEntry;

    fn link(number: i64, movements: BoxMovements) -> ChainLink {
        ChainLink {
            cash_box_id: Uuid::new_v4(),
            number,
            created_at: Utc::now(),
            manual_opening: None,
            movements,
        }
    }

    #[test]
    fn test_closing_balance_example() {
        // credit 200, debit 50, advance 80
        let movements = BoxMovements::new(20000, 5000, 8000);
        assert_eq!(closing_balance(1000, &movements), 1000 + 20000 + 8000 - 5000);
    }

    #[test]
    fn test_movements_from_parts() {
        let day = NaiveDate::from_ymd_opt(2024, 1, 10).unwrap();
        let box_id = Uuid::new_v4();
        let entries: Vec<LedgerEntry> = [
            NewLedgerEntry::new(day).with_credit(10000),
            NewLedgerEntry::new(day).with_debit(3000),
            NewLedgerEntry::new(day).with_description("annotation only"),
        ]
        .into_iter()
        .enumerate()
        .map(|(i, e)| e.into_entry(box_id, i as i64, day).unwrap())
        .collect();
        let advances = vec![Advance::new(Uuid::new_v4(), day, 2500).unwrap()];

        let movements = BoxMovements::from_parts(&entries, &advances);
        assert_eq!(movements, BoxMovements::new(10000, 3000, 2500));
        assert_eq!(movements.net(), 9500);
    }

    #[test]
    fn test_reconcile_empty_chain() {
        assert!(reconcile_chain(Vec::new()).is_empty());
    }

    #[test]
    fn test_reconcile_carries_closing_forward() {
        let updates = reconcile_chain(vec![
            link(2, BoxMovements::new(0, 2000, 0)),
            link(1, BoxMovements::new(10000, 3000, 0)),
            link(3, BoxMovements::new(500, 0, 1000)),
        ]);

        let numbers: Vec<i64> = updates.iter().map(|u| u.number).collect();
        assert_eq!(numbers, vec![1, 2, 3]);

        assert_eq!(updates[0].opening_balance, 0);
        assert_eq!(updates[0].closing_balance, 7000);
        assert_eq!(updates[1].opening_balance, 7000);
        assert_eq!(updates[1].closing_balance, 5000);
        assert_eq!(updates[2].opening_balance, 5000);
        assert_eq!(updates[2].closing_balance, 6500);

        for pair in updates.windows(2) {
            assert_eq!(pair[1].opening_balance, pair[0].closing_balance);
        }
    }

    #[test]
    fn test_manual_opening_applies_to_first_box_only() {
        let mut first = link(1, BoxMovements::new(0, 1000, 0));
        first.manual_opening = Some(5000);
        let mut second = link(2, BoxMovements::default());
        second.manual_opening = Some(99999);

        let updates = reconcile_chain(vec![first, second]);
        assert_eq!(updates[0].opening_balance, 5000);
        assert_eq!(updates[0].closing_balance, 4000);
        assert_eq!(updates[1].opening_balance, 4000);
    }

    #[test]
    fn test_duplicate_numbers_ordered_by_creation() {
        let now = Utc::now();
        let mut older = link(1, BoxMovements::new(100, 0, 0));
        older.created_at = now - Duration::hours(1);
        let mut newer = link(1, BoxMovements::new(0, 40, 0));
        newer.created_at = now;
        let older_id = older.cash_box_id;

        let updates = reconcile_chain(vec![newer, older]);
        assert_eq!(updates[0].cash_box_id, older_id);
        assert_eq!(updates[1].opening_balance, 100);
        assert_eq!(updates[1].closing_balance, 60);
    }
}
