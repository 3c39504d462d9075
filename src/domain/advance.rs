use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CashBoxId, Cents, EmployeeId, TravelCashBox};

pub type AdvanceId = Uuid;

/// Cash handed to an employee ahead of a trip (adiantamento).
///
/// Independent of any box until linked. A linked advance adds to the box
/// balance on the same side as credits and is locked until unlinked.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Advance {
    pub id: AdvanceId,
    pub employee_id: EmployeeId,
    pub date: NaiveDate,
    /// Always positive
    pub amount: Cents,
    pub note: Option<String>,
    pub cash_box_id: Option<CashBoxId>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Advance {
    pub fn new(
        employee_id: EmployeeId,
        date: NaiveDate,
        amount: Cents,
    ) -> Result<Self, AdvanceAmountError> {
        Self::check_amount(amount)?;
        let now = Utc::now();
        Ok(Self {
            id: Uuid::new_v4(),
            employee_id,
            date,
            amount,
            note: None,
            cash_box_id: None,
            created_at: now,
            updated_at: now,
        })
    }

    pub fn check_amount(amount: Cents) -> Result<(), AdvanceAmountError> {
        if amount > 0 {
            Ok(())
        } else {
            Err(AdvanceAmountError(amount))
        }
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn is_linked(&self) -> bool {
        self.cash_box_id.is_some()
    }

    /// Edits and deletions are only allowed while the advance is free.
    pub fn ensure_unlocked(&self) -> Result<(), AdvanceLinkError> {
        match self.cash_box_id {
            Some(cash_box_id) => Err(AdvanceLinkError::Locked {
                advance_id: self.id,
                cash_box_id,
            }),
            None => Ok(()),
        }
    }
}

/// Check that `advance` may be linked to `cash_box`.
///
/// Linking again to the box it already belongs to is accepted, so the
/// operation can be repeated safely.
pub fn validate_link(advance: &Advance, cash_box: &TravelCashBox) -> Result<(), AdvanceLinkError> {
    if advance.employee_id != cash_box.employee_id {
        return Err(AdvanceLinkError::EmployeeMismatch {
            advance_employee: advance.employee_id,
            box_employee: cash_box.employee_id,
        });
    }
    if cash_box.is_hidden() {
        return Err(AdvanceLinkError::HiddenCashBox(cash_box.id));
    }
    match advance.cash_box_id {
        Some(current) if current != cash_box.id => Err(AdvanceLinkError::AlreadyLinked {
            advance_id: advance.id,
            cash_box_id: current,
        }),
        _ => Ok(()),
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceLinkError {
    EmployeeMismatch {
        advance_employee: EmployeeId,
        box_employee: EmployeeId,
    },
    AlreadyLinked {
        advance_id: AdvanceId,
        cash_box_id: CashBoxId,
    },
    Locked {
        advance_id: AdvanceId,
        cash_box_id: CashBoxId,
    },
    HiddenCashBox(CashBoxId),
}

impl std::fmt::Display for AdvanceLinkError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AdvanceLinkError::EmployeeMismatch {
                advance_employee,
                box_employee,
            } => write!(
                f,
                "advance belongs to employee {} but the cash box belongs to {}",
                advance_employee, box_employee
            ),
            AdvanceLinkError::AlreadyLinked {
                advance_id,
                cash_box_id,
            } => write!(
                f,
                "advance {} is already linked to cash box {}",
                advance_id, cash_box_id
            ),
            AdvanceLinkError::Locked {
                advance_id,
                cash_box_id,
            } => write!(
                f,
                "advance {} is linked to cash box {}; unlink it first",
                advance_id, cash_box_id
            ),
            AdvanceLinkError::HiddenCashBox(id) => write!(f, "cash box {} is hidden", id),
        }
    }
}

impl std::error::Error for AdvanceLinkError {}

/// Advances carry a strictly positive amount.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdvanceAmountError(pub Cents);

impl std::fmt::Display for AdvanceAmountError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "advance amount must be positive, got {} cents", self.0)
    }
}

impl std::error::Error for AdvanceAmountError {}

#[cfg(test)]
mod tests {
    use super::*;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 2, 1).unwrap()
    }

    fn cash_box_for(employee: EmployeeId) -> TravelCashBox {
        TravelCashBox::new(employee, Uuid::new_v4(), day(), "Campinas".into())
    }

    #[test]
    fn test_link_same_employee() {
        let employee = Uuid::new_v4();
        let advance = Advance::new(employee, day(), 8000).unwrap();
        assert!(validate_link(&advance, &cash_box_for(employee)).is_ok());
    }

    #[test]
    fn test_link_other_employee_rejected() {
        let advance = Advance::new(Uuid::new_v4(), day(), 8000).unwrap();
        let result = validate_link(&advance, &cash_box_for(Uuid::new_v4()));
        assert!(matches!(
            result,
            Err(AdvanceLinkError::EmployeeMismatch { .. })
        ));
    }

    #[test]
    fn test_link_to_second_box_rejected() {
        let employee = Uuid::new_v4();
        let first = cash_box_for(employee);
        let second = cash_box_for(employee);
        let mut advance = Advance::new(employee, day(), 8000).unwrap();
        advance.cash_box_id = Some(first.id);

        assert!(validate_link(&advance, &first).is_ok());
        assert!(matches!(
            validate_link(&advance, &second),
            Err(AdvanceLinkError::AlreadyLinked { .. })
        ));
    }

    #[test]
    fn test_link_to_hidden_box_rejected() {
        let employee = Uuid::new_v4();
        let mut cash_box = cash_box_for(employee);
        cash_box.hidden_at = Some(Utc::now());
        let advance = Advance::new(employee, day(), 100).unwrap();

        assert!(matches!(
            validate_link(&advance, &cash_box),
            Err(AdvanceLinkError::HiddenCashBox(_))
        ));
    }

    #[test]
    fn test_linked_advance_is_locked() {
        let employee = Uuid::new_v4();
        let mut advance = Advance::new(employee, day(), 100).unwrap();
        assert!(advance.ensure_unlocked().is_ok());

        advance.cash_box_id = Some(Uuid::new_v4());
        assert!(matches!(
            advance.ensure_unlocked(),
            Err(AdvanceLinkError::Locked { .. })
        ));
    }

    #[test]
    fn test_amount_must_be_positive() {
        let employee = Uuid::new_v4();
        assert_eq!(
            Advance::new(employee, day(), 0).unwrap_err(),
            AdvanceAmountError(0)
        );
        assert!(Advance::new(employee, day(), -100).is_err());
        assert!(Advance::check_amount(1).is_ok());
    }
}
