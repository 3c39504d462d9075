use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{Cents, CompanyId, EmployeeId, VehicleId};

pub type CashBoxId = Uuid;

/// One trip's expense envelope for an employee (caixa de viagem).
///
/// Boxes are numbered per employee and chained: the opening balance of box
/// N+1 is the closing balance of box N. Both balances are cached here and
/// kept current by the reconciliation pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TravelCashBox {
    pub id: CashBoxId,
    /// Sequential per employee, assigned by the repository on creation
    pub number: i64,
    pub employee_id: EmployeeId,
    pub company_id: CompanyId,
    pub vehicle_id: Option<VehicleId>,
    pub trip_date: NaiveDate,
    pub destination: String,
    pub note: Option<String>,
    pub opening_balance: Cents,
    pub closing_balance: Cents,
    /// Opening value typed in when the employee's first box was created
    pub manual_opening: Option<Cents>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub hidden_at: Option<DateTime<Utc>>,
}

impl TravelCashBox {
    /// Create a new box. Number and opening balance come from
    /// [`NextCashBox`] and are set by the repository.
    pub fn new(
        employee_id: EmployeeId,
        company_id: CompanyId,
        trip_date: NaiveDate,
        destination: String,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            number: 0,
            employee_id,
            company_id,
            vehicle_id: None,
            trip_date,
            destination,
            note: None,
            opening_balance: 0,
            closing_balance: 0,
            manual_opening: None,
            created_at: now,
            updated_at: now,
            hidden_at: None,
        }
    }

    pub fn with_vehicle(mut self, vehicle_id: VehicleId) -> Self {
        self.vehicle_id = Some(vehicle_id);
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = Some(note.into());
        self
    }

    pub fn with_manual_opening(mut self, opening: Cents) -> Self {
        self.manual_opening = Some(opening);
        self
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden_at.is_some()
    }
}

/// Number and opening balance a new box for an employee starts from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextCashBox {
    pub number: i64,
    pub opening_balance: Cents,
}

impl NextCashBox {
    /// `highest_number` spans every box of the employee, hidden ones included,
    /// so numbers are never reused. `last_closing` is the closing balance of
    /// the latest visible box.
    pub fn after(highest_number: Option<i64>, last_closing: Option<Cents>) -> Self {
        Self {
            number: highest_number.map_or(1, |n| n + 1),
            opening_balance: last_closing.unwrap_or(0),
        }
    }

    pub fn is_first(&self) -> bool {
        self.number == 1
    }
}
