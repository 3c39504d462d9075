use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{CashBoxId, Cents};

pub type EntryId = Uuid;

/// A single dated line of a cash box (lançamento).
///
/// Usually only one of `credit`/`debit` is set. An entry with neither is a
/// plain annotation and counts as zero.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerEntry {
    pub id: EntryId,
    pub cash_box_id: CashBoxId,
    /// Row order inside the box, starting at 0
    pub position: i64,
    pub date: NaiveDate,
    pub document_number: Option<String>,
    pub description: Option<String>,
    pub cost_type: Option<String>,
    pub counterparty: Option<String>,
    pub credit: Option<Cents>,
    pub debit: Option<Cents>,
}

impl LedgerEntry {
    pub fn credit_or_zero(&self) -> Cents {
        self.credit.unwrap_or(0)
    }

    pub fn debit_or_zero(&self) -> Cents {
        self.debit.unwrap_or(0)
    }
}

/// Entry as typed by the user, before it belongs to a box.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLedgerEntry {
    pub date: Option<NaiveDate>,
    pub document_number: Option<String>,
    pub description: Option<String>,
    pub cost_type: Option<String>,
    pub counterparty: Option<String>,
    pub credit: Option<Cents>,
    pub debit: Option<Cents>,
}

impl NewLedgerEntry {
    pub fn new(date: NaiveDate) -> Self {
        Self {
            date: Some(date),
            ..Default::default()
        }
    }

    pub fn with_credit(mut self, amount: Cents) -> Self {
        self.credit = Some(amount);
        self
    }

    pub fn with_debit(mut self, amount: Cents) -> Self {
        self.debit = Some(amount);
        self
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn with_document_number(mut self, document: impl Into<String>) -> Self {
        self.document_number = Some(document.into());
        self
    }

    pub fn with_cost_type(mut self, cost_type: impl Into<String>) -> Self {
        self.cost_type = Some(cost_type.into());
        self
    }

    pub fn with_counterparty(mut self, counterparty: impl Into<String>) -> Self {
        self.counterparty = Some(counterparty.into());
        self
    }

    /// Check amounts and attach the entry to a box at the given row.
    /// Entries without a date take the trip date.
    pub fn into_entry(
        self,
        cash_box_id: CashBoxId,
        position: i64,
        fallback_date: NaiveDate,
    ) -> Result<LedgerEntry, EntryError> {
        for amount in [self.credit, self.debit].into_iter().flatten() {
            if amount < 0 {
                return Err(EntryError::NegativeAmount {
                    position,
                    amount,
                });
            }
        }

        Ok(LedgerEntry {
            id: Uuid::new_v4(),
            cash_box_id,
            position,
            date: self.date.unwrap_or(fallback_date),
            document_number: non_blank(self.document_number),
            description: non_blank(self.description),
            cost_type: non_blank(self.cost_type),
            counterparty: non_blank(self.counterparty),
            // zero is stored as absent so it renders as a placeholder
            credit: self.credit.filter(|c| *c != 0),
            debit: self.debit.filter(|d| *d != 0),
        })
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryError {
    NegativeAmount { position: i64, amount: Cents },
}

impl std::fmt::Display for EntryError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntryError::NegativeAmount { position, amount } => write!(
                f,
                "entry {} has a negative amount ({} cents); use the debit column instead",
                position + 1,
                amount
            ),
        }
    }
}

impl std::error::Error for EntryError {}
