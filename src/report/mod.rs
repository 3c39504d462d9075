//! Settlement sheet (acerto de caixa) for one travel cash box.
//!
//! [`Settlement`] gathers what the sheet shows, [`layout`] splits it into
//! pages and [`pdf`] draws those pages.

pub mod layout;
pub mod pdf;

use chrono::NaiveDate;
use serde::Serialize;

use crate::domain::{
    closing_balance, slugify, Advance, BoxMovements, Cents, Company, Employee, LedgerEntry,
    TravelCashBox, Vehicle, NOT_SPECIFIED,
};

pub use layout::{paginate, PageGeometry, SettlementLayout};

pub const TITLE: &str = "Acerto de Caixa de Viagem";

/// One ledger line as printed.
#[derive(Debug, Clone, Serialize)]
pub struct SettlementRow {
    pub date: NaiveDate,
    pub document_number: String,
    pub counterparty: String,
    pub cost_type: String,
    pub description: String,
    pub credit: Option<Cents>,
    pub debit: Option<Cents>,
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct SettlementTotals {
    pub opening: Cents,
    pub credits: Cents,
    pub debits: Cents,
    pub advances: Cents,
    pub closing: Cents,
}

/// Everything printed on a settlement sheet.
#[derive(Debug, Clone, Serialize)]
pub struct Settlement {
    pub issuer: Option<String>,
    pub box_number: i64,
    pub trip_date: NaiveDate,
    pub destination: String,
    pub company: String,
    pub employee: String,
    pub employee_document: String,
    pub vehicle: String,
    pub note: Option<String>,
    pub rows: Vec<SettlementRow>,
    pub advance_count: usize,
    pub totals: SettlementTotals,
}

impl Settlement {
    /// Missing registry records print as [`NOT_SPECIFIED`].
    pub fn new(
        cash_box: &TravelCashBox,
        entries: &[LedgerEntry],
        advances: &[Advance],
        company: Option<&Company>,
        employee: Option<&Employee>,
        vehicle: Option<&Vehicle>,
    ) -> Self {
        let movements = BoxMovements::from_parts(entries, advances);
        let opening = cash_box.opening_balance;

        let rows = entries
            .iter()
            .map(|entry| SettlementRow {
                date: entry.date,
                document_number: entry.document_number.clone().unwrap_or_default(),
                counterparty: entry.counterparty.clone().unwrap_or_default(),
                cost_type: entry.cost_type.clone().unwrap_or_default(),
                description: entry.description.clone().unwrap_or_default(),
                credit: entry.credit,
                debit: entry.debit,
            })
            .collect();

        Self {
            issuer: None,
            box_number: cash_box.number,
            trip_date: cash_box.trip_date,
            destination: cash_box.destination.clone(),
            company: company
                .map(|c| c.name.clone())
                .unwrap_or_else(|| NOT_SPECIFIED.to_string()),
            employee: employee
                .map(|e| e.name.clone())
                .unwrap_or_else(|| NOT_SPECIFIED.to_string()),
            employee_document: employee
                .and_then(|e| e.document.clone())
                .unwrap_or_else(|| NOT_SPECIFIED.to_string()),
            vehicle: vehicle
                .map(Vehicle::label)
                .unwrap_or_else(|| NOT_SPECIFIED.to_string()),
            note: cash_box.note.clone(),
            rows,
            advance_count: advances.len(),
            totals: SettlementTotals {
                opening,
                credits: movements.credits,
                debits: movements.debits,
                advances: movements.advances,
                closing: closing_balance(opening, &movements),
            },
        }
    }

    pub fn with_issuer(mut self, issuer: Option<String>) -> Self {
        self.issuer = issuer;
        self
    }

    /// `caixa-joao-silva-003.pdf`
    pub fn file_name(&self) -> String {
        let slug = slugify(&self.employee);
        if slug.is_empty() {
            format!("caixa-{:03}.pdf", self.box_number)
        } else {
            format!("caixa-{}-{:03}.pdf", slug, self.box_number)
        }
    }
}

/// Rendered settlement, ready to be written or sent.
#[derive(Debug, Clone)]
pub struct SettlementDocument {
    pub file_name: String,
    pub page_count: usize,
    pub bytes: Vec<u8>,
}

/// Lay out and render a settlement with the given geometry.
pub fn render_settlement(
    settlement: &Settlement,
    geometry: &PageGeometry,
    rows_per_page: Option<usize>,
) -> anyhow::Result<SettlementDocument> {
    let capacity = geometry.rows_per_page(rows_per_page);
    let layout = paginate(settlement, capacity);
    let bytes = pdf::render(&layout, geometry)?;

    Ok(SettlementDocument {
        file_name: settlement.file_name(),
        page_count: layout.pages.len(),
        bytes,
    })
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::domain::NewLedgerEntry;

    fn day() -> NaiveDate {
        NaiveDate::from_ymd_opt(2024, 4, 2).unwrap()
    }

    #[test]
    fn test_missing_registry_records_fall_back() {
        let cash_box = TravelCashBox::new(Uuid::new_v4(), Uuid::new_v4(), day(), "Santos".into());
        let settlement = Settlement::new(&cash_box, &[], &[], None, None, None);

        assert_eq!(settlement.company, NOT_SPECIFIED);
        assert_eq!(settlement.employee, NOT_SPECIFIED);
        assert_eq!(settlement.vehicle, NOT_SPECIFIED);
        assert_eq!(settlement.file_name(), "caixa-nao-informado-000.pdf");
    }

    #[test]
    fn test_totals_follow_balance_formula() {
        let employee = Employee::new("João Silva".into());
        let mut cash_box = TravelCashBox::new(employee.id, Uuid::new_v4(), day(), "Santos".into());
        cash_box.number = 3;
        cash_box.opening_balance = 1000;

        let entries: Vec<LedgerEntry> = [
            NewLedgerEntry::new(day()).with_credit(20000),
            NewLedgerEntry::new(day()).with_debit(5000),
        ]
        .into_iter()
        .enumerate()
        .map(|(i, e)| e.into_entry(cash_box.id, i as i64, day()).unwrap())
        .collect();
        let advances = vec![Advance::new(employee.id, day(), 8000).unwrap()];

        let settlement =
            Settlement::new(&cash_box, &entries, &advances, None, Some(&employee), None);

        assert_eq!(settlement.totals.credits, 20000);
        assert_eq!(settlement.totals.debits, 5000);
        assert_eq!(settlement.totals.advances, 8000);
        assert_eq!(settlement.totals.closing, 1000 + 20000 + 8000 - 5000);
        assert_eq!(settlement.file_name(), "caixa-joao-silva-003.pdf");
    }
}
