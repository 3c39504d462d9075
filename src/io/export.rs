use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::io::Write;

use crate::application::{CashBoxFilter, CashBoxRef, CashBoxService};
use crate::domain::{
    closing_balance, format_cents, Advance, Company, Employee, LedgerEntry, TravelCashBox, Vehicle,
};

/// Header shared by the entries export and the entries import.
pub const ENTRY_HEADER: [&str; 7] = [
    "date",
    "document",
    "counterparty",
    "cost_type",
    "description",
    "credit",
    "debit",
];

/// Database snapshot for full export
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseSnapshot {
    pub version: String,
    pub exported_at: DateTime<Utc>,
    pub companies: Vec<Company>,
    pub employees: Vec<Employee>,
    pub vehicles: Vec<Vehicle>,
    pub cash_boxes: Vec<TravelCashBox>,
    pub entries: Vec<LedgerEntry>,
    pub advances: Vec<Advance>,
}

/// Exporter for converting cash box data to various formats
pub struct Exporter<'a> {
    service: &'a CashBoxService,
}

impl<'a> Exporter<'a> {
    pub fn new(service: &'a CashBoxService) -> Self {
        Self { service }
    }

    /// Export every cash box with its totals to CSV format
    pub async fn export_cash_boxes_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let page = self
            .service
            .list_cash_boxes(CashBoxFilter {
                include_hidden: true,
                ..Default::default()
            })
            .await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record([
            "id",
            "employee",
            "number",
            "trip_date",
            "destination",
            "company",
            "vehicle",
            "opening",
            "credits",
            "debits",
            "advances",
            "closing",
            "hidden",
        ])?;

        let mut count = 0;
        for row in &page.items {
            let cash_box = &row.cash_box;
            csv_writer.write_record([
                cash_box.id.to_string(),
                row.employee_name.clone(),
                cash_box.number.to_string(),
                cash_box.trip_date.format("%Y-%m-%d").to_string(),
                cash_box.destination.clone(),
                row.company_name.clone(),
                row.vehicle_plate.clone().unwrap_or_default(),
                format_cents(cash_box.opening_balance),
                format_cents(row.movements.credits),
                format_cents(row.movements.debits),
                format_cents(row.movements.advances),
                format_cents(closing_balance(cash_box.opening_balance, &row.movements)),
                cash_box.is_hidden().to_string(),
            ])?;
            count += 1;
        }

        csv_writer.flush()?;
        Ok(count)
    }

    /// Export the entries of one box in the format the entries import reads
    pub async fn export_entries_csv<W: Write>(
        &self,
        reference: &CashBoxRef,
        writer: W,
    ) -> Result<usize> {
        let details = self.service.get_cash_box_details(reference).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);
        csv_writer.write_record(ENTRY_HEADER)?;

        for entry in &details.entries {
            csv_writer.write_record([
                entry.date.format("%Y-%m-%d").to_string(),
                entry.document_number.clone().unwrap_or_default(),
                entry.counterparty.clone().unwrap_or_default(),
                entry.cost_type.clone().unwrap_or_default(),
                entry.description.clone().unwrap_or_default(),
                entry.credit.map(format_cents).unwrap_or_default(),
                entry.debit.map(format_cents).unwrap_or_default(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(details.entries.len())
    }

    /// Export advances to CSV format
    pub async fn export_advances_csv<W: Write>(&self, writer: W) -> Result<usize> {
        let employees: HashMap<_, _> = self
            .service
            .list_employees(true)
            .await?
            .into_iter()
            .map(|e| (e.id, e.name))
            .collect();
        let advances = self.service.list_advances(None, false).await?;
        let mut csv_writer = csv::Writer::from_writer(writer);

        csv_writer.write_record(["id", "employee", "date", "amount", "note", "cash_box_id"])?;

        for advance in &advances {
            csv_writer.write_record([
                advance.id.to_string(),
                employees
                    .get(&advance.employee_id)
                    .cloned()
                    .unwrap_or_default(),
                advance.date.format("%Y-%m-%d").to_string(),
                format_cents(advance.amount),
                advance.note.clone().unwrap_or_default(),
                advance
                    .cash_box_id
                    .map(|id| id.to_string())
                    .unwrap_or_default(),
            ])?;
        }

        csv_writer.flush()?;
        Ok(advances.len())
    }

    /// Export full database as JSON snapshot
    pub async fn export_full_json<W: Write>(&self, mut writer: W) -> Result<DatabaseSnapshot> {
        let companies = self.service.list_companies(true).await?;
        let employees = self.service.list_employees(true).await?;
        let vehicles = self.service.list_vehicles(true).await?;
        let advances = self.service.list_advances(None, false).await?;

        let mut cash_boxes = Vec::new();
        let mut entries = Vec::new();
        for details in self.service.list_all_cash_box_details().await? {
            cash_boxes.push(details.cash_box);
            entries.extend(details.entries);
        }

        let snapshot = DatabaseSnapshot {
            version: env!("CARGO_PKG_VERSION").to_string(),
            exported_at: Utc::now(),
            companies,
            employees,
            vehicles,
            cash_boxes,
            entries,
            advances,
        };

        let json = serde_json::to_string_pretty(&snapshot)?;
        writer.write_all(json.as_bytes())?;
        writer.flush()?;

        Ok(snapshot)
    }
}
