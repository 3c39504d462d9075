use anyhow::{Context, Result};
use std::io::Read;

use crate::application::{CashBoxRef, CashBoxService};
use crate::domain::{parse_cents, parse_date, Cents, NewLedgerEntry};

/// Result of an import operation
#[derive(Debug, Clone)]
pub struct ImportResult {
    pub imported: usize,
    pub skipped: usize,
    pub errors: Vec<ImportError>,
}

impl ImportResult {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty()
    }
}

/// Error that occurred during import
#[derive(Debug, Clone)]
pub struct ImportError {
    pub line: usize,
    pub field: Option<String>,
    pub error: String,
}

/// Options for import operations
#[derive(Debug, Clone, Default)]
pub struct ImportOptions {
    pub dry_run: bool,
    pub validate_only: bool,
}

/// Importer for loading ledger entries into a cash box
pub struct Importer<'a> {
    service: &'a CashBoxService,
}

impl<'a> Importer<'a> {
    pub fn new(service: &'a CashBoxService) -> Self {
        Self { service }
    }

    /// Import the entries of a box from CSV, replacing the current ones.
    ///
    /// Nothing is written unless every line parses.
    pub async fn import_entries_csv<R: Read>(
        &self,
        reference: &CashBoxRef,
        reader: R,
        options: ImportOptions,
    ) -> Result<ImportResult> {
        // fail early on an unknown box, even for dry runs
        self.service.get_cash_box(reference).await?;

        let (entries, errors) = parse_entries_csv(reader)?;
        let parsed = entries.len();

        if !errors.is_empty() {
            return Ok(ImportResult {
                imported: 0,
                skipped: parsed,
                errors,
            });
        }

        if !(options.dry_run || options.validate_only) {
            self.service.save_entries(reference, entries).await?;
        }

        Ok(ImportResult {
            imported: parsed,
            skipped: 0,
            errors,
        })
    }
}

/// Column positions found in the header row.
struct EntryColumns {
    date: Option<usize>,
    document: Option<usize>,
    counterparty: Option<usize>,
    cost_type: Option<usize>,
    description: Option<usize>,
    credit: Option<usize>,
    debit: Option<usize>,
}

impl EntryColumns {
    fn from_headers(headers: &csv::StringRecord) -> Self {
        let find = |name: &str| {
            headers
                .iter()
                .position(|h| h.trim().eq_ignore_ascii_case(name))
        };
        Self {
            date: find("date"),
            document: find("document"),
            counterparty: find("counterparty"),
            cost_type: find("cost_type"),
            description: find("description"),
            credit: find("credit"),
            debit: find("debit"),
        }
    }

    fn has_amounts(&self) -> bool {
        self.credit.is_some() || self.debit.is_some()
    }
}

/// Parse an entries CSV. Columns are matched by header name, so their order
/// is free and unknown columns are ignored.
pub fn parse_entries_csv<R: Read>(reader: R) -> Result<(Vec<NewLedgerEntry>, Vec<ImportError>)> {
    let mut csv_reader = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let headers = csv_reader
        .headers()
        .context("Failed to read CSV header")?
        .clone();
    let columns = EntryColumns::from_headers(&headers);
    if !columns.has_amounts() {
        anyhow::bail!("CSV header must name a credit or debit column");
    }

    let mut entries = Vec::new();
    let mut errors = Vec::new();

    for (line_num, result) in csv_reader.records().enumerate() {
        let line = line_num + 2; // +2 for header and 0-indexing

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                errors.push(ImportError {
                    line,
                    field: None,
                    error: format!("CSV parse error: {}", e),
                });
                continue;
            }
        };

        let text = |column: Option<usize>| {
            column
                .and_then(|i| record.get(i))
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let date = match text(columns.date).map(|d| parse_date(&d)).transpose() {
            Ok(date) => date,
            Err(e) => {
                errors.push(ImportError {
                    line,
                    field: Some("date".to_string()),
                    error: e.to_string(),
                });
                continue;
            }
        };

        let credit = match parse_amount(text(columns.credit)) {
            Ok(amount) => amount,
            Err(e) => {
                errors.push(ImportError {
                    line,
                    field: Some("credit".to_string()),
                    error: e,
                });
                continue;
            }
        };

        let debit = match parse_amount(text(columns.debit)) {
            Ok(amount) => amount,
            Err(e) => {
                errors.push(ImportError {
                    line,
                    field: Some("debit".to_string()),
                    error: e,
                });
                continue;
            }
        };

        entries.push(NewLedgerEntry {
            date,
            document_number: text(columns.document),
            description: text(columns.description),
            cost_type: text(columns.cost_type),
            counterparty: text(columns.counterparty),
            credit,
            debit,
        });
    }

    Ok((entries, errors))
}

fn parse_amount(value: Option<String>) -> Result<Option<Cents>, String> {
    let Some(value) = value else {
        return Ok(None);
    };
    let cents = parse_cents(&value).map_err(|e| format!("Invalid amount '{}': {}", value, e))?;
    if cents < 0 {
        return Err(format!("Amount must not be negative: {}", value));
    }
    Ok(Some(cents))
}
