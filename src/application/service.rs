use std::collections::HashMap;

use chrono::{NaiveDate, Utc};
use tracing::{debug, info, warn};

use crate::domain::{
    normalize_plate, validate_link, Advance, AdvanceId, BalanceUpdate, BoxMovements, Cents,
    Company, Employee, EmployeeId, LedgerEntry, NewLedgerEntry, NextCashBox, TravelCashBox,
    Vehicle, NOT_SPECIFIED,
};
use crate::report::{render_settlement, PageGeometry, Settlement, SettlementDocument};
use crate::storage::{CashBoxQuery, Repository};

use super::AppError;

/// Application service providing the operations of the cash box ledger.
/// This is the primary interface for any client (CLI, importers, tests).
pub struct CashBoxService {
    repo: Repository,
    report: ReportOptions,
}

/// How settlement documents are laid out.
#[derive(Debug, Clone, Default)]
pub struct ReportOptions {
    pub geometry: PageGeometry,
    /// Lower the row capacity of each page; clamped to what the geometry fits
    pub rows_per_page: Option<usize>,
    /// Printed under the title, usually the issuing company
    pub issuer: Option<String>,
}

/// Identifies a cash box the way users do: employee name and box number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CashBoxRef {
    pub employee: String,
    pub number: i64,
}

impl CashBoxRef {
    pub fn new(employee: impl Into<String>, number: i64) -> Self {
        Self {
            employee: employee.into(),
            number,
        }
    }
}

impl std::fmt::Display for CashBoxRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} #{}", self.employee, self.number)
    }
}

/// Input for a new cash box. Employee, company and destination are required.
#[derive(Debug, Clone, Default)]
pub struct NewCashBox {
    pub employee: String,
    pub company: String,
    pub vehicle: Option<String>,
    pub trip_date: Option<NaiveDate>,
    pub destination: String,
    pub note: Option<String>,
    /// Only accepted for the employee's first box
    pub opening_balance: Option<Cents>,
}

/// Changes to an existing cash box. `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct CashBoxChanges {
    pub company: Option<String>,
    /// `Some(None)` removes the vehicle
    pub vehicle: Option<Option<String>>,
    pub trip_date: Option<NaiveDate>,
    pub destination: Option<String>,
    /// `Some(None)` clears the note
    pub note: Option<Option<String>>,
}

/// Changes to a free advance. `None` keeps the current value.
#[derive(Debug, Clone, Default)]
pub struct AdvanceChanges {
    pub date: Option<NaiveDate>,
    pub amount: Option<Cents>,
    pub note: Option<Option<String>>,
}

/// Filter for listing cash boxes. Pages are 1-based.
#[derive(Debug, Clone, Default)]
pub struct CashBoxFilter {
    pub employee: Option<String>,
    pub company: Option<String>,
    pub destination: Option<String>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub include_hidden: bool,
    pub page: usize,
    /// `None` returns everything on one page
    pub per_page: Option<usize>,
}

/// One page of results.
#[derive(Debug, Clone)]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: Option<usize>,
    pub total: usize,
}

impl<T> Page<T> {
    pub fn total_pages(&self) -> usize {
        match self.per_page {
            Some(per_page) if per_page > 0 => self.total.div_ceil(per_page).max(1),
            _ => 1,
        }
    }
}

/// A cash box as list views show it.
#[derive(Debug, Clone)]
pub struct CashBoxSummary {
    pub cash_box: TravelCashBox,
    pub employee_name: String,
    pub company_name: String,
    pub vehicle_plate: Option<String>,
    pub movements: BoxMovements,
}

/// A cash box with everything it references.
#[derive(Debug, Clone)]
pub struct CashBoxDetails {
    pub cash_box: TravelCashBox,
    pub employee: Option<Employee>,
    pub company: Option<Company>,
    pub vehicle: Option<Vehicle>,
    pub entries: Vec<LedgerEntry>,
    pub advances: Vec<Advance>,
    pub movements: BoxMovements,
}

/// Result of hiding a cash box
pub struct HideResult {
    pub cash_box: TravelCashBox,
    pub released_advances: u64,
}

/// Outcome of recalculating one employee's chain of boxes.
#[derive(Debug, Clone)]
pub struct EmployeeRecalculation {
    pub employee_id: EmployeeId,
    pub employee_name: String,
    pub outcome: Result<Vec<BalanceUpdate>, String>,
}

/// Per-employee results of a recalculation pass. A failure for one employee
/// never stops the others.
#[derive(Debug, Clone, Default)]
pub struct RecalculationReport {
    pub employees: Vec<EmployeeRecalculation>,
}

impl RecalculationReport {
    pub fn updated_boxes(&self) -> usize {
        self.employees
            .iter()
            .filter_map(|e| e.outcome.as_ref().ok())
            .map(Vec::len)
            .sum()
    }

    pub fn failures(&self) -> impl Iterator<Item = &EmployeeRecalculation> {
        self.employees.iter().filter(|e| e.outcome.is_err())
    }

    pub fn is_success(&self) -> bool {
        self.failures().next().is_none()
    }
}

impl CashBoxService {
    /// Create a new service with the given repository.
    pub fn new(repo: Repository) -> Self {
        Self {
            repo,
            report: ReportOptions::default(),
        }
    }

    pub fn with_report_options(mut self, report: ReportOptions) -> Self {
        self.report = report;
        self
    }

    /// Initialize a new database at the given path.
    pub async fn init(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}?mode=rwc", database_path);
        let repo = Repository::init(&db_url).await?;
        Ok(Self::new(repo))
    }

    /// Connect to an existing database.
    pub async fn connect(database_path: &str) -> Result<Self, AppError> {
        let db_url = format!("sqlite:{}", database_path);
        let repo = Repository::connect(&db_url).await?;
        Ok(Self::new(repo))
    }

    // ========================
    // Company operations
    // ========================

    pub async fn create_company(
        &self,
        name: String,
        tax_id: Option<String>,
    ) -> Result<Company, AppError> {
        let name = required("company name", &name)?;
        if self.repo.get_company_by_name(&name).await?.is_some() {
            return Err(AppError::AlreadyExists(format!("company {}", name)));
        }

        let mut company = Company::new(name);
        if let Some(tax_id) = tax_id {
            company = company.with_tax_id(tax_id);
        }
        self.repo.save_company(&company).await?;
        info!(company = %company.name, "created company");
        Ok(company)
    }

    pub async fn get_company(&self, name: &str) -> Result<Company, AppError> {
        self.repo
            .get_company_by_name(name)
            .await?
            .ok_or_else(|| AppError::CompanyNotFound(name.to_string()))
    }

    pub async fn list_companies(&self, include_hidden: bool) -> Result<Vec<Company>, AppError> {
        Ok(self.repo.list_companies(include_hidden).await?)
    }

    /// Rename a company and/or change its tax id.
    pub async fn update_company(
        &self,
        name: &str,
        new_name: Option<String>,
        tax_id: Option<String>,
    ) -> Result<Company, AppError> {
        let mut company = self.get_company(name).await?;
        if let Some(new_name) = new_name {
            let new_name = required("company name", &new_name)?;
            if new_name != company.name && self.repo.get_company_by_name(&new_name).await?.is_some()
            {
                return Err(AppError::AlreadyExists(format!("company {}", new_name)));
            }
            company.name = new_name;
        }
        if tax_id.is_some() {
            company.tax_id = tax_id;
        }
        self.repo.update_company(&company).await?;
        Ok(company)
    }

    pub async fn hide_company(&self, name: &str) -> Result<Company, AppError> {
        let company = self.get_company(name).await?;
        self.repo.hide_company(company.id).await?;
        info!(company = %company.name, "hid company");
        Ok(company)
    }

    // ========================
    // Employee operations
    // ========================

    pub async fn create_employee(
        &self,
        name: String,
        document: Option<String>,
        company: Option<&str>,
    ) -> Result<Employee, AppError> {
        let name = required("employee name", &name)?;
        if self.repo.get_employee_by_name(&name).await?.is_some() {
            return Err(AppError::AlreadyExists(format!("employee {}", name)));
        }

        let mut employee = Employee::new(name);
        if let Some(document) = document {
            employee = employee.with_document(document);
        }
        if let Some(company) = company {
            employee = employee.with_company(self.get_visible_company(company).await?.id);
        }
        self.repo.save_employee(&employee).await?;
        info!(employee = %employee.name, "created employee");
        Ok(employee)
    }

    pub async fn get_employee(&self, name: &str) -> Result<Employee, AppError> {
        self.repo
            .get_employee_by_name(name)
            .await?
            .ok_or_else(|| AppError::EmployeeNotFound(name.to_string()))
    }

    pub async fn list_employees(&self, include_hidden: bool) -> Result<Vec<Employee>, AppError> {
        Ok(self.repo.list_employees(include_hidden).await?)
    }

    pub async fn update_employee(
        &self,
        name: &str,
        new_name: Option<String>,
        document: Option<String>,
        company: Option<&str>,
    ) -> Result<Employee, AppError> {
        let mut employee = self.get_employee(name).await?;
        if let Some(new_name) = new_name {
            let new_name = required("employee name", &new_name)?;
            if new_name != employee.name
                && self.repo.get_employee_by_name(&new_name).await?.is_some()
            {
                return Err(AppError::AlreadyExists(format!("employee {}", new_name)));
            }
            employee.name = new_name;
        }
        if document.is_some() {
            employee.document = document;
        }
        if let Some(company) = company {
            employee.company_id = Some(self.get_visible_company(company).await?.id);
        }
        self.repo.update_employee(&employee).await?;
        Ok(employee)
    }

    pub async fn hide_employee(&self, name: &str) -> Result<Employee, AppError> {
        let employee = self.get_employee(name).await?;
        self.repo.hide_employee(employee.id).await?;
        info!(employee = %employee.name, "hid employee");
        Ok(employee)
    }

    // ========================
    // Vehicle operations
    // ========================

    pub async fn create_vehicle(
        &self,
        plate: &str,
        model: Option<String>,
    ) -> Result<Vehicle, AppError> {
        let plate = normalize_plate(plate);
        if plate.is_empty() {
            return Err(AppError::Validation("vehicle plate".to_string()));
        }
        if self.repo.get_vehicle_by_plate(&plate).await?.is_some() {
            return Err(AppError::AlreadyExists(format!("vehicle {}", plate)));
        }

        let mut vehicle = Vehicle::new(&plate);
        if let Some(model) = model {
            vehicle = vehicle.with_model(model);
        }
        self.repo.save_vehicle(&vehicle).await?;
        info!(plate = %vehicle.plate, "created vehicle");
        Ok(vehicle)
    }

    pub async fn get_vehicle(&self, plate: &str) -> Result<Vehicle, AppError> {
        self.repo
            .get_vehicle_by_plate(&normalize_plate(plate))
            .await?
            .ok_or_else(|| AppError::VehicleNotFound(plate.to_string()))
    }

    pub async fn list_vehicles(&self, include_hidden: bool) -> Result<Vec<Vehicle>, AppError> {
        Ok(self.repo.list_vehicles(include_hidden).await?)
    }

    pub async fn update_vehicle(
        &self,
        plate: &str,
        model: Option<String>,
    ) -> Result<Vehicle, AppError> {
        let mut vehicle = self.get_vehicle(plate).await?;
        if model.is_some() {
            vehicle.model = model;
        }
        self.repo.update_vehicle(&vehicle).await?;
        Ok(vehicle)
    }

    pub async fn hide_vehicle(&self, plate: &str) -> Result<Vehicle, AppError> {
        let vehicle = self.get_vehicle(plate).await?;
        self.repo.hide_vehicle(vehicle.id).await?;
        info!(plate = %vehicle.plate, "hid vehicle");
        Ok(vehicle)
    }

    async fn get_visible_company(&self, name: &str) -> Result<Company, AppError> {
        let company = self.get_company(name).await?;
        if company.is_hidden() {
            return Err(AppError::Hidden(format!("company {}", company.name)));
        }
        Ok(company)
    }

    async fn get_visible_employee(&self, name: &str) -> Result<Employee, AppError> {
        let employee = self.get_employee(name).await?;
        if employee.is_hidden() {
            return Err(AppError::Hidden(format!("employee {}", employee.name)));
        }
        Ok(employee)
    }

    async fn get_visible_vehicle(&self, plate: &str) -> Result<Vehicle, AppError> {
        let vehicle = self.get_vehicle(plate).await?;
        if vehicle.is_hidden() {
            return Err(AppError::Hidden(format!("vehicle {}", vehicle.plate)));
        }
        Ok(vehicle)
    }

    // ========================
    // Cash box operations
    // ========================

    /// Number and opening balance the employee's next box would get.
    pub async fn next_cash_box(&self, employee: &str) -> Result<NextCashBox, AppError> {
        let employee = self.get_employee(employee).await?;
        Ok(self.repo.next_cash_box(employee.id).await?)
    }

    /// Open a new cash box for an employee.
    pub async fn create_cash_box(&self, new: NewCashBox) -> Result<TravelCashBox, AppError> {
        let employee_name = required("employee", &new.employee)?;
        let company_name = required("company", &new.company)?;
        let destination = required("destination", &new.destination)?;
        let trip_date = new
            .trip_date
            .ok_or_else(|| AppError::Validation("trip date".to_string()))?;

        let employee = self.get_visible_employee(&employee_name).await?;
        let company = self.get_visible_company(&company_name).await?;
        let vehicle = match new.vehicle.as_deref().filter(|v| !v.trim().is_empty()) {
            Some(plate) => Some(self.get_visible_vehicle(plate).await?),
            None => None,
        };

        if let Some(opening) = new.opening_balance {
            let next = self.repo.next_cash_box(employee.id).await?;
            if !next.is_first() && opening != next.opening_balance {
                return Err(AppError::Validation(format!(
                    "opening balance can only be set on the first cash box of {}",
                    employee.name
                )));
            }
        }

        let mut cash_box = TravelCashBox::new(employee.id, company.id, trip_date, destination);
        if let Some(vehicle) = &vehicle {
            cash_box = cash_box.with_vehicle(vehicle.id);
        }
        if let Some(note) = new.note.filter(|n| !n.trim().is_empty()) {
            cash_box = cash_box.with_note(note);
        }
        if let Some(opening) = new.opening_balance {
            cash_box = cash_box.with_manual_opening(opening);
        }

        let next = self.repo.insert_cash_box(&mut cash_box).await?;
        info!(
            employee = %employee.name,
            number = next.number,
            opening = cash_box.opening_balance,
            "created cash box"
        );
        Ok(cash_box)
    }

    /// Look up a box by employee name and number (hidden boxes included).
    pub async fn get_cash_box(&self, reference: &CashBoxRef) -> Result<TravelCashBox, AppError> {
        let employee = self.get_employee(&reference.employee).await?;
        self.repo
            .get_cash_box_by_number(employee.id, reference.number)
            .await?
            .ok_or_else(|| AppError::CashBoxNotFound(reference.to_string()))
    }

    /// A box with its entries, linked advances and referenced records.
    pub async fn get_cash_box_details(
        &self,
        reference: &CashBoxRef,
    ) -> Result<CashBoxDetails, AppError> {
        let cash_box = self.get_cash_box(reference).await?;
        self.details_of(cash_box).await
    }

    async fn details_of(&self, cash_box: TravelCashBox) -> Result<CashBoxDetails, AppError> {
        let entries = self.repo.list_entries(cash_box.id).await?;
        let advances = self.repo.list_advances_for_cash_box(cash_box.id).await?;
        let employee = self.repo.get_employee(cash_box.employee_id).await?;
        let company = self.repo.get_company(cash_box.company_id).await?;
        let vehicle = match cash_box.vehicle_id {
            Some(id) => self.repo.get_vehicle(id).await?,
            None => None,
        };
        let movements = BoxMovements::from_parts(&entries, &advances);

        Ok(CashBoxDetails {
            cash_box,
            employee,
            company,
            vehicle,
            entries,
            advances,
            movements,
        })
    }

    /// Edit trip data of a box. The employee of a box never changes.
    pub async fn update_cash_box(
        &self,
        reference: &CashBoxRef,
        changes: CashBoxChanges,
    ) -> Result<TravelCashBox, AppError> {
        let mut cash_box = self.get_cash_box(reference).await?;
        if cash_box.is_hidden() {
            return Err(AppError::CashBoxHidden(cash_box.id));
        }

        if let Some(company) = changes.company {
            let company = required("company", &company)?;
            cash_box.company_id = self.get_visible_company(&company).await?.id;
        }
        if let Some(vehicle) = changes.vehicle {
            cash_box.vehicle_id = match vehicle.filter(|v| !v.trim().is_empty()) {
                Some(plate) => Some(self.get_visible_vehicle(&plate).await?.id),
                None => None,
            };
        }
        if let Some(trip_date) = changes.trip_date {
            cash_box.trip_date = trip_date;
        }
        if let Some(destination) = changes.destination {
            cash_box.destination = required("destination", &destination)?;
        }
        if let Some(note) = changes.note {
            cash_box.note = note.filter(|n| !n.trim().is_empty());
        }
        cash_box.updated_at = Utc::now();

        self.repo.update_cash_box(&cash_box).await?;
        debug!(cash_box = %reference, "updated cash box");

        Ok(self
            .repo
            .get_cash_box(cash_box.id)
            .await?
            .unwrap_or(cash_box))
    }

    /// Replace every entry of a box and recalculate the employee's balances.
    pub async fn save_entries(
        &self,
        reference: &CashBoxRef,
        entries: Vec<NewLedgerEntry>,
    ) -> Result<Vec<LedgerEntry>, AppError> {
        let cash_box = self.get_cash_box(reference).await?;
        if cash_box.is_hidden() {
            return Err(AppError::CashBoxHidden(cash_box.id));
        }

        let entries = entries
            .into_iter()
            .enumerate()
            .map(|(position, entry)| {
                entry.into_entry(cash_box.id, position as i64, cash_box.trip_date)
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.repo.replace_entries(&cash_box, &entries).await?;
        info!(cash_box = %reference, entries = entries.len(), "saved ledger entries");
        Ok(entries)
    }

    /// Append one entry to a box.
    pub async fn add_entry(
        &self,
        reference: &CashBoxRef,
        entry: NewLedgerEntry,
    ) -> Result<LedgerEntry, AppError> {
        let cash_box = self.get_cash_box(reference).await?;
        let mut entries: Vec<NewLedgerEntry> = self
            .repo
            .list_entries(cash_box.id)
            .await?
            .into_iter()
            .map(|e| NewLedgerEntry {
                date: Some(e.date),
                document_number: e.document_number,
                description: e.description,
                cost_type: e.cost_type,
                counterparty: e.counterparty,
                credit: e.credit,
                debit: e.debit,
            })
            .collect();
        entries.push(entry);

        let mut saved = self.save_entries(reference, entries).await?;
        saved
            .pop()
            .ok_or_else(|| AppError::Validation("ledger entry".to_string()))
    }

    /// Hide a box. Its advances are released and the employee's chain is
    /// recalculated without it.
    pub async fn hide_cash_box(&self, reference: &CashBoxRef) -> Result<HideResult, AppError> {
        let cash_box = self.get_cash_box(reference).await?;
        if cash_box.is_hidden() {
            return Err(AppError::CashBoxHidden(cash_box.id));
        }

        let released_advances = self.repo.hide_cash_box(&cash_box).await?;
        info!(cash_box = %reference, released_advances, "hid cash box");

        Ok(HideResult {
            cash_box,
            released_advances,
        })
    }

    /// List boxes with their totals, filtered and paginated.
    pub async fn list_cash_boxes(
        &self,
        filter: CashBoxFilter,
    ) -> Result<Page<CashBoxSummary>, AppError> {
        let employee_id = match &filter.employee {
            Some(name) => Some(self.get_employee(name).await?.id),
            None => None,
        };
        let company_id = match &filter.company {
            Some(name) => Some(self.get_company(name).await?.id),
            None => None,
        };

        let page = filter.page.max(1);
        let per_page = filter.per_page.filter(|p| *p > 0);
        let query = CashBoxQuery {
            employee_id,
            company_id,
            destination: filter.destination.filter(|d| !d.trim().is_empty()),
            from_date: filter.from_date,
            to_date: filter.to_date,
            include_hidden: filter.include_hidden,
            limit: per_page.map(|p| p as i64),
            offset: per_page.map_or(0, |p| ((page - 1) * p) as i64),
        };

        let (rows, total) = self.repo.list_cash_boxes(&query).await?;
        let items = rows
            .into_iter()
            .map(|row| CashBoxSummary {
                cash_box: row.cash_box,
                employee_name: row
                    .employee_name
                    .unwrap_or_else(|| NOT_SPECIFIED.to_string()),
                company_name: row
                    .company_name
                    .unwrap_or_else(|| NOT_SPECIFIED.to_string()),
                vehicle_plate: row.vehicle_plate,
                movements: row.movements,
            })
            .collect();

        Ok(Page {
            items,
            page,
            per_page,
            total: total.max(0) as usize,
        })
    }

    // ========================
    // Advance operations
    // ========================

    pub async fn create_advance(
        &self,
        employee: &str,
        date: NaiveDate,
        amount: Cents,
        note: Option<String>,
    ) -> Result<Advance, AppError> {
        Advance::check_amount(amount)?;
        let employee = self.get_visible_employee(employee).await?;

        let mut advance = Advance::new(employee.id, date, amount)?;
        if let Some(note) = note.filter(|n| !n.trim().is_empty()) {
            advance = advance.with_note(note);
        }
        self.repo.save_advance(&advance).await?;
        info!(employee = %employee.name, amount, "created advance");
        Ok(advance)
    }

    pub async fn get_advance(&self, id: AdvanceId) -> Result<Advance, AppError> {
        self.repo
            .get_advance(id)
            .await?
            .ok_or_else(|| AppError::AdvanceNotFound(id.to_string()))
    }

    /// Edit a free advance. Linked advances are locked.
    pub async fn update_advance(
        &self,
        id: AdvanceId,
        changes: AdvanceChanges,
    ) -> Result<Advance, AppError> {
        let mut advance = self.get_advance(id).await?;
        advance.ensure_unlocked()?;

        if let Some(amount) = changes.amount {
            Advance::check_amount(amount)?;
            advance.amount = amount;
        }
        if let Some(date) = changes.date {
            advance.date = date;
        }
        if let Some(note) = changes.note {
            advance.note = note.filter(|n| !n.trim().is_empty());
        }
        advance.updated_at = Utc::now();

        self.repo.update_advance(&advance).await?;
        Ok(advance)
    }

    /// Delete a free advance. Linked advances are locked.
    pub async fn delete_advance(&self, id: AdvanceId) -> Result<Advance, AppError> {
        let advance = self.get_advance(id).await?;
        advance.ensure_unlocked()?;
        self.repo.delete_advance(id).await?;
        info!(advance = %id, "deleted advance");
        Ok(advance)
    }

    /// Apply an advance to a box of the same employee.
    pub async fn link_advance(
        &self,
        id: AdvanceId,
        reference: &CashBoxRef,
    ) -> Result<Advance, AppError> {
        let mut advance = self.get_advance(id).await?;
        let cash_box = self.get_cash_box(reference).await?;
        validate_link(&advance, &cash_box)?;

        if advance.cash_box_id != Some(cash_box.id) {
            self.repo.set_advance_link(&advance, Some(cash_box.id)).await?;
            info!(advance = %id, cash_box = %reference, "linked advance");
        }

        advance.cash_box_id = Some(cash_box.id);
        Ok(advance)
    }

    /// Release an advance from its box.
    pub async fn unlink_advance(&self, id: AdvanceId) -> Result<Advance, AppError> {
        let mut advance = self.get_advance(id).await?;
        if advance.is_linked() {
            self.repo.set_advance_link(&advance, None).await?;
            advance.cash_box_id = None;
            info!(advance = %id, "unlinked advance");
        }
        Ok(advance)
    }

    pub async fn list_advances(
        &self,
        employee: Option<&str>,
        unlinked_only: bool,
    ) -> Result<Vec<Advance>, AppError> {
        let employee_id = match employee {
            Some(name) => Some(self.get_employee(name).await?.id),
            None => None,
        };
        Ok(self.repo.list_advances(employee_id, unlinked_only).await?)
    }

    // ========================
    // Balance reconciliation
    // ========================

    /// Recompute opening and closing balances of every visible box, for one
    /// employee or for all of them.
    ///
    /// Each employee's chain is processed in its own transaction; a storage
    /// failure is recorded in the report and the pass moves on.
    pub async fn recalculate_balances(
        &self,
        employee: Option<&str>,
    ) -> Result<RecalculationReport, AppError> {
        let targets: Vec<(EmployeeId, String)> = match employee {
            Some(name) => {
                let employee = self.get_employee(name).await?;
                vec![(employee.id, employee.name)]
            }
            None => {
                let names: HashMap<EmployeeId, String> = self
                    .repo
                    .list_employees(true)
                    .await?
                    .into_iter()
                    .map(|e| (e.id, e.name))
                    .collect();
                self.repo
                    .employees_with_cash_boxes()
                    .await?
                    .into_iter()
                    .map(|id| {
                        let name = names
                            .get(&id)
                            .cloned()
                            .unwrap_or_else(|| NOT_SPECIFIED.to_string());
                        (id, name)
                    })
                    .collect()
            }
        };

        let mut report = RecalculationReport::default();
        for (employee_id, employee_name) in targets {
            let outcome = match self.repo.recalculate_employee(employee_id).await {
                Ok(updates) => {
                    debug!(employee = %employee_name, boxes = updates.len(), "recalculated balances");
                    Ok(updates)
                }
                Err(err) => {
                    warn!(employee = %employee_name, error = %err, "balance recalculation failed");
                    Err(format!("{:#}", err))
                }
            };
            report.employees.push(EmployeeRecalculation {
                employee_id,
                employee_name,
                outcome,
            });
        }

        info!(
            employees = report.employees.len(),
            boxes = report.updated_boxes(),
            "balance recalculation finished"
        );
        Ok(report)
    }

    // ========================
    // Settlement documents
    // ========================

    /// Render the settlement sheet of a box as a PDF.
    pub async fn settlement_document(
        &self,
        reference: &CashBoxRef,
    ) -> Result<SettlementDocument, AppError> {
        let details = self.get_cash_box_details(reference).await?;
        let settlement = Settlement::new(
            &details.cash_box,
            &details.entries,
            &details.advances,
            details.company.as_ref(),
            details.employee.as_ref(),
            details.vehicle.as_ref(),
        )
        .with_issuer(self.report.issuer.clone());

        let document = render_settlement(
            &settlement,
            &self.report.geometry,
            self.report.rows_per_page,
        )
        .map_err(|err| AppError::Report(format!("{:#}", err)))?;

        info!(
            cash_box = %reference,
            pages = document.page_count,
            bytes = document.bytes.len(),
            "generated settlement document"
        );
        Ok(document)
    }

    // ========================
    // Bulk reads for export
    // ========================

    /// Every box with its entries and linked advances, hidden ones included.
    pub async fn list_all_cash_box_details(&self) -> Result<Vec<CashBoxDetails>, AppError> {
        let (rows, _) = self
            .repo
            .list_cash_boxes(&CashBoxQuery {
                include_hidden: true,
                ..Default::default()
            })
            .await?;

        let mut details = Vec::with_capacity(rows.len());
        for row in rows {
            details.push(self.details_of(row.cash_box).await?);
        }
        Ok(details)
    }
}

fn required(field: &str, value: &str) -> Result<String, AppError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(AppError::Validation(field.to_string()));
    }
    Ok(value.to_string())
}
