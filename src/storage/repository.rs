use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::SqliteRow;
use sqlx::{Row, SqlitePool};
use uuid::Uuid;

use crate::domain::{
    reconcile_chain, Advance, AdvanceId, BalanceUpdate, BoxMovements, CashBoxId, Cents,
    ChainLink, Company, CompanyId, Employee, EmployeeId, LedgerEntry, NextCashBox,
    TravelCashBox, Vehicle, VehicleId,
};

use super::MIGRATION_001_INITIAL;

const CASH_BOX_COLUMNS: &str = "b.id, b.number, b.employee_id, b.company_id, b.vehicle_id, b.trip_date, b.destination, b.note, b.opening_balance_cents, b.closing_balance_cents, b.manual_opening_cents, b.created_at, b.updated_at, b.hidden_at";

const MOVEMENT_COLUMNS: &str = r#"
    COALESCE((SELECT SUM(e.credit_cents) FROM ledger_entries e WHERE e.cash_box_id = b.id), 0) AS credits,
    COALESCE((SELECT SUM(e.debit_cents) FROM ledger_entries e WHERE e.cash_box_id = b.id), 0) AS debits,
    COALESCE((SELECT SUM(a.amount_cents) FROM advances a WHERE a.cash_box_id = b.id), 0) AS advances
"#;

const ENTRY_COLUMNS: &str = "id, cash_box_id, position, entry_date, document_number, description, cost_type, counterparty, credit_cents, debit_cents";

const ADVANCE_COLUMNS: &str =
    "id, employee_id, advance_date, amount_cents, note, cash_box_id, created_at, updated_at";

/// Filters for listing cash boxes. All filters are optional and combined with AND.
#[derive(Debug, Clone, Default)]
pub struct CashBoxQuery {
    pub employee_id: Option<EmployeeId>,
    pub company_id: Option<CompanyId>,
    /// Case-insensitive substring of the destination
    pub destination: Option<String>,
    pub from_date: Option<NaiveDate>,
    pub to_date: Option<NaiveDate>,
    pub include_hidden: bool,
    pub limit: Option<i64>,
    pub offset: i64,
}

/// A cash box joined with the names list views show and its totals.
#[derive(Debug, Clone)]
pub struct CashBoxRow {
    pub cash_box: TravelCashBox,
    pub employee_name: Option<String>,
    pub company_name: Option<String>,
    pub vehicle_plate: Option<String>,
    pub movements: BoxMovements,
}

/// Repository for persisting and querying registries, cash boxes, entries and advances.
pub struct Repository {
    pool: SqlitePool,
}

impl Repository {
    /// Create a new repository with the given SQLite connection pool.
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Connect to a SQLite database at the given URL.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = SqlitePool::connect(database_url)
            .await
            .context("Failed to connect to database")?;
        Ok(Self::new(pool))
    }

    /// Run database migrations.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(MIGRATION_001_INITIAL)
            .execute(&self.pool)
            .await
            .context("Failed to run migration 001")?;
        Ok(())
    }

    /// Initialize a new database (connect + migrate).
    pub async fn init(database_url: &str) -> Result<Self> {
        let repo = Self::connect(database_url).await?;
        repo.migrate().await?;
        Ok(repo)
    }

    // ========================
    // Company operations
    // ========================

    pub async fn save_company(&self, company: &Company) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO companies (id, name, tax_id, created_at, hidden_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(company.id.to_string())
        .bind(&company.name)
        .bind(&company.tax_id)
        .bind(company.created_at.to_rfc3339())
        .bind(company.hidden_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await
        .context("Failed to save company")?;
        Ok(())
    }

    pub async fn update_company(&self, company: &Company) -> Result<()> {
        sqlx::query("UPDATE companies SET name = ?, tax_id = ? WHERE id = ?")
            .bind(&company.name)
            .bind(&company.tax_id)
            .bind(company.id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update company")?;
        Ok(())
    }

    pub async fn get_company(&self, id: CompanyId) -> Result<Option<Company>> {
        let row = sqlx::query(
            "SELECT id, name, tax_id, created_at, hidden_at FROM companies WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch company")?;

        row.as_ref().map(Self::row_to_company).transpose()
    }

    pub async fn get_company_by_name(&self, name: &str) -> Result<Option<Company>> {
        let row = sqlx::query(
            "SELECT id, name, tax_id, created_at, hidden_at FROM companies WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch company by name")?;

        row.as_ref().map(Self::row_to_company).transpose()
    }

    pub async fn list_companies(&self, include_hidden: bool) -> Result<Vec<Company>> {
        let query = if include_hidden {
            "SELECT id, name, tax_id, created_at, hidden_at FROM companies ORDER BY name"
        } else {
            "SELECT id, name, tax_id, created_at, hidden_at FROM companies WHERE hidden_at IS NULL ORDER BY name"
        };

        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list companies")?;

        rows.iter().map(Self::row_to_company).collect()
    }

    pub async fn hide_company(&self, id: CompanyId) -> Result<()> {
        sqlx::query("UPDATE companies SET hidden_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to hide company")?;
        Ok(())
    }

    fn row_to_company(row: &SqliteRow) -> Result<Company> {
        Ok(Company {
            id: parse_id(row, "id")?,
            name: row.get("name"),
            tax_id: row.get("tax_id"),
            created_at: parse_timestamp(row, "created_at")?,
            hidden_at: parse_optional_timestamp(row, "hidden_at")?,
        })
    }

    // ========================
    // Employee operations
    // ========================

    pub async fn save_employee(&self, employee: &Employee) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO employees (id, name, document, company_id, created_at, hidden_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(employee.id.to_string())
        .bind(&employee.name)
        .bind(&employee.document)
        .bind(employee.company_id.map(|id| id.to_string()))
        .bind(employee.created_at.to_rfc3339())
        .bind(employee.hidden_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await
        .context("Failed to save employee")?;
        Ok(())
    }

    pub async fn update_employee(&self, employee: &Employee) -> Result<()> {
        sqlx::query("UPDATE employees SET name = ?, document = ?, company_id = ? WHERE id = ?")
            .bind(&employee.name)
            .bind(&employee.document)
            .bind(employee.company_id.map(|id| id.to_string()))
            .bind(employee.id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update employee")?;
        Ok(())
    }

    pub async fn get_employee(&self, id: EmployeeId) -> Result<Option<Employee>> {
        let row = sqlx::query(
            "SELECT id, name, document, company_id, created_at, hidden_at FROM employees WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch employee")?;

        row.as_ref().map(Self::row_to_employee).transpose()
    }

    pub async fn get_employee_by_name(&self, name: &str) -> Result<Option<Employee>> {
        let row = sqlx::query(
            "SELECT id, name, document, company_id, created_at, hidden_at FROM employees WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch employee by name")?;

        row.as_ref().map(Self::row_to_employee).transpose()
    }

    pub async fn list_employees(&self, include_hidden: bool) -> Result<Vec<Employee>> {
        let query = if include_hidden {
            "SELECT id, name, document, company_id, created_at, hidden_at FROM employees ORDER BY name"
        } else {
            "SELECT id, name, document, company_id, created_at, hidden_at FROM employees WHERE hidden_at IS NULL ORDER BY name"
        };

        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list employees")?;

        rows.iter().map(Self::row_to_employee).collect()
    }

    pub async fn hide_employee(&self, id: EmployeeId) -> Result<()> {
        sqlx::query("UPDATE employees SET hidden_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to hide employee")?;
        Ok(())
    }

    fn row_to_employee(row: &SqliteRow) -> Result<Employee> {
        Ok(Employee {
            id: parse_id(row, "id")?,
            name: row.get("name"),
            document: row.get("document"),
            company_id: parse_optional_id(row, "company_id")?,
            created_at: parse_timestamp(row, "created_at")?,
            hidden_at: parse_optional_timestamp(row, "hidden_at")?,
        })
    }

    // ========================
    // Vehicle operations
    // ========================

    pub async fn save_vehicle(&self, vehicle: &Vehicle) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO vehicles (id, plate, model, created_at, hidden_at)
            VALUES (?, ?, ?, ?, ?)
            "#,
        )
        .bind(vehicle.id.to_string())
        .bind(&vehicle.plate)
        .bind(&vehicle.model)
        .bind(vehicle.created_at.to_rfc3339())
        .bind(vehicle.hidden_at.map(|dt| dt.to_rfc3339()))
        .execute(&self.pool)
        .await
        .context("Failed to save vehicle")?;
        Ok(())
    }

    pub async fn update_vehicle(&self, vehicle: &Vehicle) -> Result<()> {
        sqlx::query("UPDATE vehicles SET plate = ?, model = ? WHERE id = ?")
            .bind(&vehicle.plate)
            .bind(&vehicle.model)
            .bind(vehicle.id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to update vehicle")?;
        Ok(())
    }

    pub async fn get_vehicle(&self, id: VehicleId) -> Result<Option<Vehicle>> {
        let row = sqlx::query(
            "SELECT id, plate, model, created_at, hidden_at FROM vehicles WHERE id = ?",
        )
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch vehicle")?;

        row.as_ref().map(Self::row_to_vehicle).transpose()
    }

    /// Plates must already be normalized.
    pub async fn get_vehicle_by_plate(&self, plate: &str) -> Result<Option<Vehicle>> {
        let row = sqlx::query(
            "SELECT id, plate, model, created_at, hidden_at FROM vehicles WHERE plate = ?",
        )
        .bind(plate)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch vehicle by plate")?;

        row.as_ref().map(Self::row_to_vehicle).transpose()
    }

    pub async fn list_vehicles(&self, include_hidden: bool) -> Result<Vec<Vehicle>> {
        let query = if include_hidden {
            "SELECT id, plate, model, created_at, hidden_at FROM vehicles ORDER BY plate"
        } else {
            "SELECT id, plate, model, created_at, hidden_at FROM vehicles WHERE hidden_at IS NULL ORDER BY plate"
        };

        let rows = sqlx::query(query)
            .fetch_all(&self.pool)
            .await
            .context("Failed to list vehicles")?;

        rows.iter().map(Self::row_to_vehicle).collect()
    }

    pub async fn hide_vehicle(&self, id: VehicleId) -> Result<()> {
        sqlx::query("UPDATE vehicles SET hidden_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to hide vehicle")?;
        Ok(())
    }

    fn row_to_vehicle(row: &SqliteRow) -> Result<Vehicle> {
        Ok(Vehicle {
            id: parse_id(row, "id")?,
            plate: row.get("plate"),
            model: row.get("model"),
            created_at: parse_timestamp(row, "created_at")?,
            hidden_at: parse_optional_timestamp(row, "hidden_at")?,
        })
    }

    // ========================
    // Cash box operations
    // ========================

    /// Number and opening balance the next box of an employee gets.
    pub async fn next_cash_box(&self, employee_id: EmployeeId) -> Result<NextCashBox> {
        let mut conn = self
            .pool
            .acquire()
            .await
            .context("Failed to acquire connection")?;
        next_cash_box_on(&mut conn, employee_id).await
    }

    /// Insert a new cash box, assigning its number and carried opening
    /// balance, then recalculate the employee's chain. All in one transaction.
    ///
    /// A manual opening value is only honoured for the employee's first box.
    pub async fn insert_cash_box(&self, cash_box: &mut TravelCashBox) -> Result<NextCashBox> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        lock_employee_boxes(&mut tx, cash_box.employee_id).await?;
        let next = next_cash_box_on(&mut tx, cash_box.employee_id).await?;

        cash_box.number = next.number;
        if !next.is_first() {
            cash_box.manual_opening = None;
        }
        cash_box.opening_balance = cash_box.manual_opening.unwrap_or(next.opening_balance);
        cash_box.closing_balance = cash_box.opening_balance;

        sqlx::query(
            r#"
            INSERT INTO cash_boxes (id, number, employee_id, company_id, vehicle_id, trip_date, destination, note,
                opening_balance_cents, closing_balance_cents, manual_opening_cents, created_at, updated_at, hidden_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(cash_box.id.to_string())
        .bind(cash_box.number)
        .bind(cash_box.employee_id.to_string())
        .bind(cash_box.company_id.to_string())
        .bind(cash_box.vehicle_id.map(|id| id.to_string()))
        .bind(format_day(cash_box.trip_date))
        .bind(&cash_box.destination)
        .bind(&cash_box.note)
        .bind(cash_box.opening_balance)
        .bind(cash_box.closing_balance)
        .bind(cash_box.manual_opening)
        .bind(cash_box.created_at.to_rfc3339())
        .bind(cash_box.updated_at.to_rfc3339())
        .bind(cash_box.hidden_at.map(|dt| dt.to_rfc3339()))
        .execute(&mut *tx)
        .await
        .context("Failed to save cash box")?;

        recalculate_on(&mut tx, cash_box.employee_id).await?;
        tx.commit().await.context("Failed to commit cash box")?;
        Ok(next)
    }

    /// Persist the editable fields of a cash box and recalculate the
    /// employee's chain in the same transaction.
    pub async fn update_cash_box(&self, cash_box: &TravelCashBox) -> Result<Vec<BalanceUpdate>> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        lock_employee_boxes(&mut tx, cash_box.employee_id).await?;

        sqlx::query(
            r#"
            UPDATE cash_boxes
            SET company_id = ?, vehicle_id = ?, trip_date = ?, destination = ?, note = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(cash_box.company_id.to_string())
        .bind(cash_box.vehicle_id.map(|id| id.to_string()))
        .bind(format_day(cash_box.trip_date))
        .bind(&cash_box.destination)
        .bind(&cash_box.note)
        .bind(cash_box.updated_at.to_rfc3339())
        .bind(cash_box.id.to_string())
        .execute(&mut *tx)
        .await
        .context("Failed to update cash box")?;

        let updates = recalculate_on(&mut tx, cash_box.employee_id).await?;
        tx.commit().await.context("Failed to commit cash box update")?;
        Ok(updates)
    }

    pub async fn get_cash_box(&self, id: CashBoxId) -> Result<Option<TravelCashBox>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM cash_boxes b WHERE b.id = ?",
            CASH_BOX_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch cash box")?;

        row.as_ref().map(Self::row_to_cash_box).transpose()
    }

    /// Find a box by employee and number. Visible boxes win over hidden
    /// ones; among equals the oldest is returned.
    pub async fn get_cash_box_by_number(
        &self,
        employee_id: EmployeeId,
        number: i64,
    ) -> Result<Option<TravelCashBox>> {
        let row = sqlx::query(&format!(
            r#"
            SELECT {} FROM cash_boxes b
            WHERE b.employee_id = ? AND b.number = ?
            ORDER BY (b.hidden_at IS NOT NULL), b.created_at
            LIMIT 1
            "#,
            CASH_BOX_COLUMNS
        ))
        .bind(employee_id.to_string())
        .bind(number)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch cash box by number")?;

        row.as_ref().map(Self::row_to_cash_box).transpose()
    }

    /// Hide a cash box, release the advances linked to it and recalculate
    /// the employee's chain without it.
    /// Returns how many advances were released.
    pub async fn hide_cash_box(&self, cash_box: &TravelCashBox) -> Result<u64> {
        let id = cash_box.id;
        let now = Utc::now().to_rfc3339();
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        lock_employee_boxes(&mut tx, cash_box.employee_id).await?;

        sqlx::query("UPDATE cash_boxes SET hidden_at = ?, updated_at = ? WHERE id = ?")
            .bind(&now)
            .bind(&now)
            .bind(id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to hide cash box")?;

        let released = sqlx::query(
            "UPDATE advances SET cash_box_id = NULL, updated_at = ? WHERE cash_box_id = ?",
        )
        .bind(&now)
        .bind(id.to_string())
        .execute(&mut *tx)
        .await
        .context("Failed to release advances of hidden cash box")?
        .rows_affected();

        recalculate_on(&mut tx, cash_box.employee_id).await?;
        tx.commit().await.context("Failed to commit cash box hide")?;
        Ok(released)
    }

    /// List cash boxes with their totals, newest trips first.
    /// Returns the requested page and the total number of matching boxes.
    pub async fn list_cash_boxes(&self, query: &CashBoxQuery) -> Result<(Vec<CashBoxRow>, i64)> {
        let mut where_clause = String::from(" WHERE 1=1");
        let mut binds: Vec<String> = Vec::new();

        if let Some(employee_id) = query.employee_id {
            where_clause.push_str(" AND b.employee_id = ?");
            binds.push(employee_id.to_string());
        }
        if let Some(company_id) = query.company_id {
            where_clause.push_str(" AND b.company_id = ?");
            binds.push(company_id.to_string());
        }
        if let Some(destination) = &query.destination {
            where_clause.push_str(" AND LOWER(b.destination) LIKE ?");
            binds.push(format!("%{}%", destination.to_lowercase()));
        }
        if let Some(from_date) = query.from_date {
            where_clause.push_str(" AND b.trip_date >= ?");
            binds.push(format_day(from_date));
        }
        if let Some(to_date) = query.to_date {
            where_clause.push_str(" AND b.trip_date <= ?");
            binds.push(format_day(to_date));
        }
        if !query.include_hidden {
            where_clause.push_str(" AND b.hidden_at IS NULL");
        }

        let count_sql = format!("SELECT COUNT(*) AS count FROM cash_boxes b{}", where_clause);
        let mut count_query = sqlx::query(&count_sql);
        for bind in &binds {
            count_query = count_query.bind(bind);
        }
        let total: i64 = count_query
            .fetch_one(&self.pool)
            .await
            .context("Failed to count cash boxes")?
            .get("count");

        let mut list_sql = format!(
            r#"
            SELECT {}, emp.name AS employee_name, com.name AS company_name, veh.plate AS vehicle_plate, {}
            FROM cash_boxes b
            LEFT JOIN employees emp ON emp.id = b.employee_id
            LEFT JOIN companies com ON com.id = b.company_id
            LEFT JOIN vehicles veh ON veh.id = b.vehicle_id
            {}
            ORDER BY b.trip_date DESC, emp.name, b.number DESC
            "#,
            CASH_BOX_COLUMNS, MOVEMENT_COLUMNS, where_clause
        );
        if let Some(limit) = query.limit {
            list_sql.push_str(&format!(" LIMIT {} OFFSET {}", limit, query.offset.max(0)));
        }

        let mut list_query = sqlx::query(&list_sql);
        for bind in &binds {
            list_query = list_query.bind(bind);
        }
        let rows = list_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list cash boxes")?;

        let items = rows
            .iter()
            .map(|row| {
                Ok(CashBoxRow {
                    cash_box: Self::row_to_cash_box(row)?,
                    employee_name: row.get("employee_name"),
                    company_name: row.get("company_name"),
                    vehicle_plate: row.get("vehicle_plate"),
                    movements: row_to_movements(row),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok((items, total))
    }

    /// Employees owning at least one visible box.
    pub async fn employees_with_cash_boxes(&self) -> Result<Vec<EmployeeId>> {
        let rows = sqlx::query(
            r#"
            SELECT DISTINCT b.employee_id
            FROM cash_boxes b
            LEFT JOIN employees emp ON emp.id = b.employee_id
            WHERE b.hidden_at IS NULL
            ORDER BY emp.name, b.employee_id
            "#,
        )
        .fetch_all(&self.pool)
        .await
        .context("Failed to list employees with cash boxes")?;

        rows.iter().map(|row| parse_id(row, "employee_id")).collect()
    }

    /// Recompute and store the opening/closing balances of every visible box
    /// of one employee.
    ///
    /// The whole read-modify-write runs in one transaction that takes the
    /// database write lock before reading, so two passes for the same
    /// employee cannot interleave.
    pub async fn recalculate_employee(&self, employee_id: EmployeeId) -> Result<Vec<BalanceUpdate>> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        lock_employee_boxes(&mut tx, employee_id).await?;
        let updates = recalculate_on(&mut tx, employee_id).await?;

        tx.commit()
            .await
            .context("Failed to commit recalculated balances")?;
        Ok(updates)
    }

    fn row_to_cash_box(row: &SqliteRow) -> Result<TravelCashBox> {
        Ok(TravelCashBox {
            id: parse_id(row, "id")?,
            number: row.get("number"),
            employee_id: parse_id(row, "employee_id")?,
            company_id: parse_id(row, "company_id")?,
            vehicle_id: parse_optional_id(row, "vehicle_id")?,
            trip_date: parse_day(row, "trip_date")?,
            destination: row.get("destination"),
            note: row.get("note"),
            opening_balance: row.get("opening_balance_cents"),
            closing_balance: row.get("closing_balance_cents"),
            manual_opening: row.get("manual_opening_cents"),
            created_at: parse_timestamp(row, "created_at")?,
            updated_at: parse_timestamp(row, "updated_at")?,
            hidden_at: parse_optional_timestamp(row, "hidden_at")?,
        })
    }

    // ========================
    // Ledger entry operations
    // ========================

    /// Entries of a box in row order.
    pub async fn list_entries(&self, cash_box_id: CashBoxId) -> Result<Vec<LedgerEntry>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM ledger_entries WHERE cash_box_id = ? ORDER BY position",
            ENTRY_COLUMNS
        ))
        .bind(cash_box_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list ledger entries")?;

        rows.iter().map(Self::row_to_entry).collect()
    }

    /// Replace every entry of a box and recalculate the employee's chain,
    /// atomically.
    pub async fn replace_entries(
        &self,
        cash_box: &TravelCashBox,
        entries: &[LedgerEntry],
    ) -> Result<Vec<BalanceUpdate>> {
        let cash_box_id = cash_box.id;
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        lock_employee_boxes(&mut tx, cash_box.employee_id).await?;

        sqlx::query("DELETE FROM ledger_entries WHERE cash_box_id = ?")
            .bind(cash_box_id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to clear ledger entries")?;

        for entry in entries {
            sqlx::query(&format!(
                "INSERT INTO ledger_entries ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
                ENTRY_COLUMNS
            ))
            .bind(entry.id.to_string())
            .bind(cash_box_id.to_string())
            .bind(entry.position)
            .bind(format_day(entry.date))
            .bind(&entry.document_number)
            .bind(&entry.description)
            .bind(&entry.cost_type)
            .bind(&entry.counterparty)
            .bind(entry.credit)
            .bind(entry.debit)
            .execute(&mut *tx)
            .await
            .context("Failed to insert ledger entry")?;
        }

        sqlx::query("UPDATE cash_boxes SET updated_at = ? WHERE id = ?")
            .bind(Utc::now().to_rfc3339())
            .bind(cash_box_id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to touch cash box")?;

        let updates = recalculate_on(&mut tx, cash_box.employee_id).await?;
        tx.commit().await.context("Failed to commit ledger entries")?;
        Ok(updates)
    }

    fn row_to_entry(row: &SqliteRow) -> Result<LedgerEntry> {
        Ok(LedgerEntry {
            id: parse_id(row, "id")?,
            cash_box_id: parse_id(row, "cash_box_id")?,
            position: row.get("position"),
            date: parse_day(row, "entry_date")?,
            document_number: row.get("document_number"),
            description: row.get("description"),
            cost_type: row.get("cost_type"),
            counterparty: row.get("counterparty"),
            credit: row.get("credit_cents"),
            debit: row.get("debit_cents"),
        })
    }

    // ========================
    // Advance operations
    // ========================

    pub async fn save_advance(&self, advance: &Advance) -> Result<()> {
        sqlx::query(&format!(
            "INSERT INTO advances ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
            ADVANCE_COLUMNS
        ))
        .bind(advance.id.to_string())
        .bind(advance.employee_id.to_string())
        .bind(format_day(advance.date))
        .bind(advance.amount)
        .bind(&advance.note)
        .bind(advance.cash_box_id.map(|id| id.to_string()))
        .bind(advance.created_at.to_rfc3339())
        .bind(advance.updated_at.to_rfc3339())
        .execute(&self.pool)
        .await
        .context("Failed to save advance")?;
        Ok(())
    }

    /// Persist date, amount and note of an advance.
    pub async fn update_advance(&self, advance: &Advance) -> Result<()> {
        sqlx::query(
            "UPDATE advances SET advance_date = ?, amount_cents = ?, note = ?, updated_at = ? WHERE id = ?",
        )
        .bind(format_day(advance.date))
        .bind(advance.amount)
        .bind(&advance.note)
        .bind(advance.updated_at.to_rfc3339())
        .bind(advance.id.to_string())
        .execute(&self.pool)
        .await
        .context("Failed to update advance")?;
        Ok(())
    }

    pub async fn delete_advance(&self, id: AdvanceId) -> Result<()> {
        sqlx::query("DELETE FROM advances WHERE id = ?")
            .bind(id.to_string())
            .execute(&self.pool)
            .await
            .context("Failed to delete advance")?;
        Ok(())
    }

    /// Link an advance to a box, or unlink it with `None`, and recalculate
    /// the chain of the advance's employee in the same transaction.
    pub async fn set_advance_link(
        &self,
        advance: &Advance,
        cash_box_id: Option<CashBoxId>,
    ) -> Result<Vec<BalanceUpdate>> {
        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;
        lock_employee_boxes(&mut tx, advance.employee_id).await?;

        sqlx::query("UPDATE advances SET cash_box_id = ?, updated_at = ? WHERE id = ?")
            .bind(cash_box_id.map(|id| id.to_string()))
            .bind(Utc::now().to_rfc3339())
            .bind(advance.id.to_string())
            .execute(&mut *tx)
            .await
            .context("Failed to update advance link")?;

        let updates = recalculate_on(&mut tx, advance.employee_id).await?;
        tx.commit().await.context("Failed to commit advance link")?;
        Ok(updates)
    }

    pub async fn get_advance(&self, id: AdvanceId) -> Result<Option<Advance>> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM advances WHERE id = ?",
            ADVANCE_COLUMNS
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch advance")?;

        row.as_ref().map(Self::row_to_advance).transpose()
    }

    /// List advances, optionally for one employee and/or only the free ones.
    pub async fn list_advances(
        &self,
        employee_id: Option<EmployeeId>,
        unlinked_only: bool,
    ) -> Result<Vec<Advance>> {
        let mut query = format!("SELECT {} FROM advances WHERE 1=1", ADVANCE_COLUMNS);
        let employee_id_str = employee_id.map(|id| id.to_string());

        if employee_id.is_some() {
            query.push_str(" AND employee_id = ?");
        }
        if unlinked_only {
            query.push_str(" AND cash_box_id IS NULL");
        }
        query.push_str(" ORDER BY advance_date, created_at");

        let mut sql_query = sqlx::query(&query);
        if let Some(ref id) = employee_id_str {
            sql_query = sql_query.bind(id);
        }

        let rows = sql_query
            .fetch_all(&self.pool)
            .await
            .context("Failed to list advances")?;

        rows.iter().map(Self::row_to_advance).collect()
    }

    pub async fn list_advances_for_cash_box(&self, cash_box_id: CashBoxId) -> Result<Vec<Advance>> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM advances WHERE cash_box_id = ? ORDER BY advance_date, created_at",
            ADVANCE_COLUMNS
        ))
        .bind(cash_box_id.to_string())
        .fetch_all(&self.pool)
        .await
        .context("Failed to list advances for cash box")?;

        rows.iter().map(Self::row_to_advance).collect()
    }

    fn row_to_advance(row: &SqliteRow) -> Result<Advance> {
        Ok(Advance {
            id: parse_id(row, "id")?,
            employee_id: parse_id(row, "employee_id")?,
            date: parse_day(row, "advance_date")?,
            amount: row.get("amount_cents"),
            note: row.get("note"),
            cash_box_id: parse_optional_id(row, "cash_box_id")?,
            created_at: parse_timestamp(row, "created_at")?,
            updated_at: parse_timestamp(row, "updated_at")?,
        })
    }
}

/// Take SQLite's write lock for the current transaction with a no-op write
/// on the employee's boxes. Any later reader-then-writer transaction blocks
/// until this one finishes.
async fn lock_employee_boxes(
    conn: &mut sqlx::SqliteConnection,
    employee_id: EmployeeId,
) -> Result<()> {
    sqlx::query("UPDATE cash_boxes SET number = number WHERE employee_id = ?")
        .bind(employee_id.to_string())
        .execute(&mut *conn)
        .await
        .context("Failed to lock employee cash boxes")?;
    Ok(())
}

async fn next_cash_box_on(
    conn: &mut sqlx::SqliteConnection,
    employee_id: EmployeeId,
) -> Result<NextCashBox> {
    let highest: Option<i64> =
        sqlx::query("SELECT MAX(number) AS highest FROM cash_boxes WHERE employee_id = ?")
            .bind(employee_id.to_string())
            .fetch_one(&mut *conn)
            .await
            .context("Failed to find highest cash box number")?
            .get("highest");

    let last_closing: Option<Cents> = sqlx::query(
        r#"
        SELECT closing_balance_cents
        FROM cash_boxes
        WHERE employee_id = ? AND hidden_at IS NULL
        ORDER BY number DESC, created_at DESC
        LIMIT 1
        "#,
    )
    .bind(employee_id.to_string())
    .fetch_optional(&mut *conn)
    .await
    .context("Failed to find latest cash box balance")?
    .map(|row| row.get("closing_balance_cents"));

    Ok(NextCashBox::after(highest, last_closing))
}

/// Recompute and store the balances of an employee's visible boxes on the
/// caller's connection. Callers hold the employee lock and commit.
async fn recalculate_on(
    conn: &mut sqlx::SqliteConnection,
    employee_id: EmployeeId,
) -> Result<Vec<BalanceUpdate>> {
    let rows = sqlx::query(&format!(
        r#"
        SELECT b.id, b.number, b.created_at, b.manual_opening_cents, {}
        FROM cash_boxes b
        WHERE b.employee_id = ? AND b.hidden_at IS NULL
        ORDER BY b.number, b.created_at
        "#,
        MOVEMENT_COLUMNS
    ))
    .bind(employee_id.to_string())
    .fetch_all(&mut *conn)
    .await
    .context("Failed to load cash box chain")?;

    let links = rows
        .iter()
        .map(|row| {
            Ok(ChainLink {
                cash_box_id: parse_id(row, "id")?,
                number: row.get("number"),
                created_at: parse_timestamp(row, "created_at")?,
                manual_opening: row.get("manual_opening_cents"),
                movements: row_to_movements(row),
            })
        })
        .collect::<Result<Vec<_>>>()?;

    let updates = reconcile_chain(links);

    for update in &updates {
        sqlx::query(
            "UPDATE cash_boxes SET opening_balance_cents = ?, closing_balance_cents = ? WHERE id = ?",
        )
        .bind(update.opening_balance)
        .bind(update.closing_balance)
        .bind(update.cash_box_id.to_string())
        .execute(&mut *conn)
        .await
        .context("Failed to store recalculated balances")?;
    }

    Ok(updates)
}

fn row_to_movements(row: &SqliteRow) -> BoxMovements {
    BoxMovements::new(row.get("credits"), row.get("debits"), row.get("advances"))
}

fn format_day(date: NaiveDate) -> String {
    date.format("%Y-%m-%d").to_string()
}

fn parse_day(row: &SqliteRow, column: &str) -> Result<NaiveDate> {
    let value: String = row.get(column);
    NaiveDate::parse_from_str(&value, "%Y-%m-%d")
        .with_context(|| format!("Invalid {} date: {}", column, value))
}

fn parse_id(row: &SqliteRow, column: &str) -> Result<Uuid> {
    let value: String = row.get(column);
    Uuid::parse_str(&value).with_context(|| format!("Invalid {}: {}", column, value))
}

fn parse_optional_id(row: &SqliteRow, column: &str) -> Result<Option<Uuid>> {
    let value: Option<String> = row.get(column);
    value
        .map(|s| Uuid::parse_str(&s))
        .transpose()
        .with_context(|| format!("Invalid {}", column))
}

fn parse_timestamp(row: &SqliteRow, column: &str) -> Result<DateTime<Utc>> {
    let value: String = row.get(column);
    Ok(DateTime::parse_from_rfc3339(&value)
        .with_context(|| format!("Invalid {} timestamp", column))?
        .with_timezone(&Utc))
}

fn parse_optional_timestamp(row: &SqliteRow, column: &str) -> Result<Option<DateTime<Utc>>> {
    let value: Option<String> = row.get(column);
    Ok(value
        .map(|s| DateTime::parse_from_rfc3339(&s))
        .transpose()
        .with_context(|| format!("Invalid {} timestamp", column))?
        .map(|dt| dt.with_timezone(&Utc)))
}
