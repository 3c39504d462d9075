// Allow dead_code because these helpers are used across different test files
// which are compiled separately
#![allow(dead_code)]

use anyhow::Result;
use caixa::application::{CashBoxRef, CashBoxService, NewCashBox};
use caixa::domain::{NewLedgerEntry, TravelCashBox};
use chrono::NaiveDate;
use sqlx::SqlitePool;
use tempfile::TempDir;

/// Helper to create a test service with a temporary database
pub async fn test_service() -> Result<(CashBoxService, TempDir)> {
    let temp_dir = TempDir::new()?;
    let db_path = temp_dir.path().join("test.db");
    let service = CashBoxService::init(db_path.to_str().unwrap()).await?;
    Ok((service, temp_dir))
}

/// Direct connection to the test database, for tampering with rows
pub async fn raw_pool(temp_dir: &TempDir) -> Result<SqlitePool> {
    let db_path = temp_dir.path().join("test.db");
    Ok(SqlitePool::connect(db_path.to_str().unwrap()).await?)
}

/// Give a box a `created_at` that cannot be parsed, so loading the
/// employee's chain fails
pub async fn corrupt_cash_box(pool: &SqlitePool, cash_box: &TravelCashBox) -> Result<()> {
    sqlx::query("UPDATE cash_boxes SET created_at = 'x' WHERE id = ?")
        .bind(cash_box.id.to_string())
        .execute(pool)
        .await?;
    Ok(())
}

/// Helper to parse a date string (YYYY-MM-DD)
pub fn day(date_str: &str) -> NaiveDate {
    NaiveDate::parse_from_str(date_str, "%Y-%m-%d").unwrap()
}

/// Test fixture: one company, two employees and a truck
pub struct StandardRegistry;

impl StandardRegistry {
    pub const COMPANY: &'static str = "Transportes Andrade";
    pub const MARIA: &'static str = "Maria Souza";
    pub const JOAO: &'static str = "João Silva";
    pub const TRUCK: &'static str = "ABC1D23";

    pub async fn create(service: &CashBoxService) -> Result<()> {
        service
            .create_company(Self::COMPANY.into(), Some("12.345.678/0001-90".into()))
            .await?;
        service
            .create_employee(
                Self::MARIA.into(),
                Some("123.456.789-00".into()),
                Some(Self::COMPANY),
            )
            .await?;
        service
            .create_employee(Self::JOAO.into(), None, Some(Self::COMPANY))
            .await?;
        service
            .create_vehicle(Self::TRUCK, Some("Volvo FH 540".into()))
            .await?;
        Ok(())
    }
}

/// Input for a box of the standard company
pub fn new_box(employee: &str, trip_date: &str, destination: &str) -> NewCashBox {
    NewCashBox {
        employee: employee.to_string(),
        company: StandardRegistry::COMPANY.to_string(),
        trip_date: Some(day(trip_date)),
        destination: destination.to_string(),
        ..Default::default()
    }
}

/// Create a box and return its reference
pub async fn open_box(
    service: &CashBoxService,
    employee: &str,
    trip_date: &str,
    destination: &str,
) -> Result<(TravelCashBox, CashBoxRef)> {
    let cash_box = service
        .create_cash_box(new_box(employee, trip_date, destination))
        .await?;
    let reference = CashBoxRef::new(employee, cash_box.number);
    Ok((cash_box, reference))
}

pub fn credit(date: &str, amount: i64) -> NewLedgerEntry {
    NewLedgerEntry::new(day(date)).with_credit(amount)
}

pub fn debit(date: &str, amount: i64) -> NewLedgerEntry {
    NewLedgerEntry::new(day(date)).with_debit(amount)
}
