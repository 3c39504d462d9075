use thiserror::Error;

use crate::domain::{
    AdvanceAmountError, AdvanceId, AdvanceLinkError, CashBoxId, EmployeeId, EntryError,
};

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Company not found: {0}")]
    CompanyNotFound(String),

    #[error("Employee not found: {0}")]
    EmployeeNotFound(String),

    #[error("Vehicle not found: {0}")]
    VehicleNotFound(String),

    #[error("Cash box not found: {0}")]
    CashBoxNotFound(String),

    #[error("Advance not found: {0}")]
    AdvanceNotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("{0} is hidden")]
    Hidden(String),

    #[error("Missing or invalid field: {0}")]
    Validation(String),

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Advance belongs to employee {advance_employee}, cash box belongs to {box_employee}")]
    AdvanceEmployeeMismatch {
        advance_employee: EmployeeId,
        box_employee: EmployeeId,
    },

    #[error("Advance {advance_id} is already linked to cash box {cash_box_id}")]
    AdvanceAlreadyLinked {
        advance_id: AdvanceId,
        cash_box_id: CashBoxId,
    },

    #[error("Advance {advance_id} is linked to cash box {cash_box_id}; unlink it first")]
    AdvanceLocked {
        advance_id: AdvanceId,
        cash_box_id: CashBoxId,
    },

    #[error("Cash box {0} is hidden")]
    CashBoxHidden(CashBoxId),

    #[error("Failed to generate settlement document: {0}")]
    Report(String),

    #[error("Database error: {0}")]
    Database(#[from] anyhow::Error),
}

impl From<AdvanceLinkError> for AppError {
    fn from(err: AdvanceLinkError) -> Self {
        match err {
            AdvanceLinkError::EmployeeMismatch {
                advance_employee,
                box_employee,
            } => AppError::AdvanceEmployeeMismatch {
                advance_employee,
                box_employee,
            },
            AdvanceLinkError::AlreadyLinked {
                advance_id,
                cash_box_id,
            } => AppError::AdvanceAlreadyLinked {
                advance_id,
                cash_box_id,
            },
            AdvanceLinkError::Locked {
                advance_id,
                cash_box_id,
            } => AppError::AdvanceLocked {
                advance_id,
                cash_box_id,
            },
            AdvanceLinkError::HiddenCashBox(id) => AppError::CashBoxHidden(id),
        }
    }
}

impl From<AdvanceAmountError> for AppError {
    fn from(err: AdvanceAmountError) -> Self {
        AppError::InvalidAmount(err.to_string())
    }
}

impl From<EntryError> for AppError {
    fn from(err: EntryError) -> Self {
        AppError::InvalidAmount(err.to_string())
    }
}
