use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub type CompanyId = Uuid;
pub type EmployeeId = Uuid;
pub type VehicleId = Uuid;

/// Placeholder shown wherever a referenced record is missing.
pub const NOT_SPECIFIED: &str = "Não informado";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Company {
    pub id: CompanyId,
    pub name: String,
    /// CNPJ, kept as typed by the user
    pub tax_id: Option<String>,
    pub created_at: DateTime<Utc>,
    pub hidden_at: Option<DateTime<Utc>>,
}

impl Company {
    pub fn new(name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            tax_id: None,
            created_at: Utc::now(),
            hidden_at: None,
        }
    }

    pub fn with_tax_id(mut self, tax_id: impl Into<String>) -> Self {
        self.tax_id = Some(tax_id.into());
        self
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Employee {
    pub id: EmployeeId,
    pub name: String,
    /// CPF or any other personal document number
    pub document: Option<String>,
    /// Company the employee usually travels for
    pub company_id: Option<CompanyId>,
    pub created_at: DateTime<Utc>,
    pub hidden_at: Option<DateTime<Utc>>,
}

impl Employee {
    pub fn new(name: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            name,
            document: None,
            company_id: None,
            created_at: Utc::now(),
            hidden_at: None,
        }
    }

    pub fn with_document(mut self, document: impl Into<String>) -> Self {
        self.document = Some(document.into());
        self
    }

    pub fn with_company(mut self, company_id: CompanyId) -> Self {
        self.company_id = Some(company_id);
        self
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden_at.is_some()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Vehicle {
    pub id: VehicleId,
    /// License plate, stored uppercase
    pub plate: String,
    pub model: Option<String>,
    pub created_at: DateTime<Utc>,
    pub hidden_at: Option<DateTime<Utc>>,
}

impl Vehicle {
    pub fn new(plate: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            plate: normalize_plate(plate),
            model: None,
            created_at: Utc::now(),
            hidden_at: None,
        }
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn is_hidden(&self) -> bool {
        self.hidden_at.is_some()
    }

    /// "ABC1D23 (Strada)" or just the plate.
    pub fn label(&self) -> String {
        match &self.model {
            Some(model) => format!("{} ({})", self.plate, model),
            None => self.plate.clone(),
        }
    }
}

/// Plates are compared without separators and case: "abc-1d23" == "ABC1D23".
pub fn normalize_plate(plate: &str) -> String {
    plate
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .map(|c| c.to_ascii_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plate_is_normalized() {
        let vehicle = Vehicle::new("abc-1d23");
        assert_eq!(vehicle.plate, "ABC1D23");
        assert_eq!(normalize_plate(" ABC 1D23 "), "ABC1D23");
    }

    #[test]
    fn test_vehicle_label() {
        let vehicle = Vehicle::new("ABC1D23").with_model("Strada");
        assert_eq!(vehicle.label(), "ABC1D23 (Strada)");
        assert_eq!(Vehicle::new("XYZ9876").label(), "XYZ9876");
    }

    #[test]
    fn test_new_records_are_visible() {
        assert!(!Company::new("Acme".into()).is_hidden());
        assert!(!Employee::new("Ana".into()).is_hidden());
    }
}
