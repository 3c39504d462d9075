mod common;

use anyhow::Result;
use caixa::io::{DatabaseSnapshot, Exporter, ImportOptions, Importer};
use common::{credit, day, debit, open_box, test_service, StandardRegistry};

const ENTRIES_CSV: &str = "\
date,document,counterparty,cost_type,description,credit,debit
01/03/2024,,,,Reforço de caixa,\"1.500,00\",
2024-03-02,NF 881,Posto Rodovia,Combustível,Diesel S10,,\"412,37\"
2024-03-02,CP 12,Pedágio SP-160,Pedágio,Ida,,18.90
";

#[tokio::test]
async fn test_import_entries_replaces_box_entries() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardRegistry::create(&service).await?;
    let (_, reference) = open_box(&service, StandardRegistry::MARIA, "2024-03-01", "Santos").await?;
    service
        .save_entries(&reference, vec![credit("2024-03-01", 99)])
        .await?;

    let importer = Importer::new(&service);
    let result = importer
        .import_entries_csv(&reference, ENTRIES_CSV.as_bytes(), ImportOptions::default())
        .await?;

    assert!(result.is_clean());
    assert_eq!(result.imported, 3);

    let details = service.get_cash_box_details(&reference).await?;
    assert_eq!(details.entries.len(), 3);
    assert_eq!(details.entries[1].counterparty.as_deref(), Some("Posto Rodovia"));
    assert_eq!(details.movements.credits, 150000);
    assert_eq!(details.movements.debits, 41237 + 1890);
    assert_eq!(details.cash_box.closing_balance, 150000 - 41237 - 1890);

    Ok(())
}

#[tokio::test]
async fn test_import_with_errors_changes_nothing() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardRegistry::create(&service).await?;
    let (_, reference) = open_box(&service, StandardRegistry::MARIA, "2024-03-01", "Santos").await?;
    service
        .save_entries(&reference, vec![debit("2024-03-01", 700)])
        .await?;

    let csv = "date,description,credit,debit\n2024-03-01,ok,10,\n31/02/2024,data ruim,,5\n";
    let result = Importer::new(&service)
        .import_entries_csv(&reference, csv.as_bytes(), ImportOptions::default())
        .await?;

    assert_eq!(result.imported, 0);
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].line, 3);

    let details = service.get_cash_box_details(&reference).await?;
    assert_eq!(details.entries.len(), 1);
    assert_eq!(details.cash_box.closing_balance, -700);

    Ok(())
}

#[tokio::test]
async fn test_dry_run_import_only_validates() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardRegistry::create(&service).await?;
    let (_, reference) = open_box(&service, StandardRegistry::MARIA, "2024-03-01", "Santos").await?;

    let result = Importer::new(&service)
        .import_entries_csv(
            &reference,
            ENTRIES_CSV.as_bytes(),
            ImportOptions {
                dry_run: true,
                ..Default::default()
            },
        )
        .await?;

    assert_eq!(result.imported, 3);
    assert!(service
        .get_cash_box_details(&reference)
        .await?
        .entries
        .is_empty());

    Ok(())
}

#[tokio::test]
async fn test_exported_entries_import_back() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardRegistry::create(&service).await?;
    let (_, source) = open_box(&service, StandardRegistry::MARIA, "2024-03-01", "Santos").await?;
    let (_, target) = open_box(&service, StandardRegistry::JOAO, "2024-03-01", "Santos").await?;
    Importer::new(&service)
        .import_entries_csv(&source, ENTRIES_CSV.as_bytes(), ImportOptions::default())
        .await?;

    let mut buffer = Vec::new();
    let count = Exporter::new(&service)
        .export_entries_csv(&source, &mut buffer)
        .await?;
    assert_eq!(count, 3);

    Importer::new(&service)
        .import_entries_csv(&target, buffer.as_slice(), ImportOptions::default())
        .await?;

    let source = service.get_cash_box_details(&source).await?;
    let target = service.get_cash_box_details(&target).await?;
    assert_eq!(source.movements, target.movements);
    assert_eq!(target.entries[2].document_number.as_deref(), Some("CP 12"));
    assert_eq!(target.entries[0].date, day("2024-03-01"));

    Ok(())
}

#[tokio::test]
async fn test_export_cash_boxes_and_advances_csv() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardRegistry::create(&service).await?;
    let (_, reference) = open_box(&service, StandardRegistry::MARIA, "2024-03-01", "Santos").await?;
    service
        .save_entries(&reference, vec![credit("2024-03-01", 123456)])
        .await?;
    let advance = service
        .create_advance(StandardRegistry::MARIA, day("2024-03-01"), 5000, None)
        .await?;
    service.link_advance(advance.id, &reference).await?;

    let exporter = Exporter::new(&service);

    let mut boxes = Vec::new();
    assert_eq!(exporter.export_cash_boxes_csv(&mut boxes).await?, 1);
    let boxes = String::from_utf8(boxes)?;
    let mut lines = boxes.lines();
    assert!(lines.next().unwrap().starts_with("id,employee,number"));
    let row = lines.next().unwrap();
    assert!(row.contains("Maria Souza,1,2024-03-01,Santos"));
    assert!(row.ends_with("0.00,1234.56,0.00,50.00,1284.56,false"));

    let mut advances = Vec::new();
    assert_eq!(exporter.export_advances_csv(&mut advances).await?, 1);
    let advances = String::from_utf8(advances)?;
    assert!(advances.contains(&format!("{},Maria Souza,2024-03-01,50.00", advance.id)));

    Ok(())
}

#[tokio::test]
async fn test_full_json_export() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardRegistry::create(&service).await?;
    let (_, reference) = open_box(&service, StandardRegistry::MARIA, "2024-03-01", "Santos").await?;
    service
        .save_entries(&reference, vec![credit("2024-03-01", 100), debit("2024-03-01", 40)])
        .await?;
    let (_, hidden) = open_box(&service, StandardRegistry::JOAO, "2024-03-02", "Campinas").await?;
    service.hide_cash_box(&hidden).await?;
    service
        .create_advance(StandardRegistry::JOAO, day("2024-03-02"), 300, None)
        .await?;

    let mut buffer = Vec::new();
    let snapshot = Exporter::new(&service).export_full_json(&mut buffer).await?;
    assert_eq!(snapshot.companies.len(), 1);
    assert_eq!(snapshot.employees.len(), 2);
    assert_eq!(snapshot.vehicles.len(), 1);
    assert_eq!(snapshot.cash_boxes.len(), 2);
    assert_eq!(snapshot.entries.len(), 2);
    assert_eq!(snapshot.advances.len(), 1);

    let parsed: DatabaseSnapshot = serde_json::from_slice(&buffer)?;
    assert_eq!(parsed.cash_boxes.len(), 2);
    assert!(parsed.cash_boxes.iter().any(|b| b.hidden_at.is_some()));

    Ok(())
}
