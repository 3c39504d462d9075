mod common;

use anyhow::Result;
use caixa::application::{AppError, CashBoxRef, CashBoxService, ReportOptions};
use caixa::domain::NewLedgerEntry;
use common::{day, open_box, test_service, StandardRegistry};
use lopdf::content::Content;
use lopdf::{Document, Object};

fn entries(count: usize) -> Vec<NewLedgerEntry> {
    (0..count)
        .map(|i| {
            let entry = NewLedgerEntry::new(day("2024-03-01"))
                .with_document_number(format!("NF {}", i + 1))
                .with_counterparty("Posto Rodovia")
                .with_cost_type("Combustível")
                .with_description("Abastecimento");
            if i % 2 == 0 {
                entry.with_debit(10000)
            } else {
                entry.with_credit(2500)
            }
        })
        .collect()
}

/// Text drawn on each page, one item per text operation.
fn page_texts(bytes: &[u8]) -> Result<Vec<Vec<String>>> {
    let doc = Document::load_mem(bytes)?;
    let mut pages = Vec::new();
    for (_, page_id) in doc.get_pages() {
        let content = Content::decode(&doc.get_page_content(page_id)?)?;
        let texts = content
            .operations
            .iter()
            .filter(|op| op.operator == "Tj")
            .filter_map(|op| match op.operands.first() {
                Some(Object::String(bytes, _)) => {
                    Some(bytes.iter().map(|b| char::from(*b)).collect())
                }
                _ => None,
            })
            .collect();
        pages.push(texts);
    }
    Ok(pages)
}

async fn box_with_entries(service: &CashBoxService, count: usize) -> Result<CashBoxRef> {
    let (_, reference) = open_box(service, StandardRegistry::MARIA, "2024-03-01", "Santos").await?;
    service.save_entries(&reference, entries(count)).await?;
    Ok(reference)
}

#[tokio::test]
async fn test_forty_entries_fill_exactly_two_pages() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardRegistry::create(&service).await?;
    let reference = box_with_entries(&service, 40).await?;

    let document = service.settlement_document(&reference).await?;
    assert_eq!(document.page_count, 2);
    assert_eq!(document.file_name, "caixa-maria-souza-001.pdf");

    let pages = page_texts(&document.bytes)?;
    assert_eq!(pages.len(), 2);
    for texts in &pages {
        // column headers on every page
        assert!(texts.iter().any(|t| t == "Fornecedor"));
        assert!(texts.iter().any(|t| t == "Tipo de custo"));
    }
    // continuation marker only before the last page, summary only on it
    assert!(pages[0].iter().any(|t| t.starts_with("Continua na pr")));
    assert!(!pages[1].iter().any(|t| t.starts_with("Continua na pr")));
    assert!(!pages[0].iter().any(|t| t == "Saldo final"));
    assert!(pages[1].iter().any(|t| t == "Saldo final"));

    Ok(())
}

#[tokio::test]
async fn test_one_more_entry_starts_a_new_page() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardRegistry::create(&service).await?;
    let reference = box_with_entries(&service, 41).await?;

    let document = service.settlement_document(&reference).await?;
    assert_eq!(document.page_count, 3);
    assert_eq!(Document::load_mem(&document.bytes)?.get_pages().len(), 3);

    Ok(())
}

#[tokio::test]
async fn test_empty_box_prints_one_page_with_summary() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardRegistry::create(&service).await?;
    let (_, reference) = open_box(&service, StandardRegistry::JOAO, "2024-03-01", "Santos").await?;

    let document = service.settlement_document(&reference).await?;
    assert_eq!(document.page_count, 1);

    let pages = page_texts(&document.bytes)?;
    assert!(pages[0].iter().any(|t| t == "Saldo final"));
    assert!(pages[0].iter().any(|t| t == "R$ 0,00"));
    // João has no document on file
    assert!(pages[0].iter().any(|t| t == "N\u{e3}o informado"));

    Ok(())
}

#[tokio::test]
async fn test_amounts_use_brazilian_format() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardRegistry::create(&service).await?;
    let (_, reference) = open_box(&service, StandardRegistry::MARIA, "2024-03-01", "Santos").await?;
    service
        .save_entries(
            &reference,
            vec![
                NewLedgerEntry::new(day("2024-03-01")).with_credit(123456),
                NewLedgerEntry::new(day("2024-03-02")).with_debit(5000),
            ],
        )
        .await?;

    let document = service.settlement_document(&reference).await?;
    let texts = &page_texts(&document.bytes)?[0];
    assert!(texts.iter().any(|t| t == "1.234,56"));
    assert!(texts.iter().any(|t| t == "-50,00"));
    assert!(texts.iter().any(|t| t == "01/03/2024"));
    assert!(texts.iter().any(|t| t == "R$ 1.184,56"));

    Ok(())
}

#[tokio::test]
async fn test_configured_rows_per_page_and_issuer() -> Result<()> {
    let (service, temp) = test_service().await?;
    StandardRegistry::create(&service).await?;
    let reference = box_with_entries(&service, 25).await?;
    drop(service);

    let service = CashBoxService::connect(temp.path().join("test.db").to_str().unwrap())
        .await?
        .with_report_options(ReportOptions {
            rows_per_page: Some(10),
            issuer: Some("Transportes Andrade Ltda".into()),
            ..Default::default()
        });

    let first = service.settlement_document(&reference).await?;
    let second = service.settlement_document(&reference).await?;
    assert_eq!(first.page_count, 3);
    // same input, same pages
    assert_eq!(page_texts(&first.bytes)?, page_texts(&second.bytes)?);
    assert!(page_texts(&first.bytes)?[0]
        .iter()
        .any(|t| t == "Transportes Andrade Ltda"));

    Ok(())
}

#[tokio::test]
async fn test_missing_box_is_not_found() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardRegistry::create(&service).await?;

    let result = service
        .settlement_document(&CashBoxRef::new(StandardRegistry::MARIA, 7))
        .await;
    assert!(matches!(result, Err(AppError::CashBoxNotFound(_))));

    Ok(())
}
