mod common;

use anyhow::Result;
use caixa::application::{AdvanceChanges, AppError};
use common::{credit, day, open_box, test_service, StandardRegistry};
use uuid::Uuid;

#[tokio::test]
async fn test_linked_advance_adds_to_the_balance() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardRegistry::create(&service).await?;

    let (_, reference) = open_box(&service, StandardRegistry::MARIA, "2024-03-01", "Santos").await?;
    service
        .save_entries(&reference, vec![credit("2024-03-01", 1000)])
        .await?;

    let advance = service
        .create_advance(
            StandardRegistry::MARIA,
            day("2024-02-29"),
            50000,
            Some("diárias".into()),
        )
        .await?;
    assert!(!advance.is_linked());

    let linked = service.link_advance(advance.id, &reference).await?;
    assert!(linked.is_linked());
    assert_eq!(service.get_cash_box(&reference).await?.closing_balance, 51000);

    // linking again to the same box is a no-op
    service.link_advance(advance.id, &reference).await?;
    assert_eq!(service.get_cash_box(&reference).await?.closing_balance, 51000);

    let unlinked = service.unlink_advance(advance.id).await?;
    assert!(!unlinked.is_linked());
    assert_eq!(service.get_cash_box(&reference).await?.closing_balance, 1000);

    Ok(())
}

#[tokio::test]
async fn test_link_to_another_employees_box_is_rejected() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardRegistry::create(&service).await?;

    let (_, joao_box) = open_box(&service, StandardRegistry::JOAO, "2024-03-01", "Santos").await?;
    let advance = service
        .create_advance(StandardRegistry::MARIA, day("2024-03-01"), 1000, None)
        .await?;

    let result = service.link_advance(advance.id, &joao_box).await;
    assert!(matches!(
        result,
        Err(AppError::AdvanceEmployeeMismatch { .. })
    ));
    assert!(!service.get_advance(advance.id).await?.is_linked());

    Ok(())
}

#[tokio::test]
async fn test_advance_links_to_one_box_at_a_time() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardRegistry::create(&service).await?;

    let (_, first) = open_box(&service, StandardRegistry::MARIA, "2024-03-01", "Santos").await?;
    let (_, second) = open_box(&service, StandardRegistry::MARIA, "2024-03-05", "Campinas").await?;
    let advance = service
        .create_advance(StandardRegistry::MARIA, day("2024-03-01"), 1000, None)
        .await?;

    service.link_advance(advance.id, &first).await?;
    let result = service.link_advance(advance.id, &second).await;
    assert!(matches!(result, Err(AppError::AdvanceAlreadyLinked { .. })));

    // the carried balance reaches the second box
    assert_eq!(service.get_cash_box(&second).await?.opening_balance, 1000);

    Ok(())
}

#[tokio::test]
async fn test_linked_advance_is_locked() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardRegistry::create(&service).await?;

    let (_, reference) = open_box(&service, StandardRegistry::MARIA, "2024-03-01", "Santos").await?;
    let advance = service
        .create_advance(StandardRegistry::MARIA, day("2024-03-01"), 1000, None)
        .await?;
    service.link_advance(advance.id, &reference).await?;

    let update = service
        .update_advance(
            advance.id,
            AdvanceChanges {
                amount: Some(2000),
                ..Default::default()
            },
        )
        .await;
    assert!(matches!(update, Err(AppError::AdvanceLocked { .. })));
    assert!(matches!(
        service.delete_advance(advance.id).await,
        Err(AppError::AdvanceLocked { .. })
    ));

    service.unlink_advance(advance.id).await?;
    let updated = service
        .update_advance(
            advance.id,
            AdvanceChanges {
                amount: Some(2000),
                note: Some(Some("corrigido".into())),
                ..Default::default()
            },
        )
        .await?;
    assert_eq!(updated.amount, 2000);
    assert_eq!(updated.note.as_deref(), Some("corrigido"));

    service.delete_advance(advance.id).await?;
    assert!(matches!(
        service.get_advance(advance.id).await,
        Err(AppError::AdvanceNotFound(_))
    ));

    Ok(())
}

#[tokio::test]
async fn test_hidden_box_rejects_links() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardRegistry::create(&service).await?;

    let (_, reference) = open_box(&service, StandardRegistry::MARIA, "2024-03-01", "Santos").await?;
    service.hide_cash_box(&reference).await?;
    let advance = service
        .create_advance(StandardRegistry::MARIA, day("2024-03-01"), 1000, None)
        .await?;

    assert!(matches!(
        service.link_advance(advance.id, &reference).await,
        Err(AppError::CashBoxHidden(_))
    ));

    Ok(())
}

#[tokio::test]
async fn test_advance_amount_must_be_positive() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardRegistry::create(&service).await?;

    for amount in [0, -100] {
        let result = service
            .create_advance(StandardRegistry::MARIA, day("2024-03-01"), amount, None)
            .await;
        assert!(matches!(result, Err(AppError::InvalidAmount(_))));
    }

    assert!(matches!(
        service.get_advance(Uuid::new_v4()).await,
        Err(AppError::AdvanceNotFound(_))
    ));

    Ok(())
}

#[tokio::test]
async fn test_list_advances() -> Result<()> {
    let (service, _temp) = test_service().await?;
    StandardRegistry::create(&service).await?;

    let (_, reference) = open_box(&service, StandardRegistry::MARIA, "2024-03-01", "Santos").await?;
    let linked = service
        .create_advance(StandardRegistry::MARIA, day("2024-03-01"), 1000, None)
        .await?;
    service.link_advance(linked.id, &reference).await?;
    service
        .create_advance(StandardRegistry::MARIA, day("2024-03-02"), 2000, None)
        .await?;
    service
        .create_advance(StandardRegistry::JOAO, day("2024-03-03"), 3000, None)
        .await?;

    assert_eq!(service.list_advances(None, false).await?.len(), 3);
    assert_eq!(
        service
            .list_advances(Some(StandardRegistry::MARIA), false)
            .await?
            .len(),
        2
    );
    let free = service
        .list_advances(Some(StandardRegistry::MARIA), true)
        .await?;
    assert_eq!(free.len(), 1);
    assert_eq!(free[0].amount, 2000);

    Ok(())
}
