//! ShortenerService tests
//!
//! 门面层：URL 校验、短码形状检查、会话分配、异步删除，以及重启后 OwnerId 的恢复。

use std::sync::Arc;
use std::time::Duration;

use shorty::config::StaticConfig;
use shorty::errors::ShortyError;
use shorty::services::{OwnerRegistry, PipelineOptions, ShortenerService};
use shorty::storage::{BatchItem, LogStore, Storage, TableStore};
use shorty::utils::CodeGenerator;
use tempfile::TempDir;

const BASE: &str = "http://short.test/";
const GRACE: Duration = Duration::from_secs(5);

async fn memory_service() -> ShortenerService {
    let storage: Arc<dyn Storage> = Arc::new(TableStore::new(CodeGenerator::default()));
    ShortenerService::with_storage(
        storage,
        PipelineOptions::default(),
        BASE,
    )
    .await
    .unwrap()
}

#[tokio::test]
async fn test_shorten_and_resolve() {
    let service = memory_service().await;
    let (session, issued) = service.session(None);
    assert!(issued);

    let outcome = service
        .shorten(session.owner_id, "  https://example.com/page  ")
        .await
        .unwrap();
    assert!(outcome.created);
    assert_eq!(
        outcome.short_url,
        format!("http://short.test/{}", outcome.code)
    );
    assert_eq!(
        service.resolve(&outcome.code).await.unwrap(),
        "https://example.com/page"
    );

    let again = service
        .shorten(session.owner_id, "https://example.com/page")
        .await
        .unwrap();
    assert!(!again.created);
    assert_eq!(again.code, outcome.code);
}

#[tokio::test]
async fn test_shorten_rejects_invalid_urls() {
    let service = memory_service().await;

    for bad in [
        "",
        "example.com",
        "javascript:alert(1)",
        "ftp://example.com",
        "http://",
    ] {
        assert!(
            matches!(
                service.shorten(1, bad).await,
                Err(ShortyError::Validation(_))
            ),
            "expected validation error for {:?}",
            bad
        );
    }

    let long = format!("https://example.com/{}", "a".repeat(9000));
    assert!(matches!(
        service.shorten(1, &long).await,
        Err(ShortyError::Validation(_))
    ));
}

#[tokio::test]
async fn test_malformed_codes_are_not_found() {
    let service = memory_service().await;

    for code in ["", "abc", "abcdefg", "ab-123", "../etc"] {
        assert!(matches!(
            service.resolve(code).await,
            Err(ShortyError::NotFound(_))
        ));
    }
}

#[tokio::test]
async fn test_session_tokens() {
    let service = memory_service().await;

    let (first, issued) = service.session(None);
    assert!(issued);
    let (same, issued) = service.session(Some(&first.token));
    assert!(!issued);
    assert_eq!(same, first);

    let (fresh, issued) = service.session(Some("forged-token"));
    assert!(issued);
    assert_ne!(fresh.owner_id, first.owner_id);
    assert_eq!(service.registry().lookup("forged-token"), None);
}

#[tokio::test]
async fn test_delete_is_asynchronous_and_owner_scoped() {
    let service = memory_service().await;
    let mine = service.shorten(1, "https://mine.example").await.unwrap();
    let theirs = service.shorten(2, "https://theirs.example").await.unwrap();

    let accepted = service
        .delete(1, vec![mine.code.clone(), theirs.code.clone()])
        .await
        .unwrap();
    assert_eq!(accepted, 2);

    let report = service.shutdown(GRACE).await;
    assert_eq!(report.unapplied, 0);

    assert!(matches!(
        service.resolve(&mine.code).await,
        Err(ShortyError::Gone(_))
    ));
    assert_eq!(
        service.resolve(&theirs.code).await.unwrap(),
        "https://theirs.example"
    );
    assert!(service.list_owned(1).await.unwrap().is_empty());
    assert_eq!(service.list_owned(2).await.unwrap().len(), 1);

    // 关闭后不再接受删除
    assert!(matches!(
        service.delete_one(2, &theirs.code).await,
        Err(ShortyError::Unavailable(_))
    ));
}

#[tokio::test]
async fn test_shorten_batch_uses_base_addr() {
    let service = memory_service().await;
    let items: Vec<BatchItem> = serde_json::from_str(
        r#"[
            {"correlation_id": "1", "original_url": "https://a.example"},
            {"correlation_id": "2", "original_url": "mailto:someone@example.com"}
        ]"#,
    )
    .unwrap();

    let results = service.shorten_batch(9, &items).await;
    assert!(results[0].is_ok());
    assert!(
        results[0]
            .outcome
            .as_ref()
            .unwrap()
            .short_url
            .starts_with("http://short.test/")
    );
    assert!(!results[1].is_ok());
}

#[tokio::test]
async fn test_status_reports_counts() {
    let service = memory_service().await;
    let (session, _) = service.session(None);
    service
        .shorten(session.owner_id, "https://a.example")
        .await
        .unwrap();

    let status = service.status().await.unwrap();
    assert_eq!(status.backend, "memory");
    assert!(status.ready);
    assert_eq!(status.storage.urls, 1);
    assert_eq!(status.active_sessions, 1);
    assert_eq!(status.last_owner, session.owner_id);
    assert_eq!(status.deletion.submitted, 0);
}

#[tokio::test]
async fn test_from_config_defaults_to_memory() {
    let config = StaticConfig::default();
    let service = ShortenerService::from_config(&config).await.unwrap();
    assert_eq!(service.storage().backend_name(), "memory");
    assert_eq!(service.base_addr(), config.server.base_addr());
    service.shutdown(GRACE).await;
}

#[tokio::test]
async fn test_from_config_rejects_bad_policy() {
    let mut config = StaticConfig::default();
    config.deletion.backpressure = "drop".into();
    assert!(matches!(
        ShortenerService::from_config(&config).await,
        Err(ShortyError::Config(_))
    ));
}

// 重启后新分配的 OwnerId 大于所有已持久化的 OwnerId
#[tokio::test]
async fn test_owner_ids_survive_restart() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("urls.log");

    let highest = {
        let storage: Arc<dyn Storage> =
            Arc::new(LogStore::open(&path, false, CodeGenerator::default()).unwrap());
        let service = ShortenerService::with_storage(
            storage,
            PipelineOptions::default(),
            BASE,
        )
        .await
        .unwrap();

        let mut highest = 0;
        for i in 0..3 {
            let (session, _) = service.session(None);
            service
                .shorten(session.owner_id, &format!("https://{}.example", i))
                .await
                .unwrap();
            highest = session.owner_id;
        }
        service.shutdown(GRACE).await;
        highest
    };

    let storage: Arc<dyn Storage> =
        Arc::new(LogStore::open(&path, false, CodeGenerator::default()).unwrap());
    let registry = OwnerRegistry::recover(&storage).await.unwrap();
    let next = registry.allocate_session();
    assert!(next.owner_id > highest);

    // 没有任何令牌能跨重启存活
    assert_eq!(registry.active_sessions(), 1);
}

// 改了码长之后，旧长度的短码仍能解析
#[tokio::test]
async fn test_codes_resolve_after_length_change() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("urls.log");
    {
        let store = LogStore::open(&path, false, CodeGenerator::default()).unwrap();
        store.save(1, "abc123", "https://a.example").await.unwrap();
    }

    let storage: Arc<dyn Storage> =
        Arc::new(LogStore::open(&path, false, CodeGenerator::new(8, 16)).unwrap());
    let service = ShortenerService::with_storage(storage, PipelineOptions::default(), BASE)
        .await
        .unwrap();

    assert_eq!(
        service.resolve("abc123").await.unwrap(),
        "https://a.example"
    );
    let fresh = service.shorten(1, "https://b.example").await.unwrap();
    assert_eq!(fresh.code.len(), 8);
    assert_eq!(service.resolve(&fresh.code).await.unwrap(), "https://b.example");
    service.shutdown(GRACE).await;
}
