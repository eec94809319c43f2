//! Deletion pipeline tests
//!
//! 用可控的存储替身测试背压、重试、死信和关闭时的排空。

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tokio::sync::Semaphore;

use shorty::errors::{Result, ShortyError};
use shorty::services::{
    BackpressurePolicy, DeletionPipeline, DeletionRequest, PipelineOptions,
};
use shorty::storage::{OwnedUrl, OwnerId, Shortened, Storage, StorageStats, TableStore};
use shorty::utils::CodeGenerator;

/// 只实现 soft_delete 的替身：
/// `gate` 控制何时放行，前 `failures` 次调用失败，所有成功调用按顺序记录
struct StubStorage {
    gate: Option<Semaphore>,
    failures: AtomicU32,
    applied: Mutex<Vec<(String, OwnerId)>>,
    calls: AtomicU32,
}

impl StubStorage {
    fn open() -> Self {
        Self {
            gate: None,
            failures: AtomicU32::new(0),
            applied: Mutex::new(Vec::new()),
            calls: AtomicU32::new(0),
        }
    }

    fn gated() -> Self {
        Self {
            gate: Some(Semaphore::new(0)),
            ..Self::open()
        }
    }

    fn failing(times: u32) -> Self {
        Self {
            failures: AtomicU32::new(times),
            ..Self::open()
        }
    }

    fn release(&self, permits: usize) {
        if let Some(gate) = &self.gate {
            gate.add_permits(permits);
        }
    }

    fn applied_codes(&self) -> Vec<String> {
        self.applied.lock().iter().map(|(c, _)| c.clone()).collect()
    }
}

#[async_trait]
impl Storage for StubStorage {
    async fn save(&self, _owner: OwnerId, _code: &str, _long_url: &str) -> Result<()> {
        Ok(())
    }

    async fn get_or_create_short_code(
        &self,
        _owner: OwnerId,
        _long_url: &str,
    ) -> Result<Shortened> {
        Err(ShortyError::internal("not used"))
    }

    async fn resolve(&self, code: &str) -> Result<String> {
        Err(ShortyError::not_found(code))
    }

    async fn list_owned(&self, _owner: OwnerId, _base_addr: &str) -> Result<Vec<OwnedUrl>> {
        Ok(Vec::new())
    }

    async fn soft_delete(&self, pairs: &HashMap<String, OwnerId>) -> Result<()> {
        if let Some(gate) = &self.gate {
            gate.acquire()
                .await
                .map_err(|e| ShortyError::internal(e.to_string()))?
                .forget();
        }
        self.calls.fetch_add(1, Ordering::SeqCst);

        let remaining = self.failures.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures.store(remaining - 1, Ordering::SeqCst);
            return Err(ShortyError::unavailable("database is locked"));
        }

        let mut applied = self.applied.lock();
        for (code, owner) in pairs {
            applied.push((code.clone(), *owner));
        }
        Ok(())
    }

    async fn recover_last_sequence(&self) -> Result<u64> {
        Ok(0)
    }

    async fn recover_last_owner(&self) -> Result<u64> {
        Ok(0)
    }

    async fn stats(&self) -> Result<StorageStats> {
        Ok(StorageStats::default())
    }

    async fn is_ready(&self) -> bool {
        true
    }

    fn backend_name(&self) -> &'static str {
        "stub"
    }
}

fn options(capacity: usize, policy: BackpressurePolicy, max_retries: u32) -> PipelineOptions {
    PipelineOptions {
        capacity,
        policy,
        max_retries,
        retry_delay: Duration::from_millis(5),
        dead_letter_capacity: 10,
    }
}

const GRACE: Duration = Duration::from_secs(5);

#[tokio::test]
async fn test_requests_applied_in_submission_order() {
    let stub = Arc::new(StubStorage::open());
    let pipeline = DeletionPipeline::start(
        stub.clone(),
        options(16, BackpressurePolicy::Block, 0),
    );

    let accepted = pipeline
        .submit_many(1, ["aaaaaa", "bbbbbb", "cccccc"])
        .await
        .unwrap();
    assert_eq!(accepted, 3);

    let report = pipeline.shutdown(GRACE).await;
    assert!(!report.timed_out);
    assert_eq!(report.unapplied, 0);
    assert_eq!(stub.applied_codes(), vec!["aaaaaa", "bbbbbb", "cccccc"]);

    let stats = pipeline.stats();
    assert_eq!(stats.submitted, 3);
    assert_eq!(stats.applied, 3);
    assert_eq!(stats.dead_lettered, 0);
}

#[tokio::test]
async fn test_each_request_is_one_soft_delete_call() {
    let stub = Arc::new(StubStorage::open());
    let pipeline = DeletionPipeline::start(
        stub.clone(),
        options(16, BackpressurePolicy::Block, 0),
    );

    pipeline
        .submit(DeletionRequest::new("aaaaaa", 7))
        .await
        .unwrap();
    pipeline
        .submit(DeletionRequest::new("aaaaaa", 8))
        .await
        .unwrap();
    pipeline.shutdown(GRACE).await;

    assert_eq!(stub.calls.load(Ordering::SeqCst), 2);
    assert_eq!(
        *stub.applied.lock(),
        vec![("aaaaaa".to_string(), 7), ("aaaaaa".to_string(), 8)]
    );
}

#[tokio::test]
async fn test_reject_policy_fails_fast_when_full() {
    let stub = Arc::new(StubStorage::gated());
    let pipeline = DeletionPipeline::start(
        stub.clone(),
        options(1, BackpressurePolicy::Reject, 0),
    );

    // 第一个被消费者取走并卡在 gate 上，第二个占满队列
    pipeline
        .submit(DeletionRequest::new("aaaaaa", 1))
        .await
        .unwrap();
    let mut queued = false;
    for _ in 0..50 {
        if pipeline.submit(DeletionRequest::new("bbbbbb", 1)).await.is_ok() {
            queued = true;
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert!(queued);

    let err = pipeline
        .submit(DeletionRequest::new("cccccc", 1))
        .await
        .unwrap_err();
    assert!(matches!(err, ShortyError::Unavailable(_)));
    assert!(err.is_retryable());
    assert_eq!(pipeline.stats().submitted, 2);

    stub.release(2);
    let report = pipeline.shutdown(GRACE).await;
    assert_eq!(report.unapplied, 0);
    assert_eq!(stub.applied_codes(), vec!["aaaaaa", "bbbbbb"]);
}

#[tokio::test]
async fn test_block_policy_waits_for_room() {
    let stub = Arc::new(StubStorage::gated());
    let pipeline = Arc::new(DeletionPipeline::start(
        stub.clone(),
        options(1, BackpressurePolicy::Block, 0),
    ));

    let submitter = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.submit_many(1, ["a", "b", "c", "d"]).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(!submitter.is_finished());

    stub.release(4);
    assert_eq!(submitter.await.unwrap().unwrap(), 4);

    pipeline.shutdown(GRACE).await;
    assert_eq!(stub.applied_codes(), vec!["a", "b", "c", "d"]);
}

#[tokio::test]
async fn test_transient_failures_are_retried() {
    let stub = Arc::new(StubStorage::failing(2));
    let pipeline = DeletionPipeline::start(
        stub.clone(),
        options(8, BackpressurePolicy::Block, 3),
    );

    pipeline
        .submit(DeletionRequest::new("aaaaaa", 1))
        .await
        .unwrap();
    pipeline.shutdown(GRACE).await;

    assert_eq!(stub.applied_codes(), vec!["aaaaaa"]);
    let stats = pipeline.stats();
    assert_eq!(stats.retried, 2);
    assert_eq!(stats.applied, 1);
    assert!(pipeline.dead_letters().is_empty());
}

#[tokio::test]
async fn test_exhausted_retries_go_to_dead_letters() {
    let stub = Arc::new(StubStorage::failing(3));
    let pipeline = DeletionPipeline::start(
        stub.clone(),
        options(8, BackpressurePolicy::Block, 2),
    );

    pipeline
        .submit(DeletionRequest::new("aaaaaa", 4))
        .await
        .unwrap();
    pipeline
        .submit(DeletionRequest::new("bbbbbb", 4))
        .await
        .unwrap();
    let report = pipeline.shutdown(GRACE).await;

    // 第一个耗尽三次尝试，第二个一次成功
    assert_eq!(report.unapplied, 0);
    assert_eq!(stub.applied_codes(), vec!["bbbbbb"]);

    let letters = pipeline.dead_letters();
    assert_eq!(letters.len(), 1);
    assert_eq!(letters[0].request, DeletionRequest::new("aaaaaa", 4));
    assert_eq!(letters[0].attempts, 3);
    assert!(letters[0].error.contains("database is locked"));
    assert_eq!(pipeline.stats().dead_lettered, 1);
}

#[tokio::test]
async fn test_requeue_dead_letters() {
    let stub = Arc::new(StubStorage::failing(1));
    let pipeline = DeletionPipeline::start(
        stub.clone(),
        options(8, BackpressurePolicy::Block, 0),
    );

    pipeline
        .submit(DeletionRequest::new("aaaaaa", 1))
        .await
        .unwrap();
    for _ in 0..100 {
        if !pipeline.dead_letters().is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(pipeline.dead_letters().len(), 1);

    assert_eq!(pipeline.requeue_dead_letters().unwrap(), 1);
    assert!(pipeline.dead_letters().is_empty());

    let report = pipeline.shutdown(GRACE).await;
    assert_eq!(report.unapplied, 0);
    assert_eq!(stub.applied_codes(), vec!["aaaaaa"]);
}

#[tokio::test]
async fn test_shutdown_drains_accepted_requests() {
    let store = Arc::new(TableStore::new(CodeGenerator::default()));
    for code in ["aaaaaa", "bbbbbb", "cccccc"] {
        store
            .save(2, code, &format!("https://{}.example", code))
            .await
            .unwrap();
    }

    let pipeline = DeletionPipeline::start(
        store.clone(),
        options(8, BackpressurePolicy::Block, 0),
    );
    pipeline
        .submit_many(2, ["aaaaaa", "bbbbbb", "cccccc"])
        .await
        .unwrap();

    let report = pipeline.shutdown(GRACE).await;
    assert!(!report.timed_out);
    assert_eq!(report.unapplied, 0);

    for code in ["aaaaaa", "bbbbbb", "cccccc"] {
        assert!(matches!(
            store.resolve(code).await,
            Err(ShortyError::Gone(_))
        ));
    }
}

#[tokio::test]
async fn test_shutdown_times_out_on_stuck_storage() {
    let stub = Arc::new(StubStorage::gated());
    let pipeline = DeletionPipeline::start(
        stub.clone(),
        options(8, BackpressurePolicy::Block, 0),
    );

    pipeline
        .submit_many(1, ["aaaaaa", "bbbbbb"])
        .await
        .unwrap();
    let report = pipeline.shutdown(Duration::from_millis(100)).await;

    assert!(report.timed_out);
    assert_eq!(report.drained, 0);
    assert_eq!(report.unapplied, 2);
    assert!(stub.applied_codes().is_empty());
}

#[tokio::test]
async fn test_submit_after_shutdown_is_unavailable() {
    let stub = Arc::new(StubStorage::open());
    let pipeline = DeletionPipeline::start(
        stub.clone(),
        options(8, BackpressurePolicy::Block, 0),
    );
    pipeline.shutdown(GRACE).await;

    assert!(matches!(
        pipeline.submit(DeletionRequest::new("aaaaaa", 1)).await,
        Err(ShortyError::Unavailable(_))
    ));
    assert!(matches!(
        pipeline.requeue_dead_letters(),
        Err(ShortyError::Unavailable(_))
    ));
    assert_eq!(pipeline.stats().submitted, 0);
}

// Ctrl+C 打断了第一次排空，第二次关闭仍要等消费者把队列处理完
#[tokio::test]
async fn test_interrupted_shutdown_keeps_consumer_for_next_call() {
    let stub = Arc::new(StubStorage::gated());
    let pipeline = DeletionPipeline::start(
        stub.clone(),
        options(8, BackpressurePolicy::Block, 0),
    );
    pipeline
        .submit_many(1, ["aaaaaa", "bbbbbb"])
        .await
        .unwrap();

    let first = tokio::time::timeout(Duration::from_millis(50), pipeline.shutdown(GRACE)).await;
    assert!(first.is_err());

    stub.release(2);
    let report = pipeline.shutdown(GRACE).await;
    assert!(!report.timed_out);
    assert_eq!(report.drained, 2);
    assert_eq!(report.unapplied, 0);
    assert_eq!(stub.applied_codes(), vec!["aaaaaa", "bbbbbb"]);
}

#[tokio::test]
async fn test_concurrent_shutdowns_both_wait_for_drain() {
    let stub = Arc::new(StubStorage::gated());
    let pipeline = Arc::new(DeletionPipeline::start(
        stub.clone(),
        options(8, BackpressurePolicy::Block, 0),
    ));
    pipeline.submit_many(1, ["aaaaaa"]).await.unwrap();

    let other = {
        let pipeline = Arc::clone(&pipeline);
        tokio::spawn(async move { pipeline.shutdown(GRACE).await })
    };
    tokio::time::sleep(Duration::from_millis(20)).await;
    stub.release(1);

    let report = pipeline.shutdown(GRACE).await;
    let other = other.await.unwrap();

    for report in [report, other] {
        assert!(!report.timed_out);
        assert_eq!(report.unapplied, 0);
    }
    assert_eq!(stub.applied_codes(), vec!["aaaaaa"]);
}
