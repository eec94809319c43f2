//! 异步软删除管道
//!
//! - 有界 mpsc 队列，提交在调用方自己的任务里完成，不为每一项 spawn
//! - 恰好一个后台消费者，每个请求调用一次 `soft_delete`
//! - 失败按固定间隔重试，仍失败则进入有界死信队列（最旧的被挤出）
//! - `shutdown` 先拒绝新提交，再在宽限期内排空队列，超时则中止消费者
//!
//! 删除失败从不返回给提交者，只记录日志、计数和死信。

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::DeletionConfig;
use crate::errors::{Result, ShortyError};
use crate::storage::{OwnerId, Storage};

/// 队列满时的处理方式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackpressurePolicy {
    /// 等待队列出现空位
    Block,
    /// 立即失败，返回可重试的 Unavailable
    Reject,
}

impl FromStr for BackpressurePolicy {
    type Err = ShortyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "block" => Ok(BackpressurePolicy::Block),
            "reject" => Ok(BackpressurePolicy::Reject),
            other => Err(ShortyError::config(format!(
                "Unknown backpressure policy: {} (expected block or reject)",
                other
            ))),
        }
    }
}

impl fmt::Display for BackpressurePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackpressurePolicy::Block => f.write_str("block"),
            BackpressurePolicy::Reject => f.write_str("reject"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeletionRequest {
    pub short_code: String,
    pub owner_id: OwnerId,
}

impl DeletionRequest {
    pub fn new(short_code: impl Into<String>, owner_id: OwnerId) -> Self {
        Self {
            short_code: short_code.into(),
            owner_id,
        }
    }
}

/// 重试耗尽的删除请求
#[derive(Debug, Clone, Serialize)]
pub struct DeadLetter {
    pub request: DeletionRequest,
    pub error: String,
    pub attempts: u32,
    pub failed_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct PipelineOptions {
    pub capacity: usize,
    pub policy: BackpressurePolicy,
    pub max_retries: u32,
    pub retry_delay: Duration,
    pub dead_letter_capacity: usize,
}

impl PipelineOptions {
    pub fn from_config(config: &DeletionConfig) -> Result<Self> {
        Ok(Self {
            capacity: config.queue_capacity.max(1),
            policy: config.backpressure.parse()?,
            max_retries: config.max_retries,
            retry_delay: Duration::from_millis(config.retry_delay_ms),
            dead_letter_capacity: config.dead_letter_capacity,
        })
    }
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            capacity: 500,
            policy: BackpressurePolicy::Block,
            max_retries: 3,
            retry_delay: Duration::from_millis(200),
            dead_letter_capacity: 1000,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PipelineStats {
    pub submitted: u64,
    pub applied: u64,
    pub retried: u64,
    pub dead_lettered: u64,
    pub queued: usize,
    pub dead_letters: usize,
}

/// `shutdown` 的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DrainReport {
    /// 关闭开始后应用成功的请求数
    pub drained: u64,
    /// 已接受但既未应用也未进入死信的请求数
    pub unapplied: u64,
    pub timed_out: bool,
}

/// 管道内部共享状态
struct PipelineState {
    submitted: AtomicU64,
    applied: AtomicU64,
    retried: AtomicU64,
    dead_lettered: AtomicU64,
    dead_letters: Mutex<VecDeque<DeadLetter>>,
    dead_letter_capacity: usize,
    closed: AtomicBool,
    close_signal: Notify,
}

impl PipelineState {
    fn push_dead_letter(&self, letter: DeadLetter) {
        self.dead_lettered.fetch_add(1, Ordering::Relaxed);
        if self.dead_letter_capacity == 0 {
            return;
        }
        let mut letters = self.dead_letters.lock();
        while letters.len() >= self.dead_letter_capacity {
            if let Some(evicted) = letters.pop_front() {
                warn!(
                    "Dead letter for {} evicted (capacity {})",
                    evicted.request.short_code, self.dead_letter_capacity
                );
            }
        }
        letters.push_back(letter);
    }

    fn outstanding(&self) -> u64 {
        self.submitted.load(Ordering::SeqCst).saturating_sub(
            self.applied.load(Ordering::SeqCst) + self.dead_lettered.load(Ordering::SeqCst),
        )
    }
}

pub struct DeletionPipeline {
    sender: mpsc::Sender<DeletionRequest>,
    policy: BackpressurePolicy,
    state: Arc<PipelineState>,
    /// 排空期间一直留在槽位里，中途被取消的 shutdown 不会把它带走
    consumer: tokio::sync::Mutex<Option<JoinHandle<()>>>,
}

impl DeletionPipeline {
    /// 创建队列并启动唯一的消费者任务（需要在 tokio 运行时内调用）
    pub fn start(storage: Arc<dyn Storage>, options: PipelineOptions) -> Self {
        let (sender, receiver) = mpsc::channel(options.capacity.max(1));
        let state = Arc::new(PipelineState {
            submitted: AtomicU64::new(0),
            applied: AtomicU64::new(0),
            retried: AtomicU64::new(0),
            dead_lettered: AtomicU64::new(0),
            dead_letters: Mutex::new(VecDeque::new()),
            dead_letter_capacity: options.dead_letter_capacity,
            closed: AtomicBool::new(false),
            close_signal: Notify::new(),
        });

        info!(
            "Deletion pipeline started (capacity {}, policy {}, max retries {})",
            options.capacity, options.policy, options.max_retries
        );

        let consumer = tokio::spawn(run_consumer(
            receiver,
            storage,
            Arc::clone(&state),
            options.max_retries,
            options.retry_delay,
        ));

        Self {
            sender,
            policy: options.policy,
            state,
            consumer: tokio::sync::Mutex::new(Some(consumer)),
        }
    }

    pub fn policy(&self) -> BackpressurePolicy {
        self.policy
    }

    /// 提交一个删除请求。成功只代表已入队
    pub async fn submit(&self, request: DeletionRequest) -> Result<()> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(ShortyError::unavailable(
                "Deletion pipeline is shutting down",
            ));
        }

        // 先计数再发送，消费者不会看到 applied 超过 submitted
        self.state.submitted.fetch_add(1, Ordering::SeqCst);
        let sent = match self.policy {
            BackpressurePolicy::Block => self
                .sender
                .send(request)
                .await
                .map_err(|_| ShortyError::unavailable("Deletion pipeline is closed")),
            BackpressurePolicy::Reject => self.sender.try_send(request).map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => {
                    ShortyError::unavailable("Deletion queue is full, retry later")
                }
                mpsc::error::TrySendError::Closed(_) => {
                    ShortyError::unavailable("Deletion pipeline is closed")
                }
            }),
        };

        if sent.is_err() {
            self.state.submitted.fetch_sub(1, Ordering::SeqCst);
        }
        sent
    }

    /// 为同一所有者提交多个短码，返回入队数量。
    /// 中途失败时之前的项已入队，错误信息里带上已接受的数量
    pub async fn submit_many<I, S>(&self, owner: OwnerId, codes: I) -> Result<usize>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut accepted = 0;
        for code in codes {
            if let Err(e) = self.submit(DeletionRequest::new(code, owner)).await {
                return Err(match e {
                    ShortyError::Unavailable(msg) => ShortyError::unavailable(format!(
                        "{} ({} accepted before failure)",
                        msg, accepted
                    )),
                    other => other,
                });
            }
            accepted += 1;
        }
        debug!("Accepted {} deletions for owner {}", accepted, owner);
        Ok(accepted)
    }

    pub fn stats(&self) -> PipelineStats {
        PipelineStats {
            submitted: self.state.submitted.load(Ordering::SeqCst),
            applied: self.state.applied.load(Ordering::SeqCst),
            retried: self.state.retried.load(Ordering::SeqCst),
            dead_lettered: self.state.dead_lettered.load(Ordering::SeqCst),
            queued: self.sender.max_capacity() - self.sender.capacity(),
            dead_letters: self.state.dead_letters.lock().len(),
        }
    }

    pub fn dead_letters(&self) -> Vec<DeadLetter> {
        self.state.dead_letters.lock().iter().cloned().collect()
    }

    /// 把死信重新放回队列；队列满时剩余的留在死信里。返回重新入队的数量
    pub fn requeue_dead_letters(&self) -> Result<usize> {
        if self.state.closed.load(Ordering::SeqCst) {
            return Err(ShortyError::unavailable(
                "Deletion pipeline is shutting down",
            ));
        }

        let mut letters: VecDeque<DeadLetter> =
            self.state.dead_letters.lock().drain(..).collect();
        let mut requeued = 0;

        while let Some(letter) = letters.pop_front() {
            self.state.submitted.fetch_add(1, Ordering::SeqCst);
            match self.sender.try_send(letter.request.clone()) {
                Ok(()) => requeued += 1,
                Err(_) => {
                    self.state.submitted.fetch_sub(1, Ordering::SeqCst);
                    letters.push_front(letter);
                    break;
                }
            }
        }

        if !letters.is_empty() {
            let mut dead = self.state.dead_letters.lock();
            // 期间新产生的死信排在后面
            letters.extend(dead.drain(..));
            *dead = letters;
        }

        info!("Requeued {} dead letters", requeued);
        Ok(requeued)
    }

    /// 关闭队列并在 `grace` 内排空；超时后中止消费者
    pub async fn shutdown(&self, grace: Duration) -> DrainReport {
        self.state.closed.store(true, Ordering::SeqCst);
        self.state.close_signal.notify_one();

        let applied_before = self.state.applied.load(Ordering::SeqCst);
        // 并发的第二个调用者在这里等第一个排空完成
        let mut slot = self.consumer.lock().await;

        let timed_out = match slot.as_mut() {
            Some(handle) => match tokio::time::timeout(grace, &mut *handle).await {
                Ok(Ok(())) => false,
                Ok(Err(e)) => {
                    error!("Deletion consumer ended abnormally: {}", e);
                    false
                }
                Err(_) => {
                    warn!(
                        "Deletion pipeline did not drain within {:?}, aborting",
                        grace
                    );
                    handle.abort();
                    true
                }
            },
            None => false,
        };
        *slot = None;
        drop(slot);

        let report = DrainReport {
            drained: self.state.applied.load(Ordering::SeqCst) - applied_before,
            unapplied: self.state.outstanding(),
            timed_out,
        };

        if report.unapplied > 0 {
            warn!(
                "Deletion pipeline stopped with {} unapplied requests",
                report.unapplied
            );
        } else {
            info!(
                "Deletion pipeline drained ({} applied during shutdown)",
                report.drained
            );
        }
        report
    }
}

async fn run_consumer(
    mut receiver: mpsc::Receiver<DeletionRequest>,
    storage: Arc<dyn Storage>,
    state: Arc<PipelineState>,
    max_retries: u32,
    retry_delay: Duration,
) {
    let mut closing = false;
    loop {
        tokio::select! {
            biased;
            _ = state.close_signal.notified(), if !closing => {
                // 不再接收新请求，已入队的继续处理
                receiver.close();
                closing = true;
            }
            request = receiver.recv() => match request {
                Some(request) => apply(&*storage, &state, request, max_retries, retry_delay).await,
                None => break,
            },
        }
    }
    debug!("Deletion consumer exited");
}

async fn apply(
    storage: &dyn Storage,
    state: &PipelineState,
    request: DeletionRequest,
    max_retries: u32,
    retry_delay: Duration,
) {
    let mut pairs = HashMap::with_capacity(1);
    pairs.insert(request.short_code.clone(), request.owner_id);

    let mut attempt = 0;
    loop {
        match storage.soft_delete(&pairs).await {
            Ok(()) => {
                state.applied.fetch_add(1, Ordering::SeqCst);
                debug!(
                    "Applied deletion of {} for owner {}",
                    request.short_code, request.owner_id
                );
                return;
            }
            Err(e) if attempt < max_retries => {
                attempt += 1;
                state.retried.fetch_add(1, Ordering::Relaxed);
                warn!(
                    "Deletion of {} failed (attempt {}/{}): {}; retrying in {:?}",
                    request.short_code,
                    attempt,
                    max_retries + 1,
                    e,
                    retry_delay
                );
                tokio::time::sleep(retry_delay).await;
            }
            Err(e) => {
                error!(
                    "Deletion of {} for owner {} dead-lettered after {} attempts: {}",
                    request.short_code,
                    request.owner_id,
                    attempt + 1,
                    e
                );
                state.push_dead_letter(DeadLetter {
                    request,
                    error: e.to_string(),
                    attempts: attempt + 1,
                    failed_at: Utc::now(),
                });
                return;
            }
        }
    }
}
