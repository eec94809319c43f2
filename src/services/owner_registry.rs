//! 所有者注册表
//!
//! 会话令牌 -> OwnerId 的映射只存在于内存；丢失令牌就无法再找回对应的 OwnerId。
//! OwnerId 计数器在启动时从存储恢复，之后单调递增。

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use tracing::{debug, info};
use uuid::Uuid;

use crate::errors::Result;
use crate::storage::{OwnerId, Storage};

/// 一个已分配的会话
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub token: String,
    pub owner_id: OwnerId,
}

pub struct OwnerRegistry {
    /// 最近一次分配出去的 OwnerId
    last_owner: AtomicU64,
    sessions: DashMap<String, OwnerId>,
}

impl OwnerRegistry {
    /// 从存储恢复计数器。取记录序号与已持久化的最大 OwnerId 中较大者，
    /// 保证重启后新分配的 OwnerId 不会与任何已有记录的所有者重复
    pub async fn recover(storage: &Arc<dyn Storage>) -> Result<Self> {
        let last_sequence = storage.recover_last_sequence().await?;
        let last_owner = storage.recover_last_owner().await?;
        let seed = last_sequence.max(last_owner);

        info!(
            "Owner registry recovered from {} storage (sequence {}, owner {}), next owner {}",
            storage.backend_name(),
            last_sequence,
            last_owner,
            seed + 1
        );
        Ok(Self::starting_after(seed))
    }

    /// 下一个分配的 OwnerId 为 `last + 1`
    pub fn starting_after(last: OwnerId) -> Self {
        Self {
            last_owner: AtomicU64::new(last),
            sessions: DashMap::new(),
        }
    }

    pub fn allocate_session(&self) -> Session {
        let owner_id = self.last_owner.fetch_add(1, Ordering::SeqCst) + 1;
        let token = Uuid::new_v4().to_string();
        self.sessions.insert(token.clone(), owner_id);
        debug!("Allocated owner {}", owner_id);
        Session { token, owner_id }
    }

    /// 未知令牌返回 None，不会退化成匿名 owner
    pub fn lookup(&self, token: &str) -> Option<OwnerId> {
        self.sessions.get(token).map(|entry| *entry.value())
    }

    /// 解析调用方带来的令牌；没有令牌或令牌未知时分配新会话。
    /// 返回值中的 bool 表示是否新分配（调用方需要把令牌交还给客户端）
    pub fn session_for(&self, token: Option<&str>) -> (Session, bool) {
        if let Some(token) = token
            && let Some(owner_id) = self.lookup(token)
        {
            return (
                Session {
                    token: token.to_string(),
                    owner_id,
                },
                false,
            );
        }
        (self.allocate_session(), true)
    }

    pub fn active_sessions(&self) -> usize {
        self.sessions.len()
    }

    pub fn last_allocated(&self) -> OwnerId {
        self.last_owner.load(Ordering::SeqCst)
    }
}
