//! 追加式日志文件存储
//!
//! 每行一个 JSON 对象：`{"uuid","short_url","original_url","user_id","deleted"}`，
//! `uuid` 存放记录的 sequence_id。启动时整文件重放到内存表，同一短码以最后一行为准。
//! 软删除追加一行 `deleted: true` 的墓碑，不改写已有内容。

use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, BufRead, BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, error, info, warn};

use super::table::Table;
use crate::errors::{Result, ShortyError};
use crate::storage::Storage;
use crate::storage::models::{OwnedUrl, OwnerId, Shortened, StorageStats, UrlRecord};
use crate::utils::CodeGenerator;

/// 日志行格式；旧格式没有 user_id / deleted 字段
#[derive(Debug, Serialize, Deserialize)]
struct LogLine {
    uuid: String,
    short_url: String,
    original_url: String,
    #[serde(default)]
    user_id: u64,
    #[serde(default)]
    deleted: bool,
}

impl From<&UrlRecord> for LogLine {
    fn from(record: &UrlRecord) -> Self {
        Self {
            uuid: record.sequence_id.to_string(),
            short_url: record.short_code.clone(),
            original_url: record.long_url.clone(),
            user_id: record.owner_id,
            deleted: record.deleted,
        }
    }
}

/// 压缩结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CompactReport {
    pub lines_before: usize,
    pub lines_after: usize,
}

struct LogState {
    table: Table,
    file: File,
    lines: usize,
    /// 写失败且无法回滚时置位；此后拒绝追加，直到 `compact` 重写文件
    broken: Option<String>,
}

impl LogState {
    /// 先写文件，成功后再更新内存镜像
    fn append(&mut self, record: UrlRecord, fsync: bool) -> Result<()> {
        if let Some(reason) = &self.broken {
            return Err(ShortyError::unavailable(format!(
                "Log is not writable until compacted: {}",
                reason
            )));
        }

        let mut buf = serde_json::to_vec(&LogLine::from(&record))?;
        buf.push(b'\n');

        let offset = self.file.metadata()?.len();
        if let Err(e) = write_line(&mut self.file, &buf, fsync) {
            // 截掉写了一半的行，下一条仍从行首开始
            match self.file.set_len(offset) {
                Ok(()) => warn!("Log append failed, rolled back to {} bytes: {}", offset, e),
                Err(trunc) => {
                    error!("Log append failed and rollback failed: {}; {}", e, trunc);
                    self.broken = Some(format!("{}; rollback: {}", e, trunc));
                }
            }
            return Err(ShortyError::unavailable(format!("Log append failed: {}", e)));
        }

        self.lines += 1;
        self.table.apply(record);
        Ok(())
    }
}

/// 整行一次写入
fn write_line(file: &mut File, line: &[u8], fsync: bool) -> io::Result<()> {
    file.write_all(line)?;
    if fsync {
        file.sync_data()?;
    }
    Ok(())
}

struct LogInner {
    path: PathBuf,
    fsync: bool,
    state: RwLock<LogState>,
    generator: CodeGenerator,
}

impl LogInner {
    fn save(&self, owner: OwnerId, code: &str, long_url: &str) -> Result<()> {
        let mut state = self.state.write();
        state.table.check_vacant(code, long_url)?;
        let record = state.table.next_record(owner, code, long_url);
        state.append(record, self.fsync)
    }

    fn get_or_create(&self, owner: OwnerId, long_url: &str) -> Result<Shortened> {
        let mut state = self.state.write();
        if let Some(code) = state.table.find_active(long_url) {
            return Ok(Shortened::Existing(code.to_string()));
        }

        let code = state.table.vacant_code(&self.generator)?;
        let record = state.table.next_record(owner, &code, long_url);
        state.append(record, self.fsync)?;
        debug!("Shortened {} -> {} for owner {}", long_url, code, owner);
        Ok(Shortened::Created(code))
    }

    fn soft_delete(&self, pairs: &HashMap<String, OwnerId>) -> Result<()> {
        let mut state = self.state.write();
        let tombstones = state.table.tombstones_for(pairs);
        for tombstone in tombstones {
            debug!("Appending tombstone for {}", tombstone.short_code);
            state.append(tombstone, self.fsync)?;
        }
        Ok(())
    }

    fn compact(&self) -> Result<CompactReport> {
        let mut state = self.state.write();
        let lines_before = state.lines;

        let tmp_path = self.path.with_extension("compact");
        let snapshot = state.table.snapshot();
        let mut buf = Vec::new();
        for record in &snapshot {
            serde_json::to_writer(&mut buf, &LogLine::from(record))?;
            buf.push(b'\n');
        }

        let mut tmp = OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&tmp_path)?;
        tmp.write_all(&buf)?;
        tmp.sync_all()?;
        drop(tmp);

        // 新句柄在 rename 之前打开；rename 失败时旧句柄和旧文件都保持不变
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .open(&tmp_path)?;
        if let Err(e) = fs::rename(&tmp_path, &self.path) {
            let _ = fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        state.file = file;
        state.lines = snapshot.len();
        if let Some(reason) = state.broken.take() {
            info!("Log rewritten, accepting writes again (was: {})", reason);
        }

        info!(
            "Compacted {}: {} -> {} lines",
            self.path.display(),
            lines_before,
            state.lines
        );
        Ok(CompactReport {
            lines_before,
            lines_after: state.lines,
        })
    }
}

/// 文件 I/O 在阻塞线程池里执行，不占用 tokio worker
pub struct LogStore {
    inner: Arc<LogInner>,
}

impl LogStore {
    /// 打开（必要时创建）日志文件并重放
    pub fn open<P: AsRef<Path>>(path: P, fsync: bool, generator: CodeGenerator) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&path)
            .map_err(|e| {
                ShortyError::unavailable(format!("Cannot open log {}: {}", path.display(), e))
            })?;

        let (table, lines) = replay(&file, &path)?;
        repair_tail(&mut file)?;

        info!(
            "LogStore loaded {} records from {} ({} lines)",
            table.len(),
            path.display(),
            lines
        );

        Ok(Self {
            inner: Arc::new(LogInner {
                path,
                fsync,
                state: RwLock::new(LogState {
                    table,
                    file,
                    lines,
                    broken: None,
                }),
                generator,
            }),
        })
    }

    pub fn path(&self) -> &Path {
        &self.inner.path
    }

    /// 用内存镜像重写日志：每个短码只保留一行，墓碑保留。
    /// 先写临时文件，再原子 rename 覆盖；也用于写失败后恢复可写状态
    pub fn compact(&self) -> Result<CompactReport> {
        self.inner.compact()
    }

    async fn blocking<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&LogInner) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || f(&inner))
            .await
            .map_err(|e| ShortyError::internal(format!("Blocking task error: {:?}", e)))?
    }
}

fn replay(file: &File, path: &Path) -> Result<(Table, usize)> {
    let mut table = Table::new();
    let mut lines = 0;

    // 按字节切行：坏字节（非 UTF-8）只影响所在的那一行
    for (index, line) in BufReader::new(file).split(b'\n').enumerate() {
        let line = line?;
        if line.iter().all(u8::is_ascii_whitespace) {
            continue;
        }
        lines += 1;

        let entry: LogLine = match serde_json::from_slice(&line) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(
                    "Skipping malformed line {} in {}: {}",
                    index + 1,
                    path.display(),
                    e
                );
                continue;
            }
        };

        let sequence_id = entry
            .uuid
            .parse::<u64>()
            .unwrap_or_else(|_| table.last_sequence() + 1);
        table.apply(UrlRecord {
            short_code: entry.short_url,
            long_url: entry.original_url,
            owner_id: entry.user_id,
            deleted: entry.deleted,
            sequence_id,
        });
    }

    Ok((table, lines))
}

/// 上次崩溃可能留下半行，补一个换行，避免下一条记录接在坏行后面
fn repair_tail(file: &mut File) -> Result<()> {
    let len = file.metadata()?.len();
    if len == 0 {
        return Ok(());
    }
    file.seek(SeekFrom::Start(len - 1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    if last[0] != b'\n' {
        warn!("Log ends with a partial line, terminating it");
        file.write_all(b"\n")?;
    }
    Ok(())
}

#[async_trait]
impl Storage for LogStore {
    async fn save(&self, owner: OwnerId, code: &str, long_url: &str) -> Result<()> {
        let (code, long_url) = (code.to_string(), long_url.to_string());
        self.blocking(move |inner| inner.save(owner, &code, &long_url))
            .await
    }

    async fn get_or_create_short_code(
        &self,
        owner: OwnerId,
        long_url: &str,
    ) -> Result<Shortened> {
        let long_url = long_url.to_string();
        self.blocking(move |inner| inner.get_or_create(owner, &long_url))
            .await
    }

    async fn resolve(&self, code: &str) -> Result<String> {
        self.inner.state.read().table.resolve(code)
    }

    async fn list_owned(&self, owner: OwnerId, base_addr: &str) -> Result<Vec<OwnedUrl>> {
        Ok(self.inner.state.read().table.list_owned(owner, base_addr))
    }

    async fn soft_delete(&self, pairs: &HashMap<String, OwnerId>) -> Result<()> {
        let pairs = pairs.clone();
        self.blocking(move |inner| inner.soft_delete(&pairs)).await
    }

    async fn recover_last_sequence(&self) -> Result<u64> {
        Ok(self.inner.state.read().table.last_sequence())
    }

    async fn recover_last_owner(&self) -> Result<u64> {
        Ok(self.inner.state.read().table.last_owner())
    }

    async fn stats(&self) -> Result<StorageStats> {
        Ok(self.inner.state.read().table.stats())
    }

    async fn is_ready(&self) -> bool {
        self.inner.path.exists() && self.inner.state.read().broken.is_none()
    }

    fn backend_name(&self) -> &'static str {
        "file"
    }
}
