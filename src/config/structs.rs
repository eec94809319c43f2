use serde::{Deserialize, Serialize};

use crate::errors::{Result, ShortyError};

/// 默认配置文件名
pub const DEFAULT_CONFIG_PATH: &str = "shorty.toml";

/// 静态配置（从 TOML 加载，启动时使用）
///
/// 包含：
/// - server: 对外短链接前缀
/// - storage: 存储后端选择与连接参数
/// - shortcode: 短码长度与碰撞重试上限
/// - deletion: 异步删除管道
/// - logging: 日志配置
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct StaticConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub shortcode: ShortCodeConfig,
    #[serde(default)]
    pub deletion: DeletionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl StaticConfig {
    /// 从 TOML 文件和环境变量加载配置
    ///
    /// 优先级：ENV > TOML > 默认值
    /// ENV 前缀：SHORTY，分隔符：__
    /// 示例：SHORTY__STORAGE__BACKEND=file
    /// 文件存在但无法解析，或某个字段类型不对时返回 Config 错误，不会退回默认值
    pub fn load(path: Option<&str>) -> Result<Self> {
        use config::{Config, Environment, File};

        let path = path.unwrap_or(DEFAULT_CONFIG_PATH);

        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("SHORTY")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .map_err(|e| ShortyError::config(format!("Failed to build config: {}", e)))?;

        let config = settings
            .try_deserialize::<StaticConfig>()
            .map_err(|e| ShortyError::config(format!("Failed to deserialize config: {}", e)))?;

        if std::path::Path::new(path).exists() {
            eprintln!("[INFO] Configuration loaded from: {}", path);
        }
        Ok(config)
    }

    /// 生成示例 TOML 配置文件
    pub fn generate_sample_config() -> String {
        let sample_config = Self::default();
        toml::to_string_pretty(&sample_config)
            .unwrap_or_else(|e| format!("Error generating sample config: {}", e))
    }

    /// 保存配置到 TOML 文件
    pub fn save_to_file<P: AsRef<std::path::Path>>(
        &self,
        path: P,
    ) -> std::result::Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;

        if let Some(parent) = path.as_ref().parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent)?;
        }

        std::fs::write(path, content)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Prefix joined with a short code to build the public short URL
    #[serde(default = "default_base_url")]
    pub base_url: String,
}

impl ServerConfig {
    /// `base_url` without trailing slashes
    pub fn base_addr(&self) -> &str {
        self.base_url.trim_end_matches('/')
    }
}

/// 存储后端配置
///
/// `backend` 未设置时按原有规则推断：
/// 设置了 database_url 用数据库，设置了 file_path 用日志文件，否则用内存表
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default)]
    pub backend: Option<String>,
    #[serde(default)]
    pub file_path: Option<String>,
    #[serde(default)]
    pub database_url: Option<String>,
    /// fsync every appended log line
    #[serde(default)]
    pub fsync: bool,
    #[serde(default = "default_database_pool_size")]
    pub pool_size: u32,
    #[serde(default = "default_database_timeout")]
    pub timeout: u64,
    #[serde(default = "default_retry_count")]
    pub retry_count: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_retry_max_delay_ms")]
    pub retry_max_delay_ms: u64,
}

impl StorageConfig {
    pub fn file_path(&self) -> Result<&str> {
        self.file_path
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or_else(|| ShortyError::config("storage.file_path is not set"))
    }

    pub fn database_url(&self) -> Result<&str> {
        self.database_url
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or_else(|| ShortyError::config("storage.database_url is not set"))
    }
}

/// 短码生成配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ShortCodeConfig {
    #[serde(default = "default_code_length")]
    pub length: usize,
    /// Collision retries before giving up with `Exhausted`
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

/// 删除管道配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeletionConfig {
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// "block" 或 "reject"
    #[serde(default = "default_backpressure")]
    pub backpressure: String,
    #[serde(default = "default_deletion_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_deletion_retry_delay_ms")]
    pub retry_delay_ms: u64,
    #[serde(default = "default_dead_letter_capacity")]
    pub dead_letter_capacity: usize,
    #[serde(default = "default_drain_timeout_secs")]
    pub drain_timeout_secs: u64,
}

/// 日志配置
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_log_format")]
    pub format: String,
    #[serde(default)]
    pub file: Option<String>,
    #[serde(default = "default_max_backups")]
    pub max_backups: u32,
    #[serde(default = "default_enable_rotation")]
    pub enable_rotation: bool,
}

// ============================================================
// Default value functions
// ============================================================

fn default_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_database_pool_size() -> u32 {
    10
}

fn default_database_timeout() -> u64 {
    30
}

fn default_retry_count() -> u32 {
    3
}

fn default_retry_base_delay_ms() -> u64 {
    100
}

fn default_retry_max_delay_ms() -> u64 {
    2000
}

fn default_code_length() -> usize {
    6
}

fn default_max_attempts() -> u32 {
    16
}

fn default_queue_capacity() -> usize {
    500
}

fn default_backpressure() -> String {
    "block".to_string()
}

fn default_deletion_max_retries() -> u32 {
    3
}

fn default_deletion_retry_delay_ms() -> u64 {
    200
}

fn default_dead_letter_capacity() -> usize {
    1000
}

fn default_drain_timeout_secs() -> u64 {
    10
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "text".to_string()
}

fn default_max_backups() -> u32 {
    5
}

fn default_enable_rotation() -> bool {
    true
}

// ============================================================
// Default implementations
// ============================================================

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: None,
            file_path: None,
            database_url: None,
            fsync: false,
            pool_size: default_database_pool_size(),
            timeout: default_database_timeout(),
            retry_count: default_retry_count(),
            retry_base_delay_ms: default_retry_base_delay_ms(),
            retry_max_delay_ms: default_retry_max_delay_ms(),
        }
    }
}

impl Default for ShortCodeConfig {
    fn default() -> Self {
        Self {
            length: default_code_length(),
            max_attempts: default_max_attempts(),
        }
    }
}

impl Default for DeletionConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            backpressure: default_backpressure(),
            max_retries: default_deletion_max_retries(),
            retry_delay_ms: default_deletion_retry_delay_ms(),
            dead_letter_capacity: default_dead_letter_capacity(),
            drain_timeout_secs: default_drain_timeout_secs(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
            file: None,
            max_backups: default_max_backups(),
            enable_rotation: default_enable_rotation(),
        }
    }
}
