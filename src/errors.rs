use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShortyError {
    NotFound(String),
    Gone(String),
    Conflict(String),
    Unavailable(String),
    Internal(String),
    Exhausted(String),
    Validation(String),
    Config(String),
}

impl ShortyError {
    /// 获取错误代码
    pub fn code(&self) -> &'static str {
        match self {
            ShortyError::NotFound(_) => "E001",
            ShortyError::Gone(_) => "E002",
            ShortyError::Conflict(_) => "E003",
            ShortyError::Unavailable(_) => "E004",
            ShortyError::Internal(_) => "E005",
            ShortyError::Exhausted(_) => "E006",
            ShortyError::Validation(_) => "E007",
            ShortyError::Config(_) => "E008",
        }
    }

    /// 获取错误类型名称
    pub fn error_type(&self) -> &'static str {
        match self {
            ShortyError::NotFound(_) => "Not Found",
            ShortyError::Gone(_) => "Gone",
            ShortyError::Conflict(_) => "Conflict",
            ShortyError::Unavailable(_) => "Unavailable",
            ShortyError::Internal(_) => "Internal Error",
            ShortyError::Exhausted(_) => "Code Space Exhausted",
            ShortyError::Validation(_) => "Validation Error",
            ShortyError::Config(_) => "Configuration Error",
        }
    }

    /// 获取错误详情
    pub fn message(&self) -> &str {
        match self {
            ShortyError::NotFound(msg)
            | ShortyError::Gone(msg)
            | ShortyError::Conflict(msg)
            | ShortyError::Unavailable(msg)
            | ShortyError::Internal(msg)
            | ShortyError::Exhausted(msg)
            | ShortyError::Validation(msg)
            | ShortyError::Config(msg) => msg,
        }
    }

    /// Whether the caller may retry the same operation later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ShortyError::Unavailable(_) | ShortyError::Exhausted(_))
    }

    /// 格式化为彩色输出
    pub fn format_colored(&self) -> String {
        use colored::Colorize;
        format!(
            "{} {} {}\n  {}",
            "[ERROR]".red().bold(),
            self.code().yellow(),
            self.error_type().red(),
            self.message().white()
        )
    }

    /// 格式化为简洁输出
    pub fn format_simple(&self) -> String {
        format!("{}: {}", self.error_type(), self.message())
    }
}

impl fmt::Display for ShortyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.format_simple())
    }
}

impl std::error::Error for ShortyError {}

// 便捷的构造函数
impl ShortyError {
    pub fn not_found<T: Into<String>>(msg: T) -> Self {
        ShortyError::NotFound(msg.into())
    }

    pub fn gone<T: Into<String>>(msg: T) -> Self {
        ShortyError::Gone(msg.into())
    }

    pub fn conflict<T: Into<String>>(msg: T) -> Self {
        ShortyError::Conflict(msg.into())
    }

    pub fn unavailable<T: Into<String>>(msg: T) -> Self {
        ShortyError::Unavailable(msg.into())
    }

    pub fn internal<T: Into<String>>(msg: T) -> Self {
        ShortyError::Internal(msg.into())
    }

    pub fn exhausted<T: Into<String>>(msg: T) -> Self {
        ShortyError::Exhausted(msg.into())
    }

    pub fn validation<T: Into<String>>(msg: T) -> Self {
        ShortyError::Validation(msg.into())
    }

    pub fn config<T: Into<String>>(msg: T) -> Self {
        ShortyError::Config(msg.into())
    }
}

// 未分类的底层错误统一归为 Internal
impl From<sea_orm::DbErr> for ShortyError {
    fn from(err: sea_orm::DbErr) -> Self {
        ShortyError::Internal(format!("database: {}", err))
    }
}

impl From<std::io::Error> for ShortyError {
    fn from(err: std::io::Error) -> Self {
        ShortyError::Internal(format!("io: {}", err))
    }
}

impl From<serde_json::Error> for ShortyError {
    fn from(err: serde_json::Error) -> Self {
        ShortyError::Internal(format!("serialization: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, ShortyError>;
