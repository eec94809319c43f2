pub mod url_validator;

use crate::config::ShortCodeConfig;

/// 短码字符集：0-9A-Za-z，共 62 个字符
pub const CODE_ALPHABET: &[u8] =
    b"0123456789ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz";

pub fn generate_random_code(length: usize) -> String {
    use std::iter;

    // 每一位独立均匀抽取
    iter::repeat_with(|| CODE_ALPHABET[rand::random_range(0..CODE_ALPHABET.len())] as char)
        .take(length)
        .collect()
}

/// 短码列宽（`urls.short_url` 为 64 字符）
pub const MAX_CODE_LENGTH: usize = 64;

/// Whether `code` could be a stored short code.
///
/// The configured length may change between runs, so codes of any length up
/// to `MAX_CODE_LENGTH` are accepted as long as they stay in the alphabet.
pub fn is_valid_code(code: &str) -> bool {
    !code.is_empty()
        && code.len() <= MAX_CODE_LENGTH
        && code.bytes().all(|b| b.is_ascii_alphanumeric())
}

/// Random fixed-length short code source.
///
/// Not cryptographically secure. Uniqueness is enforced by the storage
/// backends, which retry up to `max_attempts` times on collision.
#[derive(Debug, Clone, Copy)]
pub struct CodeGenerator {
    length: usize,
    max_attempts: u32,
}

impl CodeGenerator {
    pub fn new(length: usize, max_attempts: u32) -> Self {
        Self {
            length: length.clamp(1, MAX_CODE_LENGTH),
            max_attempts: max_attempts.max(1),
        }
    }

    pub fn from_config(config: &ShortCodeConfig) -> Self {
        Self::new(config.length, config.max_attempts)
    }

    pub fn generate(&self) -> String {
        generate_random_code(self.length)
    }

    pub fn length(&self) -> usize {
        self.length
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

}

impl Default for CodeGenerator {
    fn default() -> Self {
        Self::from_config(&ShortCodeConfig::default())
    }
}
