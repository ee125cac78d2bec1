use std::io;

use thiserror::Error;

pub type RdbResult<T> = Result<T, RdbError>;

/// Ошибки, возникающие при чтении и транскодировании снапшота.
///
/// Любая из них фатальна для текущей сессии: после ошибки смещения в потоке
/// больше не достоверны, и драйвер должен закрыть источник. Повторные попытки
/// здесь не выполняются.
#[derive(Error, Debug)]
pub enum RdbError {
    // ==== System / External ====
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    // ==== Snapshot framing ====
    #[error("Bad snapshot header: {0}")]
    BadHeader(String),

    #[error("Corrupted stream: {0}")]
    Corrupted(String),

    // ==== Encodings ====
    #[error("Unsupported encoding: {0}")]
    Unsupported(String),

    // ==== Filter ====
    #[error("Invalid filter pattern: {0}")]
    Pattern(#[from] globset::Error),
}
