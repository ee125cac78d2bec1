//! Кодирование примитивов RDB.
//!
//! Нужен режимам, подменяющим участки потока свежезакодированными байтами
//! (например, SELECTDB с целевым индексом базы).

/// Кодирует длину так же, как это делает `rdbSaveLen`:
/// 6 бит в одном байте, 14 бит в двух, иначе 32- или 64-битная форма
/// с префиксным байтом и big-endian значением.
pub fn encode_length(len: u64) -> Vec<u8> {
    if len < 64 {
        vec![len as u8]
    } else if len < 16384 {
        vec![0x40 | (len >> 8) as u8, len as u8]
    } else if len <= u32::MAX as u64 {
        let mut out = vec![super::LEN_32BIT];
        out.extend_from_slice(&(len as u32).to_be_bytes());
        out
    } else {
        let mut out = vec![super::LEN_64BIT];
        out.extend_from_slice(&len.to_be_bytes());
        out
    }
}
