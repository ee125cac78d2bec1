//! Декодер примитивов формата RDB.
//!
//! Длины с префиксом в старших битах, строковые объекты (сырые,
//! целочисленные и LZF-сжатые), числа с плавающей точкой и отметки времени.
//! Все функции читают ровно столько байтов, сколько занимает примитив, —
//! иначе следующая запись десинхронизируется.

use std::io::Read;

use byteorder::{BigEndian, LittleEndian, ReadBytesExt};

use super::{ENC_INT16, ENC_INT32, ENC_INT8, ENC_LZF, LEN_32BIT, LEN_64BIT, RDB_MAGIC};
use crate::error::{RdbError, RdbResult};

/// Проверяет магию `REDIS` и возвращает версию формата (4 ASCII-цифры).
pub fn read_version<R: Read>(r: &mut R) -> RdbResult<u32> {
    let mut magic = [0u8; 5];
    r.read_exact(&mut magic)?;
    if &magic != RDB_MAGIC {
        return Err(RdbError::BadHeader(format!(
            "expected 'REDIS' magic, got {magic:02x?}"
        )));
    }
    let mut ver = [0u8; 4];
    r.read_exact(&mut ver)?;
    std::str::from_utf8(&ver)
        .ok()
        .and_then(|s| s.parse::<u32>().ok())
        .ok_or_else(|| RdbError::BadHeader(format!("non-numeric version bytes {ver:02x?}")))
}

/// Читает длину вместе с флагом спец-кодировки (старшие биты 11).
pub fn read_length_with_encoding<R: Read>(r: &mut R) -> RdbResult<(u64, bool)> {
    let b0 = r.read_u8()?;
    match b0 >> 6 {
        0 => Ok(((b0 & 0x3F) as u64, false)),
        1 => {
            let b1 = r.read_u8()?;
            Ok(((((b0 & 0x3F) as u64) << 8) | b1 as u64, false))
        }
        3 => Ok(((b0 & 0x3F) as u64, true)),
        _ => match b0 {
            LEN_32BIT => Ok((r.read_u32::<BigEndian>()? as u64, false)),
            LEN_64BIT => Ok((r.read_u64::<BigEndian>()?, false)),
            other => Err(RdbError::Corrupted(format!(
                "invalid length byte 0x{other:02x}"
            ))),
        },
    }
}

/// Читает обычную длину; спец-кодировка здесь недопустима.
pub fn read_length<R: Read>(r: &mut R) -> RdbResult<u64> {
    let (len, encoded) = read_length_with_encoding(r)?;
    if encoded {
        return Err(RdbError::Corrupted(
            "encoded length where a plain length is required".to_string(),
        ));
    }
    Ok(len)
}

/// Читает строковый объект: сырой, целочисленный (int8/16/32 — возвращается
/// десятичным представлением) или LZF-сжатый (возвращается распакованным).
pub fn read_string<R: Read>(r: &mut R) -> RdbResult<Vec<u8>> {
    let (len, encoded) = read_length_with_encoding(r)?;
    if !encoded {
        let mut buf = vec![0u8; len as usize];
        r.read_exact(&mut buf)?;
        return Ok(buf);
    }
    match len {
        ENC_INT8 => Ok(r.read_i8()?.to_string().into_bytes()),
        ENC_INT16 => Ok(r.read_i16::<LittleEndian>()?.to_string().into_bytes()),
        ENC_INT32 => Ok(r.read_i32::<LittleEndian>()?.to_string().into_bytes()),
        ENC_LZF => {
            let clen = read_length(r)?;
            let ulen = read_length(r)?;
            let mut compressed = vec![0u8; clen as usize];
            r.read_exact(&mut compressed)?;
            lzf_decompress(&compressed, ulen as usize)
        }
        other => Err(RdbError::Unsupported(format!("string encoding {other}"))),
    }
}

/// Продвигается мимо строкового объекта, не аллоцируя его содержимое.
pub fn skip_string<R: Read>(r: &mut R) -> RdbResult<()> {
    let (len, encoded) = read_length_with_encoding(r)?;
    if !encoded {
        return skip_bytes(r, len);
    }
    match len {
        ENC_INT8 => skip_bytes(r, 1),
        ENC_INT16 => skip_bytes(r, 2),
        ENC_INT32 => skip_bytes(r, 4),
        ENC_LZF => {
            let clen = read_length(r)?;
            read_length(r)?; // несжатая длина
            skip_bytes(r, clen)
        }
        other => Err(RdbError::Unsupported(format!("string encoding {other}"))),
    }
}

/// Позиционный пропуск: байты всё равно физически читаются, чтобы их видел
/// перехватчик.
pub fn skip_bytes<R: Read>(r: &mut R, mut n: u64) -> RdbResult<()> {
    let mut buf = [0u8; 4096];
    while n > 0 {
        let take = n.min(buf.len() as u64) as usize;
        r.read_exact(&mut buf[..take])?;
        n -= take as u64;
    }
    Ok(())
}

/// Число с плавающей точкой в текстовой кодировке zset v1:
/// байт длины, 253/254/255 — NaN / +inf / -inf, иначе ASCII-представление.
pub fn read_double<R: Read>(r: &mut R) -> RdbResult<f64> {
    match r.read_u8()? {
        255 => Ok(f64::NEG_INFINITY),
        254 => Ok(f64::INFINITY),
        253 => Ok(f64::NAN),
        len => {
            let mut buf = vec![0u8; len as usize];
            r.read_exact(&mut buf)?;
            std::str::from_utf8(&buf)
                .ok()
                .and_then(|s| s.parse::<f64>().ok())
                .ok_or_else(|| RdbError::Corrupted(format!("invalid double bytes {buf:02x?}")))
        }
    }
}

/// Пропуск текстового double без разбора.
pub fn skip_double<R: Read>(r: &mut R) -> RdbResult<()> {
    let len = r.read_u8()?;
    if len <= 252 {
        skip_bytes(r, len as u64)?;
    }
    Ok(())
}

/// 8-байтовый двоичный double (zset v2), little-endian.
pub fn read_binary_double<R: Read>(r: &mut R) -> RdbResult<f64> {
    Ok(r.read_f64::<LittleEndian>()?)
}

/// Отметка времени в миллисекундах, 8 байт little-endian.
pub fn read_millis_time<R: Read>(r: &mut R) -> RdbResult<u64> {
    Ok(r.read_u64::<LittleEndian>()?)
}

/// Распаковка LZF-блока с известной несжатой длиной.
pub fn lzf_decompress(input: &[u8], expected: usize) -> RdbResult<Vec<u8>> {
    let corrupt = || RdbError::Corrupted("truncated LZF block".to_string());
    let mut out = Vec::with_capacity(expected);
    let mut i = 0usize;
    while i < input.len() {
        let ctrl = input[i] as usize;
        i += 1;
        if ctrl < 32 {
            // Литеральный прогон из ctrl + 1 байтов.
            let run = ctrl + 1;
            if i + run > input.len() {
                return Err(corrupt());
            }
            out.extend_from_slice(&input[i..i + run]);
            i += run;
        } else {
            // Обратная ссылка: длина в старших битах, смещение — 13 бит.
            let mut len = ctrl >> 5;
            if len == 7 {
                len += *input.get(i).ok_or_else(corrupt)? as usize;
                i += 1;
            }
            let low = *input.get(i).ok_or_else(corrupt)? as usize;
            i += 1;
            let offset = ((ctrl & 0x1F) << 8) | low;
            let mut pos = out
                .len()
                .checked_sub(offset + 1)
                .ok_or_else(|| RdbError::Corrupted("LZF back-reference out of range".to_string()))?;
            // Побайтово: ссылка может перекрываться с хвостом выхода.
            for _ in 0..len + 2 {
                let b = out[pos];
                out.push(b);
                pos += 1;
            }
        }
    }
    if out.len() != expected {
        return Err(RdbError::Corrupted(format!(
            "LZF length mismatch: expected {expected}, got {}",
            out.len()
        )));
    }
    Ok(out)
}
