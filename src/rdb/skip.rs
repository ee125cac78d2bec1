//! Продвижение по потоку мимо значения без построения объектов.
//!
//! Для каждой кодировки — ровно те байты, которые она занимает на диске;
//! недочитанный или перечитанный байт десинхронизирует все последующие
//! записи. Судьбу прочитанных байтов (зеркалирование, буфер, отброс)
//! определяет текущий режим [`GuardedReader`].

use std::io::Read;

use tracing::warn;

use super::{
    constants::{
        MODULE_OPCODE_DOUBLE, MODULE_OPCODE_EOF, MODULE_OPCODE_FLOAT, MODULE_OPCODE_SINT,
        MODULE_OPCODE_STRING, MODULE_OPCODE_UINT, STREAM_V2_MIN_VERSION, TYPE_STREAM_LISTPACKS,
        TYPE_STREAM_LISTPACKS_2,
    },
    parser::{read_length, skip_bytes, skip_double, skip_string},
    RdbType,
};
use crate::{
    error::{RdbError, RdbResult},
    guard::{Guard, GuardedReader},
};

/// Идентификатор записи стрима в PEL — фиксированные 16 байт.
const STREAM_ID_LEN: u64 = 16;

/// Алфавит 9-символьных имён модулей, закодированных в 64-битном id.
const MODULE_NAME_SET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789-_";

/// Восстанавливает имя модуля из 64-битного id (9 символов по 6 бит).
pub fn module_name(id: u64) -> String {
    (0..9)
        .map(|i| MODULE_NAME_SET[((id >> (10 + (8 - i) * 6)) & 63) as usize] as char)
        .collect()
}

/// Пропускает значение кодировки `ty`, потребляя ровно его байты.
pub fn skip_value<R: Read>(io: &mut GuardedReader<R>, ty: RdbType) -> RdbResult<()> {
    match ty {
        RdbType::String => skip_string(io),
        RdbType::List | RdbType::Set => {
            let n = read_length(io)?;
            for _ in 0..n {
                skip_string(io)?;
            }
            Ok(())
        }
        RdbType::ZSet => {
            let n = read_length(io)?;
            for _ in 0..n {
                skip_string(io)?;
                skip_double(io)?;
            }
            Ok(())
        }
        RdbType::ZSet2 => {
            let n = read_length(io)?;
            for _ in 0..n {
                skip_string(io)?;
                skip_bytes(io, 8)?;
            }
            Ok(())
        }
        RdbType::Hash => {
            let n = read_length(io)?;
            for _ in 0..n {
                skip_string(io)?;
                skip_string(io)?;
            }
            Ok(())
        }
        // Компактные кодировки сериализуются одним строковым объектом.
        RdbType::HashZipmap
        | RdbType::ListZiplist
        | RdbType::SetIntset
        | RdbType::ZSetZiplist
        | RdbType::HashZiplist
        | RdbType::ZSetListpack
        | RdbType::HashListpack => skip_string(io),
        RdbType::ListQuicklist => {
            let nodes = read_length(io)?;
            for _ in 0..nodes {
                skip_string(io)?;
            }
            Ok(())
        }
        RdbType::ListQuicklist2 => {
            let nodes = read_length(io)?;
            for _ in 0..nodes {
                read_length(io)?; // контейнер узла: plain или packed
                skip_string(io)?;
            }
            Ok(())
        }
        RdbType::Module => {
            let id = read_length(io)?;
            let name = module_name(id);
            warn!(module = %name, "module v1 value cannot be skipped without its parser");
            Err(RdbError::Unsupported(format!(
                "module '{name}' (v1 serialization)"
            )))
        }
        RdbType::Module2 => skip_module2_body(io),
        RdbType::StreamListpacks => skip_stream_listpacks(io, false),
        RdbType::StreamListpacks2 => skip_stream_listpacks(io, true),
    }
}

/// Тело module-2: id модуля, затем самоописываемый поток опкодов до EOF.
pub fn skip_module2_body<R: Read>(io: &mut GuardedReader<R>) -> RdbResult<()> {
    read_length(io)?; // id модуля
    loop {
        match read_length(io)? {
            MODULE_OPCODE_EOF => return Ok(()),
            MODULE_OPCODE_SINT | MODULE_OPCODE_UINT => {
                read_length(io)?;
            }
            MODULE_OPCODE_FLOAT => skip_bytes(io, 4)?,
            MODULE_OPCODE_DOUBLE => skip_bytes(io, 8)?,
            MODULE_OPCODE_STRING => skip_string(io)?,
            other => {
                return Err(RdbError::Corrupted(format!(
                    "unknown module opcode {other}"
                )))
            }
        }
    }
}

/// Пропуск stream-значения. `v2` добавляет счётчики формата 10+:
/// first-id, max-deleted-id, entries-added и per-group entries-read.
pub fn skip_stream_listpacks<R: Read>(io: &mut GuardedReader<R>, v2: bool) -> RdbResult<()> {
    stream_listpacks_walk(io, v2, false)
}

/// Транскодирование stream-listpacks-2 с учётом целевой версии формата.
///
/// Для целевой версии ниже 10 счётчики, отсутствующие в старой дисковой
/// форме, потребляются под `Discard` (в выход не попадают), а заявленный
/// тип записи понижается до stream-listpacks. Возвращает итоговый код типа.
pub fn transcode_stream_listpacks2<R: Read>(
    io: &mut GuardedReader<R>,
    target_version: u32,
) -> RdbResult<u8> {
    let downgrade = target_version < STREAM_V2_MIN_VERSION;
    stream_listpacks_walk(io, true, downgrade)?;
    Ok(if downgrade {
        TYPE_STREAM_LISTPACKS
    } else {
        TYPE_STREAM_LISTPACKS_2
    })
}

/// Обход вложенной структуры стрима, длина перед каждой секцией:
/// listpack-и, last-id, счётчики v2, затем группы потребителей с их PEL
/// и потребители со своими PEL. Записи PEL — фиксированные 16 байт.
fn stream_listpacks_walk<R: Read>(
    io: &mut GuardedReader<R>,
    v2: bool,
    downgrade: bool,
) -> RdbResult<()> {
    let mut listpacks = read_length(io)?;
    while listpacks > 0 {
        skip_string(io)?; // id мастер-записи
        skip_string(io)?; // listpack
        listpacks -= 1;
    }
    read_length(io)?; // length
    read_length(io)?; // last id: ms
    read_length(io)?; // last id: seq
    if v2 {
        maybe_discard(io, downgrade, |io| {
            read_length(io)?; // first id: ms
            read_length(io)?; // first id: seq
            read_length(io)?; // max deleted id: ms
            read_length(io)?; // max deleted id: seq
            read_length(io)?; // entries added
            Ok(())
        })?;
    }
    let mut groups = read_length(io)?;
    while groups > 0 {
        skip_string(io)?; // имя группы
        read_length(io)?; // last delivered id: ms
        read_length(io)?; // last delivered id: seq
        if v2 {
            maybe_discard(io, downgrade, |io| {
                read_length(io)?; // entries read
                Ok(())
            })?;
        }
        let mut group_pel = read_length(io)?;
        while group_pel > 0 {
            skip_bytes(io, STREAM_ID_LEN)?;
            skip_bytes(io, 8)?; // delivery time, millis
            read_length(io)?; // delivery count
            group_pel -= 1;
        }
        let mut consumers = read_length(io)?;
        while consumers > 0 {
            skip_string(io)?; // имя потребителя
            skip_bytes(io, 8)?; // seen time, millis
            let mut consumer_pel = read_length(io)?;
            while consumer_pel > 0 {
                skip_bytes(io, STREAM_ID_LEN)?;
                consumer_pel -= 1;
            }
            consumers -= 1;
        }
        groups -= 1;
    }
    Ok(())
}

fn maybe_discard<R: Read>(
    io: &mut GuardedReader<R>,
    discard: bool,
    f: impl FnOnce(&mut GuardedReader<R>) -> RdbResult<()>,
) -> RdbResult<()> {
    if discard {
        io.with_guard(Guard::Discard, f)
    } else {
        f(io)
    }
}
