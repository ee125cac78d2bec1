//! Цикл обхода снапшота.
//!
//! [`SnapshotTranscoder`] читает записи строго в порядке источника и
//! доставляет их визитёру. Судьба байтов записи N полностью решается до
//! чтения записи N+1: опкоды и сроки жизни откладываются под `Capture`,
//! пока визитёр не решит, зеркалировать их или отбросить.
//!
//! Поведение по умолчанию у методов трейта: заголовочные записи
//! зеркалируются как есть, записи-значения пропускаются под `Discard`.
//! Конкретный режим переопределяет только то, что ему нужно.

use std::io::Read;

use byteorder::ReadBytesExt;
use tracing::{debug, trace};

use super::dispatch::{Record, SessionContext};
use crate::{
    error::{RdbError, RdbResult},
    guard::{Guard, GuardedReader},
    rdb::{parser, skip, RdbType, OP_AUX, OP_EOF, OP_EXPIRETIME, OP_EXPIRETIME_MS, OP_FREQ,
        OP_FUNCTION, OP_FUNCTION2, OP_IDLE, OP_MODULE_AUX, OP_RESIZEDB, OP_SELECTDB},
};

/// Первая версия формата с CRC64-трейлером после опкода конца данных.
const TRAILER_MIN_VERSION: u32 = 5;

/// Итог обхода одного снапшота.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct TranscodeSummary {
    pub version: u32,
    /// Всего записей-значений в источнике.
    pub records: u64,
    /// Из них прошло фильтр.
    pub kept: u64,
}

/// Визитёр записей снапшота.
///
/// Методы получают поток с уже отложенным (captured) опкодом записи и
/// обязаны либо отдать его в выход ([`GuardedReader::flush_captured`]),
/// либо отбросить — а затем потребить полезную нагрузку записи целиком.
pub trait TranscodeVisitor<R: Read> {
    /// Начало снапшота: источник открыт, заголовок ещё не прочитан.
    fn start(&mut self, _io: &mut GuardedReader<R>) -> RdbResult<()> {
        Ok(())
    }

    /// Конец снапшота: опкод конца данных и трейлер источника уже потреблены.
    fn end(&mut self, _io: &mut GuardedReader<R>) -> RdbResult<()> {
        Ok(())
    }

    /// Хост переходит к прямой трансляции команд; снапшотная часть закончена.
    fn command_stream(&mut self, _io: &mut GuardedReader<R>) -> RdbResult<()> {
        Ok(())
    }

    /// Сессия закрывается (штатно или нет).
    fn close(&mut self, _io: &mut GuardedReader<R>) -> RdbResult<()> {
        Ok(())
    }

    /// Магия и версия формата; читается в режиме покоя (зеркалируется).
    fn version(&mut self, io: &mut GuardedReader<R>) -> RdbResult<u32> {
        parser::read_version(io)
    }

    /// Вспомогательное поле заголовка.
    fn aux(&mut self, io: &mut GuardedReader<R>) -> RdbResult<()> {
        io.flush_captured()?;
        let field = parser::read_string(io)?;
        let value = parser::read_string(io)?;
        trace!(
            field = %String::from_utf8_lossy(&field),
            value = %String::from_utf8_lossy(&value),
            "aux field"
        );
        Ok(())
    }

    /// Переключение логической базы; возвращает действующий индекс.
    fn select_db(&mut self, io: &mut GuardedReader<R>, _version: u32) -> RdbResult<u64> {
        io.flush_captured()?;
        parser::read_length(io)
    }

    /// Подсказки размеров хеш-таблиц.
    fn resize_db(&mut self, io: &mut GuardedReader<R>) -> RdbResult<()> {
        io.flush_captured()?;
        parser::read_length(io)?;
        parser::read_length(io)?;
        Ok(())
    }

    /// Определение функции (один строковый blob).
    fn function(&mut self, io: &mut GuardedReader<R>) -> RdbResult<()> {
        io.flush_captured()?;
        parser::skip_string(io)
    }

    /// Вспомогательные данные модуля (самоописываемый поток опкодов).
    fn module_aux(&mut self, io: &mut GuardedReader<R>, _version: u32) -> RdbResult<()> {
        io.flush_captured()?;
        skip::skip_module2_body(io)
    }

    /// Запись-значение. По умолчанию — пропуск без следа в выходе.
    fn value(
        &mut self,
        io: &mut GuardedReader<R>,
        _version: u32,
        type_code: u8,
        _ctx: &SessionContext,
    ) -> RdbResult<Record> {
        let ty = RdbType::from_code(type_code).ok_or_else(|| {
            RdbError::Unsupported(format!("value type 0x{type_code:02x}"))
        })?;
        io.drop_captured();
        io.with_guard(Guard::Discard, |io| {
            parser::skip_string(io)?;
            skip::skip_value(io, ty)
        })?;
        Ok(Record::Skipped)
    }
}

/// Последовательный однопоточный обход: никакой параллельной работы,
/// приостановки — только блокирующие чтения источника и записи sink-а.
pub struct SnapshotTranscoder<R> {
    io: GuardedReader<R>,
}

impl<R: Read> SnapshotTranscoder<R> {
    pub fn new(source: R) -> Self {
        Self {
            io: GuardedReader::new(source),
        }
    }

    /// Доступ к перехватчику — для событий жизненного цикла вне снапшота
    /// (переход к командам, закрытие сессии).
    pub fn io_mut(&mut self) -> &mut GuardedReader<R> {
        &mut self.io
    }

    /// Прогоняет один снапшот целиком через визитёра.
    pub fn run<V: TranscodeVisitor<R>>(&mut self, visitor: &mut V) -> RdbResult<TranscodeSummary> {
        let io = &mut self.io;
        visitor.start(io)?;
        let version = visitor.version(io)?;
        debug!(version, "snapshot header accepted");

        let mut ctx = SessionContext::default();
        let mut summary = TranscodeSummary {
            version,
            ..Default::default()
        };

        loop {
            let opcode =
                io.with_guard(Guard::Capture, |io| io.read_u8().map_err(RdbError::from))?;
            match opcode {
                OP_EOF => {
                    io.drop_captured();
                    if version >= TRAILER_MIN_VERSION {
                        io.with_guard(Guard::Discard, |io| parser::skip_bytes(io, 8))?;
                    }
                    visitor.end(io)?;
                    break;
                }
                OP_SELECTDB => ctx.db = visitor.select_db(io, version)?,
                OP_RESIZEDB => visitor.resize_db(io)?,
                OP_AUX => visitor.aux(io)?,
                // Сроки жизни и частоты аннотируют следующую запись и
                // разделяют её судьбу: остаются отложенными до решения.
                OP_EXPIRETIME => {
                    io.with_guard(Guard::Capture, |io| parser::skip_bytes(io, 4))?
                }
                OP_EXPIRETIME_MS => {
                    io.with_guard(Guard::Capture, |io| parser::skip_bytes(io, 8))?
                }
                OP_FREQ => io.with_guard(Guard::Capture, |io| parser::skip_bytes(io, 1))?,
                OP_IDLE => io.with_guard(Guard::Capture, |io| -> RdbResult<()> {
                    parser::read_length(io)?;
                    Ok(())
                })?,
                OP_FUNCTION2 => visitor.function(io)?,
                OP_FUNCTION => {
                    return Err(RdbError::Unsupported(
                        "pre-release function opcode 0xF6".to_string(),
                    ))
                }
                OP_MODULE_AUX => visitor.module_aux(io, version)?,
                type_code => {
                    let record = visitor.value(io, version, type_code, &ctx)?;
                    summary.records += 1;
                    if !record.is_skipped() {
                        summary.kept += 1;
                    }
                }
            }
        }

        debug!(
            records = summary.records,
            kept = summary.kept,
            "snapshot transcoded"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::{guard::crc64, rdb::encode_length};

    struct CountingVisitor {
        aux_fields: usize,
        dbs: Vec<u64>,
    }

    impl<R: Read> TranscodeVisitor<R> for CountingVisitor {
        fn aux(&mut self, io: &mut GuardedReader<R>) -> RdbResult<()> {
            self.aux_fields += 1;
            io.drop_captured();
            parser::skip_string(io)?;
            parser::skip_string(io)
        }

        fn select_db(&mut self, io: &mut GuardedReader<R>, _version: u32) -> RdbResult<u64> {
            io.drop_captured();
            let db = parser::read_length(io)?;
            self.dbs.push(db);
            Ok(db)
        }
    }

    fn string(bytes: &[u8]) -> Vec<u8> {
        let mut out = encode_length(bytes.len() as u64);
        out.extend_from_slice(bytes);
        out
    }

    fn sample_snapshot() -> Vec<u8> {
        let mut img = b"REDIS0011".to_vec();
        img.push(super::OP_AUX);
        img.extend(string(b"redis-ver"));
        img.extend(string(b"7.0.0"));
        img.push(super::OP_SELECTDB);
        img.extend(encode_length(2));
        img.push(super::OP_EXPIRETIME_MS);
        img.extend(1_700_000_000_000u64.to_le_bytes());
        img.push(crate::rdb::TYPE_STRING);
        img.extend(string(b"key"));
        img.extend(string(b"value"));
        img.push(super::OP_IDLE);
        img.extend(encode_length(900));
        img.push(super::OP_FREQ);
        img.push(3);
        img.push(crate::rdb::TYPE_STRING);
        img.extend(string(b"warm"));
        img.extend(string(b"cache"));
        img.push(OP_EOF);
        let crc = crc64(&img);
        img.extend(crc.to_le_bytes());
        img
    }

    #[test]
    fn test_default_visitor_walks_whole_snapshot() {
        let mut t = SnapshotTranscoder::new(Cursor::new(sample_snapshot()));
        let mut visitor = CountingVisitor {
            aux_fields: 0,
            dbs: Vec::new(),
        };
        let summary = t.run(&mut visitor).unwrap();
        assert_eq!(summary.version, 11);
        assert_eq!(summary.records, 2);
        assert_eq!(summary.kept, 0);
        assert_eq!(visitor.aux_fields, 1);
        assert_eq!(visitor.dbs, vec![2]);
    }

    #[test]
    fn test_bad_magic_fails() {
        let mut t = SnapshotTranscoder::new(Cursor::new(b"RUBBISH!!".to_vec()));
        struct Nop;
        impl<R: Read> TranscodeVisitor<R> for Nop {}
        assert!(matches!(
            t.run(&mut Nop),
            Err(RdbError::BadHeader(_))
        ));
    }

    #[test]
    fn test_legacy_function_opcode_rejected() {
        let mut img = b"REDIS0011".to_vec();
        img.push(OP_FUNCTION);
        let mut t = SnapshotTranscoder::new(Cursor::new(img));
        struct Nop;
        impl<R: Read> TranscodeVisitor<R> for Nop {}
        assert!(matches!(
            t.run(&mut Nop),
            Err(RdbError::Unsupported(_))
        ));
    }
}
