//! Диспетчер типов: одна точка входа на каждую запись-значение.
//!
//! Порядок на каждой записи: кадрирование, отложенное драйвером (сроки
//! жизни и код типа), забирается из буфера — код типа при выпуске может
//! быть подменён, если hook понизил кодировку. Ключ читается под
//! `Capture`, затем опрашивается фильтр. Совпадение — hook выполняется
//! под `Capture`, после чего в выход уходят кадрирование, итоговый код
//! типа и отложенные ключ и значение. Промах — всё отложенное
//! отбрасывается, значение пропускается под `Discard`, возвращается
//! запись-заглушка. В любом исходе режим восстанавливается, а байты
//! записи потребляются полностью.

use std::io::Read;

use tracing::trace;

use super::filter::{Filter, MatchInfo};
use crate::{
    error::{RdbError, RdbResult},
    guard::{Guard, GuardedReader},
    rdb::{parser, skip, RdbType},
};

/// Контекст сессии: текущая логическая база.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct SessionContext {
    pub db: u64,
}

/// Реальная (не пропущенная) запись, прошедшая через hook.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValueRecord {
    pub db: u64,
    /// Заявленный код типа; может отличаться от исходного после понижения
    /// версии stream-кодировки.
    pub type_code: u8,
    pub key: Vec<u8>,
}

/// Результат диспетчеризации одной записи.
///
/// `Skipped` — заглушка без полезной нагрузки: потребители молча отбрасывают
/// её, не путая с настоящей записью.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Record {
    Skipped,
    Value(ValueRecord),
}

impl Record {
    pub fn is_skipped(&self) -> bool {
        matches!(self, Record::Skipped)
    }
}

/// Точка переопределения per-type преобразований конкретного режима.
///
/// Реализация по умолчанию пропускает значение (байты при этом следуют
/// режиму перехвата вызывающего) и возвращает запись с заявленным типом,
/// поэтому режим, переопределивший лишь часть типов, получает корректное
/// поведение для остальных даром.
pub trait TranscodeHook {
    fn transform<R: Read>(
        &mut self,
        io: &mut GuardedReader<R>,
        version: u32,
        target_version: Option<u32>,
        key: &[u8],
        info: &MatchInfo,
        ty: RdbType,
        ctx: &SessionContext,
    ) -> RdbResult<Record> {
        let declared = match ty {
            RdbType::StreamListpacks2 => {
                skip::transcode_stream_listpacks2(io, target_version.unwrap_or(version))?
            }
            _ => {
                skip::skip_value(io, ty)?;
                ty.code()
            }
        };
        // Переименование действует на уровне записи: на проводе остаётся
        // исходный ключ, новое имя несёт запись для потребителей.
        let key = match &info.rename_to {
            Some(renamed) => renamed.clone(),
            None => key.to_vec(),
        };
        Ok(Record::Value(ValueRecord {
            db: ctx.db,
            type_code: declared,
            key,
        }))
    }
}

/// Hook по умолчанию: только поведение из трейта.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultHook;

impl TranscodeHook for DefaultHook {}

/// Диспетчер записей-значений: фильтр, hook и целевая версия формата.
pub struct Dispatcher<F, H = DefaultHook> {
    filter: F,
    hook: H,
    target_version: Option<u32>,
}

impl<F: Filter, H: TranscodeHook> Dispatcher<F, H> {
    pub fn new(filter: F, hook: H) -> Self {
        Self {
            filter,
            hook,
            target_version: None,
        }
    }

    /// Целевая версия формата для hook-ов, понижающих кодировки.
    pub fn with_target_version(mut self, version: u32) -> Self {
        self.target_version = Some(version);
        self
    }

    pub fn dispatch<R: Read>(
        &mut self,
        io: &mut GuardedReader<R>,
        version: u32,
        type_code: u8,
        ctx: &SessionContext,
    ) -> RdbResult<Record> {
        let ty = RdbType::from_code(type_code).ok_or_else(|| {
            RdbError::Unsupported(format!("value type 0x{type_code:02x}"))
        })?;
        // Кадрирование записи, отложенное драйвером: сроки жизни и код
        // типа хвостовым байтом. Код типа снимается — при понижении
        // кодировки запись выпускается под другим кодом.
        let mut framing = io.take_captured();
        framing.pop();
        let key = io.with_guard(Guard::Capture, |io| parser::read_string(io))?;
        match self.filter.matches(ctx.db, type_code, &key) {
            Some(info) => {
                trace!(db = ctx.db, ?ty, key = %String::from_utf8_lossy(&key), "record kept");
                let record = io.with_guard(Guard::Capture, |io| {
                    self.hook
                        .transform(io, version, self.target_version, &key, &info, ty, ctx)
                })?;
                let declared = match &record {
                    Record::Value(value) => value.type_code,
                    Record::Skipped => type_code,
                };
                io.emit(&framing)?;
                io.emit(&[declared])?;
                io.flush_captured()?;
                Ok(record)
            }
            None => {
                trace!(db = ctx.db, ?ty, key = %String::from_utf8_lossy(&key), "record skipped");
                io.drop_captured();
                io.with_guard(Guard::Discard, |io| skip::skip_value(io, ty))?;
                Ok(Record::Skipped)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::{Cursor, Read as _},
        sync::{Arc, Mutex},
    };

    use super::*;
    use crate::{
        rdb::{encode_length, TYPE_STREAM_LISTPACKS, TYPE_STREAM_LISTPACKS_2, TYPE_STRING},
        transcode::filter::{KeyFilter, MatchAll},
    };

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn bytes(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }
    }

    impl std::io::Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn string(bytes: &[u8]) -> Vec<u8> {
        let mut out = encode_length(bytes.len() as u64);
        out.extend_from_slice(bytes);
        out
    }

    fn string_record(type_code: u8, key: &[u8], value: &[u8]) -> Vec<u8> {
        let mut out = vec![type_code];
        out.extend(string(key));
        out.extend(string(value));
        out
    }

    /// Читает код типа под `Capture`, как это делает цикл драйвера.
    fn capture_record_tag(io: &mut GuardedReader<Cursor<Vec<u8>>>) -> u8 {
        let mut tag = [0u8; 1];
        io.with_guard(Guard::Capture, |io| io.read_exact(&mut tag))
            .unwrap();
        tag[0]
    }

    #[test]
    fn test_matched_record_is_mirrored() {
        let data = string_record(TYPE_STRING, b"alpha", b"payload");
        let out = SharedBuf::default();
        let mut io = GuardedReader::new(Cursor::new(data.clone()));
        io.attach_sink(Box::new(out.clone()));

        let mut d = Dispatcher::new(MatchAll, DefaultHook);
        let tag = capture_record_tag(&mut io);
        let record = d
            .dispatch(&mut io, 11, tag, &SessionContext::default())
            .unwrap();

        assert!(!record.is_skipped());
        assert_eq!(out.bytes(), data);
        assert_eq!(io.guard(), Guard::Mirror);
    }

    #[test]
    fn test_unmatched_record_leaves_no_bytes() {
        let data = string_record(TYPE_STRING, b"alpha", b"payload");
        let out = SharedBuf::default();
        let mut io = GuardedReader::new(Cursor::new(data));
        io.attach_sink(Box::new(out.clone()));

        let filter = KeyFilter::new().keys(["other"]).unwrap();
        let mut d = Dispatcher::new(filter, DefaultHook);
        let tag = capture_record_tag(&mut io);
        let record = d
            .dispatch(&mut io, 11, tag, &SessionContext::default())
            .unwrap();

        assert!(record.is_skipped());
        assert!(out.bytes().is_empty());
        assert_eq!(io.guard(), Guard::Mirror);
    }

    #[test]
    fn test_unmatched_record_fully_consumed() {
        let mut data = string_record(TYPE_STRING, b"alpha", b"payload");
        data.push(0x42);
        let mut io = GuardedReader::new(Cursor::new(data));

        let filter = KeyFilter::new().keys(["other"]).unwrap();
        let mut d = Dispatcher::new(filter, DefaultHook);
        let tag = capture_record_tag(&mut io);
        d.dispatch(&mut io, 11, tag, &SessionContext::default())
            .unwrap();

        let mut marker = [0u8; 1];
        io.read_exact(&mut marker).unwrap();
        assert_eq!(marker[0], 0x42);
    }

    #[test]
    fn test_unknown_type_code_is_unsupported() {
        let mut io = GuardedReader::new(Cursor::new(Vec::new()));
        let mut d = Dispatcher::new(MatchAll, DefaultHook);
        assert!(matches!(
            d.dispatch(&mut io, 11, 0xEE, &SessionContext::default()),
            Err(RdbError::Unsupported(_))
        ));
    }

    /// Минимальное тело стрима без записей и групп; `v2` добавляет счётчики
    /// формата 10+.
    fn stream_body(v2: bool) -> Vec<u8> {
        let mut v = Vec::new();
        v.extend(encode_length(0)); // listpacks
        v.extend(encode_length(0)); // length
        v.extend(encode_length(1234)); // last id ms
        v.extend(encode_length(7)); // last id seq
        if v2 {
            v.extend(encode_length(1)); // first id ms
            v.extend(encode_length(0)); // first id seq
            v.extend(encode_length(0)); // max deleted ms
            v.extend(encode_length(0)); // max deleted seq
            v.extend(encode_length(3)); // entries added
        }
        v.extend(encode_length(0)); // группы
        v
    }

    fn stream_record(v2: bool) -> Vec<u8> {
        let mut data = vec![if v2 {
            TYPE_STREAM_LISTPACKS_2
        } else {
            TYPE_STREAM_LISTPACKS
        }];
        data.extend(string(b"stream-key"));
        data.extend(stream_body(v2));
        data
    }

    #[test]
    fn test_stream_downgrade_sets_declared_type() {
        let data = stream_record(true);

        let mut io = GuardedReader::new(Cursor::new(data.clone()));
        let mut d = Dispatcher::new(MatchAll, DefaultHook).with_target_version(9);
        let tag = capture_record_tag(&mut io);
        let record = d
            .dispatch(&mut io, 11, tag, &SessionContext::default())
            .unwrap();
        match record {
            Record::Value(v) => assert_eq!(v.type_code, TYPE_STREAM_LISTPACKS),
            Record::Skipped => panic!("expected a value record"),
        }

        // Без целевой версии тип сохраняется.
        let mut io = GuardedReader::new(Cursor::new(data));
        let mut d = Dispatcher::new(MatchAll, DefaultHook);
        let tag = capture_record_tag(&mut io);
        let record = d
            .dispatch(&mut io, 11, tag, &SessionContext::default())
            .unwrap();
        match record {
            Record::Value(v) => assert_eq!(v.type_code, TYPE_STREAM_LISTPACKS_2),
            Record::Skipped => panic!("expected a value record"),
        }
    }

    #[test]
    fn test_stream_downgrade_retags_output_bytes() {
        let data = stream_record(true);
        let out = SharedBuf::default();
        let mut io = GuardedReader::new(Cursor::new(data));
        io.attach_sink(Box::new(out.clone()));

        let mut d = Dispatcher::new(MatchAll, DefaultHook).with_target_version(9);
        let tag = capture_record_tag(&mut io);
        d.dispatch(&mut io, 11, tag, &SessionContext::default())
            .unwrap();

        // Выпущенная запись целиком в старой форме: код типа понижен,
        // счётчики v2 в тело не попали.
        assert_eq!(out.bytes(), stream_record(false));
    }

    struct RenameFilter;

    impl Filter for RenameFilter {
        fn matches(&self, _db: u64, _type_code: u8, _key: &[u8]) -> Option<MatchInfo> {
            Some(MatchInfo {
                rename_to: Some(b"fresh-name".to_vec()),
            })
        }
    }

    #[test]
    fn test_rename_payload_reaches_record() {
        let data = string_record(TYPE_STRING, b"stale-name", b"payload");
        let out = SharedBuf::default();
        let mut io = GuardedReader::new(Cursor::new(data.clone()));
        io.attach_sink(Box::new(out.clone()));

        let mut d = Dispatcher::new(RenameFilter, DefaultHook);
        let tag = capture_record_tag(&mut io);
        let record = d
            .dispatch(&mut io, 11, tag, &SessionContext::default())
            .unwrap();

        match record {
            Record::Value(v) => assert_eq!(v.key, b"fresh-name"),
            Record::Skipped => panic!("expected a value record"),
        }
        // Провод не тронут: переименование несёт только запись.
        assert_eq!(out.bytes(), data);
    }
}
