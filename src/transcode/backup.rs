//! Режим резервной копии: фильтрованный/перенумерованный снапшот,
//! который сам является валидным снапшотом.
//!
//! Заголовочные записи зеркалируются как есть; записи-значения идут через
//! диспетчер; SELECTDB при заданной целевой базе подменяется свежезакодированным
//! вариантом. На конце данных пишется опкод 0xFF и 8-байтовый CRC64-трейлер
//! по всем предшествующим байтам выхода. Копия без трейлера неполна, и
//! читатель обязан считать её повреждённой.

use std::io::{Read, Write};

use serde::Deserialize;
use tracing::debug;

use super::{
    dispatch::{DefaultHook, Dispatcher, Record, SessionContext},
    driver::TranscodeVisitor,
    filter::Filter,
};
use crate::{
    error::{RdbError, RdbResult},
    guard::{Guard, GuardedReader},
    rdb::{encode_length, parser, OP_EOF, OP_SELECTDB},
};

/// Фабрика sink-ов: новый выход на каждый снапшот сессии.
pub type SinkFactory = Box<dyn FnMut() -> std::io::Result<Box<dyn Write + Send>> + Send>;

/// Конфигурация режима резервной копии; хост может десериализовать её
/// из своего файла настроек.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct BackupOptions {
    /// Целевой индекс базы: все исходные базы схлопываются в него.
    pub goal: Option<u64>,
    /// Целевая версия формата для понижающих преобразований кодировок.
    pub target_version: Option<u32>,
}

/// Конкретный режим транскодирования: резервная копия.
pub struct BackupVisitor<F: Filter> {
    dispatcher: Dispatcher<F, DefaultHook>,
    goal: Option<u64>,
    /// Какой SELECTDB уже выпущен в выход (для схлопывания баз).
    selected: Option<u64>,
    make_sink: SinkFactory,
}

impl<F: Filter> BackupVisitor<F> {
    pub fn new(filter: F, options: BackupOptions, make_sink: SinkFactory) -> Self {
        let mut dispatcher = Dispatcher::new(filter, DefaultHook);
        if let Some(version) = options.target_version {
            dispatcher = dispatcher.with_target_version(version);
        }
        Self {
            dispatcher,
            goal: options.goal,
            selected: None,
            make_sink,
        }
    }
}

impl<R: Read, F: Filter> TranscodeVisitor<R> for BackupVisitor<F> {
    /// Новый снапшот — новый sink и новый CRC-накопитель.
    fn start(&mut self, io: &mut GuardedReader<R>) -> RdbResult<()> {
        let sink = (self.make_sink)()?;
        io.attach_sink(sink);
        self.selected = None;
        debug!("backup sink opened");
        Ok(())
    }

    /// Конец данных: опкод 0xFF, затем CRC64 всех предшествующих байтов
    /// выхода 8-байтовым little-endian трейлером.
    fn end(&mut self, io: &mut GuardedReader<R>) -> RdbResult<()> {
        io.emit(&[OP_EOF])?;
        let crc = io
            .crc64()
            .ok_or_else(|| RdbError::Corrupted("no active backup sink".to_string()))?;
        io.emit(&crc.to_le_bytes())?;
        io.detach_sink()?;
        debug!(crc, "backup finalized");
        Ok(())
    }

    /// Переход к трансляции команд: копия закрывается без трейлера —
    /// команды в снапшотный выход не подмешиваются.
    fn command_stream(&mut self, io: &mut GuardedReader<R>) -> RdbResult<()> {
        io.detach_sink()?;
        Ok(())
    }

    fn close(&mut self, io: &mut GuardedReader<R>) -> RdbResult<()> {
        io.detach_sink()?;
        Ok(())
    }

    fn select_db(&mut self, io: &mut GuardedReader<R>, _version: u32) -> RdbResult<u64> {
        match self.goal {
            // Без целевой базы запись зеркалируется как есть.
            None => {
                io.flush_captured()?;
                parser::read_length(io)
            }
            // Иначе исходная запись потребляется под Discard, а в выход
            // уходит свежезакодированный SELECTDB с целевым индексом —
            // один на все исходные базы.
            Some(goal) => {
                io.drop_captured();
                io.with_guard(Guard::Discard, |io| parser::read_length(io))?;
                if self.selected != Some(goal) {
                    let mut frame = vec![OP_SELECTDB];
                    frame.extend(encode_length(goal));
                    io.emit(&frame)?;
                    self.selected = Some(goal);
                }
                Ok(goal)
            }
        }
    }

    fn value(
        &mut self,
        io: &mut GuardedReader<R>,
        version: u32,
        type_code: u8,
        ctx: &SessionContext,
    ) -> RdbResult<Record> {
        self.dispatcher.dispatch(io, version, type_code, ctx)
    }
}
