//! Перехват «сырых» байтов исходного потока.
//!
//! Каждый байт, физически прочитанный декодером, проходит через
//! [`GuardedReader`] и направляется согласно текущему режиму:
//!
//! - [`Guard::Mirror`] — байты зеркалируются в выходной sink как есть
//!   (режим покоя, воспроизводит источник байт-в-байт);
//! - [`Guard::Capture`] — байты откладываются в буфер до явного решения:
//!   [`GuardedReader::flush_captured`] отдаёт их в sink без изменений,
//!   [`GuardedReader::drop_captured`] отбрасывает;
//! - [`Guard::Discard`] — байты отбрасываются сразу, в выход не попадают.
//!
//! [`GuardedReader::emit`] пишет в sink напрямую, минуя перехват, — так
//! режим транскодирования подменяет участок потока свежезакодированными
//! байтами (например, SELECTDB с другим индексом базы).
//!
//! Sink несёт накопитель CRC64 по всем записанным байтам; итог становится
//! 8-байтовым трейлером резервной копии.

use std::io::{self, Read, Write};

use crc::{Crc, CRC_64_REDIS};

static CRC64: Crc<u64> = Crc::<u64>::new(&CRC_64_REDIS);

/// CRC64 по срезу байтов (полином RDB-трейлера).
pub fn crc64(bytes: &[u8]) -> u64 {
    CRC64.checksum(bytes)
}

/// Режим перехвата прочитанных байтов.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Guard {
    /// Зеркалировать в sink (режим покоя).
    Mirror,
    /// Откладывать для явного flush/drop/emit.
    Capture,
    /// Отбрасывать.
    Discard,
}

/// Writer-обёртка, считающая CRC64 на лету.
///
/// Обновляет digest при каждой записи, не требуя буферизации данных.
pub struct CrcWriter<W: Write> {
    inner: W,
    digest: crc::Digest<'static, u64>,
}

impl<W: Write> CrcWriter<W> {
    pub fn new(inner: W) -> Self {
        Self {
            inner,
            digest: CRC64.digest(),
        }
    }

    /// Текущее значение CRC64 по всем записанным байтам.
    pub fn crc64(&self) -> u64 {
        self.digest.clone().finalize()
    }

    pub fn into_inner(self) -> W {
        self.inner
    }
}

impl<W: Write> Write for CrcWriter<W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.digest.update(buf);
        self.inner.write_all(buf)?;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

/// Обёртка над исходным потоком: единственный потребитель его байтов на
/// время декодирования.
///
/// Состояние (режим, sink, capture-буфер) принадлежит одной сессии;
/// параллельные сессии используют независимые экземпляры.
pub struct GuardedReader<R> {
    inner: R,
    guard: Guard,
    pending: Vec<u8>,
    sink: Option<CrcWriter<Box<dyn Write + Send>>>,
}

impl<R: Read> GuardedReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            guard: Guard::Mirror,
            pending: Vec::new(),
            sink: None,
        }
    }

    pub fn guard(&self) -> Guard {
        self.guard
    }

    /// Подключает новый sink, заменяя прежний (и его CRC-накопитель).
    /// Остатки capture-буфера от прежней сессии отбрасываются.
    pub fn attach_sink(&mut self, sink: Box<dyn Write + Send>) {
        self.pending.clear();
        self.sink = Some(CrcWriter::new(sink));
    }

    /// Закрывает текущий sink: flush и drop. Идемпотентно.
    pub fn detach_sink(&mut self) -> io::Result<()> {
        if let Some(mut sink) = self.sink.take() {
            sink.flush()?;
        }
        Ok(())
    }

    pub fn has_sink(&self) -> bool {
        self.sink.is_some()
    }

    /// CRC64 всех байтов, записанных в текущий sink.
    pub fn crc64(&self) -> Option<u64> {
        self.sink.as_ref().map(|s| s.crc64())
    }

    /// Пишет байты в sink напрямую, минуя перехват.
    pub fn emit(&mut self, bytes: &[u8]) -> io::Result<()> {
        if let Some(sink) = &mut self.sink {
            sink.write_all(bytes)?;
        }
        Ok(())
    }

    /// Отдаёт накопленный capture-буфер в sink без изменений.
    pub fn flush_captured(&mut self) -> io::Result<()> {
        if !self.pending.is_empty() {
            if let Some(sink) = &mut self.sink {
                sink.write_all(&self.pending)?;
            }
            self.pending.clear();
        }
        Ok(())
    }

    /// Отбрасывает накопленный capture-буфер.
    pub fn drop_captured(&mut self) {
        self.pending.clear();
    }

    /// Забирает накопленный capture-буфер, не записывая его. Вызывающий
    /// решает судьбу байтов сам — например, выпускает их через [`Self::emit`]
    /// с подменённым кодом типа.
    pub fn take_captured(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.pending)
    }

    /// Дисциплина push/run/restore: установить режим, выполнить шаг,
    /// восстановить прежний режим — и при успехе, и при ошибке.
    pub fn with_guard<T, E>(
        &mut self,
        guard: Guard,
        f: impl FnOnce(&mut Self) -> Result<T, E>,
    ) -> Result<T, E> {
        let prev = self.guard;
        self.guard = guard;
        let out = f(self);
        self.guard = prev;
        out
    }
}

impl<R: Read> Read for GuardedReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        if n > 0 {
            match self.guard {
                Guard::Mirror => {
                    if let Some(sink) = &mut self.sink {
                        sink.write_all(&buf[..n])?;
                    }
                }
                Guard::Capture => self.pending.extend_from_slice(&buf[..n]),
                Guard::Discard => {}
            }
        }
        Ok(n)
    }
}

#[cfg(test)]
mod tests {
    use std::{
        io::Cursor,
        sync::{Arc, Mutex},
    };

    use super::*;

    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl SharedBuf {
        fn bytes(&self) -> Vec<u8> {
            self.0.lock().unwrap().clone()
        }
    }

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn reader_with_sink(data: &[u8]) -> (GuardedReader<Cursor<Vec<u8>>>, SharedBuf) {
        let out = SharedBuf::default();
        let mut io = GuardedReader::new(Cursor::new(data.to_vec()));
        io.attach_sink(Box::new(out.clone()));
        (io, out)
    }

    #[test]
    fn test_mirror_writes_through() {
        let (mut io, out) = reader_with_sink(b"abcdef");
        let mut buf = [0u8; 6];
        io.read_exact(&mut buf).unwrap();
        assert_eq!(out.bytes(), b"abcdef");
    }

    #[test]
    fn test_discard_drops_bytes() {
        let (mut io, out) = reader_with_sink(b"abcdef");
        let mut buf = [0u8; 3];
        io.with_guard(Guard::Discard, |io| io.read_exact(&mut buf))
            .unwrap();
        let mut rest = [0u8; 3];
        io.read_exact(&mut rest).unwrap();
        assert_eq!(out.bytes(), b"def");
    }

    #[test]
    fn test_capture_flush_and_drop() {
        let (mut io, out) = reader_with_sink(b"abcdef");
        let mut buf = [0u8; 3];
        io.with_guard(Guard::Capture, |io| io.read_exact(&mut buf))
            .unwrap();
        assert!(out.bytes().is_empty());
        io.flush_captured().unwrap();
        assert_eq!(out.bytes(), b"abc");

        io.with_guard(Guard::Capture, |io| io.read_exact(&mut buf))
            .unwrap();
        io.drop_captured();
        assert_eq!(out.bytes(), b"abc");
    }

    #[test]
    fn test_take_captured_hands_bytes_back() {
        let (mut io, out) = reader_with_sink(b"abcdef");
        let mut buf = [0u8; 3];
        io.with_guard(Guard::Capture, |io| io.read_exact(&mut buf))
            .unwrap();
        let taken = io.take_captured();
        assert_eq!(taken, b"abc");
        // Буфер пуст: последующий flush ничего не пишет.
        io.flush_captured().unwrap();
        assert!(out.bytes().is_empty());
    }

    #[test]
    fn test_emit_bypasses_interception() {
        let (mut io, out) = reader_with_sink(b"abc");
        let mut buf = [0u8; 3];
        io.with_guard(Guard::Discard, |io| io.read_exact(&mut buf))
            .unwrap();
        io.emit(b"XYZ").unwrap();
        assert_eq!(out.bytes(), b"XYZ");
    }

    #[test]
    fn test_with_guard_restores_on_error() {
        let (mut io, _out) = reader_with_sink(b"");
        let res: Result<(), io::Error> = io.with_guard(Guard::Discard, |io| {
            let mut buf = [0u8; 1];
            io.read_exact(&mut buf) // EOF
        });
        assert!(res.is_err());
        assert_eq!(io.guard(), Guard::Mirror);
    }

    #[test]
    fn test_nested_guard_restores_outer_mode() {
        let (mut io, out) = reader_with_sink(b"abcd");
        let mut buf = [0u8; 1];
        io.with_guard(Guard::Capture, |io| {
            io.read_exact(&mut buf)?;
            io.with_guard(Guard::Discard, |io| io.read_exact(&mut buf))?;
            io.read_exact(&mut buf)
        })
        .unwrap();
        io.flush_captured().unwrap();
        // Внутренний Discard не попал ни в буфер, ни в выход.
        assert_eq!(out.bytes(), b"ac");
    }

    #[test]
    fn test_crc_matches_helper() {
        let (mut io, out) = reader_with_sink(b"snapshot-bytes");
        let mut buf = [0u8; 14];
        io.read_exact(&mut buf).unwrap();
        assert_eq!(io.crc64(), Some(crc64(&out.bytes())));
    }

    #[test]
    fn test_attach_sink_resets_crc() {
        let (mut io, _out) = reader_with_sink(b"abcdef");
        let mut buf = [0u8; 3];
        io.read_exact(&mut buf).unwrap();
        assert_ne!(io.crc64(), Some(0));

        let fresh = SharedBuf::default();
        io.attach_sink(Box::new(fresh));
        assert_eq!(io.crc64(), Some(crc64(b"")));
    }
}
