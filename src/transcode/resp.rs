//! Кодирование команд в проволочный формат массивов bulk-строк.
//!
//! Кадр: `*<argc>\r\n`, затем на каждый аргумент `$<len>\r\n<bytes>\r\n`.
//! Имя команды считается первым аргументом; отдельно переданный ключ —
//! вторым. Байты аргументов не экранируются: двоичная безопасность
//! обеспечивается явными префиксами длины. Единственный побочный эффект —
//! запись в переданный sink.

use std::io::{self, Write};

/// Кодирует команду с аргументами одним кадром-массивом.
pub fn emit_command<W: Write>(out: &mut W, command: &[u8], args: &[&[u8]]) -> io::Result<()> {
    write!(out, "*{}\r\n", args.len() + 1)?;
    write_bulk(out, command)?;
    for arg in args {
        write_bulk(out, arg)?;
    }
    Ok(())
}

/// Кодирует команду с ключом и аргументами; ключ идёт сразу за именем.
pub fn emit_keyed_command<W: Write>(
    out: &mut W,
    command: &[u8],
    key: &[u8],
    args: &[&[u8]],
) -> io::Result<()> {
    write!(out, "*{}\r\n", args.len() + 2)?;
    write_bulk(out, command)?;
    write_bulk(out, key)?;
    for arg in args {
        write_bulk(out, arg)?;
    }
    Ok(())
}

fn write_bulk<W: Write>(out: &mut W, bytes: &[u8]) -> io::Result<()> {
    write!(out, "${}\r\n", bytes.len())?;
    out.write_all(bytes)?;
    out.write_all(b"\r\n")
}
