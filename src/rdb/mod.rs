//! Примитивы формата RDB.
//!
//! ## Модули
//!
//! - [`constants`] — опкоды, коды типов значений, спец-кодировки строк
//! - [`parser`] — декодер примитивов: длины, строки, числа, LZF
//! - [`encoder`] — кодирование длин для подмены участков потока
//! - [`skip`] — продвижение по потоку мимо значения без построения объектов
//!
//! Используется диспетчером и режимами транскодирования.

pub mod constants;
pub mod encoder;
pub mod parser;
pub mod skip;

// Публичный экспорт всех типов и функций из вложенных модулей,
// чтобы упростить доступ к ним из внешнего кода.
pub use constants::*;
pub use encoder::*;
pub use parser::*;
pub use skip::*;
