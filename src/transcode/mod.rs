//! Движок транскодирования снапшотов.
//!
//! ## Модули
//!
//! - [`filter`] — интерфейс отбора ключей и готовые реализации
//! - [`dispatch`] — диспетчер типов: ключ → фильтр → hook или пропуск
//! - [`driver`] — цикл обхода снапшота и трейт визитёра
//! - [`backup`] — конкретный режим: фильтрованная копия снапшота
//! - [`resp`] — кодирование команд в проволочный формат массивов

pub mod backup;
pub mod dispatch;
pub mod driver;
pub mod filter;
pub mod resp;

pub use backup::*;
pub use dispatch::*;
pub use driver::*;
pub use filter::*;
pub use resp::*;
