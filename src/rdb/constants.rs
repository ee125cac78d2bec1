//! Опкоды и коды типов бинарного формата RDB.
//!
//! Каждая запись снапшота начинается с однобайтового кода: либо служебный
//! опкод (выбор базы, вспомогательное поле, конец файла), либо код типа
//! значения, за которым следуют ключ и само значение.

/// Магическая строка в начале снапшота, за ней 4 ASCII-цифры версии.
pub const RDB_MAGIC: &[u8; 5] = b"REDIS";

// ==== Опкоды ====

/// Определение функции (формат 7.0+), полезная нагрузка — одна строка.
pub const OP_FUNCTION2: u8 = 245;
/// Устаревшее определение функции (пре-релизный формат 7.0).
pub const OP_FUNCTION: u8 = 246;
/// Вспомогательные данные модуля.
pub const OP_MODULE_AUX: u8 = 247;
/// LRU idle-время следующей записи.
pub const OP_IDLE: u8 = 248;
/// LFU-частота следующей записи (1 байт).
pub const OP_FREQ: u8 = 249;
/// Вспомогательное поле заголовка: имя и значение.
pub const OP_AUX: u8 = 250;
/// Подсказки размеров хеш-таблиц базы (2 длины).
pub const OP_RESIZEDB: u8 = 251;
/// Срок жизни следующей записи в миллисекундах (8 байт LE).
pub const OP_EXPIRETIME_MS: u8 = 252;
/// Срок жизни следующей записи в секундах (4 байта LE).
pub const OP_EXPIRETIME: u8 = 253;
/// Переключение логической базы, далее её индекс длиной.
pub const OP_SELECTDB: u8 = 254;
/// Конец данных; в версиях 5+ далее 8-байтовый CRC64-трейлер.
pub const OP_EOF: u8 = 255;

// ==== Коды типов значений ====

pub const TYPE_STRING: u8 = 0;
pub const TYPE_LIST: u8 = 1;
pub const TYPE_SET: u8 = 2;
pub const TYPE_ZSET: u8 = 3;
pub const TYPE_HASH: u8 = 4;
pub const TYPE_ZSET_2: u8 = 5;
pub const TYPE_MODULE: u8 = 6;
pub const TYPE_MODULE_2: u8 = 7;
pub const TYPE_HASH_ZIPMAP: u8 = 9;
pub const TYPE_LIST_ZIPLIST: u8 = 10;
pub const TYPE_SET_INTSET: u8 = 11;
pub const TYPE_ZSET_ZIPLIST: u8 = 12;
pub const TYPE_HASH_ZIPLIST: u8 = 13;
pub const TYPE_LIST_QUICKLIST: u8 = 14;
pub const TYPE_STREAM_LISTPACKS: u8 = 15;
pub const TYPE_HASH_LISTPACK: u8 = 16;
pub const TYPE_ZSET_LISTPACK: u8 = 17;
pub const TYPE_LIST_QUICKLIST_2: u8 = 18;
pub const TYPE_STREAM_LISTPACKS_2: u8 = 19;

// ==== Спец-кодировки строк (старшие биты длины = 11) ====

pub const ENC_INT8: u64 = 0;
pub const ENC_INT16: u64 = 1;
pub const ENC_INT32: u64 = 2;
pub const ENC_LZF: u64 = 3;

/// Байт длины: следующие 4 байта — 32-битная длина (big-endian).
pub const LEN_32BIT: u8 = 0x80;
/// Байт длины: следующие 8 байт — 64-битная длина (big-endian).
pub const LEN_64BIT: u8 = 0x81;

// ==== Опкоды сериализации module-2 ====

pub const MODULE_OPCODE_EOF: u64 = 0;
pub const MODULE_OPCODE_SINT: u64 = 1;
pub const MODULE_OPCODE_UINT: u64 = 2;
pub const MODULE_OPCODE_FLOAT: u64 = 3;
pub const MODULE_OPCODE_DOUBLE: u64 = 4;
pub const MODULE_OPCODE_STRING: u64 = 5;

/// Версия формата, с которой у stream-listpacks-2 появились счётчики
/// first-id / max-deleted-id / entries-added / entries-read.
pub const STREAM_V2_MIN_VERSION: u32 = 10;

/// Кодировка значения, известная диспетчеру.
///
/// Плоское перечисление вместо иерархии обработчиков: у каждого варианта
/// есть код на диске и путь пропуска в [`crate::rdb::skip`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RdbType {
    String,
    List,
    Set,
    ZSet,
    Hash,
    ZSet2,
    Module,
    Module2,
    HashZipmap,
    ListZiplist,
    SetIntset,
    ZSetZiplist,
    HashZiplist,
    ListQuicklist,
    StreamListpacks,
    HashListpack,
    ZSetListpack,
    ListQuicklist2,
    StreamListpacks2,
}

impl RdbType {
    pub fn from_code(code: u8) -> Option<Self> {
        let ty = match code {
            TYPE_STRING => Self::String,
            TYPE_LIST => Self::List,
            TYPE_SET => Self::Set,
            TYPE_ZSET => Self::ZSet,
            TYPE_HASH => Self::Hash,
            TYPE_ZSET_2 => Self::ZSet2,
            TYPE_MODULE => Self::Module,
            TYPE_MODULE_2 => Self::Module2,
            TYPE_HASH_ZIPMAP => Self::HashZipmap,
            TYPE_LIST_ZIPLIST => Self::ListZiplist,
            TYPE_SET_INTSET => Self::SetIntset,
            TYPE_ZSET_ZIPLIST => Self::ZSetZiplist,
            TYPE_HASH_ZIPLIST => Self::HashZiplist,
            TYPE_LIST_QUICKLIST => Self::ListQuicklist,
            TYPE_STREAM_LISTPACKS => Self::StreamListpacks,
            TYPE_HASH_LISTPACK => Self::HashListpack,
            TYPE_ZSET_LISTPACK => Self::ZSetListpack,
            TYPE_LIST_QUICKLIST_2 => Self::ListQuicklist2,
            TYPE_STREAM_LISTPACKS_2 => Self::StreamListpacks2,
            _ => return None,
        };
        Some(ty)
    }

    pub fn code(self) -> u8 {
        match self {
            Self::String => TYPE_STRING,
            Self::List => TYPE_LIST,
            Self::Set => TYPE_SET,
            Self::ZSet => TYPE_ZSET,
            Self::Hash => TYPE_HASH,
            Self::ZSet2 => TYPE_ZSET_2,
            Self::Module => TYPE_MODULE,
            Self::Module2 => TYPE_MODULE_2,
            Self::HashZipmap => TYPE_HASH_ZIPMAP,
            Self::ListZiplist => TYPE_LIST_ZIPLIST,
            Self::SetIntset => TYPE_SET_INTSET,
            Self::ZSetZiplist => TYPE_ZSET_ZIPLIST,
            Self::HashZiplist => TYPE_HASH_ZIPLIST,
            Self::ListQuicklist => TYPE_LIST_QUICKLIST,
            Self::StreamListpacks => TYPE_STREAM_LISTPACKS,
            Self::HashListpack => TYPE_HASH_LISTPACK,
            Self::ZSetListpack => TYPE_ZSET_LISTPACK,
            Self::ListQuicklist2 => TYPE_LIST_QUICKLIST_2,
            Self::StreamListpacks2 => TYPE_STREAM_LISTPACKS_2,
        }
    }
}
