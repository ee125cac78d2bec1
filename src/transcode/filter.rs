//! Отбор ключей: какие записи снапшота попадают в выход.
//!
//! Сам язык правил остаётся за хостом; крейт задаёт интерфейс и даёт две
//! готовые реализации — «всё подряд» и glob-фильтр по имени ключа с
//! необязательным ограничением по базам и кодам типов.

use std::collections::HashSet;

use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::error::RdbResult;

/// Непрозрачная нагрузка совпадения, которую фильтр может приложить
/// к ключу (например, новое имя для режима переименования).
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct MatchInfo {
    pub rename_to: Option<Vec<u8>>,
}

/// Решение о включении записи.
pub trait Filter {
    /// `Some` — запись включается (с нагрузкой совпадения), `None` — нет.
    fn matches(&self, db: u64, type_code: u8, key: &[u8]) -> Option<MatchInfo>;
}

/// Фильтр, включающий каждую запись.
#[derive(Debug, Default, Clone, Copy)]
pub struct MatchAll;

impl Filter for MatchAll {
    fn matches(&self, _db: u64, _type_code: u8, _key: &[u8]) -> Option<MatchInfo> {
        Some(MatchInfo::default())
    }
}

/// Glob-фильтр по имени ключа с ограничением по базам и типам.
///
/// Пустой фильтр (`KeyFilter::new()`) эквивалентен [`MatchAll`].
#[derive(Debug, Default)]
pub struct KeyFilter {
    globs: Option<GlobSet>,
    dbs: Option<HashSet<u64>>,
    types: Option<HashSet<u8>>,
}

impl KeyFilter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ограничивает отбор glob-шаблонами имён ключей.
    pub fn keys<I, S>(mut self, patterns: I) -> RdbResult<Self>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            builder.add(Glob::new(pattern.as_ref())?);
        }
        self.globs = Some(builder.build()?);
        Ok(self)
    }

    /// Ограничивает отбор перечисленными индексами баз.
    pub fn dbs<I: IntoIterator<Item = u64>>(mut self, dbs: I) -> Self {
        self.dbs = Some(dbs.into_iter().collect());
        self
    }

    /// Ограничивает отбор перечисленными кодами типов значений.
    pub fn types<I: IntoIterator<Item = u8>>(mut self, types: I) -> Self {
        self.types = Some(types.into_iter().collect());
        self
    }
}

impl Filter for KeyFilter {
    fn matches(&self, db: u64, type_code: u8, key: &[u8]) -> Option<MatchInfo> {
        if let Some(dbs) = &self.dbs {
            if !dbs.contains(&db) {
                return None;
            }
        }
        if let Some(types) = &self.types {
            if !types.contains(&type_code) {
                return None;
            }
        }
        if let Some(globs) = &self.globs {
            let text = String::from_utf8_lossy(key);
            if !globs.is_match(text.as_ref()) {
                return None;
            }
        }
        Some(MatchInfo::default())
    }
}
