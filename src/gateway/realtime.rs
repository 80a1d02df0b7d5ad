//! realtime
//!
//! Учёт подписок на изменения строк и доставка уведомлений потребителям.
//! Websocket-транспорт сюда не входит: внешний слой (SDK-транспорт в
//! приложении, моки в тестах) скармливает изменения через `publish`, а
//! хаб раздаёт их живым подпискам, чей фильтр совпал.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::debug;

/// Вид изменения строки.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Insert,
    Update,
    Delete,
}

/// Уведомление об изменении одной строки. Для Insert/Update `row` - новая
/// строка; для Delete - то, что транспорт знает о старой (обычно только ключи).
#[derive(Debug, Clone)]
pub struct RowChange {
    pub kind: ChangeKind,
    pub row: Value,
}

impl RowChange {
    pub fn new(kind: ChangeKind, row: Value) -> Self {
        Self { kind, row }
    }

    // id строки, если транспорт его передал
    pub(crate) fn row_i64(&self, column: &str) -> Option<i64> {
        self.row.get(column).and_then(Value::as_i64)
    }

    pub(crate) fn row_str(&self, column: &str) -> Option<&str> {
        self.row.get(column).and_then(Value::as_str)
    }
}

/// Фильтр подписки, аналог `filter: "event_id=eq.42"` у SDK.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeFilter {
    Eq(String, String),
}

impl ChangeFilter {
    pub fn eq(column: &str, value: impl ToString) -> Self {
        ChangeFilter::Eq(column.to_string(), value.to_string())
    }

    fn matches(&self, row: &Value) -> bool {
        let ChangeFilter::Eq(column, expected) = self;
        match row.get(column) {
            Some(Value::String(s)) => s == expected,
            Some(Value::Number(n)) => n.to_string() == *expected,
            // Delete-уведомления несут только ключи старой строки;
            // колонка фильтра может отсутствовать - пропускаем такие.
            Some(Value::Null) | None => true,
            Some(_) => false,
        }
    }
}

struct SubEntry {
    table: String,
    filter: ChangeFilter,
    tx: mpsc::UnboundedSender<RowChange>,
}

/// Подписка; освобождается явно через `RealtimeHub::unsubscribe`.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
}

/// Реестр активных подписок с fan-out доставкой.
#[derive(Clone, Default)]
pub struct RealtimeHub {
    subs: Arc<Mutex<HashMap<u64, SubEntry>>>,
    next_id: Arc<AtomicU64>,
}

impl RealtimeHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Открывает подписку на изменения строк таблицы, прошедшие фильтр.
    pub fn subscribe(
        &self,
        table: &str,
        filter: ChangeFilter,
    ) -> (Subscription, mpsc::UnboundedReceiver<RowChange>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subs.lock().unwrap().insert(
            id,
            SubEntry {
                table: table.to_string(),
                filter,
                tx,
            },
        );
        debug!("Realtime subscription {} opened for {}", id, table);
        (Subscription { id }, rx)
    }

    /// Явно освобождает подписку.
    pub fn unsubscribe(&self, sub: Subscription) {
        self.subs.lock().unwrap().remove(&sub.id);
        debug!("Realtime subscription {} released", sub.id);
    }

    /// Вход для транспортного слоя: раздаёт изменение совпавшим подпискам.
    pub fn publish(&self, table: &str, change: RowChange) {
        let mut subs = self.subs.lock().unwrap();
        // Получатель мог уйти, не отписавшись, - такие записи вычищаем
        subs.retain(|_, entry| {
            if entry.table != table || !entry.filter.matches(&change.row) {
                return true;
            }
            entry.tx.send(change.clone()).is_ok()
        });
    }

    pub fn active_subscriptions(&self) -> usize {
        self.subs.lock().unwrap().len()
    }
}
