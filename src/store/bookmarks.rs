//! Операции над закладками: переключение, полная перезагрузка набора и
//! сверка открытой карточки с набором. Семантика разветвления по трём
//! представлениям повторяет поведение экранов списка/деталей/избранного.

use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::models::{Event, EventRow};
use crate::services::events::EVENT_COLUMNS;

use super::EventsStore;

#[derive(Debug, Deserialize)]
struct BookmarkRow {
    event_id: i64,
}

impl EventsStore {
    /// Переключает закладку (user, event): ровно одна удалённая мутация.
    /// Повторный вызов для того же события до завершения первого
    /// отклоняется, а не порождает вторую конфликтующую мутацию.
    /// Возвращает новое значение флага.
    pub async fn toggle_bookmark(
        &self,
        event_id: i64,
        user_id: Uuid,
        currently_bookmarked: bool,
    ) -> Result<bool> {
        if !self.begin_toggle(event_id) {
            return Err(Error::ToggleInFlight);
        }
        let result = self
            .toggle_bookmark_inner(event_id, user_id, currently_bookmarked)
            .await;
        self.finish_toggle(event_id);
        result
    }

    async fn toggle_bookmark_inner(
        &self,
        event_id: i64,
        user_id: Uuid,
        currently_bookmarked: bool,
    ) -> Result<bool> {
        // Сначала удалённая мутация; локальное состояние не трогаем,
        // пока бэкенд не подтвердил - откатывать будет нечего.
        let remote = if currently_bookmarked {
            self.gateway()
                .delete("user_bookmarks")
                .eq("user_id", user_id)
                .eq("event_id", event_id)
                .send()
                .await
        } else {
            self.gateway()
                .insert(
                    "user_bookmarks",
                    &json!({ "user_id": user_id, "event_id": event_id }),
                )
                .await
        };

        if let Err(e) = remote {
            error!("Bookmark toggle failed for event {}: {:?}", event_id, e);
            return Err(e);
        }

        let is_bookmarked = !currently_bookmarked;
        self.apply_bookmark_update(event_id, is_bookmarked);
        info!(
            "Event {} {} bookmarks",
            event_id,
            if is_bookmarked { "added to" } else { "removed from" }
        );
        Ok(is_bookmarked)
    }

    // Разветвляет новое значение флага по всем трём представлениям
    fn apply_bookmark_update(&self, event_id: i64, is_bookmarked: bool) {
        self.with_state(|state| {
            if is_bookmarked {
                // Снимок берём из списка или открытой карточки - экран
                // избранного рендерит полные карточки без повторной выборки
                let snapshot = state
                    .events
                    .iter()
                    .find(|e| e.id == event_id)
                    .cloned()
                    .or_else(|| state.selected.clone().filter(|e| e.id == event_id));
                if let Some(mut event) = snapshot {
                    if !state.bookmarked.iter().any(|e| e.id == event_id) {
                        event.is_bookmarked = true;
                        state.bookmarked.push(event);
                    }
                }
            } else {
                state.bookmarked.retain(|e| e.id != event_id);
            }

            if let Some(event) = state.events.iter_mut().find(|e| e.id == event_id) {
                event.is_bookmarked = is_bookmarked;
            }
            if let Some(selected) = state.selected.as_mut() {
                if selected.id == event_id {
                    selected.is_bookmarked = is_bookmarked;
                }
            }
        });
    }

    /// Полностью заменяет набор закладок свежей выборкой. Вызывается при
    /// входе на экран избранного и после появления id пользователя.
    pub async fn load_bookmarks(&self, user_id: Uuid) -> Result<usize> {
        match self.load_bookmarks_inner(user_id).await {
            Ok(events) => {
                let count = events.len();
                self.with_state(|state| {
                    state.bookmarked = events;
                    state.bookmarks_error = None;
                    // Открытая карточка сверяется с новым набором
                    if let Some(selected) = state.selected.as_mut() {
                        selected.is_bookmarked =
                            state.bookmarked.iter().any(|e| e.id == selected.id);
                    }
                });
                Ok(count)
            }
            Err(e) => {
                error!("Failed to load bookmarked events: {:?}", e);
                self.with_state(|state| {
                    state.bookmarked.clear();
                    state.bookmarks_error = Some(format!("Failed to load bookmarked events: {e}"));
                    if let Some(selected) = state.selected.as_mut() {
                        selected.is_bookmarked = false;
                    }
                });
                Err(e)
            }
        }
    }

    async fn load_bookmarks_inner(&self, user_id: Uuid) -> Result<Vec<Event>> {
        let rows: Vec<BookmarkRow> = self
            .gateway()
            .select("user_bookmarks")
            .columns("event_id")
            .eq("user_id", user_id)
            .fetch()
            .await?;

        let event_ids: Vec<i64> = rows.into_iter().map(|r| r.event_id).collect();
        if event_ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<EventRow> = self
            .gateway()
            .select("events")
            .columns(EVENT_COLUMNS)
            .in_list("id", &event_ids)
            .order("date", true)
            .order("time", true)
            .fetch()
            .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                let mut event = row.into_event();
                event.is_bookmarked = true;
                event
            })
            .collect())
    }

    /// Сверка: при расхождении карточки и набора закладок набор считается
    /// авторитетным и флаг карточки исправляется.
    pub fn reconcile_selected(&self) {
        self.with_state(|state| {
            if let Some(selected) = state.selected.as_mut() {
                let in_set = state.bookmarked.iter().any(|e| e.id == selected.id);
                if selected.is_bookmarked != in_set {
                    selected.is_bookmarked = in_set;
                }
            }
        });
    }
}
