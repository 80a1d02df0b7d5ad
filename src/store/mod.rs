//! store
//!
//! Единственный общий изменяемый ресурс между экранами: состояние списка
//! событий, открытой карточки и набора закладок. Все мутации флага
//! `is_bookmarked` проходят через операции этого модуля - ни один экран
//! не правит его напрямую.

pub mod bookmarks;

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use crate::gateway::GatewayClient;
use crate::models::Event;

/// Снимок состояния трёх представлений. После завершения любых операций
/// флаг закладки для одного события обязан совпадать во всех трёх.
#[derive(Debug, Clone, Default)]
pub struct EventsState {
    /// Текущий список событий (экран ленты).
    pub events: Vec<Event>,
    /// Открытая карточка события (экран деталей).
    pub selected: Option<Event>,
    /// Полные копии событий из закладок (экран избранного).
    pub bookmarked: Vec<Event>,
    /// Последняя ошибка загрузки ленты, для показа пользователю.
    pub last_error: Option<String>,
    /// Последняя ошибка загрузки закладок.
    pub bookmarks_error: Option<String>,
}

/// Владелец состояния с узким API мутаций. Экраны держат клон хэндла.
#[derive(Clone)]
pub struct EventsStore {
    gateway: GatewayClient,
    state: Arc<Mutex<EventsState>>,
    // События, для которых переключение закладки ещё не завершилось
    pending_toggles: Arc<Mutex<HashSet<i64>>>,
}

impl EventsStore {
    pub fn new(gateway: GatewayClient) -> Self {
        Self {
            gateway,
            state: Arc::new(Mutex::new(EventsState::default())),
            pending_toggles: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub(crate) fn gateway(&self) -> &GatewayClient {
        &self.gateway
    }

    /// Копия состояния для рендеринга.
    pub fn snapshot(&self) -> EventsState {
        self.state.lock().unwrap().clone()
    }

    /// Множество id событий в закладках - для обогащения свежих выборок.
    pub fn bookmarked_ids(&self) -> HashSet<i64> {
        self.state
            .lock()
            .unwrap()
            .bookmarked
            .iter()
            .map(|e| e.id)
            .collect()
    }

    pub(crate) fn set_events(&self, events: Vec<Event>) {
        let mut state = self.state.lock().unwrap();
        state.events = events;
        state.last_error = None;
    }

    pub(crate) fn set_events_error(&self, message: String) {
        let mut state = self.state.lock().unwrap();
        // Как и при любой неудачной загрузке, старый список не показываем
        state.events.clear();
        state.last_error = Some(message);
    }

    pub(crate) fn set_selected(&self, event: Option<Event>) {
        self.state.lock().unwrap().selected = event;
    }

    pub fn clear_selected(&self) {
        self.set_selected(None);
    }

    pub fn clear_errors(&self) {
        let mut state = self.state.lock().unwrap();
        state.last_error = None;
        state.bookmarks_error = None;
    }

    // Замок не пересекает await-точки: все мутации - короткие секции
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut EventsState) -> R) -> R {
        let mut state = self.state.lock().unwrap();
        f(&mut state)
    }

    pub(crate) fn begin_toggle(&self, event_id: i64) -> bool {
        self.pending_toggles.lock().unwrap().insert(event_id)
    }

    pub(crate) fn finish_toggle(&self, event_id: i64) {
        self.pending_toggles.lock().unwrap().remove(&event_id);
    }
}
