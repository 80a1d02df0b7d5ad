//! events.rs
//!
//! Сервис ленты событий: превращает спецификацию фильтра в один запрос к
//! бэкенду и кладёт результат в общий store.
//!
//! Ключевые компоненты:
//! 1.  **EventFilter**: структурная спецификация поиска (текст, категории,
//!     город, дата, время, цена) и правила её трансляции в предикаты.
//! 2.  **EventService**: выполнение выборок с дебаунсом и монотонной
//!     нумерацией запросов - ответ, пришедший позже более нового запроса,
//!     отбрасывается, а не затирает свежие результаты.
//! 3.  **Справочник категорий**: разовая выборка на сессию с кешем в памяти.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{NaiveDate, NaiveTime};
use serde_json::json;
use tokio::task::JoinHandle;
use tokio::time::Duration;
use tracing::{debug, error, info};
use uuid::Uuid;
use validator::Validate;

use crate::config::SearchConfig;
use crate::error::{Error, Result};
use crate::gateway::query::SelectBuilder;
use crate::gateway::GatewayClient;
use crate::models::{Category, Event, EventRow, NewEvent};
use crate::store::EventsStore;

/// Колонки события с присоединённым организатором и счётчиком комментариев.
pub const EVENT_COLUMNS: &str = "id,title,description,date,end_date,time,location,city,\
event_price,image_url,category_ids,latitude,longitude,\
profiles(username,avatar_url),comments(count)";

/// Спецификация фильтра ленты. Пустые поля не дают предикатов; границы цен
/// применяются всегда (по умолчанию покрывают весь допустимый диапазон).
#[derive(Debug, Clone)]
pub struct EventFilter {
    pub search_text: String,
    pub category_ids: Vec<i64>,
    pub city: String,
    pub date: Option<NaiveDate>,
    pub min_time: Option<NaiveTime>,
    pub max_time: Option<NaiveTime>,
    pub min_price: f64,
    pub max_price: f64,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            search_text: String::new(),
            category_ids: Vec::new(),
            city: String::new(),
            date: None,
            min_time: None,
            max_time: None,
            min_price: 0.0,
            max_price: 1000.0,
        }
    }
}

impl EventFilter {
    pub fn from_config(config: &SearchConfig) -> Self {
        Self {
            min_price: config.min_price,
            max_price: config.max_price,
            ..Self::default()
        }
    }

    /// Накладывает предикаты на select. Порядок и семантика зафиксированы:
    /// поиск - это OR по всем словам и всем трём полям сразу (совпадение
    /// любого слова в любом поле), не AND по словам.
    pub(crate) fn apply(&self, mut query: SelectBuilder) -> SelectBuilder {
        if !self.category_ids.is_empty() {
            // Пересечение множеств, не вложенность
            query = query.overlaps("category_ids", &self.category_ids);
        }

        let words: Vec<&str> = self.search_text.split_whitespace().collect();
        if !words.is_empty() {
            let conditions = words
                .iter()
                .map(|word| {
                    format!(
                        "title.ilike.%{word}%,description.ilike.%{word}%,location.ilike.%{word}%"
                    )
                })
                .collect::<Vec<_>>()
                .join(",");
            query = query.or(&conditions);
        }

        if !self.city.is_empty() {
            query = query.ilike("city", &format!("%{}%", self.city));
        }
        if let Some(date) = self.date {
            query = query.eq("date", date);
        }
        if let Some(min_time) = self.min_time {
            query = query.gte("time", min_time);
        }
        if let Some(max_time) = self.max_time {
            query = query.lte("time", max_time);
        }

        // Границы цен включительные и присутствуют всегда
        query = query
            .gte("event_price", self.min_price)
            .lte("event_price", self.max_price);

        // Единственный определённый порядок; при равных (date, time)
        // относительный порядок не специфицирован
        query.order("date", true).order("time", true)
    }
}

/// Сервис выборки событий поверх общего store.
#[derive(Clone)]
pub struct EventService {
    gateway: GatewayClient,
    store: EventsStore,
    debounce: Duration,
    // Номер последнего выданного запроса ленты
    issued: Arc<AtomicU64>,
    pending: Arc<Mutex<Option<JoinHandle<()>>>>,
    categories: Arc<Mutex<Vec<Category>>>,
}

impl EventService {
    pub fn new(gateway: GatewayClient, store: EventsStore, config: &SearchConfig) -> Self {
        Self {
            gateway,
            store,
            debounce: Duration::from_millis(config.debounce_ms),
            issued: Arc::new(AtomicU64::new(0)),
            pending: Arc::new(Mutex::new(None)),
            categories: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Немедленная выборка по фильтру. `Ok(None)` означает, что ответ
    /// устарел (после него уже выдан более новый запрос) и был отброшен.
    pub async fn fetch_events(&self, filter: &EventFilter) -> Result<Option<Vec<Event>>> {
        let seq = self.issued.fetch_add(1, Ordering::SeqCst) + 1;

        let query = filter.apply(self.gateway.select("events").columns(EVENT_COLUMNS));
        let result: Result<Vec<EventRow>> = query.fetch().await;

        if self.issued.load(Ordering::SeqCst) != seq {
            debug!("Dropping stale events response (seq {})", seq);
            return Ok(None);
        }

        match result {
            Ok(rows) => {
                let bookmarked = self.store.bookmarked_ids();
                let events: Vec<Event> = rows
                    .into_iter()
                    .map(|row| {
                        let mut event = row.into_event();
                        event.is_bookmarked = bookmarked.contains(&event.id);
                        event
                    })
                    .collect();
                self.store.set_events(events.clone());
                Ok(Some(events))
            }
            Err(e) => {
                error!("Failed to fetch events: {:?}", e);
                self.store
                    .set_events_error(format!("Failed to fetch events: {e}"));
                Err(e)
            }
        }
    }

    /// Отложенная выборка: быстрые правки фильтра схлопываются в один
    /// запрос. Новый вызов сбрасывает ожидающий таймер.
    pub fn request_events(&self, filter: EventFilter) {
        let mut pending = self.pending.lock().unwrap();
        if let Some(handle) = pending.take() {
            handle.abort();
        }
        let service = self.clone();
        *pending = Some(tokio::task::spawn(async move {
            tokio::time::sleep(service.debounce).await;
            // Ошибка уже записана в store для показа пользователю
            let _ = service.fetch_events(&filter).await;
        }));
    }

    /// Уход с экрана ленты: ожидающий таймер дебаунса отменяется.
    pub fn cancel_pending(&self) {
        if let Some(handle) = self.pending.lock().unwrap().take() {
            handle.abort();
        }
    }

    /// Загружает карточку события в слот selected общего store.
    pub async fn fetch_event_by_id(&self, event_id: i64) -> Result<Event> {
        // Прежняя карточка не должна мелькать, пока грузится новая
        self.store.set_selected(None);

        let row: EventRow = self
            .gateway
            .select("events")
            .columns(EVENT_COLUMNS)
            .eq("id", event_id)
            .fetch_single()
            .await
            .map_err(|e| if e.is_no_rows() { Error::NotFound } else { e })?;

        let mut event = row.into_event();
        event.is_bookmarked = self.store.bookmarked_ids().contains(&event.id);
        self.store.set_selected(Some(event.clone()));
        Ok(event)
    }

    /// События, созданные пользователем (экран "мои ивенты").
    pub async fn fetch_user_created_events(&self, user_id: Uuid) -> Result<Vec<Event>> {
        let rows: Vec<EventRow> = self
            .gateway
            .select("events")
            .columns(EVENT_COLUMNS)
            .eq("organizer_id", user_id)
            .order("date", true)
            .order("time", true)
            .fetch()
            .await?;

        let bookmarked = self.store.bookmarked_ids();
        Ok(rows
            .into_iter()
            .map(|row| {
                let mut event = row.into_event();
                event.is_bookmarked = bookmarked.contains(&event.id);
                event
            })
            .collect())
    }

    /// Справочник категорий; выборка делается один раз за сессию.
    pub async fn categories(&self) -> Result<Vec<Category>> {
        {
            let cached = self.categories.lock().unwrap();
            if !cached.is_empty() {
                return Ok(cached.clone());
            }
        }

        let categories: Vec<Category> = self
            .gateway
            .select("categories")
            .columns("id,name,parent_id")
            .order("name", true)
            .fetch()
            .await?;

        *self.categories.lock().unwrap() = categories.clone();
        info!("Loaded {} categories", categories.len());
        Ok(categories)
    }

    /// Создаёт событие от имени пользователя. Вся валидация - до
    /// какого-либо удалённого вызова.
    pub async fn create_event(&self, organizer_id: Uuid, new_event: &NewEvent) -> Result<Event> {
        new_event
            .validate()
            .map_err(|e| Error::Validation(e.to_string()))?;
        if let Some(end_date) = new_event.end_date {
            if end_date < new_event.date {
                return Err(Error::Validation(
                    "End date cannot be earlier than start date.".to_string(),
                ));
            }
        }

        let payload = json!({
            "organizer_id": organizer_id,
            "title": new_event.title,
            "description": new_event.description,
            "date": new_event.date,
            "end_date": new_event.end_date,
            "time": new_event.time,
            "location": new_event.location,
            "city": new_event.city,
            "event_price": new_event.event_price,
            "image_url": new_event.image_url,
            "category_ids": new_event.category_ids,
            "latitude": new_event.latitude,
            "longitude": new_event.longitude,
        });

        let rows: Vec<EventRow> = self.gateway.insert_returning("events", &payload).await?;
        let event = rows
            .into_iter()
            .next()
            .map(EventRow::into_event)
            .ok_or(Error::NotFound)?;
        info!("Created event {} '{}'", event.id, event.title);
        Ok(event)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{gateway_with_base, sample_event, store_with_base};
    use proptest::prelude::*;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn service(store: EventsStore, base: &str) -> EventService {
        EventService::new(
            gateway_with_base(base),
            store,
            &crate::config::SearchConfig {
                debounce_ms: 30,
                min_price: 0.0,
                max_price: 1000.0,
            },
        )
    }

    fn event_rows() -> serde_json::Value {
        serde_json::json!([
            {
                "id": 10,
                "title": "Kyiv Meetup",
                "date": "2025-09-10",
                "time": "18:30:00",
                "event_price": 0.0,
                "category_ids": [3],
                "profiles": {"username": "olena", "avatar_url": null},
                "comments": [{"count": 2}]
            }
        ])
    }

    #[tokio::test]
    async fn composes_full_filter_query() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/events"))
            // OR по всем словам и всем трём полям сразу
            .and(query_param(
                "or",
                "(title.ilike.%tech%,description.ilike.%tech%,location.ilike.%tech%,\
title.ilike.%kyiv%,description.ilike.%kyiv%,location.ilike.%kyiv%)",
            ))
            .and(query_param("category_ids", "ov.{3,7}"))
            .and(query_param("city", "ilike.%Kyiv%"))
            .and(query_param("date", "eq.2025-09-10"))
            .and(query_param("time", "gte.18:00:00"))
            .and(query_param("order", "date.asc,time.asc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(event_rows()))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_with_base(&server.uri());
        let service = service(store, &server.uri());

        let filter = EventFilter {
            search_text: "tech kyiv".to_string(),
            category_ids: vec![3, 7],
            city: "Kyiv".to_string(),
            date: Some("2025-09-10".parse().unwrap()),
            min_time: Some("18:00:00".parse().unwrap()),
            ..EventFilter::default()
        };
        let events = service.fetch_events(&filter).await.unwrap().unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].comments_count, 2);
    }

    #[tokio::test]
    async fn price_bounds_are_inclusive_and_always_sent() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/events"))
            .and(query_param("event_price", "gte.0"))
            .and(query_param("event_price", "lte.1000"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([])))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_with_base(&server.uri());
        let service = service(store, &server.uri());
        service
            .fetch_events(&EventFilter::default())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn enriches_with_bookmark_flag() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(event_rows()))
            .mount(&server)
            .await;

        let store = store_with_base(&server.uri());
        let mut bookmarked = sample_event(10);
        bookmarked.is_bookmarked = true;
        store.with_state(|s| s.bookmarked.push(bookmarked));

        let service = service(store.clone(), &server.uri());
        let events = service
            .fetch_events(&EventFilter::default())
            .await
            .unwrap()
            .unwrap();
        assert!(events[0].is_bookmarked);
        assert!(store.snapshot().events[0].is_bookmarked);
    }

    #[tokio::test]
    async fn stale_response_is_discarded() {
        crate::test_support::init_tracing();
        let server = MockServer::start().await;
        // Первый запрос (с поиском) отвечает медленно и "старыми" данными
        Mock::given(method("GET"))
            .and(path("/rest/v1/events"))
            .and(query_param(
                "or",
                "(title.ilike.%old%,description.ilike.%old%,location.ilike.%old%)",
            ))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_json(serde_json::json!([
                        {"id": 1, "title": "Stale", "date": "2025-01-01", "time": "10:00:00", "event_price": 0.0}
                    ]))
                    .set_delay(std::time::Duration::from_millis(200)),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/events"))
            .and(query_param(
                "or",
                "(title.ilike.%new%,description.ilike.%new%,location.ilike.%new%)",
            ))
            .respond_with(ResponseTemplate::new(200).set_body_json(event_rows()))
            .mount(&server)
            .await;

        let store = store_with_base(&server.uri());
        let service = service(store.clone(), &server.uri());

        let old_filter = EventFilter {
            search_text: "old".to_string(),
            ..EventFilter::default()
        };
        let new_filter = EventFilter {
            search_text: "new".to_string(),
            ..EventFilter::default()
        };

        let slow = {
            let service = service.clone();
            tokio::spawn(async move { service.fetch_events(&old_filter).await })
        };
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let fresh = service.fetch_events(&new_filter).await.unwrap().unwrap();
        assert_eq!(fresh[0].title, "Kyiv Meetup");

        // Медленный ответ пришёл позже - он отброшен, store не тронут
        let stale = slow.await.unwrap().unwrap();
        assert!(stale.is_none());
        assert_eq!(store.snapshot().events[0].title, "Kyiv Meetup");
    }

    #[tokio::test]
    async fn debounce_coalesces_rapid_requests() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(event_rows()))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_with_base(&server.uri());
        let service = service(store.clone(), &server.uri());

        // Три быстрых правки фильтра - один фактический запрос
        service.request_events(EventFilter::default());
        service.request_events(EventFilter::default());
        service.request_events(EventFilter::default());

        tokio::time::sleep(std::time::Duration::from_millis(150)).await;
        assert_eq!(store.snapshot().events.len(), 1);
    }

    #[tokio::test]
    async fn cancel_pending_stops_debounced_fetch() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/events"))
            .respond_with(ResponseTemplate::new(200).set_body_json(event_rows()))
            .expect(0)
            .mount(&server)
            .await;

        let store = store_with_base(&server.uri());
        let service = service(store, &server.uri());

        service.request_events(EventFilter::default());
        service.cancel_pending();
        tokio::time::sleep(std::time::Duration::from_millis(100)).await;
    }

    #[tokio::test]
    async fn fetch_failure_clears_list_and_records_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/events"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;

        let store = store_with_base(&server.uri());
        store.set_events(vec![sample_event(1)]);
        let service = service(store.clone(), &server.uri());

        assert!(service.fetch_events(&EventFilter::default()).await.is_err());
        let state = store.snapshot();
        assert!(state.events.is_empty());
        assert!(state.last_error.as_deref().unwrap().starts_with("Failed to fetch events"));
    }

    #[tokio::test]
    async fn fetch_event_by_id_fills_selected_slot() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/events"))
            .and(query_param("id", "eq.10"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "id": 10,
                "title": "Kyiv Meetup",
                "date": "2025-09-10",
                "time": "18:30:00",
                "event_price": 150.0,
                "comments": [{"count": 2}]
            })))
            .mount(&server)
            .await;

        let store = store_with_base(&server.uri());
        let mut bookmarked = sample_event(10);
        bookmarked.is_bookmarked = true;
        store.with_state(|s| s.bookmarked.push(bookmarked));

        let service = service(store.clone(), &server.uri());
        let event = service.fetch_event_by_id(10).await.unwrap();
        assert!(event.is_bookmarked);
        assert_eq!(store.snapshot().selected.unwrap().id, 10);
    }

    #[tokio::test]
    async fn missing_event_maps_to_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/events"))
            .respond_with(ResponseTemplate::new(406).set_body_json(serde_json::json!({
                "code": "PGRST116",
                "message": "JSON object requested, multiple (or no) rows returned"
            })))
            .mount(&server)
            .await;

        let store = store_with_base(&server.uri());
        let service = service(store, &server.uri());
        assert!(matches!(
            service.fetch_event_by_id(99).await.unwrap_err(),
            Error::NotFound
        ));
    }

    #[tokio::test]
    async fn categories_are_fetched_once_per_session() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/rest/v1/categories"))
            .and(query_param("order", "name.asc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!([
                {"id": 1, "name": "Art", "parent_id": null},
                {"id": 2, "name": "Music", "parent_id": null}
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_with_base(&server.uri());
        let service = service(store, &server.uri());
        assert_eq!(service.categories().await.unwrap().len(), 2);
        assert_eq!(service.categories().await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn create_event_validates_before_any_remote_call() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/events"))
            .respond_with(ResponseTemplate::new(201))
            .expect(0)
            .mount(&server)
            .await;

        let store = store_with_base(&server.uri());
        let service = service(store, &server.uri());

        let mut draft = NewEvent {
            title: String::new(),
            description: "d".to_string(),
            date: "2025-09-10".parse().unwrap(),
            end_date: None,
            time: "18:00:00".parse().unwrap(),
            location: "Hall".to_string(),
            city: "Kyiv".to_string(),
            event_price: 0.0,
            image_url: None,
            category_ids: vec![1],
            latitude: None,
            longitude: None,
        };
        assert!(matches!(
            service.create_event(uuid::Uuid::new_v4(), &draft).await,
            Err(Error::Validation(_))
        ));

        draft.title = "Expo".to_string();
        draft.end_date = Some("2025-09-01".parse().unwrap());
        let err = service
            .create_event(uuid::Uuid::new_v4(), &draft)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
        assert!(err.to_string().contains("End date"));

        draft.end_date = None;
        draft.category_ids = vec![1, 2, 3, 4, 5, 6];
        assert!(matches!(
            service.create_event(uuid::Uuid::new_v4(), &draft).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn create_event_returns_created_row() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/rest/v1/events"))
            .respond_with(ResponseTemplate::new(201).set_body_json(serde_json::json!([
                {
                    "id": 42,
                    "title": "Expo",
                    "date": "2025-09-10",
                    "time": "18:00:00",
                    "event_price": 0.0,
                    "category_ids": [1],
                    "comments": []
                }
            ])))
            .expect(1)
            .mount(&server)
            .await;

        let store = store_with_base(&server.uri());
        let service = service(store, &server.uri());

        let draft = NewEvent {
            title: "Expo".to_string(),
            description: "Open expo".to_string(),
            date: "2025-09-10".parse().unwrap(),
            end_date: Some("2025-09-11".parse().unwrap()),
            time: "18:00:00".parse().unwrap(),
            location: "Hall".to_string(),
            city: "Kyiv".to_string(),
            event_price: 0.0,
            image_url: None,
            category_ids: vec![1],
            latitude: Some(50.4501),
            longitude: Some(30.5234),
        };
        let event = service
            .create_event(uuid::Uuid::new_v4(), &draft)
            .await
            .unwrap();
        assert_eq!(event.id, 42);
    }

    proptest! {
        // Каждое слово поиска даёт условия по всем трём полям
        #[test]
        fn search_or_group_covers_every_word_and_field(
            words in proptest::collection::vec("[a-z]{1,8}", 1..6)
        ) {
            let filter = EventFilter {
                search_text: words.join(" "),
                ..EventFilter::default()
            };
            let query = filter.apply(
                gateway_with_base("http://localhost:54321").select("events"),
            );
            let params = query.params();
            let or = &params.iter().find(|(k, _)| k == "or").unwrap().1;
            let inner = or.trim_start_matches('(').trim_end_matches(')');
            prop_assert_eq!(inner.split(',').count(), words.len() * 3);
            for word in &words {
                let title_frag = format!("title.ilike.%{}%", word);
                let location_frag = format!("location.ilike.%{}%", word);
                prop_assert!(inner.contains(&title_frag));
                prop_assert!(inner.contains(&location_frag));
            }
        }

        // Границы цен присутствуют при любом фильтре
        #[test]
        fn price_bounds_survive_any_filter(
            min in 0.0f64..500.0,
            max in 500.0f64..1000.0,
        ) {
            let filter = EventFilter {
                min_price: min,
                max_price: max,
                ..EventFilter::default()
            };
            let query = filter.apply(
                gateway_with_base("http://localhost:54321").select("events"),
            );
            let params = query.params();
            let gte_val = format!("gte.{}", min);
            let lte_val = format!("lte.{}", max);
            prop_assert!(params.iter().any(|(k, v)| k == "event_price" && v == &gte_val));
            prop_assert!(params.iter().any(|(k, v)| k == "event_price" && v == &lte_val));
        }
    }
}
