//! Общие строители тестовых данных.

use chrono::{TimeZone, Utc};
use fake::faker::address::en::CityName;
use fake::faker::lorem::en::Sentence;
use fake::Fake;
use uuid::Uuid;

use crate::config::BackendConfig;
use crate::gateway::GatewayClient;
use crate::models::{Comment, Event, ProfileRef, Session, SessionUser};
use crate::store::EventsStore;

// Логи в тестах по запросу: RUST_LOG=debug cargo test -- --nocapture
#[allow(dead_code)]
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .try_init();
}

pub(crate) fn gateway_with_base(base_url: &str) -> GatewayClient {
    GatewayClient::from_config(&BackendConfig {
        url: base_url.to_string(),
        anon_key: "test-anon-key".to_string(),
        avatars_bucket: "avatars".to_string(),
    })
}

pub(crate) fn store_with_base(base_url: &str) -> EventsStore {
    EventsStore::new(gateway_with_base(base_url))
}

pub(crate) fn session_for(user_id: Uuid) -> Session {
    Session {
        access_token: "test-token".to_string(),
        user: SessionUser {
            id: user_id,
            email: Some("user@example.com".to_string()),
        },
    }
}

pub(crate) fn sample_event(id: i64) -> Event {
    Event {
        id,
        title: Sentence(1..4).fake(),
        description: Some(Sentence(3..8).fake()),
        date: "2025-06-15".parse().unwrap(),
        end_date: None,
        time: "19:00:00".parse().unwrap(),
        location: Some("Exhibition Center".to_string()),
        city: Some(CityName().fake()),
        event_price: 150.0,
        image_url: None,
        category_ids: vec![1],
        latitude: None,
        longitude: None,
        profiles: Some(ProfileRef {
            username: Some("organizer".to_string()),
            avatar_url: None,
        }),
        is_bookmarked: false,
        comments_count: 0,
    }
}

pub(crate) fn sample_comment(id: i64) -> Comment {
    Comment {
        id,
        content: Sentence(2..6).fake(),
        created_at: Utc.with_ymd_and_hms(2025, 5, 1, 10, 0, 0).unwrap(),
        likes_count: 0,
        parent_comment_id: None,
        profiles: Some(ProfileRef {
            username: Some("olena".to_string()),
            avatar_url: None,
        }),
    }
}
