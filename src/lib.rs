pub mod config;
pub mod error;
pub mod gateway;
pub mod models;
pub mod services;
pub mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{Error, Result};

use std::sync::Arc;
use tokio::task;

use gateway::realtime::RealtimeHub;
use gateway::GatewayClient;
use services::comments::{CommentFeeds, CommentStream};
use services::events::EventService;
use services::session::SessionService;
use store::EventsStore;

// Shared state для всего приложения
#[derive(Clone)]
pub struct AppState {
    pub config: config::Config,
    pub gateway: GatewayClient,
    pub realtime: RealtimeHub,
    pub store: EventsStore,
    pub events: EventService,
    pub session: SessionService,
}

impl AppState {
    pub fn new(config: config::Config) -> Arc<Self> {
        let gateway = GatewayClient::from_config(&config.backend);
        let realtime = RealtimeHub::new();
        let store = EventsStore::new(gateway.clone());
        let events = EventService::new(gateway.clone(), store.clone(), &config.search);
        let session = SessionService::new(gateway.clone(), config.backend.avatars_bucket.clone());

        let state = Arc::new(Self {
            config,
            gateway,
            realtime,
            store,
            events,
            session,
        });

        let state_for_bg = state.clone();
        task::spawn(async move {
            // Прогрев справочника категорий в фоне
            if let Err(e) = state_for_bg.events.categories().await {
                tracing::error!("Category warmup failed: {:?}", e);
            }
        });

        state
    }

    /// Открывает поток комментариев события поверх общего шлюза и хаба.
    pub async fn open_comments(&self, event_id: i64) -> Result<(Arc<CommentStream>, CommentFeeds)> {
        CommentStream::open(self.gateway.clone(), self.realtime.clone(), event_id).await
    }
}
