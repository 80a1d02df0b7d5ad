//! gateway
//!
//! Этот модуль реализует тонкий типизированный клиент хостингового бэкенда
//! (Supabase-совместимый API). Весь доступ к данным, аутентификации,
//! realtime-уведомлениям и файловому хранилищу идёт через него.
//!
//! Ключевые компоненты:
//! 1.  **GatewayClient**: HTTP-клиент строк PostgREST: select с комбинируемыми
//!     предикатами, insert/update/delete, заголовки авторизации.
//! 2.  **auth**: passthrough к управляемой аутентификации (GoTrue) и
//!     интроспекция текущей сессии. Никакой собственной криптографии.
//! 3.  **realtime**: учёт подписок на изменения строк и доставка уведомлений
//!     потребителям. Сам websocket-транспорт живёт снаружи.
//! 4.  **storage**: загрузка объектов и публичные URL (только аватары).

pub mod auth;
pub mod query;
pub mod realtime;
pub mod storage;

use std::sync::{Arc, RwLock};

use reqwest::header::{HeaderValue, ACCEPT, AUTHORIZATION};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde::Serialize;
use tokio::time::Duration;

use crate::config::BackendConfig;
use crate::error::{Error, Result};
use crate::models::Session;

use query::{MutationBuilder, MutationKind, SelectBuilder};

// Ответ PostgREST об ошибке: {"code": "...", "message": "...", ...}
#[derive(Debug, Deserialize)]
struct GatewayErrorBody {
    code: Option<String>,
    message: Option<String>,
    #[serde(alias = "error_description", alias = "msg")]
    description: Option<String>,
}

/// Клиент для взаимодействия с хостинговым бэкендом.
#[derive(Clone)]
pub struct GatewayClient {
    /// Асинхронный HTTP-клиент.
    http: reqwest::Client,
    /// Базовый URL проекта.
    base_url: String,
    /// Публичный anon-ключ.
    anon_key: String,
    /// Текущая сессия; устанавливается после входа.
    session: Arc<RwLock<Option<Session>>>,
}

impl GatewayClient {
    /// Создает и конфигурирует клиент на основе настроек приложения.
    pub fn from_config(config: &BackendConfig) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30)) // Таймаут для HTTP-запросов.
                .build()
                .expect("Failed to create HTTP client"),
            base_url: config.url.trim_end_matches('/').to_string(),
            anon_key: config.anon_key.clone(),
            session: Arc::new(RwLock::new(None)),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Текущая сессия, если пользователь вошёл.
    pub fn get_session(&self) -> Option<Session> {
        self.session.read().unwrap().clone()
    }

    pub(crate) fn set_session(&self, session: Option<Session>) {
        *self.session.write().unwrap() = session;
    }

    pub(crate) fn rest_url(&self, table: &str) -> String {
        format!("{}/rest/v1/{}", self.base_url, table)
    }

    // Общие заголовки: apikey + Bearer (токен сессии, иначе anon-ключ)
    pub(crate) fn request(&self, method: Method, url: &str) -> RequestBuilder {
        let bearer = self
            .get_session()
            .map(|s| s.access_token)
            .unwrap_or_else(|| self.anon_key.clone());
        self.http
            .request(method, url)
            .header("apikey", self.anon_key.clone())
            .header(AUTHORIZATION, format!("Bearer {bearer}"))
    }

    /// Начинает select по коллекции; предикаты добавляются билдером.
    pub fn select(&self, table: &str) -> SelectBuilder {
        SelectBuilder::new(self.clone(), table)
    }

    /// Вставка строк без возврата представления.
    pub async fn insert<T: Serialize + ?Sized>(&self, table: &str, rows: &T) -> Result<()> {
        let resp = self
            .request(Method::POST, &self.rest_url(table))
            .header("Prefer", "return=minimal")
            .json(rows)
            .send()
            .await?;
        self.check(resp).await?;
        Ok(())
    }

    /// Вставка с возвратом созданных строк (insert ... select()).
    pub async fn insert_returning<T, R>(&self, table: &str, rows: &T) -> Result<Vec<R>>
    where
        T: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let resp = self
            .request(Method::POST, &self.rest_url(table))
            .header("Prefer", "return=representation")
            .json(rows)
            .send()
            .await?;
        let resp = self.check(resp).await?;
        Ok(resp.json().await?)
    }

    /// Частичное обновление строк, отфильтрованных через .eq(...).
    pub fn update(&self, table: &str, patch: serde_json::Value) -> MutationBuilder {
        MutationBuilder::new(self.clone(), table, MutationKind::Update(patch))
    }

    /// Удаление строк, отфильтрованных через .eq(...).
    pub fn delete(&self, table: &str) -> MutationBuilder {
        MutationBuilder::new(self.clone(), table, MutationKind::Delete)
    }

    // Преобразует не-2xx ответ в типизированную ошибку.
    pub(crate) async fn check(&self, resp: Response) -> Result<Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        Err(Self::error_from(status, resp.text().await.unwrap_or_default()))
    }

    fn error_from(status: StatusCode, body: String) -> Error {
        let parsed: Option<GatewayErrorBody> = serde_json::from_str(&body).ok();
        let (code, message) = match parsed {
            Some(b) => {
                let message = b
                    .message
                    .or(b.description)
                    .unwrap_or_else(|| format!("request rejected with status {status}"));
                (b.code, message)
            }
            None if !body.is_empty() => (None, body),
            None => (None, format!("request rejected with status {status}")),
        };
        Error::Gateway {
            status: status.as_u16(),
            code,
            message,
        }
    }
}

// Заголовок, по которому PostgREST отдаёт один объект вместо массива
pub(crate) fn single_object_header() -> (reqwest::header::HeaderName, HeaderValue) {
    (
        ACCEPT,
        HeaderValue::from_static("application/vnd.pgrst.object+json"),
    )
}
