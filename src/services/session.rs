//! Тонкий сервис сессии и профиля: passthrough к управляемой
//! аутентификации и CRUD профиля. Глубокой логики здесь нет намеренно.

use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::{error, info};
use uuid::Uuid;

use crate::error::Result;
use crate::gateway::GatewayClient;
use crate::models::{Profile, ProfileUpdate, Session};

#[derive(Clone)]
pub struct SessionService {
    gateway: GatewayClient,
    avatars_bucket: String,
}

impl SessionService {
    pub fn new(gateway: GatewayClient, avatars_bucket: String) -> Self {
        Self {
            gateway,
            avatars_bucket,
        }
    }

    /// Читает текущую сессию и профиль пользователя, если он вошёл.
    pub async fn initialize(&self) -> Result<Option<(Session, Option<Profile>)>> {
        let Some(session) = self.gateway.get_session() else {
            return Ok(None);
        };
        let profile = self.fetch_profile(session.user.id).await?;
        Ok(Some((session, profile)))
    }

    /// Регистрация: аккаунт заводит auth-сервис, мы сразу создаём профиль.
    pub async fn register(&self, email: &str, password: &str) -> Result<Session> {
        let session = self.gateway.sign_up(email, password).await?;

        if let Err(e) = self
            .gateway
            .insert(
                "profiles",
                &json!({
                    "id": session.user.id,
                    "email": session.user.email,
                    "created_at": Utc::now(),
                }),
            )
            .await
        {
            // Аккаунт уже существует, профиля нет - пользователь увидит ошибку
            error!("Profile creation after registration failed: {:?}", e);
            return Err(e);
        }
        Ok(session)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session> {
        self.gateway.sign_in(email, password).await
    }

    pub async fn logout(&self) -> Result<()> {
        self.gateway.sign_out().await
    }

    /// Профиль по id; отсутствие строки - не ошибка.
    pub async fn fetch_profile(&self, user_id: Uuid) -> Result<Option<Profile>> {
        match self
            .gateway
            .select("profiles")
            .columns("*")
            .eq("id", user_id)
            .fetch_single::<Profile>()
            .await
        {
            Ok(profile) => Ok(Some(profile)),
            Err(e) if e.is_no_rows() => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Частичное обновление профиля, возвращает обновлённую строку.
    pub async fn update_profile(&self, user_id: Uuid, updates: &ProfileUpdate) -> Result<Profile> {
        let patch = serde_json::to_value(updates)?;
        self.gateway
            .update("profiles", patch)
            .eq("id", user_id)
            .returning_single()
            .await
    }

    /// Загружает аватар в хранилище и прописывает публичный URL в профиль.
    pub async fn upload_avatar(
        &self,
        user_id: Uuid,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<String> {
        let extension = content_type.rsplit('/').next().unwrap_or("jpg");
        let path = format!("{}/avatar_{}.{}", user_id, Utc::now().timestamp(), extension);

        self.gateway
            .upload(&self.avatars_bucket, &path, bytes, content_type)
            .await?;
        let url = self.gateway.public_url(&self.avatars_bucket, &path);

        self.update_profile(
            user_id,
            &ProfileUpdate {
                avatar_url: Some(url.clone()),
                ..ProfileUpdate::default()
            },
        )
        .await?;

        info!("Avatar uploaded for user {}", user_id);
        Ok(url)
    }
}

#[derive(Debug, Deserialize)]
struct ProfileIdRow {
    #[allow(dead_code)]
    id: Uuid,
}

/// Гарантирует наличие строки профиля: при её отсутствии заводит профиль
/// с именем по умолчанию из первых восьми символов id.
pub async fn ensure_profile(gateway: &GatewayClient, user_id: Uuid) -> Result<()> {
    match gateway
        .select("profiles")
        .columns("id")
        .eq("id", user_id)
        .fetch_single::<ProfileIdRow>()
        .await
    {
        Ok(_) => Ok(()),
        Err(e) if e.is_no_rows() => {
            let username = format!("user_{}", &user_id.to_string()[..8]);
            gateway
                .insert("profiles", &json!({ "id": user_id, "username": username }))
                .await
        }
        Err(e) => Err(e),
    }
}
