//! Passthrough к управляемой аутентификации (GoTrue). Клиент не хранит
//! пароли и не выпускает токены сам - только пересылает учётные данные
//! и запоминает выданную сессию.

use reqwest::Method;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::Result;
use crate::models::{Session, SessionUser};

use super::GatewayClient;

#[derive(Debug, Serialize)]
struct Credentials<'a> {
    email: &'a str,
    password: &'a str,
}

// Ответ GoTrue на signup/token; лишние поля игнорируются
#[derive(Debug, Deserialize)]
struct AuthResponse {
    access_token: String,
    user: SessionUser,
}

impl GatewayClient {
    fn auth_url(&self, path: &str) -> String {
        format!("{}/auth/v1/{}", self.base_url(), path)
    }

    /// Регистрация по email/паролю. Выданная сессия становится текущей.
    pub async fn sign_up(&self, email: &str, password: &str) -> Result<Session> {
        let resp = self
            .request(Method::POST, &self.auth_url("signup"))
            .json(&Credentials { email, password })
            .send()
            .await?;
        let resp = self.check(resp).await?;
        let auth: AuthResponse = resp.json().await?;
        let session = Session {
            access_token: auth.access_token,
            user: auth.user,
        };
        self.set_session(Some(session.clone()));
        info!("Signed up user {}", session.user.id);
        Ok(session)
    }

    /// Вход по email/паролю.
    pub async fn sign_in(&self, email: &str, password: &str) -> Result<Session> {
        let resp = self
            .request(Method::POST, &self.auth_url("token?grant_type=password"))
            .json(&Credentials { email, password })
            .send()
            .await?;
        let resp = self.check(resp).await?;
        let auth: AuthResponse = resp.json().await?;
        let session = Session {
            access_token: auth.access_token,
            user: auth.user,
        };
        self.set_session(Some(session.clone()));
        info!("Signed in user {}", session.user.id);
        Ok(session)
    }

    /// Выход: отзываем токен на сервере и сбрасываем локальную сессию.
    pub async fn sign_out(&self) -> Result<()> {
        if self.get_session().is_some() {
            let resp = self
                .request(Method::POST, &self.auth_url("logout"))
                .send()
                .await?;
            self.check(resp).await?;
        }
        self.set_session(None);
        Ok(())
    }
}
