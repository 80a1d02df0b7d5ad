//! Файловое хранилище бэкенда. Используется только потоком загрузки
//! аватара профиля.

use reqwest::header::CONTENT_TYPE;
use reqwest::Method;

use crate::error::Result;

use super::GatewayClient;

impl GatewayClient {
    /// Загружает объект в бакет. Повторная загрузка по тому же пути
    /// перезаписывает объект.
    pub async fn upload(
        &self,
        bucket: &str,
        path: &str,
        bytes: Vec<u8>,
        content_type: &str,
    ) -> Result<()> {
        let url = format!("{}/storage/v1/object/{}/{}", self.base_url(), bucket, path);
        let resp = self
            .request(Method::POST, &url)
            .header(CONTENT_TYPE, content_type)
            .header("x-upsert", "true")
            .body(bytes)
            .send()
            .await?;
        self.check(resp).await?;
        Ok(())
    }

    /// Публичный URL объекта; сетевых вызовов не делает.
    pub fn public_url(&self, bucket: &str, path: &str) -> String {
        format!(
            "{}/storage/v1/object/public/{}/{}",
            self.base_url(),
            bucket,
            path
        )
    }
}
