use std::fmt::Display;

use reqwest::Method;
use serde::de::DeserializeOwned;

use crate::error::Result;

use super::{single_object_header, GatewayClient};

/// Билдер select-запроса. Рендерит предикаты в параметры строки запроса
/// PostgREST: `col=eq.v`, `or=(a.ilike.%w%,...)`, `col=ov.{1,2}`,
/// `order=date.asc,time.asc`.
#[derive(Clone)]
pub struct SelectBuilder {
    client: GatewayClient,
    table: String,
    columns: String,
    filters: Vec<(String, String)>,
    orders: Vec<String>,
    limit: Option<u32>,
}

impl SelectBuilder {
    pub(crate) fn new(client: GatewayClient, table: &str) -> Self {
        Self {
            client,
            table: table.to_string(),
            columns: "*".to_string(),
            filters: Vec::new(),
            orders: Vec::new(),
            limit: None,
        }
    }

    /// Список колонок, включая вложенные ресурсы: `"id,profiles(username)"`.
    pub fn columns(mut self, columns: &str) -> Self {
        self.columns = columns.to_string();
        self
    }

    pub fn eq(mut self, column: &str, value: impl Display) -> Self {
        self.filters.push((column.to_string(), format!("eq.{value}")));
        self
    }

    /// Регистронезависимое совпадение с шаблоном (`%` - подстановка).
    pub fn ilike(mut self, column: &str, pattern: &str) -> Self {
        self.filters
            .push((column.to_string(), format!("ilike.{pattern}")));
        self
    }

    /// Пересечение множеств для колонок-массивов (хотя бы один общий элемент).
    pub fn overlaps(mut self, column: &str, values: &[i64]) -> Self {
        self.filters
            .push((column.to_string(), format!("ov.{{{}}}", join_ids(values))));
        self
    }

    pub fn gte(mut self, column: &str, value: impl Display) -> Self {
        self.filters
            .push((column.to_string(), format!("gte.{value}")));
        self
    }

    pub fn lte(mut self, column: &str, value: impl Display) -> Self {
        self.filters
            .push((column.to_string(), format!("lte.{value}")));
        self
    }

    pub fn in_list(mut self, column: &str, values: &[i64]) -> Self {
        self.filters
            .push((column.to_string(), format!("in.({})", join_ids(values))));
        self
    }

    /// OR-группа готовых условий вида `a.ilike.%w%,b.eq.1`.
    pub fn or(mut self, conditions: &str) -> Self {
        self.filters
            .push(("or".to_string(), format!("({conditions})")));
        self
    }

    pub fn order(mut self, column: &str, ascending: bool) -> Self {
        let direction = if ascending { "asc" } else { "desc" };
        self.orders.push(format!("{column}.{direction}"));
        self
    }

    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    // Полный набор параметров в порядке добавления
    pub(crate) fn params(&self) -> Vec<(String, String)> {
        let mut params = vec![("select".to_string(), self.columns.clone())];
        params.extend(self.filters.iter().cloned());
        if !self.orders.is_empty() {
            params.push(("order".to_string(), self.orders.join(",")));
        }
        if let Some(limit) = self.limit {
            params.push(("limit".to_string(), limit.to_string()));
        }
        params
    }

    pub(crate) fn query_string(&self) -> String {
        serde_urlencoded::to_string(self.params()).unwrap_or_default()
    }

    /// Выполняет запрос и возвращает все строки.
    pub async fn fetch<T: DeserializeOwned>(self) -> Result<Vec<T>> {
        let url = format!("{}?{}", self.client.rest_url(&self.table), self.query_string());
        let resp = self.client.request(Method::GET, &url).send().await?;
        let resp = self.client.check(resp).await?;
        Ok(resp.json().await?)
    }

    /// Выполняет запрос, ожидая ровно одну строку (как .single() в SDK).
    /// Ноль строк приводит к ошибке с кодом PGRST116.
    pub async fn fetch_single<T: DeserializeOwned>(self) -> Result<T> {
        let url = format!("{}?{}", self.client.rest_url(&self.table), self.query_string());
        let (name, value) = single_object_header();
        let resp = self
            .client
            .request(Method::GET, &url)
            .header(name, value)
            .send()
            .await?;
        let resp = self.client.check(resp).await?;
        Ok(resp.json().await?)
    }
}

pub(crate) enum MutationKind {
    Update(serde_json::Value),
    Delete,
}

/// Билдер update/delete: патч плюс eq-фильтры.
pub struct MutationBuilder {
    client: GatewayClient,
    table: String,
    kind: MutationKind,
    filters: Vec<(String, String)>,
}

impl MutationBuilder {
    pub(crate) fn new(client: GatewayClient, table: &str, kind: MutationKind) -> Self {
        Self {
            client,
            table: table.to_string(),
            kind,
            filters: Vec::new(),
        }
    }

    pub fn eq(mut self, column: &str, value: impl Display) -> Self {
        self.filters.push((column.to_string(), format!("eq.{value}")));
        self
    }

    fn url(&self) -> String {
        let qs = serde_urlencoded::to_string(&self.filters).unwrap_or_default();
        format!("{}?{}", self.client.rest_url(&self.table), qs)
    }

    /// Выполняет мутацию без возврата строк.
    pub async fn send(self) -> Result<()> {
        let client = self.client.clone();
        let url = self.url();
        let req = match self.kind {
            MutationKind::Update(patch) => client
                .request(Method::PATCH, &url)
                .header("Prefer", "return=minimal")
                .json(&patch),
            MutationKind::Delete => client.request(Method::DELETE, &url),
        };
        let resp = req.send().await?;
        client.check(resp).await?;
        Ok(())
    }

    /// Выполняет мутацию и возвращает затронутую строку
    /// (update/delete ... select().single()).
    pub async fn returning_single<T: DeserializeOwned>(self) -> Result<T> {
        let client = self.client.clone();
        let url = self.url();
        let (name, value) = single_object_header();
        let req = match self.kind {
            MutationKind::Update(patch) => {
                client.request(Method::PATCH, &url).json(&patch)
            }
            MutationKind::Delete => client.request(Method::DELETE, &url),
        };
        let resp = req
            .header("Prefer", "return=representation")
            .header(name, value)
            .send()
            .await?;
        let resp = client.check(resp).await?;
        Ok(resp.json().await?)
    }
}

fn join_ids(values: &[i64]) -> String {
    values
        .iter()
        .map(|v| v.to_string())
        .collect::<Vec<_>>()
        .join(",")
}
