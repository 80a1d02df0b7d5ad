use chrono::{NaiveDate, NaiveTime};
use serde::{Deserialize, Serialize};
use validator::Validate;

use crate::models::profile::ProfileRef;

/// Событие, как его видят экраны: запись из коллекции `events` плюс
/// производные поля текущего пользователя (`is_bookmarked`, `comments_count`).
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Event {
    pub id: i64,
    pub title: String,
    pub description: Option<String>,
    pub date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub time: NaiveTime,
    pub location: Option<String>,
    pub city: Option<String>,
    pub event_price: f64,
    pub image_url: Option<String>,
    pub category_ids: Vec<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    pub profiles: Option<ProfileRef>,
    // Производные поля, в коллекции не хранятся
    pub is_bookmarked: bool,
    pub comments_count: i64,
}

// Агрегат comments(count) приходит массивом из одного элемента
#[derive(Debug, Deserialize)]
pub struct CountRow {
    pub count: i64,
}

/// Сырая строка ответа на select по `events`: вместо `comments_count`
/// в ней вложенный агрегат `comments(count)`.
#[derive(Debug, Deserialize)]
pub struct EventRow {
    pub id: i64,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    pub date: NaiveDate,
    #[serde(default)]
    pub end_date: Option<NaiveDate>,
    pub time: NaiveTime,
    #[serde(default)]
    pub location: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub event_price: f64,
    #[serde(default)]
    pub image_url: Option<String>,
    #[serde(default)]
    pub category_ids: Vec<i64>,
    #[serde(default)]
    pub latitude: Option<f64>,
    #[serde(default)]
    pub longitude: Option<f64>,
    #[serde(default)]
    pub profiles: Option<ProfileRef>,
    #[serde(default)]
    pub comments: Vec<CountRow>,
}

impl EventRow {
    pub fn into_event(self) -> Event {
        let comments_count = self.comments.first().map(|c| c.count).unwrap_or(0);
        Event {
            id: self.id,
            title: self.title,
            description: self.description,
            date: self.date,
            end_date: self.end_date,
            time: self.time,
            location: self.location,
            city: self.city,
            event_price: self.event_price,
            image_url: self.image_url,
            category_ids: self.category_ids,
            latitude: self.latitude,
            longitude: self.longitude,
            profiles: self.profiles,
            is_bookmarked: false,
            comments_count,
        }
    }
}

/// Данные нового события. Предел в 5 категорий - политика формы создания,
/// хранилище его не навязывает.
#[derive(Debug, Clone, Serialize, Validate)]
pub struct NewEvent {
    #[validate(length(min = 1, message = "Title is required."))]
    pub title: String,
    #[validate(length(min = 1, message = "Description is required."))]
    pub description: String,
    pub date: NaiveDate,
    pub end_date: Option<NaiveDate>,
    pub time: NaiveTime,
    #[validate(length(min = 1, message = "Location is required."))]
    pub location: String,
    #[validate(length(min = 1, message = "City is required."))]
    pub city: String,
    #[validate(range(min = 0.0, message = "Price cannot be negative."))]
    pub event_price: f64,
    pub image_url: Option<String>,
    #[validate(length(
        min = 1,
        max = 5,
        message = "Select between 1 and 5 categories."
    ))]
    pub category_ids: Vec<i64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
}
