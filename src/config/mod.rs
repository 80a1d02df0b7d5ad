use serde::Deserialize;
use std::env;

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub backend: BackendConfig,
    pub search: SearchConfig,
}

// Настройки хостингового бэкенда (Supabase-совместимый API)
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub url: String,
    pub anon_key: String,
    pub avatars_bucket: String,
}

// Настройки поиска/фильтрации событий
#[derive(Debug, Clone, Deserialize)]
pub struct SearchConfig {
    pub debounce_ms: u64,
    pub min_price: f64,
    pub max_price: f64,
}

impl Config {
    pub fn from_env() -> Self {
        dotenvy::dotenv().ok();

        Config {
            backend: BackendConfig {
                url: env::var("SUPABASE_URL").expect("SUPABASE_URL must be set"),
                anon_key: env::var("SUPABASE_ANON_KEY").expect("SUPABASE_ANON_KEY must be set"),
                avatars_bucket: env::var("AVATARS_BUCKET")
                    .unwrap_or_else(|_| "avatars".to_string()),
            },
            search: SearchConfig {
                debounce_ms: env::var("SEARCH_DEBOUNCE_MS")
                    .unwrap_or_else(|_| "300".to_string())
                    .parse()
                    .expect("SEARCH_DEBOUNCE_MS must be a valid number"),
                min_price: env::var("PRICE_RANGE_MIN")
                    .unwrap_or_else(|_| "0".to_string())
                    .parse()
                    .expect("PRICE_RANGE_MIN must be a valid number"),
                max_price: env::var("PRICE_RANGE_MAX")
                    .unwrap_or_else(|_| "1000".to_string())
                    .parse()
                    .expect("PRICE_RANGE_MAX must be a valid number"),
            },
        }
    }
}
