use thiserror::Error;

// Код PostgREST "ноль строк при single()"
const CODE_NO_ROWS: &str = "PGRST116";
// Код Postgres "нарушение уникальности" (повторный лайк и т.п.)
const CODE_UNIQUE_VIOLATION: &str = "23505";

/// Ошибки клиентского ядра. Все удалённые сбои приводятся к этому типу
/// на границе операции и дальше наружу уходят как обычное сообщение.
#[derive(Debug, Error)]
pub enum Error {
    /// Бэкенд отклонил запрос (не-2xx от PostgREST/GoTrue/Storage).
    #[error("{message}")]
    Gateway {
        status: u16,
        code: Option<String>,
        message: String,
    },

    /// Сетевая ошибка HTTP-клиента.
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("You must be logged in to perform this action.")]
    NotSignedIn,

    /// Локальная валидация до любого удалённого вызова.
    #[error("{0}")]
    Validation(String),

    /// Для этой пары (пользователь, событие) уже выполняется переключение закладки.
    #[error("Bookmark update for this event is already in progress.")]
    ToggleInFlight,

    #[error("Not found.")]
    NotFound,
}

impl Error {
    /// single() не нашёл ни одной строки.
    pub fn is_no_rows(&self) -> bool {
        matches!(self, Error::Gateway { code: Some(c), .. } if c == CODE_NO_ROWS)
    }

    /// Повторная вставка уже существующей строки (безобидный конфликт).
    pub fn is_duplicate(&self) -> bool {
        matches!(self, Error::Gateway { code: Some(c), .. } if c == CODE_UNIQUE_VIOLATION)
    }
}

pub type Result<T> = std::result::Result<T, Error>;
