use serde::{Deserialize, Serialize};

// Категории читаются один раз за сессию и кешируются в памяти.
// parent_id хранится, но фильтрация работает по плоскому совпадению id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Category {
    pub id: i64,
    pub name: String,
    #[serde(default)]
    pub parent_id: Option<i64>,
}
