//! comments.rs
//!
//! Этот модуль держит актуальный список комментариев одного события на
//! протяжении жизни экрана.
//!
//! Ключевые компоненты:
//! 1.  **CommentStream**: стартовая последовательность (сессия, профиль,
//!     основная выборка, лайки, две подписки) и явное освобождение
//!     подписок при уходе с экрана.
//! 2.  **Редьюсер изменений**: слияние realtime-уведомлений со списком.
//!     Вставка идемпотентна по id - это единственная защита от двойной
//!     доставки и гонки со стартовой выборкой, её менять нельзя.
//! 3.  **Лайки**: оптимистичное переключение со снимком для точного
//!     отката; повторная вставка существующего лайка - не ошибка.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};

use serde::Deserialize;
use serde_json::json;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::error::{Error, Result};
use crate::gateway::realtime::{ChangeFilter, ChangeKind, RealtimeHub, RowChange, Subscription};
use crate::gateway::GatewayClient;
use crate::models::Comment;
use crate::services::session::ensure_profile;

/// Колонки комментария с присоединённым автором.
const COMMENT_COLUMNS: &str = "id,content,created_at,likes_count,parent_comment_id,\
profiles!comments_user_id_fkey(username,avatar_url)";

#[derive(Debug, Deserialize)]
struct LikeRow {
    comment_id: i64,
}

/// Состояние экрана комментариев.
#[derive(Debug, Clone, Default)]
pub struct CommentsState {
    /// Комментарии в обратном хронологическом порядке (новые первыми).
    pub comments: Vec<Comment>,
    /// Комментарии, лайкнутые текущим пользователем.
    pub liked_comment_ids: HashSet<i64>,
    /// Комментарий, на который пишется ответ.
    pub reply_to: Option<i64>,
}

/// Живые каналы изменений одного экрана: комментарии события и - для
/// вошедшего пользователя - его лайки.
pub struct CommentFeeds {
    pub comments: mpsc::UnboundedReceiver<RowChange>,
    pub likes: Option<mpsc::UnboundedReceiver<RowChange>>,
}

/// Поток комментариев одного события.
pub struct CommentStream {
    gateway: GatewayClient,
    hub: RealtimeHub,
    event_id: i64,
    user_id: Option<Uuid>,
    state: Mutex<CommentsState>,
    subscriptions: Mutex<Vec<Subscription>>,
}

impl CommentStream {
    /// Открывает экран комментариев. Порядок шагов фиксирован: сессия,
    /// профиль, выборка комментариев, выборка лайков, подписки.
    pub async fn open(
        gateway: GatewayClient,
        hub: RealtimeHub,
        event_id: i64,
    ) -> Result<(Arc<Self>, CommentFeeds)> {
        // 1. Пользователь из сессии; без сессии - режим только чтения
        let mut user_id = gateway.get_session().map(|s| s.user.id);

        // 2. Профиль должен существовать до первой записи. Если завести
        //    его не удалось, экран продолжает работать анонимно
        if let Some(uid) = user_id {
            if let Err(e) = ensure_profile(&gateway, uid).await {
                warn!("Profile provisioning failed, continuing read-only: {:?}", e);
                user_id = None;
            }
        }

        // 3. Основная выборка, новые первыми
        let comments: Vec<Comment> = gateway
            .select("comments")
            .columns(COMMENT_COLUMNS)
            .eq("event_id", event_id)
            .order("created_at", false)
            .fetch()
            .await?;

        // 4. Лайки пользователя; их отсутствие экран не валит
        let liked_comment_ids = match user_id {
            Some(uid) => match fetch_user_likes(&gateway, uid).await {
                Ok(liked) => liked,
                Err(e) => {
                    warn!("Error fetching user likes: {:?}", e);
                    HashSet::new()
                }
            },
            None => HashSet::new(),
        };

        // 5. Подписки: комментарии события и лайки пользователя
        let (comments_sub, comments_rx) =
            hub.subscribe("comments", ChangeFilter::eq("event_id", event_id));
        let mut subscriptions = vec![comments_sub];
        let likes_rx = user_id.map(|uid| {
            let (sub, rx) = hub.subscribe("comment_likes", ChangeFilter::eq("user_id", uid));
            subscriptions.push(sub);
            rx
        });

        info!(
            "Comment stream for event {} opened ({} comments)",
            event_id,
            comments.len()
        );

        let stream = Arc::new(Self {
            gateway,
            hub,
            event_id,
            user_id,
            state: Mutex::new(CommentsState {
                comments,
                liked_comment_ids,
                reply_to: None,
            }),
            subscriptions: Mutex::new(subscriptions),
        });
        Ok((
            stream,
            CommentFeeds {
                comments: comments_rx,
                likes: likes_rx,
            },
        ))
    }

    pub fn user_id(&self) -> Option<Uuid> {
        self.user_id
    }

    /// Копия состояния для рендеринга.
    pub fn snapshot(&self) -> CommentsState {
        self.state.lock().unwrap().clone()
    }

    /// Запускает цикл-редьюсер: изменения из обоих каналов переносятся в
    /// состояние до закрытия канала комментариев.
    pub fn spawn_pump(self: Arc<Self>, mut feeds: CommentFeeds) -> JoinHandle<()> {
        tokio::task::spawn(async move {
            loop {
                tokio::select! {
                    change = feeds.comments.recv() => match change {
                        Some(change) => self.apply_comment_change(change).await,
                        None => break,
                    },
                    Some(change) = recv_opt(&mut feeds.likes) => {
                        self.apply_like_change(change);
                    }
                }
            }
            info!("Comment stream pump for event {} stopped", self.event_id);
        })
    }

    /// Редьюсер канала комментариев.
    pub async fn apply_comment_change(&self, change: RowChange) {
        match change.kind {
            ChangeKind::Insert => {
                let Some(id) = change.row_i64("id") else { return };
                // В уведомлении нет присоединённого автора - тянем полную запись
                let fetched: Result<Comment> = self
                    .gateway
                    .select("comments")
                    .columns(COMMENT_COLUMNS)
                    .eq("id", id)
                    .fetch_single()
                    .await;
                match fetched {
                    Ok(comment) => {
                        let mut state = self.state.lock().unwrap();
                        prepend_if_absent(&mut state.comments, comment);
                    }
                    Err(e) => {
                        error!("Error fetching comment {} for realtime insert: {:?}", id, e)
                    }
                }
            }
            ChangeKind::Update => {
                let Some(id) = change.row_i64("id") else { return };
                let mut state = self.state.lock().unwrap();
                if let Some(existing) = state.comments.iter_mut().find(|c| c.id == id) {
                    // Переносим только content и likes_count, остальное не трогаем
                    if let Some(content) = change.row_str("content") {
                        existing.content = content.to_string();
                    }
                    if let Some(likes_count) = change.row_i64("likes_count") {
                        existing.likes_count = likes_count;
                    }
                }
            }
            ChangeKind::Delete => {
                let Some(id) = change.row_i64("id") else { return };
                self.state.lock().unwrap().comments.retain(|c| c.id != id);
            }
        }
    }

    /// Редьюсер канала лайков (только лайки текущего пользователя).
    pub fn apply_like_change(&self, change: RowChange) {
        let Some(comment_id) = change.row_i64("comment_id") else {
            return;
        };
        let mut state = self.state.lock().unwrap();
        match change.kind {
            ChangeKind::Insert => {
                state.liked_comment_ids.insert(comment_id);
            }
            ChangeKind::Delete => {
                state.liked_comment_ids.remove(&comment_id);
            }
            ChangeKind::Update => {}
        }
    }

    /// Публикует комментарий. Сам он появится в списке через
    /// realtime-вставку - локально ничего не добавляем.
    pub async fn post_comment(&self, text: &str) -> Result<()> {
        let content = text.trim();
        if content.is_empty() {
            return Err(Error::Validation("Comment cannot be empty.".to_string()));
        }
        let Some(user_id) = self.user_id else {
            return Err(Error::NotSignedIn);
        };
        let parent_comment_id = self.state.lock().unwrap().reply_to;

        self.gateway
            .insert(
                "comments",
                &json!({
                    "event_id": self.event_id,
                    "user_id": user_id,
                    "content": content,
                    "parent_comment_id": parent_comment_id,
                }),
            )
            .await?;

        self.state.lock().unwrap().reply_to = None;
        Ok(())
    }

    /// Выбирает (или сбрасывает) цель ответа.
    pub fn set_reply_to(&self, comment_id: Option<i64>) {
        self.state.lock().unwrap().reply_to = comment_id;
    }

    /// Оптимистичное переключение лайка: флаг и счётчик меняются сразу,
    /// при отказе бэкенда восстанавливаются из снимка.
    pub async fn toggle_like(&self, comment_id: i64) -> Result<()> {
        let Some(user_id) = self.user_id else {
            return Err(Error::NotSignedIn);
        };

        // Снимок затронутого состояния для точного отката
        let (was_liked, likes_snapshot) = {
            let state = self.state.lock().unwrap();
            (
                state.liked_comment_ids.contains(&comment_id),
                state
                    .comments
                    .iter()
                    .find(|c| c.id == comment_id)
                    .map(|c| c.likes_count),
            )
        };

        self.apply_like_locally(comment_id, !was_liked);

        let remote = if was_liked {
            self.gateway
                .delete("comment_likes")
                .eq("comment_id", comment_id)
                .eq("user_id", user_id)
                .send()
                .await
        } else {
            self.gateway
                .insert(
                    "comment_likes",
                    &json!({ "comment_id": comment_id, "user_id": user_id }),
                )
                .await
        };

        match remote {
            Ok(()) => Ok(()),
            // Лайк уже существует на сервере - не ошибка и не откат
            Err(e) if !was_liked && e.is_duplicate() => Ok(()),
            Err(e) => {
                error!("Failed to toggle like for comment {}: {:?}", comment_id, e);
                self.restore_like(comment_id, was_liked, likes_snapshot);
                Err(e)
            }
        }
    }

    fn apply_like_locally(&self, comment_id: i64, liked: bool) {
        let mut state = self.state.lock().unwrap();
        if liked {
            state.liked_comment_ids.insert(comment_id);
        } else {
            state.liked_comment_ids.remove(&comment_id);
        }
        if let Some(comment) = state.comments.iter_mut().find(|c| c.id == comment_id) {
            comment.likes_count = if liked {
                comment.likes_count + 1
            } else {
                (comment.likes_count - 1).max(0)
            };
        }
    }

    fn restore_like(&self, comment_id: i64, liked: bool, likes_count: Option<i64>) {
        let mut state = self.state.lock().unwrap();
        if liked {
            state.liked_comment_ids.insert(comment_id);
        } else {
            state.liked_comment_ids.remove(&comment_id);
        }
        if let Some(count) = likes_count {
            if let Some(comment) = state.comments.iter_mut().find(|c| c.id == comment_id) {
                comment.likes_count = count;
            }
        }
    }

    /// Имя автора родительского комментария для префикса "Replying to @...".
    /// Если родитель не в загруженном окне - префикса нет.
    pub fn replying_to(&self, comment_id: i64) -> Option<String> {
        let state = self.state.lock().unwrap();
        let parent_id = state
            .comments
            .iter()
            .find(|c| c.id == comment_id)?
            .parent_comment_id?;
        let parent = state.comments.iter().find(|c| c.id == parent_id)?;
        Some(
            parent
                .profiles
                .as_ref()
                .and_then(|p| p.username.clone())
                .unwrap_or_else(|| "user".to_string()),
        )
    }

    /// Уход с экрана: обе подписки освобождаются явно.
    pub fn close(&self) {
        for sub in self.subscriptions.lock().unwrap().drain(..) {
            self.hub.unsubscribe(sub);
        }
        info!("Comment stream for event {} closed", self.event_id);
    }
}

/// Вставляет комментарий в голову списка, если записи с таким id ещё нет.
pub(crate) fn prepend_if_absent(comments: &mut Vec<Comment>, comment: Comment) -> bool {
    if comments.iter().any(|c| c.id == comment.id) {
        return false;
    }
    comments.insert(0, comment);
    true
}

async fn fetch_user_likes(gateway: &GatewayClient, user_id: Uuid) -> Result<HashSet<i64>> {
    let rows: Vec<LikeRow> = gateway
        .select("comment_likes")
        .columns("comment_id")
        .eq("user_id", user_id)
        .fetch()
        .await?;
    Ok(rows.into_iter().map(|r| r.comment_id).collect())
}

async fn recv_opt(rx: &mut Option<mpsc::UnboundedReceiver<RowChange>>) -> Option<RowChange> {
    match rx {
        Some(rx) => rx.recv().await,
        // Анонимный режим: канала лайков нет, ветка не срабатывает никогда
        None => std::future::pending().await,
    }
}
