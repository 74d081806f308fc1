use std::sync::Arc;

use async_trait::async_trait;
use rearch::CapsuleHandle;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, DbConn, EntityTrait, IntoActiveModel,
    QueryFilter, QueryOrder,
};
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    config::db_conn_capsule,
    orm::{comment, updated_or_missing},
    pagination::{Page, PageRequest, fetch_page},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewComment {
    pub content: String,
    pub video: Uuid,
    pub owner: Uuid,
}

pub fn comment_repository_capsule(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> Arc<dyn CommentRepository> {
    let db = get.as_ref(db_conn_capsule).clone();
    Arc::new(CommentRepositoryImpl { db })
}

#[async_trait]
pub trait CommentRepository: Send + Sync {
    /// Comments on a video, most recently edited first.
    async fn list_comments(
        &self,
        video: Uuid,
        page: PageRequest,
    ) -> anyhow::Result<Page<comment::Model>>;
    async fn create_comment(&self, comment: NewComment) -> anyhow::Result<comment::Model>;
    async fn update_comment(
        &self,
        id: Uuid,
        content: String,
    ) -> anyhow::Result<Option<comment::Model>>;
    async fn delete_comment(&self, id: Uuid) -> anyhow::Result<Option<comment::Model>>;
}

struct CommentRepositoryImpl {
    db: DbConn,
}

#[async_trait]
impl CommentRepository for CommentRepositoryImpl {
    #[instrument(skip(self))]
    async fn list_comments(
        &self,
        video: Uuid,
        page: PageRequest,
    ) -> anyhow::Result<Page<comment::Model>> {
        let select = comment::Entity::find()
            .filter(comment::Column::Video.eq(video))
            .order_by_desc(comment::Column::UpdatedAt)
            .order_by_asc(comment::Column::Id);
        Ok(fetch_page(select, &self.db, page).await?)
    }

    #[instrument(skip(self))]
    async fn create_comment(&self, comment: NewComment) -> anyhow::Result<comment::Model> {
        let now = OffsetDateTime::now_utc();
        let to_insert = comment::ActiveModel {
            id: Set(Uuid::new_v4()),
            content: Set(comment.content),
            video: Set(comment.video),
            owner: Set(comment.owner),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(to_insert.insert(&self.db).await?)
    }

    #[instrument(skip(self))]
    async fn update_comment(
        &self,
        id: Uuid,
        content: String,
    ) -> anyhow::Result<Option<comment::Model>> {
        let Some(existing) = comment::Entity::find_by_id(id).one(&self.db).await? else {
            return Ok(None);
        };

        let mut to_update = existing.into_active_model();
        to_update.content = Set(content);
        to_update.updated_at = Set(OffsetDateTime::now_utc());
        Ok(updated_or_missing(to_update.update(&self.db).await)?)
    }

    #[instrument(skip(self))]
    async fn delete_comment(&self, id: Uuid) -> anyhow::Result<Option<comment::Model>> {
        let Some(existing) = comment::Entity::find_by_id(id).one(&self.db).await? else {
            return Ok(None);
        };

        let result = comment::Entity::delete_by_id(id).exec(&self.db).await?;
        Ok((result.rows_affected > 0).then_some(existing))
    }
}
