use std::sync::Arc;

use async_trait::async_trait;
use rearch::CapsuleHandle;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, DbConn, EntityTrait,
    IntoActiveModel, Order, QueryFilter, QueryOrder,
};
use time::OffsetDateTime;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    config::db_conn_capsule,
    orm::{updated_or_missing, video},
    pagination::{Page, PageRequest, fetch_page},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum VideoSortField {
    Title,
    Duration,
    Views,
    CreatedAt,
    UpdatedAt,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SortDirection {
    Asc,
    Desc,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VideoSort {
    pub field: VideoSortField,
    pub direction: SortDirection,
}

impl Default for VideoSort {
    fn default() -> Self {
        Self {
            field: VideoSortField::CreatedAt,
            direction: SortDirection::Desc,
        }
    }
}

/// Filter, sort and page of a video listing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct VideoListQuery {
    pub owner: Uuid,
    /// Substring matched against the title or the description.
    pub search: Option<String>,
    pub sort: VideoSort,
    pub page: PageRequest,
}

#[derive(Clone, Debug, PartialEq)]
pub struct NewVideo {
    pub video_file: String,
    pub thumbnail: String,
    pub title: String,
    pub description: String,
    pub duration: f64,
    pub owner: Uuid,
}

/// Fields of a video to overwrite; [`None`] leaves the stored value alone.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct VideoChanges {
    pub title: Option<String>,
    pub description: Option<String>,
    pub thumbnail: Option<String>,
}

pub fn video_repository_capsule(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> Arc<dyn VideoRepository> {
    let db = get.as_ref(db_conn_capsule).clone();
    Arc::new(VideoRepositoryImpl { db })
}

#[async_trait]
pub trait VideoRepository: Send + Sync {
    async fn list_videos(&self, query: VideoListQuery) -> anyhow::Result<Page<video::Model>>;
    async fn find_video(&self, id: Uuid) -> anyhow::Result<Option<video::Model>>;
    async fn create_video(&self, video: NewVideo) -> anyhow::Result<video::Model>;

    /// Returns [`None`] when no video has the given id.
    async fn update_video(
        &self,
        id: Uuid,
        changes: VideoChanges,
    ) -> anyhow::Result<Option<video::Model>>;

    /// Flips the publish flag; returns [`None`] when no video has the given id.
    async fn toggle_publish(&self, id: Uuid) -> anyhow::Result<Option<video::Model>>;

    /// Returns the deleted video, or [`None`] when no video has the given id.
    async fn delete_video(&self, id: Uuid) -> anyhow::Result<Option<video::Model>>;
}

struct VideoRepositoryImpl {
    db: DbConn,
}

const fn sort_column(field: VideoSortField) -> video::Column {
    match field {
        VideoSortField::Title => video::Column::Title,
        VideoSortField::Duration => video::Column::Duration,
        VideoSortField::Views => video::Column::Views,
        VideoSortField::CreatedAt => video::Column::CreatedAt,
        VideoSortField::UpdatedAt => video::Column::UpdatedAt,
    }
}

const fn sort_order(direction: SortDirection) -> Order {
    match direction {
        SortDirection::Asc => Order::Asc,
        SortDirection::Desc => Order::Desc,
    }
}

#[async_trait]
impl VideoRepository for VideoRepositoryImpl {
    #[instrument(skip(self))]
    async fn list_videos(&self, query: VideoListQuery) -> anyhow::Result<Page<video::Model>> {
        let mut condition = Condition::all().add(video::Column::Owner.eq(query.owner));
        if let Some(search) = query.search.as_deref() {
            condition = condition.add(
                Condition::any()
                    .add(video::Column::Title.contains(search))
                    .add(video::Column::Description.contains(search)),
            );
        }

        let select = video::Entity::find()
            .filter(condition)
            .order_by(sort_column(query.sort.field), sort_order(query.sort.direction))
            // NOTE: tie-breaker so that pages stay stable between requests
            .order_by_asc(video::Column::Id);

        Ok(fetch_page(select, &self.db, query.page).await?)
    }

    #[instrument(skip(self))]
    async fn find_video(&self, id: Uuid) -> anyhow::Result<Option<video::Model>> {
        Ok(video::Entity::find_by_id(id).one(&self.db).await?)
    }

    #[instrument(skip(self))]
    async fn create_video(&self, video: NewVideo) -> anyhow::Result<video::Model> {
        let now = OffsetDateTime::now_utc();
        let to_insert = video::ActiveModel {
            id: Set(Uuid::new_v4()),
            video_file: Set(video.video_file),
            thumbnail: Set(video.thumbnail),
            title: Set(video.title),
            description: Set(video.description),
            duration: Set(video.duration),
            views: Set(0),
            is_published: Set(true),
            owner: Set(video.owner),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(to_insert.insert(&self.db).await?)
    }

    #[instrument(skip(self))]
    async fn update_video(
        &self,
        id: Uuid,
        changes: VideoChanges,
    ) -> anyhow::Result<Option<video::Model>> {
        let Some(existing) = self.find_video(id).await? else {
            return Ok(None);
        };

        let mut to_update = existing.into_active_model();
        if let Some(title) = changes.title {
            to_update.title = Set(title);
        }
        if let Some(description) = changes.description {
            to_update.description = Set(description);
        }
        if let Some(thumbnail) = changes.thumbnail {
            to_update.thumbnail = Set(thumbnail);
        }
        to_update.updated_at = Set(OffsetDateTime::now_utc());
        Ok(updated_or_missing(to_update.update(&self.db).await)?)
    }

    #[instrument(skip(self))]
    async fn toggle_publish(&self, id: Uuid) -> anyhow::Result<Option<video::Model>> {
        let Some(existing) = self.find_video(id).await? else {
            return Ok(None);
        };

        let is_published = existing.is_published;
        let mut to_update = existing.into_active_model();
        to_update.is_published = Set(!is_published);
        to_update.updated_at = Set(OffsetDateTime::now_utc());
        Ok(updated_or_missing(to_update.update(&self.db).await)?)
    }

    #[instrument(skip(self))]
    async fn delete_video(&self, id: Uuid) -> anyhow::Result<Option<video::Model>> {
        let Some(existing) = self.find_video(id).await? else {
            return Ok(None);
        };

        let result = video::Entity::delete_by_id(id).exec(&self.db).await?;
        // NOTE: a concurrent delete may have won the race
        Ok((result.rows_affected > 0).then_some(existing))
    }
}
