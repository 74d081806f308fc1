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
    orm::{tweet, updated_or_missing},
};

pub fn tweet_repository_capsule(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> Arc<dyn TweetRepository> {
    let db = get.as_ref(db_conn_capsule).clone();
    Arc::new(TweetRepositoryImpl { db })
}

#[async_trait]
pub trait TweetRepository: Send + Sync {
    async fn create_tweet(&self, owner: Uuid, content: String) -> anyhow::Result<tweet::Model>;

    /// All tweets of `owner`, newest first.
    async fn list_tweets(&self, owner: Uuid) -> anyhow::Result<Vec<tweet::Model>>;
    async fn update_tweet(
        &self,
        id: Uuid,
        content: String,
    ) -> anyhow::Result<Option<tweet::Model>>;
    async fn delete_tweet(&self, id: Uuid) -> anyhow::Result<Option<tweet::Model>>;
}

struct TweetRepositoryImpl {
    db: DbConn,
}

#[async_trait]
impl TweetRepository for TweetRepositoryImpl {
    #[instrument(skip(self))]
    async fn create_tweet(&self, owner: Uuid, content: String) -> anyhow::Result<tweet::Model> {
        let now = OffsetDateTime::now_utc();
        let to_insert = tweet::ActiveModel {
            id: Set(Uuid::new_v4()),
            content: Set(content),
            owner: Set(owner),
            created_at: Set(now),
            updated_at: Set(now),
        };
        Ok(to_insert.insert(&self.db).await?)
    }

    #[instrument(skip(self))]
    async fn list_tweets(&self, owner: Uuid) -> anyhow::Result<Vec<tweet::Model>> {
        Ok(tweet::Entity::find()
            .filter(tweet::Column::Owner.eq(owner))
            .order_by_desc(tweet::Column::CreatedAt)
            .all(&self.db)
            .await?)
    }

    #[instrument(skip(self))]
    async fn update_tweet(
        &self,
        id: Uuid,
        content: String,
    ) -> anyhow::Result<Option<tweet::Model>> {
        let Some(existing) = tweet::Entity::find_by_id(id).one(&self.db).await? else {
            return Ok(None);
        };

        let mut to_update = existing.into_active_model();
        to_update.content = Set(content);
        to_update.updated_at = Set(OffsetDateTime::now_utc());
        Ok(updated_or_missing(to_update.update(&self.db).await)?)
    }

    #[instrument(skip(self))]
    async fn delete_tweet(&self, id: Uuid) -> anyhow::Result<Option<tweet::Model>> {
        let Some(existing) = tweet::Entity::find_by_id(id).one(&self.db).await? else {
            return Ok(None);
        };

        let result = tweet::Entity::delete_by_id(id).exec(&self.db).await?;
        Ok((result.rows_affected > 0).then_some(existing))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use sea_orm::{DatabaseBackend, MockDatabase, MockExecResult};

    use super::*;

    fn new_tweet(owner: Uuid, content: &str) -> tweet::Model {
        let now = OffsetDateTime::now_utc();
        tweet::Model {
            id: Uuid::new_v4(),
            content: content.to_owned(),
            owner,
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_create_tweet() {
        let owner = Uuid::new_v4();
        let stored = new_tweet(owner, "hello");
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![stored.clone()]])
            .into_connection();
        let repo = TweetRepositoryImpl { db };

        assert_eq!(
            repo.create_tweet(owner, "hello".to_owned()).await.unwrap(),
            stored
        );
    }

    #[tokio::test]
    async fn test_list_tweets() {
        let owner = Uuid::new_v4();
        let tweets = vec![new_tweet(owner, "second"), new_tweet(owner, "first")];
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([tweets.clone()])
            .into_connection();
        let repo = TweetRepositoryImpl { db };

        assert_eq!(repo.list_tweets(owner).await.unwrap(), tweets);
    }

    #[tokio::test]
    async fn test_update_tweet() {
        let existing = new_tweet(Uuid::new_v4(), "typo");
        let updated = tweet::Model {
            content: "fixed".to_owned(),
            ..existing.clone()
        };
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![existing.clone()]])
            .append_query_results([vec![updated.clone()]])
            .into_connection();
        let repo = TweetRepositoryImpl { db };

        assert_eq!(
            repo.update_tweet(existing.id, "fixed".to_owned())
                .await
                .unwrap(),
            Some(updated)
        );
    }

    #[tokio::test]
    async fn test_update_tweet_deleted_meanwhile() {
        let existing = new_tweet(Uuid::new_v4(), "typo");
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![existing.clone()]])
            .append_query_results([Vec::<tweet::Model>::new()])
            .into_connection();
        let repo = TweetRepositoryImpl { db };

        assert_eq!(
            repo.update_tweet(existing.id, "fixed".to_owned())
                .await
                .unwrap(),
            None
        );
    }

    #[tokio::test]
    async fn test_delete_tweet_missing() {
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([Vec::<tweet::Model>::new()])
            .into_connection();
        let repo = TweetRepositoryImpl { db };

        assert_eq!(repo.delete_tweet(Uuid::new_v4()).await.unwrap(), None);
        assert_eq!(repo.db.into_transaction_log().len(), 1);
    }

    #[tokio::test]
    async fn test_delete_tweet() {
        let existing = new_tweet(Uuid::new_v4(), "bye");
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![existing.clone()]])
            .append_exec_results([MockExecResult {
                last_insert_id: 0,
                rows_affected: 1,
            }])
            .into_connection();
        let repo = TweetRepositoryImpl { db };

        assert_eq!(repo.delete_tweet(existing.id).await.unwrap(), Some(existing));
    }
}
