use std::{
    collections::{BTreeSet, HashMap},
    sync::Arc,
};

use async_trait::async_trait;
use rearch::CapsuleHandle;
use sea_orm::{ColumnTrait, DbConn, EntityTrait, QueryFilter};
use serde::Serialize;
use tracing::instrument;
use uuid::Uuid;

use crate::{config::db_conn_capsule, orm::user};

pub fn user_repository_capsule(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> Arc<dyn UserRepository> {
    let db = get.as_ref(db_conn_capsule).clone();
    Arc::new(UserRepositoryImpl { db })
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Looks up the given users; unknown ids are silently skipped.
    async fn find_users(&self, ids: Vec<Uuid>) -> anyhow::Result<Vec<user::Model>>;
}

/// The public face of a user, embedded into listings of things they own.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OwnerSummary {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub username: String,
    pub full_name: String,
    pub avatar: String,
}

impl From<user::Model> for OwnerSummary {
    fn from(user: user::Model) -> Self {
        Self {
            id: user.id,
            username: user.username,
            full_name: user.full_name,
            avatar: user.avatar,
        }
    }
}

/// Resolves the owners of a batch of records with a single query.
///
/// # Errors
/// Will return [`Err`] when the lookup fails.
pub async fn lookup_owners(
    user_repo: &dyn UserRepository,
    owners: impl IntoIterator<Item = Uuid>,
) -> anyhow::Result<HashMap<Uuid, OwnerSummary>> {
    let ids = owners.into_iter().collect::<BTreeSet<_>>();
    Ok(user_repo
        .find_users(ids.into_iter().collect())
        .await?
        .into_iter()
        .map(|user| (user.id, OwnerSummary::from(user)))
        .collect())
}

struct UserRepositoryImpl {
    db: DbConn,
}

#[async_trait]
impl UserRepository for UserRepositoryImpl {
    #[instrument(skip(self))]
    async fn find_users(&self, ids: Vec<Uuid>) -> anyhow::Result<Vec<user::Model>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        Ok(user::Entity::find()
            .filter(user::Column::Id.is_in(ids))
            .all(&self.db)
            .await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use sea_orm::{DatabaseBackend, MockDatabase};

    use super::*;

    #[tokio::test]
    async fn test_find_users_skips_query_for_no_ids() {
        let db = MockDatabase::new(DatabaseBackend::Postgres).into_connection();
        let repo = UserRepositoryImpl { db };

        assert!(repo.find_users(Vec::new()).await.unwrap().is_empty());
        assert!(repo.db.into_transaction_log().is_empty());
    }

    fn new_user(username: &str) -> user::Model {
        user::Model {
            id: Uuid::new_v4(),
            username: username.to_owned(),
            full_name: format!("{username} Liddell"),
            avatar: format!("https://res.cloudinary.com/demo/{username}.png"),
        }
    }

    #[tokio::test]
    async fn test_lookup_owners_dedupes_ids() {
        let alice = new_user("alice");
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![alice.clone()]])
            .into_connection();
        let repo = UserRepositoryImpl { db };

        let owners = lookup_owners(&repo, [alice.id, alice.id, alice.id])
            .await
            .unwrap();

        assert_eq!(owners.len(), 1);
        assert_eq!(owners[&alice.id].username, "alice");
        assert_eq!(owners[&alice.id].full_name, "alice Liddell");
        assert_eq!(repo.db.into_transaction_log().len(), 1);
    }

    #[test]
    fn test_owner_summary_serializes_camel_case() {
        let alice = new_user("alice");
        let json = serde_json::to_value(OwnerSummary::from(alice.clone())).unwrap();
        assert_eq!(json["_id"], alice.id.to_string());
        assert_eq!(json["fullName"], "alice Liddell");
        assert_eq!(json["username"], "alice");
        assert!(json.get("full_name").is_none());
    }

    #[tokio::test]
    async fn test_find_users() {
        let alice = new_user("alice");
        let db = MockDatabase::new(DatabaseBackend::Postgres)
            .append_query_results([vec![alice.clone()]])
            .into_connection();
        let repo = UserRepositoryImpl { db };

        let users = repo.find_users(vec![alice.id, Uuid::new_v4()]).await.unwrap();

        assert_eq!(users, vec![alice]);
    }
}
