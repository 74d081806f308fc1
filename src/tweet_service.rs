use std::sync::Arc;

use anyhow::Context;
use async_trait::async_trait;
use rearch::CapsuleHandle;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use time::format_description::well_known::Rfc3339;
use tracing::instrument;
use uuid::Uuid;

use crate::{
    orm::tweet,
    tweet_repo::{TweetRepository, tweet_repository_capsule},
    validation::{ValidationError, parse_id, require_text},
};

#[derive(Debug, Default, Deserialize)]
pub struct TweetPayload {
    // NOTE: older clients send the text as "contents"
    #[serde(alias = "contents")]
    pub content: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tweet {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub content: String,
    pub owner: Uuid,
    pub created_at: String,
    pub updated_at: String,
}

/// A tweet as listed on its owner's profile.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TweetSummary {
    #[serde(rename = "_id")]
    pub id: Uuid,
    pub content: String,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Error)]
pub enum TweetError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("No tweets found")]
    NoneFound,
    #[error("Tweet not found")]
    NotFound,
    #[error("internal/database error: {0}")]
    Internal(anyhow::Error),
}

pub fn tweet_service_capsule(
    CapsuleHandle { mut get, .. }: CapsuleHandle,
) -> Arc<dyn TweetService> {
    let tweet_repo = Arc::clone(get.as_ref(tweet_repository_capsule));
    Arc::new(TweetServiceImpl { tweet_repo })
}

#[async_trait]
pub trait TweetService: Send + Sync {
    async fn create_tweet(
        &self,
        owner: Uuid,
        payload: TweetPayload,
    ) -> Result<Tweet, TweetError>;
    async fn user_tweets(&self, user_id: &str) -> Result<Vec<TweetSummary>, TweetError>;
    async fn update_tweet(
        &self,
        tweet_id: &str,
        payload: TweetPayload,
    ) -> Result<Tweet, TweetError>;
    async fn delete_tweet(&self, tweet_id: &str) -> Result<Tweet, TweetError>;
}

struct TweetServiceImpl {
    tweet_repo: Arc<dyn TweetRepository>,
}

#[async_trait]
impl TweetService for TweetServiceImpl {
    #[instrument(skip(self))]
    async fn create_tweet(
        &self,
        owner: Uuid,
        payload: TweetPayload,
    ) -> Result<Tweet, TweetError> {
        let content = require_text("content", payload.content.as_deref())?;

        self.tweet_repo
            .create_tweet(owner, content)
            .await
            .map_err(TweetError::Internal)?
            .try_into()
            .context("Failed to convert new tweet into external format")
            .map_err(TweetError::Internal)
    }

    #[instrument(skip(self))]
    async fn user_tweets(&self, user_id: &str) -> Result<Vec<TweetSummary>, TweetError> {
        let user_id = require_text("userId", Some(user_id))?;
        let owner = parse_id("userId", &user_id)?;

        let tweets = self
            .tweet_repo
            .list_tweets(owner)
            .await
            .map_err(TweetError::Internal)?;
        if tweets.is_empty() {
            return Err(TweetError::NoneFound);
        }

        tweets
            .into_iter()
            .map(|tweet| {
                let tweet = Tweet::try_from(tweet)?;
                anyhow::Ok(TweetSummary {
                    id: tweet.id,
                    content: tweet.content,
                    created_at: tweet.created_at,
                    updated_at: tweet.updated_at,
                })
            })
            .collect::<anyhow::Result<_>>()
            .context("Failed to convert tweets into external format")
            .map_err(TweetError::Internal)
    }

    #[instrument(skip(self))]
    async fn update_tweet(
        &self,
        tweet_id: &str,
        payload: TweetPayload,
    ) -> Result<Tweet, TweetError> {
        let id = parse_id("tweetId", tweet_id)?;
        let content = require_text("content", payload.content.as_deref())?;

        self.tweet_repo
            .update_tweet(id, content)
            .await
            .map_err(TweetError::Internal)?
            .ok_or(TweetError::NotFound)?
            .try_into()
            .context("Failed to convert updated tweet into external format")
            .map_err(TweetError::Internal)
    }

    #[instrument(skip(self))]
    async fn delete_tweet(&self, tweet_id: &str) -> Result<Tweet, TweetError> {
        let id = parse_id("tweetId", tweet_id)?;

        self.tweet_repo
            .delete_tweet(id)
            .await
            .map_err(TweetError::Internal)?
            .ok_or(TweetError::NotFound)?
            .try_into()
            .context("Failed to convert deleted tweet into external format")
            .map_err(TweetError::Internal)
    }
}

impl TryFrom<tweet::Model> for Tweet {
    type Error = anyhow::Error;

    fn try_from(tweet: tweet::Model) -> Result<Self, Self::Error> {
        Ok(Self {
            id: tweet.id,
            content: tweet.content,
            owner: tweet.owner,
            created_at: tweet
                .created_at
                .format(&Rfc3339)
                .context("Failed to format creation timestamp")?,
            updated_at: tweet
                .updated_at
                .format(&Rfc3339)
                .context("Failed to format update timestamp")?,
        })
    }
}
