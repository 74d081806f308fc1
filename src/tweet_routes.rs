use axum::{
    Json, Router,
    extract::{Path, State, rejection::JsonRejection},
    http::StatusCode,
    routing,
};
use rearch::Container;
use tracing::instrument;

use crate::{
    api::{ApiError, ApiResponse, CurrentUser},
    tweet_service::{Tweet, TweetError, TweetPayload, TweetSummary, tweet_service_capsule},
};

pub fn router() -> Router<Container> {
    Router::new()
        .route("/api/v1/tweets", routing::post(create_tweet))
        .route("/api/v1/tweets/user/{user_id}", routing::get(user_tweets))
        .route(
            "/api/v1/tweets/{tweet_id}",
            routing::patch(update_tweet).delete(delete_tweet),
        )
}

impl From<TweetError> for ApiError {
    fn from(error: TweetError) -> Self {
        match error {
            TweetError::Validation(error) => Self::from(error),
            TweetError::NoneFound | TweetError::NotFound => Self::not_found(error),
            TweetError::Internal(_) => Self::internal(&error),
        }
    }
}

#[instrument(skip(container))]
async fn create_tweet(
    State(container): State<Container>,
    CurrentUser(owner): CurrentUser,
    payload: Result<Json<TweetPayload>, JsonRejection>,
) -> Result<ApiResponse<Tweet>, ApiError> {
    let Json(payload) = payload?;
    let tweet = container
        .read(tweet_service_capsule)
        .create_tweet(owner, payload)
        .await?;
    Ok(ApiResponse::new(
        StatusCode::CREATED,
        tweet,
        "Tweet created successfully",
    ))
}

#[instrument(skip(container))]
async fn user_tweets(
    State(container): State<Container>,
    Path(user_id): Path<String>,
) -> Result<ApiResponse<Vec<TweetSummary>>, ApiError> {
    let tweets = container
        .read(tweet_service_capsule)
        .user_tweets(&user_id)
        .await?;
    Ok(ApiResponse::ok(tweets, "Tweets fetched successfully"))
}

#[instrument(skip(container))]
async fn update_tweet(
    State(container): State<Container>,
    Path(tweet_id): Path<String>,
    payload: Result<Json<TweetPayload>, JsonRejection>,
) -> Result<ApiResponse<Tweet>, ApiError> {
    let Json(payload) = payload?;
    let tweet = container
        .read(tweet_service_capsule)
        .update_tweet(&tweet_id, payload)
        .await?;
    Ok(ApiResponse::ok(tweet, "Tweet updated successfully"))
}

#[instrument(skip(container))]
async fn delete_tweet(
    State(container): State<Container>,
    Path(tweet_id): Path<String>,
) -> Result<ApiResponse<Tweet>, ApiError> {
    let tweet = container
        .read(tweet_service_capsule)
        .delete_tweet(&tweet_id)
        .await?;
    Ok(ApiResponse::ok(tweet, "Tweet deleted successfully"))
}
