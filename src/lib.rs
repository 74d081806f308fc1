pub mod api;
pub mod comment_repo;
pub mod comment_routes;
pub mod comment_service;
pub mod config;
pub mod media;
pub mod orm;
pub mod pagination;
pub mod tweet_repo;
pub mod tweet_routes;
pub mod tweet_service;
pub mod user_repo;
pub mod validation;
pub mod video_repo;
pub mod video_routes;
pub mod video_service;
