//! Announcements: periodic GitHub GraphQL pull with singleflight refresh
//! and stale fallback.

pub mod fetcher;
pub mod service;

pub use fetcher::{AnnouncementFetcher, AnnouncementItem, FetchError, GithubFetcher};
pub use service::{AnnouncementsService, AnnouncementsSnapshot};
