//! Location lookups.
//!
//! Thin read service over the geo projection: where a video was shot, and
//! which videos were shot in a given place.

use vindex_models::VideoId;
use vindex_store::{ProjectionQueries, VideoLocation, VideoRepository};

use crate::error::{SearchError, SearchResult};

/// Location queries over the geo projection.
pub struct LocationService {
    videos: VideoRepository,
    queries: ProjectionQueries,
}

impl LocationService {
    pub fn new(videos: VideoRepository, queries: ProjectionQueries) -> Self {
        Self { videos, queries }
    }

    /// The location of one video, when its metadata carried GPS
    /// coordinates.
    pub async fn get_video_location(
        &self,
        asset_id: &str,
    ) -> SearchResult<Option<VideoLocation>> {
        let video_id = VideoId::from(asset_id);
        if !self.videos.exists(&video_id).await? {
            return Err(SearchError::VideoNotFound(asset_id.to_string()));
        }
        Ok(self.queries.get_location(&video_id).await?)
    }

    /// Videos located in a country.
    pub async fn find_by_country(&self, country: &str) -> SearchResult<Vec<VideoLocation>> {
        Ok(self.queries.find_locations_by_country(country).await?)
    }

    /// Videos located in a city.
    pub async fn find_by_city(&self, city: &str) -> SearchResult<Vec<VideoLocation>> {
        Ok(self.queries.find_locations_by_city(city).await?)
    }
}
