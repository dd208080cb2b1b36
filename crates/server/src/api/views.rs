//! Response shapes with image paths resolved against the image CDN.
//!
//! Upstream records keep their relative `*_path` fields; each view adds the
//! matching absolute `*_url`, or the placeholder when there is no image.

use serde::Serialize;

use cinematicdb_core::metadata::{CastMember, Credits, CrewMember, Page};
use cinematicdb_core::{CollectionEntry, ImageUrls, MediaDetails, MediaItem, SearchResults};

#[derive(Debug, Serialize)]
pub struct MediaItemView {
    #[serde(flatten)]
    pub item: MediaItem,
    pub poster_url: String,
    pub backdrop_url: String,
}

impl MediaItemView {
    pub fn new(item: MediaItem, images: &ImageUrls) -> Self {
        Self {
            poster_url: images.poster(item.poster_path.as_deref()),
            backdrop_url: images.backdrop(item.backdrop_path.as_deref()),
            item,
        }
    }
}

pub fn page_view(page: SearchResults, images: &ImageUrls) -> Page<MediaItemView> {
    Page {
        page: page.page,
        results: page
            .results
            .into_iter()
            .map(|item| MediaItemView::new(item, images))
            .collect(),
        total_pages: page.total_pages,
        total_results: page.total_results,
    }
}

#[derive(Debug, Serialize)]
pub struct CastView {
    #[serde(flatten)]
    pub member: CastMember,
    pub profile_url: String,
}

#[derive(Debug, Serialize)]
pub struct CrewView {
    #[serde(flatten)]
    pub member: CrewMember,
    pub profile_url: String,
}

#[derive(Debug, Serialize)]
pub struct CreditsView {
    pub cast: Vec<CastView>,
    pub crew: Vec<CrewView>,
}

impl CreditsView {
    pub fn new(credits: Credits, images: &ImageUrls) -> Self {
        Self {
            cast: credits
                .cast
                .into_iter()
                .map(|member| CastView {
                    profile_url: images.profile(member.profile_path.as_deref()),
                    member,
                })
                .collect(),
            crew: credits
                .crew
                .into_iter()
                .map(|member| CrewView {
                    profile_url: images.profile(member.profile_path.as_deref()),
                    member,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct DetailsView {
    /// Credits are moved to `credits` below.
    #[serde(flatten)]
    pub details: MediaDetails,
    pub poster_url: String,
    pub backdrop_url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub credits: Option<CreditsView>,
}

impl DetailsView {
    pub fn new(mut details: MediaDetails, images: &ImageUrls) -> Self {
        let credits = details
            .credits
            .take()
            .map(|credits| CreditsView::new(credits, images));
        Self {
            poster_url: images.poster(details.item.poster_path.as_deref()),
            backdrop_url: images.backdrop(details.item.backdrop_path.as_deref()),
            details,
            credits,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct CollectionEntryView {
    #[serde(flatten)]
    pub entry: CollectionEntry,
    pub poster_url: String,
    pub backdrop_url: String,
}

impl CollectionEntryView {
    pub fn new(entry: CollectionEntry, images: &ImageUrls) -> Self {
        Self {
            poster_url: images.poster(entry.poster_path.as_deref()),
            backdrop_url: images.backdrop(entry.backdrop_path.as_deref()),
            entry,
        }
    }
}
