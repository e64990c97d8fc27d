//! Video records and list query types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use vidfeed_core::{PageRequest, PaginatedResponse};

/// Upper bound of the `VARCHAR(255)` columns
pub const MAX_VARCHAR_LEN: usize = 255;

/// A stored video
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct VideoRecord {
    pub id: i64,
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub published_at: DateTime<Utc>,
    /// Serialized JSON, passed through untouched
    pub thumbnails: String,
    pub channel_title: String,
    pub created_at: DateTime<Utc>,
}

/// A video extracted from a search result, not yet stored
#[derive(Debug, Clone, PartialEq)]
pub struct NewVideo {
    pub video_id: String,
    pub title: String,
    pub description: String,
    pub published_at: DateTime<Utc>,
    pub thumbnails: String,
    pub channel_title: String,
}

impl NewVideo {
    /// Extract the stored fields from one raw search item
    ///
    /// Returns a human-readable reason when a required field is missing or
    /// does not fit the schema.
    pub fn from_search_item(item: &Value) -> Result<Self, String> {
        let video_id = required_str(item, &["id", "videoId"])?;
        if video_id.is_empty() {
            return Err("id.videoId is empty".to_string());
        }

        let title = required_str(item, &["snippet", "title"])?;
        let description = required_str(item, &["snippet", "description"])?;
        let channel_title = required_str(item, &["snippet", "channelTitle"])?;

        let raw_published = required_str(item, &["snippet", "publishedAt"])?;
        let published_at = DateTime::parse_from_rfc3339(raw_published)
            .map_err(|e| format!("snippet.publishedAt is not RFC 3339: {}", e))?
            .with_timezone(&Utc);

        let thumbnails = lookup(item, &["snippet", "thumbnails"])
            .ok_or_else(|| "missing field snippet.thumbnails".to_string())?
            .to_string();

        for (field, value) in [
            ("id.videoId", video_id),
            ("snippet.title", title),
            ("snippet.channelTitle", channel_title),
        ] {
            if value.chars().count() > MAX_VARCHAR_LEN {
                return Err(format!(
                    "{} exceeds {} characters",
                    field, MAX_VARCHAR_LEN
                ));
            }
        }

        Ok(Self {
            video_id: video_id.to_string(),
            title: title.to_string(),
            description: description.to_string(),
            published_at,
            thumbnails,
            channel_title: channel_title.to_string(),
        })
    }
}

fn lookup<'a>(item: &'a Value, path: &[&str]) -> Option<&'a Value> {
    path.iter().try_fold(item, |node, segment| node.get(segment))
}

fn required_str<'a>(item: &'a Value, path: &[&str]) -> Result<&'a str, String> {
    match lookup(item, path) {
        Some(Value::String(s)) => Ok(s.as_str()),
        Some(_) => Err(format!("field {} is not a string", path.join("."))),
        None => Err(format!("missing field {}", path.join("."))),
    }
}

/// Sortable attributes of the list view
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortField {
    #[default]
    PublishedAt,
    Title,
    Rank,
    Similarity,
    /// Row id; only the final tie-break, never parsed from a request
    Id,
}

impl SortField {
    /// Parse a client-supplied sort key; unknown keys fall back to `published_at`
    pub fn parse(raw: &str) -> Self {
        match raw {
            "title" => Self::Title,
            "rank" => Self::Rank,
            "similarity" => Self::Similarity,
            _ => Self::PublishedAt,
        }
    }

    /// Column name in the list query
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PublishedAt => "published_at",
            Self::Title => "title",
            Self::Rank => "rank",
            Self::Similarity => "similarity",
            Self::Id => "id",
        }
    }
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    /// Only `desc` is descending; any other value sorts ascending
    pub fn parse(raw: &str) -> Self {
        if raw == "desc" {
            Self::Desc
        } else {
            Self::Asc
        }
    }

    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }

    /// Comparison selecting rows that come after a key in this direction
    pub fn after_op(&self) -> &'static str {
        match self {
            Self::Asc => " > ",
            Self::Desc => " < ",
        }
    }
}

/// Filters, ordering and page window for a list call
#[derive(Debug, Clone, Default)]
pub struct VideoQuery {
    /// Free-text search over title and description
    pub search: Option<String>,
    /// Accepted for compatibility; videos carry no category so it never narrows
    pub category: Option<String>,
    pub published_after: Option<DateTime<Utc>>,
    pub published_before: Option<DateTime<Utc>>,
    pub sort: SortField,
    pub order: SortOrder,
    pub page: PageRequest,
}

impl VideoQuery {
    /// Trimmed, non-empty search term
    pub fn search_term(&self) -> Option<&str> {
        self.search
            .as_deref()
            .map(str::trim)
            .filter(|term| !term.is_empty())
    }

    /// Full keyset ordering: the requested key, then `published_at DESC,
    /// id DESC`
    ///
    /// Every row has a distinct position, which keyset cursors rely on.
    pub fn ordering(&self) -> Vec<(SortField, SortOrder)> {
        let mut keys = vec![(self.sort, self.order)];
        if self.sort != SortField::PublishedAt {
            keys.push((SortField::PublishedAt, SortOrder::Desc));
        }
        keys.push((SortField::Id, SortOrder::Desc));
        keys
    }

    /// Key to resume after, if the request carried a valid cursor
    pub fn position(&self) -> Option<VideoCursor> {
        self.page.position()
    }
}

/// Sort key of one listed row, encoded into page cursors
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoCursor {
    pub published_at: DateTime<Utc>,
    pub id: i64,
    pub title: String,
    pub rank: f32,
    pub similarity: f32,
}

/// A row of the list query with its relevance scores
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct ListedVideo {
    #[sqlx(flatten)]
    pub video: VideoRecord,
    pub rank: f32,
    pub similarity: f32,
}

impl ListedVideo {
    pub fn cursor(&self) -> VideoCursor {
        VideoCursor {
            published_at: self.video.published_at,
            id: self.video.id,
            title: self.video.title.clone(),
            rank: self.rank,
            similarity: self.similarity,
        }
    }
}

/// One page of list results
pub type VideoPage = PaginatedResponse<VideoRecord>;

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;

    fn search_item(id: &str) -> Value {
        json!({
            "kind": "youtube#searchResult",
            "id": {"kind": "youtube#video", "videoId": id},
            "snippet": {
                "publishedAt": "2024-05-01T10:30:00Z",
                "channelTitle": "Tea Channel",
                "title": "How to brew oolong",
                "description": "Water temperature matters",
                "thumbnails": {"default": {"url": "https://i.ytimg.com/vi/x/default.jpg"}}
            }
        })
    }

    #[test]
    fn test_extract_complete_item() {
        let video = NewVideo::from_search_item(&search_item("abc123")).unwrap();

        assert_eq!(video.video_id, "abc123");
        assert_eq!(video.title, "How to brew oolong");
        assert_eq!(video.channel_title, "Tea Channel");
        assert_eq!(
            video.published_at,
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap()
        );

        let thumbnails: Value = serde_json::from_str(&video.thumbnails).unwrap();
        assert_eq!(
            thumbnails["default"]["url"],
            "https://i.ytimg.com/vi/x/default.jpg"
        );
    }

    #[test]
    fn test_extract_rejects_missing_video_id() {
        let mut item = search_item("abc");
        item["id"] = json!({"kind": "youtube#channel", "channelId": "UC1"});

        let err = NewVideo::from_search_item(&item).unwrap_err();
        assert!(err.contains("id.videoId"));
    }

    #[test]
    fn test_extract_rejects_bad_timestamp() {
        let mut item = search_item("abc");
        item["snippet"]["publishedAt"] = json!("last tuesday");

        let err = NewVideo::from_search_item(&item).unwrap_err();
        assert!(err.contains("publishedAt"));
    }

    #[test]
    fn test_extract_rejects_overlong_title() {
        let mut item = search_item("abc");
        item["snippet"]["title"] = json!("t".repeat(MAX_VARCHAR_LEN + 1));

        assert!(NewVideo::from_search_item(&item).is_err());
    }

    #[test]
    fn test_sort_field_fallback() {
        assert_eq!(SortField::parse("title"), SortField::Title);
        assert_eq!(SortField::parse("similarity"), SortField::Similarity);
        assert_eq!(SortField::parse("rank"), SortField::Rank);
        assert_eq!(SortField::parse("views"), SortField::PublishedAt);
        assert_eq!(SortField::parse(""), SortField::PublishedAt);
    }

    #[test]
    fn test_sort_order_parse() {
        assert_eq!(SortOrder::parse("desc"), SortOrder::Desc);
        assert_eq!(SortOrder::parse("asc"), SortOrder::Asc);
        assert_eq!(SortOrder::parse("DESC"), SortOrder::Asc);
        assert_eq!(SortOrder::default(), SortOrder::Desc);
    }

    #[test]
    fn test_search_keeps_published_at_default() {
        let query = VideoQuery {
            search: Some("tea".to_string()),
            ..Default::default()
        };

        assert_eq!(
            query.ordering(),
            vec![
                (SortField::PublishedAt, SortOrder::Desc),
                (SortField::Id, SortOrder::Desc),
            ]
        );
    }

    #[test]
    fn test_ordering_appends_tie_breaks() {
        let query = VideoQuery {
            search: Some("tea".to_string()),
            sort: SortField::Title,
            order: SortOrder::Asc,
            ..Default::default()
        };
        assert_eq!(
            query.ordering(),
            vec![
                (SortField::Title, SortOrder::Asc),
                (SortField::PublishedAt, SortOrder::Desc),
                (SortField::Id, SortOrder::Desc),
            ]
        );

        let ascending = VideoQuery {
            order: SortOrder::Asc,
            ..Default::default()
        };
        assert_eq!(
            ascending.ordering(),
            vec![
                (SortField::PublishedAt, SortOrder::Asc),
                (SortField::Id, SortOrder::Desc),
            ]
        );
    }

    #[test]
    fn test_blank_search_is_no_search() {
        let query = VideoQuery {
            search: Some("   ".to_string()),
            ..Default::default()
        };
        assert_eq!(query.search_term(), None);
    }

    #[test]
    fn test_position_reads_cursor() {
        let key = VideoCursor {
            published_at: Utc.with_ymd_and_hms(2024, 5, 1, 10, 30, 0).unwrap(),
            id: 7,
            title: "How to brew oolong".to_string(),
            rank: 0.0607927,
            similarity: 0.25,
        };
        let cursor = vidfeed_core::encode_cursor(&key).unwrap();

        let query = VideoQuery {
            page: PageRequest::new(Some(&cursor), None),
            ..Default::default()
        };
        assert_eq!(query.position(), Some(key));
        assert_eq!(VideoQuery::default().position(), None);
    }
}
