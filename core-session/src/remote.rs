//! Library server session API
//!
//! Implements [`RemoteSessionClient`] over the host [`HttpClient`] against the
//! server's REST endpoints:
//!
//! - `POST /api/items/{id}/play` opens a session
//! - `POST /api/session/{id}/sync` reports listened time
//! - `POST /api/session/{id}/close` closes it
//! - `POST /api/session/local-all` uploads sessions recorded offline

use async_trait::async_trait;
use bridge_traits::error::{BridgeError, Result};
use bridge_traits::http::{HttpClient, HttpRequest, RetryPolicy};
use bridge_traits::session::{
    BulkSessionRecord, RemoteChapter, RemoteSessionClient, RemoteTrack, StartedSession,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
const MEDIA_PLAYER: &str = "audioshelf-core";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct PlayRequest<'a> {
    force_direct_play: bool,
    media_player: &'a str,
    supported_mime_types: &'a [&'a str],
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SessionResponse {
    id: String,
    library_item_id: String,
    #[serde(default)]
    display_title: Option<String>,
    #[serde(default)]
    current_time: f64,
    #[serde(default)]
    duration: f64,
    #[serde(default)]
    chapters: Vec<ChapterResponse>,
    #[serde(default)]
    audio_tracks: Vec<AudioTrackResponse>,
    #[serde(default)]
    media_progress_id: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChapterResponse {
    id: i64,
    start: f64,
    end: f64,
    #[serde(default)]
    title: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AudioTrackResponse {
    index: u32,
    #[serde(default)]
    start_offset: f64,
    #[serde(default)]
    duration: f64,
    content_url: String,
    #[serde(default)]
    mime_type: Option<String>,
    #[serde(default)]
    metadata: Option<TrackFileMetadata>,
}

#[derive(Debug, Deserialize)]
struct TrackFileMetadata {
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SyncRequest {
    time_listened: f64,
    current_time: f64,
}

#[derive(Debug, Serialize)]
struct BulkSyncRequest {
    sessions: Vec<BulkSessionRecord>,
}

/// HTTP-backed remote session client.
pub struct HttpRemoteSessionClient {
    http_client: Arc<dyn HttpClient>,
    server_url: String,
    api_token: Option<String>,
    retry_policy: RetryPolicy,
}

impl HttpRemoteSessionClient {
    pub fn new(http_client: Arc<dyn HttpClient>, server_url: impl Into<String>) -> Self {
        let server_url = server_url.into().trim_end_matches('/').to_string();
        Self {
            http_client,
            server_url,
            api_token: None,
            retry_policy: RetryPolicy::no_retry(),
        }
    }

    pub fn with_api_token(mut self, token: impl Into<String>) -> Self {
        self.api_token = Some(token.into());
        self
    }

    /// Retry transient failures of each call. Session calls are not retried
    /// by default; the session manager owns retry decisions.
    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    fn request(&self, path: &str) -> HttpRequest {
        let request = HttpRequest::post(format!("{}{}", self.server_url, path))
            .header("Accept", "application/json")
            .timeout(REQUEST_TIMEOUT);

        match &self.api_token {
            Some(token) => request.bearer_token(token.clone()),
            None => request,
        }
    }

    fn absolute_url(&self, url: &str) -> String {
        if url.starts_with("http://") || url.starts_with("https://") {
            url.to_string()
        } else {
            format!("{}/{}", self.server_url, url.trim_start_matches('/'))
        }
    }

    async fn send(&self, request: HttpRequest) -> Result<bridge_traits::http::HttpResponse> {
        self.http_client
            .execute_with_retry(request, self.retry_policy.clone())
            .await?
            .error_for_status()
    }

    fn convert_session(&self, response: SessionResponse) -> StartedSession {
        let tracks = response
            .audio_tracks
            .into_iter()
            .map(|track| RemoteTrack {
                index: track.index,
                start_offset: track.start_offset,
                duration: track.duration,
                content_url: self.absolute_url(&track.content_url),
                mime_type: track.mime_type,
                size_bytes: track.metadata.and_then(|m| m.size),
            })
            .collect();

        StartedSession {
            base_streaming_url: Some(format!("{}/api/session/{}", self.server_url, response.id)),
            session_id: response.id,
            item_id: response.library_item_id,
            title: response.display_title.unwrap_or_default(),
            current_time: response.current_time,
            duration: response.duration,
            chapters: response
                .chapters
                .into_iter()
                .map(|c| RemoteChapter {
                    id: c.id,
                    start: c.start,
                    end: c.end,
                    title: c.title,
                })
                .collect(),
            tracks,
            progress_id: response.media_progress_id,
        }
    }
}

fn encode_segment(segment: &str) -> String {
    segment
        .bytes()
        .map(|b| match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                (b as char).to_string()
            }
            other => format!("%{:02X}", other),
        })
        .collect()
}

#[async_trait]
impl RemoteSessionClient for HttpRemoteSessionClient {
    #[instrument(skip(self))]
    async fn start_session(&self, item_id: &str) -> Result<StartedSession> {
        let body = PlayRequest {
            force_direct_play: true,
            media_player: MEDIA_PLAYER,
            supported_mime_types: &["audio/mpeg", "audio/mp4", "audio/aac", "audio/flac", "audio/ogg"],
        };
        let request = self
            .request(&format!("/api/items/{}/play", encode_segment(item_id)))
            .json(&body)?;

        let response: SessionResponse = self.send(request).await?.json()?;
        if response.id.is_empty() {
            return Err(BridgeError::OperationFailed(
                "Server returned a session without id".to_string(),
            ));
        }

        debug!(session_id = %response.id, tracks = response.audio_tracks.len(), "Session started");
        Ok(self.convert_session(response))
    }

    #[instrument(skip(self))]
    async fn sync_session(
        &self,
        session_id: &str,
        time_listened: f64,
        current_time: f64,
    ) -> Result<()> {
        let request = self
            .request(&format!("/api/session/{}/sync", encode_segment(session_id)))
            .json(&SyncRequest {
                time_listened,
                current_time,
            })?;

        self.send(request).await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn close_session(&self, session_id: &str) -> Result<()> {
        let request = self.request(&format!("/api/session/{}/close", encode_segment(session_id)));
        self.send(request).await?;
        Ok(())
    }

    #[instrument(skip(self, sessions), fields(count = sessions.len()))]
    async fn bulk_sync_sessions(&self, sessions: Vec<BulkSessionRecord>) -> Result<()> {
        if sessions.is_empty() {
            return Ok(());
        }

        let request = self
            .request("/api/session/local-all")
            .json(&BulkSyncRequest { sessions })?;
        self.send(request).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bridge_traits::http::{DownloadStream, HttpMethod, HttpResponse};
    use bytes::Bytes;
    use mockall::mock;
    use std::collections::HashMap;

    mock! {
        Http {}

        #[async_trait]
        impl HttpClient for Http {
            async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
            async fn download_stream(&self, request: HttpRequest) -> Result<DownloadStream>;
        }
    }

    fn response(status: u16, body: &str) -> HttpResponse {
        HttpResponse {
            status,
            headers: HashMap::new(),
            body: Bytes::from(body.to_string()),
        }
    }

    #[tokio::test]
    async fn test_start_session_parses_tracks_and_chapters() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|request| {
                request.method == HttpMethod::Post
                    && request.url == "https://abs.example/api/items/li_1/play"
                    && request.headers.get("Authorization").map(String::as_str)
                        == Some("Bearer secret")
            })
            .times(1)
            .returning(|_| {
                Ok(response(
                    200,
                    r#"{
                        "id": "play_1",
                        "libraryItemId": "li_1",
                        "displayTitle": "Dune",
                        "currentTime": 120.5,
                        "duration": 3600,
                        "chapters": [{"id": 0, "start": 0, "end": 1800, "title": "Book One"}],
                        "audioTracks": [
                            {"index": 1, "startOffset": 0, "duration": 1800,
                             "contentUrl": "/api/items/li_1/file/1", "mimeType": "audio/mpeg",
                             "metadata": {"size": 1024}}
                        ]
                    }"#,
                ))
            });

        let client = HttpRemoteSessionClient::new(Arc::new(http), "https://abs.example/")
            .with_api_token("secret");
        let started = client.start_session("li_1").await.unwrap();

        assert_eq!(started.session_id, "play_1");
        assert_eq!(started.title, "Dune");
        assert_eq!(started.current_time, 120.5);
        assert_eq!(started.chapters.len(), 1);
        assert_eq!(
            started.tracks[0].content_url,
            "https://abs.example/api/items/li_1/file/1"
        );
        assert_eq!(started.tracks[0].size_bytes, Some(1024));
    }

    #[tokio::test]
    async fn test_sync_not_found_maps_to_not_found() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|request| {
                request.url == "https://abs.example/api/session/play_1/sync"
                    && request.body.as_ref().is_some_and(|body| {
                        let json: serde_json::Value = serde_json::from_slice(body).unwrap();
                        json["timeListened"] == 25.0 && json["currentTime"] == 145.0
                    })
            })
            .returning(|_| Ok(response(404, "Session not found")));

        let client = HttpRemoteSessionClient::new(Arc::new(http), "https://abs.example");
        let error = client.sync_session("play_1", 25.0, 145.0).await.unwrap_err();

        assert!(error.is_not_found());
    }

    #[tokio::test]
    async fn test_close_unauthorized() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .returning(|_| Ok(response(401, "")));

        let client = HttpRemoteSessionClient::new(Arc::new(http), "https://abs.example");
        let error = client.close_session("play_1").await.unwrap_err();

        assert!(error.is_unauthorized());
    }

    #[tokio::test]
    async fn test_bulk_sync_sends_camel_case_sessions() {
        let mut http = MockHttp::new();
        http.expect_execute()
            .withf(|request| {
                let json: serde_json::Value =
                    serde_json::from_slice(request.body.as_ref().unwrap()).unwrap();
                request.url.ends_with("/api/session/local-all")
                    && json["sessions"][0]["sessionId"] == "local_1"
                    && json["sessions"][0]["timeListened"] == 42.0
            })
            .times(1)
            .returning(|_| Ok(response(200, "{}")));

        let client = HttpRemoteSessionClient::new(Arc::new(http), "https://abs.example");
        client
            .bulk_sync_sessions(vec![BulkSessionRecord {
                session_id: "local_1".to_string(),
                item_id: "li_1".to_string(),
                duration: 100.0,
                start_time: 0.0,
                current_time: 42.0,
                time_listened: 42.0,
                started_at: 1,
                updated_at: 2,
            }])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_bulk_sync_skips_empty_batch() {
        let http = MockHttp::new();
        let client = HttpRemoteSessionClient::new(Arc::new(http), "https://abs.example");
        client.bulk_sync_sessions(Vec::new()).await.unwrap();
    }

    #[test]
    fn test_encode_segment() {
        assert_eq!(encode_segment("li_1"), "li_1");
        assert_eq!(encode_segment("a b/c"), "a%20b%2Fc");
    }
}
