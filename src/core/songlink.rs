use std::time::Duration;

use anyhow::{anyhow, bail};
use async_trait::async_trait;
use flacdl_core::sources::traits::{LinkResolver, StreamingUrls};
use serde::Deserialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use url::Url;

const API_BASE: &str = "https://api.song.link/v1-alpha.1/links";
const SPOTIFY_TRACK_BASE: &str = "https://open.spotify.com/track/";

const WINDOW: Duration = Duration::from_secs(60);
const MAX_CALLS_PER_WINDOW: u32 = 9;
const MIN_GAP: Duration = Duration::from_secs(7);
const RATE_LIMIT_WAIT: Duration = Duration::from_secs(15);
const MAX_ATTEMPTS: u32 = 3;
const BODY_PREVIEW_CHARS: usize = 200;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinksResponse {
    #[serde(default)]
    links_by_platform: LinksByPlatform,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinksByPlatform {
    tidal: Option<PlatformLink>,
    amazon_music: Option<PlatformLink>,
}

#[derive(Debug, Deserialize)]
struct PlatformLink {
    url: String,
}

/// Call budget shared by every lookup: a fixed number of calls per minute
/// and a minimum gap between consecutive calls.
#[derive(Debug)]
struct RateWindow {
    window_start: Instant,
    calls: u32,
    last_call: Option<Instant>,
}

impl RateWindow {
    fn new(now: Instant) -> Self {
        Self {
            window_start: now,
            calls: 0,
            last_call: None,
        }
    }

    fn roll(&mut self, now: Instant) {
        if now.duration_since(self.window_start) >= WINDOW {
            self.window_start = now;
            self.calls = 0;
        }
    }

    fn delay(&mut self, now: Instant, min_gap: Duration) -> Duration {
        self.roll(now);
        let mut wait = Duration::ZERO;
        if self.calls >= MAX_CALLS_PER_WINDOW {
            wait = WINDOW.saturating_sub(now.duration_since(self.window_start));
        }
        if let Some(last) = self.last_call {
            wait = wait.max(min_gap.saturating_sub(now.duration_since(last)));
        }
        wait
    }

    fn record(&mut self, now: Instant) {
        self.roll(now);
        self.calls += 1;
        self.last_call = Some(now);
    }
}

pub struct SongLinkClient {
    client: reqwest::Client,
    window: Mutex<RateWindow>,
}

impl SongLinkClient {
    pub fn new(client: reqwest::Client) -> Self {
        Self {
            client,
            window: Mutex::new(RateWindow::new(Instant::now())),
        }
    }

    fn links_url(&self, track_id: &str) -> anyhow::Result<Url> {
        let mut url = Url::parse(API_BASE)?;
        url.query_pairs_mut()
            .append_pair("url", &format!("{}{}", SPOTIFY_TRACK_BASE, track_id));
        Ok(url)
    }

    /// Holds the lock while sleeping so concurrent callers queue up.
    async fn wait_turn(&self) {
        let mut window = self.window.lock().await;
        let delay = window.delay(Instant::now(), MIN_GAP);
        if !delay.is_zero() {
            tracing::debug!("[songlink] waiting {:.1}s for rate limit", delay.as_secs_f64());
            tokio::time::sleep(delay).await;
        }
        window.record(Instant::now());
    }
}

#[async_trait]
impl LinkResolver for SongLinkClient {
    async fn resolve(&self, track_id: &str) -> anyhow::Result<StreamingUrls> {
        let url = self.links_url(track_id)?;

        for attempt in 1..=MAX_ATTEMPTS {
            self.wait_turn().await;
            let resp = self.client.get(url.clone()).send().await?;
            let status = resp.status();

            if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
                if attempt < MAX_ATTEMPTS {
                    tracing::warn!(
                        "[songlink] rate limited, retrying in {}s ({}/{})",
                        RATE_LIMIT_WAIT.as_secs(),
                        attempt,
                        MAX_ATTEMPTS
                    );
                    tokio::time::sleep(RATE_LIMIT_WAIT).await;
                    continue;
                }
                bail!("API rate limit exceeded after {} attempts", MAX_ATTEMPTS);
            }
            if !status.is_success() {
                bail!("API returned status {}", status.as_u16());
            }

            let body = resp.text().await?;
            let urls = parse_links(&body)?;
            tracing::info!(
                "[songlink] {} -> tidal: {}, amazon: {}",
                track_id,
                urls.tidal_url.is_some(),
                urls.amazon_url.is_some()
            );
            return Ok(urls);
        }

        Err(anyhow!("API rate limit exceeded after {} attempts", MAX_ATTEMPTS))
    }
}

fn parse_links(body: &str) -> anyhow::Result<StreamingUrls> {
    if body.trim().is_empty() {
        bail!("API returned empty response");
    }
    let parsed: LinksResponse = serde_json::from_str(body).map_err(|e| {
        let preview: String = body.chars().take(BODY_PREVIEW_CHARS).collect();
        anyhow!("failed to decode response: {} (body: {})", e, preview)
    })?;

    let platforms = parsed.links_by_platform;
    let urls = StreamingUrls {
        tidal_url: platforms.tidal.map(|l| l.url).filter(|u| !u.is_empty()),
        amazon_url: platforms.amazon_music.map(|l| l.url).filter(|u| !u.is_empty()),
    };
    if urls.tidal_url.is_none() && urls.amazon_url.is_none() {
        bail!("no streaming URLs found");
    }
    Ok(urls)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_both_platforms() {
        let body = r#"{
            "entityUniqueId": "SPOTIFY_SONG::abc",
            "linksByPlatform": {
                "tidal": {"url": "https://listen.tidal.com/track/1234", "entityUniqueId": "TIDAL_SONG::1234"},
                "amazonMusic": {"url": "https://music.amazon.com/albums/B0?trackAsin=B1"},
                "deezer": {"url": "https://www.deezer.com/track/9"}
            }
        }"#;
        let urls = parse_links(body).unwrap();
        assert_eq!(urls.tidal_url.as_deref(), Some("https://listen.tidal.com/track/1234"));
        assert_eq!(
            urls.amazon_url.as_deref(),
            Some("https://music.amazon.com/albums/B0?trackAsin=B1")
        );
    }

    #[test]
    fn parse_single_platform() {
        let body = r#"{"linksByPlatform":{"amazonMusic":{"url":"https://music.amazon.com/x"}}}"#;
        let urls = parse_links(body).unwrap();
        assert!(urls.tidal_url.is_none());
        assert!(urls.amazon_url.is_some());
    }

    #[test]
    fn parse_errors() {
        assert_eq!(
            parse_links("  ").unwrap_err().to_string(),
            "API returned empty response"
        );
        assert_eq!(
            parse_links(r#"{"linksByPlatform":{"deezer":{"url":"x"}}}"#)
                .unwrap_err()
                .to_string(),
            "no streaming URLs found"
        );
        let garbage = format!("<html>{}</html>", "x".repeat(500));
        let err = parse_links(&garbage).unwrap_err().to_string();
        assert!(err.contains("failed to decode response"));
        assert!(err.len() < 400);
    }

    #[test]
    fn links_url_encodes_spotify_url() {
        let client = SongLinkClient::new(reqwest::Client::new());
        let url = client.links_url("4uLU6hMCjMI75M1A2tKUQC").unwrap();
        assert_eq!(url.host_str(), Some("api.song.link"));
        let (key, value) = url.query_pairs().next().unwrap();
        assert_eq!(key, "url");
        assert_eq!(value, "https://open.spotify.com/track/4uLU6hMCjMI75M1A2tKUQC");
    }

    #[test]
    fn rate_window_enforces_gap_and_budget() {
        let start = Instant::now();
        let mut window = RateWindow::new(start);
        assert_eq!(window.delay(start, MIN_GAP), Duration::ZERO);
        window.record(start);

        let soon = start + Duration::from_secs(2);
        assert_eq!(window.delay(soon, MIN_GAP), Duration::from_secs(5));

        let mut now = start;
        for _ in 1..MAX_CALLS_PER_WINDOW {
            now += Duration::from_secs(1);
            window.record(now);
        }
        assert_eq!(window.calls, MAX_CALLS_PER_WINDOW);
        let later = now + Duration::from_secs(1);
        assert_eq!(
            window.delay(later, MIN_GAP),
            WINDOW - later.duration_since(start)
        );

        let next_window = start + WINDOW;
        assert_eq!(window.delay(next_window, Duration::ZERO), Duration::ZERO);
        assert_eq!(window.calls, 0);
    }
}
