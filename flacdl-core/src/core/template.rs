//! Folder and filename templates.
//!
//! | Placeholder      | Value                         | When absent       |
//! |------------------|-------------------------------|-------------------|
//! | `{title}`        | track title                   | `Unknown Title`   |
//! | `{artist}`       | track artists                 | `Unknown Artist`  |
//! | `{album}`        | album title                   | `Unknown Album`   |
//! | `{album_artist}` | album artist, else artist     | `Unknown Artist`  |
//! | `{track}`        | track number, two digits      | `00`              |
//! | `{disc}`         | disc number                   | `1`               |
//! | `{year}`         | first four chars of the date  | `0000`            |
//! | `{isrc}`         | ISRC                          | empty             |
//! | `{playlist}`     | playlist / discography name   | empty             |
//!
//! Anything else in braces is left as written.

use regex::{Captures, Regex};
use std::sync::LazyLock;

use crate::core::filename::{join_path, sanitize_segment};
use crate::models::settings::OperatingSystem;
use crate::models::track::TrackRef;

static TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\{([a-z_]+)\}").unwrap());

/// Stands in for `/` inside substituted values while a folder template is split.
const SLASH_PLACEHOLDER: char = '\u{E000}';

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TemplateContext {
    pub title: Option<String>,
    pub artist: Option<String>,
    pub album: Option<String>,
    pub album_artist: Option<String>,
    pub track: Option<u32>,
    pub disc: Option<u32>,
    pub year: Option<String>,
    pub isrc: Option<String>,
    pub playlist: Option<String>,
}

fn non_empty(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

impl TemplateContext {
    pub fn from_track(track: &TrackRef, track_number: u32, playlist: Option<&str>) -> Self {
        Self {
            title: non_empty(Some(&track.name)),
            artist: non_empty(track.artists.as_deref()),
            album: non_empty(track.album_name.as_deref()),
            album_artist: non_empty(track.album_artist.as_deref()),
            track: Some(track_number),
            disc: track.disc_number,
            year: non_empty(track.release_date.as_deref())
                .map(|d| d.chars().take(4).collect()),
            isrc: non_empty(track.isrc.as_deref()),
            playlist: non_empty(playlist),
        }
    }

    /// Rendered value for a recognised placeholder, `None` for anything else.
    fn value(&self, key: &str) -> Option<String> {
        let or = |v: &Option<String>, fallback: &str| {
            v.clone().unwrap_or_else(|| fallback.to_string())
        };
        let value = match key {
            "title" => or(&self.title, "Unknown Title"),
            "artist" => or(&self.artist, "Unknown Artist"),
            "album" => or(&self.album, "Unknown Album"),
            "album_artist" => self
                .album_artist
                .clone()
                .or_else(|| self.artist.clone())
                .unwrap_or_else(|| "Unknown Artist".to_string()),
            "track" => format!("{:02}", self.track.unwrap_or(0)),
            "disc" => self.disc.filter(|d| *d > 0).unwrap_or(1).to_string(),
            "year" => or(&self.year, "0000"),
            "isrc" => or(&self.isrc, ""),
            "playlist" => or(&self.playlist, ""),
            _ => return None,
        };
        Some(value)
    }

    fn substitute(&self, template: &str, escape: impl Fn(String) -> String) -> String {
        TOKEN_RE
            .replace_all(template, |caps: &Captures| match self.value(&caps[1]) {
                Some(v) => escape(v),
                None => caps[0].to_string(),
            })
            .into_owned()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TemplateResolver {
    os: OperatingSystem,
}

impl TemplateResolver {
    pub fn new(os: OperatingSystem) -> Self {
        Self { os }
    }

    /// Resolves a filename template into a single sanitized file stem.
    pub fn resolve(&self, template: &str, ctx: &TemplateContext) -> String {
        let raw = ctx.substitute(template, |v| v);
        let name = sanitize_segment(&raw, self.os);
        if name.is_empty() {
            "Unknown".to_string()
        } else {
            name
        }
    }

    /// Resolves a folder template into sanitized path segments.
    ///
    /// Only `/` written in the template itself separates folders; a slash
    /// inside a value (`AC/DC`) becomes a space.
    pub fn folder_segments(&self, template: &str, ctx: &TemplateContext) -> Vec<String> {
        let raw = ctx.substitute(template, |v| v.replace('/', &SLASH_PLACEHOLDER.to_string()));
        raw.split('/')
            .filter(|part| !part.trim().is_empty())
            .map(|part| sanitize_segment(&part.replace(SLASH_PLACEHOLDER, " "), self.os))
            .filter(|part| !part.is_empty())
            .collect()
    }

    /// `base` joined with the resolved folder template.
    pub fn folder_path(&self, base: &str, template: &str, ctx: &TemplateContext) -> String {
        join_path(self.os, base, &self.folder_segments(template, ctx))
    }

    /// `base` plus the playlist or discography folder, if any.
    pub fn collection_dir(&self, base: &str, collection: Option<&str>) -> String {
        match collection {
            Some(name) => {
                let segment = sanitize_segment(&name.replace('/', " "), self.os);
                join_path(self.os, base, &[segment])
            }
            None => join_path(self.os, base, &[]),
        }
    }
}
