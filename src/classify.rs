//! URL classification: which video platform a link belongs to.
//!
//! Classification is pure and host-based. Hosts are compared case-insensitively
//! against a fixed domain table, matching either the domain itself or any of its
//! subdomains (`www.youtube.com`, `m.facebook.com`, `clips.twitch.tv`).

use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::Serialize;
use url::Url;

/// Container extensions treated as directly downloadable video files.
pub const VIDEO_EXTENSIONS: [&str; 10] = [
    "mp4", "avi", "mov", "mkv", "webm", "flv", "wmv", "m4v", "3gp", "ogv",
];

/// Video hosting platform a URL belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Instagram,
    Tiktok,
    Twitter,
    Facebook,
    Vimeo,
    Dailymotion,
    Twitch,
    Other,
}

/// Domain table. No domain is a suffix of another, so at most one entry matches.
const PLATFORM_HOSTS: [(&str, Platform); 10] = [
    ("youtube.com", Platform::Youtube),
    ("youtu.be", Platform::Youtube),
    ("instagram.com", Platform::Instagram),
    ("tiktok.com", Platform::Tiktok),
    ("twitter.com", Platform::Twitter),
    ("x.com", Platform::Twitter),
    ("facebook.com", Platform::Facebook),
    ("vimeo.com", Platform::Vimeo),
    ("dailymotion.com", Platform::Dailymotion),
    ("twitch.tv", Platform::Twitch),
];

impl Platform {
    /// Stable lowercase label used in logs and reports.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Youtube => "youtube",
            Self::Instagram => "instagram",
            Self::Tiktok => "tiktok",
            Self::Twitter => "twitter",
            Self::Facebook => "facebook",
            Self::Vimeo => "vimeo",
            Self::Dailymotion => "dailymotion",
            Self::Twitch => "twitch",
            Self::Other => "other",
        }
    }

    /// Human-readable name for status messages.
    #[must_use]
    pub fn display_name(self) -> &'static str {
        match self {
            Self::Youtube => "YouTube",
            Self::Instagram => "Instagram",
            Self::Tiktok => "TikTok",
            Self::Twitter => "Twitter/X",
            Self::Facebook => "Facebook",
            Self::Vimeo => "Vimeo",
            Self::Dailymotion => "Dailymotion",
            Self::Twitch => "Twitch",
            Self::Other => "Other",
        }
    }

    /// Whether the browser-header direct fetch is worth trying after the
    /// platform downloaders failed.
    #[must_use]
    pub fn supports_enhanced_fetch(self) -> bool {
        matches!(self, Self::Youtube | Self::Instagram | Self::Tiktok)
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returns the platform of `url`, or [`Platform::Other`] for unknown hosts and
/// unparseable input.
#[must_use]
pub fn classify(url: &str) -> Platform {
    let Some(host) = Url::parse(url.trim())
        .ok()
        .and_then(|u| u.host_str().map(str::to_ascii_lowercase))
    else {
        return Platform::Other;
    };

    PLATFORM_HOSTS
        .iter()
        .find(|(domain, _)| host_matches(&host, domain))
        .map_or(Platform::Other, |(_, platform)| *platform)
}

fn host_matches(host: &str, domain: &str) -> bool {
    host == domain
        || host
            .strip_suffix(domain)
            .is_some_and(|prefix| prefix.ends_with('.'))
}

/// True when the URL belongs to a known platform and needs a platform downloader.
#[must_use]
pub fn requires_platform_downloader(url: &str) -> bool {
    classify(url) != Platform::Other
}

/// True when the URL path ends in a known video container extension.
#[must_use]
pub fn is_direct_video_url(url: &str) -> bool {
    Url::parse(url.trim())
        .ok()
        .and_then(|u| extension_of(u.path()))
        .is_some_and(|ext| is_video_extension(&ext))
}

/// True when `ext` (without the dot, any case) is a recognized video extension.
#[must_use]
pub fn is_video_extension(ext: &str) -> bool {
    let lower = ext.to_ascii_lowercase();
    VIDEO_EXTENSIONS.contains(&lower.as_str())
}

fn extension_of(path: &str) -> Option<String> {
    let last = path.rsplit('/').next()?;
    let (stem, ext) = last.rsplit_once('.')?;
    if stem.is_empty() || ext.is_empty() {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

/// Derives the local filename for a direct fetch of `url`.
///
/// Uses the percent-decoded last path segment. Falls back to
/// `video_<unix-secs>.mp4` when the segment is empty or has no extension, and
/// appends `.mp4` when the extension is not a video container.
#[must_use]
pub fn filename_for_url(url: &str) -> String {
    let segment = Url::parse(url.trim())
        .ok()
        .and_then(|u| {
            u.path_segments()
                .and_then(|mut segments| segments.next_back().map(str::to_string))
        })
        .map(|raw| {
            urlencoding::decode(&raw)
                .map(std::borrow::Cow::into_owned)
                .unwrap_or_else(|_| raw.clone())
        })
        .map(|name| sanitize(&name))
        .unwrap_or_default();

    let name = if segment.is_empty() || !segment.contains('.') {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or(0);
        format!("video_{timestamp}.mp4")
    } else {
        segment
    };

    match name.rsplit_once('.') {
        Some((_, ext)) if is_video_extension(ext) => name,
        _ => format!("{name}.mp4"),
    }
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c if c.is_control() => '_',
            c => c,
        })
        .collect::<String>()
        .trim_matches(|c: char| c == '.' || c.is_whitespace())
        .to_string()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_known_platforms() {
        let cases = [
            ("https://youtube.com/watch?v=dQw4w9WgXcQ", Platform::Youtube),
            ("https://www.youtube.com/shorts/abc123", Platform::Youtube),
            ("https://youtu.be/dQw4w9WgXcQ", Platform::Youtube),
            ("https://www.instagram.com/p/ABC123/", Platform::Instagram),
            ("https://instagram.com/reel/DEF456/", Platform::Instagram),
            ("https://www.tiktok.com/@user/video/123", Platform::Tiktok),
            ("https://twitter.com/user/status/123", Platform::Twitter),
            ("https://x.com/user/status/123", Platform::Twitter),
            ("https://www.facebook.com/watch/?v=123", Platform::Facebook),
            ("https://vimeo.com/123456", Platform::Vimeo),
            ("https://www.dailymotion.com/video/123", Platform::Dailymotion),
            ("https://www.twitch.tv/clips/123", Platform::Twitch),
        ];
        for (url, expected) in cases {
            assert_eq!(classify(url), expected, "url: {url}");
        }
    }

    #[test]
    fn test_classify_unknown_hosts_are_other() {
        assert_eq!(classify("https://example.com/video.mp4"), Platform::Other);
        assert_eq!(classify("https://site.com/file.mov"), Platform::Other);
        assert_eq!(classify("not a url"), Platform::Other);
    }

    #[test]
    fn test_classify_is_case_insensitive_on_host() {
        assert_eq!(classify("https://WWW.YouTube.COM/watch?v=1"), Platform::Youtube);
    }

    #[test]
    fn test_classify_does_not_match_lookalike_hosts() {
        assert_eq!(classify("https://netflix.com/title/1"), Platform::Other);
        assert_eq!(classify("https://notyoutube.com/watch"), Platform::Other);
        assert_eq!(
            classify("https://youtube.com.evil.example/watch"),
            Platform::Other
        );
    }

    #[test]
    fn test_classify_ignores_platform_names_in_path() {
        assert_eq!(
            classify("https://example.com/youtube.com/clip.mp4"),
            Platform::Other
        );
    }

    #[test]
    fn test_requires_platform_downloader() {
        assert!(requires_platform_downloader("https://vimeo.com/1"));
        assert!(!requires_platform_downloader("https://example.com/clip.mp4"));
    }

    #[test]
    fn test_is_direct_video_url() {
        assert!(is_direct_video_url("https://example.com/clip.mp4"));
        assert!(is_direct_video_url("https://example.com/a/b/CLIP.MKV?x=1"));
        assert!(is_direct_video_url("https://cdn.example.com/v.3gp"));
        assert!(!is_direct_video_url("https://example.com/page.html"));
        assert!(!is_direct_video_url("https://youtube.com/watch?v=1"));
        assert!(!is_direct_video_url("https://example.com/.mp4"));
    }

    #[test]
    fn test_enhanced_fetch_platforms() {
        assert!(Platform::Youtube.supports_enhanced_fetch());
        assert!(Platform::Instagram.supports_enhanced_fetch());
        assert!(Platform::Tiktok.supports_enhanced_fetch());
        assert!(!Platform::Vimeo.supports_enhanced_fetch());
        assert!(!Platform::Other.supports_enhanced_fetch());
    }

    #[test]
    fn test_filename_for_url_keeps_video_name() {
        assert_eq!(filename_for_url("https://example.com/clip.mp4"), "clip.mp4");
        assert_eq!(
            filename_for_url("https://example.com/my%20video.webm"),
            "my video.webm"
        );
    }

    #[test]
    fn test_filename_for_url_appends_mp4_for_other_extensions() {
        assert_eq!(
            filename_for_url("https://example.com/stream.php"),
            "stream.php.mp4"
        );
    }

    #[test]
    fn test_filename_for_url_falls_back_to_timestamp() {
        let name = filename_for_url("https://youtube.com/watch?v=abc");
        assert!(name.starts_with("video_"), "got {name}");
        assert!(name.ends_with(".mp4"), "got {name}");
    }

    #[test]
    fn test_filename_for_url_strips_path_separators() {
        let name = filename_for_url("https://example.com/a%2F..%2Fb.mp4");
        assert!(!name.contains('/'), "got {name}");
        assert!(name.ends_with(".mp4"));
    }
}
