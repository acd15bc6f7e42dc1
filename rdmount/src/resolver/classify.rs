//! Movie/episode classification from release names.
//!
//! Precedence:
//!
//! 1. An episode marker (`S01E02`, `1x02`) makes an episode; the show is
//!    the text before the marker.
//! 2. Otherwise the last standalone year 1900–2099 that is not a
//!    resolution (`2160p`) makes a movie; the title is the text before it.
//! 3. Anything else is unclassified.

use regex::Regex;
use serde::Serialize;
use std::fmt;
use std::sync::LazyLock;

use crate::media::strip_media_extension;

static SXXEYY_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^a-z0-9])s(\d{1,2})[ ._-]?e(\d{1,3})(?:[^0-9]|$)").expect("valid regex")
});

static NXNN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(?:^|[^0-9a-z])(\d{1,2})x(\d{2,3})(?:[^0-9]|$)").expect("valid regex")
});

static DIGITS_RE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\d+").expect("valid regex"));

static TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\[[^\]]*\]|\([^)]*\)|\{[^}]*\}").expect("valid regex"));

/// Kind of an organized entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Movie,
    Episode,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Movie => f.write_str("movie"),
            Self::Episode => f.write_str("episode"),
        }
    }
}

/// Inferred identity of a video file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Classification {
    Movie { title: String, year: u16 },
    Episode { show: String, season: u32, episode: u32 },
}

impl Classification {
    pub fn kind(&self) -> MediaKind {
        match self {
            Self::Movie { .. } => MediaKind::Movie,
            Self::Episode { .. } => MediaKind::Episode,
        }
    }
}

/// Classify a file or directory name.
pub fn classify(name: &str) -> Option<Classification> {
    let stem = strip_media_extension(name);
    classify_episode(stem).or_else(|| classify_movie(stem))
}

fn classify_episode(stem: &str) -> Option<Classification> {
    for re in [&*SXXEYY_RE, &*NXNN_RE] {
        let Some(caps) = re.captures(stem) else {
            continue;
        };
        let (Some(season), Some(episode)) = (caps.get(1), caps.get(2)) else {
            continue;
        };
        let start = caps.get(0).map(|m| m.start()).unwrap_or(0);
        let show = clean_title(&stem[..start]);
        if show.is_empty() {
            continue;
        }
        return Some(Classification::Episode {
            show,
            season: season.as_str().parse().ok()?,
            episode: episode.as_str().parse().ok()?,
        });
    }
    None
}

fn classify_movie(stem: &str) -> Option<Classification> {
    let bytes = stem.as_bytes();
    let candidate = DIGITS_RE
        .find_iter(stem)
        .filter(|m| m.len() == 4)
        .filter(|m| !matches!(bytes.get(m.end()), Some(b'p') | Some(b'P')))
        .filter_map(|m| {
            let year: u16 = m.as_str().parse().ok()?;
            (1900..=2099).contains(&year).then_some((m.start(), year))
        })
        .filter(|(start, _)| !clean_title(&stem[..*start]).is_empty())
        .last()?;

    let (start, year) = candidate;
    Some(Classification::Movie {
        title: clean_title(&stem[..start]),
        year,
    })
}

/// Turn release-name text into a human title.
///
/// Bracketed tags are dropped, dots and underscores become spaces, runs of
/// whitespace collapse, and characters illegal in path components go.
pub fn clean_title(raw: &str) -> String {
    let without_tags = TAG_RE.replace_all(raw, " ");
    let spaced: String = without_tags
        .chars()
        .filter(|c| {
            !matches!(
                c,
                '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' | '(' | ')' | '[' | ']' | '{' | '}'
            )
        })
        .map(|c| if c == '.' || c == '_' { ' ' } else { c })
        .collect();
    spaced
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
        .trim_matches(|c: char| c == '-' || c == ' ')
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn movie(title: &str, year: u16) -> Option<Classification> {
        Some(Classification::Movie {
            title: title.to_string(),
            year,
        })
    }

    fn episode(show: &str, season: u32, episode: u32) -> Option<Classification> {
        Some(Classification::Episode {
            show: show.to_string(),
            season,
            episode,
        })
    }

    #[test]
    fn test_episode_marker() {
        assert_eq!(
            classify("ShowName.S01E02.1080p.WEB.mkv"),
            episode("ShowName", 1, 2)
        );
        assert_eq!(
            classify("The_Show_s10e105_HDTV.mp4"),
            episode("The Show", 10, 105)
        );
        assert_eq!(classify("Some Show - 3x07.avi"), episode("Some Show", 3, 7));
    }

    #[test]
    fn test_episode_takes_precedence_over_year() {
        assert_eq!(
            classify("Doctor.Who.2005.S01E01.mkv"),
            episode("Doctor Who 2005", 1, 1)
        );
    }

    #[test]
    fn test_movie_year() {
        assert_eq!(classify("Movie.Title.2021.mkv"), movie("Movie Title", 2021));
        assert_eq!(
            classify("Blade.Runner.2049.2017.2160p.UHD.mkv"),
            movie("Blade Runner 2049", 2017)
        );
        assert_eq!(
            classify("[Group] Some Film (1999) [1080p].mkv"),
            movie("Some Film", 1999)
        );
    }

    #[test]
    fn test_resolution_is_not_a_year() {
        assert_eq!(classify("Clip.2048p.mkv"), None);
        assert_eq!(classify("1920x1080.sample.mkv"), None);
    }

    #[test]
    fn test_unclassified() {
        assert_eq!(classify("random_video.mkv"), None);
        assert_eq!(classify("2012.mkv"), None);
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("The.Movie_Name.[x264] "), "The Movie Name");
        assert_eq!(clean_title("What?: Why"), "What Why");
        assert_eq!(clean_title("Show - "), "Show");
    }
}
