use std::path::PathBuf;
use std::sync::LazyLock;

use regex::Regex;
use unaccent::unaccent;

use crate::error::ParseError;
use crate::library::track::{Track, TrackType};
use crate::spotify_rs::types::{RawTrack, SavedTrackItem};

/// Extension of downloaded tracks, without the leading dot.
pub const TRACK_EXTENSION: &str = "mp3";

/// Cuts the title at the first occurrence of each separator, in this order.
const TITLE_SEPARATORS: [&str; 2] = [" - ", " live "];

/// A featuring credit already present in the title, in any casing.
static FEATURING_MARKER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(featuring |feat\. |ft\. |with )").expect("featuring marker pattern")
});

static CONSECUTIVE_WS: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\s{2,}").expect("whitespace pattern"));

const FEATURING_SUFFIX: &str = " (ft. ";

/// Characters dropped from derived file names.
const FILENAME_UNSAFE: [char; 8] = ['/', '\\', '.', '?', '<', '>', ':', '*'];

/// Turns raw library items into [`Track`]s.
///
/// The only side effect is a single existence check of the track's canonical path
/// under `music_directory`.
#[derive(Debug, Clone)]
pub struct TrackNormalizer {
    music_directory: PathBuf,
}

impl TrackNormalizer {
    pub fn new(music_directory: impl Into<PathBuf>) -> Self {
        Self {
            music_directory: music_directory.into(),
        }
    }

    /// Normalizes one entry of a saved-tracks page (`{"track": {...}}`).
    ///
    /// A field of the wrong type is reported by its path inside the track,
    /// e.g. `track_number` or `artists[1].name`.
    pub fn normalize_item(&self, item: &serde_json::Value) -> Result<Track, ParseError> {
        let item: SavedTrackItem = serde_path_to_error::deserialize(item).map_err(|error| {
            ParseError::new(item_field(&error.path().to_string()), error.inner().to_string())
        })?;
        let raw = item.track.ok_or_else(|| ParseError::missing("track"))?;
        self.normalize(&raw)
    }

    pub fn normalize(&self, raw: &RawTrack) -> Result<Track, ParseError> {
        let raw_title = raw.name.as_deref().ok_or_else(|| ParseError::missing("name"))?;

        let mut names = raw.artists.iter().enumerate().map(|(index, artist)| {
            artist
                .name
                .clone()
                .ok_or_else(|| ParseError::missing(format!("artists[{}].name", index)))
        });
        let artist = names
            .next()
            .ok_or_else(|| ParseError::new("artists", "list is empty"))??;
        let featurings = names.collect::<Result<Vec<_>, _>>()?;

        let album = raw.album.as_ref().ok_or_else(|| ParseError::missing("album"))?;
        let album_name = album
            .name
            .as_deref()
            .ok_or_else(|| ParseError::missing("album.name"))?;
        let release_date = album
            .release_date
            .as_deref()
            .ok_or_else(|| ParseError::missing("album.release_date"))?;
        let year = release_year(release_date)?;

        let track_number = raw
            .track_number
            .ok_or_else(|| ParseError::missing("track_number"))?;
        let duration = raw
            .duration_ms
            .ok_or_else(|| ParseError::missing("duration_ms"))?
            / 1000;

        let image = album
            .images
            .first()
            .ok_or_else(|| ParseError::new("album.images", "list is empty"))?
            .url
            .clone()
            .ok_or_else(|| ParseError::missing("album.images[0].url"))?;

        let track_type = classify_track_type(raw_title);
        let (title, song) = normalize_title(raw_title, &featurings);

        let filename = derive_filename(&artist, &title);
        let filename_temp = format!(".{}", filename);
        let search_pattern = filename.replace('-', " ");

        let mut track = Track {
            title,
            song,
            artist,
            featurings,
            album: normalize_album(album_name),
            year,
            genre: None,
            track_number,
            track_totals: None,
            duration,
            track_type,
            image,
            url: None,
            filename,
            filename_temp,
            filename_ext: TRACK_EXTENSION.to_string(),
            search_pattern,
            lyrics: None,
            local: false,
        };
        track.local = self.canonical_path(&track).is_file();

        tracing::debug!(
            "Normalized track {:?} (local: {}, type: {:?})",
            track.title,
            track.local,
            track.track_type
        );

        Ok(track)
    }

    /// Where a downloaded copy of `track` is expected to live.
    pub fn canonical_path(&self, track: &Track) -> PathBuf {
        self.music_directory.join(track.filename_final())
    }
}

fn item_field(path: &str) -> String {
    match path {
        "." => "items".to_string(),
        path => path.strip_prefix("track.").unwrap_or(path).to_string(),
    }
}

fn release_year(release_date: &str) -> Result<String, ParseError> {
    let year: String = release_date.chars().take(4).collect();
    if year.chars().count() < 4 {
        return Err(ParseError::new(
            "album.release_date",
            format!("`{}` is shorter than 4 characters", release_date),
        ));
    }
    Ok(year)
}

/// Classifies a raw title. Every matching type overwrites the previous one, so the
/// last match in [`TrackType::ALL`] order wins.
pub fn classify_track_type(title: &str) -> Option<TrackType> {
    let mut track_type = None;
    for candidate in TrackType::ALL {
        if candidate.matches(title) {
            track_type = Some(candidate);
        }
    }
    track_type
}

/// Drops alternate-version suffixes. Separators are matched case-sensitively.
pub fn clean_title(title: &str) -> String {
    let mut title = title;
    for separator in TITLE_SEPARATORS {
        title = title.split(separator).next().unwrap_or_default();
    }
    title.to_string()
}

/// Renders featuring artists inline: `A`, `A and B`, `A, B and C`.
pub fn inline_featurings(featurings: &[String]) -> String {
    match featurings {
        [] => String::new(),
        [only] => only.clone(),
        [rest @ .., last] => format!("{} and {}", rest.join(", "), last),
    }
}

/// Rewrites an existing featuring credit to `ft. `, or appends a generated
/// ` (ft. ...)` suffix when the title carries none.
pub fn normalize_featurings(title: &str, featurings: &[String]) -> String {
    if featurings.is_empty() {
        return title.to_string();
    }

    if FEATURING_MARKER.is_match(title) {
        return FEATURING_MARKER.replace_all(title, "ft. ").to_string();
    }

    let lowered = title.to_lowercase();
    let mut title = title;
    if lowered.contains('(')
        && lowered.contains(')')
        && (lowered.contains(" vs. ") || lowered.contains(" vs "))
    {
        title = title.split(" (").next().unwrap_or_default();
    }
    format!("{}{}{})", title, FEATURING_SUFFIX, inline_featurings(featurings))
}

/// Returns `(title, song)` for a raw title and its featuring artists.
pub fn normalize_title(raw_title: &str, featurings: &[String]) -> (String, String) {
    let title = normalize_featurings(&clean_title(raw_title), featurings);
    let song = if featurings.is_empty() {
        title.clone()
    } else {
        title
            .split(FEATURING_SUFFIX)
            .next()
            .unwrap_or_default()
            .to_string()
    };
    (title, song)
}

/// `<artist> - <title>` without path-unsafe characters, accents or doubled spaces.
pub fn derive_filename(artist: &str, title: &str) -> String {
    let filename: String = format!("{} - {}", artist, title)
        .chars()
        .filter(|c| !FILENAME_UNSAFE.contains(c))
        .collect();
    let filename = CONSECUTIVE_WS.replace_all(&filename, " ");
    unaccent(filename.trim())
}

fn normalize_album(album: &str) -> String {
    album
        .replace(['[', '{'], "(")
        .replace([']', '}'], ")")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spotify_rs::types::{RawAlbum, RawArtist, RawImage};
    use serde_json::json;

    fn raw_track(name: &str, artists: &[&str]) -> RawTrack {
        RawTrack {
            name: Some(name.into()),
            artists: artists
                .iter()
                .map(|artist| RawArtist {
                    name: Some(artist.to_string()),
                })
                .collect(),
            album: Some(RawAlbum {
                name: Some("The Album".into()),
                release_date: Some("1999-05-10".into()),
                images: vec![RawImage {
                    url: Some("https://i.scdn.co/image/abc123".into()),
                }],
            }),
            track_number: Some(4),
            duration_ms: Some(185_000),
        }
    }

    fn names(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    fn normalizer() -> TrackNormalizer {
        TrackNormalizer::new("/nonexistent/music-library")
    }

    #[test]
    fn test_artist_and_featurings() {
        let track = normalizer()
            .normalize(&raw_track("Song", &["A", "B", "C"]))
            .unwrap();
        assert_eq!(track.artist, "A");
        assert_eq!(track.featurings, names(&["B", "C"]));
    }

    #[test]
    fn test_basic_fields() {
        let track = normalizer().normalize(&raw_track("Song", &["A"])).unwrap();
        assert_eq!(track.title, "Song");
        assert_eq!(track.song, "Song");
        assert_eq!(track.album, "The Album");
        assert_eq!(track.year, "1999");
        assert_eq!(track.track_number, 4);
        assert_eq!(track.duration, 185);
        assert_eq!(track.image, "https://i.scdn.co/image/abc123");
        assert_eq!(track.filename_ext, "mp3");
        assert_eq!(track.genre, None);
        assert_eq!(track.track_totals, None);
        assert_eq!(track.url, None);
        assert_eq!(track.lyrics, None);
        assert!(!track.local);
    }

    #[test]
    fn test_duration_truncates() {
        let mut raw = raw_track("Song", &["A"]);
        raw.duration_ms = Some(185_999);
        assert_eq!(normalizer().normalize(&raw).unwrap().duration, 185);
    }

    #[test]
    fn test_short_release_date_fails() {
        let mut raw = raw_track("Song", &["A"]);
        raw.album.as_mut().unwrap().release_date = Some("199".into());
        let err = normalizer().normalize(&raw).unwrap_err();
        assert_eq!(err.field, "album.release_date");
    }

    #[test]
    fn test_empty_artists_fails() {
        let err = normalizer().normalize(&raw_track("Song", &[])).unwrap_err();
        assert_eq!(err.field, "artists");
    }

    #[test]
    fn test_empty_images_fails() {
        let mut raw = raw_track("Song", &["A"]);
        raw.album.as_mut().unwrap().images.clear();
        let err = normalizer().normalize(&raw).unwrap_err();
        assert_eq!(err.field, "album.images");
    }

    #[test]
    fn test_missing_fields_are_named() {
        let mut raw = raw_track("Song", &["A"]);
        raw.track_number = None;
        assert_eq!(
            normalizer().normalize(&raw).unwrap_err().field,
            "track_number"
        );

        let mut raw = raw_track("Song", &["A"]);
        raw.album = None;
        assert_eq!(normalizer().normalize(&raw).unwrap_err().field, "album");

        let mut raw = raw_track("Song", &["A"]);
        raw.name = None;
        assert_eq!(normalizer().normalize(&raw).unwrap_err().field, "name");
    }

    #[test]
    fn test_normalize_item_from_json() {
        let item = json!({
            "added_at": "2020-01-01T00:00:00Z",
            "track": {
                "name": "Song",
                "artists": [{"name": "A"}, {"name": "B"}],
                "album": {
                    "name": "Album [Deluxe]",
                    "release_date": "2010",
                    "images": [{"url": "https://img/1"}, {"url": "https://img/2"}]
                },
                "track_number": 1,
                "duration_ms": 200500
            }
        });
        let track = normalizer().normalize_item(&item).unwrap();
        assert_eq!(track.title, "Song (ft. B)");
        assert_eq!(track.song, "Song");
        assert_eq!(track.album, "Album (Deluxe)");
        assert_eq!(track.year, "2010");
        assert_eq!(track.duration, 200);
        assert_eq!(track.image, "https://img/1");
    }

    #[test]
    fn test_normalize_item_without_track() {
        let err = normalizer().normalize_item(&json!({})).unwrap_err();
        assert_eq!(err.field, "track");

        let err = normalizer().normalize_item(&json!("not an object")).unwrap_err();
        assert_eq!(err.field, "items");
    }

    #[test]
    fn test_wrong_typed_field_is_named() {
        let err = normalizer()
            .normalize_item(&json!({"track": {"name": "Song", "track_number": "one"}}))
            .unwrap_err();
        assert_eq!(err.field, "track_number");
        assert!(err.reason.contains("invalid type"), "{}", err.reason);

        let err = normalizer()
            .normalize_item(&json!({"track": {"name": "Song", "artists": [{"name": "A"}, {"name": 7}]}}))
            .unwrap_err();
        assert_eq!(err.field, "artists[1].name");

        let err = normalizer()
            .normalize_item(&json!({"track": {"album": {"images": [{"url": false}]}}}))
            .unwrap_err();
        assert_eq!(err.field, "album.images[0].url");

        let err = normalizer().normalize_item(&json!({"track": 42})).unwrap_err();
        assert_eq!(err.field, "track");
    }

    #[test]
    fn test_classification_last_match_wins() {
        assert_eq!(
            classify_track_type("Song (Live Remix)"),
            Some(TrackType::Remix)
        );
        assert_eq!(
            classify_track_type("Remix (Acoustic)"),
            Some(TrackType::Acoustic)
        );
        assert_eq!(classify_track_type("Song - Live"), Some(TrackType::Live));
        assert_eq!(
            classify_track_type("Karaoke Parody Cover"),
            Some(TrackType::Parody)
        );
        assert_eq!(classify_track_type("Plain Song"), None);
    }

    #[test]
    fn test_classification_uses_raw_title() {
        let track = normalizer()
            .normalize(&raw_track("Song - Radio Edit", &["A"]))
            .unwrap();
        assert_eq!(track.title, "Song");
        assert_eq!(track.track_type, Some(TrackType::Remix));
    }

    #[test]
    fn test_clean_title() {
        assert_eq!(clean_title("Song - Live"), "Song");
        assert_eq!(clean_title("Song live at Wembley"), "Song");
        assert_eq!(clean_title("Song - 2011 Remaster - Mono"), "Song");
        // separators are case-sensitive
        assert_eq!(clean_title("Song Live At Wembley"), "Song Live At Wembley");
    }

    #[test]
    fn test_inline_featurings() {
        assert_eq!(inline_featurings(&names(&["B"])), "B");
        assert_eq!(inline_featurings(&names(&["B", "C"])), "B and C");
        assert_eq!(inline_featurings(&names(&["B", "C", "D"])), "B, C and D");
    }

    #[test]
    fn test_generated_featuring_suffix() {
        let (title, song) = normalize_title("Song", &names(&["B", "C", "D"]));
        assert_eq!(title, "Song (ft. B, C and D)");
        assert_eq!(song, "Song");
    }

    #[test]
    fn test_existing_featuring_is_rewritten() {
        let (title, song) = normalize_title("Song (feat. B)", &names(&["B"]));
        assert_eq!(title, "Song (ft. B)");
        assert_eq!(song, "Song");

        let (title, _) = normalize_title("Song (Featuring B)", &names(&["B"]));
        assert_eq!(title, "Song (ft. B)");

        let (title, song) = normalize_title("Song with B", &names(&["B"]));
        assert_eq!(title, "Song ft. B");
        assert_eq!(song, "Song ft. B");
    }

    #[test]
    fn test_marker_rewrite_ignores_case() {
        let (title, song) = normalize_title("Song (FEAT. B)", &names(&["B"]));
        assert_eq!(title, "Song (ft. B)");
        assert_eq!(song, "Song");

        let (title, _) = normalize_title("Canción (Ft. B)", &names(&["B"]));
        assert_eq!(title, "Canción (ft. B)");
    }

    #[test]
    fn test_versus_parenthetical_is_dropped() {
        let (title, song) = normalize_title("Song (A vs. B)", &names(&["B"]));
        assert_eq!(title, "Song (ft. B)");
        assert_eq!(song, "Song");
    }

    #[test]
    fn test_no_featurings_keeps_title() {
        let (title, song) = normalize_title("Song (A vs. B)", &[]);
        assert_eq!(title, "Song (A vs. B)");
        assert_eq!(song, title);
    }

    #[test]
    fn test_derive_filename() {
        assert_eq!(
            derive_filename("AC/DC", "What's Next? (ft. Mr. X)"),
            "ACDC - What's Next (ft Mr X)"
        );
        assert_eq!(derive_filename("Beyoncé", "Déjà Vu"), "Beyonce - Deja Vu");
        assert_eq!(derive_filename("A", ". : Song"), "A - Song");
    }

    #[test]
    fn test_derived_path_fields() {
        let track = normalizer()
            .normalize(&raw_track("Song", &["Artist", "Guest"]))
            .unwrap();
        assert_eq!(track.filename, "Artist - Song (ft Guest)");
        assert_eq!(track.filename_temp, ".Artist - Song (ft Guest)");
        assert_eq!(track.search_pattern, "Artist   Song (ft Guest)");
    }

    #[test]
    fn test_local_flag_follows_filesystem() {
        let dir = tempfile::tempdir().unwrap();
        let normalizer = TrackNormalizer::new(dir.path());
        let raw = raw_track("Song", &["Artist"]);

        let track = normalizer.normalize(&raw).unwrap();
        assert!(!track.local);

        let path = dir.path().join("Artist - Song.mp3");
        std::fs::write(&path, b"id3").unwrap();
        assert!(normalizer.normalize(&raw).unwrap().local);

        std::fs::remove_file(&path).unwrap();
        assert!(!normalizer.normalize(&raw).unwrap().local);
    }

    #[test]
    fn test_directory_is_not_local() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("Artist - Song.mp3")).unwrap();
        let track = TrackNormalizer::new(dir.path())
            .normalize(&raw_track("Song", &["Artist"]))
            .unwrap();
        assert!(!track.local);
    }
}
