use std::fmt;

/// Heuristic variant of a track, guessed from substrings of its title.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackType {
    Album,
    Live,
    Cover,
    Remix,
    Acoustic,
    Karaoke,
    Parody,
}

impl TrackType {
    /// Classification order. Later entries take precedence over earlier ones.
    pub const ALL: [TrackType; 7] = [
        TrackType::Album,
        TrackType::Live,
        TrackType::Cover,
        TrackType::Remix,
        TrackType::Acoustic,
        TrackType::Karaoke,
        TrackType::Parody,
    ];

    /// Lower-case substrings that mark a title as this variant.
    pub fn aliases(self) -> &'static [&'static str] {
        match self {
            TrackType::Album => &[],
            TrackType::Live => &["@", "live", "perform", "tour"],
            TrackType::Cover => &["cover", "vs"],
            TrackType::Remix => &["remix", "radio edit"],
            TrackType::Acoustic => &["acoustic"],
            TrackType::Karaoke => &["karaoke", "instrumental"],
            TrackType::Parody => &["parody"],
        }
    }

    /// Whether any alias occurs in the lower-cased `title`.
    pub fn matches(self, title: &str) -> bool {
        let title = title.to_lowercase();
        self.aliases().iter().any(|alias| title.contains(alias))
    }
}

/// A saved library track, normalized for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Track {
    pub title: String,
    pub song: String,
    pub artist: String,
    pub featurings: Vec<String>,
    pub album: String,
    pub year: String,
    pub genre: Option<String>,
    pub track_number: u32,
    pub track_totals: Option<u32>,
    pub duration: u64,
    pub track_type: Option<TrackType>,
    pub image: String,
    pub url: Option<String>,
    pub filename: String,
    pub filename_temp: String,
    pub filename_ext: String,
    pub search_pattern: String,
    pub lyrics: Option<String>,
    pub local: bool,
}

impl Track {
    /// File name of the downloaded track, e.g. `Artist - Song.mp3`.
    pub fn filename_final(&self) -> String {
        format!("{}.{}", self.filename, self.filename_ext)
    }

    /// Hidden file name used while a download is in progress.
    pub fn filename_temporary(&self) -> String {
        format!("{}.{}", self.filename_temp, self.filename_ext)
    }

    /// Hidden file name for the cover art, keyed by the last segment of the image URL.
    pub fn filename_artwork(&self) -> String {
        let name = self.image.rsplit('/').next().unwrap_or_default();
        format!(".{}.jpg", name)
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "\"{}\" in \"{}\" by \"{}\" ({})",
            self.title, self.album, self.artist, self.year
        )
    }
}
