use serde::Deserialize;

/// Response of GET /v1/me/player/currently-playing. Only the fields we need are declared, serde
/// ignores the rest.
#[derive(Debug, Deserialize, PartialEq)]
pub struct SpotifyCurrentlyPlaying {
    pub is_playing: bool,
    pub currently_playing_type: Option<String>,
    // null while podcast episodes or ads are playing (unless additional_types is requested).
    pub item: Option<SpotifyTrackOrEpisodeObject>,
}

#[derive(Deserialize, Debug, PartialEq)]
#[serde(tag = "type")]
pub enum SpotifyTrackOrEpisodeObject {
    #[serde(rename(deserialize = "episode"))]
    SpotifyEpisodeObject { id: Option<String>, name: String },
    #[serde(rename(deserialize = "track"))]
    SpotifyTrackObject(SpotifyTrackObject),
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct SpotifyTrackObject {
    pub id: Option<String>, // null for local files
    pub name: String,
    #[serde(default)]
    pub is_local: bool,
    pub artists: Vec<SpotifySimplifiedArtistObject>,
    pub album: SpotifySimplifiedAlbumObject,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct SpotifySimplifiedArtistObject {
    pub id: Option<String>,
    pub name: String,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct SpotifySimplifiedAlbumObject {
    pub id: Option<String>,
    pub name: String,
    #[serde(default)]
    pub images: Vec<SpotifyImageObject>,
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct SpotifyImageObject {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub expires_in: u64,
    // Spotify may omit the refresh token when refreshing: the previous one stays valid then.
    pub refresh_token: Option<String>,
}
