use std::io;
use std::time::Duration;

use base64::engine::general_purpose;
use base64::Engine;
use rand::distributions::{Alphanumeric, DistString};
use sha2::{Digest, Sha256};
use url::Url;

use crate::config::Config;
use crate::error::SkipwardenError;
use crate::file_io::credential::{CredentialStore, Token};
use crate::file_io::storage::KeyValueStore;
use crate::http::server;
use crate::http::spotify::model::{
    SpotifyCurrentlyPlaying, SpotifyTrackOrEpisodeObject, SpotifyTrackObject, TokenResponse,
};
use crate::model::{ArtistRef, PlaybackItem, PlaybackSnapshot};
use crate::player::Player;

/// Everything needed to complete an authorization code flow with PKCE once the user has approved
/// access at `url`.
pub struct Authorization {
    pub url: Url,
    pub code_verifier: String,
    pub state: String,
}

pub fn authorization_request(config: &Config) -> Result<Authorization, url::ParseError> {
    let code_verifier = generate_random_string(128);
    let code_challenge = sha256_base64_encoded(&code_verifier);
    let state = generate_random_string(16);
    let url = Url::parse_with_params(
        AUTHORIZE_URL,
        &[
            ("response_type", "code"),
            ("client_id", config.client_id.as_str()),
            ("scope", SCOPE),
            ("state", &state),
            ("code_challenge_method", "S256"),
            ("code_challenge", &code_challenge),
            ("redirect_uri", config.redirect_uri.as_str()),
        ],
    )?;

    Ok(Authorization {
        url,
        code_verifier,
        state,
    })
}

/// Makes sure that a usable token is stored: the stored one if it's still valid, otherwise a
/// refreshed one, and if that's impossible, a new one obtained by sending the user through
/// Spotify's login page.
pub fn ensure_login<S: KeyValueStore>(
    config: &Config,
    credentials: &CredentialStore<S>,
) -> Result<(), SkipwardenError> {
    if credentials.get().is_some() {
        info!("Using stored Spotify token.");
        return Ok(());
    }
    if let Some(refresh_token) = credentials.refresh_token() {
        match refresh_access_token(&config.client_id, &refresh_token) {
            Ok(token_response) => {
                info!("Stored Spotify token refreshed successfully.");
                store_token(credentials, token_response, Some(refresh_token))?;
                return Ok(());
            }
            Err(e) => {
                warn!("Unable to refresh stored token, a new login is required: {:?}", e);
            }
        }
    }
    login(config, credentials)
}

fn login<S: KeyValueStore>(
    config: &Config,
    credentials: &CredentialStore<S>,
) -> Result<(), SkipwardenError> {
    let authorization = authorization_request(config)
        .map_err(|e| format!("Unable to build authorization URL: {}", e))?;
    info!(
        "Please visit http://{}{} (or {}) to allow skipwarden to control your playback.",
        config.listen_address,
        server::INITIATE_AUTH_PATH,
        authorization.url
    );
    let code = server::wait_for_authorization_code(
        &config.listen_address,
        &authorization.state,
        &authorization.url,
    )?;
    let token_response = get_token(config, &code, &authorization.code_verifier)?;
    info!("Logged in to Spotify.");
    store_token(credentials, token_response, None)?;

    Ok(())
}

pub fn get_token(
    config: &Config,
    code: &str,
    code_verifier: &str,
) -> ClientConnectionResult<TokenResponse> {
    let token: TokenResponse = ureq::post(TOKEN_URL).send_form(&[
        ("client_id", config.client_id.as_str()),
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", config.redirect_uri.as_str()),
        ("code_verifier", code_verifier),
    ])?
    .into_json()?;

    Ok(token)
}

fn refresh_access_token(
    client_id: &str,
    refresh_token: &str,
) -> ClientConnectionResult<TokenResponse> {
    let response = ureq::post(TOKEN_URL).send_form(&[
        ("grant_type", "refresh_token"),
        ("refresh_token", refresh_token),
        ("client_id", client_id),
    ]);
    match response {
        Ok(r) => Ok(r.into_json()?),
        Err(e) => {
            debug!("Token refresh failed: {:?}", e);
            Err(ClientConnectionHandlingError::RefreshSpotifyTokenFailed)
        }
    }
}

/// Stores the token from the response. If the response came without a refresh token, the
/// previous refresh token is kept.
fn store_token<S: KeyValueStore>(
    credentials: &CredentialStore<S>,
    token_response: TokenResponse,
    previous_refresh_token: Option<String>,
) -> io::Result<()> {
    let token = Token {
        access_token: token_response.access_token,
        refresh_token: token_response.refresh_token.or(previous_refresh_token),
    };
    credentials.set(&token, token_response.expires_in)
}

fn generate_random_string(length: usize) -> String {
    Alphanumeric.sample_string(&mut rand::thread_rng(), length)
}

fn sha256_base64_encoded(plain: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(plain.as_bytes());
    let result = hasher.finalize();
    general_purpose::URL_SAFE_NO_PAD.encode(result)
}

/// Talks to the Spotify Web API on behalf of the logged-in user. The access token is read from
/// the credential store before every request and refreshed when it has expired.
pub struct SpotifyPlayer<S: KeyValueStore> {
    client_id: String,
    credentials: CredentialStore<S>,
}

impl<S: KeyValueStore> SpotifyPlayer<S> {
    pub fn new(config: &Config, credentials: CredentialStore<S>) -> Self {
        Self {
            client_id: config.client_id.clone(),
            credentials,
        }
    }

    fn access_token(&mut self) -> ClientConnectionResult<String> {
        match self.credentials.get() {
            Some(token) => Ok(token.access_token),
            None => {
                info!("Spotify token has expired, refreshing it.");
                self.refresh()
            }
        }
    }

    /// Returns the new access token.
    fn refresh(&mut self) -> ClientConnectionResult<String> {
        let refresh_token = self
            .credentials
            .refresh_token()
            .ok_or(ClientConnectionHandlingError::MissingCredential)?;
        let token_response = refresh_access_token(&self.client_id, &refresh_token)?;
        let access_token = token_response.access_token.clone();
        if let Err(e) = store_token(&self.credentials, token_response, Some(refresh_token)) {
            error!("Unable to store token after refresh: {:?}", e);
        }

        Ok(access_token)
    }

    fn request_with_auth(
        &mut self,
        request: ureq::Request,
        retry_after_auth_failure: bool,
        exponential_backoff: ExponentialBackoff,
    ) -> ClientConnectionResult<ureq::Response> {
        let original_request = request.clone();
        let access_token = self.access_token()?;
        let result = request
            .set("Authorization", &format!("Bearer {}", access_token))
            .call();
        match result {
            Ok(response) => Ok(response),
            Err(e) => match e {
                ureq::Error::Status(401, _) => {
                    if retry_after_auth_failure {
                        // If we already tried to refresh our token, no need to try again.
                        Err(ClientConnectionHandlingError::UreqError(e))
                    } else {
                        // Otherwise, the 401 may be because our token was revoked or expired
                        // early, so we try a refresh and then try again.
                        info!("Spotify returned 401, token refresh may be required.");
                        match self.refresh() {
                            Ok(_) => {
                                info!("Token refreshed successfully.");
                                self.request_with_auth(original_request, true, exponential_backoff)
                            }
                            Err(e) => {
                                error!("Unable to refresh spotify token. The user must login again.");
                                Err(e)
                            }
                        }
                    }
                }
                ureq::Error::Status(429, _) => {
                    match exponential_backoff.increase_after_limit_exceeded() {
                        Some((duration, new_backoff)) => {
                            warn!("Rate limit exceeded, retrying in {:?}.", duration);
                            std::thread::sleep(duration);
                            self.request_with_auth(
                                original_request,
                                retry_after_auth_failure,
                                new_backoff,
                            )
                        }
                        None => {
                            error!("Max. number of retries reached after rate limit exceeded.");
                            Err(ClientConnectionHandlingError::UreqError(e))
                        }
                    }
                }
                _ => Err(ClientConnectionHandlingError::UreqError(e)),
            },
        }
    }
}

impl<S: KeyValueStore> Player for SpotifyPlayer<S> {
    fn current_item(&mut self) -> Result<PlaybackSnapshot, SkipwardenError> {
        let request = ureq::get(CURRENTLY_PLAYING_URL);
        let response = self.request_with_auth(request, false, ExponentialBackoff::default())?;
        match response.status() {
            200 => {
                let currently_playing: SpotifyCurrentlyPlaying = response.into_json()?;
                Ok(snapshot_from_currently_playing(currently_playing))
            }
            // 204 No Content: nothing is playing.
            204 => Ok(PlaybackSnapshot::Empty),
            status => Err(ClientConnectionHandlingError::HttpProtocolError(format!(
                "Unexpected status {} from {}",
                status, CURRENTLY_PLAYING_URL
            ))
            .into()),
        }
    }

    fn skip(&mut self) -> Result<(), SkipwardenError> {
        let request = ureq::post(NEXT_URL).set("Content-Length", "0");
        self.request_with_auth(request, false, ExponentialBackoff::default())?;
        Ok(())
    }
}

fn snapshot_from_currently_playing(currently_playing: SpotifyCurrentlyPlaying) -> PlaybackSnapshot {
    if !currently_playing.is_playing {
        // A paused track is still blocked: it would otherwise start playing on resume.
        debug!("Playback is paused.");
    }
    match currently_playing.item {
        Some(SpotifyTrackOrEpisodeObject::SpotifyTrackObject(track)) => {
            match playback_item_from_track(track) {
                Some(item) => PlaybackSnapshot::Playing(item),
                None => PlaybackSnapshot::Empty,
            }
        }
        Some(SpotifyTrackOrEpisodeObject::SpotifyEpisodeObject { name, .. }) => {
            // podcast episodes are ignored, we support only music tracks.
            debug!("Ignoring podcast episode {}", name);
            PlaybackSnapshot::Empty
        }
        None => {
            debug!(
                "No item in currently playing response (type: {:?})",
                currently_playing.currently_playing_type
            );
            PlaybackSnapshot::Empty
        }
    }
}

fn playback_item_from_track(track: SpotifyTrackObject) -> Option<PlaybackItem> {
    let item_id = match track.id {
        Some(id) if !track.is_local => id,
        _ => {
            // local tracks are not supported, because the Spotify Web API does not provide ids
            // for them, so there's nothing we could match against.
            debug!("Ignoring local track {}", track.name);
            return None;
        }
    };
    let artists = track
        .artists
        .into_iter()
        .filter_map(|artist| {
            artist.id.map(|id| ArtistRef {
                id,
                name: artist.name,
            })
        })
        .collect();
    let album_art_url = track.album.images.into_iter().next().map(|image| image.url);

    Some(PlaybackItem {
        item_id,
        item_name: track.name,
        album_id: track.album.id.unwrap_or_default(),
        album_name: track.album.name,
        artists,
        album_art_url,
    })
}

#[derive(Debug)]
pub enum ClientConnectionHandlingError {
    IoError(io::Error),
    UreqError(ureq::Error),
    HttpProtocolError(String),
    RefreshSpotifyTokenFailed,
    /// Neither a valid access token nor a refresh token is stored.
    MissingCredential,
}

impl From<io::Error> for ClientConnectionHandlingError {
    fn from(error: io::Error) -> Self {
        ClientConnectionHandlingError::IoError(error)
    }
}

impl From<ureq::Error> for ClientConnectionHandlingError {
    fn from(error: ureq::Error) -> Self {
        ClientConnectionHandlingError::UreqError(error)
    }
}

#[derive(Debug, PartialEq)]
struct ExponentialBackoff {
    max_retries: u32,
    previous_retries: u32,
    backoff_duration: Duration,
}

impl ExponentialBackoff {
    /// Returns the duration to wait for after the rate limit was exceeded, and the updated
    /// ExponentialBackoff to be used if the rate limit is exceeded in subsequent requests.
    fn increase_after_limit_exceeded(&self) -> Option<(Duration, Self)> {
        if self.max_retries > self.previous_retries {
            let backoff = Self {
                max_retries: self.max_retries,
                previous_retries: self.previous_retries + 1,
                backoff_duration: self.backoff_duration * 2,
            };
            Some((self.backoff_duration, backoff))
        } else {
            None
        }
    }

    fn new(initial_backoff_duration: Duration, max_retries: u32) -> Self {
        Self {
            max_retries,
            backoff_duration: initial_backoff_duration,
            previous_retries: 0,
        }
    }
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 4)
    }
}

pub type ClientConnectionResult<T> = Result<T, ClientConnectionHandlingError>;

const AUTHORIZE_URL: &str = "https://accounts.spotify.com/authorize";
const TOKEN_URL: &str = "https://accounts.spotify.com/api/token";
const CURRENTLY_PLAYING_URL: &str = "https://api.spotify.com/v1/me/player/currently-playing";
const NEXT_URL: &str = "https://api.spotify.com/v1/me/player/next";
const SCOPE: &str = "user-modify-playback-state user-read-playback-state";

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::file_io::storage::memory::MemoryStore;
    use ureq::serde_json;

    #[test]
    fn exponential_backoff_test() {
        let initial_backoff = ExponentialBackoff::new(Duration::from_millis(200), 1);
        let (duration_to_wait, new_backoff) =
            initial_backoff.increase_after_limit_exceeded().unwrap();
        let expected_new_backoff = ExponentialBackoff {
            max_retries: 1,
            previous_retries: 1,
            backoff_duration: Duration::from_millis(400),
        };

        assert_eq!(duration_to_wait, Duration::from_millis(200));
        assert_eq!(new_backoff, expected_new_backoff);

        let next_backoff = new_backoff.increase_after_limit_exceeded();

        assert_eq!(next_backoff, None);
    }

    #[test]
    fn code_challenge_matches_rfc_7636_example() {
        assert_eq!(
            sha256_base64_encoded("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk"),
            "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM"
        );
    }

    #[test]
    fn authorization_request_contains_pkce_params() {
        let config = Config::default();
        let authorization = authorization_request(&config).unwrap();
        let params: HashMap<String, String> = authorization
            .url
            .query_pairs()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();

        assert_eq!(authorization.code_verifier.len(), 128);
        assert_eq!(authorization.state.len(), 16);
        assert_eq!(params["client_id"], config.client_id);
        assert_eq!(params["redirect_uri"], config.redirect_uri);
        assert_eq!(params["scope"], SCOPE);
        assert_eq!(params["state"], authorization.state);
        assert_eq!(params["code_challenge_method"], "S256");
        assert_eq!(
            params["code_challenge"],
            sha256_base64_encoded(&authorization.code_verifier)
        );
    }

    #[test]
    fn store_token_keeps_previous_refresh_token() {
        let credentials = CredentialStore::new(MemoryStore::default());
        let token_response = TokenResponse {
            access_token: "new".to_string(),
            expires_in: 3600,
            refresh_token: None,
        };

        store_token(&credentials, token_response, Some("old-refresh".to_string())).unwrap();

        assert_eq!(
            credentials.get(),
            Some(Token {
                access_token: "new".to_string(),
                refresh_token: Some("old-refresh".to_string()),
            })
        );
    }

    #[test]
    fn missing_credential_is_reported_without_network_access() {
        let mut player = SpotifyPlayer::new(
            &Config::default(),
            CredentialStore::new(MemoryStore::default()),
        );

        assert!(matches!(
            player.access_token(),
            Err(ClientConnectionHandlingError::MissingCredential)
        ));
    }

    #[test]
    fn snapshot_from_track() {
        let json_data = include_str!("test_artefacts/currently_playing_track.json");
        let currently_playing: SpotifyCurrentlyPlaying = serde_json::from_str(json_data).unwrap();

        let snapshot = snapshot_from_currently_playing(currently_playing);

        assert_eq!(
            snapshot,
            PlaybackSnapshot::Playing(PlaybackItem {
                item_id: "6CE6xXEI29e6X0noaNugIW".to_string(),
                item_name: "The Funeral".to_string(),
                album_id: "5tzRuO6GP7WRvP3rEOPAO9".to_string(),
                album_name: "Everything All the Time".to_string(),
                artists: vec![
                    ArtistRef {
                        id: "0OdUWJ0sBjDrqHygGUXeCF".to_string(),
                        name: "Band of Horses".to_string(),
                    },
                    ArtistRef {
                        id: "4Z8W4fKeB5YxbusRsdQVPb".to_string(),
                        name: "Guest Artist".to_string(),
                    },
                ],
                album_art_url: Some(
                    "https://i.scdn.co/image/ab67616d0000b273a9a2b5b0c5a2bd4bd7e3d0c6".to_string()
                ),
            })
        );
    }

    #[test]
    fn snapshot_from_episode_and_local_track_is_empty() {
        for json_data in [
            include_str!("test_artefacts/currently_playing_episode.json"),
            include_str!("test_artefacts/currently_playing_local_track.json"),
        ] {
            let currently_playing: SpotifyCurrentlyPlaying =
                serde_json::from_str(json_data).unwrap();

            assert_eq!(
                snapshot_from_currently_playing(currently_playing),
                PlaybackSnapshot::Empty
            );
        }
    }
}
