use std::collections::HashMap;
use std::io::{BufRead, BufReader, Read, Write};
use std::net::{TcpListener, TcpStream};

use regex::Regex;
use url::{ParseError, Url};

use crate::http::spotify::client::{ClientConnectionHandlingError, ClientConnectionResult};

/// Blocks until Spotify redirects the user's browser back to us with an authorization code, and
/// returns that code. Requests to `INITIATE_AUTH_PATH` are redirected to `auth_url`, so the user
/// can start the login with a short, memorable URL.
pub fn wait_for_authorization_code(
    listen_address: &str,
    state: &str,
    auth_url: &Url,
) -> ClientConnectionResult<String> {
    let listener = TcpListener::bind(listen_address)?;
    info!("Waiting for the authorization callback on {}", listen_address);

    for stream in listener.incoming() {
        let mut stream = match stream {
            Ok(s) => s,
            Err(e) => {
                warn!("Error accepting connection: {}", e);
                continue;
            }
        };
        let result = match handle_connection(&mut stream, state) {
            Ok(result) => result,
            Err(e) => {
                // Some client sent rubbish over the TCP connection. That's no reason to give up
                // on the login, the browser may still send the correct request.
                warn!("Unable to handle request: {:?}", e);
                HandleConnectionResult::BadRequest
            }
        };
        let response = match &result {
            HandleConnectionResult::BadRequest => "HTTP/1.1 400 Bad Request\r\n\
                Content-Type: text/plain\r\n\
                Content-Length: 12\r\n\r\n\
                Bad Request\n"
                .to_string(),
            HandleConnectionResult::InitiateAuth => {
                format!("HTTP/1.1 302 Found\r\nLocation: {}\r\n\r\n", auth_url)
            }
            HandleConnectionResult::Redirect(Some(_)) => format!(
                "HTTP/1.1 200 OK\r\n\
                Content-Type: text/plain\r\n\
                Content-Length: {}\r\n\r\n\
                {}",
                LOGIN_SUCCESSFUL.len(),
                LOGIN_SUCCESSFUL
            ),
            HandleConnectionResult::Redirect(None) => "HTTP/1.1 403 Forbidden\r\n\
                Content-Type: text/plain\r\n\
                Content-Length: 10\r\n\r\n\
                Forbidden\n"
                .to_string(),
        };
        if let Err(e) = stream.write_all(response.as_bytes()) {
            warn!("Unable to write response: {}", e);
        }
        if let HandleConnectionResult::Redirect(Some(code)) = result {
            // Returning drops the listener, so the TCP socket isn't left open without any good
            // reason.
            return Ok(code);
        }
    }

    Err(ClientConnectionHandlingError::HttpProtocolError(
        "Listener stopped before the authorization code was received".to_string(),
    ))
}

fn handle_connection(
    stream: &mut TcpStream,
    state: &str,
) -> ClientConnectionResult<HandleConnectionResult> {
    let request_target = request_target_from_stream(stream)?;
    if request_target == INITIATE_AUTH_PATH {
        return Ok(HandleConnectionResult::InitiateAuth);
    }
    match get_query_params(&request_target)? {
        Some(query_params) => {
            if query_params.state == state {
                Ok(HandleConnectionResult::Redirect(Some(query_params.code)))
            } else {
                // The state from the redirect URI does not match the state that we previously
                // generated. OAuth uses the state param as a security measure against CSRF
                // attacks, so we don't accept this code.
                warn!("Received authorization callback with unexpected state.");
                Ok(HandleConnectionResult::Redirect(None))
            }
        }
        None => Ok(HandleConnectionResult::BadRequest),
    }
}

enum HandleConnectionResult {
    /// The GET request was executed by the client after the client was redirected from Spotify's
    /// authorization flow. Contains the authorization code, or None if the state did not match.
    Redirect(Option<String>),
    /// The request cannot be processed by skipwarden.
    BadRequest,
    /// The client requested to initiate the authorization process at Spotify.
    InitiateAuth,
}

fn request_target_from_stream(stream: &mut TcpStream) -> ClientConnectionResult<String> {
    let buf_reader = BufReader::new(stream).take(MAX_REQUEST_HEADER_LENGTH);
    let http_request: Vec<String> = buf_reader
        .lines()
        .map_while(Result::ok)
        .take_while(|line| !line.is_empty())
        .collect();

    match http_request.first() {
        Some(http_request_line) => match request_target(http_request_line) {
            Some(target) => Ok(target),
            None => {
                let message = "Unable to parse HTTP data: Probably, we've received \
                    invalid data over the TCP connection."
                    .to_string();
                Err(ClientConnectionHandlingError::HttpProtocolError(message))
            }
        },
        None => Err(ClientConnectionHandlingError::HttpProtocolError(
            "Received TCP data that does not resemble a valid HTTP request".to_string(),
        )),
    }
}

fn get_query_params(
    request_target: &str,
) -> ClientConnectionResult<Option<QueryParamsForSpotifyAuthorization>> {
    let query_params = query_params(request_target).map_err(|e| {
        ClientConnectionHandlingError::HttpProtocolError(format!(
            "Unable to parse query params: {:?}. Probably, we've received invalid data over \
                the TCP connection.",
            e
        ))
    })?;
    if let Some(error) = query_params.get("error") {
        // e.g. access_denied, if the user did not approve.
        warn!("Spotify authorization failed: {}", error);
        return Ok(None);
    }
    let code = query_params.get("code");
    let state = query_params.get("state");
    match (code, state) {
        (None, None) => {
            warn!("Neither code nor state are present in the URL.");
            Ok(None)
        }
        (Some(_), None) => {
            warn!("state is not present in the URL.");
            Ok(None)
        }
        (None, Some(_)) => {
            warn!("code is not present in the URL.");
            Ok(None)
        }
        (Some(c), Some(s)) => Ok(Some(QueryParamsForSpotifyAuthorization {
            code: c.to_string(),
            state: s.to_string(),
        })),
    }
}

fn request_target(http_request_line: &str) -> Option<String> {
    // Check if input is a valid HTTP request line (RFC 7230):
    let pattern = r"^(?P<method>[A-Z]+) (?P<request_target>[^ ]+) (?P<version>HTTP/\d\.\d)$";
    let regex = Regex::new(pattern).ok()?;
    let captures = regex.captures(http_request_line)?;
    captures
        .name("request_target")
        .map(|target_match| target_match.as_str().to_string())
}

fn query_params(request_target: &str) -> Result<HashMap<String, String>, ParseError> {
    // We're using https://example.com as a dummy URL just to have a valid URL that we can then
    // use to parse the query params.
    let url_as_string = format!("https://example.com{}", request_target);
    let url = Url::parse(&url_as_string)?;
    let params = url
        .query_pairs()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect();

    Ok(params)
}

struct QueryParamsForSpotifyAuthorization {
    code: String,
    state: String,
}

pub const INITIATE_AUTH_PATH: &str = "/authorize_skipwarden";
const MAX_REQUEST_HEADER_LENGTH: u64 = 16 * 1024;
const LOGIN_SUCCESSFUL: &str = "Logged in, skipwarden is now watching your playback. You may \
    close this window.\n";

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_request_target_get_request() {
        let result = request_target("GET /callback?code=abc&state=xyz HTTP/1.1");
        assert_eq!(result, Some("/callback?code=abc&state=xyz".to_string()));
    }

    #[test]
    fn test_request_target_empty_string() {
        let result = request_target("");
        assert_eq!(result, None);
    }

    #[test]
    fn test_request_target_incomplete_string() {
        let result = request_target("GET ");
        assert_eq!(result, None);
    }

    #[test]
    fn test_query_params() {
        let result = query_params("/example/path?param1=value1&param2=value2");
        let expected = HashMap::from([
            ("param1".to_string(), "value1".to_string()),
            ("param2".to_string(), "value2".to_string()),
        ]);

        assert_eq!(result, Ok(expected));
    }

    #[test]
    fn test_query_params_invalid_input() {
        let result = query_params(":foo");
        assert!(result.is_err());
    }

    #[test]
    fn test_get_query_params_requires_code_and_state() {
        assert!(get_query_params("/callback?code=abc").unwrap().is_none());
        assert!(get_query_params("/callback?state=xyz").unwrap().is_none());
        assert!(get_query_params("/callback?error=access_denied&state=xyz")
            .unwrap()
            .is_none());

        let params = get_query_params("/callback?code=abc&state=xyz")
            .unwrap()
            .unwrap();
        assert_eq!(params.code, "abc");
        assert_eq!(params.state, "xyz");
    }

    #[test]
    fn test_wait_for_authorization_code() {
        // Find a free port, then release it for the function under test.
        let address = TcpListener::bind("127.0.0.1:0")
            .unwrap()
            .local_addr()
            .unwrap()
            .to_string();
        let auth_url = Url::parse("https://accounts.spotify.com/authorize").unwrap();

        let server_address = address.clone();
        let server = thread::spawn(move || {
            wait_for_authorization_code(&server_address, "expected-state", &auth_url)
        });

        let send = |request: &str| loop {
            // The listener may not be bound yet.
            if let Ok(mut stream) = TcpStream::connect(&address) {
                stream.write_all(request.as_bytes()).unwrap();
                let mut response = String::new();
                std::io::Read::read_to_string(&mut stream, &mut response).ok();
                return response;
            }
            thread::sleep(std::time::Duration::from_millis(10));
        };

        let response = send("GET /authorize_skipwarden HTTP/1.1\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 302 Found"));
        let response = send("GET /callback?code=abc&state=forged HTTP/1.1\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 403 Forbidden"));
        let response = send("GET /callback?code=abc&state=expected-state HTTP/1.1\r\n\r\n");
        assert!(response.starts_with("HTTP/1.1 200 OK"));

        assert_eq!(server.join().unwrap().unwrap(), "abc");
    }
}
