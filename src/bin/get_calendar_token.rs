use calendar_tools::components::google_calendar::token::TokenManager;
use calendar_tools::config::{Config, CALENDAR_SCOPE};
use calendar_tools::error::{auth_error, config_error, other_error, CalendarResult};
use calendar_tools::startup;
use clap::Parser;
use tracing::{info, warn};
use url::Url;

/// Authorize calendar-tools against Google Calendar and store the token file
#[derive(Debug, Parser)]
struct Args {
    /// Print the consent URL and read the code from stdin instead of listening for the redirect
    #[arg(long)]
    manual: bool,
}

/// Query parameters of the OAuth redirect
enum Callback {
    Code(String),
    Denied(String),
    Ignored,
}

fn parse_callback(raw_url: &str, expected_state: &str) -> CalendarResult<Callback> {
    let url = Url::parse("http://localhost")
        .and_then(|base| base.join(raw_url))
        .map_err(|e| other_error(&format!("Malformed callback URL {}: {}", raw_url, e)))?;

    let mut code = None;
    let mut state = None;
    let mut error = None;
    for (key, value) in url.query_pairs() {
        match key.as_ref() {
            "code" => code = Some(value.into_owned()),
            "state" => state = Some(value.into_owned()),
            "error" => error = Some(value.into_owned()),
            _ => {}
        }
    }

    if let Some(error) = error {
        return Ok(Callback::Denied(error));
    }
    let Some(code) = code else {
        return Ok(Callback::Ignored);
    };
    if state.as_deref() != Some(expected_state) {
        return Err(auth_error("OAuth state mismatch in callback"));
    }
    Ok(Callback::Code(code))
}

/// Accept either a bare authorization code or the whole redirected URL
fn parse_pasted(input: &str, expected_state: &str) -> CalendarResult<String> {
    let input = input.trim();
    if input.is_empty() {
        return Err(auth_error("No authorization code entered"));
    }

    let looks_like_url = input.contains("://") || input.starts_with(['/', '?']);
    if !looks_like_url {
        return Ok(input.to_string());
    }

    match parse_callback(input, expected_state)? {
        Callback::Code(code) => Ok(code),
        Callback::Denied(error) => Err(auth_error(&format!("Authorization was denied: {}", error))),
        Callback::Ignored => Err(auth_error("The pasted URL carries no authorization code")),
    }
}

fn read_pasted_code(expected_state: String) -> CalendarResult<String> {
    println!("After approving access the browser is sent to a localhost address that may not load.");
    println!("Paste the full address from the browser, or just the code parameter:");

    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    parse_pasted(&line, &expected_state)
}

/// Wait on the local redirect server until the consent flow finishes
fn receive_code(port: u16, expected_state: String) -> CalendarResult<String> {
    let server = tiny_http::Server::http(("127.0.0.1", port))
        .map_err(|e| other_error(&format!("Failed to listen on port {}: {}", port, e)))?;

    loop {
        let request = server.recv()?;
        let outcome = parse_callback(request.url(), &expected_state);

        let (reply, result) = match outcome {
            Ok(Callback::Ignored) => {
                let _ = request.respond(tiny_http::Response::empty(404));
                continue;
            }
            Ok(Callback::Code(code)) => (
                "Authorization successful! You can close this window.".to_string(),
                Ok(code),
            ),
            Ok(Callback::Denied(error)) => (
                format!("Authorization failed: {}", error),
                Err(auth_error(&format!("Authorization was denied: {}", error))),
            ),
            Err(e) => (format!("Authorization failed: {}", e), Err(e)),
        };

        request.respond(tiny_http::Response::from_string(reply))?;
        return result;
    }
}

#[tokio::main]
async fn main() -> miette::Result<()> {
    startup::init_logging()?;
    let args = Args::parse();

    // Load configuration
    let config = Config::load()?;
    let token_manager = TokenManager::new(&config);

    // Reuse an existing token when possible
    if let Some(token) = token_manager.load_token().await? {
        if !token.is_expired() {
            println!(
                "A valid token already exists at {}",
                token_manager.token_file().display()
            );
            return Ok(());
        }
        match token_manager.refresh(&token).await {
            Ok(_) => {
                println!(
                    "Refreshed the existing token at {}",
                    token_manager.token_file().display()
                );
                return Ok(());
            }
            Err(e) => warn!("Refreshing the existing token failed, starting a new flow: {}", e),
        }
    }

    // Generate random state for security
    let state = uuid::Uuid::new_v4().to_string();
    let redirect_uri = format!("http://localhost:{}", config.oauth_redirect_port);

    // Construct authorization URL
    let mut auth_url = Url::parse(&config.auth_uri)
        .map_err(|e| config_error(&format!("Invalid auth URI {}: {}", config.auth_uri, e)))?;
    auth_url
        .query_pairs_mut()
        .append_pair("client_id", &config.google_client_id)
        .append_pair("redirect_uri", &redirect_uri)
        .append_pair("response_type", "code")
        .append_pair("access_type", "offline")
        .append_pair("prompt", "consent")
        .append_pair("scope", CALENDAR_SCOPE)
        .append_pair("state", &state);

    let code = if args.manual {
        println!("Open this URL in a browser on any machine and approve access:");
        println!("{}", auth_url);
        tokio::task::spawn_blocking(move || read_pasted_code(state))
            .await
            .map_err(|e| other_error(&format!("Input task failed: {}", e)))??
    } else {
        // Open browser for authorization
        println!("Opening browser for Google Calendar authorization. If it does not open, visit:");
        println!("{}", auth_url);
        if let Err(e) = webbrowser::open(auth_url.as_str()) {
            warn!("Could not open a browser: {}", e);
        }

        // Start local server to receive the callback
        info!("Waiting for authorization callback on {}", redirect_uri);
        let port = config.oauth_redirect_port;
        tokio::task::spawn_blocking(move || receive_code(port, state))
            .await
            .map_err(|e| other_error(&format!("Callback task failed: {}", e)))??
    };

    // Exchange code for tokens
    let token = token_manager.exchange_code(&code, &redirect_uri).await?;
    println!(
        "Token successfully saved to {} (expires at {})",
        token_manager.token_file().display(),
        token.expires_at
    );

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_callback_with_code_and_state() {
        match parse_callback("/?state=abc&code=4%2F0Ab&scope=x", "abc").unwrap() {
            Callback::Code(code) => assert_eq!(code, "4/0Ab"),
            _ => panic!("expected a code"),
        }
    }

    #[test]
    fn test_callback_state_mismatch_is_rejected() {
        assert!(parse_callback("/?state=other&code=xyz", "abc").is_err());
    }

    #[test]
    fn test_favicon_and_denial() {
        assert!(matches!(
            parse_callback("/favicon.ico", "abc").unwrap(),
            Callback::Ignored
        ));
        assert!(matches!(
            parse_callback("/?error=access_denied&state=abc", "abc").unwrap(),
            Callback::Denied(e) if e == "access_denied"
        ));
    }

    #[test]
    fn test_pasted_code_or_redirect_url() {
        assert_eq!(parse_pasted("  4/0Ab-code\n", "abc").unwrap(), "4/0Ab-code");
        assert_eq!(
            parse_pasted("http://localhost:8080/?state=abc&code=4%2F0Ab&scope=x", "abc").unwrap(),
            "4/0Ab"
        );
        assert!(parse_pasted("http://localhost:8080/?state=other&code=xyz", "abc").is_err());
        assert!(parse_pasted("http://localhost:8080/?error=access_denied", "abc").is_err());
        assert!(parse_pasted("http://localhost:8080/", "abc").is_err());
        assert!(parse_pasted("   ", "abc").is_err());
    }

    #[test]
    fn test_manual_flag() {
        assert!(Args::parse_from(["get_calendar_token", "--manual"]).manual);
        assert!(!Args::parse_from(["get_calendar_token"]).manual);
    }
}
