use serde::Deserialize;
use url::Url;

use crate::Error;

pub const DEFAULT_PATH: &str = "/etc/mailgun/mailgun.toml";
pub const DEFAULT_API_URL: &str = "https://api.mailgun.net";
const ENV_PREFIX: &str = "MAILGUN";

/// Process-wide Mailgun settings.
///
/// See `load_settings` for where these come from.
#[derive(Deserialize, Debug, Clone)]
pub struct Settings {
    pub api_key: Option<String>,
    pub domain_name: Option<String>,
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Sender for messages that do not name one
    pub default_from: Option<String>,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            api_key: None,
            domain_name: None,
            api_url: default_api_url(),
            default_from: None,
        }
    }
}

/// Loads settings from an optional TOML file and merges them with any
/// environment variables prefixed with MAILGUN_ (e.g. `MAILGUN_API_KEY`).
/// Environment variables win.
///
/// A missing file is not an error; an unreadable or malformed one is.
pub fn load_settings(path: Option<&str>) -> Result<Settings, Error> {
    let settings = ::config::Config::builder()
        .add_source(::config::File::with_name(path.unwrap_or(DEFAULT_PATH)).required(false))
        .add_source(::config::Environment::with_prefix(ENV_PREFIX))
        .build()?;

    Ok(settings.try_deserialize()?)
}

/// Explicit constructor arguments for a backend. Anything left unset is
/// taken from `Settings`.
#[derive(Debug, Clone, Default)]
pub struct BackendOptions {
    pub api_key: Option<String>,
    pub domain_name: Option<String>,
    pub fail_silently: bool,
}

impl BackendOptions {
    pub fn new() -> Self {
        Default::default()
    }

    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    pub fn with_domain_name(mut self, domain_name: impl Into<String>) -> Self {
        self.domain_name = Some(domain_name.into());
        self
    }

    pub fn fail_silently(mut self, fail_silently: bool) -> Self {
        self.fail_silently = fail_silently;
        self
    }
}

#[derive(Clone)]
pub struct Credentials {
    pub api_key: String,
    pub domain_name: String,
}

// Keep the key out of logs
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"***")
            .field("domain_name", &self.domain_name)
            .finish()
    }
}

/// Resolve API key and domain: explicit options first, settings second.
/// Empty values count as unset.
pub fn resolve_credentials(options: &BackendOptions, settings: &Settings) -> Result<Credentials, Error> {
    let pick = |explicit: &Option<String>, fallback: &Option<String>| {
        explicit
            .iter()
            .chain(fallback.iter())
            .find(|v| !v.is_empty())
            .cloned()
    };

    let api_key = pick(&options.api_key, &settings.api_key).ok_or(Error::MissingSetting("MAILGUN_API_KEY"))?;
    let domain_name =
        pick(&options.domain_name, &settings.domain_name).ok_or(Error::MissingSetting("MAILGUN_DOMAIN_NAME"))?;

    Ok(Credentials { api_key, domain_name })
}

/// Build `<api_url>/v3/<domain>/messages`
pub fn messages_url(api_url: &str, domain_name: &str) -> Result<Url, Error> {
    let mut url = Url::parse(api_url)?;

    url.path_segments_mut()
        .map_err(|_| Error::Settings(format!("API url cannot be a base: {}", api_url)))?
        .pop_if_empty()
        .extend(&["v3", domain_name, "messages"]);

    Ok(url)
}
