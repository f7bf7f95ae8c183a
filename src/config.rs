//! Runtime configuration: remote hosts, user agent and the markup selectors
//! the parser depends on. Every field has a default, so an empty TOML file
//! (or no file at all) yields a working configuration.

use crate::error::{MubiError, Result};
use serde::Deserialize;
use std::fmt;
use std::path::Path;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_5_8) \
     AppleWebKit/535.19 (KHTML, like Gecko) Chrome/18.0.1025.151 Safari/535.19";

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Plain-HTTP site root used for browsing endpoints.
    pub base_url: String,
    /// HTTPS site root used for login and session endpoints.
    pub secure_base_url: String,
    /// Root of the image bucket holding film stills and portraits.
    pub image_base_url: String,
    pub user_agent: String,
    pub country_code: String,
    pub locale: String,
    pub selectors: Selectors,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            base_url: "http://mubi.com".to_string(),
            secure_base_url: "https://mubi.com".to_string(),
            image_base_url: "http://s3.amazonaws.com/auteurs_production/images".to_string(),
            user_agent: USER_AGENT.to_string(),
            country_code: "US".to_string(),
            locale: "en_US".to_string(),
            selectors: Selectors::default(),
        }
    }
}

impl Config {
    pub fn from_toml_str(s: &str) -> Result<Self> {
        toml::from_str(s).map_err(|e| MubiError::Config(e.to_string()))
    }

    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .map_err(|e| MubiError::Config(format!("cannot read {}: {e}", path.display())))?;
        Self::from_toml_str(&raw)
    }
}

/// CSS selectors, regular expressions and phrases matched against remote pages.
///
/// Class selectors written as `[class*=...]` mirror the site's habit of
/// suffixing classes (`item_123`, `watch_link_big`).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Selectors {
    // login
    pub auth_token: String,
    pub user_avatar: String,

    // listings
    pub result_count: String,
    pub item: String,
    pub item_title: String,
    pub watch_link: String,
    pub item_still: String,
    /// Taxonomy menus; their `<option>`s are read.
    pub genre_select: String,
    pub country_select: String,
    pub language_select: String,

    // cinemas
    pub program: String,
    pub program_film_title: String,
    pub program_film_director: String,
    pub program_film_country_year: String,

    // availability
    pub viewable_status: String,
    pub unavailable_phrase: String,
    pub watch_page_pattern: String,

    // full film details
    pub film_title: String,
    pub film_original_title: String,
    pub film_year: String,
    pub film_credits: String,
    pub film_rating: String,
    pub film_plot: String,
    pub film_views: String,
    pub film_language: String,
    pub trailer_link: String,
    pub trailer_player: String,
    pub rating_pattern: String,
    pub duration_pattern: String,
    pub audio_language_pattern: String,
    pub subtitle_language_pattern: String,
}

impl Default for Selectors {
    fn default() -> Self {
        Self {
            auth_token: "input[name=\"authenticity_token\"]".to_string(),
            user_avatar: "a.user_avatar".to_string(),

            result_count: "strong#result_count".to_string(),
            item: "div[class*=\"item\"][data-item-id]".to_string(),
            item_title: "h2".to_string(),
            watch_link: "div[class*=\"watch_link\"]".to_string(),
            item_still: "div.cropped_image img".to_string(),
            genre_select: "select#category_id".to_string(),
            country_select: "select#historic_country_id".to_string(),
            language_select: "select#language_id".to_string(),

            program: "div[class*=\"use6\"]".to_string(),
            program_film_title: "h2.film_title".to_string(),
            program_film_director: "h2.film_director a".to_string(),
            program_film_country_year: "h3.film_country_year".to_string(),

            viewable_status: "div.film_viewable_status".to_string(),
            unavailable_phrase: "Not Available to watch".to_string(),
            watch_page_pattern: r"^.*/watch$".to_string(),

            film_title: "h1.film_title.blue".to_string(),
            film_original_title: "h2.film_title.notbold.blue".to_string(),
            film_year: "h3.film_year".to_string(),
            film_credits: "h3.film_cast".to_string(),
            film_rating: "li.current_rating".to_string(),
            film_plot: "div.content.greenbg.clear p".to_string(),
            film_views: "div.film_views span".to_string(),
            film_language: "div.film_subtitle_language".to_string(),
            trailer_link: "a.watch_trailer".to_string(),
            trailer_player: "div.flashplayer".to_string(),
            rating_pattern: r"Currently ([1-5]\.\d)/5 Stars\.".to_string(),
            duration_pattern: r"^\d+ Min".to_string(),
            audio_language_pattern: r"Audio in (.*)".to_string(),
            subtitle_language_pattern: r"Subtitled in (.*)".to_string(),
        }
    }
}

/// Login for the remote account. Supplied by the caller once at startup.
#[derive(Clone)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"********")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_toml_gives_defaults() {
        let config = Config::from_toml_str("").unwrap();
        assert_eq!(config.base_url, "http://mubi.com");
        assert_eq!(config.selectors.result_count, "strong#result_count");
    }

    #[test]
    fn toml_overrides_single_selector() {
        let config = Config::from_toml_str(
            r#"
            country_code = "GB"

            [selectors]
            result_count = "span.count"
            "#,
        )
        .unwrap();
        assert_eq!(config.country_code, "GB");
        assert_eq!(config.selectors.result_count, "span.count");
        assert_eq!(config.selectors.user_avatar, "a.user_avatar");
    }

    #[test]
    fn malformed_toml_is_config_error() {
        let err = Config::from_toml_str("base_url = ").unwrap_err();
        assert!(matches!(err, MubiError::Config(_)));
    }

    #[test]
    fn credentials_debug_hides_password() {
        let creds = Credentials::new("jane@example.com", "hunter2");
        let shown = format!("{creds:?}");
        assert!(shown.contains("jane@example.com"));
        assert!(!shown.contains("hunter2"));
    }
}
