use crate::config::Config;
use crate::error::{MubiError, Result};
use url::Url;

/// Sort orders accepted by the film listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortKey {
    #[default]
    Popularity,
    RecentlyAdded,
    Rating,
    Year,
    RunningTime,
}

impl SortKey {
    pub const ALL: [SortKey; 5] = [
        SortKey::Popularity,
        SortKey::RecentlyAdded,
        SortKey::Rating,
        SortKey::Year,
        SortKey::RunningTime,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            SortKey::Popularity => "popularity",
            SortKey::RecentlyAdded => "recently_added",
            SortKey::Rating => "rating",
            SortKey::Year => "year",
            SortKey::RunningTime => "running_time",
        }
    }
}

impl std::str::FromStr for SortKey {
    type Err = MubiError;

    fn from_str(s: &str) -> Result<Self> {
        SortKey::ALL
            .into_iter()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| {
                let valid: Vec<&str> = SortKey::ALL.iter().map(|k| k.as_str()).collect();
                MubiError::InvalidArgument(format!(
                    "unknown sort key {s:?}, expected one of {}",
                    valid.join(", ")
                ))
            })
    }
}

/// At most one taxonomy restriction on a film listing.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum FilmFilter {
    #[default]
    None,
    Genre(String),
    Country(String),
    Language(String),
}

impl FilmFilter {
    /// Builds a filter from optional codes, rejecting more than one.
    pub fn from_options(
        genre: Option<String>,
        country: Option<String>,
        language: Option<String>,
    ) -> Result<Self> {
        match (genre, country, language) {
            (None, None, None) => Ok(FilmFilter::None),
            (Some(g), None, None) => Ok(FilmFilter::Genre(g)),
            (None, Some(c), None) => Ok(FilmFilter::Country(c)),
            (None, None, Some(l)) => Ok(FilmFilter::Language(l)),
            _ => Err(MubiError::InvalidArgument(
                "genre, country and language filters are mutually exclusive".to_string(),
            )),
        }
    }

    /// Query parameter carrying the filter, if any.
    fn query_pair(&self) -> Option<(&'static str, &str)> {
        match self {
            FilmFilter::None => None,
            FilmFilter::Genre(code) => Some(("category_id", code)),
            FilmFilter::Country(code) => Some(("historic_country_id", code)),
            FilmFilter::Language(code) => Some(("language_id", code)),
        }
    }
}

/// Every remote URL the client talks to, derived once from [`Config`].
#[derive(Debug, Clone)]
pub struct Endpoints {
    base: String,
    secure: String,
    images: String,
    country_code: String,
    locale: String,
    list_url: Url,
}

impl Endpoints {
    pub fn new(config: &Config) -> Result<Self> {
        for root in [&config.base_url, &config.secure_base_url, &config.image_base_url] {
            Url::parse(root).map_err(|e| MubiError::Config(format!("bad base URL {root:?}: {e}")))?;
        }
        let base = config.base_url.trim_end_matches('/').to_string();
        let list_url = Url::parse(&format!("{base}/watch"))
            .map_err(|e| MubiError::Config(format!("bad listing URL: {e}")))?;
        Ok(Self {
            base,
            secure: config.secure_base_url.trim_end_matches('/').to_string(),
            images: config.image_base_url.trim_end_matches('/').to_string(),
            country_code: config.country_code.clone(),
            locale: config.locale.clone(),
            list_url,
        })
    }

    pub fn login(&self) -> String {
        format!("{}/login", self.secure)
    }

    pub fn session(&self) -> String {
        format!("{}/session", self.secure)
    }

    pub fn logout(&self) -> String {
        format!("{}/logout", self.base)
    }

    pub fn search(&self, term: &str) -> String {
        let term: String = url::form_urlencoded::byte_serialize(term.as_bytes()).collect();
        format!("{}/services/films/search.json?term={}", self.base, term)
    }

    pub fn programs(&self) -> String {
        format!("{}/cinemas", self.base)
    }

    pub fn program(&self, program_id: &str) -> String {
        format!("{}/programs/{}", self.base, program_id)
    }

    pub fn secure_video(&self, film_id: &str) -> String {
        format!("{}/films/{}/secure_url", self.base, film_id)
    }

    pub fn prescreen(&self, film_id: &str) -> String {
        format!("{}/films/{}/prescreen", self.base, film_id)
    }

    /// Unfiltered listing page; also the source of the taxonomy selects.
    pub fn list(&self) -> String {
        self.list_url.to_string()
    }

    /// Link found on a page, resolved against the site root.
    pub fn absolute(&self, href: &str) -> Result<String> {
        self.list_url
            .join(href)
            .map(String::from)
            .map_err(|e| MubiError::Scrape(format!("bad link {href:?}: {e}")))
    }

    pub fn listing(&self, page: u32, sort: SortKey, filter: &FilmFilter) -> String {
        let mut url = self.list_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("page", &page.to_string());
            query.append_pair("sort", sort.as_str());
            if let Some((key, code)) = filter.query_pair() {
                query.append_pair(key, code);
            }
        }
        url.to_string()
    }

    pub fn person(&self, person_id: &str) -> String {
        format!("{}/cast_members/{}", self.base, person_id)
    }

    pub fn film_still(&self, key: &str) -> String {
        format!("{}/film/{key}/w448/{key}.jpg", self.images)
    }

    pub fn portrait(&self, person_id: &str) -> String {
        format!("{}/cast_member/{}/original.jpg", self.images, person_id)
    }

    pub fn short_details(&self, film_id: &str) -> String {
        format!(
            "{}/services/films/tooltip?id={}&country_code={}&locale={}",
            self.base, film_id, self.country_code, self.locale
        )
    }

    pub fn full_details(&self, film_id: &str) -> String {
        format!("{}/films/{}", self.base, film_id)
    }

    pub fn watchlist(&self, user_id: &str) -> String {
        format!("{}/users/{}/watchlist.json", self.base, user_id)
    }
}
