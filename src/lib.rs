//! Client for the MUBI film catalog.
//!
//! A [`CatalogClient`] logs in once, loads the genre/country/language
//! taxonomy, and then turns listing, search, cinema and watchlist pages into
//! the plain records below.

pub mod catalog;
pub mod config;
pub mod endpoints;
pub mod error;
pub mod http;
pub mod parse;
pub mod session;

use std::collections::BTreeMap;

pub use catalog::CatalogClient;
pub use config::{Config, Credentials, Selectors};
pub use endpoints::{FilmFilter, SortKey};
pub use error::{MubiError, Result};
pub use http::{ReqwestTransport, Transport};
pub use session::Session;

/// Number of films the listing endpoint returns per page.
pub const PAGE_SIZE: u32 = 20;

/// A playable catalog title
#[derive(Debug, Clone, PartialEq)]
pub struct Film {
    pub title: String,
    /// Catalog id; only meaningful against the same service.
    pub id: String,
    pub still_url: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub name: String,
    pub id: String,
    pub portrait_url: String,
}

/// A themed cinema: a curated collection of films.
#[derive(Debug, Clone, PartialEq)]
pub struct Program {
    pub title: String,
    pub identifier: String,
    pub picture: String,
}

/// Descriptive data for one film. Fields the source page lacks stay empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FilmMetadata {
    pub title: String,
    pub original_title: Option<String>,
    pub year: Option<String>,
    /// Out of 5
    pub rating: Option<f32>,
    pub cast: Vec<String>,
    pub director: Option<String>,
    pub writer: Option<String>,
    pub plot: Option<String>,
    pub plot_outline: Option<String>,
    /// As displayed, e.g. "122 Min"
    pub duration: Option<String>,
    pub playcount: Option<u64>,
    pub trailer: Option<String>,
    pub audio_language: Option<String>,
    pub subtitle_language: Option<String>,
}

/// One page of the film listing.
#[derive(Debug, Clone, PartialEq)]
pub struct Listing {
    /// 1-based
    pub page: u32,
    pub total_pages: u32,
    pub films: Vec<Film>,
}

impl Listing {
    /// Pages needed for `count` results.
    pub fn pages_for(count: u32) -> u32 {
        count.div_ceil(PAGE_SIZE)
    }

    pub fn previous_page(&self) -> Option<u32> {
        (self.page > 1).then(|| self.page - 1)
    }

    pub fn next_page(&self) -> Option<u32> {
        (self.page < self.total_pages).then(|| self.page + 1)
    }
}

/// Which taxonomy a display name belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FilterKind {
    Genre,
    Country,
    Language,
}

impl FilterKind {
    pub fn label(self) -> &'static str {
        match self {
            FilterKind::Genre => "genre",
            FilterKind::Country => "country",
            FilterKind::Language => "language",
        }
    }
}

/// Name-to-code maps used to filter the listing. Loaded once per client.
#[derive(Debug, Clone, Default)]
pub struct Taxonomy {
    genres: BTreeMap<String, String>,
    countries: BTreeMap<String, String>,
    languages: BTreeMap<String, String>,
}

impl Taxonomy {
    pub fn new(
        genres: BTreeMap<String, String>,
        countries: BTreeMap<String, String>,
        languages: BTreeMap<String, String>,
    ) -> Self {
        Self {
            genres,
            countries,
            languages,
        }
    }

    pub fn genres(&self) -> &BTreeMap<String, String> {
        &self.genres
    }

    pub fn countries(&self) -> &BTreeMap<String, String> {
        &self.countries
    }

    pub fn languages(&self) -> &BTreeMap<String, String> {
        &self.languages
    }

    pub fn names(&self, kind: FilterKind) -> &BTreeMap<String, String> {
        match kind {
            FilterKind::Genre => &self.genres,
            FilterKind::Country => &self.countries,
            FilterKind::Language => &self.languages,
        }
    }

    /// Listing filter for a display name, e.g. `(Genre, "Drama")`.
    pub fn filter(&self, kind: FilterKind, name: &str) -> Result<FilmFilter> {
        let code = self.names(kind).get(name).cloned().ok_or_else(|| {
            MubiError::InvalidArgument(format!("unknown {} {name:?}", kind.label()))
        })?;
        Ok(match kind {
            FilterKind::Genre => FilmFilter::Genre(code),
            FilterKind::Country => FilmFilter::Country(code),
            FilterKind::Language => FilmFilter::Language(code),
        })
    }
}
