//! Markup and JSON parsing, kept apart from any I/O.
//!
//! [`Parser`] is compiled once from [`Selectors`]; each method takes a page
//! body and returns plain records, or [`MubiError::Scrape`] when the markup it
//! relies on is gone.

use crate::config::Selectors;
use crate::error::{MubiError, Result};
use crate::{FilmMetadata, Program};
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::{Deserialize, Deserializer};
use std::collections::BTreeMap;

/// Size segment used by listing thumbnails.
const LIST_STILL: &str = "w192";
/// Size segment used by cinema thumbnails.
const PROGRAM_STILL: &str = "w320";
/// Size segment requested for every still we hand out.
const WIDE_STILL: &str = "w448";

/// A film as it appears in a listing, before endpoints are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ListedFilm {
    pub title: String,
    pub id: String,
    pub still: String,
}

impl From<ListedFilm> for crate::Film {
    fn from(listed: ListedFilm) -> Self {
        crate::Film {
            title: listed.title,
            id: listed.id,
            still_url: listed.still,
        }
    }
}

/// One hit from the search endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SearchHit {
    pub category: String,
    pub label: String,
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    #[serde(default)]
    pub url: String,
}

impl SearchHit {
    /// Last path segment of the hit's page, used as the still image key.
    pub fn slug(&self) -> &str {
        last_segment(&self.url)
    }
}

/// Short details ("tooltip") JSON for one film.
#[derive(Debug, Clone, Deserialize)]
pub struct ShortDetails {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub title: String,
    #[serde(default, deserialize_with = "opt_id_string")]
    pub year: Option<String>,
    #[serde(default)]
    pub cast: Option<String>,
    #[serde(default)]
    pub directors: BTreeMap<String, String>,
    #[serde(default)]
    pub duration: Option<u32>,
    #[serde(default)]
    pub excerpt: Option<String>,
}

impl ShortDetails {
    pub fn metadata(&self) -> FilmMetadata {
        let cast = self
            .cast
            .as_deref()
            .map(|c| {
                c.split(", ")
                    .map(str::trim)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        let director = if self.directors.is_empty() {
            None
        } else {
            Some(self.directors.values().cloned().collect::<Vec<_>>().join(", "))
        };
        FilmMetadata {
            title: self.title.clone(),
            year: self.year.clone(),
            cast,
            director,
            duration: self.duration.map(|m| format!("{m} Min")),
            plot_outline: self.excerpt.clone(),
            ..FilmMetadata::default()
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Number(u64),
    Text(String),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Number(n) => n.to_string(),
            RawId::Text(s) => s,
        }
    }
}

fn id_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<String, D::Error> {
    RawId::deserialize(d).map(String::from)
}

fn opt_id_string<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
    Option::<RawId>::deserialize(d).map(|o| o.map(String::from))
}

#[derive(Deserialize)]
#[serde(untagged)]
enum WatchlistEntry {
    Bare(RawId),
    Object {
        #[serde(alias = "film_id")]
        id: RawId,
    },
}

/// Last non-empty path segment of a URL or path.
pub fn last_segment(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    path.trim_end_matches('/').rsplit('/').next().unwrap_or(path)
}

/// Text content with runs of whitespace collapsed to one space.
fn text_of(el: ElementRef<'_>) -> String {
    el.text()
        .flat_map(str::split_whitespace)
        .collect::<Vec<_>>()
        .join(" ")
}

fn css(raw: &str) -> Result<Selector> {
    Selector::parse(raw).map_err(|e| MubiError::Config(format!("bad selector {raw:?}: {e:?}")))
}

fn pattern(raw: &str) -> Result<Regex> {
    Regex::new(raw).map_err(|e| MubiError::Config(format!("bad pattern {raw:?}: {e}")))
}

fn missing(what: &str) -> MubiError {
    MubiError::Scrape(format!("{what} not found"))
}

/// Compiled form of [`Selectors`].
#[derive(Debug)]
pub struct Parser {
    auth_token: Selector,
    user_avatar: Selector,
    result_count: Selector,
    item: Selector,
    item_title: Selector,
    watch_link: Selector,
    item_still: Selector,
    genre_select: Selector,
    country_select: Selector,
    language_select: Selector,
    option: Selector,
    program: Selector,
    program_film_title: Selector,
    program_film_director: Selector,
    program_film_country_year: Selector,
    anchor: Selector,
    image: Selector,
    div: Selector,
    span: Selector,
    viewable_status: Selector,
    unavailable_phrase: String,
    watch_page: Regex,
    film_title: Selector,
    film_original_title: Selector,
    film_year: Selector,
    film_credits: Selector,
    film_rating: Selector,
    film_plot: Selector,
    film_views: Selector,
    film_language: Selector,
    trailer_link: Selector,
    trailer_player: Selector,
    rating: Regex,
    duration: Regex,
    audio_language: Regex,
    subtitle_language: Regex,
}

impl Parser {
    pub fn new(s: &Selectors) -> Result<Self> {
        Ok(Self {
            auth_token: css(&s.auth_token)?,
            user_avatar: css(&s.user_avatar)?,
            result_count: css(&s.result_count)?,
            item: css(&s.item)?,
            item_title: css(&s.item_title)?,
            watch_link: css(&s.watch_link)?,
            item_still: css(&s.item_still)?,
            genre_select: css(&s.genre_select)?,
            country_select: css(&s.country_select)?,
            language_select: css(&s.language_select)?,
            option: css("option")?,
            program: css(&s.program)?,
            program_film_title: css(&s.program_film_title)?,
            program_film_director: css(&s.program_film_director)?,
            program_film_country_year: css(&s.program_film_country_year)?,
            anchor: css("a[href]")?,
            image: css("img[src]")?,
            div: css("div")?,
            span: css("span")?,
            viewable_status: css(&s.viewable_status)?,
            unavailable_phrase: s.unavailable_phrase.clone(),
            watch_page: pattern(&s.watch_page_pattern)?,
            film_title: css(&s.film_title)?,
            film_original_title: css(&s.film_original_title)?,
            film_year: css(&s.film_year)?,
            film_credits: css(&s.film_credits)?,
            film_rating: css(&s.film_rating)?,
            film_plot: css(&s.film_plot)?,
            film_views: css(&s.film_views)?,
            film_language: css(&s.film_language)?,
            trailer_link: css(&s.trailer_link)?,
            trailer_player: css(&s.trailer_player)?,
            rating: pattern(&s.rating_pattern)?,
            duration: pattern(&s.duration_pattern)?,
            audio_language: pattern(&s.audio_language_pattern)?,
            subtitle_language: pattern(&s.subtitle_language_pattern)?,
        })
    }

    /// Anti-forgery token embedded in the login form.
    pub fn auth_token(&self, html: &str) -> Option<String> {
        let doc = Html::parse_document(html);
        doc.select(&self.auth_token)
            .next()
            .and_then(|input| input.value().attr("value"))
            .map(str::to_string)
            .filter(|v| !v.is_empty())
    }

    /// Identifier of the logged-in user, read from the avatar link.
    pub fn user_id(&self, html: &str) -> Option<String> {
        let doc = Html::parse_document(html);
        doc.select(&self.user_avatar)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(last_segment)
            .filter(|id| !id.is_empty())
            .map(str::to_string)
    }

    /// Genre, country and language name-to-code maps from the listing page.
    pub fn taxonomy(&self, html: &str) -> Result<crate::Taxonomy> {
        let doc = Html::parse_document(html);
        let options = |select: &Selector, what: &str| -> Result<BTreeMap<String, String>> {
            let menu = doc.select(select).next().ok_or_else(|| missing(what))?;
            Ok(menu
                .select(&self.option)
                .filter_map(|opt| {
                    let code = opt.value().attr("value")?.trim();
                    if code.is_empty() {
                        return None;
                    }
                    Some((text_of(opt), code.to_string()))
                })
                .collect())
        };
        Ok(crate::Taxonomy::new(
            options(&self.genre_select, "genre selector")?,
            options(&self.country_select, "country selector")?,
            options(&self.language_select, "language selector")?,
        ))
    }

    /// Number of films matching a listing query.
    pub fn result_count(&self, html: &str) -> Result<u32> {
        let doc = Html::parse_document(html);
        let text = doc
            .select(&self.result_count)
            .next()
            .map(text_of)
            .ok_or_else(|| missing("result count"))?;
        let first = text.split_whitespace().next().unwrap_or_default();
        first
            .replace([',', '.'], "")
            .parse()
            .map_err(|_| MubiError::Scrape(format!("result count {text:?} is not a number")))
    }

    /// Items that have both a title heading and a watch link.
    pub fn watchable_titles(&self, html: &str) -> Result<Vec<ListedFilm>> {
        let doc = Html::parse_document(html);
        let mut films = Vec::new();

        for item in doc.select(&self.item) {
            let Some(heading) = item.select(&self.item_title).next() else {
                continue;
            };
            if item.select(&self.watch_link).next().is_none() {
                continue;
            }
            let title = text_of(heading);
            let id = item
                .value()
                .attr("data-item-id")
                .ok_or_else(|| missing("data-item-id"))?
                .to_string();
            let still = item
                .select(&self.item_still)
                .next()
                .and_then(|img| img.value().attr("src"))
                .ok_or_else(|| MubiError::Scrape(format!("film {id} has no still image")))?
                .replace(LIST_STILL, WIDE_STILL);
            films.push(ListedFilm { title, id, still });
        }

        Ok(films)
    }

    /// Themed cinemas from the cinemas page.
    pub fn programs(&self, html: &str) -> Result<Vec<Program>> {
        let doc = Html::parse_document(html);
        doc.select(&self.program)
            .map(|block| -> Result<Program> {
                let title = block
                    .select(&self.item_title)
                    .next()
                    .map(text_of)
                    .ok_or_else(|| missing("cinema title"))?;
                let identifier = block
                    .select(&self.anchor)
                    .next()
                    .and_then(|a| a.value().attr("href"))
                    .map(last_segment)
                    .ok_or_else(|| MubiError::Scrape(format!("cinema {title:?} has no link")))?
                    .to_string();
                let picture = block
                    .select(&self.image)
                    .next()
                    .and_then(|img| img.value().attr("src"))
                    .ok_or_else(|| MubiError::Scrape(format!("cinema {title:?} has no picture")))?
                    .to_string();
                Ok(Program {
                    title,
                    identifier,
                    picture,
                })
            })
            .collect()
    }

    /// Films of one cinema, titled `"{director}: {title} ({country, year})"`.
    pub fn program_films(&self, html: &str) -> Result<Vec<ListedFilm>> {
        let doc = Html::parse_document(html);
        let mut films = Vec::new();

        for item in doc.select(&self.item) {
            let id = item
                .value()
                .attr("data-item-id")
                .ok_or_else(|| missing("data-item-id"))?
                .to_string();
            let field = |selector: &Selector, what: &str| {
                item.select(selector)
                    .next()
                    .map(text_of)
                    .ok_or_else(|| MubiError::Scrape(format!("film {id} has no {what}")))
            };
            let title = field(&self.program_film_title, "title")?;
            let director = field(&self.program_film_director, "director")?;
            let country_year = field(&self.program_film_country_year, "country/year")?;
            let still = item
                .select(&self.image)
                .next()
                .and_then(|img| img.value().attr("src"))
                .ok_or_else(|| MubiError::Scrape(format!("film {id} has no still image")))?
                .replace(PROGRAM_STILL, WIDE_STILL);

            films.push(ListedFilm {
                title: format!("{director}: {title} ({country_year})"),
                id,
                still,
            });
        }

        Ok(films)
    }

    /// True when a prescreen request ended on the film's watch page.
    pub fn is_watch_page(&self, url: &str) -> bool {
        self.watch_page.is_match(url)
    }

    /// Reads the prescreen availability label; `false` when it carries the
    /// unavailable phrase.
    pub fn viewable_status(&self, html: &str) -> Result<bool> {
        let doc = Html::parse_document(html);
        let label = doc
            .select(&self.viewable_status)
            .next()
            .map(text_of)
            .ok_or_else(|| missing("availability label"))?;
        Ok(!label.contains(&self.unavailable_phrase))
    }

    /// Full details page of one film. Only the title is mandatory.
    pub fn film_metadata(&self, html: &str) -> Result<FilmMetadata> {
        let doc = Html::parse_document(html);
        let first_text = |selector: &Selector| doc.select(selector).next().map(text_of);

        let title = first_text(&self.film_title).ok_or_else(|| missing("film title"))?;

        // Credit blocks look like `<h3 class="film_cast"><span>DIR</span>Name, Name</h3>`.
        let mut credits: BTreeMap<String, String> = BTreeMap::new();
        for block in doc.select(&self.film_credits) {
            let Some(label) = block.select(&self.span).next().map(text_of) else {
                continue;
            };
            let names = text_of(block)
                .strip_prefix(label.as_str())
                .map(str::trim)
                .unwrap_or_default()
                .to_string();
            credits.entry(label).or_insert(names);
        }
        let names = |label: &str| -> Vec<String> {
            credits
                .get(label)
                .map(|n| {
                    n.split(',')
                        .map(str::trim)
                        .filter(|s| !s.is_empty())
                        .map(str::to_string)
                        .collect()
                })
                .unwrap_or_default()
        };
        let joined = |label: &str| Some(names(label).join(", ")).filter(|s| !s.is_empty());

        let rating = first_text(&self.film_rating).and_then(|text| {
            self.rating
                .captures(&text)
                .and_then(|c| c.get(1))
                .and_then(|m| m.as_str().parse::<f32>().ok())
        });

        let plot = doc
            .select(&self.film_plot)
            .map(text_of)
            .collect::<Vec<_>>()
            .join("\n");

        // innermost divs only
        let duration = doc
            .select(&self.div)
            .filter(|div| !div.children().any(|child| child.value().is_element()))
            .map(text_of)
            .find(|t| self.duration.is_match(t));

        let playcount = first_text(&self.film_views)
            .and_then(|t| t.replace(',', "").parse::<u64>().ok());

        let languages: Vec<String> = doc.select(&self.film_language).map(text_of).collect();
        let capture = |re: &Regex| {
            languages.iter().find_map(|t| {
                re.captures(t)
                    .and_then(|c| c.get(1))
                    .map(|m| m.as_str().trim().to_string())
            })
        };

        Ok(FilmMetadata {
            title,
            original_title: first_text(&self.film_original_title),
            year: first_text(&self.film_year),
            rating,
            cast: names("CAST"),
            director: joined("DIR"),
            writer: joined("SCR"),
            plot: Some(plot).filter(|p| !p.is_empty()),
            duration,
            playcount,
            trailer: None,
            audio_language: capture(&self.audio_language),
            subtitle_language: capture(&self.subtitle_language),
            plot_outline: None,
        })
    }

    /// Link to the trailer page, if the film has one.
    pub fn trailer_link(&self, html: &str) -> Option<String> {
        let doc = Html::parse_document(html);
        doc.select(&self.trailer_link)
            .next()
            .and_then(|a| a.value().attr("href"))
            .map(str::to_string)
    }

    /// Video URL embedded in the trailer player.
    pub fn trailer_video(&self, html: &str) -> Option<String> {
        let doc = Html::parse_document(html);
        doc.select(&self.trailer_player)
            .next()
            .and_then(|div| div.value().attr("data-video_url"))
            .map(str::to_string)
    }
}

pub fn search_hits(json: &str) -> Result<Vec<SearchHit>> {
    Ok(serde_json::from_str(json)?)
}

pub fn short_details(json: &str) -> Result<ShortDetails> {
    Ok(serde_json::from_str(json)?)
}

/// Film ids on a watchlist; entries may be bare ids or objects with an `id`.
pub fn watchlist_ids(json: &str) -> Result<Vec<String>> {
    let entries: Vec<WatchlistEntry> = serde_json::from_str(json)?;
    Ok(entries
        .into_iter()
        .map(|e| match e {
            WatchlistEntry::Bare(id) | WatchlistEntry::Object { id } => String::from(id),
        })
        .collect())
}
