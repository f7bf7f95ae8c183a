//! Catalog operations on top of an authenticated [`Session`].

use crate::config::{Config, Credentials};
use crate::endpoints::{Endpoints, FilmFilter, SortKey};
use crate::error::{MubiError, Result};
use crate::http::{ReqwestTransport, Transport};
use crate::parse::{self, Parser};
use crate::session::Session;
use crate::{Film, FilmMetadata, Listing, Person, Program, Taxonomy};
use std::collections::BTreeMap;
use tracing::{debug, info};

/// Owns the session and the taxonomy for the lifetime of the process.
///
/// Operations take `&self` but are meant to be awaited one at a time: every
/// request mutates the shared cookie state.
pub struct CatalogClient<T = ReqwestTransport> {
    session: Session<T>,
    endpoints: Endpoints,
    parser: Parser,
    taxonomy: Taxonomy,
}

impl CatalogClient<ReqwestTransport> {
    /// Logs in over HTTP and loads the taxonomy.
    pub async fn connect(config: &Config, credentials: &Credentials) -> Result<Self> {
        let transport = ReqwestTransport::new(&config.user_agent)?;
        Self::with_transport(transport, config, credentials).await
    }
}

impl<T: Transport> CatalogClient<T> {
    pub async fn with_transport(
        transport: T,
        config: &Config,
        credentials: &Credentials,
    ) -> Result<Self> {
        let endpoints = Endpoints::new(config)?;
        let parser = Parser::new(&config.selectors)?;
        let session = Session::login(transport, &endpoints, &parser, credentials).await?;

        let list_page = session.get_text(&endpoints.list()).await?;
        let taxonomy = parser.taxonomy(&list_page)?;
        info!(
            genres = taxonomy.genres().len(),
            countries = taxonomy.countries().len(),
            languages = taxonomy.languages().len(),
            "taxonomy loaded"
        );

        Ok(Self {
            session,
            endpoints,
            parser,
            taxonomy,
        })
    }

    pub fn session(&self) -> &Session<T> {
        &self.session
    }

    pub fn taxonomy(&self) -> &Taxonomy {
        &self.taxonomy
    }

    pub fn genres(&self) -> &BTreeMap<String, String> {
        self.taxonomy.genres()
    }

    pub fn countries(&self) -> &BTreeMap<String, String> {
        self.taxonomy.countries()
    }

    pub fn languages(&self) -> &BTreeMap<String, String> {
        self.taxonomy.languages()
    }

    /// One page of the catalog, optionally restricted by a single filter.
    pub async fn list_films(&self, page: u32, sort: SortKey, filter: &FilmFilter) -> Result<Listing> {
        if page == 0 {
            return Err(MubiError::InvalidArgument("pages are numbered from 1".into()));
        }
        let url = self.endpoints.listing(page, sort, filter);
        let body = self.session.get_text(&url).await?;

        let count = self.parser.result_count(&body)?;
        let total_pages = Listing::pages_for(count);
        let films: Vec<Film> = self
            .parser
            .watchable_titles(&body)?
            .into_iter()
            .map(Film::from)
            .collect();
        debug!(page, total_pages, count, films = films.len(), "listing parsed");

        Ok(Listing {
            page,
            total_pages,
            films,
        })
    }

    /// Same as [`list_films`](Self::list_films) with the sort order given by
    /// name; an unknown name fails before any request is made.
    pub async fn list_films_sorted_by(
        &self,
        page: u32,
        sort_key: &str,
        filter: &FilmFilter,
    ) -> Result<Listing> {
        let sort: SortKey = sort_key.parse()?;
        self.list_films(page, sort, filter).await
    }

    /// Key under which the site files a film's images: the last segment of
    /// the redirect answering a HEAD on the film's detail page.
    pub async fn resolve_id(&self, film_id: &str) -> Result<String> {
        let head = self.session.head(&self.endpoints.full_details(film_id)).await?;
        let location = head.location.ok_or_else(|| {
            MubiError::Scrape(format!(
                "film {film_id} detail page did not redirect (HTTP {})",
                head.status
            ))
        })?;
        let key = parse::last_segment(&location);
        if key.is_empty() {
            return Err(MubiError::Scrape(format!(
                "film {film_id} redirected to {location:?}"
            )));
        }
        Ok(key.to_string())
    }

    /// Short details of a film with its still resolved through [`resolve_id`](Self::resolve_id).
    pub async fn film_summary(&self, film_id: &str) -> Result<(Film, FilmMetadata)> {
        let json = self
            .session
            .get_text(&self.endpoints.short_details(film_id))
            .await?;
        let details = parse::short_details(&json)?;
        let key = self.resolve_id(&details.id).await?;
        let film = Film {
            title: details.title.clone(),
            id: details.id.clone(),
            still_url: self.endpoints.film_still(&key),
        };
        Ok((film, details.metadata()))
    }

    /// Watchlist of `user_id`, or of the logged-in user.
    pub async fn watchlist(&self, user_id: Option<&str>) -> Result<Vec<Film>> {
        let user_id = user_id.unwrap_or_else(|| self.session.user_id());
        let json = self
            .session
            .get_text(&self.endpoints.watchlist(user_id))
            .await?;
        let ids = parse::watchlist_ids(&json)?;
        debug!(user_id, entries = ids.len(), "watchlist fetched");

        let mut films = Vec::with_capacity(ids.len());
        for id in ids {
            let (film, _) = self.film_summary(&id).await?;
            films.push(film);
        }
        Ok(films)
    }

    async fn search(&self, term: &str) -> Result<Vec<parse::SearchHit>> {
        let json = self.session.get_text(&self.endpoints.search(term)).await?;
        parse::search_hits(&json)
    }

    /// Films matching `term` that can be played right now.
    pub async fn search_films(&self, term: &str) -> Result<Vec<Film>> {
        let mut films = Vec::new();
        for hit in self.search(term).await? {
            if hit.category != "Films" {
                continue;
            }
            if !self.is_film_available(&hit.id).await? {
                debug!(id = %hit.id, title = %hit.label, "search hit not playable, dropped");
                continue;
            }
            films.push(Film {
                still_url: self.endpoints.film_still(hit.slug()),
                title: hit.label,
                id: hit.id,
            });
        }
        Ok(films)
    }

    pub async fn search_people(&self, term: &str) -> Result<Vec<Person>> {
        let mut people = Vec::new();
        for hit in self.search(term).await? {
            if hit.category != "People" {
                continue;
            }
            let portrait_url = self.person_portrait(&hit.id).await?;
            people.push(Person {
                name: hit.label,
                id: hit.id,
                portrait_url,
            });
        }
        Ok(people)
    }

    /// Portrait URL; falls back to the `.jpeg` variant when the `.jpg` is missing.
    pub async fn person_portrait(&self, person_id: &str) -> Result<String> {
        let url = self.endpoints.portrait(person_id);
        if self.session.head(&url).await?.is_ok() {
            Ok(url)
        } else {
            Ok(url.replace(".jpg", ".jpeg"))
        }
    }

    pub async fn person_films(&self, person_id: &str) -> Result<Vec<Film>> {
        let body = self
            .session
            .get_text(&self.endpoints.person(person_id))
            .await?;
        Ok(self
            .parser
            .watchable_titles(&body)?
            .into_iter()
            .map(Film::from)
            .collect())
    }

    /// Whether the film can be streamed from here.
    ///
    /// A missing secure URL is not conclusive: the prescreen page either
    /// redirects to the watch page or carries an availability label.
    pub async fn is_film_available(&self, film_id: &str) -> Result<bool> {
        if self.session.head(&self.endpoints.secure_video(film_id)).await?.is_ok() {
            return Ok(true);
        }

        let prescreen = self.session.get(&self.endpoints.prescreen(film_id)).await?;
        if !prescreen.is_success() {
            return Err(MubiError::Scrape(format!(
                "prescreen page for film {film_id} answered HTTP {}",
                prescreen.status
            )));
        }
        if self.parser.is_watch_page(&prescreen.url) {
            return Ok(true);
        }
        self.parser.viewable_status(&prescreen.body)
    }

    /// Stream URL of a film the caller is allowed to watch.
    pub async fn play_url(&self, film_id: &str) -> Result<String> {
        if !self.is_film_available(film_id).await? {
            return Err(MubiError::NotAvailable(film_id.to_string()));
        }
        let body = self
            .session
            .get_text(&self.endpoints.secure_video(film_id))
            .await?;
        let url = body.trim();
        if url.is_empty() {
            return Err(MubiError::Scrape(format!("empty stream URL for film {film_id}")));
        }
        Ok(url.to_string())
    }

    pub async fn programs(&self) -> Result<Vec<Program>> {
        let body = self.session.get_text(&self.endpoints.programs()).await?;
        self.parser.programs(&body)
    }

    pub async fn program_films(&self, program_id: &str) -> Result<Vec<Film>> {
        let body = self
            .session
            .get_text(&self.endpoints.program(program_id))
            .await?;
        Ok(self
            .parser
            .program_films(&body)?
            .into_iter()
            .map(Film::from)
            .collect())
    }

    /// Full detail page of a film, including the trailer's video URL when
    /// the film has a trailer.
    pub async fn film_metadata(&self, film_id: &str) -> Result<FilmMetadata> {
        let body = self
            .session
            .get_text(&self.endpoints.full_details(film_id))
            .await?;
        let mut metadata = self.parser.film_metadata(&body)?;

        if let Some(href) = self.parser.trailer_link(&body) {
            let link = self.endpoints.absolute(&href)?;
            let page = self.session.get(&link).await?;
            if page.is_success() {
                metadata.trailer = self.parser.trailer_video(&page.body);
            } else {
                debug!(film_id, status = page.status, "trailer page unavailable");
            }
        }
        Ok(metadata)
    }

    /// Ends the session. Never fails.
    pub async fn logout(self) {
        self.session.logout().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FilterKind;
    use crate::http::fake::FakeTransport;

    const LOGIN_FORM: &str =
        r#"<form><input name="authenticity_token" type="hidden" value="tok"></form>"#;
    const LANDING: &str = r#"<a class="user_avatar" href="/users/4242">You</a>"#;
    const TAXONOMY: &str = r#"
        <select id="category_id"><option value="">All</option>
          <option value="3">Drama</option><option value="8">Comedy</option></select>
        <select id="historic_country_id"><option value="75">France</option></select>
        <select id="language_id"><option value="12">Japanese</option></select>
    "#;
    const DRAMA_PAGE_2: &str = r#"
        <strong id="result_count">41 films</strong>
        <div class="item" data-item-id="1001">
          <div class="cropped_image"><img src="http://img/w192/a.jpg"></div>
          <h2>Amélie</h2><div class="watch_link"></div>
        </div>
    "#;

    fn base() -> FakeTransport {
        FakeTransport::new()
            .page("https://mubi.com/login", LOGIN_FORM)
            .post("https://mubi.com/session", LANDING)
            .page("http://mubi.com/watch", TAXONOMY)
    }

    async fn client(transport: FakeTransport) -> CatalogClient<FakeTransport> {
        let creds = Credentials::new("jane@example.com", "hunter2");
        CatalogClient::with_transport(transport, &Config::default(), &creds)
            .await
            .unwrap()
    }

    fn requests(client: &CatalogClient<FakeTransport>) -> Vec<String> {
        client.session().transport().requests()
    }

    /// Requests issued after login and taxonomy loading.
    fn later_requests(client: &CatalogClient<FakeTransport>) -> Vec<String> {
        requests(client).split_off(3)
    }

    #[tokio::test]
    async fn construction_logs_in_and_loads_taxonomy() {
        let client = client(base()).await;
        assert_eq!(client.session().user_id(), "4242");
        assert_eq!(client.genres().keys().collect::<Vec<_>>(), ["Comedy", "Drama"]);
        assert_eq!(client.countries()["France"], "75");
        assert_eq!(client.languages()["Japanese"], "12");
        assert_eq!(
            requests(&client),
            [
                "GET https://mubi.com/login",
                "POST https://mubi.com/session",
                "GET http://mubi.com/watch",
            ]
        );
    }

    #[tokio::test]
    async fn genre_name_round_trips_into_listing_query() {
        let transport =
            base().page("http://mubi.com/watch?page=2&sort=rating&category_id=3", DRAMA_PAGE_2);
        let client = client(transport).await;

        let filter = client.taxonomy().filter(FilterKind::Genre, "Drama").unwrap();
        let listing = client.list_films(2, SortKey::Rating, &filter).await.unwrap();

        assert_eq!(listing.total_pages, 3);
        assert_eq!(listing.previous_page(), Some(1));
        assert_eq!(listing.next_page(), Some(3));
        assert_eq!(
            listing.films,
            [Film {
                title: "Amélie".into(),
                id: "1001".into(),
                still_url: "http://img/w448/a.jpg".into(),
            }]
        );
        assert_eq!(
            later_requests(&client),
            ["GET http://mubi.com/watch?page=2&sort=rating&category_id=3"]
        );
    }

    #[tokio::test]
    async fn empty_listing_is_not_an_error() {
        let transport = base().page(
            "http://mubi.com/watch?page=1&sort=popularity&language_id=12",
            r#"<strong id="result_count">0 films</strong>"#,
        );
        let client = client(transport).await;
        let listing = client
            .list_films(1, SortKey::Popularity, &FilmFilter::Language("12".into()))
            .await
            .unwrap();
        assert_eq!(listing.total_pages, 0);
        assert!(listing.films.is_empty());
        assert_eq!(listing.previous_page(), None);
        assert_eq!(listing.next_page(), None);
    }

    #[tokio::test]
    async fn invalid_sort_key_sends_no_request() {
        let client = client(base()).await;
        let err = client
            .list_films_sorted_by(1, "alphabetical", &FilmFilter::None)
            .await
            .unwrap_err();
        assert!(matches!(err, MubiError::InvalidArgument(_)));

        let err = client
            .list_films(0, SortKey::Year, &FilmFilter::None)
            .await
            .unwrap_err();
        assert!(matches!(err, MubiError::InvalidArgument(_)));
        assert!(later_requests(&client).is_empty());
    }

    #[tokio::test]
    async fn availability_via_secure_url() {
        let transport = base().head_status("http://mubi.com/films/1001/secure_url", 200, None);
        let client = client(transport).await;
        assert!(client.is_film_available("1001").await.unwrap());
        assert_eq!(
            later_requests(&client),
            ["HEAD http://mubi.com/films/1001/secure_url"]
        );
    }

    #[tokio::test]
    async fn availability_via_prescreen_redirect() {
        let transport = base().redirected_page(
            "http://mubi.com/films/1001/prescreen",
            "http://mubi.com/films/amelie/watch",
            "<html></html>",
        );
        let client = client(transport).await;
        assert!(client.is_film_available("1001").await.unwrap());
    }

    #[tokio::test]
    async fn availability_via_prescreen_label() {
        let transport = base().page(
            "http://mubi.com/films/1001/prescreen",
            r#"<div class="film_viewable_status ">Not Available to watch in your country</div>"#,
        );
        let client = client(transport).await;
        assert!(!client.is_film_available("1001").await.unwrap());
    }

    #[tokio::test]
    async fn missing_prescreen_is_a_failure_not_false() {
        let client = client(base()).await;
        let err = client.is_film_available("1001").await.unwrap_err();
        assert!(matches!(err, MubiError::Scrape(_)));
    }

    #[tokio::test]
    async fn play_url_of_unavailable_film() {
        let transport = base().page(
            "http://mubi.com/films/1001/prescreen",
            r#"<div class="film_viewable_status">Not Available to watch</div>"#,
        );
        let client = client(transport).await;
        let err = client.play_url("1001").await.unwrap_err();
        assert!(matches!(err, MubiError::NotAvailable(ref id) if id == "1001"));
        assert_eq!(
            later_requests(&client),
            [
                "HEAD http://mubi.com/films/1001/secure_url",
                "GET http://mubi.com/films/1001/prescreen",
            ]
        );
    }

    #[tokio::test]
    async fn play_url_of_available_film() {
        let transport = base()
            .head_status("http://mubi.com/films/1001/secure_url", 200, None)
            .page(
                "http://mubi.com/films/1001/secure_url",
                "  http://cdn.mubi.com/stream/1001.m3u8\n",
            );
        let client = client(transport).await;
        assert_eq!(
            client.play_url("1001").await.unwrap(),
            "http://cdn.mubi.com/stream/1001.m3u8"
        );
    }

    const SEARCH: &str = r#"[
        {"category":"Films","label":"Amélie","id":1001,"url":"http://mubi.com/films/amelie"},
        {"category":"Films","label":"Amélie (restored)","id":1002,"url":"http://mubi.com/films/amelie-restored"},
        {"category":"People","label":"Audrey Tautou","id":55,"url":"http://mubi.com/cast_members/55"}
    ]"#;

    #[tokio::test]
    async fn search_films_keeps_playable_films_only() {
        let transport = base()
            .page("http://mubi.com/services/films/search.json?term=Am%C3%A9lie", SEARCH)
            .head_status("http://mubi.com/films/1001/secure_url", 200, None)
            .page(
                "http://mubi.com/films/1002/prescreen",
                r#"<div class="film_viewable_status">Not Available to watch</div>"#,
            );
        let client = client(transport).await;

        let films = client.search_films("Amélie").await.unwrap();
        assert_eq!(
            films,
            [Film {
                title: "Amélie".into(),
                id: "1001".into(),
                still_url:
                    "http://s3.amazonaws.com/auteurs_production/images/film/amelie/w448/amelie.jpg"
                        .into(),
            }]
        );
    }

    #[tokio::test]
    async fn search_people_keeps_people_only() {
        let transport = base().page(
            "http://mubi.com/services/films/search.json?term=Am%C3%A9lie",
            SEARCH,
        );
        let client = client(transport).await;

        let people = client.search_people("Amélie").await.unwrap();
        assert_eq!(people.len(), 1);
        assert_eq!(people[0].name, "Audrey Tautou");
        assert_eq!(people[0].id, "55");
        // no portrait HEAD answer: .jpeg fallback
        assert_eq!(
            people[0].portrait_url,
            "http://s3.amazonaws.com/auteurs_production/images/cast_member/55/original.jpeg"
        );
    }

    #[tokio::test]
    async fn portrait_keeps_jpg_when_present() {
        let jpg = "http://s3.amazonaws.com/auteurs_production/images/cast_member/55/original.jpg";
        let client = client(base().head_status(jpg, 200, None)).await;

        assert_eq!(client.person_portrait("55").await.unwrap(), jpg);
        assert_eq!(later_requests(&client), [format!("HEAD {jpg}")]);
    }

    #[tokio::test]
    async fn watchlist_resolves_stills_through_redirect() {
        let transport = base()
            .page("http://mubi.com/users/4242/watchlist.json", r#"[{"id": 1001}]"#)
            .page(
                "http://mubi.com/services/films/tooltip?id=1001&country_code=US&locale=en_US",
                r#"{"id":1001,"title":"Amélie","year":2001,"cast":"Audrey Tautou",
                    "directors":{"1":"Jean-Pierre Jeunet"},"duration":122,"excerpt":"Paris."}"#,
            )
            .head_status("http://mubi.com/films/1001", 301, Some("http://mubi.com/films/amelie"));
        let client = client(transport).await;

        let films = client.watchlist(None).await.unwrap();
        assert_eq!(films.len(), 1);
        assert_eq!(films[0].id, "1001");
        assert_eq!(
            films[0].still_url,
            "http://s3.amazonaws.com/auteurs_production/images/film/amelie/w448/amelie.jpg"
        );
    }

    #[tokio::test]
    async fn resolve_id_without_redirect_is_scrape_error() {
        let transport = base().head_status("http://mubi.com/films/1001", 200, None);
        let client = client(transport).await;
        assert!(matches!(
            client.resolve_id("1001").await,
            Err(MubiError::Scrape(_))
        ));
    }

    #[tokio::test]
    async fn watchlist_of_other_user() {
        let transport = base().page("http://mubi.com/users/7/watchlist.json", "[]");
        let client = client(transport).await;
        assert!(client.watchlist(Some("7")).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn cinemas_and_their_films() {
        let transport = base()
            .page(
                "http://mubi.com/cinemas",
                r#"<div class="use6"><a href="/programs/noir"><img src="http://img/noir.jpg"></a><h2>Noir</h2></div>"#,
            )
            .page(
                "http://mubi.com/programs/noir",
                r#"<div class="item" data-item-id="77"><img src="http://img/w320/m.jpg">
                   <h2 class="film_title ">M</h2>
                   <h2 class="film_director"><a>Fritz Lang</a></h2>
                   <h3 class="film_country_year">Germany, 1931</h3></div>"#,
            );
        let client = client(transport).await;

        let programs = client.programs().await.unwrap();
        assert_eq!(programs[0].identifier, "noir");
        let films = client.program_films(&programs[0].identifier).await.unwrap();
        assert_eq!(films[0].title, "Fritz Lang: M (Germany, 1931)");
        assert_eq!(films[0].still_url, "http://img/w448/m.jpg");
    }

    #[tokio::test]
    async fn person_page_lists_watchable_films() {
        let transport = base().page("http://mubi.com/cast_members/55", DRAMA_PAGE_2);
        let client = client(transport).await;
        let films = client.person_films("55").await.unwrap();
        assert_eq!(films.len(), 1);
        assert_eq!(films[0].id, "1001");
    }

    #[tokio::test]
    async fn metadata_follows_trailer_link() {
        let transport = base()
            .page(
                "http://mubi.com/films/stalker",
                r#"<h1 class="film_title blue">Stalker</h1>
                   <a class="watch_trailer" href="http://mubi.com/films/stalker/trailer">Trailer</a>"#,
            )
            .page(
                "http://mubi.com/films/stalker/trailer",
                r#"<div class="flashplayer" data-video_url="http://cdn/stalker.mp4"></div>"#,
            );
        let client = client(transport).await;
        let meta = client.film_metadata("stalker").await.unwrap();
        assert_eq!(meta.title, "Stalker");
        assert_eq!(meta.trailer.as_deref(), Some("http://cdn/stalker.mp4"));
    }

    #[tokio::test]
    async fn metadata_resolves_relative_trailer_link() {
        let transport = base()
            .page(
                "http://mubi.com/films/x",
                r#"<h1 class="film_title blue">X</h1>
                   <a class="watch_trailer" href="/films/x/trailer">Trailer</a>"#,
            )
            .page(
                "http://mubi.com/films/x/trailer",
                r#"<div class="flashplayer" data-video_url="http://cdn/x.mp4"></div>"#,
            );
        let client = client(transport).await;
        let meta = client.film_metadata("x").await.unwrap();
        assert_eq!(meta.trailer.as_deref(), Some("http://cdn/x.mp4"));
        assert_eq!(
            later_requests(&client),
            ["GET http://mubi.com/films/x", "GET http://mubi.com/films/x/trailer"]
        );
    }

    #[tokio::test]
    async fn logout_ignores_failures() {
        // the fake answers the logout URL with 404
        let client = client(base()).await;
        client.logout().await;
    }
}
