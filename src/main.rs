use anyhow::Context;
use clap::{Parser, Subcommand};
use mubi_scrape::{CatalogClient, Config, Credentials, Film, FilmFilter, FilterKind, SortKey};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "mubi-scrape", version, about = "Browse and play films from the MUBI catalog")]
struct Cli {
    #[arg(long, env = "MUBI_USERNAME")]
    username: String,

    #[arg(long, env = "MUBI_PASSWORD", hide_env_values = true)]
    password: String,

    /// TOML file overriding hosts, user agent or selectors
    #[arg(long, short)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List one page of the catalog
    Films {
        #[arg(long, default_value_t = 1)]
        page: u32,
        /// popularity, recently_added, rating, year or running_time
        #[arg(long, default_value = "popularity")]
        sort: String,
        /// Genre name, as printed by `genres`
        #[arg(long, conflicts_with_all = ["country", "language"])]
        genre: Option<String>,
        #[arg(long, conflicts_with = "language")]
        country: Option<String>,
        #[arg(long)]
        language: Option<String>,
    },
    Genres,
    Countries,
    Languages,
    /// List the themed cinemas
    Cinemas,
    /// Films of one cinema
    Cinema { id: String },
    SearchFilm { term: String },
    SearchPerson { term: String },
    /// Watchable films of a cast or crew member
    Person { id: String },
    Watchlist {
        /// Defaults to the logged-in user
        #[arg(long)]
        user: Option<String>,
    },
    Available { id: String },
    /// Print the stream URL of a film
    Play { id: String },
    /// Print the full details of a film
    Details { id: String },
}

fn print_films(films: &[Film]) {
    if films.is_empty() {
        println!("No films found.");
        return;
    }
    for film in films {
        println!("{:>8}  {}", film.id, film.title);
        println!("          {}", film.still_url);
    }
}

fn print_names(names: &BTreeMap<String, String>) {
    for (name, code) in names {
        println!("{code:>6}  {name}");
    }
}

async fn run(client: &CatalogClient, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Films {
            page,
            sort,
            genre,
            country,
            language,
        } => {
            let sort: SortKey = sort.parse()?;
            let taxonomy = client.taxonomy();
            let filter = match (genre, country, language) {
                (Some(name), _, _) => taxonomy.filter(FilterKind::Genre, &name)?,
                (_, Some(name), _) => taxonomy.filter(FilterKind::Country, &name)?,
                (_, _, Some(name)) => taxonomy.filter(FilterKind::Language, &name)?,
                _ => FilmFilter::None,
            };
            let listing = client.list_films(page, sort, &filter).await?;
            println!("Page {} of {}", listing.page, listing.total_pages);
            print_films(&listing.films);
            if let Some(prev) = listing.previous_page() {
                println!("Previous... (--page {prev})");
            }
            if let Some(next) = listing.next_page() {
                println!("Next... (--page {next})");
            }
        }
        Command::Genres => print_names(client.genres()),
        Command::Countries => print_names(client.countries()),
        Command::Languages => print_names(client.languages()),
        Command::Cinemas => {
            let programs = client.programs().await?;
            if programs.is_empty() {
                println!("No cinemas found.");
            }
            for program in programs {
                println!("{:>24}  {}", program.identifier, program.title);
            }
        }
        Command::Cinema { id } => print_films(&client.program_films(&id).await?),
        Command::SearchFilm { term } => print_films(&client.search_films(&term).await?),
        Command::SearchPerson { term } => {
            let people = client.search_people(&term).await?;
            if people.is_empty() {
                println!("Nobody found.");
            }
            for person in people {
                println!("{:>8}  {}", person.id, person.name);
                println!("          {}", person.portrait_url);
            }
        }
        Command::Person { id } => print_films(&client.person_films(&id).await?),
        Command::Watchlist { user } => print_films(&client.watchlist(user.as_deref()).await?),
        Command::Available { id } => {
            let available = client.is_film_available(&id).await?;
            println!("{}", if available { "available" } else { "not available" });
        }
        Command::Play { id } => println!("{}", client.play_url(&id).await?),
        Command::Details { id } => {
            let meta = client.film_metadata(&id).await?;
            println!("{meta:#?}");
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mubi_scrape=info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    let credentials = Credentials::new(cli.username, cli.password);

    let client = CatalogClient::connect(&config, &credentials)
        .await
        .context("could not open a MUBI session")?;

    let outcome = run(&client, cli.command).await;
    client.logout().await;
    outcome
}
