//! Command-line front end over the offline-aware movie repository.
//! Usage:
//!   moviesmania popular [page]
//!   moviesmania now-playing [page]
//!   moviesmania search <query...>
//!   moviesmania detail <id> [popular|now_playing|saved]
//!   moviesmania toggle-save <id> [popular|now_playing|saved]
//!   moviesmania saved
//! Requires TMDB_ACCESS_TOKEN or TMDB_API_KEY in the environment (.env supported).

use anyhow::{anyhow, bail, Context, Result};
use dotenvy::dotenv;
use moviesmania::config::Config;
use moviesmania::connectivity::{Connectivity, StaticConnectivity, TcpProbe};
use moviesmania::models::{Collection, ListPage, ListingKind, MovieDetail};
use moviesmania::screens::{DetailScreen, ListingScreen, ScreenState};
use moviesmania::store::Database;
use moviesmania::tmdb::TmdbClient;
use moviesmania::MovieRepository;
use std::env;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}

enum Command {
    Listing(ListingKind, u32),
    Search(String),
    Detail(i64, Option<Collection>),
    ToggleSave(i64, Option<Collection>),
    Saved,
}

fn parse_command(args: &[String]) -> Result<Command> {
    let name = args.first().ok_or_else(|| anyhow!("missing command"))?;
    let page = |idx: usize| -> Result<u32> {
        args.get(idx)
            .map(|p| p.parse::<u32>().context("page must be a positive number"))
            .transpose()
            .map(|p| p.unwrap_or(1).max(1))
    };
    let id = || -> Result<i64> {
        args.get(1)
            .ok_or_else(|| anyhow!("missing movie id"))?
            .parse()
            .context("movie id must be a number")
    };
    let source = || args.get(2).and_then(|s| Collection::parse_source(s));

    match name.as_str() {
        "popular" => Ok(Command::Listing(ListingKind::Popular, page(1)?)),
        "now-playing" | "now_playing" => Ok(Command::Listing(ListingKind::NowPlaying, page(1)?)),
        "search" => {
            let query = args[1..].join(" ");
            if query.trim().is_empty() {
                bail!("search needs a query");
            }
            Ok(Command::Search(query))
        }
        "detail" => Ok(Command::Detail(id()?, source())),
        "toggle-save" => Ok(Command::ToggleSave(id()?, source())),
        "saved" => Ok(Command::Saved),
        other => Err(anyhow!("unknown command '{}'", other)),
    }
}

fn print_page(page: &ListPage) {
    println!(
        "page {}/{} ({} results)",
        page.page, page.total_pages, page.total_results
    );
    for movie in &page.items {
        println!(
            "{:>8}  {:<50} {:>4.1}  {}",
            movie.id,
            movie.title.as_deref().unwrap_or("-"),
            movie.rating,
            movie.release_date.as_deref().unwrap_or("")
        );
    }
}

fn print_detail(movie: &MovieDetail) {
    println!("{} ({})", movie.title.as_deref().unwrap_or("-"), movie.id);
    if let Some(tagline) = movie.tagline.as_deref().filter(|t| !t.is_empty()) {
        println!("  \"{}\"", tagline);
    }
    println!("  released: {}", movie.release_date.as_deref().unwrap_or("-"));
    println!("  rating:   {:.1} ({} votes)", movie.rating.unwrap_or(0.0), movie.vote_count);
    if movie.runtime > 0 {
        println!("  runtime:  {} min", movie.runtime);
    }
    if !movie.genres.is_empty() {
        let genres: Vec<&str> = movie.genres.iter().map(|g| g.name.as_str()).collect();
        println!("  genres:   {}", genres.join(", "));
    }
    if !movie.status.is_empty() {
        println!("  status:   {}", movie.status);
    }
    if let Some(overview) = movie.overview.as_deref() {
        println!("\n{}", overview);
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    match dotenv() {
        Ok(path) => info!("Loaded environment from {:?}", path),
        Err(e) => warn!("No .env file loaded ({}) - relying on environment", e),
    }
    init_tracing();

    let args: Vec<String> = env::args().skip(1).collect();
    let command = parse_command(&args)?;
    let config = Config::from_env()?;

    let db = Database::open(&config.db_path)
        .with_context(|| format!("opening cache at {}", config.db_path.display()))?;
    let connectivity: Arc<dyn Connectivity> = if config.force_offline {
        info!("MOVIES_OFFLINE is set; serving from cache only");
        Arc::new(StaticConnectivity(false))
    } else {
        Arc::new(TcpProbe::for_base_url(
            &config.tmdb_base_url,
            Duration::from_secs(3),
        ))
    };
    let repo = Arc::new(MovieRepository::new(
        Arc::new(TmdbClient::from_config(&config)?),
        connectivity,
        db.store(Collection::Popular),
        db.store(Collection::NowPlaying),
        db.store(Collection::Saved),
    ));

    match command {
        Command::Listing(kind, page) => match ListingScreen::new(repo, kind).load(page).await {
            ScreenState::Success(list) => print_page(&list),
            ScreenState::Error(message) => bail!(message),
            ScreenState::Loading => {}
        },
        Command::Search(query) => print_page(&repo.search(&query, 1).await?),
        Command::Detail(id, source) => match DetailScreen::new(repo).load(id, source).await {
            ScreenState::Success(movie) => print_detail(&movie),
            ScreenState::Error(message) => bail!(message),
            ScreenState::Loading => {}
        },
        Command::ToggleSave(id, source) => {
            let screen = DetailScreen::new(repo);
            if let ScreenState::Error(message) = screen.load(id, source).await {
                bail!(message);
            }
            match screen.toggle_save() {
                Some(Ok(true)) => println!("Saved movie {}", id),
                Some(Ok(false)) => println!("Removed movie {} from saved", id),
                Some(Err(e)) => return Err(e.into()),
                None => bail!("movie {} is not loaded", id),
            }
        }
        Command::Saved => {
            let saved = repo.observe_saved().current();
            if saved.is_empty() {
                println!("No saved movies");
            }
            for movie in saved {
                println!("{:>8}  {}", movie.id, movie.title.as_deref().unwrap_or("-"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args(raw: &[&str]) -> Vec<String> {
        raw.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn parses_listing_commands() {
        assert!(matches!(
            parse_command(&args(&["popular"])).unwrap(),
            Command::Listing(ListingKind::Popular, 1)
        ));
        assert!(matches!(
            parse_command(&args(&["now-playing", "3"])).unwrap(),
            Command::Listing(ListingKind::NowPlaying, 3)
        ));
        assert!(parse_command(&args(&["popular", "x"])).is_err());
    }

    #[test]
    fn parses_detail_and_search() {
        assert!(matches!(
            parse_command(&args(&["detail", "603", "saved"])).unwrap(),
            Command::Detail(603, Some(Collection::Saved))
        ));
        assert!(matches!(
            parse_command(&args(&["detail", "603", "search"])).unwrap(),
            Command::Detail(603, None)
        ));
        match parse_command(&args(&["search", "blade", "runner"])).unwrap() {
            Command::Search(q) => assert_eq!(q, "blade runner"),
            _ => panic!("expected search"),
        }
        assert!(parse_command(&args(&["search", " "])).is_err());
        assert!(parse_command(&args(&["rate"])).is_err());
    }
}
