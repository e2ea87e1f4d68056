//! Query TMDB through the app's client and print the normalised result.
//! Usage:
//!   cargo run --bin tmdb_probe -- search <query> [page]
//!   cargo run --bin tmdb_probe -- popular [page]
//!   cargo run --bin tmdb_probe -- genres
//!   cargo run --bin tmdb_probe -- rated <guest_session_id> [page]
//! Reads TMDB_ACCESS_TOKEN / TMDB_API_KEY from the environment (.env supported).

use anyhow::{bail, Context, Result};
use cinesearch::config::Config;
use cinesearch::models::MoviePage;
use cinesearch::tmdb::{TmdbApi, TmdbClient};
use cinesearch::view::truncate_text;
use dotenvy::dotenv;
use std::env;
use tracing_subscriber::EnvFilter;

fn parse_page(arg: Option<&String>) -> Result<u32> {
    match arg {
        Some(raw) => raw
            .parse::<u32>()
            .with_context(|| format!("invalid page '{}'", raw)),
        None => Ok(1),
    }
}

fn print_page(page: &MoviePage) {
    println!(
        "page {} of {} ({} results total)",
        page.page, page.total_pages, page.total_results
    );
    for movie in &page.results {
        let rating = movie
            .rating
            .map(|r| format!(" rated {r}"))
            .unwrap_or_default();
        println!(
            "  {:>8}  {} [{}] {:.1}{}",
            movie.id, movie.title, movie.release_date, movie.vote_average, rating
        );
        if !movie.overview.is_empty() {
            println!("            {}", truncate_text(&movie.overview, 100));
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenv();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_target(false)
        .compact()
        .init();

    let args: Vec<String> = env::args().skip(1).collect();
    let config = Config::from_env();
    let client = TmdbClient::new(&config)?;

    match args.first().map(String::as_str) {
        Some("search") => {
            let query = args.get(1).context("search needs a query")?;
            print_page(&client.search_movies(query.trim(), parse_page(args.get(2))?).await?);
        }
        Some("popular") => {
            print_page(&client.fetch_popular(parse_page(args.get(1))?).await?);
        }
        Some("genres") => {
            for (id, name) in client.fetch_genres().await? {
                println!("{id:>6}  {name}");
            }
        }
        Some("rated") => {
            let session = args.get(1).context("rated needs a guest session id")?;
            print_page(&client.fetch_rated_movies(session, parse_page(args.get(2))?).await?);
        }
        _ => bail!("usage: tmdb_probe <search QUERY [PAGE] | popular [PAGE] | genres | rated SESSION [PAGE]>"),
    }
    Ok(())
}
