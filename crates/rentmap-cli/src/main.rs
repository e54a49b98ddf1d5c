use clap::{Parser, Subcommand};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use rentmap_scraper::{run_search, ChromiumLauncher, CrawlProgress, CrawlSettings, SearchRequest};

#[derive(Debug, Parser)]
#[command(name = "rentmap-cli")]
#[command(about = "Collect rental listings near an address")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Crawl a search-results URL and print the listings within range as JSON
    Search {
        /// First page of the listing search results
        #[arg(long)]
        url: String,
        /// Address the distance is measured from
        #[arg(long)]
        center: String,
        /// Radius in meters; listings must be strictly closer
        #[arg(long, value_parser = parse_distance)]
        distance: f64,
        /// Override `RENTMAP_CRAWL_MAX_PAGES`
        #[arg(long)]
        max_pages: Option<usize>,
        /// Show the browser window
        #[arg(long)]
        headed: bool,
    },
}

fn parse_distance(raw: &str) -> Result<f64, String> {
    let meters: f64 = raw
        .trim()
        .parse()
        .map_err(|_| format!("\"{raw}\" is not a number"))?;
    if meters.is_finite() && meters > 0.0 {
        Ok(meters)
    } else {
        Err("distance must be a positive number of meters".to_owned())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let mut config = rentmap_core::load_app_config()?;
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(config.log_level.clone()))?;
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match cli.command {
        Commands::Search {
            url,
            center,
            distance,
            max_pages,
            headed,
        } => {
            if let Some(max_pages) = max_pages {
                config.crawl_max_pages = max_pages.max(1);
            }
            if headed {
                config.browser_headless = false;
            }

            let geocoder = rentmap_geocoder::geocoder_from_config(&config)?;
            let launcher = ChromiumLauncher::from_app_config(&config);
            let settings = CrawlSettings::from_app_config(&config);
            let request = SearchRequest {
                url,
                center_address: center,
                threshold_m: distance,
            };

            let cancel = CancellationToken::new();
            let on_ctrl_c = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::warn!("interrupted; cancelling crawl");
                    on_ctrl_c.cancel();
                }
            });

            let (tx, mut rx) = mpsc::channel::<CrawlProgress>(16);
            let printer = tokio::spawn(async move {
                while let Some(p) = rx.recv().await {
                    tracing::info!(
                        page = p.page,
                        of = p.pages_estimate,
                        percent = p.percent,
                        listings = p.listings_so_far,
                        "progress"
                    );
                }
            });

            let result = run_search(&launcher, geocoder, &request, &settings, &tx, &cancel).await;
            drop(tx);
            let _ = printer.await;

            let listings = result?;
            let output = serde_json::json!({ "data": listings });
            println!("{}", serde_json::to_string_pretty(&output)?);
        }
    }

    Ok(())
}
