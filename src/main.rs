use std::sync::Arc;

use clap::Parser;
use dotenv::dotenv;
use tracing_subscriber::EnvFilter;

use tripmap::api::{MapOptions, TripMapAPI, VerificationAPI};
use tripmap::config::{Cli, Command, MapArgs, Settings, VerifyArgs};
use tripmap::engine::Engine;
use tripmap::entities::{Waypoint, HANDLERS};
use tripmap::error::Error;
use tripmap::external::{datadog, google_maps};
use tripmap::{polyline, render};

#[tokio::main]
async fn main() {
    dotenv().ok();

    let cli = Cli::parse();

    let default_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    if let Err(err) = run(cli).await {
        tracing::error!("{}", err);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Error> {
    let settings = Settings::load(cli.config.as_deref())?.merge_credentials(&cli.credentials);

    match cli.command {
        Command::Map(args) => map(settings, args).await,
        Command::Decode { polyline } => {
            let waypoints = polyline::decode(&polyline);
            println!("{}", serde_json::to_string_pretty(&waypoints)?);
            Ok(())
        }
        Command::Encode { points } => {
            let waypoints = points
                .iter()
                .map(|p| p.parse::<Waypoint>())
                .collect::<Result<Vec<_>, _>>()?;
            println!("{}", polyline::encode(&waypoints));
            Ok(())
        }
        Command::Verify(args) => verify(settings, args).await,
    }
}

fn engine(settings: Settings) -> Result<Engine, Error> {
    settings.validate_datadog()?;
    let client = datadog::Client::new(&settings.datadog)?;

    Ok(Engine::new(settings, Arc::new(client)))
}

async fn map(settings: Settings, args: MapArgs) -> Result<(), Error> {
    let engine = engine(settings.merge_map_args(&args))?;
    let settings = engine.settings();

    let options = MapOptions {
        gap_threshold: settings.gap_threshold(),
        enrich: !args.no_enrich,
    };

    tracing::info!("searching logs for trip {}", args.trip_id);
    let trip_map = engine.build_trip_map(args.trip_id, &options).await?;

    tracing::info!("rendering");
    let api_key = settings.google_maps.api_key.as_deref();
    let mut paths = render::write_trip_map(&trip_map, &settings.output_dir, api_key).await?;

    if args.static_map {
        let url = google_maps::static_map_url(&trip_map.route, &settings.google_maps)?;
        println!("{}", url);

        let path = settings
            .output_dir
            .join(format!("{}.png", trip_map.file_stem()));
        google_maps::download_static_map(&url, &path).await?;
        paths.push(path);
    }

    let route = &trip_map.route;
    println!(
        "trip {}: {} fragment(s), {} waypoint(s), {} gap(s){}{}",
        route.trip_id,
        route.fragment_count,
        route.waypoints.len(),
        route.gap_count(),
        if route.is_complete { "" } else { " (incomplete)" },
        if trip_map.logs_truncated { " (log search truncated)" } else { "" }
    );
    for path in paths {
        println!("  {}", path.display());
    }

    Ok(())
}

async fn verify(mut settings: Settings, args: VerifyArgs) -> Result<(), Error> {
    if let Some(days) = args.lookback_days {
        settings.lookback_days = days;
    }

    let engine = engine(settings)?;
    let results = engine.verify_handlers(args.limit).await?;

    for (handler, result) in HANDLERS.iter().zip(&results) {
        println!(
            "{:<24} {:<20} logs: {}",
            result.handler,
            result.status.name(),
            result.logs_found
        );
        println!("    {}", handler.description);
        if !result.fields_found.is_empty() {
            println!("    found:   {}", result.fields_found.join(", "));
        }
        if !result.fields_missing.is_empty() {
            println!("    missing: {}", result.fields_missing.join(", "));
        }
    }

    Ok(())
}
