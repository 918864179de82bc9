use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use serde::Serialize;

use locator::config::Settings;
use locator::location::{Coordinate, LocationFacade, LocationFix, TravelDistance};
use locator::{logging, server};

/// Locator: device location, geocoding and distance lookups.
///
/// Examples:
///   locator locate --authorize
///   locator geocode "1600 Amphitheatre Parkway, Mountain View"
///   locator zip 94016 --country US
///   locator config --init
///   locator remote "Ferry Building, San Francisco"
///   locator distance --lat 37.8044 --lon -122.2712 --travel
///   locator serve --port 3000
#[derive(Parser)]
#[command(name = "locator", version, about, long_about = None)]
struct Cli {
    /// Config file. Defaults to ~/.locator/config.json.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Default ISO 3166-1 alpha-2 country for postal lookups.
    #[arg(long, global = true)]
    country: Option<String>,

    /// Answer the location permission prompt with a grant.
    #[arg(long, global = true)]
    authorize: bool,

    /// Raise log verbosity (-v debug, -vv trace). RUST_LOG overrides.
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Resolve the current location.
    Locate,

    /// Forward-geocode an address with the device geocoder.
    Geocode { address: String },

    /// Geocode a postal code.
    Zip { zip: String },

    /// Forward-geocode an address with the remote provider.
    Remote { address: String },

    /// Distance in miles from the current location to a point.
    Distance {
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lon: f64,
        /// Also ask the distance-matrix provider for travel distance.
        #[arg(long)]
        travel: bool,
    },

    /// Print the effective settings.
    Config {
        /// Write them to the config file.
        #[arg(long)]
        init: bool,
    },

    /// Run the HTTP API server.
    Serve {
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
        #[arg(long, default_value_t = 3000)]
        port: u16,
    },
}

#[derive(Serialize)]
struct DistanceOutput {
    from: LocationFix,
    to: Coordinate,
    miles: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    travel: Option<TravelDistance>,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    logging::init(cli.verbose);

    let mut settings = match &cli.config {
        Some(path) => Settings::load_from(path),
        None => Settings::load(),
    };
    apply_flags(&cli, &mut settings);

    let settings = Arc::new(settings);
    let facade = LocationFacade::from_settings(Arc::clone(&settings));

    match cli.command {
        Command::Locate => {
            let fix = facade.current_location().await.unwrap_or_else(|e| fail(e));
            print_json(&fix);
        }
        Command::Geocode { address } => {
            let placemark = facade
                .geocode_address(&address)
                .await
                .unwrap_or_else(|e| fail(e));
            print_json(&placemark);
        }
        Command::Zip { zip } => {
            let placemark = facade
                .geocode_zip(&zip, None)
                .await
                .unwrap_or_else(|e| fail(e));
            print_json(&placemark);
        }
        Command::Remote { address } => {
            let placemark = facade
                .geocode_address_remote(&address)
                .await
                .unwrap_or_else(|e| fail(e));
            print_json(&placemark);
        }
        Command::Distance { lat, lon, travel } => {
            let to = Coordinate::try_new(lat, lon).unwrap_or_else(|e| fail(e));
            let from = facade.current_location().await.unwrap_or_else(|e| fail(e));
            let travel = if travel {
                Some(facade.travel_distance_from_current(to).await)
            } else {
                None
            };
            print_json(&DistanceOutput {
                from,
                to,
                miles: facade.distance_from_current(to),
                travel,
            });
        }
        Command::Serve { host, port } => {
            if let Err(e) = server::start(facade, &host, port).await {
                fail(format!("Cannot serve on {}:{}: {}", host, port, e));
            }
        }
        Command::Config { init } => {
            if init {
                let path = cli.config.unwrap_or_else(Settings::default_path);
                if let Err(e) = settings.save_to(&path) {
                    fail(format!("Cannot write {}: {}", path.display(), e));
                }
                eprintln!("Wrote {}", path.display());
            }
            print_json(&*settings);
        }
    }
}

/// Global flags override whatever the config file says.
fn apply_flags(cli: &Cli, settings: &mut Settings) {
    if cli.authorize {
        settings.grant_location = true;
    }
    if let Some(country) = &cli.country {
        settings.default_country = country.trim().to_uppercase();
    }
}

fn print_json<T: Serialize>(value: &T) {
    match serde_json::to_string_pretty(value) {
        Ok(json) => println!("{}", json),
        Err(e) => fail(e),
    }
}

fn fail(e: impl std::fmt::Display) -> ! {
    eprintln!("Error: {}", e);
    std::process::exit(1);
}
