use std::{str::FromStr, sync::Arc};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use clap::{ArgAction, Args, Parser, Subcommand};
use freight_quote::{
    config::{self, AppConfig},
    events::EventSender,
    models::{CargoCategory, CargoDetails, PaymentMethod, TruckType, WeightUnit},
    services::{geocoding::NominatimClient, quotes::HttpQuoteApi},
    Coordinate, LocationResolver, MapBridge, MapSurface, QuoteAssembler, RouteEstimator,
    ServiceError, WizardController,
};
use serde::Serialize;
use serde_json::json;
use tracing::debug;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let context = CliContext::initialize().await?;

    match cli.command {
        Commands::Geocode(args) => handle_geocode(&context, args, cli.json).await?,
        Commands::Reverse(args) => handle_reverse(&context, args, cli.json).await?,
        Commands::Estimate(args) => handle_estimate(args, cli.json)?,
        Commands::Quote(args) => handle_quote(&context, args, cli.json).await?,
    }

    Ok(())
}

#[derive(Parser)]
#[command(
    name = "freight-quote",
    about = "Resolve addresses, estimate routes and request trucking quotes",
    version
)]
struct Cli {
    #[arg(
        long,
        global = true,
        action = ArgAction::SetTrue,
        help = "Render command output as pretty JSON"
    )]
    json: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resolve a free-text address to coordinates
    Geocode(GeocodeArgs),
    /// Label a coordinate
    Reverse(ReverseArgs),
    /// Straight-line distance and heuristic travel time
    Estimate(EstimateArgs),
    /// Run the whole quote wizard and submit the result
    Quote(QuoteArgs),
}

#[derive(Args)]
struct GeocodeArgs {
    #[arg(help = "Address to look up")]
    text: String,
}

#[derive(Args)]
struct ReverseArgs {
    #[arg(long, allow_hyphen_values = true)]
    lat: f64,
    #[arg(long, allow_hyphen_values = true)]
    lng: f64,
}

#[derive(Args)]
struct EstimateArgs {
    #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true, help = "Origin as lat,lng")]
    from: Coordinate,
    #[arg(long, value_parser = parse_coordinate, allow_hyphen_values = true, help = "Destination as lat,lng")]
    to: Coordinate,
}

#[derive(Args)]
struct QuoteArgs {
    #[arg(long, help = "Identifier of the requesting client")]
    client_id: String,
    #[arg(long, help = "Pickup address")]
    pickup: String,
    #[arg(long, help = "Destination address")]
    destination: String,
    #[arg(long, value_parser = TruckType::from_str, help = "Truck type, e.g. furgon")]
    truck: TruckType,
    #[arg(long, help = "Kind of goods, e.g. electrodomésticos")]
    cargo_type: String,
    #[arg(long)]
    weight: f64,
    #[arg(long, value_parser = WeightUnit::from_str, default_value = "kg")]
    unit: WeightUnit,
    #[arg(long, value_parser = CargoCategory::from_str, default_value = "general")]
    category: CargoCategory,
    #[arg(long, default_value = "")]
    description: String,
    #[arg(long, default_value = "bajo")]
    risk: String,
    #[arg(long, help = "Date the truck is needed (YYYY-MM-DD)")]
    request_date: NaiveDate,
    #[arg(long, help = "Delivery date (YYYY-MM-DD); defaults to the request date")]
    delivery_date: Option<NaiveDate>,
    #[arg(long, help = "Departure time, e.g. \"8:30 AM\"")]
    departure: Option<String>,
    #[arg(long, value_parser = PaymentMethod::from_str, default_value = "cash")]
    payment: PaymentMethod,
    #[arg(long, default_value = "")]
    notes: String,
    #[arg(
        long,
        action = ArgAction::SetTrue,
        help = "Print the assembled payload instead of submitting it"
    )]
    dry_run: bool,
}

/// Map surface for headless runs: every message is logged and accepted.
struct LoggingMapSurface;

#[async_trait]
impl MapSurface for LoggingMapSurface {
    async fn post_message(&self, payload: String) -> Result<(), ServiceError> {
        debug!(target: "freight_quote::map", %payload, "map message");
        Ok(())
    }
}

struct CliContext {
    config: AppConfig,
    resolver: LocationResolver,
    assembler: QuoteAssembler,
}

impl CliContext {
    async fn initialize() -> Result<Self> {
        let config = config::load_config().context("failed to load application config")?;
        config::init_tracing(config.log_level(), config.log_json);

        let bridge = MapBridge::new(Arc::new(LoggingMapSurface), config.map_bridge.clone());
        bridge.receive(r#"{"type":"mapReady"}"#).await;

        let geocoder =
            NominatimClient::new(&config.geocoding).context("failed to build geocoding client")?;
        let resolver = LocationResolver::new(Arc::new(geocoder), bridge, config.geocoding.clone());

        let quote_api =
            HttpQuoteApi::new(&config.quote_api).context("failed to build quote API client")?;
        let assembler = QuoteAssembler::new(
            Arc::new(quote_api),
            config.quote_api.clone(),
            config.schedule.clone(),
        );

        Ok(Self {
            config,
            resolver,
            assembler,
        })
    }
}

async fn handle_geocode(context: &CliContext, args: GeocodeArgs, json: bool) -> Result<()> {
    let point = context
        .resolver
        .locate_address(&args.text)
        .await
        .map_err(user_facing)?;

    if json {
        print_json(&point)?;
    } else if let Some(coordinate) = point.coordinate {
        println!("{} ({})", point.display_label(), coordinate);
    }
    Ok(())
}

async fn handle_reverse(context: &CliContext, args: ReverseArgs, json: bool) -> Result<()> {
    let coordinate = Coordinate::new(args.lat, args.lng);
    let point = context.resolver.resolve_tapped_point(coordinate).await;

    if json {
        print_json(&point)?;
    } else {
        println!("{}", point.display_label());
    }
    Ok(())
}

fn handle_estimate(args: EstimateArgs, json: bool) -> Result<()> {
    let estimate = RouteEstimator::estimate(args.from, args.to);

    if json {
        print_json(&estimate)?;
    } else {
        println!(
            "{:.2} km, about {} min",
            estimate.distance_km, estimate.eta_minutes
        );
    }
    Ok(())
}

async fn handle_quote(context: &CliContext, args: QuoteArgs, json: bool) -> Result<()> {
    let (events, mut event_rx) = EventSender::channel(32);
    tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            debug!(target: "freight_quote::cli", event = ?event, "wizard event");
        }
    });

    let controller = WizardController::new(
        context.resolver.clone(),
        context.assembler.clone(),
        args.client_id.as_str(),
        &context.config.schedule,
    )
    .with_events(events);

    controller
        .resolve_address(&args.pickup)
        .await
        .map_err(user_facing)?
        .ok_or_else(|| anyhow!("pickup lookup was superseded"))?;
    controller.confirm_origin().await.map_err(user_facing)?;

    controller
        .resolve_address(&args.destination)
        .await
        .map_err(user_facing)?
        .ok_or_else(|| anyhow!("destination lookup was superseded"))?;
    controller.confirm_destination().await.map_err(user_facing)?;

    controller.select_truck(args.truck).await.map_err(user_facing)?;
    controller.proceed_to_details().await.map_err(user_facing)?;

    controller
        .set_cargo(CargoDetails {
            cargo_type: args.cargo_type,
            category: args.category,
            description: args.description,
            weight_value: args.weight,
            weight_unit: args.unit,
            risk_classification: args.risk,
            notes: String::new(),
        })
        .await
        .map_err(user_facing)?;
    controller
        .set_request_date(Some(args.request_date))
        .await
        .map_err(user_facing)?;
    controller
        .set_delivery_date(Some(args.delivery_date.unwrap_or(args.request_date)))
        .await
        .map_err(user_facing)?;
    if let Some(departure) = &args.departure {
        controller
            .set_departure_time(departure)
            .await
            .map_err(user_facing)?;
    }
    controller
        .set_payment_method(args.payment)
        .await
        .map_err(user_facing)?;
    controller.set_notes(&args.notes).await.map_err(user_facing)?;

    if args.dry_run {
        let request = context
            .assembler
            .build_quote_request(&controller.state().await, &args.client_id)
            .map_err(user_facing)?;
        return print_json(&request);
    }

    let outcome = controller.submit().await.map_err(user_facing)?;
    if json {
        print_json(&json!({
            "quote": outcome.quote,
            "firstQuote": outcome.first_quote,
        }))?;
    } else {
        println!("Quote {} created", outcome.quote.id);
        if outcome.first_quote {
            println!("This is the client's first quote.");
        }
    }
    Ok(())
}

fn parse_coordinate(raw: &str) -> std::result::Result<Coordinate, String> {
    let (lat, lng) = raw
        .split_once(',')
        .ok_or_else(|| format!("expected lat,lng but got \"{}\"", raw))?;
    let lat: f64 = lat.trim().parse().map_err(|_| format!("invalid latitude \"{}\"", lat))?;
    let lng: f64 = lng.trim().parse().map_err(|_| format!("invalid longitude \"{}\"", lng))?;
    if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lng) {
        return Err(format!("coordinate out of range: {}", raw));
    }
    Ok(Coordinate::new(lat, lng))
}

fn user_facing(err: ServiceError) -> anyhow::Error {
    debug!(error = ?err, "command failed");
    anyhow!(err.user_message())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
