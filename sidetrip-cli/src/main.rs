use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};

use sidetrip_core::GeoPoint;
use sidetrip_engine::{
    AmapClient, EnrichmentService, OpenAiClient, QuestRequest, RecommendRequest, Recommender,
    VerifyRequest, quest_api,
};

mod config;

#[derive(Parser, Debug)]
#[command(name = "sidetrip", version, about = "Round-trip destination recommender CLI")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Recommend one reachable destination for a free-time window
    Recommend {
        /// Origin as "lng,lat"
        #[arg(long)]
        origin: String,

        /// Travel mode: walk, bike or drive
        #[arg(long, default_value = "walk")]
        mode: String,

        /// Window start, HH:mm (defaults to now)
        #[arg(long)]
        start: Option<String>,

        /// Window end, HH:mm (defaults to three hours from now)
        #[arg(long)]
        end: Option<String>,

        /// Free-text preference, e.g. "想喝咖啡"
        #[arg(long)]
        mood: Option<String>,

        /// Explicit keyword override, comma separated
        #[arg(long)]
        categories: Option<String>,

        /// City scope; pass an empty string to disable scoping
        #[arg(long)]
        city: Option<String>,

        /// Minimum on-site minutes (otherwise inferred from intent)
        #[arg(long)]
        min_stay: Option<i64>,

        /// Fail instead of loosening constraints
        #[arg(long, default_value_t = false)]
        no_relax: bool,

        /// Fix the novelty seed (repeatable results)
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Generate the arrival side quest for a destination
    Quest {
        #[arg(long)]
        start: String,

        #[arg(long)]
        end: String,

        /// Destination name
        #[arg(long)]
        name: String,

        /// Destination category text (optional)
        #[arg(long, default_value = "")]
        category: String,

        /// Destination as "lng,lat"
        #[arg(long)]
        location: String,
    },

    /// Check whether a position counts as having arrived
    Verify {
        /// Current position as "lng,lat"
        #[arg(long)]
        user: String,

        /// Destination as "lng,lat"
        #[arg(long)]
        destination: String,
    },

    /// Config file management
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Write a default ~/.sidetrip/config.toml
    Init,
}

fn parse_point(s: &str) -> Result<GeoPoint> {
    let (lng, lat) = s
        .split_once(',')
        .with_context(|| format!("expected \"lng,lat\", got '{s}'"))?;
    let p = GeoPoint::new(
        lng.trim().parse().with_context(|| format!("bad longitude '{lng}'"))?,
        lat.trim().parse().with_context(|| format!("bad latitude '{lat}'"))?,
    );
    if !p.is_valid() {
        bail!("coordinates out of range: {s}");
    }
    Ok(p)
}

fn parse_mode(s: &str) -> Result<sidetrip_core::TravelMode> {
    match s {
        "walk" => Ok(sidetrip_core::TravelMode::Walk),
        "bike" => Ok(sidetrip_core::TravelMode::Bike),
        "drive" => Ok(sidetrip_core::TravelMode::Drive),
        other => bail!("unknown mode '{other}' (walk|bike|drive)"),
    }
}

fn narrative_from_config(cfg: &config::Config) -> Option<OpenAiClient> {
    if cfg.llm.api_key.is_empty() {
        return None;
    }
    OpenAiClient::with_base_url(&cfg.llm.api_key, &cfg.llm.model, &cfg.llm.base_url).ok()
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Command::Recommend {
            origin,
            mode,
            start,
            end,
            mood,
            categories,
            city,
            min_stay,
            no_relax,
            seed,
        } => {
            let cfg = config::load_config()?;
            if cfg.amap.key.is_empty() {
                bail!("no AMap key configured; set AMAP_KEY or run: sidetrip config init");
            }

            let geo = AmapClient::with_base_url(&cfg.amap.key, &cfg.amap.base_url)?;
            let enrichment = EnrichmentService::new(narrative_from_config(&cfg));
            let mut rec = Recommender::new(geo, enrichment)
                .with_model_intent(cfg.llm.model_intent && !cfg.llm.api_key.is_empty());
            if let Some(seed) = seed {
                rec = rec.with_novelty_seed(seed);
            }

            let now = chrono::Local::now();
            let req = RecommendRequest {
                origin: parse_point(&origin)?,
                mode: parse_mode(&mode)?,
                start_time: start.unwrap_or_else(|| now.format("%H:%M").to_string()),
                end_time: end.unwrap_or_else(|| {
                    (now + chrono::Duration::hours(3)).format("%H:%M").to_string()
                }),
                mood,
                categories: categories
                    .map(|c| c.split(',').map(|s| s.trim().to_string()).collect()),
                city: city.or(Some(cfg.defaults.city)),
                min_stay_min: min_stay,
                allow_relax: !no_relax,
            };

            let reply = rec.recommend(&req).await?;
            print_json(&reply)?;
        }

        Command::Quest { start, end, name, category, location } => {
            let cfg = config::load_config()?;
            let enrichment = EnrichmentService::new(narrative_from_config(&cfg));
            let req = QuestRequest {
                start_time: start,
                end_time: end,
                destination_name: name,
                destination_category: category,
                destination: parse_point(&location)?,
            };
            let reply = quest_api::side_quest(&enrichment, &req).await?;
            print_json(&reply)?;
        }

        Command::Verify { user, destination } => {
            let req = VerifyRequest {
                user: parse_point(&user)?,
                destination: parse_point(&destination)?,
            };
            print_json(&quest_api::verify(&req))?;
        }

        Command::Config { command } => match command {
            ConfigCommand::Init => config::init_config()?,
        },
    }

    Ok(())
}
