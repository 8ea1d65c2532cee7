use anyhow::Context;
use clap::Parser;
use nutriscan_api::NutritionClient;
use nutriscan_cache::CacheManager;
use nutriscan_core::capture::{
    CaptureEngine, CaptureEvent, CaptureMode, ScriptedFrameSource, TextPayloadDecoder,
};
use nutriscan_core::providers::NutritionApiSource;
use nutriscan_core::stats::DEFAULT_HISTORY_LIMIT;
use nutriscan_core::{
    Catalog, Config, ConnectivityBelief, Error, Preferences, ProductRecord, ProductResolver,
    ProductSource, StatisticsAggregator,
};
use std::io::BufRead;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod display;
mod seed;

#[derive(Parser)]
#[command(name = "nutriscan")]
#[command(version, about = "Barcode nutrition scanner with offline cache", long_about = None)]
struct Cli {
    /// SQLite cache file (overrides config)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Product service base URL (overrides config)
    #[arg(long, global = true, env = "NUTRISCAN_API_URL")]
    api_url: Option<String>,

    /// Never contact the product service
    #[arg(long, global = true)]
    offline: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(clap::Subcommand)]
enum Commands {
    /// Resolve a single barcode
    Lookup {
        barcode: String,
    },
    /// Run a capture session over a scripted frame file
    Scan {
        /// One frame per line, comma-separated barcodes, blank for nothing in view
        #[arg(long)]
        script: PathBuf,
        /// auto, manual or continuous
        #[arg(long, default_value = "auto")]
        mode: CaptureMode,
    },
    /// Show scan statistics
    Stats,
    /// Show recent scans
    History {
        #[arg(long, default_value_t = DEFAULT_HISTORY_LIMIT)]
        limit: usize,
    },
    /// Manage your allergen list
    Allergens {
        #[command(subcommand)]
        action: AllergenAction,
    },
    /// Check connectivity and cache health
    Status,
    /// Copy the service catalog into the local cache
    Sync,
    /// Add a product from a JSON file
    Add {
        file: PathBuf,
    },
    /// List cached products
    Products,
    /// Load demo products into the local cache
    Seed,
}

#[derive(clap::Subcommand)]
enum AllergenAction {
    Show,
    /// Replace the list
    Set {
        #[arg(required = true)]
        tags: Vec<String>,
    },
    Clear,
}

struct App {
    config: Config,
    db_path: PathBuf,
    cache: Arc<CacheManager>,
    resolver: Arc<ProductResolver>,
    offline: bool,
}

impl App {
    fn build(cli: &Cli) -> anyhow::Result<Self> {
        let mut config = Config::load().context("Failed to load config")?;
        if let Some(url) = &cli.api_url {
            config.api.base_url = url.clone();
        }
        if let Some(db) = &cli.db {
            config.cache.db_path = Some(db.clone());
        }

        let db_path = config.cache.resolved_db_path()?;
        let cache = Arc::new(
            CacheManager::open(&db_path)
                .with_context(|| format!("Failed to open cache at {}", db_path.display()))?,
        );

        let timeouts = config.api.timeouts();
        let client = NutritionClient::new(config.api.base_url.as_str())?.with_timeouts(timeouts.clone());
        let source: Arc<dyn ProductSource> = Arc::new(NutritionApiSource::new(client));

        let resolver = ProductResolver::new(source, Arc::clone(&cache))
            .with_timeouts(&timeouts)
            .with_connectivity(ConnectivityBelief::with_initial(!cli.offline));

        Ok(Self {
            config,
            db_path,
            cache,
            resolver: Arc::new(resolver),
            offline: cli.offline,
        })
    }

    /// Probe the service unless told to stay offline
    async fn connect(&self) -> bool {
        if self.offline {
            tracing::info!("Offline mode, using the local cache only");
            return false;
        }
        let online = self.resolver.refresh_connectivity().await;
        if !online {
            println!(
                "Service at {} is unreachable, using the local cache",
                self.config.api.base_url
            );
        }
        online
    }

    fn catalog(&self) -> Catalog {
        Catalog::new(Arc::clone(&self.resolver))
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "nutriscan=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let cli = Cli::parse();
    let Some(command) = &cli.command else {
        println!("No command specified. Try --help");
        return Ok(());
    };

    let app = App::build(&cli)?;

    match command {
        Commands::Lookup { barcode } => lookup(&app, barcode).await?,
        Commands::Scan { script, mode } => scan(&app, script, *mode).await?,
        Commands::Stats => {
            let stats = StatisticsAggregator::new(Arc::clone(&app.cache)).stats()?;
            display::print_stats(&stats);
        }
        Commands::History { limit } => {
            let scans = StatisticsAggregator::new(Arc::clone(&app.cache)).recent_scans(*limit)?;
            display::print_history(&scans);
        }
        Commands::Allergens { action } => allergens(&app, action)?,
        Commands::Status => {
            let online = app.connect().await;
            display::print_status(
                &app.config.api.base_url,
                &app.db_path,
                online,
                app.resolver.connectivity().last_checked(),
                app.cache.product_count()?,
                app.cache.count_scans()?,
            );
        }
        Commands::Sync => {
            if !app.connect().await {
                anyhow::bail!("Cannot sync while the service is unreachable");
            }
            let report = app.catalog().sync().await?;
            println!(
                "Synced {} product(s), skipped {} of {} fetched",
                report.stored, report.skipped, report.fetched
            );
        }
        Commands::Add { file } => {
            let contents = std::fs::read_to_string(file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let product: ProductRecord = serde_json::from_str(&contents)
                .with_context(|| format!("{} is not a valid product", file.display()))?;

            app.connect().await;
            let added = app.catalog().submit_product(product).await?;
            println!("Added {} ({})", added.name, added.barcode);
        }
        Commands::Products => {
            display::print_products(&app.catalog().cached_products()?);
        }
        Commands::Seed => {
            let count = app.catalog().import(&seed::sample_products())?;
            println!("Loaded {} sample product(s) into {}", count, app.db_path.display());
        }
    }

    Ok(())
}

async fn lookup(app: &App, barcode: &str) -> anyhow::Result<()> {
    app.connect().await;

    match app.resolver.resolve(barcode).await {
        Ok(result) => display::print_scan_result(&result),
        Err(Error::NotFound(barcode)) => {
            println!("Product {} not found online or in the local cache", barcode)
        }
        Err(e) => return Err(e.into()),
    }
    Ok(())
}

async fn scan(app: &App, script: &Path, mode: CaptureMode) -> anyhow::Result<()> {
    app.connect().await;

    let source = ScriptedFrameSource::from_file(script)
        .with_context(|| format!("Failed to read frame script {}", script.display()))?
        .with_interval(app.config.capture.frame_interval())
        .hold_last(mode == CaptureMode::Manual);

    let engine = CaptureEngine::new(Arc::clone(&app.resolver), &app.config.capture);
    let mut handle = engine.start(mode, source, TextPayloadDecoder)?;

    let stop = handle.stop_token();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            stop.cancel();
        }
    });

    let mut enter = if mode == CaptureMode::Manual {
        enter_presses()
    } else {
        mpsc::channel(1).1
    };
    let mut armed = false;

    loop {
        tokio::select! {
            event = handle.next_event() => {
                let Some(event) = event else { break };
                match event {
                    CaptureEvent::Started { mode, .. } => {
                        println!("Scanning in {} mode. Ctrl-C to stop.", mode);
                    }
                    CaptureEvent::BarcodeDetected { barcode, .. } => {
                        if mode == CaptureMode::Manual {
                            armed = true;
                            println!("Barcode {} in view. Press Enter to capture.", barcode);
                        } else {
                            println!("Detected {}", barcode);
                        }
                    }
                    CaptureEvent::NoBarcodeHint { .. } => {
                        println!("No barcode detected. Hold the product steady in view.");
                    }
                    CaptureEvent::Resolved { result, .. } => display::print_scan_result(&result),
                    CaptureEvent::NotFound { barcode, .. } => {
                        println!("Product {} not found online or in the local cache", barcode);
                    }
                    CaptureEvent::ResolutionFailed { barcode, error, .. } => {
                        eprintln!("Could not resolve {}: {}", barcode, error);
                    }
                    CaptureEvent::SourceFailed { error, .. } => {
                        eprintln!("Frame source failed: {}", error);
                    }
                    CaptureEvent::Stopped { .. } => {}
                }
            }
            Some(()) = enter.recv(), if armed => {
                armed = false;
                if handle.capture().await.is_err() {
                    tracing::debug!("Capture trigger arrived after the session ended");
                }
            }
        }
    }

    let summary = handle.join().await?;
    println!(
        "Session ended ({:?}): {} frame(s), {} resolution(s)",
        summary.final_state, summary.frames_processed, summary.resolutions
    );
    Ok(())
}

/// Enter key presses from a plain thread, so a pending read never holds up
/// runtime shutdown
fn enter_presses() -> mpsc::Receiver<()> {
    let (tx, rx) = mpsc::channel(1);
    std::thread::spawn(move || {
        for line in std::io::stdin().lock().lines() {
            if line.is_err() || tx.blocking_send(()).is_err() {
                break;
            }
        }
    });
    rx
}

fn allergens(app: &App, action: &AllergenAction) -> anyhow::Result<()> {
    let prefs = Preferences::new(Arc::clone(&app.cache));
    match action {
        AllergenAction::Show => display::print_allergens(&prefs.allergens()?),
        AllergenAction::Set { tags } => {
            // Accept both `set dairy nuts` and `set dairy,nuts`
            let saved = prefs.set_allergens(tags.iter().flat_map(|t| t.split(',')))?;
            display::print_allergens(&saved);
        }
        AllergenAction::Clear => {
            prefs.clear()?;
            println!("Allergen list cleared");
        }
    }
    Ok(())
}
