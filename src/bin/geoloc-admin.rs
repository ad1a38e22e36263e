use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;

use geoloc::config::Config;
use geoloc::geo::{country_name, AddressFamily};
use geoloc::ranges::{feed_jobs, DigestKind, FeedSource, FileFeed, StaticFeed};
use geoloc::resolver::RequestContext;
use geoloc::service::{connect_storage, Services};
use geoloc::stats::{StatsQuery, SystemClock};

#[derive(Parser)]
#[command(name = "geoloc-admin")]
#[command(about = "geoloc range and statistics management CLI", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reload range tables from the configured feeds, or from a local file
    Reload {
        /// Address family to reload (v4, v6); required with --file
        #[arg(long)]
        family: Option<AddressFamily>,
        /// Feed file to load instead of the configured feeds ("-" reads stdin)
        #[arg(long)]
        file: Option<PathBuf>,
        /// Companion checksum file for --file
        #[arg(long, requires = "file")]
        checksum: Option<PathBuf>,
        /// Treat --checksum as a base64 HMAC-SHA256 signature
        #[arg(long, requires = "checksum")]
        hmac: bool,
    },
    /// Resolve an address against the stored range tables
    Lookup {
        ip: String,
        /// Edge signal as NAME=VALUE, e.g. cf-ipcountry=FR (repeatable)
        #[arg(long = "header")]
        headers: Vec<String>,
    },
    /// Show record counts and versions of the stored range tables
    Status,
    /// Delete statistics older than the retention window
    PurgeStats,
    /// Run a stats query given as JSON
    Query { json: String },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();
    let config = Config::load()?;

    // Ensure database is initialized
    let storage = connect_storage(&config.database).await?;
    let services = Services::new(storage, &config, Arc::new(SystemClock));
    services.ingester.bootstrap().await?;

    match cli.command {
        Commands::Reload {
            family,
            file,
            checksum,
            hmac,
        } => {
            let results = match file {
                Some(path) => {
                    let Some(family) = family else {
                        bail!("--family is required with --file");
                    };
                    let source: Box<dyn FeedSource> = if path.as_os_str() == "-" {
                        let mut body = Vec::new();
                        std::io::stdin()
                            .read_to_end(&mut body)
                            .context("failed to read feed from stdin")?;
                        Box::new(StaticFeed::new("stdin", body))
                    } else {
                        let feed = FileFeed::new(path);
                        let kind = if hmac { DigestKind::Hmac } else { DigestKind::Sha256 };
                        match checksum {
                            Some(companion) => Box::new(feed.with_companion(companion, kind)),
                            None => Box::new(feed),
                        }
                    };
                    vec![(family, services.ingester.reload(source.as_ref(), family).await)]
                }
                None => {
                    let jobs = feed_jobs(&config.ingest)?
                        .into_iter()
                        .filter(|job| family.map_or(true, |f| f == job.family))
                        .collect::<Vec<_>>();
                    if jobs.is_empty() {
                        bail!("no feed configured; set ingest.v4_url / ingest.v6_url or pass --file");
                    }
                    services.ingester.reload_all(&jobs).await
                }
            };

            let mut failed = false;
            for (family, result) in results {
                match result {
                    Ok(summary) => println!(
                        "✓ {}: {} ranges loaded, {} removed, {} skipped (version {})",
                        family, summary.records, summary.removed, summary.skipped, summary.version
                    ),
                    Err(e) => {
                        failed = true;
                        println!("✗ {}: {}", family, e);
                    }
                }
            }
            if failed {
                bail!("one or more reloads failed");
            }
        }
        Commands::Lookup { ip, headers } => {
            let mut ctx = RequestContext::new(ip);
            for header in headers {
                let Some((name, value)) = header.split_once('=') else {
                    bail!("invalid --header '{header}', expected NAME=VALUE");
                };
                ctx = ctx.with_edge_signal(name.trim().to_ascii_lowercase(), value.trim());
            }
            let resolved = services.resolver.resolve(&ctx).await;
            println!("{:<12} {}", "Address", resolved.ip.canonical());
            println!(
                "{:<12} {} ({})",
                "Country",
                resolved.country,
                country_name(&resolved.country)
            );
            println!("{:<12} {}", "Language", resolved.language());
            println!("{:<12} {}", "Source", resolved.source.as_str());
        }
        Commands::Status => {
            println!("{:<8} {:>10} {:>12}", "Family", "Records", "Version");
            println!("{}", "-".repeat(32));
            for status in services.ingester.status() {
                println!(
                    "{:<8} {:>10} {:>12}",
                    status.family.as_str(),
                    status.records,
                    status.version
                );
            }
        }
        Commands::PurgeStats => {
            let purged = services.stats.purge().await?;
            println!(
                "✓ Purged {} counter rows dated before {}",
                purged,
                services.stats.cutoff()
            );
        }
        Commands::Query { json } => {
            let query: StatsQuery = serde_json::from_str(&json).context("invalid query JSON")?;
            let rows = services.stats.query(&query).await?;
            if rows.is_empty() {
                println!("No rows.");
            }
            for row in rows {
                if row.group.is_empty() {
                    println!("{}", row.value);
                } else {
                    println!("{:<40} {}", row.group.join(" / "), row.value);
                }
            }
        }
    }

    Ok(())
}
