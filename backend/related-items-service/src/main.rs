use anyhow::Context;
use related_items_service::{
    cli::{self, CliArgs},
    services::SeedManager,
    sinks::RedisSink,
    sources::{RecordSource, TextFileSource},
    Config, LshRecommendationJob,
};
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let args = cli::parse_args(std::env::args().skip(1))?;
    if args.help {
        println!("{}", cli::USAGE);
        return Ok(());
    }

    // Load config
    let mut config = Config::from_env().context("failed to load config")?;
    args.apply(&mut config.lsh);
    if let Some(prefix) = &args.output {
        config.redis.key_prefix = prefix.clone();
    }
    config.lsh.validate()?;

    info!(
        service = %config.service.service_name,
        redis_prefix = %config.redis.key_prefix,
        "Starting related-items job"
    );

    let input = args.input.clone().context("-input is required")?;
    let source = Arc::new(TextFileSource::new(&input));
    let sink = Arc::new(RedisSink::from_url(&config.redis.url, config.redis.key_prefix.clone())?);
    let seeds = Arc::new(seed_manager(&args, &sink, &source.identity()).await?);

    // Cancel at the next iteration boundary on Ctrl-C
    let (cancel_tx, cancel_rx) = watch::channel(false);
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received, cancelling at next iteration boundary");
            let _ = cancel_tx.send(true);
        }
    });

    let job = LshRecommendationJob::from_config(&config, source, sink, seeds);
    match job.run(cancel_rx).await {
        Ok(report) => {
            info!(
                run_key = %report.run_key,
                items = report.items,
                with_recommendations = report.items_with_recommendations,
                retries = report.stats.retries,
                "Related-items job finished"
            );
            Ok(())
        }
        Err(e) => {
            error!(error = %e, "Related-items job failed");
            Err(e.into())
        }
    }
}

async fn seed_manager(
    args: &CliArgs,
    sink: &RedisSink,
    run_key: &str,
) -> anyhow::Result<SeedManager> {
    if let Some(path) = &args.seeds_file {
        let seeds = cli::read_seed_log(path)?;
        info!(seeds = seeds.len(), path = %path.display(), "Replaying seeds from file");
        return Ok(SeedManager::replay(seeds));
    }

    if args.replay {
        let seeds = sink
            .fetch_seeds(run_key)
            .await?
            .with_context(|| format!("no published seed log for {run_key}"))?;
        info!(seeds = seeds.len(), run_key, "Replaying published seeds");
        return Ok(SeedManager::replay(seeds));
    }

    Ok(match args.rng_seed {
        Some(rng_seed) => SeedManager::with_rng_seed(rng_seed),
        None => SeedManager::from_entropy(),
    })
}
