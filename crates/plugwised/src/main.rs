use std::path::PathBuf;
use std::sync::Arc;

use clap::Parser;
use plugwised::Config;
use plugwised::Engine;
use plugwised::format_diagnostics;

#[derive(Debug, Parser)]
#[command(version, about = "Plugwise Smile gateway daemon")]
struct Args {
    /// Config files to load, merged in order (first definition wins)
    #[arg(short, long = "config", default_value = "plugwised.toml")]
    configs: Vec<PathBuf>,

    /// Validate the config and exit
    #[arg(long)]
    check: bool,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();

    let (config, diagnostics) = match Config::from_files(&args.configs) {
        Ok(loaded) => loaded,
        Err(e) => {
            eprintln!("{}", e);
            std::process::exit(1);
        }
    };
    if !diagnostics.is_empty() {
        eprint!("{}", format_diagnostics(&diagnostics));
    }

    if args.check {
        println!("Config OK");
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(config.logging.env_filter()?)
        .init();

    tracing::info!("plugwised starting");
    for path in &args.configs {
        tracing::info!("Loaded config from: {}", path.display());
    }

    let mut engine = Engine::new();
    engine.register_integrations_from_config(&config);
    let engine = Arc::new(engine);

    let engine_task = {
        let engine = engine.clone();
        tokio::spawn(async move {
            if let Err(e) = engine.run().await {
                tracing::error!("Engine stopped with error: {}", e);
            }
        })
    };

    let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
    let api_task = tokio::spawn(plugwised::api::serve(
        config.api.listen.clone(),
        config.api.port,
        engine.clone(),
        shutdown_rx,
    ));

    tokio::signal::ctrl_c().await?;
    tracing::info!("Received shutdown signal");

    engine.shutdown().await;
    shutdown_tx.send(()).ok();

    match api_task.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => tracing::error!("HTTP API server failed: {}", e),
        Err(e) => tracing::error!("HTTP API task panicked: {}", e),
    }
    engine_task.abort();

    tracing::info!("plugwised stopped");
    Ok(())
}
