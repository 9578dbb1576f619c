use std::sync::Arc;

use clap::Parser;
use tracing::{error, warn};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use webtest_engine::browser::session::SessionLauncher;
use webtest_engine::cli::commands::{cmd_artifacts, cmd_crawl, cmd_run};
use webtest_engine::cli::config::{AppConfig, Cli, Commands, load_config};
use webtest_engine::error::{EngineResult, error_chain};
use webtest_engine::service::TestAutomationService;

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "webtest_engine=info",
        1 => "webtest_engine=debug",
        _ => "webtest_engine=trace",
    };
    // RUST_LOG wins over -v
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let config = load_config(cli.config.as_deref());

    let launcher = Arc::new(SessionLauncher::new(
        config.driver.node_binary.clone(),
        config.driver.script.clone(),
    ));
    let service = TestAutomationService::new(launcher, config.service_config());

    let outcome = tokio::select! {
        result = dispatch(&service, &config, cli.command) => result,
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, shutting down");
            Ok(false)
        }
    };

    if let Err(e) = service.shutdown().await {
        warn!(error = %e, "driver shutdown failed");
    }

    match outcome {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(e) => {
            error!("{}", error_chain(&e));
            std::process::exit(1);
        }
    }
}

/// Returns `Ok(false)` when the command completed but tests did not pass.
async fn dispatch(
    service: &TestAutomationService,
    config: &AppConfig,
    command: Commands,
) -> EngineResult<bool> {
    match command {
        Commands::Run {
            suite,
            suite_id,
            parallel,
            format,
            output,
        } => {
            service.start().await?;
            let format = format.unwrap_or_else(|| config.orchestration.format.clone());
            cmd_run(
                service,
                &suite,
                suite_id.as_deref(),
                parallel || config.orchestration.parallel,
                &format,
                output.as_deref(),
            )
            .await
        }
        Commands::Crawl { url, output } => {
            service.start().await?;
            cmd_crawl(service, &url, output.as_deref()).await?;
            Ok(true)
        }
        Commands::Artifacts { prefix } => {
            cmd_artifacts(service, &prefix).await?;
            Ok(true)
        }
    }
}
