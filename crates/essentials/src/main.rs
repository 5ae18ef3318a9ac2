//! Essentials host entry point.
//!
//! Loads the application configuration, sets up logging, enables the core
//! with the bundled units and keeps it running until a shutdown signal or a
//! critical fault. Modules are synchronized periodically; SIGHUP reloads
//! every configuration and module.

mod cli;
mod config;
mod console;
mod logging;
mod signals;
mod units;

use anyhow::{anyhow, Context};
use cli::CliArgs;
use config::AppConfig;
use console::ConsoleHost;
use essentials_core::{CoreOptions, LifecycleCoordinator, PhaseReport};
use signals::{wait_for_shutdown, ReloadSignal};
use std::future::pending;
use std::sync::Arc;
use tracing::{debug, error, info, warn};

/// Main application structure that owns the core and its host.
pub struct Application {
    config: AppConfig,
    host: Arc<ConsoleHost>,
    core: LifecycleCoordinator,
}

impl Application {
    pub async fn new(args: CliArgs) -> anyhow::Result<Self> {
        let mut config = AppConfig::load_from_file(&args.config_path)
            .await
            .with_context(|| format!("Failed to load {}", args.config_path.display()))?;

        if let Some(config_dir) = args.config_dir {
            config.core.config_directory = config_dir.to_string_lossy().to_string();
        }

        if let Some(log_level) = args.log_level {
            config.logging.level = log_level;
        }

        if args.json_logs {
            config.logging.json_format = true;
        }

        config
            .validate()
            .map_err(|e| anyhow!("Configuration validation failed: {}", e))?;

        logging::setup_logging(&config.logging)?;

        let host = Arc::new(ConsoleHost::new(config.config_directory()));
        let options = CoreOptions {
            proxy_channel: config.core.proxy_channel.clone(),
        };
        let core = LifecycleCoordinator::new(units::catalog(), host.clone(), options);

        info!(
            "📂 Config: {} | Units: {}",
            args.config_path.display(),
            config.core.config_directory
        );

        Ok(Self { config, host, core })
    }

    pub async fn run(self) -> anyhow::Result<()> {
        info!("🌟 Starting Essentials");

        if let Err(e) = self.core.enable() {
            self.disable_after_abort();
            return Err(e).context("Failed to enable the core");
        }

        let modules = self.core.modules().map(|m| m.len()).unwrap_or_default();
        let configurations = self.core.configurations().map(|c| c.len()).unwrap_or_default();
        info!(
            "✅ Running with {} configurations and {} modules",
            configurations, modules
        );

        let mut reload = ReloadSignal::new()?;
        let mut sync_timer = self.config.sync_interval().map(tokio::time::interval);
        match &sync_timer {
            Some(timer) => info!("🔄 Synchronizing modules every {:?}", timer.period()),
            None => info!("🔄 Periodic synchronization is disabled"),
        }
        info!("🛑 Press Ctrl+C to gracefully shutdown");

        let shutdown = wait_for_shutdown();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                result = &mut shutdown => {
                    result?;
                    break;
                }
                fault = self.host.deactivated() => {
                    units::flush_heartbeats(&self.core).await;
                    self.disable_after_abort();
                    return Err(anyhow!("Integration deactivated: {}", fault));
                }
                _ = reload.recv() => {
                    match self.core.reload() {
                        Ok(report) => log_report(&report),
                        Err(e) => error!("Reload failed: {}", e),
                    }
                }
                _ = tick(&mut sync_timer) => {
                    match self.core.sync() {
                        Ok(report) => log_report(&report),
                        Err(e) => error!("Synchronization failed: {}", e),
                    }
                }
            }
        }

        info!("🛑 Shutdown signal received, disabling modules...");
        units::flush_heartbeats(&self.core).await;
        let report = self.core.disable()?;
        log_report(&report);
        info!("✅ Essentials shutdown complete");
        Ok(())
    }

    /// Gives the modules that were built a chance to clean up after an abort.
    fn disable_after_abort(&self) {
        match self.core.disable() {
            Ok(report) => log_report(&report),
            Err(e) => debug!("Nothing to disable: {}", e),
        }
    }
}

async fn tick(timer: &mut Option<tokio::time::Interval>) {
    match timer {
        Some(timer) => {
            timer.tick().await;
        }
        None => pending::<()>().await,
    }
}

fn log_report(report: &PhaseReport) {
    if report.is_clean() {
        info!("{} finished for {} modules", report.phase, report.invoked);
    } else {
        warn!(
            "{} finished for {} modules with {} failures",
            report.phase,
            report.invoked,
            report.failures.len()
        );
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let app = Application::new(args).await?;

    if let Err(e) = app.run().await {
        error!("❌ {:#}", e);
        return Err(e);
    }
    Ok(())
}
