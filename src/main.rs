use clap::Parser;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use pulse_diagnostics::config::{CliArgs, DiagnosticsConfig};
use pulse_diagnostics::console::ConsoleDriver;
use pulse_diagnostics::report::export::write_report;
use pulse_diagnostics::report::HostDeviceInfo;
use pulse_diagnostics::settings::{load_settings, save_settings, settings_path};
use pulse_diagnostics::suite::catalogue::{standard_suite, HardwareProfile, STANDARD_CHECKS};
use pulse_diagnostics::suite::engine::{DiagnosticEngine, SharedEngine};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = CliArgs::parse();
    let config = DiagnosticsConfig::from_args(args);
    let _log_guard = init_tracing(&config)?;

    info!("Starting pulse-diagnostics v{}", env!("CARGO_PKG_VERSION"));
    info!("Output dir: {:?}", config.output_dir);
    info!("Settings dir: {:?}", config.settings_dir);

    for id in &config.unsupported {
        if !STANDARD_CHECKS.iter().any(|c| c.id == id.as_str()) {
            warn!("--unsupported {} does not name a known check", id);
        }
    }

    let engine: SharedEngine = Arc::new(
        DiagnosticEngine::new(HostDeviceInfo).with_confirm_timeout(config.confirm_timeout),
    );
    let profile = HardwareProfile::new(config.unsupported.iter().cloned());
    for test in standard_suite(&profile, config.category) {
        engine.add_test(test).await?;
    }

    let stdin = tokio::io::BufReader::new(tokio::io::stdin());
    let mut console = ConsoleDriver::new(stdin, tokio::io::stdout());

    if config.list_only {
        console.show_catalogue(&engine).await?;
        return Ok(());
    }

    let settings_file = settings_path(&config);
    let mut settings = load_settings(&settings_file);
    if !settings.has_completed_onboarding {
        console.show_onboarding().await?;
        settings.has_completed_onboarding = true;
        save_settings(&settings_file, &settings);
    }

    tokio::select! {
        result = console.run_suite(&engine) => result?,
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, writing a partial report");
            if let Some(test_id) = engine.cancel_run().await {
                info!("Abandoned {}", test_id);
            }
        }
    }

    let report = engine.generate_report().await;
    let written = write_report(&report, &config.output_dir, config.format)?;
    console.show_summary(&report, &written).await?;
    if config.show_trace {
        console.show_event_trace(&engine).await?;
    }

    info!("pulse-diagnostics finished");
    Ok(())
}

fn init_tracing(config: &DiagnosticsConfig) -> anyhow::Result<Option<WorkerGuard>> {
    // Logs go to stderr so prompts on stdout stay readable.
    let filter = || {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| "pulse_diagnostics=info".into())
    };
    let stderr_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    let Some(path) = &config.log_file else {
        tracing_subscriber::registry()
            .with(filter())
            .with(stderr_layer)
            .init();
        return Ok(None);
    };

    let dir = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Log file path has no file name: {:?}", path))?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(dir, file_name));

    tracing_subscriber::registry()
        .with(filter())
        .with(stderr_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer),
        )
        .init();
    Ok(Some(guard))
}
