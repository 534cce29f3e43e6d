use clap::Parser;
use miette::{IntoDiagnostic, Result};
use photokiosk::application::orchestrator::{Devices, Orchestrator, SessionSettings};
use photokiosk::application::print_monitor::{MonitorPolicy, PrintService};
use photokiosk::application::watchdog::Watchdog;
use photokiosk::config::KioskConfig;
use photokiosk::domain::ports::{PagePreparerBox, SharedLedDriver, SpoolerBackendBox};
use photokiosk::error::KioskError;
use photokiosk::infrastructure::aplay::AplayChime;
use photokiosk::infrastructure::cups::CupsSpooler;
use photokiosk::infrastructure::gphoto::GphotoCamera;
use photokiosk::infrastructure::imagemagick::ImageMagickPage;
use photokiosk::infrastructure::in_memory::{
    CopyPage, InMemorySpooler, SilentChime, SimulatedCamera, SimulatedGateway,
};
use photokiosk::infrastructure::leds::{LoggingLeds, SysfsPwmLeds};
use photokiosk::infrastructure::sumup::SumUpGateway;
use photokiosk::interfaces::buttons::{self, ButtonSource};
use photokiosk::interfaces::metrics_http;
use photokiosk::metrics::KioskMetrics;
use prometheus::Registry;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[derive(Parser)]
#[command(
    name = "photokiosk",
    author,
    version,
    about = "Unattended photo kiosk",
    long_about = None
)]
struct Cli {
    /// Configuration file
    #[arg(short, long, env = "KIOSK_CONFIG", default_value = "config.json")]
    config: PathBuf,

    /// Skip payment, whatever the config file says
    #[arg(long)]
    demo: bool,

    /// Use simulated camera, printer, LEDs and card reader
    #[arg(long)]
    simulate: bool,

    /// Read button presses from this FIFO instead of stdin
    #[arg(long)]
    buttons: Option<PathBuf>,

    /// Log level, used when RUST_LOG is unset
    #[arg(long, env = "KIOSK_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable JSON logging
    #[arg(long, env = "KIOSK_LOG_JSON")]
    json: bool,

    /// Metrics listen address, overriding the config file
    #[arg(long)]
    metrics_addr: Option<SocketAddr>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(&cli);

    let mut config = KioskConfig::load(&cli.config).into_diagnostic()?;
    config.demo_mode |= cli.demo;
    if let Some(addr) = cli.metrics_addr {
        config.metrics.listen = addr;
    }

    let registry = Arc::new(Registry::new());
    let metrics = KioskMetrics::new(&registry).into_diagnostic()?;

    let devices = if cli.simulate {
        info!("running against simulated devices");
        simulated_devices(&config, &metrics)
    } else {
        hardware_devices(&config, &metrics)
    }
    .into_diagnostic()?;

    let orchestrator = Orchestrator::new(devices, SessionSettings::from_config(&config), metrics);
    orchestrator.start().await;

    let watchdog = Watchdog::from_timing(&config.timing).spawn(Arc::clone(&orchestrator));

    let (stop_tx, mut stop_rx) = tokio::sync::watch::channel(false);
    let listener = metrics_http::bind(config.metrics.listen)
        .await
        .into_diagnostic()?;
    let metrics_server = tokio::spawn(metrics_http::serve(listener, registry, async move {
        let _ = stop_rx.changed().await;
    }));

    let (sender, presses) = buttons::channel(16);
    let source = cli.buttons.map_or(ButtonSource::Stdin, ButtonSource::Path);
    let input = source.spawn(sender);

    orchestrator.run(presses, shutdown_signal()).await;

    watchdog.abort();
    input.abort();
    let input_result = match input.await {
        Ok(result) => result.into_diagnostic(),
        Err(e) if e.is_cancelled() => Ok(()),
        Err(e) => Err(miette::miette!("button input task panicked: {e}")),
    };
    if let Err(e) = &input_result {
        error!(error = %e, "button input failed");
    }

    let _ = stop_tx.send(true);
    match metrics_server.await {
        Ok(Err(e)) => error!(error = %e, "metrics endpoint failed"),
        Err(e) => error!(error = %e, "metrics endpoint task panicked"),
        Ok(Ok(())) => {}
    }
    info!("bye");
    input_result
}

fn init_tracing(cli: &Cli) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| cli.log_level.clone().into());

    if cli.json {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer().json())
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_subscriber::fmt::layer())
            .init();
    }
}

fn print_service(
    config: &KioskConfig,
    backend: SpoolerBackendBox,
    page: PagePreparerBox,
    metrics: &KioskMetrics,
) -> Result<PrintService, KioskError> {
    PrintService::new(
        backend,
        page,
        MonitorPolicy::from(&config.printer),
        config.printer.job_title.clone(),
        &config.photos_dir,
        &config.archive_dir,
        metrics.clone(),
    )
}

fn hardware_devices(config: &KioskConfig, metrics: &KioskMetrics) -> Result<Devices, KioskError> {
    let leds: SharedLedDriver = match &config.leds {
        Some(leds) => Arc::new(SysfsPwmLeds::open(leds)?),
        None => {
            warn!("no LED wiring configured, button colors are only logged");
            Arc::new(LoggingLeds)
        }
    };
    Ok(Devices {
        gateway: Arc::new(SumUpGateway::from_config(config)?),
        camera: Arc::new(GphotoCamera::new(&config.camera, &config.photos_dir)?),
        printer: Arc::new(print_service(
            config,
            Box::new(CupsSpooler::new(&config.printer)?),
            Box::new(ImageMagickPage::new(&config.printer)),
            metrics,
        )?),
        leds,
        chime: Arc::new(AplayChime::new(&config.chime)),
    })
}

fn simulated_devices(config: &KioskConfig, metrics: &KioskMetrics) -> Result<Devices, KioskError> {
    Ok(Devices {
        gateway: Arc::new(SimulatedGateway::approving_after(2)),
        camera: Arc::new(
            SimulatedCamera::new(config.camera.max_photos).writing_to(&config.photos_dir),
        ),
        printer: Arc::new(print_service(
            config,
            Box::new(InMemorySpooler::new()),
            Box::new(CopyPage),
            metrics,
        )?),
        leds: Arc::new(LoggingLeds),
        chime: Arc::new(SilentChime::new()),
    })
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("received Ctrl+C, shutting down"),
        _ = terminate => info!("received terminate signal, shutting down"),
    }
}
