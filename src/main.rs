use clap::Parser;
use ndproxyd::config;
use ndproxyd::daemon::Daemon;
use ndproxyd::telemetry::init_logging;
use std::path::PathBuf;
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "ndproxyd")]
#[command(about = "IPv6 Neighbor Discovery proxy daemon", version)]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, default_value = "/etc/ndproxyd.toml")]
    config: PathBuf,

    /// Fork into the background
    #[arg(short, long)]
    daemon: bool,

    /// Write the daemon PID to this file
    #[arg(short, long)]
    pidfile: Option<PathBuf>,

    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn main() {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    if let Err(e) = run(&cli) {
        error!("{}", e);
        std::process::exit(1);
    }
}

fn run(cli: &Cli) -> ndproxyd::Result<()> {
    info!(config = %cli.config.display(), "ndproxyd starting");

    let cfg = config::load(&cli.config)?;
    let validation = config::validate(&cfg);
    validation.log_diagnostics();
    if validation.has_errors() {
        return Err(ndproxyd::Error::Config("configuration is invalid".into()));
    }

    if cli.daemon {
        daemonize()?;
    }

    if let Some(pidfile) = &cli.pidfile {
        std::fs::write(pidfile, format!("{}\n", std::process::id()))?;
    }

    // one thread; every handler runs serially between socket polls
    let rt = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    rt.block_on(async {
        let daemon = Daemon::from_config(&cfg)?;
        daemon.run().await
    })
}

/// fork, detach from the session, drop stdio; the parent exits
fn daemonize() -> ndproxyd::Result<()> {
    let pid = unsafe { libc::fork() };
    if pid < 0 {
        return Err(std::io::Error::last_os_error().into());
    }
    if pid > 0 {
        std::process::exit(0);
    }

    if unsafe { libc::setsid() } < 0 {
        return Err(std::io::Error::last_os_error().into());
    }

    unsafe {
        libc::close(libc::STDIN_FILENO);
        libc::close(libc::STDOUT_FILENO);
        libc::close(libc::STDERR_FILENO);
    }

    Ok(())
}
