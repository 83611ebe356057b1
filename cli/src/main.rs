use anyhow::{Context, Result};
use clap::Parser;
use colored::*;
use log::info;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

use loadgen_core::utils::{init_logger, level_for};
use loadgen_core::{
    ConsoleSink, GeneratorConfig, HttpIssuer, LoadGenerator, RunSummary, WaitMode,
};

#[derive(Parser, Debug)]
#[command(
    name = "loadgen",
    version,
    about = "Self-regulating HTTP load generator",
    override_usage = "loadgen <target>  <options>",
    after_help = "\x1b[1;36mEXAMPLES:\x1b[0m
  Default pacing (50 req/s):      loadgen http://localhost:8080/health
  Higher rate, tighter ceiling:   loadgen http://localhost:8080/ -r 400 -m 200
  Recompute pacing each cycle:    loadgen http://localhost:8080/ -r 400 --recompute-wait
  Timed run with JSON summary:    loadgen http://localhost:8080/ -d 30 -o summary.json
  Through a proxy with a header:  loadgen http://target/ --proxy http://127.0.0.1:8080 -H \"X-Run: 7\"
  From a config file:             loadgen -c run.json
  Dry-run:                        loadgen http://localhost:8080/ --dry-run"
)]
pub struct Args {
    #[arg(required_unless_present = "config")]
    pub target: Option<String>,

    #[arg(short = 'c', long, help = "JSON config file; command-line flags override its values")]
    pub config: Option<PathBuf>,

    #[arg(short = 'b', long, help = "Control cycles per second [default: 20]")]
    pub batches_per_second: Option<u32>,

    #[arg(short = 'r', long, help = "Desired steady-state requests per second [default: 50]")]
    pub rate: Option<u32>,

    #[arg(short = 'm', long, help = "Ceiling on outstanding requests [default: 1000]")]
    pub max_outstanding: Option<usize>,

    #[arg(long, help = "Share of the desired rate restored per recovery step [default: 0.05]")]
    pub recovery_fraction: Option<f64>,

    #[arg(long, help = "Multiplier applied to the rate when overloaded [default: 0.95]")]
    pub throttle_factor: Option<f64>,

    #[arg(long, help = "Recompute the pause between cycles from the current rate")]
    pub recompute_wait: bool,

    #[arg(long, help = "Request timeout in seconds [default: 10]")]
    pub timeout: Option<u64>,

    #[arg(long, help = "Proxy URL (e.g. http://127.0.0.1:8080)")]
    pub proxy: Option<String>,

    #[arg(short = 'H', long = "header", help = "Custom header (e.g. \"Authorization: Bearer TOKEN\")")]
    pub headers: Vec<String>,

    #[arg(long, help = "Milliseconds between counter refreshes [default: 500]")]
    pub report_interval: Option<u64>,

    #[arg(short = 'o', long, help = "Write the final summary as JSON to this path")]
    pub output: Option<String>,

    #[arg(short = 'd', long, help = "Stop after this many seconds instead of waiting for Ctrl-C")]
    pub duration: Option<u64>,

    #[arg(short = 'v', long, default_value_t = false, help = "Log rate adjustments (Verbose Mode)")]
    pub verbose: bool,

    #[arg(long, help = "Validate the configuration without sending requests")]
    pub dry_run: bool,
}

#[tokio::main]
async fn main() {
    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    print_banner();

    let args = Args::parse();

    if let Err(e) = run(args).await {
        eprint!("{}\r\n", format!("[!] {:#}", e).red());
        process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = resolve_config(&args)?;

    init_logger(level_for(config.verbose)).context("Failed to initialize logger")?;
    config.validate()?;

    print_run_config(&config);

    if config.dry_run {
        println!("[DRY RUN] Would generate load against: {}", config.target);
        return Ok(());
    }

    let issuer = Arc::new(HttpIssuer::from_config(&config).context("Failed to build HTTP client")?);
    info!("Issuing GET {}", issuer.target());
    let sink = ConsoleSink::new_ref();
    let generator = LoadGenerator::from_config(&config, issuer)?
        .with_reporter(sink.clone(), config.report_interval());

    let shutdown = CancellationToken::new();
    watch_for_stop(shutdown.clone(), config.duration);

    print!(
        "\r\n{}\r\n",
        "[*] Generating load... press Ctrl-C to stop".bright_cyan().bold()
    );
    std::io::stdout().flush().ok();

    let summary = generator.run(shutdown).await;
    sink.finish();

    print_summary(&summary);

    if let Some(ref path) = config.output {
        summary
            .save(Path::new(path))
            .with_context(|| format!("Failed to write summary to '{}'", path))?;
        info!("Summary written to {}", path);
        print!("{}\r\n", format!("[+] Summary saved to {}", path).green());
    }

    Ok(())
}

/// Builds the run configuration: config file (or defaults), then flags on top.
fn resolve_config(args: &Args) -> Result<GeneratorConfig> {
    let mut config = match args.config {
        Some(ref path) => GeneratorConfig::from_file(path)
            .with_context(|| format!("Failed to read config file '{}'", path.display()))?,
        None => GeneratorConfig::default(),
    };

    if let Some(ref target) = args.target {
        config.target = target.clone();
    }
    if let Some(value) = args.batches_per_second {
        config.batches_per_second = value;
    }
    if let Some(value) = args.rate {
        config.desired_rate = value;
    }
    if let Some(value) = args.max_outstanding {
        config.max_outstanding = value;
    }
    if let Some(value) = args.recovery_fraction {
        config.recovery_fraction = value;
    }
    if let Some(value) = args.throttle_factor {
        config.throttle_factor = value;
    }
    if args.recompute_wait {
        config.wait_mode = WaitMode::Recompute;
    }
    if let Some(value) = args.timeout {
        config.timeout = value;
    }
    if let Some(ref proxy) = args.proxy {
        config.proxy = proxy.clone();
    }
    if !args.headers.is_empty() {
        let mut headers = config.header_list();
        headers.extend(args.headers.iter().cloned());
        config.headers = headers.join("; ");
    }
    if let Some(value) = args.report_interval {
        config.report_interval_ms = value;
    }
    if args.output.is_some() {
        config.output = args.output.clone();
    }
    if args.duration.is_some() {
        config.duration = args.duration;
    }
    config.verbose |= args.verbose;
    config.dry_run |= args.dry_run;

    Ok(config)
}

/// Cancels `shutdown` on Ctrl-C, or once `duration` seconds have passed.
fn watch_for_stop(shutdown: CancellationToken, duration: Option<u64>) {
    let on_signal = shutdown.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            on_signal.cancel();
        }
    });

    if let Some(secs) = duration {
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_secs(secs)).await;
            shutdown.cancel();
        });
    }
}

/// Prints the loadgen banner.
fn print_banner() {
    let banner = r#"
   _                 _
  | | ___   __ _  __| | __ _  ___ _ __
  | |/ _ \ / _` |/ _` |/ _` |/ _ \ '_ \
  | | (_) | (_| | (_| | (_| |  __/ | | |
  |_|\___/ \__,_|\__,_|\__, |\___|_| |_|
                       |___/
    "#;
    print!("{}\r\n", banner.bright_cyan().bold());
    print!("{}\r\n", "──────────────────────────────────────────────────".dimmed());
    std::io::stdout().flush().ok();
}

/// Prints the effective configuration before the run starts.
fn print_run_config(config: &GeneratorConfig) {
    let wait_label = match config.wait_mode {
        WaitMode::Fixed => "Fixed (computed once)",
        WaitMode::Recompute => "Recomputed every cycle",
    };

    print!("{}\r\n", format!("[+] Target:          {}", config.target).green().bold());
    print!("{}\r\n", format!("[+] Rate:            {} req/s", config.desired_rate).blue());
    print!("{}\r\n", format!("[+] Batches:         {} per second", config.batches_per_second).blue());
    print!("{}\r\n", format!("[+] Max Outstanding: {}", config.max_outstanding).blue());
    print!(
        "{}\r\n",
        format!(
            "[+] Tuning:          recover {:.0}% / throttle x{}",
            config.recovery_fraction * 100.0,
            config.throttle_factor
        )
        .magenta()
    );
    print!("{}\r\n", format!("[+] Pacing:          {}", wait_label).magenta());
    print!("{}\r\n", format!("[+] Timeout:         {}s", config.timeout).blue());
    if let Some(proxy) = config.proxy_ref() {
        print!("{}\r\n", format!("[+] Proxy:           {}", proxy).yellow());
    }
    let headers = config.header_list();
    if !headers.is_empty() {
        print!("{}\r\n", format!("[+] Headers:         {} custom", headers.len()).yellow());
    }
    if let Some(secs) = config.duration {
        print!("{}\r\n", format!("[+] Duration:        {}s", secs).yellow());
    }
    print!("{}\r\n", "──────────────────────────────────────────────────".dimmed());
    std::io::stdout().flush().ok();
}

/// Prints the final counters and rate after the generator stops.
fn print_summary(summary: &RunSummary) {
    print!("\r\n{}\r\n", "[+] Run complete".green().bold());
    for line in summary.snapshot.render_lines() {
        print!("    {}\r\n", line);
    }
    print!(
        "{}\r\n",
        format!(
            "[+] {} cycle(s) in {:.1}s, final rate {} of {} req/s",
            summary.cycles, summary.elapsed_seconds, summary.final_rate, summary.desired_rate
        )
        .blue()
    );
    std::io::stdout().flush().ok();
}
