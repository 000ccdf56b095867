use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::{generate, Shell as CompShell};
use owo_colors::OwoColorize;
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use surge::commands::{probe, run};

#[derive(Parser)]
#[command(name = "surge")]
#[command(version = "0.1.0")]
#[command(about = "Controllable concurrent HTTP load generator")]
#[command(long_about = None)]
struct Cli {
    /// Verbose logging on stderr
    #[arg(short = 'v', long = "verbose", global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a load test against a URL
    Run {
        /// Target URL (optional when --plan provides one)
        url: Option<String>,
        /// Run plan file (YAML or JSON)
        #[arg(long = "plan")]
        plan: Option<PathBuf>,
        /// Number of virtual users
        #[arg(short = 'u', long = "users")]
        users: Option<u32>,
        /// Test duration in seconds
        #[arg(short = 'd', long = "duration")]
        duration: Option<u64>,
        /// Ramp-up window in seconds
        #[arg(long = "ramp-up")]
        ramp_up: Option<u64>,
        /// Base delay between requests of one user (e.g. "1s", "250ms")
        #[arg(long = "cadence")]
        cadence: Option<String>,
        /// Aggregate requests per second to aim for
        #[arg(long = "rps")]
        rps: Option<u32>,
        /// Request timeout
        #[arg(long = "timeout")]
        timeout: Option<String>,
        /// Maximum concurrent connections
        #[arg(long = "max-connections")]
        max_connections: Option<usize>,
        /// Report formats (comma-separated: json, html, csv)
        #[arg(long = "report")]
        report: Option<String>,
        /// Report output directory
        #[arg(long = "out")]
        out: Option<PathBuf>,
        /// Progress report interval in CI mode
        #[arg(long = "report-interval", default_value = "5s")]
        report_interval: String,
        /// Fail when the success rate ends below this percentage
        #[arg(long = "min-success-rate")]
        min_success_rate: Option<f64>,
        /// CI mode (no animations, no interactive control)
        #[arg(long = "ci")]
        ci: bool,
    },
    /// Send a single request and show how it is classified
    Probe {
        /// URL to request
        url: String,
        /// Request timeout
        #[arg(long = "timeout")]
        timeout: Option<String>,
    },
    /// Generate shell completions (internal)
    #[command(hide = true)]
    Completions {
        /// Shell: bash, zsh, fish
        shell: String,
    },
    /// Generate man page (internal)
    #[command(hide = true)]
    Man,
}

pub fn print_banner() {
    let banner = r#"
    ███████╗██╗   ██╗██████╗  ██████╗ ███████╗
    ██╔════╝██║   ██║██╔══██╗██╔════╝ ██╔════╝   surge v0.1.0
    ███████╗██║   ██║██████╔╝██║  ███╗█████╗     Controllable HTTP load generator
    ╚════██║██║   ██║██╔══██╗██║   ██║██╔══╝
    ███████║╚██████╔╝██║  ██║╚██████╔╝███████╗
    ╚══════╝ ╚═════╝ ╚═╝  ╚═╝ ╚═════╝ ╚══════╝
"#;

    if atty::is(atty::Stream::Stdout) {
        println!("{}", banner.cyan());
    } else {
        println!("surge v0.1.0 - controllable HTTP load generator");
    }
}

fn init_tracing(verbose: bool) {
    let default_level = if verbose { "surge=debug" } else { "surge=info" };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if matches!(cli.command, Commands::Run { .. }) {
        print_banner();
    }

    match cli.command {
        Commands::Run {
            url,
            plan,
            users,
            duration,
            ramp_up,
            cadence,
            rps,
            timeout,
            max_connections,
            report,
            out,
            report_interval,
            min_success_rate,
            ci,
        } => {
            run::handle_run(run::RunOptions {
                url,
                plan,
                users,
                duration,
                ramp_up,
                cadence,
                rps,
                timeout,
                max_connections,
                report,
                out,
                report_interval,
                min_success_rate,
                ci,
            })
            .await?;
        }
        Commands::Probe { url, timeout } => {
            probe::handle_probe(url, timeout).await?;
        }
        Commands::Completions { shell } => {
            let mut cmd = Cli::command();
            let name = cmd.get_name().to_string();
            let sh = match shell.as_str() {
                "bash" => CompShell::Bash,
                "zsh" => CompShell::Zsh,
                "fish" => CompShell::Fish,
                "powershell" | "pwsh" => CompShell::PowerShell,
                "elvish" => CompShell::Elvish,
                other => {
                    eprintln!(
                        "Unsupported shell: {} (use bash|zsh|fish|powershell|elvish)",
                        other
                    );
                    std::process::exit(2);
                }
            };
            generate(sh, &mut cmd, name, &mut std::io::stdout());
        }
        Commands::Man => {
            let cmd = Cli::command();
            let man = clap_mangen::Man::new(cmd);
            man.render(&mut std::io::stdout())?;
        }
    }

    Ok(())
}
