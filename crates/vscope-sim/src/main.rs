use anyhow::Context as _;
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use std::path::PathBuf;
use vscope_context::ContextConfig;
use vscope_sim::{run_simulator, SimulatorConfig};

fn cli() -> Command {
    Command::new("vscope-sim")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Scope lifecycle simulator")
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Emit logs as JSON"),
        )
        .subcommand(
            Command::new("simulate")
                .about("Serve a seeded request mix and check scope isolation")
                .arg(
                    Arg::new("requests")
                        .long("requests")
                        .default_value("1000")
                        .value_parser(value_parser!(u64))
                        .help("Number of requests to serve"),
                )
                .arg(
                    Arg::new("sessions")
                        .long("sessions")
                        .default_value("8")
                        .value_parser(value_parser!(usize))
                        .help("Number of user sessions"),
                )
                .arg(
                    Arg::new("workers")
                        .long("workers")
                        .default_value("4")
                        .value_parser(value_parser!(usize))
                        .help("Concurrent request workers"),
                )
                .arg(
                    Arg::new("conversation-every")
                        .long("conversation-every")
                        .default_value("3")
                        .value_parser(value_parser!(u32))
                        .help("One request in N runs inside a conversation (0 disables)"),
                )
                .arg(
                    Arg::new("invalidate-every")
                        .long("invalidate-every")
                        .default_value("50")
                        .value_parser(value_parser!(u32))
                        .help("One request in N ends its session (0 disables)"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .default_value("42")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("stop-on-violation")
                        .long("stop-on-violation")
                        .action(ArgAction::SetTrue)
                        .help("Stop simulation on first violation"),
                )
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("Context configuration (TOML)"),
                )
                .arg(
                    Arg::new("report-json")
                        .long("report-json")
                        .action(ArgAction::SetTrue)
                        .help("Print the report as JSON"),
                ),
        )
        .subcommand(
            Command::new("config")
                .about("Print the effective context configuration as TOML")
                .arg(
                    Arg::new("file")
                        .long("file")
                        .value_parser(value_parser!(PathBuf))
                        .help("Configuration file to load and validate"),
                ),
        )
}

fn init_tracing(json: bool) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,vscope_context=warn".into());
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

fn load_context(path: Option<&PathBuf>) -> anyhow::Result<ContextConfig> {
    match path {
        Some(path) => ContextConfig::load(path)
            .with_context(|| format!("loading context configuration from {}", path.display())),
        None => Ok(ContextConfig::default()),
    }
}

fn simulator_config(args: &ArgMatches) -> anyhow::Result<SimulatorConfig> {
    let value = |name: &str| -> anyhow::Result<u64> {
        args.get_one::<u64>(name)
            .copied()
            .with_context(|| format!("missing --{name}"))
    };
    let count = |name: &str| -> anyhow::Result<usize> {
        args.get_one::<usize>(name)
            .copied()
            .with_context(|| format!("missing --{name}"))
    };
    let every = |name: &str| -> anyhow::Result<u32> {
        args.get_one::<u32>(name)
            .copied()
            .with_context(|| format!("missing --{name}"))
    };

    Ok(SimulatorConfig {
        seed: value("seed")?,
        sessions: count("sessions")?,
        requests: value("requests")?,
        workers: count("workers")?,
        conversation_every: every("conversation-every")?,
        invalidate_every: every("invalidate-every")?,
        stop_on_first_violation: args.get_flag("stop-on-violation"),
        context: load_context(args.get_one::<PathBuf>("config"))?,
    })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json"));

    match matches.subcommand() {
        Some(("simulate", args)) => {
            let config = simulator_config(args)?;

            println!("Running vscope simulator...");
            println!("Requests: {}", config.requests);
            println!("Sessions: {}", config.sessions);
            println!("Workers: {}", config.workers);
            println!("Seed: {}", config.seed);
            println!();

            let report = run_simulator(config).await;
            if args.get_flag("report-json") {
                println!("{}", report.to_json()?);
            } else {
                println!("{}", report.generate_text());
            }

            std::process::exit(if report.passed() { 0 } else { 1 });
        }
        Some(("config", args)) => {
            let config = load_context(args.get_one::<PathBuf>("file"))?;
            print!("{}", toml::to_string_pretty(&config)?);
        }
        _ => {
            cli().print_help()?;
            println!();
        }
    }
    Ok(())
}
