//! `mctune` command line

use anyhow::{bail, Context, Result};
use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};
use mctune_core::{MctsSearch, SearchConfig, TracingSink};
use mctune_graph::{ConstraintGenerator, ExpandableGraph};
use mctune_space::SearchSpace;
use mctune_strategy::ProcessEvaluator;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

fn space_args(command: Command) -> Command {
    command
        .arg(
            Arg::new("space")
                .long("space")
                .required(true)
                .action(ArgAction::Append)
                .value_parser(value_parser!(PathBuf))
                .help("Search-space JSON document; repeat to merge several"),
        )
        .arg(
            Arg::new("start")
                .long("start")
                .required(true)
                .help("Fully qualified name of the start component"),
        )
}

fn cli() -> Command {
    Command::new("mctune")
        .version(mctune_core::VERSION)
        .about("Monte-Carlo tree search over component configurations")
        .subcommand_required(true)
        .arg(
            Arg::new("json")
                .long("json")
                .global(true)
                .action(ArgAction::SetTrue)
                .help("Log as JSON lines"),
        )
        .subcommand(
            space_args(Command::new("search").about("Search for the best configuration"))
                .arg(
                    Arg::new("config")
                        .long("config")
                        .value_parser(value_parser!(PathBuf))
                        .help("TOML search configuration"),
                )
                .arg(
                    Arg::new("timeout")
                        .long("timeout")
                        .value_parser(value_parser!(f64))
                        .help("Overall search timeout in seconds"),
                )
                .arg(
                    Arg::new("seed")
                        .long("seed")
                        .value_parser(value_parser!(u64))
                        .help("Random seed for reproducibility"),
                )
                .arg(
                    Arg::new("random-selection")
                        .long("random-selection")
                        .action(ArgAction::SetTrue)
                        .help("Select uniformly at random instead of by node value"),
                )
                .arg(
                    Arg::new("evaluator-cmd")
                        .long("evaluator-cmd")
                        .required(true)
                        .help("Command scoring the configuration JSON read from stdin"),
                ),
        )
        .subcommand(
            space_args(Command::new("inspect").about("Survey the structural search graph")).arg(
                Arg::new("depth")
                    .long("depth")
                    .default_value("8")
                    .value_parser(value_parser!(usize))
                    .help("Maximum expansion depth"),
            ),
        )
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

fn load_space(args: &ArgMatches) -> Result<Arc<SearchSpace>> {
    let paths: Vec<&PathBuf> = args.get_many::<PathBuf>("space").into_iter().flatten().collect();
    let space = SearchSpace::from_json_files(paths).context("failed to load search space")?;
    info!(components = space.len(), "search space loaded");
    Ok(Arc::new(space))
}

fn required<'a>(args: &'a ArgMatches, name: &str) -> Result<&'a String> {
    args.get_one::<String>(name)
        .with_context(|| format!("missing --{name}"))
}

async fn search(args: &ArgMatches) -> Result<()> {
    let space = load_space(args)?;
    let start = required(args, "start")?;

    let mut config = match args.get_one::<PathBuf>("config") {
        Some(path) => SearchConfig::from_file(path)
            .with_context(|| format!("failed to load {}", path.display()))?,
        None => SearchConfig::default(),
    };
    if let Some(secs) = args.get_one::<f64>("timeout") {
        let timeout = Duration::try_from_secs_f64(*secs).context("invalid --timeout")?;
        config = config.with_search_timeout(timeout);
    }
    if let Some(seed) = args.get_one::<u64>("seed") {
        config = config.with_seed(*seed);
    }
    if args.get_flag("random-selection") {
        config = config.with_random_selection(true);
    }

    let command = required(args, "evaluator-cmd")?;
    let Some(evaluator) = ProcessEvaluator::from_command_line(command) else {
        bail!("--evaluator-cmd must not be empty");
    };

    let search = MctsSearch::builder(space, start.as_str(), Arc::new(evaluator))
        .with_config(config)
        .with_sink(Arc::new(TracingSink))
        .build()
        .context("failed to set up search")?;
    let search = Arc::new(search);

    let stop = search.stop_signal().clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("interrupted, stopping search");
            stop.raise();
        }
    });

    let solution = search.run().await.context("search failed")?;
    println!("{}", serde_json::to_string_pretty(&solution)?);
    Ok(())
}

fn inspect(args: &ArgMatches) -> Result<()> {
    let space = load_space(args)?;
    let start = required(args, "start")?;
    let depth = args.get_one::<usize>("depth").copied().unwrap_or(8);

    let generator = ConstraintGenerator::new(space);
    let root = generator.root(start).context("failed to create root")?;
    let graph = ExpandableGraph::new(generator, root);
    let survey = graph.survey(depth);
    println!("{}", serde_json::to_string_pretty(&survey)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let matches = cli().get_matches();
    init_tracing(matches.get_flag("json"));

    match matches.subcommand() {
        Some(("search", args)) => search(args).await,
        Some(("inspect", args)) => inspect(args),
        _ => Ok(()),
    }
}
