use automata_reuse::prelude::*;
use owo_colors::OwoColorize;
use tracing::{debug, info, trace};
use tracing_subscriber::{filter, prelude::*};

use clap::{value_parser, Arg, ArgAction, ArgMatches, Command};

fn cli() -> clap::Command {
    Command::new("reuse-bench")
        .about("Explores a random Mealy machine exhaustively, with and without reuse of system states")
        .arg(
            Arg::new("verbosity")
                .short('v')
                .long("verbosity")
                .num_args(0..=1)
                .require_equals(true)
                .value_parser(["info", "debug", "trace"])
                .default_missing_value("info"),
        )
        .arg(
            Arg::new("states")
                .long("states")
                .value_parser(value_parser!(usize))
                .default_value("8"),
        )
        .arg(
            Arg::new("inputs")
                .long("inputs")
                .help("size of the input alphabet, at most 26")
                .value_parser(value_parser!(u8).range(1..=26))
                .default_value("3"),
        )
        .arg(
            Arg::new("outputs")
                .long("outputs")
                .value_parser(value_parser!(u8).range(1..))
                .default_value("2"),
        )
        .arg(
            Arg::new("min-depth")
                .long("min-depth")
                .value_parser(value_parser!(usize))
                .default_value("1"),
        )
        .arg(
            Arg::new("max-depth")
                .long("max-depth")
                .value_parser(value_parser!(usize))
                .default_value("6"),
        )
        .arg(
            Arg::new("capacity")
                .long("capacity")
                .help("maximum number of saved system states")
                .value_parser(value_parser!(usize)),
        )
        .arg(
            Arg::new("batch")
                .long("batch")
                .value_parser(value_parser!(usize))
                .default_value("32"),
        )
        .arg(
            Arg::new("seed")
                .long("seed")
                .value_parser(value_parser!(u64)),
        )
        .arg(
            Arg::new("perturb")
                .long("perturb")
                .help("check against an independently generated hypothesis instead of the target")
                .action(ArgAction::SetTrue),
        )
}

fn setup_logging(matches: &ArgMatches) {
    let level = match matches
        .try_get_one::<String>("verbosity")
        .ok()
        .flatten()
        .map(|m| m.as_str())
    {
        Some("trace") => filter::LevelFilter::TRACE,
        Some("debug") => filter::LevelFilter::DEBUG,
        Some("info") => filter::LevelFilter::INFO,
        _ => filter::LevelFilter::WARN,
    };

    let stderr_log = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(stderr_log.with_filter(level))
        .init();

    trace!("setup {level} logging");
}

struct Run {
    label: &'static str,
    stats: ReuseStats,
    resets: usize,
    steps: usize,
    counterexample: Option<Counterexample<char, Vec<u8>>>,
}

fn explore(
    label: &'static str,
    target: &MealyMachine<char, u8>,
    hypothesis: &MealyMachine<char, u8>,
    config: ReuseConfig<u8>,
    (min_depth, max_depth): (usize, usize),
    batch: usize,
) -> Result<Run, ReuseError<SimulatorError, char, u8>> {
    let start = std::time::Instant::now();
    let oracle = ReuseOracle::with_config(MealySimulator::new(target.clone()), config);
    let counterexample = CompleteExploration::with_depths(&oracle, min_depth, max_depth)
        .with_batch_size(batch)
        .find_counterexample(hypothesis, target.alphabet())?;
    let (resets, steps) = (oracle.sut().resets(), oracle.sut().steps());
    let stats = oracle.shutdown();
    info!("exploration {label} took {}ms", start.elapsed().as_millis());
    Ok(Run {
        label,
        stats,
        resets,
        steps,
        counterexample,
    })
}

fn table(runs: &[Run]) -> String {
    let mut builder = tabled::builder::Builder::default();
    builder.push_record([
        "run", "queries", "resets", "steps", "from tree", "resumed", "saved", "evicted", "conflicts",
    ]);
    for run in runs {
        builder.push_record([
            run.label.bold().to_string(),
            run.stats.queries.to_string(),
            run.resets.to_string(),
            run.steps.to_string(),
            run.stats.cache_hits.to_string(),
            run.stats.continued.to_string(),
            run.stats.symbols_saved.to_string(),
            run.stats.evictions.to_string(),
            run.stats.nondeterminism.to_string(),
        ]);
    }
    builder
        .build()
        .with(tabled::settings::Style::rounded())
        .to_string()
}

pub fn main() {
    let matches = cli().get_matches();

    setup_logging(&matches);

    if let Some(seed) = matches.get_one::<u64>("seed") {
        fastrand::seed(*seed);
    }
    let states = *matches.get_one::<usize>("states").expect("has default");
    let inputs: Vec<char> = (0..*matches.get_one::<u8>("inputs").expect("has default"))
        .map(|i| (b'a' + i) as char)
        .collect();
    let outputs: Vec<u8> = (0..*matches.get_one::<u8>("outputs").expect("has default")).collect();
    let depths = (
        *matches.get_one::<usize>("min-depth").expect("has default"),
        *matches.get_one::<usize>("max-depth").expect("has default"),
    );
    let batch = *matches.get_one::<usize>("batch").expect("has default");

    debug!("generating target with {states} states over {inputs:?}");
    let target = MealyMachine::random(states, &inputs, &outputs);
    let hypothesis = if matches.get_flag("perturb") {
        MealyMachine::random(states, &inputs, &outputs)
    } else {
        target.clone()
    };

    let mut config = ReuseConfig::builder();
    if let Some(capacity) = matches.get_one::<usize>("capacity") {
        config = config.max_cached_states(*capacity);
    }

    let runs = [
        ("reset", config.clone().cache_enabled(false).build()),
        ("reuse", config.build()),
    ]
    .into_iter()
    .map(|(label, config)| explore(label, &target, &hypothesis, config, depths, batch))
    .collect::<Result<Vec<_>, _>>();

    let runs = match runs {
        Ok(runs) => runs,
        Err(error) => {
            eprintln!("{} {error}", "exploration failed:".red());
            std::process::exit(1);
        }
    };

    println!("{}", table(&runs));
    match runs.last().and_then(|run| run.counterexample.as_ref()) {
        Some(cex) => println!(
            "{} {:?} produces {:?}",
            "counterexample:".yellow(),
            cex.input,
            cex.output
        ),
        None => println!("{}", "no counterexample within the given depths".green()),
    }
}
