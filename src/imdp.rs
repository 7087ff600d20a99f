use std::fs::File;
use std::io::Write;
use std::process;

use clap::{clap_app, ArgMatches};
use petgraph::dot::Dot;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use imdp_lump::config::{read_options_json, Options};
use imdp_lump::error::{ImdpError, Result};
use imdp_lump::lump::lump;
use imdp_lump::model_checking::value_iteration::{solve, Objective};
use imdp_lump::{read_imdp_json, Model};

fn main() {
    let matches = clap_app!(imdp =>
        (version: "0.1")
        (author: "Thomas Robinson")
        (about: "Interval MDP value iteration and bisimulation lumping")
        (@arg VERBOSE: -v --verbose +multiple "Raise the log level, -v debug, -vv trace. RUST_LOG overrides")
        (@subcommand solve =>
            (about: "Reachability probabilities or expected rewards for every state")
            (@arg MODEL: +required "IMDP model json, e.g.
            {
              \"num_states\": 3,
              \"initial\": 0,
              \"choices\": [
                {\"s\": 0, \"a\": \"go\", \"reward\": 1.0,
                 \"s_prime\": [{\"s\": 1, \"lower\": 0.2, \"upper\": 0.6}, {\"s\": 2, \"lower\": 0.4, \"upper\": 0.8}]},
                {\"s\": 2, \"a\": \"stay\", \"s_prime\": [{\"s\": 2, \"lower\": 1.0, \"upper\": 1.0}]}
              ],
              \"target\": [1]
            }
            ")
            (@arg CONFIG: -c --config +takes_value "Options json")
            (@arg METHOD: -m --method +takes_value "jacobi or gauss-seidel")
            (@arg TOLERANCE: -e --tolerance +takes_value "Convergence tolerance")
            (@arg MIN: --min "Minimise over choices")
            (@arg STEPS: -k --steps +takes_value "Bounded reachability within this many steps")
            (@arg REWARDS: --rewards "Expected cumulative choice reward until a target state")
            (@arg LUMP: --lump "Solve on the bisimulation quotient")
            (@arg OUTPUT: -o --output +takes_value "State,value csv, stdout if absent")
        )
        (@subcommand lump =>
            (about: "Coarsest interval bisimulation of the model")
            (@arg MODEL: +required "IMDP model json")
            (@arg CONFIG: -c --config +takes_value "Options json")
            (@arg SPLIT: -s --split +takes_value "simple, signature or pseudo-signature")
            (@arg OUTPUT: -o --output +takes_value "State,block csv, stdout if absent")
            (@arg DOT: --dot +takes_value "Write the quotient as graphviz dot")
        )
    )
    .get_matches();

    let level = match matches.occurrences_of("VERBOSE") {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level)))
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let result = match matches.subcommand() {
        ("solve", Some(m)) => run_solve(m),
        ("lump", Some(m)) => run_lump(m),
        _ => {
            eprintln!("{}", matches.usage());
            process::exit(2);
        }
    };
    if let Err(e) = result {
        error!("{}", e);
        process::exit(1);
    }
}

fn load(m: &ArgMatches) -> Result<(Model, Options)> {
    let mut options = match m.value_of("CONFIG") {
        Some(path) => read_options_json(path)?,
        None => Options::default(),
    };
    if let Some(method) = m.value_of("METHOD") {
        options.iteration_method = method.parse()?;
    }
    if let Some(tolerance) = m.value_of("TOLERANCE") {
        options.tolerance = tolerance
            .parse()
            .map_err(|_| ImdpError::invalid_model(format!("tolerance '{}' is not a number", tolerance)))?;
    }
    if let Some(split) = m.value_of("SPLIT") {
        options.lump.split_block = split.parse()?;
    }
    options.validate()?;
    let path = m.value_of("MODEL").unwrap_or_default();
    let model = read_imdp_json(path)?;
    let stats = model.graph.statistics();
    info!(
        path,
        states = stats.num_states,
        choices = stats.num_choices,
        transitions = stats.num_transitions,
        "model loaded"
    );
    Ok((model, options))
}

fn output(m: &ArgMatches) -> Result<csv::Writer<Box<dyn Write>>> {
    let out: Box<dyn Write> = match m.value_of("OUTPUT") {
        Some(path) => Box::new(File::create(path)?),
        None => Box::new(std::io::stdout()),
    };
    Ok(csv::Writer::from_writer(out))
}

fn run_solve(m: &ArgMatches) -> Result<()> {
    let (model, options) = load(m)?;
    let min = m.is_present("MIN");
    let objective = if m.is_present("REWARDS") {
        Objective::UnboundedCumulativeReward { rewards: model.rewards.clone(), sinks: model.target.clone(), min }
    } else if let Some(steps) = m.value_of("STEPS") {
        let steps = steps
            .parse()
            .map_err(|_| ImdpError::invalid_model(format!("steps '{}' is not a number", steps)))?;
        Objective::BoundedReachability { target: model.target.clone(), steps, min }
    } else {
        Objective::UnboundedReachability { target: model.target.clone(), zero: Vec::new(), min }
    };
    let values = if m.is_present("LUMP") {
        let lumped = lump(&model.graph, &objective, &options)?;
        let solution = solve(&lumped.quotient, &lumped.objective, &options)?;
        lumped.quotient_to_original(&solution.values)
    } else {
        solve(&model.graph, &objective, &options)?.values
    };
    info!(state = model.initial, value = values[model.initial], "initial state");
    let mut wtr = output(m)?;
    wtr.write_record(&["state", "value"])?;
    for (state, value) in values.iter().enumerate() {
        wtr.serialize((state, value))?;
    }
    wtr.flush()?;
    Ok(())
}

fn run_lump(m: &ArgMatches) -> Result<()> {
    let (model, options) = load(m)?;
    let objective = if model.target.iter().any(|t| *t) {
        Objective::UnboundedReachability { target: model.target.clone(), zero: Vec::new(), min: false }
    } else {
        Objective::Lump { partition: vec![0; model.graph.num_states] }
    };
    let result = lump(&model.graph, &objective, &options)?;
    let stats = result.quotient.statistics();
    info!(
        blocks = result.num_blocks(),
        choices = stats.num_choices,
        transitions = stats.num_transitions,
        "quotient built"
    );
    let mut wtr = output(m)?;
    wtr.write_record(&["state", "block"])?;
    for (state, block) in result.state_to_block.iter().enumerate() {
        wtr.serialize((state, block))?;
    }
    wtr.flush()?;
    if let Some(path) = m.value_of("DOT") {
        let g = result.quotient.to_graph();
        let dot = format!("{}", Dot::new(&g));
        let mut file = File::create(path)?;
        file.write_all(dot.as_bytes())?;
    }
    Ok(())
}
