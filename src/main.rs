use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use serde::Deserialize;

use phonebeam_lib::acoustic::AcousticModel;
use phonebeam_lib::decoder::{
    ActiveListConfig, ActiveListFactory, BreadthFirstSearchManager, SearchConfig,
    SimpleAcousticScorer, SimplePruner,
};
use phonebeam_lib::frontend::VecFeatureSource;
use phonebeam_lib::linguist::{AllphoneConfig, AllphoneLinguist};
use phonebeam_lib::{Recognizer, SearchError};

const USAGE: &str = "usage: phonebeam <model.json> <features.json> [--cd] [--config search.json]";

/// Settings file layout. Sections left out fall back to the environment.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct FileConfig {
    search: Option<SearchConfig>,
    active_list: Option<ActiveListConfig>,
    allphone: Option<AllphoneConfig>,
}

struct Args {
    model: PathBuf,
    features: PathBuf,
    context_dependent: bool,
    config: Option<PathBuf>,
}

fn parse_args() -> Option<Args> {
    let mut positional = Vec::new();
    let mut context_dependent = false;
    let mut config = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--cd" => context_dependent = true,
            "--config" => config = Some(PathBuf::from(args.next()?)),
            _ => positional.push(PathBuf::from(arg)),
        }
    }
    let [model, features]: [PathBuf; 2] = positional.try_into().ok()?;
    Some(Args {
        model,
        features,
        context_dependent,
        config,
    })
}

fn load_config(path: Option<&Path>) -> Result<FileConfig, SearchError> {
    match path {
        Some(path) => Ok(serde_json::from_str(&std::fs::read_to_string(path)?)?),
        None => Ok(FileConfig::default()),
    }
}

fn run(args: Args) -> Result<(), SearchError> {
    let file = load_config(args.config.as_deref())?;
    let search = file.search.unwrap_or_else(SearchConfig::from_env);
    let lists = file.active_list.unwrap_or_else(ActiveListConfig::from_env);
    let allphone = match file.allphone {
        Some(config) => config,
        None if args.context_dependent => {
            AllphoneConfig::context_dependent().with_env_overrides()
        }
        None => AllphoneConfig::from_env(),
    };

    let model = Arc::new(AcousticModel::from_json_file(&args.model)?);
    let frames: Vec<Vec<f32>> = serde_json::from_str(&std::fs::read_to_string(&args.features)?)?;
    log::info!("Loaded {} feature frames", frames.len());

    let manager = BreadthFirstSearchManager::new(
        Box::new(AllphoneLinguist::new(model, allphone)),
        Box::new(SimpleAcousticScorer::new(VecFeatureSource::from_frames(frames))),
        Box::new(SimplePruner::new()),
        ActiveListFactory::new(&lists),
        search,
    );
    let mut recognizer = Recognizer::new(Box::new(manager), 64);
    recognizer.allocate()?;
    let result = recognizer.recognize()?;
    recognizer.deallocate();

    match result {
        Some(result) => {
            println!("{}", result.hypothesis());
            for unit in result.timed_best_result(false) {
                println!(
                    "{:<8} {:>5} {:>5} {:>12.3}",
                    unit.label, unit.start_frame, unit.end_frame, unit.score
                );
            }
        }
        None => println!("(no result)"),
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::init();

    let Some(args) = parse_args() else {
        eprintln!("{USAGE}");
        return ExitCode::from(2);
    };
    match run(args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{err}");
            eprintln!("{}", err.user_message());
            ExitCode::FAILURE
        }
    }
}
