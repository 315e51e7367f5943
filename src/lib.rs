// Prism - Environmental Noise Survey Analysis
// Module declarations

use std::path::PathBuf;
use std::sync::Arc;

pub mod classifier;
pub mod commands;
pub mod config;
pub mod measurement;
pub mod pipeline;
pub mod residual;
pub mod spectrum;
pub mod state;
pub mod sync;
pub mod timeline;

use commands::{CommandResult, Session};
use config::AnalysisConfig;
use pipeline::{FanoutSink, LogSink, TraceSink, TraceWriter};

const USAGE: &str = "usage: prism <project-folder> [config.json]";

/// Command line entry point. Returns the process exit code.
pub fn run() -> i32 {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info"))
        .format_timestamp_millis()
        .init();

    let mut args = std::env::args().skip(1);
    let Some(folder) = args.next().map(PathBuf::from) else {
        eprintln!("{}", USAGE);
        return 1;
    };
    let config_path = args.next().map(PathBuf::from);

    match analyze(folder, config_path) {
        Ok(json) => {
            println!("{}", json);
            0
        }
        Err(e) => {
            log::error!("{}", e.message());
            1
        }
    }
}

fn analyze(folder: PathBuf, config_path: Option<PathBuf>) -> CommandResult<String> {
    let config = match config_path {
        Some(path) => AnalysisConfig::load(&path)?,
        None => AnalysisConfig::default(),
    };

    let mut session = Session::new(config);
    let sink = session_sink(&session);
    session = session.with_sink(sink);

    let report = commands::analyze_project(&mut session, &folder)?;
    Ok(serde_json::to_string_pretty(&report)?)
}

/// Log output plus the session's JSONL trace when the data directory is usable
fn session_sink(session: &Session) -> Arc<dyn TraceSink> {
    let writer = state::storage::get_app_data_dir()
        .and_then(|dir| state::storage::trace_path(&dir, &session.id()))
        .map_err(|e| e.to_string())
        .and_then(|path| TraceWriter::open(path).map_err(|e| e.to_string()));

    match writer {
        Ok(writer) => {
            log::info!("Trace: {}", writer.path().display());
            Arc::new(FanoutSink::new(vec![
                Arc::new(LogSink) as Arc<dyn TraceSink>,
                Arc::new(writer) as Arc<dyn TraceSink>,
            ]))
        }
        Err(e) => {
            log::warn!("No trace file for this session: {}", e);
            Arc::new(LogSink)
        }
    }
}
