use env_logger::Env;
use log::{error, info};
use plate_gate::config::{Config, SightingBackend};
use plate_gate::db::SqliteSightingStore;
use plate_gate::pipeline::{Controller, LogRenderer};
use plate_gate::recognizer::{HttpRecognizer, Recognizer, ReportedTextRecognizer};
use plate_gate::recorder::SightingRecorder;
use plate_gate::registry::JsonRegistry;
use plate_gate::sightings::{JsonSightingStore, SightingStore};
use plate_gate::tracker::IouTracker;
use plate_gate::webhook;
use std::process;
use std::sync::mpsc::sync_channel;
use std::thread;

fn build_controller(config: &Config) -> Result<Controller, failure::Error> {
    let store: Box<dyn SightingStore> = match &config.sighting_store {
        SightingBackend::Json(path) => Box::new(JsonSightingStore::new(path)),
        SightingBackend::Sqlite(path) => {
            std::fs::create_dir_all(&config.unauthorized_path)?;
            Box::new(SqliteSightingStore::open(path)?)
        }
    };
    let recognizer: Box<dyn Recognizer> = match &config.recognizer_url {
        Some(url) => {
            info!("Reading plates through {}", url);
            Box::new(HttpRecognizer::new(url.clone(), config.recognizer_token.clone()))
        }
        None => {
            info!("Using plate readings reported by the detector");
            Box::new(ReportedTextRecognizer)
        }
    };
    Ok(Controller::new(
        recognizer,
        Box::new(IouTracker::default()),
        Box::new(JsonRegistry::new(&config.license_data_path)),
        SightingRecorder::new(store, &config.unauthorized_path),
        Box::new(LogRenderer),
    )
    .vehicle_classes(config.vehicle_classes.clone())
    .recognize_budget(config.recognize_timeout))
}

fn main() {
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();
    info!("Starting plate-gate");

    let config = match Config::from_env() {
        Ok(c) => c,
        Err(e) => {
            error!("Invalid configuration: {}", e);
            process::exit(1);
        }
    };
    let controller = match build_controller(&config) {
        Ok(c) => c,
        Err(e) => {
            error!("Unable to set up pipeline: {}", e);
            process::exit(1);
        }
    };

    let (tx, rx) = sync_channel(config.queue_depth);
    let worker = match thread::Builder::new()
        .name("pipeline".to_string())
        .spawn(move || controller.run(rx))
    {
        Ok(handle) => handle,
        Err(e) => {
            error!("Unable to start pipeline worker: {}", e);
            process::exit(1);
        }
    };

    // The controller and its blocking HTTP client live on the worker
    // thread, outside the runtime.
    let port = config.webhook_port;
    let served = tokio::runtime::Runtime::new()
        .map(move |mut runtime| runtime.block_on(webhook::run(tx, port)));
    if let Err(e) = served {
        error!("Unable to start runtime: {}", e);
    }

    if worker.join().is_err() {
        error!("Pipeline worker panicked");
    }
    info!("Exiting main");
}
