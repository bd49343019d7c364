use std::process::ExitCode;

use log::{error, info};

use noshow::common::config::{load_dotenv, AppCfg};
use noshow::common::log as logging;
use noshow::data::FsRecordSource;
use noshow::{tracking, training, NoShowResult};

fn main() -> ExitCode {
    logging::init();
    info!("doctor cancellation prediction launched");
    match launch() {
        Ok(()) => {
            info!("done");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!("{err}");
            ExitCode::from(err.code() as u8)
        }
    }
}

fn launch() -> NoShowResult<()> {
    if let Some(path) = load_dotenv()? {
        info!("environment file: {}", path.display());
    }
    let cfg = AppCfg::load()?;
    info!("tracking URI: {}", cfg.tracking_uri);
    let mut tracker = tracking::open(&cfg.tracking_target()?)?;
    let source = FsRecordSource::new(&cfg.data_path);

    let report = training::run(&cfg, &source, &mut *tracker)?;
    info!("first prediction: [{}]", report.first_prediction);
    info!(
        "registered {} version {} from run {}",
        report.model_version.registry_name, report.model_version.version, report.run.run_id
    );
    Ok(())
}
