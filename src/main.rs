use std::{env, io};

use log::{error, info};

use multitask_bert::{
    config::TrainConfig,
    observer::LogObserver,
    trainer::{MultitaskTrainer, run_test},
};

fn main() -> io::Result<()> {
    env_logger::init();

    let config = match env::args().nth(1) {
        Some(path) => TrainConfig::from_file(path),
        None => {
            info!("no configuration file given, using defaults");
            Ok(TrainConfig::default())
        }
    };

    let result = config.and_then(|config| {
        let mut trainer = MultitaskTrainer::from_config(config.clone())?;
        let best = trainer.train(&mut LogObserver::new(config.log_every))?;
        info!("training done, best dev aggregate :: {best:.3}");

        run_test(&config).map(|_| ())
    });

    if let Err(e) = &result {
        error!("{e}");
    }

    result.map_err(io::Error::from)
}
