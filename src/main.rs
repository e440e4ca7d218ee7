use std::process::exit;

use clap::App;
use tokio::sync::watch;

use sensorlogd::config::Configuration;
use sensorlogd::daemon::run;

fn main() {
    let cli_yaml = clap::load_yaml!("cli.yml");
    let matches = App::from(cli_yaml).get_matches();
    let configuration_path = matches.value_of("config").unwrap_or("resources/sensorlogd.yml");
    let log_configuration_path = matches.value_of("log-config").unwrap_or("resources/log.yml");

    match log4rs::init_file(log_configuration_path, Default::default()) {
        Ok(_) => {},
        Err(err) => {
            eprintln!("Could not create logger from yaml configuration: {}", err);
            exit(-100);
        }
    };

    let configuration = match Configuration::load(configuration_path) {
        Ok(configuration) => configuration,
        Err(err) => {
            log::error!(target: "sensorlogd", "{}", err);
            exit(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(err) => {
            log::error!(target: "sensorlogd", "Cannot start the async runtime: \'{}\'", err);
            exit(2);
        }
    };

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    match ctrlc::set_handler(move || {
        log::info!(target: "sensorlogd", "Termination signal received!");
        let _ = shutdown_tx.send(true);
    }) {
        Ok(_) => {},
        Err(err) => {
            log::error!(target: "sensorlogd", "Cannot install the termination handler: \'{}\'", err);
            exit(3);
        }
    };

    let code = runtime.block_on(run(configuration, shutdown_rx));

    log::info!(target: "sensorlogd", "Exiting");
    exit(code);
}
