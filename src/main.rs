use std::process::exit;
use std::thread;

use argh::FromArgs;

use lora_linktest::config;
use lora_linktest::device::run_sweep;
use lora_linktest::gateway::run_collector;
use lora_linktest::radio::LoopbackRadio;
use lora_linktest::report::CsvSink;
use lora_linktest::sweep::SweepDimension;

#[macro_use]
extern crate nolog;

const DEFAULT_CONFIG_DIR: &str = ".";
const DEFAULT_RESULT_FILE: &str = "results.csv";

#[derive(FromArgs)]
#[argh(description = "Characterize a LoRa link by sweeping one PHY parameter")]
struct Args {
    #[argh(option, short = 'c')]
    #[argh(description = "directory holding the configuration files")]
    #[argh(default = "DEFAULT_CONFIG_DIR.to_string()")]
    config_dir: String,

    #[argh(option, short = 'r')]
    #[argh(description = "path of the CSV result file")]
    #[argh(default = "DEFAULT_RESULT_FILE.to_string()")]
    result_file: String,

    #[argh(option, short = 'd')]
    #[argh(description = "sweep dimension overriding the configured one")]
    dimension: Option<String>,

    #[argh(option, short = 'm')]
    #[argh(description = "messages per setting overriding the configured count")]
    messages: Option<u8>,
}

fn main() {
    let args: Args = argh::from_env();

    let mut config = match config::load(&args.config_dir) {
        Ok(config) => config,
        Err(error) => {
            error!("Invalid configuration: {}", error);
            exit(1);
        }
    };

    if let Some(token) = args.dimension {
        config.dimension = match token.parse::<SweepDimension>() {
            Ok(dimension) => dimension,
            Err(error) => {
                error!("{}", error);
                exit(1);
            }
        };
    }
    if let Some(messages) = args.messages {
        if messages == 0 {
            error!("At least one message per setting is required.");
            exit(1);
        }
        config.messages_per_setting = messages;
    }

    let mut sink = match CsvSink::create(&args.result_file) {
        Ok(sink) => sink,
        Err(error) => {
            error!("Cannot open {}: {}", args.result_file, error);
            exit(1);
        }
    };

    info!(
        "Sweeping {} with {} messages per setting as {}.",
        config.dimension, config.messages_per_setting, config.identity
    );

    let (mut device_radio, mut gateway_radio) = LoopbackRadio::pair();
    let identity = config.identity;
    let plan = config.plan();

    let gateway = thread::spawn(move || run_collector(&mut gateway_radio, &identity, &mut sink));

    let summary = run_sweep(&mut device_radio, plan, &config.identity).unwrap();
    let rows = gateway.join().unwrap().unwrap();

    info!(
        "Sweep done: {} frames sent, {} of {} settings recorded into {}.",
        summary.frames_sent, rows, summary.settings_completed, args.result_file
    );
}
