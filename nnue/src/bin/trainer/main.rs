mod args;
mod bench;
mod checkpoint;
mod dataset;
mod dump;
mod training;
mod utils;

use std::error::Error;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use args::{Args, Command, TrainArgs};
use clap::Parser;
use dataset::Dataset;
use log::LevelFilter;
use simplelog::{Config, SimpleLogger};
use training::Trainer;

fn main() -> Result<(), Box<dyn Error>> {
    let args = init()?;

    match args.command {
        Command::Train(args) => train(&args),
        Command::Dump(args) => dump::run(&args),
    }
}

fn train(args: &TrainArgs) -> Result<(), Box<dyn Error>> {
    // Finish the current epoch on SIGINT instead of dropping it
    let stop_flag = Arc::new(AtomicBool::new(false));
    let stop_flag_handler = Arc::clone(&stop_flag);

    ctrlc::set_handler(move || {
        log::info!("Received SIGINT, stopping after this epoch...");
        stop_flag_handler.store(true, Ordering::Relaxed);
    })?;

    let mut dataset = Dataset::load(args)?;
    let mut trainer = Trainer::new(args, stop_flag)?;

    trainer.train(&mut dataset)?;

    log::info!("Done!");
    Ok(())
}

fn init() -> Result<Args, Box<dyn Error>> {
    let args = Args::parse();

    SimpleLogger::init(LevelFilter::Info, Config::default())?;

    Ok(args)
}
