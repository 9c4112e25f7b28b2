use std::error::Error;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use candle_core::{DType, Device};
use candle_nn::{VarBuilder, VarMap};
use nnue_trainer::export::export_to_path;
use nnue_trainer::network::{Network, Snapshot};
use nnue_trainer::state_dict::StateDict;
use nnue_trainer::Format;

use crate::args::DumpArgs;

pub fn run(args: &DumpArgs) -> Result<(), Box<dyn Error>> {
    log::info!("Loading checkpoint {}", args.checkpoint.display());
    let snapshot = match args.json {
        true => load_state_dict(&args.checkpoint, args.format)?,
        false => load_checkpoint(&args.checkpoint, args.format)?,
    };

    export_to_path(&args.output, &snapshot, &args.format.quantization())?;

    log::info!("Model written to {}", args.output.display());
    Ok(())
}

fn load_checkpoint(path: &Path, format: Format) -> Result<Snapshot, Box<dyn Error>> {
    let mut varmap = VarMap::new();
    let vs = VarBuilder::from_varmap(&varmap, DType::F32, &Device::Cpu);
    let network = Network::new(&vs, format.architecture())?;

    varmap.load(path)?;

    Ok(Snapshot::from_network(&network)?)
}

fn load_state_dict(path: &Path, format: Format) -> Result<Snapshot, Box<dyn Error>> {
    let reader = BufReader::new(File::open(path)?);
    Ok(StateDict::from_reader(reader)?.into_snapshot(format)?)
}
