use clap::Parser;
use log::{error, info};
use std::fs::OpenOptions;
use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use ufs::{FileDisk, FileSystem, ImageBuilder};

/// Build a unix file system image
#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// image file to create
    image: PathBuf,
    /// size of the volume in blocks
    nblocks: u32,
    /// number of i-nodes
    ninodes: u32,
    /// host files or directories copied into the root directory
    inputs: Vec<PathBuf>,
    /// overwrite an existing image
    #[arg(short, long)]
    force: bool,
}

fn build(args: &Args) -> ufs::Result<()> {
    let mut builder = ImageBuilder::new(args.nblocks, args.ninodes)?;
    let mut root = builder.root();
    for input in &args.inputs {
        builder.add_host_path(&mut root, input)?;
    }
    builder.finish_dir(root)?;
    let image = builder.finish();

    let mut file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .create_new(!args.force)
        .open(&args.image)?;
    file.write_all(&image)?;
    file.sync_all()?;
    drop(file);

    // the freshly written image has to pass the same checks a mount does
    let mut fs = FileSystem::mount(Arc::new(FileDisk::open(&args.image)?))?;
    let free = fs.free_block_count()?;
    info!("{}: {free} free blocks", args.image.display());
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();
    match build(&args) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("mkufs: {e}");
            ExitCode::FAILURE
        }
    }
}
