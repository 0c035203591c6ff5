use std::fs;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::Parser;
use memory::{HostFileSystem, ObjectMemory};
use tracing::info;
use vm::bootstrap::ImageBuilder;
use vm::{HeadlessHal, Interpreter};

/// A blue-book Smalltalk-80 virtual machine, headless.
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Directory holding the snapshot and the image's files
    #[arg(long, short = 'd')]
    directory: PathBuf,

    /// Snapshot file name within the directory
    #[arg(long, short = 'i', default_value = "snapshot.im")]
    image: String,

    /// Bytecodes interpreted per frame
    #[arg(long, default_value_t = 5500)]
    cycles: u32,

    /// Stop after this many frames; zero runs until the image quits
    #[arg(long, default_value_t = 0)]
    frames: u64,

    /// Write a freshly bootstrapped kernel image and run it
    #[arg(long)]
    demo: bool,
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let image_path = cli.directory.join(&cli.image);
    if cli.demo {
        let image = ImageBuilder::new().build();
        fs::create_dir_all(&cli.directory).with_context(|| {
            format!("creating image directory {}", cli.directory.display())
        })?;
        fs::write(&image_path, image).with_context(|| {
            format!("writing demo image {}", image_path.display())
        })?;
        info!(image = %image_path.display(), "demo image written");
    }

    let file = fs::File::open(&image_path).with_context(|| {
        format!("opening snapshot {}", image_path.display())
    })?;
    let memory = ObjectMemory::load_snapshot(&mut BufReader::new(file))
        .context("loading snapshot")?;

    let hal = HeadlessHal::new(cli.image.clone());
    let fs_root = HostFileSystem::new(&cli.directory);
    let mut interpreter = Interpreter::new(memory, hal, fs_root);
    let signals = interpreter.signal_buffer();
    interpreter.hal.attach_signals(signals);
    interpreter.boot();
    info!(image = %image_path.display(), "interpreting");

    let mut frame: u64 = 0;
    while !interpreter.hal.quit_signalled {
        interpreter.hal.check_scheduled_semaphore();
        interpreter.check_low_memory_conditions();
        for _ in 0..cli.cycles {
            interpreter.cycle();
            if interpreter.hal.quit_signalled {
                break;
            }
        }
        frame += 1;
        if cli.frames != 0 && frame >= cli.frames {
            break;
        }
    }
    info!(frames = frame, "run loop finished");
    Ok(())
}
