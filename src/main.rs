use std::{error::Error, path::PathBuf, process::ExitCode};

use clap::{Parser, Subcommand};
use voxalign::{
    HeaderLoader, Prescription, RegistrationChain, Session, load_matrix, position_letters,
    prescription::round_to,
};

#[derive(Parser)]
#[command(name = "voxalign")]
#[command(about = "Scanner prescriptions for voxels of interest, carried across sessions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Print the prescription of an image (NIfTI file or DICOM directory)
    Prescription {
        image: PathBuf,
    },

    /// Carry the voxels of interest of a session file into today's session
    Realign {
        session: PathBuf,
    },

    /// Print a world position (mm) as console letters
    #[command(allow_negative_numbers = true)]
    Position {
        x: f64,
        y: f64,
        z: f64,
    },

    /// Combined source world to destination world transform
    Compose {
        /// Image the registration was computed from
        #[arg(short, long)]
        source: PathBuf,

        /// Image the registration was computed to
        #[arg(short, long)]
        destination: PathBuf,

        /// FLIRT matrix, source to destination
        #[arg(short, long)]
        matrix: PathBuf,

        /// Write the result here instead of printing it
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    match run(Cli::parse()) {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(err) => {
            report_error(err.as_ref());
            ExitCode::FAILURE
        }
    }
}

/// `Ok(false)` when some, but not all, work could be done.
fn run(cli: Cli) -> Result<bool, Box<dyn Error>> {
    match cli.command {
        Commands::Prescription { image } => {
            let geometry = HeaderLoader::load(&image)?;
            println!("{}", Prescription::from_geometry(&geometry)?);
        }
        Commands::Realign { session } => {
            let session = Session::from_file(&session)?;
            let mut all_ok = true;
            for outcome in session.run()? {
                match outcome {
                    Ok(outcome) => {
                        println!("== {} ==", outcome.name);
                        println!("PREVIOUS\n{}\n", outcome.previous);
                        println!("TODAY\n{}", outcome.realigned);
                        if let Some(dice) = outcome.overlap {
                            println!("Overlap (Dice): {dice:.2}");
                        }
                        println!();
                    }
                    Err(failure) => {
                        report_error(&failure);
                        all_ok = false;
                    }
                }
            }
            println!("Results written to {}", session.output_dir.display());
            return Ok(all_ok);
        }
        Commands::Position { x, y, z } => {
            println!("{}", position_letters([x, y, z].map(|v| round_to(v, 1))));
        }
        Commands::Compose { source, destination, matrix, output } => {
            let source = HeaderLoader::load(&source)?;
            let destination = HeaderLoader::load(&destination)?;
            let registration = load_matrix(&matrix)?;
            let chain = RegistrationChain::new(&source, &destination, &registration)?;
            match output {
                Some(path) => chain.source_to_destination().save_matrix(&path)?,
                None => print!("{}", chain.source_to_destination().to_matrix_text()),
            }
        }
    }
    Ok(true)
}

fn report_error(err: &dyn Error) {
    eprintln!("error: {err}");
    let mut source = err.source();
    while let Some(cause) = source {
        eprintln!("  caused by: {cause}");
        source = cause.source();
    }
}
