//! pexmesh command-line interface.
//!
//! Run extraction jobs from TOML configuration files:
//! ```sh
//! pexmesh-cli run job.toml
//! pexmesh-cli validate job.toml
//! pexmesh-cli materials
//! ```

mod config;
mod runner;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use pexmesh_materials::{MaterialLibrary, MaterialProvider};

#[derive(Parser)]
#[command(name = "pexmesh-cli")]
#[command(about = "pexmesh: interconnect meshing and stiffness assembly")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an extraction from a TOML configuration file.
    Run {
        /// Path to the job configuration file.
        config: PathBuf,
        /// Output directory (overrides config file setting).
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Mesh and mark a job without assembling any matrix.
    Validate {
        /// Path to the job configuration file.
        config: PathBuf,
    },
    /// List the built-in materials.
    Materials,
}

fn main() -> anyhow::Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Run { config, output } => {
            println!("pexmesh extraction");
            println!("==================");
            let job = config::load_config(&config)?;
            println!("Configuration: {}", config.display());

            let system = runner::run_extraction(&job)?;

            let out_dir = output.unwrap_or_else(|| PathBuf::from(&job.output.directory));
            runner::write_outputs(&system, &job, &out_dir)?;

            println!("Extraction complete.");
            Ok(())
        }
        Commands::Validate { config } => {
            let job = config::load_config(&config)?;
            runner::validate_job(&job)?;
            println!("Configuration is valid: {}", config.display());
            Ok(())
        }
        Commands::Materials => {
            println!("Available materials:");
            println!();
            println!("  {:<8} {:<28} {:>12} {:>6}", "name", "description", "sigma (S/m)", "eps_r");
            for m in MaterialLibrary::builtin().iter() {
                println!(
                    "  {:<8} {:<28} {:>12.3e} {:>6.2}",
                    m.name(),
                    m.description(),
                    m.conductivity(),
                    m.relative_permittivity()
                );
            }
            Ok(())
        }
    }
}
