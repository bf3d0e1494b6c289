use std::fs::{self, File};
use std::io::BufWriter;
use std::path::PathBuf;

use clap::Parser;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;
use tracing::info;

use gulsample::error::Result;
use gulsample::records::write_table;
use gulsample::stream::CdfStreamWriter;
use gulsample::synthetic::{EventSetShape, PortfolioShape, generate_events, generate_portfolio};

#[derive(Parser, Debug)]
#[command(name = "demo_inputs")]
#[command(about = "Write a seeded synthetic item table, coverage table, correlation table and damage-CDF stream")]
struct Cli {
    /// Output directory
    #[arg(long, default_value = "demo")]
    dir: PathBuf,

    #[arg(long, default_value = "42")]
    seed: u64,

    /// Number of locations; each carries one item per coverage type
    #[arg(long, default_value = "1000")]
    locations: usize,

    #[arg(long, default_value = "100")]
    events: usize,

    #[arg(long, default_value = "10")]
    bins: usize,
}

fn main() -> Result<()> {
    gulsample::init_logging();
    let cli = Cli::parse();
    fs::create_dir_all(&cli.dir)?;

    let mut rng = ChaCha20Rng::seed_from_u64(cli.seed);
    let portfolio = generate_portfolio(&PortfolioShape { locations: cli.locations, ..PortfolioShape::default() }, &mut rng)?;
    let shape = EventSetShape { events: cli.events, bins: cli.bins, ..EventSetShape::default() };
    let records = generate_events(&portfolio, &shape, &mut rng)?;

    write_table(cli.dir.join("items.bin"), &portfolio.items)?;
    write_table(cli.dir.join("coverages.bin"), &portfolio.coverages)?;
    write_table(cli.dir.join("correlations.bin"), &portfolio.correlations)?;

    let mut writer = CdfStreamWriter::new(BufWriter::new(File::create(cli.dir.join("cdf.bin"))?))?;
    for rec in &records {
        writer.write(rec)?;
    }
    writer.flush()?;

    info!(
        dir = %cli.dir.display(),
        items = portfolio.items.len(),
        correlated = portfolio.correlations.len(),
        events = cli.events,
        cdfs = records.len(),
        "Wrote demo inputs"
    );
    Ok(())
}
