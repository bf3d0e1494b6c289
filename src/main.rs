use std::fs::File;
use std::io::{self, BufReader, BufWriter, Read, Write};
use std::path::PathBuf;

use clap::Parser;
use tracing::info;

use gulsample::config::{RunMetadata, SamplerConfig};
use gulsample::error::Result;
use gulsample::index::ItemIndex;
use gulsample::records::{CorrelationRecord, CoverageTivRecord, ItemRecord, read_table};
use gulsample::sampler::GulSampler;
use gulsample::stream::{CdfStreamReader, GulStreamWriter};

#[derive(Parser, Debug)]
#[command(name = "gulsample")]
#[command(about = "Sample ground-up losses for every item exposed to each event in a damage-CDF stream")]
struct Cli {
    /// Item table (item_id, coverage_id, areaperil_id, vulnerability_id, group_id)
    #[arg(long)]
    items: PathBuf,

    /// Coverage TIV table, one value per coverage id starting at 1
    #[arg(long)]
    coverages: PathBuf,

    /// Optional item correlation table (item_id, peril_correlation_group, correlation_value)
    #[arg(long)]
    correlations: Option<PathBuf>,

    /// Damage-CDF stream, or `-` for stdin
    #[arg(long, default_value = "-")]
    cdf: String,

    /// JSON sampler configuration; defaults apply to missing fields
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    seed: Option<i64>,

    #[arg(long)]
    samples: Option<usize>,

    /// 0 = Mersenne-Twister, 1 = Latin-Hypercube
    #[arg(long)]
    generator: Option<i64>,

    /// GUL stream output, or `-` for stdout
    #[arg(long, default_value = "-")]
    output: String,

    /// Run metadata JSON; defaults to `<output>.meta.json` when writing to a file
    #[arg(long)]
    meta: Option<PathBuf>,
}

fn main() -> Result<()> {
    gulsample::init_logging();
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => SamplerConfig::load(path)?,
        None => SamplerConfig::canonical(),
    }
    .with_overrides(cli.seed, cli.samples, cli.generator);
    config.validate()?;

    let metadata = config.metadata();
    info!(
        base_seed = metadata.base_seed,
        samples = metadata.sample_size,
        random_generator = metadata.random_generator,
        inv_cdf_grid = ?metadata.inv_cdf_grid,
        cdf_grid = ?metadata.cdf_grid,
        loss_float_bytes = metadata.loss_float_bytes,
        "Run metadata"
    );
    let meta_path = match (&cli.meta, cli.output.as_str()) {
        (Some(path), _) => Some(path.clone()),
        (None, "-") => None,
        (None, path) => Some(RunMetadata::sidecar_path(path)),
    };
    if let Some(path) = &meta_path {
        metadata.write_to(path)?;
        info!(path = %path.display(), "Wrote run metadata");
    }

    let items: Vec<ItemRecord> = read_table(&cli.items)?;
    let coverages: Vec<CoverageTivRecord> = read_table(&cli.coverages)?;
    let correlations: Vec<CorrelationRecord> = match &cli.correlations {
        Some(path) => read_table(path)?,
        None => Vec::new(),
    };
    info!(
        items = items.len(),
        coverages = coverages.len(),
        correlations = correlations.len(),
        "Loaded input tables"
    );

    let index = ItemIndex::build(&items, &coverages, &correlations)?;
    let mut sampler = GulSampler::new(&config, index)?;

    let input: Box<dyn Read> = match cli.cdf.as_str() {
        "-" => Box::new(io::stdin().lock()),
        path => Box::new(File::open(path)?),
    };
    let output: Box<dyn Write> = match cli.output.as_str() {
        "-" => Box::new(io::stdout().lock()),
        path => Box::new(File::create(path)?),
    };

    let mut cdfs = CdfStreamReader::new(BufReader::new(input))?;
    let mut writer = GulStreamWriter::new(BufWriter::new(output), config.sample_size)?;

    let mut events = 0usize;
    let mut blocks = 0usize;
    while let Some((event_id, records)) = cdfs.next_event()? {
        for block in sampler.sample_event(event_id, &records)? {
            writer.write_block(&block)?;
            blocks += 1;
        }
        events += 1;
    }
    writer.flush()?;

    info!(events, blocks, samples = config.sample_size, "Sampling complete");
    Ok(())
}
