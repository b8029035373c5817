use std::path::PathBuf;
use std::time::Instant;

use anyhow::{Context, Result};
use clap::Parser;
use log::{error, info, Level};

use gtf_splice_sites::{
    derive_splice_sites_from_table, splice_site_paths, write_annotation_table, write_end_sites,
    write_start_sites, AnnotationLoader, AttributeKeys, TableFormat,
};

/// Convert a GTF annotation into a columnar table and, optionally, splice site tables.
#[derive(Parser, Debug)]
#[command(name = "process-gtf")]
#[command(author, version, about)]
struct Cli {
    /// Input GTF (.gtf or .gtf.gz), local path or http(s) URL
    #[arg(long)]
    gtf_path: String,

    /// Output annotation table (.feather or .parquet)
    #[arg(long)]
    output_path: PathBuf,

    /// Base path for splice site tables; writes <base>_starts and <base>_ends
    #[arg(long)]
    splice_sites_output_path: Option<PathBuf>,

    /// Attribute keys to use for gene ID (repeatable).
    /// Default (GTF-safe): gene_id
    #[arg(
        long = "gene-id-key",
        value_name = "KEY",
        num_args = 1..,
        default_values_t = vec!["gene_id".to_string()]
    )]
    gene_id_keys: Vec<String>,

    /// Attribute keys to use for transcript ID (repeatable).
    /// Default (GTF-safe): transcript_id
    #[arg(
        long = "transcript-id-key",
        value_name = "KEY",
        num_args = 1..,
        default_values_t = vec!["transcript_id".to_string()]
    )]
    transcript_id_keys: Vec<String>,

    /// Extra attributes to keep as table columns, e.g. gene_name (repeatable)
    #[arg(long = "attribute", value_name = "KEY", num_args = 1..)]
    attributes: Vec<String>,

    /// Keep every GTF attribute as a column, after any --attribute columns
    #[arg(long)]
    all_attributes: bool,

    /// Log level (error, warn, info, debug, trace)
    #[arg(long, default_value_t = Level::Info)]
    log_level: Level,
}

fn run(cli: Cli) -> Result<()> {
    // fail before reading anything if the output cannot be written
    TableFormat::from_path(&cli.output_path)
        .with_context(|| format!("checking output path {}", cli.output_path.display()))?;

    let loader = AnnotationLoader::with_keys(AttributeKeys {
        gene_id_keys: cli.gene_id_keys,
        transcript_id_keys: cli.transcript_id_keys,
        extra_attributes: cli.attributes,
        all_attributes: cli.all_attributes,
    });

    info!("Reading GTF from {}", cli.gtf_path);
    let table = loader.load(&cli.gtf_path)?;

    // derived before any write so a malformed transcript leaves no partial output
    let splice_sites = match &cli.splice_sites_output_path {
        Some(_) => {
            info!("Generating splice sites from GTF");
            let sites = derive_splice_sites_from_table(&table)
                .with_context(|| format!("deriving splice sites from {}", cli.gtf_path))?;
            info!("{}", sites.to_string().trim_end());
            Some(sites)
        }
        None => None,
    };

    info!("Writing GTF to {}", cli.output_path.display());
    write_annotation_table(&table, &cli.output_path)
        .with_context(|| format!("writing {}", cli.output_path.display()))?;

    if let (Some(base), Some(sites)) = (&cli.splice_sites_output_path, splice_sites) {
        let (starts_path, ends_path) = splice_site_paths(base);

        info!("Writing start splice sites to {}", starts_path.display());
        write_start_sites(&sites.start_sites(), &starts_path)
            .with_context(|| format!("writing {}", starts_path.display()))?;

        info!("Writing end splice sites to {}", ends_path.display());
        write_end_sites(&sites.end_sites(), &ends_path)
            .with_context(|| format!("writing {}", ends_path.display()))?;
    }

    Ok(())
}

fn main() {
    let start = Instant::now();
    let cli = Cli::parse();

    if let Err(e) = simple_logger::init_with_level(cli.log_level) {
        eprintln!("failed to initialise logging: {e}");
        std::process::exit(1);
    }

    if let Err(e) = run(cli) {
        error!("{e:#}");
        std::process::exit(1);
    }

    info!("Elapsed time: {:?}", start.elapsed());
}
