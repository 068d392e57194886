//! Command line interface of the `call` sub command.

use std::{path::PathBuf, sync::Arc};

use clap::Parser;

use super::{output::write_calls, Collaborators, Pipeline};
use crate::{
    collab::{
        IdentityExtender, KmerAligner, OverlapSupportChecker, PileupAssembler, ReferenceGenome,
        ReferenceHomologySlider,
    },
    common::{io::expand_path_list, region::GenomicRegion, trace_rss_now},
    conf::CallerConf,
    err::AppError,
    junctions::{filter_by_regions, group_junctions, load_all_junctions},
    reads::table::InMemoryReadSource,
};

/// Command line arguments for `call` sub command.
#[derive(Parser, Debug)]
#[command(about = "Assemble around junctions and call structural variants", long_about = None)]
pub struct Args {
    /// Path to the tab-separated read table.
    #[arg(long)]
    pub path_reads: PathBuf,
    /// Path to the reference FASTA file.
    #[arg(long)]
    pub path_reference: PathBuf,
    /// Junction files, prefix with `@` to file with line-wise paths.
    #[arg(long, required = true, num_args = 1..)]
    pub path_junctions: Vec<String>,
    /// Path to output TSV file.
    #[arg(long)]
    pub path_output: PathBuf,
    /// Optional TOML file with caller configuration.
    #[arg(long)]
    pub path_conf: Option<PathBuf>,

    /// Number of worker threads, overrides the configuration.
    #[arg(long)]
    pub threads: Option<usize>,
    /// Radius of the read window around junctions, overrides the configuration.
    #[arg(long)]
    pub junction_buffer: Option<i64>,
    /// Minimal event size to call, overrides the configuration.
    #[arg(long)]
    pub min_event_size: Option<usize>,
    /// Restrict to junctions in the given regions, e.g., `chr1:1,000-2,000`.
    #[arg(long)]
    pub region: Vec<GenomicRegion>,
}

impl Args {
    /// Configuration from `path_conf` with the command line overrides.
    pub fn conf(&self) -> Result<CallerConf, anyhow::Error> {
        let mut conf = match &self.path_conf {
            Some(path) => CallerConf::from_path(path)?,
            None => CallerConf::default(),
        };
        if let Some(threads) = self.threads {
            conf.threads = threads;
        }
        if let Some(junction_buffer) = self.junction_buffer {
            conf.junction_buffer = junction_buffer;
        }
        if let Some(min_event_size) = self.min_event_size {
            conf.min_event_size = min_event_size;
        }
        conf.validate()?;
        Ok(conf)
    }
}

/// Main entry point for the `call` command.
pub fn run(common_args: &crate::common::Args, args: &Args) -> Result<(), anyhow::Error> {
    tracing::info!("Starting `call`");
    tracing::info!("  common_args = {:?}", &common_args);
    tracing::info!("  args = {:?}", &args);

    let conf = args.conf()?;
    tracing::debug!("  conf = {:?}", &conf);

    let junction_paths = expand_path_list(&args.path_junctions)?;
    tracing::debug!(
        "final junction file list is (#: {}): {:?}",
        junction_paths.len(),
        &junction_paths
    );
    let junctions = filter_by_regions(load_all_junctions(&junction_paths)?, &args.region);
    if junctions.is_empty() {
        return Err(AppError::NoJunctions.into());
    }
    let groups = group_junctions(&junctions, conf.junction_buffer, conf.max_junctions_per_group);
    tracing::info!("{} junctions in {} groups", junctions.len(), groups.len());

    let reads = InMemoryReadSource::from_path(&args.path_reads)?;
    let genome = Arc::new(ReferenceGenome::from_path(&args.path_reference)?);
    let aligner = KmerAligner::new(genome.as_ref(), conf.aligner_kmer_size)?;
    trace_rss_now();

    let collab = Collaborators {
        reads: Box::new(reads),
        assembler: Box::new(PileupAssembler::new(&conf)),
        extender: Box::new(IdentityExtender),
        checker: Box::new(OverlapSupportChecker::new(conf.support_max_mismatch_rate)),
        aligner: Box::new(aligner),
        slider: Box::new(ReferenceHomologySlider::new(genome)),
    };
    let output = Pipeline::new(conf, collab).run(groups)?;

    write_calls(&args.path_output, &output.calls)?;
    tracing::info!("... done");

    Ok(())
}
