//! Orchestration of the assembly and calling stages.
//!
//! Primary assembly runs on a pool of worker threads draining a shared
//! queue of junction groups.  All later stages are order-preserving
//! parallel maps on a `rayon` thread pool and run strictly one after the
//! other.

pub mod cli;
pub mod output;

use std::time::Instant;

use crossbeam_queue::SegQueue;
use indexmap::IndexSet;
use rayon::prelude::*;
use thousands::Separable;

use crate::{
    assembly::{
        consolidate::{consolidate, ConsolidationStats},
        phasing::{merge_phase_set, primary_phase_sets, secondary_phase_sets, PhasedMergeStats},
        AlignedAssembly, Erratum, ExtendedAssembly, GappedAssembly, PrimaryAssembly,
    },
    caller::{call_variants, VariantCall},
    collab::{Aligner, Extender, HomologySlider, PrimaryAssembler, ReadSource, SupportChecker},
    common::{cmp_locus, trace_rss_now},
    conf::CallerConf,
    dedup::{dedup, DedupStats},
    junctions::JunctionGroup,
};

/// Number of errata logged in full at the end of a run.
pub const MAX_REPORTED_ERRATA: usize = 20;

/// The collaborators used by the pipeline.
pub struct Collaborators {
    pub reads: Box<dyn ReadSource>,
    pub assembler: Box<dyn PrimaryAssembler>,
    pub extender: Box<dyn Extender>,
    pub checker: Box<dyn SupportChecker>,
    pub aligner: Box<dyn Aligner>,
    pub slider: Box<dyn HomologySlider>,
}

/// Counters of one pipeline run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub junction_groups: usize,
    pub primary_assemblies: usize,
    pub consolidation: ConsolidationStats,
    pub consolidated_assemblies: usize,
    pub extended_assemblies: usize,
    pub primary_phase_sets: usize,
    pub phased_merge: PhasedMergeStats,
    pub gapped_assemblies: usize,
    pub aligned_assemblies: usize,
    pub raw_calls: usize,
    pub dedup: DedupStats,
    pub calls: usize,
}

/// Result of one pipeline run.
#[derive(Debug, Default)]
pub struct RunOutput {
    /// Deduplicated calls sorted by locus.
    pub calls: Vec<VariantCall>,
    /// Errata of all surviving assemblies and of dropped items.
    pub errata: Vec<Erratum>,
    pub stats: RunStats,
}

/// Runs all stages over the junction groups.
pub struct Pipeline {
    conf: CallerConf,
    collab: Collaborators,
}

impl Pipeline {
    pub fn new(conf: CallerConf, collab: Collaborators) -> Self {
        Self { conf, collab }
    }

    pub fn run(&self, groups: Vec<JunctionGroup>) -> Result<RunOutput, anyhow::Error> {
        let mut stats = RunStats {
            junction_groups: groups.len(),
            ..Default::default()
        };
        let mut errata = Vec::new();

        let primary = self.assemble_primary(groups)?;
        stats.primary_assemblies = primary.len();
        trace_rss_now();

        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.conf.threads)
            .build()
            .map_err(|e| anyhow::anyhow!("could not build thread pool: {}", e))?;
        let calls = pool.install(|| self.run_later_stages(primary, &mut stats, &mut errata));

        stats.calls = calls.len();
        log_errata(&errata);
        tracing::info!("run statistics: {:?}", &stats);
        Ok(RunOutput {
            calls,
            errata,
            stats,
        })
    }

    /// Build primary assemblies on `threads` workers, sorted by anchor.
    fn assemble_primary(
        &self,
        groups: Vec<JunctionGroup>,
    ) -> Result<Vec<PrimaryAssembly>, anyhow::Error> {
        tracing::info!(
            "assembling {} junction groups...",
            groups.len().separate_with_commas()
        );
        let before = Instant::now();
        let n_workers = groups.len().min(self.conf.threads).max(1);
        let queue = SegQueue::new();
        for group in groups {
            queue.push(group);
        }

        let results = std::thread::scope(|scope| {
            let handles = (0..n_workers)
                .map(|_| scope.spawn(|| self.primary_worker(&queue)))
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|handle| {
                    handle
                        .join()
                        .map_err(|_| anyhow::anyhow!("primary assembly worker panicked"))?
                })
                .collect::<Result<Vec<_>, anyhow::Error>>()
        })?;

        let mut result = results.into_iter().flatten().collect::<Vec<_>>();
        result.sort_by(|a, b| {
            cmp_locus(
                (&a.anchor.chrom, a.anchor.pos),
                (&b.anchor.chrom, b.anchor.pos),
            )
            .then_with(|| a.assembly.seq().bases().cmp(b.assembly.seq().bases()))
        });
        tracing::info!(
            "... built {} primary assemblies in {:?}",
            result.len().separate_with_commas(),
            before.elapsed()
        );
        Ok(result)
    }

    fn primary_worker(
        &self,
        queue: &SegQueue<JunctionGroup>,
    ) -> Result<Vec<PrimaryAssembly>, anyhow::Error> {
        let mut result = Vec::new();
        while let Some(group) = queue.pop() {
            let reads = self
                .collab
                .reads
                .fetch(&group.chrom, group.fetch_start..group.fetch_end)?;
            result.append(&mut self.collab.assembler.assemble(&group, &reads)?);
        }
        Ok(result)
    }

    fn run_later_stages(
        &self,
        primary: Vec<PrimaryAssembly>,
        stats: &mut RunStats,
        errata: &mut Vec<Erratum>,
    ) -> Vec<VariantCall> {
        let before = Instant::now();
        let (consolidated, consolidation) =
            consolidate(primary, self.collab.checker.as_ref(), &self.conf);
        stats.consolidation = consolidation;
        stats.consolidated_assemblies = consolidated.len();
        tracing::info!(
            "consolidated to {} assemblies in {:?}",
            consolidated.len().separate_with_commas(),
            before.elapsed()
        );

        let extended = self.extend(consolidated, errata);
        stats.extended_assemblies = extended.len();

        let gapped = self.phase(extended, stats, errata);
        stats.gapped_assemblies = gapped.len();
        trace_rss_now();

        let aligned = self.align(gapped, errata);
        stats.aligned_assemblies = aligned.len();
        errata.extend(assembly_errata(&aligned));

        let calls = self.call(&aligned, errata);
        stats.raw_calls = calls.len();

        let before = Instant::now();
        let (mut calls, dedup_stats) = dedup(calls, &self.conf);
        stats.dedup = dedup_stats;
        calls.sort_by(|a, b| {
            cmp_locus(a.left.locus(), b.left.locus())
                .then_with(|| a.sv_type.cmp(&b.sv_type))
                .then_with(|| a.left_descriptor.cmp(&b.left_descriptor))
        });
        tracing::info!(
            "deduplicated to {} calls in {:?}",
            calls.len().separate_with_commas(),
            before.elapsed()
        );
        calls
    }

    fn extend(
        &self,
        primary: Vec<PrimaryAssembly>,
        errata: &mut Vec<Erratum>,
    ) -> Vec<ExtendedAssembly> {
        let before = Instant::now();
        let results = primary
            .par_iter()
            .map(|primary| {
                self.collab.extender.extend(primary).map_err(|e| {
                    Erratum::new(
                        "could not extend assembly",
                        e,
                        format!("{}:{}", &primary.anchor.chrom, primary.anchor.pos),
                    )
                })
            })
            .collect::<Vec<_>>();
        let extended = collect_ok(results, errata)
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();
        tracing::info!(
            "extended to {} assemblies in {:?}",
            extended.len().separate_with_commas(),
            before.elapsed()
        );
        extended
    }

    /// Phase, merge within phase sets and build one gapped assembly per
    /// secondary phase set.
    fn phase(
        &self,
        extended: Vec<ExtendedAssembly>,
        stats: &mut RunStats,
        errata: &mut Vec<Erratum>,
    ) -> Vec<GappedAssembly> {
        let before = Instant::now();
        let fragments = extended
            .iter()
            .map(|e| e.assembly.fragment_names())
            .collect::<Vec<_>>();
        let groups = primary_phase_sets(&fragments);
        stats.primary_phase_sets = groups.len();

        let merged = groups
            .par_iter()
            .map(|group| {
                let members = group.iter().map(|&i| extended[i].clone()).collect();
                merge_phase_set(
                    members,
                    self.collab.checker.as_ref(),
                    self.conf.phased_merge_max_overlap,
                )
            })
            .collect::<Vec<_>>();

        let mut components: Vec<Vec<ExtendedAssembly>> = Vec::new();
        for (members, merge_stats) in merged {
            stats.phased_merge.merges += merge_stats.merges;
            stats.phased_merge.aborted += merge_stats.aborted;
            let fragments = members
                .iter()
                .map(|m| m.assembly.fragment_names())
                .collect::<Vec<_>>();
            let all = (0..members.len()).collect::<Vec<_>>();
            for set in secondary_phase_sets(&all, &fragments) {
                components.push(set.iter().map(|&i| members[i].clone()).collect());
            }
        }

        let results = components
            .into_par_iter()
            .enumerate()
            .map(|(phase_set, components)| {
                GappedAssembly::new(phase_set, components, self.conf.gap_spacer_length)
                    .map_err(|e| {
                        Erratum::new(
                            "could not build gapped assembly",
                            e,
                            format!("phase set {}", phase_set),
                        )
                    })
            })
            .collect::<Vec<_>>();
        let gapped = collect_ok(results, errata);
        tracing::info!(
            "phased into {} gapped assemblies ({} merges) in {:?}",
            gapped.len().separate_with_commas(),
            stats.phased_merge.merges,
            before.elapsed()
        );
        gapped
    }

    fn align(
        &self,
        gapped: Vec<GappedAssembly>,
        errata: &mut Vec<Erratum>,
    ) -> Vec<AlignedAssembly> {
        let before = Instant::now();
        let results = gapped
            .into_par_iter()
            .map(|gapped| {
                let context = format!("phase set {}", gapped.phase_set);
                self.collab
                    .aligner
                    .align(gapped)
                    .map(|aligned| self.collab.slider.slide(aligned))
                    .map_err(|e| Erratum::new("could not align assembly", e, context))
            })
            .collect::<Vec<_>>();
        let aligned = collect_ok(results, errata);
        tracing::info!(
            "aligned {} assemblies in {:?}",
            aligned.len().separate_with_commas(),
            before.elapsed()
        );
        aligned
    }

    fn call(&self, aligned: &[AlignedAssembly], errata: &mut Vec<Erratum>) -> Vec<VariantCall> {
        let before = Instant::now();
        let results = aligned
            .par_iter()
            .map(|aligned| {
                call_variants(aligned, &self.conf).map_err(|e| {
                    Erratum::new(
                        "could not call variants",
                        e,
                        format!(
                            "phase set {} over {}",
                            aligned.gapped.phase_set,
                            aligned.assembly().read_span()
                        ),
                    )
                })
            })
            .collect::<Vec<_>>();
        let calls = collect_ok(results, errata)
            .into_iter()
            .flatten()
            .collect::<Vec<_>>();
        tracing::info!(
            "called {} raw variants in {:?}",
            calls.len().separate_with_commas(),
            before.elapsed()
        );
        calls
    }
}

/// Split `results` into values and errata.
fn collect_ok<T>(results: Vec<Result<T, Erratum>>, errata: &mut Vec<Erratum>) -> Vec<T> {
    let mut values = Vec::with_capacity(results.len());
    for result in results {
        match result {
            Ok(value) => values.push(value),
            Err(erratum) => {
                tracing::debug!("{}", &erratum);
                errata.push(erratum);
            }
        }
    }
    values
}

/// Distinct errata carried by the aligned assemblies.
fn assembly_errata(aligned: &[AlignedAssembly]) -> Vec<Erratum> {
    let mut seen: IndexSet<String> = IndexSet::new();
    let mut result = Vec::new();
    for erratum in aligned.iter().flat_map(|a| a.assembly().errata()) {
        if seen.insert(erratum.to_string()) {
            result.push(erratum.clone());
        }
    }
    result
}

/// Log up to [`MAX_REPORTED_ERRATA`] errata as warnings.
pub fn log_errata(errata: &[Erratum]) {
    if errata.is_empty() {
        return;
    }
    tracing::warn!("{} problems occurred during processing", errata.len());
    for erratum in errata.iter().take(MAX_REPORTED_ERRATA) {
        tracing::warn!("  {}", erratum);
    }
    if errata.len() > MAX_REPORTED_ERRATA {
        tracing::warn!("  ... and {} more", errata.len() - MAX_REPORTED_ERRATA);
    }
}
