//! Code for writing the output file.

use std::{collections::BTreeMap, path::Path};

use serde::{Deserialize, Serialize};

use crate::{
    caller::{SvType, VariantCall},
    common::io::open_write_maybe_gz,
};

/// Support counts of one sample, serialized into the payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SampleCounts {
    pub split_reads: usize,
    pub discordant_reads: usize,
    pub fragments: usize,
    pub quality: f64,
}

/// JSON payload with the details of a call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Payload {
    pub samples: BTreeMap<String, SampleCounts>,
    pub assemblies: Vec<String>,
}

/// One line of the output TSV file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// chromosome name
    pub chromosome: String,
    /// position, 1-based
    pub pos: i64,
    /// chromosome of the second side, empty for single breakends
    pub chromosome2: Option<String>,
    /// position of the second side, 1-based
    pub pos2: Option<i64>,
    /// type of the SV
    pub sv_type: SvType,
    /// length of the SV, 0 if undefined
    pub sv_length: usize,
    /// breakend notation of the first side
    pub descriptor: String,
    /// breakend notation of the second side
    pub descriptor2: Option<String>,
    pub mapq: u8,
    pub mapq2: Option<u8>,
    /// longest read overhang into the less covered side
    pub overhang: usize,
    /// comma-separated phase set numbers
    pub phase_sets: String,
    /// JSON with per-sample support
    pub payload: String,
}

impl Record {
    pub fn from_call(call: &VariantCall) -> Result<Self, anyhow::Error> {
        let payload = Payload {
            samples: call
                .support
                .iter()
                .map(|(sample, support)| {
                    (
                        sample.clone(),
                        SampleCounts {
                            split_reads: support.split_reads.len(),
                            discordant_reads: support.discordant_reads.len(),
                            fragments: support.fragments().len(),
                            quality: support.quality,
                        },
                    )
                })
                .collect(),
            assemblies: call.evidence.iter().map(|e| e.assembly.clone()).collect(),
        };
        Ok(Self {
            chromosome: call.left.chrom.clone(),
            pos: call.left.pos,
            chromosome2: call.right.as_ref().map(|right| right.chrom.clone()),
            pos2: call.right.as_ref().map(|right| right.pos),
            sv_type: call.sv_type,
            sv_length: call.sv_length,
            descriptor: call.left_descriptor.clone(),
            descriptor2: call.right_descriptor.clone(),
            mapq: call.left.mapq,
            mapq2: call.right.as_ref().map(|right| right.mapq),
            overhang: call.overhang,
            phase_sets: call
                .phase_sets
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(","),
            payload: serde_json::to_string(&payload)?,
        })
    }
}

/// Write `calls` to the TSV file at `path`, gzip-compressed for `.gz`.
pub fn write_calls(path: &Path, calls: &[VariantCall]) -> Result<(), anyhow::Error> {
    tracing::info!("writing {} calls to {:?}", calls.len(), path);
    let mut writer = csv::WriterBuilder::new()
        .delimiter(b'\t')
        .has_headers(false)
        .from_writer(
            open_write_maybe_gz(path)
                .map_err(|e| anyhow::anyhow!("Cannot open {:?} for writing: {:?}", path, e))?,
        );

    // Write header as comment.
    writer.write_record([
        "#chromosome",
        "pos",
        "chromosome2",
        "pos2",
        "sv_type",
        "sv_length",
        "descriptor",
        "descriptor2",
        "mapq",
        "mapq2",
        "overhang",
        "phase_sets",
        "payload",
    ])?;
    for call in calls {
        writer.serialize(Record::from_call(call)?)?;
    }
    writer.flush()?;

    Ok(())
}

#[cfg(test)]
mod test {
    use std::collections::{BTreeMap, BTreeSet};

    use pretty_assertions::assert_eq;

    use super::{write_calls, Payload, Record};
    use crate::caller::{
        support::SampleSupport, AssemblyEvidence, Breakend, SvType, VariantCall,
    };

    fn call() -> VariantCall {
        VariantCall {
            sv_type: SvType::SingleBreakend,
            sv_length: 3,
            left: Breakend {
                chrom: String::from("chr3"),
                pos: 120,
                retained_left: true,
                mapq: 50,
                anchor_base: 'C',
            },
            right: None,
            left_descriptor: String::from("CTTA."),
            right_descriptor: None,
            phase_sets: BTreeSet::from([2, 4]),
            evidence: vec![AssemblyEvidence {
                assembly: String::from("asm2"),
                contig: String::from("CTTACGT"),
                left_offset: 10,
                right_offset: 10,
                reversed: false,
                fragments: BTreeSet::new(),
            }],
            support: BTreeMap::from([(String::from("s1"), SampleSupport::default())]),
            overhang: 12,
        }
    }

    #[test]
    fn record_from_single_breakend() -> Result<(), anyhow::Error> {
        let record = Record::from_call(&call())?;

        assert_eq!(record.chromosome2, None);
        assert_eq!(record.phase_sets, "2,4");
        let payload: Payload = serde_json::from_str(&record.payload)?;
        assert_eq!(payload.assemblies, vec![String::from("asm2")]);
        assert_eq!(payload.samples["s1"].fragments, 0);

        Ok(())
    }

    #[test]
    fn write_tsv() -> Result<(), anyhow::Error> {
        let tmp_dir = temp_testdir::TempDir::default();
        let path = tmp_dir.join("calls.tsv");

        write_calls(&path, &[call()])?;

        let output = std::fs::read_to_string(&path)?;
        let lines = output.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("#chromosome\tpos\tchromosome2"));
        assert!(lines[1].starts_with("chr3\t120\t\t\tSGL\t3\tCTTA.\t\t50\t\t12\t2,4\t"));

        Ok(())
    }
}
