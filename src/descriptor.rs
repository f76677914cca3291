//! Decoding of `*.metadata.xml` cell descriptors.
//!
//! Only the path container → run → outputs → subread set → dataset metadata →
//! collection metadata is read. Element names are matched on their local part,
//! so namespace prefixes such as `pbmeta:` are irrelevant.

use std::fs::File;
use std::io::{BufRead, BufReader};

use camino::Utf8Path;
use serde::Deserialize;
use tracing::debug;

use crate::domain::{CellMetadata, MultiplexPolicy, SampleIdentity};
use crate::error::RevioError;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct PacBioDataModel {
    #[serde(default)]
    experiment_container: ExperimentContainer,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ExperimentContainer {
    #[serde(default)]
    runs: Runs,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Runs {
    #[serde(default)]
    run: Run,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Run {
    #[serde(default)]
    outputs: Outputs,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Outputs {
    #[serde(default)]
    subread_sets: SubreadSets,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SubreadSets {
    #[serde(default)]
    subread_set: SubreadSet,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct SubreadSet {
    #[serde(default)]
    data_set_metadata: DataSetMetadata,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DataSetMetadata {
    #[serde(default)]
    collections: Collections,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Collections {
    #[serde(default)]
    collection_metadata: CollectionMetadata,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CollectionMetadata {
    #[serde(default)]
    run_details: RunDetails,
    #[serde(default)]
    well_sample: WellSample,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RunDetails {
    #[serde(default)]
    name: String,
    #[serde(default)]
    when_created: String,
    #[serde(default)]
    when_started: String,
}

#[derive(Debug, Default, Deserialize)]
struct WellSample {
    #[serde(rename = "@Name", default)]
    name: String,
    #[serde(rename = "BioSamples", default)]
    bio_samples: BioSamples,
}

#[derive(Debug, Default, Deserialize)]
struct BioSamples {
    #[serde(rename = "BioSample", default)]
    items: Vec<BioSample>,
}

#[derive(Debug, Default, Deserialize)]
struct BioSample {
    #[serde(rename = "@Name", default)]
    name: String,
    #[serde(rename = "DNABarcodes", default)]
    barcodes: DnaBarcodes,
}

#[derive(Debug, Default, Deserialize)]
struct DnaBarcodes {
    #[serde(rename = "DNABarcode", default)]
    items: Vec<DnaBarcode>,
}

#[derive(Debug, Default, Deserialize)]
struct DnaBarcode {
    #[serde(rename = "@Name", default)]
    name: String,
}

/// Opens and parses the descriptor at `path`.
pub fn parse_descriptor_file(
    path: &Utf8Path,
    policy: MultiplexPolicy,
) -> Result<CellMetadata, RevioError> {
    let file = File::open(path.as_std_path()).map_err(|err| RevioError::DescriptorRead {
        path: path.to_owned(),
        message: err.to_string(),
    })?;
    parse_descriptor(BufReader::new(file), path, policy)
}

/// Parses one descriptor document read from `reader`; `path` is recorded as the cell's file path.
pub fn parse_descriptor<R: BufRead>(
    reader: R,
    path: &Utf8Path,
    policy: MultiplexPolicy,
) -> Result<CellMetadata, RevioError> {
    let model: PacBioDataModel =
        quick_xml::de::from_reader(reader).map_err(|err| RevioError::DescriptorParse {
            path: path.to_owned(),
            message: err.to_string(),
        })?;

    let collection = model
        .experiment_container
        .runs
        .run
        .outputs
        .subread_sets
        .subread_set
        .data_set_metadata
        .collections
        .collection_metadata;
    let details = collection.run_details;

    let run_name = details.name.trim().to_string();
    if run_name.is_empty() {
        return Err(RevioError::MissingField(format!(
            "RunDetails/Name in {path}"
        )));
    }

    let samples = extract_samples(collection.well_sample.bio_samples.items);
    if samples.is_empty() {
        return Err(RevioError::MissingField(format!(
            "WellSample/BioSamples in {path}"
        )));
    }

    let is_multiplex = policy.is_multiplex(&samples);
    debug!(
        descriptor = %path,
        run = %run_name,
        samples = samples.len(),
        is_multiplex,
        "parsed descriptor"
    );

    Ok(CellMetadata {
        run_name,
        file_path: path.to_owned(),
        created_date: non_empty(details.when_created),
        started_date: non_empty(details.when_started),
        well_sample_name: collection.well_sample.name.trim().to_string(),
        samples,
        is_multiplex,
    })
}

/// One entry per (sample, barcode) pair; a sample without barcodes yields a single unbarcoded entry.
fn extract_samples(bio_samples: Vec<BioSample>) -> Vec<SampleIdentity> {
    let mut samples = Vec::new();
    for bio_sample in bio_samples {
        let name = bio_sample.name.trim().to_string();
        if bio_sample.barcodes.items.is_empty() {
            samples.push(SampleIdentity::new(name, None));
            continue;
        }
        for barcode in bio_sample.barcodes.items {
            samples.push(SampleIdentity::new(
                name.clone(),
                Some(barcode.name.trim().to_string()),
            ));
        }
    }
    samples
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    fn descriptor(run_name: &str, samples: &str) -> String {
        format!(
            r#"<?xml version="1.0" encoding="utf-8"?>
<PacBioDataModel>
  <ExperimentContainer>
    <Runs>
      <Run Name="{run_name}">
        <Outputs>
          <SubreadSets>
            <SubreadSet>
              <DataSetMetadata>
                <Collections>
                  <CollectionMetadata>
                    <RunDetails>
                      <Name>{run_name}</Name>
                      <CreatedBy>user</CreatedBy>
                      <WhenCreated>2025-09-22T10:00:00Z</WhenCreated>
                      <StartedBy>user</StartedBy>
                      <WhenStarted>2025-09-22T11:00:00Z</WhenStarted>
                    </RunDetails>
                    <WellSample Name="WS1">
                      <BioSamples>{samples}</BioSamples>
                    </WellSample>
                  </CollectionMetadata>
                </Collections>
              </DataSetMetadata>
            </SubreadSet>
          </SubreadSets>
        </Outputs>
      </Run>
    </Runs>
  </ExperimentContainer>
</PacBioDataModel>"#
        )
    }

    fn parse(xml: &str, policy: MultiplexPolicy) -> Result<CellMetadata, RevioError> {
        parse_descriptor(xml.as_bytes(), Utf8Path::new("in-memory.xml"), policy)
    }

    #[test]
    fn parses_single_barcoded_sample() {
        let xml = descriptor(
            "RUN123",
            r#"<BioSample Name="SAMPLE_A"><DNABarcodes><DNABarcode Name="bc1001" /></DNABarcodes></BioSample>"#,
        );
        let info = parse(&xml, MultiplexPolicy::AnySample).unwrap();
        assert_eq!(info.run_name, "RUN123");
        assert_eq!(info.well_sample_name, "WS1");
        assert_eq!(info.file_path, "in-memory.xml");
        assert_eq!(info.created_date.as_deref(), Some("2025-09-22T10:00:00Z"));
        assert_eq!(info.started_date.as_deref(), Some("2025-09-22T11:00:00Z"));
        assert_eq!(
            info.samples,
            vec![SampleIdentity::new("SAMPLE_A", Some("bc1001".to_string()))]
        );
        // one sample is never multiplexed, barcode or not
        assert!(!info.is_multiplex);
    }

    #[test]
    fn sample_count_is_sum_of_max_barcodes_one() {
        let xml = descriptor(
            "RUN1",
            r#"<BioSample Name="A"><DNABarcodes><DNABarcode Name="bc1--bc1"/><DNABarcode Name="bc2--bc2"/><DNABarcode Name="bc3--bc3"/></DNABarcodes></BioSample>
               <BioSample Name="B"/>
               <BioSample Name="C"><DNABarcodes></DNABarcodes></BioSample>
               <BioSample Name="D"><DNABarcodes><DNABarcode Name="bc4--bc4"/></DNABarcodes></BioSample>"#,
        );
        let info = parse(&xml, MultiplexPolicy::AnySample).unwrap();
        assert_eq!(info.samples.len(), 3 + 1 + 1 + 1);
        let a_count = info.samples.iter().filter(|s| s.name == "A").count();
        assert_eq!(a_count, 3);
        assert_eq!(info.samples[3], SampleIdentity::new("B", None));
        assert!(info.is_multiplex);
    }

    #[test]
    fn empty_run_name_is_missing_field() {
        let xml = descriptor("", r#"<BioSample Name="S1"/>"#);
        let err = parse(&xml, MultiplexPolicy::AnySample).unwrap_err();
        assert_matches!(err, RevioError::MissingField(_));
    }

    #[test]
    fn zero_samples_is_missing_field() {
        let xml = descriptor("RUN1", "");
        let err = parse(&xml, MultiplexPolicy::AnySample).unwrap_err();
        assert_matches!(err, RevioError::MissingField(_));
    }

    #[test]
    fn malformed_document_is_parse_error() {
        let err = parse("<PacBioDataModel><Exper", MultiplexPolicy::AnySample).unwrap_err();
        assert_matches!(err, RevioError::DescriptorParse { .. });
    }

    #[test]
    fn first_sample_policy_ignores_later_barcodes() {
        let xml = descriptor(
            "RUN1",
            r#"<BioSample Name="S0"/>
               <BioSample Name="S1"><DNABarcodes><DNABarcode Name="bc1001--bc1001"/></DNABarcodes></BioSample>"#,
        );
        let first = parse(&xml, MultiplexPolicy::FirstSample).unwrap();
        assert!(!first.is_multiplex);

        let any = parse(&xml, MultiplexPolicy::AnySample).unwrap();
        assert!(any.is_multiplex);
    }

    #[test]
    fn both_policies_agree_when_first_sample_is_barcoded() {
        let xml = descriptor(
            "RUN1",
            r#"<BioSample Name="S1"><DNABarcodes><DNABarcode Name="bc1001--bc1001"/></DNABarcodes></BioSample>
               <BioSample Name="S2"><DNABarcodes><DNABarcode Name="bc1002--bc1002"/></DNABarcodes></BioSample>"#,
        );
        assert!(parse(&xml, MultiplexPolicy::FirstSample).unwrap().is_multiplex);
        assert!(parse(&xml, MultiplexPolicy::AnySample).unwrap().is_multiplex);
    }

    #[test]
    fn namespaced_elements_are_matched_by_local_name() {
        let xml = r#"<?xml version="1.0" encoding="utf-8"?>
<PacBioDataModel xmlns="http://pacificbiosciences.com/PacBioDataModel.xsd">
  <ExperimentContainer>
    <Runs>
      <Run Name="r84297_20250922_085610">
        <Outputs>
          <SubreadSets>
            <pbds:SubreadSet xmlns:pbds="http://pacificbiosciences.com/PacBioDatasets.xsd">
              <pbds:DataSetMetadata>
                <pbds:Collections>
                  <pbmeta:CollectionMetadata xmlns:pbmeta="http://pacificbiosciences.com/PacBioCollectionMetadata.xsd">
                    <pbmeta:RunDetails>
                      <pbmeta:Name>r84297_20250922_085610</pbmeta:Name>
                      <pbmeta:WhenStarted>2025-09-22T08:56:10Z</pbmeta:WhenStarted>
                    </pbmeta:RunDetails>
                    <pbmeta:WellSample Name="pool1">
                      <pbsample:BioSamples xmlns:pbsample="http://pacificbiosciences.com/PacBioSampleInfo.xsd">
                        <pbsample:BioSample Name="S1"/>
                      </pbsample:BioSamples>
                    </pbmeta:WellSample>
                  </pbmeta:CollectionMetadata>
                </pbds:Collections>
              </pbds:DataSetMetadata>
            </pbds:SubreadSet>
          </SubreadSets>
        </Outputs>
      </Run>
    </Runs>
  </ExperimentContainer>
</PacBioDataModel>"#;
        let info = parse(xml, MultiplexPolicy::AnySample).unwrap();
        assert_eq!(info.run_name, "r84297_20250922_085610");
        assert_eq!(info.created_date, None);
        assert_eq!(info.well_sample_name, "pool1");
        assert_eq!(info.samples, vec![SampleIdentity::new("S1", None)]);
    }
}
