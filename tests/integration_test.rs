use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
    sync::Arc,
};

use flate2::{Compression, write::GzEncoder};
use noodles::{bcf, vcf, vcf::variant::io::Write as _};
use tempfile::tempdir;
use vcf_flatten::{
    FlattenOptions, PipelineConfig, RequiredFields, RunLog, SampleContext, SampleOutputs,
    flatten_sample, run_sample, run_samples, report::Resources,
};

const VCF: &str = "##fileformat=VCFv4.2\n\
##contig=<ID=chr12>\n\
##contig=<ID=chr17>\n\
##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Total read depth\">\n\
##INFO=<ID=AO,Number=A,Type=Integer,Description=\"Alternate allele observations\">\n\
##INFO=<ID=CSQ,Number=.,Type=String,Description=\"Consequence annotations from Ensembl VEP. Format: Allele|Consequence|IMPACT|SYMBOL\">\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n\
chr17\t7674220\trs28934578\tC\tT\t812\tPASS\tDP=20;AO=5;CSQ=T|missense_variant|MODERATE|TP53\n\
chr12\t25245350\t.\tC\tA\t95.5\tPASS\tDP=40;AO=10\n";

fn write_gzip(path: &Path, contents: &str) -> io::Result<()> {
    let mut encoder = GzEncoder::new(fs::File::create(path)?, Compression::default());
    encoder.write_all(contents.as_bytes())?;
    encoder.finish()?;
    Ok(())
}

fn read_rows(path: &Path) -> Vec<Vec<String>> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| line.split('\t').map(str::to_string).collect())
        .collect()
}

fn context(dir: &Path, sample: &str) -> SampleContext {
    let log = RunLog::open(&dir.join("run.log")).unwrap();
    SampleContext::new(sample, Arc::new(log))
}

#[test]
fn flatten_produces_one_row_per_record() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("TUM-001.vcf.gz");
    write_gzip(&input, VCF).unwrap();
    let output = dir.path().join("TUM-001.flat.tsv");

    let ctx = context(dir.path(), "TUM-001");
    let summary = flatten_sample(&ctx, &input, &output, &FlattenOptions::default()).unwrap();
    assert_eq!(summary.total_records, 2);
    assert_eq!(summary.emitted_records, 2);
    assert_eq!(summary.padded_records, 1);

    let rows = read_rows(&output);
    assert_eq!(
        rows[0],
        [
            "UID", "SAMPLE_TYPE", "PATIENT_NUM", "VAF", "CHROM", "POS", "ID", "REF", "ALT",
            "QUAL", "FILTER", "DP", "AO", "CSQ_Allele", "CSQ_Consequence", "CSQ_IMPACT",
            "CSQ_SYMBOL"
        ]
    );
    assert_eq!(rows.len(), 3);
    assert_eq!(
        rows[1],
        [
            "TUM-001.C.T.812.PASS", "TUM", "001", "25.000", "chr17", "7674220", "rs28934578",
            "C", "T", "812", "PASS", "20", "5", "T", "missense_variant", "MODERATE", "TP53"
        ]
    );
    // Second record has no CSQ at all but still carries depth and observations.
    assert_eq!(rows[2][3], "25.000");
    assert_eq!(&rows[2][13..], ["NA", "NA", "NA", "NA"]);
}

#[test]
fn run_sample_writes_final_table_and_report() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("CTRL2B.vcf");
    fs::write(&input, VCF).unwrap();
    let outputs = SampleOutputs::in_dir(&dir.path().join("results"), "CTRL2B");

    let ctx = context(dir.path(), "CTRL2B");
    let required =
        RequiredFields::new(["UID", "PATIENT_NUM", "VAF", "CSQ_SYMBOL", "gnomAD_AF"]).unwrap();
    let report = run_sample(
        &ctx,
        &input,
        &outputs,
        required,
        &FlattenOptions::default(),
        Resources::default(),
    )
    .unwrap();

    let rows = read_rows(&outputs.final_table);
    assert_eq!(rows[0], ["UID", "PATIENT_NUM", "VAF", "CSQ_SYMBOL", "gnomAD_AF"]);
    assert_eq!(rows[1], ["CTRL2B.C.T.812.PASS", "2", "25.000", "TP53", "NA"]);
    assert_eq!(rows[2], ["CTRL2B.C.A.95.5.PASS", "2", "25.000", "NA", "NA"]);

    assert_eq!(report.validation.missing_fields, ["gnomAD_AF"]);
    let json: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(&outputs.report).unwrap()).unwrap();
    assert_eq!(json["sample"]["sample_type"], "CTRL2B");
    assert_eq!(json["flatten"]["emitted_records"], 2);

    let log = fs::read_to_string(dir.path().join("run.log")).unwrap();
    assert_eq!(log.lines().count(), 1);
    assert!(log.contains("Sample CTRL2B: Missing fields: gnomAD_AF. Filling with 'NA'."));
}

fn write_config(dir: &Path, body: &str) -> PathBuf {
    let path = dir.join("config.yaml");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn batch_run_processes_every_sample() {
    let dir = tempdir().unwrap();
    fs::create_dir_all(dir.path().join("data")).unwrap();
    write_gzip(&dir.path().join("data/TUM-001.vcf.gz"), VCF).unwrap();
    write_gzip(&dir.path().join("data/NOR-001.vcf.gz"), VCF).unwrap();

    let config = write_config(
        dir.path(),
        "required_fields: [UID, SAMPLE_TYPE, VAF, MISSING_A, MISSING_B]\n\
log_file: logs/run.log\n\
output_dir: results\n\
threads: 2\n\
samples:\n  TUM-001: data/TUM-001.vcf.gz\n  NOR-001: data/NOR-001.vcf.gz\n",
    );
    let config = PipelineConfig::from_path(&config).unwrap();

    let outcomes = run_samples(&config).unwrap();
    assert_eq!(outcomes.len(), 2);
    assert!(outcomes.iter().all(|outcome| outcome.result.is_ok()));

    for sample in ["TUM-001", "NOR-001"] {
        let rows = read_rows(&dir.path().join(format!("results/{sample}.final.tsv")));
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[1][1], &sample[..3]);
        assert_eq!(&rows[1][3..], ["NA", "NA"]);
    }

    // One diagnostic per sample, not per row.
    let log = fs::read_to_string(dir.path().join("logs/run.log")).unwrap();
    assert_eq!(log.lines().count(), 2);
    assert!(log.lines().all(|line| {
        line.ends_with("Missing fields: MISSING_A, MISSING_B. Filling with 'NA'.")
    }));
}

#[test]
fn failing_sample_does_not_stop_the_batch() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("good.vcf"), VCF).unwrap();

    let config = write_config(
        dir.path(),
        "required_fields: [UID]\n\
samples:\n  GOOD-1: good.vcf\n  BAD-1: does-not-exist.vcf.gz\n",
    );
    let config = PipelineConfig::from_path(&config).unwrap();

    let outcomes = run_samples(&config).unwrap();
    let bad = outcomes.iter().find(|o| o.sample_id == "BAD-1").unwrap();
    let good = outcomes.iter().find(|o| o.sample_id == "GOOD-1").unwrap();
    assert!(bad.result.is_err());
    assert!(good.result.is_ok());
    assert!(!dir.path().join("BAD-1.flat.tsv").exists());
    assert!(!dir.path().join("BAD-1.final.tsv").exists());
    assert!(dir.path().join("GOOD-1.final.tsv").exists());
}

#[test]
fn missing_required_fields_fails_before_processing() {
    let dir = tempdir().unwrap();
    fs::write(dir.path().join("a.vcf"), VCF).unwrap();
    let config = write_config(dir.path(), "samples:\n  A-1: a.vcf\n");
    let config = PipelineConfig::from_path(&config).unwrap();

    let err = run_samples(&config).unwrap_err();
    assert!(err.to_string().contains("required field list"));
    assert!(!dir.path().join("A-1.flat.tsv").exists());
    assert!(!dir.path().join("vcf-flatten.log").exists());
}

#[test]
fn rerun_overwrites_previous_outputs() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("S-1.vcf");
    let output = dir.path().join("S-1.flat.tsv");
    let ctx = context(dir.path(), "S-1");

    fs::write(&input, VCF).unwrap();
    flatten_sample(&ctx, &input, &output, &FlattenOptions::default()).unwrap();
    let first = fs::read_to_string(&output).unwrap();
    flatten_sample(&ctx, &input, &output, &FlattenOptions::default()).unwrap();
    assert_eq!(fs::read_to_string(&output).unwrap(), first);
}

#[test]
fn bcf_input_matches_vcf_input() {
    let dir = tempdir().unwrap();
    let ctx = context(dir.path(), "TUM-001");

    let vcf_input = dir.path().join("TUM-001.vcf");
    fs::write(&vcf_input, VCF).unwrap();
    let vcf_output = dir.path().join("from-vcf.tsv");
    flatten_sample(&ctx, &vcf_input, &vcf_output, &FlattenOptions::default()).unwrap();

    let mut reader = vcf::io::Reader::new(VCF.as_bytes());
    let header = reader.read_header().unwrap();
    let bcf_input = dir.path().join("TUM-001.bcf");
    {
        let mut writer = bcf::io::Writer::new(fs::File::create(&bcf_input).unwrap());
        writer.write_header(&header).unwrap();
        for record in reader.record_bufs(&header) {
            writer.write_variant_record(&header, &record.unwrap()).unwrap();
        }
    }
    let bcf_output = dir.path().join("from-bcf.tsv");
    let summary =
        flatten_sample(&ctx, &bcf_input, &bcf_output, &FlattenOptions::default()).unwrap();

    assert_eq!(summary.emitted_records, 2);
    assert_eq!(
        fs::read_to_string(&bcf_output).unwrap(),
        fs::read_to_string(&vcf_output).unwrap()
    );
}
