use std::{io::Write, sync::Arc};

use assert_fs::prelude::*;
use vcf_flatten::{FlattenOptions, RunLog, SampleContext, flatten_sample};

const HEADER: &str = "##fileformat=VCFv4.2\n\
##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Depth\">\n\
##INFO=<ID=AO,Number=A,Type=Integer,Description=\"Alt observations\">\n\
##INFO=<ID=CSQ,Number=.,Type=String,Description=\"VEP. Format: Allele|SYMBOL\">\n\
#CHROM\tPOS\tID\tREF\tALT\tQUAL\tFILTER\tINFO\n";

const RECORDS: &str = "chr1\t100\t.\tA\tG\t50\tPASS\tDP=10;AO=1;CSQ=G|GENE1\n\
chr1\t200\t.\tT\tC\t60\tPASS\tDP=8;AO=2;CSQ=C|GENE2\n";

fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = flate2::write::GzEncoder::new(Vec::new(), flate2::Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

fn flatten(temp: &assert_fs::TempDir, name: &str, bytes: &[u8]) -> String {
    let input = temp.child(name);
    input.write_binary(bytes).unwrap();
    let output = temp.child(format!("{name}.tsv"));

    let log = RunLog::open(temp.child("run.log").path()).unwrap();
    let ctx = SampleContext::new("S-1", Arc::new(log));
    let summary =
        flatten_sample(&ctx, input.path(), output.path(), &FlattenOptions::default()).unwrap();
    assert_eq!(summary.emitted_records, 2);

    std::fs::read_to_string(output.path()).unwrap()
}

fn plain_output(temp: &assert_fs::TempDir) -> String {
    flatten(temp, "plain.vcf", format!("{HEADER}{RECORDS}").as_bytes())
}

#[test]
fn gzip_input_matches_plain_input() {
    let temp = assert_fs::TempDir::new().unwrap();
    let expected = plain_output(&temp);
    let compressed = gzip(format!("{HEADER}{RECORDS}").as_bytes());
    assert_eq!(flatten(&temp, "input.vcf.gz", &compressed), expected);
}

#[test]
fn multi_member_gzip_is_read_to_the_end() {
    // BGZF files are a series of independent gzip members.
    let temp = assert_fs::TempDir::new().unwrap();
    let expected = plain_output(&temp);
    let mut compressed = gzip(HEADER.as_bytes());
    compressed.extend(gzip(RECORDS.as_bytes()));
    assert_eq!(flatten(&temp, "blocks.vcf.gz", &compressed), expected);
}

#[test]
fn double_compressed_input_is_unwrapped() {
    let temp = assert_fs::TempDir::new().unwrap();
    let expected = plain_output(&temp);
    let compressed = gzip(&gzip(format!("{HEADER}{RECORDS}").as_bytes()));
    assert_eq!(flatten(&temp, "double.vcf.gz.gz", &compressed), expected);
}

#[test]
fn misnamed_plain_text_is_read_as_is() {
    let temp = assert_fs::TempDir::new().unwrap();
    let expected = plain_output(&temp);
    let output = flatten(&temp, "not-really.vcf.gz", format!("{HEADER}{RECORDS}").as_bytes());
    assert_eq!(output, expected);
}
