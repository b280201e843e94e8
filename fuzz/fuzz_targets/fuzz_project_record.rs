#![no_main]

use libfuzzer_sys::fuzz_target;
use vcf_flatten::{header::HeaderSchema, projector::Projector};

const HEADER: &str = "##INFO=<ID=DP,Number=1,Type=Integer,Description=\"Depth\">\n\
##INFO=<ID=CSQ,Number=.,Type=String,Description=\"VEP. Format: Allele|Consequence|SYMBOL\">\n";

fuzz_target!(|data: &[u8]| {
    let line = String::from_utf8_lossy(data);
    let schema = HeaderSchema::from_header_text(HEADER, "CSQ");
    let projector = Projector::new(&schema);

    // Any accepted line yields exactly the schema's column count.
    if let Ok(projected) = projector.project(&line) {
        assert_eq!(projected.row().values().len(), projector.columns().len());
    }
});
