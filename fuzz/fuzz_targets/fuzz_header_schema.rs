#![no_main]

use libfuzzer_sys::fuzz_target;
use vcf_flatten::header::HeaderSchema;

fuzz_target!(|data: &[u8]| {
    let text = String::from_utf8_lossy(data);

    // Extraction must never panic and must be deterministic.
    let schema = HeaderSchema::from_header_text(&text, "CSQ");
    assert_eq!(schema, HeaderSchema::from_header_text(&text, "CSQ"));
    assert_eq!(
        schema.projected_columns().len(),
        schema.expected_width() - 1 + schema.compound_fields().len()
    );
});
