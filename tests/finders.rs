//! Integration tests for specification finders and the transform seam

use std::sync::Arc;
use x12_fmt::{
    CompositeSpecificationFinder, EmbeddedSpecificationFinder, FileSpecificationFinder,
    ParserOptions, SpecificationFinder, X12Parser, XmlTransform,
};

const ISA: &str = "ISA*00*          *00*          *ZZ*SENDER         *ZZ*RECEIVER       \
*100101*1200*^*00501*000000201*0*P*:~";

fn acknowledgment_999() -> String {
    format!(
        "{}GS*FA*SENDER*RECEIVER*20100101*1200*20*X*005010X231A1~\
ST*999*0001~AK1*HC*1~AK2*837*0001~IK3*NM1*8**8~IK4*1**1~IK5*R*5~AK9*R*1*1*0~\
SE*8*0001~GE*1*20~IEA*1*000000201~",
        ISA
    )
}

#[test]
fn test_file_finder_loads_directory() {
    let finder = FileSpecificationFinder::from_dir("tests/fixtures/specs").unwrap();
    assert_eq!(finder.len(), 1);
    let spec = finder
        .find_transaction_spec("FA", "005010X231A1", "999")
        .expect("999 spec should load from disk");
    assert!(spec.allows_segment("AK1"));
    assert!(finder.find_transaction_spec("HC", "004010", "837").is_none());
}

#[test]
fn test_composite_finder_parses_both_families() {
    let file = FileSpecificationFinder::from_dir("tests/fixtures/specs").unwrap();
    let finder = CompositeSpecificationFinder::new(vec![
        Arc::new(file),
        Arc::new(EmbeddedSpecificationFinder),
    ]);
    let mut parser = X12Parser::with_finder(ParserOptions::default(), Arc::new(finder));

    let interchanges = parser.parse_multiple_str(&acknowledgment_999()).unwrap();
    let tree = &interchanges[0];
    let ids: Vec<&str> = tree.segments_in_order().iter().map(|s| s.id()).collect();
    assert_eq!(
        ids,
        vec!["ISA", "GS", "ST", "AK1", "AK2", "IK3", "IK4", "IK5", "AK9", "SE", "GE", "IEA"]
    );
    // IK5 closed the 2100 loop implicitly and landed back in 2000
    assert_eq!(tree.serialize(), acknowledgment_999());

    // the embedded 837 catalog is still reachable through the chain
    let claim = include_str!("fixtures/837p-4010-claim.x12");
    assert!(parser.parse_multiple_str(claim.trim_end()).is_ok());
}

#[test]
fn test_missing_spec_directory_fails() {
    assert!(FileSpecificationFinder::from_dir("tests/fixtures/no-such-dir").is_err());
}

struct EnvelopeStub;

impl XmlTransform for EnvelopeStub {
    fn apply(&self, xml: &str) -> Result<String, x12_fmt::TransformError> {
        // stand-in for an XSLT engine: extract the payload of a trivial
        // <x12>...</x12> envelope
        let inner = xml
            .strip_prefix("<x12>")
            .and_then(|rest| rest.strip_suffix("</x12>"))
            .ok_or_else(|| x12_fmt::TransformError::Failed("expected <x12> envelope".into()))?;
        Ok(inner.to_string())
    }
}

#[test]
fn test_transform_to_x12_round_trips_through_parser() {
    let xml = format!("<x12>{}</x12>", acknowledgment_999());
    let mut parser = X12Parser::new(ParserOptions::default());
    // 999 is not in the embedded catalog; the transaction still parses
    // with direct attachment
    let interchanges = parser.transform_to_x12(&xml, &EnvelopeStub).unwrap();
    assert_eq!(interchanges.len(), 1);
    assert_eq!(interchanges[0].serialize(), acknowledgment_999());
}

#[test]
fn test_transform_failure_is_reported() {
    let mut parser = X12Parser::new(ParserOptions::default());
    let err = parser
        .transform_to_x12("<other>nope</other>", &EnvelopeStub)
        .unwrap_err();
    assert!(err.to_string().contains("Transform failed"));
}
