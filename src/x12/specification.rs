//! Declarative transaction specifications
//!
//! A [`TransactionSpecification`] describes, for one transaction set, which
//! segments a container may hold directly, which loops exist (keyed by loop
//! id, entered on a starting segment), and which hierarchical loop levels
//! nest under which. The structural parser consults this model for every
//! placement decision; it never hard-codes loop knowledge.
//!
//! Specifications are data. They deserialize from JSON, are immutable after
//! load, and are shared behind `Arc` - one copy serves any number of
//! concurrent parses.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io;
use std::path::Path;
use std::sync::Arc;

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::x12::segment::Segment;

/// Specification of one transaction set (e.g. `837`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionSpecification {
    /// Transaction set identifier code, matched against ST01.
    pub transaction_set: String,
    /// Functional group code, matched against GS01 (`HC` for claims).
    pub functional_group: String,
    /// Version prefixes served, matched against GS08 (`004010`, `005010`).
    /// Empty means any version.
    #[serde(default)]
    pub versions: Vec<String>,
    #[serde(default)]
    pub segments: Vec<SegmentSpecification>,
    #[serde(default)]
    pub loops: Vec<Arc<LoopSpecification>>,
    #[serde(default)]
    pub hierarchical_loops: Vec<Arc<HierarchicalLoopSpecification>>,
}

/// A segment allowed as a direct child of its containing specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SegmentSpecification {
    pub segment_id: String,
}

/// A loop entered when its starting segment appears.
///
/// Sibling loops routinely share a starting segment id (1000A and 1000B
/// both start with `NM1`); `entity_identifiers` disambiguates by requiring
/// element 1 of the candidate segment to be one of the listed codes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoopSpecification {
    pub loop_id: String,
    pub starting_segment: String,
    #[serde(default)]
    pub entity_identifiers: Vec<String>,
    #[serde(default)]
    pub segments: Vec<SegmentSpecification>,
    #[serde(default)]
    pub loops: Vec<Arc<LoopSpecification>>,
}

/// A hierarchical loop level (`HL` with a given HL03 level code), nesting
/// child levels, plain loops, and direct segments.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HierarchicalLoopSpecification {
    pub loop_id: String,
    pub level_code: String,
    #[serde(default)]
    pub segments: Vec<SegmentSpecification>,
    #[serde(default)]
    pub loops: Vec<Arc<LoopSpecification>>,
    #[serde(default)]
    pub hierarchical_loops: Vec<Arc<HierarchicalLoopSpecification>>,
}

impl TransactionSpecification {
    /// Whether this specification serves the given GS01/GS08/ST01 triple.
    pub fn serves(&self, functional_group: &str, version: &str, transaction_set: &str) -> bool {
        self.functional_group == functional_group
            && self.transaction_set == transaction_set
            && (self.versions.is_empty()
                || self.versions.iter().any(|v| version.starts_with(v.as_str())))
    }

    pub fn allows_segment(&self, segment_id: &str) -> bool {
        self.segments.iter().any(|s| s.segment_id == segment_id)
    }

    /// The child loop the given segment would enter, if any.
    pub fn find_loop(&self, segment: &Segment) -> Option<&Arc<LoopSpecification>> {
        self.loops.iter().find(|l| l.matches(segment))
    }

    pub fn find_hierarchical(&self, level_code: &str) -> Option<&Arc<HierarchicalLoopSpecification>> {
        self.hierarchical_loops
            .iter()
            .find(|h| h.level_code == level_code)
    }

    /// Like [`find_hierarchical`](Self::find_hierarchical), but searching
    /// descendant levels too. Unbundling re-roots hierarchical subtrees,
    /// so a level normally nested deeper may appear directly under the
    /// transaction; direct children win over descendants.
    pub fn find_hierarchical_recursive(
        &self,
        level_code: &str,
    ) -> Option<&Arc<HierarchicalLoopSpecification>> {
        self.find_hierarchical(level_code).or_else(|| {
            self.hierarchical_loops
                .iter()
                .find_map(|h| h.find_hierarchical_recursive(level_code))
        })
    }

    pub fn has_hierarchical_specs(&self) -> bool {
        !self.hierarchical_loops.is_empty()
    }
}

impl LoopSpecification {
    /// Loop entry: the segment id must equal the starting segment, and when
    /// entity identifiers are present, element 1 must be one of them.
    pub fn matches(&self, segment: &Segment) -> bool {
        if segment.id() != self.starting_segment {
            return false;
        }
        self.entity_identifiers.is_empty()
            || self
                .entity_identifiers
                .iter()
                .any(|code| code == segment.element(1))
    }

    pub fn allows_segment(&self, segment_id: &str) -> bool {
        self.segments.iter().any(|s| s.segment_id == segment_id)
    }

    pub fn find_loop(&self, segment: &Segment) -> Option<&Arc<LoopSpecification>> {
        self.loops.iter().find(|l| l.matches(segment))
    }
}

impl HierarchicalLoopSpecification {
    pub fn allows_segment(&self, segment_id: &str) -> bool {
        self.segments.iter().any(|s| s.segment_id == segment_id)
    }

    pub fn find_loop(&self, segment: &Segment) -> Option<&Arc<LoopSpecification>> {
        self.loops.iter().find(|l| l.matches(segment))
    }

    pub fn find_hierarchical(&self, level_code: &str) -> Option<&Arc<HierarchicalLoopSpecification>> {
        self.hierarchical_loops
            .iter()
            .find(|h| h.level_code == level_code)
    }

    /// Direct children first, then descendant levels.
    pub fn find_hierarchical_recursive(
        &self,
        level_code: &str,
    ) -> Option<&Arc<HierarchicalLoopSpecification>> {
        self.find_hierarchical(level_code).or_else(|| {
            self.hierarchical_loops
                .iter()
                .find_map(|h| h.find_hierarchical_recursive(level_code))
        })
    }

    pub fn has_hierarchical_specs(&self) -> bool {
        !self.hierarchical_loops.is_empty()
    }
}

/// Errors raised while loading specification documents.
#[derive(Debug)]
pub enum SpecificationError {
    Io(io::Error),
    Parse { source_name: String, message: String },
}

impl fmt::Display for SpecificationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SpecificationError::Io(err) => write!(f, "I/O error loading specification: {}", err),
            SpecificationError::Parse {
                source_name,
                message,
            } => write!(f, "Specification '{}' failed to parse: {}", source_name, message),
        }
    }
}

impl std::error::Error for SpecificationError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            SpecificationError::Io(err) => Some(err),
            _ => None,
        }
    }
}

/// Resolves a transaction specification for an `ST` segment.
///
/// Called once per transaction with the functional group code (GS01), the
/// version (GS08), and the transaction set identifier code (ST01). The
/// returned specification is immutable; finders must be shareable across
/// threads.
pub trait SpecificationFinder: Send + Sync {
    fn find_transaction_spec(
        &self,
        functional_group_code: &str,
        version: &str,
        transaction_set_id: &str,
    ) -> Option<Arc<TransactionSpecification>>;
}

/// Specification documents compiled into the library.
static EMBEDDED_CATALOG: Lazy<Vec<Arc<TransactionSpecification>>> = Lazy::new(|| {
    const SOURCES: &[(&str, &str)] = &[(
        "837-professional.json",
        include_str!("specs/837-professional.json"),
    )];
    SOURCES
        .iter()
        .map(|(name, text)| {
            let spec: TransactionSpecification = serde_json::from_str(text)
                .unwrap_or_else(|err| panic!("embedded specification {} is invalid: {}", name, err));
            Arc::new(spec)
        })
        .collect()
});

/// Finder over the embedded specification catalog. This is the default
/// finder a parser is constructed with.
#[derive(Debug, Clone, Default)]
pub struct EmbeddedSpecificationFinder;

impl SpecificationFinder for EmbeddedSpecificationFinder {
    fn find_transaction_spec(
        &self,
        functional_group_code: &str,
        version: &str,
        transaction_set_id: &str,
    ) -> Option<Arc<TransactionSpecification>> {
        EMBEDDED_CATALOG
            .iter()
            .find(|spec| spec.serves(functional_group_code, version, transaction_set_id))
            .cloned()
    }
}

/// Finder over a directory of `*.json` specification documents, loaded
/// eagerly at construction.
#[derive(Debug, Clone)]
pub struct FileSpecificationFinder {
    specifications: Vec<Arc<TransactionSpecification>>,
}

impl FileSpecificationFinder {
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Self, SpecificationError> {
        let mut specifications = Vec::new();
        let entries = fs::read_dir(dir.as_ref()).map_err(SpecificationError::Io)?;
        for entry in entries {
            let entry = entry.map_err(SpecificationError::Io)?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let text = fs::read_to_string(&path).map_err(SpecificationError::Io)?;
            let spec: TransactionSpecification =
                serde_json::from_str(&text).map_err(|err| SpecificationError::Parse {
                    source_name: path.display().to_string(),
                    message: err.to_string(),
                })?;
            specifications.push(Arc::new(spec));
        }
        Ok(FileSpecificationFinder { specifications })
    }

    pub fn len(&self) -> usize {
        self.specifications.len()
    }

    pub fn is_empty(&self) -> bool {
        self.specifications.is_empty()
    }
}

impl SpecificationFinder for FileSpecificationFinder {
    fn find_transaction_spec(
        &self,
        functional_group_code: &str,
        version: &str,
        transaction_set_id: &str,
    ) -> Option<Arc<TransactionSpecification>> {
        self.specifications
            .iter()
            .find(|spec| spec.serves(functional_group_code, version, transaction_set_id))
            .cloned()
    }
}

/// Chains finders, first match wins.
pub struct CompositeSpecificationFinder {
    finders: Vec<Arc<dyn SpecificationFinder>>,
}

impl CompositeSpecificationFinder {
    pub fn new(finders: Vec<Arc<dyn SpecificationFinder>>) -> Self {
        CompositeSpecificationFinder { finders }
    }
}

impl SpecificationFinder for CompositeSpecificationFinder {
    fn find_transaction_spec(
        &self,
        functional_group_code: &str,
        version: &str,
        transaction_set_id: &str,
    ) -> Option<Arc<TransactionSpecification>> {
        self.finders.iter().find_map(|finder| {
            finder.find_transaction_spec(functional_group_code, version, transaction_set_id)
        })
    }
}

/// In-memory finder, useful for tests and for callers that assemble
/// specifications programmatically.
#[derive(Default)]
pub struct MapSpecificationFinder {
    by_transaction_set: HashMap<String, Arc<TransactionSpecification>>,
}

impl MapSpecificationFinder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, spec: TransactionSpecification) {
        self.by_transaction_set
            .insert(spec.transaction_set.clone(), Arc::new(spec));
    }
}

impl SpecificationFinder for MapSpecificationFinder {
    fn find_transaction_spec(
        &self,
        functional_group_code: &str,
        version: &str,
        transaction_set_id: &str,
    ) -> Option<Arc<TransactionSpecification>> {
        self.by_transaction_set
            .get(transaction_set_id)
            .filter(|spec| spec.serves(functional_group_code, version, transaction_set_id))
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::x12::segment::Delimiters;

    fn segment(value: &str) -> Segment {
        Segment::new(value, &Delimiters::canonical())
    }

    #[test]
    fn test_embedded_catalog_parses() {
        assert!(!EMBEDDED_CATALOG.is_empty());
    }

    #[test]
    fn test_embedded_finder_serves_837_both_versions() {
        let finder = EmbeddedSpecificationFinder;
        for version in ["004010X098A1", "005010X222A1"] {
            let spec = finder
                .find_transaction_spec("HC", version, "837")
                .expect("837 specification should be embedded");
            assert_eq!(spec.transaction_set, "837");
            assert!(spec.has_hierarchical_specs());
        }
        assert!(finder.find_transaction_spec("HP", "004010", "835").is_none());
    }

    #[test]
    fn test_entity_identifiers_disambiguate_sibling_loops() {
        let finder = EmbeddedSpecificationFinder;
        let spec = finder
            .find_transaction_spec("HC", "004010X098A1", "837")
            .unwrap();

        let submitter = spec
            .find_loop(&segment("NM1*41*2*PREMIER BILLING*****46*TGJ23"))
            .expect("submitter NM1 should enter a loop");
        assert_eq!(submitter.loop_id, "1000A");

        let receiver = spec
            .find_loop(&segment("NM1*40*2*KEY INSURANCE*****46*66783JJT"))
            .expect("receiver NM1 should enter a loop");
        assert_eq!(receiver.loop_id, "1000B");

        assert!(spec.find_loop(&segment("NM1*85*2*PROVIDER")).is_none());
    }

    #[test]
    fn test_hierarchical_levels_nest() {
        let finder = EmbeddedSpecificationFinder;
        let spec = finder
            .find_transaction_spec("HC", "004010X098A1", "837")
            .unwrap();

        let billing = spec.find_hierarchical("20").expect("level 20 at the top");
        assert_eq!(billing.loop_id, "2000A");
        assert!(spec.find_hierarchical("22").is_none());

        let subscriber = billing
            .find_hierarchical("22")
            .expect("level 22 under level 20");
        assert_eq!(subscriber.loop_id, "2000B");
        assert!(subscriber.find_hierarchical("23").is_some());
    }

    #[test]
    fn test_claim_loop_reachable_from_subscriber() {
        let finder = EmbeddedSpecificationFinder;
        let spec = finder
            .find_transaction_spec("HC", "004010X098A1", "837")
            .unwrap();
        let subscriber = spec
            .find_hierarchical("20")
            .and_then(|l| l.find_hierarchical("22"))
            .unwrap();

        let claim = subscriber
            .find_loop(&segment("CLM*A37YH556*500***11::1*Y*A*Y*Y*C"))
            .expect("CLM should enter the claim loop");
        assert_eq!(claim.loop_id, "2300");
        assert!(claim.allows_segment("HI"));
        assert!(claim
            .find_loop(&segment("LX*1"))
            .map(|l| l.loop_id == "2400")
            .unwrap_or(false));
    }

    #[test]
    fn test_serves_matches_version_prefix() {
        let spec = TransactionSpecification {
            transaction_set: "837".to_string(),
            functional_group: "HC".to_string(),
            versions: vec!["004010".to_string()],
            segments: vec![],
            loops: vec![],
            hierarchical_loops: vec![],
        };
        assert!(spec.serves("HC", "004010X098A1", "837"));
        assert!(!spec.serves("HC", "005010X222A1", "837"));
        assert!(!spec.serves("HP", "004010X098A1", "837"));
    }

    #[test]
    fn test_map_finder_round_trip() {
        let mut finder = MapSpecificationFinder::new();
        finder.insert(TransactionSpecification {
            transaction_set: "999".to_string(),
            functional_group: "FA".to_string(),
            versions: vec![],
            segments: vec![SegmentSpecification {
                segment_id: "AK1".to_string(),
            }],
            loops: vec![],
            hierarchical_loops: vec![],
        });
        let spec = finder.find_transaction_spec("FA", "005010", "999").unwrap();
        assert!(spec.allows_segment("AK1"));
        assert!(finder.find_transaction_spec("HC", "005010", "837").is_none());
    }
}
