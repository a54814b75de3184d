//! Deterministic text normalization and alias matching
//!
//! Every entity resolver goes through this module. Matching runs two ordered
//! passes: exact equality of the normalized query against a record's
//! normalized canonical name or aliases, then substring containment only if
//! the exact pass found nothing. The staged policy keeps short aliases
//! ("ha") from triggering false ambiguity against longer ones ("haifa")
//! whenever an exact match exists elsewhere.

use serde::{Deserialize, Serialize};
use tracing::{debug, trace};

/// Lowercase, collapse non-alphanumeric runs to single spaces, trim.
///
/// ASCII alphanumerics and Hebrew-range codepoints (U+0590..U+05FF) are
/// preserved; everything else collapses to a single separating space.
/// Idempotent: `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_space = false;

    for ch in text.chars() {
        let keep = ch.is_ascii_alphanumeric() || ('\u{0590}'..='\u{05FF}').contains(&ch);
        if keep {
            if pending_space && !out.is_empty() {
                out.push(' ');
            }
            pending_space = false;
            out.push(ch.to_ascii_lowercase());
        } else {
            pending_space = true;
        }
    }

    out
}

/// How a query matched a record's alias
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    /// Normalized query equals the normalized alias
    Exact,
    /// Normalized query is contained in the normalized alias
    Substring,
}

/// Which alias matched and how
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchProvenance {
    /// The alias (or canonical name) that matched, as stored in the catalog
    pub alias: String,
    /// Exact or substring match
    pub kind: MatchKind,
}

/// A candidate record surfaced on an ambiguous match
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    pub id: String,
    pub display_name: String,
}

/// Outcome of resolving a free-text mention against a reference set
#[derive(Debug, Clone, PartialEq)]
pub enum MatchOutcome<T> {
    /// Exactly one record matched
    Found {
        record: T,
        provenance: MatchProvenance,
    },
    /// No record matched in either pass
    NotFound,
    /// Two or more distinct records matched, in reference-set scan order
    Ambiguous { candidates: Vec<Candidate> },
}

impl<T> MatchOutcome<T> {
    pub fn is_found(&self) -> bool {
        matches!(self, MatchOutcome::Found { .. })
    }
}

/// A catalog record that can be matched by display name or alias
pub trait AliasRecord {
    fn record_id(&self) -> &str;
    fn display_name(&self) -> &str;
    fn aliases(&self) -> &[String];
}

/// Match a free-text query against a reference set.
///
/// Each record contributes at most one match: its canonical name is tried
/// first, then its aliases in stored order. Records are scanned in slice
/// order and the result preserves that order, so ambiguity candidate lists
/// are deterministic.
pub fn match_candidates<T: AliasRecord + Clone>(query: &str, records: &[T]) -> MatchOutcome<T> {
    let q = normalize(query);
    if q.is_empty() {
        trace!("empty query after normalization");
        return MatchOutcome::NotFound;
    }

    let mut matched = scan(&q, records, MatchKind::Exact);
    if matched.is_empty() {
        matched = scan(&q, records, MatchKind::Substring);
    }

    debug!(
        query = %q,
        match_count = matched.len(),
        "alias matching complete"
    );

    match matched.len() {
        0 => MatchOutcome::NotFound,
        1 => {
            let (record, provenance) = matched.remove(0);
            MatchOutcome::Found { record, provenance }
        }
        _ => MatchOutcome::Ambiguous {
            candidates: matched
                .into_iter()
                .map(|(r, _)| Candidate {
                    id: r.record_id().to_string(),
                    display_name: r.display_name().to_string(),
                })
                .collect(),
        },
    }
}

fn scan<T: AliasRecord + Clone>(
    normalized_query: &str,
    records: &[T],
    kind: MatchKind,
) -> Vec<(T, MatchProvenance)> {
    let mut matched = Vec::new();

    for record in records {
        let candidates =
            std::iter::once(record.display_name()).chain(record.aliases().iter().map(|a| a.as_str()));

        // First alias that matches wins for this record.
        for alias in candidates {
            let alias_norm = normalize(alias);
            if alias_norm.is_empty() {
                continue;
            }
            let hit = match kind {
                MatchKind::Exact => alias_norm == normalized_query,
                MatchKind::Substring => alias_norm.contains(normalized_query),
            };
            if hit {
                trace!(
                    record_id = record.record_id(),
                    alias = %alias,
                    kind = ?kind,
                    "alias hit"
                );
                matched.push((
                    record.clone(),
                    MatchProvenance {
                        alias: alias.to_string(),
                        kind,
                    },
                ));
                break;
            }
        }
    }

    matched
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Rec {
        id: &'static str,
        name: &'static str,
        aliases: Vec<String>,
    }

    impl AliasRecord for Rec {
        fn record_id(&self) -> &str {
            self.id
        }
        fn display_name(&self) -> &str {
            self.name
        }
        fn aliases(&self) -> &[String] {
            &self.aliases
        }
    }

    fn rec(id: &'static str, name: &'static str, aliases: &[&str]) -> Rec {
        Rec {
            id,
            name,
            aliases: aliases.iter().map(|s| s.to_string()).collect(),
        }
    }

    #[test]
    fn test_normalize_lowercases_and_collapses() {
        assert_eq!(normalize("  Tel-Aviv!!  Center "), "tel aviv center");
        assert_eq!(normalize("IBUPROFEN"), "ibuprofen");
        assert_eq!(normalize("a   b\t\nc"), "a b c");
    }

    #[test]
    fn test_normalize_preserves_hebrew() {
        assert_eq!(normalize(" אדביל? "), "אדביל");
        assert_eq!(normalize("תל-אביב"), "תל אביב");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        for s in ["  Hello, World!  ", "תל-אביב", "a--b__c", "", "???"] {
            let once = normalize(s);
            assert_eq!(normalize(&once), once, "normalize not idempotent for {s:?}");
        }
    }

    #[test]
    fn test_match_not_found_on_no_hit() {
        let records = vec![rec("m1", "Ibuprofen", &["Advil"])];
        let outcome = match_candidates("zzz", &records);
        assert_eq!(outcome, MatchOutcome::NotFound);
    }

    #[test]
    fn test_match_empty_query_is_not_found() {
        let records = vec![rec("m1", "Ibuprofen", &["Advil"])];
        assert_eq!(match_candidates("  ?! ", &records), MatchOutcome::NotFound);
    }

    #[test]
    fn test_exact_match_single_record() {
        let records = vec![
            rec("m1", "Ibuprofen", &["Advil", "Nurofen"]),
            rec("m2", "Paracetamol", &["Tylenol"]),
        ];
        match match_candidates("advil", &records) {
            MatchOutcome::Found { record, provenance } => {
                assert_eq!(record.id, "m1");
                assert_eq!(provenance.alias, "Advil");
                assert_eq!(provenance.kind, MatchKind::Exact);
            }
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[test]
    fn test_exact_match_suppresses_substring_pass() {
        // "ha" is an exact alias of Haifa and a substring of "Hadera";
        // the exact hit must win with no ambiguity.
        let records = vec![
            rec("b1", "Haifa", &["ha"]),
            rec("b2", "Hadera", &["hadera north"]),
        ];
        match match_candidates("ha", &records) {
            MatchOutcome::Found { record, provenance } => {
                assert_eq!(record.id, "b1");
                assert_eq!(provenance.kind, MatchKind::Exact);
            }
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[test]
    fn test_substring_match_when_no_exact_hit() {
        let records = vec![rec("m3", "Amoxicillin", &["Amoxil"])];
        match match_candidates("amoxi", &records) {
            MatchOutcome::Found { record, provenance } => {
                assert_eq!(record.id, "m3");
                assert_eq!(provenance.kind, MatchKind::Substring);
            }
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[test]
    fn test_ambiguous_preserves_scan_order() {
        // Neither record carries "amox" as an exact alias, so both hits
        // come from the substring pass.
        let records = vec![
            rec("m3", "Amoxicillin", &["Amoxil"]),
            rec("m9", "Amoxiclav", &["Augmentin"]),
        ];
        match match_candidates("amox", &records) {
            MatchOutcome::Ambiguous { candidates } => {
                assert!(candidates.len() >= 2);
                assert_eq!(candidates[0].id, "m3");
                assert_eq!(candidates[1].id, "m9");
            }
            other => panic!("expected Ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn test_ambiguous_on_shared_exact_alias() {
        let records = vec![
            rec("m3", "Amoxicillin", &["Amox"]),
            rec("m9", "Amoxiclav", &["Amox"]),
        ];
        match match_candidates("amox", &records) {
            MatchOutcome::Ambiguous { candidates } => {
                assert_eq!(candidates.len(), 2);
                assert_eq!(candidates[0].id, "m3");
                assert_eq!(candidates[1].id, "m9");
            }
            other => panic!("expected Ambiguous, got {other:?}"),
        }
    }

    #[test]
    fn test_record_contributes_at_most_one_match() {
        // Both aliases of the same record match; the record must appear once.
        let records = vec![rec("m1", "Ibuprofen", &["ibu", "ibu forte"])];
        match match_candidates("ibu", &records) {
            MatchOutcome::Found { provenance, .. } => {
                assert_eq!(provenance.alias, "ibu");
            }
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[test]
    fn test_hebrew_alias_match() {
        let records = vec![rec("m1", "Ibuprofen", &["אדביל"])];
        match match_candidates("אדביל!", &records) {
            MatchOutcome::Found { record, .. } => assert_eq!(record.id, "m1"),
            other => panic!("expected Found, got {other:?}"),
        }
    }
}
