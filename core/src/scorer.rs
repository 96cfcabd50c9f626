use serde::Serialize;
use std::cmp::{Ordering, Reverse};
use std::collections::{BinaryHeap, HashMap};

use crate::config::IdfMode;
use crate::index::{DocOrd, InvertedIndex, Posting};
use crate::query::{Disjunct, Match, Query};

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScoredDoc {
    pub doc_id: String,
    pub score: f32,
}

impl Eq for ScoredDoc {}

/// Rank order: higher score first, then `doc_id` ascending. `Greater` means ranked higher.
impl Ord for ScoredDoc {
    fn cmp(&self, other: &Self) -> Ordering {
        self.score
            .total_cmp(&other.score)
            .then_with(|| other.doc_id.cmp(&self.doc_id))
    }
}

impl PartialOrd for ScoredDoc {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[derive(Default)]
struct Acc {
    score: f32,
    matched_groups: u32,
    last_group: Option<usize>,
}

fn tf_weight(tf: u32) -> f32 {
    if tf > 0 { 1.0 + (tf as f32).ln() } else { 0.0 }
}

/// Rank every document matching any disjunct of `query`, returning at most `limit`
/// results ordered best first.
///
/// A document's score is the sum over matched disjuncts of `(1 + ln tf) * idf`,
/// scaled by the fraction of query clauses it matched.
pub fn score(query: &Query, index: &InvertedIndex, idf: IdfMode, limit: usize) -> Vec<ScoredDoc> {
    let n = index.num_docs();
    if query.is_empty() || n == 0 || limit == 0 {
        return Vec::new();
    }

    let mut accs: HashMap<DocOrd, Acc> = HashMap::new();
    for disjunct in &query.disjuncts {
        for (doc, w) in matches(disjunct, index, idf, n) {
            let acc = accs.entry(doc).or_default();
            acc.score += w;
            if acc.last_group != Some(disjunct.group) {
                acc.last_group = Some(disjunct.group);
                acc.matched_groups += 1;
            }
        }
    }

    let groups = query.groups.max(1) as f32;
    let mut heap: BinaryHeap<Reverse<ScoredDoc>> = BinaryHeap::with_capacity(limit + 1);
    for (ord, acc) in accs {
        let Some(doc_id) = index.doc_id(ord) else { continue };
        let coord = acc.matched_groups as f32 / groups;
        heap.push(Reverse(ScoredDoc { doc_id: doc_id.to_string(), score: acc.score * coord }));
        if heap.len() > limit {
            heap.pop();
        }
    }
    let mut results: Vec<ScoredDoc> = heap.into_iter().map(|Reverse(d)| d).collect();
    results.sort_unstable_by(|a, b| b.cmp(a));
    results
}

/// (document, weight) pairs for every document the disjunct matches.
fn matches(disjunct: &Disjunct, index: &InvertedIndex, idf: IdfMode, n: u32) -> Vec<(DocOrd, f32)> {
    let field = disjunct.field;
    match &disjunct.matcher {
        Match::Term(term) => {
            let plist = index.postings(field, term);
            let w_idf = idf.idf(n, plist.len() as u32);
            plist.iter().map(|p| (p.doc, tf_weight(p.tf) * w_idf)).collect()
        }
        Match::Phrase(terms) => {
            let Some(((first, _), rest)) = terms.split_first() else { return Vec::new() };
            let mean_idf = terms
                .iter()
                .map(|(t, _)| idf.idf(n, index.df(field, t)))
                .sum::<f32>()
                / terms.len() as f32;

            let mut out = Vec::new();
            for p in index.postings(field, first) {
                let others: Option<Vec<(&Posting, u32)>> = rest
                    .iter()
                    .map(|(t, off)| index.posting(field, t, p.doc).map(|q| (q, *off)))
                    .collect();
                let Some(others) = others else { continue };
                let occurrences = p
                    .positions
                    .iter()
                    .filter(|&&start| {
                        others.iter().all(|(q, off)| q.positions.binary_search(&(start + off)).is_ok())
                    })
                    .count() as u32;
                if occurrences > 0 {
                    out.push((p.doc, tf_weight(occurrences) * mean_idf));
                }
            }
            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::Document;
    use crate::schema::Field;
    use crate::query::QueryParser;
    use crate::tokenizer::StemmingAnalyzer;
    use time::macros::date;

    fn index_of(docs: &[(&str, &str, &str)]) -> InvertedIndex {
        let mut index = InvertedIndex::new();
        for (id, title, content) in docs {
            let d = Document {
                doc_id: (*id).into(),
                title: (*title).into(),
                subject_id: None,
                date: date!(2024 - 01 - 01),
                content: (*content).into(),
            };
            index.add(&d, &StemmingAnalyzer);
        }
        index
    }

    fn run(index: &InvertedIndex, q: &str, limit: usize) -> Vec<ScoredDoc> {
        let query = QueryParser::new(&Field::DEFAULT_SEARCH, &StemmingAnalyzer).parse(q).unwrap();
        score(&query, index, IdfMode::Smoothed, limit)
    }

    fn ids(results: &[ScoredDoc]) -> Vec<&str> {
        results.iter().map(|r| r.doc_id.as_str()).collect()
    }

    #[test]
    fn more_matched_terms_rank_higher() {
        let index = index_of(&[("a", "x", "rib fracture"), ("b", "x", "rib"), ("c", "x", "fracture")]);
        let r = run(&index, "rib fracture", 10);
        assert_eq!(r[0].doc_id, "a");
        assert!(r[0].score > r[1].score);
    }

    #[test]
    fn repeated_rare_term_beats_single_occurrence() {
        let index = index_of(&[("a", "x", "nodule"), ("b", "x", "nodule nodule nodule"), ("c", "x", "clear")]);
        assert_eq!(ids(&run(&index, "nodule", 10)), vec!["b", "a"]);
    }

    #[test]
    fn ties_break_by_doc_id() {
        let index = index_of(&[("b", "x", "glucose"), ("a", "x", "glucose"), ("c", "x", "glucose")]);
        let r = run(&index, "glucose", 10);
        assert_eq!(ids(&r), vec!["a", "b", "c"]);
        assert_eq!(r[0].score, r[2].score);
    }

    #[test]
    fn limit_keeps_the_best() {
        let index = index_of(&[("a", "x", "cyst"), ("b", "x", "cyst cyst cyst cyst"), ("c", "x", "cyst cyst")]);
        assert_eq!(ids(&run(&index, "cyst", 2)), vec!["b", "c"]);
    }

    #[test]
    fn phrases_require_adjacent_positions() {
        let index = index_of(&[("a", "x", "fracture of left rib"), ("b", "x", "left arm, rib fracture")]);
        assert_eq!(ids(&run(&index, "\"left rib\"", 10)), vec!["a"]);
        assert_eq!(ids(&run(&index, "\"fracture of left\"", 10)), vec!["a"]);
    }

    #[test]
    fn title_and_content_both_count() {
        let index = index_of(&[("a", "Chest Xray", "chest pain"), ("b", "Blood Panel", "chest")]);
        assert_eq!(ids(&run(&index, "chest", 10)), vec!["a", "b"]);
    }

    #[test]
    fn empty_inputs_score_nothing() {
        let index = index_of(&[]);
        assert!(run(&index, "anything", 10).is_empty());
        let index = index_of(&[("a", "x", "y")]);
        assert!(run(&index, "the", 10).is_empty());
    }
}
