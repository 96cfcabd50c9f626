use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::document::Document;
use crate::schema::{Field, Indexing};
use crate::tokenizer::{normalize_keyword, Analyzer};

pub type TermId = u32;
/// Internal document ordinal. Assigned in increasing order, never reused.
pub type DocOrd = u32;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Posting {
    pub doc: DocOrd,
    pub tf: u32,
    pub positions: Vec<u32>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InvertedIndex {
    dictionary: HashMap<String, TermId>,
    postings: HashMap<(Field, TermId), Vec<Posting>>, // postings sorted by doc
    doc_ords: HashMap<String, DocOrd>,
    doc_ids: HashMap<DocOrd, String>,
    next_term_id: TermId,
    next_doc: DocOrd,
}

impl InvertedIndex {
    pub fn new() -> Self { Self::default() }

    pub fn num_docs(&self) -> u32 { self.doc_ords.len() as u32 }

    pub fn num_terms(&self) -> usize { self.dictionary.len() }

    pub fn contains(&self, doc_id: &str) -> bool { self.doc_ords.contains_key(doc_id) }

    /// Index the searchable fields of `doc`. Re-adding an existing `doc_id`
    /// drops its old postings first.
    pub fn add(&mut self, doc: &Document, analyzer: &dyn Analyzer) {
        if self.contains(&doc.doc_id) {
            self.remove(&doc.doc_id);
        }
        let ord = self.next_doc;
        self.next_doc += 1;
        self.doc_ords.insert(doc.doc_id.clone(), ord);
        self.doc_ids.insert(ord, doc.doc_id.clone());

        for field in Field::ALL {
            let tokens: Vec<(String, usize)> = match field.indexing() {
                Indexing::None => continue,
                Indexing::Analyzed => match field {
                    Field::Title => analyzer.analyze(&doc.title),
                    Field::Content => analyzer.analyze(&doc.content),
                    _ => continue,
                },
                Indexing::Keyword => match field {
                    Field::SubjectId => doc
                        .subject_id
                        .as_deref()
                        .and_then(normalize_keyword)
                        .map(|k| vec![(k, 0)])
                        .unwrap_or_default(),
                    _ => continue,
                },
            };

            let mut by_term: HashMap<TermId, Vec<u32>> = HashMap::new();
            for (term, pos) in tokens {
                let tid = self.intern(term);
                by_term.entry(tid).or_default().push(pos as u32);
            }
            for (tid, positions) in by_term {
                self.postings
                    .entry((field, tid))
                    .or_default()
                    .push(Posting { doc: ord, tf: positions.len() as u32, positions });
            }
        }
    }

    /// Remove every posting of `doc_id`. Returns false if it was not indexed.
    pub fn remove(&mut self, doc_id: &str) -> bool {
        let Some(ord) = self.doc_ords.remove(doc_id) else { return false };
        self.doc_ids.remove(&ord);
        self.postings.retain(|_, plist| {
            plist.retain(|p| p.doc != ord);
            !plist.is_empty()
        });
        true
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn term_id(&self, term: &str) -> Option<TermId> {
        self.dictionary.get(term).copied()
    }

    pub fn postings(&self, field: Field, term: &str) -> &[Posting] {
        self.term_id(term)
            .and_then(|tid| self.postings.get(&(field, tid)))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of documents whose `field` contains `term`.
    pub fn df(&self, field: Field, term: &str) -> u32 {
        self.postings(field, term).len() as u32
    }

    pub fn posting(&self, field: Field, term: &str, doc: DocOrd) -> Option<&Posting> {
        let plist = self.postings(field, term);
        plist.binary_search_by_key(&doc, |p| p.doc).ok().map(|i| &plist[i])
    }

    pub fn doc_id(&self, ord: DocOrd) -> Option<&str> {
        self.doc_ids.get(&ord).map(String::as_str)
    }

    fn intern(&mut self, term: String) -> TermId {
        let next = &mut self.next_term_id;
        *self.dictionary.entry(term).or_insert_with(|| {
            let id = *next;
            *next += 1;
            id
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::{tokenize, StemmingAnalyzer};
    use time::macros::date;

    fn doc(id: &str, title: &str, subject: Option<&str>, content: &str) -> Document {
        Document {
            doc_id: id.into(),
            title: title.into(),
            subject_id: subject.map(Into::into),
            date: date!(2024 - 01 - 05),
            content: content.into(),
        }
    }

    fn stem(word: &str) -> String {
        tokenize(word).remove(0).0
    }

    #[test]
    fn records_term_frequency_and_positions_per_field() {
        let mut index = InvertedIndex::new();
        index.add(&doc("a", "Chest Xray", Some("P1"), "fracture, old fracture of rib"), &StemmingAnalyzer);

        let fracture = stem("fracture");
        let p = &index.postings(Field::Content, &fracture)[0];
        assert_eq!(p.tf, 2);
        assert_eq!(p.positions, vec![0, 2]);
        assert!(index.postings(Field::Title, &fracture).is_empty());
        assert_eq!(index.df(Field::SubjectId, "p1"), 1);
        assert_eq!(index.num_docs(), 1);
    }

    #[test]
    fn reindexing_a_doc_leaves_no_stale_postings() {
        let mut index = InvertedIndex::new();
        index.add(&doc("a", "Report", None, "glucose"), &StemmingAnalyzer);
        index.add(&doc("a", "Report", None, "fracture"), &StemmingAnalyzer);

        assert_eq!(index.num_docs(), 1);
        assert_eq!(index.df(Field::Content, &stem("glucose")), 0);
        assert_eq!(index.df(Field::Content, &stem("fracture")), 1);
    }

    #[test]
    fn postings_stay_sorted_by_ordinal() {
        let mut index = InvertedIndex::new();
        for id in ["x", "y", "z"] {
            index.add(&doc(id, "Blood Panel", None, ""), &StemmingAnalyzer);
        }
        let ords: Vec<DocOrd> = index.postings(Field::Title, &stem("blood")).iter().map(|p| p.doc).collect();
        assert_eq!(ords, vec![0, 1, 2]);
        assert!(index.posting(Field::Title, &stem("blood"), 1).is_some());
        assert_eq!(index.doc_id(2), Some("z"));
    }

    #[test]
    fn remove_and_clear() {
        let mut index = InvertedIndex::new();
        index.add(&doc("a", "Blood Panel", Some("P2"), "normal glucose"), &StemmingAnalyzer);
        assert!(index.remove("a"));
        assert!(!index.remove("a"));
        assert_eq!(index.df(Field::SubjectId, "p2"), 0);
        index.add(&doc("b", "Blood Panel", None, ""), &StemmingAnalyzer);
        index.clear();
        assert_eq!(index.num_docs(), 0);
        assert_eq!(index.num_terms(), 0);
    }
}
