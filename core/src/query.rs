use crate::error::{Result, SearchError};
use crate::schema::{Field, Indexing};
use crate::tokenizer::{normalize_keyword, Analyzer};

/// One whitespace-delimited word or quoted phrase, before analysis.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawClause {
    pub field: Option<Field>,
    pub text: String,
    pub phrase: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Match {
    Term(String),
    /// Terms with their offsets relative to the first term.
    Phrase(Vec<(String, u32)>),
}

/// A single (field, term-or-phrase) alternative. `group` identifies the query
/// clause it came from so the scorer can count distinct matched clauses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Disjunct {
    pub group: usize,
    pub field: Field,
    pub matcher: Match,
}

/// A parsed query: the OR of all disjuncts.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Query {
    pub disjuncts: Vec<Disjunct>,
    pub groups: usize,
    /// Clause texts as typed, for snippet selection.
    pub raw_terms: Vec<String>,
}

impl Query {
    pub fn is_empty(&self) -> bool {
        self.disjuncts.is_empty()
    }
}

pub struct QueryParser<'a> {
    fields: Vec<Field>,
    analyzer: &'a dyn Analyzer,
}

impl<'a> QueryParser<'a> {
    pub fn new(fields: &[Field], analyzer: &'a dyn Analyzer) -> Self {
        Self { fields: fields.iter().copied().filter(|f| f.is_searchable()).collect(), analyzer }
    }

    pub fn parse(&self, query_text: &str) -> Result<Query> {
        let clauses = lex(query_text)?;
        let mut query = Query::default();

        for clause in clauses {
            let fields = match clause.field {
                Some(f) => vec![f],
                None => self.fields.clone(),
            };
            let group = query.groups;
            let before = query.disjuncts.len();
            for field in fields {
                if let Some(matcher) = self.analyze(field, &clause) {
                    query.disjuncts.push(Disjunct { group, field, matcher });
                }
            }
            query.raw_terms.push(clause.text);
            if query.disjuncts.len() > before {
                query.groups += 1;
            }
        }
        Ok(query)
    }

    fn analyze(&self, field: Field, clause: &RawClause) -> Option<Match> {
        match field.indexing() {
            Indexing::None => None,
            Indexing::Keyword => normalize_keyword(&clause.text).map(Match::Term),
            Indexing::Analyzed => {
                let mut tokens = self.analyzer.analyze(&clause.text);
                match tokens.len() {
                    0 => None,
                    1 => tokens.pop().map(|(t, _)| Match::Term(t)),
                    _ => {
                        let first = tokens[0].1;
                        Some(Match::Phrase(tokens.into_iter().map(|(t, p)| (t, (p - first) as u32)).collect()))
                    }
                }
            }
        }
    }
}

/// Split query text into clauses: bare words, `"quoted phrases"`, and either
/// form prefixed with a searchable field name and `:`. Any other `word:` is
/// plain text. Only an unbalanced quote is a syntax error.
pub fn lex(text: &str) -> Result<Vec<RawClause>> {
    let mut clauses = Vec::new();
    let mut chars = text.chars();
    let mut word = String::new();

    loop {
        match chars.next() {
            Some('"') => {
                let field = word.strip_suffix(':').and_then(field_prefix);
                if field.is_none() && !word.is_empty() {
                    clauses.push(word_clause(std::mem::take(&mut word)));
                }
                word.clear();
                let mut phrase = String::new();
                let mut closed = false;
                for c in chars.by_ref() {
                    if c == '"' {
                        closed = true;
                        break;
                    }
                    phrase.push(c);
                }
                if !closed {
                    return Err(SearchError::QuerySyntax("unbalanced quote".into()));
                }
                let phrase = phrase.trim().to_string();
                if !phrase.is_empty() {
                    clauses.push(RawClause { field, text: phrase, phrase: true });
                }
            }
            Some(c) if c.is_whitespace() => {
                if !word.is_empty() {
                    clauses.push(word_clause(std::mem::take(&mut word)));
                }
            }
            Some(c) => word.push(c),
            None => {
                if !word.is_empty() {
                    clauses.push(word_clause(word));
                }
                break;
            }
        }
    }
    Ok(clauses)
}

/// The searchable field `name` refers to, if any.
fn field_prefix(name: &str) -> Option<Field> {
    name.parse::<Field>().ok().filter(|f| f.is_searchable())
}

fn word_clause(word: String) -> RawClause {
    if let Some((name, value)) = word.split_once(':') {
        if let Some(field) = field_prefix(name) {
            if !value.is_empty() {
                return RawClause { field: Some(field), text: value.to_string(), phrase: false };
            }
        }
    }
    RawClause { field: None, text: word, phrase: false }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tokenizer::{tokenize, StemmingAnalyzer};

    fn parse(text: &str) -> Result<Query> {
        QueryParser::new(&Field::DEFAULT_SEARCH, &StemmingAnalyzer).parse(text)
    }

    #[test]
    fn bare_words_expand_across_all_fields() {
        let q = parse("fracture glucose").unwrap();
        assert_eq!(q.groups, 2);
        assert_eq!(q.disjuncts.len(), 6);
        let fields: Vec<Field> = q.disjuncts.iter().filter(|d| d.group == 0).map(|d| d.field).collect();
        assert_eq!(fields, vec![Field::Title, Field::Content, Field::SubjectId]);
    }

    #[test]
    fn subject_terms_are_keywords_not_stems() {
        let q = parse("subject_id:P1").unwrap();
        assert_eq!(q.disjuncts, vec![Disjunct { group: 0, field: Field::SubjectId, matcher: Match::Term("p1".into()) }]);
    }

    #[test]
    fn quoted_phrases_keep_offsets() {
        let q = parse("content:\"fracture of left rib\"").unwrap();
        let stem = |w: &str| tokenize(w).remove(0).0;
        assert_eq!(
            q.disjuncts[0].matcher,
            Match::Phrase(vec![(stem("fracture"), 0), (stem("left"), 2), (stem("rib"), 3)])
        );
    }

    #[test]
    fn stopword_only_queries_are_empty() {
        let q = parse("the of").unwrap();
        assert!(q.disjuncts.iter().all(|d| d.field == Field::SubjectId));
        let q = QueryParser::new(&[Field::Title, Field::Content], &StemmingAnalyzer).parse("the of").unwrap();
        assert!(q.is_empty());
        assert_eq!(q.groups, 0);
    }

    #[test]
    fn unbalanced_quotes_are_syntax_errors() {
        assert!(matches!(parse("\"open phrase"), Err(SearchError::QuerySyntax(_))));
        assert!(matches!(parse("title:\"open"), Err(SearchError::QuerySyntax(_))));
    }

    #[test]
    fn unknown_prefixes_are_plain_text() {
        let clauses = lex("Impression: rib fracture").unwrap();
        assert_eq!(clauses[0], RawClause { field: None, text: "Impression:".into(), phrase: false });
        assert_eq!(lex("patient:P1").unwrap()[0].field, None);
        assert_eq!(lex("date:2024").unwrap()[0].field, None);

        let q = parse("Findings: fracture").unwrap();
        assert_eq!(q.groups, 2);
        let stem = tokenize("findings").remove(0).0;
        assert!(q.disjuncts.iter().any(|d| d.field == Field::Title && d.matcher == Match::Term(stem.clone())));
    }

    #[test]
    fn field_prefix_without_value_is_plain_text() {
        assert_eq!(lex("title:").unwrap()[0], RawClause { field: None, text: "title:".into(), phrase: false });
        assert!(lex("title:\"\"").unwrap().is_empty());
    }

    #[test]
    fn colons_inside_values_are_plain_text() {
        let clauses = lex("ratio 3:1").unwrap();
        assert_eq!(clauses[1], RawClause { field: None, text: "3:1".into(), phrase: false });
    }

    #[test]
    fn empty_text_lexes_to_nothing() {
        assert!(lex("   ").unwrap().is_empty());
        assert!(lex("\"\"").unwrap().is_empty());
    }
}
