use std::path::PathBuf;
use std::str::FromStr;

/// Inverse document frequency variant used by the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum IdfMode {
    /// ln(1 + N/df); never zero, so terms present in every document still contribute.
    #[default]
    Smoothed,
    /// ln(N/df)
    Plain,
}

impl IdfMode {
    pub fn idf(self, num_docs: u32, df: u32) -> f32 {
        let n = num_docs.max(1) as f32;
        let df = df.max(1) as f32;
        match self {
            IdfMode::Smoothed => (1.0 + n / df).ln(),
            IdfMode::Plain => (n / df).ln(),
        }
    }
}

impl FromStr for IdfMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "smoothed" => Ok(IdfMode::Smoothed),
            "plain" => Ok(IdfMode::Plain),
            other => Err(format!("unknown idf mode '{other}', expected 'smoothed' or 'plain'")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Directory holding `meta.json` and the `segments/` directory.
    pub index_dir: PathBuf,
    /// Directory for the sled blob store; `None` disables original-content storage.
    pub blob_dir: Option<PathBuf>,
    pub default_limit: usize,
    /// Limits above this are clamped.
    pub max_limit: usize,
    /// Maximum snippet length in characters.
    pub snippet_chars: usize,
    pub idf: IdfMode,
}

impl EngineConfig {
    pub fn new<P: Into<PathBuf>>(index_dir: P) -> Self {
        Self {
            index_dir: index_dir.into(),
            blob_dir: None,
            default_limit: 10,
            max_limit: 100,
            snippet_chars: 1000,
            idf: IdfMode::default(),
        }
    }

    pub fn with_blob_dir<P: Into<PathBuf>>(mut self, dir: P) -> Self {
        self.blob_dir = Some(dir.into());
        self
    }

    pub fn with_idf(mut self, idf: IdfMode) -> Self {
        self.idf = idf;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idf_modes_parse_from_flag_values() {
        assert_eq!("plain".parse::<IdfMode>(), Ok(IdfMode::Plain));
        assert_eq!("Smoothed".parse::<IdfMode>(), Ok(IdfMode::Smoothed));
        assert!("bm25".parse::<IdfMode>().is_err());
    }

    #[test]
    fn smoothed_idf_is_positive_for_ubiquitous_terms() {
        assert!(IdfMode::Smoothed.idf(5, 5) > 0.0);
        assert_eq!(IdfMode::Plain.idf(5, 5), 0.0);
    }

    #[test]
    fn rarer_terms_weigh_more() {
        assert!(IdfMode::Smoothed.idf(10, 1) > IdfMode::Smoothed.idf(10, 4));
    }
}
