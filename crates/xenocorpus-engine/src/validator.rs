use serde_json::{Map, Value};
use xenocorpus_contracts::vocab::{
    is_primary_label, is_valid_explicitness, is_valid_strategy, is_valid_target,
};
use xenocorpus_contracts::CorpusRecord;

use crate::config::GeneratorConfig;

/// Records of one batch split by validation outcome.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Screened {
    pub accepted: Vec<CorpusRecord>,
    pub rejected: Vec<CorpusRecord>,
}

/// Assigns sequential ids and checks length and vocabulary bounds.
///
/// Every processed record consumes an id, rejected ones included, so
/// the audit file and the corpus share one id space.
#[derive(Debug, Clone)]
pub struct Validator {
    min_words: usize,
    max_chars: usize,
    next_seq: u64,
}

impl Validator {
    pub fn new(min_words: usize, max_chars: usize) -> Self {
        Self {
            min_words,
            max_chars,
            next_seq: 1,
        }
    }

    pub fn from_config(config: &GeneratorConfig) -> Self {
        Self::new(config.min_words, config.max_chars)
    }

    /// Continues numbering after `existing` records already on disk.
    pub fn starting_after(mut self, existing: u64) -> Self {
        self.next_seq = existing + 1;
        self
    }

    pub fn last_assigned(&self) -> u64 {
        self.next_seq - 1
    }

    /// Normalizes one raw record and attaches its validation problems.
    pub fn process(&mut self, raw: &Value, generated_at: &str) -> CorpusRecord {
        let empty = Map::new();
        let object = raw.as_object().unwrap_or(&empty);
        let mut record = CorpusRecord::from_raw(self.next_seq, object, generated_at);
        self.next_seq += 1;
        record.validation_problems = self.validate(&record);
        record
    }

    pub fn validate(&self, record: &CorpusRecord) -> Vec<String> {
        let mut problems = Vec::new();

        let words = record.word_count();
        if words < self.min_words {
            problems.push(format!(
                "texto muito curto ({words} palavras, mínimo {})",
                self.min_words
            ));
        }
        let chars = record.char_count();
        if chars > self.max_chars {
            problems.push(format!(
                "texto muito longo ({chars} caracteres, máximo {})",
                self.max_chars
            ));
        }
        if record.text.trim().is_empty() {
            problems.push("texto vazio".to_string());
        }
        if !is_primary_label(&record.primary_label) {
            problems.push(format!(
                "classificação primária inválida: {}",
                record.primary_label
            ));
        }

        if record.is_hate() {
            if !is_valid_target(&record.target) {
                problems.push(format!("alvo inválido: {}", record.target));
            }
            if !is_valid_strategy(&record.strategy) {
                problems.push(format!("estratégia inválida: {}", record.strategy));
            }
            if !is_valid_explicitness(&record.explicitness) {
                problems.push(format!("explicitude inválida: {}", record.explicitness));
            }
        }

        problems
    }

    pub fn screen(&mut self, raws: &[Value], generated_at: &str) -> Screened {
        let mut screened = Screened::default();
        for raw in raws {
            let record = self.process(raw, generated_at);
            if record.validation_problems.is_empty() {
                screened.accepted.push(record);
            } else {
                screened.rejected.push(record);
            }
        }
        screened
    }
}

impl Default for Validator {
    fn default() -> Self {
        Self::from_config(&GeneratorConfig::default())
    }
}
