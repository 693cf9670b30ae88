use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::lenient::{null_as_default, string_items};
use crate::vocab::{LABEL_HATE, LABEL_NEUTRAL, NONE_FEMININE, NO_TARGET};

pub const CORPUS_SCHEMA_VERSION: &str = "2.0_metodologia_relatorio";
pub const KIND_HATE: &str = "discurso_odio_xenofobia";
pub const KIND_OTHER: &str = "texto_neutro";
pub const UNKNOWN_CONTEXT: &str = "desconhecido";

/// One labeled line of the synthetic corpus.
///
/// Field names on disk are kept stable so existing corpora and annotation
/// tooling keep reading the same keys.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CorpusRecord {
    #[serde(deserialize_with = "null_as_default")]
    pub id: String,
    #[serde(rename = "texto", deserialize_with = "null_as_default")]
    pub text: String,
    #[serde(rename = "classificacao_primaria", deserialize_with = "null_as_default")]
    pub primary_label: String,
    #[serde(rename = "alvo", deserialize_with = "null_as_default")]
    pub target: String,
    #[serde(rename = "estrategia", deserialize_with = "null_as_default")]
    pub strategy: String,
    #[serde(rename = "explicitude", deserialize_with = "null_as_default")]
    pub explicitness: String,
    #[serde(rename = "contexto", deserialize_with = "null_as_default")]
    pub context: String,
    #[serde(rename = "palavras_chave", deserialize_with = "string_items")]
    pub keywords: Vec<String>,
    #[serde(rename = "sintetico", deserialize_with = "null_as_default")]
    pub synthetic: bool,
    #[serde(rename = "tipo", deserialize_with = "null_as_default")]
    pub kind: String,
    #[serde(rename = "data_geracao", deserialize_with = "null_as_default")]
    pub generated_at: String,
    #[serde(rename = "versao", deserialize_with = "null_as_default")]
    pub schema_version: String,
    #[serde(
        rename = "problemas_validacao",
        deserialize_with = "string_items",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub validation_problems: Vec<String>,
}

impl CorpusRecord {
    /// Normalizes one raw object returned by the generation API.
    ///
    /// Missing label defaults to the neutral class. Target, strategy and
    /// explicitness only survive on hate records.
    pub fn from_raw(seq: u64, raw: &Map<String, Value>, generated_at: &str) -> Self {
        let primary_label =
            string_field(raw, "classificacao_primaria").unwrap_or_else(|| LABEL_NEUTRAL.to_string());
        let is_hate = primary_label == LABEL_HATE;
        let layer = |key: &str, fallback: &str| {
            if is_hate {
                string_field(raw, key).unwrap_or_else(|| fallback.to_string())
            } else {
                fallback.to_string()
            }
        };

        Self {
            id: corpus_id(seq),
            text: string_field(raw, "texto").unwrap_or_default(),
            target: layer("alvo", NO_TARGET),
            strategy: layer("estrategia", NONE_FEMININE),
            explicitness: layer("explicitude", NONE_FEMININE),
            context: string_field(raw, "contexto").unwrap_or_else(|| UNKNOWN_CONTEXT.to_string()),
            keywords: string_list(raw.get("palavras_chave")),
            synthetic: true,
            kind: if is_hate { KIND_HATE } else { KIND_OTHER }.to_string(),
            generated_at: generated_at.to_string(),
            schema_version: CORPUS_SCHEMA_VERSION.to_string(),
            validation_problems: Vec::new(),
            primary_label,
        }
    }

    pub fn is_hate(&self) -> bool {
        self.primary_label == LABEL_HATE
    }

    pub fn word_count(&self) -> usize {
        self.text.split_whitespace().count()
    }

    pub fn char_count(&self) -> usize {
        self.text.chars().count()
    }
}

pub fn corpus_id(seq: u64) -> String {
    format!("corpus_{seq:05}")
}

fn string_field(raw: &Map<String, Value>, key: &str) -> Option<String> {
    match raw.get(key) {
        None | Some(Value::Null) => None,
        Some(Value::String(value)) => Some(value.clone()),
        Some(other) => Some(other.to_string()),
    }
}

fn string_list(value: Option<&Value>) -> Vec<String> {
    value
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(|item| match item {
                    Value::String(text) => Some(text.clone()),
                    Value::Null => None,
                    other => Some(other.to_string()),
                })
                .collect()
        })
        .unwrap_or_default()
}
