use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::lenient::{null_as_default, string_items};
use crate::vocab::CATEGORY_POSITIVE;

/// One human judgement about one corpus text.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AnnotationRecord {
    #[serde(rename = "id_texto", deserialize_with = "null_as_default")]
    pub text_id: String,
    #[serde(rename = "texto_original", deserialize_with = "null_as_default")]
    pub original_text: String,
    #[serde(rename = "categoria_principal", deserialize_with = "null_as_default")]
    pub category: String,
    #[serde(rename = "subcategoria")]
    pub subcategory: Option<String>,
    #[serde(rename = "intensidade")]
    pub intensity: Option<String>,
    #[serde(rename = "palavras_chave", deserialize_with = "string_items")]
    pub keywords: Vec<String>,
    #[serde(rename = "justificativa", deserialize_with = "null_as_default")]
    pub justification: String,
    #[serde(rename = "anotador", deserialize_with = "null_as_default")]
    pub annotator: String,
    #[serde(rename = "data_anotacao", deserialize_with = "null_as_default")]
    pub annotated_at: String,
}

impl AnnotationRecord {
    pub fn is_positive(&self) -> bool {
        self.category == CATEGORY_POSITIVE
    }
}

/// Running counts shown next to the annotation form.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct AnnotationTally {
    pub total: u64,
    pub positive: u64,
    pub negative: u64,
    pub positive_pct: f64,
    pub subcategories: IndexMap<String, u64>,
    pub intensities: IndexMap<String, u64>,
}

impl AnnotationTally {
    pub fn from_records(records: &[AnnotationRecord]) -> Self {
        let mut tally = Self::default();
        for record in records {
            tally.push(record);
        }
        tally
    }

    pub fn push(&mut self, record: &AnnotationRecord) {
        self.total += 1;
        if record.is_positive() {
            self.positive += 1;
        }
        self.negative = self.total - self.positive;
        self.positive_pct = self.positive as f64 / self.total as f64 * 100.0;

        if let Some(subcategory) = record.subcategory.as_deref().filter(|v| !v.is_empty()) {
            *self.subcategories.entry(subcategory.to_string()).or_insert(0) += 1;
        }
        if let Some(intensity) = record.intensity.as_deref().filter(|v| !v.is_empty()) {
            *self.intensities.entry(intensity.to_string()).or_insert(0) += 1;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AnnotationRecord, AnnotationTally};

    fn record(category: &str, subcategory: Option<&str>, intensity: Option<&str>) -> AnnotationRecord {
        AnnotationRecord {
            text_id: "corpus_00001".to_string(),
            category: category.to_string(),
            subcategory: subcategory.map(str::to_string),
            intensity: intensity.map(str::to_string),
            ..AnnotationRecord::default()
        }
    }

    #[test]
    fn tally_counts_categories_and_layers() {
        let records = vec![
            record("XENOFOBIA", Some("IMIGRANTE"), Some("SUTIL")),
            record("XENOFOBIA", Some("IMIGRANTE"), Some("EXPLICITO")),
            record("NAO_XENOFOBIA", None, None),
            record("NAO_XENOFOBIA", None, None),
        ];
        let tally = AnnotationTally::from_records(&records);

        assert_eq!(tally.total, 4);
        assert_eq!(tally.positive, 2);
        assert_eq!(tally.negative, 2);
        assert_eq!(tally.positive_pct, 50.0);
        assert_eq!(tally.subcategories.get("IMIGRANTE"), Some(&2));
        assert_eq!(tally.intensities.len(), 2);
    }

    #[test]
    fn empty_tally_is_zeroed() {
        let tally = AnnotationTally::from_records(&[]);
        assert_eq!(tally.total, 0);
        assert_eq!(tally.positive_pct, 0.0);
    }

    #[test]
    fn null_layers_round_trip_as_null() -> anyhow::Result<()> {
        let value = serde_json::to_value(record("NAO_XENOFOBIA", None, None))?;
        assert!(value["subcategoria"].is_null());
        assert!(value["intensidade"].is_null());
        assert_eq!(value["categoria_principal"], "NAO_XENOFOBIA");
        Ok(())
    }

    #[test]
    fn null_text_fields_decode_as_empty() -> anyhow::Result<()> {
        let parsed: AnnotationRecord = serde_json::from_str(
            r#"{"id_texto":"corpus_00004","texto_original":null,"categoria_principal":"NAO_XENOFOBIA","subcategoria":null,"intensidade":null,"palavras_chave":null,"justificativa":null,"anotador":"anotador_2","data_anotacao":null}"#,
        )?;
        assert_eq!(parsed.text_id, "corpus_00004");
        assert_eq!(parsed.original_text, "");
        assert!(parsed.keywords.is_empty());
        assert_eq!(parsed.annotator, "anotador_2");
        assert!(!parsed.is_positive());
        Ok(())
    }
}
