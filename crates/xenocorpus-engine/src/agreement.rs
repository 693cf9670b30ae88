//! Inter-annotator agreement over the annotation store.
//!
//! Texts annotated at least twice form a group; the first two annotations
//! in file order are compared on the category, subcategory and intensity
//! layers.

use std::fmt::Write as _;
use std::hash::Hash;
use std::path::Path;

use indexmap::IndexMap;
use xenocorpus_contracts::jsonl::read_jsonl_or_empty;
use xenocorpus_contracts::vocab::CATEGORY_POSITIVE;
use xenocorpus_contracts::AnnotationRecord;

use crate::gemini::truncate_text;

pub const DEFAULT_ANNOTATIONS_FILE: &str = "anotacoes_xenofobia.jsonl";
pub const DEFAULT_REPORT_FILE: &str = "relatorio_concordancia.md";

const KAPPA_TARGET: f64 = 0.70;
const PERCENT_TARGET: f64 = 80.0;
const REPORTED_CASES: usize = 5;

/// Cohen's kappa for two parallel label sequences.
///
/// `None` when there are no items or chance agreement is already total.
pub fn cohen_kappa<T: Eq + Hash>(first: &[T], second: &[T]) -> Option<f64> {
    let n = first.len().min(second.len());
    if n == 0 {
        return None;
    }

    let mut counts: IndexMap<&T, (usize, usize)> = IndexMap::new();
    let mut matches = 0usize;
    for (a, b) in first.iter().zip(second.iter()) {
        if a == b {
            matches += 1;
        }
        counts.entry(a).or_insert((0, 0)).0 += 1;
        counts.entry(b).or_insert((0, 0)).1 += 1;
    }

    let total = n as f64;
    let observed = matches as f64 / total;
    let expected = counts
        .values()
        .map(|(left, right)| (*left as f64 / total) * (*right as f64 / total))
        .sum::<f64>();
    if (1.0 - expected).abs() < f64::EPSILON {
        return None;
    }
    Some((observed - expected) / (1.0 - expected))
}

/// `100 × matches / items`, zero for no items.
pub fn percent_agreement<T: PartialEq>(first: &[T], second: &[T]) -> f64 {
    let n = first.len().min(second.len());
    if n == 0 {
        return 0.0;
    }
    let matches = first.iter().zip(second.iter()).filter(|(a, b)| a == b).count();
    matches as f64 / n as f64 * 100.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Layer {
    Category,
    Subcategory,
    Intensity,
}

impl Layer {
    pub const ALL: [Layer; 3] = [Layer::Category, Layer::Subcategory, Layer::Intensity];

    /// On-disk key of the layer.
    pub fn key(self) -> &'static str {
        match self {
            Layer::Category => "categoria_principal",
            Layer::Subcategory => "subcategoria",
            Layer::Intensity => "intensidade",
        }
    }

    pub fn title(self) -> &'static str {
        match self {
            Layer::Category => "Primary category",
            Layer::Subcategory => "Subcategory",
            Layer::Intensity => "Intensity",
        }
    }

    fn value(self, record: &AnnotationRecord) -> Option<String> {
        match self {
            Layer::Category => Some(record.category.clone()),
            Layer::Subcategory => record.subcategory.clone(),
            Layer::Intensity => record.intensity.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct LayerAgreement {
    pub layer: Layer,
    pub items: usize,
    pub kappa: Option<f64>,
    pub percent: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AspectDisagreement {
    pub layer: Layer,
    pub first: Option<String>,
    pub second: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DisagreementCase {
    pub text_id: String,
    pub text: String,
    pub first_annotator: String,
    pub second_annotator: String,
    pub aspects: Vec<AspectDisagreement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AgreementReport {
    pub total_annotations: usize,
    pub grouped_texts: usize,
    pub layers: Vec<LayerAgreement>,
    pub disagreements: Vec<DisagreementCase>,
}

impl AgreementReport {
    pub fn layer(&self, layer: Layer) -> Option<&LayerAgreement> {
        self.layers.iter().find(|entry| entry.layer == layer)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AgreementOutcome {
    NoData { total_annotations: usize },
    Computed(AgreementReport),
}

pub fn load_annotations(path: &Path) -> anyhow::Result<Vec<AnnotationRecord>> {
    Ok(read_jsonl_or_empty::<AnnotationRecord>(path)?.records)
}

pub fn evaluate(annotations: &[AnnotationRecord]) -> AgreementOutcome {
    let mut groups: IndexMap<&str, Vec<&AnnotationRecord>> = IndexMap::new();
    for record in annotations {
        if record.text_id.is_empty() {
            continue;
        }
        groups.entry(record.text_id.as_str()).or_default().push(record);
    }
    let pairs: Vec<(&str, &AnnotationRecord, &AnnotationRecord)> = groups
        .iter()
        .filter(|(_, records)| records.len() >= 2)
        .map(|(id, records)| (*id, records[0], records[1]))
        .collect();

    if pairs.is_empty() {
        return AgreementOutcome::NoData {
            total_annotations: annotations.len(),
        };
    }

    let both_positive: Vec<_> = pairs
        .iter()
        .filter(|(_, a, b)| a.category == CATEGORY_POSITIVE && b.category == CATEGORY_POSITIVE)
        .collect();

    let layers = Layer::ALL
        .iter()
        .map(|&layer| {
            let (first, second): (Vec<Option<String>>, Vec<Option<String>>) = match layer {
                Layer::Category => pairs
                    .iter()
                    .map(|(_, a, b)| (layer.value(a), layer.value(b)))
                    .unzip(),
                Layer::Subcategory | Layer::Intensity => both_positive
                    .iter()
                    .map(|(_, a, b)| (layer.value(a), layer.value(b)))
                    .unzip(),
            };
            LayerAgreement {
                layer,
                items: first.len(),
                kappa: cohen_kappa(&first, &second),
                percent: percent_agreement(&first, &second),
            }
        })
        .collect();

    let disagreements = pairs
        .iter()
        .filter_map(|(id, a, b)| {
            let aspects: Vec<AspectDisagreement> = Layer::ALL
                .iter()
                .filter_map(|&layer| {
                    let (first, second) = (layer.value(a), layer.value(b));
                    (first != second).then_some(AspectDisagreement {
                        layer,
                        first,
                        second,
                    })
                })
                .collect();
            (!aspects.is_empty()).then(|| DisagreementCase {
                text_id: id.to_string(),
                text: a.original_text.clone(),
                first_annotator: a.annotator.clone(),
                second_annotator: b.annotator.clone(),
                aspects,
            })
        })
        .collect();

    AgreementOutcome::Computed(AgreementReport {
        total_annotations: annotations.len(),
        grouped_texts: pairs.len(),
        layers,
        disagreements,
    })
}

pub fn format_kappa(kappa: Option<f64>) -> String {
    kappa.map_or_else(|| "N/A".to_string(), |value| format!("{value:.3}"))
}

pub fn interpret_kappa(kappa: f64) -> &'static str {
    if kappa <= 0.20 {
        "poor"
    } else if kappa <= 0.40 {
        "fair"
    } else if kappa <= 0.60 {
        "moderate"
    } else if kappa <= 0.80 {
        "substantial"
    } else {
        "almost perfect"
    }
}

pub fn render_markdown(outcome: &AgreementOutcome) -> String {
    let mut out = String::new();
    out.push_str("# Inter-annotator agreement report\n");
    out.push_str("## Hate speech detection: XENOFOBIA\n\n");

    let report = match outcome {
        AgreementOutcome::NoData { total_annotations } => {
            let _ = writeln!(out, "- **Total annotations**: {total_annotations}");
            out.push_str("- **Texts with multiple annotations**: 0\n\n");
            out.push_str("No text has been annotated by two annotators yet; agreement cannot be computed.\n");
            return out;
        }
        AgreementOutcome::Computed(report) => report,
    };

    out.push_str("### Summary\n");
    let _ = writeln!(out, "- **Total annotations**: {}", report.total_annotations);
    let _ = writeln!(out, "- **Texts with multiple annotations**: {}", report.grouped_texts);
    let _ = writeln!(out, "- **Disagreement cases**: {}\n", report.disagreements.len());

    out.push_str("### Agreement metrics\n\n");
    out.push_str("| Layer | Items | Cohen's kappa | Interpretation | Percent agreement |\n");
    out.push_str("|---|---:|---:|---|---:|\n");
    for entry in &report.layers {
        let _ = writeln!(
            out,
            "| {} | {} | {} | {} | {:.1}% |",
            entry.layer.title(),
            entry.items,
            format_kappa(entry.kappa),
            entry.kappa.map_or("N/A", interpret_kappa),
            entry.percent
        );
    }

    out.push_str("\n### Interpreting kappa\n");
    out.push_str("- **< 0.20**: poor agreement\n");
    out.push_str("- **0.21-0.40**: fair agreement\n");
    out.push_str("- **0.41-0.60**: moderate agreement\n");
    out.push_str("- **0.61-0.80**: substantial agreement\n");
    out.push_str("- **> 0.80**: almost perfect agreement\n\n");

    out.push_str("### Quality targets\n");
    let _ = writeln!(out, "- **Kappa ≥ {KAPPA_TARGET:.2}**: substantial agreement");
    let _ = writeln!(out, "- **Percent agreement ≥ {PERCENT_TARGET:.0}%**: good agreement");
    if let Some(category) = report.layer(Layer::Category) {
        let meets = category.kappa.is_some_and(|k| k >= KAPPA_TARGET)
            && category.percent >= PERCENT_TARGET;
        let verdict = if meets { "met" } else { "not met" };
        let _ = writeln!(out, "- Primary category: target {verdict}");
    }

    out.push_str("\n### Disagreement cases\n");
    if report.disagreements.is_empty() {
        out.push_str("\nNo disagreement found.\n");
    } else {
        let _ = writeln!(out, "\n{} disagreement case(s) found.\n", report.disagreements.len());
        for (idx, case) in report.disagreements.iter().take(REPORTED_CASES).enumerate() {
            let _ = writeln!(out, "#### Case {} ({})", idx + 1, case.text_id);
            let _ = writeln!(out, "**Text**: {}", truncate_text(&case.text, 100));
            let _ = writeln!(
                out,
                "**Annotators**: {} vs {}",
                case.first_annotator, case.second_annotator
            );
            out.push_str("**Disagreements**:\n");
            for aspect in &case.aspects {
                let _ = writeln!(
                    out,
                    "- {}: {} vs {}",
                    aspect.layer.key(),
                    aspect.first.as_deref().unwrap_or("-"),
                    aspect.second.as_deref().unwrap_or("-")
                );
            }
            out.push('\n');
        }
    }

    out.push_str("\n### Recommendations\n\n");
    out.push_str("1. Revisit the annotation guidelines when kappa is below 0.70.\n");
    out.push_str("2. Discuss the disagreement cases above with the annotation team.\n");
    out.push_str("3. Clarify ambiguous criteria, then run a new annotation round.\n");
    out.push_str("4. Add a third annotator to adjudicate persistent disagreements.\n");
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn annotation(
        text_id: &str,
        annotator: &str,
        category: &str,
        subcategory: Option<&str>,
        intensity: Option<&str>,
    ) -> AnnotationRecord {
        AnnotationRecord {
            text_id: text_id.to_string(),
            original_text: format!("texto {text_id}"),
            category: category.to_string(),
            subcategory: subcategory.map(str::to_string),
            intensity: intensity.map(str::to_string),
            annotator: annotator.to_string(),
            ..AnnotationRecord::default()
        }
    }

    fn computed(outcome: AgreementOutcome) -> AgreementReport {
        match outcome {
            AgreementOutcome::Computed(report) => report,
            AgreementOutcome::NoData { .. } => panic!("expected computed agreement"),
        }
    }

    #[test]
    fn three_of_five_matching_is_sixty_percent() {
        let pairs = [
            ("XENOFOBIA", "XENOFOBIA"),
            ("NAO_XENOFOBIA", "NAO_XENOFOBIA"),
            ("XENOFOBIA", "XENOFOBIA"),
            ("XENOFOBIA", "NAO_XENOFOBIA"),
            ("NAO_XENOFOBIA", "XENOFOBIA"),
        ];
        let mut records = Vec::new();
        for (idx, (first, second)) in pairs.iter().enumerate() {
            let id = format!("corpus_{idx:05}");
            records.push(annotation(&id, "a1", first, None, None));
            records.push(annotation(&id, "a2", second, None, None));
        }

        let report = computed(evaluate(&records));
        let category = report.layer(Layer::Category).expect("category layer");
        assert_eq!(category.items, 5);
        assert!((category.percent - 60.0).abs() < 1e-9);
        assert_eq!(report.disagreements.len(), 2);
    }

    #[test]
    fn agreement_at_chance_gives_zero_kappa() {
        let first: Vec<&str> = ["A"; 5].into_iter().chain(["B"; 5]).collect();
        let second = vec!["A"; 10];
        let kappa = cohen_kappa(&first, &second).expect("defined kappa");
        assert!(kappa.abs() < 1e-12);
        assert!((percent_agreement(&first, &second) - 50.0).abs() < 1e-9);
    }

    #[test]
    fn perfect_two_class_agreement_is_one() {
        let labels = vec!["A", "B", "A", "B"];
        assert_eq!(cohen_kappa(&labels, &labels), Some(1.0));
    }

    #[test]
    fn kappa_undefined_without_items_or_variation() {
        let empty: Vec<&str> = Vec::new();
        assert_eq!(cohen_kappa(&empty, &empty), None);
        assert_eq!(percent_agreement(&empty, &empty), 0.0);
        assert_eq!(cohen_kappa(&["A", "A"], &["A", "A"]), None);
    }

    #[test]
    fn subcategory_layer_only_counts_double_positive_groups() {
        let records = vec![
            annotation("t1", "a1", "XENOFOBIA", Some("IMIGRANTE"), Some("SUTIL")),
            annotation("t1", "a2", "XENOFOBIA", Some("IMIGRANTE"), Some("EXPLICITO")),
            annotation("t2", "a1", "XENOFOBIA", Some("NACIONALIDADE"), Some("SUTIL")),
            annotation("t2", "a2", "NAO_XENOFOBIA", None, None),
            annotation("t3", "a1", "XENOFOBIA", Some("NACIONALIDADE"), Some("MODERADO")),
            annotation("t3", "a2", "XENOFOBIA", Some("IMIGRANTE"), Some("MODERADO")),
        ];
        let report = computed(evaluate(&records));

        let subcategory = report.layer(Layer::Subcategory).expect("subcategory layer");
        assert_eq!(subcategory.items, 2);
        assert!((subcategory.percent - 50.0).abs() < 1e-9);
        let intensity = report.layer(Layer::Intensity).expect("intensity layer");
        assert_eq!(intensity.items, 2);

        assert_eq!(report.disagreements.len(), 3);
        let t2 = &report.disagreements[1];
        assert_eq!(t2.text_id, "t2");
        assert_eq!(t2.aspects.len(), 3);
        assert_eq!(t2.aspects[0].layer, Layer::Category);
        assert_eq!(t2.aspects[1].second, None);
    }

    #[test]
    fn single_annotations_yield_no_data() {
        let records = vec![
            annotation("t1", "a1", "XENOFOBIA", None, None),
            annotation("t2", "a1", "NAO_XENOFOBIA", None, None),
            annotation("", "a2", "XENOFOBIA", None, None),
            annotation("", "a3", "XENOFOBIA", None, None),
        ];
        assert_eq!(
            evaluate(&records),
            AgreementOutcome::NoData {
                total_annotations: 4
            }
        );
        assert!(render_markdown(&evaluate(&records)).contains("cannot be computed"));
    }

    #[test]
    fn only_first_two_annotations_are_compared() {
        let records = vec![
            annotation("t1", "a1", "XENOFOBIA", None, None),
            annotation("t1", "a2", "XENOFOBIA", None, None),
            annotation("t1", "a3", "NAO_XENOFOBIA", None, None),
        ];
        let report = computed(evaluate(&records));
        assert_eq!(report.grouped_texts, 1);
        assert!(report.disagreements.is_empty());
        assert_eq!(report.layer(Layer::Category).map(|l| l.percent), Some(100.0));
    }

    #[test]
    fn markdown_lists_at_most_five_cases() -> anyhow::Result<()> {
        let mut records = Vec::new();
        for idx in 0..7 {
            let id = format!("t{idx}");
            let mut first = annotation(&id, "a1", "XENOFOBIA", None, None);
            first.original_text = "x".repeat(150);
            records.push(first);
            records.push(annotation(&id, "a2", "NAO_XENOFOBIA", None, None));
        }
        let markdown = render_markdown(&evaluate(&records));

        assert!(markdown.contains("7 disagreement case(s) found."));
        assert!(markdown.contains("#### Case 5"));
        assert!(!markdown.contains("#### Case 6"));
        assert!(markdown.contains(&format!("**Text**: {}…", "x".repeat(100))));
        assert!(markdown.contains("| Primary category | 7 | 0.000 | poor |"));
        assert!(markdown.contains("| Subcategory | 0 | N/A | N/A | 0.0% |"));
        Ok(())
    }

    #[test]
    fn missing_annotation_file_loads_empty() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let records = load_annotations(&temp.path().join(DEFAULT_ANNOTATIONS_FILE))?;
        assert!(records.is_empty());
        Ok(())
    }

    #[test]
    fn annotations_with_null_fields_still_pair_up() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let path = temp.path().join(DEFAULT_ANNOTATIONS_FILE);
        std::fs::write(
            &path,
            concat!(
                "{\"id_texto\":\"t1\",\"texto_original\":null,\"categoria_principal\":\"XENOFOBIA\",\"subcategoria\":\"IMIGRANTE\",\"intensidade\":\"SUTIL\",\"palavras_chave\":null,\"anotador\":\"a1\"}\n",
                "{\"id_texto\":\"t1\",\"texto_original\":\"x\",\"categoria_principal\":\"XENOFOBIA\",\"subcategoria\":\"IMIGRANTE\",\"intensidade\":\"SUTIL\",\"palavras_chave\":[],\"anotador\":\"a2\"}\n",
            ),
        )?;

        let records = load_annotations(&path)?;
        assert_eq!(records.len(), 2);
        let report = computed(evaluate(&records));
        assert_eq!(report.grouped_texts, 1);
        assert_eq!(report.layer(Layer::Category).map(|entry| entry.percent), Some(100.0));
        Ok(())
    }
}
