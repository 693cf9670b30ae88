//! Annotation desk: picks unannotated corpus texts and stores judgements.
//!
//! Session state lives in an explicit [`FormState`] value that every
//! handler takes and returns.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use rand::seq::IndexedRandom;
use rand::Rng;
use xenocorpus_contracts::jsonl::read_jsonl_or_empty;
use xenocorpus_contracts::vocab::{CATEGORIES, CATEGORY_POSITIVE, INTENSITIES, SUBCATEGORIES};
use xenocorpus_contracts::{AnnotationRecord, AnnotationTally, CorpusRecord, JsonlWriter};

use crate::error::FormError;

pub const DEFAULT_ANNOTATOR: &str = "anotador_1";

#[derive(Debug, Clone, PartialEq, Default)]
pub struct FormState {
    /// Id of the text awaiting annotation; `None` once the corpus is exhausted.
    pub current: Option<String>,
    pub tally: AnnotationTally,
}

impl FormState {
    pub fn is_exhausted(&self) -> bool {
        self.current.is_none()
    }
}

#[derive(Debug, Clone, PartialEq, Default)]
pub struct Submission {
    pub category: String,
    pub subcategory: Option<String>,
    pub intensity: Option<String>,
    /// Comma-separated, as typed. Blank keeps the text's own `palavras_chave`.
    pub keywords: String,
    pub justification: String,
}

#[derive(Debug, Clone, PartialEq)]
pub enum FormAction {
    Submit(Submission),
    Skip,
}

pub struct AnnotationDesk {
    corpus: Vec<CorpusRecord>,
    annotations: Vec<AnnotationRecord>,
    store: JsonlWriter,
    annotator: String,
}

impl AnnotationDesk {
    pub fn new(
        corpus: Vec<CorpusRecord>,
        annotations: Vec<AnnotationRecord>,
        store_path: impl Into<PathBuf>,
        annotator: impl Into<String>,
    ) -> Self {
        Self {
            corpus,
            annotations,
            store: JsonlWriter::new(store_path),
            annotator: annotator.into(),
        }
    }

    /// Missing corpus or annotation files read as empty.
    pub fn load(corpus_path: &Path, annotations_path: &Path, annotator: &str) -> anyhow::Result<Self> {
        let corpus = read_jsonl_or_empty::<CorpusRecord>(corpus_path)?.records;
        let annotations = read_jsonl_or_empty::<AnnotationRecord>(annotations_path)?.records;
        Ok(Self::new(corpus, annotations, annotations_path, annotator))
    }

    pub fn annotator(&self) -> &str {
        &self.annotator
    }

    pub fn corpus_len(&self) -> usize {
        self.corpus.len()
    }

    pub fn annotations(&self) -> &[AnnotationRecord] {
        &self.annotations
    }

    pub fn text(&self, id: &str) -> Option<&CorpusRecord> {
        self.corpus.iter().find(|record| record.id == id)
    }

    pub fn unannotated(&self) -> Vec<&CorpusRecord> {
        let done: HashSet<&str> = self
            .annotations
            .iter()
            .map(|annotation| annotation.text_id.as_str())
            .collect();
        self.corpus
            .iter()
            .filter(|record| !done.contains(record.id.as_str()))
            .collect()
    }

    pub fn open<R: Rng + ?Sized>(&self, rng: &mut R) -> FormState {
        FormState {
            current: self.pick(rng),
            tally: AnnotationTally::from_records(&self.annotations),
        }
    }

    fn pick<R: Rng + ?Sized>(&self, rng: &mut R) -> Option<String> {
        self.unannotated()
            .choose(rng)
            .map(|record| record.id.clone())
    }

    pub fn handle<R: Rng + ?Sized>(
        &mut self,
        state: FormState,
        action: FormAction,
        rng: &mut R,
        now: &str,
    ) -> anyhow::Result<FormState> {
        match action {
            FormAction::Skip => Ok(FormState {
                current: self.pick(rng),
                tally: state.tally,
            }),
            FormAction::Submit(submission) => {
                let text_id = state.current.clone().ok_or(FormError::NothingAwaiting)?;
                let record = self.build_record(&text_id, submission, now)?;
                self.store.append(&record)?;

                let mut tally = state.tally;
                tally.push(&record);
                self.annotations.push(record);
                Ok(FormState {
                    current: self.pick(rng),
                    tally,
                })
            }
        }
    }

    fn build_record(
        &self,
        text_id: &str,
        submission: Submission,
        now: &str,
    ) -> Result<AnnotationRecord, FormError> {
        let text = self
            .text(text_id)
            .ok_or_else(|| FormError::UnknownText(text_id.to_string()))?;
        if !CATEGORIES.contains(&submission.category.as_str()) {
            return Err(FormError::UnknownCategory(submission.category));
        }

        let positive = submission.category == CATEGORY_POSITIVE;
        let (subcategory, intensity) = if positive {
            let subcategory = submission
                .subcategory
                .ok_or(FormError::MissingLayer("subcategoria"))?;
            if !SUBCATEGORIES.contains(&subcategory.as_str()) {
                return Err(FormError::UnknownSubcategory(subcategory));
            }
            let intensity = submission
                .intensity
                .ok_or(FormError::MissingLayer("intensidade"))?;
            if !INTENSITIES.contains(&intensity.as_str()) {
                return Err(FormError::UnknownIntensity(intensity));
            }
            (Some(subcategory), Some(intensity))
        } else {
            (None, None)
        };

        Ok(AnnotationRecord {
            text_id: text_id.to_string(),
            original_text: text.text.clone(),
            category: submission.category,
            subcategory,
            intensity,
            keywords: if submission.keywords.trim().is_empty() {
                text.keywords.clone()
            } else {
                split_keywords(&submission.keywords)
            },
            justification: submission.justification.trim().to_string(),
            annotator: self.annotator.clone(),
            annotated_at: now.to_string(),
        })
    }

    /// All stored annotations as a pretty-printed JSON array.
    pub fn export_json(&self) -> anyhow::Result<String> {
        Ok(serde_json::to_string_pretty(&self.annotations)?)
    }
}

pub fn split_keywords(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .collect()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeskCommand {
    Skip,
    Stats,
    Help,
    Quit,
    Export(Option<String>),
    Unknown(String),
}

pub const DESK_HELP_COMMANDS: &[(&str, &str)] = &[
    ("/skip", "show another text without saving"),
    ("/stats", "print the annotation tally"),
    ("/export <path>", "write all annotations as a JSON array"),
    ("/help", "list commands"),
    ("/quit", "leave the desk"),
];

/// Parses a slash command; plain input returns `None`.
pub fn parse_desk_command(line: &str) -> Option<DeskCommand> {
    let tail = line.trim().strip_prefix('/')?;
    let command_len = tail
        .chars()
        .take_while(|ch| ch.is_ascii_alphanumeric() || *ch == '_')
        .count();
    let command = tail[..command_len].to_ascii_lowercase();
    let arg = tail[command_len..].trim();

    Some(match command.as_str() {
        "skip" | "pular" => DeskCommand::Skip,
        "stats" => DeskCommand::Stats,
        "help" => DeskCommand::Help,
        "quit" | "exit" => DeskCommand::Quit,
        "export" => DeskCommand::Export(parse_path_arg(arg)),
        _ => DeskCommand::Unknown(command),
    })
}

fn parse_path_arg(arg: &str) -> Option<String> {
    if arg.is_empty() {
        return None;
    }
    let parts = shell_words::split(arg)
        .unwrap_or_else(|_| arg.split_whitespace().map(str::to_string).collect());
    let joined = parts.join(" ");
    (!joined.is_empty()).then_some(joined)
}

/// Accepts a 1-based option number or an option name, case-insensitive.
pub fn parse_choice(input: &str, options: &[&'static str]) -> Option<&'static str> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(number) = trimmed.parse::<usize>() {
        return number
            .checked_sub(1)
            .and_then(|idx| options.get(idx))
            .copied();
    }
    options
        .iter()
        .find(|option| option.eq_ignore_ascii_case(trimmed))
        .copied()
}

#[cfg(test)]
mod tests {
    use std::fs;

    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use xenocorpus_contracts::jsonl::read_jsonl;

    use super::*;

    fn corpus(ids: &[&str]) -> Vec<CorpusRecord> {
        ids.iter()
            .map(|id| CorpusRecord {
                id: id.to_string(),
                text: format!("texto de {id}"),
                ..CorpusRecord::default()
            })
            .collect()
    }

    fn positive() -> Submission {
        Submission {
            category: "XENOFOBIA".to_string(),
            subcategory: Some("IMIGRANTE".to_string()),
            intensity: Some("SUTIL".to_string()),
            keywords: " fronteira, , emprego ,".to_string(),
            justification: "generaliza o grupo ".to_string(),
        }
    }

    #[test]
    fn open_skips_already_annotated_texts() {
        let existing = AnnotationRecord {
            text_id: "corpus_00001".to_string(),
            category: "NAO_XENOFOBIA".to_string(),
            ..AnnotationRecord::default()
        };
        let desk = AnnotationDesk::new(
            corpus(&["corpus_00001", "corpus_00002"]),
            vec![existing],
            "unused.jsonl",
            DEFAULT_ANNOTATOR,
        );
        let mut rng = StdRng::seed_from_u64(3);

        for _ in 0..10 {
            let state = desk.open(&mut rng);
            assert_eq!(state.current.as_deref(), Some("corpus_00002"));
            assert_eq!(state.tally.total, 1);
        }
    }

    #[test]
    fn submit_persists_and_moves_on_until_exhausted() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = temp.path().join("anotacoes.jsonl");
        let mut desk = AnnotationDesk::new(corpus(&["a", "b"]), Vec::new(), &store, "anotador_7");
        let mut rng = StdRng::seed_from_u64(11);

        let state = desk.open(&mut rng);
        let first = state.current.clone().expect("text awaiting");
        let state = desk.handle(state, FormAction::Submit(positive()), &mut rng, "2025-02-01T10:00:00Z")?;
        let second = state.current.clone().expect("second text awaiting");
        assert_ne!(first, second);
        assert_eq!(state.tally.positive, 1);

        let negative = Submission {
            category: "NAO_XENOFOBIA".to_string(),
            ..positive()
        };
        let state = desk.handle(state, FormAction::Submit(negative), &mut rng, "ts")?;
        assert!(state.is_exhausted());
        assert_eq!(state.tally.total, 2);
        assert!((state.tally.positive_pct - 50.0).abs() < 1e-9);

        let stored = read_jsonl::<AnnotationRecord>(&store)?.records;
        assert_eq!(stored.len(), 2);
        assert_eq!(stored[0].text_id, first);
        assert_eq!(stored[0].keywords, vec!["fronteira", "emprego"]);
        assert_eq!(stored[0].justification, "generaliza o grupo");
        assert_eq!(stored[0].annotator, "anotador_7");
        assert_eq!(stored[0].original_text, format!("texto de {first}"));
        assert_eq!(stored[1].subcategory, None);
        assert_eq!(stored[1].intensity, None);
        Ok(())
    }

    #[test]
    fn blank_keywords_keep_the_generated_ones() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = temp.path().join("anotacoes.jsonl");
        let record = CorpusRecord {
            id: "a".to_string(),
            text: "texto de a".to_string(),
            keywords: vec!["fronteira".to_string(), "emprego".to_string()],
            ..CorpusRecord::default()
        };
        let mut desk = AnnotationDesk::new(vec![record], Vec::new(), &store, "x");
        let mut rng = StdRng::seed_from_u64(2);

        let state = desk.open(&mut rng);
        let blank = Submission {
            keywords: "  ".to_string(),
            ..positive()
        };
        desk.handle(state, FormAction::Submit(blank), &mut rng, "ts")?;

        let stored = read_jsonl::<AnnotationRecord>(&store)?.records;
        assert_eq!(stored[0].keywords, vec!["fronteira", "emprego"]);
        Ok(())
    }

    #[test]
    fn skip_does_not_persist() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = temp.path().join("anotacoes.jsonl");
        let mut desk = AnnotationDesk::new(corpus(&["a", "b", "c"]), Vec::new(), &store, "x");
        let mut rng = StdRng::seed_from_u64(5);

        let state = desk.open(&mut rng);
        let state = desk.handle(state, FormAction::Skip, &mut rng, "ts")?;
        assert!(!state.is_exhausted());
        assert!(desk.annotations().is_empty());
        assert!(!store.exists());
        Ok(())
    }

    #[test]
    fn invalid_submissions_are_rejected() {
        let mut desk = AnnotationDesk::new(corpus(&["a"]), Vec::new(), "unused.jsonl", "x");
        let mut rng = StdRng::seed_from_u64(1);

        let exhausted = FormState::default();
        let err = desk
            .handle(exhausted, FormAction::Submit(positive()), &mut rng, "ts")
            .expect_err("nothing awaiting");
        assert_eq!(err.downcast_ref::<FormError>(), Some(&FormError::NothingAwaiting));

        let state = desk.open(&mut rng);
        let missing = Submission {
            intensity: None,
            ..positive()
        };
        let err = desk
            .handle(state.clone(), FormAction::Submit(missing), &mut rng, "ts")
            .expect_err("intensity required");
        assert_eq!(
            err.downcast_ref::<FormError>(),
            Some(&FormError::MissingLayer("intensidade"))
        );

        let bogus = Submission {
            category: "TALVEZ".to_string(),
            ..positive()
        };
        assert!(desk
            .handle(state, FormAction::Submit(bogus), &mut rng, "ts")
            .is_err());
        assert!(desk.annotations().is_empty());
    }

    #[test]
    fn export_is_a_pretty_json_array() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let store = temp.path().join("anotacoes.jsonl");
        fs::write(
            &store,
            "{\"id_texto\":\"a\",\"categoria_principal\":\"XENOFOBIA\",\"subcategoria\":\"IMIGRANTE\"}\n",
        )?;
        let desk = AnnotationDesk::load(&temp.path().join("absent.jsonl"), &store, DEFAULT_ANNOTATOR)?;
        assert_eq!(desk.corpus_len(), 0);

        let exported = desk.export_json()?;
        assert!(exported.starts_with("[\n"));
        let parsed: serde_json::Value = serde_json::from_str(&exported)?;
        assert_eq!(parsed[0]["id_texto"], "a");
        assert_eq!(parsed[0]["subcategoria"], "IMIGRANTE");
        Ok(())
    }

    #[test]
    fn slash_commands_parse() {
        assert_eq!(parse_desk_command("/skip"), Some(DeskCommand::Skip));
        assert_eq!(parse_desk_command(" /STATS "), Some(DeskCommand::Stats));
        assert_eq!(
            parse_desk_command("/export \"minhas anotacoes.json\""),
            Some(DeskCommand::Export(Some("minhas anotacoes.json".to_string())))
        );
        assert_eq!(parse_desk_command("/export"), Some(DeskCommand::Export(None)));
        assert_eq!(
            parse_desk_command("/nope"),
            Some(DeskCommand::Unknown("nope".to_string()))
        );
        assert_eq!(parse_desk_command("1"), None);
    }

    #[test]
    fn choices_accept_numbers_and_names() {
        assert_eq!(parse_choice("1", CATEGORIES), Some("XENOFOBIA"));
        assert_eq!(parse_choice("nao_xenofobia", CATEGORIES), Some("NAO_XENOFOBIA"));
        assert_eq!(parse_choice("0", CATEGORIES), None);
        assert_eq!(parse_choice("3", CATEGORIES), None);
        assert_eq!(parse_choice("", INTENSITIES), None);
        assert_eq!(split_keywords(""), Vec::<String>::new());
    }
}
