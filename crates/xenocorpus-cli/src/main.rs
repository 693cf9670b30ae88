use std::fs;
use std::io::{self, ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing_subscriber::EnvFilter;
use xenocorpus_contracts::vocab::{CATEGORIES, CATEGORY_POSITIVE, INTENSITIES, SUBCATEGORIES};
use xenocorpus_contracts::AnnotationTally;
use xenocorpus_engine::agreement::{
    format_kappa, load_annotations, DEFAULT_ANNOTATIONS_FILE, DEFAULT_REPORT_FILE,
};
use xenocorpus_engine::config::{DEFAULT_BATCH_SIZE, DEFAULT_OUTPUT};
use xenocorpus_engine::desk::{
    parse_choice, parse_desk_command, DeskCommand, DEFAULT_ANNOTATOR, DESK_HELP_COMMANDS,
};
use xenocorpus_engine::postprocess::{
    export_csv, renumber_ids, CORPUS_FILE, CSV_FILE, FIXED_CORPUS_FILE,
};
use xenocorpus_engine::{
    evaluate, load_api_keys, now_utc_iso, render_markdown, run_generation, AgreementOutcome,
    AnnotationDesk, BatchRequester, CredentialRing, FormAction, GeminiBackend,
    GeneratorConfig, Layer, PromptTemplate, RetryPolicy, Submission,
};

#[derive(Debug, Parser)]
#[command(
    name = "xenocorpus",
    version,
    about = "Synthetic xenophobia corpus generation and annotation tools"
)]
struct Cli {
    /// Debug-level logging unless RUST_LOG is set.
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Generate labeled records through the Gemini API.
    Generate(GenerateArgs),
    /// Renumber corpus ids densely into the corrected corpus file.
    FixIds,
    /// Export the corrected corpus as an id,texto CSV.
    ExportCsv,
    /// Compute inter-annotator agreement and write a Markdown report.
    Agreement(AgreementArgs),
    /// Annotate corpus texts interactively.
    Annotate(AnnotateArgs),
}

#[derive(Debug, Args)]
struct GenerateArgs {
    /// Number of batches to request.
    batches: usize,
    #[arg(short, long, alias = "arquivo", default_value = DEFAULT_OUTPUT)]
    output: PathBuf,
    #[arg(short = 's', long, alias = "tamanho-lote", default_value_t = DEFAULT_BATCH_SIZE)]
    batch_size: usize,
    /// Request only XENOPHOBIC_HATE records.
    #[arg(long, alias = "apenas-xenofobia")]
    hate_only: bool,
    /// Prompt template with {placeholders}; replaces the built-in prompt.
    #[arg(long)]
    template: Option<PathBuf>,
    /// Audit file for rejected records.
    #[arg(long)]
    rejected: Option<PathBuf>,
    /// Run seed for prompt variation.
    #[arg(long)]
    seed: Option<u64>,
    /// Log batches without drawing a progress bar.
    #[arg(long)]
    no_progress: bool,
}

#[derive(Debug, Args)]
struct AgreementArgs {
    #[arg(short = 'a', long = "arquivo", default_value = DEFAULT_ANNOTATIONS_FILE)]
    annotations: PathBuf,
    #[arg(short = 's', long = "saida", default_value = DEFAULT_REPORT_FILE)]
    report: PathBuf,
}

#[derive(Debug, Args)]
struct AnnotateArgs {
    #[arg(long, default_value = DEFAULT_OUTPUT)]
    corpus: PathBuf,
    #[arg(long, default_value = DEFAULT_ANNOTATIONS_FILE)]
    annotations: PathBuf,
    #[arg(long, default_value = DEFAULT_ANNOTATOR)]
    annotator: String,
}

fn main() {
    match run() {
        Ok(code) => std::process::exit(code),
        Err(err) => {
            eprintln!("xenocorpus error: {err:#}");
            std::process::exit(1);
        }
    }
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    match cli.command {
        Command::Generate(args) => run_generate(args),
        Command::FixIds => run_fix_ids(),
        Command::ExportCsv => run_export_csv(),
        Command::Agreement(args) => run_agreement(args),
        Command::Annotate(args) => run_annotate(args),
    }
}

fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .compact()
        .try_init();
}

fn run_generate(args: GenerateArgs) -> Result<i32> {
    if args.batches == 0 {
        bail!("batches must be at least 1");
    }
    if args.batch_size == 0 {
        bail!("--batch-size must be at least 1");
    }

    let mut config = GeneratorConfig::from_env().with_output(&args.output);
    config.batch_size = args.batch_size;
    config.include_non_hate = !args.hate_only;
    config.show_progress = !args.no_progress;
    if let Some(rejected) = args.rejected {
        config.rejected_path = rejected;
    }

    let credentials = CredentialRing::new(load_api_keys()?)?;
    let template = args
        .template
        .as_deref()
        .map(PromptTemplate::load)
        .transpose()?;
    let seed = args.seed.unwrap_or_else(rand::random);

    println!(
        "Generating {} batch(es) of {} with {} ({} credential(s), seed {seed})",
        args.batches,
        config.batch_size,
        config.model,
        credentials.len()
    );
    let requester = BatchRequester::new(
        GeminiBackend::new(&config),
        credentials,
        RetryPolicy::from_config(&config),
    );
    let summary = run_generation(&requester, &config, template.as_ref(), seed, args.batches)?;

    println!();
    println!("Batches requested: {}", summary.batches);
    println!(
        "Batches failed:    {} ({} blocked)",
        summary.failed_batches, summary.blocked_batches
    );
    println!("Records accepted:  {}", summary.accepted);
    println!("Records rejected:  {}", summary.rejected);
    for (label, count) in &summary.per_class {
        println!("  {label}: {count}");
    }
    if let Some(proportion) = summary.hate_proportion() {
        println!("Hate proportion:   {:.1}%", proportion * 100.0);
    }
    println!("Corpus: {}", summary.output_path.display());
    if summary.rejected > 0 {
        println!("Rejected audit: {}", summary.rejected_path.display());
    }
    Ok(0)
}

fn run_fix_ids() -> Result<i32> {
    let report = renumber_ids(Path::new(CORPUS_FILE), Path::new(FIXED_CORPUS_FILE))?;
    if report.skipped > 0 {
        println!("Skipped {} malformed line(s)", report.skipped);
    }
    println!("Renumbered {} record(s) into {FIXED_CORPUS_FILE}", report.total);
    Ok(0)
}

fn run_export_csv() -> Result<i32> {
    let rows = export_csv(Path::new(FIXED_CORPUS_FILE), Path::new(CSV_FILE))?;
    println!("Exported {rows} row(s) to {CSV_FILE}");
    Ok(0)
}

fn run_agreement(args: AgreementArgs) -> Result<i32> {
    println!("Analysing inter-annotator agreement");
    println!("Annotations: {}", args.annotations.display());

    let annotations = load_annotations(&args.annotations)?;
    let outcome = evaluate(&annotations);
    fs::write(&args.report, render_markdown(&outcome))
        .with_context(|| format!("failed to write {}", args.report.display()))?;

    match &outcome {
        AgreementOutcome::NoData { total_annotations } => {
            println!(
                "\nNo text has two annotations yet ({total_annotations} annotation(s) loaded)."
            );
        }
        AgreementOutcome::Computed(report) => {
            println!("\nSummary:");
            for layer in [Layer::Category, Layer::Subcategory] {
                if let Some(entry) = report.layer(layer) {
                    println!("Kappa - {}: {}", layer.title(), format_kappa(entry.kappa));
                }
            }
            for layer in [Layer::Category, Layer::Subcategory] {
                if let Some(entry) = report.layer(layer) {
                    println!("Agreement - {}: {:.1}%", layer.title(), entry.percent);
                }
            }
        }
    }
    println!("\nReport written to {}", args.report.display());
    Ok(0)
}

fn run_annotate(args: AnnotateArgs) -> Result<i32> {
    let mut desk = AnnotationDesk::load(&args.corpus, &args.annotations, &args.annotator)?;
    let mut rng = StdRng::from_os_rng();
    let mut state = desk.open(&mut rng);
    let mut input = LineInput::new();

    println!(
        "Annotation desk: {} text(s), annotator {}. Type /help for commands.",
        desk.corpus_len(),
        desk.annotator()
    );

    loop {
        let Some(text_id) = state.current.clone() else {
            println!("Every text in the corpus has been annotated.");
            print_tally(&state.tally);
            break;
        };
        let (text, context, suggested) = desk
            .text(&text_id)
            .map(|record| {
                (
                    record.text.clone(),
                    record.context.clone(),
                    record.keywords.join(", "),
                )
            })
            .unwrap_or_default();
        if context.is_empty() {
            println!("\n[{text_id}] {text}");
        } else {
            println!("\n[{text_id}] ({context}) {text}");
        }

        let Some(line) = input.ask(&format!("category ({})> ", numbered(CATEGORIES)))? else {
            break;
        };
        if let Some(command) = parse_desk_command(&line) {
            match command {
                DeskCommand::Quit => break,
                DeskCommand::Help => {
                    for (usage, about) in DESK_HELP_COMMANDS {
                        println!("  {usage:<16} {about}");
                    }
                }
                DeskCommand::Stats => print_tally(&state.tally),
                DeskCommand::Skip => {
                    state = desk.handle(state, FormAction::Skip, &mut rng, &now_utc_iso())?;
                }
                DeskCommand::Export(Some(path)) => {
                    fs::write(&path, desk.export_json()?)
                        .with_context(|| format!("failed to write {path}"))?;
                    println!("Exported {} annotation(s) to {path}", desk.annotations().len());
                }
                DeskCommand::Export(None) => println!("/export requires a path"),
                DeskCommand::Unknown(command) => {
                    println!("Unknown command: /{command}. Type /help for commands.")
                }
            }
            continue;
        }

        let Some(category) = parse_choice(&line, CATEGORIES) else {
            println!("Unknown category: {}", line.trim());
            continue;
        };
        let (subcategory, intensity) = if category == CATEGORY_POSITIVE {
            let Some(subcategory) = input.ask_choice("subcategory", SUBCATEGORIES)? else {
                break;
            };
            let Some(intensity) = input.ask_choice("intensity", INTENSITIES)? else {
                break;
            };
            (Some(subcategory.to_string()), Some(intensity.to_string()))
        } else {
            (None, None)
        };
        let keyword_prompt = if suggested.is_empty() {
            "keywords (comma separated)> ".to_string()
        } else {
            format!("keywords [{suggested}] (comma separated, blank keeps)> ")
        };
        let Some(keywords) = input.ask(&keyword_prompt)? else {
            break;
        };
        let Some(justification) = input.ask("justification> ")? else {
            break;
        };

        let submission = Submission {
            category: category.to_string(),
            subcategory,
            intensity,
            keywords,
            justification,
        };
        match desk.handle(
            state.clone(),
            FormAction::Submit(submission),
            &mut rng,
            &now_utc_iso(),
        ) {
            Ok(next) => {
                println!("Saved annotation for {text_id}");
                state = next;
            }
            Err(err) => println!("Not saved: {err:#}"),
        }
    }
    Ok(0)
}

fn numbered(options: &[&str]) -> String {
    options
        .iter()
        .enumerate()
        .map(|(idx, option)| format!("{} {option}", idx + 1))
        .collect::<Vec<_>>()
        .join(", ")
}

fn print_tally(tally: &AnnotationTally) {
    println!("Annotations: {}", tally.total);
    if tally.total == 0 {
        return;
    }
    println!(
        "  XENOFOBIA: {} ({:.1}%)  NAO_XENOFOBIA: {}",
        tally.positive, tally.positive_pct, tally.negative
    );
    for (name, count) in &tally.subcategories {
        println!("  subcategory {name}: {count}");
    }
    for (name, count) in &tally.intensities {
        println!("  intensity {name}: {count}");
    }
}

/// Line reader over stdin; `None` means end of input.
struct LineInput {
    stdin: io::Stdin,
    line: String,
}

impl LineInput {
    fn new() -> Self {
        Self {
            stdin: io::stdin(),
            line: String::new(),
        }
    }

    fn ask(&mut self, prompt: &str) -> Result<Option<String>> {
        loop {
            print!("{prompt}");
            io::stdout().flush()?;
            self.line.clear();
            match self.stdin.read_line(&mut self.line) {
                Ok(0) => return Ok(None),
                Ok(_) => return Ok(Some(self.line.trim_end_matches(['\n', '\r']).to_string())),
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) => return Err(err.into()),
            }
        }
    }

    fn ask_choice(&mut self, label: &str, options: &[&'static str]) -> Result<Option<&'static str>> {
        let prompt = format!("{label} ({})> ", numbered(options));
        loop {
            let Some(line) = self.ask(&prompt)? else {
                return Ok(None);
            };
            match parse_choice(&line, options) {
                Some(choice) => return Ok(Some(choice)),
                None => println!("Unknown {label}: {}", line.trim()),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::{Cli, Command};

    #[test]
    fn generate_accepts_portuguese_flag_names() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from([
            "xenocorpus",
            "generate",
            "2",
            "--arquivo",
            "lote.jsonl",
            "--tamanho-lote",
            "5",
            "--apenas-xenofobia",
        ])?;
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.batches, 2);
        assert_eq!(args.output.to_str(), Some("lote.jsonl"));
        assert_eq!(args.batch_size, 5);
        assert!(args.hate_only);
        assert!(!args.no_progress);
        Ok(())
    }

    #[test]
    fn generate_defaults_apply() -> anyhow::Result<()> {
        let cli = Cli::try_parse_from(["xenocorpus", "generate", "1"])?;
        let Command::Generate(args) = cli.command else {
            panic!("expected generate");
        };
        assert_eq!(args.batch_size, xenocorpus_engine::config::DEFAULT_BATCH_SIZE);
        assert!(!args.hate_only);
        Ok(())
    }
}
