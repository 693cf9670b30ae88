//! Prompt construction for one generation batch.
//!
//! Every random choice goes through the caller's `Rng`, so a seeded source
//! reproduces the exact prompt.

use std::path::Path;
use std::sync::OnceLock;

use indexmap::IndexMap;
use rand::Rng;
use regex::{Captures, Regex};

use crate::error::ConfigError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetProfile {
    pub key: &'static str,
    pub terms: &'static [&'static str],
    pub themes: &'static [&'static str],
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Persona {
    pub key: &'static str,
    pub description: &'static str,
    pub language: &'static str,
    pub traits: &'static [&'static str],
    pub strategies: &'static [&'static str],
}

pub const TARGETS: &[TargetProfile] = &[
    TargetProfile {
        key: "TARGET_NORDESTINO",
        terms: &["nordestino", "baiano", "cearense", "pernambucano", "maranhense"],
        themes: &["eleições", "política", "programas sociais", "votação", "desenvolvimento"],
    },
    TargetProfile {
        key: "TARGET_VENEZUELANO",
        terms: &["venezuelano"],
        themes: &["fronteira", "Roraima", "crise migratória", "criminalidade", "saúde pública"],
    },
    TargetProfile {
        key: "TARGET_HAITIANO",
        terms: &["haitiano"],
        themes: &["terremoto", "migração", "trabalho", "cultura", "integração"],
    },
    TargetProfile {
        key: "TARGET_GENERIC_FOREIGNER",
        terms: &["estrangeiro", "imigrante", "refugiado", "forasteiro"],
        themes: &["nacionalidade", "identidade", "segurança", "economia", "cultura"],
    },
];

/// Rhetorical strategy keys with a neutral description of their markers.
pub const STRATEGY_MARKERS: &[(&str, &str)] = &[
    ("STRATEGY_INCITEMENT", "apelos a expulsão, deportação ou ação contra o grupo"),
    ("STRATEGY_DEHUMANIZATION", "metáforas de doença, praga ou invasão aplicadas a pessoas"),
    ("STRATEGY_SLUR", "uso de gentílicos como termo pejorativo"),
    ("STRATEGY_STEREOTYPING", "generalizações absolutas (todos, sempre, nunca, típico de)"),
    ("STRATEGY_EXCLUSION", "negação de direitos, acesso ou permanência"),
];

pub const CONTEXTS: &[&str] = &[
    "tweet reagindo a notícia sobre imigração",
    "post no Twitter sobre venezuelanos na cidade",
    "comentário sobre nordestinos vindo pro sul",
    "tweet sobre haitianos no bairro",
    "post reagindo a vídeo de imigrante",
    "comentário sobre estrangeiros no trabalho",
    "tweet sobre notícia de criminalidade",
    "post sobre fila do SUS com imigrantes",
    "comentário sobre vaga de emprego",
    "tweet sobre eleição e imigração",
];

pub const PERSONAS: &[Persona] = &[
    Persona {
        key: "usuario_preconceituoso",
        description: "usuário de rede social que posta conteúdo xenófobo de forma direta e agressiva",
        language: "informal, com gírias, abreviações e emojis",
        traits: &["usa hashtags", "escreve em caps", "usa emojis de raiva", "linguagem coloquial"],
        strategies: &["STRATEGY_SLUR", "STRATEGY_INCITEMENT"],
    },
    Persona {
        key: "cidadao_preocupado",
        description: "usuário que parece preocupado com questões sociais, mas tem viés xenófobo",
        language: "mais formal, mas com expressões do dia a dia",
        traits: &[
            "usa reticências",
            "faz perguntas retóricas",
            "cita notícias",
            "linguagem aparentemente educada",
        ],
        strategies: &["STRATEGY_STEREOTYPING", "STRATEGY_EXCLUSION"],
    },
    Persona {
        key: "morador_frustrado",
        description: "pessoa que vive em área com muitos imigrantes e expressa frustração de forma sutil",
        language: "coloquial e regional, falando de experiência pessoal",
        traits: &[
            "fala de experiência pessoal",
            "usa linguagem ambígua",
            "permite negação plausível",
        ],
        strategies: &["STRATEGY_DEHUMANIZATION", "STRATEGY_STEREOTYPING"],
    },
];

const BALANCED_TEMPLATE: &str = r#"Você está ajudando a construir um corpus sintético para treinar classificadores que DETECTAM discurso de ódio xenofóbico em português brasileiro.
Gere {count} textos curtos no estilo de posts de redes sociais: {hate_count} rotulados XENOPHOBIC_HATE e {non_hate_count} sem xenofobia.

CONTEXTO: os textos simulam {context}.

TEXTOS XENOPHOBIC_HATE ({hate_count}):
- PERSONA: {persona}
- GRUPO-ALVO: {target} ({target_terms})
- ESTRATÉGIA RETÓRICA: {strategy} ({strategy_markers})
- LINGUAGEM: {persona_language}
- CARACTERÍSTICAS: {persona_traits}
- TEMAS: {themes}

TEXTOS SEM XENOFOBIA ({non_hate_count}):
- NEUTRAL_BENIGN ({neutral_count}): discussões neutras sobre imigração, diversidade cultural e políticas migratórias.
- OFFENSIVE_GENERAL ({offensive_count}): críticas ásperas a políticas públicas, nunca a pessoas ou grupos.

ESTILO: linguagem informal e coloquial, abreviações comuns, emojis e hashtags. Máximo de 280 caracteres por texto; misture textos curtos e médios.

FORMATO DE SAÍDA: apenas um array JSON válido, sem markdown, com aspas duplas e sem quebras de linha dentro das strings.
[
  {"texto": "...", "classificacao_primaria": "XENOPHOBIC_HATE|OFFENSIVE_GENERAL|NEUTRAL_BENIGN", "alvo": "{target}|TARGET_OTHER|NENHUM", "estrategia": "{strategy}|NENHUMA", "explicitude": "EXPLICIT|IMPLICIT_CODED|NENHUMA", "contexto": "{context}", "palavras_chave": ["...", "..."]}
]

Gere os {count} textos agora:
"#;

const HATE_ONLY_TEMPLATE: &str = r#"Você está ajudando a construir um corpus sintético para treinar classificadores que DETECTAM discurso de ódio xenofóbico em português brasileiro.
Gere {count} textos curtos no estilo de posts de redes sociais, todos rotulados XENOPHOBIC_HATE.

CONTEXTO: os textos simulam {context}.

INSTRUÇÕES:
- PERSONA: {persona}
- GRUPO-ALVO: {target} ({target_terms})
- ESTRATÉGIA RETÓRICA: {strategy} ({strategy_markers})
- LINGUAGEM: {persona_language}
- TEMAS: {themes}

ESTILO: linguagem informal típica de redes sociais. Máximo de 280 caracteres por texto.

FORMATO DE SAÍDA: apenas um array JSON válido, sem markdown.
[
  {"texto": "...", "classificacao_primaria": "XENOPHOBIC_HATE", "alvo": "{target}|TARGET_OTHER", "estrategia": "{strategy}", "explicitude": "EXPLICIT|IMPLICIT_CODED", "contexto": "{context}", "palavras_chave": ["...", "..."]}
]

Gere os {count} textos agora:
"#;

/// Expected per-class counts for one batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassBreakdown {
    pub hate: usize,
    pub neutral: usize,
    pub offensive: usize,
}

impl ClassBreakdown {
    pub fn for_batch(batch_size: usize, include_non_hate: bool) -> Self {
        if !include_non_hate {
            return Self {
                hate: batch_size,
                neutral: 0,
                offensive: 0,
            };
        }
        let hate = batch_size / 2;
        let non_hate = batch_size - hate;
        let neutral = non_hate / 2;
        Self {
            hate,
            neutral,
            offensive: non_hate - neutral,
        }
    }

    pub fn non_hate(&self) -> usize {
        self.neutral + self.offensive
    }

    pub fn total(&self) -> usize {
        self.hate + self.non_hate()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PromptChoices {
    pub context: &'static str,
    pub persona: &'static Persona,
    pub target: &'static TargetProfile,
    pub strategy: &'static str,
}

#[derive(Debug, Clone, PartialEq)]
pub struct PromptPlan {
    pub text: String,
    pub choices: PromptChoices,
    pub breakdown: ClassBreakdown,
}

/// Prompt text with `{name}` placeholders.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    source: String,
}

impl PromptTemplate {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
        }
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        std::fs::read_to_string(path)
            .map(Self::new)
            .map_err(|err| ConfigError::Template {
                path: path.display().to_string(),
                reason: err.to_string(),
            })
    }

    /// Unknown placeholders are left as written.
    pub fn render(&self, vars: &IndexMap<&'static str, String>) -> String {
        placeholder_pattern()
            .replace_all(&self.source, |caps: &Captures<'_>| {
                vars.get(&caps[1])
                    .cloned()
                    .unwrap_or_else(|| caps[0].to_string())
            })
            .into_owned()
    }
}

fn placeholder_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\{([a-z_]+)\}").expect("placeholder pattern compiles"))
}

pub fn choose<R: Rng + ?Sized>(rng: &mut R) -> PromptChoices {
    let context = CONTEXTS[rng.random_range(0..CONTEXTS.len())];
    let persona = &PERSONAS[rng.random_range(0..PERSONAS.len())];
    let target = &TARGETS[rng.random_range(0..TARGETS.len())];
    let strategy = persona.strategies[rng.random_range(0..persona.strategies.len())];
    PromptChoices {
        context,
        persona,
        target,
        strategy,
    }
}

pub fn strategy_markers(strategy: &str) -> &'static str {
    STRATEGY_MARKERS
        .iter()
        .find(|(key, _)| *key == strategy)
        .map(|(_, markers)| *markers)
        .unwrap_or("")
}

/// Builds the batch prompt. `template` replaces the built-in instruction.
pub fn build_prompt<R: Rng + ?Sized>(
    rng: &mut R,
    batch_size: usize,
    include_non_hate: bool,
    template: Option<&PromptTemplate>,
) -> PromptPlan {
    let choices = choose(rng);
    let breakdown = ClassBreakdown::for_batch(batch_size, include_non_hate);
    let vars = template_vars(&choices, &breakdown);

    let text = match template {
        Some(custom) => custom.render(&vars),
        None if include_non_hate => PromptTemplate::new(BALANCED_TEMPLATE).render(&vars),
        None => PromptTemplate::new(HATE_ONLY_TEMPLATE).render(&vars),
    };

    PromptPlan {
        text,
        choices,
        breakdown,
    }
}

fn template_vars(
    choices: &PromptChoices,
    breakdown: &ClassBreakdown,
) -> IndexMap<&'static str, String> {
    let mut vars = IndexMap::new();
    vars.insert("count", breakdown.total().to_string());
    vars.insert("hate_count", breakdown.hate.to_string());
    vars.insert("non_hate_count", breakdown.non_hate().to_string());
    vars.insert("neutral_count", breakdown.neutral.to_string());
    vars.insert("offensive_count", breakdown.offensive.to_string());
    vars.insert("context", choices.context.to_string());
    vars.insert("persona", choices.persona.description.to_string());
    vars.insert("persona_language", choices.persona.language.to_string());
    vars.insert("persona_traits", choices.persona.traits.join(", "));
    vars.insert("target", choices.target.key.to_string());
    vars.insert(
        "target_terms",
        choices
            .target
            .terms
            .iter()
            .take(3)
            .copied()
            .collect::<Vec<_>>()
            .join(", "),
    );
    vars.insert("strategy", choices.strategy.to_string());
    vars.insert("strategy_markers", strategy_markers(choices.strategy).to_string());
    vars.insert("themes", choices.target.themes.join(", "));
    vars
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use xenocorpus_contracts::vocab::{STRATEGIES, TARGET_GROUPS};

    use super::*;

    #[test]
    fn balanced_breakdown_splits_half_then_quarters() {
        let breakdown = ClassBreakdown::for_batch(10, true);
        assert_eq!(breakdown.hate, 5);
        assert_eq!(breakdown.neutral, 2);
        assert_eq!(breakdown.offensive, 3);
        assert_eq!(breakdown.total(), 10);

        let odd = ClassBreakdown::for_batch(7, true);
        assert_eq!((odd.hate, odd.neutral, odd.offensive), (3, 2, 2));
    }

    #[test]
    fn hate_only_breakdown_has_no_other_classes() {
        let breakdown = ClassBreakdown::for_batch(10, false);
        assert_eq!((breakdown.hate, breakdown.non_hate()), (10, 0));
    }

    #[test]
    fn same_seed_reproduces_prompt() {
        let first = build_prompt(&mut StdRng::seed_from_u64(42), 10, true, None);
        let second = build_prompt(&mut StdRng::seed_from_u64(42), 10, true, None);
        assert_eq!(first, second);
    }

    #[test]
    fn choices_come_from_fixed_vocabularies() {
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..50 {
            let choices = choose(&mut rng);
            assert!(CONTEXTS.contains(&choices.context));
            assert!(TARGET_GROUPS.contains(&choices.target.key));
            assert!(STRATEGIES.contains(&choices.strategy));
            assert!(choices.persona.strategies.contains(&choices.strategy));
        }
    }

    #[test]
    fn built_in_prompt_fills_every_placeholder() {
        let plan = build_prompt(&mut StdRng::seed_from_u64(3), 10, true, None);
        assert!(plan.text.contains("Gere 10 textos"));
        assert!(plan.text.contains(plan.choices.target.key));
        assert!(plan.text.contains(plan.choices.context));
        assert!(!placeholder_pattern().is_match(&plan.text));
        assert!(plan.text.contains(r#"{"texto": "...""#));
    }

    #[test]
    fn hate_only_prompt_uses_single_label() {
        let plan = build_prompt(&mut StdRng::seed_from_u64(3), 4, false, None);
        assert!(plan.text.contains("todos rotulados XENOPHOBIC_HATE"));
        assert!(!plan.text.contains("NEUTRAL_BENIGN"));
    }

    #[test]
    fn custom_template_keeps_unknown_placeholders() {
        let template = PromptTemplate::new("{count}/{hate_count} sobre {target} {unknown}");
        let plan = build_prompt(&mut StdRng::seed_from_u64(1), 6, true, Some(&template));
        assert_eq!(
            plan.text,
            format!("6/3 sobre {} {{unknown}}", plan.choices.target.key)
        );
    }

    #[test]
    fn template_load_reports_missing_file() -> anyhow::Result<()> {
        let temp = tempfile::tempdir()?;
        let missing = temp.path().join("absent.txt");
        assert!(matches!(
            PromptTemplate::load(&missing),
            Err(ConfigError::Template { .. })
        ));

        let path = temp.path().join("template.txt");
        std::fs::write(&path, "Gere {count}")?;
        assert_eq!(PromptTemplate::load(&path)?, PromptTemplate::new("Gere {count}"));
        Ok(())
    }
}
