//! Fixed label vocabularies shared by the generator, the annotation desk and
//! the agreement evaluator. The string values are the on-disk format.

pub const LABEL_HATE: &str = "XENOPHOBIC_HATE";
pub const LABEL_OFFENSIVE: &str = "OFFENSIVE_GENERAL";
pub const LABEL_NEUTRAL: &str = "NEUTRAL_BENIGN";

pub const PRIMARY_LABELS: &[&str] = &[LABEL_HATE, LABEL_OFFENSIVE, LABEL_NEUTRAL];

pub const TARGET_GROUPS: &[&str] = &[
    "TARGET_NORDESTINO",
    "TARGET_VENEZUELANO",
    "TARGET_HAITIANO",
    "TARGET_GENERIC_FOREIGNER",
];
pub const TARGET_OTHER: &str = "TARGET_OTHER";
pub const NO_TARGET: &str = "NENHUM";

pub const STRATEGIES: &[&str] = &[
    "STRATEGY_INCITEMENT",
    "STRATEGY_DEHUMANIZATION",
    "STRATEGY_SLUR",
    "STRATEGY_STEREOTYPING",
    "STRATEGY_EXCLUSION",
];
pub const EXPLICITNESS_LEVELS: &[&str] = &["EXPLICIT", "IMPLICIT_CODED"];

/// Placeholder used for both strategy and explicitness on non-hate records.
pub const NONE_FEMININE: &str = "NENHUMA";

pub const CATEGORY_POSITIVE: &str = "XENOFOBIA";
pub const CATEGORY_NEGATIVE: &str = "NAO_XENOFOBIA";
pub const CATEGORIES: &[&str] = &[CATEGORY_POSITIVE, CATEGORY_NEGATIVE];

pub const SUBCATEGORIES: &[&str] = &[
    "NACIONALIDADE",
    "IMIGRANTE",
    "DISCRIMINACAO_ECONOMICA",
    "DISCRIMINACAO_CULTURAL",
    "GENERALIZACAO_NEGATIVA",
];
pub const INTENSITIES: &[&str] = &["SUTIL", "MODERADO", "EXPLICITO"];

pub fn is_primary_label(value: &str) -> bool {
    PRIMARY_LABELS.contains(&value)
}

pub fn is_valid_target(value: &str) -> bool {
    TARGET_GROUPS.contains(&value) || value == TARGET_OTHER || value == NO_TARGET
}

pub fn is_valid_strategy(value: &str) -> bool {
    STRATEGIES.contains(&value) || value == NONE_FEMININE
}

pub fn is_valid_explicitness(value: &str) -> bool {
    EXPLICITNESS_LEVELS.contains(&value) || value == NONE_FEMININE
}
