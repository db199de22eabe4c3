//! Configuration resolver
//!
//! Reads the variable-handling schema (one row per variable) and reconciles
//! it against the columns actually present in the cohort table, expanding
//! the wildcard condition/variant rows into concrete per-column rules. The
//! result is a frozen set of typed per-column configs; downstream stages
//! never re-parse the schema.

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use polars::prelude::*;
use regex::Regex;
use serde::Serialize;

/// Subject identifier column
pub const INDEX_ID: &str = "person_id";

/// Imputation replicate identifier column
pub const INDEX_IMPUTE_ID: &str = "impute_id";

/// Per-row imputation provenance flags, passed through untouched
pub const INDEX_FLAGS: [&str; 2] = ["imputed_demographics", "imputed_vitals"];

/// Treatment-assignment column (PS target, DRS grouping variable)
pub const TARGET_TREATMENT: &str = "treatment_group";

/// Wildcard row covering the comorbidity indicator family
pub const CONDITION_COLUMN_PATTERN: &str = r"condition_[\w\d]+_vs";

/// Wildcard row covering the COVID-variant indicator family
pub const COVID_COLUMN_PATTERN: &str = r"covid19_[\w\d]+_vs";

/// All index columns; never used as model features
pub fn index_columns() -> Vec<&'static str> {
    let mut cols = vec![INDEX_ID, INDEX_IMPUTE_ID];
    cols.extend(INDEX_FLAGS);
    cols
}

/// Which pipeline step a configuration is resolved for; selects the
/// matching inclusion-flag column of the schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Ps,
    Drs,
}

impl Step {
    fn flag_column(&self) -> &'static str {
        match self {
            Step::Ps => "ps",
            Step::Drs => "drs",
        }
    }
}

/// Declared storage type of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Dtype {
    Int,
    Float,
    Bool,
    Object,
}

impl Dtype {
    pub fn is_numeric(&self) -> bool {
        matches!(self, Dtype::Int | Dtype::Float)
    }
}

impl std::str::FromStr for Dtype {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "int" => Ok(Dtype::Int),
            "float" => Ok(Dtype::Float),
            "bool" => Ok(Dtype::Bool),
            "object" => Ok(Dtype::Object),
            _ => Err(format!(
                "Unknown dtype: '{}'. Use 'int', 'float', 'bool' or 'object'.",
                s
            )),
        }
    }
}

/// Declared preprocessing transformer of a variable
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum TransformerKind {
    /// Identity; index and target columns
    Passthrough,
    /// Center/scale over the whole replicate
    NumericGlobal,
    /// Center/scale within each stratum of the stratifying column
    NumericStratified,
    /// Categorical expansion; becomes drop-baseline when a baseline value is set
    OneHot,
}

impl std::str::FromStr for TransformerKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "passthrough" => Ok(TransformerKind::Passthrough),
            "numeric" => Ok(TransformerKind::NumericGlobal),
            "numeric_stratified" | "numeric_intra_hs" => Ok(TransformerKind::NumericStratified),
            "onehot" => Ok(TransformerKind::OneHot),
            _ => Err(format!(
                "Unknown transformer: '{}'. Use 'passthrough', 'numeric', 'numeric_stratified' or 'onehot'.",
                s
            )),
        }
    }
}

/// One variable's resolved handling rule
#[derive(Debug, Clone, Serialize)]
pub struct ColumnConfig {
    pub variable: String,
    pub dtype: Dtype,
    pub transformer: TransformerKind,
    /// Replacement for missing values: a category for object columns,
    /// a constant for numeric columns (overrides mean imputation)
    pub map_null: Option<String>,
    /// Reference category dropped by the one-hot encoder
    pub onehot_baseline: Option<String>,
    /// Raw value mapped to 0 for non-0/1 boolean encodings
    pub bool_zero: Option<String>,
    /// Raw value mapped to 1 for non-0/1 boolean encodings
    pub bool_one: Option<String>,
}

/// Frozen configuration for one pipeline step: one entry per live column
/// that participates in modeling, plus the schema-drift bookkeeping.
#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    by_name: BTreeMap<String, ColumnConfig>,
    /// Columns in the data with no matching schema row; excluded from modeling
    pub unmatched_data_columns: Vec<String>,
    /// Schema rows with no matching data column; signals schema drift
    pub unmatched_config_rows: Vec<String>,
}

impl ResolvedConfig {
    pub fn get(&self, name: &str) -> Option<&ColumnConfig> {
        self.by_name.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.by_name.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }

    /// All resolved configs, ordered by column name
    pub fn iter(&self) -> impl Iterator<Item = &ColumnConfig> {
        self.by_name.values()
    }

    /// Names of columns whose dtype matches the predicate
    pub fn columns_with_dtype(&self, pred: impl Fn(Dtype) -> bool) -> Vec<String> {
        self.by_name
            .values()
            .filter(|c| pred(c.dtype))
            .map(|c| c.variable.clone())
            .collect()
    }

    /// Names of columns with the given transformer kind
    pub fn columns_with_transformer(&self, kind: TransformerKind) -> Vec<String> {
        self.by_name
            .values()
            .filter(|c| c.transformer == kind)
            .map(|c| c.variable.clone())
            .collect()
    }

    /// Configured columns in their resolved order (lookup key order)
    pub fn column_names(&self) -> Vec<String> {
        self.by_name.keys().cloned().collect()
    }
}

/// Resolve the schema table against the live column names for one step.
///
/// Wildcard rows (`condition_*_vs`, `covid19_*_vs`) are expanded into one
/// concrete config per matching live column when their step flag is set.
/// Live columns with no config entry and config rows with no live column
/// (pattern or exact) are collected for warning display, not silently
/// dropped. A missing config entry for a required index column, the
/// treatment column or any of the step's `required_targets` is fatal.
pub fn resolve_configs(
    data_columns: &[String],
    schema: &DataFrame,
    step: Step,
    required_targets: &[&str],
) -> Result<ResolvedConfig> {
    let rows = parse_schema_rows(schema, step)?;

    let condition_re = Regex::new(&format!("^{}$", CONDITION_COLUMN_PATTERN)).unwrap();
    let covid_re = Regex::new(&format!("^{}$", COVID_COLUMN_PATTERN)).unwrap();

    // Separate the wildcard rows from the exact-name rows.
    let mut exact: BTreeMap<String, SchemaRow> = BTreeMap::new();
    let mut condition_row: Option<SchemaRow> = None;
    let mut covid_row: Option<SchemaRow> = None;

    for row in rows {
        if row.config.variable == CONDITION_COLUMN_PATTERN {
            condition_row = Some(row);
        } else if row.config.variable == COVID_COLUMN_PATTERN {
            covid_row = Some(row);
        } else {
            exact.insert(row.config.variable.clone(), row);
        }
    }

    let mut by_name: BTreeMap<String, ColumnConfig> = BTreeMap::new();
    let mut unmatched_data_columns = Vec::new();
    let mut matched_config: std::collections::BTreeSet<String> = std::collections::BTreeSet::new();

    for column in data_columns {
        let wildcard = if condition_re.is_match(column) {
            condition_row.as_ref()
        } else if covid_re.is_match(column) {
            covid_row.as_ref()
        } else {
            None
        };

        // An enabled family row shadows a same-named exact row, matching
        // the source system's resolution order.
        if let Some(row) = wildcard {
            if exact.contains_key(column.as_str()) {
                matched_config.insert(column.clone());
            }
            if row.included {
                let mut config = row.config.clone();
                config.variable = column.clone();
                by_name.insert(column.clone(), config);
                continue;
            }
        }

        if let Some(row) = exact.get(column.as_str()) {
            matched_config.insert(column.clone());
            if row.included {
                by_name.insert(column.clone(), row.config.clone());
            }
            continue;
        }

        // Family toggle off: those columns are deliberately excluded.
        if wildcard.is_none() {
            unmatched_data_columns.push(column.clone());
        }
    }

    // Schema rows that matched nothing in the data signal schema drift.
    let mut unmatched_config_rows: Vec<String> = exact
        .keys()
        .filter(|name| !matched_config.contains(*name))
        .cloned()
        .collect();
    for (row, re) in [(&condition_row, &condition_re), (&covid_row, &covid_re)] {
        if let Some(row) = row {
            if !data_columns.iter().any(|c| re.is_match(c)) {
                unmatched_config_rows.push(row.config.variable.clone());
            }
        }
    }

    // Required index and target columns must have resolved entries.
    let mut required = vec![INDEX_ID, INDEX_IMPUTE_ID, TARGET_TREATMENT];
    required.extend_from_slice(required_targets);
    for column in required {
        if !by_name.contains_key(column) {
            bail!(
                "Required column '{}' has no resolved configuration for the {} step",
                column,
                step.flag_column()
            );
        }
    }

    Ok(ResolvedConfig {
        by_name,
        unmatched_data_columns,
        unmatched_config_rows,
    })
}

struct SchemaRow {
    config: ColumnConfig,
    /// Step inclusion flag (the `ps` or `drs` schema column)
    included: bool,
}

/// Parse the all-string schema table into typed rows.
fn parse_schema_rows(schema: &DataFrame, step: Step) -> Result<Vec<SchemaRow>> {
    let n = schema.height();

    let variable = string_column(schema, "variable")?;
    let dtype = string_column(schema, "dtype")?;
    let transformer = string_column(schema, "transformer")?;
    let map_null = string_column(schema, "map_null")?;
    let onehot_baseline = string_column(schema, "onehot_baseline")?;
    let bool_zero = string_column(schema, "bool_0")?;
    let bool_one = string_column(schema, "bool_1")?;
    let flag = string_column(schema, step.flag_column())?;

    let mut rows = Vec::with_capacity(n);
    for i in 0..n {
        let name = match &variable[i] {
            Some(v) if !v.is_empty() => v.clone(),
            _ => bail!("Schema row {} has an empty 'variable' field", i),
        };

        let dtype: Dtype = dtype[i]
            .as_deref()
            .unwrap_or("")
            .parse()
            .map_err(|e| anyhow::anyhow!("Schema row for '{}': {}", name, e))?;
        let transformer: TransformerKind = transformer[i]
            .as_deref()
            .unwrap_or("")
            .parse()
            .map_err(|e| anyhow::anyhow!("Schema row for '{}': {}", name, e))?;

        let included = matches!(flag[i].as_deref().map(str::trim), Some("1") | Some("true"));

        rows.push(SchemaRow {
            config: ColumnConfig {
                variable: name,
                dtype,
                transformer,
                map_null: non_empty(&map_null[i]),
                onehot_baseline: non_empty(&onehot_baseline[i]),
                bool_zero: non_empty(&bool_zero[i]),
                bool_one: non_empty(&bool_one[i]),
            },
            included,
        });
    }

    Ok(rows)
}

/// Extract a schema column as owned optional strings
fn string_column(schema: &DataFrame, name: &str) -> Result<Vec<Option<String>>> {
    let col = schema
        .column(name)
        .with_context(|| format!("Schema file is missing the '{}' column", name))?;
    let cast = col
        .cast(&DataType::String)
        .with_context(|| format!("Schema column '{}' is not readable as text", name))?;
    Ok(cast
        .str()?
        .into_iter()
        .map(|v| v.map(|s| s.to_string()))
        .collect())
}

fn non_empty(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema_df() -> DataFrame {
        df! {
            "variable" => ["person_id", "impute_id", "treatment_group", "age", "race", CONDITION_COLUMN_PATTERN],
            "dtype" => ["object", "int", "bool", "float", "object", "bool"],
            "transformer" => ["passthrough", "passthrough", "passthrough", "numeric", "onehot", "passthrough"],
            "map_null" => [None::<&str>, None, None, None, Some("unknown"), None],
            "onehot_baseline" => [None::<&str>, None, None, None, Some("white"), None],
            "bool_0" => [None::<&str>; 6],
            "bool_1" => [None::<&str>; 6],
            "ps" => ["1", "1", "1", "1", "1", "1"],
            "drs" => ["1", "1", "1", "0", "1", "0"],
        }
        .unwrap()
    }

    fn data_columns() -> Vec<String> {
        [
            "person_id",
            "impute_id",
            "treatment_group",
            "age",
            "race",
            "condition_diabetes_vs",
            "unlisted_extra",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect()
    }

    #[test]
    fn test_resolve_exact_and_wildcard() {
        let resolved = resolve_configs(&data_columns(), &schema_df(), Step::Ps, &[]).unwrap();

        assert!(resolved.contains("age"));
        assert!(resolved.contains("race"));
        // Wildcard expanded to the concrete column name.
        let cond = resolved.get("condition_diabetes_vs").unwrap();
        assert_eq!(cond.variable, "condition_diabetes_vs");
        assert_eq!(cond.dtype, Dtype::Bool);
    }

    #[test]
    fn test_unmatched_columns_reported() {
        let resolved = resolve_configs(&data_columns(), &schema_df(), Step::Ps, &[]).unwrap();
        assert_eq!(
            resolved.unmatched_data_columns,
            vec!["unlisted_extra".to_string()]
        );
        assert!(!resolved.contains("unlisted_extra"));
    }

    #[test]
    fn test_step_flag_filters_columns() {
        let resolved = resolve_configs(&data_columns(), &schema_df(), Step::Drs, &[]).unwrap();
        // age has drs=0 and the condition wildcard has drs=0
        assert!(!resolved.contains("age"));
        assert!(!resolved.contains("condition_diabetes_vs"));
        assert!(resolved.contains("race"));
    }

    #[test]
    fn test_missing_required_column_is_fatal() {
        let columns: Vec<String> = ["impute_id", "treatment_group", "age"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let result = resolve_configs(&columns, &schema_df(), Step::Ps, &[]);
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("person_id"));
    }

    #[test]
    fn test_schema_drift_warning_rows() {
        let columns: Vec<String> = ["person_id", "impute_id", "treatment_group"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let resolved = resolve_configs(&columns, &schema_df(), Step::Ps, &[]).unwrap();
        assert!(resolved
            .unmatched_config_rows
            .contains(&"age".to_string()));
        assert!(resolved
            .unmatched_config_rows
            .contains(&"race".to_string()));
    }

    #[test]
    fn test_missing_outcome_flag_config_fatal_for_drs() {
        let result = resolve_configs(
            &data_columns(),
            &schema_df(),
            Step::Drs,
            &["inpt_30d", "death_30d"],
        );
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("inpt_30d"));
    }

    #[test]
    fn test_enabled_wildcard_shadows_exact_row() {
        let schema = df! {
            "variable" => ["person_id", "impute_id", "treatment_group", "condition_diabetes_vs", CONDITION_COLUMN_PATTERN],
            "dtype" => ["object", "int", "bool", "float", "bool"],
            "transformer" => ["passthrough", "passthrough", "passthrough", "numeric", "passthrough"],
            "map_null" => [None::<&str>; 5],
            "onehot_baseline" => [None::<&str>; 5],
            "bool_0" => [None::<&str>; 5],
            "bool_1" => [None::<&str>; 5],
            "ps" => ["1"; 5],
            "drs" => ["1"; 5],
        }
        .unwrap();
        let columns: Vec<String> = [
            "person_id",
            "impute_id",
            "treatment_group",
            "condition_diabetes_vs",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();

        let resolved = resolve_configs(&columns, &schema, Step::Ps, &[]).unwrap();
        let cond = resolved.get("condition_diabetes_vs").unwrap();
        assert_eq!(cond.dtype, Dtype::Bool);
        assert_eq!(cond.transformer, TransformerKind::Passthrough);
        // The shadowed exact row is not flagged as drift.
        assert!(resolved.unmatched_config_rows.is_empty());
    }

    #[test]
    fn test_wildcard_with_no_matching_columns_reported() {
        let columns: Vec<String> = ["person_id", "impute_id", "treatment_group"]
            .iter()
            .map(|s| s.to_string())
            .collect();
        let resolved = resolve_configs(&columns, &schema_df(), Step::Ps, &[]).unwrap();
        assert!(resolved
            .unmatched_config_rows
            .contains(&CONDITION_COLUMN_PATTERN.to_string()));
    }

    #[test]
    fn test_onehot_baseline_parsed() {
        let resolved = resolve_configs(&data_columns(), &schema_df(), Step::Ps, &[]).unwrap();
        let race = resolved.get("race").unwrap();
        assert_eq!(race.onehot_baseline.as_deref(), Some("white"));
        assert_eq!(race.map_null.as_deref(), Some("unknown"));
    }
}
