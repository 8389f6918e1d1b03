//! KPI evaluation: expected values for page metric fields and the 0–10 score
//! comparing them with what a social report actually recorded.
//!
//! Two expectation models exist:
//! - `growth_over_time`: the field grows by `growth_value` every
//!   `growth_period_days`, counted in whole periods since the page's
//!   `start_date`. With `growth_kind = absolute` the growth is additive
//!   (`growth_value * periods`); with `growth_kind = percentage` it compounds on
//!   the page's baseline value (`baseline * (1 + growth_value/100)^periods`).
//! - `percentage_of_field`: the field should equal `percentage_value`% of
//!   another field's value on the same report.

use std::collections::HashMap;
use std::str::FromStr;

use chrono::NaiveDate;
use rust_decimal::{Decimal, RoundingStrategy};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub const MODEL_GROWTH_OVER_TIME: &str = "growth_over_time";
pub const MODEL_PERCENTAGE_OF_FIELD: &str = "percentage_of_field";

/// Highest possible score.
pub const MAX_SCORE: Decimal = Decimal::TEN;

#[derive(Debug, Clone, PartialEq, Eq, Error, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum KpiError {
    #[error("unknown KPI model type '{model_type}'")]
    UnknownModelType { model_type: String },

    #[error("unknown growth kind '{growth_kind}'")]
    UnknownGrowthKind { growth_kind: String },

    #[error("growth model requires growth_value")]
    MissingGrowthValue,

    #[error("growth_period_days must be positive, got {period_days:?}")]
    InvalidGrowthPeriod { period_days: Option<i32> },

    #[error("percentage model requires related_field_id")]
    MissingRelatedField,

    #[error("percentage model requires percentage_value")]
    MissingPercentageValue,

    #[error("percentage growth requires a numeric baseline for field {field_id}")]
    MissingBaseline { field_id: i64 },

    #[error("expected value overflowed")]
    Overflow,

    #[error("{parameter} does not apply to the {model_type} model")]
    UnusedParameter {
        model_type: &'static str,
        parameter: &'static str,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowthKind {
    #[default]
    Absolute,
    Percentage,
}

impl GrowthKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Absolute => "absolute",
            Self::Percentage => "percentage",
        }
    }
}

impl FromStr for GrowthKind {
    type Err = KpiError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "absolute" => Ok(Self::Absolute),
            "percentage" => Ok(Self::Percentage),
            other => Err(KpiError::UnknownGrowthKind {
                growth_kind: other.to_string(),
            }),
        }
    }
}

/// A validated expectation model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KpiModel {
    GrowthOverTime {
        growth_value: Decimal,
        kind: GrowthKind,
        period_days: i32,
    },
    PercentageOfField {
        related_field_id: i64,
        percentage_value: Decimal,
    },
}

/// A `page_kpis` row joined with its model type, as stored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KpiDefinition {
    pub id: i64,
    pub field_id: i64,
    pub model_type: String,
    pub related_field_id: Option<i64>,
    pub growth_value: Option<Decimal>,
    pub growth_kind: String,
    pub growth_period_days: Option<i32>,
    pub percentage_value: Option<Decimal>,
}

impl KpiDefinition {
    /// Validate the stored parameters into a [`KpiModel`].
    ///
    /// # Errors
    ///
    /// Returns a [`KpiError`] naming the missing or invalid parameter.
    pub fn model(&self) -> Result<KpiModel, KpiError> {
        match self.model_type.as_str() {
            MODEL_GROWTH_OVER_TIME => {
                let growth_value = self.growth_value.ok_or(KpiError::MissingGrowthValue)?;
                let period_days = match self.growth_period_days {
                    Some(days) if days > 0 => days,
                    other => return Err(KpiError::InvalidGrowthPeriod { period_days: other }),
                };
                Ok(KpiModel::GrowthOverTime {
                    growth_value,
                    kind: self.growth_kind.parse()?,
                    period_days,
                })
            }
            MODEL_PERCENTAGE_OF_FIELD => Ok(KpiModel::PercentageOfField {
                related_field_id: self.related_field_id.ok_or(KpiError::MissingRelatedField)?,
                percentage_value: self
                    .percentage_value
                    .ok_or(KpiError::MissingPercentageValue)?,
            }),
            other => Err(KpiError::UnknownModelType {
                model_type: other.to_string(),
            }),
        }
    }

    /// Like [`KpiDefinition::model`], but also rejects parameters that belong
    /// to the other model type. New definitions go through this.
    ///
    /// # Errors
    ///
    /// Returns [`KpiError::UnusedParameter`] for a stray parameter, or any
    /// error from [`KpiDefinition::model`].
    pub fn strict_model(&self) -> Result<KpiModel, KpiError> {
        let model = self.model()?;
        let (model_type, foreign) = match model {
            KpiModel::GrowthOverTime { .. } => (
                MODEL_GROWTH_OVER_TIME,
                [
                    ("related_field_id", self.related_field_id.is_some()),
                    ("percentage_value", self.percentage_value.is_some()),
                ],
            ),
            KpiModel::PercentageOfField { .. } => (
                MODEL_PERCENTAGE_OF_FIELD,
                [
                    ("growth_value", self.growth_value.is_some()),
                    ("growth_period_days", self.growth_period_days.is_some()),
                ],
            ),
        };
        if let Some((parameter, _)) = foreign.into_iter().find(|(_, set)| *set) {
            return Err(KpiError::UnusedParameter {
                model_type,
                parameter,
            });
        }
        Ok(model)
    }
}

/// Parse a stored metric value. Surrounding whitespace and thousands
/// separators are ignored; anything else non-numeric yields `None`.
#[must_use]
pub fn parse_metric(raw: &str) -> Option<Decimal> {
    let cleaned: String = raw.trim().chars().filter(|c| *c != ',').collect();
    if cleaned.is_empty() {
        return None;
    }
    Decimal::from_str(&cleaned).ok()
}

/// Whole growth periods between `start_date` and `on_date`. Dates before the
/// start count as zero periods.
///
/// # Errors
///
/// Returns [`KpiError::InvalidGrowthPeriod`] when `period_days <= 0`.
pub fn periods_elapsed(
    start_date: NaiveDate,
    on_date: NaiveDate,
    period_days: i32,
) -> Result<i64, KpiError> {
    if period_days <= 0 {
        return Err(KpiError::InvalidGrowthPeriod {
            period_days: Some(period_days),
        });
    }
    let days = (on_date - start_date).num_days().max(0);
    Ok(days.div_euclid(i64::from(period_days)))
}

/// `baseline * (1 + rate/100)^periods`, failing instead of overflowing.
fn compound(baseline: Decimal, rate: Decimal, periods: i64) -> Result<Decimal, KpiError> {
    let factor = rate
        .checked_div(Decimal::ONE_HUNDRED)
        .and_then(|r| r.checked_add(Decimal::ONE))
        .ok_or(KpiError::Overflow)?;
    let mut value = baseline;
    for _ in 0..periods {
        value = value.checked_mul(factor).ok_or(KpiError::Overflow)?;
    }
    Ok(value)
}

/// Everything the evaluator needs about one report of one page.
#[derive(Debug, Clone, Copy)]
pub struct ReportInput<'a> {
    pub start_date: NaiveDate,
    pub report_date: NaiveDate,
    /// Raw field values of the report, keyed by field id.
    pub values: &'a HashMap<i64, String>,
    /// Initial values captured when the page was registered, keyed by field id.
    pub baselines: &'a HashMap<i64, String>,
}

/// Why a KPI field produced no score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum UnscoredReason {
    MissingValue,
    NonNumeric { value: String },
    RelatedValueUnavailable { related_field_id: i64 },
}

/// The expected value for a field, when it can be known.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Expectation {
    Known(Decimal),
    Unavailable(UnscoredReason),
}

/// Expected value of `field_id` under `model` on `input.report_date`.
///
/// # Errors
///
/// Returns a [`KpiError`] when the model cannot be evaluated at all
/// (missing baseline for percentage growth, arithmetic overflow).
pub fn expected_value(
    model: &KpiModel,
    field_id: i64,
    input: &ReportInput<'_>,
) -> Result<Expectation, KpiError> {
    match *model {
        KpiModel::GrowthOverTime {
            growth_value,
            kind,
            period_days,
        } => {
            let periods = periods_elapsed(input.start_date, input.report_date, period_days)?;
            let expected = match kind {
                GrowthKind::Absolute => growth_value
                    .checked_mul(Decimal::from(periods))
                    .ok_or(KpiError::Overflow)?,
                GrowthKind::Percentage => {
                    let baseline = input
                        .baselines
                        .get(&field_id)
                        .and_then(|raw| parse_metric(raw))
                        .ok_or(KpiError::MissingBaseline { field_id })?;
                    compound(baseline, growth_value, periods)?
                }
            };
            Ok(Expectation::Known(expected))
        }
        KpiModel::PercentageOfField {
            related_field_id,
            percentage_value,
        } => {
            let Some(related) = input
                .values
                .get(&related_field_id)
                .and_then(|raw| parse_metric(raw))
            else {
                return Ok(Expectation::Unavailable(
                    UnscoredReason::RelatedValueUnavailable { related_field_id },
                ));
            };
            let expected = related
                .checked_mul(percentage_value)
                .and_then(|v| v.checked_div(Decimal::ONE_HUNDRED))
                .ok_or(KpiError::Overflow)?;
            Ok(Expectation::Known(expected))
        }
    }
}

/// Score `actual` against `expected` on a 0–10 scale, one decimal place.
///
/// A zero expectation scores 10 for any non-negative actual value; a negative
/// expectation scores 0.
#[must_use]
pub fn score(actual: Decimal, expected: Decimal) -> Decimal {
    if expected.is_zero() {
        return if actual.is_sign_negative() && !actual.is_zero() {
            Decimal::ZERO
        } else {
            MAX_SCORE
        };
    }
    if expected.is_sign_negative() {
        return Decimal::ZERO;
    }
    let raw = MAX_SCORE
        .checked_mul(actual)
        .and_then(|v| v.checked_div(expected))
        .unwrap_or(if actual.is_sign_negative() {
            Decimal::ZERO
        } else {
            MAX_SCORE
        });
    raw.clamp(Decimal::ZERO, MAX_SCORE)
        .round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero)
}

/// A realized comparison for one field of one report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReportScore {
    pub kpi_id: i64,
    pub field_id: i64,
    pub expected_value: Decimal,
    pub actual_value: Decimal,
    pub score: Decimal,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum FieldOutcome {
    Scored(ReportScore),
    Unscored {
        kpi_id: i64,
        field_id: i64,
        #[serde(flatten)]
        reason: UnscoredReason,
    },
    Misconfigured {
        kpi_id: i64,
        field_id: i64,
        error: KpiError,
    },
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReportEvaluation {
    pub outcomes: Vec<FieldOutcome>,
}

impl ReportEvaluation {
    pub fn scores(&self) -> impl Iterator<Item = &ReportScore> {
        self.outcomes.iter().filter_map(|o| match o {
            FieldOutcome::Scored(s) => Some(s),
            _ => None,
        })
    }

    /// Mean of the scored fields, `None` when nothing was scored.
    #[must_use]
    pub fn average_score(&self) -> Option<Decimal> {
        average(self.scores().map(|s| s.score))
    }

    #[must_use]
    pub fn has_misconfigured(&self) -> bool {
        self.outcomes
            .iter()
            .any(|o| matches!(o, FieldOutcome::Misconfigured { .. }))
    }
}

/// Mean rounded to one decimal place.
pub fn average(scores: impl IntoIterator<Item = Decimal>) -> Option<Decimal> {
    let (sum, count) = scores
        .into_iter()
        .fold((Decimal::ZERO, 0_i64), |(sum, n), s| (sum + s, n + 1));
    if count == 0 {
        return None;
    }
    sum.checked_div(Decimal::from(count))
        .map(|avg| avg.round_dp_with_strategy(1, RoundingStrategy::MidpointAwayFromZero))
}

/// Evaluate every KPI of a page against one report.
#[must_use]
pub fn evaluate_report(kpis: &[KpiDefinition], input: &ReportInput<'_>) -> ReportEvaluation {
    let outcomes = kpis
        .iter()
        .map(|kpi| evaluate_field(kpi, input))
        .collect();
    ReportEvaluation { outcomes }
}

fn evaluate_field(kpi: &KpiDefinition, input: &ReportInput<'_>) -> FieldOutcome {
    let misconfigured = |error| FieldOutcome::Misconfigured {
        kpi_id: kpi.id,
        field_id: kpi.field_id,
        error,
    };
    let unscored = |reason| FieldOutcome::Unscored {
        kpi_id: kpi.id,
        field_id: kpi.field_id,
        reason,
    };

    let model = match kpi.model() {
        Ok(model) => model,
        Err(e) => return misconfigured(e),
    };

    let raw = match input.values.get(&kpi.field_id) {
        Some(raw) if !raw.trim().is_empty() => raw,
        _ => return unscored(UnscoredReason::MissingValue),
    };
    let Some(actual) = parse_metric(raw) else {
        return unscored(UnscoredReason::NonNumeric { value: raw.clone() });
    };

    match expected_value(&model, kpi.field_id, input) {
        Ok(Expectation::Known(expected)) => FieldOutcome::Scored(ReportScore {
            kpi_id: kpi.id,
            field_id: kpi.field_id,
            expected_value: expected.round_dp(2),
            actual_value: actual,
            score: score(actual, expected),
        }),
        Ok(Expectation::Unavailable(reason)) => unscored(reason),
        Err(e) => misconfigured(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("valid date")
    }

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).expect("valid decimal")
    }

    fn growth_kpi(value: &str, kind: &str, days: i32) -> KpiDefinition {
        KpiDefinition {
            id: 1,
            field_id: 10,
            model_type: MODEL_GROWTH_OVER_TIME.to_string(),
            related_field_id: None,
            growth_value: Some(dec(value)),
            growth_kind: kind.to_string(),
            growth_period_days: Some(days),
            percentage_value: None,
        }
    }

    fn percentage_kpi(related: Option<i64>, pct: &str) -> KpiDefinition {
        KpiDefinition {
            id: 2,
            field_id: 11,
            model_type: MODEL_PERCENTAGE_OF_FIELD.to_string(),
            related_field_id: related,
            growth_value: None,
            growth_kind: "absolute".to_string(),
            growth_period_days: None,
            percentage_value: Some(dec(pct)),
        }
    }

    fn values(pairs: &[(i64, &str)]) -> HashMap<i64, String> {
        pairs.iter().map(|(k, v)| (*k, (*v).to_string())).collect()
    }

    #[test]
    fn percentage_of_field_example() {
        let vals = values(&[(11, "30"), (12, "100")]);
        let baselines = HashMap::new();
        let input = ReportInput {
            start_date: day(2025, 1, 1),
            report_date: day(2025, 2, 1),
            values: &vals,
            baselines: &baselines,
        };
        let eval = evaluate_report(&[percentage_kpi(Some(12), "50")], &input);
        let scored: Vec<_> = eval.scores().collect();
        assert_eq!(scored.len(), 1);
        assert_eq!(scored[0].expected_value, dec("50"));
        assert_eq!(scored[0].score, dec("6.0"));
    }

    #[test]
    fn additive_growth_example() {
        let start = day(2025, 1, 1);
        let report = start + chrono::Duration::days(90);
        assert_eq!(periods_elapsed(start, report, 30).unwrap(), 3);

        let vals = values(&[(10, "300")]);
        let baselines = HashMap::new();
        let input = ReportInput {
            start_date: start,
            report_date: report,
            values: &vals,
            baselines: &baselines,
        };
        let eval = evaluate_report(&[growth_kpi("100", "absolute", 30)], &input);
        let score = eval.scores().next().expect("scored");
        assert_eq!(score.expected_value, dec("300"));
        assert_eq!(score.score, MAX_SCORE);
    }

    #[test]
    fn partial_periods_are_floored_and_early_dates_are_zero() {
        let start = day(2025, 1, 1);
        assert_eq!(periods_elapsed(start, day(2025, 1, 30), 30).unwrap(), 0);
        assert_eq!(periods_elapsed(start, day(2025, 1, 31), 30).unwrap(), 1);
        assert_eq!(periods_elapsed(start, day(2024, 12, 1), 30).unwrap(), 0);
        assert!(periods_elapsed(start, day(2025, 3, 1), 0).is_err());
    }

    #[test]
    fn percentage_growth_compounds_on_baseline() {
        let start = day(2025, 1, 1);
        let vals = values(&[(10, "1210")]);
        let baselines = values(&[(10, "1,000")]);
        let input = ReportInput {
            start_date: start,
            report_date: start + chrono::Duration::days(60),
            values: &vals,
            baselines: &baselines,
        };
        let eval = evaluate_report(&[growth_kpi("10", "percentage", 30)], &input);
        let score = eval.scores().next().expect("scored");
        assert_eq!(score.expected_value, dec("1210.00"));
        assert_eq!(score.score, dec("10.0"));
    }

    #[test]
    fn percentage_growth_without_baseline_is_misconfigured() {
        let vals = values(&[(10, "5")]);
        let baselines = HashMap::new();
        let input = ReportInput {
            start_date: day(2025, 1, 1),
            report_date: day(2025, 3, 1),
            values: &vals,
            baselines: &baselines,
        };
        let eval = evaluate_report(&[growth_kpi("10", "percentage", 30)], &input);
        assert_eq!(
            eval.outcomes,
            vec![FieldOutcome::Misconfigured {
                kpi_id: 1,
                field_id: 10,
                error: KpiError::MissingBaseline { field_id: 10 },
            }]
        );
    }

    #[test]
    fn score_is_bounded_for_positive_expectations() {
        let expected = dec("50");
        for actual in ["-100", "0", "1", "49.99", "50", "75", "1000000"] {
            let s = score(dec(actual), expected);
            assert!(s >= Decimal::ZERO && s <= MAX_SCORE, "{actual} -> {s}");
        }
        assert_eq!(score(dec("1000000"), expected), MAX_SCORE);
        assert_eq!(score(dec("-5"), expected), Decimal::ZERO);
    }

    #[test]
    fn zero_expectation_never_divides() {
        assert_eq!(score(dec("0"), Decimal::ZERO), MAX_SCORE);
        assert_eq!(score(dec("12"), Decimal::ZERO), MAX_SCORE);
        assert_eq!(score(dec("-1"), Decimal::ZERO), Decimal::ZERO);
        assert_eq!(score(dec("5"), dec("-3")), Decimal::ZERO);
    }

    #[test]
    fn score_rounds_to_one_decimal() {
        assert_eq!(score(dec("1"), dec("3")), dec("3.3"));
        assert_eq!(score(dec("2"), dec("3")), dec("6.7"));
    }

    #[test]
    fn missing_related_field_is_a_configuration_error() {
        assert_eq!(
            percentage_kpi(None, "50").model(),
            Err(KpiError::MissingRelatedField)
        );
        let mut kpi = growth_kpi("10", "absolute", 30);
        kpi.growth_period_days = None;
        assert_eq!(
            kpi.model(),
            Err(KpiError::InvalidGrowthPeriod { period_days: None })
        );
        kpi.growth_period_days = Some(30);
        kpi.growth_kind = "linear".to_string();
        assert!(matches!(
            kpi.model(),
            Err(KpiError::UnknownGrowthKind { .. })
        ));
    }

    #[test]
    fn non_numeric_values_are_unscored_not_fatal() {
        let vals = values(&[(10, "lots"), (11, "")]);
        let baselines = HashMap::new();
        let input = ReportInput {
            start_date: day(2025, 1, 1),
            report_date: day(2025, 3, 1),
            values: &vals,
            baselines: &baselines,
        };
        let eval = evaluate_report(
            &[growth_kpi("10", "absolute", 30), percentage_kpi(Some(12), "50")],
            &input,
        );
        assert_eq!(
            eval.outcomes,
            vec![
                FieldOutcome::Unscored {
                    kpi_id: 1,
                    field_id: 10,
                    reason: UnscoredReason::NonNumeric {
                        value: "lots".to_string()
                    },
                },
                FieldOutcome::Unscored {
                    kpi_id: 2,
                    field_id: 11,
                    reason: UnscoredReason::MissingValue,
                },
            ]
        );
        assert_eq!(eval.average_score(), None);
    }

    #[test]
    fn related_value_missing_leaves_field_unscored() {
        let vals = values(&[(11, "30")]);
        let baselines = HashMap::new();
        let input = ReportInput {
            start_date: day(2025, 1, 1),
            report_date: day(2025, 3, 1),
            values: &vals,
            baselines: &baselines,
        };
        let eval = evaluate_report(&[percentage_kpi(Some(12), "50")], &input);
        assert!(matches!(
            eval.outcomes[0],
            FieldOutcome::Unscored {
                reason: UnscoredReason::RelatedValueUnavailable {
                    related_field_id: 12
                },
                ..
            }
        ));
    }

    #[test]
    fn parse_metric_accepts_thousands_separators() {
        assert_eq!(parse_metric(" 12,500 "), Some(dec("12500")));
        assert_eq!(parse_metric("3.75"), Some(dec("3.75")));
        assert_eq!(parse_metric("n/a"), None);
        assert_eq!(parse_metric("   "), None);
    }

    #[test]
    fn average_of_scores() {
        assert_eq!(average([dec("6.0"), dec("10.0"), dec("5.0")]), Some(dec("7.0")));
        assert_eq!(average(Vec::new()), None);
    }

    #[test]
    fn outcome_serializes_with_status_tag() {
        let outcome = FieldOutcome::Unscored {
            kpi_id: 1,
            field_id: 2,
            reason: UnscoredReason::MissingValue,
        };
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "unscored");
        assert_eq!(json["reason"], "missing_value");
    }

    #[test]
    fn strict_model_rejects_other_models_parameters() {
        let mut growth = growth_kpi("100", "absolute", 30);
        assert!(growth.strict_model().is_ok());
        growth.percentage_value = Some(dec("10"));
        assert_eq!(
            growth.strict_model(),
            Err(KpiError::UnusedParameter {
                model_type: MODEL_GROWTH_OVER_TIME,
                parameter: "percentage_value",
            })
        );

        let mut pct = percentage_kpi(Some(12), "20");
        assert!(pct.strict_model().is_ok());
        pct.growth_period_days = Some(30);
        assert!(matches!(
            pct.strict_model(),
            Err(KpiError::UnusedParameter { parameter: "growth_period_days", .. })
        ));
        assert!(pct.model().is_ok());
    }
}
