//! Preference Regression (C12) — trains a per-user model mapping the 11
//! recognized preference variables to an acceptance score.

use chrono::Utc;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;

use super::linalg::Matrix;
use crate::models::preference::{PreferenceModel, PreferenceScenario, RegressionAlgorithm, PREFERENCE_VARIABLES};
use crate::utils::{CoreError, CoreResult};

/// Fixed so training on the same scenarios twice is byte-identical (§8).
pub const TRAINING_SEED: u64 = 0x4a4f_4246_4c4f_57;
const RIDGE_LAMBDA: f64 = 1.0;
const FOREST_TREE_COUNT: usize = 40;
const FOREST_MAX_DEPTH: usize = 2;
const N_VARS: usize = 11;
/// Design-matrix width: intercept + one standardized value per variable +
/// one missing-indicator per variable.
const N_FEATURES: usize = 1 + N_VARS + N_VARS;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RidgeParameters {
    /// beta[0] = intercept, beta[1..=11] = variable coefficients,
    /// beta[12..=22] = missing-indicator coefficients.
    pub beta: Vec<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum TreeNode {
    Leaf { value: f64 },
    Split { feature: usize, threshold: f64, left: Box<TreeNode>, right: Box<TreeNode> },
}

impl TreeNode {
    fn predict(&self, features: &[f64]) -> f64 {
        match self {
            TreeNode::Leaf { value } => *value,
            TreeNode::Split { feature, threshold, left, right } => {
                if features[*feature] <= *threshold { left.predict(features) } else { right.predict(features) }
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnsembleParameters {
    pub trees: Vec<TreeNode>,
}

impl EnsembleParameters {
    fn predict(&self, features: &[f64]) -> f64 {
        if self.trees.is_empty() {
            return 0.0;
        }
        self.trees.iter().map(|t| t.predict(features)).sum::<f64>() / self.trees.len() as f64
    }
}

/// Standardized, imputed feature rows plus the per-variable mean/std used to
/// build them.
struct Design {
    rows: Vec<[f64; N_FEATURES]>,
    means: [f64; N_VARS],
    stds: [f64; N_VARS],
}

fn build_design(scenarios: &[PreferenceScenario]) -> Design {
    let mut raw_by_var: [Vec<f64>; N_VARS] = core::array::from_fn(|_| Vec::new());

    for scenario in scenarios {
        for (idx, var) in PREFERENCE_VARIABLES.iter().enumerate() {
            if let Some(&value) = scenario.values.get(var) {
                let flipped = if var.is_inverse() { -value } else { value };
                raw_by_var[idx].push(flipped);
            }
        }
    }

    let mut means = [0.0; N_VARS];
    let mut stds = [1.0; N_VARS];
    for idx in 0..N_VARS {
        let values = &raw_by_var[idx];
        if values.is_empty() {
            continue;
        }
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        let variance = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
        means[idx] = mean;
        stds[idx] = if variance.sqrt() < 1e-9 { 1.0 } else { variance.sqrt() };
    }

    let rows = scenarios
        .iter()
        .map(|scenario| {
            let mut row = [0.0; N_FEATURES];
            row[0] = 1.0;
            for (idx, var) in PREFERENCE_VARIABLES.iter().enumerate() {
                match scenario.values.get(var) {
                    Some(&value) => {
                        let flipped = if var.is_inverse() { -value } else { value };
                        row[1 + idx] = (flipped - means[idx]) / stds[idx];
                    },
                    None => {
                        row[1 + idx] = 0.0;
                        row[1 + N_VARS + idx] = 1.0;
                    },
                }
            }
            row
        })
        .collect();

    Design { rows, means, stds }
}

fn fit_ridge(design: &Design, targets: &[f64]) -> RidgeParameters {
    let x = Matrix::from_rows(design.rows.iter().map(|r| r.to_vec()).collect());
    let y = Matrix::from_rows(targets.iter().map(|v| vec![*v]).collect());

    let xt = x.transpose();
    let mut gram = xt.mul(&x);
    gram.add_scaled_identity(RIDGE_LAMBDA);

    let beta = gram
        .invert()
        .expect("X^T X + lambda*I is positive definite for lambda > 0")
        .mul(&xt.mul(&y))
        .col(0);

    RidgeParameters { beta }
}

fn predict_ridge(params: &RidgeParameters, features: &[f64]) -> f64 {
    params.beta.iter().zip(features.iter()).map(|(b, f)| b * f).sum()
}

fn ridge_importances(params: &RidgeParameters) -> Vec<f64> {
    let coeffs: Vec<f64> = (0..N_VARS).map(|i| params.beta[1 + i].abs()).collect();
    normalize_importances(coeffs)
}

fn fit_ensemble(design: &Design, targets: &[f64], rng: &mut StdRng) -> EnsembleParameters {
    let m = design.rows.len();
    let mut trees = Vec::with_capacity(FOREST_TREE_COUNT);

    for _ in 0..FOREST_TREE_COUNT {
        let sample_idx: Vec<usize> = (0..m).map(|_| rng.gen_range(0..m)).collect();
        let sample_rows: Vec<&[f64; N_FEATURES]> = sample_idx.iter().map(|&i| &design.rows[i]).collect();
        let sample_targets: Vec<f64> = sample_idx.iter().map(|&i| targets[i]).collect();
        trees.push(grow_tree(&sample_rows, &sample_targets, FOREST_MAX_DEPTH));
    }

    EnsembleParameters { trees }
}

fn grow_tree(rows: &[&[f64; N_FEATURES]], targets: &[f64], depth_remaining: usize) -> TreeNode {
    let mean = targets.iter().sum::<f64>() / targets.len().max(1) as f64;
    if depth_remaining == 0 || rows.len() < 2 {
        return TreeNode::Leaf { value: mean };
    }

    let baseline_sse: f64 = targets.iter().map(|t| (t - mean).powi(2)).sum();
    let mut best: Option<(usize, f64, f64)> = None; // (feature, threshold, sse)

    for feature in 0..N_FEATURES {
        let mut values: Vec<f64> = rows.iter().map(|r| r[feature]).collect();
        values.sort_by(|a, b| a.partial_cmp(b).unwrap());
        values.dedup_by(|a, b| (*a - *b).abs() < 1e-12);
        if values.len() < 2 {
            continue;
        }

        for window in values.windows(2) {
            let threshold = (window[0] + window[1]) / 2.0;
            let (left_targets, right_targets): (Vec<f64>, Vec<f64>) =
                rows.iter().zip(targets.iter()).fold((Vec::new(), Vec::new()), |(mut l, mut r), (row, t)| {
                    if row[feature] <= threshold { l.push(*t) } else { r.push(*t) }
                    (l, r)
                });
            if left_targets.is_empty() || right_targets.is_empty() {
                continue;
            }

            let sse = sse_of(&left_targets) + sse_of(&right_targets);
            if best.map(|(_, _, best_sse)| sse < best_sse).unwrap_or(true) {
                best = Some((feature, threshold, sse));
            }
        }
    }

    match best {
        Some((feature, threshold, sse)) if sse < baseline_sse - 1e-9 => {
            let (left_rows, left_targets, right_rows, right_targets) = split(rows, targets, feature, threshold);
            TreeNode::Split {
                feature,
                threshold,
                left: Box::new(grow_tree(&left_rows, &left_targets, depth_remaining - 1)),
                right: Box::new(grow_tree(&right_rows, &right_targets, depth_remaining - 1)),
            }
        },
        _ => TreeNode::Leaf { value: mean },
    }
}

fn sse_of(values: &[f64]) -> f64 {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    values.iter().map(|v| (v - mean).powi(2)).sum()
}

#[allow(clippy::type_complexity)]
fn split<'a>(
    rows: &[&'a [f64; N_FEATURES]],
    targets: &[f64],
    feature: usize,
    threshold: f64,
) -> (Vec<&'a [f64; N_FEATURES]>, Vec<f64>, Vec<&'a [f64; N_FEATURES]>, Vec<f64>) {
    let mut left_rows = Vec::new();
    let mut left_targets = Vec::new();
    let mut right_rows = Vec::new();
    let mut right_targets = Vec::new();
    for (row, t) in rows.iter().zip(targets.iter()) {
        if row[feature] <= threshold {
            left_rows.push(*row);
            left_targets.push(*t);
        } else {
            right_rows.push(*row);
            right_targets.push(*t);
        }
    }
    (left_rows, left_targets, right_rows, right_targets)
}

fn ensemble_importances(params: &EnsembleParameters, design: &Design, targets: &[f64]) -> Vec<f64> {
    let predictions: Vec<f64> = design.rows.iter().map(|r| params.predict(r)).collect();
    let baseline_mse = mse(&predictions, targets);

    let mut raw = vec![0.0; N_VARS];
    for var_idx in 0..N_VARS {
        let mut rng = StdRng::seed_from_u64(TRAINING_SEED.wrapping_add(var_idx as u64 + 1));
        let mut column: Vec<f64> = design.rows.iter().map(|r| r[1 + var_idx]).collect();
        shuffle(&mut column, &mut rng);

        let shuffled_predictions: Vec<f64> = design
            .rows
            .iter()
            .enumerate()
            .map(|(i, row)| {
                let mut perturbed = *row;
                perturbed[1 + var_idx] = column[i];
                params.predict(&perturbed)
            })
            .collect();

        let shuffled_mse = mse(&shuffled_predictions, targets);
        raw[var_idx] = (shuffled_mse - baseline_mse).max(0.0);
    }

    normalize_importances(raw)
}

fn shuffle(values: &mut [f64], rng: &mut StdRng) {
    for i in (1..values.len()).rev() {
        let j = rng.gen_range(0..=i);
        values.swap(i, j);
    }
}

fn mse(predictions: &[f64], targets: &[f64]) -> f64 {
    predictions.iter().zip(targets.iter()).map(|(p, t)| (p - t).powi(2)).sum::<f64>() / predictions.len().max(1) as f64
}

fn normalize_importances(raw: Vec<f64>) -> Vec<f64> {
    let total: f64 = raw.iter().sum();
    if total < 1e-12 {
        return vec![1.0 / N_VARS as f64; N_VARS];
    }
    raw.into_iter().map(|v| v / total).collect()
}

fn formula_string(importances: &[f64]) -> String {
    let mut ranked: Vec<(usize, f64)> = importances.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());

    let terms: Vec<String> = ranked
        .into_iter()
        .filter(|(_, importance)| *importance > 0.01)
        .take(5)
        .map(|(idx, importance)| format!("{:.0}% × {}", importance * 100.0, PREFERENCE_VARIABLES[idx].display_name()))
        .collect();

    format!("acceptance = {}", terms.join(" + "))
}

pub struct PreferenceTrainer {
    pool: SqlitePool,
}

impl PreferenceTrainer {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// `save_scenarios(user_id, scenarios[1..5])` (§6).
    pub async fn save_scenarios(&self, user_id: &str, scenarios: &[PreferenceScenario], max_scenarios: usize) -> CoreResult<()> {
        if scenarios.is_empty() {
            return Err(CoreError::validation_error("at least one preference scenario is required"));
        }
        if scenarios.len() > max_scenarios {
            return Err(CoreError::validation_error(format!("at most {max_scenarios} scenarios are supported")));
        }

        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM preference_scenarios WHERE user_id = ?").bind(user_id).execute(&mut *tx).await?;

        for (ordinal, scenario) in scenarios.iter().enumerate() {
            let values: std::collections::HashMap<String, f64> =
                scenario.values.iter().map(|(var, v)| (var.as_str().to_string(), *v)).collect();
            sqlx::query("INSERT INTO preference_scenarios (user_id, ordinal, values, acceptance_score, created_at) VALUES (?,?,?,?,?)")
                .bind(user_id)
                .bind(ordinal as i32)
                .bind(sqlx::types::Json(values))
                .bind(scenario.acceptance_score)
                .bind(Utc::now())
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    /// `train(user_id) → PreferenceModel` (§4.12). Deterministic given the
    /// stored scenarios and `TRAINING_SEED`.
    pub async fn train(&self, user_id: &str) -> CoreResult<PreferenceModel> {
        let rows: Vec<(sqlx::types::Json<std::collections::HashMap<String, f64>>, f64)> =
            sqlx::query_as("SELECT values, acceptance_score FROM preference_scenarios WHERE user_id = ? ORDER BY ordinal")
                .bind(user_id)
                .fetch_all(&self.pool)
                .await?;

        if rows.is_empty() {
            return Err(CoreError::validation_error("cannot train without at least one saved scenario"));
        }

        let scenarios: Vec<PreferenceScenario> = rows
            .iter()
            .map(|(values, acceptance_score)| {
                let mapped = values
                    .0
                    .iter()
                    .filter_map(|(k, v)| PREFERENCE_VARIABLES.iter().find(|var| var.as_str() == k).map(|var| (*var, *v)))
                    .collect();
                PreferenceScenario { values: mapped, acceptance_score: *acceptance_score }
            })
            .collect();

        let targets: Vec<f64> = scenarios.iter().map(|s| s.acceptance_score).collect();
        let target_mean = targets.iter().sum::<f64>() / targets.len() as f64;
        let target_variance = targets.iter().map(|t| (t - target_mean).powi(2)).sum::<f64>() / targets.len() as f64;
        if target_variance < 1e-9 {
            return Err(CoreError::validation_error("all scenarios are degenerate: zero variance in acceptance_score"));
        }

        let design = build_design(&scenarios);
        let (algorithm, parameters, importances) = if scenarios.len() <= 2 {
            let ridge = fit_ridge(&design, &targets);
            let importances = ridge_importances(&ridge);
            (RegressionAlgorithm::Ridge, serde_json::to_value(&ridge)?, importances)
        } else {
            let mut rng = StdRng::seed_from_u64(TRAINING_SEED);
            let ensemble = fit_ensemble(&design, &targets, &mut rng);
            let importances = ensemble_importances(&ensemble, &design, &targets);
            (RegressionAlgorithm::Ensemble, serde_json::to_value(&ensemble)?, importances)
        };

        let formula = formula_string(&importances);
        let trained_at = Utc::now();

        sqlx::query("DELETE FROM preference_models WHERE user_id = ?").bind(user_id).execute(&self.pool).await?;
        sqlx::query(
            "INSERT INTO preference_models (user_id, algorithm, parameters, importances, feature_means, feature_stds, formula, scenario_count, trained_at)
             VALUES (?,?,?,?,?,?,?,?,?)",
        )
        .bind(user_id)
        .bind(algorithm.as_str())
        .bind(sqlx::types::Json(&parameters))
        .bind(sqlx::types::Json(&importances))
        .bind(sqlx::types::Json(design.means.to_vec()))
        .bind(sqlx::types::Json(design.stds.to_vec()))
        .bind(&formula)
        .bind(scenarios.len() as i32)
        .bind(trained_at)
        .execute(&self.pool)
        .await?;

        tracing::info!(user_id, algorithm = algorithm.as_str(), scenario_count = scenarios.len(), "trained preference model");

        Ok(PreferenceModel {
            user_id: user_id.to_string(),
            algorithm: algorithm.as_str().to_string(),
            parameters: sqlx::types::Json(parameters),
            importances: sqlx::types::Json(importances),
            feature_means: sqlx::types::Json(design.means.to_vec()),
            feature_stds: sqlx::types::Json(design.stds.to_vec()),
            formula,
            scenario_count: scenarios.len() as i32,
            trained_at,
        })
    }
}

/// Evaluates a persisted model against a standardized-plus-indicator feature
/// vector built the same way training built its design rows. Used by the
/// job scorer (C13) so prediction logic lives in one place.
pub fn predict(model: &PreferenceModel, features: &[f64; N_FEATURES]) -> f64 {
    match model.algorithm.as_str() {
        "ridge" => {
            let params: RidgeParameters = serde_json::from_value(model.parameters.0.clone()).unwrap_or(RidgeParameters { beta: vec![0.0; N_FEATURES] });
            predict_ridge(&params, features)
        },
        _ => {
            let params: EnsembleParameters = serde_json::from_value(model.parameters.0.clone()).unwrap_or(EnsembleParameters { trees: vec![] });
            params.predict(features)
        },
    }
}

/// Standardizes a single raw feature map using an already-trained model's
/// stored means/stds, producing the same `[intercept, values.., indicators..]`
/// layout `predict` expects.
pub fn standardize_for_scoring(
    model: &PreferenceModel,
    raw_values: &std::collections::HashMap<crate::models::preference::PreferenceVariable, f64>,
) -> [f64; N_FEATURES] {
    let mut features = [0.0; N_FEATURES];
    features[0] = 1.0;
    for (idx, var) in PREFERENCE_VARIABLES.iter().enumerate() {
        match raw_values.get(var) {
            Some(&value) => {
                let flipped = if var.is_inverse() { -value } else { value };
                let mean = model.feature_means.0.get(idx).copied().unwrap_or(0.0);
                let std = model.feature_stds.0.get(idx).copied().unwrap_or(1.0);
                features[1 + idx] = (flipped - mean) / std;
            },
            None => {
                features[1 + N_VARS + idx] = 1.0;
            },
        }
    }
    features
}

pub const FEATURE_COUNT: usize = N_FEATURES;

#[derive(Debug, Clone)]
pub struct ScoredFeature {
    pub index: usize,
    pub contribution: f64,
}

/// Per-variable signed contribution `coefficient_or_marginal × standardized_value`,
/// used by the scorer to build the top-3 explanation (§4.13). For the
/// ensemble, the contribution is approximated by zeroing the variable's
/// standardized value and indicator and measuring the prediction delta.
pub fn feature_contributions(model: &PreferenceModel, features: &[f64; N_FEATURES]) -> Vec<ScoredFeature> {
    let baseline = predict(model, features);
    (0..N_VARS)
        .map(|idx| {
            let mut without = *features;
            without[1 + idx] = 0.0;
            without[1 + N_VARS + idx] = 0.0;
            let delta = baseline - predict(model, &without);
            ScoredFeature { index: idx, contribution: delta }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::preference::PreferenceVariable;

    async fn test_pool() -> SqlitePool {
        let pool = SqlitePool::connect(":memory:").await.unwrap();
        sqlx::query(
            "CREATE TABLE preference_scenarios (
                id INTEGER PRIMARY KEY AUTOINCREMENT, user_id TEXT NOT NULL, ordinal INTEGER NOT NULL,
                values TEXT NOT NULL, acceptance_score REAL NOT NULL, created_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        sqlx::query(
            "CREATE TABLE preference_models (
                user_id TEXT PRIMARY KEY, algorithm TEXT NOT NULL, parameters TEXT NOT NULL,
                importances TEXT NOT NULL, feature_means TEXT NOT NULL, feature_stds TEXT NOT NULL,
                formula TEXT NOT NULL, scenario_count INTEGER NOT NULL, trained_at TEXT NOT NULL
            )",
        )
        .execute(&pool)
        .await
        .unwrap();
        pool
    }

    fn scenario(salary: f64, commute: f64, score: f64) -> PreferenceScenario {
        let mut values = std::collections::HashMap::new();
        values.insert(PreferenceVariable::Salary, salary);
        values.insert(PreferenceVariable::CommuteTimeMinutes, commute);
        PreferenceScenario { values, acceptance_score: score }
    }

    #[tokio::test]
    async fn training_twice_on_same_scenarios_is_deterministic() {
        let pool = test_pool().await;
        let trainer = PreferenceTrainer::new(pool);
        let scenarios = vec![scenario(90_000.0, 20.0, 90.0), scenario(60_000.0, 45.0, 50.0), scenario(45_000.0, 60.0, 20.0)];

        trainer.save_scenarios("user-1", &scenarios, 5).await.unwrap();
        let first = trainer.train("user-1").await.unwrap();

        trainer.save_scenarios("user-1", &scenarios, 5).await.unwrap();
        let second = trainer.train("user-1").await.unwrap();

        assert_eq!(first.importances.0, second.importances.0);
        assert_eq!(first.formula, second.formula);
    }

    #[tokio::test]
    async fn salary_and_commute_dominate_importance_when_they_drive_the_scenarios() {
        let pool = test_pool().await;
        let trainer = PreferenceTrainer::new(pool);
        let scenarios = vec![scenario(150_000.0, 10.0, 90.0), scenario(80_000.0, 40.0, 50.0), scenario(40_000.0, 70.0, 20.0)];
        trainer.save_scenarios("user-1", &scenarios, 5).await.unwrap();
        let model = trainer.train("user-1").await.unwrap();

        let salary_idx = PreferenceVariable::Salary.index();
        let commute_idx = PreferenceVariable::CommuteTimeMinutes.index();
        let mut ranked: Vec<(usize, f64)> = model.importances.0.iter().copied().enumerate().collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
        let top_two: Vec<usize> = ranked.iter().take(2).map(|(idx, _)| *idx).collect();

        assert!(top_two.contains(&salary_idx));
        assert!(top_two.contains(&commute_idx));
    }

    #[tokio::test]
    async fn degenerate_scores_are_rejected() {
        let pool = test_pool().await;
        let trainer = PreferenceTrainer::new(pool);
        let scenarios = vec![scenario(90_000.0, 20.0, 50.0), scenario(60_000.0, 45.0, 50.0)];
        trainer.save_scenarios("user-1", &scenarios, 5).await.unwrap();
        assert!(trainer.train("user-1").await.is_err());
    }
}
