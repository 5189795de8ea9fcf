use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, Result};

/// Candidate values for one grid axis: either an inclusive arithmetic
/// progression or an explicit list.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValues {
    Range { start: f64, stop: f64, step: f64 },
    List(Vec<f64>),
}

fn expand_values(spec: &ParamValues) -> Result<Vec<f64>> {
    match spec {
        ParamValues::Range { start, stop, step } => {
            if *step <= 0.0 {
                return Err(EngineError::Config(format!(
                    "grid step must be positive, got {step}"
                )));
            }
            let mut values = Vec::new();
            let mut value = *start;
            while value <= *stop {
                values.push(value);
                value += step;
            }
            Ok(values)
        }
        ParamValues::List(values) => Ok(values.clone()),
    }
}

/// Exhaustive search over the Cartesian product of the grid, in declared key
/// order with the last key varying fastest. Returns the maximum-scoring
/// combination; ties keep the first one enumerated.
pub fn grid_search<F>(
    grid: &[(String, ParamValues)],
    mut evaluate: F,
) -> Result<(HashMap<String, f64>, f64)>
where
    F: FnMut(&HashMap<String, f64>) -> f64,
{
    if grid.is_empty() {
        return Err(EngineError::Config("empty parameter grid".to_string()));
    }

    let axes: Vec<Vec<f64>> = grid
        .iter()
        .map(|(_, spec)| expand_values(spec))
        .collect::<Result<_>>()?;
    if axes.iter().any(Vec::is_empty) {
        return Err(EngineError::Config(
            "a grid axis expanded to no values".to_string(),
        ));
    }

    let mut indices = vec![0usize; axes.len()];
    let mut best: Option<(HashMap<String, f64>, f64)> = None;

    loop {
        let params: HashMap<String, f64> = grid
            .iter()
            .enumerate()
            .map(|(axis, (key, _))| (key.clone(), axes[axis][indices[axis]]))
            .collect();
        let score = evaluate(&params);
        if best.as_ref().is_none_or(|(_, b)| score > *b) {
            best = Some((params, score));
        }

        // Odometer increment, last axis fastest.
        let mut axis = axes.len();
        loop {
            if axis == 0 {
                return Ok(best.expect("at least one combination evaluated"));
            }
            axis -= 1;
            indices[axis] += 1;
            if indices[axis] < axes[axis].len() {
                break;
            }
            indices[axis] = 0;
        }
    }
}
