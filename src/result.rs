use std::collections::BTreeMap;

use serde::Serialize;

/// One time-stamped snapshot of the recorded variables.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Sample {
    pub time: f64,
    pub values: BTreeMap<String, f64>,
}

impl Sample {
    pub fn new(time: f64) -> Self {
        Self {
            time,
            values: BTreeMap::new(),
        }
    }

    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }
}

/// The samples of one completed run, in increasing time order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    variables: Vec<String>,
    samples: Vec<Sample>,
}

impl SimulationResult {
    pub fn new(variables: Vec<String>, samples: Vec<Sample>) -> Self {
        Self { variables, samples }
    }

    pub fn variables(&self) -> &[String] {
        self.variables.as_ref()
    }

    pub fn samples(&self) -> &[Sample] {
        self.samples.as_ref()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn times(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.time).collect()
    }

    /// (time, value) pairs of one variable; samples missing it are skipped.
    pub fn series(&self, name: &str) -> Vec<(f64, f64)> {
        self.samples
            .iter()
            .filter_map(|s| s.get(name).map(|v| (s.time, v)))
            .collect()
    }

    pub fn first_time(&self) -> Option<f64> {
        self.samples.first().map(|s| s.time)
    }

    pub fn last_time(&self) -> Option<f64> {
        self.samples.last().map(|s| s.time)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn series_and_times() {
        let mut s0 = Sample::new(0.0);
        s0.values.insert("x".to_string(), 1.0);
        let mut s1 = Sample::new(1.0);
        s1.values.insert("x".to_string(), 2.0);
        s1.values.insert("y".to_string(), 3.0);
        let result = SimulationResult::new(vec!["x".to_string(), "y".to_string()], vec![s0, s1]);
        assert_eq!(result.len(), 2);
        assert_eq!(result.times(), vec![0.0, 1.0]);
        assert_eq!(result.series("x"), vec![(0.0, 1.0), (1.0, 2.0)]);
        assert_eq!(result.series("y"), vec![(1.0, 3.0)]);
        assert_eq!(result.first_time(), Some(0.0));
        assert_eq!(result.last_time(), Some(1.0));
    }
}
