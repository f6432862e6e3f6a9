use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use crate::canon::{finite_number, CanonError};

/// A nested numeric array, the shape a trainer's per-layer weights take.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Tensor {
    Scalar(f64),
    Array(Vec<Tensor>),
}

impl Tensor {
    pub fn vector(values: &[f64]) -> Self {
        Tensor::Array(values.iter().copied().map(Tensor::Scalar).collect())
    }

    pub fn matrix(rows: &[&[f64]]) -> Self {
        Tensor::Array(rows.iter().map(|r| Tensor::vector(r)).collect())
    }

    pub fn len_flat(&self) -> usize {
        match self {
            Tensor::Scalar(_) => 1,
            Tensor::Array(items) => items.iter().map(Tensor::len_flat).sum(),
        }
    }

    pub fn values(&self) -> Vec<f64> {
        let mut out = Vec::with_capacity(self.len_flat());
        self.collect_into(&mut out);
        out
    }

    fn collect_into(&self, out: &mut Vec<f64>) {
        match self {
            Tensor::Scalar(v) => out.push(*v),
            Tensor::Array(items) => items.iter().for_each(|t| t.collect_into(out)),
        }
    }

    pub fn shift(&mut self, delta: f64) {
        match self {
            Tensor::Scalar(v) => *v += delta,
            Tensor::Array(items) => items.iter_mut().for_each(|t| t.shift(delta)),
        }
    }

    /// Shift the scalar at `index` in row-major flattened order. Returns false
    /// if the tensor has fewer than `index + 1` scalars.
    pub fn shift_at(&mut self, index: usize, delta: f64) -> bool {
        let mut remaining = index;
        self.shift_nth(&mut remaining, delta)
    }

    fn shift_nth(&mut self, remaining: &mut usize, delta: f64) -> bool {
        match self {
            Tensor::Scalar(v) => {
                if *remaining == 0 {
                    *v += delta;
                    true
                } else {
                    *remaining -= 1;
                    false
                }
            }
            Tensor::Array(items) => items.iter_mut().any(|t| t.shift_nth(remaining, delta)),
        }
    }

    pub fn to_value(&self) -> Result<Value, CanonError> {
        match self {
            Tensor::Scalar(v) => finite_number(*v),
            Tensor::Array(items) => items
                .iter()
                .map(Tensor::to_value)
                .collect::<Result<Vec<_>, _>>()
                .map(Value::Array),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ParameterSet {
    pub tensors: Vec<Tensor>,
}

impl ParameterSet {
    pub fn new(tensors: Vec<Tensor>) -> Self {
        Self { tensors }
    }

    pub fn scalar_count(&self) -> usize {
        self.tensors.iter().map(Tensor::len_flat).sum()
    }

    pub fn to_value(&self) -> Result<Value, CanonError> {
        self.tensors
            .iter()
            .map(Tensor::to_value)
            .collect::<Result<Vec<_>, _>>()
            .map(Value::Array)
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrainingMetadata {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub epochs: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loss: Option<f64>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl TrainingMetadata {
    pub fn new(epochs: u64, loss: f64) -> Self {
        Self {
            epochs: Some(epochs),
            loss: Some(loss),
            extra: BTreeMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: Value) -> Self {
        self.extra.insert(key.into(), value);
        self
    }

    pub fn to_value(&self) -> Result<Value, CanonError> {
        let mut map = serde_json::Map::new();
        for (k, v) in &self.extra {
            map.insert(k.clone(), v.clone());
        }
        if let Some(epochs) = self.epochs {
            map.insert("epochs".to_string(), Value::from(epochs));
        }
        if let Some(loss) = self.loss {
            map.insert("loss".to_string(), finite_number(loss)?);
        }
        Ok(Value::Object(map))
    }
}
