// Dense tensors used for initializers, feeds and fetches.

use serde::{Deserialize, Serialize};

use crate::error::GraphError;

// ── Element type ─────────────────────────────────────────────────────────────

/// Element type of a tensor or value-info record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ElemType {
    Float,
    Int64,
}

// ── Tensor ───────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TensorData {
    Float(Vec<f32>),
    Int64(Vec<i64>),
}

/// Row-major dense tensor. An empty `dims` denotes a scalar.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tensor {
    pub dims: Vec<i64>,
    pub data: TensorData,
}

impl Tensor {
    /// Build an `f32` tensor, checking that `dims` matches the payload length.
    pub fn from_f32(dims: Vec<i64>, values: Vec<f32>) -> Result<Self, GraphError> {
        check_len(&dims, values.len())?;
        Ok(Self {
            dims,
            data: TensorData::Float(values),
        })
    }

    pub fn from_i64(dims: Vec<i64>, values: Vec<i64>) -> Result<Self, GraphError> {
        check_len(&dims, values.len())?;
        Ok(Self {
            dims,
            data: TensorData::Int64(values),
        })
    }

    /// Scalar `i64`, the shape event ids are fed in.
    pub fn scalar_i64(v: i64) -> Self {
        Self {
            dims: Vec::new(),
            data: TensorData::Int64(vec![v]),
        }
    }

    pub fn elem_type(&self) -> ElemType {
        match self.data {
            TensorData::Float(_) => ElemType::Float,
            TensorData::Int64(_) => ElemType::Int64,
        }
    }

    pub fn numel(&self) -> usize {
        match &self.data {
            TensorData::Float(v) => v.len(),
            TensorData::Int64(v) => v.len(),
        }
    }

    pub fn as_f32(&self) -> Option<&[f32]> {
        match &self.data {
            TensorData::Float(v) => Some(v),
            TensorData::Int64(_) => None,
        }
    }

    /// The single value of a one-element `i64` tensor.
    pub fn as_scalar_i64(&self) -> Option<i64> {
        match &self.data {
            TensorData::Int64(v) if v.len() == 1 => Some(v[0]),
            _ => None,
        }
    }
}

fn check_len(dims: &[i64], len: usize) -> Result<(), GraphError> {
    if dims.iter().any(|d| *d < 0) {
        return Err(GraphError::Tensor(format!("negative dimension in {dims:?}")));
    }
    let expected: i64 = dims.iter().product();
    if expected as usize != len {
        return Err(GraphError::Tensor(format!(
            "dims {dims:?} describe {expected} elements, got {len}"
        )));
    }
    Ok(())
}

// ── Tests ─────────────────────────────────────────────────────────────────────
