// Elementwise f32 kernels for the reference session.

use stagecut_types::graph::Node;
use stagecut_types::tensor::Tensor;

use crate::error::{Result, RuntimeError};

pub fn supports(op_type: &str) -> bool {
    matches!(
        op_type,
        "Add" | "Sub" | "Mul" | "Div" | "Neg" | "Relu" | "Identity"
    )
}

/// Evaluate `node` over already-resolved inputs.
pub fn eval(node: &Node, inputs: &[Tensor]) -> Result<Vec<Tensor>> {
    let out = match node.op_type.as_str() {
        "Add" => binary(node, inputs, |a, b| a + b)?,
        "Sub" => binary(node, inputs, |a, b| a - b)?,
        "Mul" => binary(node, inputs, |a, b| a * b)?,
        "Div" => binary(node, inputs, |a, b| a / b)?,
        "Neg" => unary(node, inputs, |a| -a)?,
        "Relu" => unary(node, inputs, |a| a.max(0.0))?,
        "Identity" => arity(node, inputs, 1)?[0].clone(),
        _ => {
            return Err(RuntimeError::UnsupportedOp {
                domain: node.domain.clone(),
                op_type: node.op_type.clone(),
            })
        }
    };
    Ok(vec![out])
}

fn kernel_error(node: &Node, reason: impl Into<String>) -> RuntimeError {
    RuntimeError::Kernel {
        node: node.key().unwrap_or(node.op_type.as_str()).to_string(),
        reason: reason.into(),
    }
}

fn arity<'a>(node: &Node, inputs: &'a [Tensor], n: usize) -> Result<&'a [Tensor]> {
    if inputs.len() != n {
        return Err(kernel_error(node, format!("expected {n} inputs, got {}", inputs.len())));
    }
    Ok(inputs)
}

fn floats<'a>(node: &Node, t: &'a Tensor) -> Result<&'a [f32]> {
    t.as_f32().ok_or_else(|| kernel_error(node, "expected a float tensor"))
}

fn unary(node: &Node, inputs: &[Tensor], f: impl Fn(f32) -> f32) -> Result<Tensor> {
    let x = &arity(node, inputs, 1)?[0];
    let values = floats(node, x)?.iter().map(|v| f(*v)).collect();
    Ok(Tensor::from_f32(x.dims.clone(), values)?)
}

/// Same-shape or one-element broadcast.
fn binary(node: &Node, inputs: &[Tensor], f: impl Fn(f32, f32) -> f32) -> Result<Tensor> {
    let inputs = arity(node, inputs, 2)?;
    let (a, b) = (&inputs[0], &inputs[1]);
    let (va, vb) = (floats(node, a)?, floats(node, b)?);

    let (dims, values) = if a.dims == b.dims {
        (a.dims.clone(), va.iter().zip(vb).map(|(x, y)| f(*x, *y)).collect())
    } else if vb.len() == 1 {
        (a.dims.clone(), va.iter().map(|x| f(*x, vb[0])).collect())
    } else if va.len() == 1 {
        (b.dims.clone(), vb.iter().map(|y| f(va[0], *y)).collect())
    } else {
        return Err(kernel_error(
            node,
            format!("shapes {:?} and {:?} do not broadcast", a.dims, b.dims),
        ));
    };
    Ok(Tensor::from_f32(dims, values)?)
}

// ── Tests ─────────────────────────────────────────────────────────────────────
