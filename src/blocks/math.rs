//! Stateless arithmetic blocks
//!
//! All of these are strict: they fire once every input is known. An absent
//! input makes the output absent.

use std::fmt;

use crate::actor::{Actor, ActorContext};
use crate::error::KernelError;

/// Gain: y = k * u
#[derive(Debug, Clone)]
pub struct Scale {
    gain: f64,
}

impl Scale {
    pub fn new(gain: f64) -> Self {
        Self { gain }
    }

    pub fn gain(&self) -> f64 {
        self.gain
    }
}

impl Actor for Scale {
    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn fire(&mut self, ctx: &mut ActorContext<'_>) -> Result<(), KernelError> {
        match ctx.get_f64(0)? {
            Some(u) => ctx.put(0, self.gain * u),
            None => ctx.clear(0),
        }
    }
}

/// N-input weighted adder: y = sum(weights[i] * inputs[i])
///
/// Absent inputs are skipped; the output is absent only when every input is.
#[derive(Debug, Clone)]
pub struct Add {
    weights: Vec<f64>,
}

impl Add {
    /// Adder with all weights 1.0
    pub fn new(inputs: usize) -> Self {
        Self {
            weights: vec![1.0; inputs],
        }
    }

    pub fn with_weights(weights: Vec<f64>) -> Self {
        Self { weights }
    }

    /// Two-input subtractor: u0 - u1
    pub fn subtractor() -> Self {
        Self::with_weights(vec![1.0, -1.0])
    }

    pub fn weights(&self) -> &[f64] {
        &self.weights
    }
}

impl Actor for Add {
    fn num_inputs(&self) -> usize {
        self.weights.len()
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn fire(&mut self, ctx: &mut ActorContext<'_>) -> Result<(), KernelError> {
        let mut sum = None;
        for (port, weight) in self.weights.iter().enumerate() {
            if let Some(u) = ctx.get_f64(port)? {
                *sum.get_or_insert(0.0) += weight * u;
            }
        }
        match sum {
            Some(y) => ctx.put(0, y),
            None => ctx.clear(0),
        }
    }
}

type Func = Box<dyn Fn(&[f64]) -> f64 + Send + Sync>;

/// User-defined function of its inputs: y = f(u)
///
/// # Example
///
/// ```ignore
/// let increment = Function::new(1, |u| u[0] + 1.0);
/// ```
pub struct Function {
    arity: usize,
    func: Func,
    args: Vec<f64>,
}

impl Function {
    pub fn new<F>(arity: usize, func: F) -> Self
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        Self {
            arity,
            func: Box::new(func),
            args: Vec::with_capacity(arity),
        }
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function").field("arity", &self.arity).finish()
    }
}

impl Actor for Function {
    fn num_inputs(&self) -> usize {
        self.arity
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn fire(&mut self, ctx: &mut ActorContext<'_>) -> Result<(), KernelError> {
        self.args.clear();
        for port in 0..self.arity {
            match ctx.get_f64(port)? {
                Some(u) => self.args.push(u),
                None => return ctx.clear(0),
            }
        }
        let y = (self.func)(&self.args);
        ctx.put(0, y)
    }
}
