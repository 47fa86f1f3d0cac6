//! Level-crossing relations
//!
//! A relation compares a signed difference `f(u)` against zero. Crossings
//! are detected by comparing the relation's truth value at the end of an
//! attempted step with its value at the last committed point; the magnitude
//! of the difference measures how far the step overshot the level.

use std::fmt;

type Difference = Box<dyn Fn(&[f64]) -> f64 + Send + Sync>;

fn level_difference(inputs: &[f64], input: usize, level: f64) -> f64 {
    inputs.get(input).map_or(f64::NAN, |u| u - level)
}

/// Comparison applied to the difference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RelationKind {
    GreaterOrEqual,
    Greater,
    LessOrEqual,
    Less,
}

impl RelationKind {
    pub fn holds(self, difference: f64) -> bool {
        match self {
            RelationKind::GreaterOrEqual => difference >= 0.0,
            RelationKind::Greater => difference > 0.0,
            RelationKind::LessOrEqual => difference <= 0.0,
            RelationKind::Less => difference < 0.0,
        }
    }

    pub fn symbol(self) -> &'static str {
        match self {
            RelationKind::GreaterOrEqual => ">=",
            RelationKind::Greater => ">",
            RelationKind::LessOrEqual => "<=",
            RelationKind::Less => "<",
        }
    }
}

/// Truth value and difference of a relation at one point
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RelationSample {
    pub holds: bool,
    pub difference: f64,
}

/// `f(u) <kind> 0`
pub struct Relation {
    kind: RelationKind,
    difference: Difference,
}

impl Relation {
    pub fn new<F>(kind: RelationKind, difference: F) -> Self
    where
        F: Fn(&[f64]) -> f64 + Send + Sync + 'static,
    {
        Self {
            kind,
            difference: Box::new(difference),
        }
    }

    /// `u[input] >= level`
    pub fn at_least(input: usize, level: f64) -> Self {
        Self::new(RelationKind::GreaterOrEqual, move |u| level_difference(u, input, level))
    }

    /// `u[input] > level`
    pub fn above(input: usize, level: f64) -> Self {
        Self::new(RelationKind::Greater, move |u| level_difference(u, input, level))
    }

    /// `u[input] <= level`
    pub fn at_most(input: usize, level: f64) -> Self {
        Self::new(RelationKind::LessOrEqual, move |u| level_difference(u, input, level))
    }

    /// `u[input] < level`
    pub fn below(input: usize, level: f64) -> Self {
        Self::new(RelationKind::Less, move |u| level_difference(u, input, level))
    }

    pub fn kind(&self) -> RelationKind {
        self.kind
    }

    pub fn difference(&self, inputs: &[f64]) -> f64 {
        (self.difference)(inputs)
    }

    pub fn evaluate(&self, inputs: &[f64]) -> bool {
        self.sample(inputs).holds
    }

    pub fn sample(&self, inputs: &[f64]) -> RelationSample {
        let difference = self.difference(inputs);
        RelationSample {
            holds: self.kind.holds(difference),
            difference,
        }
    }
}

impl fmt::Debug for Relation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Relation(f(u) {} 0)", self.kind.symbol())
    }
}
