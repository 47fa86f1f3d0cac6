//! Non-strict unit delay

use crate::actor::{Actor, ActorContext};
use crate::error::KernelError;
use crate::token::Token;

/// Pre: emits the input of the previous iteration
///
/// The output does not depend on the input within an iteration, so a `Pre`
/// breaks feedback loops. In the first iteration it emits the initial value,
/// or nothing if there is none.
#[derive(Debug, Clone)]
pub struct Pre {
    initial: Option<Token>,
    stored: Option<Token>,
}

impl Pre {
    pub fn new(initial: impl Into<Token>) -> Self {
        let initial = Some(initial.into());
        Self {
            stored: initial.clone(),
            initial,
        }
    }

    /// Delay whose first output is absent
    pub fn absent() -> Self {
        Self {
            initial: None,
            stored: None,
        }
    }

    pub fn stored(&self) -> Option<&Token> {
        self.stored.as_ref()
    }
}

impl Actor for Pre {
    fn num_inputs(&self) -> usize {
        1
    }

    fn num_outputs(&self) -> usize {
        1
    }

    fn initialize(&mut self, _ctx: &mut ActorContext<'_>) -> Result<(), KernelError> {
        self.stored = self.initial.clone();
        Ok(())
    }

    fn fire(&mut self, ctx: &mut ActorContext<'_>) -> Result<(), KernelError> {
        if !ctx.is_output_known(0) {
            ctx.send(0, self.stored.clone())?;
        }
        Ok(())
    }

    fn postfire(&mut self, ctx: &mut ActorContext<'_>) -> Result<bool, KernelError> {
        self.stored = ctx.get(0)?;
        Ok(true)
    }

    fn is_strict(&self) -> bool {
        false
    }

    fn output_depends_on_input(&self, _input: usize, _output: usize) -> bool {
        false
    }
}
