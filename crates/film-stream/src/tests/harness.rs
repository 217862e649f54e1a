//! Test handler for the consumption tests.

use crate::{HandlerError, MessageHandler};
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Mutex;

/// What the handler answers for one call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Verdict {
    Accept,
    Reject,
}

/// Handler that records every value it is given and answers from a script.
/// Once the script runs out it accepts everything.
#[derive(Default)]
pub struct ScriptedHandler {
    script: Mutex<VecDeque<Verdict>>,
    seen: Mutex<Vec<Vec<u8>>>,
}

impl ScriptedHandler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(verdicts: &[Verdict]) -> Self {
        Self {
            script: Mutex::new(verdicts.iter().copied().collect()),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Values handed to the handler, in call order.
    pub fn seen(&self) -> Vec<Vec<u8>> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl MessageHandler for ScriptedHandler {
    async fn handle(&self, _key: &[u8], value: &[u8]) -> Result<(), HandlerError> {
        self.seen.lock().unwrap().push(value.to_vec());
        let verdict = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or(Verdict::Accept);
        match verdict {
            Verdict::Accept => Ok(()),
            Verdict::Reject => Err("rejected by script".into()),
        }
    }
}
