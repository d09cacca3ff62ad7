//! Multi-line input accumulation
//!
//! Fragments that do not form a complete command are held here and
//! prefixed to the next submission. Whether a line break is inserted
//! between the two is decided by the round that produced the fragment.

/// Text held back from an incomplete round
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PendingInput {
    /// Every fragment so far, already joined
    pub buffer: String,
    /// The next fragment must be joined with `"\n"`
    pub needs_newline: bool,
}

/// Whether the accumulator is holding text
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccumulatorState {
    /// Nothing held; the next submission is a candidate on its own
    Idle,
    /// An incomplete fragment is waiting to be continued
    Accumulating,
}

/// Joins incomplete fragments with the submissions that follow them
///
/// The accumulator never decides completeness itself: the session holds a
/// candidate after the interpreter reports it incomplete and clears it
/// after any other outcome.
#[derive(Debug, Clone, Default)]
pub struct InputAccumulator {
    pending: Option<PendingInput>,
}

impl InputAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Candidate text for this round: held text, joiner, then `text`
    pub fn submit(&self, text: &str) -> String {
        match &self.pending {
            None => text.to_string(),
            Some(pending) => {
                let joiner = if pending.needs_newline { "\n" } else { "" };
                let mut candidate =
                    String::with_capacity(pending.buffer.len() + joiner.len() + text.len());
                candidate.push_str(&pending.buffer);
                candidate.push_str(joiner);
                candidate.push_str(text);
                candidate
            }
        }
    }

    /// Keep an incomplete candidate for the next round
    pub fn hold(&mut self, candidate: String, needs_newline: bool) {
        self.pending = Some(PendingInput {
            buffer: candidate,
            needs_newline,
        });
    }

    /// Drop any held text
    pub fn clear(&mut self) {
        self.pending = None;
    }

    pub fn pending(&self) -> Option<&PendingInput> {
        self.pending.as_ref()
    }

    /// Current state, derived from whether text is held
    pub fn state(&self) -> AccumulatorState {
        if self.pending.is_some() {
            AccumulatorState::Accumulating
        } else {
            AccumulatorState::Idle
        }
    }

    pub fn is_accumulating(&self) -> bool {
        self.state() == AccumulatorState::Accumulating
    }
}
