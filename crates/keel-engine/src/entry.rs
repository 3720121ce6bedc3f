use keel_types::{AfterImageBody, IntentionBody, Position, Token, TxOp};

/// An intention decorated with the position the log assigned it. The wire
/// body never embeds its position; the engine stamps it on here.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Intention {
    body: IntentionBody,
    position: Position,
}

impl Intention {
    pub fn new(body: IntentionBody, position: Position) -> Self {
        Self { body, position }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    pub fn snapshot(&self) -> Position {
        self.body.snapshot()
    }

    pub fn token(&self) -> Token {
        self.body.token()
    }

    pub fn ops(&self) -> &[TxOp] {
        self.body.ops()
    }

    pub fn body(&self) -> &IntentionBody {
        &self.body
    }
}

/// An after-image decorated with the position the log assigned it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AfterImage {
    body: AfterImageBody,
    position: Position,
}

impl AfterImage {
    pub fn new(body: AfterImageBody, position: Position) -> Self {
        Self { body, position }
    }

    pub fn position(&self) -> Position {
        self.position
    }

    /// The log position of the intention this image post-images.
    pub fn intention_ref(&self) -> Position {
        self.body.intention_ref()
    }
}
