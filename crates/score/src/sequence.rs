use crate::error::{ParseError, Result};
use crate::names::Identifier;
use crate::reference::{ElementKind, GrainElement, GrainElementRef};

/// A database sequence. `start_with` is applied only at creation; the
/// remaining attributes are kept in line by the updater through
/// `ALTER SEQUENCE`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SequenceDef {
    grain_name: Identifier,
    name: Identifier,
    start_with: i64,
    increment_by: i64,
    min_value: i64,
    max_value: i64,
    cycle: bool,
}

impl SequenceDef {
    pub fn new(grain_name: &str, name: &str) -> Result<Self> {
        Ok(Self {
            grain_name: Identifier::new(grain_name)?,
            name: Identifier::new(name)?,
            start_with: 1,
            increment_by: 1,
            min_value: 1,
            max_value: i64::MAX,
            cycle: false,
        })
    }

    pub fn with_start_with(mut self, start_with: i64) -> Self {
        self.start_with = start_with;
        self
    }

    pub fn with_increment_by(mut self, increment_by: i64) -> Self {
        self.increment_by = increment_by;
        self
    }

    pub fn with_min_value(mut self, min_value: i64) -> Self {
        self.min_value = min_value;
        self
    }

    pub fn with_max_value(mut self, max_value: i64) -> Self {
        self.max_value = max_value;
        self
    }

    pub fn with_cycle(mut self, cycle: bool) -> Self {
        self.cycle = cycle;
        self
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if self.increment_by == 0 {
            return Err(ParseError::IllegalState {
                detail: format!("sequence {} cannot have increment 0", self.name),
            });
        }
        if self.min_value > self.max_value {
            return Err(ParseError::IllegalState {
                detail: format!(
                    "sequence {}: min value {} exceeds max value {}",
                    self.name, self.min_value, self.max_value
                ),
            });
        }
        if self.start_with < self.min_value || self.start_with > self.max_value {
            return Err(ParseError::IllegalState {
                detail: format!(
                    "sequence {}: start value {} is outside [{}, {}]",
                    self.name, self.start_with, self.min_value, self.max_value
                ),
            });
        }
        Ok(())
    }

    pub fn start_with(&self) -> i64 {
        self.start_with
    }

    pub fn increment_by(&self) -> i64 {
        self.increment_by
    }

    pub fn min_value(&self) -> i64 {
        self.min_value
    }

    pub fn max_value(&self) -> i64 {
        self.max_value
    }

    pub fn cycle(&self) -> bool {
        self.cycle
    }
}

impl GrainElement for SequenceDef {
    fn grain_name(&self) -> &Identifier {
        &self.grain_name
    }

    fn name(&self) -> &Identifier {
        &self.name
    }

    fn kind(&self) -> ElementKind {
        ElementKind::Sequence
    }

    fn references(&self) -> Vec<GrainElementRef> {
        Vec::new()
    }
}
