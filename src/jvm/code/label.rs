use std::fmt;

/// Opaque label
///
/// Labels mark block boundaries and jump targets. Two labels are the same position only if they
/// are equal. Labels read from a listing keep their number, and the only way to produce a label
/// that was not part of the input is to ask the method's [`SynLabelGenerator`] for a fresh one.
#[derive(Copy, Clone, Hash, Eq, PartialEq, Ord, PartialOrd)]
pub struct SynLabel(usize);

impl SynLabel {
    /// Label for the first block in the method
    pub const START: SynLabel = SynLabel(0);

    /// Label with a given number (eg. `L7` in a listing)
    pub const fn from_index(index: usize) -> SynLabel {
        SynLabel(index)
    }

    /// Get the next fresh label
    pub fn next(&self) -> SynLabel {
        SynLabel(self.0 + 1)
    }

    /// Numeric identity of the label (used only for printing)
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Generates new labels
pub trait LabelGenerator<Label> {
    /// Generate a fresh label
    fn fresh_label(&mut self) -> Label;
}

/// Label generator for [`SynLabel`]
///
/// Cloning does not split the generator source - the cloned generator will produce the same
/// sequence of labels as the original.
#[derive(Clone, Debug)]
pub struct SynLabelGenerator(SynLabel);

impl SynLabelGenerator {
    pub fn new(start: SynLabel) -> SynLabelGenerator {
        SynLabelGenerator(start)
    }

    /// Generator whose labels are guaranteed not to clash with any of the given labels
    pub fn after<'a>(labels: impl IntoIterator<Item = &'a SynLabel>) -> SynLabelGenerator {
        let start = labels
            .into_iter()
            .map(SynLabel::next)
            .max()
            .unwrap_or(SynLabel::START);
        SynLabelGenerator(start)
    }
}

impl LabelGenerator<SynLabel> for SynLabelGenerator {
    fn fresh_label(&mut self) -> SynLabel {
        let to_return = self.0;
        self.0 = self.0.next();
        to_return
    }
}

impl fmt::Debug for SynLabel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("l{}", self.0))
    }
}

impl fmt::Display for SynLabel {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.write_fmt(format_args!("L{}", self.0))
    }
}
