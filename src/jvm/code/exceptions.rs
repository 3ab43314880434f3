use super::{BasicBlock, SynLabel};
use crate::jvm::{BinaryName, Error};
use crate::util::{Interval, SegmentTree};
use std::collections::HashMap;

/// Entry in a method's exception table
///
/// The protected range runs from the block labelled `start` up to (but excluding) the block
/// labelled `end`, in whatever the block order is. `end` may also be the method's end sentinel.
#[derive(Clone, Debug, Eq, PartialEq, Hash)]
pub struct ExceptionEntry {
    pub start: SynLabel,
    pub end: SynLabel,
    pub handler: SynLabel,

    /// Caught class, or `None` for a catch-all (`finally`)
    pub catch_type: Option<BinaryName>,
}

/// What an exception entry does once it is selected: jump to a handler if the type matches
///
/// Two entries with the same identity are interchangeable, which is why protected ranges can be
/// freely split and merged as long as priorities are respected.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct CatchIdentity {
    pub handler: SynLabel,
    pub catch_type: Option<BinaryName>,
}

impl ExceptionEntry {
    pub fn identity(&self) -> CatchIdentity {
        CatchIdentity {
            handler: self.handler,
            catch_type: self.catch_type.clone(),
        }
    }
}

/// For every block position, the catch identities that apply there, highest priority first
///
/// If the same identity is selected by more than one entry at a block, only the first one
/// matters (the later ones can never be selected).
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct HandlerCoverage {
    per_block: Vec<Vec<CatchIdentity>>,
}

/// Protected range of one entry, in block positions
#[derive(Clone, Debug)]
struct ProtectedRange {
    entry_index: usize,
    first: usize,
    last: usize,
}

impl Interval for ProtectedRange {
    type Endpoint = usize;

    fn from(&self) -> usize {
        self.first
    }

    fn until(&self) -> usize {
        self.last
    }
}

impl HandlerCoverage {
    /// Compute coverage of blocks laid out in the specified order
    pub fn new(
        blocks: &[BasicBlock],
        exceptions: &[ExceptionEntry],
        end_label: Option<SynLabel>,
    ) -> Result<HandlerCoverage, Error> {
        let positions: HashMap<SynLabel, usize> = blocks
            .iter()
            .enumerate()
            .map(|(pos, block)| (block.label, pos))
            .collect();
        let position_of = |lbl: SynLabel| -> Result<usize, Error> {
            match positions.get(&lbl) {
                Some(pos) => Ok(*pos),
                None if Some(lbl) == end_label => Ok(blocks.len()),
                None => Err(Error::UnknownLabel(lbl)),
            }
        };

        let mut ranges: Vec<ProtectedRange> = vec![];
        for (entry_index, entry) in exceptions.iter().enumerate() {
            let start = position_of(entry.start)?;
            let end = position_of(entry.end)?;
            if !positions.contains_key(&entry.handler) {
                return Err(Error::UnknownLabel(entry.handler));
            }
            if start >= end {
                return Err(Error::EmptyExceptionRange {
                    start: entry.start,
                    end: entry.end,
                });
            }
            ranges.push(ProtectedRange {
                entry_index,
                first: start,
                last: end - 1,
            });
        }

        let tree = SegmentTree::new(ranges.iter().collect(), 0..blocks.len());
        let per_block = (0..blocks.len())
            .map(|pos| {
                let mut entries: Vec<usize> = tree
                    .intervals_containing(&pos)
                    .into_iter()
                    .map(|range| range.entry_index)
                    .collect();
                entries.sort_unstable();

                let mut identities: Vec<CatchIdentity> = vec![];
                for entry_index in entries {
                    let identity = exceptions[entry_index].identity();
                    if !identities.contains(&identity) {
                        identities.push(identity);
                    }
                }
                identities
            })
            .collect();

        Ok(HandlerCoverage { per_block })
    }

    /// Identities covering the block at a position, highest priority first
    pub fn at(&self, position: usize) -> &[CatchIdentity] {
        self.per_block
            .get(position)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Number of block positions
    pub fn len(&self) -> usize {
        self.per_block.len()
    }

    pub fn is_empty(&self) -> bool {
        self.per_block.is_empty()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::jvm::code::{Instruction, LabelGenerator, SynLabelGenerator};

    fn returning_block(label: SynLabel) -> BasicBlock {
        BasicBlock::new(label, vec![Instruction::Return])
    }

    #[test]
    fn overlapping_entries_keep_priority() {
        let gen = &mut SynLabelGenerator::new(SynLabel::START);
        let a = gen.fresh_label();
        let b = gen.fresh_label();
        let c = gen.fresh_label();
        let h1 = gen.fresh_label();
        let h2 = gen.fresh_label();
        let end = gen.fresh_label();

        let blocks: Vec<BasicBlock> = [a, b, c, h1, h2].into_iter().map(returning_block).collect();
        let exceptions = vec![
            ExceptionEntry {
                start: a,
                end: c,
                handler: h1,
                catch_type: None,
            },
            ExceptionEntry {
                start: b,
                end: h1,
                handler: h2,
                catch_type: Some(BinaryName::EXCEPTION),
            },
            // shadowed by the first entry at `b`
            ExceptionEntry {
                start: b,
                end,
                handler: h1,
                catch_type: None,
            },
        ];

        let coverage = HandlerCoverage::new(&blocks, &exceptions, Some(end)).unwrap();
        let first = exceptions[0].identity();
        let second = exceptions[1].identity();
        assert_eq!(coverage.at(0), &[first.clone()]);
        assert_eq!(coverage.at(1), &[first.clone(), second.clone()]);
        assert_eq!(coverage.at(2), &[second, first.clone()]);
        assert_eq!(coverage.at(3), &[first.clone()]);
        assert_eq!(coverage.at(4), &[first]);
        assert!(coverage.at(5).is_empty());
    }

    #[test]
    fn empty_range_is_rejected() {
        let gen = &mut SynLabelGenerator::new(SynLabel::START);
        let a = gen.fresh_label();
        let b = gen.fresh_label();
        let blocks = vec![returning_block(a), returning_block(b)];
        let exceptions = vec![ExceptionEntry {
            start: b,
            end: a,
            handler: a,
            catch_type: None,
        }];
        assert!(matches!(
            HandlerCoverage::new(&blocks, &exceptions, None),
            Err(Error::EmptyExceptionRange { .. })
        ));
    }
}
