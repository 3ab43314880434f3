use super::Error;
use crate::jvm::code::{
    CatchIdentity, ExceptionEntry, LabelGenerator, SynLabel, SynLabelGenerator,
};
use std::collections::HashMap;

/// Contiguous run of blocks (in the new order) covered by the same catch identity
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TryCatchChain {
    pub identity: CatchIdentity,

    /// First covered position
    pub first: usize,

    /// Last covered position (inclusive)
    pub last: usize,
}

impl TryCatchChain {
    pub fn len(&self) -> usize {
        self.last - self.first + 1
    }

    pub fn covers(&self, position: usize) -> bool {
        self.first <= position && position <= self.last
    }
}

/// Exception table rebuilt for a new block order
#[derive(Debug)]
pub struct RebuiltTable {
    pub entries: Vec<ExceptionEntry>,

    /// End sentinel (possibly freshly generated)
    pub end_label: Option<SynLabel>,

    /// How many times a chain had to be split to fix a priority inversion
    pub chains_split: usize,
}

/// Rebuild the exception table for blocks laid out in `order`
///
/// `coverage[i]` holds the catch identities that must apply to block `order[i]`, highest
/// priority first.
pub fn rebuild_exception_table(
    order: &[SynLabel],
    coverage: &[Vec<CatchIdentity>],
    end_label: Option<SynLabel>,
    label_generator: &mut SynLabelGenerator,
) -> Result<RebuiltTable, Error> {
    let mut chains = build_chains(coverage);
    let chains_split = split_inversions(&mut chains, coverage);
    let chains = resolve(chains, coverage)?;

    let mut end_label = end_label;
    let entries = chains
        .into_iter()
        .map(|chain| {
            let end = match order.get(chain.last + 1) {
                Some(next) => *next,
                None => *end_label.get_or_insert_with(|| label_generator.fresh_label()),
            };
            ExceptionEntry {
                start: order[chain.first],
                end,
                handler: chain.identity.handler,
                catch_type: chain.identity.catch_type,
            }
        })
        .collect();

    Ok(RebuiltTable {
        entries,
        end_label,
        chains_split,
    })
}

/// Collect maximal runs of positions covered by the same identity
///
/// Chains come out ordered by their first position, then by priority at that position.
pub fn build_chains(coverage: &[Vec<CatchIdentity>]) -> Vec<TryCatchChain> {
    let mut chains: Vec<TryCatchChain> = vec![];
    let mut open: HashMap<&CatchIdentity, usize> = HashMap::new();

    for (position, identities) in coverage.iter().enumerate() {
        for identity in identities {
            match open.get(identity) {
                Some(&idx) if chains[idx].last + 1 == position => chains[idx].last = position,
                _ => {
                    open.insert(identity, chains.len());
                    chains.push(TryCatchChain {
                        identity: identity.clone(),
                        first: position,
                        last: position,
                    });
                }
            }
        }
    }

    chains
}

/// Rank of an identity at a position (lower is higher priority)
fn rank(coverage: &[Vec<CatchIdentity>], position: usize, identity: &CatchIdentity) -> usize {
    coverage[position]
        .iter()
        .position(|other| other == identity)
        .unwrap_or(usize::MAX)
}

/// First position at which the relative priority of two chains flips
fn first_flip(
    a: &TryCatchChain,
    b: &TryCatchChain,
    coverage: &[Vec<CatchIdentity>],
) -> Option<usize> {
    let from = a.first.max(b.first);
    let until = a.last.min(b.last);
    if from >= until {
        return None;
    }

    let a_above = |position: usize| {
        rank(coverage, position, &a.identity) < rank(coverage, position, &b.identity)
    };
    let initial = a_above(from);
    (from + 1..=until).find(|position| a_above(*position) != initial)
}

/// Split chains until no two overlapping chains disagree on their relative priority
///
/// At the first flip, the longer of the two chains is cut in two (the later one on ties). Returns
/// the number of splits made.
pub fn split_inversions(chains: &mut Vec<TryCatchChain>, coverage: &[Vec<CatchIdentity>]) -> usize {
    let mut splits = 0;

    'fixpoint: loop {
        for i in 0..chains.len() {
            for j in i + 1..chains.len() {
                let flip = match first_flip(&chains[i], &chains[j], coverage) {
                    Some(flip) => flip,
                    None => continue,
                };

                let (a, b) = (&chains[i], &chains[j]);
                let to_split = if a.len() > b.len() {
                    i
                } else if b.len() > a.len() {
                    j
                } else if a.first > b.first {
                    i
                } else {
                    j
                };

                let chain = &mut chains[to_split];
                let tail = TryCatchChain {
                    identity: chain.identity.clone(),
                    first: flip,
                    last: chain.last,
                };
                chain.last = flip - 1;
                chains.insert(to_split + 1, tail);
                splits += 1;
                continue 'fixpoint;
            }
        }
        break;
    }

    splits
}

/// Order chains so that, at every position, the chains covering it appear in priority order
///
/// A chain can be emitted once, at each of its positions, every identity above it has already
/// been emitted.
pub fn resolve(
    chains: Vec<TryCatchChain>,
    coverage: &[Vec<CatchIdentity>],
) -> Result<Vec<TryCatchChain>, Error> {
    let mut remaining = chains;
    let mut emitted = Vec::with_capacity(remaining.len());

    while !remaining.is_empty() {
        let ready = remaining
            .iter()
            .position(|chain| is_ready(chain, &remaining, coverage));
        match ready {
            Some(idx) => emitted.push(remaining.remove(idx)),
            None => {
                return Err(Error::UnrepresentableExceptionTable {
                    remaining_chains: remaining.len(),
                })
            }
        }
    }

    Ok(emitted)
}

fn is_ready(
    chain: &TryCatchChain,
    remaining: &[TryCatchChain],
    coverage: &[Vec<CatchIdentity>],
) -> bool {
    (chain.first..=chain.last).all(|position| {
        coverage[position]
            .iter()
            .take_while(|identity| *identity != &chain.identity)
            .all(|above| {
                !remaining
                    .iter()
                    .any(|other| &other.identity == above && other.covers(position))
            })
    })
}
