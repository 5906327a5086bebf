//! # Weighted Sampling
//!
//! Sequential weighted sampling without replacement. Weights depend on the
//! previously drawn track, so they are recomputed for every remaining
//! candidate after each draw.

use log::{debug, warn};
use rand::{Rng, RngCore};

use crate::algorithm::{member_weight, WeightSource};
use crate::error::EngineError;
use crate::merge::VirtualItem;
use crate::signals::SignalSnapshot;
use crate::track::Track;

/// Source of uniform randomness for the sampler.
///
/// Every [`rand::RngCore`] is one; tests can script their own.
pub trait RandomSource {
    /// Uniform value in `[0, 1)`.
    fn next_unit(&mut self) -> f64;

    /// Uniform index in `[0, n)`; `0` when `n` is zero.
    fn next_below(&mut self, n: usize) -> usize;
}

impl<R: RngCore> RandomSource for R {
    fn next_unit(&mut self) -> f64 {
        self.gen::<f64>()
    }

    fn next_below(&mut self, n: usize) -> usize {
        if n == 0 {
            0
        } else {
            self.gen_range(0..n)
        }
    }
}

/// Draws an index with probability proportional to its weight.
///
/// Returns `None` when the total weight is not a positive finite number.
/// Negative and non-finite entries count as zero.
///
/// # Examples
///
/// ```
/// use museq::sampler::pick_index;
/// use rand::{rngs::StdRng, SeedableRng};
///
/// let mut rng = StdRng::seed_from_u64(7);
/// assert_eq!(pick_index(&[0.0, 3.0, 0.0], &mut rng), Some(1));
/// assert_eq!(pick_index(&[0.0, 0.0], &mut rng), None);
/// ```
pub fn pick_index(weights: &[f64], rng: &mut dyn RandomSource) -> Option<usize> {
    let usable = |w: f64| if w.is_finite() && w > 0.0 { w } else { 0.0 };
    let total: f64 = weights.iter().copied().map(usable).sum();
    if !total.is_finite() || total <= 0.0 {
        return None;
    }

    let target = rng.next_unit() * total;
    let mut cumulative = 0.0;
    let mut last_positive = None;
    for (index, weight) in weights.iter().copied().map(usable).enumerate() {
        if weight == 0.0 {
            continue;
        }
        cumulative += weight;
        last_positive = Some(index);
        if target < cumulative {
            return Some(index);
        }
    }

    // Rounding can leave the target just past the last boundary.
    last_positive
}

/// Orders `items` by repeated weighted draws.
///
/// `previous` seeds the repetition avoidance for the first draw. A group
/// contributes the one member chosen when it is drawn. If the weights
/// collapse the remainder is shuffled uniformly.
pub fn weighted_shuffle(
    calc: &dyn WeightSource,
    items: Vec<VirtualItem>,
    previous: Option<&Track>,
    rng: &mut dyn RandomSource,
) -> Vec<Track> {
    let mut remaining = items;
    let mut order = Vec::with_capacity(remaining.len());
    let mut previous = previous.cloned();

    while !remaining.is_empty() {
        let weights: Vec<f64> = remaining
            .iter()
            .map(|item| calc.weight(item, previous.as_ref()))
            .collect();

        let Some(index) = pick_index(&weights, rng) else {
            warn!(
                "{}, shuffling {} remaining items uniformly",
                EngineError::DegenerateWeights,
                remaining.len()
            );
            fisher_yates(&mut remaining, rng);
            order.extend(remaining.iter().map(|item| select_member(item, calc.signals(), rng).clone()));
            break;
        };

        let item = remaining.remove(index);
        let track = select_member(&item, calc.signals(), rng).clone();
        previous = Some(track.clone());
        order.push(track);
    }

    debug!("Weighted shuffle produced {} tracks", order.len());
    order
}

/// One weighted draw from `pool`, for extending a queue.
///
/// Falls back to a uniform draw when the weights collapse. `None` only for
/// an empty pool.
pub fn draw_one(
    calc: &dyn WeightSource,
    pool: &[VirtualItem],
    previous: Option<&Track>,
    rng: &mut dyn RandomSource,
) -> Option<Track> {
    if pool.is_empty() {
        return None;
    }

    let weights: Vec<f64> = pool.iter().map(|item| calc.weight(item, previous)).collect();
    let index = pick_index(&weights, rng).unwrap_or_else(|| {
        warn!("{}, drawing uniformly", EngineError::DegenerateWeights);
        rng.next_below(pool.len())
    });

    Some(select_member(&pool[index], calc.signals(), rng).clone())
}

/// Picks the member of a group that plays; standalone items are returned
/// as is.
pub fn select_member<'i>(item: &'i VirtualItem, signals: &SignalSnapshot, rng: &mut dyn RandomSource) -> &'i Track {
    match item {
        VirtualItem::Standalone(track) => track,
        VirtualItem::Group { members, .. } => {
            let weights: Vec<f64> = members.iter().map(|t| member_weight(t, signals)).collect();
            let index = pick_index(&weights, rng).unwrap_or(0);
            &members[index]
        }
    }
}

/// Uniform in-place shuffle.
pub fn fisher_yates<T>(items: &mut [T], rng: &mut dyn RandomSource) {
    for i in (1..items.len()).rev() {
        let j = rng.next_below(i + 1);
        items.swap(i, j);
    }
}
