//! Memory-bounded enumeration of every perturbation of one instance over a
//! fixed combination of features.
//!
//! For each selected feature the candidates are its threshold values followed
//! by its original value, so a combination of features `f_1..f_k` yields
//! `prod(|T_i| + 1)` perturbed instances. They are copied into a caller-owned
//! [`Batch`] and handed to a visitor every time the batch reaches
//! `batch_size` rows; whatever is left at the end is flushed once by the
//! top-level call.
//!
//! The base instance is mutated in place and shared by all recursive
//! branches. Each level restores its feature through a drop guard, so the
//! instance is bit-identical to its input on every exit path, including an
//! early `Break` from the visitor.

use std::ops::ControlFlow;

use super::thresholds::ThresholdSet;
use crate::data::Batch;

/// Restores `instance[pos]` to its original value when dropped.
struct RestoreOnDrop<'a> {
    instance: &'a mut [f64],
    pos: usize,
    original: f64,
}

impl<'a> RestoreOnDrop<'a> {
    fn new(instance: &'a mut [f64], pos: usize) -> Self {
        let original = instance[pos];
        RestoreOnDrop { instance, pos, original }
    }

    #[inline(always)]
    fn set(&mut self, value: f64) {
        self.instance[self.pos] = value;
    }

    #[inline(always)]
    fn restore(&mut self) {
        self.instance[self.pos] = self.original;
    }

    #[inline(always)]
    fn instance(&mut self) -> &mut [f64] {
        &mut *self.instance
    }
}

impl Drop for RestoreOnDrop<'_> {
    fn drop(&mut self) {
        self.restore();
    }
}

/// Enumerates every assignment of `choices` applied on top of `instance`.
///
/// `emit` is called with each full batch and once more with the final
/// partial batch, if any. The buffer is cleared after every call, so each
/// perturbed instance is delivered exactly once. Returning
/// `ControlFlow::Break` from `emit` stops the enumeration immediately and
/// propagates the break value.
///
/// # Arguments
/// * `instance` - The base instance; restored before returning.
/// * `choices` - `(feature, thresholds)` pairs, one per attacked feature.
/// * `buffer` - Accumulation buffer with the instance's width. Left empty on return.
/// * `batch_size` - Maximum number of rows per emitted batch (at least 1).
/// * `emit` - Visitor receiving each batch.
///
/// # Panics
/// Panics if `buffer` and `instance` have different widths.
pub fn enumerate_perturbations<B, F>(
    instance: &mut [f64],
    choices: &[(usize, &ThresholdSet)],
    buffer: &mut Batch,
    batch_size: usize,
    emit: &mut F,
) -> ControlFlow<B>
where
    F: FnMut(&Batch) -> ControlFlow<B>,
{
    assert_eq!(instance.len(), buffer.n_features(), "buffer width must match the instance");
    let batch_size = batch_size.max(1);
    buffer.clear();

    if let ControlFlow::Break(b) = enumerate_rec(instance, choices, buffer, batch_size, emit) {
        buffer.clear();
        return ControlFlow::Break(b);
    }

    // Top level only: flush the remainder.
    if !buffer.is_empty() {
        let flow = emit(buffer);
        buffer.clear();
        return flow;
    }
    ControlFlow::Continue(())
}

fn enumerate_rec<B, F>(
    instance: &mut [f64],
    choices: &[(usize, &ThresholdSet)],
    buffer: &mut Batch,
    batch_size: usize,
    emit: &mut F,
) -> ControlFlow<B>
where
    F: FnMut(&Batch) -> ControlFlow<B>,
{
    let Some((&(pos, thresholds), rest)) = choices.split_first() else {
        buffer.push_row_unchecked(instance);
        if buffer.n_rows() >= batch_size {
            let flow = emit(buffer);
            buffer.clear();
            return flow;
        }
        return ControlFlow::Continue(());
    };

    let mut guard = RestoreOnDrop::new(instance, pos);
    for &value in thresholds.values() {
        guard.set(value);
        if let ControlFlow::Break(b) = enumerate_rec(guard.instance(), rest, buffer, batch_size, emit) {
            return ControlFlow::Break(b);
        }
    }

    // Feature left unperturbed.
    guard.restore();
    enumerate_rec(guard.instance(), rest, buffer, batch_size, emit)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::attack::thresholds::extract_thresholds;
    use crate::data::FeatureMatrix;
    use crate::forest::fixtures::two_stump_forest;
    use proptest::prelude::*;
    use std::collections::HashSet;

    /// Runs the enumerator to completion and returns every emitted batch.
    fn drain(instance: &mut [f64], choices: &[(usize, &ThresholdSet)], batch_size: usize) -> Vec<Vec<Vec<f64>>> {
        let mut buffer = Batch::with_capacity(instance.len(), batch_size).unwrap();
        let mut batches = Vec::new();
        let flow: ControlFlow<()> = enumerate_perturbations(instance, choices, &mut buffer, batch_size, &mut |b: &Batch| {
            batches.push(b.rows().map(<[f64]>::to_vec).collect());
            ControlFlow::Continue(())
        });
        assert!(flow.is_continue());
        batches
    }

    fn set_of(values: &[f64]) -> ThresholdSet {
        let mut values = values.to_vec();
        values.sort_unstable_by(f64::total_cmp);
        values.dedup();
        ThresholdSet::from_sorted(values)
    }

    #[test]
    fn single_feature_tries_thresholds_then_original() {
        let forest = two_stump_forest();
        let data = FeatureMatrix::from_rows(vec![vec![0.2, 3.0]]).unwrap();
        let sets = extract_thresholds(&forest, &data).unwrap();

        let mut x = vec![0.2, 3.0];
        let batches = drain(&mut x, &[(0, sets.get(0))], 16);
        assert_eq!(batches.len(), 1);
        assert_eq!(
            batches[0],
            vec![vec![0.5, 3.0], vec![1.5, 3.0], vec![4.0, 3.0], vec![0.2, 3.0]]
        );
        assert_eq!(x, vec![0.2, 3.0]);
    }

    #[test]
    fn exact_multiple_of_batch_size_emits_no_empty_tail() {
        let set = set_of(&[1.0]);
        let mut x = vec![0.0, 0.0];
        let batches = drain(&mut x, &[(0, &set), (1, &set)], 2);
        assert_eq!(batches.iter().map(Vec::len).collect::<Vec<_>>(), vec![2, 2]);
    }

    #[test]
    fn empty_combination_yields_the_instance_itself() {
        let mut x = vec![7.0, 8.0];
        let batches = drain(&mut x, &[], 10);
        assert_eq!(batches, vec![vec![vec![7.0, 8.0]]]);
    }

    #[test]
    fn break_stops_enumeration_and_restores_instance() {
        let set = set_of(&[10.0, 20.0, 30.0]);
        let mut x = vec![1.0, 2.0, 3.0];
        let mut buffer = Batch::with_capacity(3, 1).unwrap();
        let mut calls = 0;
        let flow = enumerate_perturbations(&mut x, &[(0, &set), (2, &set)], &mut buffer, 1, &mut |b: &Batch| {
            calls += 1;
            if calls == 3 { ControlFlow::Break(b.row(0).to_vec()) } else { ControlFlow::Continue(()) }
        });
        assert_eq!(flow, ControlFlow::Break(vec![10.0, 2.0, 30.0]));
        assert_eq!(calls, 3);
        assert_eq!(x, vec![1.0, 2.0, 3.0]);
        assert!(buffer.is_empty());
    }

    fn arb_case() -> impl Strategy<Value = (Vec<f64>, Vec<(usize, Vec<f64>)>, usize)> {
        (2usize..6).prop_flat_map(|n_features| {
            (
                prop::collection::vec(-10.0f64..10.0, n_features),
                prop::sample::subsequence((0..n_features).collect::<Vec<_>>(), 0..=n_features.min(3)),
                prop::collection::vec(prop::collection::vec(20.0f64..30.0, 0..4), 3),
                1usize..9,
            )
                .prop_map(|(x, feats, pools, batch_size)| {
                    let choices = feats.into_iter().zip(pools).collect();
                    (x, choices, batch_size)
                })
        })
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_batches_cover_the_cartesian_product((x, raw_choices, batch_size) in arb_case()) {
            let sets: Vec<(usize, ThresholdSet)> = raw_choices.iter().map(|(f, v)| (*f, set_of(v))).collect();
            let choices: Vec<(usize, &ThresholdSet)> = sets.iter().map(|(f, s)| (*f, s)).collect();

            let mut working = x.clone();
            let batches = drain(&mut working, &choices, batch_size);

            // Round trip: the base instance is restored bit for bit.
            prop_assert_eq!(
                working.iter().map(|v| v.to_bits()).collect::<Vec<_>>(),
                x.iter().map(|v| v.to_bits()).collect::<Vec<_>>()
            );

            // Every batch but the last is full; none is empty.
            if let Some((last, full)) = batches.split_last() {
                prop_assert!(!last.is_empty() && last.len() <= batch_size);
                prop_assert!(full.iter().all(|b| b.len() == batch_size));
            }

            let produced: Vec<Vec<f64>> = batches.into_iter().flatten().collect();
            let expected: usize = choices.iter().map(|(_, s)| s.len() + 1).product();
            prop_assert_eq!(produced.len(), expected);

            // Thresholds live in [20, 30) and originals in [-10, 10), so every
            // choice tuple gives a distinct row.
            let distinct: HashSet<Vec<u64>> = produced
                .iter()
                .map(|row| row.iter().map(|v| v.to_bits()).collect())
                .collect();
            prop_assert_eq!(distinct.len(), expected);

            let attacked: HashSet<usize> = choices.iter().map(|(f, _)| *f).collect();
            for row in &produced {
                for (col, &value) in row.iter().enumerate() {
                    if attacked.contains(&col) {
                        let set = choices.iter().find(|(f, _)| *f == col).map(|(_, s)| *s).unwrap();
                        prop_assert!(value == x[col] || set.contains(value));
                    } else {
                        prop_assert_eq!(value, x[col]);
                    }
                }
            }
        }
    }
}
