//! Image selection over the per-render cap.

use rand::Rng;

/// Pick at most `cap` items.
///
/// Under the cap everything is kept. Over it, exactly `cap` items are drawn
/// uniformly without replacement; the survivors keep their input order.
pub fn sample_ordered<T: Clone, R: Rng + ?Sized>(items: &[T], cap: usize, rng: &mut R) -> Vec<T> {
    if items.len() <= cap {
        return items.to_vec();
    }
    let mut picked = rand::seq::index::sample(rng, items.len(), cap).into_vec();
    picked.sort_unstable();
    picked.into_iter().map(|i| items[i].clone()).collect()
}
