use chunkmap::hash::hash_str;
use chunkmap::{Arena, HashMap, HashSet};
use rayon::prelude::*;

// Arenas are not shared across threads; each worker builds its own.
#[test]
fn per_thread_arenas() {
    let totals: Vec<(usize, u64)> = (0..16u64)
        .into_par_iter()
        .map(|worker| {
            let arena = Arena::new();
            let mut map = HashMap::new_in(&arena);
            for i in 0..10_000u64 {
                map.insert(worker * 1_000_000 + i, i);
            }
            for i in (0..10_000u64).filter(|i| i % 3 == 0) {
                map.remove(worker * 1_000_000 + i);
            }
            (map.len(), map.values().sum())
        })
        .collect();

    let expected_len = (0..10_000u64).filter(|i| i % 3 != 0).count();
    let expected_sum: u64 = (0..10_000u64).filter(|i| i % 3 != 0).sum();
    for (len, sum) in totals {
        assert_eq!(len, expected_len);
        assert_eq!(sum, expected_sum);
    }
}

#[test]
fn parallel_word_sets() {
    let corpus = [
        "the quick brown fox",
        "jumps over the lazy dog",
        "the dog barks",
        "a quick brown dog",
    ];

    let sizes: Vec<usize> = corpus[..]
        .par_iter()
        .map(|line| {
            let arena = Arena::new();
            let mut words = HashSet::new_in(&arena);
            words.extend(line.split_whitespace().map(hash_str));
            words.len()
        })
        .collect();
    assert_eq!(sizes, [4, 5, 3, 4]);
}
