use chunkmap::collections::TOMBSTONE;
use chunkmap::{Arena, HashMap, HashSet};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_set<'a>(arena: &'a Arena, rng: &mut StdRng, len: usize, range: u64) -> HashSet<'a> {
    let mut set = HashSet::new_in(arena);
    for _ in 0..len {
        set.insert(rng.gen_range(0..range));
    }
    set
}

#[test]
fn resize_preserves_membership() {
    let arena = Arena::new();
    let mut rng = StdRng::seed_from_u64(0xc0ffee);
    let mut map = HashMap::new_in(&arena);
    let mut model = std::collections::HashMap::new();

    for _ in 0..50_000 {
        let hash = rng.gen::<u64>() % 4096;
        match rng.gen_range(0..10) {
            0..=5 => {
                let value = rng.gen::<i64>();
                assert_eq!(map.insert(hash, value), model.insert(hash, value));
            }
            6..=8 => assert_eq!(map.remove(hash), model.remove(&hash)),
            _ => {
                let target = map.capacity() * 2;
                map.resize(target);
                assert_eq!(map.tombstones(), 0);
            }
        }

        assert!(map.capacity().is_power_of_two());
        assert!(map.len() + map.tombstones() <= map.capacity());
        assert_eq!(map.len(), model.len());
    }

    for (hash, value) in &model {
        assert_eq!(map.get(*hash), Some(value));
    }
    assert_eq!(map.iter().count(), model.len());
}

#[test]
fn set_algebra_laws() {
    let arena = Arena::new();
    let mut rng = StdRng::seed_from_u64(42);

    for _ in 0..200 {
        let len_a = rng.gen_range(0..64);
        let len_b = rng.gen_range(0..64);
        let a = random_set(&arena, &mut rng, len_a, 128);
        let b = random_set(&arena, &mut rng, len_b, 128);

        let union = a.union(&b);
        assert!(a.is_subset(&union));
        assert!(b.is_subset(&union));
        assert!(union.iter().all(|x| a.contains(x) || b.contains(x)));
        assert_eq!(union, b.union(&a));

        let both = a.intersection(&b);
        assert_eq!(both == a, a.is_subset(&b));
        assert_eq!(a.is_disjoint(&b), both.is_empty());
        assert!(both.iter().all(|x| a.contains(x) && b.contains(x)));

        let only_a = a.difference(&b);
        assert!(only_a.is_disjoint(&b));
        assert_eq!(only_a.len() + both.len(), a.len());

        assert_eq!(a, a);
        assert_eq!(a.union(&a), a);
        assert_eq!(a.intersection(&a), a);
    }
}

#[test]
fn sentinel_keys_round_trip() {
    let arena = Arena::new();
    let mut map = HashMap::new_in(&arena);
    let mut set = HashSet::new_in(&arena);

    for key in [0, TOMBSTONE] {
        map.insert(key, key);
        set.insert(key);
    }
    for key in 1..1000 {
        map.insert(key, key);
        set.insert(key);
    }

    for key in [0, TOMBSTONE] {
        assert_eq!(map.get(key), Some(&key));
        assert!(set.contains(key));
        assert!(map.keys().all(|k| k != 0 && k != TOMBSTONE));
        assert!(set.iter().all(|k| k != 0 && k != TOMBSTONE));
    }
}

#[test]
fn stress_one_million_keys() {
    const N: u64 = 1_000_000;

    let arena = Arena::new();
    let mut map = HashMap::new_in(&arena);
    for i in 0..N {
        map.insert(i, i * 2);
    }
    assert_eq!(map.len(), N as usize);
    for i in 0..N {
        assert_eq!(map.get(i), Some(&(i * 2)));
    }

    for i in (0..N).step_by(2) {
        assert_eq!(map.remove(i), Some(i * 2));
    }
    assert_eq!(map.len(), (N / 2) as usize);
    for i in 0..N {
        let expected = if i % 2 == 0 { None } else { Some(i * 2) };
        assert_eq!(map.get(i).copied(), expected);
    }
}

#[test]
fn containers_share_one_arena() {
    let arena = Arena::with_chunk_size(256);
    let mut map = HashMap::new_in(&arena);
    let mut set = HashSet::new_in(&arena);
    let mut list = chunkmap::Vec::new_in(&arena);

    for i in 0..500u64 {
        let scratch = arena.alloc_value(i);
        map.insert(i, *scratch);
        set.insert(i * 3);
        list.push(i as u32);
    }

    // One owned chunk per container plus the bump chunks.
    let owned = arena.chunks().iter().filter(|c| c.owned).count();
    assert_eq!(owned, 3);
    assert_eq!(map.len(), 500);
    assert_eq!(set.len(), 500);
    assert_eq!(list.len(), 500);

    drop(map);
    drop(set);
    drop(list);
    assert!(arena.chunks().iter().all(|c| !c.owned));
}
