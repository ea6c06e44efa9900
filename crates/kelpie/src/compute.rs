use std::sync::Arc;

use kelpie_common::{Error, Key, Result};
use kelpie_lunasa::{Allocator, DataObject};

/// Built-in `pick` compute function: `arg` selects one entry from the
/// (already k2-ordered) mapping. `first`/`last` pick by that order directly;
/// `smallest`/`largest` pick by data length, ties broken by the same order.
/// Never called on an empty mapping — `Lkv::do_compute` short-circuits that
/// case before reaching here.
pub fn pick(
    _pattern: &Key,
    arg: &str,
    mapping: &[(Key, DataObject)],
    _allocator: &Arc<dyn Allocator>,
) -> Result<DataObject> {
    let chosen = match arg {
        "first" => mapping.first(),
        "last" => mapping.last(),
        "smallest" => first_extreme(mapping, false),
        "largest" => first_extreme(mapping, true),
        other => return Err(Error::invalid_input(format!("pick: unknown argument '{other}'"))),
    };
    match chosen {
        Some((_, ldo)) => Ok(ldo.clone()),
        None => Err(Error::invalid_input("pick: empty mapping")),
    }
}

/// The first (by appearance) element achieving the max (or min) data length.
/// `Iterator::max_by_key` returns the *last* of equal maxima, which would
/// break the tie-break-by-appearance rule, so this walks manually instead.
fn first_extreme(mapping: &[(Key, DataObject)], want_max: bool) -> Option<&(Key, DataObject)> {
    let mut best: Option<&(Key, DataObject)> = None;
    for item in mapping {
        let is_better = match best {
            None => true,
            Some(current) => {
                if want_max {
                    item.1.data_bytes() > current.1.data_bytes()
                } else {
                    item.1.data_bytes() < current.1.data_bytes()
                }
            }
        };
        if is_better {
            best = Some(item);
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use kelpie_lunasa::MallocAllocator;

    fn allocator() -> Arc<dyn Allocator> {
        Arc::new(MallocAllocator::new())
    }

    fn row() -> Vec<(Key, DataObject)> {
        let cols = [("a", "Stuff|a"), ("b1", "Stuff|b1"), ("b2", "Stuff|b2"), ("c", "Stuff|c")];
        cols.iter()
            .map(|(k2, content)| {
                let ldo = DataObject::allocate(allocator(), 0, content.len() as u32, 0).unwrap();
                ldo.write_data(content.as_bytes()).unwrap();
                (Key::new("Stuff", *k2), ldo)
            })
            .collect()
    }

    fn content(ldo: &DataObject) -> String {
        String::from_utf8(ldo.data()).unwrap()
    }

    #[test]
    fn pick_first_and_last_are_alphabetical() {
        let mapping = row();
        let a = allocator();
        assert_eq!(content(&pick(&Key::new("Stuff", "*"), "first", &mapping, &a).unwrap()), "Stuff|a");
        assert_eq!(content(&pick(&Key::new("Stuff", "*"), "last", &mapping, &a).unwrap()), "Stuff|c");
    }

    #[test]
    fn pick_largest_and_smallest_break_ties_by_appearance() {
        let mapping = row();
        let a = allocator();
        assert_eq!(content(&pick(&Key::new("Stuff", "*"), "largest", &mapping, &a).unwrap()), "Stuff|b1");
        assert_eq!(content(&pick(&Key::new("Stuff", "*"), "smallest", &mapping, &a).unwrap()), "Stuff|a");
    }

    #[test]
    fn pick_rejects_unknown_argument() {
        let mapping = row();
        let a = allocator();
        let err = pick(&Key::new("Stuff", "*"), "median", &mapping, &a).unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
