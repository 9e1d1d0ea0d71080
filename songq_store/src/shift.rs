//! Positional move over an ordered run of slots.
//!
//! Moving song 5 to position 3 (path `[5, 4, 3]`):
//!
//! ```text
//! [ 1 2 3 4 5 6 ]  hold 5
//! [ 1 2 x 3 4 6 ]  3 and 4 shift one slot away from the target
//! [ 1 2 5 3 4 6 ]  5 lands in the freed slot
//! ```
//!
//! Slots keep their ids, only the items stored in them change.

pub trait SlotStore {
    type Item;
    type Error;

    fn load(&mut self, slot: u64) -> Result<Self::Item, Self::Error>;
    fn store(&mut self, slot: u64, item: Self::Item) -> Result<(), Self::Error>;
}

/// Rotates items along `path` (source slot first, destination slot last): the
/// source item ends up in the destination and every other item steps one slot
/// back toward the source. Costs `path.len()` loads and stores.
pub fn rotate<S: SlotStore>(slots: &mut S, path: &[u64]) -> Result<(), S::Error> {
    let Some((&source, rest)) = path.split_first() else {
        return Ok(());
    };
    if rest.is_empty() {
        return Ok(());
    }
    let moving = slots.load(source)?;
    let mut vacated = source;
    for &slot in rest {
        let item = slots.load(slot)?;
        slots.store(vacated, item)?;
        vacated = slot;
    }
    slots.store(vacated, moving)
}

#[cfg(test)]
mod test {
    use std::{collections::BTreeMap, convert::Infallible};

    use super::{rotate, SlotStore};

    struct MapSlots(BTreeMap<u64, char>);

    impl SlotStore for MapSlots {
        type Item = char;
        type Error = Infallible;

        fn load(&mut self, slot: u64) -> Result<char, Infallible> {
            Ok(self.0[&slot])
        }

        fn store(&mut self, slot: u64, item: char) -> Result<(), Infallible> {
            self.0.insert(slot, item);
            Ok(())
        }
    }

    fn slots(items: &str) -> MapSlots {
        // sparse ids, as left behind by removals
        MapSlots(items.chars().enumerate().map(|(i, c)| (i as u64 * 10, c)).collect())
    }

    fn order(slots: &MapSlots) -> String {
        slots.0.values().collect()
    }

    #[test]
    fn should_move_item_toward_tail() {
        let mut s = slots("abcdef");
        rotate(&mut s, &[10, 20, 30, 40]).unwrap();
        assert_eq!(order(&s), "acdebf");
    }

    #[test]
    fn should_move_item_toward_head() {
        let mut s = slots("abcdef");
        rotate(&mut s, &[40, 30, 20, 10]).unwrap();
        assert_eq!(order(&s), "aebcdf");
    }

    #[test]
    fn should_move_last_item_to_head() {
        let mut s = slots("abcdef");
        rotate(&mut s, &[50, 40, 30, 20, 10, 0]).unwrap();
        assert_eq!(order(&s), "fabcde");
    }

    #[test]
    fn should_move_head_item_to_tail() {
        let mut s = slots("abcdef");
        rotate(&mut s, &[0, 10, 20, 30, 40, 50]).unwrap();
        assert_eq!(order(&s), "bcdefa");
    }

    #[test]
    fn should_swap_neighbours() {
        let mut s = slots("abc");
        rotate(&mut s, &[10, 20]).unwrap();
        assert_eq!(order(&s), "acb");
        rotate(&mut s, &[10, 0]).unwrap();
        assert_eq!(order(&s), "cab");
    }

    #[test]
    fn single_slot_or_empty_path_is_noop() {
        let mut s = slots("abc");
        rotate(&mut s, &[]).unwrap();
        rotate(&mut s, &[20]).unwrap();
        assert_eq!(order(&s), "abc");
    }
}
