use alloc::collections::BTreeMap;
use alloc::collections::btree_map::Entry;

struct Record<D>
{
    descriptor: D,
    refcount: usize,
}

/// Roots held by native code beyond any scope.
///
/// Each root is identified by its address
/// and is recorded with the descriptor of what is there.
/// Adding the same root more than once is counted,
/// and the root stays in the pool until it is removed as often.
pub struct PersistentPool<D, P>
{
    records: BTreeMap<P, Record<D>>,
}

impl<D, P> PersistentPool<D, P>
    where D: PartialEq, P: Ord
{
    /// Create an empty pool.
    pub const fn new() -> Self
    {
        Self{records: BTreeMap::new()}
    }

    /// Add a root, or count it once more if it is already present.
    ///
    /// # Panics
    ///
    /// If the root is already present with a different descriptor.
    pub fn add(&mut self, data: P, descriptor: D)
    {
        match self.records.entry(data) {
            Entry::Vacant(entry) => {
                gc_trace!("adding persistent root");
                entry.insert(Record{descriptor, refcount: 1});
            },
            Entry::Occupied(mut entry) => {
                let record = entry.get_mut();
                check!(
                    record.descriptor == descriptor,
                    "persistent root added again with a different descriptor"
                );
                record.refcount += 1;
                gc_trace!(refcount = record.refcount, "counting persistent root");
            },
        }
    }

    /// Count a root once less, and remove it when it is no longer counted.
    ///
    /// # Panics
    ///
    /// If the root is not present.
    pub fn remove(&mut self, data: &P)
    {
        let refcount = self.records.get_mut(data).map(|record| {
            record.refcount -= 1;
            record.refcount
        });

        check!(refcount.is_some(), "removing a persistent root that is not present");

        if refcount == Some(0) {
            gc_trace!("removing persistent root");
            self.records.remove(data);
        }
    }

    /// How often the root was added but not removed.
    pub fn refcount(&self, data: &P) -> usize
    {
        self.records.get(data).map_or(0, |record| record.refcount)
    }

    /// Descriptor the root was added with, if it is present.
    pub fn descriptor(&self, data: &P) -> Option<&D>
    {
        self.records.get(data).map(|record| &record.descriptor)
    }

    /// Number of distinct roots.
    pub fn len(&self) -> usize
    {
        self.records.len()
    }

    /// Whether there are no roots.
    pub fn is_empty(&self) -> bool
    {
        self.records.is_empty()
    }

    /// Iterate over the descriptors and addresses of the roots,
    /// each root once, regardless of how often it was added.
    pub fn iter(&self) -> impl ExactSizeIterator<Item=(&D, &P)> + '_
    {
        self.records.iter().map(|(data, record)| (&record.descriptor, data))
    }
}

impl<D, P> Default for PersistentPool<D, P>
    where D: PartialEq, P: Ord
{
    fn default() -> Self
    {
        Self::new()
    }
}

#[cfg(test)]
mod tests
{
    use super::*;

    use proptest::collection::vec;
    use proptest::proptest;
    use std::collections::HashMap;
    use std::vec::Vec;

    #[test]
    fn refcounting()
    {
        let mut pool = PersistentPool::new();
        pool.add(1u32, 'd');
        pool.add(1u32, 'd');
        assert_eq!(pool.len(), 1);
        assert_eq!(pool.refcount(&1), 2);

        pool.remove(&1);
        assert!(!pool.is_empty());
        assert_eq!(pool.iter().collect::<Vec<_>>(), [(&'d', &1)]);

        pool.remove(&1);
        assert!(pool.is_empty());
        assert_eq!(pool.refcount(&1), 0);
        assert_eq!(pool.descriptor(&1), None);
    }

    #[test]
    #[should_panic(expected = "removing a persistent root that is not present")]
    fn remove_too_often_is_fatal()
    {
        let mut pool = PersistentPool::new();
        pool.add(1u32, 'd');
        pool.remove(&1);
        pool.remove(&1);
    }

    #[test]
    #[should_panic(expected = "persistent root added again with a different descriptor")]
    fn conflicting_descriptor_is_fatal()
    {
        let mut pool = PersistentPool::new();
        pool.add(1u32, 'd');
        pool.add(1u32, 'e');
    }

    #[test]
    fn distinct_roots()
    {
        let mut pool = PersistentPool::new();
        pool.add(2u32, 'b');
        pool.add(1u32, 'a');
        pool.add(2u32, 'b');
        let mut roots: Vec<_> = pool.iter().map(|(&d, &p)| (d, p)).collect();
        roots.sort();
        assert_eq!(roots, [('a', 1), ('b', 2)]);
        assert_eq!(pool.descriptor(&2), Some(&'b'));
    }

    proptest!
    {
        /// The pool agrees with a map of reference counts.
        #[test]
        fn matches_model(adds in vec(0u8 .. 8, 0 .. 64), removes in vec(0u8 .. 8, 0 .. 64))
        {
            let mut pool = PersistentPool::new();
            let mut model = HashMap::<u8, usize>::new();

            for &root in &adds {
                pool.add(root, u32::from(root) * 10);
                *model.entry(root).or_default() += 1;
            }

            for root in &removes {
                if let Some(count) = model.get_mut(root) {
                    pool.remove(root);
                    *count -= 1;
                    if *count == 0 {
                        model.remove(root);
                    }
                }
            }

            assert_eq!(pool.len(), model.len());
            for (root, &count) in &model {
                assert_eq!(pool.refcount(root), count);
            }
            for (&descriptor, &root) in pool.iter() {
                assert_eq!(descriptor, u32::from(root) * 10);
            }
        }
    }
}
