use alloc::vec::Vec;

/// Height of a [`LocalStack`] at some point in time,
/// to [`pop_to`][`LocalStack::pop_to`] later.
///
/// Besides the height, a reference remembers which entry was on top.
/// This way, popping to a reference is detected as a mistake
/// not only when the stack has since shrunk below the height,
/// but also when it shrunk and then grew back with different entries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StackRef
{
    height: usize,

    /// Stamp of the entry just below `height`, or zero at height zero.
    stamp: u64,
}

impl StackRef
{
    /// Number of entries on the stack when the reference was taken.
    pub fn height(self) -> usize
    {
        self.height
    }
}

struct Entry<D, P>
{
    descriptor: D,
    data: P,
    stamp: u64,
}

/// Shadow stack of roots held by native code.
///
/// Each entry is the address of a root and the descriptor of what is there.
/// Entries are pushed as locals are created and popped in bulk
/// when the scope that created them ends.
/// The collector iterates over the entries to find its roots.
pub struct LocalStack<D, P>
{
    entries: Vec<Entry<D, P>>,

    /// Stamp of the next entry to be pushed.
    /// Stamps are never reused, and zero is never a stamp.
    next_stamp: u64,
}

impl<D, P> LocalStack<D, P>
{
    /// Create an empty stack.
    pub const fn new() -> Self
    {
        Self{entries: Vec::new(), next_stamp: 1}
    }

    /// Reference to the current height of the stack.
    pub fn top(&self) -> StackRef
    {
        let height = self.entries.len();
        let stamp = self.entries.last().map_or(0, |entry| entry.stamp);
        StackRef{height, stamp}
    }

    /// Push a root onto the stack.
    pub fn push(&mut self, descriptor: D, data: P)
    {
        let stamp = self.next_stamp;
        self.next_stamp += 1;
        self.entries.push(Entry{descriptor, data, stamp});
    }

    /// Whether the stack can be popped to the given reference.
    ///
    /// This is the case if no entry at or below the reference
    /// has been popped since the reference was taken.
    pub fn is_valid(&self, top: StackRef) -> bool
    {
        match top.height.checked_sub(1) {
            None => true,
            Some(below) => self.entries.get(below)
                .map_or(false, |entry| entry.stamp == top.stamp),
        }
    }

    /// Pop every entry that was pushed after the reference was taken.
    ///
    /// # Panics
    ///
    /// If the stack was already popped past the reference.
    pub fn pop_to(&mut self, top: StackRef)
    {
        check!(
            top.height <= self.entries.len(),
            "popping to height {} of a stack of height {}",
            top.height, self.entries.len()
        );
        check!(self.is_valid(top), "popping to a stale stack reference");
        gc_trace!(from = self.entries.len(), to = top.height, "popping local roots");
        self.entries.truncate(top.height);
    }

    /// Pop every entry.
    ///
    /// Any outstanding references other than those at height zero
    /// become invalid.
    pub fn clear(&mut self)
    {
        self.entries.clear();
    }

    /// Number of entries on the stack.
    pub fn len(&self) -> usize
    {
        self.entries.len()
    }

    /// Whether the stack has no entries.
    pub fn is_empty(&self) -> bool
    {
        self.entries.is_empty()
    }

    /// Iterate over the descriptors and addresses of the roots,
    /// from the bottom of the stack to the top.
    pub fn iter(&self) -> impl ExactSizeIterator<Item=(&D, &P)> + '_
    {
        self.entries.iter().map(|entry| (&entry.descriptor, &entry.data))
    }
}

impl<D, P> Default for LocalStack<D, P>
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
    use std::vec::Vec;

    fn contents(stack: &LocalStack<char, u32>) -> Vec<(char, u32)>
    {
        stack.iter().map(|(&d, &p)| (d, p)).collect()
    }

    #[test]
    fn lifo()
    {
        let mut stack = LocalStack::new();
        stack.push('a', 1);
        let r1 = stack.top();
        stack.push('b', 2);
        stack.pop_to(r1);
        assert_eq!(contents(&stack), [('a', 1)]);
    }

    #[test]
    fn pop_to_bottom()
    {
        let mut stack = LocalStack::new();
        let bottom = stack.top();
        assert_eq!(bottom.height(), 0);
        stack.push('a', 1);
        stack.push('b', 2);
        assert_eq!(stack.len(), 2);
        stack.pop_to(bottom);
        assert!(stack.is_empty());
    }

    #[test]
    #[should_panic(expected = "popping to height 2 of a stack of height 1")]
    fn pop_above_height_is_fatal()
    {
        let mut stack = LocalStack::new();
        stack.push('a', 1);
        let r1 = stack.top();
        stack.push('b', 2);
        let r2 = stack.top();
        stack.pop_to(r1);
        stack.pop_to(r2);
    }

    #[test]
    #[should_panic(expected = "popping to a stale stack reference")]
    fn pop_to_regrown_height_is_fatal()
    {
        let mut stack = LocalStack::new();
        stack.push('a', 1);
        let r1 = stack.top();
        stack.push('b', 2);
        let r2 = stack.top();
        stack.pop_to(r1);
        stack.push('c', 3);
        // Same height as r2, but 'b' is gone.
        stack.pop_to(r2);
    }

    #[test]
    fn clear()
    {
        let mut stack = LocalStack::new();
        stack.push('a', 1);
        let r1 = stack.top();
        stack.clear();
        assert!(stack.is_empty());
        assert!(!stack.is_valid(r1));
        assert!(stack.is_valid(stack.top()));
    }

    #[test]
    fn nested_scopes()
    {
        let mut stack = LocalStack::new();
        let outer = stack.top();
        stack.push('a', 1);
        let inner = stack.top();
        stack.push('b', 2);
        stack.push('c', 3);
        stack.pop_to(inner);
        stack.push('d', 4);
        assert_eq!(contents(&stack), [('a', 1), ('d', 4)]);
        assert!(stack.is_valid(inner));
        stack.pop_to(outer);
        assert!(stack.is_empty());
    }

    proptest!
    {
        /// Interleaved scopes behave like a vector truncated to saved lengths.
        #[test]
        fn matches_model(scopes in vec(vec(0u32 .. 100, 0 .. 8), 1 .. 16))
        {
            let mut stack = LocalStack::new();
            let mut model = Vec::new();
            let mut saved = Vec::new();

            for (depth, pushes) in scopes.iter().enumerate() {
                saved.push((stack.top(), model.len()));
                for &p in pushes {
                    stack.push('x', p);
                    model.push(('x', p));
                }
                // Close every other scope right away.
                if depth % 2 == 1 {
                    let (top, len) = saved.pop().unwrap();
                    stack.pop_to(top);
                    model.truncate(len);
                }
                assert_eq!(contents(&stack), model);
            }

            while let Some((top, len)) = saved.pop() {
                assert!(stack.is_valid(top));
                stack.pop_to(top);
                model.truncate(len);
                assert_eq!(contents(&stack), model);
            }

            assert!(stack.is_empty());
        }
    }
}
