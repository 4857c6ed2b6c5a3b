use std::ops::Range;

use crate::{DispatchError, DispatchId, Epoch, Handle};

/// Window of a circular list of handles.
///
/// The window starts at `head` and covers `span` consecutive entries of a ring
/// of `size` entries, wrapping around to the start of the ring.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct HandleSpan {
    size: usize,
    span: usize,
    head: usize,
}

impl HandleSpan {
    /// # Panics
    ///
    /// If `span` is larger than `size`, or `head` is outside of the ring.
    pub fn new(size: usize, span: usize, head: usize) -> Self {
        assert!(span <= size, "span {} is larger than the ring size {}", span, size);
        assert!(
            head < size || (head == 0 && size == 0),
            "head {} is outside of the ring size {}",
            head,
            size
        );
        Self { size, span, head }
    }

    /// Window covering a whole slice, without wrapping.
    pub fn whole(len: usize) -> Self {
        Self {
            size: len,
            span: len,
            head: 0,
        }
    }

    /// Number of entries in the ring.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of entries inside the window.
    pub fn span(&self) -> usize {
        self.span
    }

    /// First entry of the window.
    pub fn head(&self) -> usize {
        self.head
    }

    /// Splits the window into the part before the wrap and the part after it.
    ///
    /// The second range is empty if the window does not wrap.
    pub fn ranges(&self) -> (Range<usize>, Range<usize>) {
        let end = self.size.min(self.head + self.span);
        let rest = self.span - (end - self.head);
        (self.head..end, 0..rest)
    }

    /// Iterates the handles inside the window, in ring order.
    pub fn iter<'a>(&self, handles: &'a [Handle]) -> impl Iterator<Item = Handle> + 'a {
        assert!(
            handles.len() >= self.size,
            "ring of {} handles is shorter than its size {}",
            handles.len(),
            self.size
        );
        let (head, tail) = self.ranges();
        handles[head].iter().chain(handles[tail].iter()).copied()
    }
}

/// Producer of a handle: the dispatch and the epoch of its slot at the time
/// the handle was registered.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Binding {
    pub id: DispatchId,
    pub epoch: Epoch,
}

/// Maps handles to the dispatch producing them.
#[derive(Debug)]
pub(crate) struct HandleIndex {
    bindings: Vec<Option<Binding>>,
}

impl HandleIndex {
    pub fn new(count: usize) -> Self {
        Self {
            bindings: vec![None; count],
        }
    }

    fn entry(&mut self, handle: Handle) -> Result<&mut Option<Binding>, DispatchError> {
        self.bindings
            .get_mut(handle as usize)
            .ok_or(DispatchError::InvalidHandle(handle))
    }

    pub fn get(&self, handle: Handle) -> Result<Option<Binding>, DispatchError> {
        self.bindings
            .get(handle as usize)
            .copied()
            .ok_or(DispatchError::InvalidHandle(handle))
    }

    /// Binds `handle` to `binding`, returning the previous binding.
    pub fn bind(&mut self, handle: Handle, binding: Binding) -> Result<Option<Binding>, DispatchError> {
        Ok(self.entry(handle)?.replace(binding))
    }

    pub fn unbind(&mut self, handle: Handle) -> Result<(), DispatchError> {
        *self.entry(handle)? = None;
        Ok(())
    }

    #[cfg(test)]
    fn bound_count(&self) -> usize {
        self.bindings.iter().filter(|b| b.is_some()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn span_without_wrap() {
        let span = HandleSpan::new(8, 3, 2);
        assert_eq!(span.ranges(), (2..5, 0..0));
    }

    #[test]
    fn span_ending_exactly_at_the_ring_end() {
        let span = HandleSpan::new(8, 3, 5);
        assert_eq!(span.ranges(), (5..8, 0..0));
    }

    #[test]
    fn span_wrapping_near_the_end() {
        let handles = [10, 11, 12, 13, 14, 15, 16, 17];
        let span = HandleSpan::new(8, 4, 6);
        assert_eq!(span.ranges(), (6..8, 0..2));
        assert_eq!(span.iter(&handles).collect::<Vec<_>>(), [16, 17, 10, 11]);
    }

    #[test]
    fn full_span_from_the_last_entry() {
        let handles = [1, 2, 3];
        let span = HandleSpan::new(3, 3, 2);
        assert_eq!(span.iter(&handles).collect::<Vec<_>>(), [3, 1, 2]);
    }

    #[test]
    fn empty_span() {
        let span = HandleSpan::new(4, 0, 3);
        assert_eq!(span.iter(&[0; 4]).count(), 0);
        assert_eq!(HandleSpan::whole(0).iter(&[]).count(), 0);
    }

    #[test]
    #[should_panic]
    fn span_larger_than_ring() {
        HandleSpan::new(4, 5, 0);
    }

    #[test]
    #[should_panic(expected = "outside of the ring")]
    fn head_past_the_ring_end() {
        HandleSpan::new(4, 1, 6);
    }

    #[test]
    fn span_parts() {
        let span = HandleSpan::new(8, 4, 6);
        assert_eq!((span.size(), span.span(), span.head()), (8, 4, 6));
        assert_eq!(HandleSpan::whole(5), HandleSpan::new(5, 5, 0));
    }

    #[test]
    fn bind_and_unbind() {
        let mut index = HandleIndex::new(4);
        let binding = Binding {
            id: DispatchId::new(2),
            epoch: 7,
        };
        assert_eq!(index.bind(3, binding), Ok(None));
        assert_eq!(index.get(3), Ok(Some(binding)));
        assert_eq!(index.bound_count(), 1);
        index.unbind(3).unwrap();
        assert_eq!(index.get(3), Ok(None));
        assert_eq!(index.get(4), Err(DispatchError::InvalidHandle(4)));
    }
}
