use std::{fmt, marker::PhantomData};

use crate::block::{BLOCK_HEADER_SIZE, Block};

/// Read-only snapshot of one block, as reported by
/// [`crate::Allocator::blocks`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Address of the block header.
    pub addr: *const u8,
    /// Usable bytes after the header.
    pub size: usize,
    pub is_free: bool,
    /// Header address of the next block, null for the tail.
    pub next: *const u8,
}

impl BlockInfo {
    /// Pointer the block's owner received from `allocate`.
    pub fn payload(&self) -> *const u8 {
        self.addr.wrapping_add(BLOCK_HEADER_SIZE)
    }
}

impl fmt::Display for BlockInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Block at {:p}: size={}, free={}, next={:p}",
            self.addr, self.size, self.is_free, self.next
        )
    }
}

/// Iterator over the block list in address order.
pub struct Iter<'a> {
    current: *mut Block,
    marker: PhantomData<&'a Block>,
}

impl<'a> Iter<'a> {
    /// `head` must be null or the first header of a well-formed list that
    /// outlives `'a`.
    pub(crate) fn new(head: *mut Block) -> Self {
        Self {
            current: head,
            marker: PhantomData,
        }
    }
}

impl<'a> Iterator for Iter<'a> {
    type Item = BlockInfo;

    fn next(&mut self) -> Option<Self::Item> {
        if self.current.is_null() {
            return None;
        }

        unsafe {
            let block = self.current;
            self.current = (*block).next;

            Some(BlockInfo {
                addr: block.cast_const().cast(),
                size: (*block).size,
                is_free: (*block).is_free,
                next: (*block).next.cast_const().cast(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::ptr;

    #[test]
    fn empty_list_yields_nothing() {
        let mut iter = Iter::new(ptr::null_mut());
        assert!(iter.next().is_none());
    }

    #[test]
    fn walks_linked_headers() {
        let mut second = Block::new(16);
        second.is_free = true;
        let mut first = Block::new(32);
        first.next = &mut second;

        let infos: Vec<_> = Iter::new(&mut first).collect();

        assert_eq!(2, infos.len());
        assert_eq!(32, infos[0].size);
        assert!(!infos[0].is_free);
        assert_eq!(infos[1].addr, infos[0].next);
        assert!(infos[1].is_free);
        assert!(infos[1].next.is_null());
    }

    #[test]
    fn display_matches_dump_format() {
        let info = BlockInfo {
            addr: 0x1000 as *const u8,
            size: 48,
            is_free: true,
            next: std::ptr::null(),
        };

        assert_eq!("Block at 0x1000: size=48, free=true, next=0x0", info.to_string());
        assert_eq!(0x1000 + BLOCK_HEADER_SIZE, info.payload() as usize);
    }
}
