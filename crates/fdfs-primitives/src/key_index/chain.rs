//! Hash-sorted singly linked bucket chains

use std::iter;
use std::time::Duration;

use fdfs_core::ArenaString;

pub(crate) type Link = Option<Box<EntryNode>>;

/// One key in the index
///
/// Nodes come from an object pool, so `Default` is the recycled state.
#[derive(Default)]
pub(crate) struct EntryNode {
    pub(crate) key: ArenaString,
    pub(crate) hash: u32,
    pub(crate) id: u64,
    /// Offset from the index epoch
    pub(crate) expires: Duration,
    pub(crate) next: Link,
}

/// Find the link a new `key` belongs in, or `None` if it is already present.
///
/// Equal hashes keep insertion order, so the slot is after the last node
/// whose hash is not greater than `hash`.
pub(crate) fn vacant_slot<'a>(mut link: &'a mut Link, hash: u32, key: &str) -> Option<&'a mut Link> {
    loop {
        match link.as_deref() {
            None => return Some(link),
            Some(node) if node.hash > hash => return Some(link),
            Some(node) if node.hash == hash && node.key.as_str() == key => return None,
            Some(_) => {}
        }
        link = &mut link.as_mut()?.next;
    }
}

/// Detach the first node with `hash` matching `pred`
pub(crate) fn unlink<F>(mut link: &mut Link, hash: u32, pred: F) -> Option<Box<EntryNode>>
where
    F: Fn(&EntryNode) -> bool,
{
    loop {
        match link.as_deref() {
            None => return None,
            Some(node) if node.hash > hash => return None,
            Some(node) if node.hash == hash && pred(node) => {
                let mut node = link.take()?;
                *link = node.next.take();
                return Some(node);
            }
            Some(_) => {}
        }
        link = &mut link.as_mut()?.next;
    }
}

pub(crate) fn iter(head: &Link) -> impl Iterator<Item = &EntryNode> {
    iter::successors(head.as_deref(), |node| node.next.as_deref())
}

pub(crate) fn find<'a>(head: &'a Link, hash: u32, key: &str) -> Option<&'a EntryNode> {
    iter(head)
        .take_while(|node| node.hash <= hash)
        .find(|node| node.hash == hash && node.key.as_str() == key)
}

/// Drop a chain node by node instead of recursively
pub(crate) fn clear(link: &mut Link) -> usize {
    let mut count = 0;
    let mut next = link.take();
    while let Some(mut node) = next {
        next = node.next.take();
        count += 1;
    }
    count
}
