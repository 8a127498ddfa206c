use pretty_assertions::assert_eq;
use test_env_log::test;

use super::{ListPool, PersistentList};

#[derive(Clone, Debug, PartialEq)]
enum Item {
    Num(i32),
    List(PersistentList<Item>),
}

#[test]
fn test_list_from_keeps_order() {
    let pool = ListPool::new();
    let list = pool.list_from([1, 2, 3]);
    assert_eq!(list.len(), 3);
    assert_eq!(list.to_vec(), vec![1, 2, 3]);
    assert_eq!(list.first(), Some(1));
    assert_eq!(list.get(2), Some(3));
    assert_eq!(list.get(3), None);
    assert!(pool.new_list().is_empty());
}

#[test]
fn test_add_shares_tail() {
    let pool = ListPool::new();
    let a = pool.list_from([1, 2, 3]);
    let b = a.add(0);

    assert_eq!(b.to_vec(), vec![0, 1, 2, 3]);
    assert_eq!(a.to_vec(), vec![1, 2, 3]);
    // one new node, the old three are shared
    assert_eq!(pool.node_count(), 4);
    assert!(b.rest().ptr_eq(&a));
}

#[test]
fn test_remove_at_copies_prefix_only() {
    let pool = ListPool::new();
    let a = pool.list_from([1, 2, 3, 4, 5]);
    let b = a.remove_at(2);

    assert_eq!(b.to_vec(), vec![1, 2, 4, 5]);
    assert_eq!(a.to_vec(), vec![1, 2, 3, 4, 5]);
    // nodes for 1 and 2 are copied, 4 and 5 are shared
    assert_eq!(pool.node_count(), 7);

    let head_removed = a.remove_at(0);
    assert_eq!(head_removed.to_vec(), vec![2, 3, 4, 5]);
    assert_eq!(pool.node_count(), 7);

    let unchanged = a.remove_at(10);
    assert!(unchanged.ptr_eq(&a));
}

#[test]
fn test_ref_counts_follow_handles() {
    let pool = ListPool::new();
    let a = pool.list_from(["x", "y"]);
    assert_eq!(a.ref_count(), 1);

    let a2 = a.clone();
    assert_eq!(a.ref_count(), 2);
    drop(a2);
    assert_eq!(a.ref_count(), 1);

    // `rest` counts the second node as a root of its own
    let tail = a.rest();
    assert_eq!(tail.ref_count(), 1);
    assert_eq!(tail.first(), Some("y"));
}

#[test]
fn test_structural_equality() {
    let pool = ListPool::new();
    let other_pool = ListPool::new();
    let a = pool.list_from([1, 2, 3]);
    let b = pool.new_list().add(3).add(2).add(1);
    let c = other_pool.list_from([1, 2, 3]);

    assert_eq!(a, b);
    assert_eq!(a, c);
    assert_ne!(a, pool.list_from([1, 2]));
    assert_ne!(a, pool.list_from([1, 2, 4]));
}

#[test]
fn test_gc_keeps_shared_tail_alive() {
    let pool = ListPool::new();
    let a = pool.list_from([1, 2, 3]);
    let b = a.add(0);
    drop(b);

    assert_eq!(pool.gc(), 1);
    assert_eq!(a.to_vec(), vec![1, 2, 3]);
    assert_eq!(pool.node_count(), 3);

    drop(a);
    assert_eq!(pool.gc(), 3);
    assert_eq!(pool.live_size_bytes(), 0);
}

#[test]
fn test_gc_is_idempotent() {
    let pool = ListPool::new();
    let keep = pool.list_from(0..10);
    let _dropped = keep.remove_at(5);
    drop(_dropped);

    pool.gc();
    let live = pool.live_size_bytes();
    assert_eq!(pool.gc(), 0);
    assert_eq!(pool.live_size_bytes(), live);
    assert_eq!(keep.len(), 10);
}

#[test]
fn test_gc_releases_nested_lists_on_next_round() {
    let pool = ListPool::new();
    let inner = pool.list_from([Item::Num(1), Item::Num(2)]);
    let outer = pool.list_from([Item::List(inner.clone()), Item::Num(3)]);
    drop(inner);

    // `inner` is still held by a node of `outer`.
    assert_eq!(pool.gc(), 0);
    assert_eq!(pool.node_count(), 4);

    drop(outer);
    // The outer nodes go first; dropping them releases the inner root.
    assert_eq!(pool.gc(), 2);
    assert_eq!(pool.gc(), 2);
    assert_eq!(pool.node_count(), 0);
}

#[test]
fn test_reclaimed_slots_are_reused() {
    let pool = ListPool::new();
    drop(pool.list_from(0..64));
    let reserved = pool.reserved_size_bytes();
    assert_eq!(pool.gc(), 64);

    let again = pool.list_from(0..64);
    assert_eq!(pool.reserved_size_bytes(), reserved);
    assert_eq!(again.len(), 64);
}
