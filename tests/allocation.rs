#![no_std]

const BLOCK_SIZE: usize = 16;
const BLOCK_COUNT: usize = 1024 * 1024;

#[global_allocator]
static ALLOCATOR: embuddy::Allocator<BLOCK_SIZE, BLOCK_COUNT> = embuddy::Allocator::new();

extern crate alloc;

#[test]
fn vec() {
    let mut v = alloc::vec![10, 20, 30];
    v.push(40);

    assert_eq!((1..=4).map(|i| i * 10).collect::<alloc::vec::Vec<_>>(), v);
}

#[test]
fn growing_string() {
    let mut s = alloc::string::String::new();
    for _ in 0..100 {
        s.push_str("buddy ");
    }

    assert_eq!(s.len(), 600);
    assert!(s.starts_with("buddy buddy"));
}

#[test]
fn map_and_formatting() {
    let mut map = alloc::collections::BTreeMap::new();
    map.insert(10, "Hello");
    map.insert(11, "world");
    map.insert(20, "Hallo");
    map.insert(21, "Welt");
    map.insert(-1, "english");
    map.insert(-2, "german");

    let english = alloc::format!("[{}]: {}, {}!", map[&-1], map[&10], map[&11]);
    let german = alloc::format!("[{}]: {}, {}!", map[&-2], map[&20], map[&21]);
    assert_eq!(english, "[english]: Hello, world!");
    assert_eq!(german, "[german]: Hallo, Welt!");
}
