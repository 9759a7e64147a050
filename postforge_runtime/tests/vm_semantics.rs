//! Cross-module VM semantics: slice views, copy-on-write snapshots, and
//! dictionary keying through the `Memory` facade.

use postforge_core::{Name, Object, Space, StringRef, Value};
use postforge_runtime::{DictKey, Memory};

#[test]
fn interval_views_observe_undo() {
    let mut mem = Memory::new();
    let base = mem.alloc_string(Space::Local, b"abcdef".to_vec());
    let view = StringRef {
        start: 2,
        len: 3,
        ..base
    };

    mem.local.begin_save(1);
    mem.string_put(view, 0, b'X').unwrap();
    assert_eq!(mem.string(base).unwrap(), b"abXdef");

    mem.local.restore_to(1).unwrap();
    assert_eq!(mem.string(base).unwrap(), b"abcdef");
    assert_eq!(mem.string(view).unwrap(), b"cde");
}

#[test]
fn dict_contents_roll_back_but_slot_survives() {
    let mut mem = Memory::new();
    let d = mem.alloc_dict(Space::Local, 4);
    let key = DictKey::Name(Name::new(b"x"));
    mem.dict_put(d, key, Object::integer(1)).unwrap();

    mem.local.begin_save(9);
    mem.dict_put(d, key, Object::integer(2)).unwrap();
    mem.dict_put(d, DictKey::Name(Name::new(b"y")), Object::integer(3))
        .unwrap();
    mem.local.restore_to(9).unwrap();

    let store = mem.dict(d).unwrap();
    assert_eq!(store.get(key), Some(Object::integer(1)));
    assert_eq!(store.len(), 1);
}

#[test]
fn post_save_allocations_vanish_on_restore() {
    let mut mem = Memory::new();
    let keeper = mem.alloc_array(Space::Local, vec![Object::integer(1)]);
    mem.local.begin_save(5);
    let doomed = mem.alloc_array(Space::Local, vec![Object::integer(2)]);
    assert!(mem
        .newer_than_save(&Object::new(Value::Array(doomed)), 5));
    mem.local.restore_to(5).unwrap();

    assert!(mem.array(keeper).is_ok());
    assert!(mem.array(doomed).is_err());
}

#[test]
fn global_heap_untouched_by_local_save() {
    let mut mem = Memory::new();
    let g = mem.alloc_string(Space::Global, b"persist".to_vec());
    mem.local.begin_save(2);
    mem.string_put(g, 0, b'P').unwrap();
    mem.local.restore_to(2).unwrap();
    // Only local VM rolled back; the global mutation stands.
    assert_eq!(mem.string(g).unwrap(), b"Persist");
}

#[test]
fn numeric_keys_unify_across_types() {
    let mut mem = Memory::new();
    let d = mem.alloc_dict(Space::Local, 4);
    mem.dict_put(d, DictKey::from_number(7.0), Object::boolean(true))
        .unwrap();
    assert_eq!(
        mem.dict_get(d, DictKey::Integer(7)).unwrap(),
        Some(Object::boolean(true))
    );
}

#[test]
fn save_levels_nest_independently() {
    let mut mem = Memory::new();
    let s = mem.alloc_string(Space::Local, b"0".to_vec());
    mem.local.begin_save(1);
    mem.string_put(s, 0, b'1').unwrap();
    mem.local.begin_save(2);
    mem.string_put(s, 0, b'2').unwrap();

    mem.local.restore_to(2).unwrap();
    assert_eq!(mem.string(s).unwrap(), b"1");
    mem.local.restore_to(1).unwrap();
    assert_eq!(mem.string(s).unwrap(), b"0");
}
