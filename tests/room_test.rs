//! Tests for room identity and addressing: canonical names, DM composite
//! ids, and channel suffix parsing.

use studyhall_server::chat::room::{
    resolve_dm_room_id, split_channel_suffix, RoomDescriptor, RoomKind, DEFAULT_CHANNEL,
};

#[test]
fn canonical_names_are_prefix_tagged_per_kind() {
    let course = RoomDescriptor::parse(RoomKind::Course, "fx-101");
    let lesson = RoomDescriptor::parse(RoomKind::Lesson, "fx-101");

    assert_eq!(course.canonical_name(), "course_fx-101");
    assert_eq!(lesson.canonical_name(), "lesson_fx-101");
    // Same id, different kind — never the same room.
    assert_ne!(course.canonical_name(), lesson.canonical_name());
}

#[test]
fn equal_descriptors_produce_equal_names() {
    let a = RoomDescriptor::parse(RoomKind::Course, "fx-101_qa");
    let b = RoomDescriptor::parse(RoomKind::Course, "fx-101_qa");
    assert_eq!(a.canonical_name(), b.canonical_name());
}

#[test]
fn dm_room_id_is_symmetric() {
    let pairs = [
        ("alice", "bob"),
        ("u-9", "u-10"),
        ("same", "same"),
        ("0193c", "0193d"),
    ];
    for (a, b) in pairs {
        assert_eq!(
            resolve_dm_room_id(a, b),
            resolve_dm_room_id(b, a),
            "dm id must not depend on who initiates ({a}, {b})"
        );
    }
    assert_eq!(resolve_dm_room_id("bob", "alice"), "alice_bob");
}

#[test]
fn channel_suffix_splits_on_last_separator() {
    assert_eq!(
        split_channel_suffix("fx-101"),
        ("fx-101".to_string(), DEFAULT_CHANNEL.to_string())
    );
    assert_eq!(
        split_channel_suffix("fx-101_qa"),
        ("fx-101".to_string(), "qa".to_string())
    );
    // Ids containing the separator split on the LAST one.
    assert_eq!(
        split_channel_suffix("intro_to_rust_qa"),
        ("intro_to_rust".to_string(), "qa".to_string())
    );
}

#[test]
fn channel_parsing_applies_to_course_and_lesson_only() {
    let course = RoomDescriptor::parse(RoomKind::Course, "fx-101_qa");
    assert_eq!(course.room_id, "fx-101");
    assert_eq!(course.channel_id, "qa");

    // A DM composite id contains the separator by construction and must be
    // taken verbatim.
    let dm_id = resolve_dm_room_id("alice", "bob");
    let dm = RoomDescriptor::parse(RoomKind::Dm, &dm_id);
    assert_eq!(dm.room_id, "alice_bob");
    assert_eq!(dm.channel_id, DEFAULT_CHANNEL);
    assert_eq!(dm.canonical_name(), "dm_alice_bob");

    // Private slugs are taken verbatim too.
    let private = RoomDescriptor::parse(RoomKind::Private, "study_group");
    assert_eq!(private.room_id, "study_group");
}

#[test]
fn bare_ids_default_to_general_channel() {
    let room = RoomDescriptor::parse(RoomKind::Lesson, "lesson-42");
    assert_eq!(room.channel_id, "general");
    assert_eq!(room.canonical_name(), "lesson_lesson-42");
}
