use super::*;
use crate::frame::now_ms;

fn draft(content: &str) -> Draft {
    Draft::new(Uuid::new_v4(), content, now_ms()).unwrap()
}

// =========================================================================
// creation
// =========================================================================

#[test]
fn new_draft_has_single_version_one() {
    let d = draft("🚀 Launch day!");
    assert_eq!(d.current_version, 1);
    assert_eq!(d.versions.len(), 1);
    assert_eq!(d.versions[0].version, 1);
    assert_eq!(d.content, "🚀 Launch day!");
    assert_eq!(d.versions[0].content, d.content);
}

#[test]
fn empty_content_is_rejected() {
    assert!(matches!(
        Draft::new(Uuid::new_v4(), "", now_ms()),
        Err(DraftError::EmptyContent)
    ));
    assert!(matches!(
        Draft::new(Uuid::new_v4(), "   \n ", now_ms()),
        Err(DraftError::EmptyContent)
    ));
}

// =========================================================================
// create_version
// =========================================================================

#[test]
fn create_version_appends_and_becomes_current() {
    let d = draft("v1 text");
    let d2 = d.create_version("v2 text", Some("tighten the hook"), Some(vec!["tightened".into()]), now_ms());

    assert_eq!(d2.current_version, 2);
    assert_eq!(d2.content, "v2 text");
    assert_eq!(d2.versions.len(), 2);
    assert_eq!(d2.version(2).unwrap().instruction.as_deref(), Some("tighten the hook"));
    assert_eq!(d2.version(2).unwrap().changes.as_deref(), Some(&["tightened".to_string()][..]));

    // Immutable: the original value is untouched.
    assert_eq!(d.current_version, 1);
    assert_eq!(d.versions.len(), 1);
}

#[test]
fn versions_are_contiguous_from_one() {
    let mut d = draft("v1");
    for i in 2..=6 {
        d = d.create_version(format!("v{i}"), None, None, now_ms());
    }
    let numbers: Vec<u32> = d.versions.iter().map(|v| v.version).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4, 5, 6]);
    assert_eq!(d.current_version, d.max_version());
    assert_eq!(d.content, d.version(d.current_version).unwrap().content);
}

#[test]
fn create_version_never_reuses_a_number_after_revert() {
    let d = draft("v1")
        .create_version("v2", None, None, now_ms())
        .create_version("v3", None, None, now_ms());
    let reverted = d.revert_to(1);
    let edited = reverted.create_version("v4", None, None, now_ms());

    assert_eq!(edited.current_version, 4);
    let numbers: Vec<u32> = edited.versions.iter().map(|v| v.version).collect();
    assert_eq!(numbers, vec![1, 2, 3, 4]);
}

// =========================================================================
// revert_to
// =========================================================================

#[test]
fn revert_moves_pointer_and_restores_content() {
    let d = draft("v1 text").create_version("v2 text", None, None, now_ms());
    let reverted = d.revert_to(1);

    assert_eq!(reverted.current_version, 1);
    assert_eq!(reverted.content, "v1 text");
    // History is append-only: the later version survives.
    assert_eq!(reverted.versions.len(), 2);
    assert!(reverted.version(2).is_some());
}

#[test]
fn revert_to_unknown_version_is_a_noop() {
    let d = draft("v1 text").create_version("v2 text", None, None, now_ms());
    let same = d.revert_to(99);

    assert_eq!(same.current_version, d.current_version);
    assert_eq!(same.content, d.content);
    assert_eq!(same.versions.len(), d.versions.len());
}

#[test]
fn version_lookup() {
    let d = draft("v1").create_version("v2", None, None, now_ms());
    assert_eq!(d.version(1).unwrap().content, "v1");
    assert_eq!(d.version(2).unwrap().content, "v2");
    assert!(d.version(3).is_none());
}
