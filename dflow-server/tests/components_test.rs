//! Skill loading as wired by the server.

use dflow_server::{load_skills, SkillSource};
use std::path::PathBuf;

fn bundled_skills() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../skill")
}

/// **Test: the skills shipped with the repository load with their default skill.**
#[test]
fn bundled_skills_load() {
    let registry = load_skills(&SkillSource {
        path: bundled_skills(),
        default_skill: "input.unknown".into(),
    })
    .unwrap();

    assert_eq!(registry.actions(), vec!["book_flight", "input.unknown"]);
    let book_flight = registry.resolve("book_flight").unwrap();
    assert_eq!(book_flight.parameter_order(), vec!["destination", "date", "seats"]);
    assert_eq!(registry.resolve("weather").unwrap().name(), "input.unknown");
}

/// **Test: a default skill that does not exist fails startup.**
#[test]
fn missing_default_skill_fails() {
    let err = load_skills(&SkillSource {
        path: bundled_skills(),
        default_skill: "small_talk".into(),
    })
    .err()
    .unwrap();

    assert!(format!("{:#}", err).contains("small_talk"));
}

/// **Test: an unreadable skill path fails startup.**
#[test]
fn missing_skill_path_fails() {
    let dir = tempfile::tempdir().unwrap();
    let result = load_skills(&SkillSource {
        path: dir.path().join("nope"),
        default_skill: "input.unknown".into(),
    });
    assert!(result.is_err());
}
