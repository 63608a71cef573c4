//! Path-addressed CRUD over the test aggregate and the flat collections.
//!
//! Every operation locates its target by id and reports a missing segment as
//! `None`/`false`; nothing here errors on an unknown id. Each successful
//! operation goes through one [`Store::mutate`] call, so it persists and
//! notifies exactly once. Failed lookups leave the store untouched.

mod profiles;
mod records;

pub use profiles::NewScoringProfile;

use crate::lens::{
    get_at_path, remove_by_id, update_at_path, QuestionPath, SectionPath, TestPath, VersionPath,
};
use crate::model::{
    empty_object, new_id, Assignment, Extra, Question, Section, Target, Test, TestStatus, Version,
};
use crate::store::Store;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;

/// Fields for a new section.
#[derive(Debug, Clone, Default)]
pub struct NewSection {
    pub label: String,
    pub kind: String,
    /// Minutes.
    pub time_limit: u32,
    pub settings: Option<Value>,
}

/// Fields for a new question. Type-specific fields go in `extra`.
#[derive(Debug, Clone, Default)]
pub struct NewQuestion {
    pub kind: String,
    pub prompt: String,
    pub choices: Option<Vec<Value>>,
    pub answer: Option<Value>,
    pub points: f64,
    pub extra: Extra,
}

pub struct Repository {
    store: Arc<Store>,
}

impl Repository {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<Store> {
        &self.store
    }

    fn now(&self) -> String {
        self.store.clock().now_iso()
    }

    // ------------------------------------------------------------------
    // Tests
    // ------------------------------------------------------------------

    pub fn create_test(&self, name: &str, description: &str) -> Test {
        let test = Test {
            id: new_id(),
            name: name.to_string(),
            description: description.to_string(),
            status: TestStatus::Draft,
            created_at: self.now(),
            updated_at: None,
            versions: vec![],
            assignments: vec![],
            extra: Extra::new(),
        };
        let created = test.clone();
        self.store.mutate(move |snap| {
            snap.tests.push(Arc::new(test));
            Some(())
        });
        tracing::debug!(test_id = %created.id, "Created test");
        created
    }

    pub fn get_test(&self, test_id: &str) -> Option<Test> {
        let snapshot = self.store.snapshot();
        get_at_path(&snapshot.tests, &TestPath::new(test_id)).cloned()
    }

    pub fn list_tests(&self) -> Vec<Test> {
        self.store.tests()
    }

    /// Edit a test's own fields. The id cannot be changed.
    pub fn update_test(&self, test_id: &str, f: impl FnOnce(&mut Test)) -> bool {
        let now = self.now();
        self.store
            .mutate(|snap| {
                update_at_path(&mut snap.tests, &TestPath::new(test_id), |test| {
                    let id = test.id.clone();
                    f(test);
                    test.id = id;
                    test.updated_at = Some(now);
                })
            })
            .is_some()
    }

    pub fn set_test_status(&self, test_id: &str, status: TestStatus) -> bool {
        self.update_test(test_id, |test| test.status = status)
    }

    pub fn delete_test(&self, test_id: &str) -> bool {
        self.store
            .mutate(|snap| remove_by_id(&mut snap.tests, test_id))
            .is_some()
    }

    /// Deep-copy a test with fresh ids and timestamps.
    ///
    /// The copy starts as a Draft with no assignments, so the original's
    /// deployment state is untouched.
    pub fn clone_test(&self, test_id: &str) -> Option<Test> {
        let now = self.now();
        let copy = self.store.mutate(|snap| {
            let source = get_at_path(&snap.tests, &TestPath::new(test_id))?;
            let copy = Test {
                id: new_id(),
                name: format!("{} (copy)", source.name),
                description: source.description.clone(),
                status: TestStatus::Draft,
                created_at: now.clone(),
                updated_at: None,
                versions: source
                    .versions
                    .iter()
                    .map(|v| Arc::new(duplicate_version(v, &now)))
                    .collect(),
                assignments: vec![],
                extra: source.extra.clone(),
            };
            snap.tests.push(Arc::new(copy.clone()));
            Some(copy)
        })?;
        tracing::info!(source = test_id, copy = %copy.id, "Cloned test");
        Some(copy)
    }

    /// Attach an assignment to a test. Returns the new assignment id.
    pub fn add_assignment(&self, test_id: &str, extra: Extra) -> Option<String> {
        let assignment = Assignment {
            id: new_id(),
            assigned_at: self.now(),
            extra,
        };
        let id = assignment.id.clone();
        self.store.mutate(|snap| {
            update_at_path(&mut snap.tests, &TestPath::new(test_id), |test| {
                test.assignments.push(assignment);
            })
        })?;
        Some(id)
    }

    pub fn remove_assignment(&self, test_id: &str, assignment_id: &str) -> bool {
        self.store
            .mutate(|snap| {
                update_at_path(&mut snap.tests, &TestPath::new(test_id), |test| {
                    remove_by_id(&mut test.assignments, assignment_id)
                })
                .flatten()
            })
            .is_some()
    }

    // ------------------------------------------------------------------
    // Versions
    // ------------------------------------------------------------------

    /// Prepend a new empty version. Returns its id, or `None` for an unknown
    /// test.
    pub fn add_version(&self, test_id: &str, targets: Vec<Target>) -> Option<String> {
        let now = self.now();
        let version = Version {
            id: new_id(),
            targets,
            sections: vec![],
            exam_options: empty_object(),
            created_at: now.clone(),
            extra: Extra::new(),
        };
        let id = version.id.clone();
        self.store.mutate(|snap| {
            update_at_path(&mut snap.tests, &TestPath::new(test_id), |test| {
                test.versions.insert(0, Arc::new(version));
                test.updated_at = Some(now);
            })
        })?;
        Some(id)
    }

    pub fn update_version(&self, path: &VersionPath, f: impl FnOnce(&mut Version)) -> bool {
        let now = self.now();
        self.store
            .mutate(|snap| {
                update_at_path(&mut snap.tests, path, |version| {
                    let id = version.id.clone();
                    f(version);
                    version.id = id;
                })?;
                touch(&mut snap.tests, &path.test_id, now);
                Some(())
            })
            .is_some()
    }

    pub fn delete_version(&self, path: &VersionPath) -> bool {
        let now = self.now();
        self.store
            .mutate(|snap| {
                update_at_path(&mut snap.tests, &path.parent(), |test| {
                    remove_by_id(&mut test.versions, &path.version_id)?;
                    test.updated_at = Some(now);
                    Some(())
                })
                .flatten()
            })
            .is_some()
    }

    // ------------------------------------------------------------------
    // Sections
    // ------------------------------------------------------------------

    pub fn add_section(&self, path: &VersionPath, new: NewSection) -> Option<String> {
        let now = self.now();
        let section = Section {
            id: new_id(),
            label: new.label,
            kind: new.kind,
            time_limit: new.time_limit,
            questions: vec![],
            settings: new.settings.unwrap_or_else(empty_object),
            created_at: now.clone(),
            extra: Extra::new(),
        };
        let id = section.id.clone();
        self.store.mutate(|snap| {
            update_at_path(&mut snap.tests, path, |version| {
                version.sections.push(Arc::new(section));
            })?;
            touch(&mut snap.tests, &path.test_id, now);
            Some(())
        })?;
        Some(id)
    }

    pub fn update_section(&self, path: &SectionPath, f: impl FnOnce(&mut Section)) -> bool {
        let now = self.now();
        self.store
            .mutate(|snap| {
                update_at_path(&mut snap.tests, path, |section| {
                    let id = section.id.clone();
                    f(section);
                    section.id = id;
                })?;
                touch(&mut snap.tests, &path.test_id, now);
                Some(())
            })
            .is_some()
    }

    pub fn delete_section(&self, path: &SectionPath) -> bool {
        let now = self.now();
        self.store
            .mutate(|snap| {
                update_at_path(&mut snap.tests, &path.parent(), |version| {
                    remove_by_id(&mut version.sections, &path.section_id)
                })
                .flatten()?;
                touch(&mut snap.tests, &path.test_id, now);
                Some(())
            })
            .is_some()
    }

    // ------------------------------------------------------------------
    // Questions
    // ------------------------------------------------------------------

    pub fn add_question(&self, path: &SectionPath, new: NewQuestion) -> Option<String> {
        let now = self.now();
        let question = Question {
            id: new_id(),
            kind: new.kind,
            prompt: new.prompt,
            choices: new.choices,
            answer: new.answer,
            points: new.points,
            created_at: now.clone(),
            extra: new.extra,
        };
        let id = question.id.clone();
        self.store.mutate(|snap| {
            update_at_path(&mut snap.tests, path, |section| {
                section.questions.push(Arc::new(question));
            })?;
            touch(&mut snap.tests, &path.test_id, now);
            Some(())
        })?;
        Some(id)
    }

    pub fn get_question(&self, path: &QuestionPath) -> Option<Question> {
        let snapshot = self.store.snapshot();
        get_at_path(&snapshot.tests, path).cloned()
    }

    pub fn update_question(&self, path: &QuestionPath, f: impl FnOnce(&mut Question)) -> bool {
        let now = self.now();
        self.store
            .mutate(|snap| {
                update_at_path(&mut snap.tests, path, |question| {
                    let id = question.id.clone();
                    f(question);
                    question.id = id;
                })?;
                touch(&mut snap.tests, &path.test_id, now);
                Some(())
            })
            .is_some()
    }

    pub fn delete_question(&self, path: &QuestionPath) -> bool {
        let now = self.now();
        self.store
            .mutate(|snap| {
                update_at_path(&mut snap.tests, &path.parent(), |section| {
                    remove_by_id(&mut section.questions, &path.question_id)
                })
                .flatten()?;
                touch(&mut snap.tests, &path.test_id, now);
                Some(())
            })
            .is_some()
    }

    /// Reorder a section's questions.
    ///
    /// `ordered_ids`, after dropping unknown and repeated ids, must name every
    /// question of the section exactly once. Anything else is a no-op that
    /// returns false and keeps the current order.
    pub fn reorder_questions<S: AsRef<str>>(&self, path: &SectionPath, ordered_ids: &[S]) -> bool {
        let now = self.now();
        let applied = self.store.mutate(|snap| {
            update_at_path(&mut snap.tests, path, |section| {
                let wanted: Vec<&str> = ordered_ids.iter().map(|id| id.as_ref()).collect();
                let mut seen = HashSet::new();
                let reordered: Vec<_> = wanted
                    .into_iter()
                    .filter(|id| seen.insert(*id))
                    .filter_map(|id| section.questions.iter().find(|q| q.id == id).cloned())
                    .collect();
                if reordered.len() != section.questions.len() {
                    return None;
                }
                section.questions = reordered;
                Some(())
            })
            .flatten()?;
            touch(&mut snap.tests, &path.test_id, now);
            Some(())
        });
        if applied.is_none() {
            tracing::debug!(section_id = %path.section_id, "Rejected reorder that is not a permutation");
        }
        applied.is_some()
    }
}

/// Stamp the owning test as modified. The test is already on the copied path.
fn touch(tests: &mut [Arc<Test>], test_id: &str, now: String) {
    update_at_path(tests, &TestPath::new(test_id), |test| {
        test.updated_at = Some(now);
    });
}

fn duplicate_version(source: &Version, now: &str) -> Version {
    Version {
        id: new_id(),
        targets: source.targets.clone(),
        sections: source
            .sections
            .iter()
            .map(|section| {
                Arc::new(Section {
                    id: new_id(),
                    questions: section
                        .questions
                        .iter()
                        .map(|question| {
                            Arc::new(Question {
                                id: new_id(),
                                created_at: now.to_string(),
                                ..(**question).clone()
                            })
                        })
                        .collect(),
                    created_at: now.to_string(),
                    ..(**section).clone()
                })
            })
            .collect(),
        exam_options: source.exam_options.clone(),
        created_at: now.to_string(),
        extra: source.extra.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::test_support::*;
    use std::sync::atomic::Ordering;

    fn repo() -> (Repository, Fixture) {
        let fx = fixture();
        (Repository::new(fx.store.clone()), fx)
    }

    fn kr_targets() -> Vec<Target> {
        vec![Target {
            system: "KR".to_string(),
            grades: vec!["중1".to_string()],
        }]
    }

    /// Build test → version → section with three questions.
    fn seeded_section(repo: &Repository) -> (SectionPath, Vec<String>) {
        let test = repo.create_test("Quiz1", "");
        let version_id = repo.add_version(&test.id, kr_targets()).unwrap();
        let version = TestPath::new(&test.id).version(version_id);
        let section_id = repo
            .add_section(
                &version,
                NewSection {
                    label: "Reading".to_string(),
                    kind: "Reading".to_string(),
                    time_limit: 30,
                    settings: None,
                },
            )
            .unwrap();
        let section = version.section(section_id);
        let ids = (0..3)
            .map(|i| {
                repo.add_question(
                    &section,
                    NewQuestion {
                        kind: "MCQ".to_string(),
                        prompt: format!("Q{i}"),
                        points: 10.0,
                        ..Default::default()
                    },
                )
                .unwrap()
            })
            .collect();
        (section, ids)
    }

    fn question_ids(repo: &Repository, path: &SectionPath) -> Vec<String> {
        let snapshot = repo.store().snapshot();
        get_at_path(&snapshot.tests, path)
            .unwrap()
            .questions
            .iter()
            .map(|q| q.id.clone())
            .collect()
    }

    #[test]
    fn test_add_version_unknown_test_is_noop() {
        let (repo, fx) = repo();
        let notified = count_notifications(&fx.store);
        let before = fx.store.snapshot();

        assert!(repo.add_version("nonexistent-id", kr_targets()).is_none());
        assert_eq!(notified.load(Ordering::SeqCst), 0);
        assert!(Arc::ptr_eq(&before, &fx.store.snapshot()));
    }

    #[test]
    fn test_add_version_prepends() {
        let (repo, _fx) = repo();
        let test = repo.create_test("Quiz", "");
        let first = repo.add_version(&test.id, vec![]).unwrap();
        let second = repo.add_version(&test.id, kr_targets()).unwrap();
        let versions = repo.get_test(&test.id).unwrap().versions;
        assert_eq!(versions[0].id, second);
        assert_eq!(versions[1].id, first);
        assert!(versions[0].sections.is_empty());
    }

    #[test]
    fn test_full_depth_build() {
        let (repo, _fx) = repo();
        let (section, ids) = seeded_section(&repo);
        let test = repo.get_test(&section.test_id).unwrap();
        let question = &test.versions[0].sections[0].questions[0];
        assert_eq!(question.points, 10.0);
        assert_eq!(question.id, ids[0]);
        assert_eq!(test.versions[0].targets[0].grades, vec!["중1"]);
    }

    #[test]
    fn test_each_operation_notifies_once() {
        let (repo, fx) = repo();
        let (section, ids) = seeded_section(&repo);
        let notified = count_notifications(&fx.store);

        assert!(repo.update_question(&section.question(&ids[0]), |q| q.prompt = "edited".into()));
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        assert!(!repo.update_question(&section.question("missing"), |q| q.points = 1.0));
        assert_eq!(notified.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_update_cannot_change_id() {
        let (repo, _fx) = repo();
        let (section, ids) = seeded_section(&repo);
        let path = section.question(&ids[1]);
        assert!(repo.update_question(&path, |q| {
            q.id = "hijacked".to_string();
            q.points = 3.0;
        }));
        let question = repo.get_question(&path).unwrap();
        assert_eq!(question.points, 3.0);
    }

    #[test]
    fn test_update_leaves_sibling_tests_shared() {
        let (repo, fx) = repo();
        let (section, ids) = seeded_section(&repo);
        repo.create_test("Other", "");
        let before = fx.store.snapshot();

        assert!(repo.update_question(&section.question(&ids[0]), |q| q.points = 1.0));
        let after = fx.store.snapshot();
        assert!(!Arc::ptr_eq(&before.tests[0], &after.tests[0]));
        assert!(Arc::ptr_eq(&before.tests[1], &after.tests[1]));
    }

    #[test]
    fn test_delete_question_and_section() {
        let (repo, _fx) = repo();
        let (section, ids) = seeded_section(&repo);
        assert!(repo.delete_question(&section.question(&ids[1])));
        assert!(!repo.delete_question(&section.question(&ids[1])));
        assert_eq!(question_ids(&repo, &section), vec![ids[0].clone(), ids[2].clone()]);

        assert!(repo.delete_section(&section));
        assert!(!repo.delete_section(&section));
        let test = repo.get_test(&section.test_id).unwrap();
        assert!(test.versions[0].sections.is_empty());
    }

    #[test]
    fn test_delete_version() {
        let (repo, _fx) = repo();
        let (section, _) = seeded_section(&repo);
        let version = section.parent();
        assert!(repo.delete_version(&version));
        assert!(!repo.delete_version(&version));
        assert!(repo.get_test(&section.test_id).unwrap().versions.is_empty());
    }

    #[test]
    fn test_reorder_accepts_permutation() {
        let (repo, _fx) = repo();
        let (section, ids) = seeded_section(&repo);
        let reversed: Vec<String> = ids.iter().rev().cloned().collect();
        assert!(repo.reorder_questions(&section, &reversed));
        assert_eq!(question_ids(&repo, &section), reversed);
    }

    #[test]
    fn test_reorder_rejects_missing_id() {
        let (repo, fx) = repo();
        let (section, ids) = seeded_section(&repo);
        let notified = count_notifications(&fx.store);

        assert!(!repo.reorder_questions(&section, &[&ids[2], &ids[0]]));
        assert_eq!(question_ids(&repo, &section), ids);
        assert_eq!(notified.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_reorder_rejects_duplicates_and_ignores_unknown() {
        let (repo, _fx) = repo();
        let (section, ids) = seeded_section(&repo);
        let padded = [&ids[0], &ids[0], &ids[1]];
        assert!(!repo.reorder_questions(&section, &padded));
        assert_eq!(question_ids(&repo, &section), ids);

        let with_stranger = ["stranger", ids[2].as_str(), ids[1].as_str(), ids[0].as_str()];
        assert!(repo.reorder_questions(&section, &with_stranger));
        assert_eq!(question_ids(&repo, &section)[0], ids[2]);
    }

    #[test]
    fn test_clone_test_is_fresh_draft() {
        let (repo, _fx) = repo();
        let (section, _) = seeded_section(&repo);
        assert!(repo.set_test_status(&section.test_id, TestStatus::Published));
        repo.add_assignment(&section.test_id, Extra::new()).unwrap();

        let copy = repo.clone_test(&section.test_id).unwrap();
        let original = repo.get_test(&section.test_id).unwrap();

        assert_ne!(copy.id, original.id);
        assert_eq!(copy.name, "Quiz1 (copy)");
        assert_eq!(copy.status, TestStatus::Draft);
        assert!(copy.assignments.is_empty());
        assert_eq!(original.status, TestStatus::Published);
        assert_eq!(original.assignments.len(), 1);

        let (orig_v, copy_v) = (&original.versions[0], &copy.versions[0]);
        assert_ne!(orig_v.id, copy_v.id);
        assert_ne!(orig_v.sections[0].id, copy_v.sections[0].id);
        assert_eq!(copy_v.sections[0].questions.len(), 3);
        for (a, b) in orig_v.sections[0].questions.iter().zip(&copy_v.sections[0].questions) {
            assert_ne!(a.id, b.id);
            assert_eq!(a.prompt, b.prompt);
            assert_eq!(a.points, b.points);
        }
        assert!(repo.clone_test("missing").is_none());
    }

    #[test]
    fn test_assignments_add_and_remove() {
        let (repo, _fx) = repo();
        let test = repo.create_test("Quiz", "");
        let assignment = repo.add_assignment(&test.id, Extra::new()).unwrap();
        assert!(repo.add_assignment("missing", Extra::new()).is_none());
        assert!(repo.remove_assignment(&test.id, &assignment));
        assert!(!repo.remove_assignment(&test.id, &assignment));
    }

    #[test]
    fn test_nested_change_touches_test() {
        let (repo, fx) = repo();
        let (section, _) = seeded_section(&repo);
        fx.clock.advance(chrono::Duration::minutes(5));
        assert!(repo.update_section(&section, |s| s.time_limit = 45));
        let test = repo.get_test(&section.test_id).unwrap();
        assert_eq!(test.updated_at.as_deref(), Some("2023-11-14T22:18:20.000Z"));
        assert_eq!(test.versions[0].sections[0].time_limit, 45);
    }

    #[test]
    fn test_delete_test() {
        let (repo, _fx) = repo();
        let test = repo.create_test("Quiz", "");
        assert!(repo.delete_test(&test.id));
        assert!(!repo.delete_test(&test.id));
        assert!(repo.list_tests().is_empty());
    }
}
