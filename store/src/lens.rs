//! Id paths into the test aggregate and copy-on-write updates along them.
//!
//! Children are stored as `Arc`s. Reaching a node mutably goes through
//! `Arc::make_mut` at every level, so an update copies exactly the nodes on
//! the path and every untouched sibling stays shared with the previous
//! snapshot.

use crate::model::{Identified, Question, Section, Test, Version};
use std::sync::Arc;

/// A typed id path that can locate its target inside the test list.
pub trait Lens {
    type Target: Clone;

    fn get<'a>(&self, tests: &'a [Arc<Test>]) -> Option<&'a Self::Target>;

    /// Locate the target for mutation, copying shared nodes along the way.
    fn get_mut<'a>(&self, tests: &'a mut [Arc<Test>]) -> Option<&'a mut Self::Target>;
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct TestPath {
    pub test_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct VersionPath {
    pub test_id: String,
    pub version_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SectionPath {
    pub test_id: String,
    pub version_id: String,
    pub section_id: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QuestionPath {
    pub test_id: String,
    pub version_id: String,
    pub section_id: String,
    pub question_id: String,
}

impl TestPath {
    pub fn new(test_id: impl Into<String>) -> Self {
        Self {
            test_id: test_id.into(),
        }
    }

    pub fn version(&self, version_id: impl Into<String>) -> VersionPath {
        VersionPath {
            test_id: self.test_id.clone(),
            version_id: version_id.into(),
        }
    }
}

impl VersionPath {
    pub fn parent(&self) -> TestPath {
        TestPath::new(self.test_id.clone())
    }

    pub fn section(&self, section_id: impl Into<String>) -> SectionPath {
        SectionPath {
            test_id: self.test_id.clone(),
            version_id: self.version_id.clone(),
            section_id: section_id.into(),
        }
    }
}

impl SectionPath {
    pub fn parent(&self) -> VersionPath {
        TestPath::new(self.test_id.clone()).version(self.version_id.clone())
    }

    pub fn question(&self, question_id: impl Into<String>) -> QuestionPath {
        QuestionPath {
            test_id: self.test_id.clone(),
            version_id: self.version_id.clone(),
            section_id: self.section_id.clone(),
            question_id: question_id.into(),
        }
    }
}

impl QuestionPath {
    pub fn parent(&self) -> SectionPath {
        TestPath::new(self.test_id.clone())
            .version(self.version_id.clone())
            .section(self.section_id.clone())
    }
}

fn find<'a, T: Identified>(items: &'a [Arc<T>], id: &str) -> Option<&'a T> {
    items.iter().find(|item| item.id() == id).map(Arc::as_ref)
}

fn find_mut<'a, T: Identified + Clone>(items: &'a mut [Arc<T>], id: &str) -> Option<&'a mut T> {
    items
        .iter_mut()
        .find(|item| item.id() == id)
        .map(Arc::make_mut)
}

impl Lens for TestPath {
    type Target = Test;

    fn get<'a>(&self, tests: &'a [Arc<Test>]) -> Option<&'a Test> {
        find(tests, &self.test_id)
    }

    fn get_mut<'a>(&self, tests: &'a mut [Arc<Test>]) -> Option<&'a mut Test> {
        find_mut(tests, &self.test_id)
    }
}

impl Lens for VersionPath {
    type Target = Version;

    fn get<'a>(&self, tests: &'a [Arc<Test>]) -> Option<&'a Version> {
        find(&self.parent().get(tests)?.versions, &self.version_id)
    }

    fn get_mut<'a>(&self, tests: &'a mut [Arc<Test>]) -> Option<&'a mut Version> {
        find_mut(&mut self.parent().get_mut(tests)?.versions, &self.version_id)
    }
}

impl Lens for SectionPath {
    type Target = Section;

    fn get<'a>(&self, tests: &'a [Arc<Test>]) -> Option<&'a Section> {
        find(&self.parent().get(tests)?.sections, &self.section_id)
    }

    fn get_mut<'a>(&self, tests: &'a mut [Arc<Test>]) -> Option<&'a mut Section> {
        find_mut(&mut self.parent().get_mut(tests)?.sections, &self.section_id)
    }
}

impl Lens for QuestionPath {
    type Target = Question;

    fn get<'a>(&self, tests: &'a [Arc<Test>]) -> Option<&'a Question> {
        find(&self.parent().get(tests)?.questions, &self.question_id)
    }

    fn get_mut<'a>(&self, tests: &'a mut [Arc<Test>]) -> Option<&'a mut Question> {
        find_mut(&mut self.parent().get_mut(tests)?.questions, &self.question_id)
    }
}

/// Read the node at `path`.
pub fn get_at_path<'a, L: Lens>(tests: &'a [Arc<Test>], path: &L) -> Option<&'a L::Target> {
    path.get(tests)
}

/// Apply `f` to the node at `path`, copying only the nodes along the path.
///
/// Returns `None` without copying anything when any segment is missing.
pub fn update_at_path<L: Lens, R>(
    tests: &mut [Arc<Test>],
    path: &L,
    f: impl FnOnce(&mut L::Target) -> R,
) -> Option<R> {
    path.get(tests)?;
    path.get_mut(tests).map(f)
}

/// Remove the item with `id` from `items`, returning it.
pub fn remove_by_id<T: Identified>(items: &mut Vec<T>, id: &str) -> Option<T> {
    let index = items.iter().position(|item| item.id() == id)?;
    Some(items.remove(index))
}
