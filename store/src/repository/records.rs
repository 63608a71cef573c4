//! Attempts and question-bank items: flat collections keyed by id.

use super::Repository;
use crate::lens::remove_by_id;
use crate::model::{new_id, Attempt, QuestionBankItem};

impl Repository {
    // ------------------------------------------------------------------
    // Attempts
    // ------------------------------------------------------------------

    /// Insert or replace an attempt by id. An empty id gets a fresh one.
    /// Returns the stored id.
    pub fn save_attempt(&self, mut attempt: Attempt) -> String {
        if attempt.id.is_empty() {
            attempt.id = new_id();
        }
        let id = attempt.id.clone();
        self.store.mutate(|snap| {
            match snap.attempts.iter_mut().find(|a| a.id == attempt.id) {
                Some(existing) => *existing = attempt,
                None => snap.attempts.push(attempt),
            }
            Some(())
        });
        id
    }

    pub fn get_attempt(&self, id: &str) -> Option<Attempt> {
        self.store
            .snapshot()
            .attempts
            .iter()
            .find(|a| a.id == id)
            .cloned()
    }

    pub fn attempts_for_test(&self, test_id: &str) -> Vec<Attempt> {
        self.store
            .snapshot()
            .attempts
            .iter()
            .filter(|a| a.test_id == test_id)
            .cloned()
            .collect()
    }

    pub fn update_attempt(&self, id: &str, f: impl FnOnce(&mut Attempt)) -> bool {
        self.store
            .mutate(|snap| {
                let attempt = snap.attempts.iter_mut().find(|a| a.id == id)?;
                f(attempt);
                attempt.id = id.to_string();
                Some(())
            })
            .is_some()
    }

    pub fn delete_attempt(&self, id: &str) -> bool {
        self.store
            .mutate(|snap| remove_by_id(&mut snap.attempts, id))
            .is_some()
    }

    // ------------------------------------------------------------------
    // Question bank
    // ------------------------------------------------------------------

    pub fn list_bank_items(&self) -> Vec<QuestionBankItem> {
        self.store.question_bank()
    }

    pub fn get_bank_item(&self, id: &str) -> Option<QuestionBankItem> {
        self.store
            .snapshot()
            .question_bank
            .iter()
            .find(|item| item.id == id)
            .cloned()
    }

    /// Append a bank item under a fresh id and creation time. Returns the id.
    pub fn add_bank_item(&self, mut item: QuestionBankItem) -> String {
        item.id = new_id();
        item.created_at = self.now();
        let id = item.id.clone();
        self.store.mutate(|snap| {
            snap.question_bank.push(item);
            Some(())
        });
        id
    }

    pub fn update_bank_item(&self, id: &str, f: impl FnOnce(&mut QuestionBankItem)) -> bool {
        self.store
            .mutate(|snap| {
                let item = snap.question_bank.iter_mut().find(|item| item.id == id)?;
                f(item);
                item.id = id.to_string();
                Some(())
            })
            .is_some()
    }

    pub fn delete_bank_item(&self, id: &str) -> bool {
        self.store
            .mutate(|snap| remove_by_id(&mut snap.question_bank, id))
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Extra;
    use crate::store::test_support::*;
    use serde_json::json;
    use std::sync::atomic::Ordering;

    fn attempt(id: &str, test_id: &str) -> Attempt {
        Attempt {
            id: id.to_string(),
            test_id: test_id.to_string(),
            version_id: "v1".to_string(),
            status: "in_progress".to_string(),
            answers: Default::default(),
            audio_answers: Default::default(),
            violations: vec![],
            resume: None,
            started_at: None,
            submitted_at: None,
            extra: Extra::new(),
        }
    }

    fn bank_item(prompt: &str) -> QuestionBankItem {
        QuestionBankItem {
            id: String::new(),
            kind: "MCQ".to_string(),
            prompt: prompt.to_string(),
            created_at: String::new(),
            extra: Extra::new(),
        }
    }

    #[test]
    fn test_save_attempt_upserts() {
        let fx = fixture();
        let repo = Repository::new(fx.store.clone());

        let id = repo.save_attempt(attempt("a1", "t1"));
        assert_eq!(id, "a1");
        let mut submitted = attempt("a1", "t1");
        submitted.status = "submitted".to_string();
        repo.save_attempt(submitted);

        let attempts = fx.store.attempts();
        assert_eq!(attempts.len(), 1);
        assert_eq!(attempts[0].status, "submitted");
    }

    #[test]
    fn test_save_attempt_assigns_missing_id() {
        let fx = fixture();
        let repo = Repository::new(fx.store.clone());
        let id = repo.save_attempt(attempt("", "t1"));
        assert!(!id.is_empty());
        assert!(repo.get_attempt(&id).is_some());
    }

    #[test]
    fn test_attempts_filtered_by_test() {
        let fx = fixture();
        let repo = Repository::new(fx.store.clone());
        repo.save_attempt(attempt("a1", "t1"));
        repo.save_attempt(attempt("a2", "t2"));
        repo.save_attempt(attempt("a3", "t1"));

        let ids: Vec<_> = repo.attempts_for_test("t1").into_iter().map(|a| a.id).collect();
        assert_eq!(ids, vec!["a1", "a3"]);
    }

    #[test]
    fn test_update_and_delete_attempt() {
        let fx = fixture();
        let repo = Repository::new(fx.store.clone());
        repo.save_attempt(attempt("a1", "t1"));
        let notified = count_notifications(&fx.store);

        assert!(repo.update_attempt("a1", |a| {
            a.answers.insert("q1".to_string(), json!("B"));
        }));
        assert!(!repo.update_attempt("missing", |_| {}));
        assert_eq!(notified.load(Ordering::SeqCst), 1);
        assert_eq!(repo.get_attempt("a1").unwrap().answers["q1"], json!("B"));

        assert!(repo.delete_attempt("a1"));
        assert!(!repo.delete_attempt("a1"));
        assert!(fx.store.attempts().is_empty());
    }

    #[test]
    fn test_bank_item_lifecycle() {
        let fx = fixture();
        let repo = Repository::new(fx.store.clone());

        let id = repo.add_bank_item(bank_item("Capital of France?"));
        let stored = repo.get_bank_item(&id).unwrap();
        assert_eq!(stored.created_at, "2023-11-14T22:13:20.000Z");

        assert!(repo.update_bank_item(&id, |item| item.prompt = "Capital of Spain?".into()));
        assert_eq!(repo.list_bank_items()[0].prompt, "Capital of Spain?");

        assert!(repo.delete_bank_item(&id));
        assert!(!repo.delete_bank_item(&id));
        assert!(!repo.update_bank_item(&id, |_| {}));
    }
}
