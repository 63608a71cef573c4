//! Scoring profiles and the single-default rule.
//!
//! Exactly one profile is default at every commit: promoting one demotes all
//! others in the same mutation, the current default cannot be demoted
//! directly or deleted, and the seeded profile is never deletable.

use super::Repository;
use crate::model::{empty_object, new_id, Extra, ScoringProfile};
use serde_json::Value;

/// Fields for a new scoring profile.
#[derive(Debug, Clone, Default)]
pub struct NewScoringProfile {
    pub name: String,
    pub is_default: bool,
    pub mcq_config: Option<Value>,
    pub short_config: Option<Value>,
    pub speaking_rubrics: Vec<Value>,
}

fn make_sole_default(profiles: &mut [ScoringProfile], id: &str) {
    for profile in profiles.iter_mut() {
        profile.is_default = profile.id == id;
    }
}

impl Repository {
    pub fn list_scoring_profiles(&self) -> Vec<ScoringProfile> {
        self.store.scoring_profiles()
    }

    pub fn get_scoring_profile(&self, id: &str) -> Option<ScoringProfile> {
        self.store
            .snapshot()
            .scoring_profiles
            .iter()
            .find(|p| p.id == id)
            .cloned()
    }

    /// The profile currently flagged as default.
    pub fn default_scoring_profile(&self) -> Option<ScoringProfile> {
        self.store
            .snapshot()
            .scoring_profiles
            .iter()
            .find(|p| p.is_default)
            .cloned()
    }

    /// Add a profile. When it is created as default, every other profile is
    /// demoted in the same change. Returns the new id.
    pub fn add_scoring_profile(&self, new: NewScoringProfile) -> String {
        let profile = ScoringProfile {
            id: new_id(),
            name: new.name,
            is_default: new.is_default,
            mcq_config: new.mcq_config.unwrap_or_else(empty_object),
            short_config: new.short_config.unwrap_or_else(empty_object),
            speaking_rubrics: new.speaking_rubrics,
            created_at: self.now(),
            extra: Extra::new(),
        };
        let id = profile.id.clone();
        self.store.mutate(|snap| {
            let promote = profile.is_default;
            snap.scoring_profiles.push(profile);
            if promote {
                make_sole_default(&mut snap.scoring_profiles, &id);
            }
            Some(())
        });
        id
    }

    /// Edit a profile. Setting `is_default` promotes it; clearing the flag on
    /// the current default is ignored since some profile must stay default.
    pub fn update_scoring_profile(&self, id: &str, f: impl FnOnce(&mut ScoringProfile)) -> bool {
        self.store
            .mutate(|snap| {
                let profile = snap.scoring_profiles.iter_mut().find(|p| p.id == id)?;
                let was_default = profile.is_default;
                f(profile);
                profile.id = id.to_string();
                if was_default && !profile.is_default {
                    tracing::debug!(profile_id = id, "Keeping default flag on the sole default profile");
                    profile.is_default = true;
                }
                if profile.is_default && !was_default {
                    make_sole_default(&mut snap.scoring_profiles, id);
                }
                Some(())
            })
            .is_some()
    }

    /// Make `id` the only default profile. False for an unknown id.
    pub fn set_default_scoring_profile(&self, id: &str) -> bool {
        self.store
            .mutate(|snap| {
                if !snap.scoring_profiles.iter().any(|p| p.id == id) {
                    return None;
                }
                make_sole_default(&mut snap.scoring_profiles, id);
                Some(())
            })
            .is_some()
    }

    /// Delete a profile. Refused for the current default and for the seeded
    /// profile.
    pub fn delete_scoring_profile(&self, id: &str) -> bool {
        self.store
            .mutate(|snap| {
                let index = snap.scoring_profiles.iter().position(|p| p.id == id)?;
                let profile = &snap.scoring_profiles[index];
                if profile.is_default || profile.is_seeded() {
                    tracing::debug!(profile_id = id, "Refusing to delete protected scoring profile");
                    return None;
                }
                Some(snap.scoring_profiles.remove(index))
            })
            .is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SEEDED_PROFILE_ID;
    use crate::store::test_support::*;

    fn defaults(repo: &Repository) -> Vec<String> {
        repo.list_scoring_profiles()
            .into_iter()
            .filter(|p| p.is_default)
            .map(|p| p.id)
            .collect()
    }

    fn named(name: &str, is_default: bool) -> NewScoringProfile {
        NewScoringProfile {
            name: name.to_string(),
            is_default,
            ..Default::default()
        }
    }

    #[test]
    fn test_fresh_store_has_seeded_default() {
        let fx = fixture();
        let repo = Repository::new(fx.store.clone());
        assert_eq!(defaults(&repo), vec![SEEDED_PROFILE_ID]);
    }

    #[test]
    fn test_set_default_flips_siblings() {
        let fx = fixture();
        let repo = Repository::new(fx.store.clone());
        let p1 = repo.add_scoring_profile(named("P1", true));
        let p2 = repo.add_scoring_profile(named("P2", false));
        assert_eq!(defaults(&repo), vec![p1.clone()]);

        assert!(repo.set_default_scoring_profile(&p2));
        assert!(!repo.get_scoring_profile(&p1).unwrap().is_default);
        assert!(repo.get_scoring_profile(&p2).unwrap().is_default);
        assert_eq!(defaults(&repo), vec![p2]);

        assert!(!repo.set_default_scoring_profile("missing"));
    }

    #[test]
    fn test_cannot_delete_default_or_seeded() {
        let fx = fixture();
        let repo = Repository::new(fx.store.clone());
        let custom = repo.add_scoring_profile(named("Custom", true));

        assert!(!repo.delete_scoring_profile(&custom));
        assert!(!repo.delete_scoring_profile(SEEDED_PROFILE_ID));
        assert_eq!(repo.list_scoring_profiles().len(), 2);

        assert!(repo.set_default_scoring_profile(SEEDED_PROFILE_ID));
        assert!(repo.delete_scoring_profile(&custom));
        assert!(!repo.delete_scoring_profile(&custom));
    }

    #[test]
    fn test_update_promotes_and_refuses_demotion() {
        let fx = fixture();
        let repo = Repository::new(fx.store.clone());
        let other = repo.add_scoring_profile(named("Other", false));

        assert!(repo.update_scoring_profile(SEEDED_PROFILE_ID, |p| p.is_default = false));
        assert_eq!(defaults(&repo), vec![SEEDED_PROFILE_ID]);

        assert!(repo.update_scoring_profile(&other, |p| {
            p.is_default = true;
            p.name = "Renamed".to_string();
        }));
        assert_eq!(defaults(&repo), vec![other.clone()]);
        assert_eq!(repo.default_scoring_profile().unwrap().name, "Renamed");
        assert!(!repo.update_scoring_profile("missing", |_| {}));
    }

    #[test]
    fn test_invariant_holds_across_sequence() {
        let fx = fixture();
        let repo = Repository::new(fx.store.clone());
        let a = repo.add_scoring_profile(named("A", false));
        let b = repo.add_scoring_profile(named("B", true));
        repo.set_default_scoring_profile(&a);
        repo.delete_scoring_profile(&b);
        repo.update_scoring_profile(&a, |p| p.is_default = false);
        let c = repo.add_scoring_profile(named("C", true));
        repo.delete_scoring_profile(&c);
        repo.delete_scoring_profile(&a);

        assert_eq!(defaults(&repo).len(), 1);
        let default_id = defaults(&repo).remove(0);
        assert!(!repo.delete_scoring_profile(&default_id));
    }
}
