use rusqlite::params;
use tracing::info;

use super::schema::now_iso8601;
use super::{PlayerProfile, QuizStore, StoreError, is_unique_violation, new_id};

const DEFAULT_COUNTRY: &str = "PT";

impl QuizStore {
    /// Register a persistent player identity keyed by an external reference.
    pub fn register_player(&self, external_ref: &str, display_name: &str) -> Result<PlayerProfile, StoreError> {
        let external_ref = external_ref.trim();
        let display_name = display_name.trim();
        if external_ref.is_empty() || display_name.is_empty() {
            return Err(StoreError::Invalid("externalRef and displayName are required".into()));
        }

        let profile = PlayerProfile {
            player_id: new_id(),
            external_ref: external_ref.to_string(),
            preferred_name: display_name.to_string(),
            country: DEFAULT_COUNTRY.to_string(),
            created_at: now_iso8601(),
        };

        let conn = self.lock()?;
        conn.execute(
            "INSERT INTO player_profile (player_id, external_ref, preferred_name, country, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                profile.player_id.to_string(),
                profile.external_ref,
                profile.preferred_name,
                profile.country,
                profile.created_at,
            ],
        )
        .map_err(|e| {
            if is_unique_violation(&e) {
                StoreError::Conflict(format!("externalRef '{external_ref}' is already registered"))
            } else {
                e.into()
            }
        })?;

        info!(player_id = %profile.player_id, "player registered");
        Ok(profile)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_defaults_country() {
        let store = QuizStore::in_memory().unwrap();
        let p = store.register_player(" auth0|42 ", " Rita ").unwrap();
        assert_eq!(p.external_ref, "auth0|42");
        assert_eq!(p.preferred_name, "Rita");
        assert_eq!(p.country, "PT");
    }

    #[test]
    fn blank_fields_are_invalid() {
        let store = QuizStore::in_memory().unwrap();
        assert!(matches!(store.register_player("", "x"), Err(StoreError::Invalid(_))));
        assert!(matches!(store.register_player("x", "   "), Err(StoreError::Invalid(_))));
    }

    #[test]
    fn duplicate_external_ref_conflicts() {
        let store = QuizStore::in_memory().unwrap();
        store.register_player("dup", "A").unwrap();
        assert!(matches!(store.register_player("dup", "B"), Err(StoreError::Conflict(_))));
    }
}
