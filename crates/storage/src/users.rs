use chrono::Utc;
use uuid::Uuid;

use vx_domain::{Error, Result};

use crate::models::{User, UserUpdate};
use crate::store::StorageService;

/// Repository handle for user records, scoped to one service.
pub struct UserRepo<'a> {
    svc: &'a StorageService,
}

impl<'a> UserRepo<'a> {
    pub(crate) fn new(svc: &'a StorageService) -> Self {
        Self { svc }
    }

    /// Create a user. Phone numbers are unique.
    pub fn create(&self, phone_number: &str, full_name: Option<String>) -> Result<User> {
        let now = Utc::now();
        let user = User {
            user_id: Uuid::new_v4().to_string(),
            phone_number: phone_number.to_owned(),
            full_name,
            voice_preferences: Default::default(),
            created_at: now,
            updated_at: now,
        };

        {
            let mut users = self.svc.state.users.write();
            if users.values().any(|u| u.phone_number == phone_number) {
                return Err(Error::Storage(format!(
                    "user with phone {phone_number} already exists"
                )));
            }
            users.insert(user.user_id.clone(), user.clone());
        }
        self.svc.flush_users()?;

        tracing::info!(user_id = %user.user_id, "user created");
        Ok(user)
    }

    pub fn get_by_id(&self, user_id: &str) -> Result<Option<User>> {
        Ok(self.svc.state.users.read().get(user_id).cloned())
    }

    pub fn get_by_phone(&self, phone_number: &str) -> Result<Option<User>> {
        Ok(self
            .svc
            .state
            .users
            .read()
            .values()
            .find(|u| u.phone_number == phone_number)
            .cloned())
    }

    pub fn update(&self, user_id: &str, fields: UserUpdate) -> Result<Option<User>> {
        let updated = {
            let mut users = self.svc.state.users.write();
            match users.get_mut(user_id) {
                None => None,
                Some(user) => {
                    if let Some(name) = fields.full_name {
                        user.full_name = Some(name);
                    }
                    if let Some(prefs) = fields.voice_preferences {
                        user.voice_preferences = prefs;
                    }
                    user.updated_at = Utc::now();
                    Some(user.clone())
                }
            }
        };
        if updated.is_some() {
            self.svc.flush_users()?;
            tracing::info!(user_id, "user updated");
        }
        Ok(updated)
    }

    /// Delete a user and all of their tasks.
    pub fn delete(&self, user_id: &str) -> Result<bool> {
        let removed = self.svc.state.users.write().remove(user_id).is_some();
        if removed {
            self.svc
                .state
                .tasks
                .write()
                .retain(|_, t| t.user_id != user_id);
            self.svc.flush_users()?;
            self.svc.flush_tasks()?;
            tracing::info!(user_id, "user deleted");
        }
        Ok(removed)
    }

    /// Get an existing user by phone or create one. Returns `(user, created)`.
    pub fn get_or_create(
        &self,
        phone_number: &str,
        full_name: Option<String>,
    ) -> Result<(User, bool)> {
        if let Some(existing) = self.get_by_phone(phone_number)? {
            return Ok((existing, false));
        }
        let user = self.create(phone_number, full_name)?;
        Ok((user, true))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_numbers_are_unique() {
        let store = StorageService::in_memory();
        let (users, _) = store.repositories();
        users.create("+15550100", Some("Alice".into())).unwrap();
        assert!(users.create("+15550100", Some("Imposter".into())).is_err());
    }

    #[test]
    fn get_or_create_returns_created_flag() {
        let store = StorageService::in_memory();
        let (users, _) = store.repositories();

        let (user, created) = users.get_or_create("+15550101", Some("Bob".into())).unwrap();
        assert!(created);

        let (same, created) = users.get_or_create("+15550101", None).unwrap();
        assert!(!created);
        assert_eq!(same.user_id, user.user_id);
        assert_eq!(same.full_name.as_deref(), Some("Bob"));
    }

    #[test]
    fn update_and_delete() {
        let store = StorageService::in_memory();
        let (users, tasks) = store.repositories();
        let user = users.create("+15550102", None).unwrap();
        tasks.create(&user.user_id, "orphan check", 3, None).unwrap();

        let updated = users
            .update(
                &user.user_id,
                UserUpdate {
                    full_name: Some("Carol".into()),
                    ..Default::default()
                },
            )
            .unwrap()
            .unwrap();
        assert_eq!(updated.full_name.as_deref(), Some("Carol"));

        assert!(users.delete(&user.user_id).unwrap());
        assert!(users.get_by_id(&user.user_id).unwrap().is_none());
        // Tasks go with the user.
        assert_eq!(tasks.get_open_count(&user.user_id).unwrap(), 0);
        assert!(!users.delete(&user.user_id).unwrap());
    }
}
