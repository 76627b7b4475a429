use std::sync::Mutex;

use async_trait::async_trait;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::auth::repo::UserStore;
use crate::auth::repo_types::{NewUser, User};
use crate::error::StoreError;

/// In-memory [`UserStore`] with the same visibility and uniqueness rules as
/// the Postgres store.
#[derive(Default)]
pub struct InMemoryUserStore {
    users: Mutex<Vec<User>>,
}

impl InMemoryUserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Applies `f` to the stored row (live or not) and returns its result.
    pub fn modify<R>(&self, id: Uuid, f: impl FnOnce(&mut User) -> R) -> Option<R> {
        let mut users = self.users.lock().unwrap();
        users.iter_mut().find(|u| u.id == id).map(f)
    }

    /// Raw row lookup that ignores soft deletion.
    pub fn get_raw(&self, id: Uuid) -> Option<User> {
        self.users.lock().unwrap().iter().find(|u| u.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.users.lock().unwrap().len()
    }

    fn find_live(&self, pred: impl Fn(&User) -> bool) -> Option<User> {
        self.users
            .lock()
            .unwrap()
            .iter()
            .find(|u| u.is_live() && pred(u))
            .cloned()
    }
}

#[async_trait]
impl UserStore for InMemoryUserStore {
    async fn create(&self, new: NewUser) -> Result<User, StoreError> {
        let mut users = self.users.lock().unwrap();
        if users.iter().any(|u| u.is_live() && u.email == new.email) {
            return Err(StoreError::Conflict);
        }
        let now = OffsetDateTime::now_utc();
        let user = User {
            id: Uuid::new_v4(),
            email: new.email,
            password_hash: new.password_hash,
            is_verified: new.is_verified,
            verification_token: new.verification_token,
            verification_expires_at: new.verification_expires_at,
            redeemed_verification_token: None,
            password_reset_token: None,
            password_reset_expires_at: None,
            first_name: new.first_name,
            last_name: new.last_name,
            school_name: String::new(),
            skills: Vec::new(),
            created_at: now,
            updated_at: now,
            deleted_at: None,
        };
        users.push(user.clone());
        Ok(user)
    }

    async fn set_password_reset_token(
        &self,
        id: Uuid,
        token: &str,
        expires_at: OffsetDateTime,
    ) -> Result<(), StoreError> {
        let mut users = self.users.lock().unwrap();
        let row = users
            .iter_mut()
            .find(|u| u.id == id && u.is_live())
            .ok_or(StoreError::NotFound)?;
        row.password_reset_token = Some(token.to_string());
        row.password_reset_expires_at = Some(expires_at);
        row.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn consume_password_reset(
        &self,
        id: Uuid,
        token: &str,
        password_hash: &str,
    ) -> Result<(), StoreError> {
        let mut users = self.users.lock().unwrap();
        let row = users
            .iter_mut()
            .find(|u| {
                u.id == id && u.is_live() && u.password_reset_token.as_deref() == Some(token)
            })
            .ok_or(StoreError::NotFound)?;
        row.password_hash = Some(password_hash.to_string());
        row.password_reset_token = None;
        row.password_reset_expires_at = None;
        row.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    async fn mark_verified(&self, id: Uuid, token: &str) -> Result<Option<User>, StoreError> {
        let mut users = self.users.lock().unwrap();
        let Some(row) = users
            .iter_mut()
            .find(|u| u.id == id && u.is_live() && !u.is_verified)
        else {
            return Ok(None);
        };
        row.is_verified = true;
        row.verification_token = None;
        row.verification_expires_at = None;
        row.redeemed_verification_token = Some(token.to_string());
        row.updated_at = OffsetDateTime::now_utc();
        Ok(Some(row.clone()))
    }

    async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        Ok(self.find_live(|u| u.id == id))
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<User>, StoreError> {
        Ok(self.find_live(|u| u.email == email))
    }

    async fn find_by_verification_token(&self, token: &str) -> Result<Option<User>, StoreError> {
        Ok(self.find_live(|u| {
            u.verification_token.as_deref() == Some(token)
                || u.redeemed_verification_token.as_deref() == Some(token)
        }))
    }

    async fn find_by_password_reset_token(
        &self,
        token: &str,
    ) -> Result<Option<User>, StoreError> {
        Ok(self.find_live(|u| u.password_reset_token.as_deref() == Some(token)))
    }

    async fn soft_delete_unverified_before(
        &self,
        cutoff: OffsetDateTime,
    ) -> Result<u64, StoreError> {
        let now = OffsetDateTime::now_utc();
        let mut count = 0;
        for u in self.users.lock().unwrap().iter_mut() {
            if !u.is_verified && u.is_live() && u.created_at < cutoff {
                u.deleted_at = Some(now);
                count += 1;
            }
        }
        Ok(count)
    }

    async fn permanently_delete_before(&self, cutoff: OffsetDateTime) -> Result<u64, StoreError> {
        let mut users = self.users.lock().unwrap();
        let before = users.len();
        users.retain(|u| !matches!(u.deleted_at, Some(at) if at < cutoff));
        Ok((before - users.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::Duration;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.into(),
            password_hash: Some("$argon2id$fake".into()),
            is_verified: false,
            verification_token: Some(format!("tok-{email}")),
            verification_expires_at: Some(OffsetDateTime::now_utc() + Duration::days(7)),
            first_name: String::new(),
            last_name: String::new(),
        }
    }

    #[tokio::test]
    async fn email_is_unique_among_live_users() {
        let store = InMemoryUserStore::new();
        store.create(new_user("bob@x.com")).await.unwrap();
        let err = store.create(new_user("bob@x.com")).await.unwrap_err();
        assert!(matches!(err, StoreError::Conflict));
    }

    #[tokio::test]
    async fn soft_deleted_users_are_invisible_and_free_their_email() {
        let store = InMemoryUserStore::new();
        let user = store.create(new_user("bob@x.com")).await.unwrap();
        store.modify(user.id, |u| {
            u.created_at = OffsetDateTime::now_utc() - Duration::days(8)
        });

        let cutoff = OffsetDateTime::now_utc() - Duration::days(7);
        assert_eq!(store.soft_delete_unverified_before(cutoff).await.unwrap(), 1);
        // Idempotent.
        assert_eq!(store.soft_delete_unverified_before(cutoff).await.unwrap(), 0);

        assert!(store.find_by_email("bob@x.com").await.unwrap().is_none());
        assert!(store.find_by_id(user.id).await.unwrap().is_none());
        assert!(store
            .find_by_verification_token("tok-bob@x.com")
            .await
            .unwrap()
            .is_none());

        let again = store.create(new_user("bob@x.com")).await.unwrap();
        assert_ne!(again.id, user.id);
    }

    #[tokio::test]
    async fn permanent_delete_only_removes_old_tombstones() {
        let store = InMemoryUserStore::new();
        let old = store.create(new_user("old@x.com")).await.unwrap();
        let recent = store.create(new_user("recent@x.com")).await.unwrap();
        let live = store.create(new_user("live@x.com")).await.unwrap();
        let now = OffsetDateTime::now_utc();
        store.modify(old.id, |u| u.deleted_at = Some(now - Duration::days(30)));
        store.modify(recent.id, |u| u.deleted_at = Some(now - Duration::days(2)));

        let cutoff = now - Duration::days(23);
        assert_eq!(store.permanently_delete_before(cutoff).await.unwrap(), 1);
        assert_eq!(store.permanently_delete_before(cutoff).await.unwrap(), 0);
        assert!(store.get_raw(old.id).is_none());
        assert!(store.get_raw(recent.id).is_some());
        assert!(store.get_raw(live.id).is_some());
    }

    #[tokio::test]
    async fn mark_verified_succeeds_once() {
        let store = InMemoryUserStore::new();
        let user = store.create(new_user("bob@x.com")).await.unwrap();
        let verified = store
            .mark_verified(user.id, "tok-bob@x.com")
            .await
            .unwrap()
            .expect("first verification wins");
        assert!(verified.is_verified);
        assert!(verified.verification_token.is_none());
        assert!(store
            .mark_verified(user.id, "tok-bob@x.com")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn reset_token_write_on_deleted_user_reports_not_found() {
        let store = InMemoryUserStore::new();
        let user = store.create(new_user("bob@x.com")).await.unwrap();
        store.modify(user.id, |u| u.deleted_at = Some(OffsetDateTime::now_utc()));
        assert!(matches!(
            store
                .set_password_reset_token(user.id, "tok", OffsetDateTime::now_utc())
                .await,
            Err(StoreError::NotFound)
        ));
    }

    #[tokio::test]
    async fn reset_token_write_leaves_verification_alone() {
        let store = InMemoryUserStore::new();
        let user = store.create(new_user("bob@x.com")).await.unwrap();
        store.modify(user.id, |u| u.verification_token = Some("verify".into()));
        // Verification commits between a read and the reset write.
        store.mark_verified(user.id, "verify").await.unwrap().unwrap();
        store
            .set_password_reset_token(user.id, "reset", OffsetDateTime::now_utc())
            .await
            .unwrap();

        let row = store.get_raw(user.id).unwrap();
        assert!(row.is_verified);
        assert!(row.verification_token.is_none());
        assert_eq!(row.password_reset_token.as_deref(), Some("reset"));
    }

    #[tokio::test]
    async fn reset_token_is_consumed_once() {
        let store = InMemoryUserStore::new();
        let user = store.create(new_user("bob@x.com")).await.unwrap();
        store
            .set_password_reset_token(user.id, "reset", OffsetDateTime::now_utc())
            .await
            .unwrap();

        store
            .consume_password_reset(user.id, "reset", "hash-1")
            .await
            .unwrap();
        assert!(matches!(
            store.consume_password_reset(user.id, "reset", "hash-2").await,
            Err(StoreError::NotFound)
        ));

        let row = store.get_raw(user.id).unwrap();
        assert_eq!(row.password_hash.as_deref(), Some("hash-1"));
        assert!(row.password_reset_token.is_none());
        assert!(row.password_reset_expires_at.is_none());
    }
}
