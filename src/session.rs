//! Session state: the bearer token and the user record.
//!
//! Both are present together or not at all. Credentials are rehydrated from
//! the local store at startup, written on login and removed on logout or
//! when the server reports the token invalid (HTTP 401).

use std::sync::{Mutex, MutexGuard, PoisonError};

use color_eyre::Result;
use tracing::warn;

use crate::catalog::types::User;
use crate::db::Database;

/// Fixed keys in the local store.
const TOKEN_KEY: &str = "token";
const USER_KEY: &str = "user";

#[derive(Debug, Clone, PartialEq)]
pub struct Credentials {
  pub token: String,
  pub user: User,
}

pub struct Session {
  db: Database,
  creds: Mutex<Option<Credentials>>,
}

impl Session {
  /// Rehydrate from the local store. A token without a stored user record
  /// (or the other way around) is treated as no session at all.
  pub fn load(db: Database) -> Result<Self> {
    let token = db.get(TOKEN_KEY)?;
    let user = db.get(USER_KEY)?;
    let creds = match (token, user) {
      (Some(token), Some(user_json)) => serde_json::from_str::<User>(&user_json)
        .ok()
        .map(|user| Credentials { token, user }),
      _ => None,
    };
    Ok(Self {
      db,
      creds: Mutex::new(creds),
    })
  }

  fn creds(&self) -> MutexGuard<'_, Option<Credentials>> {
    self.creds.lock().unwrap_or_else(PoisonError::into_inner)
  }

  pub fn token(&self) -> Option<String> {
    self.creds().as_ref().map(|c| c.token.clone())
  }

  pub fn user(&self) -> Option<User> {
    self.creds().as_ref().map(|c| c.user.clone())
  }

  pub fn is_authenticated(&self) -> bool {
    self.creds().is_some()
  }

  /// Persist a fresh login.
  pub fn store(&self, token: String, user: User) -> Result<()> {
    self.db.set(TOKEN_KEY, &token)?;
    self.db.set(USER_KEY, &serde_json::to_string(&user)?)?;
    *self.creds() = Some(Credentials { token, user });
    Ok(())
  }

  /// Drop the session, both in memory and in the local store.
  pub fn clear(&self) {
    if let Err(err) = self
      .db
      .delete(TOKEN_KEY)
      .and_then(|()| self.db.delete(USER_KEY))
    {
      warn!(%err, "failed to clear persisted session");
    }
    *self.creds() = None;
  }
}
