use cove_shared::{User, UserId};
use rusqlite::{params, OptionalExtension};

use crate::database::Database;
use crate::error::Result;

impl Database {
    /// Persist the current-user record, replacing any existing one.
    pub fn save_user(&self, user: &User) -> Result<()> {
        self.conn().execute(
            "INSERT OR REPLACE INTO profile (slot, user_id, user_name) VALUES (0, ?1, ?2)",
            params![user.id.as_str(), user.name],
        )?;
        Ok(())
    }

    /// The current user, if onboarding has completed.
    pub fn current_user(&self) -> Result<Option<User>> {
        let user = self
            .conn()
            .query_row(
                "SELECT user_id, user_name FROM profile WHERE slot = 0",
                [],
                |row| {
                    Ok(User {
                        id: UserId::new(row.get::<_, String>(0)?),
                        name: row.get(1)?,
                    })
                },
            )
            .optional()?;
        Ok(user)
    }
}
