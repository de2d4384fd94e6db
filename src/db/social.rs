use crate::db::models::{NewSocialAccount, SocialAccount};
use crate::db::sqlite::{Storage, now, require_non_empty};
use crate::error::VetdeskError;
use crate::social::provider::Provider;

impl Storage {
    /// Upsert by unique (provider, account_id); reconnecting refreshes the tokens.
    pub async fn upsert_social_account(
        &self,
        new: NewSocialAccount,
    ) -> Result<SocialAccount, VetdeskError> {
        require_non_empty("account_id", &new.account_id)?;
        require_non_empty("access_token", &new.access_token)?;
        let ts = now();
        let account = sqlx::query_as::<_, SocialAccount>(
            r#"
            INSERT INTO social_accounts (
                provider, account_id, display_name, access_token, refresh_token,
                token_secret, scope, expires_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(provider, account_id) DO UPDATE SET
                display_name = COALESCE(excluded.display_name, display_name),
                access_token = excluded.access_token,
                refresh_token = COALESCE(excluded.refresh_token, refresh_token),
                token_secret = excluded.token_secret,
                scope = COALESCE(excluded.scope, scope),
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            RETURNING *
            "#,
        )
        .bind(new.provider)
        .bind(new.account_id)
        .bind(new.display_name)
        .bind(new.access_token)
        .bind(new.refresh_token)
        .bind(new.token_secret)
        .bind(new.scope)
        .bind(new.expires_at)
        .bind(ts)
        .bind(ts)
        .fetch_one(self.pool())
        .await?;
        Ok(account)
    }

    pub async fn get_social_account(&self, id: i64) -> Result<SocialAccount, VetdeskError> {
        sqlx::query_as::<_, SocialAccount>("SELECT * FROM social_accounts WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?
            .ok_or_else(|| VetdeskError::not_found("social account", id))
    }

    pub async fn list_social_accounts(
        &self,
        provider: Option<Provider>,
    ) -> Result<Vec<SocialAccount>, VetdeskError> {
        let rows = match provider {
            Some(p) => {
                sqlx::query_as::<_, SocialAccount>(
                    "SELECT * FROM social_accounts WHERE provider = ? ORDER BY id",
                )
                .bind(p)
                .fetch_all(self.pool())
                .await?
            }
            None => {
                sqlx::query_as::<_, SocialAccount>(
                    "SELECT * FROM social_accounts ORDER BY provider, id",
                )
                .fetch_all(self.pool())
                .await?
            }
        };
        Ok(rows)
    }

    pub async fn delete_social_account(&self, id: i64) -> Result<(), VetdeskError> {
        let removed = sqlx::query("DELETE FROM social_accounts WHERE id = ?")
            .bind(id)
            .execute(self.pool())
            .await?
            .rows_affected();
        if removed == 0 {
            return Err(VetdeskError::not_found("social account", id));
        }
        Ok(())
    }
}
