use secrecy::{ExposeSecret, Secret};
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;

use mailward_core::{
    AccountStore, AccountStoreError, AccountTier, DirectoryStore, DirectoryStoreError,
    NewTfaFactor, StoredCredential, TfaFactor, TfaFactorFilter, TfaMaterial, TfaMechanism,
    TfaStore, TfaStoreError, Username,
};

/// Postgres-backed directory over the panel schema: `admin` and `mailbox`
/// carry the credential rows, `tfa` the factor rows, and `domain`,
/// `alias_domain`, `domain_admins` and `alias` the ownership relations.
///
/// Yubico material is persisted the way the panel always has, as a single
/// `client_id:api_key:modhex_prefix` string in the `secret` column.
#[derive(Clone)]
pub struct PgDirectoryStore {
    pool: PgPool,
}

impl PgDirectoryStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait::async_trait]
impl AccountStore for PgDirectoryStore {
    async fn find_credentials(
        &self,
        tier: AccountTier,
        username: &Username,
    ) -> Result<Vec<StoredCredential>, AccountStoreError> {
        let query = match tier {
            AccountTier::SuperAdmin => {
                "SELECT password, active FROM admin WHERE username = $1 AND superadmin = TRUE"
            }
            AccountTier::DomainAdmin => {
                "SELECT password, active FROM admin WHERE username = $1 AND superadmin = FALSE"
            }
            AccountTier::Mailbox => "SELECT password, active FROM mailbox WHERE username = $1",
        };
        let rows = sqlx::query(query)
            .bind(username.as_str())
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AccountStoreError::UnexpectedError(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                Ok(StoredCredential {
                    password_hash: row
                        .try_get("password")
                        .map_err(|e| AccountStoreError::UnexpectedError(e.to_string()))?,
                    active: row
                        .try_get("active")
                        .map_err(|e| AccountStoreError::UnexpectedError(e.to_string()))?,
                })
            })
            .collect()
    }

    async fn set_mailbox_password(
        &self,
        username: &Username,
        password_hash: &str,
    ) -> Result<(), AccountStoreError> {
        sqlx::query("UPDATE mailbox SET password = $2 WHERE username = $1")
            .bind(username.as_str())
            .bind(password_hash)
            .execute(&self.pool)
            .await
            .map_err(|e| AccountStoreError::UnexpectedError(e.to_string()))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl TfaStore for PgDirectoryStore {
    async fn active_mechanism(&self, username: &Username) -> Result<TfaMechanism, TfaStoreError> {
        let row = sqlx::query(
            "SELECT authmech FROM tfa WHERE username = $1 AND active = TRUE ORDER BY id LIMIT 1",
        )
        .bind(username.as_str())
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| TfaStoreError::UnexpectedError(e.to_string()))?;

        match row {
            None => Ok(TfaMechanism::None),
            Some(row) => {
                let tag: String = row
                    .try_get("authmech")
                    .map_err(|e| TfaStoreError::UnexpectedError(e.to_string()))?;
                TfaMechanism::parse(&tag)
                    .ok_or_else(|| TfaStoreError::UnexpectedError(format!("unknown mechanism {tag}")))
            }
        }
    }

    async fn list_factors(
        &self,
        username: &Username,
        mechanism: Option<TfaMechanism>,
    ) -> Result<Vec<TfaFactor>, TfaStoreError> {
        let rows = match mechanism {
            Some(mechanism) => {
                sqlx::query(
                    "SELECT id, username, key_label, authmech, active, secret, keyhandle, \
                     publickey, certificate, counter FROM tfa \
                     WHERE username = $1 AND authmech = $2 ORDER BY id",
                )
                .bind(username.as_str())
                .bind(mechanism.as_str())
                .fetch_all(&self.pool)
                .await
            }
            None => {
                sqlx::query(
                    "SELECT id, username, key_label, authmech, active, secret, keyhandle, \
                     publickey, certificate, counter FROM tfa \
                     WHERE username = $1 ORDER BY id",
                )
                .bind(username.as_str())
                .fetch_all(&self.pool)
                .await
            }
        }
        .map_err(|e| TfaStoreError::UnexpectedError(e.to_string()))?;

        rows.into_iter().map(row_to_factor).collect()
    }

    async fn insert_factor(&self, factor: NewTfaFactor) -> Result<i64, TfaStoreError> {
        let query = sqlx::query(
            "INSERT INTO tfa \
             (username, key_label, authmech, active, secret, keyhandle, publickey, certificate, counter) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) RETURNING id",
        )
        .bind(factor.username.as_str().to_string())
        .bind(factor.key_label)
        .bind(factor.material.mechanism().as_str())
        .bind(factor.active);

        let query = match factor.material {
            TfaMaterial::Totp { secret } | TfaMaterial::Hotp { secret } => query
                .bind(secret.expose_secret().clone())
                .bind(None::<Vec<u8>>)
                .bind(None::<Vec<u8>>)
                .bind(None::<Vec<u8>>)
                .bind(None::<i64>),
            TfaMaterial::YubiOtp {
                client_id,
                api_key,
                modhex_prefix,
            } => query
                .bind(format!(
                    "{client_id}:{}:{modhex_prefix}",
                    api_key.expose_secret()
                ))
                .bind(None::<Vec<u8>>)
                .bind(None::<Vec<u8>>)
                .bind(None::<Vec<u8>>)
                .bind(None::<i64>),
            TfaMaterial::U2f(registration) => query
                .bind(None::<String>)
                .bind(registration.key_handle)
                .bind(registration.public_key)
                .bind(registration.certificate)
                .bind(i64::from(registration.counter)),
        };

        let row = query
            .fetch_one(&self.pool)
            .await
            .map_err(|e| TfaStoreError::UnexpectedError(e.to_string()))?;
        row.try_get("id")
            .map_err(|e| TfaStoreError::UnexpectedError(e.to_string()))
    }

    async fn delete_factors(
        &self,
        username: &Username,
        filter: TfaFactorFilter,
    ) -> Result<(), TfaStoreError> {
        let result = match filter {
            TfaFactorFilter::All => {
                sqlx::query("DELETE FROM tfa WHERE username = $1")
                    .bind(username.as_str())
                    .execute(&self.pool)
                    .await
            }
            TfaFactorFilter::AllExcept(kept) => {
                sqlx::query("DELETE FROM tfa WHERE username = $1 AND authmech <> $2")
                    .bind(username.as_str())
                    .bind(kept.as_str())
                    .execute(&self.pool)
                    .await
            }
            TfaFactorFilter::YubiEnrollPurge { modhex_prefix } => {
                sqlx::query(
                    "DELETE FROM tfa WHERE username = $1 \
                     AND authmech = 'yubi_otp' AND split_part(secret, ':', 3) <> $2",
                )
                .bind(username.as_str())
                .bind(modhex_prefix)
                .execute(&self.pool)
                .await
            }
            TfaFactorFilter::ById(id) => {
                sqlx::query("DELETE FROM tfa WHERE username = $1 AND id = $2")
                    .bind(username.as_str())
                    .bind(id)
                    .execute(&self.pool)
                    .await
            }
        };
        result.map_err(|e| TfaStoreError::UnexpectedError(e.to_string()))?;
        Ok(())
    }

    async fn count_active(&self, username: &Username) -> Result<u32, TfaStoreError> {
        let row = sqlx::query("SELECT COUNT(*) AS n FROM tfa WHERE username = $1 AND active = TRUE")
            .bind(username.as_str())
            .fetch_one(&self.pool)
            .await
            .map_err(|e| TfaStoreError::UnexpectedError(e.to_string()))?;
        let count: i64 = row
            .try_get("n")
            .map_err(|e| TfaStoreError::UnexpectedError(e.to_string()))?;
        Ok(count as u32)
    }

    async fn reactivate(&self, username: &Username) -> Result<(), TfaStoreError> {
        sqlx::query("UPDATE tfa SET active = TRUE WHERE username = $1")
            .bind(username.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| TfaStoreError::UnexpectedError(e.to_string()))?;
        Ok(())
    }

    async fn advance_u2f_counter(&self, id: i64, counter: u32) -> Result<(), TfaStoreError> {
        sqlx::query("UPDATE tfa SET counter = $2 WHERE id = $1 AND authmech = 'u2f'")
            .bind(id)
            .bind(i64::from(counter))
            .execute(&self.pool)
            .await
            .map_err(|e| TfaStoreError::UnexpectedError(e.to_string()))?;
        Ok(())
    }
}

#[async_trait::async_trait]
impl DirectoryStore for PgDirectoryStore {
    async fn domain_exists(&self, domain: &str) -> Result<bool, DirectoryStoreError> {
        let row = sqlx::query("SELECT 1 AS one FROM domain WHERE domain = $1 AND active = TRUE")
            .bind(domain)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DirectoryStoreError::UnexpectedError(e.to_string()))?;
        Ok(row.is_some())
    }

    async fn alias_domain_target(
        &self,
        domain: &str,
    ) -> Result<Option<String>, DirectoryStoreError> {
        let row = sqlx::query(
            "SELECT target_domain FROM alias_domain WHERE alias_domain = $1 AND active = TRUE",
        )
        .bind(domain)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DirectoryStoreError::UnexpectedError(e.to_string()))?;
        row.map(|row| {
            row.try_get("target_domain")
                .map_err(|e| DirectoryStoreError::UnexpectedError(e.to_string()))
        })
        .transpose()
    }

    async fn alias_domains_with_target(
        &self,
        target: &str,
    ) -> Result<Vec<String>, DirectoryStoreError> {
        let rows = sqlx::query(
            "SELECT alias_domain FROM alias_domain WHERE target_domain = $1 AND active = TRUE",
        )
        .bind(target)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| DirectoryStoreError::UnexpectedError(e.to_string()))?;
        rows.into_iter()
            .map(|row| {
                row.try_get("alias_domain")
                    .map_err(|e| DirectoryStoreError::UnexpectedError(e.to_string()))
            })
            .collect()
    }

    async fn domain_admin_grant_exists(
        &self,
        username: &Username,
        domain: &str,
    ) -> Result<bool, DirectoryStoreError> {
        let row = sqlx::query(
            "SELECT 1 AS one FROM domain_admins \
             WHERE username = $1 AND domain = $2 AND active = TRUE",
        )
        .bind(username.as_str())
        .bind(domain)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| DirectoryStoreError::UnexpectedError(e.to_string()))?;
        Ok(row.is_some())
    }

    async fn mailbox_owner_domain(
        &self,
        address: &str,
    ) -> Result<Option<String>, DirectoryStoreError> {
        let row = sqlx::query("SELECT domain FROM mailbox WHERE username = $1")
            .bind(address)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DirectoryStoreError::UnexpectedError(e.to_string()))?;
        row.map(|row| {
            row.try_get("domain")
                .map_err(|e| DirectoryStoreError::UnexpectedError(e.to_string()))
        })
        .transpose()
    }

    async fn alias_owner_domain(
        &self,
        address: &str,
    ) -> Result<Option<String>, DirectoryStoreError> {
        let row = sqlx::query("SELECT domain FROM alias WHERE address = $1")
            .bind(address)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| DirectoryStoreError::UnexpectedError(e.to_string()))?;
        row.map(|row| {
            row.try_get("domain")
                .map_err(|e| DirectoryStoreError::UnexpectedError(e.to_string()))
        })
        .transpose()
    }
}

fn row_to_factor(row: PgRow) -> Result<TfaFactor, TfaStoreError> {
    let unexpected = |e: sqlx::Error| TfaStoreError::UnexpectedError(e.to_string());

    let id: i64 = row.try_get("id").map_err(unexpected)?;
    let username: String = row.try_get("username").map_err(unexpected)?;
    let username = Username::parse(&username)
        .map_err(|_| TfaStoreError::UnexpectedError(format!("bad username in factor {id}")))?;
    let key_label: String = row.try_get("key_label").map_err(unexpected)?;
    let active: bool = row.try_get("active").map_err(unexpected)?;
    let tag: String = row.try_get("authmech").map_err(unexpected)?;

    let material = match TfaMechanism::parse(&tag) {
        Some(TfaMechanism::Totp) => TfaMaterial::Totp {
            secret: Secret::from(required_secret(&row, id)?),
        },
        Some(TfaMechanism::Hotp) => TfaMaterial::Hotp {
            secret: Secret::from(required_secret(&row, id)?),
        },
        Some(TfaMechanism::YubiOtp) => {
            let stored = required_secret(&row, id)?;
            let mut parts = stored.splitn(3, ':');
            match (parts.next(), parts.next(), parts.next()) {
                (Some(client_id), Some(api_key), Some(modhex_prefix)) => TfaMaterial::YubiOtp {
                    client_id: client_id.to_string(),
                    api_key: Secret::from(api_key.to_string()),
                    modhex_prefix: modhex_prefix.to_string(),
                },
                _ => {
                    return Err(TfaStoreError::UnexpectedError(format!(
                        "malformed yubico material in factor {id}"
                    )));
                }
            }
        }
        Some(TfaMechanism::U2f) => {
            let counter: i64 = row
                .try_get::<Option<i64>, _>("counter")
                .map_err(unexpected)?
                .unwrap_or(0);
            TfaMaterial::U2f(mailward_core::U2fRegistration {
                key_handle: required_bytes(&row, "keyhandle", id)?,
                public_key: required_bytes(&row, "publickey", id)?,
                certificate: required_bytes(&row, "certificate", id)?,
                counter: counter as u32,
            })
        }
        Some(TfaMechanism::None) | None => {
            return Err(TfaStoreError::UnexpectedError(format!(
                "unknown mechanism {tag} in factor {id}"
            )));
        }
    };

    Ok(TfaFactor {
        id,
        username,
        key_label,
        active,
        material,
    })
}

fn required_secret(row: &PgRow, id: i64) -> Result<String, TfaStoreError> {
    row.try_get::<Option<String>, _>("secret")
        .map_err(|e| TfaStoreError::UnexpectedError(e.to_string()))?
        .ok_or_else(|| TfaStoreError::UnexpectedError(format!("factor {id} has no secret")))
}

fn required_bytes(row: &PgRow, column: &str, id: i64) -> Result<Vec<u8>, TfaStoreError> {
    row.try_get::<Option<Vec<u8>>, _>(column)
        .map_err(|e| TfaStoreError::UnexpectedError(e.to_string()))?
        .ok_or_else(|| TfaStoreError::UnexpectedError(format!("factor {id} has no {column}")))
}
