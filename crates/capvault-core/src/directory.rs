//! Company directory: the plain, searchable company table.
//!
//! Unlike capability records, directory rows are not encrypted and are
//! addressed by a generated id. They hold only what an operator needs to
//! list and find companies; nothing here grants access to a sealed profile.
//! The table lives in the same SQLite database as the session ledger.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::SqlitePool;
use tracing::info;

use crate::error::DirectoryError;
use crate::session::escape_like;

const CREATE_COMPANY_TABLE: &str = r"
CREATE TABLE IF NOT EXISTS Company (
    Id             TEXT PRIMARY KEY,
    Name           TEXT NOT NULL,
    LicenseNumber  TEXT UNIQUE NOT NULL,
    EmployeesCount INTEGER,
    Services       TEXT,
    CreatedAt      TEXT NOT NULL
)";

/// A directory row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, sqlx::FromRow)]
#[serde(rename_all = "PascalCase")]
pub struct Company {
    #[sqlx(rename = "Id")]
    pub id: String,
    #[sqlx(rename = "Name")]
    pub name: String,
    #[sqlx(rename = "LicenseNumber")]
    pub license_number: String,
    #[sqlx(rename = "EmployeesCount")]
    pub employees_count: Option<u32>,
    #[sqlx(rename = "Services")]
    pub services: Option<String>,
    #[sqlx(rename = "CreatedAt")]
    pub created_at: DateTime<Utc>,
}

/// Fields for a new directory row.
#[derive(Debug, Clone, Deserialize)]
pub struct NewCompany {
    pub name: String,
    /// Must be unique across the directory.
    pub license_number: String,
    pub employees_count: Option<u32>,
    pub services: Option<String>,
}

/// Partial update; `None` leaves a column as it is.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompanyUpdate {
    pub name: Option<String>,
    pub license_number: Option<String>,
    pub employees_count: Option<u32>,
    pub services: Option<String>,
}

/// Columns a company search may match against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompanyColumn {
    Id,
    Name,
    LicenseNumber,
    Services,
}

impl CompanyColumn {
    const fn as_sql(self) -> &'static str {
        match self {
            Self::Id => "Id",
            Self::Name => "Name",
            Self::LicenseNumber => "LicenseNumber",
            Self::Services => "Services",
        }
    }
}

impl std::str::FromStr for CompanyColumn {
    type Err = DirectoryError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('_', "").as_str() {
            "id" => Ok(Self::Id),
            "name" => Ok(Self::Name),
            "licensenumber" => Ok(Self::LicenseNumber),
            "services" => Ok(Self::Services),
            _ => Err(DirectoryError::UnknownColumn { name: s.to_owned() }),
        }
    }
}

/// SQLite-backed company directory.
pub struct CompanyDirectory {
    pool: SqlitePool,
}

impl CompanyDirectory {
    /// Wrap an existing pool. Call [`migrate`](Self::migrate) before use.
    #[must_use]
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    /// Create the `Company` table if it does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Database`] on failure.
    pub async fn migrate(&self) -> Result<(), DirectoryError> {
        sqlx::query(CREATE_COMPANY_TABLE).execute(&self.pool).await?;
        Ok(())
    }

    /// Insert a company and return its id.
    ///
    /// # Errors
    ///
    /// - [`DirectoryError::Invalid`] if the name or license number is empty.
    /// - [`DirectoryError::Conflict`] if the license number is taken.
    /// - [`DirectoryError::Database`] on other database failures.
    pub async fn create(&self, new: NewCompany) -> Result<String, DirectoryError> {
        if new.name.trim().is_empty() || new.license_number.trim().is_empty() {
            return Err(DirectoryError::Invalid {
                reason: "name and license number are required".to_owned(),
            });
        }

        let id = uuid::Uuid::new_v4().to_string();
        sqlx::query(
            r"INSERT INTO Company
              (Id, Name, LicenseNumber, EmployeesCount, Services, CreatedAt)
              VALUES (?, ?, ?, ?, ?, ?)",
        )
        .bind(&id)
        .bind(&new.name)
        .bind(&new.license_number)
        .bind(new.employees_count)
        .bind(&new.services)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        info!(company_id = %id, "company added to directory");
        Ok(id)
    }

    /// Fetch a company by id.
    ///
    /// # Errors
    ///
    /// - [`DirectoryError::NotFound`] if the company does not exist.
    /// - [`DirectoryError::Database`] on database failure.
    pub async fn find(&self, id: &str) -> Result<Company, DirectoryError> {
        sqlx::query_as::<_, Company>("SELECT * FROM Company WHERE Id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| DirectoryError::NotFound { id: id.to_owned() })
    }

    /// Apply `changes` to the company `id` and return the updated row.
    ///
    /// # Errors
    ///
    /// - [`DirectoryError::NotFound`] if the company does not exist.
    /// - [`DirectoryError::Invalid`] if a given name or license number is empty.
    /// - [`DirectoryError::Conflict`] if the new license number is taken.
    /// - [`DirectoryError::Database`] on other database failures.
    pub async fn update(&self, id: &str, changes: CompanyUpdate) -> Result<Company, DirectoryError> {
        let blank = |v: Option<&str>| v.is_some_and(|s| s.trim().is_empty());
        if blank(changes.name.as_deref()) || blank(changes.license_number.as_deref()) {
            return Err(DirectoryError::Invalid {
                reason: "name and license number cannot be blank".to_owned(),
            });
        }

        let updated = sqlx::query(
            r"UPDATE Company SET
                Name = COALESCE(?, Name),
                LicenseNumber = COALESCE(?, LicenseNumber),
                EmployeesCount = COALESCE(?, EmployeesCount),
                Services = COALESCE(?, Services)
              WHERE Id = ?",
        )
        .bind(&changes.name)
        .bind(&changes.license_number)
        .bind(changes.employees_count)
        .bind(&changes.services)
        .bind(id)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if updated == 0 {
            return Err(DirectoryError::NotFound { id: id.to_owned() });
        }
        self.find(id).await
    }

    /// Remove a company.
    ///
    /// # Errors
    ///
    /// - [`DirectoryError::NotFound`] if the company does not exist.
    /// - [`DirectoryError::Database`] on database failure.
    pub async fn delete(&self, id: &str) -> Result<(), DirectoryError> {
        let deleted = sqlx::query("DELETE FROM Company WHERE Id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?
            .rows_affected();

        if deleted == 0 {
            return Err(DirectoryError::NotFound { id: id.to_owned() });
        }
        info!(company_id = %id, "company removed from directory");
        Ok(())
    }

    /// Companies whose `column` contains `keyword` as a substring.
    ///
    /// # Errors
    ///
    /// Returns [`DirectoryError::Database`] on database failure.
    pub async fn search(
        &self,
        column: CompanyColumn,
        keyword: &str,
    ) -> Result<Vec<Company>, DirectoryError> {
        let sql = format!(
            "SELECT * FROM Company WHERE {} LIKE ? ESCAPE '\\' ORDER BY CreatedAt",
            column.as_sql()
        );
        let companies = sqlx::query_as::<_, Company>(&sql)
            .bind(format!("%{}%", escape_like(keyword)))
            .fetch_all(&self.pool)
            .await?;
        Ok(companies)
    }
}

impl std::fmt::Debug for CompanyDirectory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompanyDirectory").finish_non_exhaustive()
    }
}
