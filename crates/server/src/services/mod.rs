pub mod attachments;
pub mod cache;
pub mod comments;
pub mod notify;
pub mod projects;
pub mod storage;
pub mod tags;
pub mod tasks;

use serde::{Deserialize, Deserializer, Serialize};

use crate::{
    db::{lookup, models::Id},
    error::{AppError, Result},
};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageMeta {
    pub current_page: i64,
    pub last_page: i64,
    pub total: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Page<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

impl<T> Page<T> {
    pub fn new(data: Vec<T>, page: i64, per_page: i64, total: i64) -> Self {
        let last_page = ((total + per_page - 1) / per_page).max(1);
        Self {
            data,
            meta: PageMeta {
                current_page: page,
                last_page,
                total,
            },
        }
    }
}

/// Normalizes a requested page number and returns it with its row offset.
pub(crate) fn page_window(page: Option<i64>, per_page: i64) -> (i64, i64) {
    let page = page.unwrap_or(1).max(1);
    (page, (page - 1) * per_page)
}

/// Distinguishes an absent field (`None`) from an explicit `null` (`Some(None)`).
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<Option<Option<T>>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<T>::deserialize(deserializer).map(Some)
}

/// Rejects references to users that do not exist as a validation failure.
pub(crate) async fn ensure_user_exists(pool: &sqlx::SqlitePool, user_id: Id, field: &str) -> Result<()> {
    if lookup::user_exists(pool, user_id).await? {
        Ok(())
    } else {
        Err(AppError::Validation(format!("The selected {field} is invalid")))
    }
}

pub(crate) fn require_text(value: &str, field: &str, max: usize) -> Result<()> {
    if value.trim().is_empty() {
        return Err(AppError::Validation(format!("The {field} field is required")));
    }
    if value.chars().count() > max {
        return Err(AppError::Validation(format!(
            "The {field} may not be greater than {max} characters"
        )));
    }
    Ok(())
}
