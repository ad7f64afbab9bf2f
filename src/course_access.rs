//! Course visibility backed by optional source tables.
//!
//! | Table | Columns |
//! |-------|---------|
//! | `access.courses_table` | `id`, `visible`, `guest_access` |
//! | `access.enrolments_table` | `user_id`, `course_id` |
//!
//! Course ids `<= 1` are site-level and always visible. Without a courses
//! table every course is treated as existing and visible; without an
//! enrolments table every signed-in user counts as enrolled.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use sqlx::{Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Mutex;

use shadowdex_core::access::CourseAccess;
use shadowdex_core::UserContext;

use crate::config::AccessConfig;

pub struct SqlCourseAccess {
    pool: SqlitePool,
    courses_table: Option<String>,
    enrolments_table: Option<String>,
    decided: Mutex<HashMap<(i64, i64), bool>>,
}

impl SqlCourseAccess {
    pub fn new(pool: SqlitePool, config: &AccessConfig) -> Self {
        Self {
            pool,
            courses_table: config.courses_table.clone(),
            enrolments_table: config.enrolments_table.clone(),
            decided: Mutex::new(HashMap::new()),
        }
    }

    async fn decide(&self, user: &UserContext, course_id: i64) -> Result<bool> {
        if let Some(table) = &self.courses_table {
            let row = sqlx::query(&format!(
                "SELECT COALESCE(visible, 1) AS visible, COALESCE(guest_access, 0) AS guest_access FROM {} WHERE id = ?",
                table
            ))
            .bind(course_id)
            .fetch_optional(&self.pool)
            .await?;
            let Some(row) = row else {
                return Ok(false);
            };
            if row.get::<i64, _>("visible") == 0 && !user.is_admin {
                return Ok(false);
            }
            if row.get::<i64, _>("guest_access") != 0 {
                return Ok(true);
            }
        }

        if user.is_guest || user.user_id <= 0 {
            return Ok(false);
        }
        match &self.enrolments_table {
            Some(table) => {
                let enrolled: bool = sqlx::query_scalar(&format!(
                    "SELECT COUNT(*) > 0 FROM {} WHERE user_id = ? AND course_id = ?",
                    table
                ))
                .bind(user.user_id)
                .bind(course_id)
                .fetch_one(&self.pool)
                .await?;
                Ok(enrolled)
            }
            None => Ok(true),
        }
    }
}

#[async_trait]
impl CourseAccess for SqlCourseAccess {
    async fn can_view(&self, user: &UserContext, course_id: i64) -> Result<bool> {
        if user.is_admin || course_id <= 1 {
            return Ok(true);
        }
        let key = (user.user_id, course_id);
        let known = self
            .decided
            .lock()
            .map_err(|_| anyhow!("course access memo is poisoned"))?
            .get(&key)
            .copied();
        if let Some(allowed) = known {
            return Ok(allowed);
        }

        let allowed = self.decide(user, course_id).await?;
        self.decided
            .lock()
            .map_err(|_| anyhow!("course access memo is poisoned"))?
            .insert(key, allowed);
        Ok(allowed)
    }
}
