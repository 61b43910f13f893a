use std::ops::Range;

use super::{EmbeddingStore, unix_now};
use crate::error::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl JobStatus {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Running => "running",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub fn from_str_status(s: &str) -> Self {
        match s {
            "running" => Self::Running,
            "done" => Self::Done,
            "failed" => Self::Failed,
            _ => Self::Pending,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

/// One durable unit of summarization work covering `chunk_range` of a file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SummaryJob {
    pub id: i64,
    pub file_id: String,
    pub status: JobStatus,
    pub chunk_range: Range<usize>,
    pub result: Option<Vec<String>>,
    pub error: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

type JobRow = (
    i64,
    String,
    String,
    i64,
    i64,
    Option<String>,
    Option<String>,
    i64,
    i64,
);

const JOB_SELECT: &str = "SELECT id, file_id, status, chunk_start, chunk_end, result, error, \
     created_at, updated_at FROM summary_jobs";

fn row_to_job(row: JobRow) -> Result<SummaryJob> {
    let (id, file_id, status, start, end, result, error, created_at, updated_at) = row;
    let result = match result {
        Some(json) => Some(serde_json::from_str(&json)?),
        None => None,
    };
    Ok(SummaryJob {
        id,
        file_id,
        status: JobStatus::from_str_status(&status),
        chunk_range: usize::try_from(start)?..usize::try_from(end)?,
        result,
        error,
        created_at,
        updated_at,
    })
}

impl EmbeddingStore {
    /// Persist one pending job per range, replacing any earlier jobs for `file_id`.
    ///
    /// Returns the new job ids in range order.
    ///
    /// # Errors
    ///
    /// Returns an error if the transaction fails.
    pub async fn create_summary_jobs(
        &self,
        file_id: &str,
        ranges: &[Range<usize>],
    ) -> Result<Vec<i64>> {
        let now = unix_now();
        let mut tx = self.pool.begin().await?;
        sqlx::query("DELETE FROM summary_jobs WHERE file_id = ?")
            .bind(file_id)
            .execute(&mut *tx)
            .await?;

        let mut ids = Vec::with_capacity(ranges.len());
        for range in ranges {
            let (id,): (i64,) = sqlx::query_as(
                "INSERT INTO summary_jobs \
                 (file_id, status, chunk_start, chunk_end, created_at, updated_at) \
                 VALUES (?, 'pending', ?, ?, ?, ?) RETURNING id",
            )
            .bind(file_id)
            .bind(i64::try_from(range.start)?)
            .bind(i64::try_from(range.end)?)
            .bind(now)
            .bind(now)
            .fetch_one(&mut *tx)
            .await?;
            ids.push(id);
        }
        tx.commit().await?;
        Ok(ids)
    }

    /// # Errors
    ///
    /// Returns an error if the SQL statement fails.
    pub async fn mark_job_running(&self, id: i64) -> Result<()> {
        sqlx::query("UPDATE summary_jobs SET status = 'running', updated_at = ? WHERE id = ?")
            .bind(unix_now())
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Move a job to a terminal status, recording its summaries and last error.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL statement fails or the results cannot be serialized.
    pub async fn finish_job(
        &self,
        id: i64,
        status: JobStatus,
        results: &[String],
        error: Option<&str>,
    ) -> Result<()> {
        let json = serde_json::to_string(results)?;
        sqlx::query(
            "UPDATE summary_jobs SET status = ?, result = ?, error = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status.as_str())
        .bind(json)
        .bind(error)
        .bind(unix_now())
        .bind(id)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    /// # Errors
    ///
    /// Returns an error if the SQL query fails or a stored result is malformed.
    pub async fn jobs_for_file(&self, file_id: &str) -> Result<Vec<SummaryJob>> {
        let rows: Vec<JobRow> =
            sqlx::query_as(&format!("{JOB_SELECT} WHERE file_id = ? ORDER BY chunk_start"))
                .bind(file_id)
                .fetch_all(&self.pool)
                .await?;
        rows.into_iter().map(row_to_job).collect()
    }

    /// Jobs left `pending` or `running`, e.g. by a crash mid-run.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQL query fails or a stored result is malformed.
    pub async fn unfinished_jobs(&self) -> Result<Vec<SummaryJob>> {
        let rows: Vec<JobRow> = sqlx::query_as(&format!(
            "{JOB_SELECT} WHERE status IN ('pending', 'running') ORDER BY id"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(row_to_job).collect()
    }

    /// # Errors
    ///
    /// Returns an error if the SQL statement fails.
    pub async fn delete_jobs_for_file(&self, file_id: &str) -> Result<u64> {
        let res = sqlx::query("DELETE FROM summary_jobs WHERE file_id = ?")
            .bind(file_id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }

    /// # Errors
    ///
    /// Returns an error if the SQL statement fails.
    pub async fn delete_job(&self, id: i64) -> Result<()> {
        sqlx::query("DELETE FROM summary_jobs WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}
