use crate::entities::payment::PaymentRequest;
use crate::framework::DatabaseProcessor;
use kanau::processor::Processor;
use time::OffsetDateTime;
use uuid::Uuid;

/// Which backend call replays a queued request.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize, sqlx::Type,
)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum RequestKind {
    TopUp,
}

impl std::fmt::Display for RequestKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RequestKind::TopUp => write!(f, "top_up"),
        }
    }
}

/// A payment whose booking has not been confirmed by the backend yet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedRequest {
    /// Insertion order, strictly increasing.
    pub seq: i64,
    pub id: Uuid,
    pub kind: RequestKind,
    pub request: PaymentRequest,
    /// Failed replay attempts so far.
    pub attempts: u32,
    pub queued_at: OffsetDateTime,
    /// Set once the backend rejected the request for a business reason and
    /// the replay policy parks such requests.
    pub parked: Option<String>,
}

impl QueuedRequest {
    pub fn is_parked(&self) -> bool {
        self.parked.is_some()
    }
}

/// Raw `pending_requests` row.
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct PendingRequestRow {
    pub seq: i64,
    pub id: String,
    pub kind: RequestKind,
    pub payload: String,
    pub attempts: i64,
    /// Unix time in nanoseconds.
    pub queued_at: i64,
    pub parked_reason: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum RowDecodeError {
    #[error("invalid request id {0:?}")]
    Id(String),
    #[error("invalid payload: {0}")]
    Payload(#[from] serde_json::Error),
    #[error("invalid timestamp {0}")]
    Timestamp(i64),
    #[error("payload id {payload} does not match row id {row}")]
    IdMismatch { row: Uuid, payload: Uuid },
}

impl TryFrom<PendingRequestRow> for QueuedRequest {
    type Error = RowDecodeError;

    fn try_from(row: PendingRequestRow) -> Result<Self, Self::Error> {
        let id = Uuid::parse_str(&row.id).map_err(|_| RowDecodeError::Id(row.id.clone()))?;
        let request: PaymentRequest = serde_json::from_str(&row.payload)?;
        if request.id() != id {
            return Err(RowDecodeError::IdMismatch {
                row: id,
                payload: request.id(),
            });
        }
        let queued_at = OffsetDateTime::from_unix_timestamp_nanos(i128::from(row.queued_at))
            .map_err(|_| RowDecodeError::Timestamp(row.queued_at))?;
        Ok(Self {
            seq: row.seq,
            id,
            kind: row.kind,
            request,
            attempts: u32::try_from(row.attempts).unwrap_or(u32::MAX),
            queued_at,
            parked: row.parked_reason,
        })
    }
}

#[derive(Debug, Clone)]
/// Insert a request unless one with the same id is already stored.
///
/// Returns whether a row was created.
pub struct InsertPendingRequest {
    pub id: Uuid,
    pub kind: RequestKind,
    pub payload: String,
    pub queued_at: OffsetDateTime,
}

impl Processor<InsertPendingRequest> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:InsertPendingRequest")]
    async fn process(&self, insert: InsertPendingRequest) -> Result<bool, sqlx::Error> {
        let queued_at = i64::try_from(insert.queued_at.unix_timestamp_nanos())
            .map_err(|e| sqlx::Error::Encode(Box::new(e)))?;
        let result = sqlx::query(
            r#"
            INSERT INTO pending_requests (id, kind, payload, attempts, queued_at)
            VALUES (?1, ?2, ?3, 0, ?4)
            ON CONFLICT (id) DO NOTHING
            "#,
        )
        .bind(insert.id.to_string())
        .bind(insert.kind)
        .bind(insert.payload)
        .bind(queued_at)
        .execute(&self.pool)
        .await?;
        Ok(result.rows_affected() == 1)
    }
}

#[derive(Debug, Clone)]
/// List stored requests in insertion order, either the replayable ones or
/// the parked ones.
pub struct ListPendingRequests {
    pub parked: bool,
}

impl Processor<ListPendingRequests> for DatabaseProcessor {
    type Output = Vec<PendingRequestRow>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:ListPendingRequests")]
    async fn process(
        &self,
        query: ListPendingRequests,
    ) -> Result<Vec<PendingRequestRow>, sqlx::Error> {
        let sql = if query.parked {
            r#"
            SELECT seq, id, kind, payload, attempts, queued_at, parked_reason
            FROM pending_requests
            WHERE parked_reason IS NOT NULL
            ORDER BY seq ASC
            "#
        } else {
            r#"
            SELECT seq, id, kind, payload, attempts, queued_at, parked_reason
            FROM pending_requests
            WHERE parked_reason IS NULL
            ORDER BY seq ASC
            "#
        };
        let rows = sqlx::query_as::<_, PendingRequestRow>(sql)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows)
    }
}

#[derive(Debug, Clone)]
pub struct GetPendingRequest {
    pub id: Uuid,
}

impl Processor<GetPendingRequest> for DatabaseProcessor {
    type Output = Option<PendingRequestRow>;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:GetPendingRequest")]
    async fn process(
        &self,
        query: GetPendingRequest,
    ) -> Result<Option<PendingRequestRow>, sqlx::Error> {
        let row = sqlx::query_as::<_, PendingRequestRow>(
            r#"
            SELECT seq, id, kind, payload, attempts, queued_at, parked_reason
            FROM pending_requests
            WHERE id = ?1
            "#,
        )
        .bind(query.id.to_string())
        .fetch_optional(&self.pool)
        .await?;
        Ok(row)
    }
}

#[derive(Debug, Clone)]
/// Returns whether a row was deleted.
pub struct DeletePendingRequest {
    pub id: Uuid,
}

impl Processor<DeletePendingRequest> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:DeletePendingRequest")]
    async fn process(&self, cmd: DeletePendingRequest) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM pending_requests WHERE id = ?1")
            .bind(cmd.id.to_string())
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone)]
pub struct IncrementPendingRequestAttempts {
    pub id: Uuid,
}

impl Processor<IncrementPendingRequestAttempts> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:IncrementPendingRequestAttempts")]
    async fn process(&self, cmd: IncrementPendingRequestAttempts) -> Result<bool, sqlx::Error> {
        let result =
            sqlx::query("UPDATE pending_requests SET attempts = attempts + 1 WHERE id = ?1")
                .bind(cmd.id.to_string())
                .execute(&self.pool)
                .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone)]
/// Park a request with a reason, or clear the reason to make it replayable
/// again. Clearing also resets the attempt counter.
pub struct SetPendingRequestParked {
    pub id: Uuid,
    pub reason: Option<String>,
}

impl Processor<SetPendingRequestParked> for DatabaseProcessor {
    type Output = bool;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:SetPendingRequestParked")]
    async fn process(&self, cmd: SetPendingRequestParked) -> Result<bool, sqlx::Error> {
        let result = match cmd.reason {
            Some(reason) => {
                sqlx::query("UPDATE pending_requests SET parked_reason = ?2 WHERE id = ?1")
                    .bind(cmd.id.to_string())
                    .bind(reason)
                    .execute(&self.pool)
                    .await?
            }
            None => {
                sqlx::query(
                    r#"
                    UPDATE pending_requests
                    SET parked_reason = NULL, attempts = 0
                    WHERE id = ?1 AND parked_reason IS NOT NULL
                    "#,
                )
                .bind(cmd.id.to_string())
                .execute(&self.pool)
                .await?
            }
        };
        Ok(result.rows_affected() > 0)
    }
}

#[derive(Debug, Clone)]
/// Count every stored request, parked ones included.
pub struct CountPendingRequests;

impl Processor<CountPendingRequests> for DatabaseProcessor {
    type Output = i64;
    type Error = sqlx::Error;
    #[tracing::instrument(skip_all, err, name = "SQL:CountPendingRequests")]
    async fn process(&self, _: CountPendingRequests) -> Result<i64, sqlx::Error> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM pending_requests")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
