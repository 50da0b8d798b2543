use thiserror::Error;

/// Failures talking to the planning service.
#[derive(Debug, Error)]
pub enum PlanningError {
    #[error("planning service unreachable: {0}")]
    Network(#[from] reqwest::Error),

    #[error("planning service returned HTTP {status}: {detail}")]
    Server { status: u16, detail: String },

    #[error("planning service response missing {0}")]
    Format(&'static str),
}

/// Failures talking to the task store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("store query failed: {0}")]
    Postgres(#[from] postgres::Error),

    #[error("no {table} row with id {id}")]
    NotFound { table: &'static str, id: uuid::Uuid },

    #[error("store unavailable: {0}")]
    Unavailable(String),
}
