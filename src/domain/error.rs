use {super::gateway::GatewayError, thiserror::Error};

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("validation: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("product not found: {0}")]
    InvalidProduct(String),

    #[error("product {product} already purchased by user {payer}")]
    AlreadyPurchased { payer: String, product: String },

    #[error("payment {0} has no gateway session")]
    NotInitialized(String),

    #[error("unauthorized: {0}")]
    Unauthorized(String),

    #[error("forbidden: {0}")]
    Forbidden(String),

    #[error("gateway: {0}")]
    Gateway(#[from] GatewayError),

    #[error("database: {0}")]
    Database(#[from] sqlx::Error),

    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("webhook signature: {0}")]
    WebhookSignature(String),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),
}
