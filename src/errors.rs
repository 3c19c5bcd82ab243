use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("error-duepulse-config-1 Required environment variable not set: {var_name}")]
    EnvVarRequired { var_name: String },

    #[error("error-duepulse-config-2 Invalid port number: {port}")]
    InvalidPortNumber { port: String },

    #[error("error-duepulse-config-3 Invalid interval value: {value}")]
    InvalidInterval { value: String },

    #[error("error-duepulse-config-4 Invalid horizon value: {value}")]
    InvalidHorizon { value: String },

    #[error("error-duepulse-config-5 Invalid topic: {details}")]
    InvalidTopic { details: String },

    #[error("error-duepulse-config-6 Version not available")]
    VersionNotAvailable,
}

#[derive(Error, Debug)]
pub enum RecurrenceError {
    #[error("error-duepulse-recurrence-1 Unknown recurrence pattern: {pattern}")]
    InvalidPattern { pattern: String },
}

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("error-duepulse-storage-200 Database connection failed: {source}")]
    ConnectionFailed {
        #[source]
        source: sqlx::Error,
    },

    #[error("error-duepulse-storage-201 Transaction failed: {source}")]
    TransactionFailed {
        #[source]
        source: sqlx::Error,
    },

    #[error("error-duepulse-storage-202 Query execution failed: {source}")]
    QueryFailed {
        #[source]
        source: sqlx::Error,
    },

    #[error("error-duepulse-storage-203 Row not found: {details}")]
    NotFound { details: String },

    #[error("error-duepulse-storage-204 Invalid input data: {details}")]
    InvalidInput { details: String },

    #[error("error-duepulse-storage-205 Event payload serialization failed: {source}")]
    PayloadSerializationFailed {
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Error, Debug)]
pub enum PublishError {
    #[error("error-duepulse-publish-1 Redis publish failed: {operation}: {source}")]
    RedisOperationFailed {
        operation: String,
        #[source]
        source: deadpool_redis::redis::RedisError,
    },

    #[error("error-duepulse-publish-2 Redis connection failed: {details}")]
    RedisConnectionFailed { details: String },

    #[error("error-duepulse-publish-3 Channel publish failed: {details}")]
    ChannelClosed { details: String },

    #[error("error-duepulse-publish-4 Event payload serialization failed: {source}")]
    SerializationFailed {
        #[source]
        source: serde_json::Error,
    },
}
