//! Sizing for [`SingleConsumerQueue`](super::SingleConsumerQueue).

use thiserror::Error;

/// Default number of slots allocated up front.
pub const DEFAULT_INITIAL_CAPACITY: usize = 64;
/// Default number of slots added each time the queue fills.
pub const DEFAULT_BUCKET_SIZE: usize = 64;
/// Default maximum number of items handed to one `process` call.
pub const DEFAULT_BULK_SIZE: usize = 32;

/// Errors returned when building a [`QueueConfig`].
#[non_exhaustive]
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
pub enum QueueConfigError {
    /// The growth bucket was zero.
    #[error("bucket size must be >= 1")]
    ZeroBucketSize,
    /// The bulk size was zero.
    #[error("bulk size must be >= 1")]
    ZeroBulkSize,
}

/// Validated queue sizing.
///
/// `initial_capacity` may be zero, in which case the first enqueue allocates
/// one bucket.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct QueueConfig {
    initial_capacity: usize,
    bucket_size: usize,
    bulk_size: usize,
}

impl QueueConfig {
    /// Start building a configuration from the defaults.
    #[must_use]
    pub fn builder() -> QueueConfigBuilder { QueueConfigBuilder::default() }

    /// Slots allocated when the queue is created.
    #[must_use]
    pub const fn initial_capacity(&self) -> usize { self.initial_capacity }

    /// Slots added whenever the queue runs out of room.
    #[must_use]
    pub const fn bucket_size(&self) -> usize { self.bucket_size }

    /// Maximum items removed per `dequeue`.
    #[must_use]
    pub const fn bulk_size(&self) -> usize { self.bulk_size }
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            initial_capacity: DEFAULT_INITIAL_CAPACITY,
            bucket_size: DEFAULT_BUCKET_SIZE,
            bulk_size: DEFAULT_BULK_SIZE,
        }
    }
}

/// Builder for [`QueueConfig`].
///
/// # Examples
///
/// ```
/// use relaycore::queue::QueueConfig;
///
/// let config = QueueConfig::builder()
///     .initial_capacity(8)
///     .bucket_size(8)
///     .bulk_size(4)
///     .build()
///     .expect("valid sizes");
/// assert_eq!(config.bulk_size(), 4);
/// ```
#[derive(Clone, Copy, Debug)]
pub struct QueueConfigBuilder {
    config: QueueConfig,
}

impl Default for QueueConfigBuilder {
    fn default() -> Self {
        Self {
            config: QueueConfig::default(),
        }
    }
}

impl QueueConfigBuilder {
    /// Set the number of slots allocated up front.
    #[must_use]
    pub fn initial_capacity(mut self, capacity: usize) -> Self {
        self.config.initial_capacity = capacity;
        self
    }

    /// Set the growth increment.
    #[must_use]
    pub fn bucket_size(mut self, bucket_size: usize) -> Self {
        self.config.bucket_size = bucket_size;
        self
    }

    /// Set the maximum batch handed to the consumer.
    #[must_use]
    pub fn bulk_size(mut self, bulk_size: usize) -> Self {
        self.config.bulk_size = bulk_size;
        self
    }

    /// Validate and return the configuration.
    ///
    /// # Errors
    ///
    /// Returns [`QueueConfigError::ZeroBucketSize`] or
    /// [`QueueConfigError::ZeroBulkSize`] when either is zero.
    pub fn build(self) -> Result<QueueConfig, QueueConfigError> {
        if self.config.bucket_size == 0 {
            return Err(QueueConfigError::ZeroBucketSize);
        }
        if self.config.bulk_size == 0 {
            return Err(QueueConfigError::ZeroBulkSize);
        }
        Ok(self.config)
    }
}
