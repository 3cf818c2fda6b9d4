/// Errors from configuring a [`SnowflakeGenerator`](crate::SnowflakeGenerator).
#[derive(Debug, thiserror::Error)]
pub enum SnowflakeError {
    /// The node id does not fit in 11 bits.
    #[error("node id {0} out of range (max {max})", max = crate::MAX_NODE_ID)]
    NodeIdOutOfRange(u16),
}
