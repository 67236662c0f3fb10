/// Integration tests for the partition store covering provisioning, day-boundary
/// writes, retention, partition-spanning queries and the PostgreSQL backend.

mod helpers;
mod partitions;
mod rotation;
